use super::{Delegate, DelegateError};
use parking_lot::{const_mutex, Mutex};
use std::sync::Arc;

struct Entry<T: ?Sized, A, R> {
    delegate: Delegate<T, A, R>,
    removed: bool,
}

type Slot<T, A, R> = Arc<Mutex<Entry<T, A, R>>>;

/// An ordered collection of [Delegate]s invoked together
///
/// Invocation works on a snapshot of the sequence taken before the first call,
/// so handlers may [add](MulticastDelegate::add) or [remove](MulticastDelegate::remove)
/// entries of the same broadcaster while it is dispatching.
/// Entries added during a cycle are first called on the next cycle,
/// entries removed during a cycle are skipped if they were not reached yet.
pub struct MulticastDelegate<T: ?Sized, A, R> {
    slots: Mutex<Vec<Slot<T, A, R>>>,
}

/// A handle to one entry of a [MulticastDelegate]
///
/// Once the entry is removed from its broadcaster the handle is unbound
/// and every invocation through it fails with [DelegateError::Unbound]
pub struct DelegateSlot<T: ?Sized, A, R> {
    slot: Slot<T, A, R>,
}

impl<T: ?Sized, A, R> MulticastDelegate<T, A, R> {
    /// Creates an empty broadcaster
    pub const fn new() -> Self {
        Self {
            slots: const_mutex(Vec::new()),
        }
    }

    /// Appends a delegate
    ///
    /// Duplicates are allowed, the only failure is allocation failure
    pub fn add(&self, delegate: Delegate<T, A, R>) -> Result<(), DelegateError> {
        let mut slots = self.slots.lock();
        slots
            .try_reserve(1)
            .map_err(|_| DelegateError::AllocationFailure)?;
        slots.push(Arc::new(Mutex::new(Entry {
            delegate,
            removed: false,
        })));
        Ok(())
    }

    /// Removes the first entry equal to `delegate`
    ///
    /// Returns false if nothing was found
    pub fn remove(&self, delegate: &Delegate<T, A, R>) -> bool {
        let mut slots = self.slots.lock();
        let index = match slots
            .iter()
            .position(|slot| slot.lock().delegate == *delegate)
        {
            Some(index) => index,
            None => return false,
        };
        {
            let mut entry = slots[index].lock();
            entry.delegate.unbind();
            entry.removed = true;
        }
        slots.remove(index);
        true
    }

    /// Returns true if an entry equal to `delegate` is present
    pub fn contains(&self, delegate: &Delegate<T, A, R>) -> bool {
        self.slots
            .lock()
            .iter()
            .any(|slot| slot.lock().delegate == *delegate)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Returns true if there are no entries
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Returns a handle to the entry at `index`
    pub fn slot(&self, index: usize) -> Option<DelegateSlot<T, A, R>> {
        let slots = self.slots.lock();
        slots.get(index).map(|slot| DelegateSlot { slot: slot.clone() })
    }

    /// Invokes every entry in insertion order
    ///
    /// Returns the result of the last invocation, or None if nothing was called.
    /// Stops at the first failing entry and returns its error.
    pub fn invoke(&self, args: A) -> Result<Option<R>, DelegateError>
    where
        A: Clone,
    {
        let snapshot = self.slots.lock().clone();
        let mut last = None;
        for slot in snapshot {
            let delegate = {
                let entry = slot.lock();
                if entry.removed {
                    continue;
                }
                entry.delegate.clone()
            };
            last = Some(delegate.invoke(args.clone())?);
        }
        Ok(last)
    }
}

impl<T: ?Sized, A, R> Default for MulticastDelegate<T, A, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized, A, R> DelegateSlot<T, A, R> {
    /// Returns true while the entry is part of its broadcaster and bound
    pub fn is_valid(&self) -> bool {
        self.slot.lock().delegate.is_valid()
    }

    /// Returns a copy of the stored delegate
    pub fn delegate(&self) -> Delegate<T, A, R> {
        self.slot.lock().delegate.clone()
    }

    /// Invokes the stored delegate
    pub fn invoke(&self, args: A) -> Result<R, DelegateError> {
        let delegate = self.delegate();
        delegate.invoke(args)
    }
}
