//! # Single-target delegates
//!
//! A [Delegate] binds one method to one target object without owning the target.
//! The target is held through a [Weak] reference: the application keeps the
//! handler alive and must unbind it before destroying the handler.
//! Invoking a delegate whose target is gone is reported as
//! [DelegateError::TargetDropped] instead of touching freed memory.

use std::{
    fmt,
    sync::{Arc, Weak},
};

mod multicast;


pub use multicast::*;

/// This enumeration is the list of the possible error outcomes for
/// delegate invocation and registration
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DelegateError {
    /// Target or method is not bound
    #[error("delegate is not bound")]
    Unbound,
    /// Bound target has been dropped by its owner
    #[error("delegate target has been dropped")]
    TargetDropped,
    /// Storage for the delegate could not be allocated
    #[error("allocation failure")]
    AllocationFailure,
}

/// Method signature accepted by [Delegate]
pub type Method<T, A, R> = fn(&T, A) -> R;

/// A bound (target, method) pair invocable like a plain function
///
/// Arguments are passed as a single value `A`, use a tuple for several
pub struct Delegate<T: ?Sized, A, R> {
    target: Option<Weak<T>>,
    method: Option<Method<T, A, R>>,
}

impl<T: ?Sized, A, R> Delegate<T, A, R> {
    /// Creates a delegate bound to `target` and `method`
    pub fn new(target: &Arc<T>, method: Method<T, A, R>) -> Self {
        Self {
            target: Some(Arc::downgrade(target)),
            method: Some(method),
        }
    }

    /// Creates a delegate with neither half bound
    pub const fn unbound() -> Self {
        Self {
            target: None,
            method: None,
        }
    }

    /// Creates a delegate with a method but without a target
    pub const fn from_method(method: Method<T, A, R>) -> Self {
        Self {
            target: None,
            method: Some(method),
        }
    }

    /// Rebinds both target and method
    pub fn bind(&mut self, target: &Arc<T>, method: Method<T, A, R>) {
        self.target = Some(Arc::downgrade(target));
        self.method = Some(method);
    }

    /// Rebinds the target only
    pub fn bind_target(&mut self, target: &Arc<T>) {
        self.target = Some(Arc::downgrade(target));
    }

    /// Rebinds the method only
    pub fn set_method(&mut self, method: Method<T, A, R>) {
        self.method = Some(method);
    }

    /// Clears both halves
    pub fn unbind(&mut self) {
        self.target = None;
        self.method = None;
    }

    /// Returns true if both target and method are bound
    ///
    /// A valid delegate may still fail with [DelegateError::TargetDropped]
    pub fn is_valid(&self) -> bool {
        self.target.is_some() && self.method.is_some()
    }

    /// Returns true if the bound target is still alive
    pub fn is_alive(&self) -> bool {
        match &self.target {
            Some(target) => target.strong_count() > 0,
            None => false,
        }
    }

    /// Calls the bound method on the bound target
    pub fn invoke(&self, args: A) -> Result<R, DelegateError> {
        let (target, method) = match (&self.target, self.method) {
            (Some(target), Some(method)) => (target, method),
            _ => return Err(DelegateError::Unbound),
        };
        let target = target.upgrade().ok_or(DelegateError::TargetDropped)?;
        Ok(method(&*target, args))
    }

    fn method_addr(&self) -> Option<usize> {
        self.method.map(|method| method as usize)
    }
}

impl<T: ?Sized, A, R> Default for Delegate<T, A, R> {
    fn default() -> Self {
        Self::unbound()
    }
}

impl<T: ?Sized, A, R> Clone for Delegate<T, A, R> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            method: self.method,
        }
    }
}

impl<T: ?Sized, A, R> PartialEq for Delegate<T, A, R> {
    fn eq(&self, other: &Self) -> bool {
        let same_target = match (&self.target, &other.target) {
            (Some(a), Some(b)) => Weak::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        same_target && self.method_addr() == other.method_addr()
    }
}

impl<T: ?Sized, A, R> Eq for Delegate<T, A, R> {}

impl<T: ?Sized, A, R> fmt::Debug for Delegate<T, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegate")
            .field(
                "target",
                &self.target.as_ref().map(|target| target.as_ptr() as *const ()),
            )
            .field("method", &self.method_addr().map(|addr| addr as *const ()))
            .finish()
    }
}
