#![warn(missing_docs)]
#![warn(clippy::missing_safety_doc)]
#![warn(clippy::missing_panics_doc)]

//! Delegate-based, type-identified network message dispatch
//!
//! - [delegate]: non-owning single-target and multicast delegates
//! - [message]: message identity, capability set, buffers and framing
//! - [channel]: per-peer handler registration, send and inbound dispatch
//! - [transport]: the transport seam a channel writes frames to
//! - [library]: process-wide setup and buffer allocator injection

pub mod channel;
pub mod delegate;
pub mod library;
pub mod message;
pub mod transport;

/// Associate message types with their identity
///
/// Implements [MessageIdentity](crate::message::MessageIdentity)
/// with the given identity and the type name as `NAME`
///
/// ## Syntax
///
/// `message[<identity>] <type>;`
///
/// ## Example
///
/// ```rust
/// use netdelegate::message::{CodecError, Message, MessageIdentity, ReadBuffer, WriteBuffer};
///
/// #[derive(Debug, Default)]
/// struct Ping {
///     seq: u32,
/// }
///
/// impl Message for Ping {
///     fn encode(&self, buffer: &mut WriteBuffer) -> Result<(), CodecError> {
///         buffer.put_u32(self.seq)
///     }
///
///     fn decode(&mut self, buffer: &mut ReadBuffer<'_>) -> Result<(), CodecError> {
///         self.seq = buffer.get_u32()?;
///         Ok(())
///     }
/// }
///
/// netdelegate::declare! {
///     message[5] Ping;
/// }
///
/// assert_eq!(Ping::ID.slot(), 5);
/// assert_eq!(Ping::NAME, "Ping");
/// ```
#[macro_export]
macro_rules! declare {
    () => {};

    (
        message [$id:expr] $name:ty;
        $($next:tt)*
    ) => {
        impl $crate::message::MessageIdentity for $name {
            const ID: $crate::message::MessageId = $crate::message::MessageId::new($id);
            const NAME: &'static str = stringify!($name);
        }

        $crate::declare!($($next)*);
    };
}
