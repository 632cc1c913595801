use crate::{
    delegate::{Delegate, DelegateError},
    message::{CodecError, Message, MessageId, NetMessage, ReadBuffer},
};
use std::any::Any;

/// This enumeration is the list of the possible error outcomes for
/// handing a message to its handler
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// Handler delegate could not be invoked
    #[error(transparent)]
    Delegate(#[from] DelegateError),
    /// Message is not of the type the handler was registered for
    #[error("message {found} cannot be dispatched to a handler of {expected}")]
    TypeMismatch {
        /// Identity the handler accepts
        expected: MessageId,
        /// Identity of the message
        found: MessageId,
    },
}

/// A type-erased handler for one message type
///
/// Implemented for every `Delegate<H, M, bool>` where `M` is a [Message]
pub trait Dispatcher: Send + Sync {
    /// Identity of the accepted message type
    fn message_id(&self) -> MessageId;

    /// Returns true if the underlying delegate is bound
    fn is_valid(&self) -> bool;

    /// Reads a fresh message of the accepted type from `payload`
    ///
    /// Every byte of `payload` must be consumed
    fn decode(&self, payload: &[u8]) -> Result<Box<dyn NetMessage>, CodecError>;

    /// Invokes the handler with `message`
    fn dispatch(&self, message: Box<dyn NetMessage>) -> Result<bool, DispatchError>;

    #[doc(hidden)]
    fn as_any(&self) -> &dyn Any;
}

impl<H, M> Dispatcher for Delegate<H, M, bool>
where
    H: ?Sized + Send + Sync + 'static,
    M: Message,
{
    fn message_id(&self) -> MessageId {
        M::ID
    }

    fn is_valid(&self) -> bool {
        Delegate::is_valid(self)
    }

    fn decode(&self, payload: &[u8]) -> Result<Box<dyn NetMessage>, CodecError> {
        let mut message = M::default();
        let mut buffer = ReadBuffer::new(payload);
        message.read(&mut buffer)?;
        buffer.finish()?;
        Ok(Box::new(message))
    }

    fn dispatch(&self, message: Box<dyn NetMessage>) -> Result<bool, DispatchError> {
        let found = message.get_id();
        let message = message
            .downcast::<M>()
            .ok_or(DispatchError::TypeMismatch {
                expected: M::ID,
                found,
            })?;
        Ok(self.invoke(*message)?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
