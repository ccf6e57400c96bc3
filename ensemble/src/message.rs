//! Message envelope and opaque payload types for actor communication.

use std::any::{Any, type_name};
use std::fmt;

use crate::actor::ActorError;
use crate::id::ActorId;

/// Opaque message content.
///
/// A payload can hold any `Send` value. It remembers the type name of the
/// value it was built from so behaviours can report content they do not
/// understand.
pub struct Payload {
    kind: &'static str,
    value: Box<dyn Any + Send>,
}

impl Payload {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            kind: type_name::<T>(),
            value: Box::new(value),
        }
    }

    /// Descriptive name of the contained value's type.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Take the contained value out, or hand the payload back if it is not a `T`.
    pub fn downcast<T: Any>(self) -> Result<T, Payload> {
        let kind = self.kind;
        self.value
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|value| Payload { kind, value })
    }

    /// Build the content-mismatch error for this payload.
    pub fn unexpected(&self) -> ActorError {
        ActorError::UnexpectedContent { kind: self.kind }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload").field("kind", &self.kind).finish()
    }
}

/// An envelope addressed from one actor to another.
///
/// Messages are immutable once built. Ownership moves along with delivery:
/// from the sender into the group's queue, to whatever drives delivery, and
/// finally into the recipient's reaction.
#[derive(Debug)]
pub struct Message {
    sender: ActorId,
    recipient: ActorId,
    content: Payload,
}

impl Message {
    pub fn new<T: Any + Send>(sender: ActorId, recipient: ActorId, content: T) -> Self {
        Self::with_payload(sender, recipient, Payload::new(content))
    }

    pub fn with_payload(sender: ActorId, recipient: ActorId, content: Payload) -> Self {
        Self {
            sender,
            recipient,
            content,
        }
    }

    pub fn sender(&self) -> ActorId {
        self.sender
    }

    pub fn recipient(&self) -> ActorId {
        self.recipient
    }

    pub fn content(&self) -> &Payload {
        &self.content
    }

    pub fn into_content(self) -> Payload {
        self.content
    }

    pub fn into_parts(self) -> (ActorId, ActorId, Payload) {
        (self.sender, self.recipient, self.content)
    }
}
