//! Core actor trait and the try-lock dispatch wrapper.
use std::fmt;
use std::sync::Weak;

use parking_lot::Mutex;

use crate::context::Context;
use crate::group::{GroupError, GroupInner};
use crate::id::ActorId;
use crate::message::{Message, Payload};

#[cfg(test)]
#[path = "actor.test.rs"]
mod tests;

/// Errors raised while an actor reacts to a message.
#[derive(thiserror::Error, Debug)]
pub enum ActorError {
    /// The message content was not something the actor understands.
    #[error("Unexpected message content: {kind}")]
    UnexpectedContent { kind: &'static str },

    /// The actor used its context after its group was dropped.
    #[error("Actor is no longer attached to a group")]
    Detached,

    /// Routing a message or spawn request through the group failed.
    #[error("Group error: {0}")]
    Group(#[from] GroupError),

    /// The message was offered to an actor other than its recipient.
    #[error("Message for {recipient} offered to {actor}")]
    Misaddressed { actor: ActorId, recipient: ActorId },

    /// Behaviour specific failure.
    #[error("Reaction failed: {0}")]
    Failed(String),
}

/// The behaviour of an actor.
///
/// Actors are the fundamental unit of computation in a group. They:
/// - React to one message at a time
/// - Maintain private state
/// - Can send messages to, and spawn, other actors of their group
///
/// `react` is called synchronously while the actor's gate is held, so it never
/// runs concurrently with itself.
pub trait Actor: Send + 'static {
    /// React to a single message.
    fn react(&mut self, ctx: &mut Context, message: Message) -> Result<(), ActorError>;

    /// Report content this actor has no case for.
    fn unexpected_message_content(&self, content: &Payload) -> ActorError {
        content.unexpected()
    }
}

/// Outcome of offering a message to an actor.
#[must_use]
pub enum Dispatch {
    /// The actor reacted to the message.
    Accepted,
    /// The actor was busy with another message. The message is handed back
    /// to the caller untouched.
    Busy(Message),
}

impl Dispatch {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Dispatch::Accepted)
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Dispatch::Busy(_))
    }
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatch::Accepted => write!(f, "Dispatch::Accepted"),
            Dispatch::Busy(message) => f.debug_tuple("Dispatch::Busy").field(message).finish(),
        }
    }
}

/// An actor bound into a group.
///
/// Cells are built by the group at registration with their id and group
/// already set; neither changes afterwards. The gate owns the behaviour, so
/// holding the gate is the only way to reach it.
pub struct ActorCell {
    id: ActorId,
    group: Weak<GroupInner>,
    gate: Mutex<Box<dyn Actor>>,
}

impl ActorCell {
    pub(crate) fn bind(id: ActorId, group: Weak<GroupInner>, actor: Box<dyn Actor>) -> Self {
        Self {
            id,
            group,
            gate: Mutex::new(actor),
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    /// Whether some caller is currently inside this actor's reaction.
    pub fn is_busy(&self) -> bool {
        self.gate.is_locked()
    }

    /// Offer a message to the actor without waiting.
    ///
    /// If another call is inside `react`, returns [`Dispatch::Busy`] carrying
    /// the message immediately. Otherwise reacts to the message while holding
    /// the gate. The gate is released on every exit path, including an error
    /// or a panic out of `react`, before the outcome reaches the caller.
    ///
    /// A message addressed to another actor is refused with
    /// [`ActorError::Misaddressed`] without touching the gate.
    #[tracing::instrument(
        name = "process",
        level = "trace",
        skip_all,
        fields(actor = %self.id, sender = %message.sender())
    )]
    pub fn process(&self, message: Message) -> Result<Dispatch, ActorError> {
        if message.recipient() != self.id {
            return Err(ActorError::Misaddressed {
                actor: self.id,
                recipient: message.recipient(),
            });
        }

        let Some(mut actor) = self.gate.try_lock() else {
            tracing::trace!("actor busy, rejecting message");
            return Ok(Dispatch::Busy(message));
        };

        let mut ctx = Context::new(self.id, self.group.clone());
        let result = actor.react(&mut ctx, message);
        drop(actor);

        match result {
            Ok(()) => {
                tracing::trace!("message accepted");
                Ok(Dispatch::Accepted)
            }
            Err(err) => {
                tracing::debug!(error = %err, "reaction failed");
                Err(err)
            }
        }
    }
}

impl fmt::Debug for ActorCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorCell")
            .field("id", &self.id)
            .field("busy", &self.is_busy())
            .finish()
    }
}
