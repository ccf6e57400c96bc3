use std::any::Any;
use std::sync::Weak;

use crate::actor::{Actor, ActorError};
use crate::group::{Group, GroupInner};
use crate::id::ActorId;

/// Capabilities handed to an actor while it reacts to a message.
///
/// The context gives actors access to:
/// - Their own id
/// - Sending messages through their group
/// - Spawning new actors into their group
///
/// A context only exists for an actor that has been registered, so sending
/// and spawning before registration cannot happen.
pub struct Context {
    id: ActorId,
    group: Weak<GroupInner>,
}

impl Context {
    pub(crate) fn new(id: ActorId, group: Weak<GroupInner>) -> Self {
        Context { id, group }
    }

    /// The id of the reacting actor.
    pub fn id(&self) -> ActorId {
        self.id
    }

    /// The group this actor is registered in.
    pub fn group(&self) -> Result<Group, ActorError> {
        self.group
            .upgrade()
            .map(Group::from_inner)
            .ok_or(ActorError::Detached)
    }

    /// Send `contents` to `recipient`, with this actor as the sender.
    pub fn send<T: Any + Send>(&self, recipient: ActorId, contents: T) -> Result<(), ActorError> {
        self.group()?.send(self.id, recipient, contents)?;
        Ok(())
    }

    /// Register a new actor in this actor's group and return its id.
    ///
    /// The new actor is addressable as soon as this returns.
    pub fn spawn<A: Actor>(&self, actor: A) -> Result<ActorId, ActorError> {
        Ok(self.group()?.add_actor(actor))
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").field("id", &self.id).finish()
    }
}
