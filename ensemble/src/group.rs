//! Actor group implementation providing registration and message routing.
//!
//! A group is responsible for:
//! - Registering actors and assigning their ids
//! - Resolving ids back to registered actors
//! - Queueing sent messages until something delivers them
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::actor::{Actor, ActorCell, ActorError, Dispatch};
use crate::config::Config;
use crate::id::ActorId;
use crate::message::Message;

/// Errors that can occur while routing through a group
#[derive(thiserror::Error, Debug)]
pub enum GroupError {
    /// No actor is registered under the given id
    #[error("No actor registered as {0}")]
    UnknownActor(ActorId),

    /// The delivery queue is at capacity
    #[error("Delivery queue is full, message for {0} not queued")]
    QueueFull(ActorId),

    /// The delivery queue has been closed
    #[error("Delivery queue has been closed")]
    QueueClosed,
}

/// Errors returned by a single delivery attempt
#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("No actor registered as {0}")]
    UnknownActor(ActorId),

    #[error("Actor {actor} failed: {source}")]
    Actor {
        actor: ActorId,
        #[source]
        source: ActorError,
    },
}

/// A queued message together with the number of times delivery was refused.
#[derive(Debug)]
pub(crate) struct Pending {
    pub message: Message,
    pub attempts: u32,
}

impl Pending {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            attempts: 0,
        }
    }
}

pub(crate) struct GroupInner {
    config: Config,
    /// Registered actors, indexed by `ActorId`.
    actors: RwLock<Vec<Arc<ActorCell>>>,
    queue: mpsc::Sender<Pending>,
    /// Taken by whoever drives delivery.
    receiver: Mutex<Option<mpsc::Receiver<Pending>>>,
}

/// The registry and router for a set of actors.
///
/// The group owns every actor registered into it and is the only authority
/// for assigning ids and resolving them back to actors. Sending through the
/// group only queues the message; delivering it is left to a driver, either
/// the bundled [`Driver`](crate::driver::Driver) or any caller of
/// [`Group::deliver`].
///
/// # Example
/// ```
/// use ensemble::prelude::*;
///
/// struct Echo;
///
/// impl Actor for Echo {
///     fn react(&mut self, ctx: &mut Context, message: Message) -> Result<(), ActorError> {
///         let Some(text) = message.content().downcast_ref::<String>() else {
///             return Err(self.unexpected_message_content(message.content()));
///         };
///         if !message.sender().is_external() {
///             ctx.send(message.sender(), text.clone())?;
///         }
///         Ok(())
///     }
/// }
///
/// let group = Group::local("echo");
/// let echo = group.add_actor(Echo);
/// group.post(echo, "hello".to_string()).unwrap();
///
/// let message = group.take_pending().unwrap();
/// assert!(group.deliver(message).unwrap().is_accepted());
/// ```
#[derive(Clone)]
pub struct Group {
    inner: Arc<GroupInner>,
}

impl Group {
    pub fn new(config: Config) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let inner = GroupInner {
            config,
            actors: RwLock::new(Vec::new()),
            queue: tx,
            receiver: Mutex::new(Some(rx)),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn local<S: Into<String>>(name: S) -> Self {
        Self::new(Config::default().with_name(name))
    }

    pub(crate) fn from_inner(inner: Arc<GroupInner>) -> Self {
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Number of registered actors.
    pub fn len(&self) -> usize {
        self.inner.actors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register an actor and return its newly assigned id.
    ///
    /// The id is assigned and the actor published under a single write lock,
    /// so concurrent registrations always receive distinct, consecutive ids.
    #[tracing::instrument(level = "debug", skip_all, fields(group = %self.name()))]
    pub fn add_actor<A: Actor>(&self, actor: A) -> ActorId {
        let mut actors = self.inner.actors.write();
        let id = ActorId::new(actors.len());
        let cell = ActorCell::bind(id, Arc::downgrade(&self.inner), Box::new(actor));
        actors.push(Arc::new(cell));
        tracing::debug!(actor = %id, kind = std::any::type_name::<A>(), "registered actor");
        id
    }

    /// Look up the actor registered under `id`.
    pub fn resolve(&self, id: ActorId) -> Option<Arc<ActorCell>> {
        self.inner.actors.read().get(id.index()).cloned()
    }

    /// Queue a message from `sender` to `recipient`.
    ///
    /// Fails if `recipient` is not registered in this group or the queue is
    /// full. Never blocks.
    pub fn send<T: Any + Send>(
        &self,
        sender: ActorId,
        recipient: ActorId,
        contents: T,
    ) -> Result<(), GroupError> {
        if self.resolve(recipient).is_none() {
            return Err(GroupError::UnknownActor(recipient));
        }
        let message = Message::new(sender, recipient, contents);
        tracing::trace!(%sender, %recipient, kind = message.content().kind(), "queueing message");
        self.enqueue(Pending::new(message))
    }

    /// Queue a message from outside of any actor.
    pub fn post<T: Any + Send>(&self, recipient: ActorId, contents: T) -> Result<(), GroupError> {
        self.send(ActorId::EXTERNAL, recipient, contents)
    }

    fn enqueue(&self, pending: Pending) -> Result<(), GroupError> {
        self.inner.queue.try_send(pending).map_err(|err| match err {
            mpsc::error::TrySendError::Full(pending) => {
                GroupError::QueueFull(pending.message.recipient())
            }
            mpsc::error::TrySendError::Closed(_) => GroupError::QueueClosed,
        })
    }

    /// Make a single, non-blocking attempt to deliver `message`.
    ///
    /// A busy recipient yields [`Dispatch::Busy`] with the message handed
    /// back; what happens to it next is up to the caller.
    pub fn deliver(&self, message: Message) -> Result<Dispatch, DeliveryError> {
        let recipient = message.recipient();
        let cell = self
            .resolve(recipient)
            .ok_or(DeliveryError::UnknownActor(recipient))?;
        cell.process(message).map_err(|source| DeliveryError::Actor {
            actor: recipient,
            source,
        })
    }

    /// Pop the next queued message, if any.
    ///
    /// For callers that drive delivery themselves. Returns `None` once a
    /// [`Driver`](crate::driver::Driver) has taken over the queue.
    pub fn take_pending(&self) -> Option<Message> {
        let mut receiver = self.inner.receiver.lock();
        receiver
            .as_mut()
            .and_then(|rx| rx.try_recv().ok())
            .map(|pending| pending.message)
    }

    pub(crate) fn take_receiver(&self) -> Option<mpsc::Receiver<Pending>> {
        self.inner.receiver.lock().take()
    }

    pub(crate) fn queue(&self) -> mpsc::Sender<Pending> {
        self.inner.queue.clone()
    }
}

impl Default for Group {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name())
            .field("actors", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use assert_matches::assert_matches;
    use std::collections::HashSet;

    #[test_log::test]
    fn test_ids_are_assigned_in_order() {
        let group = Group::local("order");
        let a = group.add_actor(Recorder::default());
        let b = group.add_actor(Recorder::default());
        assert_eq!(a, ActorId::new(0));
        assert_eq!(b, ActorId::new(1));
        assert_eq!(group.len(), 2);
        assert_eq!(group.resolve(b).map(|cell| cell.id()), Some(b));
    }

    #[test_log::test]
    fn test_concurrent_registration_is_unique_and_gap_free() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 50;

        let group = Group::local("concurrent");
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let group = group.clone();
                std::thread::spawn(move || {
                    (0..PER_THREAD)
                        .map(|_| group.add_actor(Recorder::default()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let ids: Vec<ActorId> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        let unique: HashSet<_> = ids.iter().copied().collect();
        assert_eq!(unique.len(), THREADS * PER_THREAD);

        let mut indices: Vec<_> = ids.iter().map(|id| id.index()).collect();
        indices.sort_unstable();
        assert_eq!(indices, (0..THREADS * PER_THREAD).collect::<Vec<_>>());

        for id in ids {
            assert_eq!(group.resolve(id).unwrap().id(), id);
        }
    }

    #[test_log::test]
    fn test_ids_resolve_to_the_registered_behaviour() {
        let group = Group::local("tags");
        let seen = Seen::default();
        let ids: Vec<_> = (0..5)
            .map(|tag| group.add_actor(Tagged::new(tag, seen.clone())))
            .collect();

        for id in &ids {
            group.post(*id, ()).unwrap();
        }
        while let Some(message) = group.take_pending() {
            assert!(group.deliver(message).unwrap().is_accepted());
        }

        let seen = seen.lock();
        for (tag, id) in ids.iter().enumerate() {
            assert_eq!(seen.get(id), Some(&tag));
        }
    }

    #[test_log::test]
    fn test_send_to_unknown_actor_fails() {
        let group = Group::local("unknown");
        assert_matches!(
            group.post(ActorId::new(99), ()),
            Err(GroupError::UnknownActor(id)) if id == ActorId::new(99)
        );
        assert_matches!(
            group.post(ActorId::EXTERNAL, ()),
            Err(GroupError::UnknownActor(_))
        );
    }

    #[test_log::test]
    fn test_send_reports_full_queue() {
        let group = Group::new(Config::default().with_queue_capacity(1));
        let id = group.add_actor(Recorder::default());
        group.post(id, 1u32).unwrap();
        assert_matches!(group.post(id, 2u32), Err(GroupError::QueueFull(to)) if to == id);

        let message = group.take_pending().unwrap();
        assert_eq!(message.content().downcast_ref::<u32>(), Some(&1));
        assert!(group.take_pending().is_none());
    }

    #[test_log::test]
    fn test_deliver_to_unknown_actor() {
        let group = Group::local("deliver");
        let message = Message::new(ActorId::EXTERNAL, ActorId::new(3), ());
        assert_matches!(
            group.deliver(message),
            Err(DeliveryError::UnknownActor(id)) if id == ActorId::new(3)
        );
    }

    #[test_log::test]
    fn test_deliver_wraps_reaction_failure() {
        let group = Group::local("failure");
        let id = group.add_actor(Recorder::default());
        let message = Message::new(ActorId::EXTERNAL, id, "not a number");
        assert_matches!(
            group.deliver(message),
            Err(DeliveryError::Actor { actor, source: ActorError::UnexpectedContent { .. } })
                if actor == id
        );
    }

    #[test_log::test]
    fn test_take_pending_preserves_sender() {
        let group = Group::local("sender");
        let a = group.add_actor(Recorder::default());
        let b = group.add_actor(Recorder::default());
        group.send(a, b, 5u32).unwrap();

        let message = group.take_pending().unwrap();
        assert_eq!(message.sender(), a);
        assert_eq!(message.recipient(), b);
    }
}
