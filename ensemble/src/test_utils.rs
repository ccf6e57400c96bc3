//! Test actors and helpers shared by the crate's tests.
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use crate::actor::{Actor, ActorCell, ActorError, Dispatch};
use crate::context::Context;
use crate::id::ActorId;
use crate::message::Message;

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Records every `u32` it receives and rejects any other content.
#[derive(Default, Clone)]
pub struct Recorder {
    pub received: Arc<Mutex<Vec<u32>>>,
}

impl Actor for Recorder {
    fn react(&mut self, _ctx: &mut Context, message: Message) -> Result<(), ActorError> {
        match message.content().downcast_ref::<u32>() {
            Some(value) => {
                self.received.lock().push(*value);
                Ok(())
            }
            None => Err(self.unexpected_message_content(message.content())),
        }
    }
}

pub type Seen = Arc<Mutex<HashMap<ActorId, usize>>>;

/// Writes its tag under its own id whenever it reacts.
pub struct Tagged {
    tag: usize,
    seen: Seen,
}

impl Tagged {
    pub fn new(tag: usize, seen: Seen) -> Self {
        Self { tag, seen }
    }
}

impl Actor for Tagged {
    fn react(&mut self, ctx: &mut Context, _message: Message) -> Result<(), ActorError> {
        self.seen.lock().insert(ctx.id(), self.tag);
        Ok(())
    }
}

/// Wraps a closure as an actor.
pub struct FnActor<F>(F);

impl<F> FnActor<F>
where
    F: FnMut(&mut Context, Message) -> Result<(), ActorError> + Send + 'static,
{
    pub fn new(react: F) -> Self {
        Self(react)
    }
}

impl<F> Actor for FnActor<F>
where
    F: FnMut(&mut Context, Message) -> Result<(), ActorError> + Send + 'static,
{
    fn react(&mut self, ctx: &mut Context, message: Message) -> Result<(), ActorError> {
        (self.0)(ctx, message)
    }
}

/// Makes a [`Blocker`] stay inside `react` until released.
#[derive(Debug)]
pub struct Hold;

#[derive(Debug)]
pub struct Ping;

/// An actor that can be parked inside its reaction on demand.
pub struct Blocker {
    entered: mpsc::Sender<()>,
    release: mpsc::Receiver<()>,
    pings: Arc<AtomicUsize>,
}

impl Actor for Blocker {
    fn react(&mut self, _ctx: &mut Context, message: Message) -> Result<(), ActorError> {
        let content = message.content();
        if content.is::<Hold>() {
            let _ = self.entered.send(());
            let _ = self.release.recv();
            Ok(())
        } else if content.is::<Ping>() {
            self.pings.fetch_add(1, Ordering::SeqCst);
            Ok(())
        } else {
            Err(self.unexpected_message_content(content))
        }
    }
}

pub struct BlockerHandle {
    entered: mpsc::Receiver<()>,
    release: mpsc::Sender<()>,
    pings: Arc<AtomicUsize>,
}

pub fn blocker() -> (Blocker, BlockerHandle) {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let pings = Arc::new(AtomicUsize::new(0));
    let actor = Blocker {
        entered: entered_tx,
        release: release_rx,
        pings: pings.clone(),
    };
    let handle = BlockerHandle {
        entered: entered_rx,
        release: release_tx,
        pings,
    };
    (actor, handle)
}

impl BlockerHandle {
    /// Park the actor inside `react` on a separate thread and wait until it
    /// holds its gate.
    pub fn hold(&self, cell: Arc<ActorCell>) -> JoinHandle<Result<Dispatch, ActorError>> {
        let id = cell.id();
        let handle = std::thread::spawn(move || {
            cell.process(Message::new(ActorId::EXTERNAL, id, Hold))
        });
        self.wait_entered();
        handle
    }

    pub fn wait_entered(&self) {
        self.entered
            .recv_timeout(WAIT_TIMEOUT)
            .expect("blocker never entered react");
    }

    pub fn release(&self) {
        self.release.send(()).expect("blocker has gone away");
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

/// Poll `condition` until it holds, panicking after a few seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
