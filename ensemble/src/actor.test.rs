use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, mpsc};
use std::time::{Duration, Instant};

use assert_matches::assert_matches;

use super::*;
use crate::group::Group;
use crate::test_utils::*;

fn message_to(id: ActorId, content: impl std::any::Any + Send) -> Message {
    Message::new(ActorId::EXTERNAL, id, content)
}

#[test_log::test]
fn test_process_accepts_when_idle() {
    let group = Group::local("idle");
    let recorder = Recorder::default();
    let id = group.add_actor(recorder.clone());
    let cell = group.resolve(id).unwrap();

    assert!(!cell.is_busy());
    assert_matches!(cell.process(message_to(id, 7u32)), Ok(Dispatch::Accepted));
    assert_eq!(*recorder.received.lock(), vec![7]);
}

#[test_log::test]
fn test_busy_actor_hands_message_back() {
    let group = Group::local("busy");
    let (actor, handle) = blocker();
    let id = group.add_actor(actor);
    let cell = group.resolve(id).unwrap();

    let holder = handle.hold(cell.clone());
    assert!(cell.is_busy());

    let started = Instant::now();
    let dispatch = cell.process(message_to(id, Ping)).unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    let returned = assert_matches!(dispatch, Dispatch::Busy(message) => message);
    assert!(returned.content().is::<Ping>());
    assert_eq!(handle.pings(), 0);

    handle.release();
    assert_matches!(holder.join().unwrap(), Ok(Dispatch::Accepted));

    // The returned message is still deliverable once the actor is idle.
    assert_matches!(cell.process(returned), Ok(Dispatch::Accepted));
    assert_eq!(handle.pings(), 1);
}

#[test_log::test]
fn test_simultaneous_attempts_admit_exactly_one() {
    let group = Group::local("race");
    let (actor, handle) = blocker();
    let id = group.add_actor(actor);
    let cell = group.resolve(id).unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let (results_tx, results_rx) = mpsc::channel();
    let threads: Vec<_> = (0..2)
        .map(|_| {
            let cell = cell.clone();
            let barrier = barrier.clone();
            let results = results_tx.clone();
            std::thread::spawn(move || {
                barrier.wait();
                let dispatch = cell.process(message_to(id, Hold)).unwrap();
                results.send(dispatch.is_accepted()).unwrap();
            })
        })
        .collect();

    // The winner parks in react, so the loser reports first.
    handle.wait_entered();
    let first = results_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(!first);

    handle.release();
    let second = results_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(second);

    for thread in threads {
        thread.join().unwrap();
    }
}

#[test_log::test]
fn test_reactions_never_overlap() {
    const THREADS: usize = 8;
    const ATTEMPTS: usize = 200;

    let in_flight = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let reactions = Arc::new(AtomicUsize::new(0));

    let group = Group::local("overlap");
    let id = group.add_actor(FnActor::new({
        let in_flight = in_flight.clone();
        let overlaps = overlaps.clone();
        let reactions = reactions.clone();
        move |_: &mut Context, _: Message| {
            if in_flight.fetch_add(1, Ordering::SeqCst) != 0 {
                overlaps.fetch_add(1, Ordering::SeqCst);
            }
            std::thread::yield_now();
            reactions.fetch_add(1, Ordering::SeqCst);
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }));
    let cell = group.resolve(id).unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let threads: Vec<_> = (0..THREADS)
        .map(|_| {
            let cell = cell.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                (0..ATTEMPTS)
                    .filter(|_| cell.process(message_to(id, ())).unwrap().is_accepted())
                    .count()
            })
        })
        .collect();

    let accepted: usize = threads.into_iter().map(|t| t.join().unwrap()).sum();
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(accepted, reactions.load(Ordering::SeqCst));
    assert!(accepted >= 1);
}

#[test_log::test]
fn test_unexpected_content_releases_gate() {
    let group = Group::local("mismatch");
    let recorder = Recorder::default();
    let id = group.add_actor(recorder.clone());
    let cell = group.resolve(id).unwrap();

    assert_matches!(
        cell.process(message_to(id, "text")),
        Err(ActorError::UnexpectedContent { kind }) if kind == "&str"
    );
    assert!(!cell.is_busy());
    assert_matches!(cell.process(message_to(id, 1u32)), Ok(Dispatch::Accepted));
    assert_eq!(*recorder.received.lock(), vec![1]);
}

#[test_log::test]
fn test_panicking_reaction_releases_gate() {
    let group = Group::local("panic");
    let id = group.add_actor(FnActor::new(|_: &mut Context, message: Message| {
        if message.content().is::<Hold>() {
            panic!("reaction blew up");
        }
        Ok(())
    }));
    let cell = group.resolve(id).unwrap();

    let outcome = catch_unwind(AssertUnwindSafe(|| cell.process(message_to(id, Hold))));
    assert!(outcome.is_err());
    assert!(!cell.is_busy());
    assert_matches!(cell.process(message_to(id, Ping)), Ok(Dispatch::Accepted));
}

#[test_log::test]
fn test_custom_failure_propagates() {
    let group = Group::local("failed");
    let id = group.add_actor(FnActor::new(|_: &mut Context, _: Message| {
        Err(ActorError::Failed("nope".to_string()))
    }));
    let cell = group.resolve(id).unwrap();

    assert_matches!(
        cell.process(message_to(id, ())),
        Err(ActorError::Failed(reason)) if reason == "nope"
    );
    assert!(!cell.is_busy());
}

#[test_log::test]
fn test_context_reports_detached_group() {
    let group = Group::local("detached");
    let id = group.add_actor(FnActor::new(|ctx: &mut Context, _: Message| {
        ctx.send(ctx.id(), ())?;
        Ok(())
    }));
    let cell = group.resolve(id).unwrap();
    drop(group);

    assert_matches!(cell.process(message_to(id, ())), Err(ActorError::Detached));
    assert!(!cell.is_busy());
}

#[test_log::test]
fn test_spawn_from_reaction() {
    let group = Group::local("spawn");
    let recorder = Recorder::default();
    let spawned = Arc::new(parking_lot::Mutex::new(None));

    let parent = group.add_actor(FnActor::new({
        let recorder = recorder.clone();
        let spawned = spawned.clone();
        move |ctx: &mut Context, _: Message| {
            let child = ctx.spawn(recorder.clone())?;
            ctx.send(child, 11u32)?;
            *spawned.lock() = Some(child);
            Ok(())
        }
    }));

    let cell = group.resolve(parent).unwrap();
    assert_matches!(cell.process(message_to(parent, ())), Ok(Dispatch::Accepted));

    let child = spawned.lock().expect("child was not spawned");
    assert_ne!(child, parent);
    assert_eq!(group.len(), 2);

    let message = group.take_pending().unwrap();
    assert_eq!(message.sender(), parent);
    assert_eq!(message.recipient(), child);
    assert!(group.deliver(message).unwrap().is_accepted());
    assert_eq!(*recorder.received.lock(), vec![11]);
}

#[test_log::test]
fn test_misaddressed_message_is_refused() {
    let group = Group::local("misaddressed");
    let a_recorder = Recorder::default();
    let b_recorder = Recorder::default();
    let a = group.add_actor(a_recorder.clone());
    let b = group.add_actor(b_recorder.clone());
    let cell = group.resolve(a).unwrap();

    assert_matches!(
        cell.process(message_to(b, 9u32)),
        Err(ActorError::Misaddressed { actor, recipient }) if actor == a && recipient == b
    );
    assert!(!cell.is_busy());
    assert!(a_recorder.received.lock().is_empty());
    assert!(b_recorder.received.lock().is_empty());
}
