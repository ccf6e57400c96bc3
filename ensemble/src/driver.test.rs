use std::time::Duration;

use assert_matches::assert_matches;

use super::*;
use crate::actor::ActorError;
use crate::config::Config;
use crate::context::Context;
use crate::group::GroupError;
use crate::id::ActorId;
use crate::message::Message;
use crate::test_utils::*;

fn quick_backoff(max_attempts: Option<u32>) -> RetryPolicy {
    RetryPolicy::Backoff {
        initial: Duration::from_millis(2),
        max: Duration::from_millis(10),
        max_attempts,
    }
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_driver_delivers_queued_messages() {
    let group = Group::new(Config::default().with_name("deliver").with_workers(2));
    let recorder = Recorder::default();
    let id = group.add_actor(recorder.clone());
    for value in 0..10u32 {
        group.post(id, value).unwrap();
    }

    let driver = Driver::new(group.clone())
        .start(CancellationToken::new())
        .unwrap();
    wait_until(|| driver.stats().delivered == 10).await;

    let mut received = recorder.received.lock().clone();
    received.sort_unstable();
    assert_eq!(received, (0..10).collect::<Vec<_>>());

    let stats = driver.shutdown().await;
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.dropped, 0);
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_driver_retries_busy_actor() {
    let group = Group::new(Config::default().with_retry(quick_backoff(None)));
    let (actor, handle) = blocker();
    let id = group.add_actor(actor);
    let holder = handle.hold(group.resolve(id).unwrap());

    let driver = Driver::new(group.clone())
        .start(CancellationToken::new())
        .unwrap();
    group.post(id, Ping).unwrap();

    wait_until(|| driver.stats().retried >= 2).await;
    assert_eq!(handle.pings(), 0);

    handle.release();
    wait_until(|| driver.stats().delivered == 1).await;
    assert_eq!(handle.pings(), 1);
    assert_matches!(holder.join().unwrap(), Ok(Dispatch::Accepted));

    let stats = driver.shutdown().await;
    assert_eq!(stats.dropped, 0);
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_driver_drops_after_max_attempts() {
    let group = Group::new(Config::default().with_retry(quick_backoff(Some(3))));
    let (actor, handle) = blocker();
    let id = group.add_actor(actor);
    let holder = handle.hold(group.resolve(id).unwrap());

    let driver = Driver::new(group.clone())
        .start(CancellationToken::new())
        .unwrap();
    group.post(id, Ping).unwrap();

    wait_until(|| driver.stats().dropped == 1).await;
    assert_eq!(driver.stats().retried, 2);

    handle.release();
    assert!(holder.join().unwrap().unwrap().is_accepted());
    assert_eq!(handle.pings(), 0);
    driver.shutdown().await;
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_drop_policy_discards_immediately() {
    let group = Group::new(Config::default().with_retry(RetryPolicy::Drop));
    let (actor, handle) = blocker();
    let id = group.add_actor(actor);
    let holder = handle.hold(group.resolve(id).unwrap());

    let driver = Driver::new(group.clone())
        .start(CancellationToken::new())
        .unwrap();
    group.post(id, Ping).unwrap();

    wait_until(|| driver.stats().dropped == 1).await;
    assert_eq!(driver.stats().retried, 0);

    handle.release();
    assert!(holder.join().unwrap().unwrap().is_accepted());
    driver.shutdown().await;
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_driver_counts_failures_and_keeps_going() {
    let group = Group::local("failures");
    let recorder = Recorder::default();
    let id = group.add_actor(recorder.clone());
    group.post(id, "not a number").unwrap();
    group.post(id, 3u32).unwrap();

    let driver = Driver::new(group.clone())
        .start(CancellationToken::new())
        .unwrap();
    wait_until(|| {
        let stats = driver.stats();
        stats.failed == 1 && stats.delivered == 1
    })
    .await;
    assert_eq!(*recorder.received.lock(), vec![3]);
    driver.shutdown().await;
}

#[test_log::test(tokio::test)]
async fn test_second_driver_is_refused() {
    let group = Group::local("twice");
    let driver = Driver::new(group.clone())
        .start(CancellationToken::new())
        .unwrap();
    assert_matches!(
        Driver::new(group.clone()).start(CancellationToken::new()),
        Err(DriverError::AlreadyDriven(name)) if name == "twice"
    );
    assert!(group.take_pending().is_none());
    driver.shutdown().await;
}

#[test_log::test(tokio::test)]
async fn test_cancellation_stops_workers() {
    let group = Group::local("cancel");
    let cancellation = CancellationToken::new();
    let driver = Driver::new(group).start(cancellation.clone()).unwrap();

    cancellation.cancel();
    let stats = tokio::time::timeout(Duration::from_secs(5), driver.shutdown())
        .await
        .expect("workers did not stop");
    assert_eq!(stats, DriverStats::default());
}

#[test_log::test(tokio::test)]
async fn test_send_after_shutdown_reports_closed_queue() {
    let group = Group::local("closed");
    let recorder = Recorder::default();
    let id = group.add_actor(recorder.clone());

    let driver = Driver::new(group.clone())
        .start(CancellationToken::new())
        .unwrap();
    driver.shutdown().await;

    assert_matches!(group.post(id, 1u32), Err(GroupError::QueueClosed));
    assert!(group.take_pending().is_none());

    // Reactions that send fail the same way once the queue is gone.
    let forwarder = group.add_actor(FnActor::new(move |ctx: &mut Context, _: Message| {
        ctx.send(id, 2u32)?;
        Ok(())
    }));
    let message = Message::new(ActorId::EXTERNAL, forwarder, ());
    assert_matches!(
        group.deliver(message),
        Err(DeliveryError::Actor {
            source: ActorError::Group(GroupError::QueueClosed),
            ..
        })
    );
    assert!(recorder.received.lock().is_empty());
}
