//! Shutdown tests: draining waits for in-flight handlers and admits nothing new.

use tokio::sync::watch;

use solidstreak::dispatcher::{Dispatcher, DispatcherOptions};

use crate::support::{
    message, resources, settle, spawn_dispatcher, wait_until, within, GatedSink, ScriptedSource,
};

#[tokio::test]
async fn shutdown_drains_in_flight_handlers() {
    let sink = GatedSink::closed();
    let source = ScriptedSource::new(vec![vec![
        message(1, 101, 1001),
        message(2, 102, 1002),
        message(3, 103, 1003),
        message(4, 104, 1004),
        message(5, 105, 1005),
    ]]);
    let running = spawn_dispatcher(source, resources(sink.clone()).await, 3);

    wait_until("three handlers in flight", || sink.entered().len() == 3).await;
    running.shutdown_tx.send(true).expect("dispatcher listening");
    settle().await;
    assert!(
        !running.handle.is_finished(),
        "dispatcher must wait for in-flight handlers"
    );

    sink.release(1);
    settle().await;
    assert!(!running.handle.is_finished());

    // Plenty of permits: anything admitted after shutdown would get through.
    sink.release(10);
    let summary = within(running.handle)
        .await
        .expect("dispatcher should not panic");

    assert_eq!(summary.admitted, 3);
    assert_eq!(summary.completed, 3);
    assert_eq!(sink.sent().len(), 3);
    assert_eq!(sink.entered(), vec![1001, 1002, 1003]);
}

#[tokio::test]
async fn shutdown_when_idle_returns_immediately() {
    let sink = GatedSink::open();
    let source = ScriptedSource::new(Vec::new());
    let running = spawn_dispatcher(source, resources(sink.clone()).await, 2);

    settle().await;
    let summary = running.stop().await;
    assert_eq!(summary.admitted, 0);
    assert_eq!(summary.completed, 0);
}

#[tokio::test]
async fn dropped_shutdown_sender_stops_dispatcher() {
    let sink = GatedSink::open();
    let source = ScriptedSource::new(Vec::new());
    let running = spawn_dispatcher(source, resources(sink.clone()).await, 2);

    drop(running.shutdown_tx);
    let summary = within(running.handle)
        .await
        .expect("dispatcher should not panic");
    assert_eq!(summary.admitted, 0);
}

#[tokio::test]
async fn shutdown_before_start_admits_nothing() {
    let sink = GatedSink::open();
    let source = ScriptedSource::new(vec![vec![message(1, 101, 1001)]]);
    let (_shutdown_tx, shutdown_rx) = watch::channel(true);
    let dispatcher = Dispatcher::new(
        source,
        resources(sink.clone()).await,
        DispatcherOptions {
            offset: 0,
            poll_timeout_secs: 60,
            max_handlers: 2,
        },
    );

    let summary = within(dispatcher.run(shutdown_rx)).await;
    assert_eq!(summary.admitted, 0);
    assert!(sink.sent().is_empty());
}

#[tokio::test]
async fn zero_limit_is_raised_to_one() {
    let sink = GatedSink::open();
    let source = ScriptedSource::new(vec![vec![message(1, 101, 1001), message(2, 102, 1002)]]);
    let running = spawn_dispatcher(source, resources(sink.clone()).await, 0);

    wait_until("two replies", || sink.sent().len() == 2).await;
    assert_eq!(sink.peak(), 1);
    running.stop().await;
}

#[tokio::test]
async fn buffered_update_is_not_confirmed_while_saturated() {
    let sink = GatedSink::closed();
    let source = ScriptedSource::new(vec![vec![message(1, 101, 1001), message(2, 102, 1002)]]);
    let running = spawn_dispatcher(source.clone(), resources(sink.clone()).await, 1);

    wait_until("first handler in flight", || sink.entered().len() == 1).await;
    settle().await;
    assert_eq!(
        source.offsets(),
        vec![0],
        "update 2 sits unadmitted, so offset 3 must not be requested"
    );

    running.shutdown_tx.send(true).expect("dispatcher listening");
    sink.release(10);
    let summary = within(running.handle)
        .await
        .expect("dispatcher should not panic");

    assert_eq!(summary.admitted, 1);
    assert_eq!(sink.entered(), vec![1001]);
    assert_eq!(
        source.offsets(),
        vec![0],
        "the dropped update stays unconfirmed for redelivery"
    );
}

#[tokio::test]
async fn offset_is_confirmed_once_buffered_update_is_admitted() {
    let sink = GatedSink::closed();
    let source = ScriptedSource::new(vec![vec![message(1, 101, 1001), message(2, 102, 1002)]]);
    let running = spawn_dispatcher(source.clone(), resources(sink.clone()).await, 1);

    wait_until("first handler in flight", || sink.entered().len() == 1).await;
    sink.release(1);
    wait_until("second handler in flight", || sink.entered().len() == 2).await;
    wait_until("next poll", || source.offsets().len() == 2).await;
    assert_eq!(source.offsets(), vec![0, 3]);

    sink.release(1);
    wait_until("two replies", || sink.sent().len() == 2).await;
    running.stop().await;
}
