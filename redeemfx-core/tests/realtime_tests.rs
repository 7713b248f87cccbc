// File: redeemfx-core/tests/realtime_tests.rs
//
// Time is paused in these tests, so backoff sleeps resolve instantly while
// `Instant`s still advance by the exact amount slept.

use std::collections::HashSet;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::timeout;

use redeemfx_core::platforms::ConnectionState;
use redeemfx_core::services::{RealtimeEventClient, ReconnectBackoff};
use redeemfx_core::test_utils::{redemption_event, FakeGateway, FakeTransport};

async fn wait_for(rx: &mut watch::Receiver<ConnectionState>, state: ConnectionState) {
    timeout(Duration::from_secs(600), rx.wait_for(|s| *s == state))
        .await
        .expect("state never reached")
        .expect("client dropped its state sender");
}

fn titles() -> HashSet<String> {
    ["Kill".to_string()].into_iter().collect()
}

#[tokio::test(start_paused = true)]
async fn backoff_doubles_until_capped_then_subscribes() {
    const FAILURES: usize = 6;
    let (transport, control) = FakeTransport::new(FAILURES);
    let (queue, _rx) = crossbeam_channel::unbounded();

    let client = RealtimeEventClient::spawn(
        &Handle::current(),
        transport,
        "1337",
        titles(),
        queue,
        ReconnectBackoff::new((1.0, 2.0), 30.0),
    );
    let mut state = client.watch_state();
    wait_for(&mut state, ConnectionState::Subscribed).await;

    let attempts = control.connect_attempts();
    assert_eq!(attempts.len(), FAILURES + 1);
    assert_eq!(control.subscribes(), 1);

    for n in 1..=FAILURES {
        let waited = (attempts[n] - attempts[n - 1]).as_secs_f64();
        let scale = 2f64.powi(n as i32 - 1);
        let lo = (1.0 * scale).min(30.0);
        let hi = (2.0 * scale).min(30.0);
        // The timer wheel works in whole milliseconds.
        assert!(
            waited >= lo - 0.002 && waited <= hi + 0.002,
            "retry {n} waited {waited}s, expected within [{lo}, {hi}]"
        );
    }

    client.shutdown_and_wait().await;
    assert_eq!(control.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn drops_resubscribe_and_only_known_titles_are_queued() {
    let gw = FakeGateway::new().with_owned_reward("Kill", 10, 0);
    let (transport, control) = FakeTransport::new(0);
    let (queue, rx) = crossbeam_channel::unbounded();

    let client = RealtimeEventClient::spawn(
        &Handle::current(),
        transport,
        "1337",
        titles(),
        queue,
        ReconnectBackoff::new((1.0, 2.0), 30.0),
    );
    let mut state = client.watch_state();
    wait_for(&mut state, ConnectionState::Subscribed).await;

    control.push(redemption_event(&gw, "Kill", "alice", "r-1"));
    control.push(redemption_event(&gw, "Stale Reward", "bob", "r-2"));
    control.disconnect();

    wait_for(&mut state, ConnectionState::Reconnecting).await;
    wait_for(&mut state, ConnectionState::Subscribed).await;
    assert_eq!(control.subscribes(), 2);

    control.push(redemption_event(&gw, "Kill", "carol", "r-3"));
    timeout(Duration::from_secs(5), async {
        while rx.len() < 2 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("events never arrived");

    let users: Vec<String> = rx.try_iter().map(|r| r.user_name).collect();
    assert_eq!(users, vec!["alice", "carol"]);

    client.shutdown_and_wait().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_a_pending_reconnect() {
    let (transport, control) = FakeTransport::new(usize::MAX);
    let (queue, _rx) = crossbeam_channel::unbounded();

    let client = RealtimeEventClient::spawn(
        &Handle::current(),
        transport,
        "1337",
        titles(),
        queue,
        ReconnectBackoff::new((1.0, 2.0), 30.0),
    );
    let mut state = client.watch_state();
    wait_for(&mut state, ConnectionState::Reconnecting).await;

    let state_rx = client.watch_state();
    timeout(Duration::from_secs(1), client.shutdown_and_wait())
        .await
        .expect("shutdown hung");

    assert_eq!(*state_rx.borrow(), ConnectionState::Disconnected);
    assert_eq!(control.connect_attempts().len(), 1);
}
