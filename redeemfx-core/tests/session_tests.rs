// File: redeemfx-core/tests/session_tests.rs

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::timeout;
use tokio_test::assert_ok;

use redeemfx_core::models::{Fulfillment, Outcome, RedemptionStatus, RewardDefinition};
use redeemfx_core::platforms::ConnectionState;
use redeemfx_core::services::Scheduler;
use redeemfx_core::session::STRESS_TEST_USER;
use redeemfx_core::test_utils::{redemption_event, FakeGateway, FakeTransport};
use redeemfx_core::{IntegrationSession, RewardRegistry, SessionConfig};

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn created_reward_redeemed_live_is_fulfilled_once() {
    let gw = Arc::new(FakeGateway::new());
    let notes = Rc::new(RefCell::new(Vec::new()));
    let n = notes.clone();

    let registry = RewardRegistry::new()
        .register(RewardDefinition::new("Kill").with_cost(10), || Ok(Outcome::Done));
    let mut session = IntegrationSession::new(
        SessionConfig::default(),
        registry,
        gw.clone(),
        Scheduler::new(),
        Handle::current(),
    )
    .with_notifier(move |msg| n.borrow_mut().push(msg.to_string()));

    assert_ok!(session.refresh_all().await);
    assert_ok!(session.create("Kill", 10, 0).expect("create issued").await);

    let row = &session.snapshot()[0];
    assert!(row.created && row.manageable);
    assert_eq!((row.cost, row.delay), (10, 0));

    let (transport, control) = FakeTransport::new(0);
    session.connect_realtime(transport, "1337");
    let mut state = session.realtime().expect("realtime client").watch_state();
    assert_ok!(
        timeout(Duration::from_secs(5), state.wait_for(|s| *s == ConnectionState::Subscribed)).await
    );

    control.push(redemption_event(&gw, "Kill", "viewer42", "r-1"));
    assert_ok!(
        timeout(Duration::from_secs(5), async {
            while session.queued_redemptions() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
    );

    let resolved = session.update(0.016);
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].fulfillment, Fulfillment::Fulfill);
    settle().await;

    let marks = gw.marks();
    assert_eq!(marks.len(), 1);
    assert_eq!(marks[0].0.redemption_id, "r-1");
    assert_eq!(marks[0].1, RedemptionStatus::Fulfilled);
    assert_eq!(*notes.borrow(), vec!["Kill redeemed by viewer42".to_string()]);

    session.dispose();
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn named_fast_forward_supersedes_a_running_effect() {
    let scheduler = Scheduler::new();
    let inverted = Rc::new(Cell::new(false));
    let worn_off_notices = Rc::new(Cell::new(0));

    let (s, inv, notices) = (scheduler.clone(), inverted.clone(), worn_off_notices.clone());
    let registry = RewardRegistry::new().register(RewardDefinition::new("Invert Controls"), move || {
        // A new redemption restarts the timer instead of stacking.
        s.fast_forward("invert");
        inv.set(true);
        let (s2, inv2, notices2) = (s.clone(), inv.clone(), notices.clone());
        s.set_named("invert", 30.0, move || {
            inv2.set(false);
            if !s2.is_fast_forwarding() {
                notices2.set(notices2.get() + 1);
            }
        });
        Ok(Outcome::Done)
    });
    let mut session = IntegrationSession::new(
        SessionConfig::default(),
        registry,
        Arc::new(FakeGateway::new()),
        scheduler.clone(),
        Handle::current(),
    );

    session.inject_redemption("Invert Controls", "a");
    session.update(0.0);
    session.update(20.0);
    session.inject_redemption("Invert Controls", "b");
    session.update(0.0);

    assert!(inverted.get());
    assert_eq!(scheduler.pending(), 1);
    assert_eq!(worn_off_notices.get(), 0);

    // 20s after the second redemption the first timer would have fired.
    session.update(20.0);
    assert!(inverted.get());
    session.update(10.0);
    assert!(!inverted.get());
    assert_eq!(worn_off_notices.get(), 1);
}

#[tokio::test]
async fn skip_timers_runs_everything_next_frame() {
    let fired = Rc::new(Cell::new(0));
    let scheduler = Scheduler::new();
    let (s, f) = (scheduler.clone(), fired.clone());
    let registry = RewardRegistry::new().register(RewardDefinition::new("Give Spear"), move || {
        let f = f.clone();
        s.set(120.0, move || f.set(f.get() + 1));
        Ok(Outcome::Done)
    });
    let mut session = IntegrationSession::new(
        SessionConfig::default(),
        registry,
        Arc::new(FakeGateway::new()),
        scheduler,
        Handle::current(),
    );

    session.inject_redemption("Give Spear", "a");
    session.inject_redemption("Give Spear", "b");
    session.update(0.0);
    assert_eq!(session.skip_timers(), 2);
    session.update(0.0);
    assert_eq!(fired.get(), 2);
    assert!(session.is_idle());
}

#[tokio::test]
async fn stress_test_queues_declared_rewards() {
    let registry = RewardRegistry::new()
        .register(RewardDefinition::new("Kill"), || Ok(Outcome::Done))
        .register(RewardDefinition::new("Give Spear"), || Ok(Outcome::Done));
    let mut session = IntegrationSession::new(
        SessionConfig::default(),
        registry,
        Arc::new(FakeGateway::new()),
        Scheduler::new(),
        Handle::current(),
    );

    assert_eq!(session.stress_test(25), 25);
    let resolved = session.update(0.0);
    assert_eq!(resolved.len(), 25);
    assert!(resolved.iter().all(|r| r.user_name == STRESS_TEST_USER));
    assert!(resolved.iter().all(|r| r.reward_title == "Kill" || r.reward_title == "Give Spear"));
}

#[tokio::test]
async fn unknown_titles_cannot_be_injected() {
    let session = IntegrationSession::new(
        SessionConfig::default(),
        RewardRegistry::new().register(RewardDefinition::new("Kill"), || Ok(Outcome::Done)),
        Arc::new(FakeGateway::new()),
        Scheduler::new(),
        Handle::current(),
    );
    assert!(!session.inject_redemption("Nope", "viewer"));
    assert_eq!(session.queued_redemptions(), 0);
}

#[tokio::test]
async fn dispose_drops_queued_redemptions_unresolved() {
    let calls = Rc::new(Cell::new(0));
    let c = calls.clone();
    let registry = RewardRegistry::new().register(RewardDefinition::new("Kill"), move || {
        c.set(c.get() + 1);
        Ok(Outcome::Done)
    });
    let mut session = IntegrationSession::new(
        SessionConfig::default(),
        registry,
        Arc::new(FakeGateway::new()),
        Scheduler::new(),
        Handle::current(),
    );

    session.inject_redemption("Kill", "a");
    session.inject_redemption("Kill", "b");
    session.dispose();

    assert!(session.update(0.0).is_empty());
    assert_eq!(session.queued_redemptions(), 0);
    assert!(!session.inject_redemption("Kill", "c"));
    assert_eq!(calls.get(), 0);
}
