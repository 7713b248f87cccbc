// File: redeemfx-cli/src/offline.rs
//
// Harness commands that run the demo effects against the in-memory fake
// platform. No credentials needed.

use std::sync::Arc;

use anyhow::bail;
use tokio::runtime::Handle;
use tracing::info;

use redeemfx_core::services::Scheduler;
use redeemfx_core::test_utils::FakeGateway;
use redeemfx_core::{IntegrationSession, SessionConfig};

use crate::effects::{self, SharedGame};

const FRAME_SECS: f64 = 0.1;
/// Ten simulated minutes is far past any retry or effect timer.
const MAX_FRAMES: usize = 6000;
const TEST_USER: &str = "Test User";

fn offline_session(config: SessionConfig) -> (IntegrationSession, SharedGame) {
    let game = effects::new_game();
    let scheduler = Scheduler::new();
    let registry = effects::demo_registry(&game, &scheduler);
    let session = IntegrationSession::new(
        config,
        registry,
        Arc::new(FakeGateway::new()),
        scheduler,
        Handle::current(),
    )
    .with_notifier(|msg| println!("{msg}"));
    (session, game)
}

/// Ticks until nothing is queued or scheduled.
fn run_until_idle(session: &mut IntegrationSession) -> usize {
    let mut frames = 0;
    while frames < MAX_FRAMES && !session.is_idle() {
        for r in session.update(FRAME_SECS) {
            info!(
                "{} for {} (retries={}) => {:?}",
                r.reward_title, r.user_name, r.retries, r.fulfillment
            );
        }
        frames += 1;
    }
    frames
}

pub fn redeem(config: SessionConfig, title: &str) -> anyhow::Result<()> {
    let (mut session, game) = offline_session(config);
    if !session.inject_redemption(title, TEST_USER) {
        let known: Vec<String> = session.snapshot().into_iter().map(|r| r.title).collect();
        bail!("Unknown reward '{}'. Known rewards: {}", title, known.join(", "));
    }
    let frames = run_until_idle(&mut session);
    info!("Idle after {:.1}s of simulation; game: {:?}", frames as f64 * FRAME_SECS, game.borrow());
    Ok(())
}

pub fn stress_test(config: SessionConfig, count: usize) -> anyhow::Result<()> {
    let (mut session, game) = offline_session(config);
    let queued = session.stress_test(count);
    let frames = run_until_idle(&mut session);
    info!(
        "Stress test: {} redemptions, idle after {:.1}s; game: {:?}",
        queued,
        frames as f64 * FRAME_SECS,
        game.borrow()
    );
    Ok(())
}

pub fn skip_timers(config: SessionConfig) -> anyhow::Result<()> {
    let (mut session, game) = offline_session(config);
    for title in ["Kill", "Invert Controls"] {
        session.inject_redemption(title, TEST_USER);
    }
    session.update(0.0);
    info!("Timers running: {}; game: {:?}", session.scheduler().pending(), game.borrow());

    let skipped = session.skip_timers();
    session.update(0.0);
    info!("Skipped {} timers; game: {:?}", skipped, game.borrow());
    Ok(())
}
