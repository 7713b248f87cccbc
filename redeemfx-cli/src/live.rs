// File: redeemfx-cli/src/live.rs
//
// Commands that talk to the real Helix/EventSub endpoints (or whatever the
// setup file points them at).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use redeemfx_common::models::{CatalogAvailability, RewardSnapshot};
use redeemfx_core::platforms::twitch::{HelixRewardGateway, TwitchHelixClient};
use redeemfx_core::platforms::twitch_eventsub::TwitchEventSubTransport;
use redeemfx_core::services::Scheduler;
use redeemfx_core::{IntegrationSession, SessionConfig};

use crate::effects;

/// Validated Twitch credentials.
struct Login {
    client: TwitchHelixClient,
    broadcaster_id: String,
    login: String,
}

async fn login(config: &SessionConfig) -> anyhow::Result<Login> {
    let client_id = std::env::var("TWITCH_CLIENT_ID").context("TWITCH_CLIENT_ID is not set")?;
    let token = std::env::var("TWITCH_ACCESS_TOKEN").context("TWITCH_ACCESS_TOKEN is not set")?;

    let client = TwitchHelixClient::with_base_url(&token, &client_id, &config.helix_base_url);
    let Some(validated) = client.validate_token(&config.validate_url).await? else {
        bail!("Twitch rejected the access token");
    };
    if !validated.scopes.iter().any(|s| s == "channel:manage:redemptions") {
        warn!("Token lacks channel:manage:redemptions => rewards will be read-only");
    }
    info!("Logged in as {} (id={})", validated.login, validated.user_id);

    Ok(Login {
        client,
        broadcaster_id: validated.user_id,
        login: validated.login,
    })
}

fn build_session(config: SessionConfig, login: &Login, scheduler: Scheduler) -> (IntegrationSession, effects::SharedGame) {
    let game = effects::new_game();
    let registry = effects::demo_registry(&game, &scheduler);
    let gateway = Arc::new(HelixRewardGateway::new(login.client.clone(), login.broadcaster_id.clone()));
    let session = IntegrationSession::new(config, registry, gateway, scheduler, Handle::current());
    (session, game)
}

async fn wait_all(handles: Vec<JoinHandle<()>>) {
    for h in handles {
        if let Err(e) = h.await {
            warn!("Remote call task failed: {}", e);
        }
    }
}

async fn ready_session(config: SessionConfig) -> anyhow::Result<(IntegrationSession, Login)> {
    let login = login(&config).await?;
    let (session, _) = build_session(config, &login, Scheduler::new());
    wait_all(vec![session.refresh_all()]).await;
    if session.availability() != CatalogAvailability::Available {
        bail!("Channel points are not available for {}", login.login);
    }
    Ok((session, login))
}

fn print_table(rows: &[RewardSnapshot]) {
    println!(
        "{:<28} {:>6} {:>6} {:>8} {:>7} {:>7} {:>6}",
        "TITLE", "COST", "DELAY", "ENABLED", "PAUSED", "OURS", "MENU"
    );
    for r in rows {
        let created = if r.created { "" } else { " (not created)" };
        println!(
            "{:<28} {:>6} {:>6} {:>8} {:>7} {:>7} {:>6}{}",
            r.title, r.cost, r.delay, r.enabled, r.paused, r.manageable, r.available_in_menu, created
        );
    }
}

pub async fn list(config: SessionConfig) -> anyhow::Result<()> {
    let (session, _) = ready_session(config).await?;
    print_table(&session.snapshot());
    Ok(())
}

pub async fn create_all(config: SessionConfig) -> anyhow::Result<()> {
    let (session, _) = ready_session(config).await?;
    wait_all(session.create_all()).await;
    print_table(&session.snapshot());
    Ok(())
}

pub async fn delete_all(config: SessionConfig) -> anyhow::Result<()> {
    let (session, _) = ready_session(config).await?;
    wait_all(session.delete_all()).await;
    print_table(&session.snapshot());
    Ok(())
}

pub async fn run(config: SessionConfig, tick_hz: u32) -> anyhow::Result<()> {
    if tick_hz == 0 {
        bail!("--tick-hz must be at least 1");
    }
    let login = login(&config).await?;
    let transport = TwitchEventSubTransport::new(login.client.clone(), &config.eventsub_url)
        .with_subscribe_url(&config.subscribe_url());

    let (mut session, game) = build_session(config, &login, Scheduler::new());
    wait_all(vec![session.refresh_all()]).await;
    match session.availability() {
        CatalogAvailability::Available => wait_all(session.create_all()).await,
        other => warn!("Reward catalog is {:?} => effects can only be triggered offline", other),
    }
    session.connect_realtime(transport, &login.broadcaster_id);

    let frame = Duration::from_secs_f64(1.0 / f64::from(tick_hz));
    let mut ticker = tokio::time::interval(frame);
    let mut last = tokio::time::Instant::now();
    info!("Running at {} Hz, Ctrl-C to stop", tick_hz);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            now = ticker.tick() => {
                let dt = now.duration_since(last).as_secs_f64();
                last = now;
                for r in session.update(dt) {
                    info!("{} for {} => {:?}", r.reward_title, r.user_name, r.fulfillment);
                }
            }
        }
    }

    info!("Shutting down; final game state: {:?}", game.borrow());
    session.dispose();
    Ok(())
}
