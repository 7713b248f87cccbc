// File: redeemfx-core/tests/catalog_tests.rs

use std::sync::Arc;

use tokio::runtime::Handle;

use redeemfx_core::RewardCatalog;
use redeemfx_core::models::{CatalogAvailability, RewardDefinition, RewardPatch};
use redeemfx_core::test_utils::FakeGateway;

fn definitions() -> Vec<RewardDefinition> {
    vec![
        RewardDefinition::new("Kill").with_cost(10),
        RewardDefinition::new("Give Spear").with_cost(20).with_delay(30),
        RewardDefinition::new("Invert Controls").with_cost(30),
    ]
}

async fn ready(gw: &Arc<FakeGateway>) -> RewardCatalog {
    let catalog = RewardCatalog::new(definitions(), gw.clone(), Handle::current());
    catalog.refresh_all().await.unwrap();
    catalog
}

fn cost(c: u64) -> RewardPatch {
    RewardPatch {
        cost: Some(c),
        ..Default::default()
    }
}

#[tokio::test]
async fn update_and_delete_are_noops_without_remote_state() {
    let gw = Arc::new(FakeGateway::new());
    let catalog = ready(&gw).await;

    assert!(catalog.update("Kill", cost(5)).is_none());
    assert!(catalog.delete("Kill").is_none());
    assert_eq!(gw.update_calls(), 0);
    assert_eq!(gw.delete_calls(), 0);
    assert!(!catalog.snapshot()[0].created);
}

#[tokio::test]
async fn manageable_follows_the_owner_only_listing() {
    let gw = Arc::new(
        FakeGateway::new()
            .with_owned_reward("Kill", 10, 0)
            .with_foreign_reward("Give Spear", 99)
            .with_foreign_reward("Not Declared", 1),
    );
    let catalog = ready(&gw).await;

    assert_eq!(catalog.availability(), CatalogAvailability::Available);
    let rows = catalog.snapshot();
    assert_eq!(rows.len(), 3);

    assert!(rows[0].created && rows[0].manageable);
    assert!(rows[1].created && !rows[1].manageable);
    assert_eq!(rows[1].cost, 99);
    assert!(!rows[2].created && !rows[2].manageable);
    assert_eq!(gw.list_calls(), 2);
}

#[tokio::test]
async fn repeated_refreshes_converge() {
    let gw = Arc::new(FakeGateway::new().with_owned_reward("Kill", 10, 0));
    let catalog = ready(&gw).await;
    let first = catalog.snapshot();

    // Two refreshes in a row, the first one superseded before it lands.
    let a = catalog.refresh_all();
    let b = catalog.refresh_all();
    a.await.unwrap();
    b.await.unwrap();

    assert_eq!(catalog.snapshot(), first);
}

#[tokio::test]
async fn create_attaches_the_echoed_state() {
    let gw = Arc::new(FakeGateway::new());
    let catalog = ready(&gw).await;

    catalog.create("Give Spear", 20, 30).unwrap().await.unwrap();

    let entry = catalog.entry("Give Spear").unwrap();
    assert!(entry.manageable);
    let remote = entry.remote.unwrap();
    assert_eq!(remote, gw.remote("Give Spear").unwrap());
    assert_eq!(remote.delay(), 30);

    // Only valid while absent.
    assert!(catalog.create("Give Spear", 20, 30).is_none());
    assert_eq!(gw.create_calls(), 1);
}

#[tokio::test]
async fn failed_create_leaves_entry_absent_and_retryable() {
    let gw = Arc::new(FakeGateway::new());
    let catalog = ready(&gw).await;

    gw.set_fail_create(true);
    catalog.create("Kill", 10, 0).unwrap().await.unwrap();
    assert!(!catalog.snapshot()[0].created);

    gw.set_fail_create(false);
    catalog.create("Kill", 10, 0).unwrap().await.unwrap();
    assert!(catalog.snapshot()[0].created);
}

#[tokio::test]
async fn identical_updates_issue_one_write() {
    let gw = Arc::new(FakeGateway::new().with_owned_reward("Kill", 10, 0));
    let catalog = ready(&gw).await;

    // Second call while the first is still in flight.
    let first = catalog.update("Kill", cost(25));
    let second = catalog.update("Kill", cost(25));
    assert!(first.is_some());
    assert!(second.is_none());
    first.unwrap().await.unwrap();

    // And again once the server has echoed 25.
    assert!(catalog.update("Kill", cost(25)).is_none());
    assert_eq!(gw.update_calls(), 1);
    assert_eq!(catalog.snapshot()[0].cost, 25);
}

#[tokio::test]
async fn update_only_sends_changed_fields() {
    let gw = Arc::new(FakeGateway::new().with_owned_reward("Give Spear", 20, 30));
    let catalog = ready(&gw).await;

    let patch = RewardPatch {
        cost: Some(20),
        delay: Some(30),
        paused: Some(true),
        enabled: None,
    };
    catalog.update("Give Spear", patch).unwrap().await.unwrap();

    let row = &catalog.snapshot()[1];
    assert!(row.paused);
    assert_eq!((row.cost, row.delay), (20, 30));
    assert_eq!(gw.update_calls(), 1);
}

#[tokio::test]
async fn external_edits_are_picked_up_on_refresh() {
    let gw = Arc::new(FakeGateway::new().with_owned_reward("Kill", 10, 0));
    let catalog = ready(&gw).await;

    gw.edit_remote("Kill", 500);
    // The local view is stale, so asking for 500 still goes out.
    catalog.update("Kill", cost(500)).unwrap().await.unwrap();
    assert_eq!(gw.update_calls(), 1);

    gw.edit_remote("Kill", 42);
    catalog.refresh_all().await.unwrap();
    assert_eq!(catalog.snapshot()[0].cost, 42);
}

#[tokio::test]
async fn delete_clears_state_before_the_call_lands() {
    let gw = Arc::new(FakeGateway::new().with_owned_reward("Kill", 10, 0));
    let catalog = ready(&gw).await;

    let pending = catalog.delete("Kill").unwrap();
    let row = &catalog.snapshot()[0];
    assert!(!row.created && !row.manageable);
    pending.await.unwrap();

    assert!(gw.remote("Kill").is_none());
    assert!(catalog.delete("Kill").is_none());
}

#[tokio::test]
async fn bulk_create_and_delete() {
    let gw = Arc::new(FakeGateway::new().with_foreign_reward("Kill", 5));
    let catalog = ready(&gw).await;

    for h in catalog.create_all() {
        h.await.unwrap();
    }
    let rows = catalog.snapshot();
    assert!(rows.iter().all(|r| r.created));
    assert_eq!(rows.iter().filter(|r| r.manageable).count(), 2);
    assert_eq!(gw.create_calls(), 2);

    for h in catalog.delete_all() {
        h.await.unwrap();
    }
    let rows = catalog.snapshot();
    assert!(rows[0].created, "foreign rewards are left alone");
    assert!(!rows[1].created && !rows[2].created);
}

#[tokio::test]
async fn unsupported_account_makes_everything_a_noop() {
    let gw = Arc::new(FakeGateway::new().without_channel_points());
    let catalog = ready(&gw).await;

    assert_eq!(catalog.availability(), CatalogAvailability::Unavailable);
    assert!(catalog.create("Kill", 10, 0).is_none());
    assert!(catalog.create_all().is_empty());
    assert_eq!(gw.create_calls(), 0);

    // A manual refresh after the account is fixed recovers.
    gw.set_fail_list(false);
    catalog.refresh_all().await.unwrap();
    assert_eq!(catalog.availability(), CatalogAvailability::Available);
}

#[tokio::test]
async fn continuations_after_teardown_are_harmless() {
    let gw = Arc::new(FakeGateway::new());
    let catalog = ready(&gw).await;

    let pending = catalog.create("Kill", 10, 0).unwrap();
    drop(catalog);
    pending.await.unwrap();

    assert!(gw.remote("Kill").is_some());
}

async fn wait_for_held(gw: &FakeGateway, n: usize) {
    for _ in 0..100 {
        if gw.held_updates() >= n {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("expected {n} held updates, found {}", gw.held_updates());
}

#[tokio::test]
async fn update_sent_before_a_refresh_keeps_newer_writes_coalesced() {
    let gw = Arc::new(FakeGateway::new().with_owned_reward("Kill", 10, 0));
    let catalog = ready(&gw).await;
    gw.set_hold_updates(true);

    let stale = catalog.update("Kill", cost(25)).unwrap();
    wait_for_held(&gw, 1).await;
    catalog.refresh_all().await.unwrap();

    let newer = catalog.update("Kill", cost(30)).unwrap();
    wait_for_held(&gw, 2).await;

    // The pre-refresh response lands while the newer write is still out.
    assert!(gw.release_update());
    stale.await.unwrap();
    assert!(catalog.update("Kill", cost(30)).is_none());
    assert_eq!(gw.update_calls(), 2);

    assert!(gw.release_update());
    newer.await.unwrap();
    assert_eq!(catalog.snapshot()[0].cost, 30);
    assert!(catalog.update("Kill", cost(30)).is_none());
}

#[tokio::test]
async fn failed_delete_is_not_retried() {
    let gw = Arc::new(FakeGateway::new().with_owned_reward("Kill", 10, 0));
    let catalog = ready(&gw).await;
    gw.set_fail_delete(true);

    catalog.delete("Kill").unwrap().await.unwrap();
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(gw.delete_calls(), 1);
    assert!(!catalog.snapshot()[0].created);
    assert!(gw.remote("Kill").is_some());
    assert!(catalog.delete("Kill").is_none());

    // The reward only shows up again after an explicit refresh.
    catalog.refresh_all().await.unwrap();
    let row = &catalog.snapshot()[0];
    assert!(row.created && row.manageable);
}

#[tokio::test]
async fn failed_owner_listing_keeps_catalog_available_but_unmanaged() {
    let gw = Arc::new(
        FakeGateway::new()
            .with_owned_reward("Kill", 10, 0)
            .with_foreign_reward("Give Spear", 99),
    );
    gw.set_fail_owned_list(true);
    let catalog = ready(&gw).await;

    assert_eq!(catalog.availability(), CatalogAvailability::Available);
    let rows = catalog.snapshot();
    assert!(rows[0].created && rows[1].created);
    assert!(rows.iter().all(|r| !r.manageable));
    assert_eq!(gw.list_calls(), 2);

    assert!(catalog.update("Kill", cost(5)).is_none());
    assert!(catalog.delete("Kill").is_none());
    assert_eq!(gw.update_calls(), 0);
}
