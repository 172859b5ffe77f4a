//! Concurrency tests: per-player serialization and crossed-target ordering

use std::sync::Arc;

use huntshop::shop::{
    EconomyError, ItemKind, PlayerKey, PlayerRecord, PlayerRef, PowerupKind, PreconditionReason,
    ShopEngine,
};
use huntshop::storage::EconomyStoreBuilder;
use tempfile::tempdir;

const CHANNEL: u64 = 1;

/// Run with RUST_LOG=huntshop=info to watch the interleaving.
fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_spends_cannot_double_spend() {
    init_logs();
    let tmp = tempdir().unwrap();
    let store = Arc::new(EconomyStoreBuilder::new(tmp.path()).open().unwrap());
    let engine = Arc::new(ShopEngine::new(store.clone()));

    // 10 xp buys exactly one 7 xp bullet
    let mut record = PlayerRecord::new(CHANNEL, 10, "hunter");
    record.experience = 10;
    record.rounds = 0;
    store.put_player(record).unwrap();

    let mut handles = Vec::new();
    for _ in 0..2 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let buyer = PlayerRef::new(10, "hunter", false);
            engine.purchase(CHANNEL, &buyer, ItemKind::Round, None).await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(receipt) => {
                successes += 1;
                assert_eq!(receipt.balance_after, 3);
            }
            Err(EconomyError::InsufficientFunds { needed: 7, have: 3 }) => {}
            Err(other) => panic!("unexpected refusal: {:?}", other),
        }
    }
    assert_eq!(successes, 1, "the balance covered exactly one purchase");

    let record = store.get_player(PlayerKey::new(CHANNEL, 10)).unwrap();
    assert_eq!(record.experience, 3);
    assert_eq!(record.spent_experience, 7);
    assert_eq!(record.rounds, 1);
    assert_eq!(record.purchase_count(ItemKind::Round), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_powerup_buys_install_once() {
    init_logs();
    let tmp = tempdir().unwrap();
    let store = Arc::new(EconomyStoreBuilder::new(tmp.path()).open().unwrap());
    let engine = Arc::new(ShopEngine::new(store.clone()));

    let mut record = PlayerRecord::new(CHANNEL, 10, "hunter");
    record.experience = 1000;
    store.put_player(record).unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let buyer = PlayerRef::new(10, "hunter", false);
            engine
                .purchase(CHANNEL, &buyer, ItemKind::Suppressor, None)
                .await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(EconomyError::PreconditionFailed {
                reason:
                    PreconditionReason::PowerupActive {
                        kind: PowerupKind::Suppressor,
                        ..
                    },
                ..
            }) => {}
            Err(other) => panic!("unexpected refusal: {:?}", other),
        }
    }
    assert_eq!(successes, 1, "the active suppressor blocks re-purchase");

    let record = store.get_player(PlayerKey::new(CHANNEL, 10)).unwrap();
    assert_eq!(record.experience, 995, "only one purchase was debited");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_crossed_sabotage_completes_without_deadlock() {
    init_logs();
    let tmp = tempdir().unwrap();
    let store = Arc::new(EconomyStoreBuilder::new(tmp.path()).open().unwrap());
    let engine = Arc::new(ShopEngine::new(store.clone()));

    for (user_id, name) in [(10, "alice"), (11, "bob")] {
        let mut record = PlayerRecord::new(CHANNEL, user_id, name);
        record.experience = 100;
        store.put_player(record).unwrap();
    }

    // each throws sand at the other at the same instant; lock ordering by
    // player key keeps the pair from wedging
    let forward = {
        let engine = engine.clone();
        tokio::spawn(async move {
            let alice = PlayerRef::new(10, "alice", false);
            let bob = PlayerRef::new(11, "bob", false);
            engine
                .purchase(CHANNEL, &alice, ItemKind::Sand, Some(&bob))
                .await
        })
    };
    let reverse = {
        let engine = engine.clone();
        tokio::spawn(async move {
            let alice = PlayerRef::new(10, "alice", false);
            let bob = PlayerRef::new(11, "bob", false);
            engine
                .purchase(CHANNEL, &bob, ItemKind::Sand, Some(&alice))
                .await
        })
    };

    let (forward, reverse) = tokio::join!(forward, reverse);
    forward.unwrap().unwrap();
    reverse.unwrap().unwrap();

    let now = chrono::Utc::now();
    let alice = store.get_player(PlayerKey::new(CHANNEL, 10)).unwrap();
    let bob = store.get_player(PlayerKey::new(CHANNEL, 11)).unwrap();
    for record in [&alice, &bob] {
        assert!(record
            .powerups
            .is_active(engine.registry(), PowerupKind::Sand, now));
        assert_eq!(record.experience, 93);
        assert_eq!(record.rifle_sabotaged_by, None);
    }
}
