use std::time::Duration;

use crate::error::StateError;
use crate::key::{KeyKind, StateKey};
use crate::store::StateStore;
use crate::transaction::{Reply, Transaction};

fn test_key(kind: KeyKind, id: &str) -> StateKey {
    StateKey::new(kind, format!("conformance-{id}"))
}

/// Run the full state store conformance test suite.
///
/// Call this from your backend's test module with a fresh store instance.
///
/// # Errors
///
/// Returns an error if the store cannot be reached.
pub async fn run_store_conformance_tests(store: &dyn StateStore) -> Result<(), StateError> {
    test_get_missing(store).await?;
    test_check_and_set_new(store).await?;
    test_check_and_set_existing(store).await?;
    test_compare_and_delete(store).await?;
    test_compare_and_expire(store).await?;
    test_add_reports_new_members(store).await?;
    test_rank_orders_by_score(store).await?;
    test_remove_by_score_is_inclusive(store).await?;
    test_remove(store).await?;
    test_increment(store).await?;
    test_add_sequenced(store).await?;
    test_intersect_min(store).await?;
    test_intersect_with_missing_source(store).await?;
    test_replies_follow_operation_order(store).await?;
    Ok(())
}

async fn test_get_missing(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Lock, "missing");
    let val = store.get(&key).await?;
    assert!(val.is_none(), "get on missing key should return None");
    Ok(())
}

async fn test_check_and_set_new(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Lock, "cas-new");
    let created = store
        .check_and_set(&key, "v1", Duration::from_secs(60))
        .await?;
    assert!(created, "check_and_set on new key should return true");
    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("v1"));
    Ok(())
}

async fn test_check_and_set_existing(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Lock, "cas-existing");
    store
        .check_and_set(&key, "v1", Duration::from_secs(60))
        .await?;
    let created = store
        .check_and_set(&key, "v2", Duration::from_secs(60))
        .await?;
    assert!(
        !created,
        "check_and_set on existing key should return false"
    );
    let val = store.get(&key).await?;
    assert_eq!(val.as_deref(), Some("v1"), "original value should remain");
    Ok(())
}

async fn test_compare_and_delete(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Lock, "cad");
    store
        .check_and_set(&key, "owner-a", Duration::from_secs(60))
        .await?;

    let deleted = store.compare_and_delete(&key, "owner-b").await?;
    assert!(!deleted, "delete with the wrong value should be refused");
    assert_eq!(store.get(&key).await?.as_deref(), Some("owner-a"));

    let deleted = store.compare_and_delete(&key, "owner-a").await?;
    assert!(deleted, "delete with the current value should succeed");
    assert!(store.get(&key).await?.is_none());

    let deleted = store.compare_and_delete(&key, "owner-a").await?;
    assert!(!deleted, "delete on missing key should return false");
    Ok(())
}

async fn test_compare_and_expire(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Lock, "cae");
    store
        .check_and_set(&key, "owner-a", Duration::from_secs(5))
        .await?;

    let extended = store
        .compare_and_expire(&key, "owner-b", Duration::from_secs(60))
        .await?;
    assert!(!extended, "extend with the wrong value should be refused");

    let extended = store
        .compare_and_expire(&key, "owner-a", Duration::from_secs(60))
        .await?;
    assert!(extended, "extend with the current value should succeed");

    let missing = test_key(KeyKind::Lock, "cae-missing");
    let extended = store
        .compare_and_expire(&missing, "owner-a", Duration::from_secs(60))
        .await?;
    assert!(!extended, "extend on missing key should return false");
    Ok(())
}

async fn test_add_reports_new_members(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Timeout, "add");
    let replies = store
        .exec(
            &Transaction::new()
                .add(&key, "a", 10)
                .add(&key, "a", 20)
                .cardinality(&key),
        )
        .await?;
    assert_eq!(replies.get(0)?, Reply::Int(1), "first add inserts");
    assert_eq!(replies.get(1)?, Reply::Int(0), "second add only updates");
    assert_eq!(replies.get(2)?, Reply::Int(1));
    Ok(())
}

async fn test_rank_orders_by_score(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Timeout, "rank");
    let replies = store
        .exec(
            &Transaction::new()
                .add(&key, "late", 300)
                .add(&key, "early", 100)
                .add(&key, "tie-b", 200)
                .add(&key, "tie-a", 200)
                .rank(&key, "early")
                .rank(&key, "tie-a")
                .rank(&key, "tie-b")
                .rank(&key, "late")
                .rank(&key, "absent"),
        )
        .await?;
    assert_eq!(replies.get(4)?.as_rank()?, Some(0));
    assert_eq!(replies.get(5)?.as_rank()?, Some(1), "ties break by member");
    assert_eq!(replies.get(6)?.as_rank()?, Some(2));
    assert_eq!(replies.get(7)?.as_rank()?, Some(3));
    assert_eq!(replies.get(8)?.as_rank()?, None);
    Ok(())
}

async fn test_remove_by_score_is_inclusive(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Timeout, "prune");
    let replies = store
        .exec(
            &Transaction::new()
                .add(&key, "old", 100)
                .add(&key, "edge", 200)
                .add(&key, "fresh", 300)
                .remove_by_score(&key, 200)
                .rank(&key, "fresh")
                .cardinality(&key),
        )
        .await?;
    assert_eq!(replies.get(3)?, Reply::Int(2), "scores <= max are removed");
    assert_eq!(replies.get(4)?.as_rank()?, Some(0));
    assert_eq!(replies.get(5)?, Reply::Int(1));
    Ok(())
}

async fn test_remove(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Timeout, "remove");
    store.exec(&Transaction::new().add(&key, "a", 1)).await?;
    let replies = store
        .exec(&Transaction::new().remove(&key, "a").remove(&key, "a"))
        .await?;
    assert_eq!(replies.get(0)?, Reply::Int(1));
    assert_eq!(replies.get(1)?, Reply::Int(0), "second remove finds nothing");
    Ok(())
}

async fn test_increment(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Counter, "incr");
    let replies = store
        .exec(&Transaction::new().increment(&key).increment(&key))
        .await?;
    assert_eq!(replies.get(0)?, Reply::Int(1), "first increment from zero");
    assert_eq!(replies.get(1)?, Reply::Int(2));
    Ok(())
}

async fn test_add_sequenced(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Owner, "seq");
    let counter = test_key(KeyKind::Counter, "seq");
    let replies = store
        .exec(
            &Transaction::new()
                .add_sequenced(&key, "first", &counter)
                .add_sequenced(&key, "second", &counter)
                .increment(&counter)
                .rank(&key, "first")
                .rank(&key, "second"),
        )
        .await?;
    assert_eq!(replies.get(0)?, Reply::Int(1));
    assert_eq!(replies.get(1)?, Reply::Int(2));
    assert_eq!(replies.get(2)?, Reply::Int(3), "shares the plain counter");
    assert_eq!(replies.get(3)?.as_rank()?, Some(0));
    assert_eq!(replies.get(4)?.as_rank()?, Some(1));
    Ok(())
}

async fn test_intersect_min(store: &dyn StateStore) -> Result<(), StateError> {
    let left = test_key(KeyKind::Timeout, "inter");
    let right = test_key(KeyKind::Owner, "inter");
    let replies = store
        .exec(
            &Transaction::new()
                .add(&left, "both-a", 5_000)
                .add(&left, "both-b", 6_000)
                .add(&left, "left-only", 1)
                .add(&right, "both-a", 2)
                .add(&right, "both-b", 1)
                .add(&right, "right-only", 3)
                .intersect_min(&right, &[&left, &right])
                .rank(&right, "both-b")
                .rank(&right, "both-a")
                .rank(&right, "right-only")
                .rank(&left, "left-only"),
        )
        .await?;
    assert_eq!(replies.get(6)?, Reply::Int(2), "only common members survive");
    assert_eq!(
        replies.get(7)?.as_rank()?,
        Some(0),
        "scores take the minimum, so both-b (1) sorts first"
    );
    assert_eq!(replies.get(8)?.as_rank()?, Some(1));
    assert_eq!(replies.get(9)?.as_rank()?, None);
    assert_eq!(
        replies.get(10)?.as_rank()?,
        Some(0),
        "sources other than dest are untouched"
    );
    Ok(())
}

async fn test_intersect_with_missing_source(store: &dyn StateStore) -> Result<(), StateError> {
    let present = test_key(KeyKind::Owner, "inter-missing");
    let missing = test_key(KeyKind::Timeout, "inter-missing");
    let replies = store
        .exec(
            &Transaction::new()
                .add(&present, "a", 1)
                .intersect_min(&present, &[&missing, &present])
                .cardinality(&present),
        )
        .await?;
    assert_eq!(replies.get(1)?, Reply::Int(0));
    assert_eq!(replies.get(2)?, Reply::Int(0), "dest is emptied");
    Ok(())
}

async fn test_replies_follow_operation_order(store: &dyn StateStore) -> Result<(), StateError> {
    let key = test_key(KeyKind::Timeout, "order");
    let tx = Transaction::new()
        .cardinality(&key)
        .add(&key, "x", 1)
        .cardinality(&key)
        .rank(&key, "y");
    let replies = store.exec(&tx).await?;
    assert_eq!(replies.len(), tx.len());
    assert_eq!(replies.get(0)?, Reply::Int(0));
    assert_eq!(replies.get(1)?, Reply::Int(1));
    assert_eq!(replies.get(2)?, Reply::Int(1));
    assert_eq!(replies.get(3)?, Reply::Nil);
    Ok(())
}
