//! Reusable behavioural suites for locks and semaphores.
//!
//! Backends run these against a fresh store. Names are prefixed with
//! `conformance-` and do not collide with other tests on the same store.

use std::time::Duration;

use turnstile_state::StateError;

use crate::lock::DistributedLock;
use crate::retry::RetryBudget;
use crate::semaphore::Semaphore;

const LEASE: Duration = Duration::from_secs(30);
const LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Run the lock conformance suite.
///
/// # Errors
///
/// Returns an error if the store cannot be reached.
pub async fn run_lock_conformance_tests(lock: &dyn DistributedLock) -> Result<(), StateError> {
    test_lock_acquire_and_release(lock).await?;
    test_lock_excludes_others(lock).await?;
    test_lock_release_with_wrong_token(lock).await?;
    test_lock_refresh(lock).await?;
    test_lock_acquire_with_budget(lock).await?;
    Ok(())
}

async fn test_lock_acquire_and_release(lock: &dyn DistributedLock) -> Result<(), StateError> {
    let name = "conformance-lock-basic";
    let token = lock.try_acquire(name, LEASE).await?;
    let token = token.expect("free lock should be acquired");
    assert!(lock.is_held(name, &token).await?);

    assert!(lock.release(name, &token).await?, "holder should release");
    assert!(!lock.is_held(name, &token).await?);
    assert!(
        !lock.release(name, &token).await?,
        "second release should be refused"
    );
    Ok(())
}

async fn test_lock_excludes_others(lock: &dyn DistributedLock) -> Result<(), StateError> {
    let name = "conformance-lock-exclusive";
    let first = lock
        .try_acquire(name, LEASE)
        .await?
        .expect("free lock should be acquired");
    assert!(
        lock.try_acquire(name, LEASE).await?.is_none(),
        "held lock should not be granted twice"
    );

    lock.release(name, &first).await?;
    let second = lock.try_acquire(name, LEASE).await?;
    assert!(second.is_some(), "released lock should be free");
    assert_ne!(second, Some(first), "tokens should never repeat");
    Ok(())
}

async fn test_lock_release_with_wrong_token(lock: &dyn DistributedLock) -> Result<(), StateError> {
    let name = "conformance-lock-mismatch";
    let holder = lock
        .try_acquire(name, LEASE)
        .await?
        .expect("free lock should be acquired");
    let stranger = turnstile_core::Token::new("conformance-stranger");

    assert!(!lock.release(name, &stranger).await?);
    assert!(!lock.refresh(name, &stranger, LEASE).await?);
    assert!(!lock.is_held(name, &stranger).await?);
    assert!(lock.is_held(name, &holder).await?, "holder is unaffected");
    Ok(())
}

async fn test_lock_refresh(lock: &dyn DistributedLock) -> Result<(), StateError> {
    let name = "conformance-lock-refresh";
    let token = lock
        .try_acquire(name, LEASE)
        .await?
        .expect("free lock should be acquired");
    assert!(lock.refresh(name, &token, LEASE).await?);
    assert!(lock.is_held(name, &token).await?);

    lock.release(name, &token).await?;
    assert!(
        !lock.refresh(name, &token, LEASE).await?,
        "refresh after release should fail"
    );
    Ok(())
}

async fn test_lock_acquire_with_budget(lock: &dyn DistributedLock) -> Result<(), StateError> {
    let name = "conformance-lock-budget";
    let budget = RetryBudget::attempts(2).with_poll_interval(Duration::from_millis(1));

    let token = lock.acquire(name, LEASE, &budget).await?;
    assert!(token.is_some(), "free lock should be acquired first try");

    let blocked = lock.acquire(name, LEASE, &budget).await?;
    assert!(blocked.is_none(), "budget should run out while held");
    Ok(())
}

/// Run the semaphore conformance suite.
///
/// # Errors
///
/// Returns an error if the store cannot be reached.
pub async fn run_semaphore_conformance_tests(semaphore: &Semaphore) -> Result<(), StateError> {
    test_simple_limit(semaphore).await?;
    test_simple_release(semaphore).await?;
    test_fair_limit_and_order(semaphore).await?;
    test_fair_release_and_refresh(semaphore).await?;
    test_fair_with_lock(semaphore).await?;
    Ok(())
}

async fn test_simple_limit(semaphore: &Semaphore) -> Result<(), StateError> {
    let name = "conformance-sem-simple";
    let mut admitted = Vec::new();
    for _ in 0..4 {
        if let Some(token) = semaphore.acquire_simple(name, 3, LOCK_TIMEOUT).await? {
            admitted.push(token);
        }
    }
    assert_eq!(admitted.len(), 3, "limit should cap admissions");
    assert_eq!(semaphore.holders(name).await?, 3, "rejected entry withdrawn");
    Ok(())
}

async fn test_simple_release(semaphore: &Semaphore) -> Result<(), StateError> {
    let name = "conformance-sem-simple-release";
    let token = semaphore
        .acquire_simple(name, 1, LOCK_TIMEOUT)
        .await?
        .expect("empty semaphore should admit");
    assert!(semaphore.acquire_simple(name, 1, LOCK_TIMEOUT).await?.is_none());

    assert!(semaphore.release_simple(name, &token).await?);
    assert!(!semaphore.release_simple(name, &token).await?);
    assert!(semaphore.acquire_simple(name, 1, LOCK_TIMEOUT).await?.is_some());
    Ok(())
}

async fn test_fair_limit_and_order(semaphore: &Semaphore) -> Result<(), StateError> {
    let name = "conformance-sem-fair";
    let first = semaphore
        .acquire_fair(name, 2, LOCK_TIMEOUT)
        .await?
        .expect("first caller should be admitted");
    let _second = semaphore
        .acquire_fair(name, 2, LOCK_TIMEOUT)
        .await?
        .expect("second caller should be admitted");
    assert!(
        semaphore.acquire_fair(name, 2, LOCK_TIMEOUT).await?.is_none(),
        "third caller should wait"
    );

    semaphore.release_fair(name, &first).await?;
    assert!(
        semaphore.acquire_fair(name, 2, LOCK_TIMEOUT).await?.is_some(),
        "a release should make room"
    );
    Ok(())
}

async fn test_fair_release_and_refresh(semaphore: &Semaphore) -> Result<(), StateError> {
    let name = "conformance-sem-fair-refresh";
    let token = semaphore
        .acquire_fair(name, 1, LOCK_TIMEOUT)
        .await?
        .expect("empty semaphore should admit");
    assert!(semaphore.refresh_fair(name, &token).await?);

    assert!(semaphore.release_fair(name, &token).await?);
    assert!(!semaphore.release_fair(name, &token).await?);
    assert!(
        !semaphore.refresh_fair(name, &token).await?,
        "refresh of a released token should fail"
    );
    assert_eq!(
        semaphore.holders(name).await?,
        0,
        "failed refresh leaves nothing behind"
    );
    Ok(())
}

async fn test_fair_with_lock(semaphore: &Semaphore) -> Result<(), StateError> {
    let name = "conformance-sem-locked";
    let token = semaphore
        .acquire_fair_with_lock(name, 1, LOCK_TIMEOUT)
        .await?
        .expect("empty semaphore should admit");
    assert!(
        semaphore
            .acquire_fair_with_lock(name, 1, LOCK_TIMEOUT)
            .await?
            .is_none()
    );

    semaphore.release_fair(name, &token).await?;
    assert!(
        semaphore
            .acquire_fair_with_lock(name, 1, LOCK_TIMEOUT)
            .await?
            .is_some()
    );
    Ok(())
}
