//! Store conformance suite.
//!
//! Every [`Store`] implementation runs [`run_all`] from its own tests. Each
//! check uses a fresh aggregate id, so the suite can share one store with
//! other tests. Checks panic on violation.

use chronicle_core::context::Context;
use chronicle_core::error::{Error, ErrorKind};
use chronicle_core::store::{History, Store};

use crate::{record, record_at, records, unique_aggregate_id};

/// Runs every check against `store`.
pub async fn run_all(store: &dyn Store) {
    save_then_fetch_returns_sorted_history(store).await;
    fetch_of_unknown_aggregate_is_not_found(store).await;
    upper_bound_limits_fetch(store).await;
    duplicate_version_rejects_whole_batch(store).await;
    same_version_with_different_time_is_duplicate(store).await;
    repeated_version_within_batch_is_rejected(store).await;
    empty_batch_is_a_no_op(store).await;
    histories_are_isolated_per_aggregate(store).await;
    cancelled_context_is_refused(store).await;
}

fn versions(history: &History) -> Vec<i64> {
    history.iter().map(|r| r.version).collect()
}

/// Out-of-order saves come back ascending with payloads intact.
pub async fn save_then_fetch_returns_sorted_history(store: &dyn Store) {
    let ctx = Context::background();
    let id = unique_aggregate_id();

    store.save(&ctx, &id, &records([2, 1])).await.expect("first save");
    store.save(&ctx, &id, &records([3])).await.expect("second save");

    let history = store.fetch(&ctx, &id, 0).await.expect("fetch");
    assert_eq!(history, records([1, 2, 3]), "history must be sorted and intact");
}

/// An aggregate with no records is `NotFound`, never an empty history.
pub async fn fetch_of_unknown_aggregate_is_not_found(store: &dyn Store) {
    let result = store
        .fetch(&Context::background(), &unique_aggregate_id(), 0)
        .await;

    match result {
        Err(Error::NotFound(_)) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
}

/// A positive bound excludes later versions; zero means unbounded.
pub async fn upper_bound_limits_fetch(store: &dyn Store) {
    let ctx = Context::background();
    let id = unique_aggregate_id();
    store.save(&ctx, &id, &records(1..=5)).await.expect("save");

    let bounded = store.fetch(&ctx, &id, 3).await.expect("bounded fetch");
    let unbounded = store.fetch(&ctx, &id, 0).await.expect("unbounded fetch");

    assert_eq!(versions(&bounded), vec![1, 2, 3]);
    assert_eq!(versions(&unbounded), vec![1, 2, 3, 4, 5]);
}

/// A batch overlapping stored versions fails and leaves nothing behind.
pub async fn duplicate_version_rejects_whole_batch(store: &dyn Store) {
    let ctx = Context::background();
    let id = unique_aggregate_id();
    store.save(&ctx, &id, &records([1, 2])).await.expect("save");

    let result = store.save(&ctx, &id, &records([2, 3])).await;

    match result {
        Err(err) => assert_eq!(err.kind(), ErrorKind::DuplicateVersion, "{err}"),
        Ok(()) => panic!("expected DuplicateVersion, got Ok"),
    }
    let history = store.fetch(&ctx, &id, 0).await.expect("fetch");
    assert_eq!(versions(&history), vec![1, 2], "rejected batch must not be visible");
}

/// A version is taken once, whatever time the second write carries.
pub async fn same_version_with_different_time_is_duplicate(store: &dyn Store) {
    let ctx = Context::background();
    let id = unique_aggregate_id();
    store.save(&ctx, &id, &[record_at(1, 10)]).await.expect("save");

    let result = store.save(&ctx, &id, &[record_at(1, 11)]).await;

    match result {
        Err(err) => assert_eq!(err.kind(), ErrorKind::DuplicateVersion, "{err}"),
        Ok(()) => panic!("expected DuplicateVersion, got Ok"),
    }
    let history = store.fetch(&ctx, &id, 0).await.expect("fetch");
    assert_eq!(history, vec![record_at(1, 10)], "first write must win");
}

/// The same version twice in one batch is a duplicate.
pub async fn repeated_version_within_batch_is_rejected(store: &dyn Store) {
    let ctx = Context::background();
    let id = unique_aggregate_id();

    let result = store.save(&ctx, &id, &[record(1), record(1)]).await;

    assert_eq!(
        result.map_err(|e| e.kind()),
        Err(ErrorKind::DuplicateVersion)
    );
    assert!(matches!(
        store.fetch(&ctx, &id, 0).await,
        Err(Error::NotFound(_))
    ));
}

/// Saving nothing succeeds and creates nothing.
pub async fn empty_batch_is_a_no_op(store: &dyn Store) {
    let ctx = Context::background();
    let id = unique_aggregate_id();

    store.save(&ctx, &id, &[]).await.expect("empty save");

    assert!(matches!(
        store.fetch(&ctx, &id, 0).await,
        Err(Error::NotFound(_))
    ));
}

/// The same version under two aggregate ids never conflicts.
pub async fn histories_are_isolated_per_aggregate(store: &dyn Store) {
    let ctx = Context::background();
    let first = unique_aggregate_id();
    let second = unique_aggregate_id();

    store.save(&ctx, &first, &records([1])).await.expect("first");
    store.save(&ctx, &second, &records([1, 2])).await.expect("second");

    assert_eq!(versions(&store.fetch(&ctx, &first, 0).await.expect("fetch")), vec![1]);
    assert_eq!(
        versions(&store.fetch(&ctx, &second, 0).await.expect("fetch")),
        vec![1, 2]
    );
}

/// A cancelled context fails both operations with `Cancelled`.
pub async fn cancelled_context_is_refused(store: &dyn Store) {
    let (ctx, handle) = Context::background().with_cancel();
    handle.cancel();
    let id = unique_aggregate_id();

    let saved = store.save(&ctx, &id, &records([1])).await;
    let fetched = store.fetch(&ctx, &id, 0).await;

    assert!(matches!(saved, Err(Error::Cancelled)), "save: {saved:?}");
    assert!(matches!(fetched, Err(Error::Cancelled)), "fetch: {fetched:?}");
}
