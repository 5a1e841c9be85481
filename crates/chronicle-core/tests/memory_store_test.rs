//! The in-memory store against the shared store conformance suite.

use chronicle_core::store::InMemoryStore;
use chronicle_test_support::conformance;

#[tokio::test]
async fn test_in_memory_store_conforms() {
    let store = InMemoryStore::new();

    conformance::run_all(&store).await;
}
