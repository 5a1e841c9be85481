//! A repository persisting through the SQL store.

use std::sync::Arc;

use chronicle_core::aggregate::Aggregate;
use chronicle_core::context::Context;
use chronicle_core::epoch::EpochMillis;
use chronicle_core::event::Model;
use chronicle_core::repository::Repository;
use chronicle_core::{event_set, impl_event};
use chronicle_sql::{SqlStore, create_schema};
use serde::{Deserialize, Serialize};
use sqlx::Row;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Opened {
    model: Model,
    owner: String,
}

impl_event!(Opened, model = model);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Deposited {
    model: Model,
    amount: u64,
}

impl_event!(Deposited, model = model);

event_set! {
    #[derive(Debug, Clone, PartialEq)]
    enum AccountEvent {
        Opened(Opened),
        Deposited(Deposited),
    }
}

#[derive(Debug, Default)]
struct Account {
    owner: String,
    balance: u64,
}

impl Aggregate for Account {
    type Event = AccountEvent;

    fn apply(&mut self, event: &AccountEvent) -> bool {
        match event {
            AccountEvent::Opened(e) => self.owner.clone_from(&e.owner),
            AccountEvent::Deposited(e) => self.balance += e.amount,
        }
        true
    }
}

#[tokio::test]
async fn test_account_round_trips_through_sqlite() {
    // Arrange
    let store = SqlStore::connect("sqlite::memory:", "account_events").await.unwrap();
    create_schema(store.pool(), store.table(), store.dialect())
        .await
        .unwrap();
    let pool = store.pool().clone();
    let mut repository = Repository::<Account>::new(Arc::new(store));
    repository.bind(AccountEvent::bindings()).unwrap();
    let ctx = Context::background();

    // Act
    repository
        .save(
            &ctx,
            &[
                Opened {
                    model: Model::new("acc-1", 1, EpochMillis(10)),
                    owner: "jo".into(),
                }
                .into(),
                Deposited {
                    model: Model::new("acc-1", 2, EpochMillis(20)),
                    amount: 30,
                }
                .into(),
            ],
        )
        .await
        .unwrap();
    let account = repository.load(&ctx, "acc-1").await.unwrap();

    // Assert
    assert_eq!(account.owner, "jo");
    assert_eq!(account.balance, 30);
    let row = sqlx::query("SELECT payload FROM account_events WHERE version = 2")
        .fetch_one(&pool)
        .await
        .unwrap();
    let payload: Vec<u8> = row.get("payload");
    let envelope: serde_json::Value = serde_json::from_slice(&payload).unwrap();
    assert_eq!(envelope["t"], "Deposited");
    assert_eq!(envelope["d"]["amount"], 30);
}
