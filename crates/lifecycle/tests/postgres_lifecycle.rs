//! Lifecycle services against PostgreSQL row locks.
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p lifecycle --test postgres_lifecycle -- --test-threads=1
//! ```

use std::sync::Arc;

use common::{Money, OrderId, UserId};
use domain::{
    CartLine, InventoryError, OrderError, OrderState, PaymentStatus, ProductStock, Role,
    RoleDirectory, Stall,
};
use lifecycle::{
    CheckoutReceipt, CheckoutRequest, CheckoutService, DeliveryService, LedgerOutcome,
    LifecycleError, PaymentLedger, PaymentNotification, PreparationService,
};
use serde_json::json;
use serial_test::serial;
use sqlx::PgPool;
use store::{PostgresStore, Store};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_marketplace_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

struct PgHarness {
    store: PostgresStore,
    authz: RoleDirectory,
    checkout: CheckoutService<PostgresStore>,
    preparation: PreparationService<PostgresStore>,
    ledger: PaymentLedger<PostgresStore>,
    delivery: DeliveryService<PostgresStore>,
    client: UserId,
    vendor: UserId,
    stall: Stall,
}

impl PgHarness {
    /// Fresh pool over cleared tables, with one vendor stall.
    async fn new() -> Self {
        let info = get_container_info().await;

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(&info.connection_string)
            .await
            .unwrap();

        sqlx::query(
            "TRUNCATE TABLE payment_events, payments, order_line_items, orders, products, stalls",
        )
        .execute(&pool)
        .await
        .unwrap();

        let store = PostgresStore::new(pool);
        let authz = RoleDirectory::new();
        let client = authz.user_with(Role::Client);
        let vendor = authz.user_with(Role::Vendor);
        let stall = Stall::new(vendor, "Harbour stall");
        store.put_stall(&stall).await.unwrap();

        Self {
            checkout: CheckoutService::new(store.clone()),
            preparation: PreparationService::new(store.clone()),
            ledger: PaymentLedger::new(store.clone()),
            delivery: DeliveryService::new(store.clone()),
            store,
            authz,
            client,
            vendor,
            stall,
        }
    }

    async fn product(&self, stock: u32, cents: i64) -> ProductStock {
        let product = ProductStock::new(self.stall.id, "Mussels", Money::from_cents(cents), stock);
        self.store.put_product(&product).await.unwrap();
        product
    }

    async fn stock_of(&self, product: &ProductStock) -> u32 {
        self.store
            .get_product(product.id)
            .await
            .unwrap()
            .unwrap()
            .stock
    }

    async fn count(&self, table: &str) -> i64 {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(self.store.pool())
            .await
            .unwrap();
        count
    }

    async fn place(
        &self,
        product: &ProductStock,
        quantity: u32,
    ) -> lifecycle::Result<CheckoutReceipt> {
        self.checkout
            .checkout(
                self.client,
                &self.authz,
                CheckoutRequest::new(vec![CartLine::new(product.id, quantity)]),
            )
            .await
    }

    async fn notify(&self, order_id: OrderId, reference: &str) -> LedgerOutcome {
        let notification = PaymentNotification::from_payload(
            "mercadopago",
            json!({
                "id": reference,
                "external_reference": order_id.to_string(),
                "status": "approved",
            }),
        )
        .unwrap();
        self.ledger.record_payment_event(notification).await.unwrap()
    }
}

#[tokio::test]
#[serial]
async fn checkout_commits_order_payment_and_stock() {
    let h = PgHarness::new().await;
    let product = h.product(5, 200).await;

    let receipt = h.place(&product, 2).await.unwrap();

    assert_eq!(h.stock_of(&product).await, 3);
    let stored = h.store.get_order(receipt.order.id()).await.unwrap().unwrap();
    assert_eq!(stored.total(), Money::from_cents(400));
    let payments = h.store.payments_for_order(receipt.order.id()).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Pending);
    assert_eq!(payments[0].amount, Money::from_cents(400));
}

#[tokio::test]
#[serial]
async fn failed_checkout_rolls_back_every_write() {
    let h = PgHarness::new().await;
    let plenty = h.product(10, 100).await;
    let scarce = h.product(1, 100).await;

    let err = h
        .checkout
        .checkout(
            h.client,
            &h.authz,
            CheckoutRequest::new(vec![
                CartLine::new(plenty.id, 3),
                CartLine::new(scarce.id, 2),
            ]),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LifecycleError::Inventory(InventoryError::InsufficientStock { index: 1, .. })
    ));
    assert_eq!(h.stock_of(&plenty).await, 10);
    assert_eq!(h.stock_of(&scarce).await, 1);
    assert_eq!(h.count("orders").await, 0);
    assert_eq!(h.count("order_line_items").await, 0);
    assert_eq!(h.count("payments").await, 0);
}

#[tokio::test]
#[serial]
async fn concurrent_checkouts_cannot_oversell() {
    let h = PgHarness::new().await;
    let product = h.product(5, 100).await;

    let (a, b) = tokio::join!(h.place(&product, 3), h.place(&product, 3));

    assert_eq!([&a, &b].iter().filter(|r| r.is_ok()).count(), 1);
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(
        loser,
        Err(LifecycleError::Inventory(InventoryError::InsufficientStock {
            available: 2,
            requested: 3,
            ..
        }))
    ));
    assert_eq!(h.stock_of(&product).await, 2);
    assert_eq!(h.count("orders").await, 1);
}

#[tokio::test]
#[serial]
async fn replayed_notifications_record_one_payment_and_event() {
    let h = PgHarness::new().await;
    let product = h.product(5, 200).await;
    let receipt = h.place(&product, 1).await.unwrap();
    let order_id = receipt.order.id();

    let first = h.notify(order_id, "mp-pg").await;
    assert!(matches!(first, LedgerOutcome::Recorded { order_confirmed: true, .. }));

    for _ in 0..4 {
        assert_eq!(h.notify(order_id, "mp-pg").await, LedgerOutcome::Duplicate);
    }

    assert_eq!(h.count("payments").await, 1);
    assert_eq!(h.count("payment_events").await, 1);

    let order = h.store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.state(), OrderState::Confirmed);
    let payment = h
        .store
        .find_payment("mercadopago", "mp-pg")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.id, receipt.payment.id);
    assert_eq!(payment.status, PaymentStatus::Success);
}

#[tokio::test]
#[serial]
async fn concurrent_replays_record_once() {
    let h = PgHarness::new().await;
    let product = h.product(5, 200).await;
    let receipt = h.place(&product, 1).await.unwrap();
    let order_id = receipt.order.id();

    let (a, b, c) = tokio::join!(
        h.notify(order_id, "mp-race"),
        h.notify(order_id, "mp-race"),
        h.notify(order_id, "mp-race"),
    );

    let recorded = [a, b, c]
        .iter()
        .filter(|o| matches!(o, LedgerOutcome::Recorded { .. }))
        .count();
    assert_eq!(recorded, 1);
    assert_eq!(h.count("payments").await, 1);
    assert_eq!(h.count("payment_events").await, 1);
}

#[tokio::test]
#[serial]
async fn concurrent_claims_have_exactly_one_winner() {
    let h = PgHarness::new().await;
    let product = h.product(5, 200).await;
    let receipt = h.place(&product, 1).await.unwrap();
    let order_id = receipt.order.id();

    h.notify(order_id, "mp-ready").await;
    h.preparation
        .start_preparation(h.vendor, &h.authz, order_id)
        .await
        .unwrap();
    h.preparation
        .mark_ready(h.vendor, &h.authz, order_id)
        .await
        .unwrap();

    let first = h.authz.user_with(Role::Courier);
    let second = h.authz.user_with(Role::Courier);
    let (a, b) = tokio::join!(
        h.delivery.claim(first, &h.authz, order_id),
        h.delivery.claim(second, &h.authz, order_id),
    );

    assert_eq!([&a, &b].iter().filter(|r| r.is_ok()).count(), 1);
    let (winner, loser) = match (a, b) {
        (Ok(order), Err(e)) | (Err(e), Ok(order)) => (order, e),
        _ => unreachable!(),
    };
    assert!(matches!(
        loser,
        LifecycleError::Order(
            OrderError::AlreadyAssigned | OrderError::InvalidStateForClaim { .. }
        )
    ));

    let stored = h.store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(stored.state(), OrderState::InRoute);
    assert_eq!(stored.courier_id(), winner.courier_id());
    assert!(stored.courier_id() == Some(first) || stored.courier_id() == Some(second));
}
