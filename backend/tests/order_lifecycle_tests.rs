//! Order lifecycle tests
//!
//! Status progression, ownership of production, scoping of reads and the
//! price snapshot, exercised through the services over the in-memory store.

mod common;

use proptest::prelude::*;
use uuid::Uuid;

use common::{dec, line, Fixture};
use shared::{Actor, OrderStatus, Pagination, Role, ShipmentOutcome};
use timber_grain_backend::error::AppError;
use timber_grain_backend::services::shipment::ClaimInput;
use timber_grain_backend::services::ShipmentService;

// ============================================================================
// Production
// ============================================================================

#[tokio::test]
async fn test_new_order_starts_created_with_snapshot_prices() {
    let fx = Fixture::new().await;
    let detail = fx
        .orders()
        .create(&fx.manager, fx.pickup(vec![line(fx.sofa, 2), line(fx.armchair, 1)]))
        .await
        .unwrap();

    assert_eq!(detail.order.status, OrderStatus::Created);
    assert_eq!(detail.order.created_by, Some(fx.manager.user_id));
    assert_eq!(detail.order.total_amount, dec("2850.50"));
    assert_eq!(detail.items.len(), 2);
    assert_eq!(detail.items[0].unit_price, dec("1200.00"));
    assert_eq!(detail.items[0].line_total, dec("2400.00"));
}

#[tokio::test]
async fn test_worker_takes_and_marks_ready() {
    let fx = Fixture::new().await;
    let orders = fx.orders();
    let order_id = orders
        .create(&fx.admin, fx.pickup(vec![line(fx.sofa, 1)]))
        .await
        .unwrap()
        .order
        .id;

    let taken = orders.take(&fx.worker, order_id).await.unwrap();
    assert_eq!(taken.status, OrderStatus::InProduction);
    assert_eq!(taken.factory_worker_id, Some(fx.worker.user_id));

    let ready = orders.mark_ready(&fx.worker, order_id).await.unwrap();
    assert_eq!(ready.status, OrderStatus::ReadyToShip);
}

#[tokio::test]
async fn test_other_worker_cannot_mark_ready() {
    let fx = Fixture::new().await;
    let orders = fx.orders();
    let order_id = orders
        .create(&fx.admin, fx.pickup(vec![line(fx.sofa, 1)]))
        .await
        .unwrap()
        .order
        .id;
    orders.take(&fx.worker, order_id).await.unwrap();

    let result = orders.mark_ready(&fx.other_worker, order_id).await;
    assert!(matches!(result, Err(AppError::NotOwner(_))));

    let order = orders.get(&fx.admin, order_id).await.unwrap().order;
    assert_eq!(order.status, OrderStatus::InProduction);
    assert_eq!(order.factory_worker_id, Some(fx.worker.user_id));
}

#[tokio::test]
async fn test_take_requires_created_status() {
    let fx = Fixture::new().await;
    let orders = fx.orders();
    let order_id = orders
        .create(&fx.admin, fx.pickup(vec![line(fx.sofa, 1)]))
        .await
        .unwrap()
        .order
        .id;
    orders.take(&fx.worker, order_id).await.unwrap();

    match orders.take(&fx.other_worker, order_id).await {
        Err(AppError::WrongStatus { current, expected, .. }) => {
            assert_eq!(current, "in_production");
            assert_eq!(expected, "created");
        }
        other => panic!("expected WrongStatus, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_order_is_not_found() {
    let fx = Fixture::new().await;
    let result = fx.orders().take(&fx.worker, Uuid::new_v4()).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

// ============================================================================
// Role filter
// ============================================================================

#[tokio::test]
async fn test_roles_outside_the_table_are_forbidden() {
    let fx = Fixture::new().await;
    let orders = fx.orders();

    let result = orders.create(&fx.driver, fx.pickup(vec![line(fx.sofa, 1)])).await;
    assert!(matches!(result, Err(AppError::Forbidden { role: Role::Driver, .. })));

    let result = orders.create(&fx.customer, fx.pickup(vec![line(fx.sofa, 1)])).await;
    assert!(matches!(result, Err(AppError::Forbidden { .. })));

    let order_id = fx.ready_order().await;
    let result = orders.take(&fx.manager, order_id).await;
    assert!(matches!(result, Err(AppError::Forbidden { .. })));

    let shipments = ShipmentService::new(fx.dyn_store());
    let result = shipments
        .claim(&fx.worker, order_id, ClaimInput::default())
        .await;
    assert!(matches!(result, Err(AppError::Forbidden { .. })));

    // Nothing changed
    let order = orders.get(&fx.admin, order_id).await.unwrap().order;
    assert_eq!(order.status, OrderStatus::ReadyToShip);
    assert_eq!(order.driver_id, None);
}

#[tokio::test]
async fn test_manager_only_orders_for_managed_shop() {
    let fx = Fixture::new().await;
    let other_shop = Uuid::new_v4();
    fx.store.seed_shop(other_shop).await;

    let mut input = fx.pickup(vec![line(fx.sofa, 1)]);
    input.shop_id = Some(other_shop);
    let result = fx.orders().create(&fx.manager, input).await;
    assert!(matches!(result, Err(AppError::NotOwner(_))));
}

#[tokio::test]
async fn test_invalid_delivery_target_rejected() {
    let fx = Fixture::new().await;
    let mut input = fx.pickup(vec![line(fx.sofa, 1)]);
    input.shop_id = None;

    match fx.orders().create(&fx.admin, input).await {
        Err(AppError::Validation { field, .. }) => assert_eq!(field, "shop_id"),
        other => panic!("expected Validation, got {:?}", other),
    }
    assert_eq!(fx.store.order_count().await, 0);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_from_any_non_terminal_state() {
    let fx = Fixture::new().await;
    let orders = fx.orders();

    let created = orders
        .create(&fx.manager, fx.pickup(vec![line(fx.sofa, 1)]))
        .await
        .unwrap()
        .order
        .id;
    assert_eq!(
        orders.cancel(&fx.manager, created).await.unwrap().status,
        OrderStatus::Cancelled
    );

    let ready = fx.ready_order().await;
    assert_eq!(
        orders.cancel(&fx.admin, ready).await.unwrap().status,
        OrderStatus::Cancelled
    );

    // Terminal orders stay terminal
    let result = orders.cancel(&fx.admin, ready).await;
    assert!(matches!(result, Err(AppError::WrongStatus { .. })));
}

#[tokio::test]
async fn test_cancel_in_transit_cancels_shipment() {
    let fx = Fixture::new().await;
    let order_id = fx.ready_order().await;
    let shipments = ShipmentService::new(fx.dyn_store());
    let shipment = shipments
        .claim(&fx.driver, order_id, ClaimInput::default())
        .await
        .unwrap();

    fx.orders().cancel(&fx.admin, order_id).await.unwrap();

    let shipment = shipments.get(&fx.driver, shipment.shipment.id).await.unwrap();
    assert_eq!(shipment.shipment.status, shared::ShipmentStatus::Cancelled);
    assert!(shipment.shipment.finished_at.is_some());
}

#[tokio::test]
async fn test_manager_cannot_cancel_foreign_order() {
    let fx = Fixture::new().await;
    let other_manager = Actor::new(Uuid::new_v4(), Role::Manager);
    let order_id = fx.ready_order().await;

    let result = fx.orders().cancel(&other_manager, order_id).await;
    assert!(matches!(result, Err(AppError::NotOwner(_))));
}

// ============================================================================
// Scoping
// ============================================================================

#[tokio::test]
async fn test_order_visibility_by_role() {
    let fx = Fixture::new().await;
    let orders = fx.orders();
    let order_id = orders
        .create(&fx.admin, fx.home_delivery(vec![line(fx.armchair, 1)]))
        .await
        .unwrap()
        .order
        .id;

    // The production queue is visible to every worker
    assert!(orders.get(&fx.worker, order_id).await.is_ok());
    // Not yet ready, so not in the delivery queue
    assert!(matches!(
        orders.get(&fx.driver, order_id).await,
        Err(AppError::NotFound(_))
    ));
    // Home delivery without a shop is outside the manager's shops
    assert!(matches!(
        orders.get(&fx.manager, order_id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        orders.get(&fx.customer, order_id).await,
        Err(AppError::NotFound(_))
    ));

    orders.take(&fx.worker, order_id).await.unwrap();
    assert!(orders.get(&fx.worker, order_id).await.is_ok());
    assert!(matches!(
        orders.get(&fx.other_worker, order_id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_list_filters_by_scope_and_status() {
    let fx = Fixture::new().await;
    let orders = fx.orders();
    let ready = fx.ready_order().await;
    orders
        .create(&fx.admin, fx.pickup(vec![line(fx.sofa, 1)]))
        .await
        .unwrap();

    let all = orders
        .list(&fx.admin, None, Pagination::default())
        .await
        .unwrap();
    assert_eq!(all.pagination.total_items, 2);

    let queue = orders
        .list(&fx.driver, None, Pagination::default())
        .await
        .unwrap();
    assert_eq!(queue.data.len(), 1);
    assert_eq!(queue.data[0].id, ready);

    let created = orders
        .list(&fx.manager, Some(OrderStatus::Created), Pagination::default())
        .await
        .unwrap();
    assert_eq!(created.data.len(), 1);
    assert_eq!(created.data[0].status, OrderStatus::Created);
}

// ============================================================================
// Price snapshot
// ============================================================================

#[tokio::test]
async fn test_price_change_leaves_existing_items_alone() {
    let fx = Fixture::new().await;
    let orders = fx.orders();
    let before = orders
        .create(&fx.admin, fx.pickup(vec![line(fx.sofa, 3)]))
        .await
        .unwrap();

    fx.store.set_variant_price(fx.sofa, dec("1999.99")).await;

    let stored = orders.get(&fx.admin, before.order.id).await.unwrap();
    assert_eq!(stored.items[0].unit_price, dec("1200.00"));
    assert_eq!(stored.items[0].line_total, dec("3600.00"));
    assert_eq!(stored.order.total_amount, dec("3600.00"));

    let after = orders
        .create(&fx.admin, fx.pickup(vec![line(fx.sofa, 1)]))
        .await
        .unwrap();
    assert_eq!(after.items[0].unit_price, dec("1999.99"));
}

#[tokio::test]
async fn test_inactive_variant_cannot_be_ordered() {
    let fx = Fixture::new().await;
    fx.store.set_variant_active(fx.armchair, false).await;

    let result = fx
        .orders()
        .create(&fx.admin, fx.pickup(vec![line(fx.armchair, 1)]))
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

// ============================================================================
// Monotonicity
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Step {
    Take,
    TakeByOther,
    MarkReady,
    MarkReadyByOther,
    Claim,
    Deliver,
    ResolveCancelled,
    Cancel,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Take),
        Just(Step::TakeByOther),
        Just(Step::MarkReady),
        Just(Step::MarkReadyByOther),
        Just(Step::Claim),
        Just(Step::Deliver),
        Just(Step::ResolveCancelled),
        Just(Step::Cancel),
    ]
}

async fn apply(fx: &Fixture, order_id: Uuid, shipment_id: &mut Option<Uuid>, step: Step) {
    let orders = fx.orders();
    let shipments = ShipmentService::new(fx.dyn_store());
    // Rejected steps are expected; only the observed statuses matter
    match step {
        Step::Take => {
            let _ = orders.take(&fx.worker, order_id).await;
        }
        Step::TakeByOther => {
            let _ = orders.take(&fx.other_worker, order_id).await;
        }
        Step::MarkReady => {
            let _ = orders.mark_ready(&fx.worker, order_id).await;
        }
        Step::MarkReadyByOther => {
            let _ = orders.mark_ready(&fx.other_worker, order_id).await;
        }
        Step::Claim => {
            if let Ok(detail) = shipments.claim(&fx.driver, order_id, ClaimInput::default()).await {
                *shipment_id = Some(detail.shipment.id);
            }
        }
        Step::Deliver | Step::ResolveCancelled => {
            if let Some(id) = *shipment_id {
                let outcome = match step {
                    Step::Deliver => ShipmentOutcome::Delivered,
                    _ => ShipmentOutcome::Cancelled,
                };
                let _ = shipments.resolve(&fx.driver, id, outcome).await;
            }
        }
        Step::Cancel => {
            let _ = orders.cancel(&fx.admin, order_id).await;
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Observed statuses only ever move one step right, or to cancelled
    #[test]
    fn prop_status_never_moves_backwards(steps in proptest::collection::vec(step_strategy(), 1..16)) {
        let history = tokio_test::block_on(async {
            let fx = Fixture::new().await;
            let order_id = fx
                .orders()
                .create(&fx.admin, fx.pickup(vec![line(fx.sofa, 1)]))
                .await
                .unwrap()
                .order
                .id;

            let mut shipment_id = None;
            let mut history = vec![OrderStatus::Created];
            for step in steps {
                apply(&fx, order_id, &mut shipment_id, step).await;
                let status = fx.orders().get(&fx.admin, order_id).await.unwrap().order.status;
                history.push(status);
            }
            history
        });

        for pair in history.windows(2) {
            let (before, after) = (pair[0], pair[1]);
            prop_assert!(
                before == after || before.can_advance_to(after),
                "illegal transition {} -> {}",
                before,
                after
            );
        }
    }
}
