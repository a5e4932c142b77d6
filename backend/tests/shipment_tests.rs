//! Driver shipment tests
//!
//! Claims race for a ready order, and a shipment outcome is applied to the
//! shipment and every order in it, or to none of them.

mod common;

use common::Fixture;
use shared::{OrderStatus, Pagination, ShipmentOutcome, ShipmentStatus};
use timber_grain_backend::error::AppError;
use timber_grain_backend::services::shipment::ClaimInput;
use timber_grain_backend::services::ShipmentService;
use timber_grain_backend::store::FaultPoint;

fn claim_note() -> ClaimInput {
    ClaimInput {
        route_hint: Some("Left bank first".to_string()),
        comment: None,
    }
}

#[tokio::test]
async fn test_claim_and_deliver() {
    let fx = Fixture::new().await;
    let shipments = ShipmentService::new(fx.dyn_store());
    let order_id = fx.ready_order().await;

    let detail = shipments
        .claim(&fx.driver, order_id, claim_note())
        .await
        .unwrap();
    assert_eq!(detail.shipment.status, ShipmentStatus::InTransit);
    assert_eq!(detail.shipment.driver_id, fx.driver.user_id);
    assert_eq!(detail.shipment.route_hint.as_deref(), Some("Left bank first"));
    assert!(detail.shipment.started_at.is_some());
    assert_eq!(detail.order_ids, vec![order_id]);

    let order = fx.orders().get(&fx.driver, order_id).await.unwrap().order;
    assert_eq!(order.status, OrderStatus::InTransit);
    assert_eq!(order.driver_id, Some(fx.driver.user_id));

    let resolved = shipments
        .resolve(&fx.driver, detail.shipment.id, ShipmentOutcome::Delivered)
        .await
        .unwrap();
    assert_eq!(resolved.shipment.status, ShipmentStatus::Delivered);
    assert!(resolved.shipment.finished_at.is_some());

    let order = fx.orders().get(&fx.admin, order_id).await.unwrap().order;
    assert_eq!(order.status, OrderStatus::Delivered);
}

#[tokio::test]
async fn test_driver_cancels_shipment() {
    let fx = Fixture::new().await;
    let shipments = ShipmentService::new(fx.dyn_store());
    let order_id = fx.ready_order().await;
    let shipment_id = shipments
        .claim(&fx.driver, order_id, ClaimInput::default())
        .await
        .unwrap()
        .shipment
        .id;

    shipments
        .resolve(&fx.driver, shipment_id, ShipmentOutcome::Cancelled)
        .await
        .unwrap();

    let order = fx.orders().get(&fx.admin, order_id).await.unwrap().order;
    assert_eq!(order.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_claim_requires_ready_order() {
    let fx = Fixture::new().await;
    let order_id = fx
        .orders()
        .create(&fx.admin, fx.pickup(vec![common::line(fx.sofa, 1)]))
        .await
        .unwrap()
        .order
        .id;

    let result = ShipmentService::new(fx.dyn_store())
        .claim(&fx.driver, order_id, ClaimInput::default())
        .await;
    match result {
        Err(AppError::WrongStatus { current, expected, .. }) => {
            assert_eq!(current, "created");
            assert_eq!(expected, "ready_to_ship");
        }
        other => panic!("expected WrongStatus, got {:?}", other),
    }
}

#[tokio::test]
async fn test_concurrent_claims_have_one_winner() {
    let fx = Fixture::new().await;
    let order_id = fx.ready_order().await;

    let mut handles = Vec::new();
    for driver in [fx.driver, fx.other_driver] {
        let shipments = ShipmentService::new(fx.dyn_store());
        handles.push(tokio::spawn(async move {
            shipments.claim(&driver, order_id, ClaimInput::default()).await
        }));
    }

    let mut winners = Vec::new();
    let mut losers = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(detail) => winners.push(detail.shipment.driver_id),
            Err(AppError::AlreadyClaimed(id)) => {
                assert_eq!(id, order_id);
                losers += 1;
            }
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(losers, 1);

    let order = fx.orders().get(&fx.admin, order_id).await.unwrap().order;
    assert_eq!(order.driver_id, Some(winners[0]));

    let all = ShipmentService::new(fx.dyn_store())
        .list(&fx.admin, false, Pagination::default())
        .await
        .unwrap();
    assert_eq!(all.pagination.total_items, 1);
}

#[tokio::test]
async fn test_resolve_only_once_by_owner() {
    let fx = Fixture::new().await;
    let shipments = ShipmentService::new(fx.dyn_store());
    let order_id = fx.ready_order().await;
    let shipment_id = shipments
        .claim(&fx.driver, order_id, ClaimInput::default())
        .await
        .unwrap()
        .shipment
        .id;

    let result = shipments
        .resolve(&fx.other_driver, shipment_id, ShipmentOutcome::Delivered)
        .await;
    assert!(matches!(result, Err(AppError::NotOwner(_))));

    shipments
        .resolve(&fx.driver, shipment_id, ShipmentOutcome::Delivered)
        .await
        .unwrap();

    match shipments
        .resolve(&fx.driver, shipment_id, ShipmentOutcome::Cancelled)
        .await
    {
        Err(AppError::AlreadyResolved { shipment_id: id, status }) => {
            assert_eq!(id, shipment_id);
            assert_eq!(status, ShipmentStatus::Delivered);
        }
        other => panic!("expected AlreadyResolved, got {:?}", other),
    }

    let order = fx.orders().get(&fx.admin, order_id).await.unwrap().order;
    assert_eq!(order.status, OrderStatus::Delivered);
}

#[tokio::test]
async fn test_failed_cascade_changes_nothing() {
    let fx = Fixture::new().await;
    let shipments = ShipmentService::new(fx.dyn_store());
    let first = fx.ready_order().await;
    let second = fx.ready_order().await;

    let shipment_id = shipments
        .claim(&fx.driver, first, ClaimInput::default())
        .await
        .unwrap()
        .shipment
        .id;
    fx.store.attach_to_shipment(shipment_id, second).await.unwrap();
    assert_eq!(
        fx.orders().get(&fx.admin, second).await.unwrap().order.driver_id,
        Some(fx.driver.user_id)
    );
    fx.store
        .inject_fault(FaultPoint::ResolveCascade { after_orders: 1 })
        .await;

    let result = shipments
        .resolve(&fx.driver, shipment_id, ShipmentOutcome::Delivered)
        .await;
    assert!(matches!(result, Err(AppError::Internal(_))));

    let detail = shipments.get(&fx.driver, shipment_id).await.unwrap();
    assert_eq!(detail.shipment.status, ShipmentStatus::InTransit);
    assert!(detail.shipment.finished_at.is_none());
    assert_eq!(detail.order_ids.len(), 2);

    let orders = fx.orders();
    assert_eq!(
        orders.get(&fx.admin, first).await.unwrap().order.status,
        OrderStatus::InTransit
    );
    assert_eq!(
        orders.get(&fx.admin, second).await.unwrap().order.status,
        OrderStatus::InTransit
    );

    // Without the fault the whole shipment resolves
    let resolved = shipments
        .resolve(&fx.driver, shipment_id, ShipmentOutcome::Delivered)
        .await
        .unwrap();
    assert_eq!(resolved.shipment.status, ShipmentStatus::Delivered);
    for order_id in [first, second] {
        assert_eq!(
            orders.get(&fx.admin, order_id).await.unwrap().order.status,
            OrderStatus::Delivered
        );
    }
}

#[tokio::test]
async fn test_shipment_visibility() {
    let fx = Fixture::new().await;
    let shipments = ShipmentService::new(fx.dyn_store());
    let first = fx.ready_order().await;
    let second = fx.ready_order().await;

    let mine = shipments
        .claim(&fx.driver, first, ClaimInput::default())
        .await
        .unwrap()
        .shipment
        .id;
    shipments
        .claim(&fx.other_driver, second, ClaimInput::default())
        .await
        .unwrap();

    assert!(shipments.get(&fx.driver, mine).await.is_ok());
    assert!(shipments.get(&fx.admin, mine).await.is_ok());
    assert!(matches!(
        shipments.get(&fx.other_driver, mine).await,
        Err(AppError::NotOwner(_))
    ));

    let own = shipments
        .list(&fx.driver, false, Pagination::default())
        .await
        .unwrap();
    assert_eq!(own.data.len(), 1);
    assert_eq!(own.data[0].shipment.id, mine);

    shipments
        .resolve(&fx.driver, mine, ShipmentOutcome::Delivered)
        .await
        .unwrap();
    let open = shipments
        .list(&fx.driver, true, Pagination::default())
        .await
        .unwrap();
    assert!(open.data.is_empty());

    let all = shipments
        .list(&fx.admin, false, Pagination::default())
        .await
        .unwrap();
    assert_eq!(all.data.len(), 2);

    let result = shipments
        .list(&fx.worker, false, Pagination::default())
        .await;
    assert!(matches!(result, Err(AppError::Forbidden { .. })));
}

#[tokio::test]
async fn test_only_claimable_orders_join_a_shipment() {
    let fx = Fixture::new().await;
    let shipments = ShipmentService::new(fx.dyn_store());
    let shipment_id = shipments
        .claim(&fx.driver, fx.ready_order().await, ClaimInput::default())
        .await
        .unwrap()
        .shipment
        .id;
    let created = fx
        .orders()
        .create(&fx.admin, fx.pickup(vec![common::line(fx.sofa, 1)]))
        .await
        .unwrap()
        .order
        .id;

    let result = fx.store.attach_to_shipment(shipment_id, created).await;
    assert!(matches!(result, Err(AppError::WrongStatus { .. })));

    shipments
        .resolve(&fx.driver, shipment_id, ShipmentOutcome::Delivered)
        .await
        .unwrap();

    let order = fx.orders().get(&fx.admin, created).await.unwrap().order;
    assert_eq!(order.status, OrderStatus::Created);
    assert_eq!(order.driver_id, None);
    let detail = shipments.get(&fx.driver, shipment_id).await.unwrap();
    assert_eq!(detail.order_ids.len(), 1);
}
