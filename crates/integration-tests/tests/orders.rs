//! Integration tests for order lookup and status management.

use shoplite_commerce::models::{NewOrder, Order, User};
use shoplite_commerce::services::{CartService, CheckoutService, NotificationKind, OrderService};
use shoplite_commerce::{CommerceError, Identity};
use shoplite_core::OrderStatus;
use shoplite_integration_tests::{RecordingSink, TestShop};

/// Cart two mugs for `user` and check out, returning the new order.
async fn place_order(shop: &TestShop, user: &User) -> Order {
    let product = shop.seed_product("Mug", "10.00", 5).await;
    CartService::new(&shop.pool)
        .add_item(Identity::User(user.id), None, product.id, 2)
        .await
        .unwrap();
    let sink = RecordingSink::new();
    CheckoutService::new(&shop.pool, &shop.config, &sink)
        .checkout(Identity::User(user.id), None, &NewOrder::default())
        .await
        .unwrap()
        .order
}

#[tokio::test]
async fn test_ship_pending_order_notifies_owner() {
    let shop = TestShop::new().await;
    let user = shop.seed_user("ana", "ana@example.com").await;
    let order = place_order(&shop, &user).await;
    let sink = RecordingSink::new();
    let orders = OrderService::new(&shop.pool, &shop.config, &sink);

    let updated = orders.update_status(order.id, OrderStatus::Shipped).await.unwrap();
    assert_eq!(updated.status, OrderStatus::Shipped);

    let sent = sink.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::OrderStatusChanged);
    assert_eq!(sent[0].recipient.as_str(), "ana@example.com");
    assert!(sent[0].subject.contains("status updated to shipped"));
}

#[tokio::test]
async fn test_cancel_pending_order() {
    let shop = TestShop::new().await;
    let user = shop.seed_user("ana", "ana@example.com").await;
    let order = place_order(&shop, &user).await;
    let sink = RecordingSink::new();
    let orders = OrderService::new(&shop.pool, &shop.config, &sink);

    let updated = orders.update_status(order.id, OrderStatus::Cancelled).await.unwrap();
    assert_eq!(updated.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_shipped_order_cannot_be_cancelled() {
    let shop = TestShop::new().await;
    let user = shop.seed_user("ana", "ana@example.com").await;
    let order = place_order(&shop, &user).await;
    let sink = RecordingSink::new();
    let orders = OrderService::new(&shop.pool, &shop.config, &sink);

    orders.update_status(order.id, OrderStatus::Shipped).await.unwrap();
    let err = orders
        .update_status(order.id, OrderStatus::Cancelled)
        .await
        .unwrap_err();
    match err {
        CommerceError::Validation(msg) => {
            assert_eq!(msg, "Cannot change status from shipped to cancelled.");
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_same_status_is_a_silent_no_op() {
    let shop = TestShop::new().await;
    let user = shop.seed_user("ana", "ana@example.com").await;
    let order = place_order(&shop, &user).await;
    let sink = RecordingSink::new();
    let orders = OrderService::new(&shop.pool, &shop.config, &sink);

    let updated = orders.update_status(order.id, OrderStatus::Pending).await.unwrap();
    assert_eq!(updated.status, OrderStatus::Pending);
    assert_eq!(sink.count(), 0);
}

#[tokio::test]
async fn test_order_listing_filters_by_status() {
    let shop = TestShop::new().await;
    let ana = shop.seed_user("ana", "ana@example.com").await;
    let ben = shop.seed_user("ben", "ben@example.com").await;
    let first = place_order(&shop, &ana).await;
    let second = place_order(&shop, &ben).await;
    let sink = RecordingSink::new();
    let orders = OrderService::new(&shop.pool, &shop.config, &sink);

    orders.update_status(second.id, OrderStatus::Shipped).await.unwrap();

    let all = orders.list_all(None).await.unwrap();
    assert_eq!(all.len(), 2);
    let shipped = orders.list_all(Some(OrderStatus::Shipped)).await.unwrap();
    assert_eq!(shipped.len(), 1);
    assert_eq!(shipped[0].id, second.id);
    let pending = orders.list_all(Some(OrderStatus::Pending)).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, first.id);
}

#[tokio::test]
async fn test_order_lookup_is_scoped_to_its_owner() {
    let shop = TestShop::new().await;
    let ana = shop.seed_user("ana", "ana@example.com").await;
    let ben = shop.seed_user("ben", "ben@example.com").await;
    let order = place_order(&shop, &ana).await;
    let sink = RecordingSink::new();
    let orders = OrderService::new(&shop.pool, &shop.config, &sink);

    let detail = orders.get_for_user(ana.id, order.id).await.unwrap();
    assert_eq!(detail.order.id, order.id);
    assert_eq!(detail.items.len(), 1);

    let err = orders.get_for_user(ben.id, order.id).await.unwrap_err();
    assert!(matches!(err, CommerceError::NotFound(_)));

    let listed = orders.list_for_user(ana.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(orders.list_for_user(ben.id).await.unwrap().is_empty());
}
