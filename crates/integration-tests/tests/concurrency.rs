//! Concurrency tests: competing checkouts and cart mutations must
//! serialize on the storage layer without losing updates.

use shoplite_commerce::db::{CouponRepository, ProductRepository};
use shoplite_commerce::services::{CartService, CheckoutService};
use shoplite_commerce::{CommerceError, Identity};
use shoplite_core::DiscountType;
use shoplite_integration_tests::{RecordingSink, TestShop, coupon_input};

#[tokio::test]
async fn test_two_checkouts_race_for_last_unit() {
    let shop = TestShop::new().await;
    let ana = shop.seed_user("ana", "ana@example.com").await;
    let ben = shop.seed_user("ben", "ben@example.com").await;
    let product = shop.seed_product("Rare", "99.00", 1).await;
    let sink = RecordingSink::new();
    let carts = CartService::new(&shop.pool);

    // Both carts hold the single unit before either checks out.
    carts.add_item(Identity::User(ana.id), None, product.id, 1).await.unwrap();
    carts.add_item(Identity::User(ben.id), None, product.id, 1).await.unwrap();

    let service = CheckoutService::new(&shop.pool, &shop.config, &sink);
    let input = shoplite_commerce::models::NewOrder::default();
    let (first, second) = tokio::join!(
        service.checkout(Identity::User(ana.id), None, &input),
        service.checkout(Identity::User(ben.id), None, &input),
    );

    let successes = [&first, &second].into_iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    let failure = [first, second].into_iter().find(Result::is_err).unwrap();
    assert!(matches!(failure.unwrap_err(), CommerceError::InsufficientStock(_)));

    let product = ProductRepository::new(&shop.pool).get(product.id).await.unwrap().unwrap();
    assert_eq!(product.stock_quantity, 0);
}

#[tokio::test]
async fn test_coupon_counter_survives_concurrent_checkouts() {
    let shop = TestShop::new().await;
    let product = shop.seed_product("Mug", "10.00", 100).await;
    let coupon = shop.seed_coupon(&coupon_input("SHARED", DiscountType::Flat, "1")).await;
    let sink = RecordingSink::new();
    let carts = CartService::new(&shop.pool);

    let mut users = Vec::new();
    for i in 0..4 {
        let user = shop
            .seed_user(&format!("user{i}"), &format!("user{i}@example.com"))
            .await;
        carts.add_item(Identity::User(user.id), None, product.id, 1).await.unwrap();
        users.push(user);
    }

    let service = CheckoutService::new(&shop.pool, &shop.config, &sink);
    let input = shoplite_commerce::models::NewOrder {
        coupon_code: Some("SHARED".to_owned()),
        ..Default::default()
    };
    let results = tokio::join!(
        service.checkout(Identity::User(users[0].id), None, &input),
        service.checkout(Identity::User(users[1].id), None, &input),
        service.checkout(Identity::User(users[2].id), None, &input),
        service.checkout(Identity::User(users[3].id), None, &input),
    );

    let successes = [&results.0, &results.1, &results.2, &results.3]
        .into_iter()
        .filter(|r| r.is_ok())
        .count();

    let coupon = CouponRepository::new(&shop.pool).get(coupon.id).await.unwrap().unwrap();
    assert_eq!(coupon.times_used, i64::try_from(successes).unwrap());
    assert_eq!(successes, 4);
}

#[tokio::test]
async fn test_concurrent_adds_never_duplicate_the_line() {
    let shop = TestShop::new().await;
    let product = shop.seed_product("Mug", "10.00", 10).await;
    let carts = CartService::new(&shop.pool);

    let view = carts.add_item(Identity::Guest, None, product.id, 1).await.unwrap();
    let token = view.cart_token.unwrap();

    let (a, b) = tokio::join!(
        carts.add_item(Identity::Guest, Some(&token), product.id, 1),
        carts.add_item(Identity::Guest, Some(&token), product.id, 1),
    );
    a.unwrap();
    b.unwrap();

    let view = carts.current(Identity::Guest, Some(&token)).await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 3);
}
