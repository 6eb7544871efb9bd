//! Integration tests for coupon preview against a live cart.

use shoplite_commerce::services::{CartService, CouponService};
use shoplite_commerce::{CommerceError, Identity};
use shoplite_core::DiscountType;
use shoplite_integration_tests::{TestShop, coupon_input};

#[tokio::test]
async fn test_flat_coupon_preview() {
    let shop = TestShop::new().await;
    let product = shop.seed_product("Lamp", "100.00", 10).await;
    shop.seed_coupon(&coupon_input("FLAT15", DiscountType::Flat, "15")).await;

    let view = CartService::new(&shop.pool)
        .add_item(Identity::Guest, None, product.id, 1)
        .await
        .unwrap();
    let token = view.cart_token.unwrap();

    let preview = CouponService::new(&shop.pool)
        .validate_for_cart(Identity::Guest, Some(&token), "FLAT15")
        .await
        .unwrap();
    assert_eq!(preview.subtotal, "100.00".parse().unwrap());
    assert_eq!(preview.discount, "15.00".parse().unwrap());
    assert_eq!(preview.total, "85.00".parse().unwrap());
}

#[tokio::test]
async fn test_percentage_coupon_preview() {
    let shop = TestShop::new().await;
    let product = shop.seed_product("Lamp", "100.00", 10).await;
    shop.seed_coupon(&coupon_input("TEN", DiscountType::Percentage, "10")).await;

    let view = CartService::new(&shop.pool)
        .add_item(Identity::Guest, None, product.id, 1)
        .await
        .unwrap();
    let token = view.cart_token.unwrap();

    let preview = CouponService::new(&shop.pool)
        .validate_for_cart(Identity::Guest, Some(&token), "TEN")
        .await
        .unwrap();
    assert_eq!(preview.discount, "10.00".parse().unwrap());
    assert_eq!(preview.total, "90.00".parse().unwrap());
}

#[tokio::test]
async fn test_coupon_code_lookup_is_case_insensitive() {
    let shop = TestShop::new().await;
    let product = shop.seed_product("Lamp", "100.00", 10).await;
    shop.seed_coupon(&coupon_input("Save10", DiscountType::Flat, "10")).await;

    let view = CartService::new(&shop.pool)
        .add_item(Identity::Guest, None, product.id, 1)
        .await
        .unwrap();
    let token = view.cart_token.unwrap();

    let preview = CouponService::new(&shop.pool)
        .validate_for_cart(Identity::Guest, Some(&token), "sAvE10")
        .await
        .unwrap();
    assert_eq!(preview.code, "Save10");
}

#[tokio::test]
async fn test_unknown_code_is_invalid() {
    let shop = TestShop::new().await;
    let err = CouponService::new(&shop.pool)
        .validate_for_cart(Identity::Guest, None, "NOPE")
        .await
        .unwrap_err();
    assert!(matches!(err, CommerceError::CouponInvalid));
}

#[tokio::test]
async fn test_minimum_cart_value_reason() {
    let shop = TestShop::new().await;
    let product = shop.seed_product("Lamp", "40.00", 10).await;
    let mut input = coupon_input("BIG", DiscountType::Flat, "5");
    input.minimum_cart_value = "50.00".parse().unwrap();
    shop.seed_coupon(&input).await;

    let view = CartService::new(&shop.pool)
        .add_item(Identity::Guest, None, product.id, 1)
        .await
        .unwrap();
    let token = view.cart_token.unwrap();

    let err = CouponService::new(&shop.pool)
        .validate_for_cart(Identity::Guest, Some(&token), "BIG")
        .await
        .unwrap_err();
    match err {
        CommerceError::CouponIneligible(reason) => {
            assert_eq!(reason, "Minimum cart value not met for this coupon.");
        }
        other => panic!("expected CouponIneligible, got {other:?}"),
    }
}

#[tokio::test]
async fn test_product_restriction_respected() {
    let shop = TestShop::new().await;
    let lamp = shop.seed_product("Lamp", "40.00", 10).await;
    let desk = shop.seed_product("Desk", "90.00", 10).await;
    let mut input = coupon_input("DESKONLY", DiscountType::Flat, "5");
    input.applicable_products = vec![desk.id];
    shop.seed_coupon(&input).await;

    let carts = CartService::new(&shop.pool);
    let coupons = CouponService::new(&shop.pool);

    let view = carts.add_item(Identity::Guest, None, lamp.id, 1).await.unwrap();
    let token = view.cart_token.unwrap();
    let err = coupons
        .validate_for_cart(Identity::Guest, Some(&token), "DESKONLY")
        .await
        .unwrap_err();
    match err {
        CommerceError::CouponIneligible(reason) => {
            assert_eq!(reason, "Coupon is not applicable to items in your cart.");
        }
        other => panic!("expected CouponIneligible, got {other:?}"),
    }

    // One matching product in the cart is enough.
    carts
        .add_item(Identity::Guest, Some(&token), desk.id, 1)
        .await
        .unwrap();
    assert!(
        coupons
            .validate_for_cart(Identity::Guest, Some(&token), "DESKONLY")
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_disabled_coupon_reason() {
    let shop = TestShop::new().await;
    let product = shop.seed_product("Lamp", "40.00", 10).await;
    let mut input = coupon_input("OFF", DiscountType::Flat, "5");
    input.is_enabled = false;
    shop.seed_coupon(&input).await;

    let view = CartService::new(&shop.pool)
        .add_item(Identity::Guest, None, product.id, 1)
        .await
        .unwrap();
    let token = view.cart_token.unwrap();

    let err = CouponService::new(&shop.pool)
        .validate_for_cart(Identity::Guest, Some(&token), "OFF")
        .await
        .unwrap_err();
    match err {
        CommerceError::CouponIneligible(reason) => {
            assert_eq!(reason, "Coupon is expired or disabled.");
        }
        other => panic!("expected CouponIneligible, got {other:?}"),
    }
}

#[tokio::test]
async fn test_duplicate_code_rejected() {
    let shop = TestShop::new().await;
    shop.seed_coupon(&coupon_input("DUP", DiscountType::Flat, "5")).await;

    let err = CouponService::new(&shop.pool)
        .create(&coupon_input("dup", DiscountType::Flat, "7"))
        .await
        .unwrap_err();
    assert!(matches!(err, CommerceError::Conflict(_)));
}
