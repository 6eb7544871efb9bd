//! Integration tests for registration, verification, and email change.

use chrono::{Duration, Utc};
use shoplite_commerce::db::{OneTimeCodeRepository, UserRepository};
use shoplite_commerce::models::NewUser;
use shoplite_commerce::services::{AccountService, NotificationKind};
use shoplite_commerce::CommerceError;
use shoplite_integration_tests::{FailingSink, RecordingSink, TestShop};
use shoplite_core::Email;

fn new_user(username: &str, email: &str) -> NewUser {
    NewUser {
        username: username.to_owned(),
        email: email.parse().expect("email"),
        password_hash: "argon2-hash-placeholder".to_owned(),
        first_name: "Ana".to_owned(),
        last_name: "Lovelace".to_owned(),
    }
}

/// Pull the 6-digit code out of a verification mail body.
fn extract_otp(body: &str) -> String {
    body.split("is: ").nth(1).expect("otp marker").chars().take(6).collect()
}

// =============================================================================
// Registration and verification
// =============================================================================

#[tokio::test]
async fn test_create_then_get_round_trips_account_fields() {
    let shop = TestShop::new().await;
    let repo = UserRepository::new(&shop.pool);

    let created = repo.create(&new_user("ana", "ana@example.com")).await.unwrap();
    let fetched = repo.get(created.id).await.unwrap().unwrap();
    assert_eq!(fetched.username, "ana");
    assert_eq!(fetched.email.as_str(), "ana@example.com");
    assert_eq!(fetched.first_name, "Ana");
    assert_eq!(fetched.last_name, "Lovelace");
    assert!(!fetched.is_active);
}

#[tokio::test]
async fn test_register_then_verify_activates_account() {
    let shop = TestShop::new().await;
    let sink = RecordingSink::new();
    let accounts = AccountService::new(&shop.pool, &shop.config, &sink);

    let user = accounts.register(&new_user("ana", "ana@example.com")).await.unwrap();
    assert!(!user.is_active);

    let sent = sink.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::Otp);
    assert_eq!(sent[0].recipient.as_str(), "ana@example.com");

    let otp = extract_otp(&sent[0].body);
    let verified = accounts.verify_email(&user.email, &otp).await.unwrap();
    assert!(verified.is_active);
}

#[tokio::test]
async fn test_wrong_code_rejected_and_code_single_use() {
    let shop = TestShop::new().await;
    let sink = RecordingSink::new();
    let accounts = AccountService::new(&shop.pool, &shop.config, &sink);

    let user = accounts.register(&new_user("ana", "ana@example.com")).await.unwrap();
    let otp = extract_otp(&sink.take()[0].body);

    let wrong = if otp == "000000" { "000001" } else { "000000" };
    let err = accounts.verify_email(&user.email, wrong).await.unwrap_err();
    assert!(matches!(err, CommerceError::Validation(_)));

    accounts.verify_email(&user.email, &otp).await.unwrap();
    let err = accounts.verify_email(&user.email, &otp).await.unwrap_err();
    assert!(matches!(err, CommerceError::Validation(_)));
}

#[tokio::test]
async fn test_resend_supersedes_previous_code() {
    let shop = TestShop::new().await;
    let sink = RecordingSink::new();
    let accounts = AccountService::new(&shop.pool, &shop.config, &sink);

    let user = accounts.register(&new_user("ana", "ana@example.com")).await.unwrap();
    let first_otp = extract_otp(&sink.take()[0].body);

    accounts.resend_verification(&user.email).await.unwrap();
    let second_otp = extract_otp(&sink.take()[0].body);

    if first_otp != second_otp {
        let err = accounts.verify_email(&user.email, &first_otp).await.unwrap_err();
        assert!(matches!(err, CommerceError::Validation(_)));
    }
    accounts.verify_email(&user.email, &second_otp).await.unwrap();
}

#[tokio::test]
async fn test_expired_code_rejected() {
    let shop = TestShop::new().await;
    let email: Email = "ana@example.com".parse().unwrap();
    let codes = OneTimeCodeRepository::new(&shop.pool);
    codes.issue_verification(&email, "123456").await.unwrap();

    // A cutoff in the future makes every outstanding code stale.
    let consumed = codes
        .consume_verification(&email, "123456", Utc::now() + Duration::minutes(1))
        .await
        .unwrap();
    assert!(!consumed);
}

#[tokio::test]
async fn test_register_rolls_back_when_send_fails() {
    let shop = TestShop::new().await;
    let accounts = AccountService::new(&shop.pool, &shop.config, &FailingSink);

    let err = accounts.register(&new_user("ana", "ana@example.com")).await.unwrap_err();
    assert!(matches!(err, CommerceError::ServiceUnavailable(_)));

    let email: Email = "ana@example.com".parse().unwrap();
    let user = UserRepository::new(&shop.pool).get_by_email(&email).await.unwrap();
    assert!(user.is_none());
}

#[tokio::test]
async fn test_duplicate_username_and_email_conflict() {
    let shop = TestShop::new().await;
    let sink = RecordingSink::new();
    let accounts = AccountService::new(&shop.pool, &shop.config, &sink);

    accounts.register(&new_user("ana", "ana@example.com")).await.unwrap();

    let err = accounts
        .register(&new_user("ANA", "other@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, CommerceError::Conflict(_)));

    let err = accounts
        .register(&new_user("other", "ANA@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, CommerceError::Conflict(_)));
}

// =============================================================================
// Email change
// =============================================================================

#[tokio::test]
async fn test_email_change_round_trip() {
    let shop = TestShop::new().await;
    let user = shop.seed_user("ana", "ana@example.com").await;
    let sink = RecordingSink::new();
    let accounts = AccountService::new(&shop.pool, &shop.config, &sink);

    let new_email: Email = "new@example.com".parse().unwrap();
    accounts.request_email_change(user.id, &new_email).await.unwrap();

    let sent = sink.take();
    assert_eq!(sent[0].kind, NotificationKind::EmailChangeOtp);
    assert_eq!(sent[0].recipient.as_str(), "new@example.com");

    let otp = extract_otp(&sent[0].body);
    let updated = accounts.confirm_email_change(user.id, &otp).await.unwrap();
    assert_eq!(updated.email.as_str(), "new@example.com");

    // The code is gone after use.
    let err = accounts.confirm_email_change(user.id, &otp).await.unwrap_err();
    assert!(matches!(err, CommerceError::Validation(_)));
}

#[tokio::test]
async fn test_email_change_rejects_taken_address() {
    let shop = TestShop::new().await;
    let user = shop.seed_user("ana", "ana@example.com").await;
    shop.seed_user("ben", "ben@example.com").await;
    let sink = RecordingSink::new();
    let accounts = AccountService::new(&shop.pool, &shop.config, &sink);

    let taken: Email = "ben@example.com".parse().unwrap();
    let err = accounts.request_email_change(user.id, &taken).await.unwrap_err();
    assert!(matches!(err, CommerceError::Conflict(_)));
    assert_eq!(sink.count(), 0);
}

#[tokio::test]
async fn test_email_change_send_failure_revokes_request() {
    let shop = TestShop::new().await;
    let user = shop.seed_user("ana", "ana@example.com").await;
    let accounts = AccountService::new(&shop.pool, &shop.config, &FailingSink);

    let new_email: Email = "new@example.com".parse().unwrap();
    let err = accounts.request_email_change(user.id, &new_email).await.unwrap_err();
    assert!(matches!(err, CommerceError::ServiceUnavailable(_)));

    let pending = OneTimeCodeRepository::new(&shop.pool)
        .consume_email_change(user.id, "123456", Utc::now() - Duration::minutes(1))
        .await
        .unwrap();
    assert!(pending.is_none());
}
