use chrono::{Duration, Utc};

use reqwest::{Method, StatusCode};

use serde_json::json;

use sqlx::PgPool;

use crate::helpers::TestApp;

fn membership_event(email: &str, level: &str, amount: f64) -> serde_json::Value {
    json!({
        "event_type": "membership_created",
        "data": {
            "supporter_email": email,
            "membership_level_name": level,
            "amount": amount,
            "subscription_id": "bmc-sub-1"
        }
    })
}

#[sqlx::test]
async fn membership_event_creates_a_subscription_and_returns_the_feed_url(
    pool: PgPool,
) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    let res = app
        .post_webhook_signed(&membership_event("FAN@Example.com", "Premium yearly", 4.0))
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::OK, res.status());

    let body: serde_json::Value = res.json().await.expect("Response body is not JSON");
    assert_eq!(Some(true), body["success"].as_bool());

    let feed_url = body["feedUrl"].as_str().expect("Response has no feedUrl");
    assert!(feed_url.contains("/feeds/"));

    let row = sqlx::query_as::<_, (String, String, chrono::DateTime<Utc>, chrono::DateTime<Utc>)>(
        "select email, plan_id, created_at, expires_at from subscriptions",
    )
    .fetch_one(&pool)
    .await
    .expect("Subscription row missing");

    assert_eq!("fan@example.com", row.0);
    assert_eq!("premium-yearly", row.1);

    let term = row.3 - row.2;
    assert!((term - Duration::days(365)).num_seconds().abs() < 5);

    Ok(())
}

#[sqlx::test]
async fn high_value_memberships_upgrade_to_the_ultimate_tier(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    let res = app
        .post_webhook_signed(&membership_event("fan@test.com", "Supporter", 10.0))
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::OK, res.status());

    let (plan_id,): (String,) = sqlx::query_as("select plan_id from subscriptions")
        .fetch_one(&pool)
        .await
        .expect("Subscription row missing");

    assert_eq!("ultimate-monthly", plan_id);

    Ok(())
}

#[sqlx::test]
async fn tampered_signature_is_forbidden_and_nothing_is_stored(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    let body = membership_event("fan@test.com", "Premium", 4.0).to_string();
    let timestamp = Utc::now().timestamp();
    let mut signature = app.verifier.sign(timestamp, body.as_bytes());
    // Flip one signature character
    signature.replace_range(0..1, if signature.starts_with('A') { "B" } else { "A" });

    let res = app
        .post_webhook_raw(body, &signature, timestamp)
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::FORBIDDEN, res.status());

    let count: (i64,) = sqlx::query_as("select count(*) from subscriptions")
        .fetch_one(&pool)
        .await
        .expect("Failed to count subscriptions");
    assert_eq!(0, count.0);

    Ok(())
}

#[sqlx::test]
async fn stale_timestamp_is_forbidden(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    let body = membership_event("fan@test.com", "Premium", 4.0).to_string();
    let stale = (Utc::now() - Duration::minutes(10)).timestamp();
    let signature = app.verifier.sign(stale, body.as_bytes());

    let res = app
        .post_webhook_raw(body, &signature, stale)
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::FORBIDDEN, res.status());

    Ok(())
}

#[sqlx::test]
async fn missing_signature_headers_are_forbidden(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    let res = app
        .request(Method::POST, "webhooks/buymeacoffee")
        .header("Content-Type", "application/json")
        .body(membership_event("fan@test.com", "Premium", 4.0).to_string())
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::FORBIDDEN, res.status());

    Ok(())
}

#[sqlx::test]
async fn non_post_requests_are_method_not_allowed(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    let res = app
        .request(Method::GET, "webhooks/buymeacoffee")
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::METHOD_NOT_ALLOWED, res.status());

    Ok(())
}

#[sqlx::test]
async fn unknown_event_types_are_acknowledged_by_name(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    let res = app
        .post_webhook_signed(&json!({"event_type": "poll_created", "data": {}}))
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::OK, res.status());

    let body: serde_json::Value = res.json().await.expect("Response body is not JSON");
    assert_eq!(Some(true), body["success"].as_bool());
    assert!(body["message"]
        .as_str()
        .unwrap_or_default()
        .contains("poll_created"));

    Ok(())
}

#[sqlx::test]
async fn genre_note_support_creates_a_genre_pack_with_a_feed_url(
    pool: PgPool,
) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    let res = app
        .post_webhook_signed(&json!({
            "event_type": "support_created",
            "data": {
                "supporter_email": "fan@test.com",
                "amount": 3.0,
                "support_note": "genre: Horror"
            }
        }))
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::OK, res.status());

    let body: serde_json::Value = res.json().await.expect("Response body is not JSON");
    assert!(body["feedUrl"].is_string());

    let (plan_id, metadata): (String, serde_json::Value) =
        sqlx::query_as("select plan_id, metadata from subscriptions")
            .fetch_one(&pool)
            .await
            .expect("Subscription row missing");

    assert_eq!("genre-pack", plan_id);
    assert_eq!(Some("Horror"), metadata["genre"].as_str());

    Ok(())
}

#[sqlx::test]
async fn plain_support_is_recorded_without_a_feed_url(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    let res = app
        .post_webhook_signed(&json!({
            "event_type": "support_created",
            "data": {
                "supporter_email": "fan@test.com",
                "amount": 3.0,
                "support_note": "keep it up!"
            }
        }))
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::OK, res.status());

    let body: serde_json::Value = res.json().await.expect("Response body is not JSON");
    assert_eq!(Some(true), body["success"].as_bool());
    assert!(body["feedUrl"].is_null());

    let (plan_id,): (String,) = sqlx::query_as("select plan_id from subscriptions")
        .fetch_one(&pool)
        .await
        .expect("Subscription row missing");
    assert_eq!("one-time-support", plan_id);

    Ok(())
}

#[sqlx::test]
async fn cancellation_resolves_the_provider_reference(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    app.post_webhook_signed(&membership_event("fan@test.com", "Premium", 4.0))
        .await
        .expect("Failed to execute request");

    let res = app
        .post_webhook_signed(&json!({
            "event_type": "subscription_cancelled",
            "data": {"subscription_id": "bmc-sub-1"}
        }))
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::OK, res.status());

    let body: serde_json::Value = res.json().await.expect("Response body is not JSON");
    assert_eq!(Some(true), body["success"].as_bool());

    let (status,): (String,) = sqlx::query_as("select status from subscriptions")
        .fetch_one(&pool)
        .await
        .expect("Subscription row missing");
    assert_eq!("cancelled", status);

    Ok(())
}

#[sqlx::test]
async fn cancellation_of_an_unknown_reference_is_called_out(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    let res = app
        .post_webhook_signed(&json!({
            "event_type": "subscription_cancelled",
            "data": {"subscription_id": "bmc-sub-unknown"}
        }))
        .await
        .expect("Failed to execute request");

    // Still a 200 so the provider stops retrying, but not a fabricated success
    assert_eq!(StatusCode::OK, res.status());

    let body: serde_json::Value = res.json().await.expect("Response body is not JSON");
    assert_eq!(Some(false), body["success"].as_bool());

    Ok(())
}

#[sqlx::test]
async fn updates_are_acknowledged_without_state_change(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    app.post_webhook_signed(&membership_event("fan@test.com", "Premium", 4.0))
        .await
        .expect("Failed to execute request");

    let res = app
        .post_webhook_signed(&json!({
            "event_type": "subscription_updated",
            "data": {"subscription_id": "bmc-sub-1"}
        }))
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::OK, res.status());

    let (status,): (String,) = sqlx::query_as("select status from subscriptions")
        .fetch_one(&pool)
        .await
        .expect("Subscription row missing");
    assert_eq!("active", status);

    Ok(())
}
