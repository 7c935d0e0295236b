//! Sliding-window quota enforcement.

mod common;

use common::fixtures::insert_principal;
use common::TestHarness;
use mlqueue_core::domains::auth::principal::Tier;
use serde_json::json;

#[tokio::test]
async fn exceeding_the_per_minute_limit_returns_429() {
    let harness = TestHarness::with_quota(3, 1000, 20).await;
    let (_id, api_key) = insert_principal(&harness.db, Tier::Standard).await;

    let mut saw_429 = false;
    for i in 0..5 {
        let resp = harness
            .http
            .post(harness.url("/v1/tasks"))
            .bearer_auth(&api_key)
            .json(&json!({"name": format!("t{i}"), "config": {}}))
            .send()
            .await
            .unwrap();
        if resp.status() == 429 {
            saw_429 = true;
            let body: serde_json::Value = resp.json().await.unwrap();
            assert_eq!(body["code"], "RATE_LIMIT_EXCEEDED");
            break;
        }
    }
    assert!(saw_429, "expected the 4th request within the window to be rate-limited");

    harness.shutdown().await;
}

#[tokio::test]
async fn batch_endpoint_uses_batch_quota_class_regardless_of_tier() {
    // A premium principal with a generous premium quota but a tiny batch
    // quota must still be limited at the batch class.
    let harness = TestHarness::with_quota(100, 1000, 1).await;
    let (_id, api_key) = insert_principal(&harness.db, Tier::Premium).await;

    let first = harness
        .http
        .post(harness.url("/v1/tasks/batch"))
        .bearer_auth(&api_key)
        .json(&json!({"tasks": [{"name": "a", "config": {}}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 201);

    let second = harness
        .http
        .post(harness.url("/v1/tasks/batch"))
        .bearer_auth(&api_key)
        .json(&json!({"tasks": [{"name": "b", "config": {}}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 429);

    harness.shutdown().await;
}
