//! The reorder protocol: atomic multi-queue reassignment.

mod common;

use common::fixtures::insert_principal;
use common::TestHarness;
use mlqueue_core::domains::auth::principal::Tier;
use serde_json::json;

async fn setup_unit_with_queues(
    harness: &TestHarness,
    api_key: &str,
    count: usize,
) -> (String, String, Vec<String>) {
    let group: serde_json::Value = harness
        .http
        .post(harness.url("/v2/groups"))
        .bearer_auth(api_key)
        .json(&json!({"name": "g"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let group_id = group["id"].as_str().unwrap().to_string();

    let unit: serde_json::Value = harness
        .http
        .post(harness.url(&format!("/v2/groups/{group_id}/units")))
        .bearer_auth(api_key)
        .json(&json!({"name": "u", "config": {}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let unit_id = unit["id"].as_str().unwrap().to_string();

    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let queue: serde_json::Value = harness
            .http
            .post(harness.url(&format!("/v2/units/{unit_id}/queues")))
            .bearer_auth(api_key)
            .json(&json!({"name": format!("q{i}"), "parameters": {}}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        ids.push(queue["id"].as_str().unwrap().to_string());
    }

    (group_id, unit_id, ids)
}

#[tokio::test]
async fn reorder_reassigns_order_and_bumps_version() {
    let harness = TestHarness::new().await;
    let (_id, api_key) = insert_principal(&harness.db, Tier::Standard).await;
    let (group_id, unit_id, queue_ids) = setup_unit_with_queues(&harness, &api_key, 3).await;

    // Reverse the three pending queues.
    let reversed: Vec<&String> = queue_ids.iter().rev().collect();
    let resp = harness
        .http
        .post(harness.url(&format!("/v2/units/{unit_id}/reorder")))
        .bearer_auth(&api_key)
        .json(&json!({"queue_ids": reversed}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let list: serde_json::Value = harness
        .http
        .get(harness.url(&format!(
            "/v2/groups/{group_id}/units/{unit_id}/queues?limit=10&sort=order"
        )))
        .bearer_auth(&api_key)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let items = list["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["id"], reversed[0].as_str());
    assert_eq!(items[0]["order"], 0);
    assert_eq!(items[2]["order"], 2);

    harness.shutdown().await;
}

#[tokio::test]
async fn reorder_rejects_a_queue_from_another_unit() {
    let harness = TestHarness::new().await;
    let (_id, api_key) = insert_principal(&harness.db, Tier::Standard).await;
    let (_group_a, unit_a, queues_a) = setup_unit_with_queues(&harness, &api_key, 2).await;
    let (_group_b, _unit_b, queues_b) = setup_unit_with_queues(&harness, &api_key, 1).await;

    let mixed = vec![queues_a[0].clone(), queues_b[0].clone()];
    let resp = harness
        .http
        .post(harness.url(&format!("/v2/units/{unit_a}/reorder")))
        .bearer_auth(&api_key)
        .json(&json!({"queue_ids": mixed}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "QUEUE_CROSS_UNIT");

    harness.shutdown().await;
}

#[tokio::test]
async fn reorder_rejects_a_non_pending_queue() {
    let harness = TestHarness::new().await;
    let (_id, api_key) = insert_principal(&harness.db, Tier::Standard).await;
    let (_group_id, unit_id, queue_ids) = setup_unit_with_queues(&harness, &api_key, 2).await;

    harness
        .http
        .post(harness.url(&format!("/v2/queues/{}/start", queue_ids[0])))
        .bearer_auth(&api_key)
        .send()
        .await
        .unwrap();

    let resp = harness
        .http
        .post(harness.url(&format!("/v2/units/{unit_id}/reorder")))
        .bearer_auth(&api_key)
        .json(&json!({"queue_ids": queue_ids}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_QUEUE_STATUS");

    harness.shutdown().await;
}
