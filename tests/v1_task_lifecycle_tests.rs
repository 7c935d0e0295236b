//! V1 cloud-dispatch lifecycle: create -> scheduler dequeue -> complete, plus
//! the cancel/complete race resolution.

mod common;

use common::fixtures::insert_principal;
use common::TestHarness;
use mlqueue_core::domains::auth::principal::Tier;
use serde_json::json;

#[tokio::test]
async fn create_task_is_picked_up_and_completed_by_a_worker() {
    let harness = TestHarness::new().await;
    let (_id, api_key) = insert_principal(&harness.db, Tier::Standard).await;

    let resp = harness
        .http
        .post(harness.url("/v1/tasks"))
        .bearer_auth(&api_key)
        .json(&json!({"name": "train-run", "config": {"epochs": 1}}))
        .send()
        .await
        .expect("request failed");
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    let task_id = body["id"].as_str().unwrap().to_string();

    let completed = harness
        .wait_for(|| {
            let harness_url = harness.url(&format!("/v1/tasks/{task_id}"));
            let client = harness.http.clone();
            let api_key = api_key.clone();
            async move {
                let resp = client.get(harness_url).bearer_auth(&api_key).send().await;
                match resp {
                    Ok(resp) => {
                        let body: serde_json::Value = resp.json().await.unwrap_or_default();
                        body["status"] == "completed"
                    }
                    Err(_) => false,
                }
            }
        })
        .await;
    assert!(completed, "task did not reach completed status in time");

    harness.shutdown().await;
}

#[tokio::test]
async fn cancel_wins_race_against_worker_completion() {
    let harness = TestHarness::new().await;
    let (_id, api_key) = insert_principal(&harness.db, Tier::Standard).await;

    let resp = harness
        .http
        .post(harness.url("/v1/tasks"))
        .bearer_auth(&api_key)
        .json(&json!({"name": "cancel-me", "config": {}}))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    let task_id = body["id"].as_str().unwrap().to_string();

    // Cancel immediately, racing the worker pool.
    let cancel_resp = harness
        .http
        .post(harness.url(&format!("/v1/tasks/{task_id}/cancel")))
        .bearer_auth(&api_key)
        .send()
        .await
        .unwrap();

    // Either we win the race (200, status=cancelled) or the worker already
    // marked it running/completed and cancel is a 404 — both are valid
    // outcomes of the race; what must never happen is a silently overwritten
    // cancellation once it lands.
    if cancel_resp.status() == 200 {
        let cancelled: serde_json::Value = cancel_resp.json().await.unwrap();
        assert_eq!(cancelled["status"], "cancelled");

        // Give the scheduler time to (attempt to) process the task anyway.
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;

        let final_resp = harness
            .http
            .get(harness.url(&format!("/v1/tasks/{task_id}")))
            .bearer_auth(&api_key)
            .send()
            .await
            .unwrap();
        let final_task: serde_json::Value = final_resp.json().await.unwrap();
        assert_eq!(
            final_task["status"], "cancelled",
            "cancellation must never be overwritten by a racing worker completion"
        );
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn priority_update_rescopes_queue_position() {
    let harness = TestHarness::new().await;
    let (_id, api_key) = insert_principal(&harness.db, Tier::Standard).await;

    let low = harness
        .http
        .post(harness.url("/v1/tasks"))
        .bearer_auth(&api_key)
        .json(&json!({"name": "low", "config": {}, "priority": 1}))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let low_id = low["id"].as_str().unwrap();

    let high = harness
        .http
        .post(harness.url("/v1/tasks"))
        .bearer_auth(&api_key)
        .json(&json!({"name": "high", "config": {}, "priority": 10}))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let _high_id = high["id"].as_str().unwrap();

    // Bump `low`'s priority above `high`'s.
    let resp = harness
        .http
        .put(harness.url(&format!("/v1/tasks/{low_id}/priority")))
        .bearer_auth(&api_key)
        .json(&json!({"priority": 20}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["task"]["priority"], 20);
    assert_eq!(body["queue_position"], 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn unauthenticated_request_is_rejected() {
    let harness = TestHarness::new().await;

    let resp = harness
        .http
        .post(harness.url("/v1/tasks"))
        .json(&json!({"name": "x", "config": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    harness.shutdown().await;
}

#[tokio::test]
async fn health_endpoint_reports_ok_without_auth() {
    let harness = TestHarness::new().await;

    let resp = harness.http.get(harness.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");

    harness.shutdown().await;
}
