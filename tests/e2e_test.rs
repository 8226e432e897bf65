//! End-to-end tests against a running deployment
//!
//! These tests require:
//! 1. PostgreSQL database running (with migrations applied)
//! 2. Redis running
//! 3. API server running on configured port
//! 4. Worker process running
//! 5. S3-compatible storage reachable from the test machine
//!
//! Run with: cargo test --test e2e_test -- --ignored --nocapture
//!
//! Set JOBFLOW_API_URL to override the default (http://localhost:3000).
//! JWT_SECRET must match the API server's secret.

mod helpers;

use helpers::*;
use serde_json::{json, Value};
use uuid::Uuid;

fn get_base_url() -> String {
    std::env::var("JOBFLOW_API_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

fn token_for(user_id: &str) -> String {
    let secret = std::env::var("JWT_SECRET").expect("JWT_SECRET must be set");
    mint_token(&secret, user_id)
}

fn unique_user() -> String {
    format!("e2e-{}", Uuid::new_v4().simple())
}

#[tokio::test]
#[ignore] // Requires running API server, worker, and all infrastructure
async fn test_e2e_health_check() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .expect("Health check failed");

    assert!(
        response.status().is_success(),
        "Health check returned non-success status: {}",
        response.status()
    );

    println!("✓ Health check passed");
}

#[tokio::test]
#[ignore] // Requires running API server, worker, and all infrastructure
async fn test_e2e_job_lifecycle() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();
    let user_id = unique_user();
    let token = token_for(&user_id);

    let body = json!({
        "name": "Test Job",
        "action": "submit a job",
        "context1": "This is context 1",
        "context2": "This is context 2",
    });

    // 1. Submit
    let submitted = submit_job(&client, &base_url, &token, &body)
        .await
        .expect("Failed to submit job");
    let job_id = submitted.job_id.to_string();
    println!("Submitted job: {}", job_id);

    // 2. Wait for the worker
    let view = poll_job_status(&client, &base_url, &token, &job_id, 60)
        .await
        .expect("Job did not complete");
    assert_eq!(view.status.to_string(), "COMPLETE", "job ended as {:?}", view.error);

    let artifact_key = view.artifact_key.expect("No artifact key");
    assert!(artifact_key.starts_with(&format!("{}/", user_id)));
    assert!(artifact_key.ends_with(&job_id));

    // 3. Fetch the artifact through its signed link
    let url = view.presigned_url.expect("No signed link");
    let content = client
        .get(&url)
        .send()
        .await
        .expect("Artifact fetch failed")
        .text()
        .await
        .unwrap();
    assert!(content.contains(&job_id));
    assert!(content.contains("This is context 1\nThis is context 2\n"));

    // 4. Listing
    let listing: Value = client
        .get(format!("{}/jobs", base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["count"], 1);
    assert_eq!(listing["jobs"][0]["job_id"], job_id.as_str());

    println!("✓ Job lifecycle passed");
}

#[tokio::test]
#[ignore] // Requires running API server, worker, and all infrastructure
async fn test_e2e_concurrent_submissions() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();
    let user_id = unique_user();
    let token = token_for(&user_id);

    let mut handles = Vec::new();
    for i in 0..5 {
        let client = client.clone();
        let base_url = base_url.clone();
        let token = token.clone();
        handles.push(tokio::spawn(async move {
            let body = json!({
                "name": format!("job-{}", i),
                "action": "run",
                "context1": format!("first {}", i),
                "context2": format!("second {}", i),
            });
            let submitted = submit_job(&client, &base_url, &token, &body)
                .await
                .map_err(|e| e.to_string())?;
            poll_job_status(&client, &base_url, &token, &submitted.job_id.to_string(), 90)
                .await
                .map_err(|e| e.to_string())
        }));
    }

    for handle in handles {
        let view = handle.await.unwrap().expect("Job failed");
        assert_eq!(view.status.to_string(), "COMPLETE");
    }

    let listing: Value = client
        .get(format!("{}/jobs", base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["count"], 5);

    println!("✓ Concurrent submissions passed");
}

#[tokio::test]
#[ignore] // Requires running API server
async fn test_e2e_rejects_missing_token() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/jobs", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
}
