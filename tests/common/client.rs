//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per API endpoint. When API routes or
//! request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Value};
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed")
    }

    async fn post_json(&self, path: &str, body: Value) -> Response {
        self.client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .expect("POST request failed")
    }

    // ========================================================================
    // Server
    // ========================================================================

    pub async fn get_home(&self) -> Response {
        self.get("/").await
    }

    pub async fn get_health(&self) -> Response {
        self.get("/api/health").await
    }

    pub async fn get_metrics(&self) -> Response {
        self.get("/metrics").await
    }

    pub async fn get_logs(&self) -> Response {
        self.get("/api/logs").await
    }

    // ========================================================================
    // Settings
    // ========================================================================

    pub async fn get_config(&self) -> Response {
        self.get("/api/config").await
    }

    pub async fn post_config(&self, body: Value) -> Response {
        self.post_json("/api/config", body).await
    }

    pub async fn get_models(&self) -> Response {
        self.get("/api/models").await
    }

    // ========================================================================
    // Scan and analysis
    // ========================================================================

    pub async fn get_status(&self) -> Response {
        self.get("/api/status").await
    }

    /// Starts a full scan with an empty request body
    pub async fn start_scan(&self) -> Response {
        self.client
            .post(self.url("/api/scan"))
            .send()
            .await
            .expect("POST request failed")
    }

    pub async fn start_scan_with(&self, body: Value) -> Response {
        self.post_json("/api/scan", body).await
    }

    pub async fn start_analysis(&self) -> Response {
        self.post_json("/api/analyze", json!({})).await
    }

    pub async fn get_candidates(&self) -> Response {
        self.get("/api/candidates").await
    }

    pub async fn get_results(&self) -> Response {
        self.get("/api/results").await
    }

    pub async fn get_report(&self) -> Response {
        self.get("/api/report").await
    }

    /// Polls the status until the library is no longer scanning or analyzing
    ///
    /// # Panics
    ///
    /// Panics if the work does not finish within the timeout.
    pub async fn wait_until_settled(&self) -> Value {
        let start = std::time::Instant::now();
        loop {
            let status: Value = self.get_status().await.json().await.unwrap();
            let state = status["status"].as_str().unwrap_or_default().to_string();
            if state != "scanning" && state != "analyzing" {
                return status;
            }
            if start.elapsed() > Duration::from_millis(BACKGROUND_WORK_TIMEOUT_MS) {
                panic!("Library still {} after timeout", state);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    // ========================================================================
    // Files
    // ========================================================================

    pub async fn delete_files(&self, paths: &[String]) -> Response {
        self.post_json("/api/delete", json!({ "paths": paths })).await
    }

    pub async fn rename_files(&self, paths: &[String], pattern: &str) -> Response {
        self.post_json("/api/rename", json!({ "paths": paths, "pattern": pattern }))
            .await
    }

    pub async fn update_metadata(&self, body: Value) -> Response {
        self.post_json("/api/metadata/update", body).await
    }

    pub async fn fix_metadata(&self, path: &str) -> Response {
        self.post_json("/api/metadata/fix", json!({ "path": path }))
            .await
    }

    pub async fn get_library(&self, limit: usize, offset: usize) -> Response {
        self.get(&format!("/api/library?limit={}&offset={}", limit, offset))
            .await
    }

    pub async fn search_library(&self, query: &str) -> Response {
        self.client
            .get(self.url("/api/library/search"))
            .query(&[("q", query)])
            .send()
            .await
            .expect("GET request failed")
    }

    pub async fn optimize_library(&self) -> Response {
        self.post_json("/api/library/optimize", json!({})).await
    }

    pub async fn browse_dirs(&self, path: Option<&str>) -> Response {
        let mut request = self.client.get(self.url("/api/dirs"));
        if let Some(path) = path {
            request = request.query(&[("path", path)]);
        }
        request.send().await.expect("GET request failed")
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    pub async fn get_tasks(&self) -> Response {
        self.get("/api/tasks").await
    }

    pub async fn update_task(&self, id: &str, body: Value) -> Response {
        self.client
            .put(self.url(&format!("/api/tasks/{}", id)))
            .json(&body)
            .send()
            .await
            .expect("PUT request failed")
    }

    pub async fn run_task(&self, id: &str) -> Response {
        self.post_json(&format!("/api/tasks/{}/run", id), json!({}))
            .await
    }

    /// Polls the task list until `id` has a `last_run`
    ///
    /// # Panics
    ///
    /// Panics if the task does not finish within the timeout.
    pub async fn wait_for_task_run(&self, id: &str) -> Value {
        let start = std::time::Instant::now();
        loop {
            let body: Value = self.get_tasks().await.json().await.unwrap();
            let task = body["tasks"]
                .as_array()
                .and_then(|tasks| tasks.iter().find(|t| t["id"] == id))
                .cloned()
                .unwrap_or(Value::Null);
            if !task["last_run"].is_null() && task["is_running"] == false {
                return task;
            }
            if start.elapsed() > Duration::from_millis(BACKGROUND_WORK_TIMEOUT_MS) {
                panic!("Task {} did not finish in time", id);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
