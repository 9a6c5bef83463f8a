//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use blipper_core::{HttpRequest, HttpResponse, HttpTransport, Result, SyncError};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Mutex;

/// HTTP transport that replays a fixed script and records every request
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, status: u16, body: &str) -> &Self {
        self.responses.lock().unwrap().push_back(Ok(HttpResponse {
            status,
            body: Bytes::from(body.to_string()),
        }));
        self
    }

    pub fn fail(&self, error: SyncError) -> &Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn body_json(&self, index: usize) -> serde_json::Value {
        let requests = self.requests.lock().unwrap();
        let body = requests[index].body.as_ref().expect("request has no body");
        serde_json::from_slice(body).unwrap()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::Transport("script exhausted".to_string())))
    }
}

/// A JSON array of `n` repository summaries starting at `first_id`.
pub fn repo_page(first_id: u64, n: u64) -> String {
    let items: Vec<serde_json::Value> = (first_id..first_id + n)
        .map(|id| {
            serde_json::json!({
                "id": id,
                "name": format!("repo{}", id),
                "full_name": format!("octo/repo{}", id),
                "html_url": format!("https://github.com/octo/repo{}", id),
                "private": false
            })
        })
        .collect();
    serde_json::Value::Array(items).to_string()
}
