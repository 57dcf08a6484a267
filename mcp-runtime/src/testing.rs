use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::gateway::{ApiRequest, ApiResponse, BackendGateway, GatewayError};

enum Scripted {
    Response(ApiResponse),
    Transport,
}

/// In-memory gateway: replays scripted responses in order and records every
/// request it receives.
#[derive(Default)]
pub struct FakeGateway {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, status: u16, body: Value) -> Self {
        self.push(Scripted::Response(ApiResponse::json(status, body)));
        self
    }

    pub fn respond_raw(self, status: u16, content_type: &str, raw: &[u8]) -> Self {
        self.push(Scripted::Response(ApiResponse::from_bytes(
            status,
            Some(content_type.to_string()),
            raw.to_vec(),
        )));
        self
    }

    pub fn fail_transport(self) -> Self {
        self.push(Scripted::Transport);
        self
    }

    fn push(&self, entry: Scripted) {
        self.script.lock().unwrap().push_back(entry);
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_with_method(&self, method: reqwest::Method) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.method == method)
            .count()
    }
}

#[async_trait]
impl BackendGateway for FakeGateway {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, GatewayError> {
        let path = request.path.clone();
        self.calls.lock().unwrap().push(request);
        match self.script.lock().unwrap().pop_front() {
            Some(Scripted::Response(response)) => Ok(response),
            Some(Scripted::Transport) => Err(GatewayError::Transport {
                path,
                message: "connection refused".to_string(),
            }),
            None => Err(GatewayError::Transport {
                path,
                message: "no scripted response left".to_string(),
            }),
        }
    }
}
