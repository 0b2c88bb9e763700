//! Shared fixtures for omni-core integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use omni_core::{CoreError, DivisionTransport, PortalRequest, PortalResponse};
use omni_types::Division;
use parking_lot::Mutex;
use serde_json::{json, Value};

type Handler = dyn Fn(Division, &PortalRequest) -> Result<PortalResponse, CoreError> + Send + Sync;

/// In-process transport answering from a closure and recording every call
pub struct ScriptedTransport {
    handler: Box<Handler>,
    calls: Mutex<Vec<(Division, PortalRequest)>>,
}

impl ScriptedTransport {
    pub fn new(
        handler: impl Fn(Division, &PortalRequest) -> Result<PortalResponse, CoreError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Division, PortalRequest)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl DivisionTransport for ScriptedTransport {
    async fn execute(
        &self,
        division: Division,
        request: PortalRequest,
    ) -> Result<PortalResponse, CoreError> {
        let result = (self.handler)(division, &request);
        self.calls.lock().push((division, request));
        result
    }
}

pub fn offline(division: Division) -> CoreError {
    CoreError::Transport {
        division,
        message: "connection refused".to_string(),
        source: None,
    }
}

/// Portal-shaped schedule body (period-major) with one lesson per entry
pub fn schedule_json(lessons: &[(&str, &str, &str)]) -> Value {
    let mut body = serde_json::Map::new();
    for (weekday, period, subject) in lessons {
        let days = body
            .entry(period.to_string())
            .or_insert_with(|| json!({}));
        days[*weekday] = json!({
            "lenta": period,
            "weekday": weekday,
            "groups": "P-21",
            "num_rooms": "204",
            "name_spec": subject,
            "l_start": "09:00",
            "l_end": "10:30",
        });
    }
    json!({
        "body": body,
        "lents": [],
        "days": {"1": "Monday", "2": "Tuesday", "3": "Wednesday"},
        "daysShort": {"1": "Mon", "2": "Tue", "3": "Wed"},
        "dates": {"1": "2025-05-19", "2": "2025-05-20", "3": "2025-05-21"},
        "curdate": "Monday, 19 May",
        "start_end": {"monday": "2025-05-19", "sunday": "2025-05-25"},
    })
}

pub fn ok_json(value: &Value) -> Result<PortalResponse, CoreError> {
    Ok(PortalResponse::new(200, value.to_string()))
}
