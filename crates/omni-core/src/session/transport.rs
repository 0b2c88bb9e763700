//! Request/response types and the per-division transport seam

use async_trait::async_trait;
use omni_types::Division;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A portal API call, relative to the base URL
#[derive(Debug, Clone, PartialEq)]
pub struct PortalRequest {
    pub method: Method,
    /// Path without leading slash, e.g. `schedule/get-schedule`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Mutating calls carry the CSRF token
    pub mutating: bool,
}

impl PortalRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
            mutating: false,
        }
    }

    /// POST used to read data (no CSRF token)
    pub fn post_json(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
            mutating: false,
        }
    }

    /// POST that changes server state
    pub fn mutation(path: impl Into<String>, body: Value) -> Self {
        Self {
            mutating: true,
            ..Self::post_json(path, body)
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }
}

/// Raw portal answer; any HTTP status lands here
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalResponse {
    pub status: u16,
    pub body: String,
}

impl PortalResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx answer into `CoreError::Server`
    pub fn error_for_status(self, division: Division) -> Result<Self, CoreError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(CoreError::Server {
                division,
                status: self.status,
                body: self.body,
            })
        }
    }

    /// Decode a successful body
    pub fn json<T: DeserializeOwned>(
        &self,
        division: Division,
        what: &'static str,
    ) -> Result<T, CoreError> {
        serde_json::from_str(&self.body).map_err(|source| CoreError::Decode {
            division,
            what,
            message: source.to_string(),
            source,
        })
    }
}

/// Sends requests on behalf of one division's session
///
/// Only connectivity problems are errors; HTTP failures come back as an
/// unsuccessful `PortalResponse`.
#[async_trait]
pub trait DivisionTransport: Send + Sync {
    async fn execute(
        &self,
        division: Division,
        request: PortalRequest,
    ) -> Result<PortalResponse, CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mutation_sets_flag() {
        let req = PortalRequest::mutation("presents/set-was", json!({"schedule": "1"}));
        assert!(req.mutating);
        assert_eq!(req.method, Method::Post);

        let read = PortalRequest::post_json("schedule/get-schedule", json!({"week": 0}));
        assert!(!read.mutating);
    }

    #[test]
    fn test_error_for_status() {
        let ok = PortalResponse::new(204, "");
        assert!(ok.error_for_status(Division::Academy).is_ok());

        let err = PortalResponse::new(500, "boom")
            .error_for_status(Division::College)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Server { division: Division::College, status: 500, ref body } if body == "boom"
        ));
    }

    #[test]
    fn test_json_decode_error_is_attributed() {
        let resp = PortalResponse::new(200, "not json");
        let err = resp.json::<Value>(Division::Academy, "profile").unwrap_err();
        assert_eq!(err.division(), Some(Division::Academy));
        assert!(err.to_string().contains("profile"));
    }
}
