//! Request description passed to the gateway client.

use reqwest::Method;
use serde::Serialize;

use crate::error::ConsoleResult;

/// Whether a request reads state or mutates it.
///
/// Decides how failures are classified: failed reads are `Fetch` errors,
/// failed writes are `Persistence` errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Read,
    Write,
}

/// One call to the remote API.
///
/// # Example
///
/// ```rust,ignore
/// let mut request = ApiRequest::put(format!("/routes/{id}"), "/routes/{id}")
///     .with_json(&route)?;
/// gateway.execute(&mut request).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base URL
    pub path: String,
    /// Low-cardinality endpoint name used for telemetry
    pub endpoint: &'static str,
    pub body: Option<serde_json::Value>,
    pub kind: RequestKind,
    /// Set once a 401 for this request has been handled
    retried: bool,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>, endpoint: &'static str, kind: RequestKind) -> Self {
        Self {
            method,
            path: path.into(),
            endpoint,
            body: None,
            kind,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>, endpoint: &'static str) -> Self {
        Self::new(Method::GET, path, endpoint, RequestKind::Read)
    }

    pub fn post(path: impl Into<String>, endpoint: &'static str) -> Self {
        Self::new(Method::POST, path, endpoint, RequestKind::Write)
    }

    pub fn put(path: impl Into<String>, endpoint: &'static str) -> Self {
        Self::new(Method::PUT, path, endpoint, RequestKind::Write)
    }

    pub fn delete(path: impl Into<String>, endpoint: &'static str) -> Self {
        Self::new(Method::DELETE, path, endpoint, RequestKind::Write)
    }

    /// Attach a JSON body.
    pub fn with_json<T: Serialize>(mut self, body: &T) -> ConsoleResult<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Mark the request as already handled for a 401.
    ///
    /// Returns `false` if it was marked before.
    pub fn mark_retried(&mut self) -> bool {
        !std::mem::replace(&mut self.retried, true)
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_constructors_set_kind() {
        assert_eq!(ApiRequest::get("/routes", "/routes").kind, RequestKind::Read);
        assert_eq!(ApiRequest::post("/routes", "/routes").kind, RequestKind::Write);
        assert_eq!(ApiRequest::put("/routes/1", "/routes/{id}").method, Method::PUT);
        assert_eq!(
            ApiRequest::delete("/routes/1", "/routes/{id}").kind,
            RequestKind::Write
        );
    }

    #[test]
    fn test_mark_retried_only_once() {
        let mut request = ApiRequest::get("/routes", "/routes");
        assert!(!request.is_retried());
        assert!(request.mark_retried());
        assert!(!request.mark_retried());
        assert!(request.is_retried());
    }

    #[test]
    fn test_with_json() {
        let request = ApiRequest::post("/routes", "/routes")
            .with_json(&json!({"uri": "http://a"}))
            .unwrap();
        assert_eq!(request.body.unwrap()["uri"], "http://a");
    }
}
