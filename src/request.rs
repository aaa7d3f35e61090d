use bytes::Bytes;
use reqwest::Method;
use serde::Serialize;

use crate::{MemoryApiError, Result};

/// A logical JSON request: method, path relative to the base URL, query
/// parameters and an optional JSON body.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    /// Serialized JSON body.
    pub body: Option<Bytes>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Appends one query parameter. Values are URL-encoded when sent.
    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    /// Appends a query parameter only when `value` is present.
    pub fn query_opt<V: ToString>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.query(name, value),
            None => self,
        }
    }

    /// Serializes `body` as the JSON payload.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(body).map_err(|err| {
            MemoryApiError::InvalidRequest(format!("failed to serialize request body: {err}"))
        })?;
        self.body = Some(Bytes::from(bytes));
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use reqwest::Method;
    use serde_json::json;

    use super::ApiRequest;
    use crate::MemoryApiError;

    #[test]
    fn builders_set_method_and_query() {
        let request = ApiRequest::get("/v1/memories")
            .query("limit", 10)
            .query_opt("cursor", None::<String>)
            .query_opt("space_id", Some("sp 1"));
        assert_eq!(request.method, Method::GET);
        assert_eq!(
            request.query,
            vec![
                ("limit".to_owned(), "10".to_owned()),
                ("space_id".to_owned(), "sp 1".to_owned())
            ]
        );
        assert!(request.body.is_none());
    }

    #[test]
    fn json_body_is_serialized() {
        let request = ApiRequest::post("/v1/memories")
            .json(&json!({"content": "hi"}))
            .expect("must serialize");
        assert_eq!(request.body.as_deref(), Some(&br#"{"content":"hi"}"#[..]));
    }

    #[test]
    fn unserializable_body_is_invalid_request() {
        let mut map = BTreeMap::new();
        map.insert(vec![1u8], "non-string key");
        let err = ApiRequest::post("/x").json(&map).expect_err("must fail");
        assert!(matches!(err, MemoryApiError::InvalidRequest(_)));
    }
}
