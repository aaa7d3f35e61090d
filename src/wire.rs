use serde::{de::DeserializeOwned, Deserialize, Deserializer};

use crate::error::FieldErrors;

/// JSON error envelope returned with non-success responses.
///
/// Each field is read on its own: a mis-shaped field is dropped without
/// discarding the others.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "code_as_string")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub errors: Option<FieldErrors>,
    #[serde(default, deserialize_with = "lenient")]
    pub request_id: Option<String>,
}

impl ErrorBody {
    /// `None` for empty, non-JSON or mis-shaped bodies.
    pub fn parse(body: &[u8]) -> Option<Self> {
        serde_json::from_slice(body).ok()
    }
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(Option::<serde_json::Value>::deserialize(deserializer)?
        .and_then(|value| serde_json::from_value(value).ok()))
}

fn code_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(code)) => Some(code),
        Some(serde_json::Value::Number(code)) => Some(code.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::ErrorBody;

    #[test]
    fn parses_full_envelope() {
        let body = ErrorBody::parse(
            br#"{"message":"m","code":"c","errors":{"a":["x"]},"request_id":"r"}"#,
        )
        .expect("must parse");
        assert_eq!(body.message.as_deref(), Some("m"));
        assert_eq!(body.code.as_deref(), Some("c"));
        assert_eq!(body.errors.expect("errors")["a"], vec!["x".to_owned()]);
        assert_eq!(body.request_id.as_deref(), Some("r"));
    }

    #[test]
    fn rejects_non_object_bodies() {
        assert!(ErrorBody::parse(b"").is_none());
        assert!(ErrorBody::parse(b"[1,2]").is_none());
        assert!(ErrorBody::parse(b"Service Unavailable").is_none());
    }

    #[test]
    fn mis_shaped_fields_do_not_hide_the_rest() {
        let body = ErrorBody::parse(br#"{"message":"bad cursor","code":"E1","errors":["x"]}"#)
            .expect("must parse");
        assert_eq!(body.message.as_deref(), Some("bad cursor"));
        assert_eq!(body.code.as_deref(), Some("E1"));
        assert!(body.errors.is_none());

        let body = ErrorBody::parse(
            br#"{"message":"invalid","code":"E2","errors":{"content":"required"},"request_id":7}"#,
        )
        .expect("must parse");
        assert_eq!(body.message.as_deref(), Some("invalid"));
        assert_eq!(body.code.as_deref(), Some("E2"));
        assert!(body.errors.is_none());
        assert!(body.request_id.is_none());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let body = ErrorBody::parse(br#"{"detail":"x","code":null}"#).expect("must parse");
        assert!(body.message.is_none());
        assert!(body.code.is_none());
        assert!(body.errors.is_none());
    }
}
