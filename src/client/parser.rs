//! Response parsing.

use serde_json::{Map, Value};

use crate::error::{RawResponse, TransportError};

/// Turns raw backend responses into JSON objects.
pub struct ResponseParser;

impl ResponseParser {
    /// Parses a response body into a JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error for status codes of 400 and above, and for bodies
    /// that are not a JSON object.
    pub fn parse(response: RawResponse) -> Result<Map<String, Value>, TransportError> {
        if response.status >= 400 {
            return Err(TransportError::Status {
                status: response.status,
                message: String::from("API returned an invalid status code"),
                response,
            });
        }

        match serde_json::from_str::<Value>(&response.body) {
            Ok(Value::Object(object)) => Ok(object),
            _ => Err(TransportError::InvalidBody {
                message: String::from("API returned an invalid response body"),
                response,
            }),
        }
    }

    /// Returns the message of an application-level failure
    /// (`{"success": false, "message": ...}`), if the body signals one.
    #[must_use]
    pub fn failure_message(body: &Map<String, Value>) -> Option<String> {
        match body.get("success") {
            Some(Value::Bool(false)) => Some(
                body.get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_object() {
        let body = ResponseParser::parse(RawResponse::new(200, r#"{"id": 3}"#)).expect("object");
        assert_eq!(body.get("id"), Some(&json!(3)));
    }

    #[test]
    fn test_parse_error_status() {
        let err = ResponseParser::parse(RawResponse::new(404, "")).unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(err.response().map(|r| r.status), Some(404));
    }

    #[test]
    fn test_parse_non_object_body() {
        for body in ["[1, 2]", "not json", ""] {
            let err = ResponseParser::parse(RawResponse::new(200, body)).unwrap_err();
            assert!(matches!(err, TransportError::InvalidBody { .. }));
        }
    }

    #[test]
    fn test_failure_message() {
        let failed = json!({"success": false, "message": "Name already exists"});
        let ok = json!({"success": true, "message": "Created"});

        assert_eq!(
            ResponseParser::failure_message(failed.as_object().expect("object")),
            Some(String::from("Name already exists"))
        );
        assert_eq!(ResponseParser::failure_message(ok.as_object().expect("object")), None);
    }
}
