//! Response encoding.

use crate::error::ProtocolError;
use serde::Serialize;
use serde_json::Value;
use synclitedb_core::{CoreError, ResultSet, TxnHandle};

/// Response body sent for every processed request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    /// Whether the operation succeeded.
    pub result: bool,
    /// Human-readable outcome. Failures start with the error kind.
    pub message: String,
    /// Handle minted by a successful `begin`.
    #[serde(rename = "txn-handle", skip_serializing_if = "Option::is_none")]
    pub txn_handle: Option<String>,
    /// Rows produced by the statement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resultset: Option<ResultSet>,
}

impl Response {
    /// Creates a successful response.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            result: true,
            message: message.into(),
            txn_handle: None,
            resultset: None,
        }
    }

    /// Creates a failed response.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            result: false,
            message: message.into(),
            txn_handle: None,
            resultset: None,
        }
    }

    /// Creates a failed response from a broker error.
    #[must_use]
    pub fn from_core_error(err: &CoreError) -> Self {
        Self::failure(format!("{}: {err}", err.kind()))
    }

    /// Creates a failed response from a decode error.
    #[must_use]
    pub fn from_protocol_error(err: &ProtocolError) -> Self {
        Self::failure(format!("{}: {err}", err.kind()))
    }

    /// Attaches a transaction handle.
    #[must_use]
    pub fn with_txn_handle(mut self, handle: &TxnHandle) -> Self {
        self.txn_handle = Some(handle.as_str().to_string());
        self
    }

    /// Attaches a result set.
    #[must_use]
    pub fn with_resultset(mut self, rows: ResultSet) -> Self {
        self.resultset = Some(rows);
        self
    }

    /// Encodes the response as JSON.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|e| {
            let message = Value::String(format!("ExecutionError: response encoding failed: {e}"));
            format!(r#"{{"result":false,"message":{message}}}"#).into_bytes()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::Path;
    use synclitedb_core::SqlValue;

    fn encoded(resp: &Response) -> Value {
        serde_json::from_slice(&resp.encode()).unwrap()
    }

    #[test]
    fn success_omits_optional_fields() {
        let v = encoded(&Response::success("ok"));
        assert_eq!(v, json!({"result": true, "message": "ok"}));
    }

    #[test]
    fn begin_carries_handle() {
        let h = TxnHandle::from_client("abc");
        let v = encoded(&Response::success("Transaction started").with_txn_handle(&h));
        assert_eq!(v["txn-handle"], "abc");
    }

    #[test]
    fn resultset_keeps_column_order() {
        let mut rs = ResultSet::new(vec!["b".into(), "a".into()]);
        rs.push_row(vec![SqlValue::from("one"), SqlValue::Integer(1)]);
        rs.push_row(vec![SqlValue::Null, SqlValue::Blob(vec![1, 2])]);
        let bytes = Response::success("ok").with_resultset(rs).encode();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(r#"[{"b":"one","a":1},{"b":null,"a":[1,2]}]"#), "{text}");
    }

    #[test]
    fn errors_are_prefixed_with_kind() {
        let err = CoreError::not_found(Path::new("/x.db"));
        let resp = Response::from_core_error(&err);
        assert!(!resp.result);
        assert!(resp.message.starts_with("NotFound: "), "{}", resp.message);

        let resp = Response::from_protocol_error(&ProtocolError::MissingField("db-path"));
        assert_eq!(resp.message, "MalformedRequest: missing required field 'db-path'");
    }
}
