//! The `{ success, data, error, message, meta }` wrapper every endpoint uses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{ApiError, ApiResult};

/// Pagination metadata attached to list responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub total_pages: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default = "none", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// A string, or an object carrying `message`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
}

fn none<T>() -> Option<T> {
    None
}

impl<T> Envelope<T> {
    /// Envelope for a successful response with no body (e.g. 204).
    pub fn empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
            message: None,
            meta: None,
        }
    }

    /// Returns the payload of an endpoint that promises one.
    ///
    /// # Errors
    /// Returns a decode error when the server omitted `data`.
    pub fn into_data(self) -> ApiResult<T> {
        self.data
            .ok_or_else(|| ApiError::decode("Response is missing data"))
    }
}

#[cfg(test)]
mod tests {
    use serde::de::IgnoredAny;

    use super::*;
    use crate::api::error::ApiErrorKind;

    #[test]
    fn test_envelope_with_meta() {
        let json = r#"{
            "success": true,
            "data": [1, 2, 3],
            "meta": {"page": 1, "limit": 3, "total": 9, "totalPages": 3}
        }"#;
        let envelope: Envelope<Vec<u32>> = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.meta.unwrap().total_pages, Some(3));
        assert_eq!(envelope.into_data().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_data_fails_loudly() {
        let envelope: Envelope<Vec<u32>> =
            serde_json::from_str(r#"{"success":true,"message":"ok"}"#).unwrap();
        let err = envelope.into_data().unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Decode);
    }

    #[test]
    fn test_null_data_is_absent() {
        let envelope: Envelope<IgnoredAny> =
            serde_json::from_str(r#"{"success":true,"data":null}"#).unwrap();
        assert!(envelope.data.is_none());
    }
}
