// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! JSON bodies exchanged on the `/api/block` endpoints.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const BLOCK_PATH: &str = "/api/block";
pub const FIXED_PATH: &str = "/api/block/fixed";
pub const CUSTOM_PATH: &str = "/api/block/custom";

/// Header carrying the token handed out by `GET /api/block`.
pub const CSRF_HEADER: &str = "x-csrf-token";

pub const ERR_MAX_200: &str = "MAX_200";
pub const ERR_DUPLICATE: &str = "DUPLICATE";
pub const ERR_INVALID_LENGTH: &str = "INVALID_LENGTH";
pub const ERR_UNKNOWN_FIXED_EXT: &str = "UNKNOWN_FIXED_EXT";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedToggleRequest {
    #[serde(default)]
    pub ext: String,
    #[serde(default)]
    pub checked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomCreateRequest {
    #[serde(default)]
    pub ext: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn created(ext: impl Into<String>) -> Self {
        Self {
            success: true,
            ext: Some(ext.into()),
            error: None,
        }
    }

    pub fn failed(code: &str) -> Self {
        Self {
            success: false,
            ext: None,
            error: Some(code.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlocklistSnapshot {
    pub fixed: BTreeMap<String, bool>,
    pub custom: Vec<String>,
    #[serde(default)]
    pub csrf_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_result_omits_empty_fields() {
        let body = serde_json::to_string(&ApiResult::ok()).unwrap();
        assert_eq!(body, r#"{"success":true}"#);

        let body = serde_json::to_string(&ApiResult::failed(ERR_MAX_200)).unwrap();
        assert_eq!(body, r#"{"success":false,"error":"MAX_200"}"#);
    }

    #[test]
    fn test_api_result_tolerates_missing_fields() {
        let parsed: ApiResult = serde_json::from_str(r#"{"success":false}"#).unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.error, None);
    }
}
