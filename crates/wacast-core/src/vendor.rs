// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging vendor error model and code catalogue.
//!
//! Every error the vendor returns, synchronously on send or asynchronously
//! in a `failed` webhook, is reduced to an [`ErrorCategory`]. The category,
//! never the raw code, decides what the engine does next.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::types::FailureDetail;

/// "Throughput exceeded": the one code that drives rate control.
pub const THROUGHPUT_EXCEEDED: i64 = 130_429;

/// Error object as returned by the vendor API and webhook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorError {
    pub code: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error_data: Option<ErrorData>,
    #[serde(default)]
    pub fbtrace_id: Option<String>,
    #[serde(default)]
    pub error_subcode: Option<i64>,
    #[serde(default)]
    pub href: Option<String>,
}

/// Free-form detail block attached to vendor errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    #[serde(default)]
    pub details: Option<String>,
}

/// What a vendor error means for the recipient and the pipeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Sender exceeded its allowed throughput.
    Throttle,
    /// The recipient cannot receive this message (invalid or undeliverable number).
    Permanent,
    /// The recipient opted out or blocked the business.
    OptOut,
    /// Temporary condition; a later send may succeed.
    Retryable,
    /// Account, token, or template misconfiguration on the sender side.
    Configuration,
    /// Not in the catalogue.
    Unknown,
}

impl ErrorCategory {
    /// Categories that warrant an operator-visible alert.
    pub fn is_critical(self) -> bool {
        matches!(self, Self::Configuration)
    }
}

/// Map a vendor error code to its category.
pub fn categorize(code: i64) -> ErrorCategory {
    match code {
        THROUGHPUT_EXCEEDED => ErrorCategory::Throttle,
        131_050 => ErrorCategory::OptOut,
        131_026 | 131_021 | 131_051 | 133_010 => ErrorCategory::Permanent,
        131_047 | 131_049 | 131_056 | 130_472 | 131_000 | 131_016 | 4 | 80_007 => {
            ErrorCategory::Retryable
        }
        131_031 | 131_042 | 131_045 | 132_000 | 132_001 | 132_005 | 132_007 | 132_012
        | 132_015 | 132_016 | 131_008 | 131_009 | 100 | 190 | 10 | 200 => {
            ErrorCategory::Configuration
        }
        _ => ErrorCategory::Unknown,
    }
}

impl VendorError {
    /// Category of this error's code.
    pub fn category(&self) -> ErrorCategory {
        categorize(self.code)
    }

    /// Whether this is the throughput-exceeded signal.
    pub fn is_throttle(&self) -> bool {
        self.code == THROUGHPUT_EXCEEDED
    }

    /// Human-readable title, falling back to the message and then the code.
    pub fn display_title(&self) -> String {
        self.title
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| format!("vendor error {}", self.code))
    }

    /// Convert into the failure detail stored on a recipient.
    pub fn to_failure(&self) -> FailureDetail {
        let details = self
            .error_data
            .as_ref()
            .and_then(|d| d.details.clone())
            .or_else(|| self.message.clone());
        FailureDetail {
            code: Some(self.code),
            title: self.display_title(),
            details,
            trace_id: self.fbtrace_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throughput_exceeded_is_the_only_throttle_code() {
        assert_eq!(categorize(130_429), ErrorCategory::Throttle);
        assert_ne!(categorize(131_056), ErrorCategory::Throttle);
        assert_ne!(categorize(80_007), ErrorCategory::Throttle);
    }

    #[test]
    fn opt_out_and_permanent_codes() {
        assert_eq!(categorize(131_050), ErrorCategory::OptOut);
        assert_eq!(categorize(131_026), ErrorCategory::Permanent);
        assert_eq!(categorize(999_999), ErrorCategory::Unknown);
    }

    #[test]
    fn configuration_errors_are_critical() {
        assert!(categorize(132_001).is_critical());
        assert!(categorize(190).is_critical());
        assert!(!categorize(131_026).is_critical());
        assert!(!categorize(130_429).is_critical());
    }

    #[test]
    fn vendor_error_parses_api_shape() {
        let json = r#"{
            "message": "(#131026) Message undeliverable",
            "type": "OAuthException",
            "code": 131026,
            "error_data": {"messaging_product": "whatsapp", "details": "Receiver is incapable"},
            "fbtrace_id": "AbCdEf"
        }"#;
        let err: VendorError = serde_json::from_str(json).unwrap();
        assert_eq!(err.code, 131_026);
        let failure = err.to_failure();
        assert_eq!(failure.code, Some(131_026));
        assert_eq!(failure.title, "(#131026) Message undeliverable");
        assert_eq!(failure.details.as_deref(), Some("Receiver is incapable"));
        assert_eq!(failure.trace_id.as_deref(), Some("AbCdEf"));
    }
}
