// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook signature verification using HMAC-SHA256.
//!
//! The vendor signs each webhook body with the app secret and sends the
//! result as `sha256=<hex>`. Verification runs over the raw bytes, before
//! any parsing.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use wacast_core::WacastError;

type HmacSha256 = Hmac<Sha256>;

/// Header names that may carry the signature, in lookup order.
pub const SIGNATURE_HEADERS: [&str; 2] = ["x-hub-signature-256", "x-signature-256"];

fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_sig = header.trim().strip_prefix("sha256=")?;
    hex::decode(hex_sig).ok()
}

fn mac_for(secret: &str) -> Result<HmacSha256, WacastError> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| WacastError::Internal(format!("hmac key rejected: {e}")))
}

/// Header value (`sha256=<hex>`) for `payload` signed with `secret`.
pub fn sign_payload(payload: &[u8], secret: &str) -> Result<String, WacastError> {
    let mut mac = mac_for(secret)?;
    mac.update(payload);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Verify a webhook signature header against the raw body.
///
/// A missing or malformed header fails the same way as a wrong digest.
/// The comparison is constant time.
pub fn verify_signature(
    payload: &[u8],
    header: Option<&str>,
    secret: &str,
) -> Result<(), WacastError> {
    let expected = header
        .and_then(parse_signature_header)
        .ok_or(WacastError::Signature)?;
    let mut mac = mac_for(secret)?;
    mac.update(payload);
    mac.verify_slice(&expected).map_err(|_| WacastError::Signature)
}
