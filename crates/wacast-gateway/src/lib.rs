// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for the Wacast dispatch engine.
//!
//! One axum server carries three surfaces: the dispatch trigger, the vendor
//! webhook (subscription handshake and signed status callbacks), and the
//! operator API for campaign control, suppressions, alerts and throttle
//! resets. Health and Prometheus metrics are served unauthenticated.

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::AuthConfig;
pub use handlers::ApiError;
pub use server::{GatewayState, HealthState, ServerConfig, router, start_server};
