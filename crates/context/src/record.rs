// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Telemetry record shape (§6): one JSON object per line written by the
//! assistant process to its telemetry file.

use serde::Deserialize;

/// A single line of telemetry. Unknown fields are ignored so older or
/// newer assistant builds can add fields without breaking parsing.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryRecord {
    pub timestamp: i64,
    pub event_kind: String,
    #[serde(default)]
    pub context_remaining_percent: Option<u8>,
    #[serde(default)]
    pub waiting_state: Option<String>,
}
