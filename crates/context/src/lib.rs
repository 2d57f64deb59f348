// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Context Monitor (§4.5): per-session telemetry tailing and
//! threshold-crossing detection.

pub mod monitor;
pub mod record;
pub mod telemetry;

pub use monitor::{ContextEvent, ContextMonitor, ContextSample, DEFAULT_HYSTERESIS_PERCENT, DEFAULT_THRESHOLD_PERCENT};
pub use record::TelemetryRecord;
pub use telemetry::TelemetryTailer;
