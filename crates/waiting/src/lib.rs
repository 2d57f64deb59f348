// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Waiting-State Detector (§4.6): fuses output, telemetry, and hook
//! signals into a single debounced per-session waiting flag.

pub mod detector;
pub mod matcher;
pub mod types;

pub use detector::WaitingDetector;
pub use matcher::OutputMatcher;
pub use types::{Candidate, HookPayload, Source, WaitingConfig, WaitingEvent, WaitingReason, WaitingState};
