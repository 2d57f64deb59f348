// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session Supervisor (§4.4): lifecycle, output polling, ring-buffered
//! history, event emission, startup reconciliation.

pub mod diff;
pub mod events;
pub mod registry;
pub mod supervisor;

pub use events::SupervisorEvent;
pub use registry::{ActiveSession, SessionRegistry};
pub use supervisor::{StartSessionRequest, Supervisor, DEFAULT_POLL_INTERVAL, DEFAULT_RING_CAPACITY, STOP_GRACE};

#[cfg(test)]
mod integration_tests;
