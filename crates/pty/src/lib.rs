// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY Attachment (§4.2): byte-exact forwarding between a client
//! connection and a live multiplexer pane, independent of the Supervisor's
//! polling path.

mod nbio;
pub mod attachment;
pub mod spawn;

pub use attachment::{ConnectionId, PtyAttachment, PtyEvent};
pub use spawn::{AttachedPty, PtyExitStatus};
