// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque multiplexer pane identity (§6). Unlike the entity ids in
//! [`crate::ids`], a pane id is not a UUID — it is whatever token the
//! multiplexer hands back (the implementation's convention uses a leading
//! "%", e.g. "%5").

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const SENTINEL: char = '%';

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaneId(String);

impl PaneId {
    /// Validates the sentinel-prefixed shape (§6, §8). Rejects sentinel
    /// placeholder values such as a literal "claude-code" that are not
    /// real multiplexer panes (§4.2).
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.starts_with(SENTINEL) && raw.len() > 1 {
            Ok(Self(raw))
        } else {
            Err(Error::validation(format!("'{raw}' is not a valid pane id")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
