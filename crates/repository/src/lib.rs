// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence contract and an in-memory double (§6). The relational store
//! itself is out of scope; everything above this crate programs against
//! [`contract::Repository`].

pub mod contract;
pub mod memory;

pub use contract::{
    HandoffEventsRepository, NotificationsRepository, ProjectPatch, ProjectsRepository, Repository,
    SessionPatch, SessionsRepository, TicketPatch, TicketStateHistoryRepository, TicketsRepository,
};
pub use memory::InMemoryRepository;
