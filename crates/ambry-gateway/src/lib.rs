// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for the ambry daemon, built on axum.
//!
//! Exposes the memory, session, retrieval, learning, and orchestration
//! surfaces to event hooks and the stdio tool bridge. Hook-origin writes
//! are best-effort: failures are logged and swallowed so the user's
//! workflow never blocks on the daemon.

pub mod error;
pub mod handlers;
pub mod server;

pub use server::{build_router, start_server, AppState, ServerConfig};
