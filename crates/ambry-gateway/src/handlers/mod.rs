// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request handlers, grouped by surface.

pub mod learning;
pub mod memory;
pub mod orchestration;
pub mod retrieval;
pub mod system;
