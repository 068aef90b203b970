// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules for the memory database.

pub mod events;
pub mod sessions;
