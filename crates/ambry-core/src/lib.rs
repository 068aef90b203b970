// SPDX-FileCopyrightText: 2026 Ambry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the ambry developer-assistance daemon.
//!
//! This crate provides the error taxonomy, timestamp helpers, and atomic
//! filesystem primitives shared by every other workspace crate.

pub mod error;
pub mod fsutil;
pub mod time;

pub use error::AmbryError;
