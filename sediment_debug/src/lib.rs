// Copyright 2026 the Sediment Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pretty-printing and JSON export for sediment display lists.
//!
//! This crate provides development tools for inspecting recordings:
//!
//! - [`pretty::PrettyPrintReceiver`] — an
//!   [`OpReceiver`](sediment_core::receiver::OpReceiver) that writes one
//!   indented line per dispatched op.
//! - [`pretty::PrettyPrintSink`] — a
//!   [`DispatchSink`](sediment_core::trace::DispatchSink) that writes one line
//!   per culling decision.
//! - [`json::export`] — writes a recording, its metadata and its nested
//!   recordings as a JSON document.

pub mod json;
pub mod pretty;
