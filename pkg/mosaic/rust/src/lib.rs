// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Tile dashboard engine.
//!
//! Each tile fetches a set of aggregate variables for the currently selected
//! sites, normalizes the free-text categories returned by the backend into
//! typed statistics, and hands the result to a chart collaborator. Responses
//! are fenced by request generation so a slow fetch can never overwrite the
//! output of a newer one.

// Correctness
#![deny(clippy::indexing_slicing)]
#![deny(clippy::string_slice)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

pub mod board;
pub mod catalog;
pub mod chart;
pub mod composer;
pub mod config;
pub mod data;
pub mod distribution;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod lifecycle;
pub mod parse;
pub mod selection;
pub mod server;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use board::TileBoard;
pub use composer::DashboardComposer;
pub use data::{DashboardData, Generation, RawCategory, TileLayout, VariableKind, VariableSpec};
pub use error::{ChartError, FetchError, FetchFailure, TileError};
pub use fetcher::{HttpTransport, Transport, VariableFetcher};
pub use lifecycle::{RenderOutcome, Tile, TileState};
pub use selection::{SiteId, SiteSelection};
