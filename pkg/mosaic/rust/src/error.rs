// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::time::Duration;

use thiserror::Error;

use crate::data::Generation;

/// Transport-level failure of a single variable request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    #[error("request to '{endpoint}' failed: {message}")]
    Network { endpoint: String, message: String },

    #[error("backend error on '{endpoint}': {status} {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("request to '{endpoint}' timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },
}

/// A failed fetch, stamped with the variable and generation it belonged to.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("fetching '{variable}' (generation {generation}): {error}")]
pub struct FetchFailure {
    pub variable: String,
    pub generation: Generation,
    #[source]
    pub error: FetchError,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChartError {
    #[error("chart '{0}' was already destroyed")]
    UnknownHandle(String),

    #[error("renderer failed: {0}")]
    Render(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TileError {
    #[error("tile '{0}' has no render target")]
    MissingRenderTarget(String),

    #[error("tile '{0}' is being torn down")]
    TearingDown(String),

    #[error("tile '{0}' has no rendered data")]
    NoData(String),

    #[error("tile '{0}' not found")]
    UnknownTile(String),

    #[error("exporting tile '{0}': {1}")]
    Export(String, String),

    #[error(transparent)]
    Chart(#[from] ChartError),
}
