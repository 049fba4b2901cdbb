// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Test doubles for the backend transport.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::watch;

use crate::data::Generation;
use crate::error::FetchError;
use crate::fetcher::Transport;

type Responder = Box<dyn Fn(&str, &Value) -> Result<String, FetchError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub path: String,
    pub body: Value,
}

/// Holds every request of one generation until released or dropped.
pub struct Gate {
    tx: watch::Sender<bool>,
}

impl Gate {
    pub fn release(&self) {
        self.tx.send_replace(true);
    }
}

/// In-memory [`Transport`] answering from a responder closure.
///
/// Requests can be held per generation (`requestId`) to reproduce responses
/// that resolve out of order.
pub struct ScriptedTransport {
    responder: Responder,
    gates: Mutex<FxHashMap<u64, watch::Receiver<bool>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, &Value) -> Result<String, FetchError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            gates: Mutex::new(FxHashMap::default()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer with a fixed JSON body per key. The key is the request's
    /// `variable`, or the path for requests without one. Unknown keys get a
    /// 404.
    pub fn fixtures<I, K>(fixtures: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let table: FxHashMap<String, String> = fixtures
            .into_iter()
            .map(|(k, v)| (k.into(), v.to_string()))
            .collect();
        Self::new(move |path, body| {
            let key = body.get("variable").and_then(Value::as_str).unwrap_or(path);
            table.get(key).cloned().ok_or_else(|| FetchError::Status {
                endpoint: path.to_string(),
                status: 404,
                body: format!("no fixture for '{key}'"),
            })
        })
    }

    /// Hold requests stamped with `generation` until the returned gate is
    /// released or dropped.
    pub fn hold(&self, generation: Generation) -> Gate {
        let (tx, rx) = watch::channel(false);
        self.gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(generation.get(), rx);
        Gate { tx }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post_json(&self, path: &str, body: &Value) -> Result<String, FetchError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                path: path.to_string(),
                body: body.clone(),
            });

        let gate = body
            .get("requestId")
            .and_then(Value::as_u64)
            .and_then(|id| {
                self.gates
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(&id)
                    .cloned()
            });
        if let Some(mut rx) = gate {
            // A dropped gate releases too.
            let _ = rx.wait_for(|open| *open).await;
        }

        (self.responder)(path, body)
    }
}
