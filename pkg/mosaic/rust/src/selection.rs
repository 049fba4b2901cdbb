// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use tokio::sync::watch;

pub type SiteId = u64;

fn dedup(sites: Vec<SiteId>) -> Vec<SiteId> {
    let mut seen = FxHashSet::default();
    sites.into_iter().filter(|s| seen.insert(*s)).collect()
}

/// The set of selected sites, shared by every tile of a dashboard.
///
/// Fetches read the selection when they serialize their request body, not
/// when a render starts, so a cycle always asks for whatever was selected at
/// the moment its request left.
#[derive(Debug, Clone)]
pub struct SiteSelection {
    tx: Arc<watch::Sender<Arc<Vec<SiteId>>>>,
}

impl SiteSelection {
    pub fn new(sites: Vec<SiteId>) -> Self {
        let (tx, _) = watch::channel(Arc::new(dedup(sites)));
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> Arc<Vec<SiteId>> {
        self.tx.borrow().clone()
    }

    /// Replace the selection. Duplicate ids are dropped, keeping first-seen
    /// order.
    pub fn set(&self, sites: Vec<SiteId>) {
        self.tx.send_replace(Arc::new(dedup(sites)));
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<SiteId>>> {
        self.tx.subscribe()
    }
}

impl Default for SiteSelection {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
