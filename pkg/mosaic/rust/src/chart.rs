// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Chart collaborator port and an in-process implementation that keeps chart
//! specifications in memory for the HTTP API.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::{DashboardData, LabeledCount};
use crate::distribution::{saturating_total, Bin, Coverage};
use crate::error::ChartError;

/// Where a tile draws.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderTarget(String);

impl RenderTarget {
    pub fn new(id: impl Into<String>) -> Self {
        RenderTarget(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RenderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle to a drawn chart, kept by the tile for teardown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ChartHandle {
    pub id: Uuid,
    pub label: String,
}

pub trait ChartRenderer: Send + Sync {
    /// Remove everything drawn into `target`.
    fn clear(&self, target: &RenderTarget);

    fn render(
        &self,
        target: &RenderTarget,
        data: &DashboardData,
    ) -> Result<Vec<ChartHandle>, ChartError>;

    /// Draw the "no data" state for a tile.
    fn render_no_data(&self, target: &RenderTarget, title: &str) -> Result<(), ChartError>;

    fn destroy(&self, handle: &ChartHandle) -> Result<(), ChartError>;

    /// Drop listeners (resize, legend toggles) registered for `target`.
    fn detach_listeners(&self, target: &RenderTarget);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub name: String,
    pub count: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChartSpec {
    Histogram {
        id: Uuid,
        title: String,
        subtitle: String,
        labels: Vec<String>,
        values: Vec<u64>,
        coverage: Option<f64>,
    },
    Mirrored {
        id: Uuid,
        title: String,
        labels: Vec<String>,
        min_series: Vec<i64>,
        /// Negated so the series hangs below the axis.
        max_series: Vec<i64>,
        coverage: Option<f64>,
    },
    Stacked {
        id: Uuid,
        title: String,
        segments: Vec<Segment>,
        coverage: Option<f64>,
    },
    Bars {
        id: Uuid,
        title: String,
        segments: Vec<Segment>,
        coverage: Option<f64>,
    },
    Figure {
        id: Uuid,
        title: String,
        value: u64,
    },
}

impl ChartSpec {
    pub fn id(&self) -> Uuid {
        match self {
            ChartSpec::Histogram { id, .. }
            | ChartSpec::Mirrored { id, .. }
            | ChartSpec::Stacked { id, .. }
            | ChartSpec::Bars { id, .. }
            | ChartSpec::Figure { id, .. } => *id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            ChartSpec::Histogram { title, .. }
            | ChartSpec::Mirrored { title, .. }
            | ChartSpec::Stacked { title, .. }
            | ChartSpec::Bars { title, .. }
            | ChartSpec::Figure { title, .. } => title,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct TargetSnapshot {
    pub charts: Vec<ChartSpec>,
    pub placeholder: Option<String>,
    pub listeners: usize,
}

/// [`ChartRenderer`] that records chart specifications per target.
#[derive(Debug, Default)]
pub struct SnapshotRenderer {
    targets: Mutex<FxHashMap<RenderTarget, TargetSnapshot>>,
}

fn bin_labels(bins: &[Bin]) -> Vec<String> {
    bins.iter()
        .map(|b| format!("{:.0}", (b.range_start + b.range_end) / 2.0))
        .collect()
}

/// Counts past `i64::MAX` clamp so the negated series never wraps.
fn series_height(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

fn segments<K: fmt::Display>(categories: &[LabeledCount<K>]) -> Vec<Segment> {
    let total = saturating_total(categories.iter().map(|c| c.count));
    categories
        .iter()
        .map(|c| Segment {
            name: c.name.to_string(),
            count: c.count,
            percent: percent_of(c.count, total),
        })
        .collect()
}

fn percent_of(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 / total as f64 * 1000.0).round() / 10.0
}

fn coverage_of(coverage: &Coverage) -> Option<f64> {
    coverage.percent()
}

/// Chart specifications for every section of `data`, in display order.
pub fn chart_specs(data: &DashboardData) -> Vec<ChartSpec> {
    let mut specs = Vec::new();

    if let Some(total) = &data.sample_total {
        let mut sorted = total.categories.clone();
        sorted.sort_by(|a, b| b.count.cmp(&a.count));
        specs.push(ChartSpec::Bars {
            id: Uuid::new_v4(),
            title: total.label.clone(),
            segments: sorted
                .iter()
                .map(|c| Segment {
                    name: c.name.clone(),
                    count: c.count,
                    percent: percent_of(c.count, total.total),
                })
                .collect(),
            coverage: None,
        });
    }

    for v in &data.categorical {
        let mut sorted = v.categories.clone();
        sorted.sort_by(|a, b| b.count.cmp(&a.count));
        let total = saturating_total(sorted.iter().map(|c| c.count));
        specs.push(ChartSpec::Bars {
            id: Uuid::new_v4(),
            title: v.label.clone(),
            segments: sorted
                .iter()
                .map(|c| Segment {
                    name: c.name.clone(),
                    count: c.count,
                    percent: percent_of(c.count, total),
                })
                .collect(),
            coverage: coverage_of(&v.coverage),
        });
    }

    for v in &data.numeric {
        specs.push(ChartSpec::Histogram {
            id: Uuid::new_v4(),
            title: v.label.clone(),
            subtitle: format!("min {} / median {} / max {}", v.min, v.median, v.max),
            labels: bin_labels(&v.distribution),
            values: v.distribution.iter().map(|b| b.count).collect(),
            coverage: coverage_of(&v.coverage),
        });
    }

    if let Some(m) = &data.mirrored {
        let edges = &m.histogram.edges;
        let labels = edges
            .windows(2)
            .map(|w| match w {
                [start, end] => format!("{:.0}", (start + end) / 2.0),
                _ => String::new(),
            })
            .collect();
        specs.push(ChartSpec::Mirrored {
            id: Uuid::new_v4(),
            title: m.label.clone(),
            labels,
            min_series: m.histogram.min_counts.iter().map(|&c| series_height(c)).collect(),
            max_series: m.histogram.max_counts.iter().map(|&c| -series_height(c)).collect(),
            coverage: coverage_of(&m.coverage),
        });
    }

    for v in &data.binary {
        specs.push(ChartSpec::Stacked {
            id: Uuid::new_v4(),
            title: v.label.clone(),
            segments: segments(&v.categories),
            coverage: coverage_of(&v.coverage),
        });
    }

    for v in &data.ternary {
        specs.push(ChartSpec::Stacked {
            id: Uuid::new_v4(),
            title: v.label.clone(),
            segments: segments(&v.categories),
            coverage: coverage_of(&v.coverage),
        });
    }

    for v in &data.counts {
        specs.push(ChartSpec::Figure {
            id: Uuid::new_v4(),
            title: v.label.clone(),
            value: v.count,
        });
    }

    specs
}

impl SnapshotRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, target: &RenderTarget) -> TargetSnapshot {
        self.targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target)
            .cloned()
            .unwrap_or_default()
    }
}

impl ChartRenderer for SnapshotRenderer {
    fn clear(&self, target: &RenderTarget) {
        let mut targets = self.targets.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = targets.get_mut(target) {
            state.charts.clear();
            state.placeholder = None;
        }
    }

    fn render(
        &self,
        target: &RenderTarget,
        data: &DashboardData,
    ) -> Result<Vec<ChartHandle>, ChartError> {
        let specs = chart_specs(data);
        let handles = specs
            .iter()
            .map(|s| ChartHandle {
                id: s.id(),
                label: s.title().to_string(),
            })
            .collect();

        let mut targets = self.targets.lock().unwrap_or_else(PoisonError::into_inner);
        let state = targets.entry(target.clone()).or_default();
        state.listeners += specs.len();
        state.charts.extend(specs);
        state.placeholder = None;
        Ok(handles)
    }

    fn render_no_data(&self, target: &RenderTarget, title: &str) -> Result<(), ChartError> {
        let mut targets = self.targets.lock().unwrap_or_else(PoisonError::into_inner);
        let state = targets.entry(target.clone()).or_default();
        state.placeholder = Some(format!("No data available for {title}"));
        Ok(())
    }

    fn destroy(&self, handle: &ChartHandle) -> Result<(), ChartError> {
        let mut targets = self.targets.lock().unwrap_or_else(PoisonError::into_inner);
        for state in targets.values_mut() {
            if let Some(pos) = state.charts.iter().position(|c| c.id() == handle.id) {
                state.charts.remove(pos);
                return Ok(());
            }
        }
        Err(ChartError::UnknownHandle(handle.id.to_string()))
    }

    fn detach_listeners(&self, target: &RenderTarget) {
        let mut targets = self.targets.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = targets.get_mut(target) {
            state.listeners = 0;
        }
    }
}
