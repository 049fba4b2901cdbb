// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Tile lifecycle: render, update and unrender with request fencing.
//!
//! Every render or update starts a new fetch cycle stamped with the next
//! generation. Cycles are never cancelled. When a cycle's data arrives it is
//! checked against a [`TileRequestToken`] taken at that moment: data from a
//! superseded cycle, or arriving after teardown started, is discarded.
//!
//! `unrender` bumps the generation to fence out everything in flight, then
//! waits for the in-flight counter to reach zero before releasing charts.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

use crate::chart::{ChartHandle, ChartRenderer, RenderTarget};
use crate::composer::DashboardComposer;
use crate::data::{
    DashboardData, Generation, StaleReason, TileDefinition, TileLayout, TileRequestToken,
};
use crate::error::TileError;
use crate::export::{format_for_export, ExportFormat};
use crate::selection::SiteSelection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TileState {
    Idle,
    Rendering,
    Active,
    Unrendering,
}

impl TileState {
    pub fn can_transition_to(&self, next: TileState) -> bool {
        use TileState::*;
        matches!(
            (self, next),
            (Idle, Rendering)
                | (Rendering, Active)
                | (Active, Rendering)
                | (Rendering, Unrendering)
                | (Active, Unrendering)
                | (Unrendering, Idle)
        )
    }
}

impl std::fmt::Display for TileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TileState::Idle => "idle",
            TileState::Rendering => "rendering",
            TileState::Active => "active",
            TileState::Unrendering => "unrendering",
        };
        f.write_str(s)
    }
}

/// What happened to the data of one fetch cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RenderOutcome {
    Applied {
        generation: Generation,
        sections: usize,
    },
    /// The cycle completed with no sections; the "no data" state is shown.
    NoData { generation: Generation },
    Discarded {
        generation: Generation,
        reason: StaleReason,
    },
}

impl RenderOutcome {
    pub fn generation(&self) -> Generation {
        match self {
            RenderOutcome::Applied { generation, .. }
            | RenderOutcome::NoData { generation }
            | RenderOutcome::Discarded { generation, .. } => *generation,
        }
    }

    pub fn is_discarded(&self) -> bool {
        matches!(self, RenderOutcome::Discarded { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TileSummary {
    pub name: String,
    pub title: String,
    pub description: String,
    pub state: TileState,
    pub generation: Generation,
    pub active: bool,
    pub target: Option<RenderTarget>,
    pub has_data: bool,
}

struct TileInner {
    state: TileState,
    target: Option<RenderTarget>,
    active: bool,
    generation: Generation,
    data: Option<Arc<DashboardData>>,
    charts: Vec<ChartHandle>,
}

/// Counts a fetch cycle as in flight until dropped, including when the
/// render future itself is dropped.
struct CycleGuard<'a> {
    in_flight: &'a watch::Sender<usize>,
}

impl<'a> CycleGuard<'a> {
    fn enter(in_flight: &'a watch::Sender<usize>) -> Self {
        in_flight.send_modify(|n| *n += 1);
        Self { in_flight }
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// One dashboard panel.
pub struct Tile {
    definition: TileDefinition,
    composer: DashboardComposer,
    renderer: Arc<dyn ChartRenderer>,
    selection: SiteSelection,
    inner: RwLock<TileInner>,
    in_flight: watch::Sender<usize>,
}

impl Tile {
    pub fn new(
        definition: TileDefinition,
        composer: DashboardComposer,
        renderer: Arc<dyn ChartRenderer>,
        selection: SiteSelection,
    ) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            definition,
            composer,
            renderer,
            selection,
            inner: RwLock::new(TileInner {
                state: TileState::Idle,
                target: None,
                active: false,
                generation: Generation::ZERO,
                data: None,
                charts: Vec::new(),
            }),
            in_flight,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn title(&self) -> &str {
        &self.definition.title
    }

    pub fn layout(&self) -> &TileLayout {
        &self.definition.layout
    }

    pub async fn state(&self) -> TileState {
        self.inner.read().await.state
    }

    pub async fn is_active(&self) -> bool {
        self.inner.read().await.active
    }

    pub async fn target(&self) -> Option<RenderTarget> {
        self.inner.read().await.target.clone()
    }

    /// Data of the last applied cycle.
    pub async fn data(&self) -> Option<Arc<DashboardData>> {
        self.inner.read().await.data.clone()
    }

    pub async fn token(&self) -> TileRequestToken {
        let inner = self.inner.read().await;
        Self::token_of(&inner)
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    pub async fn summary(&self) -> TileSummary {
        let inner = self.inner.read().await;
        TileSummary {
            name: self.definition.name.clone(),
            title: self.definition.title.clone(),
            description: self.definition.description.clone(),
            state: inner.state,
            generation: inner.generation,
            active: inner.active,
            target: inner.target.clone(),
            has_data: inner.data.is_some(),
        }
    }

    fn token_of(inner: &TileInner) -> TileRequestToken {
        TileRequestToken {
            generation: inner.generation,
            module_active: inner.active && inner.state != TileState::Unrendering,
        }
    }

    fn transition(&self, inner: &mut TileInner, next: TileState) {
        if inner.state == next {
            return;
        }
        if !inner.state.can_transition_to(next) {
            warn!(tile = %self.name(), from = %inner.state, to = %next, "unexpected state transition");
        }
        debug!(tile = %self.name(), from = %inner.state, to = %next, "state transition");
        inner.state = next;
    }

    fn destroy_charts(&self, inner: &mut TileInner) {
        for handle in inner.charts.drain(..) {
            if let Err(e) = self.renderer.destroy(&handle) {
                debug!(tile = %self.definition.name, chart = %handle.label, error = %e, "chart already gone");
            }
        }
    }

    /// Start a fetch cycle and draw its result into `target`, or into the
    /// previous target when `None`. The target is emptied of charts and
    /// listeners first, and so is the previous one when it differs.
    ///
    /// Fails with [`TileError::MissingRenderTarget`] without side effects
    /// when no target is known. Data that loses the fencing check is
    /// reported as [`RenderOutcome::Discarded`].
    pub async fn render(&self, target: Option<RenderTarget>) -> Result<RenderOutcome, TileError> {
        let (generation, target, _cycle) = {
            let mut inner = self.inner.write().await;
            if inner.state == TileState::Unrendering {
                return Err(TileError::TearingDown(self.name().to_string()));
            }
            let Some(target) = target.or_else(|| inner.target.clone()) else {
                warn!(tile = %self.name(), "render called without a target");
                return Err(TileError::MissingRenderTarget(self.name().to_string()));
            };

            let previous = inner.target.replace(target.clone());
            inner.active = true;
            inner.generation = inner.generation.next();
            self.transition(&mut inner, TileState::Rendering);
            self.destroy_charts(&mut inner);
            if let Some(old) = previous.filter(|old| *old != target) {
                debug!(tile = %self.name(), from = %old, to = %target, "switching render target");
                self.renderer.detach_listeners(&old);
                self.renderer.clear(&old);
            }
            self.renderer.detach_listeners(&target);
            self.renderer.clear(&target);

            (inner.generation, target, CycleGuard::enter(&self.in_flight))
        };

        debug!(tile = %self.name(), generation = %generation, target = %target, "render started");

        let data = self
            .composer
            .build_dashboard(&self.definition.layout, &self.selection, generation)
            .await;

        let mut inner = self.inner.write().await;
        if let Err(reason) = Self::token_of(&inner).admits(data.generation) {
            info!(
                tile = %self.name(),
                generation = %generation,
                reason = %reason,
                "discarding stale response"
            );
            return Ok(RenderOutcome::Discarded { generation, reason });
        }

        let sections = data.section_count();
        let drawn = if data.is_empty() {
            self.renderer
                .render_no_data(&target, &self.definition.title)
                .map(|()| Vec::new())
        } else {
            self.renderer.render(&target, &data)
        };

        inner.data = Some(Arc::new(data));
        self.transition(&mut inner, TileState::Active);

        let charts = drawn.map_err(|e| {
            error!(tile = %self.name(), generation = %generation, error = %e, "chart rendering failed");
            TileError::Chart(e)
        })?;
        inner.charts = charts;

        info!(tile = %self.name(), generation = %generation, sections, "render complete");
        if sections == 0 {
            Ok(RenderOutcome::NoData { generation })
        } else {
            Ok(RenderOutcome::Applied {
                generation,
                sections,
            })
        }
    }

    /// Re-run the fetch-and-render path against the current target.
    pub async fn update(&self) -> Result<RenderOutcome, TileError> {
        self.render(None).await
    }

    /// Tear the tile down once every in-flight cycle has completed.
    pub async fn unrender(&self) -> Result<(), TileError> {
        let fence = {
            let mut inner = self.inner.write().await;
            if inner.state == TileState::Unrendering {
                return Err(TileError::TearingDown(self.name().to_string()));
            }
            if inner.target.is_none() {
                warn!(tile = %self.name(), "unrender called without a target");
                return Err(TileError::MissingRenderTarget(self.name().to_string()));
            }
            inner.generation = inner.generation.next();
            self.transition(&mut inner, TileState::Unrendering);
            inner.generation
        };

        let mut in_flight = self.in_flight.subscribe();
        if *in_flight.borrow() > 0 {
            debug!(tile = %self.name(), cycles = *in_flight.borrow(), "waiting for in-flight cycles");
        }
        // The sender lives as long as the tile, so this only returns once the
        // count reaches zero.
        let _ = in_flight.wait_for(|n| *n == 0).await;

        let mut inner = self.inner.write().await;
        self.destroy_charts(&mut inner);
        if let Some(target) = inner.target.take() {
            self.renderer.detach_listeners(&target);
            self.renderer.clear(&target);
        }
        inner.active = false;
        inner.data = None;
        self.transition(&mut inner, TileState::Idle);

        info!(tile = %self.name(), generation = %fence, "unrendered");
        Ok(())
    }

    /// Export the last applied data. Never mutates it.
    pub async fn export(&self, format: ExportFormat) -> Result<String, TileError> {
        let data = self
            .data()
            .await
            .ok_or_else(|| TileError::NoData(self.name().to_string()))?;
        format_for_export(&data, format)
            .map_err(|e| TileError::Export(self.name().to_string(), e.to_string()))
    }
}
