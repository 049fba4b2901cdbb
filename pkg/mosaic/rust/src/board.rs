// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::sync::Arc;

use futures::future::join_all;
use rustc_hash::FxHashMap;
use tracing::{info, warn};

use crate::chart::{ChartRenderer, RenderTarget};
use crate::composer::DashboardComposer;
use crate::data::TileDefinition;
use crate::error::TileError;
use crate::export::ExportFormat;
use crate::lifecycle::{RenderOutcome, Tile};
use crate::selection::{SiteId, SiteSelection};

/// All tiles of one dashboard, sharing one site selection.
pub struct TileBoard {
    tiles: Vec<Arc<Tile>>,
    index: FxHashMap<String, usize>,
    selection: SiteSelection,
}

impl TileBoard {
    pub fn new(
        definitions: Vec<TileDefinition>,
        composer: DashboardComposer,
        renderer: Arc<dyn ChartRenderer>,
        selection: SiteSelection,
    ) -> Self {
        let mut tiles = Vec::with_capacity(definitions.len());
        let mut index = FxHashMap::default();
        for definition in definitions {
            if index.contains_key(&definition.name) {
                warn!(tile = %definition.name, "duplicate tile name, keeping the first");
                continue;
            }
            index.insert(definition.name.clone(), tiles.len());
            tiles.push(Arc::new(Tile::new(
                definition,
                composer.clone(),
                renderer.clone(),
                selection.clone(),
            )));
        }
        Self {
            tiles,
            index,
            selection,
        }
    }

    pub fn tiles(&self) -> &[Arc<Tile>] {
        &self.tiles
    }

    pub fn selection(&self) -> &SiteSelection {
        &self.selection
    }

    pub fn get(&self, name: &str) -> Result<&Arc<Tile>, TileError> {
        self.index
            .get(name)
            .and_then(|&i| self.tiles.get(i))
            .ok_or_else(|| TileError::UnknownTile(name.to_string()))
    }

    pub async fn render(
        &self,
        name: &str,
        target: Option<RenderTarget>,
    ) -> Result<RenderOutcome, TileError> {
        self.get(name)?.render(target).await
    }

    pub async fn unrender(&self, name: &str) -> Result<(), TileError> {
        self.get(name)?.unrender().await
    }

    pub async fn export(&self, name: &str, format: ExportFormat) -> Result<String, TileError> {
        self.get(name)?.export(format).await
    }

    /// Replace the selection and update every active tile concurrently.
    pub async fn set_selection(
        &self,
        sites: Vec<SiteId>,
    ) -> Vec<(String, Result<RenderOutcome, TileError>)> {
        self.selection.set(sites);
        let selected = self.selection.current().len();

        let mut active = Vec::new();
        for tile in &self.tiles {
            if tile.is_active().await {
                active.push(tile.clone());
            }
        }
        info!(sites = selected, tiles = active.len(), "selection changed");

        join_all(active.into_iter().map(|tile| async move {
            let outcome = tile.update().await;
            (tile.name().to_string(), outcome)
        }))
        .await
    }
}
