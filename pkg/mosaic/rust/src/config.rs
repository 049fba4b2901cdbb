// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rustc_hash::FxHashSet;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::catalog;
use crate::data::{MirrorPair, TileDefinition, TileLayout, VariableKind, VariableSpec};
use crate::distribution::DEFAULT_BINS;

const DEFAULT_TILES_DIR: &str = "/etc/mosaic/tiles.d";

fn default_bins() -> usize {
    DEFAULT_BINS
}

/// One `tiles.d/<name>.yaml` file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TileConfig {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_bins")]
    pub bins: usize,
    pub variables: Vec<VariableSpec>,
    #[serde(default)]
    pub mirror: Option<MirrorPair>,
    #[serde(default)]
    pub coverage_reference: Option<String>,
}

impl TileConfig {
    /// Validate the config and turn it into a tile named `name`. Variables
    /// without a description get the built-in one, if any.
    pub fn into_definition(self, name: &str) -> Result<TileDefinition> {
        let variables = self
            .variables
            .into_iter()
            .map(|v| match (&v.description, catalog::description(&v.name)) {
                (None, Some(d)) => v.with_description(d),
                _ => v,
            })
            .collect();

        let layout = TileLayout {
            variables,
            mirror: self.mirror,
            coverage_reference: self.coverage_reference,
            bins: self.bins,
        };
        validate_layout(&layout).with_context(|| format!("invalid tile '{name}'"))?;

        Ok(TileDefinition {
            name: name.to_string(),
            title: self.title.unwrap_or_else(|| name.to_string()),
            description: self.description,
            layout,
        })
    }
}

pub fn validate_layout(layout: &TileLayout) -> Result<()> {
    if layout.variables.is_empty() {
        bail!("no variables declared");
    }
    if layout.bins == 0 {
        bail!("bins must be at least 1");
    }

    let mut seen = FxHashSet::default();
    let mut sample_total: Option<&str> = None;
    for v in &layout.variables {
        if v.name.trim().is_empty() {
            bail!("variable with an empty name");
        }
        if !seen.insert(v.name.as_str()) {
            bail!("variable '{}' declared twice", v.name);
        }
        if v.kind == VariableKind::SampleTotal {
            if let Some(first) = sample_total {
                bail!("'{}' is a second sample_total variable after '{}'", v.name, first);
            }
            sample_total = Some(v.name.as_str());
        }
    }

    if let Some(mirror) = &layout.mirror {
        if mirror.min == mirror.max {
            bail!("mirror pair uses '{}' on both sides", mirror.min);
        }
        for side in [&mirror.min, &mirror.max] {
            match layout.variable(side) {
                Some(v) if v.kind == VariableKind::Numeric => {}
                Some(v) => bail!("mirror variable '{}' is {}, not numeric", side, v.kind),
                None => bail!("mirror variable '{}' is not declared", side),
            }
        }
    }

    if let Some(reference) = &layout.coverage_reference {
        if layout.variable(reference).is_none() {
            bail!("coverage reference '{}' is not declared", reference);
        }
    }

    Ok(())
}

pub fn tiles_dir() -> PathBuf {
    std::env::var("MOSAIC_TILES_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_TILES_DIR))
}

/// Scan a directory for `*.yaml` / `*.yml` files and parse each into a tile.
/// The tile name is the file name without extension. Files that fail to
/// parse or validate are logged and skipped.
pub fn load_tile_configs(dir: &Path) -> Result<Vec<TileDefinition>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read tiles directory: {}", dir.display()))?;

    let mut yaml_files: Vec<_> = entries
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("skipping unreadable entry in {}: {e}", dir.display());
                None
            }
        })
        .filter(|e| {
            let is_yaml = e
                .path()
                .extension()
                .is_some_and(|ext| ext == "yaml" || ext == "yml");
            if !is_yaml {
                debug!("skipping non-YAML file: {}", e.path().display());
            }
            is_yaml
        })
        .collect();

    yaml_files.sort_by_key(|e| e.file_name());

    let mut tiles = Vec::new();
    for entry in yaml_files {
        let path = entry.path();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        match parse_config(&path).and_then(|config| config.into_definition(&name)) {
            Ok(tile) => tiles.push(tile),
            Err(e) => warn!("skipping {}: {e:#}", path.display()),
        }
    }

    Ok(tiles)
}

fn parse_config(path: &Path) -> Result<TileConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: TileConfig =
        serde_yaml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}

/// Tiles from `dir`, or the built-in catalog when `dir` does not exist.
pub fn load_tiles(dir: &Path) -> Result<Vec<TileDefinition>> {
    if !dir.exists() {
        info!(
            dir = %dir.display(),
            "tiles directory not found, using built-in dendro tiles"
        );
        return Ok(catalog::builtin_tiles());
    }
    let tiles = load_tile_configs(dir)?;
    if tiles.is_empty() {
        warn!(dir = %dir.display(), "no valid tile configurations found");
    }
    Ok(tiles)
}
