// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Built-in dendrochronology tiles, used when no tile configuration is found.

use phf::phf_map;

use crate::data::{MirrorPair, TileDefinition, TileLayout, VariableKind, VariableSpec};

pub const TREE_SPECIES: &str = "Tree species";
pub const SAMPLE_TYPES: &str = "Sample types";
pub const SAPWOOD: &str = "Sapwood (Sp)";
pub const BARK: &str = "Bark (B)";
pub const WANEY_EDGE: &str = "Waney edge (W)";
pub const PITH: &str = "Pith (P)";
pub const EW_LW: &str = "EW/LW measurements";
pub const TREE_RINGS: &str = "Tree rings";
pub const ANALYSED_RADII: &str = "Number of analysed radii.";
pub const TREE_AGE_MIN: &str = "Tree age ≥";
pub const TREE_AGE_MAX: &str = "Tree age ≤";

static DESCRIPTIONS: phf::Map<&'static str, &'static str> = phf_map! {
    "Tree species" => "Distribution of tree species in the dataset",
    "Sample types" => "Distribution of sample types in the dataset",
    "Sapwood (Sp)" => "Number of sapwood rings in the sample",
    "Bark (B)" => "Presence of bark on the sample",
    "Waney edge (W)" => "Presence of waney edge (natural edge with bark) on the sample",
    "Pith (P)" => "Number of rings from pith (center of tree) to the sample edge",
    "EW/LW measurements" => "Early wood and late wood measurements available",
    "Tree rings" => "Number of tree rings counted in the sample",
    "Number of analysed radii." => "Number of radii that were analyzed from the tree sample",
    "Tree age ≥" => "Minimum estimated age of the tree",
    "Tree age ≤" => "Maximum estimated age of the tree",
};

pub fn description(variable: &str) -> Option<&'static str> {
    DESCRIPTIONS.get(variable).copied()
}

fn spec(name: &str, kind: VariableKind) -> VariableSpec {
    let spec = VariableSpec::new(name, kind);
    match description(name) {
        Some(d) => spec.with_description(d),
        None => spec,
    }
}

fn tree_age() -> MirrorPair {
    MirrorPair {
        min: TREE_AGE_MIN.to_string(),
        max: TREE_AGE_MAX.to_string(),
        label: "Tree age".to_string(),
    }
}

/// A tile showing one variable, with the sample total fetched alongside it
/// for coverage.
fn single(name: &str, title: &str, variable: &str, kind: VariableKind) -> TileDefinition {
    TileDefinition {
        name: name.to_string(),
        title: title.to_string(),
        description: description(variable).unwrap_or_default().to_string(),
        layout: TileLayout::new(vec![
            spec(variable, kind),
            spec(SAMPLE_TYPES, VariableKind::SampleTotal),
        ]),
    }
}

pub fn builtin_tiles() -> Vec<TileDefinition> {
    use VariableKind::*;

    let dashboard = TileDefinition {
        name: "dendro-dashboard".to_string(),
        title: "Dendro dashboard".to_string(),
        description: "Overview of dendrochronological variables for the selected sites".to_string(),
        layout: TileLayout::new(vec![
            spec(TREE_SPECIES, Categorical),
            spec(SAMPLE_TYPES, SampleTotal),
            spec(SAPWOOD, Numeric),
            spec(BARK, Binary),
            spec(WANEY_EDGE, Ternary),
            spec(PITH, Numeric),
            spec(EW_LW, Binary),
            spec(TREE_RINGS, Numeric),
            spec(ANALYSED_RADII, Numeric),
            spec(TREE_AGE_MIN, Numeric),
            spec(TREE_AGE_MAX, Numeric),
        ])
        .with_mirror(tree_age()),
    };

    let tree_age_tile = TileDefinition {
        name: "dendro-tree-age".to_string(),
        title: "Tree age".to_string(),
        description: "Estimated minimum and maximum tree age".to_string(),
        layout: TileLayout::new(vec![
            spec(TREE_AGE_MIN, Numeric),
            spec(TREE_AGE_MAX, Numeric),
            spec(SAMPLE_TYPES, SampleTotal),
        ])
        .with_mirror(tree_age()),
    };

    let sample_types = TileDefinition {
        name: "dendro-sample-types".to_string(),
        title: "Sample types".to_string(),
        description: description(SAMPLE_TYPES).unwrap_or_default().to_string(),
        layout: TileLayout::new(vec![spec(SAMPLE_TYPES, SampleTotal)]),
    };

    vec![
        dashboard,
        single("dendro-sapwood", "Sapwood", SAPWOOD, Numeric),
        single("dendro-pith", "Pith", PITH, Numeric),
        single("dendro-tree-rings", "Tree rings", TREE_RINGS, Numeric),
        single("dendro-analysed-radii", "Analysed radii", ANALYSED_RADII, Numeric),
        single("dendro-bark", "Bark", BARK, Binary),
        single("dendro-ew-lw", "EW/LW measurements", EW_LW, Binary),
        single("dendro-waney-edge", "Waney edge", WANEY_EDGE, Ternary),
        single("dendro-tree-species", "Tree species", TREE_SPECIES, Categorical),
        sample_types,
        tree_age_tile,
    ]
}
