// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Data types shared by the fetcher, composer and tiles.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::distribution::{Bin, Coverage, MirroredHistogram, Summary, DEFAULT_BINS};
use crate::parse::{BinaryValue, TernaryValue};

/// One observed category and its frequency.
///
/// Deserialization is lenient about the backend's record shapes: numeric
/// names are stringified, a null name becomes empty, counts may arrive as
/// strings, and dating-histogram records (`startYear`, `endYear`,
/// `datingsNum`) become a `"start - end"` category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireRecord")]
pub struct RawCategory {
    pub name: String,
    pub count: u64,
}

impl RawCategory {
    pub fn new(name: impl Into<String>, count: u64) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRecord {
    #[serde(default)]
    name: Value,
    #[serde(default)]
    count: Value,
    #[serde(default)]
    start_year: Value,
    #[serde(default)]
    end_year: Value,
    #[serde(default)]
    datings_num: Value,
}

fn label_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn count_of(value: &Value) -> Result<u64, String> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
            .ok_or_else(|| format!("count {n} is not a non-negative integer")),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("count '{s}' is not a non-negative integer: {e}")),
        Value::Null => Err("record has no count".to_string()),
        other => Err(format!("unexpected count {other}")),
    }
}

impl TryFrom<WireRecord> for RawCategory {
    type Error = String;

    fn try_from(record: WireRecord) -> Result<Self, Self::Error> {
        if record.name.is_null() && !record.datings_num.is_null() {
            return Ok(RawCategory {
                name: format!(
                    "{} - {}",
                    label_of(&record.start_year),
                    label_of(&record.end_year)
                ),
                count: count_of(&record.datings_num)?,
            });
        }
        Ok(RawCategory {
            name: label_of(&record.name),
            count: count_of(&record.count)?,
        })
    }
}

/// Monotonic id of one fetch cycle of a tile.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    pub const ZERO: Generation = Generation(0);

    pub fn new(value: u64) -> Self {
        Generation(value)
    }

    pub fn next(self) -> Self {
        Generation(self.0.saturating_add(1))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a response was fenced out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StaleReason {
    /// The tile was unrendered (or is being torn down) when the response
    /// arrived.
    Inactive,
    /// A newer cycle started after this one.
    Superseded {
        response: Generation,
        current: Generation,
    },
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::Inactive => f.write_str("tile is no longer active"),
            StaleReason::Superseded { response, current } => {
                write!(f, "generation {response} superseded by {current}")
            }
        }
    }
}

/// Snapshot of the fencing state of a tile at the moment a response resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TileRequestToken {
    pub generation: Generation,
    pub module_active: bool,
}

impl TileRequestToken {
    /// A response stamped `response` may be applied only while the tile is
    /// active and no newer cycle has started.
    pub fn admits(&self, response: Generation) -> Result<(), StaleReason> {
        if !self.module_active {
            return Err(StaleReason::Inactive);
        }
        if response < self.generation {
            return Err(StaleReason::Superseded {
                response,
                current: self.generation,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    Numeric,
    Binary,
    Ternary,
    Categorical,
    /// Sum of all category counts.
    Count,
    /// Categories with one observation per sample; the sum is the total
    /// sample count used as coverage denominator.
    SampleTotal,
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VariableKind::Numeric => "numeric",
            VariableKind::Binary => "binary",
            VariableKind::Ternary => "ternary",
            VariableKind::Categorical => "categorical",
            VariableKind::Count => "count",
            VariableKind::SampleTotal => "sample_total",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    pub kind: VariableKind,
    #[serde(default)]
    pub description: Option<String>,
    /// Overrides the fetcher's endpoint for this kind.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl VariableSpec {
    pub fn new(name: impl Into<String>, kind: VariableKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            endpoint: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

/// Two numeric variables shown as one mirrored chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorPair {
    pub min: String,
    pub max: String,
    pub label: String,
}

/// Everything a composer needs to build one tile's dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileLayout {
    pub variables: Vec<VariableSpec>,
    pub mirror: Option<MirrorPair>,
    pub coverage_reference: Option<String>,
    pub bins: usize,
}

impl TileLayout {
    pub fn new(variables: Vec<VariableSpec>) -> Self {
        Self {
            variables,
            mirror: None,
            coverage_reference: None,
            bins: DEFAULT_BINS,
        }
    }

    pub fn with_mirror(mut self, mirror: MirrorPair) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn with_bins(mut self, bins: usize) -> Self {
        self.bins = bins;
        self
    }

    pub fn with_coverage_reference(mut self, variable: impl Into<String>) -> Self {
        self.coverage_reference = Some(variable.into());
        self
    }

    pub fn variable(&self, name: &str) -> Option<&VariableSpec> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Variable whose total is the coverage denominator: the explicit
    /// reference, else the first sample-total variable.
    pub fn coverage_variable(&self) -> Option<&str> {
        match &self.coverage_reference {
            Some(name) => Some(name.as_str()),
            None => self
                .variables
                .iter()
                .find(|v| v.kind == VariableKind::SampleTotal)
                .map(|v| v.name.as_str()),
        }
    }
}

/// A named tile and the layout it composes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileDefinition {
    pub name: String,
    pub title: String,
    pub description: String,
    pub layout: TileLayout,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledCount<K> {
    pub name: K,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumericVariable {
    pub label: String,
    pub description: String,
    pub min: f64,
    pub median: f64,
    pub max: f64,
    pub sample_count: u64,
    pub undefined_count: u64,
    pub distribution: Vec<Bin>,
    pub coverage: Coverage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryVariable {
    pub label: String,
    pub description: String,
    pub categories: Vec<LabeledCount<BinaryValue>>,
    pub unparsed_count: u64,
    pub coverage: Coverage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TernaryVariable {
    pub label: String,
    pub description: String,
    pub categories: Vec<LabeledCount<TernaryValue>>,
    pub unparsed_count: u64,
    pub coverage: Coverage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoricalVariable {
    pub label: String,
    pub description: String,
    pub categories: Vec<RawCategory>,
    pub coverage: Coverage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountVariable {
    pub label: String,
    pub count: u64,
}

/// The sample-total section. `total` is the coverage denominator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleTotalVariable {
    pub label: String,
    pub description: String,
    pub categories: Vec<RawCategory>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MirroredVariable {
    pub label: String,
    pub min_label: String,
    pub max_label: String,
    pub min_summary: Summary,
    pub max_summary: Summary,
    pub min_sample_count: u64,
    pub max_sample_count: u64,
    pub histogram: MirroredHistogram,
    pub coverage: Coverage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizedVariable {
    Numeric(NumericVariable),
    Binary(BinaryVariable),
    Ternary(TernaryVariable),
    Categorical(CategoricalVariable),
    Count(CountVariable),
    SampleTotal(SampleTotalVariable),
}

impl NormalizedVariable {
    pub fn label(&self) -> &str {
        match self {
            NormalizedVariable::Numeric(v) => &v.label,
            NormalizedVariable::Binary(v) => &v.label,
            NormalizedVariable::Ternary(v) => &v.label,
            NormalizedVariable::Categorical(v) => &v.label,
            NormalizedVariable::Count(v) => &v.label,
            NormalizedVariable::SampleTotal(v) => &v.label,
        }
    }
}

/// Why a declared variable has no section in a dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum DiagnosticIssue {
    FetchFailed { message: String },
    NoData,
    NoParsableValues { unparsed: u64 },
    UnsupportedTernary,
    /// A second sample-total variable. Only `kept` feeds the dashboard total.
    DuplicateSampleTotal { kept: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableDiagnostic {
    pub variable: String,
    #[serde(flatten)]
    pub issue: DiagnosticIssue,
}

/// Result of one completed fetch cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub generation: Generation,
    pub completed_at: DateTime<Utc>,
    pub numeric: Vec<NumericVariable>,
    pub binary: Vec<BinaryVariable>,
    pub ternary: Vec<TernaryVariable>,
    pub categorical: Vec<CategoricalVariable>,
    pub counts: Vec<CountVariable>,
    pub mirrored: Option<MirroredVariable>,
    pub sample_total: Option<SampleTotalVariable>,
    pub diagnostics: Vec<VariableDiagnostic>,
}

impl DashboardData {
    pub fn new(generation: Generation) -> Self {
        Self {
            generation,
            completed_at: Utc::now(),
            numeric: Vec::new(),
            binary: Vec::new(),
            ternary: Vec::new(),
            categorical: Vec::new(),
            counts: Vec::new(),
            mirrored: None,
            sample_total: None,
            diagnostics: Vec::new(),
        }
    }

    /// Route a section into the list for its kind. The first sample total
    /// wins; later ones are diagnosed instead of replacing it.
    pub fn push(&mut self, section: NormalizedVariable) {
        match section {
            NormalizedVariable::Numeric(v) => self.numeric.push(v),
            NormalizedVariable::Binary(v) => self.binary.push(v),
            NormalizedVariable::Ternary(v) => self.ternary.push(v),
            NormalizedVariable::Categorical(v) => self.categorical.push(v),
            NormalizedVariable::Count(v) => self.counts.push(v),
            NormalizedVariable::SampleTotal(v) => match &self.sample_total {
                Some(kept) => {
                    let kept = kept.label.clone();
                    self.diagnose(v.label, DiagnosticIssue::DuplicateSampleTotal { kept });
                }
                None => self.sample_total = Some(v),
            },
        }
    }

    pub fn diagnose(&mut self, variable: impl Into<String>, issue: DiagnosticIssue) {
        self.diagnostics.push(VariableDiagnostic {
            variable: variable.into(),
            issue,
        });
    }

    pub fn total_samples(&self) -> Option<u64> {
        self.sample_total.as_ref().map(|s| s.total)
    }

    pub fn section_count(&self) -> usize {
        self.numeric.len()
            + self.binary.len()
            + self.ternary.len()
            + self.categorical.len()
            + self.counts.len()
            + usize::from(self.mirrored.is_some())
            + usize::from(self.sample_total.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.section_count() == 0
    }
}
