// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Fans out one fetch per declared variable and merges the results into a
//! [`DashboardData`].

use futures::future::join_all;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::data::{
    BinaryVariable, CategoricalVariable, CountVariable, DashboardData, DiagnosticIssue,
    Generation, LabeledCount, MirroredVariable, NormalizedVariable, NumericVariable,
    RawCategory, SampleTotalVariable, TernaryVariable, TileLayout, VariableKind, VariableSpec,
};
use crate::distribution::{
    aggregate, coverage_ratio, histogram, merge_duplicates, mirrored_histogram, saturating_total,
    summarize, tally,
};
use crate::fetcher::VariableFetcher;
use crate::parse::{parse_binary, parse_numeric, parse_ternary, ternary_supported, BinaryValue, TernaryValue};
use crate::selection::SiteSelection;

#[derive(Clone)]
pub struct DashboardComposer {
    fetcher: VariableFetcher,
}

impl DashboardComposer {
    pub fn new(fetcher: VariableFetcher) -> Self {
        Self { fetcher }
    }

    /// Fetch every variable of `layout` concurrently and build the dashboard
    /// for `generation`.
    ///
    /// A failed or empty variable never drops its siblings; it is recorded as
    /// a diagnostic instead.
    pub async fn build_dashboard(
        &self,
        layout: &TileLayout,
        selection: &SiteSelection,
        generation: Generation,
    ) -> DashboardData {
        let results = join_all(
            layout
                .variables
                .iter()
                .map(|spec| self.fetcher.fetch(spec, selection, generation)),
        )
        .await;

        let mut data = DashboardData::new(generation);
        let mut fetched: FxHashMap<&str, Vec<RawCategory>> = FxHashMap::default();

        for (spec, result) in layout.variables.iter().zip(results) {
            match result {
                Ok(response) => match response.categories {
                    Some(categories) => {
                        fetched.insert(spec.name.as_str(), categories);
                    }
                    None => data.diagnose(&spec.name, DiagnosticIssue::NoData),
                },
                Err(failure) => data.diagnose(
                    &spec.name,
                    DiagnosticIssue::FetchFailed {
                        message: failure.error.to_string(),
                    },
                ),
            }
        }

        let total = layout
            .coverage_variable()
            .and_then(|name| fetched.get(name))
            .map(|categories| saturating_total(categories.iter().map(|c| c.count)));

        let mut consumed: FxHashSet<&str> = FxHashSet::default();
        if let (Some(pair), Some(mirrored)) =
            (layout.mirror.as_ref(), compose_mirror(layout, &fetched, total))
        {
            consumed.insert(pair.min.as_str());
            consumed.insert(pair.max.as_str());
            data.mirrored = Some(mirrored);
        }

        for spec in &layout.variables {
            if consumed.contains(spec.name.as_str()) {
                continue;
            }
            let Some(categories) = fetched.get(spec.name.as_str()) else {
                continue;
            };
            match normalize(spec, categories, total, layout.bins) {
                Ok(section) => data.push(section),
                Err(issue) => data.diagnose(&spec.name, issue),
            }
        }

        data.completed_at = chrono::Utc::now();
        debug!(
            generation = %generation,
            sections = data.section_count(),
            diagnostics = data.diagnostics.len(),
            "dashboard composed"
        );
        data
    }
}

/// One mirrored section when both sides of the declared pair have at least
/// one parsed value.
fn compose_mirror(
    layout: &TileLayout,
    fetched: &FxHashMap<&str, Vec<RawCategory>>,
    total: Option<u64>,
) -> Option<MirroredVariable> {
    let pair = layout.mirror.as_ref()?;
    let min = aggregate(fetched.get(pair.min.as_str())?, parse_numeric);
    let max = aggregate(fetched.get(pair.max.as_str())?, parse_numeric);
    let min_summary = summarize(&min.observations)?;
    let max_summary = summarize(&max.observations)?;

    Some(MirroredVariable {
        label: pair.label.clone(),
        min_label: pair.min.clone(),
        max_label: pair.max.clone(),
        min_summary,
        max_summary,
        min_sample_count: min.sample_count,
        max_sample_count: max.sample_count,
        histogram: mirrored_histogram(&min.observations, &max.observations, layout.bins),
        coverage: coverage_ratio(min.sample_count, total),
    })
}

/// Build the section for one variable from its categories.
pub fn normalize(
    spec: &VariableSpec,
    categories: &[RawCategory],
    total: Option<u64>,
    bins: usize,
) -> Result<NormalizedVariable, DiagnosticIssue> {
    let label = spec.name.clone();
    let description = spec.description.clone().unwrap_or_default();

    match spec.kind {
        VariableKind::Numeric => {
            let agg = aggregate(categories, parse_numeric);
            let summary = summarize(&agg.observations).ok_or(DiagnosticIssue::NoParsableValues {
                unparsed: agg.undefined_count,
            })?;
            let sample_count = agg.sample_count;
            Ok(NormalizedVariable::Numeric(NumericVariable {
                label,
                description,
                min: summary.min,
                median: summary.median,
                max: summary.max,
                sample_count,
                undefined_count: agg.undefined_count,
                distribution: histogram(&agg.observations, summary.min, summary.max, bins),
                coverage: coverage_ratio(sample_count, total),
            }))
        }
        VariableKind::Binary => {
            let counts = tally(categories, parse_binary);
            if counts.parsed() == 0 {
                return Err(DiagnosticIssue::NoParsableValues {
                    unparsed: counts.unparsed,
                });
            }
            Ok(NormalizedVariable::Binary(BinaryVariable {
                label,
                description,
                categories: BinaryValue::ORDER
                    .iter()
                    .map(|&name| LabeledCount {
                        name,
                        count: counts.get(name),
                    })
                    .filter(|c| c.count > 0)
                    .collect(),
                unparsed_count: counts.unparsed,
                coverage: coverage_ratio(counts.parsed(), total),
            }))
        }
        VariableKind::Ternary => {
            if !ternary_supported(&spec.name) {
                warn!(variable = %spec.name, "no ternary keyword table for variable");
                return Err(DiagnosticIssue::UnsupportedTernary);
            }
            let counts = tally(categories, |raw| parse_ternary(raw, &spec.name));
            if counts.parsed() == 0 {
                return Err(DiagnosticIssue::NoParsableValues {
                    unparsed: counts.unparsed,
                });
            }
            Ok(NormalizedVariable::Ternary(TernaryVariable {
                label,
                description,
                categories: TernaryValue::ORDER
                    .iter()
                    .map(|&name| LabeledCount {
                        name,
                        count: counts.get(name),
                    })
                    .filter(|c| c.count > 0)
                    .collect(),
                unparsed_count: counts.unparsed,
                coverage: coverage_ratio(counts.parsed(), total),
            }))
        }
        VariableKind::Categorical => {
            let merged = merge_duplicates(categories);
            let observed = saturating_total(merged.iter().map(|c| c.count));
            Ok(NormalizedVariable::Categorical(CategoricalVariable {
                label,
                description,
                categories: merged,
                coverage: coverage_ratio(observed, total),
            }))
        }
        VariableKind::Count => Ok(NormalizedVariable::Count(CountVariable {
            label,
            count: saturating_total(categories.iter().map(|c| c.count)),
        })),
        VariableKind::SampleTotal => {
            let merged = merge_duplicates(categories);
            let total = saturating_total(merged.iter().map(|c| c.count));
            Ok(NormalizedVariable::SampleTotal(SampleTotalVariable {
                label,
                description,
                categories: merged,
                total,
            }))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::data::MirrorPair;
    use crate::distribution::Coverage;
    use crate::fetcher::DEFAULT_SAMPLE_ENDPOINT;
    use crate::testing::ScriptedTransport;

    fn composer(transport: ScriptedTransport) -> DashboardComposer {
        DashboardComposer::new(VariableFetcher::new(Arc::new(transport)))
    }

    fn tree_age_layout() -> TileLayout {
        TileLayout::new(vec![
            VariableSpec::new("Tree age ≥", VariableKind::Numeric),
            VariableSpec::new("Tree age ≤", VariableKind::Numeric),
            VariableSpec::new("Sample types", VariableKind::SampleTotal),
        ])
        .with_mirror(MirrorPair {
            min: "Tree age ≥".into(),
            max: "Tree age ≤".into(),
            label: "Tree age".into(),
        })
    }

    #[tokio::test]
    async fn min_max_pair_becomes_one_mirrored_section() {
        let transport = ScriptedTransport::fixtures([
            ("Tree age ≥", json!({"categories": [{"name": "40", "count": 2}, {"name": ">80", "count": 1}]})),
            ("Tree age ≤", json!({"categories": [{"name": "60-70", "count": 3}]})),
            (DEFAULT_SAMPLE_ENDPOINT, json!({"categories": [{"name": "Core", "count": 6}]})),
        ]);

        let data = composer(transport)
            .build_dashboard(&tree_age_layout(), &SiteSelection::new(vec![1]), Generation::new(1))
            .await;

        let mirrored = data.mirrored.as_ref().unwrap();
        assert_eq!(mirrored.label, "Tree age");
        assert_eq!(mirrored.min_summary.min, 40.0);
        assert_eq!(mirrored.min_summary.max, 81.0);
        assert_eq!(mirrored.max_summary.median, 60.0);
        assert_eq!(mirrored.histogram.min_counts.len(), 20);
        assert_eq!(mirrored.histogram.edges.first(), Some(&40.0));
        assert_eq!(mirrored.histogram.edges.last(), Some(&81.0));
        assert_eq!(mirrored.coverage, Coverage::Known { percent: 50.0 });
        assert!(data.numeric.is_empty());
        assert_eq!(data.total_samples(), Some(6));
    }

    #[tokio::test]
    async fn mirror_falls_back_when_one_side_is_unparsed() {
        let transport = ScriptedTransport::fixtures([
            ("Tree age ≥", json!({"categories": [{"name": "40", "count": 2}]})),
            ("Tree age ≤", json!({"categories": [{"name": "undefined", "count": 5}]})),
            (DEFAULT_SAMPLE_ENDPOINT, json!({"categories": [{"name": "Core", "count": 4}]})),
        ]);

        let data = composer(transport)
            .build_dashboard(&tree_age_layout(), &SiteSelection::default(), Generation::new(1))
            .await;

        assert!(data.mirrored.is_none());
        assert_eq!(data.numeric.len(), 1);
        assert_eq!(data.numeric[0].label, "Tree age ≥");
        assert_eq!(data.numeric[0].coverage, Coverage::Known { percent: 50.0 });
        assert_eq!(data.diagnostics.len(), 1);
        assert_eq!(data.diagnostics[0].variable, "Tree age ≤");
        assert_eq!(
            data.diagnostics[0].issue,
            DiagnosticIssue::NoParsableValues { unparsed: 5 }
        );
    }

    #[tokio::test]
    async fn one_failure_keeps_the_other_variables() {
        let layout = TileLayout::new(vec![
            VariableSpec::new("Bark (B)", VariableKind::Binary).with_description("Presence of bark"),
            VariableSpec::new("Pith (P)", VariableKind::Numeric),
            VariableSpec::new("Tree species", VariableKind::Categorical),
        ]);
        let transport = ScriptedTransport::fixtures([
            ("Bark (B)", json!([{"name": "Ja", "count": 3}, {"name": "nej", "count": 1}, {"name": "?", "count": 2}])),
            ("Tree species", json!({"categories": []})),
        ]);

        let data = composer(transport)
            .build_dashboard(&layout, &SiteSelection::default(), Generation::new(3))
            .await;

        assert_eq!(data.generation, Generation::new(3));
        assert_eq!(data.binary.len(), 1);
        let bark = &data.binary[0];
        assert_eq!(bark.description, "Presence of bark");
        assert_eq!(
            bark.categories,
            vec![
                LabeledCount { name: BinaryValue::Yes, count: 3 },
                LabeledCount { name: BinaryValue::No, count: 1 },
            ]
        );
        assert_eq!(bark.unparsed_count, 2);
        assert_eq!(bark.coverage, Coverage::Unknown);

        let issues: Vec<_> = data.diagnostics.iter().map(|d| (d.variable.as_str(), &d.issue)).collect();
        assert_eq!(issues.len(), 2);
        assert!(matches!(issues[0], ("Pith (P)", DiagnosticIssue::FetchFailed { .. })));
        assert_eq!(issues[1], ("Tree species", &DiagnosticIssue::NoData));
    }

    #[test]
    fn numeric_scenario_with_open_bound_and_undefined() {
        let spec = VariableSpec::new("Sapwood (Sp)", VariableKind::Numeric);
        let raw = vec![RawCategory::new(">28", 3), RawCategory::new("undefined", 2)];
        let NormalizedVariable::Numeric(section) = normalize(&spec, &raw, Some(10), 20).unwrap() else {
            panic!("expected numeric section");
        };
        assert_eq!((section.min, section.median, section.max), (29.0, 29.0, 29.0));
        assert_eq!(section.sample_count, 3);
        assert_eq!(section.undefined_count, 2);
        assert!(section.distribution.is_empty());
        assert_eq!(section.coverage, Coverage::Known { percent: 30.0 });
    }

    #[test]
    fn waney_edge_scenario_orders_yes_maybe_no() {
        let spec = VariableSpec::new("Waney edge (W)", VariableKind::Ternary);
        let raw = vec![
            RawCategory::new("W", 4),
            RawCategory::new("Nära W", 2),
            RawCategory::new("Nej", 1),
        ];
        let NormalizedVariable::Ternary(section) = normalize(&spec, &raw, None, 20).unwrap() else {
            panic!("expected ternary section");
        };
        assert_eq!(
            section.categories,
            vec![
                LabeledCount { name: TernaryValue::Yes, count: 4 },
                LabeledCount { name: TernaryValue::Maybe, count: 2 },
                LabeledCount { name: TernaryValue::No, count: 1 },
            ]
        );
    }

    #[test]
    fn ternary_without_keyword_table_is_reported() {
        let spec = VariableSpec::new("Bark (B)", VariableKind::Ternary);
        let raw = vec![RawCategory::new("ja", 1)];
        assert_eq!(
            normalize(&spec, &raw, None, 20),
            Err(DiagnosticIssue::UnsupportedTernary)
        );
    }

    #[test]
    fn categorical_merges_duplicates_and_count_sums() {
        let raw = vec![
            RawCategory::new("Pinus sylvestris", 2),
            RawCategory::new("Quercus", 1),
            RawCategory::new("Pinus sylvestris", 4),
        ];
        let spec = VariableSpec::new("Tree species", VariableKind::Categorical);
        let NormalizedVariable::Categorical(section) = normalize(&spec, &raw, Some(14), 20).unwrap() else {
            panic!("expected categorical section");
        };
        assert_eq!(section.categories[0], RawCategory::new("Pinus sylvestris", 6));
        assert_eq!(section.coverage, Coverage::Known { percent: 50.0 });

        let spec = VariableSpec::new("Sites", VariableKind::Count);
        assert_eq!(
            normalize(&spec, &raw, None, 20),
            Ok(NormalizedVariable::Count(CountVariable { label: "Sites".into(), count: 7 }))
        );
    }

    #[test]
    fn huge_counts_saturate_instead_of_overflowing() {
        let spec = VariableSpec::new("Tree rings", VariableKind::Numeric);
        let raw = vec![RawCategory::new("5", u64::MAX), RawCategory::new("9", 1)];
        let NormalizedVariable::Numeric(section) = normalize(&spec, &raw, Some(u64::MAX), 2).unwrap() else {
            panic!("expected numeric section");
        };
        assert_eq!((section.min, section.median, section.max), (5.0, 5.0, 9.0));
        assert_eq!(section.sample_count, u64::MAX);
        assert_eq!(
            section.distribution.iter().map(|b| b.count).collect::<Vec<_>>(),
            vec![u64::MAX, 1]
        );
        assert_eq!(section.coverage, Coverage::Known { percent: 100.0 });

        let spec = VariableSpec::new("Bark (B)", VariableKind::Binary);
        let raw = vec![RawCategory::new("ja", u64::MAX), RawCategory::new("yes", 1)];
        let NormalizedVariable::Binary(section) = normalize(&spec, &raw, None, 2).unwrap() else {
            panic!("expected binary section");
        };
        assert_eq!(section.categories, vec![LabeledCount { name: BinaryValue::Yes, count: u64::MAX }]);

        let spec = VariableSpec::new("Sites", VariableKind::Count);
        assert_eq!(
            normalize(&spec, &raw, None, 2),
            Ok(NormalizedVariable::Count(CountVariable { label: "Sites".into(), count: u64::MAX }))
        );
    }
}
