// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Statistics over parsed category values weighted by their counts: min/median/max
//! summaries, equal-width histograms, mirrored histograms and coverage.

use std::hash::Hash;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::data::RawCategory;

pub const DEFAULT_BINS: usize = 20;

/// Sum of `counts`, saturating at `u64::MAX`. Counts come from the backend
/// unchecked, so every total in the crate goes through here.
pub fn saturating_total<I: IntoIterator<Item = u64>>(counts: I) -> u64 {
    counts.into_iter().fold(0, u64::saturating_add)
}

/// One parsed value and how many samples carry it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation<T> {
    pub value: T,
    pub count: u64,
}

/// Parsed values weighted by their category counts, plus the number of
/// observations whose category the parser rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate<T> {
    pub observations: Vec<Observation<T>>,
    pub sample_count: u64,
    pub undefined_count: u64,
}

/// Parse every category, keeping its count as a weight. Rejected categories
/// contribute their count to `undefined_count`, so `sample_count +
/// undefined_count` equals the total count of `raw` (saturating).
pub fn aggregate<T, F>(raw: &[RawCategory], parse: F) -> Aggregate<T>
where
    F: Fn(&str) -> Option<T>,
{
    let mut observations = Vec::new();
    let mut sample_count = 0u64;
    let mut undefined_count = 0u64;
    for category in raw {
        match parse(&category.name) {
            Some(value) => {
                sample_count = sample_count.saturating_add(category.count);
                if category.count > 0 {
                    observations.push(Observation {
                        value,
                        count: category.count,
                    });
                }
            }
            None => undefined_count = undefined_count.saturating_add(category.count),
        }
    }
    Aggregate {
        observations,
        sample_count,
        undefined_count,
    }
}

/// Per-value counts, for binary and ternary variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Tally<K: Eq + Hash> {
    pub counts: FxHashMap<K, u64>,
    pub unparsed: u64,
}

impl<K: Eq + Hash + Copy> Tally<K> {
    pub fn get(&self, key: K) -> u64 {
        self.counts.get(&key).copied().unwrap_or(0)
    }

    pub fn parsed(&self) -> u64 {
        saturating_total(self.counts.values().copied())
    }
}

pub fn tally<K, F>(raw: &[RawCategory], parse: F) -> Tally<K>
where
    K: Eq + Hash,
    F: Fn(&str) -> Option<K>,
{
    let mut counts: FxHashMap<K, u64> = FxHashMap::default();
    let mut unparsed = 0u64;
    for category in raw {
        match parse(&category.name) {
            Some(key) => {
                let slot = counts.entry(key).or_insert(0);
                *slot = slot.saturating_add(category.count);
            }
            None => unparsed = unparsed.saturating_add(category.count),
        }
    }
    Tally { counts, unparsed }
}

/// Sum the counts of categories sharing a name, keeping first-seen order.
pub fn merge_duplicates(raw: &[RawCategory]) -> Vec<RawCategory> {
    let mut index: FxHashMap<&str, usize> = FxHashMap::default();
    let mut merged: Vec<RawCategory> = Vec::with_capacity(raw.len());
    for category in raw {
        match index.get(category.name.as_str()) {
            Some(&pos) => {
                if let Some(existing) = merged.get_mut(pos) {
                    existing.count = existing.count.saturating_add(category.count);
                }
            }
            None => {
                index.insert(category.name.as_str(), merged.len());
                merged.push(category.clone());
            }
        }
    }
    merged
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub min: f64,
    pub median: f64,
    pub max: f64,
}

/// Min, median and max of the weighted observations. The median is the
/// value at position `n / 2` of the samples in sorted order (`n` the summed
/// count), which for even `n` is the upper of the two middle samples.
/// `None` when no observation has a count.
pub fn summarize(observations: &[Observation<f64>]) -> Option<Summary> {
    let mut sorted: Vec<Observation<f64>> =
        observations.iter().copied().filter(|o| o.count > 0).collect();
    sorted.sort_by(|a, b| a.value.total_cmp(&b.value));

    // Summed in u128 so the median position stays exact past u64::MAX.
    let n: u128 = sorted.iter().map(|o| u128::from(o.count)).sum();
    let middle = n / 2;
    let mut seen = 0u128;
    let median = sorted.iter().find_map(|o| {
        seen += u128::from(o.count);
        (seen > middle).then_some(o.value)
    })?;

    Some(Summary {
        min: sorted.first()?.value,
        median,
        max: sorted.last()?.value,
    })
}

/// One equal-width interval of a distribution. The interval is
/// `[range_start, range_end)` except for the last bin, which also holds
/// `range_end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bin {
    pub index: usize,
    pub count: u64,
    pub normalized_height: f64,
    pub range_start: f64,
    pub range_end: f64,
}

fn bin_index(value: f64, low: f64, width: f64, bins: usize) -> usize {
    if width <= 0.0 {
        return 0;
    }
    let raw = ((value - low) / width).floor();
    if raw <= 0.0 {
        0
    } else {
        (raw as usize).min(bins.saturating_sub(1))
    }
}

fn count_into(observations: &[Observation<f64>], low: f64, high: f64, width: f64, counts: &mut [u64]) {
    let bins = counts.len();
    for o in observations {
        if !(low..=high).contains(&o.value) {
            continue;
        }
        if let Some(slot) = counts.get_mut(bin_index(o.value, low, width, bins)) {
            *slot = slot.saturating_add(o.count);
        }
    }
}

fn edges(low: f64, high: f64, bins: usize) -> Vec<f64> {
    let width = (high - low) / bins as f64;
    (0..=bins)
        .map(|i| if i == bins { high } else { low + i as f64 * width })
        .collect()
}

/// Equal-width histogram of the weighted observations over `[min, max]`.
///
/// Returns no bins for empty input, for `bins == 0`, and when `min == max`;
/// callers render a "no distribution" state instead of dividing by zero.
/// Values outside `[min, max]` are not counted.
pub fn histogram(observations: &[Observation<f64>], min: f64, max: f64, bins: usize) -> Vec<Bin> {
    if observations.is_empty() || bins == 0 || max <= min {
        return Vec::new();
    }

    let width = (max - min) / bins as f64;
    let mut counts = vec![0u64; bins];
    count_into(observations, min, max, width, &mut counts);

    let peak = counts.iter().copied().max().unwrap_or(0);
    let bounds = edges(min, max, bins);

    counts
        .iter()
        .zip(bounds.windows(2))
        .enumerate()
        .map(|(index, (&count, window))| {
            let (range_start, range_end) = match window {
                [start, end] => (*start, *end),
                _ => (min, max),
            };
            Bin {
                index,
                count,
                normalized_height: if peak == 0 {
                    0.0
                } else {
                    count as f64 / peak as f64 * 100.0
                },
                range_start,
                range_end,
            }
        })
        .collect()
}

/// Two series binned over one shared set of edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirroredHistogram {
    /// `bins + 1` boundaries, or empty when both series are empty.
    pub edges: Vec<f64>,
    pub min_counts: Vec<u64>,
    pub max_counts: Vec<u64>,
}

/// Bin both series over the range of their union.
///
/// Both count vectors always have exactly `bins` entries. When every value
/// is equal the width is zero and all values land in the first bin.
pub fn mirrored_histogram(
    min_series: &[Observation<f64>],
    max_series: &[Observation<f64>],
    bins: usize,
) -> MirroredHistogram {
    let mut min_counts = vec![0u64; bins];
    let mut max_counts = vec![0u64; bins];

    let bounds = min_series
        .iter()
        .chain(max_series)
        .filter(|o| o.count > 0)
        .fold(None, |acc: Option<(f64, f64)>, o| match acc {
            None => Some((o.value, o.value)),
            Some((lo, hi)) => Some((lo.min(o.value), hi.max(o.value))),
        });

    let Some((low, high)) = bounds.filter(|_| bins > 0) else {
        return MirroredHistogram {
            edges: Vec::new(),
            min_counts,
            max_counts,
        };
    };

    let width = (high - low) / bins as f64;
    count_into(min_series, low, high, width, &mut min_counts);
    count_into(max_series, low, high, width, &mut max_counts);

    MirroredHistogram {
        edges: edges(low, high, bins),
        min_counts,
        max_counts,
    }
}

/// Share of all samples that have a value for a variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Coverage {
    Known { percent: f64 },
    Unknown,
}

impl Coverage {
    pub fn percent(&self) -> Option<f64> {
        match self {
            Coverage::Known { percent } => Some(*percent),
            Coverage::Unknown => None,
        }
    }
}

/// `count / total` as a percentage rounded to one decimal. A missing or zero
/// total gives [`Coverage::Unknown`].
pub fn coverage_ratio(count: u64, total: Option<u64>) -> Coverage {
    match total {
        Some(total) if total > 0 => {
            let percent = count as f64 / total as f64 * 100.0;
            Coverage::Known {
                percent: (percent * 10.0).round() / 10.0,
            }
        }
        _ => Coverage::Unknown,
    }
}

/// One observation per value, each with a count of one.
#[cfg(test)]
pub(crate) fn unit_observations(values: &[f64]) -> Vec<Observation<f64>> {
    values.iter().map(|&value| Observation { value, count: 1 }).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::parse::{parse_binary, parse_numeric, BinaryValue};

    fn cat(name: &str, count: u64) -> RawCategory {
        RawCategory::new(name, count)
    }

    fn obs(value: f64, count: u64) -> Observation<f64> {
        Observation { value, count }
    }

    #[test]
    fn aggregate_weights_counts_and_tallies_rejections() {
        let raw = vec![cat(">28", 3), cat("undefined", 2)];
        let agg = aggregate(&raw, parse_numeric);
        assert_eq!(agg.observations, vec![obs(29.0, 3)]);
        assert_eq!(agg.sample_count, 3);
        assert_eq!(agg.undefined_count, 2);

        let summary = summarize(&agg.observations).unwrap();
        assert_eq!(summary.min, 29.0);
        assert_eq!(summary.median, 29.0);
        assert_eq!(summary.max, 29.0);
    }

    #[test]
    fn aggregate_skips_zero_counts() {
        let agg = aggregate(&[cat("5", 0), cat("7", 1)], parse_numeric);
        assert_eq!(agg.observations, vec![obs(7.0, 1)]);
        assert_eq!(agg.sample_count, 1);
    }

    #[test]
    fn median_takes_element_at_half_length() {
        let median = |values: &[f64]| summarize(&unit_observations(values)).map(|s| s.median);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(3.0));
        assert_eq!(median(&[5.0, 1.0, 3.0]), Some(3.0));
        assert_eq!(median(&[7.0]), Some(7.0));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn weighted_median_matches_expanded_samples() {
        // 1,1,1,2,2,9 sorted; position 3 holds 2.
        let summary = summarize(&[obs(9.0, 1), obs(1.0, 3), obs(2.0, 2)]).unwrap();
        assert_eq!((summary.min, summary.median, summary.max), (1.0, 2.0, 9.0));

        assert!(summarize(&[obs(4.0, 0)]).is_none());
        let summary = summarize(&[obs(4.0, 0), obs(6.0, 2)]).unwrap();
        assert_eq!(summary.min, 6.0);
    }

    #[test]
    fn max_count_category_does_not_expand() {
        let agg = aggregate(&[cat("5", u64::MAX)], parse_numeric);
        assert_eq!(agg.observations, vec![obs(5.0, u64::MAX)]);
        assert_eq!(agg.sample_count, u64::MAX);

        let summary = summarize(&agg.observations).unwrap();
        assert_eq!((summary.min, summary.median, summary.max), (5.0, 5.0, 5.0));

        let hist = mirrored_histogram(&agg.observations, &[obs(9.0, 1)], 2);
        assert_eq!(hist.min_counts, vec![u64::MAX, 0]);
        assert_eq!(hist.max_counts, vec![0, 1]);
    }

    #[test]
    fn counts_past_u64_max_saturate() {
        let raw = vec![cat("ja", u64::MAX), cat("j", 1), cat("nej", 2)];
        let t = tally(&raw, parse_binary);
        assert_eq!(t.get(BinaryValue::Yes), u64::MAX);
        assert_eq!(t.get(BinaryValue::No), 2);
        assert_eq!(t.parsed(), u64::MAX);

        let agg = aggregate(
            &[cat("3", u64::MAX), cat("4", u64::MAX), cat("x", u64::MAX), cat("y", 1)],
            parse_numeric,
        );
        assert_eq!(agg.sample_count, u64::MAX);
        assert_eq!(agg.undefined_count, u64::MAX);
        assert_eq!(summarize(&agg.observations).unwrap().median, 4.0);

        let merged = merge_duplicates(&[cat("Pine", u64::MAX), cat("Pine", 7)]);
        assert_eq!(merged, vec![cat("Pine", u64::MAX)]);

        let bins = histogram(&[obs(0.0, u64::MAX), obs(0.5, 3), obs(1.0, 1)], 0.0, 1.0, 1);
        assert_eq!(bins[0].count, u64::MAX);
        assert_eq!(saturating_total([u64::MAX, 1, 1]), u64::MAX);
    }

    #[test]
    fn merge_sums_duplicate_names_in_first_seen_order() {
        let raw = vec![cat("Pine", 2), cat("Oak", 5), cat("Pine", 3)];
        let merged = merge_duplicates(&raw);
        assert_eq!(merged, vec![cat("Pine", 5), cat("Oak", 5)]);
    }

    #[test]
    fn histogram_places_max_in_last_bin() {
        let values = unit_observations(&[0.0, 5.0, 10.0, 10.0]);
        let bins = histogram(&values, 0.0, 10.0, 5);
        assert_eq!(bins.len(), 5);
        assert_eq!(bins.iter().map(|b| b.count).collect::<Vec<_>>(), vec![1, 0, 1, 0, 2]);
        assert_eq!(bins[4].normalized_height, 100.0);
        assert_eq!(bins[0].normalized_height, 50.0);
        assert_eq!(bins[0].range_start, 0.0);
        assert_eq!(bins[0].range_end, 2.0);
        assert_eq!(bins[4].range_end, 10.0);
    }

    #[test]
    fn histogram_degenerate_inputs_are_empty() {
        assert!(histogram(&[], 0.0, 0.0, DEFAULT_BINS).is_empty());
        assert!(histogram(&[obs(3.0, 2)], 3.0, 3.0, DEFAULT_BINS).is_empty());
        assert!(histogram(&unit_observations(&[1.0, 2.0]), 1.0, 2.0, 0).is_empty());
    }

    #[test]
    fn histogram_skips_out_of_range_values() {
        let bins = histogram(&unit_observations(&[-1.0, 0.0, 1.0, 4.0]), 0.0, 1.0, 2);
        assert_eq!(bins.iter().map(|b| b.count).sum::<u64>(), 2);
    }

    #[test]
    fn mirrored_histogram_shares_edges_over_union() {
        let hist = mirrored_histogram(
            &unit_observations(&[0.0, 10.0]),
            &unit_observations(&[20.0, 40.0]),
            4,
        );
        assert_eq!(hist.edges, vec![0.0, 10.0, 20.0, 30.0, 40.0]);
        assert_eq!(hist.min_counts, vec![1, 1, 0, 0]);
        assert_eq!(hist.max_counts, vec![0, 0, 1, 1]);
    }

    #[test]
    fn mirrored_histogram_degenerate_ranges() {
        let hist = mirrored_histogram(&[], &[], 20);
        assert!(hist.edges.is_empty());
        assert_eq!(hist.min_counts.len(), 20);
        assert_eq!(hist.max_counts.len(), 20);

        let flat = mirrored_histogram(&[obs(5.0, 1)], &[obs(5.0, 2)], 3);
        assert_eq!(flat.min_counts, vec![1, 0, 0]);
        assert_eq!(flat.max_counts, vec![2, 0, 0]);
        assert_eq!(flat.edges.len(), 4);
    }

    #[test]
    fn coverage_rounds_to_one_decimal_and_fails_closed() {
        assert_eq!(coverage_ratio(1, Some(3)), Coverage::Known { percent: 33.3 });
        assert_eq!(coverage_ratio(2, Some(3)), Coverage::Known { percent: 66.7 });
        assert_eq!(coverage_ratio(0, Some(10)), Coverage::Known { percent: 0.0 });
        assert_eq!(coverage_ratio(5, Some(0)), Coverage::Unknown);
        assert_eq!(coverage_ratio(5, None), Coverage::Unknown);
    }

    #[test]
    fn tally_counts_without_expanding() {
        use crate::parse::{parse_ternary, TernaryValue};
        let raw = vec![cat("W", 4), cat("Nära W", 2), cat("Nej", 1), cat("??", 3)];
        let t = tally(&raw, |s| parse_ternary(s, "Waney edge (W)"));
        assert_eq!(t.get(TernaryValue::Yes), 4);
        assert_eq!(t.get(TernaryValue::Maybe), 5);
        assert_eq!(t.get(TernaryValue::No), 1);
        assert_eq!(t.unparsed, 0);
        assert_eq!(t.parsed(), 10);
    }
}

#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn categories() -> impl Strategy<Value = Vec<RawCategory>> {
        prop::collection::vec(
            (
                prop_oneof![
                    (0u32..500).prop_map(|n| n.to_string()),
                    (0u32..500).prop_map(|n| format!(">{n}")),
                    Just("undefined".to_string()),
                    "[a-z?~]{0,6}",
                ],
                0u64..50,
            )
                .prop_map(|(name, count)| RawCategory::new(&name, count)),
            0..20,
        )
    }

    fn weighted() -> impl Strategy<Value = Vec<Observation<f64>>> {
        prop::collection::vec(
            (-1000.0f64..1000.0, 0u64..20).prop_map(|(value, count)| Observation { value, count }),
            0..60,
        )
    }

    proptest! {
        #[test]
        fn aggregate_accounts_for_every_observation(raw in categories()) {
            let total: u64 = raw.iter().map(|c| c.count).sum();
            let agg = aggregate(&raw, crate::parse::parse_numeric);
            prop_assert_eq!(agg.sample_count + agg.undefined_count, total);
            prop_assert_eq!(agg.observations.iter().map(|o| o.count).sum::<u64>(), agg.sample_count);
        }

        #[test]
        fn weighted_summary_matches_expanded_samples(observations in weighted()) {
            let mut expanded: Vec<f64> = observations
                .iter()
                .flat_map(|o| std::iter::repeat_n(o.value, o.count as usize))
                .collect();
            expanded.sort_by(f64::total_cmp);
            match summarize(&observations) {
                None => prop_assert!(expanded.is_empty()),
                Some(summary) => {
                    prop_assert_eq!(Some(&summary.min), expanded.first());
                    prop_assert_eq!(Some(&summary.max), expanded.last());
                    prop_assert_eq!(Some(&summary.median), expanded.get(expanded.len() / 2));
                }
            }
        }

        #[test]
        fn histogram_counts_every_value_once(
            values in prop::collection::vec(-1000.0f64..1000.0, 1..200),
            bins in 1usize..40,
        ) {
            let values = unit_observations(&values);
            let summary = summarize(&values).unwrap_or(Summary { min: 0.0, median: 0.0, max: 0.0 });
            let hist = histogram(&values, summary.min, summary.max, bins);
            if summary.min < summary.max {
                prop_assert_eq!(hist.len(), bins);
                prop_assert_eq!(hist.iter().map(|b| b.count).sum::<u64>(), values.len() as u64);
                prop_assert!(hist.iter().all(|b| (0.0..=100.0).contains(&b.normalized_height)));
            } else {
                prop_assert!(hist.is_empty());
            }
        }

        #[test]
        fn mirrored_series_have_equal_length(
            mins in weighted(),
            maxs in weighted(),
            bins in 1usize..30,
        ) {
            let hist = mirrored_histogram(&mins, &maxs, bins);
            let total = |series: &[Observation<f64>]| series.iter().map(|o| o.count).sum::<u64>();
            prop_assert_eq!(hist.min_counts.len(), bins);
            prop_assert_eq!(hist.max_counts.len(), bins);
            prop_assert_eq!(hist.min_counts.iter().sum::<u64>(), total(&mins));
            prop_assert_eq!(hist.max_counts.iter().sum::<u64>(), total(&maxs));
            if total(&mins) + total(&maxs) > 0 {
                prop_assert_eq!(hist.edges.len(), bins + 1);
            }
        }
    }
}
