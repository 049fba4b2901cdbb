// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Tabular and JSON views of a dashboard for download.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::data::DashboardData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

const CSV_HEADER: [&str; 10] = [
    "section",
    "variable",
    "category",
    "count",
    "min",
    "median",
    "max",
    "sample_count",
    "undefined_count",
    "coverage_percent",
];

#[derive(Default)]
struct Row {
    section: &'static str,
    variable: String,
    category: String,
    count: Option<u64>,
    min: Option<f64>,
    median: Option<f64>,
    max: Option<f64>,
    sample_count: Option<u64>,
    undefined_count: Option<u64>,
    coverage: Option<f64>,
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl Row {
    fn write(&self, out: &mut String) {
        let fields = [
            self.section.to_string(),
            escape(&self.variable),
            escape(&self.category),
            opt(self.count),
            opt(self.min),
            opt(self.median),
            opt(self.max),
            opt(self.sample_count),
            opt(self.undefined_count),
            opt(self.coverage),
        ];
        let _ = writeln!(out, "{}", fields.join(","));
    }
}

fn rows(data: &DashboardData) -> Vec<Row> {
    let mut rows = Vec::new();

    if let Some(total) = &data.sample_total {
        rows.extend(total.categories.iter().map(|c| Row {
            section: "sample_total",
            variable: total.label.clone(),
            category: c.name.clone(),
            count: Some(c.count),
            ..Row::default()
        }));
    }

    for v in &data.categorical {
        rows.extend(v.categories.iter().map(|c| Row {
            section: "categorical",
            variable: v.label.clone(),
            category: c.name.clone(),
            count: Some(c.count),
            coverage: v.coverage.percent(),
            ..Row::default()
        }));
    }

    for v in &data.numeric {
        rows.push(Row {
            section: "numeric",
            variable: v.label.clone(),
            min: Some(v.min),
            median: Some(v.median),
            max: Some(v.max),
            sample_count: Some(v.sample_count),
            undefined_count: Some(v.undefined_count),
            coverage: v.coverage.percent(),
            ..Row::default()
        });
    }

    if let Some(m) = &data.mirrored {
        let coverage = m.coverage.percent();
        for (label, summary, samples) in [
            (&m.min_label, m.min_summary, m.min_sample_count),
            (&m.max_label, m.max_summary, m.max_sample_count),
        ] {
            rows.push(Row {
                section: "mirrored",
                variable: label.clone(),
                min: Some(summary.min),
                median: Some(summary.median),
                max: Some(summary.max),
                sample_count: Some(samples),
                coverage,
                ..Row::default()
            });
        }
    }

    for v in &data.binary {
        rows.extend(v.categories.iter().map(|c| Row {
            section: "binary",
            variable: v.label.clone(),
            category: c.name.to_string(),
            count: Some(c.count),
            undefined_count: Some(v.unparsed_count),
            coverage: v.coverage.percent(),
            ..Row::default()
        }));
    }

    for v in &data.ternary {
        rows.extend(v.categories.iter().map(|c| Row {
            section: "ternary",
            variable: v.label.clone(),
            category: c.name.to_string(),
            count: Some(c.count),
            undefined_count: Some(v.unparsed_count),
            coverage: v.coverage.percent(),
            ..Row::default()
        }));
    }

    for v in &data.counts {
        rows.push(Row {
            section: "count",
            variable: v.label.clone(),
            count: Some(v.count),
            ..Row::default()
        });
    }

    rows
}

/// Render `data` in `format`. Reads `data` only.
pub fn format_for_export(data: &DashboardData, format: ExportFormat) -> Result<String, serde_json::Error> {
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(data),
        ExportFormat::Csv => {
            let mut out = String::new();
            let _ = writeln!(out, "{}", CSV_HEADER.join(","));
            for row in rows(data) {
                row.write(&mut out);
            }
            Ok(out)
        }
    }
}
