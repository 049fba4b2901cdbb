// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Category token parsers.
//!
//! The backend returns free-text category names as they were recorded in the
//! field: numbers with uncertainty markers (`~8?`), open bounds (`>28`),
//! ranges (`10-12`), and yes/no answers in Swedish or English. These parsers
//! turn a single token into a typed value, or `None` when the token cannot be
//! interpreted. They never fail; the caller counts the `None`s.

use std::fmt;

use phf::{phf_map, phf_set};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryValue {
    Yes,
    No,
}

impl BinaryValue {
    /// Display order used for every binary section.
    pub const ORDER: [BinaryValue; 2] = [BinaryValue::Yes, BinaryValue::No];

    pub fn as_str(self) -> &'static str {
        match self {
            BinaryValue::Yes => "Yes",
            BinaryValue::No => "No",
        }
    }
}

impl fmt::Display for BinaryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TernaryValue {
    Yes,
    Maybe,
    No,
}

impl TernaryValue {
    /// Display order used for every ternary section.
    pub const ORDER: [TernaryValue; 3] = [TernaryValue::Yes, TernaryValue::Maybe, TernaryValue::No];

    pub fn as_str(self) -> &'static str {
        match self {
            TernaryValue::Yes => "Yes",
            TernaryValue::Maybe => "Maybe",
            TernaryValue::No => "No",
        }
    }
}

impl fmt::Display for TernaryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static AFFIRMATIVE: phf::Set<&'static str> = phf_set! {
    "yes",
    "y",
    "ja",
    "j",
};

static NEGATIVE: phf::Set<&'static str> = phf_set! {
    "no",
    "n",
    "nej",
};

/// Keyword classification for one three-state variable. Tokens are compared
/// after trimming and lowercasing; rules are tried in the order yes, no, maybe.
#[derive(Debug)]
pub struct TernaryRules {
    pub yes_exact: &'static [&'static str],
    pub no_exact: &'static [&'static str],
    pub no_contains: &'static [&'static str],
    pub maybe_exact: &'static [&'static str],
    pub maybe_contains: &'static [&'static str],
}

impl TernaryRules {
    fn classify(&self, token: &str) -> Option<TernaryValue> {
        if self.yes_exact.contains(&token) {
            return Some(TernaryValue::Yes);
        }
        if self.no_exact.contains(&token) || self.no_contains.iter().any(|k| token.contains(k)) {
            return Some(TernaryValue::No);
        }
        if self.maybe_exact.contains(&token)
            || self.maybe_contains.iter().any(|k| token.contains(k))
        {
            return Some(TernaryValue::Maybe);
        }
        None
    }
}

/// Variables with a three-state classification, keyed by variable name.
static TERNARY_RULES: phf::Map<&'static str, TernaryRules> = phf_map! {
    // "W" marks a waney edge and "B" bark with the waney edge beneath it.
    // "Nära W" (near waney edge) and disjunctions are undecided.
    "Waney edge (W)" => TernaryRules {
        yes_exact: &["w", "b"],
        no_exact: &["nej", "no"],
        no_contains: &["ej w"],
        maybe_exact: &["undefined", "indeterminable"],
        maybe_contains: &["nära", "near", "?", "eller", " or "],
    },
};

/// Returns true when `variable` has a ternary keyword table.
pub fn ternary_supported(variable: &str) -> bool {
    TERNARY_RULES.contains_key(variable)
}

fn strip_markers(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '?' | '~') && !c.is_whitespace())
        .collect()
}

fn parse_float(raw: &str) -> Option<f64> {
    let cleaned = strip_markers(raw);
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// The number at the start of `raw` after leading whitespace: an optional
/// sign, digits and at most one decimal point. Whatever follows is ignored,
/// so `"28 years"` reads as 28 while `"~28"` has no number at all.
fn leading_float(raw: &str) -> Option<f64> {
    let s = raw.trim_start();
    let mut end = 0;
    let mut digits = false;
    let mut dot = false;
    for (i, c) in s.char_indices() {
        match c {
            '+' | '-' if i == 0 => {}
            '0'..='9' => digits = true,
            '.' if !dot => dot = true,
            _ => break,
        }
        end = i + c.len_utf8();
    }
    if !digits {
        return None;
    }
    s.get(..end)?.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a numeric category into a point estimate.
///
/// `>N` reads as `N + 1` and `<N` as `N - 1`. A range `a-b` collapses to its
/// lower bound `a`, so a token with a leading minus has no lower bound and is
/// rejected. These three forms read only the number that starts the bound and
/// ignore trailing text, but a marker in front of the number rejects the
/// token. A plain value has its uncertainty markers (`?`, `~`) and whitespace
/// dropped and must then be a number in full.
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let token = raw.trim();
    if token.is_empty() || token.eq_ignore_ascii_case("undefined") {
        return None;
    }
    if let Some(rest) = token.strip_prefix('>') {
        return leading_float(rest).map(|v| v + 1.0);
    }
    if let Some(rest) = token.strip_prefix('<') {
        return leading_float(rest).map(|v| v - 1.0);
    }
    if let Some((lower, _)) = token.split_once('-') {
        return leading_float(lower);
    }
    parse_float(token)
}

pub fn parse_binary(raw: &str) -> Option<BinaryValue> {
    let token = strip_markers(raw).to_lowercase();
    if AFFIRMATIVE.contains(token.as_str()) {
        Some(BinaryValue::Yes)
    } else if NEGATIVE.contains(token.as_str()) {
        Some(BinaryValue::No)
    } else {
        None
    }
}

/// Classify `raw` with the keyword table of `variable`. Always `None` for a
/// variable without a table; use [`ternary_supported`] to tell the two apart.
pub fn parse_ternary(raw: &str, variable: &str) -> Option<TernaryValue> {
    let rules = TERNARY_RULES.get(variable)?;
    let token = raw.trim().to_lowercase();
    if token.is_empty() {
        return None;
    }
    rules.classify(&token)
}
