// src/analyze/mod.rs
//! Report analysis: tokenize -> classify -> normalize / weigh -> score.

pub mod classify;
pub mod difficulty;
pub mod normalize;
pub mod scoring;
pub mod tokenize;

// Re-export convenient types.
pub use crate::analyze::classify::{classify_token, TokenClass};
pub use crate::analyze::difficulty::token_difficulty;
pub use crate::analyze::normalize::normalize_token;
pub use crate::analyze::scoring::{contributions, metar_score, score, TokenContribution};
pub use crate::analyze::tokenize::ReportFamily;

use std::collections::BTreeSet;

/// Distinct canonical keys of one report, as counted during training.
pub fn canonical_keys(raw: &str, family: ReportFamily) -> BTreeSet<String> {
    family
        .tokenize(raw)
        .into_iter()
        .map(normalize_token)
        .collect()
}
