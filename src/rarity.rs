//! # Seasonal rarity model
//!
//! Rarity of a canonical token is `-ln P(token | month)` under a Laplace-smoothed
//! frequency model, with the month's counts blended with its two calendar
//! neighbours (December wraps to January):
//!
//! ```text
//! c_eff = (1-s)*c_m + (s/2)*(c_prev + c_next)
//! t_eff = (1-s)*t_m + (s/2)*(t_prev + t_next)
//! P     = (c_eff + alpha) / (t_eff + alpha*vocab_all)
//! ```
//!
//! The smoothing denominator always uses the global vocabulary size so that
//! sparse months stay comparable with busy ones.
//!
//! Two views share one counter layout ([`Counters`]):
//! - [`RarityAggregator`]: mutable, used only while training;
//! - [`RarityModel`]: immutable snapshot used for scoring (`Send + Sync`, no
//!   interior mutability, safe to share across request handlers).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::RangeInclusive;

pub const MONTHS: RangeInclusive<u32> = 1..=12;
pub const DEFAULT_ALPHA: f64 = 0.5;
pub const DEFAULT_NEIGHBOR_SMOOTH: f64 = 0.25;

/// Raw occurrence counters. Every observation bumps the global and the
/// month-stratified side together, so `counts_all[t] == Σ_m counts_by_month[m][t]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Counters {
    pub counts_all: HashMap<String, u64>,
    pub total_all: u64,
    pub totals_by_month: BTreeMap<u32, u64>,
    pub counts_by_month: BTreeMap<u32, HashMap<String, u64>>,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            counts_all: HashMap::new(),
            total_all: 0,
            totals_by_month: MONTHS.map(|m| (m, 0)).collect(),
            counts_by_month: MONTHS.map(|m| (m, HashMap::new())).collect(),
        }
    }
}

impl Counters {
    /// Number of distinct canonical tokens seen so far.
    pub fn vocab_size(&self) -> usize {
        self.counts_all.len()
    }

    /// Checks the global/monthly count invariant (tokens and totals).
    pub fn is_consistent(&self) -> bool {
        let monthly_total: u64 = self.totals_by_month.values().sum();
        if monthly_total != self.total_all {
            return false;
        }
        let mut summed: HashMap<&str, u64> = HashMap::new();
        for counts in self.counts_by_month.values() {
            for (tok, c) in counts {
                *summed.entry(tok.as_str()).or_insert(0) += c;
            }
        }
        summed.len() == self.counts_all.len()
            && self
                .counts_all
                .iter()
                .all(|(tok, c)| summed.get(tok.as_str()) == Some(c))
    }

    /// Fill in any month keys missing from a legacy/partial document.
    pub(crate) fn ensure_all_months(&mut self) {
        for m in MONTHS {
            self.totals_by_month.entry(m).or_insert(0);
            self.counts_by_month.entry(m).or_default();
        }
    }

    fn merge(&mut self, other: Counters) {
        for (tok, c) in other.counts_all {
            *self.counts_all.entry(tok).or_insert(0) += c;
        }
        self.total_all += other.total_all;
        for (m, t) in other.totals_by_month {
            *self.totals_by_month.entry(m).or_insert(0) += t;
        }
        for (m, counts) in other.counts_by_month {
            let target = self.counts_by_month.entry(m).or_default();
            for (tok, c) in counts {
                *target.entry(tok).or_insert(0) += c;
            }
        }
    }
}

fn bump(map: &mut HashMap<String, u64>, tok: &str) {
    match map.get_mut(tok) {
        Some(c) => *c += 1,
        None => {
            map.insert(tok.to_owned(), 1);
        }
    }
}

/// Training-side accumulator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RarityAggregator {
    counters: Counters,
}

impl RarityAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from previously persisted counters (e.g. a checkpoint).
    pub fn from_counters(mut counters: Counters) -> Self {
        counters.ensure_all_months();
        Self { counters }
    }

    /// Count each *distinct* token of one report once for `month`.
    ///
    /// Repeats inside a report are ignored on purpose: boilerplate groups that
    /// appear several times per report would otherwise swamp the counts.
    /// Returns `false` (and records nothing) for a month outside 1..=12.
    pub fn observe<I, S>(&mut self, tokens: I, month: u32) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !MONTHS.contains(&month) {
            return false;
        }
        let tokens: Vec<S> = tokens.into_iter().collect();
        let distinct: HashSet<&str> = tokens.iter().map(AsRef::as_ref).collect();
        if distinct.is_empty() {
            return true;
        }

        let c = &mut self.counters;
        let month_counts = c.counts_by_month.entry(month).or_default();
        for tok in &distinct {
            bump(&mut c.counts_all, tok);
            bump(month_counts, tok);
        }
        let n = distinct.len() as u64;
        c.total_all += n;
        *c.totals_by_month.entry(month).or_insert(0) += n;
        true
    }

    /// Fold another aggregator's counts into this one.
    pub fn merge(&mut self, other: RarityAggregator) {
        self.counters.merge(other.counters);
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn into_counters(self) -> Counters {
        self.counters
    }

    pub fn vocab_size(&self) -> usize {
        self.counters.vocab_size()
    }

    pub fn total_events(&self) -> u64 {
        self.counters.total_all
    }

    /// Freeze into an immutable snapshot.
    pub fn finalize(self, alpha: f64) -> RarityModel {
        let vocab_all = self.counters.vocab_size() as u64;
        RarityModel {
            alpha,
            vocab_all,
            counters: self.counters,
        }
    }
}

/// Immutable, read-only rarity snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct RarityModel {
    alpha: f64,
    vocab_all: u64,
    counters: Counters,
}

impl RarityModel {
    /// Build from stored parts. Month keys are taken as-is: a snapshot missing
    /// a month falls back to the global estimate for that month.
    pub fn from_parts(alpha: f64, vocab_all: u64, counters: Counters) -> Self {
        Self {
            alpha,
            vocab_all,
            counters,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn total_all(&self) -> u64 {
        self.counters.total_all
    }

    pub fn vocab_all(&self) -> u64 {
        self.vocab_all
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// `-ln P(token | month)` with the default neighbour-month blend.
    pub fn rarity(&self, tok: &str, month: u32) -> f64 {
        self.rarity_with_smoothing(tok, month, DEFAULT_NEIGHBOR_SMOOTH)
    }

    /// `-ln P(token | month)` with an explicit neighbour weight `s` (clamped to [0,1]).
    pub fn rarity_with_smoothing(&self, tok: &str, month: u32, neighbor_smooth: f64) -> f64 {
        let c = &self.counters;
        let (Some(t_m), Some(month_counts)) =
            (c.totals_by_month.get(&month), c.counts_by_month.get(&month))
        else {
            return -self.global_probability(tok).ln();
        };

        let c_m = month_counts.get(tok).copied().unwrap_or(0) as f64;
        let t_m = *t_m as f64;

        let s = if neighbor_smooth.is_nan() {
            0.0
        } else {
            neighbor_smooth.clamp(0.0, 1.0)
        };
        let (c_eff, t_eff) = if s > 0.0 {
            let (prev, next) = neighbours(month);
            let count_in = |m: u32| {
                c.counts_by_month
                    .get(&m)
                    .and_then(|counts| counts.get(tok))
                    .copied()
                    .unwrap_or(0) as f64
            };
            let total_in = |m: u32| c.totals_by_month.get(&m).copied().unwrap_or(0) as f64;
            (
                (1.0 - s) * c_m + (s / 2.0) * (count_in(prev) + count_in(next)),
                (1.0 - s) * t_m + (s / 2.0) * (total_in(prev) + total_in(next)),
            )
        } else {
            (c_m, t_m)
        };

        let p = if t_eff > 0.0 {
            (c_eff + self.alpha) / (t_eff + self.alpha * self.vocab_for_smoothing())
        } else {
            self.global_probability(tok)
        };
        -p.ln()
    }

    fn global_probability(&self, tok: &str) -> f64 {
        let c = self.counters.counts_all.get(tok).copied().unwrap_or(0) as f64;
        let total = self.counters.total_all as f64;
        (c + self.alpha) / (total + self.alpha * self.vocab_for_smoothing())
    }

    // An empty model still needs a non-zero denominator.
    fn vocab_for_smoothing(&self) -> f64 {
        self.vocab_all.max(1) as f64
    }
}

/// Calendar neighbours of `month`, wrapping December <-> January.
fn neighbours(month: u32) -> (u32, u32) {
    let prev = if month == 1 { 12 } else { month - 1 };
    let next = if month == 12 { 1 } else { month + 1 };
    (prev, next)
}
