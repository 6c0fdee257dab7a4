//! Report score = Σ over distinct tokens of rarity × difficulty + length term.
//!
//! - rarity     : `model.rarity(normalized_key, month)`
//! - difficulty : [`token_difficulty`] for observations, 1.0 for TAF/PIREP
//! - length     : `length_weight * chars(raw)`
//!
//! Tokens are summed in first-occurrence order so the float result is
//! reproducible bit for bit.

use std::collections::HashSet;

use super::difficulty::token_difficulty;
use super::normalize::normalize_token;
use super::tokenize::ReportFamily;
use crate::rarity::RarityModel;

/// Per-token breakdown, handy for explaining a leaderboard position.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenContribution {
    pub token: String,
    pub key: String,
    pub rarity: f64,
    pub difficulty: f64,
}

impl TokenContribution {
    pub fn value(&self) -> f64 {
        self.rarity * self.difficulty
    }
}

/// Score one report of `family` observed in `month`.
pub fn score(
    raw: &str,
    model: &RarityModel,
    length_weight: f64,
    month: u32,
    family: ReportFamily,
) -> f64 {
    let tokens: f64 = contributions(raw, model, month, family)
        .iter()
        .map(TokenContribution::value)
        .sum();
    tokens + length_weight * raw.chars().count() as f64
}

/// Observation score with the full classifier + difficulty table.
pub fn metar_score(raw: &str, model: &RarityModel, length_weight: f64, month: u32) -> f64 {
    score(raw, model, length_weight, month, ReportFamily::Metar)
}

/// One entry per distinct raw token, in first-occurrence order.
pub fn contributions(
    raw: &str,
    model: &RarityModel,
    month: u32,
    family: ReportFamily,
) -> Vec<TokenContribution> {
    let mut seen = HashSet::new();
    family
        .tokenize(raw)
        .into_iter()
        .filter(|tok| seen.insert(*tok))
        .map(|tok| {
            let key = normalize_token(tok);
            let difficulty = if family.uses_difficulty() {
                token_difficulty(tok)
            } else {
                1.0
            };
            TokenContribution {
                token: tok.to_string(),
                rarity: model.rarity(&key, month),
                key,
                difficulty,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rarity::RarityAggregator;

    fn model() -> RarityModel {
        let mut agg = RarityAggregator::new();
        for _ in 0..50 {
            agg.observe(["WIND", "VIS", "CLOUD_FEW", "ALTIMETER", "TEMP_DEW"], 6);
        }
        agg.observe(["WIND_GUST", "VV", "+TSRA"], 6);
        agg.finalize(0.5)
    }

    #[test]
    fn empty_text_scores_zero() {
        let m = model();
        assert_eq!(metar_score("", &m, 0.02, 6), 0.0);
        assert_eq!(score("", &m, 1.0, 6, ReportFamily::Pirep), 0.0);
    }

    #[test]
    fn repeated_tokens_count_once() {
        let m = model();
        let once = metar_score("KJFK 121851Z -RA", &m, 0.0, 6);
        let twice = metar_score("KJFK 121851Z -RA -RA", &m, 0.0, 6);
        assert_eq!(once, twice);
    }

    #[test]
    fn unusual_report_outranks_routine_one() {
        let m = model();
        let routine = "METAR KDEN 121853Z 27010KT 10SM FEW250 22/05 A3001";
        let nasty = "METAR KDEN 121853Z 27035G50KT 1/4SM +TSRA VV002 22/21 A2950";
        assert!(metar_score(nasty, &m, 0.0, 6) > metar_score(routine, &m, 0.0, 6));
    }

    #[test]
    fn length_term_is_char_based() {
        let m = model();
        let base = score("UA", &m, 0.0, 6, ReportFamily::Pirep);
        let with_len = score("UA", &m, 1.0, 6, ReportFamily::Pirep);
        assert!((with_len - base - 2.0).abs() < 1e-12);
    }

    #[test]
    fn forecasts_use_uniform_difficulty() {
        let m = model();
        let parts = contributions("TAF KAUS 121130Z VV002", &m, 6, ReportFamily::Taf);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].key, "VV");
        assert_eq!(parts[0].difficulty, 1.0);
        let obs = contributions("KAUS 121130Z VV002", &m, 6, ReportFamily::Metar);
        assert_eq!(obs[0].difficulty, 5.0);
    }

    #[test]
    fn score_is_deterministic() {
        let m = model();
        let text = "SPECI KBOS 121905Z 04025G38KT 1/2SM +SN FZFG VV004 M02/M03 A2968 RMK PK WND 04045/1858";
        let a = metar_score(text, &m, 0.02, 12);
        let b = metar_score(text, &m, 0.02, 12);
        assert_eq!(a.to_bits(), b.to_bits());
        assert!(a > 0.0);
    }
}
