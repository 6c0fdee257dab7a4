//! Decode-difficulty weights for METAR tokens.
//!
//! Base weight comes from the token's class. Two adjustments:
//! - significant remark keywords (severe weather, lightning, wind shift, tower/
//!   surface visibility, RVR mention, volcanic ash) weigh [`REMARK_KEYWORD_WEIGHT`]
//!   instead of the `Other` default;
//! - BKN/OVC layers at or below 500 ft get [`LOW_CEILING_BONUS`] on top.

use super::classify::{classify_token, TokenClass, RE_CLOUD};

pub const REMARK_KEYWORD_WEIGHT: f64 = 4.0;
pub const LOW_CEILING_BONUS: f64 = 0.8;
/// Encoded layer height (hundreds of feet) at or below which the bonus applies.
pub const LOW_CEILING_MAX_HUNDREDS: u32 = 5;

const SIGNIFICANT_REMARKS: &[&str] = &[
    "TORNADO", "FUNNEL", "WATERSPOUT", "HAIL", "GR", "GS", "FC", "LTG", "LTGIC", "LTGCG",
    "LTGCC", "LTGCA", "PK", "WND", "WSHFT", "FROPA", "PRESFR", "PRESRR", "TWR", "SFC", "VIS",
    "RVR", "VIRGA", "VA", "VASH",
];

pub fn is_significant_remark(tok: &str) -> bool {
    SIGNIFICANT_REMARKS.contains(&tok)
}

/// Fixed per-class weight table.
pub fn base_weight(class: TokenClass) -> f64 {
    match class {
        TokenClass::RunwayVisualRange => 6.0,
        TokenClass::VerticalVisibility => 5.0,
        TokenClass::WindShear => 5.0,
        TokenClass::RunwayState => 4.0,
        TokenClass::SectorVisibility => 3.5,
        TokenClass::Weather => 3.0,
        TokenClass::VariableWindDirection => 2.5,
        TokenClass::Wind => 1.2,
        TokenClass::Visibility => 1.2,
        TokenClass::TempDew => 0.8,
        TokenClass::RemarkMarker => 0.5,
        TokenClass::Altimeter => 0.3,
        // clouds are everywhere; keep them from dominating the score
        TokenClass::Cloud => 0.2,
        TokenClass::Other => 1.0,
    }
}

/// Difficulty weight of one raw token (always > 0).
pub fn token_difficulty(tok: &str) -> f64 {
    let class = classify_token(tok);
    if class == TokenClass::Other && is_significant_remark(tok) {
        return REMARK_KEYWORD_WEIGHT;
    }

    let mut weight = base_weight(class);
    if class == TokenClass::Cloud && is_low_ceiling(tok) {
        weight += LOW_CEILING_BONUS;
    }
    weight
}

/// BKN/OVC with base <= 500 ft. A height field that doesn't parse is never low.
fn is_low_ceiling(tok: &str) -> bool {
    let Some(caps) = RE_CLOUD.captures(tok) else {
        return false;
    };
    let coverage = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    if !matches!(coverage, "BKN" | "OVC") {
        return false;
    }
    caps.get(2)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .is_some_and(|h| h <= LOW_CEILING_MAX_HUNDREDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_overcast_gets_bonus() {
        let w = token_difficulty("OVC003");
        assert!((w - 1.0).abs() < 1e-12, "got {w}");
        assert!((token_difficulty("BKN005") - 1.0).abs() < 1e-12);
    }

    #[test]
    fn high_or_scattered_layers_get_no_bonus() {
        assert!((token_difficulty("OVC006") - 0.2).abs() < 1e-12);
        assert!((token_difficulty("SCT002") - 0.2).abs() < 1e-12);
        assert!((token_difficulty("FEW001CB") - 0.2).abs() < 1e-12);
    }

    #[test]
    fn remark_keyword_override() {
        assert_eq!(token_difficulty("FC"), 4.0);
        assert_eq!(token_difficulty("TORNADO"), 4.0);
        assert_eq!(token_difficulty("WSHFT"), 4.0);
        // not a keyword, stays at the Other default
        assert_eq!(token_difficulty("AO2"), 1.0);
    }

    #[test]
    fn class_table_is_used() {
        assert_eq!(token_difficulty("R28L/2400FT"), 6.0);
        assert_eq!(token_difficulty("VV001"), 5.0);
        assert_eq!(token_difficulty("-RA"), 3.0);
        assert_eq!(token_difficulty("A2992"), 0.3);
        assert_eq!(token_difficulty("RMK"), 0.5);
    }
}
