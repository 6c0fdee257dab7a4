//! Canonical vocabulary keys: the unit the rarity model counts.
//!
//! Most structural groups collapse to one key per class (every altimeter
//! setting is just `ALTIMETER`); weather strings stay verbatim because `-RA`
//! and `+RA` are different events.

use once_cell::sync::Lazy;
use regex::Regex;

use super::classify::{classify_token, TokenClass, RE_CLOUD, RE_WIND};

static RE_RWY_DESIG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^RWY\d{2}[LRC]?$").expect("runway designator regex"));
static RE_PRES_TREND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^PRES(FR|RR)$").expect("pressure trend regex"));
static RE_SLP: Lazy<Regex> = Lazy::new(|| Regex::new(r"^SLP\d{3}$").expect("slp regex"));
static RE_WIND_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{3,5}/\d{4}$").expect("wind/time regex"));

/// Map a raw token to its canonical key.
pub fn normalize_token(tok: &str) -> String {
    match classify_token(tok) {
        TokenClass::Altimeter => "ALTIMETER".into(),
        TokenClass::Wind => wind_key(tok).into(),
        TokenClass::Cloud => cloud_key(tok),
        TokenClass::Weather => tok.to_string(),
        TokenClass::RemarkMarker => "RMK".into(),
        TokenClass::Other => other_key(tok),
        class => class.as_str().to_string(),
    }
}

fn wind_key(tok: &str) -> &'static str {
    let Some(caps) = RE_WIND.captures(tok) else {
        return "WIND";
    };
    if caps.get(2).is_some() {
        "WIND_GUST"
    } else if caps.get(1).is_some_and(|m| m.as_str() == "VRB") {
        "WIND_VRB"
    } else {
        "WIND"
    }
}

fn cloud_key(tok: &str) -> String {
    let Some(caps) = RE_CLOUD.captures(tok) else {
        return "CLOUD".into();
    };
    let base = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    match caps.get(3) {
        Some(conv) => format!("CLOUD_{base}_{}", conv.as_str()),
        None => format!("CLOUD_{base}"),
    }
}

fn other_key(tok: &str) -> String {
    if RE_RWY_DESIG.is_match(tok) {
        "RWY_DESIG".into()
    } else if RE_PRES_TREND.is_match(tok) {
        "PRES_TREND".into()
    } else if RE_SLP.is_match(tok) {
        "SLP".into()
    } else if RE_WIND_TIME.is_match(tok) {
        "WIND_TIME".into()
    } else {
        // Bare remark words keep their spelling, so `VIS` and `RVR` in remarks
        // share a key (and a count) with the visibility and RVR groups.
        tok.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_groups_collapse() {
        assert_eq!(normalize_token("A3012"), "ALTIMETER");
        assert_eq!(normalize_token("Q0998"), "ALTIMETER");
        assert_eq!(normalize_token("12/08"), "TEMP_DEW");
        assert_eq!(normalize_token("3/4SM"), "VIS");
        assert_eq!(normalize_token("R04R/P6000FT"), "RVR");
        assert_eq!(normalize_token("VV001"), "VV");
        assert_eq!(normalize_token("1200SW"), "SECTOR_VIS");
        assert_eq!(normalize_token("200V260"), "VAR_WIND_DIR");
        assert_eq!(normalize_token("RMK"), "RMK");
    }

    #[test]
    fn remark_words_pool_with_their_group_keys() {
        assert_eq!(normalize_token("VIS"), normalize_token("3/4SM"));
        assert_eq!(normalize_token("RVR"), normalize_token("R28L/2400FT"));
    }

    #[test]
    fn wind_variants() {
        assert_eq!(normalize_token("27010KT"), "WIND");
        assert_eq!(normalize_token("VRB04KT"), "WIND_VRB");
        assert_eq!(normalize_token("31020G32KT"), "WIND_GUST");
        // gust wins over VRB
        assert_eq!(normalize_token("VRB15G25KT"), "WIND_GUST");
    }

    #[test]
    fn cloud_keys_keep_coverage_and_convective_suffix() {
        assert_eq!(normalize_token("OVC003"), "CLOUD_OVC");
        assert_eq!(normalize_token("BKN025CB"), "CLOUD_BKN_CB");
        assert_eq!(normalize_token("SCT040TCU"), "CLOUD_SCT_TCU");
    }

    #[test]
    fn weather_kept_verbatim() {
        assert_eq!(normalize_token("-RA"), "-RA");
        assert_eq!(normalize_token("+RA"), "+RA");
        assert_eq!(normalize_token("VCSH"), "VCSH");
    }

    #[test]
    fn residual_patterns() {
        assert_eq!(normalize_token("RWY28L"), "RWY_DESIG");
        assert_eq!(normalize_token("PRESRR"), "PRES_TREND");
        assert_eq!(normalize_token("SLP132"), "SLP");
        assert_eq!(normalize_token("2018/2124"), "WIND_TIME");
        assert_eq!(normalize_token("AO2"), "AO2");
        assert_eq!(normalize_token("$"), "$");
    }
}
