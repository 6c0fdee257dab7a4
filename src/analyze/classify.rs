//! Token classes for routine observation (METAR) groups.
//!
//! Classification is first-match-wins over [`TokenClass::ORDERED`]. The order is
//! load-bearing: an RVR group like `R28L/2400FT` must never fall through to a
//! looser rule further down the list.

use once_cell::sync::Lazy;
use regex::Regex;

use super::difficulty::is_significant_remark;

static RE_RVR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^R\d{2}[LRC]?/").expect("rvr regex"));
static RE_VV: Lazy<Regex> = Lazy::new(|| Regex::new(r"^VV\d{3}$").expect("vv regex"));
static RE_WIND_SHEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^WS(RWY\d{2}[LRC]?|\d{3}/\d{2,3}KT)$").expect("wind shear regex")
});
static RE_RUNWAY_STATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^R\d{2}[LRC]?\d{4}/").expect("runway state regex"));
static RE_SECTOR_VIS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}[A-Z]{1,3}$").expect("sector vis regex"));
static RE_VAR_WIND_DIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{3}V\d{3}$").expect("variable wind regex"));
static RE_WX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\+|-)?(VC)?[A-Z]{2,6}$").expect("weather regex"));
pub(crate) static RE_WIND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(VRB|\d{3})\d{2,3}(G\d{2,3})?KT$").expect("wind regex")
});
static RE_VIS_SM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+|\d+/\d+|\d+\s\d+/\d+)SM$").expect("vis regex"));
static RE_TEMP_DEW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(M?\d{2})/(M?\d{2})$").expect("temp/dew regex"));
static RE_ALTIM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^A\d{4}$|^Q\d{4}$").expect("altimeter regex"));
pub(crate) static RE_CLOUD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(FEW|SCT|BKN|OVC)(\d{3})(CB|TCU)?$").expect("cloud regex")
});

/// Syntactic category of a single whitespace-delimited report token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenClass {
    RunwayVisualRange,
    VerticalVisibility,
    WindShear,
    RunwayState,
    SectorVisibility,
    VariableWindDirection,
    RemarkMarker,
    Weather,
    Wind,
    Visibility,
    TempDew,
    Altimeter,
    Cloud,
    Other,
}

impl TokenClass {
    /// Match order; `Other` is the implicit fallback and is not listed.
    pub const ORDERED: [TokenClass; 13] = [
        TokenClass::RunwayVisualRange,
        TokenClass::VerticalVisibility,
        TokenClass::WindShear,
        TokenClass::RunwayState,
        TokenClass::SectorVisibility,
        TokenClass::VariableWindDirection,
        TokenClass::RemarkMarker,
        TokenClass::Weather,
        TokenClass::Wind,
        TokenClass::Visibility,
        TokenClass::TempDew,
        TokenClass::Altimeter,
        TokenClass::Cloud,
    ];

    /// Whether `tok` satisfies this class's pattern (ignoring precedence).
    pub fn matches(self, tok: &str) -> bool {
        match self {
            TokenClass::RunwayVisualRange => RE_RVR.is_match(tok),
            TokenClass::VerticalVisibility => RE_VV.is_match(tok),
            TokenClass::WindShear => RE_WIND_SHEAR.is_match(tok),
            TokenClass::RunwayState => RE_RUNWAY_STATE.is_match(tok),
            TokenClass::SectorVisibility => RE_SECTOR_VIS.is_match(tok),
            TokenClass::VariableWindDirection => RE_VAR_WIND_DIR.is_match(tok),
            TokenClass::RemarkMarker => tok == "RMK",
            // Significant remark keywords (FC, LTG, TWR, ...) stay `Other` so the
            // difficulty override can see them.
            TokenClass::Weather => RE_WX.is_match(tok) && !is_significant_remark(tok),
            TokenClass::Wind => RE_WIND.is_match(tok),
            TokenClass::Visibility => RE_VIS_SM.is_match(tok),
            TokenClass::TempDew => RE_TEMP_DEW.is_match(tok),
            TokenClass::Altimeter => RE_ALTIM.is_match(tok),
            TokenClass::Cloud => RE_CLOUD.is_match(tok),
            TokenClass::Other => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TokenClass::RunwayVisualRange => "RVR",
            TokenClass::VerticalVisibility => "VV",
            TokenClass::WindShear => "WIND_SHEAR",
            TokenClass::RunwayState => "RUNWAY_STATE",
            TokenClass::SectorVisibility => "SECTOR_VIS",
            TokenClass::VariableWindDirection => "VAR_WIND_DIR",
            TokenClass::RemarkMarker => "RMK_MARKER",
            TokenClass::Weather => "WX",
            TokenClass::Wind => "WIND",
            TokenClass::Visibility => "VIS",
            TokenClass::TempDew => "TEMP_DEW",
            TokenClass::Altimeter => "ALTIM",
            TokenClass::Cloud => "CLOUD",
            TokenClass::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for TokenClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify one raw token. Total: anything unmatched is [`TokenClass::Other`].
pub fn classify_token(tok: &str) -> TokenClass {
    TokenClass::ORDERED
        .iter()
        .copied()
        .find(|class| class.matches(tok))
        .unwrap_or(TokenClass::Other)
}
