// tests/scoring_properties.rs
use metar_rarity::analyze::{canonical_keys, contributions, metar_score, token_difficulty};
use metar_rarity::store::model_from_json;
use metar_rarity::{score, RarityAggregator, RarityModel, ReportFamily};

fn trained() -> RarityModel {
    let reports = [
        ("KJFK 011251Z 18010KT 10SM FEW250 22/12 A2992", 1),
        ("KJFK 011351Z 19012KT 10SM SCT250 23/12 A2991", 1),
        ("KJFK 011451Z 20010KT 10SM BKN250 24/12 A2990", 2),
        ("KJFK 011551Z 21010KT 1/4SM FG VV001 12/12 A2990 RMK FC", 2),
    ];
    let mut agg = RarityAggregator::new();
    for (raw, month) in reports {
        agg.observe(canonical_keys(raw, ReportFamily::Metar), month);
    }
    agg.finalize(0.5)
}

#[test]
fn worked_example_from_stored_snapshot() {
    let json = r#"{
        "alpha": 0.5, "total_all": 20, "vocab_all": 4,
        "counts_all": {"VV": 5, "WIND": 15},
        "totals_by_month": {"1":0,"2":0,"3":0,"4":0,"5":0,"6":20,"7":0,"8":0,"9":0,"10":0,"11":0,"12":0},
        "counts_by_month": {"1":{},"2":{},"3":{},"4":{},"5":{},"6":{"VV":5,"WIND":15},"7":{},"8":{},"9":{},"10":{},"11":{},"12":{}}
    }"#;
    let model = model_from_json(json).unwrap();
    let r = model.rarity_with_smoothing("VV", 6, 0.0);
    assert!((r - 4f64.ln()).abs() < 1e-12);
}

#[test]
fn rare_reports_outscore_routine_ones() {
    let model = trained();
    let routine = "KJFK 011651Z 18010KT 10SM FEW250 22/12 A2992";
    let unusual = "KJFK 011651Z 18010KT 1/4SM +FC VV001 12/12 A2992 RMK FC";
    assert!(metar_score(routine, &model, 0.0, 1) < metar_score(unusual, &model, 0.0, 1));
}

#[test]
fn scoring_is_pure_and_empty_text_scores_zero() {
    let model = trained();
    let raw = "KJFK 011551Z 21010KT 1/4SM FG VV001 12/12 A2990 RMK FC";
    for month in 1..=12 {
        let a = score(raw, &model, 0.01, month, ReportFamily::Metar);
        let b = score(raw, &model, 0.01, month, ReportFamily::Metar);
        assert_eq!(a.to_bits(), b.to_bits());
        assert!(a.is_finite() && a >= 0.0);
        assert_eq!(score("", &model, 0.5, month, ReportFamily::Pirep), 0.0);
    }
}

#[test]
fn difficulty_examples() {
    assert_eq!(token_difficulty("OVC003"), 1.0);
    assert_eq!(token_difficulty("FC"), 4.0);

    let model = trained();
    let parts = contributions("KJFK 011551Z OVC003 OVC003 RMK FC", &model, 2, ReportFamily::Metar);
    // repeats collapse to one contribution
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0].key, "CLOUD_OVC");
    assert_eq!(parts[0].difficulty, 1.0);
    assert_eq!(parts[2].difficulty, 4.0);
}

#[test]
fn forecasts_and_pilot_reports_use_uniform_weight() {
    let model = trained();
    for family in [ReportFamily::Taf, ReportFamily::Pirep] {
        let parts = contributions("OVC003 FC", &model, 1, family);
        assert!(parts.iter().all(|p| p.difficulty == 1.0), "{family:?}");
    }
}

#[test]
fn counts_stay_consistent_after_training() {
    let model = trained();
    assert!(model.counters().is_consistent());
    assert_eq!(model.vocab_all() as usize, model.counters().vocab_size());
}
