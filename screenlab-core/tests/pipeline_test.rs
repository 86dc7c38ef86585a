//! Screener model pipeline tests.
//!
//! 1. Dollar-volume + volume-spike scenario on three symbols
//! 2. Monotonicity — output ⊆ universe, step counts non-increasing
//! 3. Idempotence — same (cache, universe) twice gives the same survivors

use std::collections::HashSet;

use chrono::NaiveDate;
use proptest::prelude::*;
use screenlab_core::domain::{Bar, BarCache, BarSeries, ParamValue};
use screenlab_core::model::ScreenerModel;
use screenlab_core::screener::{ScreenerConfig, ScreenerRegistry};

fn bars(closes: &[f64], volumes: &[f64]) -> Vec<Bar> {
    let base = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
    closes
        .iter()
        .zip(volumes)
        .enumerate()
        .map(|(i, (&c, &v))| Bar::new(base + chrono::Duration::days(i as i64), c, c + 0.5, c - 0.5, c, v))
        .collect()
}

fn liquidity_spike_model() -> ScreenerModel {
    ScreenerModel::new(
        "Liquid spikes",
        vec![
            ScreenerConfig::new("dollar_volume").with_param("min_dollar_volume", 10_000_000.0),
            ScreenerConfig::new("volume_spike").with_param("multiplier", 2.0),
        ],
    )
}

/// 30 daily bars each. Only BOTH passes both the $10M dollar-volume floor
/// and the 2× volume spike on the most recent bar.
#[test]
fn dollar_volume_and_volume_spike_scenario() {
    let closes = vec![50.0; 30];

    // 50 × 300k = 15M on the last bar, 3× the 100k baseline.
    let mut both = vec![100_000.0; 29];
    both.push(300_000.0);

    // Liquid (50 × 400k = 20M) but flat volume: no spike.
    let liquid_only = vec![400_000.0; 30];

    // Spikes 3× but 50 × 30k = 1.5M: too thin.
    let mut spike_only = vec![10_000.0; 29];
    spike_only.push(30_000.0);

    let mut cache = BarCache::new();
    cache.insert("BOTH.US".into(), BarSeries::new(bars(&closes, &both)));
    cache.insert("LIQUID.US".into(), BarSeries::new(bars(&closes, &liquid_only)));
    cache.insert("SPIKE.US".into(), BarSeries::new(bars(&closes, &spike_only)));

    let registry = ScreenerRegistry::builtin();
    let model = liquidity_spike_model().compile(&registry).unwrap();
    let universe: Vec<String> = cache.keys().cloned().collect();
    let run = model.execute(&universe, &cache);

    assert_eq!(run.symbol_names(), vec!["BOTH.US"]);
    assert_eq!(run.step_counts, vec![2, 1]);
    let meta = &run.symbols[0].metadata;
    assert_eq!(meta["dollar_volume"], 15_000_000.0);
    assert_eq!(meta["volume_ratio"], 3.0);
}

#[test]
fn universe_restricts_candidates() {
    let mut cache = BarCache::new();
    cache.insert("A".into(), BarSeries::new(bars(&[20.0; 5], &[1.0; 5])));
    cache.insert("B".into(), BarSeries::new(bars(&[20.0; 5], &[1.0; 5])));

    let model = ScreenerModel::new("Price", vec![ScreenerConfig::new("price_range")])
        .compile(&ScreenerRegistry::builtin())
        .unwrap();
    let run = model.execute(&["B".to_string(), "NOT_LOADED".to_string()], &cache);
    assert_eq!(run.symbol_names(), vec!["B"]);
}

// ── Properties ───────────────────────────────────────────────────────

fn arb_cache() -> impl Strategy<Value = BarCache> {
    prop::collection::vec(
        (
            prop::collection::vec(1.0..200.0_f64, 1..40),
            1_000.0..1_000_000.0_f64,
        ),
        1..12,
    )
    .prop_map(|series| {
        series
            .into_iter()
            .enumerate()
            .map(|(i, (closes, vol))| {
                let volumes: Vec<f64> = closes
                    .iter()
                    .enumerate()
                    .map(|(j, _)| vol * (1.0 + (j % 3) as f64))
                    .collect();
                (format!("S{i:02}"), BarSeries::new(bars(&closes, &volumes)))
            })
            .collect()
    })
}

fn arb_steps() -> impl Strategy<Value = Vec<ScreenerConfig>> {
    let step = prop_oneof![
        (1.0..100.0_f64).prop_map(|min| ScreenerConfig::new("price_range").with_param("min_price", min)),
        (1_000.0..50_000_000.0_f64)
            .prop_map(|min| ScreenerConfig::new("dollar_volume").with_param("min_dollar_volume", min)),
        (1usize..20).prop_map(|n| ScreenerConfig::new("top_n")
            .with_param("count", n)
            .with_param("lookback", 1usize)),
        (1.0..3.0_f64).prop_map(|m| ScreenerConfig::new("volume_spike")
            .with_param("multiplier", m)
            .with_param("lookback", 2usize)),
        (0.0..50.0_f64).prop_map(|pct| ScreenerConfig::new("near_high")
            .with_param("lookback", 5usize)
            .with_param("within_pct", ParamValue::Number(pct))),
    ];
    prop::collection::vec(step, 1..5)
}

proptest! {
    #[test]
    fn pipeline_is_monotonic(cache in arb_cache(), steps in arb_steps()) {
        let registry = ScreenerRegistry::builtin();
        let model = ScreenerModel::new("Prop", steps).compile(&registry).unwrap();
        let universe: Vec<String> = cache.keys().cloned().collect();
        let run = model.execute(&universe, &cache);

        let allowed: HashSet<&str> = universe.iter().map(String::as_str).collect();
        prop_assert!(run.symbols.iter().all(|s| allowed.contains(s.symbol.as_str())));
        prop_assert!(run.step_counts.len() == model.step_names().count());
        prop_assert!(run.step_counts[0] <= universe.len());
        for w in run.step_counts.windows(2) {
            prop_assert!(w[1] <= w[0], "step counts increased: {:?}", run.step_counts);
        }
        prop_assert_eq!(run.step_counts.last().copied(), Some(run.symbols.len()));
    }

    #[test]
    fn pipeline_is_idempotent(cache in arb_cache(), steps in arb_steps()) {
        let registry = ScreenerRegistry::builtin();
        let model = ScreenerModel::new("Prop", steps).compile(&registry).unwrap();
        let universe: Vec<String> = cache.keys().cloned().collect();
        let first = model.execute(&universe, &cache);
        let second = model.execute(&universe, &cache);
        prop_assert_eq!(first, second);
    }
}
