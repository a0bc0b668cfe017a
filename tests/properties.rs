use chrono::{Days, NaiveDate};
use pairscan::cointegration::{select_cointegrated, CointegrationRecord};
use pairscan::correlation::{correlation_matrix, rank_pairs, select_high_correlation};
use pairscan::panel::{ReturnPanel, SeriesPanel};
use pairscan::signal::{generate_signals, next_position, Position, Thresholds};
use pairscan::spread::hedge_ratio;
use pairscan::stats::sample_moments;
use pairscan::zscore::{z_score, z_scores_for_spreads};
use proptest::collection::vec;
use proptest::prelude::*;

fn dates(n: usize) -> Vec<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    (0..n).map(|i| start + Days::new(i as u64)).collect()
}

fn return_panel() -> impl Strategy<Value = ReturnPanel> {
    (2usize..6, 4usize..40)
        .prop_flat_map(|(m, n)| vec(vec(-0.1f64..0.1, n), m))
        .prop_map(|values| {
            let n = values[0].len();
            let columns = (0..values.len()).map(|i| format!("S{}", i)).collect();
            ReturnPanel::new(dates(n), columns, values).unwrap()
        })
}

fn varied_series() -> impl Strategy<Value = Vec<f64>> {
    vec(-100.0f64..100.0, 3..60).prop_filter("needs spread", |v| {
        sample_moments(v).map_or(false, |(_, _, std)| std > 1e-3)
    })
}

fn record(p_value: f64) -> CointegrationRecord {
    CointegrationRecord {
        asset_a: "A".into(),
        asset_b: "B".into(),
        correlation: 0.9,
        p_value,
        statistic: -3.0,
        critical_values: [-3.9, -3.3, -3.0],
        observations: 100,
        lags: 0,
        low_confidence: false,
    }
}

proptest! {
    #[test]
    fn correlation_matrix_is_symmetric(returns in return_panel()) {
        let m = correlation_matrix(&returns);
        for i in 0..m.size() {
            for j in 0..m.size() {
                prop_assert_eq!(m.get(i, j).to_bits(), m.get(j, i).to_bits());
            }
        }
    }

    #[test]
    fn ranked_pairs_are_distinct_and_descending(returns in return_panel()) {
        let screening = rank_pairs(&returns);
        let m = returns.columns().len();
        prop_assert_eq!(screening.pairs.len() + screening.failures.len(), m * (m - 1) / 2);
        for w in screening.pairs.windows(2) {
            prop_assert!(w[0].correlation >= w[1].correlation);
        }
        for p in &screening.pairs {
            prop_assert!(p.asset_a != p.asset_b);
            prop_assert!((-1.0..=1.0).contains(&p.correlation));
        }
    }

    #[test]
    fn higher_correlation_threshold_selects_subset(
        returns in return_panel(),
        t1 in -1.0f64..1.0,
        t2 in -1.0f64..1.0,
    ) {
        let (lo, hi) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
        let pairs = rank_pairs(&returns).pairs;
        let loose = select_high_correlation(&pairs, lo);
        let strict = select_high_correlation(&pairs, hi);
        prop_assert!(strict.len() <= loose.len());
        prop_assert!(strict.iter().all(|p| loose.contains(p)));
    }

    #[test]
    fn lower_p_threshold_selects_subset(
        ps in vec(0.0f64..1.0, 0..20),
        t1 in 0.0f64..1.0,
        t2 in 0.0f64..1.0,
    ) {
        let (lo, hi) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
        let records: Vec<_> = ps.into_iter().map(record).collect();
        let strict = select_cointegrated(&records, lo);
        let loose = select_cointegrated(&records, hi);
        prop_assert!(strict.iter().all(|r| r.p_value <= lo && loose.contains(r)));
    }

    #[test]
    fn z_scores_have_zero_mean_unit_std(values in varied_series()) {
        let z = z_score(&values).unwrap();
        let (_, mean, std) = sample_moments(&z).unwrap();
        prop_assert!(mean.abs() < 1e-9);
        prop_assert!((std - 1.0).abs() < 1e-9);
    }

    #[test]
    fn normalization_is_deterministic(a in varied_series(), b in varied_series()) {
        let panel = SeriesPanel::from_series(vec![
            ("A_vs_B".to_string(), dates(a.len()), a),
            ("A_vs_C".to_string(), dates(b.len()), b),
        ])
        .unwrap();
        let first = z_scores_for_spreads(&panel, None).unwrap();
        let second = z_scores_for_spreads(&panel, None).unwrap();
        prop_assert_eq!(first.panel, second.panel);
    }

    #[test]
    fn signals_follow_the_transition_rule(
        z in vec(prop_oneof![Just(f64::NAN), -4.0f64..4.0], 0..80),
        exit in 0.1f64..1.5,
        gap in 0.1f64..2.0,
    ) {
        let thresholds = Thresholds::new(exit + gap, exit).unwrap();
        let signals = generate_signals(&z, &thresholds);
        prop_assert_eq!(&signals, &generate_signals(&z, &thresholds));
        prop_assert_eq!(signals.len(), z.len());
        let mut prev = Position::Flat;
        for (value, position) in z.iter().zip(&signals) {
            prop_assert_eq!(*position, next_position(prev, *value, &thresholds));
            if *value > thresholds.entry {
                prop_assert_eq!(*position, Position::Short);
            } else if *value < -thresholds.entry {
                prop_assert_eq!(*position, Position::Long);
            } else if value.abs() < thresholds.exit {
                prop_assert_eq!(*position, Position::Flat);
            } else {
                prop_assert_eq!(*position, prev);
            }
            prev = *position;
        }
    }

    #[test]
    fn affine_leg_recovers_inverse_ratio(
        a in varied_series(),
        scale in 0.5f64..4.0,
        shift in -50.0f64..50.0,
    ) {
        let b: Vec<f64> = a.iter().map(|v| scale * v + shift).collect();
        let ratio = hedge_ratio(&a, &b).unwrap();
        prop_assert!((ratio.beta - 1.0 / scale).abs() < 1e-8);
        prop_assert!((ratio.intercept + shift / scale).abs() < 1e-6);
    }
}
