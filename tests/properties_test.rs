// tests/properties_test.rs
use approx::assert_relative_eq;
use fast_lmm::drift::LmmDriftCalculator;
use fast_lmm::error::ErrorKind;
use fast_lmm::evolvers::{LogNormalFwdRateEuler, LogNormalFwdRatePc, MarketModelEvolver};
use fast_lmm::market::evolution::{money_market_measure, terminal_measure};
use fast_lmm::market::{CurveState, EvolutionDescription, RateTimes};
use fast_lmm::mc::{AccountingConfig, AccountingEngine, Product, SequenceStatistics};
use fast_lmm::models::{FactorMarketModel, MarketModel};
use fast_lmm::rng::BrownianGeneratorFactory;

#[test]
fn test_round_trip_through_all_representations() {
    let times = [0.25, 0.75, 1.3, 2.0, 2.5, 3.1];
    let forwards = [0.031, 0.044, 0.027, 0.052, 0.038];
    let rate_times = RateTimes::new(&times).unwrap();

    let mut from_forwards = CurveState::new(rate_times.clone());
    from_forwards.set_on_forward_rates(&forwards, 0).unwrap();

    let mut from_discounts = CurveState::new(rate_times.clone());
    from_discounts
        .set_on_discount_ratios(from_forwards.discount_ratios().unwrap(), 0)
        .unwrap();

    let mut from_swaps = CurveState::new(rate_times);
    from_swaps
        .set_on_coterminal_swap_rates(from_discounts.coterminal_swap_rates().unwrap(), 0)
        .unwrap();

    for (i, &f) in forwards.iter().enumerate() {
        assert_relative_eq!(from_swaps.forward_rate(i).unwrap(), f, max_relative = 1e-10);
    }
}

#[test]
fn test_discount_ratios_non_increasing_for_positive_rates() {
    let times: Vec<f64> = (0..=8).map(|i| 0.5 * i as f64 + 0.5).collect();
    let mut cs = CurveState::new(RateTimes::new(&times).unwrap());
    cs.set_on_forward_rates(&[0.0, 0.01, 0.0, 0.07, 0.02, 0.0, 0.03, 0.05], 0)
        .unwrap();
    let ratios = cs.discount_ratios().unwrap();
    assert_eq!(ratios[0], 1.0);
    for pair in ratios.windows(2) {
        assert!(pair[1] <= pair[0]);
    }
}

#[test]
fn test_single_rate_drift_is_pure_ito_term() {
    // one rate paying at t1, measured in the bond maturing at t1
    let evolution = EvolutionDescription::new(&[1.0, 2.0], &[1.0]).unwrap();
    let model = FactorMarketModel::exp_corr_flat_vol(
        0.5,
        0.2,
        &[0.2],
        &evolution,
        1,
        &[0.05],
        &[0.0],
    )
    .unwrap();
    let calculator =
        LmmDriftCalculator::new(model.pseudo_root(0), &[0.0], evolution.rate_taus(), 1, 0).unwrap();
    let mut drifts = [f64::NAN];
    calculator.compute(&[0.05], &mut drifts);
    assert_eq!(drifts[0], 0.0);

    // the simulated log-rate therefore moves by -½ variance on average
    let variance = model.covariance(0)[(0, 0)];
    let numeraires = terminal_measure(&evolution);
    let mut evolver =
        LogNormalFwdRateEuler::new(&model, &BrownianGeneratorFactory::new(7), &numeraires).unwrap();
    let mut stats = SequenceStatistics::new(1);
    for _ in 0..20_000 {
        evolver.start_new_path();
        evolver.advance_step().unwrap();
        let f = evolver.current_state().forward_rate(0).unwrap();
        stats.add(&[f.ln() - 0.05f64.ln()]).unwrap();
    }
    let mean = stats.mean()[0];
    let error = stats.error_estimate()[0];
    assert!(
        (mean + 0.5 * variance).abs() < 4.0 * error,
        "mean log move {} vs -½σ²t {} (se {})",
        mean,
        -0.5 * variance,
        error
    );
}

#[test]
fn test_evolver_step_count() {
    let times: Vec<f64> = (1..=7).map(|i| 0.5 * i as f64).collect();
    let evolution = EvolutionDescription::at_reset_times(&times).unwrap();
    let model = FactorMarketModel::exp_corr_flat_vol(
        0.5,
        0.2,
        &[0.2; 6],
        &evolution,
        3,
        &[0.04; 6],
        &[0.0; 6],
    )
    .unwrap();
    let numeraires = money_market_measure(&evolution);
    let mut evolver =
        LogNormalFwdRatePc::new(&model, &BrownianGeneratorFactory::new(1), &numeraires).unwrap();

    evolver.start_new_path();
    for _ in 0..evolver.number_of_steps() {
        evolver.advance_step().unwrap();
    }
    assert_eq!(evolver.current_step(), evolver.number_of_steps());
    assert_eq!(
        evolver.advance_step().unwrap_err().kind(),
        ErrorKind::PreconditionViolation
    );
}

#[test]
fn test_zero_volatility_gives_exact_price() {
    let rate_times = [1.0, 2.0];
    let product = Product::forwards(&rate_times, &[0.03]).unwrap();
    let model = FactorMarketModel::exp_corr_flat_vol(
        0.5,
        0.2,
        &[0.0],
        product.evolution(),
        1,
        &[0.05],
        &[0.0],
    )
    .unwrap();
    let numeraires = terminal_measure(product.evolution());
    let evolver =
        LogNormalFwdRateEuler::new(&model, &BrownianGeneratorFactory::new(5), &numeraires).unwrap();
    let p2 = (-0.04f64 * 2.0).exp();
    let expected = p2 * (0.05 - 0.03);

    let mut engine = AccountingEngine::new(
        evolver,
        product,
        p2,
        AccountingConfig {
            paths: 257,
            ..Default::default()
        },
    )
    .unwrap();

    for paths in [1, 10, 1000] {
        let mut stats = SequenceStatistics::new(1);
        engine.multiple_path_values(&mut stats, paths).unwrap();
        assert_eq!(stats.samples(), paths);
        assert_eq!(stats.error_estimate()[0], 0.0);
        assert_relative_eq!(stats.mean()[0], expected, max_relative = 1e-12);
    }

    let result = engine.run().unwrap();
    assert_eq!(result.errors[0], 0.0);
    assert_relative_eq!(result.means[0], expected, max_relative = 1e-12);
}

#[test]
fn test_single_forward_converges_to_initial_rate() {
    let rate_times = [1.0, 2.0];
    let product = Product::forwards(&rate_times, &[0.0]).unwrap();
    let model = FactorMarketModel::exp_corr_flat_vol(
        0.5,
        0.2,
        &[0.2],
        product.evolution(),
        1,
        &[0.05],
        &[0.0],
    )
    .unwrap();
    let numeraires = terminal_measure(product.evolution());
    let evolver =
        LogNormalFwdRateEuler::new(&model, &BrownianGeneratorFactory::new(2024), &numeraires)
            .unwrap();
    let engine = AccountingEngine::new(
        evolver,
        product,
        1.0,
        AccountingConfig {
            paths: 1_000_000,
            ..Default::default()
        },
    )
    .unwrap();

    let estimate = engine.run().unwrap().estimate(0).unwrap();
    assert_eq!(estimate.paths, 1_000_000);
    assert!(
        (estimate.mean - 0.05).abs() < 3.0 * estimate.standard_error,
        "mean {} vs 0.05 (se {})",
        estimate.mean,
        estimate.standard_error
    );
}

#[test]
fn test_coterminal_swap_rate_against_hand_computation() {
    let times = [0.5, 1.0, 1.75, 2.5, 3.0];
    let forwards = [0.035, 0.041, 0.047, 0.039];
    let mut cs = CurveState::new(RateTimes::new(&times).unwrap());
    cs.set_on_forward_rates(&forwards, 0).unwrap();

    let mut discounts = vec![1.0];
    for i in 0..4 {
        let tau = times[i + 1] - times[i];
        discounts.push(discounts[i] / (1.0 + forwards[i] * tau));
    }
    let annuity: f64 = (0..4).map(|i| (times[i + 1] - times[i]) * discounts[i + 1]).sum();
    let expected = (discounts[0] - discounts[4]) / annuity;

    assert_relative_eq!(cs.coterminal_swap_rate(0).unwrap(), expected, max_relative = 1e-10);
}
