// demos/error_handling_demo.rs
use fast_lmm::error::{ErrorKind, LmmError};
use fast_lmm::evolvers::{LogNormalFwdRateEuler, LogNormalFwdRatePc, MarketModelEvolver};
use fast_lmm::market::evolution::terminal_measure;
use fast_lmm::market::{CurveState, EvolutionDescription, RateTimes};
use fast_lmm::mc::{AccountingConfig, AccountingEngine, PathFailurePolicy, Product};
use fast_lmm::models::FactorMarketModel;
use fast_lmm::rng::BrownianGeneratorFactory;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("Error Handling Demo for fast-lmm");
    println!("================================\n");

    println!("1. Rate times that are not strictly increasing...");
    match RateTimes::new(&[0.5, 1.0, 1.0, 1.5]) {
        Ok(_) => println!("   Unexpected: Should have failed!"),
        Err(e) => println!("   ✓ Caught error: {}", e),
    }

    println!("\n2. Reading a rate that has already reset...");
    let mut state = CurveState::new(RateTimes::new(&[0.5, 1.0, 1.5, 2.0]).expect("valid times"));
    state
        .set_on_forward_rates(&[0.03, 0.035, 0.04], 1)
        .expect("valid forwards");
    match state.forward_rate(0) {
        Ok(_) => println!("   Unexpected: Should have failed!"),
        Err(e) => println!("   ✓ Caught {:?}: {}", e.kind(), e),
    }

    println!("\n3. Numeraire bond maturing before the end of its step...");
    let evolution = EvolutionDescription::at_reset_times(&[0.5, 1.0, 1.5, 2.0]).expect("valid times");
    let model = FactorMarketModel::exp_corr_flat_vol(
        0.5,
        0.2,
        &[0.2; 3],
        &evolution,
        2,
        &[0.03; 3],
        &[0.0; 3],
    )
    .expect("valid model");
    match LogNormalFwdRatePc::new(&model, &BrownianGeneratorFactory::new(1), &[0, 0, 0]) {
        Ok(_) => println!("   Unexpected: Should have failed!"),
        Err(e) => println!("   ✓ Caught error: {}", e),
    }

    println!("\n4. Advancing a path that was never started...");
    let mut evolver = LogNormalFwdRatePc::new(
        &model,
        &BrownianGeneratorFactory::new(1),
        &terminal_measure(&evolution),
    )
    .expect("valid evolver");
    match evolver.advance_step() {
        Err(e) if e.kind() == ErrorKind::PreconditionViolation => {
            println!("   ✓ Caught precondition violation: {}", e)
        }
        other => println!("   Unexpected: {:?}", other),
    }

    println!("\n5. Invalid engine configuration...");
    let product = Product::forwards(&[0.5, 1.0, 1.5, 2.0], &[0.03; 3]).expect("valid product");
    let config = AccountingConfig {
        paths: 0,
        ..Default::default()
    };
    match AccountingEngine::new(evolver.clone(), product.clone(), 1.0, config) {
        Ok(_) => println!("   Unexpected: Should have failed!"),
        Err(LmmError::InvalidConfiguration { field, reason }) => {
            println!("   ✓ Caught InvalidConfiguration: {} ({})", field, reason)
        }
        Err(other) => println!("   Unexpected error type: {}", other),
    }

    println!("\n6. Heavily displaced rate collapsing on some paths...");
    let fragile_evolution = EvolutionDescription::at_reset_times(&[1.0, 2.0]).expect("valid times");
    let fragile = FactorMarketModel::exp_corr_flat_vol(
        0.5,
        0.2,
        &[0.45],
        &fragile_evolution,
        1,
        &[0.05],
        &[2.0],
    )
    .expect("valid model");
    let euler = LogNormalFwdRateEuler::new(
        &fragile,
        &BrownianGeneratorFactory::new(3),
        &terminal_measure(&fragile_evolution),
    )
    .expect("valid evolver");
    let fragile_product = Product::forwards(&[1.0, 2.0], &[0.05]).expect("valid product");

    for policy in [
        PathFailurePolicy::Abort,
        PathFailurePolicy::Resample { max_attempts: 10 },
    ] {
        let config = AccountingConfig {
            paths: 10_000,
            failure_policy: policy,
            ..Default::default()
        };
        let engine = AccountingEngine::new(euler.clone(), fragile_product.clone(), 1.0, config)
            .expect("valid engine");
        match engine.run() {
            Ok(result) => println!(
                "   ✓ {:?}: value {:.6} ± {:.6}, {} paths resampled",
                policy, result.means[0], result.errors[0], result.resampled_paths
            ),
            Err(e) => println!("   ✓ {:?}: run failed with {:?}: {}", policy, e.kind(), e),
        }
    }

    println!("\n7. Valid run...");
    let engine = AccountingEngine::new(
        evolver,
        product,
        1.0,
        AccountingConfig {
            paths: 10_000,
            ..Default::default()
        },
    )
    .expect("valid engine");
    match engine.run() {
        Ok(result) => println!(
            "   ✓ Success: forward 0 = {:.6} ± {:.6}",
            result.means[0], result.errors[0]
        ),
        Err(e) => println!("   Unexpected error: {}", e),
    }

    println!("\n✓ Error handling demo complete!");
}
