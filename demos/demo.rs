// demos/demo.rs
use fast_lmm::analytics::{black_caplet_price, OptionType};
use fast_lmm::evolvers::LogNormalFwdRatePc;
use fast_lmm::market::evolution::{money_market_measure, terminal_measure};
use fast_lmm::mc::{AccountingConfig, AccountingEngine, Diagnostics, Product};
use fast_lmm::models::FactorMarketModel;
use fast_lmm::output;
use fast_lmm::rng::BrownianGeneratorFactory;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("Running fast-lmm Monte Carlo Demo\n");

    // ten semiannual rates from 6m to 5y
    let rate_times: Vec<f64> = (1..=11).map(|i| 0.5 * i as f64).collect();
    let forwards: Vec<f64> = (0..10).map(|i| 0.035 + 0.0015 * i as f64).collect();
    let vol = 0.2;
    let p0 = (-0.035f64 * 0.5).exp();
    let discounts: Vec<f64> = forwards
        .iter()
        .scan(p0, |p, f| {
            *p /= 1.0 + 0.5 * f;
            Some(*p)
        })
        .collect();

    let product = Product::optionlets(&rate_times, OptionType::Call, &forwards)?;
    let model = FactorMarketModel::exp_corr_flat_vol(
        0.5,
        0.2,
        &[vol; 10],
        product.evolution(),
        3,
        &forwards,
        &[0.0; 10],
    )?;
    println!(
        "Retained covariance with 3 factors: {:?}",
        model
            .retained_fractions()
            .iter()
            .map(|f| format!("{:.4}", f))
            .collect::<Vec<_>>()
    );

    let config = AccountingConfig {
        paths: 100_000,
        diagnostics: Diagnostics::RAW_VALUES,
        ..Default::default()
    };
    let factory = BrownianGeneratorFactory::new(12345);

    std::fs::create_dir_all("results")?;
    let mut summary = Vec::new();

    for (measure, numeraires, initial) in [
        ("terminal", terminal_measure(product.evolution()), discounts[9]),
        ("spot", money_market_measure(product.evolution()), p0),
    ] {
        println!("\n--- ATM caplets, {} measure ---", measure);
        let evolver = LogNormalFwdRatePc::new(&model, &factory, &numeraires)?;
        let engine = AccountingEngine::new(evolver, product.clone(), initial, config.clone())?;
        let result = engine.run()?;
        println!(
            "{:>4} {:>8} {:>12} {:>12} {:>12}",
            "i", "expiry", "mc", "se", "black"
        );
        for i in 0..forwards.len() {
            let black = black_caplet_price(
                OptionType::Call,
                forwards[i],
                forwards[i],
                vol,
                rate_times[i],
                0.5,
                discounts[i],
                0.0,
            )?;
            println!(
                "{:>4} {:>8.2} {:>12.8} {:>12.8} {:>12.8}",
                i, rate_times[i], result.means[i], result.errors[i], black
            );
        }
        println!(
            "{} paths in {:.1} ms ({:.0} paths/sec)",
            result.paths,
            result.elapsed_ms,
            result.paths as f64 / (result.elapsed_ms / 1000.0)
        );

        let prices_file = format!("results/caplets_{}.csv", measure);
        output::write_pricing_result_to_csv(&prices_file, &result)?;
        println!("Prices written to {}", prices_file);
        if let Some(raw) = &result.raw_values {
            let paths_file = format!("results/caplet_paths_{}.csv", measure);
            output::write_path_values_to_csv(&paths_file, &raw[..1000.min(raw.len())])?;
            println!("First 1000 path values written to {}", paths_file);
        }
        summary.push((format!("elapsed_ms_{}", measure), result.elapsed_ms.to_string()));
        summary.push((format!("caplet_0_{}", measure), result.means[0].to_string()));
    }

    println!("\n--- Coterminal swaptions, terminal measure ---");
    let swaptions = Product::coterminal_swaptions(&rate_times, OptionType::Call, &forwards)?;
    let numeraires = terminal_measure(swaptions.evolution());
    let evolver = LogNormalFwdRatePc::new(&model, &factory, &numeraires)?;
    let engine = AccountingEngine::new(
        evolver,
        swaptions,
        discounts[9],
        AccountingConfig {
            paths: 100_000,
            ..Default::default()
        },
    )?;
    let result = engine.run()?;
    for (i, (mean, error)) in result.means.iter().zip(&result.errors).enumerate() {
        println!("swaption {:>2}: {:.8} ± {:.8}", i, mean, error);
    }

    let summary_data: Vec<(&str, String)> = summary
        .iter()
        .map(|(key, value)| (key.as_str(), value.clone()))
        .collect();
    output::write_summary_to_csv("results/summary.csv", &summary_data)?;
    println!("\nSummary written to results/summary.csv");
    Ok(())
}
