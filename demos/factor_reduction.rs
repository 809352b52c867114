// demos/factor_reduction.rs
//! How caplet and swaption prices move as the number of factors drops
use fast_lmm::analytics::OptionType;
use fast_lmm::evolvers::LogNormalFwdRatePc;
use fast_lmm::market::evolution::terminal_measure;
use fast_lmm::market::EvolutionDescription;
use fast_lmm::mc::{AccountingConfig, AccountingEngine, Product};
use fast_lmm::models::{AbcdParams, FactorMarketModel};
use fast_lmm::rng::BrownianGeneratorFactory;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let rates = 12;
    let rate_times: Vec<f64> = (1..=rates + 1).map(|i| 0.5 * i as f64).collect();
    let forwards = vec![0.04; rates];
    let evolution = EvolutionDescription::at_reset_times(&rate_times)?;
    let abcd = AbcdParams {
        a: 0.05,
        b: 0.1,
        c: 0.8,
        d: 0.15,
    };

    println!("{:>8} {:>16} {:>16} {:>16}", "factors", "min retained", "caplet 6", "swaption 0");
    for factors in [1, 2, 3, 5, rates] {
        let model = FactorMarketModel::exp_corr_abcd_vol(
            abcd,
            &vec![1.0; rates],
            0.3,
            0.15,
            &evolution,
            factors,
            &forwards,
            &vec![0.0; rates],
        )?;
        let retained = model
            .retained_fractions()
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);

        let numeraires = terminal_measure(&evolution);
        let factory = BrownianGeneratorFactory::antithetic(7);
        let config = AccountingConfig {
            paths: 20_000,
            antithetic: true,
            ..Default::default()
        };

        let caplets = Product::optionlets(&rate_times, OptionType::Call, &forwards)?;
        let evolver = LogNormalFwdRatePc::new(&model, &factory, &numeraires)?;
        let caplet = AccountingEngine::new(evolver, caplets, 1.0, config.clone())?
            .run()?
            .estimate(6)?;

        let swaptions = Product::coterminal_swaptions(&rate_times, OptionType::Call, &forwards)?;
        let evolver = LogNormalFwdRatePc::new(&model, &factory, &numeraires)?;
        let swaption = AccountingEngine::new(evolver, swaptions, 1.0, config)?
            .run()?
            .estimate(0)?;

        println!(
            "{:>8} {:>16.6} {:>9.6}±{:.6} {:>9.6}±{:.6}",
            factors,
            retained,
            caplet.mean,
            caplet.standard_error,
            swaption.mean,
            swaption.standard_error
        );
    }
    println!("\nCaplets depend only on variances, which the reduction preserves.");
    println!("Swaptions gain value as fewer factors raise the effective correlation.");
    Ok(())
}
