// scripts/benchmark.rs
use fast_lmm::analytics::{black_caplet_price, OptionType};
use fast_lmm::evolvers::{
    LogNormalFwdRateEuler, LogNormalFwdRateIpc, LogNormalFwdRatePc, MarketModelEvolver,
};
use fast_lmm::market::evolution::{money_market_measure, terminal_measure};
use fast_lmm::mc::{AccountingConfig, AccountingEngine, Product};
use fast_lmm::models::FactorMarketModel;
use fast_lmm::rng::BrownianGeneratorFactory;
use fast_lmm::LmmResult;
use std::env;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::process::Command;

const RATES: usize = 20;
const ACCRUAL: f64 = 0.5;
const VOL: f64 = 0.2;

#[derive(Debug)]
struct SystemInfo {
    os: String,
    cpu_model: String,
    cpu_cores: usize,
    rust_version: String,
    rustc_flags: String,
    rayon_threads: usize,
}

impl SystemInfo {
    fn gather() -> Self {
        Self {
            os: env::consts::OS.to_string(),
            cpu_model: Self::cpu_model(),
            cpu_cores: num_cpus::get(),
            rust_version: Command::new("rustc")
                .arg("--version")
                .output()
                .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
                .unwrap_or_else(|_| "Unknown Rust version".to_string()),
            rustc_flags: env::var("RUSTFLAGS").unwrap_or_else(|_| "default".to_string()),
            rayon_threads: rayon::current_num_threads(),
        }
    }

    fn cpu_model() -> String {
        #[cfg(target_os = "linux")]
        {
            std::fs::read_to_string("/proc/cpuinfo")
                .ok()
                .and_then(|content| {
                    content
                        .lines()
                        .find(|line| line.starts_with("model name"))
                        .and_then(|line| line.split(':').nth(1))
                        .map(|s| s.trim().to_string())
                })
                .unwrap_or_else(|| "Unknown CPU".to_string())
        }

        #[cfg(target_os = "macos")]
        {
            Command::new("sysctl")
                .args(["-n", "machdep.cpu.brand_string"])
                .output()
                .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
                .unwrap_or_else(|_| "Unknown CPU".to_string())
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            "Unknown CPU".to_string()
        }
    }
}

#[derive(Debug)]
struct BenchmarkResult {
    name: String,
    paths: usize,
    time_ms: f64,
    throughput_paths_per_sec: f64,
    /// Largest caplet deviation from Black, in standard errors
    max_error_in_se: f64,
}

fn curve() -> (Vec<f64>, Vec<f64>) {
    let rate_times: Vec<f64> = (1..=RATES + 1).map(|i| ACCRUAL * i as f64).collect();
    let forwards: Vec<f64> = (0..RATES).map(|i| 0.03 + 0.001 * i as f64).collect();
    (rate_times, forwards)
}

fn black_caplets(rate_times: &[f64], forwards: &[f64]) -> LmmResult<Vec<f64>> {
    let mut discount = (-0.03 * rate_times[0]).exp();
    let mut prices = Vec::with_capacity(forwards.len());
    for (i, &f) in forwards.iter().enumerate() {
        discount /= 1.0 + ACCRUAL * f;
        prices.push(black_caplet_price(
            OptionType::Call,
            f,
            f,
            VOL,
            rate_times[i],
            ACCRUAL,
            discount,
            0.0,
        )?);
    }
    Ok(prices)
}

fn price<E>(name: String, engine: &AccountingEngine<E>, expected: &[f64]) -> LmmResult<BenchmarkResult>
where
    E: MarketModelEvolver + Clone + Send + Sync,
{
    let result = engine.run()?;
    let max_error_in_se = result
        .means
        .iter()
        .zip(&result.errors)
        .zip(expected)
        .map(|((mean, se), black)| (mean - black).abs() / se)
        .fold(0.0, f64::max);
    Ok(BenchmarkResult {
        name,
        paths: result.paths,
        time_ms: result.elapsed_ms,
        throughput_paths_per_sec: result.paths as f64 / (result.elapsed_ms / 1000.0),
        max_error_in_se,
    })
}

fn run_evolver_benchmarks(paths: usize, factors: usize) -> LmmResult<Vec<BenchmarkResult>> {
    let (rate_times, forwards) = curve();
    let expected = black_caplets(&rate_times, &forwards)?;
    let product = Product::optionlets(&rate_times, OptionType::Call, &forwards)?;
    let model = FactorMarketModel::exp_corr_flat_vol(
        0.5,
        0.2,
        &[VOL; RATES],
        product.evolution(),
        factors,
        &forwards,
        &[0.0; RATES],
    )?;
    let factory = BrownianGeneratorFactory::new(42);
    let config = AccountingConfig {
        paths,
        ..Default::default()
    };
    let p0 = (-0.03 * rate_times[0]).exp();
    let p_n = p0 / forwards.iter().map(|f| 1.0 + ACCRUAL * f).product::<f64>();

    let mut results = Vec::new();
    for (measure, numeraires, initial) in [
        ("terminal", terminal_measure(product.evolution()), p_n),
        ("spot", money_market_measure(product.evolution()), p0),
    ] {
        println!("  {} measure, {} factors...", measure, factors);
        let euler = LogNormalFwdRateEuler::new(&model, &factory, &numeraires)?;
        let engine = AccountingEngine::new(euler, product.clone(), initial, config.clone())?;
        results.push(price(format!("Euler {} F={}", measure, factors), &engine, &expected)?);

        let pc = LogNormalFwdRatePc::new(&model, &factory, &numeraires)?;
        let engine = AccountingEngine::new(pc, product.clone(), initial, config.clone())?;
        results.push(price(format!("PC {} F={}", measure, factors), &engine, &expected)?);

        let ipc = LogNormalFwdRateIpc::new(&model, &factory, &numeraires)?;
        let engine = AccountingEngine::new(ipc, product.clone(), initial, config.clone())?;
        results.push(price(format!("IPC {} F={}", measure, factors), &engine, &expected)?);
    }
    Ok(results)
}

fn write_results_to_csv(results: &[BenchmarkResult], system_info: &SystemInfo, filename: &str) -> io::Result<()> {
    let mut file = BufWriter::new(File::create(filename)?);

    writeln!(file, "# OS: {}", system_info.os)?;
    writeln!(file, "# CPU: {}", system_info.cpu_model)?;
    writeln!(file, "# CPU Cores: {}", system_info.cpu_cores)?;
    writeln!(file, "# Rust Version: {}", system_info.rust_version)?;
    writeln!(file, "# RUSTFLAGS: {}", system_info.rustc_flags)?;
    writeln!(file, "# Rayon Threads: {}", system_info.rayon_threads)?;
    writeln!(
        file,
        "# Benchmark Date: {}",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )?;
    writeln!(file, "Benchmark,Paths,Time_ms,Throughput_paths_per_sec,Max_Error_SE")?;
    for result in results {
        writeln!(
            file,
            "{},{},{:.2},{:.0},{:.3}",
            result.name,
            result.paths,
            result.time_ms,
            result.throughput_paths_per_sec,
            result.max_error_in_se
        )?;
    }
    file.flush()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("fast-lmm Benchmark Suite");
    println!("========================\n");

    let system_info = SystemInfo::gather();
    println!("System Information:");
    println!("  OS: {}", system_info.os);
    println!("  CPU: {}", system_info.cpu_model);
    println!("  CPU Cores: {}", system_info.cpu_cores);
    println!("  Rust Version: {}", system_info.rust_version);
    println!("  RUSTFLAGS: {}", system_info.rustc_flags);
    println!("  Rayon Threads: {}", system_info.rayon_threads);
    println!();

    let paths = env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(100_000);

    println!("Caplets on a {}-rate semiannual curve, {} paths", RATES, paths);
    let mut results = Vec::new();
    for factors in [1, 3, RATES] {
        results.extend(run_evolver_benchmarks(paths, factors)?);
    }

    println!("\n{:=<80}", "");
    println!(
        "{:<28} {:>10} {:>12} {:>15} {:>12}",
        "Benchmark", "Paths", "Time (ms)", "Paths/sec", "Max |err|/SE"
    );
    println!("{:-<80}", "");
    for result in &results {
        println!(
            "{:<28} {:>10} {:>12.2} {:>15.0} {:>12.3}",
            result.name,
            result.paths,
            result.time_ms,
            result.throughput_paths_per_sec,
            result.max_error_in_se
        );
    }
    println!("{:=<80}", "");

    let filename = format!(
        "benchmark_results_{}.csv",
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    );
    write_results_to_csv(&results, &system_info, &filename)?;
    println!("\nResults saved to: {}", filename);
    println!("Run with: cargo run --bin benchmark --release -- <paths>");
    Ok(())
}
