// src/evolvers/mod.rs
pub mod constrained_euler;
pub mod coterminal_pc;
pub mod euler;
pub mod evolver;
pub mod ipc;
pub mod pc;

pub use constrained_euler::LogNormalFwdRateEulerConstrained;
pub use coterminal_pc::CoterminalSwapRatePc;
pub use euler::LogNormalFwdRateEuler;
pub use evolver::{EvolvedRates, EvolverSetup, MarketModelEvolver};
pub use ipc::LogNormalFwdRateIpc;
pub use pc::LogNormalFwdRatePc;
