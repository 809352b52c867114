pub mod accounting_engine;
pub mod discounter;
pub mod products;
pub mod statistics;

pub use accounting_engine::{
    AccountingConfig, AccountingEngine, Diagnostics, PathFailurePolicy, PriceEstimate,
    PricingResult,
};
pub use discounter::MarketModelDiscounter;
pub use products::{CashFlow, Product, ProductKind};
pub use statistics::{PairStatistics, SequenceStatistics};
