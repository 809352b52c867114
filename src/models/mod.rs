pub mod correlation;
pub mod factor_model;
pub mod model;
pub mod pseudo_sqrt;
pub mod volatility;

pub use correlation::{CorrelationStructure, ExponentialCorrelation, TimeHomogeneousForwardCorrelation};
pub use factor_model::FactorMarketModel;
pub use model::MarketModel;
pub use volatility::{AbcdParams, AbcdVolatility, FlatVolatility, VolatilityModel};
