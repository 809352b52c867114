pub mod black_formula;

pub use black_formula::{black_caplet_price, black_formula, OptionType};
