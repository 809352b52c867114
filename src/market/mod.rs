pub mod curve_state;
pub mod evolution;
pub mod swap_forward_mappings;

pub use curve_state::CurveState;
pub use evolution::{EvolutionDescription, RateTimes};
