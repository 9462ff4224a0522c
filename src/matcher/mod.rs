pub mod geo;
pub mod score;

pub use geo::haversine_km;
pub use score::{evaluate, hard_pass, soft_score};
