mod fallback;
mod health;

pub use fallback::{method_not_allowed, not_found};
pub use health::{debug_vars, liveness, readiness};
