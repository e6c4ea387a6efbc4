//! Application wiring.

mod context;

pub use context::AppContext;
