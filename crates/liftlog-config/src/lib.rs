//! Configuration, paths, and logging setup shared by liftlog crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, EventOrdering, DEFAULT_HOME_ROUTE, DEFAULT_LOGIN_ROUTE, DEFAULT_REFRESH_MARGIN_SECS,
    DEFAULT_SUPABASE_PUBLISHABLE_KEY, DEFAULT_SUPABASE_URL,
};
pub use error::{CoreError, CoreResult};
pub use logging::init_logging;
pub use paths::Paths;
