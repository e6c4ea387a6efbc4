//! Liftlog client - session status, login, and guarded navigation from the terminal.

mod app;
mod auth;
mod navigation;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use liftlog_config::{init_logging, Config, Paths};

/// Liftlog command-line interface.
#[derive(Parser)]
#[command(name = "liftlog")]
#[command(about = "Liftlog client for session management and guarded navigation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for client state (config, session, logs). Defaults to ~/.liftlog
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Mirror log lines to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// How long to wait for the session to be confirmed, in seconds
    #[arg(long, default_value_t = 10, global = true)]
    timeout_secs: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Show who is signed in
    Status {
        /// Print the identity as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sign in with email and password
    Login {
        #[arg(short, long)]
        email: String,
        /// Read from LIFTLOG_PASSWORD or prompted when omitted
        #[arg(short, long, env = "LIFTLOG_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account with email and password
    Signup {
        #[arg(short, long)]
        email: String,
        /// Read from LIFTLOG_PASSWORD or prompted when omitted
        #[arg(short, long, env = "LIFTLOG_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Sign out
    Logout,
    /// Resolve a route through the view guards
    Open {
        /// Route to open, e.g. /workouts
        route: String,
    },
    /// Follow identity changes and guard redirects until Ctrl-C
    Watch {
        /// Route to start on. Defaults to the home route
        route: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;
    let config = Config::load(&paths)?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging(level, &paths, cli.verbose);

    let timeout = Duration::from_secs(cli.timeout_secs);
    let ctx = app::AppContext::start(config, paths).await?;

    let result = match cli.command {
        Commands::Status { json } => auth::status(&ctx, timeout, json).await,
        Commands::Login { email, password } => {
            let form = auth::AuthForm::prompt_missing(email, password).await?;
            auth::submit(&ctx, form, auth::FormMode::Login, timeout).await
        }
        Commands::Signup { email, password } => {
            let form = auth::AuthForm::prompt_missing(email, password).await?;
            auth::submit(&ctx, form, auth::FormMode::Signup, timeout).await
        }
        Commands::Logout => auth::logout(&ctx).await,
        Commands::Open { route } => navigation::open(&ctx, &route, timeout).await,
        Commands::Watch { route } => {
            let start = route.unwrap_or_else(|| ctx.routes.home.clone());
            navigation::watch(&ctx, start).await
        }
    };

    ctx.shutdown().await;
    result
}
