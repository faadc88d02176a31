use std::time::Duration;

use claimgate::authz::routes::RouteKey;
use claimgate::authz::types::RouteAction;
use claimgate::authz::{engine, loader};
use claimgate::session::JwtSessions;
use claimgate::settings::Settings;
use claimgate::web;
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "claimgate",
    version,
    about = "Role-based claim authorization gate"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "claimgate.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Evaluate one claim; exits 0 when allowed, 1 when denied
    Check {
        #[arg(long)]
        role: String,
        #[arg(long)]
        action: String,
        /// JSON object handed to conditional grants
        #[arg(long)]
        data: Option<String>,
    },
    /// Show the action a route template is mapped to
    Resolve {
        #[arg(long)]
        route: String,
        /// Look in the API map instead of the page map
        #[arg(long)]
        api: bool,
    },
    /// Sign a session token with the configured secret (development aid)
    IssueToken {
        #[arg(long)]
        uid: String,
        #[arg(long)]
        role: String,
        /// Lifetime in seconds; defaults to authz.session.ttl_secs
        #[arg(long)]
        ttl: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    // load settings
    let settings = Settings::load(&cli.config)?;
    tracing::debug!(?settings, "Loaded configuration");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let gate = web::build_gate(&settings)?;
            web::serve(settings, gate).await?;
        }
        Command::Check { role, action, data } => {
            let authorizer = loader::load_authorizer(
                settings.authz.policies_dir.as_deref(),
                &settings.authz.public_paths,
            )?;
            let data = data
                .map(|d| serde_json::from_str::<serde_json::Value>(&d))
                .transpose()
                .into_diagnostic()?;
            let allowed =
                engine::try_has_claim(&authorizer.table, &role, &action, data.as_ref())?;
            if allowed {
                println!("allowed");
            } else {
                println!("denied");
                std::process::exit(1);
            }
        }
        Command::Resolve { route, api } => {
            let authorizer = loader::load_authorizer(
                settings.authz.policies_dir.as_deref(),
                &settings.authz.public_paths,
            )?;
            let key = RouteKey::parse(&route)?;
            match authorizer.resolve_action(&key, api) {
                Some(RouteAction::AnyRole) => println!("(any role)"),
                Some(RouteAction::Claim(action)) => println!("{action}"),
                None => println!("(unmapped)"),
            }
        }
        Command::IssueToken { uid, role, ttl } => {
            if settings.authz.session.secret.is_none() {
                miette::bail!(
                    "issue-token needs a configured secret; set CLAIMGATE__AUTHZ__SESSION__SECRET"
                );
            }
            let sessions = JwtSessions::from_settings(&settings.authz.session)?;
            let ttl = ttl.map(Duration::from_secs).unwrap_or(sessions.ttl());
            let token = sessions.issue_until(&uid, &role, std::time::SystemTime::now() + ttl)?;
            println!("{token}");
        }
    }
    Ok(())
}
