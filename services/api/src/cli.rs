use crate::infra;
use crate::server;
use clap::{Args, Parser, Subcommand};
use etuition::config::AppConfig;
use etuition::error::AppError;
use etuition::marketplace::domain::{Email, Role};
use etuition::marketplace::{MarketplaceError, UserService};
use etuition::telemetry;

#[derive(Parser, Debug)]
#[command(
    name = "eTuitionBd",
    about = "Run the eTuitionBd tutoring marketplace backend",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Assign a role to a user in the configured store, creating the user if needed
    GrantRole(GrantRoleArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct GrantRoleArgs {
    /// E-mail address of the account
    #[arg(long)]
    pub(crate) email: String,
    /// One of student, tutor, admin
    #[arg(long, value_parser = parse_role)]
    pub(crate) role: Role,
}

fn parse_role(raw: &str) -> Result<Role, String> {
    Role::parse(raw).ok_or_else(|| format!("unknown role '{raw}', expected student, tutor or admin"))
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::GrantRole(args) => grant_role(args).await,
    }
}

async fn grant_role(args: GrantRoleArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let email = Email::parse(&args.email).map_err(MarketplaceError::from)?;
    let (stores, pool) = infra::open_stores(&config).await?;
    if pool.is_none() {
        tracing::warn!("DATABASE_URL is not set; the role is granted in a throwaway in-memory store");
    }

    let users = UserService::new(stores.users, config.upstream_timeout);
    let user = users.grant_role(email, args.role).await?;
    println!("{} is now {}", user.email, args.role);

    if let Some(pool) = pool {
        pool.close().await;
    }
    Ok(())
}
