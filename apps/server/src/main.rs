use anyhow::Context;
use clap::{Parser, Subcommand};
use parley_config::load as load_config;
use parley_database::entities::CreateUserRequest;
use parley_database::repos::UserRepository;
use parley_runtime::{run_server, telemetry, BackendServices};
use tracing::info;

#[derive(Parser)]
#[command(name = "parley-backend")]
#[command(about = "Parley chat backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket server (default)
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Seed the database with a few demo users
    SeedUsers,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve().await,
        Commands::Migrate => migrate().await,
        Commands::SeedUsers => seed_users().await,
    }
}

async fn serve() -> anyhow::Result<()> {
    telemetry::init_tracing().context("failed to initialise tracing")?;

    info!("starting parley backend");

    let config = load_config().context("failed to load configuration")?;
    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    run_server(&config, services).await?;

    info!("backend shut down");
    Ok(())
}

async fn migrate() -> anyhow::Result<()> {
    telemetry::init_tracing().context("failed to initialise tracing")?;

    let config = load_config().context("failed to load configuration")?;
    parley_database::initialize_database(&config.database)
        .await
        .context("failed to run migrations")?;

    println!("migrations applied");
    Ok(())
}

async fn seed_users() -> anyhow::Result<()> {
    telemetry::init_tracing().context("failed to initialise tracing")?;

    let config = load_config().context("failed to load configuration")?;
    let services = BackendServices::initialise(&config)
        .await
        .context("failed to initialise backend services")?;

    let users = UserRepository::new(services.db_pool.clone());
    let demo = [
        ("auth0|alice", "alice"),
        ("auth0|bob", "bob"),
        ("auth0|carol", "carol"),
    ];

    for (subject, username) in demo {
        if users.find_by_subject(subject).await?.is_some() {
            println!("{username} already present, skipping");
            continue;
        }
        let user = users
            .create(&CreateUserRequest {
                subject: subject.to_string(),
                username: username.to_string(),
                avatar_url: None,
            })
            .await
            .with_context(|| format!("failed to seed {username}"))?;
        println!("seeded {} (id {})", user.username, user.id);
    }

    Ok(())
}
