//! SafeGate CLI
//!
//! Runs the moderation gateway and manages profiles in its database.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use sg_core::{FilteringLevel, Profile};
use sg_gateway::config::GatewayConfig;
use sg_gateway::store::SqliteProfileStore;

#[derive(Parser)]
#[command(name = "sg-cli")]
#[command(about = "SafeGate moderation gateway and profile tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the moderation gateway
    Serve {
        #[command(flatten)]
        config: GatewayConfig,
    },

    /// One-shot URL check against a running gateway
    Check {
        /// Base URL of the gateway
        #[arg(long, env = "SG_GATEWAY_URL", default_value = "http://127.0.0.1:5000")]
        gateway: String,

        /// Device identifier to check as
        #[arg(short, long, default_value = "")]
        device_id: String,

        /// URL to check
        url: String,
    },

    /// Manage profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Create or replace a profile
    Add {
        #[arg(long, env = "SG_DB_PATH", default_value = "safegate.db")]
        db: String,

        /// Profile identifier
        #[arg(long)]
        id: String,

        /// Owning parent account identifier
        #[arg(long)]
        parent_id: String,

        /// Display name
        #[arg(long)]
        name: String,

        /// Device identifier the browser agent reports
        #[arg(long)]
        device_id: Option<String>,

        /// Filtering level: strict, moderate, custom, off
        #[arg(long, default_value = "moderate")]
        level: String,

        /// Always-allowed domain (repeatable)
        #[arg(long = "allow")]
        allowed: Vec<String>,

        /// Always-blocked domain (repeatable)
        #[arg(long = "block")]
        blocked: Vec<String>,
    },

    /// List all profiles
    List {
        #[arg(long, env = "SG_DB_PATH", default_value = "safegate.db")]
        db: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { config } => cmd_serve(config).await,
        Commands::Check {
            gateway,
            device_id,
            url,
        } => cmd_check(&gateway, &device_id, &url).await,
        Commands::Profile { command } => match command {
            ProfileCommands::Add {
                db,
                id,
                parent_id,
                name,
                device_id,
                level,
                allowed,
                blocked,
            } => cmd_profile_add(&db, id, parent_id, name, device_id, &level, allowed, blocked),
            ProfileCommands::List { db } => cmd_profile_list(&db),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn cmd_serve(config: GatewayConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    sg_gateway::server::serve(config)
        .await
        .context("gateway exited")
}

async fn cmd_check(gateway: &str, device_id: &str, url: &str) -> Result<()> {
    let endpoint = format!("{}/api/moderate/url", gateway.trim_end_matches('/'));

    let response = reqwest::Client::new()
        .post(&endpoint)
        .json(&serde_json::json!({ "url": url, "deviceId": device_id }))
        .send()
        .await
        .with_context(|| format!("request to {endpoint} failed"))?;

    let status = response.status();
    let body: serde_json::Value = response
        .json()
        .await
        .context("gateway returned a non-JSON body")?;

    if !status.is_success() {
        bail!("gateway returned {status}: {body}");
    }

    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_profile_add(
    db: &str,
    id: String,
    parent_id: String,
    name: String,
    device_id: Option<String>,
    level: &str,
    allowed: Vec<String>,
    blocked: Vec<String>,
) -> Result<()> {
    let filtering_level = match level {
        "strict" => FilteringLevel::Strict,
        "moderate" => FilteringLevel::Moderate,
        "custom" => FilteringLevel::Custom,
        "off" => FilteringLevel::Off,
        other => bail!("unknown filtering level '{other}'"),
    };

    let profile = Profile {
        id: id.clone(),
        parent_id,
        name,
        device_id,
        filtering_level,
        is_active: true,
        custom_settings: Default::default(),
        allowed_domains: allowed,
        blocked_domains: blocked,
        time_restrictions: Default::default(),
    };

    let store = SqliteProfileStore::open(db).with_context(|| format!("failed to open '{db}'"))?;
    store.upsert(&profile).context("failed to write profile")?;

    println!("Stored profile '{id}'");
    Ok(())
}

fn cmd_profile_list(db: &str) -> Result<()> {
    let store = SqliteProfileStore::open(db).with_context(|| format!("failed to open '{db}'"))?;
    let profiles = store.list().context("failed to read profiles")?;

    if profiles.is_empty() {
        println!("No profiles");
        return Ok(());
    }

    for p in profiles {
        println!(
            "{:<16} {:<20} level={:<8} device={} allow={} block={}{}",
            p.id,
            p.name,
            p.filtering_level.as_str(),
            p.device_id.as_deref().unwrap_or("-"),
            p.allowed_domains.len(),
            p.blocked_domains.len(),
            if p.is_active { "" } else { " (inactive)" },
        );
    }
    Ok(())
}
