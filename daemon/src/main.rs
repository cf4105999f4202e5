use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

mod config;
mod daemon;
mod session;
mod state;
mod telemetry;

use config::DaemonConfig;
use csvsync_core::ApiClient;
use daemon::SyncDaemon;
use session::Session;
use state::StateFile;

#[derive(Parser)]
#[command(name = "csvsync-daemon")]
#[command(about = "Keeps local CSV exports in sync with a REST API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level, overrides the configuration file
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync loop in the foreground until Ctrl+C
    Run,
    /// Obtain API tokens with an administrator account
    Login {
        /// API domain, including http:// or https://
        #[arg(long)]
        domain: Option<String>,

        /// Administrator e-mail
        #[arg(long)]
        username: String,

        /// Password, prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Delete the stored tokens and sync state
    Logout,
    /// Show every target and its last sync
    Status,
    /// Change a target's settings
    Target {
        #[command(subcommand)]
        action: TargetActions,
    },
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigActions,
    },
}

#[derive(Subcommand)]
enum TargetActions {
    /// Enable synchronisation of a target
    Enable { name: String },
    /// Disable synchronisation of a target
    Disable { name: String },
    /// Point a target at a different CSV file
    SetPath { name: String, path: PathBuf },
}

#[derive(Subcommand)]
enum ConfigActions {
    /// Validate configuration file
    Validate,
    /// Show current configuration
    Show,
    /// Generate default configuration
    Generate {
        /// Output path for configuration
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(DaemonConfig::default_path);

    // `run` sets up file logging from the configuration itself
    if !matches!(cli.command, Commands::Run) {
        telemetry::init_console_logging(cli.log_level.as_deref().unwrap_or("warn"))?;
    }

    match cli.command {
        Commands::Run => run_daemon(&config_path, cli.log_level.as_deref()).await,
        Commands::Login { domain, username, password } => {
            login(&config_path, domain, &username, password).await
        }
        Commands::Logout => logout(&config_path).await,
        Commands::Status => show_status(&config_path).await,
        Commands::Target { action } => edit_target(&config_path, action).await,
        Commands::Config { action } => match action {
            ConfigActions::Validate => validate_config(&config_path).await,
            ConfigActions::Show => show_config(&config_path).await,
            ConfigActions::Generate { output } => generate_config(output.as_deref()).await,
        },
    }
}

async fn run_daemon(config_path: &Path, log_level: Option<&str>) -> Result<()> {
    let config = DaemonConfig::load(config_path).await?;
    let _log_guard = telemetry::init_logging(&config.logging, log_level)?;

    info!("Loaded configuration from {}", config_path.display());
    let daemon = SyncDaemon::new(config, config_path.to_path_buf()).await?;
    daemon.run().await
}

async fn login(
    config_path: &Path,
    domain: Option<String>,
    username: &str,
    password: Option<String>,
) -> Result<()> {
    let mut config = DaemonConfig::load_or_default(config_path).await?;
    if let Some(domain) = domain {
        config.api.domain = domain;
    }
    config.validate()?;

    let password = match password {
        Some(password) => password,
        None => rpassword::prompt_password("Password: ")?,
    };
    if username.is_empty() || password.is_empty() {
        anyhow::bail!("Username and password are required");
    }

    println!("Authenticating...");
    let client = ApiClient::from_config(&config.api)?;
    let tokens = client
        .auth
        .password_grant(username, &password)
        .await
        .context("Login failed")?;

    Session::new(config.api.domain.clone(), username, tokens)
        .save(&config.daemon.session_file)
        .await?;
    config.save(config_path).await?;

    println!("✓ Logged in to {}", config.api.domain);
    println!("Session stored at {}", config.daemon.session_file.display());
    Ok(())
}

async fn logout(config_path: &Path) -> Result<()> {
    let config = DaemonConfig::load_or_default(config_path).await?;

    let removed = Session::delete(&config.daemon.session_file).await?;
    StateFile::reset(&config.daemon.state_file).await?;

    if removed {
        println!("✓ Logged out, tokens and sync state deleted");
    } else {
        println!("Not logged in; sync state deleted");
    }
    Ok(())
}

async fn show_status(config_path: &Path) -> Result<()> {
    let config = DaemonConfig::load_or_default(config_path).await?;
    let session = Session::load(&config.daemon.session_file).await?;
    let state = StateFile::load(&config.daemon.state_file).await?;

    println!("API domain: {}", config.api.domain);
    match session {
        Some(session) if session.is_expired() => {
            println!("Session: {} (token expired, run login again)", session.username)
        }
        Some(session) => println!("Session: {}", session.username),
        None => println!("Session: not logged in"),
    }
    println!();

    let mut targets = config.sync_targets();
    state.apply(&mut targets);
    for target in &targets {
        println!("{}", target.name);
        println!("  Enabled:   {}", if target.enabled { "yes" } else { "no" });
        println!("  File:      {}", display_path(&target.file_path));
        println!("  Resource:  {}", target.resource_path);
        println!(
            "  Last sync: {}",
            if target.last_sync.is_empty() { "never" } else { target.last_sync.as_str() }
        );
    }

    Ok(())
}

fn display_path(path: &Path) -> String {
    if path.as_os_str().is_empty() {
        "(not set)".to_string()
    } else {
        path.display().to_string()
    }
}

async fn edit_target(config_path: &Path, action: TargetActions) -> Result<()> {
    let mut config = DaemonConfig::load_or_default(config_path).await?;

    let message = match action {
        TargetActions::Enable { name } => {
            config.target_mut(&name)?.enabled = true;
            format!("Enabled '{}'", name)
        }
        TargetActions::Disable { name } => {
            config.target_mut(&name)?.enabled = false;
            format!("Disabled '{}'", name)
        }
        TargetActions::SetPath { name, path } => {
            if !csvsync::target::is_csv_path(&path) {
                anyhow::bail!("{} is not a .csv file", path.display());
            }
            let path = std::path::absolute(&path).unwrap_or(path);
            let message = format!("'{}' now reads {}", name, path.display());
            config.target_mut(&name)?.file_path = path;
            message
        }
    };

    config.validate()?;
    config.save(config_path).await?;
    println!("✓ {}", message);
    println!("A running daemon picks this up on its next configuration reload");
    Ok(())
}

async fn validate_config(config_path: &Path) -> Result<()> {
    info!("Validating configuration at {}", config_path.display());

    match DaemonConfig::load(config_path).await.and_then(|config| {
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("API domain: {}", config.api.domain);
            println!("Targets configured: {}", config.targets.len());
            Ok(())
        }
        Err(e) => {
            println!("✗ Configuration validation failed: {:#}", e);
            Err(e)
        }
    }
}

async fn show_config(config_path: &Path) -> Result<()> {
    let config = DaemonConfig::load(config_path).await?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

async fn generate_config(output_path: Option<&Path>) -> Result<()> {
    let config = DaemonConfig::default();

    if let Some(path) = output_path {
        config.save(path).await?;
        println!("Configuration generated at {}", path.display());
    } else {
        println!("{}", toml::to_string_pretty(&config)?);
    }

    Ok(())
}
