use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spacealias_core::alias_store::{AliasStore, FileKeyValueStore, MemoryKeyValueStore};
use spacealias_core::clock::SystemClock;
use spacealias_core::hub::InMemoryHub;
use spacealias_core::identity::LocalOwner;
use spacealias_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use spacealias_core::subscription::InMemorySubscriptions;
use spacealias_core::{Address, AliasContext, Config, SpaceId};
use std::sync::Arc;
use tracing::{info, warn};

const PASSWORD_ENV: &str = "SPACEALIAS_STORE_PASSWORD";

#[derive(Parser, Debug)]
#[command(name = "spacealias")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the alias address stored for an owner
    Show {
        #[arg(long)]
        owner: String,
    },
    /// Generate and store a new alias key for an owner (no hub registration)
    Generate {
        #[arg(long)]
        owner: String,
    },
    /// Follow and unfollow a space against an in-memory hub
    Demo {
        #[arg(long, default_value = "space-1")]
        space: String,
    },
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let path = shellexpand::tilde(path).into_owned();
            Config::from_file(&path).with_context(|| format!("loading {}", path))?
        }
        None => Config::default(),
    };
    config.apply_env()?;

    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    Ok(config)
}

fn file_store(config: &Config) -> Result<AliasStore> {
    let data_dir = shellexpand::tilde(&config.alias.data_dir.to_string_lossy()).into_owned();
    let password = std::env::var(PASSWORD_ENV).ok();
    if password.is_none() {
        warn!("{} not set, alias keys are stored unencrypted", PASSWORD_ENV);
    }

    let backend = FileKeyValueStore::new(data_dir, password.as_deref())?;
    Ok(AliasStore::new(Arc::new(backend)))
}

async fn demo(config: Config, space: SpaceId) -> Result<()> {
    let clock = Arc::new(SystemClock);
    let hub = Arc::new(InMemoryHub::new(clock.clone(), config.alias.validity_window));
    let owner = Arc::new(LocalOwner::generate());
    let subscriptions = Arc::new(InMemorySubscriptions::new());

    let context = AliasContext::builder(config)
        .backend(Arc::new(MemoryKeyValueStore::new()))
        .hub(hub.clone())
        .owner(owner.clone())
        .subscriptions(subscriptions.clone())
        .clock(clock)
        .build()?;

    println!("owner:    {}", owner.address());

    let outcome = context.follows().follow(&space).await?;
    let alias = context
        .session()
        .snapshot(&owner.address())
        .await?
        .context("no alias after follow")?;
    println!("alias:    {} ({})", alias.alias, alias.state);
    println!("{:?} {}", outcome, space);
    println!("follows:  {:?}", context.follows().following_spaces().await);

    subscriptions.subscribe(space.clone());
    let outcome = context.follows().follow(&space).await?;
    println!("{:?} {} (unsubscribed: {})", outcome, space, !subscriptions.toggles().is_empty());
    println!("follows:  {:?}", context.follows().following_spaces().await);
    println!("hub messages submitted: {}", hub.submissions().len());

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let log_level = LogLevel::from_str(&config.logging.level).unwrap_or_else(|| {
        eprintln!("Invalid log level '{}', using 'info'", config.logging.level);
        LogLevel::Info
    });
    init_logging_with_config(
        LogConfig::new(log_level)
            .json_format(config.logging.json_format)
            .with_target(config.logging.with_target),
    )?;
    spacealias_core::metrics::init_metrics();
    config.validate()?;

    match args.command {
        Command::Show { owner } => {
            let store = file_store(&config)?;
            match store.get(&Address::new(owner.clone())).await? {
                Some(wallet) => println!("{}", wallet.address()),
                None => println!("no alias stored for {}", owner),
            }
        }
        Command::Generate { owner } => {
            let store = file_store(&config)?;
            let wallet = store.generate(&Address::new(owner.clone())).await?;
            info!(owner = %owner, alias = %wallet.address(), "alias generated");
            println!("{}", wallet.address());
        }
        Command::Demo { space } => demo(config, SpaceId::new(space)).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_show() {
        let args = Args::parse_from(["spacealias", "--log-level", "debug", "show", "--owner", "0xabc"]);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(matches!(args.command, Command::Show { owner } if owner == "0xabc"));
    }

    #[test]
    fn test_load_config_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spacealias.toml");
        Config::default().save_to_file(&path).unwrap();

        let args = Args::parse_from([
            "spacealias",
            "--json-logs",
            "--log-level",
            "warn",
            "--config",
            path.to_str().unwrap(),
            "demo",
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.logging.level, "warn");
        assert!(config.logging.json_format);
    }

    #[tokio::test]
    async fn test_generate_then_show() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.alias.data_dir = dir.path().to_path_buf();

        let store = file_store(&config).unwrap();
        let owner = Address::from("0xowner");
        let wallet = store.generate(&owner).await.unwrap();

        let reopened = file_store(&config).unwrap();
        assert_eq!(reopened.get(&owner).await.unwrap().unwrap().address(), wallet.address());
    }
}
