use anyhow::Context;
use clap::{Parser, Subcommand};
use opsdesk_cli::{get_log_dir, load_actions, load_store, read_arguments, replay, write_back};
use opsdesk_core::config::AppConfig;
use opsdesk_core::Store;
use opsdesk_tools::{default_registry, Domain};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "opsdesk")]
#[command(version = VERSION)]
#[command(about = "Business tool handlers over JSON record stores")]
struct Cli {
    /// Config file (defaults to ~/.opsdesk/config.{toml,json,yaml})
    #[arg(long, global = true, env = "OPSDESK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List tools with their descriptions
    List {
        #[arg(short, long)]
        domain: Option<Domain>,
    },
    /// Print a tool's function-calling definition
    Info { tool: String },
    /// Run one tool against a data directory
    Invoke {
        tool: String,
        /// Directory of <table>.json files
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// Arguments as inline JSON
        #[arg(short, long)]
        args: Option<String>,
        #[arg(long)]
        args_file: Option<PathBuf>,
        /// Write changed tables back to the data directory
        #[arg(short, long)]
        write: bool,
    },
    /// Run a list of recorded {name, arguments} actions in order
    Replay {
        actions: PathBuf,
        #[arg(short, long)]
        data: Option<PathBuf>,
        #[arg(short, long)]
        write: bool,
    },
}

fn load_with_clock(dir: &Path, config: &AppConfig) -> anyhow::Result<Store> {
    let clock = config.clock.build()?;
    Ok(load_store(dir)?.with_clock(clock))
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.clone()).context("Failed to load config")?;

    // Logging: human-readable on stderr, audit events as JSON lines in a daily file.
    let log_dir = config.log.dir.clone().unwrap_or_else(get_log_dir);
    let (non_blocking, _guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, "audit.jsonl"));

    let audit_layer = config.log.audit.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_target(false)
            .with_level(false)
            .with_file(false)
            .with_line_number(false)
            .without_time() // Timestamp is in JSON
            .with_filter(tracing_subscriber::filter::Targets::new().with_target("audit", Level::INFO))
    });

    let console_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(Level::WARN.into())
        .from_env_lossy();
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(console_filter)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target() != "audit"
        }));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(audit_layer)
        .init();

    let registry = default_registry();

    match cli.command {
        Commands::List { domain } => {
            let defs = match domain {
                Some(domain) => registry.list_definitions_for_domain(domain),
                None => registry.list_definitions_for_permissions(&config.allowed_tools),
            };
            for def in defs {
                let name = def["name"].as_str().unwrap_or_default();
                let summary = def["description"].as_str().unwrap_or_default();
                println!("{name:<32} {summary}");
            }
        }
        Commands::Info { tool } => {
            let tool = registry
                .get(&tool)
                .with_context(|| format!("Unknown tool: {tool}"))?;
            print_json(&tool.get_info())?;
        }
        Commands::Invoke { tool, data, args, args_file, write } => {
            let dir = data.unwrap_or_else(|| config.data_dir.clone());
            let arguments = read_arguments(args.as_deref(), args_file.as_deref())?;
            let before = load_with_clock(&dir, &config)?;
            let mut store = before.clone();

            let output = registry.dispatch_allowed(&mut store, &tool, arguments, &config.allowed_tools);
            print_json(&output)?;

            if write || config.write_back {
                let changed = write_back(&dir, &before, &store)?;
                info!(tool = %tool, tables = changed.len(), "Changes written back");
            }
        }
        Commands::Replay { actions, data, write } => {
            let dir = data.unwrap_or_else(|| config.data_dir.clone());
            let actions = load_actions(&actions)?;
            let before = load_with_clock(&dir, &config)?;
            let mut store = before.clone();

            for (name, output) in replay(&registry, &mut store, actions, &config.allowed_tools) {
                println!("{name}: {}", serde_json::to_string(&output)?);
            }
            if write || config.write_back {
                write_back(&dir, &before, &store)?;
            }
        }
    }

    Ok(())
}
