//! Courier CLI: terminal harness for the Courier command router.
//!
//! Routes single messages or runs an interactive session against the
//! configured skills.

mod repl;

use clap::Parser;
use courier_core::{
    CompletionProvider, CourierConfig, DeclarativeSkill, OpenAiCompatibleProvider, RouteContext,
    Router, SkillRegistry,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Courier: route chat messages to bot commands
#[derive(Parser, Debug)]
#[command(name = "courier", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for JSON log files (file logging is off when omitted)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Disable the generative fallback
    #[arg(long)]
    no_fallback: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Route one message and print the decision
    Route {
        /// Message text
        message: String,

        /// Default repository for the conversation
        #[arg(long)]
        repo: Option<String>,

        /// Default organization for the conversation
        #[arg(long)]
        org: Option<String>,

        /// Conversation identifier
        #[arg(long)]
        conversation: Option<String>,

        /// Dispatch the routed command to the configured skills
        #[arg(long)]
        dispatch: bool,

        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start an interactive routing session
    Repl {
        /// Default repository for the session
        #[arg(long)]
        repo: Option<String>,

        /// Default organization for the session
        #[arg(long)]
        org: Option<String>,
    },
    /// List the command usages the router currently knows
    Usages,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Show the merged configuration
    Show,
    /// Validate the rule table and skill definitions
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)));

    // The guard must outlive the run so buffered log lines are flushed on exit.
    let (json_layer, _log_guard) = match &cli.log_dir {
        Some(log_dir) => {
            std::fs::create_dir_all(log_dir)?;
            let file_appender = tracing_appender::rolling::daily(log_dir, "courier.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut config = match &cli.config {
        Some(path) => courier_core::config::load_config_file(path),
        None => courier_core::config::load_config(Some(&workspace), None),
    }
    .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    if cli.no_fallback {
        config.router.fallback.enabled = false;
    }

    match cli.command {
        Some(Commands::Config { action }) => handle_config(action, &config),
        Some(Commands::Usages) => {
            let router = build_router(&config)?;
            for usage in router.command_usages() {
                println!("{usage}");
            }
            Ok(())
        }
        Some(Commands::Route {
            message,
            repo,
            org,
            conversation,
            dispatch,
            json,
        }) => {
            let router = build_router(&config)?;
            router.start()?;
            let mut ctx = session_context(repo, org);
            if let Some(id) = conversation {
                ctx = ctx.with_conversation(id);
            }
            route_once(&router, &message, &ctx, dispatch, json).await
        }
        Some(Commands::Repl { repo, org }) => {
            let router = build_router(&config)?;
            router.start()?;
            repl::run_interactive(&router, session_context(repo, org), &workspace).await
        }
        None => {
            let router = build_router(&config)?;
            router.start()?;
            repl::run_interactive(&router, RouteContext::new(), &workspace).await
        }
    }
}

/// Build the skill registry, provider and router from configuration.
fn build_router(config: &CourierConfig) -> anyhow::Result<Router> {
    let registry = Arc::new(SkillRegistry::new());
    for skill_config in &config.skills {
        let skill = DeclarativeSkill::from_config(skill_config.clone())?;
        registry.register(Arc::new(skill))?;
    }
    tracing::info!(skills = registry.len(), "Skill registry loaded");

    let mut builder = Router::builder(config.router.clone())
        .with_registry(registry)
        .with_default_transformers();

    if config.router.fallback.enabled {
        match OpenAiCompatibleProvider::new(&config.llm) {
            Ok(provider) => {
                let provider: Arc<dyn CompletionProvider> = Arc::new(provider);
                builder = builder.with_provider(provider);
            }
            Err(e) => {
                tracing::warn!("Completion provider init failed: {}. Fallback disabled.", e);
            }
        }
    }

    Ok(builder.build()?)
}

fn session_context(repo: Option<String>, org: Option<String>) -> RouteContext {
    let mut ctx = RouteContext::new();
    if let Some(repo) = repo {
        ctx = ctx.with_repository(repo);
    }
    if let Some(org) = org {
        ctx = ctx.with_organization(org);
    }
    ctx
}

async fn route_once(
    router: &Router,
    message: &str,
    ctx: &RouteContext,
    dispatch: bool,
    json: bool,
) -> anyhow::Result<()> {
    let (outcome, reply) = if dispatch {
        let handled = router.handle(message, ctx).await;
        (handled.route, handled.dispatch)
    } else {
        (router.route(message, ctx).await, None)
    };

    if json {
        let mut value = serde_json::to_value(&outcome)?;
        if let Some(dispatched) = &reply {
            value["dispatch"] = repl::dispatch_json(dispatched);
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", repl::describe_outcome(&outcome));
    if let Some(dispatched) = &reply {
        println!("{}", repl::describe_dispatch(dispatched));
    }
    if let Some(continuation) = &outcome.continuation {
        for intent in &continuation.remaining {
            println!("  queued: {intent}");
        }
    }
    Ok(())
}

fn handle_config(action: ConfigAction, config: &CourierConfig) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", toml::to_string_pretty(config)?);
            Ok(())
        }
        ConfigAction::Check => {
            let router = build_router(config)?;
            let problems = router.validate_rules();
            if problems.is_empty() {
                println!(
                    "{} rules, {} skills: ok",
                    router.rule_count(),
                    router.registry().len()
                );
                return Ok(());
            }
            for problem in &problems {
                println!("  - {problem}");
            }
            anyhow::bail!("{} rule problem(s) found", problems.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_route_subcommand() {
        let cli = Cli::parse_from([
            "courier", "-vv", "route", "deploy it", "--repo", "judo", "--json",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Some(Commands::Route {
                message, repo, json, dispatch, ..
            }) => {
                assert_eq!(message, "deploy it");
                assert_eq!(repo.as_deref(), Some("judo"));
                assert!(json);
                assert!(!dispatch);
            }
            other => panic!("expected route, got {other:?}"),
        }
    }

    #[test]
    fn test_session_context_sets_targets() {
        let ctx = session_context(Some("judo".into()), None);
        assert_eq!(ctx.target(courier_core::TargetKind::Repository), Some("judo"));
        assert_eq!(ctx.target(courier_core::TargetKind::Organization), None);
    }

    #[test]
    fn test_build_router_registers_configured_skills() {
        let config: CourierConfig = toml::from_str(
            r#"
            [router.fallback]
            enabled = false

            [[skills]]
            name = "deployer"
            patterns = ["^deploy "]
            usage = ["deploy <repo>"]
            "#,
        )
        .unwrap();
        let router = build_router(&config).unwrap();
        assert_eq!(router.registry().skill_names(), vec!["deployer"]);
    }
}
