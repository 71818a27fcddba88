use agentops::cli::commands::{HistoryCommand, RunCommand, ValidateCommand};
use agentops::cli::output::*;
use agentops::cli::{Cli, Command};
use agentops::core::config::AppConfig;
use agentops::persistence::SessionStore;
use agentops::{AgentContext, PipelineOrchestrator, SessionLog, SessionLogger};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .context("Failed to set logging subscriber")?;
    } else {
        let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
        let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
        tracing::subscriber::set_global_default(subscriber)
            .context("Failed to set logging subscriber")?;
    }

    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, &cli).await?,
        Command::Validate(cmd) => validate_config(cmd)?,
        Command::History(cmd) => show_history(cmd, &cli).await?,
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    match &cli.config {
        Some(path) => {
            AppConfig::from_file(path).with_context(|| format!("Failed to load config from {}", path))
        }
        None => Ok(AppConfig::default()),
    }
}

#[cfg(feature = "sqlite")]
async fn open_store(config: &AppConfig) -> Result<Arc<dyn SessionStore>> {
    use agentops::persistence::SqliteSessionStore;
    use std::path::Path;

    let store = match &config.history.database {
        Some(path) => SqliteSessionStore::at_path(Path::new(path)).await?,
        None => SqliteSessionStore::with_default_path().await?,
    };
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_store(_config: &AppConfig) -> Result<Arc<dyn SessionStore>> {
    tracing::warn!("Built without the sqlite feature; history is not persisted");
    Ok(Arc::new(agentops::InMemorySessionStore::new()))
}

async fn run_pipeline(cmd: &RunCommand, cli: &Cli) -> Result<()> {
    let config = cmd.apply(load_config(cli)?);
    config.check_runnable().context("Configuration is not runnable")?;
    let mode = config.mode;

    println!(
        "{} Mode: {}  Provider: {}",
        INFO,
        style(mode).bold(),
        style(config.provider.kind).cyan()
    );

    // Simulation never persists, so don't touch the database
    let logger: Arc<dyn SessionLogger> = if config.history.enabled && !mode.is_simulation() {
        Arc::new(SessionLog::new(mode, open_store(&config).await?))
    } else {
        Arc::new(SessionLog::disabled(mode))
    };

    let context = AgentContext::from_config(config, logger)?;
    let mut orchestrator = PipelineOrchestrator::new(context);

    let spinner = (!cmd.json).then(create_spinner);
    if let Some(spinner) = spinner.clone() {
        orchestrator.add_event_handler(move |event| {
            if let agentops::ExecutionEvent::StageStarted { stage } = &event {
                spinner.set_message(stage.title());
            }
            spinner.println(format_execution_event(&event));
        });
    }

    let report = orchestrator.run(&cmd.repo).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("\n{}", separator());
        for line in format_session(&report.session) {
            println!("{}", line);
        }
        println!("{}", separator());
    }

    if let agentops::PipelineOutcome::Halted { blocking } = &report.outcome {
        if !cmd.json {
            println!(
                "\n{} Pipeline {} halted before deploy",
                CROSS,
                style(&report.session.id).bold()
            );
        }
        error!(
            "Deploy gate closed by {}",
            blocking.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        );
        std::process::exit(1);
    }

    if !cmd.json {
        println!(
            "\n{} Pipeline {} completed {}",
            CHECK,
            style(&report.session.id).bold(),
            style("successfully").green()
        );
    }
    Ok(())
}

fn validate_config(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating configuration...", INFO);

    match AppConfig::from_file(&cmd.file).and_then(|config| config.check_runnable().map(|_| config)) {
        Ok(config) => {
            println!("{} Configuration is valid!", CHECK);
            println!("  Mode: {}", style(config.mode).bold());
            println!("  Provider: {}", style(config.provider.kind).cyan());
            println!("  LLM backend: {:?}", config.llm.backend);
            println!("  History: {}", if config.history.enabled { "enabled" } else { "disabled" });

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

async fn show_history(cmd: &HistoryCommand, cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let store = open_store(&config).await?;

    // A session or stage filter lists envelopes; otherwise list sessions
    let entries = if let Some(session_id) = &cmd.session {
        Some(store.load_session(session_id).await?)
    } else if let Some(stage) = cmd.stage {
        Some(store.fetch_history(stage, cmd.limit).await?)
    } else {
        None
    };

    match entries {
        Some(entries) => {
            if cmd.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("{} No envelopes found", INFO);
            } else {
                for entry in &entries {
                    println!("  {}", format_history_entry(entry));
                }
            }
        }
        None => {
            let sessions = store.list_sessions(cmd.limit).await?;
            if cmd.json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
            } else if sessions.is_empty() {
                println!("{} No sessions found in history", INFO);
            } else {
                println!("{} Session history (showing latest {}):", INFO, cmd.limit);
                for summary in &sessions {
                    println!("  {}", format_session_summary(summary));
                }
            }
        }
    }

    Ok(())
}
