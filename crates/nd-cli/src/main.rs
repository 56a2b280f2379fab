use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use nd_cli::commands::session::PlannerSession;
use nd_cli::commands::source::CourseSource;
use nd_cli::commands::{autoschedule, busy, calendar, catalog, courses, search, select, status};
use nd_cli::{BusyAction, CatalogAction, Cli, Commands, Config};
use nd_core::optimizer::AutoscheduleGuard;
use nd_db::Database;

/// Load config, ensuring the database directory exists.
fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    Ok(config)
}

fn open_database(config: &Config) -> Result<Database> {
    Database::open(&config.database_path).context("failed to open database")
}

async fn open_session(config: &Config) -> Result<(PlannerSession, CourseSource)> {
    let source = CourseSource::from_config(config)?;
    let session = PlannerSession::open(open_database(config)?, &source).await?;
    Ok((session, source))
}

/// Runs the pending reconciliation and persists planner state.
fn finish(session: PlannerSession) -> Result<()> {
    let (_db, report) = session.finish()?;
    if let Some(report) = report {
        for op in &report.ops {
            tracing::debug!(%op, "calendar change");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    run(&cli).await
}

#[expect(
    clippy::too_many_lines,
    reason = "CLI command dispatch is inherently verbose"
)]
async fn run(cli: &Cli) -> Result<()> {
    let mut stdout = io::stdout().lock();
    let config_path = cli.config.as_deref();

    match &cli.command {
        Some(Commands::Catalog(CatalogAction::Build {
            input,
            output,
            strip,
        })) => {
            let config = load_config(config_path)?;
            let output = output.as_deref().unwrap_or(config.catalog_path.as_path());
            catalog::run(&mut stdout, input, output, *strip)?;
        }
        Some(Commands::Search { query, limit }) => {
            let config = load_config(config_path)?;
            let source = CourseSource::from_config(&config)?;
            search::run(&mut stdout, &source, query, *limit).await?;
        }
        Some(Commands::Show { name }) => {
            let config = load_config(config_path)?;
            let source = CourseSource::from_config(&config)?;
            let db = open_database(&config)?;
            search::show(&mut stdout, &db, &source, name).await?;
        }
        Some(Commands::Add { name }) => {
            let config = load_config(config_path)?;
            let (mut session, source) = open_session(&config).await?;
            courses::add(&mut stdout, &mut session, &source, name).await?;
            finish(session)?;
        }
        Some(Commands::Remove { key }) => {
            let config = load_config(config_path)?;
            let (mut session, _source) = open_session(&config).await?;
            courses::remove(&mut stdout, &mut session, key)?;
            finish(session)?;
        }
        Some(Commands::List { json }) => {
            let config = load_config(config_path)?;
            let store = open_database(&config)?.load_store()?;
            courses::list(&mut stdout, &store, *json)?;
        }
        Some(Commands::Select { key, code, index }) => {
            let config = load_config(config_path)?;
            let (mut session, _source) = open_session(&config).await?;
            select::select(&mut stdout, &mut session, key, code, *index)?;
            finish(session)?;
        }
        Some(Commands::Pin { key, code, index }) => {
            let config = load_config(config_path)?;
            let (mut session, _source) = open_session(&config).await?;
            select::pin(&mut stdout, &mut session, key, code, *index)?;
            finish(session)?;
        }
        Some(Commands::Attend { key, code, state }) => {
            let config = load_config(config_path)?;
            let (mut session, _source) = open_session(&config).await?;
            select::attend(&mut stdout, &mut session, key, code, state.is_on())?;
            finish(session)?;
        }
        Some(Commands::Busy(action)) => {
            let config = load_config(config_path)?;
            if let BusyAction::List { json } = action {
                busy::list(&mut stdout, &open_database(&config)?, *json)?;
                return Ok(());
            }
            let (mut session, _source) = open_session(&config).await?;
            match action {
                BusyAction::Add { start, end, title } => {
                    busy::add(&mut stdout, &mut session, start, end, title)?;
                }
                BusyAction::Remove { id } => busy::remove(&mut stdout, &mut session, id)?,
                BusyAction::Clear => busy::clear(&mut stdout, &mut session)?,
                BusyAction::List { .. } => {}
            }
            finish(session)?;
        }
        Some(Commands::Autoschedule { refresh }) => {
            let config = load_config(config_path)?;
            let (mut session, source) = open_session(&config).await?;
            let guard = AutoscheduleGuard::default();
            autoschedule::run(&mut stdout, &mut session, &source, &guard, *refresh).await?;
            finish(session)?;
        }
        Some(Commands::Calendar { week, json }) => {
            let config = load_config(config_path)?;
            let (session, _source) = open_session(&config).await?;
            calendar::run(&mut stdout, session, *week, *json)?;
        }
        Some(Commands::Status) => {
            let config = load_config(config_path)?;
            status::run(&mut stdout, &config)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            writeln!(stdout)?;
        }
    }

    Ok(())
}
