//! `tally` - survey vote intake and aggregation
//!
//! - `serve`   HTTP API (`POST /vote`, `GET /results/{survey}`)
//! - `worker`  queue consumers: vote log append + results upsert
//! - `migrate` create tables and the consumer group
//! - `audit`   compare the vote log with the aggregates of one survey

mod api;
mod config;
mod survey_client;

use std::future::IntoFuture;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tally_core::app::{
    Auditor, ConsumerConfig, ConsumerGroup, ResultsReader, VoteIntake, VoteProcessor,
    VoteValidator,
};
use tally_core::domain::{QueueError, StoreError};
use tally_core::impls::CodecRegistry;
use tally_core::ports::{SystemClock, UlidGenerator, VoteSource};
use tally_core::retry::RetryPolicy;
use tally_pg::{PgResultsStore, PgVoteLog};
use tally_redis::RedisVoteQueue;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::api::ApiState;
use crate::config::{Config, ConfigError};
use crate::survey_client::HttpSurveyLookup;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API.
    Serve,
    /// Consume queued votes until interrupted.
    Worker {
        /// Consumer tasks in this process (overrides TALLY_WORKERS).
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Create tables and the consumer group, then exit.
    Migrate,
    /// Print vote log vs. aggregate counts; exits with 2 on drift.
    Audit { survey: String },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("storage: {0}")]
    Store(#[from] StoreError),

    #[error("queue: {0}")]
    Queue(#[from] QueueError),

    #[error("survey client: {0}")]
    SurveyClient(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("report could not be printed: {0}")]
    Report(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "tally exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<ExitCode, CliError> {
    let config = Config::load()?;
    match command {
        Command::Serve => serve(config).await?,
        Command::Worker { workers } => worker(config, workers).await?,
        Command::Migrate => migrate(config).await?,
        Command::Audit { survey } => return audit(config, &survey).await,
    }
    Ok(ExitCode::SUCCESS)
}

async fn serve(config: Config) -> Result<(), CliError> {
    let pool = tally_pg::connect(&config.postgres).await?;
    tally_pg::init_schema(&pool, &config.postgres.tables).await?;
    let queue = RedisVoteQueue::connect(config.redis.clone()).await?;
    queue.ensure_group().await?;

    let codecs = Arc::new(CodecRegistry::with_defaults());
    let lookup = HttpSurveyLookup::new(
        config.survey.url.clone(),
        config.survey.timeout,
        RetryPolicy::default().with_max_attempts(config.survey.attempts),
    )?;
    let validator = VoteValidator::new(
        Arc::new(lookup),
        Arc::new(SystemClock),
        Arc::new(UlidGenerator::new(SystemClock)),
    );
    let state = ApiState {
        intake: Arc::new(VoteIntake::new(
            validator,
            Arc::new(queue),
            codecs.default_codec(),
            config.redis.op_timeout,
        )),
        reader: Arc::new(ResultsReader::new(
            Arc::new(PgResultsStore::new(pool, &config.postgres.tables)),
            config.storage_timeout,
        )),
        codecs,
    };

    let listener = TcpListener::bind(config.http.address()).await?;
    info!("Server running on {}", listener.local_addr()?);

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let server = axum::serve(listener, api::router(state)).with_graceful_shutdown(async move {
        let _ = stop_rx.changed().await;
    });
    let mut server = tokio::spawn(server.into_future());

    tokio::select! {
        finished = &mut server => return Ok(finished??),
        _ = shutdown_signal() => {}
    }

    let _ = stop_tx.send(true);
    let grace = config.http.shutdown_grace;
    match tokio::time::timeout(grace, &mut server).await {
        Ok(finished) => finished??,
        Err(_) => {
            warn!(?grace, "grace period elapsed, dropping open connections");
            server.abort();
        }
    }
    info!("Server stopped");
    Ok(())
}

async fn worker(config: Config, workers: Option<usize>) -> Result<(), CliError> {
    let pool = tally_pg::connect(&config.postgres).await?;
    tally_pg::init_schema(&pool, &config.postgres.tables).await?;
    let queue = RedisVoteQueue::connect(config.redis.clone()).await?;
    queue.ensure_group().await?;

    let processor = Arc::new(VoteProcessor::new(
        Arc::new(PgVoteLog::new(pool.clone(), &config.postgres.tables)),
        Arc::new(PgResultsStore::new(pool, &config.postgres.tables)),
        CodecRegistry::with_defaults().default_codec(),
        config.storage_timeout,
    ));

    // Unique per process so restarted workers never share a pending list;
    // entries left by a dead consumer are re-claimed once idle.
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "tally".to_string());
    let prefix = format!("{host}-{}", std::process::id());
    let count = workers.unwrap_or(config.workers).max(1);
    let mut sources: Vec<Arc<dyn VoteSource>> = Vec::with_capacity(count);
    for i in 0..count {
        sources.push(Arc::new(queue.source(format!("{prefix}-{i}")).await?));
    }

    let group = ConsumerGroup::spawn(
        sources,
        processor,
        ConsumerConfig {
            poll_wait: config.redis.block,
            queue_timeout: config.redis.op_timeout,
            ..ConsumerConfig::default()
        },
    );
    info!(consumers = group.len(), %prefix, "workers running");

    shutdown_signal().await;
    group.shutdown_and_join().await;
    info!("workers stopped");
    Ok(())
}

async fn migrate(config: Config) -> Result<(), CliError> {
    let pool = tally_pg::connect(&config.postgres).await?;
    tally_pg::init_schema(&pool, &config.postgres.tables).await?;
    RedisVoteQueue::connect(config.redis.clone())
        .await?
        .ensure_group()
        .await?;
    info!("schema and consumer group ready");
    Ok(())
}

async fn audit(config: Config, survey: &str) -> Result<ExitCode, CliError> {
    let pool = tally_pg::connect(&config.postgres).await?;
    let auditor = Auditor::new(
        Arc::new(PgVoteLog::new(pool.clone(), &config.postgres.tables)),
        Arc::new(PgResultsStore::new(pool, &config.postgres.tables)),
        config.storage_timeout,
    );
    let report = auditor.audit(survey).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.is_consistent() {
        Ok(ExitCode::SUCCESS)
    } else {
        for question in report.drifting() {
            warn!(
                question = question.question,
                logged = question.logged,
                counted = question.counted,
                "aggregate drifted from vote log"
            );
        }
        Ok(ExitCode::from(2))
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM, shutting down");
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
