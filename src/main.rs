use anyhow::Result;
use clap::{Parser, Subcommand};
use rmcp::transport::stdio;
use rmcp::ServiceExt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use codeloop::services::{Authenticator, RateLimitConfig, RateLimiter};
use codeloop::{
    CollaboratorTimeouts, Config, FileSessionStore, LoopGuardConfig, MetricsRegistry, NullLanguageModelClient,
    NullStaticAnalyzer, NullTestExecutor, Orchestrator, PolicyStore, RequestLifecycle, ReviewPipeline, RunOptions,
    SessionStore, SystemClock,
};

#[derive(Parser, Debug)]
#[command(name = "codeloop")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the tool-call transport (stdio) and the metrics/health HTTP surface.
    Serve {
        /// Path to a YAML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Re-save every persisted session snapshot at the current schema version.
    Migrate {
        /// Path to a YAML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Inspect or evict persisted sessions.
    Session {
        #[command(subcommand)]
        action: SessionAction,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum SessionAction {
    /// List sessions, most recent first.
    List {
        #[arg(long, default_value = "20")]
        limit: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Show one session's full state.
    Show { session_id: String },
    /// Evict terminal sessions started before `cutoff_ms`.
    Evict { cutoff_ms: i64 },
}

fn store_root(config: &Config) -> PathBuf {
    config
        .storage
        .database_url
        .strip_prefix("file://")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".codeloop/sessions"))
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the MCP transport when running `serve`; keep logs on stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config } => serve(config).await,
        Command::Migrate { config } => migrate(config).await,
        Command::Session { action, config } => session(action, config).await,
    }
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let config = Config::load_with_env(config_path.as_ref())?;
    info!("codeloop starting");

    let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(store_root(&config)));
    let clock = Arc::new(SystemClock);

    let mut policy_store = PolicyStore::new();
    if let Some(path) = &config.policy_file {
        policy_store = policy_store.with_file(codeloop::PolicyCategory::Custom, path.clone());
    }
    let policy_store = Arc::new(policy_store);

    let test_executor: Arc<dyn codeloop::TestExecutor> = Arc::new(NullTestExecutor);
    let static_analyzer: Arc<dyn codeloop::StaticAnalyzer> = Arc::new(NullStaticAnalyzer);
    let coder: Arc<dyn codeloop::LanguageModelClient> = Arc::new(NullLanguageModelClient);
    let critic: Arc<dyn codeloop::LanguageModelClient> = Arc::new(NullLanguageModelClient);

    let timeouts = CollaboratorTimeouts {
        model_ms: config.orchestration.model_timeout_seconds * 1_000,
        test_ms: config.orchestration.test_timeout_seconds * 1_000,
        static_analysis_ms: config.orchestration.static_analysis_timeout_seconds * 1_000,
    };

    let review_pipeline = Arc::new(
        ReviewPipeline::new(critic, test_executor.clone(), static_analyzer.clone(), policy_store.clone())
            .with_timeouts(timeouts),
    );

    let run_defaults = RunOptions {
        max_iterations: Some(config.orchestration.default_max_iterations),
        quality_threshold: Some(config.orchestration.quality_threshold),
        task_timeout_minutes: Some(config.orchestration.default_task_timeout_minutes),
    };

    let orchestrator = Arc::new(
        Orchestrator::new(
            store.clone(),
            clock.clone(),
            coder,
            review_pipeline.clone(),
            LoopGuardConfig::default(),
            run_defaults,
        )
        .with_timeouts(timeouts),
    );

    let metrics = Arc::new(MetricsRegistry::new());
    let authenticator = if config.auth.enabled {
        Authenticator::new(
            config.auth.jwt_signing_key.as_ref().map(|k| k.as_bytes().to_vec()),
            config.auth.shared_key.as_deref(),
            Vec::new(),
        )
    } else {
        Authenticator::disabled()
    };
    let rate_limiter = RateLimiter::new(RateLimitConfig {
        window_ms: config.rate_limit.window_ms,
        max_requests: config.rate_limit.max_requests,
    });
    let lifecycle = Arc::new(RequestLifecycle::new(authenticator, rate_limiter, metrics.clone(), clock.clone()));

    let health_cache = Arc::new(codeloop::services::Cache::new(config.cache.capacity));
    let http_state = codeloop::transport::http::HttpState {
        metrics: metrics.clone(),
        lifecycle: lifecycle.clone(),
        store: store.clone(),
        health_cache: health_cache.clone(),
    };
    let http_router = codeloop::transport::http::router(http_state);
    let http_addr = format!("0.0.0.0:{}", config.transport.metrics_port);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    info!(addr = %http_addr, "metrics/health HTTP surface listening");
    let http_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, http_router).await {
            tracing::error!(error = %e, "HTTP surface terminated");
        }
    });

    let (sweep_shutdown_tx, mut sweep_shutdown_rx) = tokio::sync::watch::channel(false);
    let sweep_lifecycle = lifecycle.clone();
    let sweep_cache = health_cache.clone();
    let sweep_clock = clock.clone();
    let sweep_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = sweep_clock.now_ms();
                    sweep_lifecycle.rate_limiter.sweep(now);
                    sweep_cache.sweep(now);
                }
                _ = sweep_shutdown_rx.changed() => break,
            }
        }
    });

    let server = codeloop::CodeloopServer::new(
        store,
        clock,
        orchestrator,
        review_pipeline,
        policy_store,
        test_executor,
        static_analyzer,
        lifecycle.clone(),
    );

    let running = server.serve(stdio()).await?;
    running.waiting().await?;

    lifecycle.shutdown().await;
    let _ = sweep_shutdown_tx.send(true);
    sweep_task.abort();
    http_task.abort();
    Ok(())
}

async fn migrate(config_path: Option<PathBuf>) -> Result<()> {
    let config = Config::load_with_env(config_path.as_ref())?;
    let store = FileSessionStore::new(store_root(&config));
    let sessions = store.list(usize::MAX, 0).await?;
    info!(count = sessions.len(), "re-saving sessions at current schema version");
    for session in &sessions {
        store.persist(session).await?;
    }
    println!("migrated {} session(s)", sessions.len());
    Ok(())
}

async fn session(action: SessionAction, config_path: Option<PathBuf>) -> Result<()> {
    let config = Config::load_with_env(config_path.as_ref())?;
    let store = FileSessionStore::new(store_root(&config));

    match action {
        SessionAction::List { limit, offset } => {
            let sessions = store.list(limit, offset).await?;
            for session in sessions {
                println!(
                    "{}  {}  iteration {}/{}  score {:?}",
                    session.session_id, session.state, session.current_iteration, session.max_iterations, session.last_quality_score
                );
            }
        }
        SessionAction::Show { session_id } => match store.load(&session_id).await? {
            Some(session) => println!("{}", serde_json::to_string_pretty(&session)?),
            None => {
                eprintln!("no such session: {session_id}");
                std::process::exit(1);
            }
        },
        SessionAction::Evict { cutoff_ms } => {
            let evicted = store.evict_older_than(cutoff_ms).await?;
            println!("evicted {evicted} session(s)");
        }
    }
    Ok(())
}
