use clap::Parser;
use dagflow_cli::commands::{cli, inspect, run};
use dagflow_cli::error::CliError;
use dagflow_core::api::{load_engine_config, LoggingConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            e.exit_code()
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let cfg = load_engine_config(args.config.as_deref()).map_err(|e| CliError::Config(e.to_string()))?;
    init_tracing(&cfg.logging).map_err(CliError::Config)?;

    match args.command {
        cli::Commands::Validate(validate_args) => inspect::handle_validate(validate_args),
        cli::Commands::Dot(dot_args) => inspect::handle_dot(dot_args),
        cli::Commands::Operators => inspect::handle_operators(),
        cli::Commands::Run(run_args) => run::handle_run(run_args, &cfg).await,
    }
}

/// Install the global subscriber: an EnvFilter plus a stderr layer and/or a non-blocking file layer.
fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }
    if !logging.console && !logging.file {
        return Err("logging enabled but neither console nor file output is on".to_string());
    }

    // RUST_LOG wins over the configured level ($DAGFLOW_LOG is folded in by the loader).
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .map_err(|e| format!("invalid log level '{}': {e}", logging.level))?;

    let file_layer = if logging.file {
        let dir = logging.log_dir();
        std::fs::create_dir_all(&dir)
            .map_err(|e| format!("create log dir {} failed: {e}", dir.display()))?;
        let appender =
            tracing_appender::rolling::never(&dir, format!("dagflow.{}.log", std::process::id()));
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
    } else {
        None
    };

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| e.to_string())
}
