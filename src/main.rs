//! nsworker binary
//!
//! `serve` hosts workers in this process; the other commands drive a pool
//! listed in a discovery file.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures_util::future::join_all;
use tracing::{info, warn};

use nsworker::cli::{Cli, Commands, ConfigSubcommand, PoolArgs};
use nsworker::client::{Criterion, WorkerHandle};
use nsworker::config::{self, WorkerConfig};
use nsworker::error::{Error, Result};
use nsworker::group::{JoinOptions, MultiRunResult, Operation, Outcome, Output, WorkerGroup};
use nsworker::logging;
use nsworker::server::{append_endpoint, reset_endpoint_file, WorkerEngine, WorkerServer};
use nsworker::version;

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Version => {
            version::print_version();
            Ok(())
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            handle_config_command(subcommand)
        }
        Commands::Serve {
            config,
            count,
            multi,
            bind,
            port,
            uri_file,
        } => {
            let mut cfg = WorkerConfig::load(config.as_deref())?;
            if let Some(bind) = bind {
                cfg.server.bind_host = bind;
            }
            if let Some(port) = port {
                cfg.server.port = port;
            }
            if let Some(uri_file) = uri_file {
                cfg.server.uri_file = Some(config::expand_path(&uri_file));
            }
            if multi {
                cfg.server.count = num_cpus::get();
            } else if let Some(count) = count {
                cfg.server.count = count;
            }
            cfg.validate()?;

            let _log_guard = logging::init_logging(&cfg.logging, cli.verbose, cli.quiet)?;
            let build = version::build_info();
            info!(version = %build.full_version(), target = %build.target, "Starting nsworker");

            runtime()?.block_on(serve(cfg))
        }
        Commands::Ping { pool } => {
            init_pool_logging(cli.verbose)?;
            let cfg = WorkerConfig::load(pool.config.as_deref())?;
            runtime()?.block_on(ping(&pool, &cfg))
        }
        Commands::Bench {
            pool,
            cycles,
            criterion,
        } => {
            init_pool_logging(cli.verbose)?;
            let cfg = WorkerConfig::load(pool.config.as_deref())?;
            let cycles = cycles.unwrap_or(cfg.group.benchmark_cycles);
            runtime()?.block_on(bench(&pool, &cfg, cycles, criterion))
        }
        Commands::Exec {
            pool,
            code,
            timeout_ms,
        } => {
            init_pool_logging(cli.verbose)?;
            let cfg = WorkerConfig::load(pool.config.as_deref())?;
            let mut join = cfg.group.join_options();
            if let Some(ms) = timeout_ms {
                join.timeout = Some(Duration::from_millis(ms));
            }
            runtime()?.block_on(exec(&pool, &cfg, &code, join))
        }
        Commands::Eval { pool, expr } => {
            init_pool_logging(cli.verbose)?;
            let cfg = WorkerConfig::load(pool.config.as_deref())?;
            runtime()?.block_on(eval(&pool, &cfg, &expr))
        }
    }
}

fn init_pool_logging(verbose: u8) -> Result<()> {
    logging::init_simple(match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    })
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("nsworker")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))
}

/// Start the configured number of workers and run until Ctrl+C
async fn serve(cfg: WorkerConfig) -> Result<()> {
    let settings = cfg.server.engine_settings();
    let uri_file = cfg.uri_file();
    let mut running = Vec::with_capacity(cfg.server.count);
    if let Some(path) = &uri_file {
        reset_endpoint_file(path)?;
    }

    for i in 0..cfg.server.count {
        let port = if cfg.server.port == 0 {
            0
        } else {
            cfg.server.port.checked_add(i as u16).ok_or_else(|| {
                Error::Config(format!("port range starting at {} overflows", cfg.server.port))
            })?
        };

        let engine = Arc::new(WorkerEngine::new(settings.clone()));
        let server = WorkerServer::bind(
            engine,
            &cfg.server.bind_host,
            port,
            cfg.server.advertise_host.as_deref(),
        )
        .await?;

        if let Some(path) = &uri_file {
            append_endpoint(path, server.endpoint())?;
        }
        println!("{}", server.endpoint());
        running.push(server.spawn());
    }

    info!(workers = running.len(), "Workers running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    for server in &running {
        server.shutdown();
    }
    Ok(())
}

async fn read_endpoints(path: &str) -> Result<Vec<String>> {
    let path = config::expand_path(path);
    let text = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| Error::IoRead {
            path: Path::new(&path).to_path_buf(),
            source: e,
        })?;
    Ok(WorkerGroup::parse_endpoints(&text)?
        .into_iter()
        .map(|e| e.to_string())
        .collect())
}

async fn connect_pool(pool: &PoolArgs, cfg: &WorkerConfig) -> Result<WorkerGroup> {
    let path = config::expand_path(&pool.uri_file);
    WorkerGroup::connect_from_file(Path::new(&path), cfg.client.connect_options()).await
}

async fn ping(pool: &PoolArgs, cfg: &WorkerConfig) -> Result<()> {
    let endpoints = read_endpoints(&pool.uri_file).await?;
    let options = cfg.client.connect_options();

    let checks = endpoints.iter().map(|endpoint| async move {
        let handle = WorkerHandle::connect(endpoint, options).await?;
        handle.ping().await?;
        Ok::<_, Error>(handle)
    });
    let results = join_all(checks).await;

    let mut failed = 0;
    for (endpoint, result) in endpoints.iter().zip(results) {
        match result {
            Ok(handle) => println!("ok    {}  {}  {}", endpoint, handle.hostname(), handle.system()),
            Err(e) => {
                failed += 1;
                println!("FAIL  {}  {}", endpoint, e);
            }
        }
    }

    if failed > 0 {
        return Err(Error::unreachable(
            pool.uri_file.clone(),
            format!("{} of {} workers did not answer", failed, endpoints.len()),
        ));
    }
    Ok(())
}

async fn bench(pool: &PoolArgs, cfg: &WorkerConfig, cycles: u64, criterion: Criterion) -> Result<()> {
    let group = connect_pool(pool, cfg).await?;
    let ranked = group
        .benchmark(criterion, cycles, cfg.group.join_options())
        .await;
    if ranked.is_empty() {
        return Err(Error::operation("no worker completed the benchmark"));
    }

    println!("rank  {:<40} {:>10} {:>10} {:>10}", "worker", "network", "compute", criterion);
    for (i, (handle, report)) in ranked.iter().enumerate() {
        println!(
            "{:<5} {:<40} {:>10.4} {:>10.4} {:>10.4}{}",
            i + 1,
            handle.key(),
            report.network_secs,
            report.compute_secs,
            report.score(criterion),
            if report.busy { "  (busy)" } else { "" }
        );
    }
    if ranked.len() < group.len() {
        warn!(
            completed = ranked.len(),
            members = group.len(),
            "Some workers did not finish the benchmark"
        );
    }
    Ok(())
}

async fn exec(pool: &PoolArgs, cfg: &WorkerConfig, code: &str, join: JoinOptions) -> Result<()> {
    let group = connect_pool(pool, cfg).await?;
    let run = group.run_parallel(&Operation::execute(code));
    let result = run.join(join).await;
    report(&result)
}

async fn eval(pool: &PoolArgs, cfg: &WorkerConfig, expr: &str) -> Result<()> {
    let group = connect_pool(pool, cfg).await?;
    let result = group.run_sequential(&Operation::evaluate(expr)).await;
    report(&result)
}

/// Print one line per member; fails if any member failed or is pending
fn report(result: &MultiRunResult) -> Result<()> {
    for (key, outcome) in result.iter() {
        match outcome {
            Outcome::Done(Output::Value(value)) => println!("{}  {}", key, value),
            Outcome::Done(_) => println!("{}  ok", key),
            Outcome::Failed(e) => println!("{}  error: {}", key, e),
            Outcome::Pending => println!("{}  pending", key),
        }
    }

    let failed = result.failed_count();
    let pending = result.pending_count();
    if failed + pending > 0 {
        return Err(Error::operation(format!(
            "{} failed, {} still pending, out of {} workers",
            failed,
            pending,
            result.len()
        )));
    }
    Ok(())
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = WorkerConfig::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force)?;
            println!("Configuration written to {}", written.display());
        }
        ConfigSubcommand::Validate { config } => {
            WorkerConfig::load(config.as_deref())?;
            println!("Configuration is valid.");
        }
    }
    Ok(())
}
