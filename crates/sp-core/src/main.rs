//! Social Pulse Core - Event Stream Analysis
//!
//! The main entry point for sp-core, handling:
//! - Serving `/analysis` over a live event feed
//! - One-shot analysis of a feed, a file or stdin
//! - Configuration checks

use clap::{Args, Parser, Subcommand};
use sp_common::error::format_error_human;
use sp_common::{Error, Result};
use sp_core::analysis::{AnalysisReport, AnalysisRequest};
use sp_core::config::{load_config, ConfigOptions, ConfigSource, ResolvedConfig};
use sp_core::exit_codes::ExitCode;
use sp_core::log_event;
use sp_core::logging::{
    event_names, generate_run_id, init_logging, LogConfig, LogContext, LogFormat, LogLevel, Stage,
};
use sp_core::server::AnalysisServer;
use sp_core::session::EventStream;
use sp_core::transport::{open_input, open_remote, FeedReader};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Social Pulse Core - Percentile analysis of a live social event feed
#[derive(Parser)]
#[command(name = "sp-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Config file (overrides SOCIAL_PULSE_CONFIG and the XDG location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format on stderr (human, jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve GET /analysis over the event feed until killed
    Serve(ServeArgs),

    /// Gather one window and print the report
    Analyze(AnalyzeArgs),

    /// Resolve and validate configuration
    Check,

    /// Print version information
    Version,
}

// ============================================================================
// Command argument structs
// ============================================================================

/// Where events are read from. Defaults to the configured feed URL.
#[derive(Args, Debug)]
struct FeedArgs {
    /// Event feed URL
    #[arg(long, conflicts_with = "input")]
    stream_url: Option<String>,

    /// Read events from a file instead of the feed (`-` for stdin)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Subscriber buffer size
    #[arg(long)]
    buffer: Option<usize>,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Listen address
    #[arg(long)]
    addr: Option<String>,

    #[command(flatten)]
    feed: FeedArgs,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Dimension to analyze (likes, comments, favorites, retweets)
    #[arg(long, short = 'd')]
    dimension: String,

    /// Window length, e.g. 30s or 1m30s (defaults to the configured window)
    #[arg(long, short = 't')]
    duration: Option<String>,

    #[command(flatten)]
    feed: FeedArgs,
}

fn main() {
    let cli = Cli::parse();

    let cli_level = if cli.global.quiet {
        Some(LogLevel::Error)
    } else if cli.global.verbose > 0 {
        Some(cli.global.log_level.unwrap_or_default().louder(cli.global.verbose))
    } else {
        cli.global.log_level
    };
    init_logging(&LogConfig::from_env(cli_level, cli.global.log_format));

    let ctx = LogContext::new(generate_run_id());
    let started = Instant::now();

    let result = match &cli.command {
        Commands::Serve(args) => run_serve(&cli.global, &ctx, args),
        Commands::Analyze(args) => run_analyze(&cli.global, &ctx, args),
        Commands::Check => run_check(&cli.global, &ctx),
        Commands::Version => {
            print_version();
            Ok(ExitCode::Clean)
        }
    };

    let exit_code = result.unwrap_or_else(|e| output_error(&cli.global, &ctx, &e));
    log_event!(
        ctx,
        DEBUG,
        event_names::RUN_FINISHED,
        Stage::Init,
        "run finished",
        exit_code = exit_code.as_i32(),
        elapsed_ms = started.elapsed().as_millis() as u64
    );

    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Command implementations
// ============================================================================

fn resolve_config(global: &GlobalOpts, ctx: &LogContext) -> Result<ResolvedConfig> {
    let options = ConfigOptions::from_env(global.config.clone());
    let resolved = load_config(&options).map_err(|e| {
        log_event!(
            ctx,
            ERROR,
            event_names::CONFIG_ERROR,
            Stage::Init,
            "configuration rejected",
            error = %e
        );
        Error::from(e)
    })?;

    match &resolved.source {
        ConfigSource::Defaults => log_event!(
            ctx,
            DEBUG,
            event_names::CONFIG_DEFAULT_USED,
            Stage::Init,
            "no config file, using defaults"
        ),
        ConfigSource::Explicit(path) | ConfigSource::Env(path) | ConfigSource::Xdg(path) => {
            log_event!(
                ctx,
                DEBUG,
                event_names::CONFIG_LOADED,
                Stage::Init,
                "config loaded",
                path = %path.display()
            )
        }
    }
    Ok(resolved)
}

/// Apply feed flags to `resolved` and open the feed they select.
fn open_feed(feed: &FeedArgs, resolved: &mut ResolvedConfig) -> Result<FeedReader> {
    if let Some(url) = &feed.stream_url {
        resolved.config.stream_url = url.clone();
    }
    if let Some(buffer) = feed.buffer {
        resolved.config.buffer_capacity = buffer;
    }
    resolved.config.validate()?;

    match &feed.input {
        Some(path) => open_input(path),
        None => open_remote(&resolved.config.stream_url),
    }
}

fn run_serve(global: &GlobalOpts, ctx: &LogContext, args: &ServeArgs) -> Result<ExitCode> {
    let mut resolved = resolve_config(global, ctx)?;
    if let Some(addr) = &args.addr {
        resolved.config.addr = addr.clone();
    }
    let reader = open_feed(&args.feed, &mut resolved)?;

    log_event!(
        ctx,
        INFO,
        event_names::RUN_STARTED,
        Stage::Serve,
        "starting analysis server",
        addr = %resolved.config.addr,
        buffer_capacity = resolved.config.buffer_capacity
    );

    let stream = Arc::new(
        EventStream::new(resolved.config.buffer_capacity)
            .with_max_line_bytes(resolved.config.max_line_bytes),
    );
    stream.attach(reader)?;
    let server = AnalysisServer::start(&resolved.config.addr, Arc::clone(&stream))?;
    server.wait();

    Err(Error::Server("accept loop exited".to_string()))
}

fn run_analyze(global: &GlobalOpts, ctx: &LogContext, args: &AnalyzeArgs) -> Result<ExitCode> {
    let mut resolved = resolve_config(global, ctx)?;
    let default_duration = format!("{}s", resolved.config.default_duration_secs);
    let request = AnalysisRequest::new(
        &args.dimension,
        args.duration.as_deref().unwrap_or(&default_duration),
    )?;
    let reader = open_feed(&args.feed, &mut resolved)?;

    log_event!(
        ctx,
        INFO,
        event_names::RUN_STARTED,
        Stage::Gather,
        "starting analysis",
        dimension = %request.dimension,
        duration_ms = request.duration.as_millis() as u64
    );

    // Subscribe before attaching so a short local feed is seen in full.
    let stream = EventStream::new(resolved.config.buffer_capacity)
        .with_max_line_bytes(resolved.config.max_line_bytes);
    let points = stream.listen_to(request.dimension, request.duration);
    stream.attach(reader)?;
    let report = AnalysisReport::new(request.dimension, sp_core::aggregate::collect(points));

    println!("{}", report.to_json_pretty()?);

    if let Some(err) = stream.termination() {
        log_event!(
            ctx,
            WARN,
            event_names::STREAM_FAILED,
            Stage::Gather,
            "report covers the events read before the feed failed",
            error = %err
        );
        return Err(err);
    }
    Ok(ExitCode::Clean)
}

fn run_check(global: &GlobalOpts, ctx: &LogContext) -> Result<ExitCode> {
    let resolved = resolve_config(global, ctx)?;
    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(ExitCode::Clean)
}

fn output_error(global: &GlobalOpts, ctx: &LogContext, error: &Error) -> ExitCode {
    let exit_code = ExitCode::for_error(error);
    if exit_code.is_internal_error() {
        log_event!(
            ctx,
            ERROR,
            event_names::INTERNAL_ERROR,
            Stage::Init,
            "command failed",
            error = %error,
            code = error.code()
        );
    }

    let use_color = !global.no_color && std::io::stderr().is_terminal();
    eprintln!("{}", format_error_human(error, use_color));
    exit_code
}

fn print_version() {
    let version_info = serde_json::json!({
        "sp_core_version": env!("CARGO_PKG_VERSION"),
        "rust_version": env!("CARGO_PKG_RUST_VERSION"),
    });
    match serde_json::to_string_pretty(&version_info) {
        Ok(json) => println!("{}", json),
        Err(_) => println!("sp-core {}", env!("CARGO_PKG_VERSION")),
    }
}
