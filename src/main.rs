//! CLI entry point for fwdl.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::Parser;
use fwdl_core::download::{
    AuthorizationProvider, BearerToken, DEFAULT_RETRY_BUDGET, DownloadRequest, MtlsCredential,
    ProgressHook, ProgressLog, Session, SessionConfig, StaticHeaders, TransferOutcome, cancel,
    url_encode,
};
use tracing::{debug, info, warn};

mod app_config;
mod cli;
mod output;

use app_config::FileConfig;
use cli::{Args, CheckArgs, Command, FetchArgs, HeadArgs, PutArgs, RpcArgs, TlsArgs};
use output::{BarProgress, FetchSummary, HookSet};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    let loaded = app_config::load_default_file_config()?;
    let file_config = loaded.config.clone().unwrap_or_default();

    // Priority: RUST_LOG env var > CLI flags > config verbosity > default (info)
    let verbose_level = if args.quiet {
        None
    } else if args.verbose > 0 {
        Some(args.verbose)
    } else {
        file_config
            .verbosity
            .map_or(Some(0), app_config::VerbositySetting::verbose_level)
    };
    let default_level = match verbose_level {
        None => "error",
        Some(0) => "info",
        Some(1) => "debug",
        Some(_) => "trace",
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(verbose = args.verbose, quiet = args.quiet, "CLI arguments parsed");
    if loaded.loaded_from_file {
        debug!(path = ?loaded.path, "config file loaded");
    }

    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling transfers");
            cancel::set_cancelled(true);
        }
    });

    let session_config = file_config.session_config();
    let show_progress = verbose_level.is_some();
    match args.command {
        Command::Fetch(fetch) => run_fetch(fetch, &file_config, session_config, show_progress).await,
        Command::Head(head) => run_head(head, session_config).await,
        Command::Put(put) => run_put(put, session_config).await,
        Command::Rpc(rpc) => run_rpc(rpc, session_config).await,
        Command::Check(check) => run_check(check, session_config).await,
        Command::Encode(encode) => {
            println!("{}", url_encode(&encode.text));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn credential(tls: &TlsArgs) -> Option<MtlsCredential> {
    tls.cert
        .as_ref()
        .map(|path| MtlsCredential::new(path, &tls.cert_type, tls.key_pass.clone()))
}

fn unix_timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs().to_string())
        .unwrap_or_default()
}

fn write_body(outcome: &TransferOutcome) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    if let Some(body) = &outcome.body {
        stdout.write_all(body).context("Failed to write response to stdout")?;
    }
    stdout.flush().context("Failed to flush stdout")
}

async fn run_fetch(
    args: FetchArgs,
    file_config: &FileConfig,
    session_config: SessionConfig,
    show_progress: bool,
) -> Result<ExitCode> {
    let mut builder = DownloadRequest::builder(&args.url)
        .retry_budget(
            args.retries
                .or(file_config.retry_budget)
                .unwrap_or(DEFAULT_RETRY_BUDGET),
        )
        .verify_peer(!args.tls.insecure)
        .capture_headers(args.dump_headers.is_some());
    builder = match &args.output {
        Some(path) => builder.file(path),
        None => builder.memory(),
    };
    if let Some(offset) = args.resume_from {
        builder = builder.resume_from(offset);
    }
    if let Some(rate) = args.max_rate.or(file_config.max_rate) {
        builder = builder.max_rate(rate);
    }
    if let Some(header) = &args.header {
        builder = builder.header(header);
    }
    if let Some(body) = &args.data {
        builder = builder.body(body);
    }
    if let Some(hash) = &args.hash {
        builder = builder.hash(hash, unix_timestamp());
    }
    if let Some(credential) = credential(&args.tls) {
        builder = builder.credential(credential);
    }
    let request = builder.build()?;

    let mut session = Session::open_with_config(session_config)?;
    let bar = Arc::new(BarProgress::new(show_progress && args.output.is_some()));
    let mut hooks: Vec<Arc<dyn ProgressHook>> = vec![Arc::clone(&bar) as Arc<dyn ProgressHook>];
    if let Some(path) = &args.progress_file {
        let log = ProgressLog::create(path)
            .await
            .with_context(|| format!("Failed to create progress file '{}'", path.display()))?;
        hooks.push(Arc::new(log));
    }
    session.set_progress_hook(Arc::new(HookSet(hooks)));

    let provider: Option<Box<dyn AuthorizationProvider>> = if !args.is_authenticated() {
        None
    } else if let Some(token) = &args.bearer {
        Some(Box::new(BearerToken(token.clone())))
    } else {
        Some(Box::new(StaticHeaders(args.auth_headers.clone())))
    };
    let result = match &provider {
        Some(provider) => {
            session
                .download_authenticated(&request, &**provider)
                .await
        }
        None => session.download(&request).await,
    };
    bar.finish();
    let outcome = result.with_context(|| format!("Failed to fetch {}", args.url))?;

    if let (Some(path), Some(headers)) = (&args.dump_headers, &outcome.headers) {
        std::fs::write(path, headers)
            .with_context(|| format!("Failed to write headers to '{}'", path.display()))?;
    }

    if args.output.is_some() {
        let summary = FetchSummary {
            url: args.url.clone(),
            http_status: outcome.http_status,
            bytes_received: outcome.bytes_received,
            bytes_transferred: session.bytes_transferred(),
            path: args.output.clone(),
        };
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        write_body(&outcome)?;
    }
    session.close();

    if args.fail && outcome.http_status >= 400 {
        warn!(http_status = outcome.http_status, "server returned an error status");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_head(args: HeadArgs, session_config: SessionConfig) -> Result<ExitCode> {
    let session = Session::open_with_config(session_config)?;
    let credential = credential(&args.tls);
    let status = session
        .fetch_header_info(&args.url, credential.as_ref(), &args.output)
        .await
        .with_context(|| format!("Failed to fetch headers for {}", args.url))?;
    println!("{status}");
    Ok(ExitCode::SUCCESS)
}

fn memory_request(url: &str, tls: &TlsArgs, body: Option<&str>) -> Result<DownloadRequest> {
    let mut builder = DownloadRequest::builder(url)
        .memory()
        .verify_peer(!tls.insecure);
    if let Some(body) = body {
        builder = builder.body(body);
    }
    if let Some(credential) = credential(tls) {
        builder = builder.credential(credential);
    }
    Ok(builder.build()?)
}

async fn run_put(args: PutArgs, session_config: SessionConfig) -> Result<ExitCode> {
    let request = memory_request(&args.url, &args.tls, None)?;
    let mut session = Session::open_with_config(session_config)?;
    let outcome = session
        .put_request(&request, args.token.as_deref())
        .await
        .with_context(|| format!("PUT {} failed", args.url))?;
    info!(http_status = outcome.http_status, "PUT complete");
    write_body(&outcome)?;
    Ok(ExitCode::SUCCESS)
}

async fn run_rpc(args: RpcArgs, session_config: SessionConfig) -> Result<ExitCode> {
    let request = memory_request(&args.url, &args.tls, Some(&args.data))?;
    let mut session = Session::open_with_config(session_config)?;
    let outcome = session
        .json_rpc(&request, args.token.as_deref())
        .await
        .with_context(|| format!("JSON-RPC call to {} failed", args.url))?;
    info!(http_status = outcome.http_status, "JSON-RPC call complete");
    write_body(&outcome)?;
    Ok(ExitCode::SUCCESS)
}

async fn run_check(args: CheckArgs, session_config: SessionConfig) -> Result<ExitCode> {
    let session = Session::open_with_config(session_config)?;
    let online = session
        .check_connectivity(args.url.as_deref(), Duration::from_millis(args.timeout_ms))
        .await;
    if online {
        println!("online");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("offline");
        Ok(ExitCode::FAILURE)
    }
}
