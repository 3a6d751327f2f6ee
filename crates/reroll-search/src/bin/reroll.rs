//! reroll: command-line discriminator search.
//!
//! `search` runs the loop in-process against Apex Connect. `remote` drives a
//! running reroll-api server through [`RemoteSearch`], which re-issues the
//! search if the connection drops before a terminal event.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use reroll_core::{ProgressEvent, SearchRequest};
use reroll_gateway::ApexGateway;
use reroll_search::{
    encode_line, RemoteSearch, RemoteSearchRequest, SearchConfig, SearchOrchestrator,
};

#[derive(Parser)]
#[command(name = "reroll")]
#[command(author, version, about = "Reroll a display name until its discriminator matches")]
#[command(propagate_version = true)]
struct Cli {
    /// Print raw NDJSON events instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct SearchArgs {
    /// Comma-separated wanted discriminators, e.g. "1234, 0420"
    #[arg(short, long, default_value = "")]
    discriminators: String,

    /// Also accept any repeated-digit discriminator (0000..9999)
    #[arg(short = 'r', long)]
    any_repeated_digit: bool,

    /// Bearer token (takes precedence over email/password)
    #[arg(short, long, env = "REROLL_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Account email
    #[arg(short, long, env = "REROLL_EMAIL")]
    email: Option<String>,

    /// Account password
    #[arg(short, long, env = "REROLL_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Base interval between attempts in milliseconds
    #[arg(short, long)]
    interval_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a search in-process against the account service
    Search(SearchArgs),

    /// Run a search on a reroll-api server and follow its progress
    Remote {
        /// Server base URL
        #[arg(short, long, default_value = "http://localhost:3000")]
        server: String,

        /// Fresh searches to issue after the connection drops
        #[arg(long, default_value_t = 3)]
        max_reconnects: u32,

        /// Delay before reconnecting, in milliseconds
        #[arg(long, default_value_t = 2000)]
        reconnect_delay_ms: u64,

        #[command(flatten)]
        search: SearchArgs,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,reroll_search=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the search succeeded.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        Commands::Search(args) => cmd_search(args, cli.json).await,
        Commands::Remote {
            server,
            max_reconnects,
            reconnect_delay_ms,
            search,
        } => {
            cmd_remote(
                &server,
                max_reconnects,
                Duration::from_millis(reconnect_delay_ms),
                search,
                cli.json,
            )
            .await
        }
    }
}

async fn cmd_search(args: SearchArgs, json: bool) -> anyhow::Result<bool> {
    let mut request = SearchRequest::parse(
        args.email.as_deref(),
        args.password.as_deref(),
        args.token.as_deref(),
        &args.discriminators,
        args.any_repeated_digit,
    )?;
    if let Some(ms) = args.interval_ms {
        request = request.with_base_interval_ms(ms);
    }

    let gateway = Arc::new(ApexGateway::from_env()?);
    let orchestrator = SearchOrchestrator::new(gateway, SearchConfig::from_env())?;
    let mut stream = orchestrator.start_search(request)?;

    info!(search_id = %stream.search_id(), "Search started");

    let cancel = stream.cancel_handle();
    let mut terminal = None;
    loop {
        tokio::select! {
            event = stream.next() => match event {
                Some(event) => {
                    print_event(&event, json)?;
                    if event.is_terminal() {
                        terminal = Some(event);
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                warn!("Interrupted, cancelling search");
                cancel.cancel();
            }
        }
    }

    Ok(matches!(terminal, Some(ProgressEvent::Success { .. })))
}

async fn cmd_remote(
    server: &str,
    max_reconnects: u32,
    reconnect_delay: Duration,
    args: SearchArgs,
    json: bool,
) -> anyhow::Result<bool> {
    let request = RemoteSearchRequest {
        email: args.email,
        password: args.password,
        token: args.token,
        discriminators: args.discriminators,
        match_any_repeated_digit: args.any_repeated_digit,
        interval_ms: args.interval_ms,
    };
    let remote = RemoteSearch::new(server, max_reconnects, reconnect_delay);

    let terminal = remote
        .run(&request, |event| {
            if let Err(e) = print_event(event, json) {
                warn!(error = %e, "Failed to print event");
            }
        })
        .await
        .with_context(|| format!("Remote search on {} failed", server))?;

    Ok(matches!(terminal, ProgressEvent::Success { .. }))
}

fn print_event(event: &ProgressEvent, json: bool) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    if json {
        out.write_all(encode_line(event)?.as_bytes())?;
        return Ok(());
    }

    match event {
        ProgressEvent::Status {
            attempt,
            phase,
            current_discriminator,
        } => match current_discriminator {
            Some(d) => writeln!(out, "[{}] {:?} #{}", attempt, phase, d)?,
            None => writeln!(out, "[{}] {:?}", attempt, phase)?,
        },
        ProgressEvent::Success {
            display_name,
            attempts,
            duration_ms,
            ..
        } => writeln!(
            out,
            "Success: {} after {} attempts ({:.1}s)",
            display_name,
            attempts,
            *duration_ms as f64 / 1000.0
        )?,
        ProgressEvent::Error {
            message,
            attempts,
            fatal,
            retry_in_ms,
            ..
        } => match (fatal, retry_in_ms) {
            (true, _) => writeln!(out, "Failed after {} attempts: {}", attempts, message)?,
            (false, Some(ms)) => writeln!(out, "[{}] {} (retrying in {}ms)", attempts, message, ms)?,
            (false, None) => writeln!(out, "[{}] {}", attempts, message)?,
        },
    }
    Ok(())
}
