pub mod agent;
pub mod cli;
pub mod config;
pub mod http;
pub mod logging;
pub mod sales;
pub mod service;
pub mod trace;

use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use agent::{AppContext, cleanup, initialize};
use anyhow::Result;
use cli::theme::{Theme, ThemeToken};
use cli::{CliArgs, run_repl};
use config::AppConfig;
use http::{HttpClient, HttpDebugConfig};
use sales::SalesData;
use service::AgentsClient;
use tokio::io::BufReader;
use trace::SessionTrace;

const INITIALIZATION_FAILED: &str =
    "Initialization failed. Check logs and configuration, then try again.";

pub async fn run(_args: CliArgs) -> Result<()> {
    let config = AppConfig::load()?;
    let theme = Theme::detect();
    let interrupt = tokio::spawn(wait_for_interrupt());
    let mut stdout = io::stdout();

    let session_id = generate_session_id();
    let trace = match SessionTrace::create(&session_id) {
        Ok(trace) => {
            tracing::info!(path = %trace.file_path().display(), "writing session trace");
            Some(trace)
        }
        Err(err) => {
            tracing::warn!(error = %err, "session trace disabled");
            None
        }
    };

    let mut http = HttpClient::new(
        reqwest::Client::new(),
        HttpDebugConfig::from_flag(config.http_debug),
    )
    .with_bearer_token(config.access_token.clone());
    if let Some(trace) = &trace {
        http = http.with_trace(trace.clone());
    }
    let mut service = AgentsClient::new(http, &config.project_endpoint, &config.api_version);
    if let Some(trace) = &trace {
        service = service.with_trace(trace.clone());
    }

    let sales = match SalesData::connect(&config.database_file).await {
        Ok(sales) => sales,
        Err(err) => {
            report_initialization_failure(theme, &mut stdout)?;
            return Err(err.into());
        }
    };

    let mut ctx = AppContext::new(service, sales, &config, theme);
    ctx.trace = trace;

    let session = match initialize(&ctx, &mut stdout).await {
        Ok(session) => session,
        Err(err) => {
            report_initialization_failure(theme, &mut stdout)?;
            ctx.sales.close().await;
            return Err(err);
        }
    };

    let stdin = BufReader::new(tokio::io::stdin());
    let result = run_repl(&ctx, &session, stdin, interrupt, &mut stdout).await;

    cleanup(&ctx, &session).await;
    ctx.sales.close().await;
    result
}

/// Resolves on the first Ctrl-C. The handler stays installed for the whole
/// session, so an interrupt during initialization or a turn is acted on at
/// the next prompt.
async fn wait_for_interrupt() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl-C"),
        Err(err) => {
            tracing::warn!(error = %err, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}

fn report_initialization_failure<W: Write>(theme: Theme, out: &mut W) -> Result<()> {
    writeln!(out, "{}", theme.paint(ThemeToken::Error, INITIALIZATION_FAILED))?;
    Ok(())
}

fn generate_session_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis());
    format!("{millis:x}-{:x}", std::process::id())
}
