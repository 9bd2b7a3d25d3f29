use std::future::Future;
use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::agent::{AgentSession, AppContext, StreamDispatcher};
use crate::cli::theme::ThemeToken;
use crate::sales::SalesDatabase;
use crate::service::{AgentService, EventStream, ServiceResult};

pub const PROMPT: &str = "Enter your query (type exit to finish): ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    Exit,
    Skip,
    Submit(String),
}

pub fn classify_input(line: &str) -> InputAction {
    let line = line.trim();
    if line.eq_ignore_ascii_case("exit") {
        InputAction::Exit
    } else if line.is_empty() {
        InputAction::Skip
    } else {
        InputAction::Submit(line.to_string())
    }
}

/// Reads queries until `exit`, end of input or `interrupt` resolving at the
/// prompt. Per-turn failures are printed and the loop carries on; only
/// terminal write errors end it early.
pub async fn run_repl<S, D, R, I, W>(
    ctx: &AppContext<S, D>,
    session: &AgentSession,
    input: R,
    interrupt: I,
    out: &mut W,
) -> Result<()>
where
    S: AgentService,
    D: SalesDatabase,
    R: AsyncBufRead + Unpin,
    I: Future,
    W: Write,
{
    let mut lines = input.lines();
    tokio::pin!(interrupt);
    loop {
        write!(out, "\n{}", ctx.theme.paint(ThemeToken::Prompt, PROMPT))?;
        out.flush()?;

        let line = tokio::select! {
            biased;
            _ = &mut interrupt => {
                tracing::info!("interrupted at the prompt");
                writeln!(out)?;
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            writeln!(out)?;
            break;
        };

        match classify_input(&line) {
            InputAction::Exit => break,
            InputAction::Skip => continue,
            InputAction::Submit(query) => handle_query(ctx, session, &query, out).await?,
        }
    }
    Ok(())
}

async fn handle_query<S, D, W>(
    ctx: &AppContext<S, D>,
    session: &AgentSession,
    query: &str,
    out: &mut W,
) -> Result<()>
where
    S: AgentService,
    D: SalesDatabase,
    W: Write,
{
    if let Some(trace) = &ctx.trace {
        trace.log_user_input(query);
    }

    let events = match start_turn(ctx, session, query).await {
        Ok(events) => events,
        Err(err) => {
            tracing::error!(error = %err, "failed to post message");
            let message = format!("An error occurred posting the message: {err}");
            writeln!(out, "{}", ctx.theme.paint(ThemeToken::Error, &message))?;
            return Ok(());
        }
    };

    let outcome = StreamDispatcher::new(ctx, &session.thread.id)
        .run(events, out)
        .await?;
    tracing::debug!(
        state = ?outcome.state,
        tool_calls = outcome.tool_calls,
        chars = outcome.text.len(),
        "turn finished"
    );
    Ok(())
}

async fn start_turn<S: AgentService, D>(
    ctx: &AppContext<S, D>,
    session: &AgentSession,
    query: &str,
) -> ServiceResult<EventStream> {
    let thread_id = &session.thread.id;
    ctx.service.create_message(thread_id, query).await?;
    ctx.service
        .stream_run(thread_id, &ctx.settings.run_request(&session.agent.id))
        .await
}
