use std::io::Write;

use anyhow::Result;
use futures::StreamExt;
use tokio::fs;

use super::AppContext;
use super::tools::execute_call;
use crate::cli::theme::ThemeToken;
use crate::sales::SalesDatabase;
use crate::service::types::{ThreadMessage, ThreadRun};
use crate::service::{AgentService, EventStream, RunEvent, ToolOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Streaming,
    AwaitingToolOutput,
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub state: DispatchState,
    pub text: String,
    pub tool_calls: usize,
    pub error: Option<String>,
}

/// Drains the event stream of one run: prints text as it arrives, answers
/// tool-call requests and stops on the first terminal event.
pub struct StreamDispatcher<'a, S, D> {
    ctx: &'a AppContext<S, D>,
    thread_id: &'a str,
    state: DispatchState,
    text: String,
    tool_calls: usize,
    error: Option<String>,
    line_open: bool,
}

impl<'a, S, D> StreamDispatcher<'a, S, D>
where
    S: AgentService,
    D: SalesDatabase,
{
    pub fn new(ctx: &'a AppContext<S, D>, thread_id: &'a str) -> Self {
        Self {
            ctx,
            thread_id,
            state: DispatchState::Streaming,
            text: String::new(),
            tool_calls: 0,
            error: None,
            line_open: false,
        }
    }

    pub async fn run<W: Write>(
        mut self,
        mut events: EventStream,
        out: &mut W,
    ) -> Result<TurnOutcome> {
        while self.state == DispatchState::Streaming {
            let event = match events.next().await {
                Some(Ok(event)) => event,
                Some(Err(err)) => {
                    self.fail(err.to_string(), out)?;
                    break;
                }
                None => {
                    let message = "the event stream ended before the run finished";
                    self.fail(message.to_string(), out)?;
                    break;
                }
            };

            match event {
                RunEvent::MessageDelta(delta) => {
                    let chunk = delta.text();
                    if !chunk.is_empty() {
                        let painted = self.ctx.theme.paint(ThemeToken::AssistantText, &chunk);
                        write!(out, "{painted}")?;
                        out.flush()?;
                        self.text.push_str(&chunk);
                        self.line_open = true;
                    }
                }
                RunEvent::MessageCompleted(message) => {
                    self.save_generated_files(&message, out).await?;
                }
                RunEvent::RequiresAction(run) => {
                    self.state = DispatchState::AwaitingToolOutput;
                    match self.answer_tool_calls(&run, out).await? {
                        Ok(continuation) => {
                            // Tool results resume the run on the submission's own stream.
                            events = Box::pin(continuation.chain(events));
                            self.state = DispatchState::Streaming;
                        }
                        Err(message) => self.fail(message, out)?,
                    }
                }
                RunEvent::RunCompleted(run) => {
                    tracing::debug!(run_id = %run.id, "run completed");
                    self.state = DispatchState::Done;
                }
                RunEvent::RunFailed(run) => self.fail(run.failure_reason(), out)?,
                RunEvent::Error(message) => self.fail(message, out)?,
                RunEvent::Done => {
                    let message = "the event stream closed before the run finished";
                    self.fail(message.to_string(), out)?;
                }
                RunEvent::Other(kind) => tracing::trace!(event = %kind, "ignoring run event"),
            }
        }

        self.end_line(out)?;
        if let Some(trace) = self.ctx.trace.as_ref().filter(|_| !self.text.is_empty()) {
            trace.log_assistant_text(&self.text);
        }

        Ok(TurnOutcome {
            state: self.state,
            text: self.text,
            tool_calls: self.tool_calls,
            error: self.error,
        })
    }

    /// Runs every requested call and submits the outputs. The inner `Err`
    /// carries a message for a failed submission.
    async fn answer_tool_calls<W: Write>(
        &mut self,
        run: &ThreadRun,
        out: &mut W,
    ) -> Result<std::result::Result<EventStream, String>> {
        let calls = run.requested_tool_calls();
        let mut outputs: Vec<ToolOutput> = Vec::with_capacity(calls.len());
        self.end_line(out)?;
        for call in calls {
            let name = call
                .function
                .as_ref()
                .map_or("<unknown>", |function| function.name.as_str());
            writeln!(
                out,
                "{}",
                self.ctx
                    .theme
                    .paint(ThemeToken::ToolNotice, &format!("[calling {name}]"))
            )?;
            if let Some(trace) = &self.ctx.trace {
                let arguments = call
                    .function
                    .as_ref()
                    .map_or("", |function| function.arguments.as_str());
                trace.log_tool_call(name, arguments);
            }

            let output = execute_call(&self.ctx.sales, call).await;
            if let Some(trace) = &self.ctx.trace {
                trace.log_tool_output(&output.tool_call_id, &output.output);
            }
            outputs.push(output);
        }
        self.tool_calls += outputs.len();

        let submitted = self
            .ctx
            .service
            .submit_tool_outputs(self.thread_id, &run.id, &outputs)
            .await;
        Ok(submitted.map_err(|err| format!("failed to submit tool outputs: {err}")))
    }

    async fn save_generated_files<W: Write>(
        &mut self,
        message: &ThreadMessage,
        out: &mut W,
    ) -> Result<()> {
        let files = message.generated_files();
        if files.is_empty() {
            return Ok(());
        }

        if let Err(err) = fs::create_dir_all(&self.ctx.files_dir).await {
            tracing::error!(
                dir = %self.ctx.files_dir.display(),
                error = %err,
                "failed to create files directory"
            );
            return Ok(());
        }

        for file in files {
            let bytes = match self.ctx.service.download_file(&file.file_id).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::error!(
                        file_id = %file.file_id,
                        error = %err,
                        "failed to download generated file"
                    );
                    continue;
                }
            };
            let path = self.ctx.files_dir.join(&file.file_name);
            match fs::write(&path, bytes).await {
                Ok(()) => {
                    self.end_line(out)?;
                    let notice = format!("File saved to {}", path.display());
                    writeln!(out, "{}", self.ctx.theme.paint(ThemeToken::Info, &notice))?;
                }
                Err(err) => {
                    tracing::error!(
                        path = %path.display(),
                        error = %err,
                        "failed to save generated file"
                    );
                }
            }
        }
        Ok(())
    }

    fn end_line<W: Write>(&mut self, out: &mut W) -> Result<()> {
        if self.line_open {
            writeln!(out)?;
            self.line_open = false;
        }
        Ok(())
    }

    fn fail<W: Write>(&mut self, message: String, out: &mut W) -> Result<()> {
        self.end_line(out)?;
        writeln!(
            out,
            "{}",
            self.ctx
                .theme
                .paint(ThemeToken::Error, &format!("Run failed: {message}"))
        )?;
        tracing::error!(error = %message, "run failed");
        if let Some(trace) = &self.ctx.trace {
            trace.log_note("run.err", &message);
        }
        self.state = DispatchState::Error;
        self.error = Some(message);
        Ok(())
    }
}
