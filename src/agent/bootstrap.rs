use std::collections::BTreeMap;
use std::io::Write;

use anyhow::{Context, Result, bail};

use super::AppContext;
use super::instructions;
use super::tools::{Toolset, fetch_sales_declaration};
use crate::cli::theme::ThemeToken;
use crate::sales::SalesDatabase;
use crate::service::{Agent, AgentService, CreateAgentRequest, ServiceError, Thread, VectorStore};

/// Remote resources created at startup and torn down on exit.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSession {
    pub agent: Agent,
    pub thread: Thread,
    pub vector_store: VectorStore,
}

pub async fn initialize<S, D, W>(ctx: &AppContext<S, D>, out: &mut W) -> Result<AgentSession>
where
    S: AgentService,
    D: SalesDatabase,
    W: Write,
{
    let mut toolset = Toolset::new();
    toolset
        .add_function(fetch_sales_declaration())
        .add_code_interpreter();

    let vector_store = build_vector_store(ctx).await?;
    print_vector_store(ctx, &vector_store, out)?;
    toolset.add_file_search(&vector_store.id);

    let schema = ctx
        .sales
        .database_info()
        .await
        .context("Failed to read the sales database schema")?;
    let template = instructions::load_template(&ctx.instructions_file)?;
    let rendered = instructions::render(&template, &schema, instructions::today())?;

    let (tools, tool_resources) = toolset.into_parts();
    let request = CreateAgentRequest {
        model: ctx.settings.model.clone(),
        name: ctx.settings.agent_name.clone(),
        instructions: rendered,
        tools,
        tool_resources,
        temperature: ctx.settings.temperature,
        top_p: ctx.settings.top_p,
        metadata: BTreeMap::from([(
            "environment".to_string(),
            ctx.settings.environment.clone(),
        )]),
    };
    notice(ctx, out, "Creating agent...")?;
    let agent = ctx
        .service
        .create_agent(&request)
        .await
        .context("Failed to create the agent")?;
    tracing::info!(
        agent_id = %agent.id,
        name = agent.name.as_deref().unwrap_or("-"),
        model = agent.model.as_deref().unwrap_or("-"),
        "created agent"
    );
    notice(ctx, out, &format!("Created agent, ID: {}", agent.id))?;

    notice(ctx, out, "Creating thread...")?;
    let thread = match ctx.service.create_thread().await {
        Ok(thread) => thread,
        Err(err) => {
            rollback_agent(ctx, &agent).await;
            return Err(err).context("Failed to create the conversation thread");
        }
    };
    tracing::info!(thread_id = %thread.id, "created thread");
    notice(ctx, out, &format!("Created thread, ID: {}", thread.id))?;
    if let Some(trace) = &ctx.trace {
        trace.log_note(
            "session",
            &format!("agent={} thread={} vector_store={}", agent.id, thread.id, vector_store.id),
        );
    }

    Ok(AgentSession {
        agent,
        thread,
        vector_store,
    })
}

/// Deletes the thread and the agent. Failures are logged and never stop the
/// remaining step.
pub async fn cleanup<S: AgentService, D>(ctx: &AppContext<S, D>, session: &AgentSession) {
    if !ctx.service.capabilities().supports_delete {
        tracing::warn!(
            thread_id = %session.thread.id,
            agent_id = %session.agent.id,
            "service cannot delete resources; leaving them in place"
        );
        return;
    }

    match ctx.service.delete_thread(&session.thread.id).await {
        Ok(()) => tracing::info!(thread_id = %session.thread.id, "deleted thread"),
        Err(err) => {
            tracing::error!(thread_id = %session.thread.id, error = %err, "failed to delete thread")
        }
    }
    match ctx.service.delete_agent(&session.agent.id).await {
        Ok(()) => tracing::info!(agent_id = %session.agent.id, "deleted agent"),
        Err(err) => {
            tracing::error!(agent_id = %session.agent.id, error = %err, "failed to delete agent")
        }
    }
}

async fn build_vector_store<S: AgentService, D>(ctx: &AppContext<S, D>) -> Result<VectorStore> {
    let file = ctx
        .service
        .upload_file(&ctx.datasheet_file)
        .await
        .context("Failed to upload the product datasheet")?;
    tracing::info!(file_id = %file.id, "uploaded datasheet");

    let mut store = ctx
        .service
        .create_vector_store(&ctx.settings.vector_store_name, &[file.id])
        .await
        .context("Failed to create the vector store")?;

    let mut checks = 0;
    while store.is_indexing() {
        if checks >= ctx.settings.vector_store_poll_attempts {
            bail!(
                "Vector store {} was still indexing after {checks} status checks",
                store.id
            );
        }
        checks += 1;
        tokio::time::sleep(ctx.settings.vector_store_poll_interval).await;
        store = ctx
            .service
            .get_vector_store(&store.id)
            .await
            .context("Failed to check the vector store status")?;
    }

    if !store.is_ready() {
        return Err(ServiceError::VectorStoreNotReady {
            id: store.id,
            status: store.status,
        }
        .into());
    }
    Ok(store)
}

fn print_vector_store<S, D, W: Write>(
    ctx: &AppContext<S, D>,
    store: &VectorStore,
    out: &mut W,
) -> Result<()> {
    let lines = [
        format!("Vector store ID: {}", store.id),
        format!("Vector store name: {}", store.name.as_deref().unwrap_or("-")),
        format!("Vector store status: {}", store.status),
        format!("Vector store file count: {}", store.total_files()),
    ];
    for line in lines {
        notice(ctx, out, &line)?;
    }
    Ok(())
}

fn notice<S, D, W: Write>(ctx: &AppContext<S, D>, out: &mut W, line: &str) -> Result<()> {
    writeln!(out, "{}", ctx.theme.paint(ThemeToken::Info, line))?;
    Ok(())
}

async fn rollback_agent<S: AgentService, D>(ctx: &AppContext<S, D>, agent: &Agent) {
    if !ctx.service.capabilities().supports_delete {
        tracing::warn!(
            agent_id = %agent.id,
            "cannot roll back agent; service does not support deletion"
        );
        return;
    }
    if let Err(err) = ctx.service.delete_agent(&agent.id).await {
        tracing::error!(agent_id = %agent.id, error = %err, "failed to roll back agent");
    }
}

#[cfg(test)]
mod tests {
    use super::{cleanup, initialize};
    use crate::agent::test_support::{FakeService, test_context};
    use crate::service::types::ToolDefinition;
    use serde_json::json;
    use std::fs;
    use std::path::Path;

    const TEMPLATE: &str = "Schema:\n{database_schema_string}\nToday: {current_date}";

    fn write_template(root: &Path) {
        fs::write(root.join("instructions.txt"), TEMPLATE).expect("write template");
    }

    #[tokio::test]
    async fn initialize_builds_agent_and_thread_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_template(dir.path());
        let service = FakeService::default();
        service
            .vector_store_statuses
            .lock()
            .expect("lock")
            .extend(["in_progress".to_string(), "completed".to_string()]);
        let ctx = test_context(service, dir.path());
        let mut out = Vec::new();

        let session = initialize(&ctx, &mut out).await.expect("initialize");

        assert_eq!(session.agent.id, "asst_1");
        assert_eq!(session.thread.id, "thread_1");
        assert_eq!(session.vector_store.id, "vs_1");

        let calls = ctx.service.calls();
        assert_eq!(calls.len(), 5, "unexpected calls: {calls:?}");
        assert!(calls[0].starts_with("upload_file "));
        assert!(calls[0].ends_with("datasheet.pdf"));
        assert_eq!(
            calls[1],
            "create_vector_store Contoso Product Information Vector Store file_1"
        );
        assert_eq!(calls[2..], ["get_vector_store vs_1", "create_agent", "create_thread"]);

        let requests = ctx.service.created_agents.lock().expect("lock");
        let request = &requests[0];
        assert_eq!(request.name, "Contoso Sales AI Agent");
        assert_eq!(request.model.as_deref(), Some("gpt-4o"));
        assert_eq!(request.temperature, 0.1);
        assert_eq!(request.top_p, 0.1);
        assert_eq!(request.metadata.get("environment").map(String::as_str), Some("local"));
        assert!(matches!(request.tools[0], ToolDefinition::Function { .. }));
        assert_eq!(request.tools[1], ToolDefinition::CodeInterpreter);
        assert_eq!(request.tools[2], ToolDefinition::FileSearch);
        assert_eq!(
            serde_json::to_value(&request.tool_resources).expect("serialize"),
            json!({"file_search": {"vector_store_ids": ["vs_1"]}})
        );
        assert!(request.instructions.contains("Table tbl Schema: Columns: id: INTEGER"));
        assert!(!request.instructions.contains("{database_schema_string}"));
        assert!(!request.instructions.contains("{current_date}"));

        let printed = String::from_utf8(out).expect("utf8");
        assert!(printed.contains("Vector store ID: vs_1"));
        assert!(printed.contains("Vector store status: completed"));
        assert!(printed.contains("Vector store file count: 1"));
        assert!(printed.ends_with(
            "Creating agent...\nCreated agent, ID: asst_1\n\
             Creating thread...\nCreated thread, ID: thread_1\n"
        ));
    }

    #[tokio::test]
    async fn initialize_stops_when_indexing_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_template(dir.path());
        let service = FakeService::default();
        service
            .vector_store_statuses
            .lock()
            .expect("lock")
            .push_back("expired".to_string());
        let ctx = test_context(service, dir.path());

        let err = initialize(&ctx, &mut Vec::new())
            .await
            .expect_err("expired store should fail");

        assert!(err.to_string().contains("status 'expired'"), "{err}");
        assert!(!ctx.service.calls().contains(&"create_agent".to_string()));
    }

    #[tokio::test]
    async fn initialize_gives_up_on_endless_indexing() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_template(dir.path());
        let service = FakeService::default();
        service
            .vector_store_statuses
            .lock()
            .expect("lock")
            .extend(std::iter::repeat_n("in_progress".to_string(), 10));
        let ctx = test_context(service, dir.path());

        let err = initialize(&ctx, &mut Vec::new())
            .await
            .expect_err("indexing never finishes");

        assert!(err.to_string().contains("still indexing after 5 status checks"), "{err}");
    }

    #[tokio::test]
    async fn initialize_reports_missing_instructions_before_creating_agent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = test_context(FakeService::default(), dir.path());

        let err = initialize(&ctx, &mut Vec::new())
            .await
            .expect_err("missing template should fail");

        assert!(err.to_string().starts_with("Instructions file not found:"), "{err}");
        assert!(!ctx.service.calls().contains(&"create_agent".to_string()));
    }

    #[tokio::test]
    async fn initialize_rolls_back_agent_when_thread_creation_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_template(dir.path());
        let service = FakeService {
            fail_thread: true,
            ..FakeService::default()
        };
        let ctx = test_context(service, dir.path());

        let err = initialize(&ctx, &mut Vec::new())
            .await
            .expect_err("thread failure should abort");

        assert!(err.to_string().contains("Failed to create the conversation thread"));
        assert_eq!(ctx.service.calls().last().map(String::as_str), Some("delete_agent asst_1"));
    }

    #[tokio::test]
    async fn cleanup_deletes_thread_then_agent() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_template(dir.path());
        let ctx = test_context(FakeService::default(), dir.path());
        let session = initialize(&ctx, &mut Vec::new()).await.expect("initialize");

        cleanup(&ctx, &session).await;

        let calls = ctx.service.calls();
        assert_eq!(calls[calls.len() - 2..], ["delete_thread thread_1", "delete_agent asst_1"]);
    }

    #[tokio::test]
    async fn cleanup_still_deletes_agent_when_thread_deletion_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_template(dir.path());
        let service = FakeService {
            fail_delete_thread: true,
            ..FakeService::default()
        };
        let ctx = test_context(service, dir.path());
        let session = initialize(&ctx, &mut Vec::new()).await.expect("initialize");

        cleanup(&ctx, &session).await;

        let calls = ctx.service.calls();
        assert_eq!(calls[calls.len() - 2..], ["delete_thread thread_1", "delete_agent asst_1"]);
    }

    #[tokio::test]
    async fn cleanup_skips_deletion_without_capability() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_template(dir.path());
        let service = FakeService {
            supports_delete: false,
            ..FakeService::default()
        };
        let ctx = test_context(service, dir.path());
        let session = initialize(&ctx, &mut Vec::new()).await.expect("initialize");

        cleanup(&ctx, &session).await;

        assert!(
            ctx.service
                .calls()
                .iter()
                .all(|call| !call.starts_with("delete_"))
        );
    }
}
