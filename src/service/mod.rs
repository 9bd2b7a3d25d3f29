pub mod client;
pub mod error;
pub mod events;
pub mod types;

use std::future::Future;
use std::path::Path;

pub use client::AgentsClient;
pub use error::{ServiceError, ServiceResult};
pub use events::{EventStream, RunEvent};
pub use types::{
    Agent, CreateAgentRequest, CreateRunRequest, FileInfo, Thread, ThreadMessage, ToolOutput,
    VectorStore,
};

/// What the connected service can do beyond the core agent calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceCapabilities {
    pub supports_delete: bool,
}

/// Remote operations the client needs from the hosted agent service.
pub trait AgentService {
    fn capabilities(&self) -> ServiceCapabilities;

    fn upload_file(&self, path: &Path) -> impl Future<Output = ServiceResult<FileInfo>> + Send;

    fn create_vector_store(
        &self,
        name: &str,
        file_ids: &[String],
    ) -> impl Future<Output = ServiceResult<VectorStore>> + Send;

    fn get_vector_store(&self, id: &str)
    -> impl Future<Output = ServiceResult<VectorStore>> + Send;

    fn create_agent(
        &self,
        request: &CreateAgentRequest,
    ) -> impl Future<Output = ServiceResult<Agent>> + Send;

    fn create_thread(&self) -> impl Future<Output = ServiceResult<Thread>> + Send;

    fn create_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> impl Future<Output = ServiceResult<ThreadMessage>> + Send;

    fn stream_run(
        &self,
        thread_id: &str,
        request: &CreateRunRequest,
    ) -> impl Future<Output = ServiceResult<EventStream>> + Send;

    /// Submits tool results for a blocked run; the response continues the run's event stream.
    fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> impl Future<Output = ServiceResult<EventStream>> + Send;

    fn download_file(&self, file_id: &str) -> impl Future<Output = ServiceResult<Vec<u8>>> + Send;

    fn delete_thread(&self, thread_id: &str) -> impl Future<Output = ServiceResult<()>> + Send;

    fn delete_agent(&self, agent_id: &str) -> impl Future<Output = ServiceResult<()>> + Send;
}
