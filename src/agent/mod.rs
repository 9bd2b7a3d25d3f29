pub mod bootstrap;
pub mod dispatcher;
pub mod instructions;
pub mod tools;

use std::path::PathBuf;
use std::time::Duration;

pub use bootstrap::{AgentSession, cleanup, initialize};
pub use dispatcher::{DispatchState, StreamDispatcher, TurnOutcome};

use crate::cli::theme::Theme;
use crate::config::AppConfig;
use crate::service::CreateRunRequest;
use crate::trace::SessionTrace;

pub const AGENT_NAME: &str = "Contoso Sales AI Agent";
pub const VECTOR_STORE_NAME: &str = "Contoso Product Information Vector Store";

#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub agent_name: String,
    pub model: Option<String>,
    pub environment: String,
    pub vector_store_name: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_prompt_tokens: u32,
    pub max_completion_tokens: u32,
    pub vector_store_poll_interval: Duration,
    pub vector_store_poll_attempts: u32,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            agent_name: AGENT_NAME.to_string(),
            model: None,
            environment: crate::config::DEFAULT_ENVIRONMENT.to_string(),
            vector_store_name: VECTOR_STORE_NAME.to_string(),
            temperature: 0.1,
            top_p: 0.1,
            max_prompt_tokens: 10_240,
            max_completion_tokens: 4_096,
            vector_store_poll_interval: Duration::from_secs(1),
            vector_store_poll_attempts: 120,
        }
    }
}

impl AgentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.model_deployment_name.clone(),
            environment: config.environment.clone(),
            ..Self::default()
        }
    }

    pub fn run_request(&self, assistant_id: &str) -> CreateRunRequest {
        CreateRunRequest {
            assistant_id: assistant_id.to_string(),
            stream: true,
            max_prompt_tokens: self.max_prompt_tokens,
            max_completion_tokens: self.max_completion_tokens,
        }
    }
}

/// Everything the bootstrapper, the dispatcher and the input loop share.
/// Built once in `run` and passed down by reference.
pub struct AppContext<S, D> {
    pub service: S,
    pub sales: D,
    pub settings: AgentSettings,
    pub instructions_file: PathBuf,
    pub datasheet_file: PathBuf,
    pub files_dir: PathBuf,
    pub theme: Theme,
    pub trace: Option<SessionTrace>,
}

impl<S, D> AppContext<S, D> {
    pub fn new(service: S, sales: D, config: &AppConfig, theme: Theme) -> Self {
        Self {
            service,
            sales,
            settings: AgentSettings::from_config(config),
            instructions_file: config.instructions_file.clone(),
            datasheet_file: config.datasheet_file.clone(),
            files_dir: config.files_dir.clone(),
            theme,
            trace: None,
        }
    }
}
