//! Wire types for the hosted agents API (assistants-compatible JSON).

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Agent {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Thread {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileInfo {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VectorStore {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub status: String,
    #[serde(default)]
    pub file_counts: Option<FileCounts>,
}

impl VectorStore {
    pub fn is_indexing(&self) -> bool {
        self.status == "in_progress"
    }

    pub fn is_ready(&self) -> bool {
        self.status == "completed"
    }

    pub fn total_files(&self) -> u64 {
        self.file_counts.as_ref().map_or(0, |counts| counts.total)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct FileCounts {
    #[serde(default)]
    pub in_progress: u64,
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub total: u64,
}

/// One entry of an agent's `tools` array.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolDefinition {
    Function { function: FunctionDefinition },
    CodeInterpreter,
    FileSearch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolResources {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_search: Option<FileSearchResource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSearchResource {
    pub vector_store_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateAgentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub name: String,
    pub instructions: String,
    pub tools: Vec<ToolDefinition>,
    pub tool_resources: ToolResources,
    pub temperature: f32,
    pub top_p: f32,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateRunRequest {
    pub assistant_id: String,
    pub stream: bool,
    pub max_prompt_tokens: u32,
    pub max_completion_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ThreadRun {
    pub id: String,
    pub thread_id: String,
    pub status: String,
    #[serde(default)]
    pub required_action: Option<RequiredAction>,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

impl ThreadRun {
    /// Function calls the run is blocked on, if any.
    pub fn requested_tool_calls(&self) -> &[RequiredToolCall] {
        self.required_action
            .as_ref()
            .and_then(|action| action.submit_tool_outputs.as_ref())
            .map(|outputs| outputs.tool_calls.as_slice())
            .unwrap_or(&[])
    }

    pub fn failure_reason(&self) -> String {
        match &self.last_error {
            Some(err) => err.to_string(),
            None => format!("run ended with status '{}'", self.status),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RequiredAction {
    #[serde(default)]
    pub submit_tool_outputs: Option<SubmitToolOutputsAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmitToolOutputsAction {
    pub tool_calls: Vec<RequiredToolCall>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RequiredToolCall {
    pub id: String,
    #[serde(default)]
    pub function: Option<FunctionCall>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl Display for RunError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageDeltaEvent {
    pub id: String,
    pub delta: MessageDelta,
}

impl MessageDeltaEvent {
    pub fn text(&self) -> String {
        self.delta
            .content
            .iter()
            .filter_map(|part| match part {
                MessageDeltaContent::Text { text: Some(text) } => text.value.as_deref(),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageDelta {
    #[serde(default)]
    pub content: Vec<MessageDeltaContent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageDeltaContent {
    Text {
        #[serde(default)]
        text: Option<TextDelta>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TextDelta {
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

impl ThreadMessage {
    /// Files produced by the code interpreter, paired with the local name to save them under.
    pub fn generated_files(&self) -> Vec<GeneratedFile> {
        let mut files = Vec::new();
        for item in &self.content {
            match item {
                MessageContent::ImageFile { image_file } => files.push(GeneratedFile {
                    file_id: image_file.file_id.clone(),
                    file_name: format!("{}.png", image_file.file_id),
                }),
                MessageContent::Text { text } => {
                    files.extend(text.annotations.iter().filter_map(|annotation| {
                        let Annotation::FilePath { text, file_path } = annotation else {
                            return None;
                        };
                        let file_name = text.rsplit('/').next().unwrap_or(text).trim();
                        (!file_name.is_empty()).then(|| GeneratedFile {
                            file_id: file_path.file_id.clone(),
                            file_name: file_name.to_string(),
                        })
                    }));
                }
                MessageContent::Other => {}
            }
        }
        files
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: MessageText },
    ImageFile { image_file: FileReference },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageText {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Annotation {
    FilePath {
        text: String,
        file_path: FileReference,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileReference {
    pub file_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub file_id: String,
    pub file_name: String,
}
