use serde_json::{Value, json};

use crate::sales::SalesDatabase;
use crate::service::types::{
    FileSearchResource, FunctionDefinition, RequiredToolCall, ToolDefinition, ToolOutput,
    ToolResources,
};

pub const FETCH_SALES_TOOL: &str = "fetch_sales";

/// Ordered tool descriptors plus the resources they reference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Toolset {
    definitions: Vec<ToolDefinition>,
    resources: ToolResources,
}

impl Toolset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, function: FunctionDefinition) -> &mut Self {
        self.definitions.push(ToolDefinition::Function { function });
        self
    }

    pub fn add_code_interpreter(&mut self) -> &mut Self {
        self.definitions.push(ToolDefinition::CodeInterpreter);
        self
    }

    pub fn add_file_search(&mut self, vector_store_id: &str) -> &mut Self {
        self.definitions.push(ToolDefinition::FileSearch);
        self.resources
            .file_search
            .get_or_insert_with(|| FileSearchResource {
                vector_store_ids: Vec::new(),
            })
            .vector_store_ids
            .push(vector_store_id.to_string());
        self
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn into_parts(self) -> (Vec<ToolDefinition>, ToolResources) {
        (self.definitions, self.resources)
    }
}

pub fn fetch_sales_declaration() -> FunctionDefinition {
    FunctionDefinition {
        name: FETCH_SALES_TOOL.to_string(),
        description: "Answers user questions about Contoso sales data by executing a SQLite query against the sales database.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "A well-formed SQLite query that extracts the information needed to answer the user's question. The result is returned as JSON."
                }
            },
            "required": ["query"]
        }),
    }
}

/// Runs one requested call. Unknown functions and bad arguments come back as
/// error JSON so the agent can recover conversationally.
pub async fn execute_call<D: SalesDatabase>(sales: &D, call: &RequiredToolCall) -> ToolOutput {
    let output = match &call.function {
        Some(function) if function.name == FETCH_SALES_TOOL => {
            match query_argument(&function.arguments) {
                Ok(query) => sales.fetch_sales_data(&query).await,
                Err(message) => error_output("invalid_args", &message),
            }
        }
        Some(function) => error_output(
            "unknown_function",
            &format!("unknown function: {}", function.name),
        ),
        None => error_output("unsupported_tool_call", "only function tool calls are supported"),
    };

    ToolOutput {
        tool_call_id: call.id.clone(),
        output,
    }
}

fn query_argument(arguments: &str) -> Result<String, String> {
    let parsed: Value = serde_json::from_str(arguments)
        .map_err(|err| format!("arguments are not valid JSON: {err}"))?;
    parsed
        .get("query")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| format!("{FETCH_SALES_TOOL} requires a string 'query' argument"))
}

fn error_output(code: &str, message: &str) -> String {
    json!({ "ok": false, "error": { "code": code, "message": message } }).to_string()
}
