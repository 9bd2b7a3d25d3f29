use std::path::Path;

use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::error::{ServiceError, ServiceResult};
use super::events::{EventStream, run_event_stream};
use super::types::{
    Agent, CreateAgentRequest, CreateRunRequest, FileInfo, Thread, ThreadMessage, ToolOutput,
    VectorStore,
};
use super::{AgentService, ServiceCapabilities};
use crate::http::{HttpClient, HttpResponseData};
use crate::trace::SessionTrace;

const ERROR_BODY_MAX_CHARS: usize = 400;

/// REST client for a project's agents endpoint.
#[derive(Debug, Clone)]
pub struct AgentsClient {
    http: HttpClient,
    endpoint: String,
    api_version: String,
    trace: Option<SessionTrace>,
}

impl AgentsClient {
    pub fn new(http: HttpClient, endpoint: &str, api_version: &str) -> Self {
        Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_version: api_version.to_string(),
            trace: None,
        }
    }

    /// Records raw stream events into `trace` in addition to the HTTP exchange.
    pub fn with_trace(mut self, trace: SessionTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    fn query(&self) -> [(&str, &str); 1] {
        [("api-version", self.api_version.as_str())]
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        operation: &'static str,
        path: &str,
        body: &B,
    ) -> ServiceResult<T> {
        let response = self
            .http
            .post_json(&self.url(path), &self.query(), body)
            .await
            .map_err(ServiceError::transport(operation))?;
        decode_response(operation, response)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
    ) -> ServiceResult<T> {
        let response = self
            .http
            .get(&self.url(path), &self.query())
            .await
            .map_err(ServiceError::transport(operation))?;
        decode_response(operation, response)
    }

    async fn delete(&self, operation: &'static str, path: &str) -> ServiceResult<()> {
        let response = self
            .http
            .delete(&self.url(path), &self.query())
            .await
            .map_err(ServiceError::transport(operation))?;
        ensure_success(operation, &response)
    }

    async fn open_stream<B: Serialize + ?Sized>(
        &self,
        operation: &'static str,
        path: &str,
        body: &B,
    ) -> ServiceResult<EventStream> {
        let response = self
            .http
            .post_json_streaming(&self.url(path), &self.query(), body)
            .await
            .map_err(ServiceError::transport(operation))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(ServiceError::HttpStatus {
                operation,
                status,
                body: clip(&body),
            });
        }

        Ok(run_event_stream(response, self.trace.clone()))
    }
}

impl AgentService for AgentsClient {
    fn capabilities(&self) -> ServiceCapabilities {
        ServiceCapabilities {
            supports_delete: true,
        }
    }

    async fn upload_file(&self, path: &Path) -> ServiceResult<FileInfo> {
        const OPERATION: &str = "upload file";

        let bytes = tokio::fs::read(path).await.map_err(|source| ServiceError::File {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());
        let description = format!(
            "<multipart purpose=assistants file={file_name} ({} bytes)>",
            bytes.len()
        );
        let form = Form::new()
            .text("purpose", "assistants")
            .part("file", Part::bytes(bytes).file_name(file_name));

        let response = self
            .http
            .post_multipart(&self.url("files"), &self.query(), form, &description)
            .await
            .map_err(ServiceError::transport(OPERATION))?;
        decode_response(OPERATION, response)
    }

    async fn create_vector_store(
        &self,
        name: &str,
        file_ids: &[String],
    ) -> ServiceResult<VectorStore> {
        self.post(
            "create vector store",
            "vector_stores",
            &json!({ "name": name, "file_ids": file_ids }),
        )
        .await
    }

    async fn get_vector_store(&self, id: &str) -> ServiceResult<VectorStore> {
        self.get("get vector store", &format!("vector_stores/{id}"))
            .await
    }

    async fn create_agent(&self, request: &CreateAgentRequest) -> ServiceResult<Agent> {
        self.post("create agent", "assistants", request).await
    }

    async fn create_thread(&self) -> ServiceResult<Thread> {
        self.post("create thread", "threads", &json!({})).await
    }

    async fn create_message(&self, thread_id: &str, content: &str) -> ServiceResult<ThreadMessage> {
        self.post(
            "create message",
            &format!("threads/{thread_id}/messages"),
            &json!({ "role": "user", "content": content }),
        )
        .await
    }

    async fn stream_run(
        &self,
        thread_id: &str,
        request: &CreateRunRequest,
    ) -> ServiceResult<EventStream> {
        self.open_stream("create run", &format!("threads/{thread_id}/runs"), request)
            .await
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> ServiceResult<EventStream> {
        self.open_stream(
            "submit tool outputs",
            &format!("threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
            &json!({ "tool_outputs": outputs, "stream": true }),
        )
        .await
    }

    async fn download_file(&self, file_id: &str) -> ServiceResult<Vec<u8>> {
        const OPERATION: &str = "download file";

        let (status, bytes) = self
            .http
            .get_bytes(&self.url(&format!("files/{file_id}/content")), &self.query())
            .await
            .map_err(ServiceError::transport(OPERATION))?;
        if !(200..300).contains(&status) {
            return Err(ServiceError::HttpStatus {
                operation: OPERATION,
                status,
                body: clip(&String::from_utf8_lossy(&bytes)),
            });
        }
        Ok(bytes)
    }

    async fn delete_thread(&self, thread_id: &str) -> ServiceResult<()> {
        self.delete("delete thread", &format!("threads/{thread_id}"))
            .await
    }

    async fn delete_agent(&self, agent_id: &str) -> ServiceResult<()> {
        self.delete("delete agent", &format!("assistants/{agent_id}"))
            .await
    }
}

fn ensure_success(operation: &'static str, response: &HttpResponseData) -> ServiceResult<()> {
    if response.is_success() {
        Ok(())
    } else {
        Err(ServiceError::HttpStatus {
            operation,
            status: response.status,
            body: clip(&response.body),
        })
    }
}

fn decode_response<T: DeserializeOwned>(
    operation: &'static str,
    response: HttpResponseData,
) -> ServiceResult<T> {
    ensure_success(operation, &response)?;
    serde_json::from_str(&response.body).map_err(ServiceError::parse(operation))
}

fn clip(body: &str) -> String {
    body.chars().take(ERROR_BODY_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::AgentsClient;
    use crate::http::{HttpClient, HttpDebugConfig};
    use crate::service::types::{CreateRunRequest, ToolOutput};
    use crate::service::{AgentService, RunEvent, ServiceError};
    use futures::StreamExt;
    use reqwest::Client;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> AgentsClient {
        let http = HttpClient::new(Client::new(), HttpDebugConfig::disabled());
        AgentsClient::new(http, &format!("{}/", server.uri()), "v1")
    }

    #[tokio::test]
    async fn create_thread_posts_to_threads_with_api_version() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/threads"))
            .and(query_param("api-version", "v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "thread_1", "object": "thread"})))
            .expect(1)
            .mount(&server)
            .await;

        let thread = client_for(&server).create_thread().await.expect("thread");
        assert_eq!(thread.id, "thread_1");
    }

    #[tokio::test]
    async fn create_message_sends_user_role() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/threads/thread_1/messages"))
            .and(body_json(json!({"role": "user", "content": "sales by region"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg_1", "content": []})))
            .expect(1)
            .mount(&server)
            .await;

        let message = client_for(&server)
            .create_message("thread_1", "sales by region")
            .await
            .expect("message");
        assert_eq!(message.id, "msg_1");
    }

    #[tokio::test]
    async fn http_errors_carry_operation_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/assistants"))
            .respond_with(ResponseTemplate::new(400).set_body_string("model is required"))
            .mount(&server)
            .await;

        let request = crate::service::CreateAgentRequest {
            model: None,
            name: "agent".to_string(),
            instructions: String::new(),
            tools: vec![],
            tool_resources: Default::default(),
            temperature: 0.1,
            top_p: 0.1,
            metadata: Default::default(),
        };
        let err = client_for(&server)
            .create_agent(&request)
            .await
            .expect_err("agent creation should fail");

        match err {
            ServiceError::HttpStatus {
                operation,
                status,
                body,
            } => {
                assert_eq!(operation, "create agent");
                assert_eq!(status, 400);
                assert_eq!(body, "model is required");
            }
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_run_yields_typed_events() {
        let server = MockServer::start().await;
        let body = concat!(
            "event: thread.message.delta\n",
            "data: {\"id\":\"msg_1\",\"delta\":{\"content\":[{\"index\":0,\"type\":\"text\",\"text\":{\"value\":\"Sales are up\"}}]}}\n\n",
            "event: thread.run.completed\n",
            "data: {\"id\":\"run_1\",\"thread_id\":\"thread_1\",\"status\":\"completed\"}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/threads/thread_1/runs"))
            .and(body_string_contains("\"stream\":true"))
            .and(body_string_contains("\"max_prompt_tokens\":10240"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let request = CreateRunRequest {
            assistant_id: "asst_1".to_string(),
            stream: true,
            max_prompt_tokens: 10240,
            max_completion_tokens: 4096,
        };
        let events: Vec<RunEvent> = client_for(&server)
            .stream_run("thread_1", &request)
            .await
            .expect("stream")
            .map(|event| event.expect("event"))
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            RunEvent::MessageDelta(delta) if delta.text() == "Sales are up"
        ));
        assert!(matches!(&events[1], RunEvent::RunCompleted(run) if run.id == "run_1"));
    }

    #[tokio::test]
    async fn submit_tool_outputs_rejects_error_status_before_streaming() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/threads/thread_1/runs/run_1/submit_tool_outputs"))
            .and(body_string_contains("call_1"))
            .respond_with(ResponseTemplate::new(409).set_body_string("run is not waiting"))
            .mount(&server)
            .await;

        let outputs = vec![ToolOutput {
            tool_call_id: "call_1".to_string(),
            output: "[]".to_string(),
        }];
        let result = client_for(&server)
            .submit_tool_outputs("thread_1", "run_1", &outputs)
            .await;

        let Err(err) = result else {
            panic!("expected submit to fail");
        };
        assert!(err.to_string().contains("submit tool outputs"));
        assert!(err.to_string().contains("409"));
    }

    #[tokio::test]
    async fn upload_file_sends_multipart_with_purpose() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files"))
            .and(body_string_contains("assistants"))
            .and(body_string_contains("datasheet.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file_1", "filename": "datasheet.pdf"})))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("datasheet.pdf");
        std::fs::write(&file, b"%PDF-1.4 tents").expect("write file");

        let info = client_for(&server).upload_file(&file).await.expect("upload");
        assert_eq!(info.id, "file_1");
    }

    #[tokio::test]
    async fn upload_file_reports_missing_path() {
        let server = MockServer::start().await;
        let err = client_for(&server)
            .upload_file(std::path::Path::new("/nonexistent/datasheet.pdf"))
            .await
            .expect_err("missing file should fail");
        assert!(matches!(err, ServiceError::File { .. }));
    }

    #[tokio::test]
    async fn delete_agent_tolerates_empty_success_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/assistants/asst_1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .delete_agent("asst_1")
            .await
            .expect("delete agent");
    }
}
