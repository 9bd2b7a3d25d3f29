use super::debug::{HttpDebugConfig, header_lines, redact_body, redact_url, truncate_for_log};
use crate::trace::SessionTrace;
use reqwest::header::HeaderMap;
use reqwest::multipart::Form;
use reqwest::{Client, Method, Request, RequestBuilder, Response};
use serde::Serialize;
use std::fmt;
use std::io::{self, Write};
#[cfg(test)]
use std::sync::{Arc, Mutex};

/// Thin wrapper over `reqwest` that attaches credentials and mirrors every
/// exchange into the session trace and the optional debug echo.
#[derive(Clone)]
pub struct HttpClient {
    inner: Client,
    debug: HttpDebugConfig,
    bearer_token: Option<String>,
    sink: LogSink,
    trace: Option<SessionTrace>,
}

#[derive(Clone)]
enum LogSink {
    Stderr,
    #[cfg(test)]
    Buffer(Arc<Mutex<Vec<String>>>),
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("debug", &self.debug)
            .field("authenticated", &self.bearer_token.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponseData {
    pub status: u16,
    pub body: String,
}

impl HttpResponseData {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl HttpClient {
    pub fn new(inner: Client, debug: HttpDebugConfig) -> Self {
        Self {
            inner,
            debug,
            bearer_token: None,
            sink: LogSink::Stderr,
            trace: None,
        }
    }

    pub fn with_trace(mut self, trace: SessionTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token;
        self
    }

    pub async fn get(&self, url: &str, query: &[(&str, &str)]) -> reqwest::Result<HttpResponseData> {
        let request = self.builder(Method::GET, url, query).build()?;
        self.execute_text(request, "").await
    }

    pub async fn delete(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> reqwest::Result<HttpResponseData> {
        let request = self.builder(Method::DELETE, url, query).build()?;
        self.execute_text(request, "").await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        payload: &T,
    ) -> reqwest::Result<HttpResponseData> {
        let body_json = serialized_for_log(payload);
        let request = self.builder(Method::POST, url, query).json(payload).build()?;
        self.execute_text(request, &body_json).await
    }

    pub async fn post_multipart(
        &self,
        url: &str,
        query: &[(&str, &str)],
        form: Form,
        description: &str,
    ) -> reqwest::Result<HttpResponseData> {
        let request = self
            .builder(Method::POST, url, query)
            .multipart(form)
            .build()?;
        self.execute_text(request, description).await
    }

    /// Sends a JSON request whose response body is consumed as a stream.
    /// Only the status line and headers are recorded here.
    pub async fn post_json_streaming<T: Serialize + ?Sized>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        payload: &T,
    ) -> reqwest::Result<Response> {
        let body_json = serialized_for_log(payload);
        let request = self
            .builder(Method::POST, url, query)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(payload)
            .build()?;
        self.record_request(&request, &body_json);

        let response = self.send(request).await?;
        let headers = response.headers().clone();
        self.record_response(response.status().as_u16(), &headers, "<event stream>");
        Ok(response)
    }

    pub async fn get_bytes(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> reqwest::Result<(u16, Vec<u8>)> {
        let request = self.builder(Method::GET, url, query).build()?;
        self.record_request(&request, "");

        let response = self.send(request).await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let bytes = response.bytes().await?.to_vec();
        self.record_response(status, &headers, &format!("<{} bytes>", bytes.len()));
        Ok((status, bytes))
    }

    fn builder(&self, method: Method, url: &str, query: &[(&str, &str)]) -> RequestBuilder {
        let builder = self.inner.request(method, url).query(query);
        match &self.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute_text(&self, request: Request, body_log: &str) -> reqwest::Result<HttpResponseData> {
        self.record_request(&request, body_log);

        let response = self.send(request).await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;
        self.record_response(status, &headers, &body);

        Ok(HttpResponseData { status, body })
    }

    async fn send(&self, request: Request) -> reqwest::Result<Response> {
        self.inner.execute(request).await.inspect_err(|err| {
            tracing::debug!(error = %err, "http request failed");
            if let Some(trace) = &self.trace {
                trace.log_http_error(&err.to_string());
            }
        })
    }

    fn record_request(&self, request: &Request, body: &str) {
        if let Some(trace) = &self.trace {
            trace.log_http_request(
                request.method().as_str(),
                request.url().as_str(),
                request.headers(),
                body,
            );
        }
        if self.debug.enabled {
            for line in request_log_lines(self.debug, request, body) {
                self.log_line(line);
            }
        }
    }

    fn record_response(&self, status: u16, headers: &HeaderMap, body: &str) {
        if let Some(trace) = &self.trace {
            trace.log_http_response(status, headers, body);
        }
        if self.debug.enabled {
            for line in response_log_lines(self.debug, status, headers, body) {
                self.log_line(line);
            }
        }
    }

    fn log_line(&self, line: String) {
        match &self.sink {
            LogSink::Stderr => {
                let mut stderr = io::stderr().lock();
                let _ = writeln!(stderr, "{line}");
            }
            #[cfg(test)]
            LogSink::Buffer(buffer) => {
                if let Ok(mut b) = buffer.lock() {
                    b.push(line);
                }
            }
        }
    }

    #[cfg(test)]
    pub fn with_buffer_sink(
        inner: Client,
        debug: HttpDebugConfig,
    ) -> (Self, Arc<Mutex<Vec<String>>>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let client = Self {
            inner,
            debug,
            bearer_token: None,
            sink: LogSink::Buffer(Arc::clone(&buffer)),
            trace: None,
        };
        (client, buffer)
    }
}

fn serialized_for_log<T: Serialize + ?Sized>(payload: &T) -> String {
    serde_json::to_string(payload)
        .unwrap_or_else(|err| format!("{{\"_serialization_error\":\"{err}\"}}"))
}

fn request_log_lines(debug: HttpDebugConfig, request: &Request, body: &str) -> Vec<String> {
    let mut lines = vec![format!(
        "[http-debug] > {} {}",
        request.method(),
        redact_url(request.url(), debug.redact_secrets)
    )];
    lines.extend(
        header_lines(request.headers(), debug.redact_secrets)
            .into_iter()
            .map(|header| format!("[http-debug] > {header}")),
    );
    lines.push("[http-debug] >".to_string());
    push_body_lines(&mut lines, '>', debug, body);
    lines
}

fn response_log_lines(
    debug: HttpDebugConfig,
    status: u16,
    headers: &HeaderMap,
    body: &str,
) -> Vec<String> {
    let mut lines = vec![format!("[http-debug] < HTTP {status}")];
    lines.extend(
        header_lines(headers, debug.redact_secrets)
            .into_iter()
            .map(|header| format!("[http-debug] < {header}")),
    );
    lines.push("[http-debug] <".to_string());
    push_body_lines(&mut lines, '<', debug, body);
    lines
}

fn push_body_lines(lines: &mut Vec<String>, direction: char, debug: HttpDebugConfig, body: &str) {
    let body = truncate_for_log(
        &redact_body(body, debug.redact_secrets),
        debug.max_body_chars,
    );
    if body.is_empty() {
        lines.push(format!("[http-debug] {direction} <empty body>"));
        return;
    }

    lines.extend(
        body.lines()
            .map(|line| format!("[http-debug] {direction} {line}")),
    );
}
