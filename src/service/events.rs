use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};

use super::error::{ServiceError, ServiceResult};
use super::types::{MessageDeltaEvent, ThreadMessage, ThreadRun};
use crate::trace::SessionTrace;

/// Events of one streamed run, in arrival order.
pub type EventStream = Pin<Box<dyn Stream<Item = ServiceResult<RunEvent>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    MessageDelta(MessageDeltaEvent),
    MessageCompleted(ThreadMessage),
    RequiresAction(ThreadRun),
    RunCompleted(ThreadRun),
    RunFailed(ThreadRun),
    Error(String),
    Done,
    /// Lifecycle and step events that need no handling.
    Other(String),
}

impl RunEvent {
    pub fn parse(event: &str, data: &str) -> ServiceResult<Self> {
        let parsed = match event {
            "thread.message.delta" => Self::MessageDelta(decode(event, data)?),
            "thread.message.completed" => Self::MessageCompleted(decode(event, data)?),
            "thread.run.requires_action" => Self::RequiresAction(decode(event, data)?),
            "thread.run.completed" => Self::RunCompleted(decode(event, data)?),
            "thread.run.failed"
            | "thread.run.cancelled"
            | "thread.run.expired"
            | "thread.run.incomplete" => Self::RunFailed(decode(event, data)?),
            "error" => Self::Error(data.to_string()),
            "done" => Self::Done,
            other => Self::Other(other.to_string()),
        };
        Ok(parsed)
    }
}

fn decode<T: serde::de::DeserializeOwned>(event: &str, data: &str) -> ServiceResult<T> {
    serde_json::from_str(data)
        .map_err(|err| ServiceError::Stream(format!("malformed '{event}' payload: {err}")))
}

/// Turns a `text/event-stream` response body into typed run events.
pub fn run_event_stream(response: reqwest::Response, trace: Option<SessionTrace>) -> EventStream {
    let events = response.bytes_stream().eventsource().map(move |item| {
        let event = item.map_err(|err| ServiceError::Stream(err.to_string()))?;
        if let Some(trace) = &trace {
            trace.log_stream_event(&event.event, &event.data);
        }
        RunEvent::parse(&event.event, &event.data)
    });
    Box::pin(events)
}

#[cfg(test)]
pub(crate) fn from_events(events: Vec<RunEvent>) -> EventStream {
    Box::pin(futures::stream::iter(events.into_iter().map(Ok)))
}
