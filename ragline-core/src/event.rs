//! Live event channel between a running workflow and its subscriber.
//!
//! Steps publish incremental "reasoning" (progress) and "response" (answer
//! token) events while the run is in progress. Emission order is the order
//! the subscriber observes. When the subscriber disconnects, the next
//! emission fails with [`EngineError::Cancelled`] and the run stops.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{EngineError, Result};

/// Kind of a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Diagnostic/progress content.
    Reasoning,
    /// User-facing answer token.
    Response,
    /// Terminal error indicator; the run aborted after this.
    Failure,
}

/// One tagged event published during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub step: String,
    pub content: String,
}

#[derive(Debug, Clone)]
enum SinkInner {
    Channel(mpsc::Sender<AgentEvent>),
    /// Swallows every event; for tests and fire-and-forget runs.
    Discard,
}

/// Sending half of the event channel, cloned into every step.
#[derive(Debug, Clone)]
pub struct EventSink {
    inner: SinkInner,
}

/// Receiving half: a live append-only stream of [`AgentEvent`]s.
pub type EventStream = ReceiverStream<AgentEvent>;

/// Create a bounded event channel.
pub fn event_channel(capacity: usize) -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        EventSink {
            inner: SinkInner::Channel(tx),
        },
        ReceiverStream::new(rx),
    )
}

impl EventSink {
    /// A sink with no subscriber.
    pub fn discard() -> Self {
        Self {
            inner: SinkInner::Discard,
        }
    }

    async fn emit(&self, event: AgentEvent) -> Result<()> {
        match &self.inner {
            SinkInner::Channel(tx) => tx.send(event).await.map_err(|_| EngineError::Cancelled),
            SinkInner::Discard => Ok(()),
        }
    }

    /// Publish a reasoning (progress) event.
    pub async fn reasoning(&self, step: impl Into<String>, content: impl Into<String>) -> Result<()> {
        self.emit(AgentEvent {
            kind: EventKind::Reasoning,
            step: step.into(),
            content: content.into(),
        })
        .await
    }

    /// Publish a response token.
    pub async fn response(&self, step: impl Into<String>, content: impl Into<String>) -> Result<()> {
        self.emit(AgentEvent {
            kind: EventKind::Response,
            step: step.into(),
            content: content.into(),
        })
        .await
    }

    /// Publish a terminal failure indicator.
    pub async fn failure(&self, step: impl Into<String>, content: impl Into<String>) -> Result<()> {
        self.emit(AgentEvent {
            kind: EventKind::Failure,
            step: step.into(),
            content: content.into(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use tokio_stream::StreamExt;

    use super::*;

    #[tokio::test]
    async fn events_arrive_in_emission_order() {
        let (sink, mut stream) = event_channel(8);

        sink.reasoning("classify", "thinking").await.unwrap();
        sink.response("generate", "Hello").await.unwrap();
        sink.response("generate", " world").await.unwrap();
        drop(sink);

        let events: Vec<AgentEvent> = (&mut stream).collect().await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind, EventKind::Reasoning);
        assert_eq!(events[1].content, "Hello");
        assert_eq!(events[2].content, " world");
    }

    #[tokio::test]
    async fn dropped_subscriber_cancels_emission() {
        let (sink, stream) = event_channel(1);
        drop(stream);

        let err = sink.response("generate", "token").await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[tokio::test]
    async fn discard_sink_never_fails() {
        let sink = EventSink::discard();
        sink.reasoning("classify", "ok").await.unwrap();
        sink.failure("retrieve", "boom").await.unwrap();
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = AgentEvent {
            kind: EventKind::Response,
            step: "generate".to_string(),
            content: "hi".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "response");
        assert_eq!(value["step"], "generate");
    }
}
