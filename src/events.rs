use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::{Segment, TranscriptSource};

/// Pipeline stage reported in progress events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    FetchingSubtitle,
    TranscribingAudio,
    GeneratingSummary,
}

/// One server-sent event on a summary stream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Progress {
        stage: Stage,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        progress: Option<u8>,
    },
    #[serde(rename_all = "camelCase")]
    Metadata {
        #[serde(skip_serializing_if = "Option::is_none")]
        duration: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        subtitle_source: Option<TranscriptSource>,
        #[serde(skip_serializing_if = "Option::is_none")]
        subtitles_count: Option<usize>,
        /// Segments the client sends back to re-summarize without refetching
        #[serde(skip_serializing_if = "Option::is_none")]
        subtitles_array: Option<Vec<Segment>>,
    },
    Delta {
        content: String,
    },
    Done,
    #[serde(rename_all = "camelCase")]
    Error {
        error: String,
        error_message: String,
    },
}

impl StreamEvent {
    pub fn progress(stage: Stage, message: impl Into<String>, progress: u8) -> Self {
        StreamEvent::Progress {
            stage,
            message: message.into(),
            progress: Some(progress),
        }
    }

    pub fn error(error: impl Into<String>, message: impl Into<String>) -> Self {
        StreamEvent::Error {
            error: error.into(),
            error_message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"error","error":"serialize"}"#.to_string())
    }
}

/// Progress sink for the subtitle pipeline. The CLI runs without one.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    tx: Option<UnboundedSender<StreamEvent>>,
}

impl Progress {
    pub fn new(tx: UnboundedSender<StreamEvent>) -> Self {
        Progress { tx: Some(tx) }
    }

    pub fn none() -> Self {
        Progress::default()
    }

    /// Sends are best effort; a closed receiver means the client went away
    pub fn send(&self, event: StreamEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn stage(&self, stage: Stage, message: impl Into<String>, progress: u8) {
        self.send(StreamEvent::progress(stage, message, progress));
    }

    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.is_closed())
    }
}
