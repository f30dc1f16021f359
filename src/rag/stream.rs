//! Streaming RAG responses
//!
//! Runs the same pipeline as [`RagPipeline::query`], then emits the
//! response sentence by sentence with a small inter-segment delay.
//! Control yields between segments, so a cancellation request is
//! observed promptly: emission stops immediately and no completion
//! event follows.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::pipeline::{elapsed_ms, QueryOptions, RagPipeline, SourceCitation};
use crate::chunker::split_sentences;
use crate::llm::ChatMessage;

/// Events emitted over a streaming query channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Work has started
    Status { message: String },

    /// Retrieved sources, sent once before any text
    Sources { sources: Vec<SourceCitation> },

    /// One response segment
    Chunk { content: String },

    /// Final event of a successful stream
    Complete {
        response_time_ms: f64,
        total_length: usize,
        source_count: usize,
    },

    /// Final event of a failed stream
    Error { message: String },
}

impl RagPipeline {
    /// Answer a query and stream the response incrementally.
    ///
    /// Returns the receiving end of the event channel. The emitting task
    /// stops as soon as `cancel` fires or the receiver is dropped; a
    /// cancelled stream never emits `Complete`.
    pub fn stream_query(
        self: &Arc<Self>,
        user_query: String,
        chat_history: Vec<ChatMessage>,
        options: QueryOptions,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(16);
        let pipeline = Arc::clone(self);

        tokio::spawn(async move {
            let start = Instant::now();

            if tx
                .send(StreamEvent::Status {
                    message: "Processing your request...".to_string(),
                })
                .await
                .is_err()
            {
                return;
            }

            let reply = pipeline.query(&user_query, &chat_history, &options).await;

            if !reply.sources.is_empty()
                && tx
                    .send(StreamEvent::Sources {
                        sources: reply.sources.clone(),
                    })
                    .await
                    .is_err()
            {
                return;
            }

            let delay = Duration::from_millis(pipeline.config.stream_delay_ms);
            for sentence in split_sentences(&reply.response) {
                let segment = sentence.trim();
                if segment.is_empty() {
                    continue;
                }

                if cancel.is_cancelled() {
                    info!("streaming response cancelled");
                    return;
                }
                if tx
                    .send(StreamEvent::Chunk {
                        content: format!("{} ", segment),
                    })
                    .await
                    .is_err()
                {
                    return;
                }

                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("streaming response cancelled");
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            if cancel.is_cancelled() {
                return;
            }

            let _ = tx
                .send(StreamEvent::Complete {
                    response_time_ms: elapsed_ms(start),
                    total_length: reply.response.len(),
                    source_count: reply.sources.len(),
                })
                .await;
        });

        rx
    }
}
