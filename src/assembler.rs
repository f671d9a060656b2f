//! Reassembles a token-by-token completion stream into a structured
//! message, emitting coalesced snapshots at a bounded rate instead of
//! one update per delta. Each emission may trigger expensive relayout
//! in the consuming surface, so update frequency is capped by a
//! wall-clock threshold rather than delta arrival rate.

use std::time::{Duration, Instant};

use anyhow::Result;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::ModelError;
use crate::model::message::ToolCallData;
use crate::openai::{EventStream, StreamEvent};

pub const DEFAULT_COALESCE_THRESHOLD: Duration = Duration::from_millis(250);

/// A coalesced view of "what the message should currently show".
/// Periodic snapshots carry accumulated text only; the final snapshot
/// also carries the tool call name and fully concatenated argument
/// buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub text: String,
    pub tool_call_name: Option<String>,
    pub tool_call_arguments: String,
    pub finished: bool,
    /// Set when the upstream stream errored mid-flight; the partial
    /// result is surfaced so the caller can keep, discard, or retry.
    pub incomplete: bool,
}

impl Snapshot {
    /// Parses the argument buffer into the tool call record to persist.
    /// An invalid or half-written buffer is a hard failure; a truncated
    /// tool call is unusable downstream.
    pub fn tool_call(&self) -> Result<Option<ToolCallData>, ModelError> {
        match &self.tool_call_name {
            None => Ok(None),
            Some(name) => {
                let arguments: Value = serde_json::from_str(&self.tool_call_arguments)
                    .map_err(ModelError::MalformedToolArguments)?;
                Ok(Some(ToolCallData {
                    name: name.clone(),
                    arguments,
                }))
            }
        }
    }
}

/// Per-generation assembly state. Lives only for the duration of one
/// request; discarded on completion or cancellation.
#[derive(Debug)]
pub struct Assembler {
    threshold: Duration,
    prefix: String,
    suffix: String,
    text: String,
    tool_call_name: Option<String>,
    arguments_buf: String,
    since_last_emit: Duration,
}

impl Assembler {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            prefix: String::new(),
            suffix: String::new(),
            text: String::new(),
            tool_call_name: None,
            arguments_buf: String::new(),
            since_last_emit: Duration::ZERO,
        }
    }

    /// Fixed context strings wrapped around the accumulated text in
    /// every snapshot. Used by the completion-style mode to reinsert
    /// generated text at the cursor position.
    pub fn with_context(mut self, before: &str, after: &str) -> Self {
        self.prefix = before.to_string();
        self.suffix = after.to_string();
        self
    }

    /// Applies one delta and returns a coalesced snapshot once more
    /// than the threshold of wall-clock time has accumulated since the
    /// last emission.
    pub fn push(&mut self, event: &StreamEvent, elapsed: Duration) -> Option<Snapshot> {
        match event {
            StreamEvent::Text(content) => self.text.push_str(content),
            // First name wins; arguments only ever append since they
            // arrive as a streamed, concatenable JSON string.
            StreamEvent::ToolCallName(name) => {
                if self.tool_call_name.is_none() {
                    self.tool_call_name = Some(name.clone());
                }
            }
            StreamEvent::ToolCallArguments(fragment) => self.arguments_buf.push_str(fragment),
        }

        self.since_last_emit += elapsed;
        if self.since_last_emit > self.threshold {
            self.since_last_emit = Duration::ZERO;
            Some(self.snapshot(false, false))
        } else {
            None
        }
    }

    /// The unconditional final snapshot, emitted even when the
    /// threshold has not elapsed.
    pub fn finish(&self) -> Snapshot {
        self.snapshot(true, false)
    }

    /// A final snapshot for a stream that errored mid-flight.
    pub fn interrupt(&self) -> Snapshot {
        self.snapshot(true, true)
    }

    fn snapshot(&self, finished: bool, incomplete: bool) -> Snapshot {
        Snapshot {
            text: format!("{}{}{}", self.prefix, self.text, self.suffix),
            tool_call_name: if finished {
                self.tool_call_name.clone()
            } else {
                None
            },
            tool_call_arguments: if finished {
                self.arguments_buf.clone()
            } else {
                String::new()
            },
            finished,
            incomplete,
        }
    }
}

/// Drives a delta stream through an assembler, sending coalesced
/// snapshots on `tx` and returning the final snapshot. An upstream
/// error yields a partial snapshot flagged incomplete rather than
/// losing the in-progress generation.
pub async fn assemble(
    mut stream: EventStream,
    mut assembler: Assembler,
    tx: &mpsc::UnboundedSender<Snapshot>,
) -> Result<Snapshot> {
    let mut last = Instant::now();

    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => {
                let now = Instant::now();
                if let Some(snapshot) = assembler.push(&event, now - last) {
                    // Send failures mean the receiver is gone; keep
                    // consuming so the final snapshot is still built
                    let _ = tx.send(snapshot);
                }
                last = now;
            }
            Err(e) => {
                tracing::error!("completion stream failed mid-flight: {}", e);
                let snapshot = assembler.interrupt();
                let _ = tx.send(snapshot.clone());
                return Ok(snapshot);
            }
        }
    }

    let snapshot = assembler.finish();
    let _ = tx.send(snapshot.clone());
    Ok(snapshot)
}
