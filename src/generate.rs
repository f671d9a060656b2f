//! Runs one streaming generation against a chat message slot.
//!
//! Generation is the only concurrent operation in the core: the fetch
//! runs in its own tokio task and hands coalesced snapshots back over a
//! channel, which is the single mutation point for the message being
//! generated. At most one generation may be in flight per target slot.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, bail};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::assembler::{Assembler, DEFAULT_COALESCE_THRESHOLD, Snapshot, assemble};
use crate::error::ModelError;
use crate::model::chat::Chat;
use crate::openai::{CompletionProvider, completion_prompt};

#[derive(Clone, Debug)]
pub enum GenerationMode {
    /// Chat-completions API: history and tools go over as-is.
    Chat,
    /// Legacy completion API: the history is flattened into a single
    /// role-tagged prompt with the target's cursor context spliced in.
    Completion { before: String, after: String },
}

/// A generation target: one message slot in one chat. Keyed by the
/// chat's position in its owning dataset so a `Generator` can serve
/// the whole collection.
type SlotKey = (usize, usize);

type ActiveSlots = Arc<Mutex<HashSet<SlotKey>>>;

/// Releases the generation slot when the task finishes, errors, or is
/// aborted mid-flight.
struct SlotGuard {
    active: ActiveSlots,
    key: SlotKey,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.active.lock().unwrap().remove(&self.key);
    }
}

pub struct Generator {
    provider: Arc<dyn CompletionProvider>,
    threshold: Duration,
    active: ActiveSlots,
}

impl Generator {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            threshold: DEFAULT_COALESCE_THRESHOLD,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_threshold(mut self, threshold: Duration) -> Self {
        self.threshold = threshold;
        self
    }

    /// Starts generating a reply for message slot `target` of the chat
    /// at `chat_index` (the slot may be one past the end, to append).
    /// The returned handle receives coalesced snapshots; the committed
    /// conversation state is untouched until the caller applies the
    /// final snapshot.
    pub fn start(
        &self,
        chat_index: usize,
        chat: &Chat,
        target: usize,
        mode: GenerationMode,
    ) -> Result<GenerationHandle, ModelError> {
        let key = (chat_index, target);
        {
            let mut active = self.active.lock().unwrap();
            if !active.insert(key) {
                return Err(ModelError::GenerationAlreadyInProgress {
                    chat: chat_index,
                    slot: target,
                });
            }
        }
        let guard = SlotGuard {
            active: Arc::clone(&self.active),
            key,
        };

        let assembler = match &mode {
            GenerationMode::Chat => Assembler::new(self.threshold),
            GenerationMode::Completion { before, after } => {
                Assembler::new(self.threshold).with_context(before, after)
            }
        };
        let request = chat.to_openai_request_upto(target);
        let history = chat.conversation_history(target);
        let provider = Arc::clone(&self.provider);
        let (tx, rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            // Owns the slot for the lifetime of the task, including
            // cancellation via abort
            let _guard = guard;
            let stream = match &mode {
                GenerationMode::Chat => provider.stream_chat(request).await?,
                GenerationMode::Completion { before, after } => {
                    let prompt = completion_prompt(&history, before);
                    provider.stream_completion(&prompt, after).await?
                }
            };
            assemble(stream, assembler, &tx).await
        });

        Ok(GenerationHandle {
            snapshots: rx,
            task,
        })
    }
}

pub struct GenerationHandle {
    snapshots: mpsc::UnboundedReceiver<Snapshot>,
    task: JoinHandle<Result<Snapshot>>,
}

impl GenerationHandle {
    /// Receives the next coalesced snapshot; `None` once the stream has
    /// finalized and the channel drained.
    pub async fn next_snapshot(&mut self) -> Option<Snapshot> {
        self.snapshots.recv().await
    }

    /// Aborts the in-flight request, dropping the open connection. The
    /// target slot is released; no message is committed.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Waits for the stream to end and returns the final snapshot.
    pub async fn finish(self) -> Result<Snapshot> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => bail!("generation was cancelled"),
            Err(e) => Err(e.into()),
        }
    }
}
