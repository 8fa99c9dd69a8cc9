//! Best-effort persistence: save payload shapes, the sink seam, and the
//! fire-and-forget save queue.
//!
//! ## Design
//! - The UI path never waits on a save. `SaveQueue::enqueue` pushes onto an
//!   unbounded channel and returns; one worker task drains the channel and
//!   hands each payload to a `SaveSink`.
//! - Sink failure is logged and dropped. No retry, no rollback: the
//!   in-memory conversation update stands regardless of save outcome.
//! - Payload field names are camelCase on the wire, matching the savechat
//!   endpoint contract.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::ArenaError;

/// Identity supplied by the external session provider. Persistence requires
/// a present, non-empty `id`; the rest is display-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSession {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

impl UserSession {
    /// A bare local identity (CLI use, no auth flow).
    pub fn local(id: impl Into<String>) -> Self {
        UserSession {
            id: id.into(),
            name: None,
            email: None,
            image: None,
        }
    }
}

/// Panel identity fields carried in a save payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelRef {
    pub chat_id: String,
    pub panel_id: u32,
    pub parent_model: String,
    pub selected_model: Option<String>,
    #[serde(default)]
    pub is_matrix_visible: bool,
}

/// The two savechat call shapes: the batch variant used after `submit_all`,
/// and the single-panel variant used after an edit-regenerate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SavePayload {
    #[serde(rename_all = "camelCase")]
    Batch {
        panels: Vec<PanelRef>,
        content_to_submit: String,
        completion_text: String,
    },
    #[serde(rename_all = "camelCase")]
    Edit {
        panel: PanelRef,
        question: String,
        completion_text: String,
    },
}

/// Where saves land: the remote savechat endpoint or the local history store.
#[async_trait]
pub trait SaveSink: Send + Sync {
    async fn save(&self, user: &UserSession, payload: &SavePayload) -> Result<(), ArenaError>;
}

/// POSTs each payload to `{base_url}/savechat` with a JSON body.
pub struct HttpSaveSink {
    client: Client,
    base_url: String,
}

impl HttpSaveSink {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpSaveSink {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl SaveSink for HttpSaveSink {
    async fn save(&self, user: &UserSession, payload: &SavePayload) -> Result<(), ArenaError> {
        if user.id.is_empty() {
            return Err(ArenaError::Unauthorized);
        }
        let response = self
            .client
            .post(format!("{}/savechat", self.base_url))
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ArenaError::SaveRejected(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Handle for enqueueing best-effort saves.
#[derive(Clone)]
pub struct SaveQueue {
    tx: mpsc::UnboundedSender<SavePayload>,
}

impl SaveQueue {
    /// Spawn the worker draining the queue into `sink`. Returns the enqueue
    /// handle and the worker's join handle; the worker exits once every
    /// queue handle is dropped and the channel is drained, so awaiting the
    /// join handle at shutdown flushes pending saves.
    pub fn spawn(user: UserSession, sink: Arc<dyn SaveSink>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<SavePayload>();
        let handle = tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                match sink.save(&user, &payload).await {
                    Ok(()) => debug!("chat turn saved"),
                    Err(e) => warn!(error = %e, "chat save failed; in-memory state kept"),
                }
            }
        });
        (SaveQueue { tx }, handle)
    }

    /// Fire and forget. A closed channel means shutdown is underway; the
    /// payload is silently dropped, matching abandoned-navigation semantics.
    pub fn enqueue(&self, payload: SavePayload) {
        let _ = self.tx.send(payload);
    }
}
