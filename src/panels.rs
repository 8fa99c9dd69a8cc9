//! Panel state store: the ordered collection of chat panels, the shared
//! draft buffer, the synchronized-content flag, and per-panel edit sessions.
//!
//! ## Design
//! - `PanelBoard` is a plain owned value, constructed per application session
//!   and passed by reference. No ambient statics.
//! - Every mutation goes through a board method; the board is only touched
//!   from one task at a time, so interior locking is unnecessary.
//! - Panel ids are small integers, unique within the live collection but
//!   reused after deletion (lowest free id wins).
//! - The sync toggle is a one-way reconciliation: it rewrites session keys
//!   and draft buffers but never merges or discards conversations.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::ModelCatalog;
use crate::providers::{CompletionUsage, Provider};

/// One question/answer pair in a panel's conversation. Insertion-ordered and
/// append-only, except for the in-place rewrite done by edit-regenerate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub response: String,
}

/// One visible conversation column.
#[derive(Debug, Clone)]
pub struct ChatPanel {
    pub id: u32,
    pub provider: Provider,
    pub selected_model: Option<String>,
    /// Not-yet-submitted input; ignored while synchronized mode is on.
    pub draft: String,
    pub conversation: Vec<ConversationTurn>,
    /// Metrics from the most recent completion. Display-only.
    pub last_usage: Option<CompletionUsage>,
    pub is_busy: bool,
    /// Groups this panel's saved turns into one logical chat session.
    pub session_key: String,
}

/// How many panels the board may hold. The removal floor is a policy knob,
/// not a hard rule: some deployments forbid deleting the last panel, others
/// allow emptying the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelPolicy {
    pub min_panels: usize,
    pub max_panels: usize,
}

impl Default for PanelPolicy {
    fn default() -> Self {
        PanelPolicy {
            min_panels: 1,
            max_panels: 3,
        }
    }
}

/// An in-flight edit of one historical question. At most one per panel.
#[derive(Debug, Clone)]
pub struct EditSession {
    pub entry_index: usize,
    /// Question text as it stood when the edit opened; the synced-mode
    /// regenerate locates matching entries in other panels by this value.
    pub original_question: String,
    /// The text being edited.
    pub text: String,
}

pub struct PanelBoard {
    panels: Vec<ChatPanel>,
    policy: PanelPolicy,
    synced: bool,
    shared_draft: String,
    shared_session_key: String,
    edits: HashMap<u32, EditSession>,
}

fn fresh_key() -> String {
    Uuid::new_v4().to_string()
}

impl PanelBoard {
    pub fn new(policy: PanelPolicy) -> Self {
        PanelBoard {
            panels: Vec::new(),
            policy,
            synced: false,
            shared_draft: String::new(),
            shared_session_key: fresh_key(),
            edits: HashMap::new(),
        }
    }

    /// Seed the default board: panel 1 with the catalog's first entry,
    /// panel 2 (when the bound allows) with a random entry.
    pub fn seed_defaults(&mut self, provider: Provider, catalog: &ModelCatalog) {
        if let Some(id) = self.add_panel(catalog) {
            if let Some(panel) = self.panel_mut(id) {
                panel.provider = provider;
                panel.selected_model = catalog.first(provider).map(str::to_string);
            }
        }
        if self.panels.len() < self.policy.max_panels {
            if let Some(id) = self.add_panel(catalog) {
                if let Some(panel) = self.panel_mut(id) {
                    panel.provider = provider;
                    panel.selected_model = catalog.random(provider);
                }
            }
        }
    }

    // -- accessors ----------------------------------------------------------

    pub fn panels(&self) -> &[ChatPanel] {
        &self.panels
    }

    pub fn panel(&self, id: u32) -> Option<&ChatPanel> {
        self.panels.iter().find(|p| p.id == id)
    }

    pub fn panel_mut(&mut self, id: u32) -> Option<&mut ChatPanel> {
        self.panels.iter_mut().find(|p| p.id == id)
    }

    pub fn policy(&self) -> PanelPolicy {
        self.policy
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn shared_draft(&self) -> &str {
        &self.shared_draft
    }

    pub fn shared_session_key(&self) -> &str {
        &self.shared_session_key
    }

    /// The content this panel would submit right now: the shared buffer when
    /// synchronized, otherwise the panel's own draft.
    pub fn draft_for(&self, id: u32) -> Option<&str> {
        if self.synced {
            // Panel must still exist for the shared buffer to apply to it.
            self.panel(id).map(|_| self.shared_draft.as_str())
        } else {
            self.panel(id).map(|p| p.draft.as_str())
        }
    }

    // -- panel collection mutations -----------------------------------------

    /// Append a fresh panel. Silent no-op returning `None` at the bound.
    /// The new panel's default model cycles the catalog by current count.
    pub fn add_panel(&mut self, catalog: &ModelCatalog) -> Option<u32> {
        if self.panels.len() >= self.policy.max_panels {
            return None;
        }
        let id = (1..).find(|id| self.panels.iter().all(|p| p.id != *id))?;
        let provider = Provider::Groq;
        let panel = ChatPanel {
            id,
            provider,
            selected_model: catalog.default_for_panel(provider, self.panels.len()),
            draft: String::new(),
            conversation: Vec::new(),
            last_usage: None,
            is_busy: false,
            session_key: if self.synced {
                self.shared_session_key.clone()
            } else {
                fresh_key()
            },
        };
        self.panels.push(panel);
        Some(id)
    }

    /// Remove the panel with `id`. No-op when absent or at the policy floor.
    pub fn remove_panel(&mut self, id: u32) -> bool {
        if self.panels.len() <= self.policy.min_panels {
            return false;
        }
        let before = self.panels.len();
        self.panels.retain(|p| p.id != id);
        let removed = self.panels.len() < before;
        if removed {
            self.edits.remove(&id);
        }
        removed
    }

    // -- per-panel field mutations ------------------------------------------

    /// Switch a panel's provider group and reset its model to that group's
    /// first catalog entry (unset when the group's catalog is empty). The
    /// existing conversation is kept.
    pub fn set_provider(&mut self, id: u32, provider: Provider, catalog: &ModelCatalog) {
        let first = catalog.first(provider).map(str::to_string);
        if let Some(panel) = self.panel_mut(id) {
            panel.provider = provider;
            panel.selected_model = first;
        }
    }

    /// Set the model id. Catalog membership is not validated.
    pub fn set_model(&mut self, id: u32, model: impl Into<String>) {
        if let Some(panel) = self.panel_mut(id) {
            panel.selected_model = Some(model.into());
        }
    }

    /// Update draft text: the shared buffer when synchronized (affecting all
    /// panels), otherwise only this panel's draft.
    pub fn set_draft(&mut self, id: u32, text: impl Into<String>) {
        if self.synced {
            if self.panel(id).is_some() {
                self.shared_draft = text.into();
            }
        } else if let Some(panel) = self.panel_mut(id) {
            panel.draft = text.into();
        }
    }

    // -- synchronized mode --------------------------------------------------

    /// Toggle synchronized content. Turning it on collapses every panel onto
    /// one freshly generated session key and clears all draft buffers;
    /// turning it off hands each panel a fresh independent key. Conversations
    /// are untouched either way.
    pub fn set_synced(&mut self, on: bool) {
        if on == self.synced {
            return;
        }
        self.synced = on;
        if on {
            self.shared_session_key = fresh_key();
            self.shared_draft.clear();
            for panel in &mut self.panels {
                panel.session_key = self.shared_session_key.clone();
                panel.draft.clear();
            }
        } else {
            for panel in &mut self.panels {
                panel.session_key = fresh_key();
            }
        }
    }

    // -- edit sessions ------------------------------------------------------

    /// Open an edit on `index` of the panel's conversation, seeded with the
    /// current question text. No-op when the panel is missing or the index is
    /// out of range. An existing session on the same panel is replaced.
    pub fn start_edit(&mut self, id: u32, index: usize) {
        let Some(panel) = self.panel(id) else {
            return;
        };
        let Some(turn) = panel.conversation.get(index) else {
            return;
        };
        self.edits.insert(
            id,
            EditSession {
                entry_index: index,
                original_question: turn.question.clone(),
                text: turn.question.clone(),
            },
        );
    }

    /// Discard the edit without mutating the conversation.
    pub fn cancel_edit(&mut self, id: u32) {
        self.edits.remove(&id);
    }

    pub fn edit_session(&self, id: u32) -> Option<&EditSession> {
        self.edits.get(&id)
    }

    /// Replace the text being edited.
    pub fn set_edit_text(&mut self, id: u32, text: impl Into<String>) {
        if let Some(edit) = self.edits.get_mut(&id) {
            edit.text = text.into();
        }
    }

    /// Remove and return the panel's edit session (save path).
    pub fn take_edit(&mut self, id: u32) -> Option<EditSession> {
        self.edits.remove(&id)
    }
}
