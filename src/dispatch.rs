//! Dispatch engine: fan one submission out to every participating panel,
//! gather the completions, and fold results back by panel id.
//!
//! ## Concurrency
//! Requests for different panels are logically concurrent — one tagged
//! future per panel joined with `join_all`, no ordering guarantee between
//! panels. Each result lands in a disjoint state slice (its own panel), so
//! folding back is race-free by construction. Cancellation does not exist:
//! dropping the future mid-flight simply abandons the responses.
//!
//! ## Failure model
//! A panel whose completion fails gets `"Error fetching response."` recorded
//! as an in-band conversation entry; nothing is thrown and other panels are
//! unaffected. Persistence is enqueued fire-and-forget after each success
//! and never blocks or rolls back the in-memory update.

use futures_util::future::join_all;
use tracing::warn;

use crate::error::ArenaError;
use crate::panels::{ConversationTurn, PanelBoard};
use crate::persist::{PanelRef, SavePayload, SaveQueue};
use crate::providers::{Completion, CompletionBackend, Provider};

/// In-band response recorded when a panel's completion request fails.
pub const ERROR_RESPONSE: &str = "Error fetching response.";

/// Everything one panel's request needs, captured before any await so the
/// board is free while the fan-out is in flight.
struct Job {
    panel_id: u32,
    provider: Provider,
    model: String,
    question: String,
    session_key: String,
    /// Regenerate target within the conversation; `None` appends.
    entry_index: Option<usize>,
}

impl Job {
    fn panel_ref(&self) -> PanelRef {
        PanelRef {
            chat_id: self.session_key.clone(),
            panel_id: self.panel_id,
            parent_model: self.provider.label().to_string(),
            selected_model: Some(self.model.clone()),
            is_matrix_visible: false,
        }
    }
}

/// Issue every job's completion request concurrently, results in job order.
async fn scatter(
    backend: &dyn CompletionBackend,
    jobs: &[Job],
) -> Vec<Result<Completion, ArenaError>> {
    join_all(
        jobs.iter()
            .map(|job| backend.complete(job.provider, &job.model, &job.question)),
    )
    .await
}

/// Submit the current draft content to every participating panel.
///
/// The model guard is all-or-nothing: any panel without a selected model
/// rejects the whole submission with nothing mutated. Participation is then
/// per-panel: a panel whose content is empty is skipped and left unchanged.
pub async fn submit_all(
    board: &mut PanelBoard,
    backend: &dyn CompletionBackend,
    saves: Option<&SaveQueue>,
) -> Result<(), ArenaError> {
    if board.panels().iter().any(|p| p.selected_model.is_none()) {
        return Err(ArenaError::MissingModel);
    }

    let synced = board.is_synced();
    let mut jobs: Vec<Job> = Vec::new();
    for panel in board.panels() {
        let content = if synced {
            board.shared_draft()
        } else {
            panel.draft.as_str()
        };
        if content.is_empty() {
            continue;
        }
        let Some(model) = panel.selected_model.clone() else {
            continue; // unreachable past the guard
        };
        jobs.push(Job {
            panel_id: panel.id,
            provider: panel.provider,
            model,
            question: content.to_string(),
            session_key: panel.session_key.clone(),
            entry_index: None,
        });
    }

    let submitted: Vec<u32> = jobs.iter().map(|j| j.panel_id).collect();
    for &id in &submitted {
        if let Some(panel) = board.panel_mut(id) {
            panel.is_busy = true;
        }
    }

    let results = scatter(backend, &jobs).await;
    fold_results(board, &jobs, results, saves);

    // Shared buffer clears once when synced; otherwise only the panels that
    // actually submitted lose their drafts.
    if synced {
        if let Some(&id) = submitted.first() {
            board.set_draft(id, "");
        }
    } else {
        for &id in &submitted {
            if let Some(panel) = board.panel_mut(id) {
                panel.draft.clear();
            }
        }
    }

    Ok(())
}

/// Save the panel's open edit session and regenerate the affected responses.
///
/// Non-synchronized mode rewrites only the originating panel's entry at the
/// edit index. Synchronized mode locates the entry in every panel by the
/// pre-edit question text (first match when duplicated) and regenerates each
/// matching panel with its own selected model. Conversation length and entry
/// positions never change. A panel without an open edit session is a no-op.
pub async fn save_edit(
    board: &mut PanelBoard,
    panel_id: u32,
    backend: &dyn CompletionBackend,
    saves: Option<&SaveQueue>,
) -> Result<(), ArenaError> {
    let Some(edit) = board.take_edit(panel_id) else {
        return Ok(());
    };

    let mut jobs: Vec<Job> = Vec::new();
    if board.is_synced() {
        let panel_ids: Vec<u32> = board.panels().iter().map(|p| p.id).collect();
        for id in panel_ids {
            let Some(panel) = board.panel_mut(id) else {
                continue;
            };
            let Some(index) = panel
                .conversation
                .iter()
                .position(|t| t.question == edit.original_question)
            else {
                continue;
            };
            let Some(model) = panel.selected_model.clone() else {
                warn!(panel = id, "skipping regenerate: no model selected");
                continue;
            };
            panel.conversation[index].question = edit.text.clone();
            panel.conversation[index].response.clear();
            panel.is_busy = true;
            jobs.push(Job {
                panel_id: id,
                provider: panel.provider,
                model,
                question: edit.text.clone(),
                session_key: panel.session_key.clone(),
                entry_index: Some(index),
            });
        }
    } else if let Some(panel) = board.panel_mut(panel_id) {
        if panel.conversation.get(edit.entry_index).is_some() {
            match panel.selected_model.clone() {
                Some(model) => {
                    let turn = &mut panel.conversation[edit.entry_index];
                    turn.question = edit.text.clone();
                    turn.response.clear();
                    panel.is_busy = true;
                    jobs.push(Job {
                        panel_id,
                        provider: panel.provider,
                        model,
                        question: edit.text.clone(),
                        session_key: panel.session_key.clone(),
                        entry_index: Some(edit.entry_index),
                    });
                }
                None => warn!(panel = panel_id, "skipping regenerate: no model selected"),
            }
        }
    }

    let results = scatter(backend, &jobs).await;
    fold_results(board, &jobs, results, saves);
    Ok(())
}

/// Apply each tagged result to its own panel. Appends for submissions,
/// rewrites in place for regenerations.
fn fold_results(
    board: &mut PanelBoard,
    jobs: &[Job],
    results: Vec<Result<Completion, ArenaError>>,
    saves: Option<&SaveQueue>,
) {
    for (job, outcome) in jobs.iter().zip(results) {
        let Some(panel) = board.panel_mut(job.panel_id) else {
            continue;
        };
        match outcome {
            Ok(completion) => {
                let text = completion.text;
                match job.entry_index {
                    Some(index) => {
                        if let Some(turn) = panel.conversation.get_mut(index) {
                            turn.response = text.clone();
                        }
                    }
                    None => panel.conversation.push(ConversationTurn {
                        question: job.question.clone(),
                        response: text.clone(),
                    }),
                }
                panel.last_usage = completion.usage;
                panel.is_busy = false;
                if let Some(queue) = saves {
                    queue.enqueue(match job.entry_index {
                        Some(_) => SavePayload::Edit {
                            panel: job.panel_ref(),
                            question: job.question.clone(),
                            completion_text: text,
                        },
                        None => SavePayload::Batch {
                            panels: vec![job.panel_ref()],
                            content_to_submit: job.question.clone(),
                            completion_text: text,
                        },
                    });
                }
            }
            Err(e) => {
                warn!(panel = job.panel_id, model = %job.model, error = %e, "completion failed");
                match job.entry_index {
                    Some(index) => {
                        if let Some(turn) = panel.conversation.get_mut(index) {
                            turn.response = ERROR_RESPONSE.to_string();
                        }
                    }
                    None => panel.conversation.push(ConversationTurn {
                        question: job.question.clone(),
                        response: ERROR_RESPONSE.to_string(),
                    }),
                }
                panel.last_usage = None;
                panel.is_busy = false;
            }
        }
    }
}
