//! External tests for the dispatch engine — fan-out and fold-back, the
//! model guard, edit-regenerate, and the persistence hand-off.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use model_arena::catalog::ModelCatalog;
use model_arena::dispatch::{save_edit, submit_all, ERROR_RESPONSE};
use model_arena::error::ArenaError;
use model_arena::history::ChatHistory;
use model_arena::panels::{ConversationTurn, PanelBoard, PanelPolicy};
use model_arena::persist::{SavePayload, SaveQueue, SaveSink, UserSession};
use model_arena::providers::{Completion, CompletionBackend, Provider};

/// Scripted backend: answers come from a (model, question) table, anything
/// unscripted fails. Every call is recorded.
struct ScriptedBackend {
    answers: HashMap<(String, String), String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedBackend {
    fn new() -> Self {
        ScriptedBackend {
            answers: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn answer(mut self, model: &str, question: &str, response: &str) -> Self {
        self.answers.insert(
            (model.to_string(), question.to_string()),
            response.to_string(),
        );
        self
    }

    fn call_count(&self) -> usize {
        self.calls.lock().expect("lock").len()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(
        &self,
        _provider: Provider,
        model: &str,
        question: &str,
    ) -> Result<Completion, ArenaError> {
        self.calls
            .lock()
            .expect("lock")
            .push((model.to_string(), question.to_string()));
        match self.answers.get(&(model.to_string(), question.to_string())) {
            Some(text) => Ok(Completion {
                text: text.clone(),
                usage: None,
            }),
            None => Err(ArenaError::Provider {
                provider: "groq".to_string(),
                status: 500,
                body: "unscripted".to_string(),
            }),
        }
    }
}

/// Sink that records every payload it receives.
#[derive(Default)]
struct RecordingSink {
    seen: Mutex<Vec<SavePayload>>,
}

#[async_trait]
impl SaveSink for RecordingSink {
    async fn save(&self, _user: &UserSession, payload: &SavePayload) -> Result<(), ArenaError> {
        self.seen.lock().expect("lock").push(payload.clone());
        Ok(())
    }
}

fn catalog() -> ModelCatalog {
    let mut c = ModelCatalog::new();
    c.insert(Provider::Groq, vec!["alpha".to_string(), "beta".to_string()]);
    c
}

fn two_panel_board() -> PanelBoard {
    let c = catalog();
    let mut board = PanelBoard::new(PanelPolicy::default());
    board.add_panel(&c);
    board.add_panel(&c);
    board
}

// -- the model guard ------------------------------------------------------

#[tokio::test]
async fn test_missing_model_rejects_whole_submission() {
    let backend = ScriptedBackend::new().answer("alpha", "hi", "hello");
    let mut board = two_panel_board();
    board.panel_mut(2).expect("panel").selected_model = None;
    board.set_draft(1, "hi");

    let err = submit_all(&mut board, &backend, None)
        .await
        .err()
        .expect("guard fires");
    assert!(matches!(err, ArenaError::MissingModel));
    assert_eq!(backend.call_count(), 0, "no request leaves the process");
    assert!(board.panel(1).expect("p1").conversation.is_empty());
    assert_eq!(board.draft_for(1), Some("hi"), "draft survives the reject");
}

// -- submission -----------------------------------------------------------

#[tokio::test]
async fn test_empty_draft_panel_sits_out() {
    let backend = ScriptedBackend::new().answer("alpha", "only one", "reply");
    let mut board = two_panel_board();
    board.set_draft(1, "only one");

    submit_all(&mut board, &backend, None).await.expect("ok");
    assert_eq!(backend.call_count(), 1);
    assert_eq!(board.panel(1).expect("p1").conversation.len(), 1);
    assert!(board.panel(2).expect("p2").conversation.is_empty());
    assert!(!board.panel(2).expect("p2").is_busy);
}

#[tokio::test]
async fn test_synced_submit_fans_one_draft_to_all() {
    let backend = ScriptedBackend::new()
        .answer("alpha", "same q", "from alpha")
        .answer("beta", "same q", "from beta");
    let mut board = two_panel_board();
    board.set_synced(true);
    board.set_draft(1, "same q");

    submit_all(&mut board, &backend, None).await.expect("ok");
    assert_eq!(board.panel(1).expect("p1").conversation[0].response, "from alpha");
    assert_eq!(board.panel(2).expect("p2").conversation[0].response, "from beta");
    assert_eq!(board.shared_draft(), "", "shared buffer clears after submit");
}

#[tokio::test]
async fn test_failed_panel_gets_inband_error_entry() {
    // Only alpha is scripted; beta's request fails.
    let backend = ScriptedBackend::new().answer("alpha", "q", "fine");
    let mut board = two_panel_board();
    board.set_draft(1, "q");
    board.set_draft(2, "q");

    submit_all(&mut board, &backend, None)
        .await
        .expect("failure stays in-band");
    let p1 = board.panel(1).expect("p1");
    let p2 = board.panel(2).expect("p2");
    assert_eq!(p1.conversation[0].response, "fine");
    assert_eq!(p2.conversation[0].response, ERROR_RESPONSE);
    assert_eq!(p2.conversation[0].question, "q", "question still recorded");
    assert!(!p2.is_busy);
}

// -- edit-regenerate ------------------------------------------------------

#[tokio::test]
async fn test_edit_rewrites_one_entry_in_place() {
    let backend = ScriptedBackend::new().answer("alpha", "better question", "better answer");
    let mut board = two_panel_board();
    let p1 = board.panel_mut(1).expect("p1");
    p1.conversation.push(ConversationTurn {
        question: "old question".to_string(),
        response: "old answer".to_string(),
    });
    p1.conversation.push(ConversationTurn {
        question: "untouched".to_string(),
        response: "still here".to_string(),
    });

    board.start_edit(1, 0);
    board.set_edit_text(1, "better question");
    save_edit(&mut board, 1, &backend, None).await.expect("ok");

    let p1 = board.panel(1).expect("p1");
    assert_eq!(p1.conversation.len(), 2, "length never changes");
    assert_eq!(p1.conversation[0].question, "better question");
    assert_eq!(p1.conversation[0].response, "better answer");
    assert_eq!(p1.conversation[1].question, "untouched");
    assert_eq!(p1.conversation[1].response, "still here");
    assert!(board.edit_session(1).is_none(), "session consumed");
}

#[tokio::test]
async fn test_unsynced_edit_leaves_other_panels_alone() {
    let backend = ScriptedBackend::new().answer("alpha", "new", "regen");
    let mut board = two_panel_board();
    for id in [1, 2] {
        board.panel_mut(id).expect("panel").conversation.push(ConversationTurn {
            question: "shared wording".to_string(),
            response: format!("answer {}", id),
        });
    }
    board.start_edit(1, 0);
    board.set_edit_text(1, "new");
    save_edit(&mut board, 1, &backend, None).await.expect("ok");

    assert_eq!(board.panel(1).expect("p1").conversation[0].question, "new");
    let p2 = board.panel(2).expect("p2");
    assert_eq!(p2.conversation[0].question, "shared wording");
    assert_eq!(p2.conversation[0].response, "answer 2");
}

#[tokio::test]
async fn test_synced_edit_matches_by_question_text() {
    let backend = ScriptedBackend::new()
        .answer("alpha", "edited", "regen alpha")
        .answer("beta", "edited", "regen beta");
    let mut board = two_panel_board();
    board.set_synced(true);
    // Same question sits at different indices in the two panels.
    board.panel_mut(1).expect("p1").conversation.push(ConversationTurn {
        question: "target".to_string(),
        response: "a1".to_string(),
    });
    let p2 = board.panel_mut(2).expect("p2");
    p2.conversation.push(ConversationTurn {
        question: "something else".to_string(),
        response: "b1".to_string(),
    });
    p2.conversation.push(ConversationTurn {
        question: "target".to_string(),
        response: "b2".to_string(),
    });

    board.start_edit(1, 0);
    board.set_edit_text(1, "edited");
    save_edit(&mut board, 1, &backend, None).await.expect("ok");

    assert_eq!(board.panel(1).expect("p1").conversation[0].question, "edited");
    assert_eq!(board.panel(1).expect("p1").conversation[0].response, "regen alpha");
    let p2 = board.panel(2).expect("p2");
    assert_eq!(p2.conversation[0].question, "something else", "non-match untouched");
    assert_eq!(p2.conversation[1].question, "edited");
    assert_eq!(p2.conversation[1].response, "regen beta");
}

#[tokio::test]
async fn test_synced_edit_duplicate_question_rewrites_first_only() {
    let backend = ScriptedBackend::new().answer("alpha", "edited", "regen");
    let c = catalog();
    let mut board = PanelBoard::new(PanelPolicy::default());
    board.add_panel(&c);
    board.set_synced(true);
    // The same question was asked twice in one panel.
    let p1 = board.panel_mut(1).expect("p1");
    p1.conversation.push(ConversationTurn {
        question: "dup".to_string(),
        response: "first answer".to_string(),
    });
    p1.conversation.push(ConversationTurn {
        question: "dup".to_string(),
        response: "second answer".to_string(),
    });

    board.start_edit(1, 0);
    board.set_edit_text(1, "edited");
    save_edit(&mut board, 1, &backend, None).await.expect("ok");

    assert_eq!(backend.call_count(), 1);
    let p1 = board.panel(1).expect("p1");
    assert_eq!(p1.conversation[0].question, "edited");
    assert_eq!(p1.conversation[0].response, "regen");
    assert_eq!(p1.conversation[1].question, "dup", "second occurrence keeps its text");
    assert_eq!(p1.conversation[1].response, "second answer");
}

#[tokio::test]
async fn test_synced_edit_skips_panel_without_match() {
    let backend = ScriptedBackend::new().answer("alpha", "edited", "regen");
    let mut board = two_panel_board();
    board.set_synced(true);
    board.panel_mut(1).expect("p1").conversation.push(ConversationTurn {
        question: "target".to_string(),
        response: "a".to_string(),
    });
    // Panel 2 never asked that question.
    board.start_edit(1, 0);
    board.set_edit_text(1, "edited");
    save_edit(&mut board, 1, &backend, None).await.expect("ok");

    assert_eq!(backend.call_count(), 1);
    assert!(board.panel(2).expect("p2").conversation.is_empty());
}

// -- persistence hand-off -------------------------------------------------

#[tokio::test]
async fn test_submit_enqueues_batch_payload() {
    let backend = ScriptedBackend::new().answer("alpha", "persist me", "saved text");
    let sink = Arc::new(RecordingSink::default());
    let (queue, worker) = SaveQueue::spawn(UserSession::local("local"), sink.clone());

    let mut board = two_panel_board();
    board.set_draft(1, "persist me");
    submit_all(&mut board, &backend, Some(&queue)).await.expect("ok");
    drop(queue);
    worker.await.expect("worker");

    let seen = sink.seen.lock().expect("lock");
    assert_eq!(seen.len(), 1);
    let SavePayload::Batch {
        panels,
        content_to_submit,
        completion_text,
    } = &seen[0]
    else {
        panic!("expected a batch payload");
    };
    assert_eq!(panels.len(), 1);
    assert_eq!(panels[0].panel_id, 1);
    assert_eq!(panels[0].parent_model, "Groq");
    assert_eq!(panels[0].selected_model.as_deref(), Some("alpha"));
    assert_eq!(content_to_submit, "persist me");
    assert_eq!(completion_text, "saved text");
}

#[tokio::test]
async fn test_save_edit_enqueues_edit_payload() {
    let backend = ScriptedBackend::new().answer("alpha", "new question", "regen answer");
    let sink = Arc::new(RecordingSink::default());
    let (queue, worker) = SaveQueue::spawn(UserSession::local("local"), sink.clone());

    let c = catalog();
    let mut board = PanelBoard::new(PanelPolicy::default());
    board.add_panel(&c);
    board.panel_mut(1).expect("p1").conversation.push(ConversationTurn {
        question: "old question".to_string(),
        response: "old answer".to_string(),
    });
    board.start_edit(1, 0);
    board.set_edit_text(1, "new question");
    save_edit(&mut board, 1, &backend, Some(&queue)).await.expect("ok");
    drop(queue);
    worker.await.expect("worker");

    let seen = sink.seen.lock().expect("lock");
    assert_eq!(seen.len(), 1);
    let SavePayload::Edit {
        panel,
        question,
        completion_text,
    } = &seen[0]
    else {
        panic!("expected an edit payload");
    };
    assert_eq!(panel.panel_id, 1);
    assert_eq!(panel.selected_model.as_deref(), Some("alpha"));
    assert_eq!(question, "new question");
    assert_eq!(completion_text, "regen answer");
}

#[tokio::test]
async fn test_failed_completion_saves_nothing() {
    let backend = ScriptedBackend::new();
    let sink = Arc::new(RecordingSink::default());
    let (queue, worker) = SaveQueue::spawn(UserSession::local("local"), sink.clone());

    let mut board = two_panel_board();
    board.set_draft(1, "will fail");
    submit_all(&mut board, &backend, Some(&queue)).await.expect("ok");
    drop(queue);
    worker.await.expect("worker");

    assert!(sink.seen.lock().expect("lock").is_empty());
    assert_eq!(
        board.panel(1).expect("p1").conversation[0].response,
        ERROR_RESPONSE
    );
}

#[tokio::test]
async fn test_saved_turns_round_trip_through_history() {
    let backend = ScriptedBackend::new()
        .answer("alpha", "first q", "first a")
        .answer("alpha", "second q", "second a");
    let history = Arc::new(ChatHistory::open_in_memory().expect("open"));
    let sink = Arc::new(model_arena::history::HistorySink::new(history.clone()));
    let (queue, worker) = SaveQueue::spawn(UserSession::local("local"), sink);

    let c = catalog();
    let mut board = PanelBoard::new(PanelPolicy::default());
    board.add_panel(&c);
    board.set_draft(1, "first q");
    submit_all(&mut board, &backend, Some(&queue)).await.expect("ok");
    board.set_draft(1, "second q");
    submit_all(&mut board, &backend, Some(&queue)).await.expect("ok");
    drop(queue);
    worker.await.expect("worker");

    let records = history.list_chats("local").expect("list");
    assert_eq!(records.len(), 1, "same session key upserts one row");
    assert_eq!(
        records[0].conversation,
        board.panel(1).expect("p1").conversation,
        "stored turns match the in-memory conversation, in order"
    );
    assert_eq!(records[0].content, "second q");
    assert_eq!(records[0].response, "second a");
}
