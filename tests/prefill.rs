//! 从历史作答预填

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;

use attempt_sync::{AppError, TestSession};
use common::*;

/// 第 1 次作答已提交 5 道题，当前处于第 2 次作答
async fn second_attempt(backend: &FakeBackend) -> TestSession {
    backend.seed_answer("q1", 1, json!({"selected_option_id": "B"}));
    backend.seed_answer("q2", 1, json!({"text_response": "chlorophyll"}));
    backend.seed_answer("q3", 1, json!({"selected_option_id": "A"}));
    backend.seed_answer("q4", 1, json!({"text_response": "Plants make sugar from light."}));
    backend.seed_answer("q5", 1, json!({"text_response": "oxygen"}));
    backend.script_feedback([(
        feedback_status(5, 5),
        vec![
            feedback_item("q1", 1, true),
            feedback_item("q2", 1, true),
            feedback_item("q3", 1, false),
            feedback_item("q4", 1, true),
            feedback_item("q5", 1, true),
        ],
    )]);

    let mut session = TestSession::open(config(), Arc::new(backend.clone()), ctx(), questions()).await;
    session.wait_feedback().await;
    session
}

#[tokio::test(start_paused = true)]
async fn bulk_prefill_copies_into_the_current_attempt() {
    let backend = FakeBackend::new(2, 3);
    let mut session = second_attempt(&backend).await;

    assert!(session.drafts().entries.is_empty());
    assert_eq!(session.load_prefill_sources().await, 1);
    assert_eq!(session.prefill().selected_attempt(), Some(1));

    let report = session.prefill_all(1).await.unwrap();
    assert_eq!(report.from_attempt, 1);
    assert_eq!(report.saved.len(), 5);

    assert_eq!(session.answered_count(), 5);
    assert_eq!(backend.records_for(2), 5);
    assert_eq!(backend.records_for(1), 5);
    assert_eq!(backend.persisted("q4", 2).as_deref(), Some("Plants make sugar from light."));
    assert_eq!(backend.persisted("q3", 1).as_deref(), Some("A"));
    assert!(backend.state().save_log.iter().all(|r| r.attempt == 2));
}

#[tokio::test(start_paused = true)]
async fn editing_a_prefilled_answer_untags_only_that_question() {
    let backend = FakeBackend::new(2, 3);
    let mut session = second_attempt(&backend).await;
    session.load_prefill_sources().await;
    session.prefill_all(1).await.unwrap();

    for q in ["q1", "q2", "q3", "q4", "q5"] {
        assert_eq!(session.prefilled_from(q), Some(1), "{q} should be tagged");
    }

    session.set_answer("q3", "B").unwrap();

    assert_eq!(session.prefilled_from("q3"), None);
    for q in ["q1", "q2", "q4", "q5"] {
        assert_eq!(session.prefilled_from(q), Some(1));
    }
    sleep(Duration::from_millis(1)).await;
    assert_eq!(backend.persisted("q3", 2).as_deref(), Some("B"));
}

#[tokio::test(start_paused = true)]
async fn selective_prefill_copies_only_checked_questions() {
    let backend = FakeBackend::new(2, 3);
    let mut session = second_attempt(&backend).await;
    session.load_prefill_sources().await;

    let previews = session.prefill().previews();
    assert_eq!(previews.len(), 5);
    assert_eq!(previews[0].answer_preview, "B. Mitochondria");
    assert_eq!(previews[0].kind_label, "MCQ");
    assert_eq!(previews[2].is_correct, Some(false));
    assert!(previews.iter().all(|p| !p.selected));

    assert!(session.prefill_mut().toggle_question("q2"));
    assert!(session.prefill_mut().toggle_question("q5"));

    let report = session.prefill_selected().await.unwrap();
    assert_eq!(report.saved, vec!["q2".to_string(), "q5".to_string()]);
    assert_eq!(session.answered_count(), 2);
    assert!(session.answer("q1").is_none());
    assert!(session.prefill().selected_questions().is_empty());
    assert_eq!(backend.records_for(2), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_copies_stay_in_the_draft() {
    let backend = FakeBackend::new(2, 3);
    let mut session = second_attempt(&backend).await;
    session.load_prefill_sources().await;
    backend.fail_saves_for("q4");

    let err = session.prefill_all(1).await.unwrap_err();

    match err {
        AppError::PartialPrefillFailure { saved, failed } => {
            assert_eq!(saved, 4);
            assert_eq!(failed, vec!["q4".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(session.prefilled_from("q4"), Some(1));
    assert_eq!(backend.records_for(2), 4);
}

#[tokio::test(start_paused = true)]
async fn first_attempt_has_nothing_to_prefill() {
    let backend = FakeBackend::new(1, 3);
    let mut session = TestSession::open(config(), Arc::new(backend.clone()), ctx(), questions()).await;

    assert_eq!(session.load_prefill_sources().await, 0);
    assert!(matches!(
        session.prefill_all(1).await,
        Err(AppError::NoPrefillSource { attempt: 1 })
    ));
    assert!(matches!(
        session.prefill_mut().select_attempt(1),
        Err(AppError::NoPrefillSource { attempt: 1 })
    ));
}

#[tokio::test(start_paused = true)]
async fn clearing_a_prefilled_answer_sends_delete() {
    let backend = FakeBackend::new(2, 3);
    let mut session = second_attempt(&backend).await;
    session.load_prefill_sources().await;
    session.prefill_all(1).await.unwrap();
    assert_eq!(backend.persisted("q2", 2).as_deref(), Some("chlorophyll"));

    session.clear_answer("q2").unwrap();
    sleep(DEBOUNCE * 2).await;

    assert_eq!(session.prefilled_from("q2"), None);
    assert!(session.answer("q2").is_none());
    let saves = backend.saves_for("q2");
    assert_eq!(saves.last().unwrap().answer, json!({"text_response": ""}));
    assert_eq!(saves.last().unwrap().attempt, 2);
    assert_eq!(backend.persisted("q2", 2), None);
    assert_eq!(backend.persisted("q2", 1).as_deref(), Some("chlorophyll"));
    assert_eq!(session.prefilled_from("q1"), Some(1));
}
