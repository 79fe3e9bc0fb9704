use std::sync::Arc;

use quiz_core::model::{
    ExamId, PlanLimits, PlanTier, Question, QuestionFilter, QuestionId, UserId,
};
use quiz_core::policy::ReasonCode;
use quiz_core::time::fixed_now;
use services::{
    AdvanceOutcome, Clock, CountdownFired, EntitlementAdmin, QuizLoopService, SessionResume,
    SessionStart,
};
use storage::repository::{
    EntitlementStore, InMemoryStore, ProgressStore, QuestionRepository, SummaryRepository,
};

fn build_question(id: u64, exam: &str) -> Question {
    Question::new(
        QuestionId::new(id),
        format!("Q{id}"),
        vec!["a".into(), "b".into(), "c".into(), "d".into()],
        1,
    )
    .unwrap()
    .with_exam(ExamId::new(exam))
    .with_subject("Português")
    .with_explanation(format!("Because b, question {id}."))
}

async fn seed_questions(store: &InMemoryStore, exam: &str, count: u64) {
    for id in 1..=count {
        store.upsert_question(&build_question(id, exam)).await.unwrap();
    }
}

fn service(store: &InMemoryStore, clock: Clock, limits: PlanLimits) -> QuizLoopService {
    QuizLoopService::new(
        clock,
        limits,
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
    )
}

fn started(outcome: SessionStart) -> services::QuizSession {
    match outcome {
        SessionStart::Started(session) => session,
        SessionStart::Denied(decision) => panic!("unexpected denial: {decision:?}"),
    }
}

#[tokio::test]
async fn full_run_persists_summary_and_counts_quota() {
    let store = InMemoryStore::new();
    seed_questions(&store, "TRT-RJ", 3).await;
    let user = UserId::new("ana");
    let svc = service(&store, Clock::fixed(fixed_now()), PlanLimits::default());

    let filter = QuestionFilter::new().with_exam(ExamId::new("TRT-RJ"));
    let mut session = started(svc.start_session(&user, filter).await.unwrap());

    loop {
        session.select_option(1).unwrap();
        let record = svc.confirm_answer(&mut session).await.unwrap();
        assert!(record.correct);
        let result = svc.advance(&mut session).await.unwrap();
        if result.outcome == AdvanceOutcome::Finished {
            assert!(result.denial.is_none());
            break;
        }
    }

    assert!(session.is_finished());
    assert_eq!(session.answers().len(), 3);

    let summary_id = session.summary_id().expect("summary persisted");
    let summaries = store.summaries_for_user(&user, 10).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].id(), summary_id);
    assert_eq!(summaries[0].total_answered(), 3);
    assert_eq!(summaries[0].total_correct(), 3);

    // Three reveals on a capped tier consumed three quota units.
    let record = store.read(&user).await.unwrap().unwrap();
    assert_eq!(record.counted_today, 3);
}

#[tokio::test]
async fn exhausted_quota_finishes_the_session_early() {
    let store = InMemoryStore::new();
    seed_questions(&store, "TRT-RJ", 5).await;
    let user = UserId::new("ana");
    let limits = PlanLimits::new(2, 30, 30).unwrap();
    let svc = service(&store, Clock::fixed(fixed_now()), limits);

    let mut session = started(
        svc.start_session(&user, QuestionFilter::new())
            .await
            .unwrap(),
    );

    session.select_option(1).unwrap();
    svc.confirm_answer(&mut session).await.unwrap();
    let first = svc.advance(&mut session).await.unwrap();
    assert_eq!(first.outcome, AdvanceOutcome::Next);

    session.select_option(1).unwrap();
    svc.confirm_answer(&mut session).await.unwrap();
    let second = svc.advance(&mut session).await.unwrap();

    assert_eq!(second.outcome, AdvanceOutcome::Finished);
    let denial = second.denial.expect("policy denial");
    assert_eq!(denial.reason(), ReasonCode::QuotaExhausted);
    assert_eq!(denial.required_tier(), Some(PlanTier::Individual));

    // The two answered questions keep their score.
    assert!(session.is_finished());
    assert_eq!(session.answers().len(), 2);
    let summaries = store.summaries_for_user(&user, 10).await.unwrap();
    assert_eq!(summaries[0].total_answered(), 2);
}

#[tokio::test]
async fn save_exit_then_resume_round_trip() {
    let store = InMemoryStore::new();
    seed_questions(&store, "TRT-RJ", 4).await;
    let user = UserId::new("ana");
    let svc = service(&store, Clock::fixed(fixed_now()), PlanLimits::default());

    let filter = QuestionFilter::new().with_exam(ExamId::new("TRT-RJ"));
    let mut session = started(svc.start_session(&user, filter).await.unwrap());

    session.select_option(1).unwrap();
    svc.confirm_answer(&mut session).await.unwrap();
    svc.advance(&mut session).await.unwrap();

    // Saving twice in a row persists the same snapshot.
    svc.exit_session(&session, true).await.unwrap();
    let first_blob = store.get(&user).await.unwrap();
    svc.exit_session(&session, true).await.unwrap();
    assert_eq!(store.get(&user).await.unwrap(), first_blob);

    let resumed = match svc.resume_session(&user).await.unwrap() {
        SessionResume::Resumed(session) => session,
        other => panic!("expected resume, got {other:?}"),
    };
    assert_eq!(resumed.current_index(), 1);
    assert_eq!(resumed.answers(), session.answers());
    assert_eq!(resumed.filter(), session.filter());
}

#[tokio::test]
async fn resume_is_denied_after_entitlement_changes() {
    let store = InMemoryStore::new();
    seed_questions(&store, "TRT-RJ", 2).await;
    let user = UserId::new("ana");
    let clock = Clock::fixed(fixed_now());
    let admin = EntitlementAdmin::new(Arc::new(store.clone()), clock);
    admin
        .set_plan(&user, PlanTier::Individual, Some(&ExamId::new("TRT-RJ")))
        .await
        .unwrap();

    let svc = service(&store, clock, PlanLimits::default());
    let filter = QuestionFilter::new().with_exam(ExamId::new("TRT-RJ"));
    let session = started(svc.start_session(&user, filter).await.unwrap());
    svc.exit_session(&session, true).await.unwrap();

    // The purchased exam changes while the session is parked.
    admin
        .set_plan(&user, PlanTier::Individual, Some(&ExamId::new("INSS")))
        .await
        .unwrap();

    match svc.resume_session(&user).await.unwrap() {
        SessionResume::Denied(decision) => {
            assert_eq!(decision.reason(), ReasonCode::ExamNotGranted);
        }
        other => panic!("expected denial, got {other:?}"),
    }
    // The snapshot survives the denial; re-granting makes it resumable.
    admin
        .set_plan(&user, PlanTier::Individual, Some(&ExamId::new("TRT-RJ")))
        .await
        .unwrap();
    assert!(matches!(
        svc.resume_session(&user).await.unwrap(),
        SessionResume::Resumed(_)
    ));
}

#[tokio::test]
async fn discarding_exit_clears_the_snapshot() {
    let store = InMemoryStore::new();
    seed_questions(&store, "TRT-RJ", 2).await;
    let user = UserId::new("ana");
    let svc = service(&store, Clock::fixed(fixed_now()), PlanLimits::default());

    let session = started(
        svc.start_session(&user, QuestionFilter::new())
            .await
            .unwrap(),
    );
    svc.exit_session(&session, true).await.unwrap();
    assert!(store.get(&user).await.unwrap().is_some());

    svc.exit_session(&session, false).await.unwrap();
    assert!(store.get(&user).await.unwrap().is_none());
    assert!(matches!(
        svc.resume_session(&user).await.unwrap(),
        SessionResume::Absent
    ));
}

#[tokio::test]
async fn lapsed_trial_cannot_start() {
    let store = InMemoryStore::new();
    seed_questions(&store, "TRT-RJ", 2).await;
    let user = UserId::new("ana");

    let trial_entry = fixed_now() - chrono::Duration::days(31);
    let admin = EntitlementAdmin::new(Arc::new(store.clone()), Clock::fixed(trial_entry));
    admin.set_plan(&user, PlanTier::Trial, None).await.unwrap();

    let svc = service(&store, Clock::fixed(fixed_now()), PlanLimits::default());
    match svc
        .start_session(&user, QuestionFilter::new())
        .await
        .unwrap()
    {
        SessionStart::Denied(decision) => {
            assert_eq!(decision.reason(), ReasonCode::TrialExpired);
        }
        SessionStart::Started(_) => panic!("expected trial-expired denial"),
    }
}

#[tokio::test]
async fn stale_countdown_event_is_discarded() {
    let store = InMemoryStore::new();
    seed_questions(&store, "TRT-RJ", 2).await;
    let user = UserId::new("ana");
    let svc = service(&store, Clock::fixed(fixed_now()), PlanLimits::default());

    let mut session = started(
        svc.start_session(&user, QuestionFilter::new())
            .await
            .unwrap(),
    );

    session.select_option(1).unwrap();
    svc.confirm_answer(&mut session).await.unwrap();
    svc.advance(&mut session).await.unwrap();

    // An expiry for question 0 arriving after the advance must be ignored.
    let stale = svc
        .timer_expired(&mut session, CountdownFired { question_index: 0 })
        .await
        .unwrap();
    assert!(stale.is_none());
    assert_eq!(session.answers().len(), 1);

    // A current-question expiry is honored and records the sentinel.
    let fired = svc
        .timer_expired(&mut session, CountdownFired { question_index: 1 })
        .await
        .unwrap()
        .expect("expiry for the live question");
    assert!(fired.selection.is_time_expired());
    assert_eq!(session.answers().len(), 2);
}

#[tokio::test]
async fn free_tier_is_denied_explanations_but_trial_is_not() {
    let store = InMemoryStore::new();
    seed_questions(&store, "TRT-RJ", 1).await;
    let user = UserId::new("ana");
    let clock = Clock::fixed(fixed_now());
    let svc = service(&store, clock, PlanLimits::default());

    let mut session = started(
        svc.start_session(&user, QuestionFilter::new())
            .await
            .unwrap(),
    );
    session.select_option(1).unwrap();
    svc.confirm_answer(&mut session).await.unwrap();

    match svc.view_explanation(&session).await.unwrap() {
        services::ExplanationAccess::Denied(decision) => {
            assert_eq!(decision.reason(), ReasonCode::PlanRestricted);
        }
        other => panic!("expected denial, got {other:?}"),
    }

    let admin = EntitlementAdmin::new(Arc::new(store.clone()), clock);
    admin.set_plan(&user, PlanTier::Trial, None).await.unwrap();

    match svc.view_explanation(&session).await.unwrap() {
        services::ExplanationAccess::Granted(text) => {
            assert_eq!(text.as_deref(), Some("Because b, question 1."));
        }
        other => panic!("expected explanation, got {other:?}"),
    }
}
