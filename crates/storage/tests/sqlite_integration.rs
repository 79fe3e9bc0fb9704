use chrono::Duration;
use quiz_core::model::{
    AccountStatus, AnswerRecord, ExamId, PlanTier, Question, QuestionFilter, QuestionId,
    QuizSummary, Selection, UserId,
};
use quiz_core::time::fixed_now;
use storage::repository::{
    EntitlementStore, ProgressStore, QuestionRepository, StorageError, SummaryRepository,
};
use storage::sqlite::SqliteRepository;

fn build_question(id: u64, exam: &str, subject: &str) -> Question {
    Question::new(
        QuestionId::new(id),
        format!("Q{id}"),
        vec!["a".into(), "b".into(), "c".into(), "d".into()],
        1,
    )
    .unwrap()
    .with_exam(ExamId::new(exam))
    .with_subject(subject)
    .with_explanation("Because b.")
    .with_year(2024)
}

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_roundtrip_persists_questions_with_tags() {
    let repo = connect("memdb_questions").await;

    repo.upsert_question(&build_question(1, "TRT-RJ", "Português"))
        .await
        .unwrap();
    repo.upsert_question(&build_question(2, "INSS", "Direito"))
        .await
        .unwrap();
    repo.upsert_question(
        &build_question(3, "TRT-RJ", "Direito").with_min_tier(PlanTier::Individual),
    )
    .await
    .unwrap();

    let filter = QuestionFilter::new().with_exam(ExamId::new("TRT-RJ"));
    let set = repo.working_set(&filter).await.unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(set[0].id(), QuestionId::new(1));
    assert_eq!(set[0].explanation(), Some("Because b."));
    assert_eq!(set[1].min_tier(), Some(PlanTier::Individual));

    let frozen = repo
        .questions_by_ids(&[QuestionId::new(3), QuestionId::new(1)])
        .await
        .unwrap();
    assert_eq!(frozen[0].id(), QuestionId::new(3));
    assert_eq!(frozen[1].id(), QuestionId::new(1));

    let err = repo
        .questions_by_ids(&[QuestionId::new(99)])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn sqlite_entitlement_record_tracks_plan_grants_and_counter() {
    let repo = connect("memdb_entitlements").await;
    let user = UserId::new("ana");
    let now = fixed_now();
    let today = now.date_naive();

    assert!(repo.read(&user).await.unwrap().is_none());

    repo.set_plan(&user, PlanTier::Trial, None, now).await.unwrap();
    repo.write_grant(&user, &ExamId::new("TRT-RJ"), now, Some(now + Duration::days(30)))
        .await
        .unwrap();
    repo.set_status(&user, AccountStatus::Suspended).await.unwrap();

    assert_eq!(repo.increment_quota(&user, today).await.unwrap(), 1);
    assert_eq!(repo.increment_quota(&user, today).await.unwrap(), 2);
    let tomorrow = today.succ_opt().unwrap();
    assert_eq!(repo.increment_quota(&user, tomorrow).await.unwrap(), 1);

    let record = repo.read(&user).await.unwrap().unwrap();
    assert_eq!(record.plan.as_deref(), Some("trial"));
    assert_eq!(record.status.as_deref(), Some("suspended"));
    assert_eq!(record.trial_started_at, Some(now));
    assert_eq!(record.counted_today, 1);
    assert_eq!(record.counter_date, Some(tomorrow));
    assert_eq!(record.grants.len(), 1);
    assert_eq!(record.grants[0].exam, "TRT-RJ");

    repo.revoke_grant(&user, &ExamId::new("TRT-RJ")).await.unwrap();
    let record = repo.read(&user).await.unwrap().unwrap();
    assert!(record.grants.is_empty());
}

#[tokio::test]
async fn sqlite_write_record_replaces_grants_wholesale() {
    let repo = connect("memdb_write_record").await;
    let user = UserId::new("ana");
    let now = fixed_now();

    repo.write_grant(&user, &ExamId::new("OLD"), now, None)
        .await
        .unwrap();

    let mut record = repo.read(&user).await.unwrap().unwrap();
    record.plan = Some("plus".into());
    record.grants = vec![storage::repository::GrantRecord {
        exam: "NEW".into(),
        granted_at: now,
        expires_at: None,
    }];
    repo.write_record(&record).await.unwrap();

    let back = repo.read(&user).await.unwrap().unwrap();
    assert_eq!(back.plan.as_deref(), Some("plus"));
    assert_eq!(back.grants.len(), 1);
    assert_eq!(back.grants[0].exam, "NEW");
}

#[tokio::test]
async fn sqlite_progress_blob_is_whole_record_replace() {
    let repo = connect("memdb_progress").await;
    let user = UserId::new("ana");

    assert_eq!(repo.get(&user).await.unwrap(), None);
    repo.set(&user, "{\"v\":1}").await.unwrap();
    repo.set(&user, "{\"v\":2}").await.unwrap();
    assert_eq!(repo.get(&user).await.unwrap().as_deref(), Some("{\"v\":2}"));

    repo.clear(&user).await.unwrap();
    assert_eq!(repo.get(&user).await.unwrap(), None);
    // Clearing an absent blob stays quiet.
    repo.clear(&user).await.unwrap();
}

#[tokio::test]
async fn sqlite_summary_roundtrip_keeps_subject_breakdown() {
    let repo = connect("memdb_summaries").await;
    let user = UserId::new("ana");
    let now = fixed_now();

    let answers: Vec<AnswerRecord> = (1..=3)
        .map(|id| {
            let q = build_question(id, "TRT-RJ", if id == 3 { "Direito" } else { "Português" });
            AnswerRecord::record(&q, Selection::Chosen(1), 10, 30)
        })
        .collect();
    let summary = QuizSummary::from_answers(
        user.clone(),
        Some(ExamId::new("TRT-RJ")),
        now,
        now + Duration::seconds(30),
        &answers,
    )
    .unwrap();

    repo.append_summary(&summary).await.unwrap();

    let listed = repo.summaries_for_user(&user, 10).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0], summary);
    assert_eq!(listed[0].subjects().len(), 2);
}
