use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use adaptive_learning::models::{
    AnswerEvent, Goal, KnowledgePoint, LearningPath, MasteryRecord, PathStatus,
    RecommendationType, ResourceBundle,
};
use adaptive_learning::path::PathRequest;
use adaptive_learning::store::MasteryUpdate;
use adaptive_learning::{AdaptiveEngine, EngineError, LearningStore, MemoryStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

fn point(id: &str, parent_id: Option<&str>, difficulty: u8) -> KnowledgePoint {
    KnowledgePoint {
        id: id.to_string(),
        name: id.to_string(),
        description: String::new(),
        subject: "math".to_string(),
        grade: "5".to_string(),
        difficulty,
        parent_id: parent_id.map(str::to_string),
        related_ids: Vec::new(),
        tags: Vec::new(),
        resources: ResourceBundle {
            videos: vec![format!("video-{id}")],
            ..ResourceBundle::default()
        },
    }
}

fn math_graph() -> Vec<KnowledgePoint> {
    vec![
        point("numbers", None, 1),
        point("fractions", Some("numbers"), 2),
        point("decimals", Some("fractions"), 3),
        point("geometry", None, 2),
    ]
}

fn event(user_id: &str, point_id: &str, correct: bool, seconds: f64) -> AnswerEvent {
    AnswerEvent {
        user_id: user_id.to_string(),
        knowledge_point_id: point_id.to_string(),
        difficulty_level: 3,
        correct,
        answer_time_seconds: seconds,
        hint_used: false,
        answered_at: Utc::now(),
    }
}

fn record(user_id: &str, point_id: &str, level: u8, last_practice_at: DateTime<Utc>) -> MasteryRecord {
    MasteryRecord {
        user_id: user_id.to_string(),
        knowledge_point_id: point_id.to_string(),
        total_questions: 10,
        correct_count: if level >= 3 { 9 } else { 3 },
        wrong_count: if level >= 3 { 1 } else { 7 },
        avg_answer_time_seconds: 24.0,
        fastest_answer_time: 12.0,
        slowest_answer_time: 38.0,
        consecutive_correct: 0,
        consecutive_wrong: 1,
        repeated_errors: 0,
        mastery_level: level,
        first_practice_at: last_practice_at - Duration::days(30),
        last_practice_at,
        practice_days: 6,
        version: 10,
    }
}

fn engine() -> AdaptiveEngine<MemoryStore> {
    AdaptiveEngine::new(MemoryStore::new(math_graph()))
}

#[tokio::test]
async fn first_correct_answer_scores_level_three() {
    let engine = engine();
    let record = engine
        .record_answer(&event("ana", "fractions", true, 20.0))
        .await
        .unwrap();

    assert_eq!(record.total_questions, 1);
    assert_eq!(record.mastery_level, 3);
    assert_eq!(engine.mastery_records("ana").await.unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_answers_leave_no_trace() {
    let engine = engine();

    let unknown = engine.record_answer(&event("ana", "calculus", true, 20.0)).await;
    assert!(matches!(unknown, Err(EngineError::KnowledgePointNotFound(id)) if id == "calculus"));

    let negative = engine.record_answer(&event("ana", "fractions", true, -3.0)).await;
    assert!(matches!(negative, Err(EngineError::InvalidInput(_))));

    assert!(engine.mastery_records("ana").await.unwrap().is_empty());
    assert!(engine
        .store()
        .recent_attempts("ana", "fractions", 5)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_answers_on_one_point_are_not_lost() {
    let engine = Arc::new(engine());
    let mut handles = Vec::new();
    for index in 0..40 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .record_answer(&event("ana", "fractions", index % 3 != 0, 20.0))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let record = engine
        .store()
        .mastery_record("ana", "fractions")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.total_questions, 40);
    assert_eq!(record.correct_count + record.wrong_count, 40);
    assert_eq!(record.correct_count, 26);
    assert!(record.consecutive_correct == 0 || record.consecutive_wrong == 0);
    assert_eq!(record.version, 40);
}

#[tokio::test]
async fn difficulty_follows_recent_streaks() {
    let engine = engine();
    for _ in 0..3 {
        engine
            .record_answer(&event("ana", "fractions", true, 20.0))
            .await
            .unwrap();
    }
    let up = engine.adjust_difficulty("ana", "fractions", 3).await.unwrap();
    assert_eq!(up.new_difficulty, 4);

    for _ in 0..2 {
        engine
            .record_answer(&event("ben", "fractions", false, 20.0))
            .await
            .unwrap();
    }
    let down = engine.adjust_difficulty("ben", "fractions", 3).await.unwrap();
    assert_eq!(down.new_difficulty, 2);
}

#[tokio::test]
async fn cold_learner_is_held_at_fundamentals() {
    let engine = engine();
    for _ in 0..3 {
        engine
            .record_answer(&event("cy", "decimals", true, 9.0))
            .await
            .unwrap();
    }
    engine
        .store()
        .insert_record(record("cy", "decimals", 0, Utc::now()));

    let adjustment = engine.adjust_difficulty("cy", "decimals", 4).await.unwrap();
    assert_eq!(adjustment.new_difficulty, 2);
    assert_eq!(adjustment.reason, "build fundamentals first");
}

#[tokio::test]
async fn difficulty_for_unknown_point_is_rejected() {
    let engine = engine();
    assert!(matches!(
        engine.adjust_difficulty("ana", "calculus", 3).await,
        Err(EngineError::KnowledgePointNotFound(id)) if id == "calculus"
    ));
}

/// Wraps a `MemoryStore` and fails the first `failures` answer writes, the
/// way a store whose attempt-log insert errors rolls back the whole write.
struct UnreliableLog {
    inner: MemoryStore,
    failures: AtomicUsize,
}

#[async_trait]
impl LearningStore for UnreliableLog {
    async fn knowledge_points(&self) -> adaptive_learning::Result<Vec<KnowledgePoint>> {
        self.inner.knowledge_points().await
    }

    async fn mastery_records(&self, user_id: &str) -> adaptive_learning::Result<Vec<MasteryRecord>> {
        self.inner.mastery_records(user_id).await
    }

    async fn mastery_record(
        &self,
        user_id: &str,
        knowledge_point_id: &str,
    ) -> adaptive_learning::Result<Option<MasteryRecord>> {
        self.inner.mastery_record(user_id, knowledge_point_id).await
    }

    async fn record_answer(
        &self,
        event: &AnswerEvent,
        update: MasteryUpdate<'_>,
    ) -> adaptive_learning::Result<MasteryRecord> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(EngineError::Sql(sqlx::Error::PoolTimedOut));
        }
        self.inner.record_answer(event, update).await
    }

    async fn recent_attempts(
        &self,
        user_id: &str,
        knowledge_point_id: &str,
        limit: usize,
    ) -> adaptive_learning::Result<Vec<AnswerEvent>> {
        self.inner
            .recent_attempts(user_id, knowledge_point_id, limit)
            .await
    }

    async fn save_path(&self, path: &LearningPath) -> adaptive_learning::Result<()> {
        self.inner.save_path(path).await
    }

    async fn load_path(&self, id: Uuid) -> adaptive_learning::Result<Option<LearningPath>> {
        self.inner.load_path(id).await
    }
}

#[tokio::test]
async fn failed_answer_write_is_not_counted_on_retry() {
    let engine = AdaptiveEngine::new(UnreliableLog {
        inner: MemoryStore::new(math_graph()),
        failures: AtomicUsize::new(2),
    });
    let answer = event("ana", "fractions", true, 20.0);

    for _ in 0..2 {
        assert!(matches!(
            engine.record_answer(&answer).await,
            Err(EngineError::Sql(_))
        ));
    }
    assert!(engine
        .store()
        .mastery_record("ana", "fractions")
        .await
        .unwrap()
        .is_none());
    assert!(engine
        .store()
        .recent_attempts("ana", "fractions", 5)
        .await
        .unwrap()
        .is_empty());

    let record = engine.record_answer(&answer).await.unwrap();
    assert_eq!(record.total_questions, 1);
    assert_eq!(
        engine
            .store()
            .recent_attempts("ana", "fractions", 5)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn cyclic_prerequisites_abort_path_generation() {
    let store = MemoryStore::new(vec![
        point("a", Some("b"), 1),
        point("b", Some("a"), 1),
        point("c", None, 1),
    ]);
    let now = Utc::now();
    for id in ["a", "b", "c"] {
        store.insert_record(record("ana", id, 2, now));
    }
    let engine = AdaptiveEngine::new(store);

    let result = engine
        .generate_path(&PathRequest {
            user_id: "ana".to_string(),
            subject: "math".to_string(),
            grade: None,
            goal: Goal::ReviewAll,
            day_budget: 10,
            daily_minutes: 60,
            weak_threshold: 0.6,
        })
        .await;
    match result {
        Err(EngineError::CyclicDependency(ids)) => assert_eq!(ids, vec!["a", "b"]),
        other => panic!("expected a cycle error, got {other:?}"),
    }
}

#[tokio::test]
async fn generated_path_can_be_advanced_to_completion() {
    let engine = engine();
    let now = Utc::now();
    engine.store().insert_record(record("ana", "numbers", 1, now));
    engine.store().insert_record(record("ana", "fractions", 2, now));

    let path = engine
        .generate_path(&PathRequest {
            user_id: "ana".to_string(),
            subject: "math".to_string(),
            grade: Some("5".to_string()),
            goal: Goal::ImproveWeakPoints,
            day_budget: 5,
            daily_minutes: 45,
            weak_threshold: 0.6,
        })
        .await
        .unwrap();
    let ids: Vec<&str> = path
        .steps
        .iter()
        .map(|step| step.knowledge_point_id.as_str())
        .collect();
    assert_eq!(ids, vec!["numbers", "fractions"]);
    assert_eq!(path.estimated_days, 2);

    let advanced = engine.advance_path(path.id, 0).await.unwrap();
    assert_eq!(advanced.current_step, 1);
    let done = engine.advance_path(path.id, 1).await.unwrap();
    assert_eq!(done.status, PathStatus::Completed);
    assert!(matches!(
        engine.advance_path(path.id, 1).await,
        Err(EngineError::InvalidInput(_))
    ));

    let missing = uuid::Uuid::new_v4();
    assert!(matches!(
        engine.advance_path(missing, 0).await,
        Err(EngineError::PathNotFound(id)) if id == missing
    ));
}

#[tokio::test]
async fn weak_point_comes_before_week_old_review() {
    let engine = engine();
    let now = Utc::now();
    engine.store().insert_record(record("ana", "geometry", 1, now));
    engine
        .store()
        .insert_record(record("ana", "numbers", 4, now - Duration::days(7)));

    let recommendations = engine.recommend("ana", 5).await.unwrap();
    assert_eq!(recommendations[0].kind, RecommendationType::WeakPoint);
    assert_eq!(recommendations[0].knowledge_point_id, "geometry");
    assert_eq!(recommendations[0].priority, 9);
    assert!(recommendations[0].reason.starts_with("weak point: "));
    assert_eq!(recommendations[1].kind, RecommendationType::Review);
    assert_eq!(recommendations[1].knowledge_point_id, "numbers");
    assert_eq!(recommendations[1].priority, 4);
    assert_eq!(recommendations[2].kind, RecommendationType::Advance);
    assert_eq!(recommendations[2].knowledge_point_id, "fractions");
}

#[tokio::test]
async fn learner_without_records_gets_empty_diagnoses() {
    let engine = engine();
    assert!(engine
        .detect_weak_points("nobody", None, None)
        .await
        .unwrap()
        .is_empty());
    assert!(matches!(
        engine.detect_weak_points("nobody", None, Some(2.0)).await,
        Err(EngineError::InvalidInput(_))
    ));
}
