use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Row};
use tracing::warn;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::models::{
    AnswerEvent, KnowledgePoint, LearningPath, LearningStep, MasteryRecord, PathStatus,
    ResourceBundle,
};
use crate::store::{LearningStore, MasteryUpdate};

pub async fn init_db(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub struct PgStore {
    pool: PgPool,
    max_retries: u32,
}

impl PgStore {
    pub fn new(pool: PgPool, max_retries: u32) -> Self {
        Self { pool, max_retries }
    }
}

fn point_from_row(row: &PgRow) -> std::result::Result<KnowledgePoint, sqlx::Error> {
    let difficulty: i16 = row.try_get("difficulty")?;
    let resources: Json<ResourceBundle> = row.try_get("resources")?;
    Ok(KnowledgePoint {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        subject: row.try_get("subject")?,
        grade: row.try_get("grade")?,
        difficulty: difficulty.clamp(1, 5) as u8,
        parent_id: row.try_get("parent_id")?,
        related_ids: row.try_get("related_ids")?,
        tags: row.try_get("tags")?,
        resources: resources.0,
    })
}

fn record_from_row(row: &PgRow) -> std::result::Result<MasteryRecord, sqlx::Error> {
    let mastery_level: i16 = row.try_get("mastery_level")?;
    Ok(MasteryRecord {
        user_id: row.try_get("user_id")?,
        knowledge_point_id: row.try_get("knowledge_point_id")?,
        total_questions: row.try_get("total_questions")?,
        correct_count: row.try_get("correct_count")?,
        wrong_count: row.try_get("wrong_count")?,
        avg_answer_time_seconds: row.try_get("avg_answer_time_seconds")?,
        fastest_answer_time: row.try_get("fastest_answer_time")?,
        slowest_answer_time: row.try_get("slowest_answer_time")?,
        consecutive_correct: row.try_get("consecutive_correct")?,
        consecutive_wrong: row.try_get("consecutive_wrong")?,
        repeated_errors: row.try_get("repeated_errors")?,
        mastery_level: mastery_level.clamp(0, 5) as u8,
        first_practice_at: row.try_get("first_practice_at")?,
        last_practice_at: row.try_get("last_practice_at")?,
        practice_days: row.try_get("practice_days")?,
        version: row.try_get("version")?,
    })
}

fn event_from_row(row: &PgRow) -> std::result::Result<AnswerEvent, sqlx::Error> {
    let difficulty: i16 = row.try_get("difficulty")?;
    Ok(AnswerEvent {
        user_id: row.try_get("user_id")?,
        knowledge_point_id: row.try_get("knowledge_point_id")?,
        difficulty_level: difficulty.clamp(1, 5) as u8,
        correct: row.try_get("correct")?,
        answer_time_seconds: row.try_get("answer_time_seconds")?,
        hint_used: row.try_get("hint_used")?,
        answered_at: row.try_get("answered_at")?,
    })
}

fn path_from_row(row: &PgRow) -> Result<LearningPath> {
    let goal: String = row.try_get("goal")?;
    let status: String = row.try_get("status")?;
    let steps: Json<Vec<LearningStep>> = row.try_get("steps")?;
    let total_steps: i32 = row.try_get("total_steps")?;
    let estimated_days: i32 = row.try_get("estimated_days")?;
    let current_step: i32 = row.try_get("current_step")?;
    Ok(LearningPath {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        goal: goal.parse()?,
        steps: steps.0,
        total_steps: total_steps.max(0) as usize,
        estimated_days: estimated_days.max(0) as u32,
        current_step: current_step.max(0) as usize,
        status: status.parse::<PathStatus>()?,
        created_at: row.try_get("created_at")?,
    })
}

const RECORD_COLUMNS: &str = "user_id, knowledge_point_id, total_questions, correct_count, \
     wrong_count, avg_answer_time_seconds, fastest_answer_time, slowest_answer_time, \
     consecutive_correct, consecutive_wrong, repeated_errors, mastery_level, \
     first_practice_at, last_practice_at, practice_days, version";

async fn select_record(
    conn: &mut PgConnection,
    user_id: &str,
    knowledge_point_id: &str,
) -> Result<Option<MasteryRecord>> {
    let query = format!(
        "SELECT {RECORD_COLUMNS} FROM adaptive_learning.mastery_records \
         WHERE user_id = $1 AND knowledge_point_id = $2"
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .bind(knowledge_point_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.as_ref().map(record_from_row).transpose()?)
}

async fn insert_record(conn: &mut PgConnection, record: &MasteryRecord) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO adaptive_learning.mastery_records
        (user_id, knowledge_point_id, total_questions, correct_count, wrong_count,
         avg_answer_time_seconds, fastest_answer_time, slowest_answer_time,
         consecutive_correct, consecutive_wrong, repeated_errors, mastery_level,
         first_practice_at, last_practice_at, practice_days, version)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        ON CONFLICT (user_id, knowledge_point_id) DO NOTHING
        "#,
    )
    .bind(&record.user_id)
    .bind(&record.knowledge_point_id)
    .bind(record.total_questions)
    .bind(record.correct_count)
    .bind(record.wrong_count)
    .bind(record.avg_answer_time_seconds)
    .bind(record.fastest_answer_time)
    .bind(record.slowest_answer_time)
    .bind(record.consecutive_correct)
    .bind(record.consecutive_wrong)
    .bind(record.repeated_errors)
    .bind(record.mastery_level as i16)
    .bind(record.first_practice_at)
    .bind(record.last_practice_at)
    .bind(record.practice_days)
    .bind(record.version)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn update_record(
    conn: &mut PgConnection,
    record: &MasteryRecord,
    expected_version: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE adaptive_learning.mastery_records
        SET total_questions = $3, correct_count = $4, wrong_count = $5,
            avg_answer_time_seconds = $6, fastest_answer_time = $7,
            slowest_answer_time = $8, consecutive_correct = $9, consecutive_wrong = $10,
            repeated_errors = $11, mastery_level = $12, last_practice_at = $13,
            practice_days = $14, version = $15
        WHERE user_id = $1 AND knowledge_point_id = $2 AND version = $16
        "#,
    )
    .bind(&record.user_id)
    .bind(&record.knowledge_point_id)
    .bind(record.total_questions)
    .bind(record.correct_count)
    .bind(record.wrong_count)
    .bind(record.avg_answer_time_seconds)
    .bind(record.fastest_answer_time)
    .bind(record.slowest_answer_time)
    .bind(record.consecutive_correct)
    .bind(record.consecutive_wrong)
    .bind(record.repeated_errors)
    .bind(record.mastery_level as i16)
    .bind(record.last_practice_at)
    .bind(record.practice_days)
    .bind(record.version)
    .bind(expected_version)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn insert_attempt(conn: &mut PgConnection, event: &AnswerEvent) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO adaptive_learning.answer_log
        (id, user_id, knowledge_point_id, difficulty, correct, answer_time_seconds,
         hint_used, answered_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&event.user_id)
    .bind(&event.knowledge_point_id)
    .bind(event.difficulty_level as i16)
    .bind(event.correct)
    .bind(event.answer_time_seconds)
    .bind(event.hint_used)
    .bind(event.answered_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[async_trait]
impl LearningStore for PgStore {
    async fn knowledge_points(&self) -> Result<Vec<KnowledgePoint>> {
        let rows = sqlx::query(
            "SELECT id, name, description, subject, grade, difficulty, parent_id, \
             related_ids, tags, resources \
             FROM adaptive_learning.knowledge_points",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut points = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            points.push(point_from_row(row)?);
        }
        Ok(points)
    }

    async fn mastery_records(&self, user_id: &str) -> Result<Vec<MasteryRecord>> {
        let query = format!(
            "SELECT {RECORD_COLUMNS} FROM adaptive_learning.mastery_records \
             WHERE user_id = $1 ORDER BY knowledge_point_id"
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            records.push(record_from_row(row)?);
        }
        Ok(records)
    }

    async fn mastery_record(
        &self,
        user_id: &str,
        knowledge_point_id: &str,
    ) -> Result<Option<MasteryRecord>> {
        let mut conn = self.pool.acquire().await?;
        select_record(&mut conn, user_id, knowledge_point_id).await
    }

    async fn record_answer(
        &self,
        event: &AnswerEvent,
        update: MasteryUpdate<'_>,
    ) -> Result<MasteryRecord> {
        let user_id = event.user_id.as_str();
        let knowledge_point_id = event.knowledge_point_id.as_str();

        for attempt in 0..=self.max_retries {
            let mut tx = self.pool.begin().await?;
            let current = select_record(&mut tx, user_id, knowledge_point_id).await?;
            let next = update(current.as_ref());
            let written = match current.as_ref() {
                None => insert_record(&mut tx, &next).await?,
                Some(previous) => update_record(&mut tx, &next, previous.version).await?,
            };
            if written {
                insert_attempt(&mut tx, event).await?;
                tx.commit().await?;
                return Ok(next);
            }
            tx.rollback().await?;
            warn!(
                user_id,
                knowledge_point_id,
                attempt,
                "mastery record changed underneath us, retrying"
            );
        }

        Err(EngineError::Conflict {
            user_id: user_id.to_string(),
            knowledge_point_id: knowledge_point_id.to_string(),
        })
    }

    async fn recent_attempts(
        &self,
        user_id: &str,
        knowledge_point_id: &str,
        limit: usize,
    ) -> Result<Vec<AnswerEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, knowledge_point_id, difficulty, correct, answer_time_seconds,
                   hint_used, answered_at
            FROM adaptive_learning.answer_log
            WHERE user_id = $1 AND knowledge_point_id = $2
            ORDER BY answered_at DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(knowledge_point_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows.iter().rev() {
            events.push(event_from_row(row)?);
        }
        Ok(events)
    }

    async fn save_path(&self, path: &LearningPath) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO adaptive_learning.learning_paths
            (id, user_id, goal, steps, total_steps, estimated_days, current_step, status,
             created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE
            SET current_step = EXCLUDED.current_step, status = EXCLUDED.status,
                updated_at = now()
            "#,
        )
        .bind(path.id)
        .bind(&path.user_id)
        .bind(path.goal.as_str())
        .bind(Json(&path.steps))
        .bind(path.total_steps as i32)
        .bind(path.estimated_days as i32)
        .bind(path.current_step as i32)
        .bind(path.status.as_str())
        .bind(path.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_path(&self, id: Uuid) -> Result<Option<LearningPath>> {
        let row = sqlx::query(
            "SELECT id, user_id, goal, steps, total_steps, estimated_days, current_step, \
             status, created_at \
             FROM adaptive_learning.learning_paths WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(path_from_row).transpose()
    }
}

fn resources(videos: &[&str], articles: &[&str], games: &[&str]) -> ResourceBundle {
    let owned = |items: &[&str]| -> Vec<String> { items.iter().map(|item| item.to_string()).collect() };
    ResourceBundle {
        videos: owned(videos),
        articles: owned(articles),
        games: owned(games),
        questions: Vec::new(),
    }
}

/// Grade 5 math graph used by `seed`. Parents are listed before their dependents.
pub fn seed_points() -> Vec<KnowledgePoint> {
    let point = |id: &str,
                 name: &str,
                 difficulty: u8,
                 parent_id: Option<&str>,
                 related: &[&str],
                 tags: &[&str],
                 bundle: ResourceBundle| KnowledgePoint {
        id: id.to_string(),
        name: name.to_string(),
        description: format!("{name} for grade 5 math"),
        subject: "math".to_string(),
        grade: "5".to_string(),
        difficulty,
        parent_id: parent_id.map(str::to_string),
        related_ids: related.iter().map(|r| r.to_string()).collect(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        resources: bundle,
    };

    vec![
        point(
            "math-5-place-value",
            "Place value",
            1,
            None,
            &[],
            &["fundamental"],
            resources(&["video-place-value"], &["article-place-value"], &["game-number-line"]),
        ),
        point(
            "math-5-fractions",
            "Fractions",
            2,
            Some("math-5-place-value"),
            &["math-5-decimals"],
            &["fundamental"],
            resources(
                &["video-fractions-intro", "video-fraction-strips"],
                &["article-equivalent-fractions"],
                &["game-pizza-fractions"],
            ),
        ),
        point(
            "math-5-decimals",
            "Decimals",
            3,
            Some("math-5-fractions"),
            &[],
            &[],
            resources(&["video-decimals"], &["article-decimal-places"], &[]),
        ),
        point(
            "math-5-percentages",
            "Percentages",
            4,
            Some("math-5-decimals"),
            &["math-5-ratios"],
            &[],
            resources(&["video-percent"], &[], &["game-discount-shop"]),
        ),
        point(
            "math-5-ratios",
            "Ratios",
            3,
            Some("math-5-fractions"),
            &[],
            &[],
            resources(&["video-ratios"], &["article-ratio-tables"], &[]),
        ),
        point(
            "math-5-area",
            "Area of rectangles",
            2,
            None,
            &[],
            &["geometry"],
            resources(&["video-area"], &["article-area"], &["game-tile-builder"]),
        ),
        point(
            "math-5-volume",
            "Volume of boxes",
            3,
            Some("math-5-area"),
            &[],
            &["geometry"],
            resources(&["video-volume"], &[], &[]),
        ),
    ]
}

pub async fn seed(pool: &PgPool) -> Result<usize> {
    let points = seed_points();
    for point in points.iter() {
        sqlx::query(
            r#"
            INSERT INTO adaptive_learning.knowledge_points
            (id, name, description, subject, grade, difficulty, parent_id, related_ids, tags,
             resources)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, description = EXCLUDED.description,
                difficulty = EXCLUDED.difficulty, parent_id = EXCLUDED.parent_id,
                related_ids = EXCLUDED.related_ids, tags = EXCLUDED.tags,
                resources = EXCLUDED.resources
            "#,
        )
        .bind(&point.id)
        .bind(&point.name)
        .bind(&point.description)
        .bind(&point.subject)
        .bind(&point.grade)
        .bind(point.difficulty as i16)
        .bind(&point.parent_id)
        .bind(&point.related_ids)
        .bind(&point.tags)
        .bind(Json(&point.resources))
        .execute(pool)
        .await?;
    }
    Ok(points.len())
}

/// A few days of answers for one demo learner, ending at `now`.
pub fn demo_answers(user_id: &str, now: DateTime<Utc>) -> Vec<AnswerEvent> {
    let plan: [(&str, u8, &[(bool, f64)], i64); 4] = [
        (
            "math-5-place-value",
            1,
            &[(true, 14.0), (true, 12.0), (true, 18.0), (true, 11.0), (true, 16.0)],
            3,
        ),
        (
            "math-5-fractions",
            2,
            &[(false, 48.0), (false, 52.0), (false, 45.0), (true, 40.0), (false, 55.0)],
            2,
        ),
        ("math-5-area", 2, &[(true, 25.0), (false, 31.0), (true, 22.0)], 1),
        ("math-5-decimals", 3, &[(false, 44.0), (false, 41.0)], 0),
    ];

    let mut events = Vec::new();
    for (knowledge_point_id, difficulty, answers, days_ago) in plan {
        let start = now - Duration::days(days_ago) - Duration::minutes(answers.len() as i64);
        for (index, (correct, seconds)) in answers.iter().enumerate() {
            events.push(AnswerEvent {
                user_id: user_id.to_string(),
                knowledge_point_id: knowledge_point_id.to_string(),
                difficulty_level: difficulty,
                correct: *correct,
                answer_time_seconds: *seconds,
                hint_used: false,
                answered_at: start + Duration::minutes(index as i64),
            });
        }
    }
    events.sort_by_key(|event| event.answered_at);
    events
}

pub fn read_answer_csv(csv_path: &std::path::Path) -> anyhow::Result<Vec<AnswerEvent>> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        user_id: String,
        knowledge_point_id: String,
        difficulty: u8,
        correct: bool,
        answer_time_seconds: f64,
        hint_used: Option<bool>,
        answered_at: DateTime<Utc>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut events = Vec::new();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("malformed answer on data row {}", line + 1))?;
        events.push(AnswerEvent {
            user_id: row.user_id,
            knowledge_point_id: row.knowledge_point_id,
            difficulty_level: row.difficulty,
            correct: row.correct,
            answer_time_seconds: row.answer_time_seconds,
            hint_used: row.hint_used.unwrap_or(false),
            answered_at: row.answered_at,
        });
    }

    events.sort_by_key(|event| event.answered_at);
    Ok(events)
}
