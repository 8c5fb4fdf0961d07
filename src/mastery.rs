//! Per-(user, knowledge point) mastery statistics and the 0-5 level derived
//! from them.

use chrono::{DateTime, Utc};

use crate::error::{EngineError, Result};
use crate::models::{AnswerEvent, MasteryBreakdown, MasteryRecord};

/// Answer time at which the speed factor starts to drop.
pub const EXPECTED_ANSWER_SECONDS: f64 = 30.0;
/// Days without practice after which retention reaches zero.
pub const RETENTION_WINDOW_DAYS: f64 = 7.0;

const ACCURACY_WEIGHT: f64 = 0.35;
const SPEED_WEIGHT: f64 = 0.15;
const STABILITY_WEIGHT: f64 = 0.20;
const RETENTION_WEIGHT: f64 = 0.15;
const VOLUME_WEIGHT: f64 = 0.15;

const STABILITY_STREAK: f64 = 5.0;
const VOLUME_TARGET: f64 = 10.0;

pub const MAX_MASTERY_LEVEL: u8 = 5;

/// Whole calendar days (UTC) between `since` and `now`; never negative.
pub fn days_since(since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now.date_naive() - since.date_naive()).num_days().max(0)
}

pub fn validate_event(event: &AnswerEvent) -> Result<()> {
    if event.user_id.trim().is_empty() {
        return Err(EngineError::InvalidInput("user id must not be empty".to_string()));
    }
    if event.knowledge_point_id.trim().is_empty() {
        return Err(EngineError::InvalidInput(
            "knowledge point id must not be empty".to_string(),
        ));
    }
    if !(1..=5).contains(&event.difficulty_level) {
        return Err(EngineError::InvalidInput(format!(
            "difficulty {} outside 1-5",
            event.difficulty_level
        )));
    }
    if !event.answer_time_seconds.is_finite() || event.answer_time_seconds < 0.0 {
        return Err(EngineError::InvalidInput(format!(
            "answer time {} is not a non-negative number of seconds",
            event.answer_time_seconds
        )));
    }
    Ok(())
}

/// Folds one answer into the prior record (or a fresh one) and rescores it.
pub fn apply_answer(
    prior: Option<&MasteryRecord>,
    event: &AnswerEvent,
    now: DateTime<Utc>,
) -> MasteryRecord {
    let mut record = match prior {
        Some(existing) => existing.clone(),
        None => MasteryRecord {
            user_id: event.user_id.clone(),
            knowledge_point_id: event.knowledge_point_id.clone(),
            total_questions: 0,
            correct_count: 0,
            wrong_count: 0,
            avg_answer_time_seconds: 0.0,
            fastest_answer_time: event.answer_time_seconds,
            slowest_answer_time: event.answer_time_seconds,
            consecutive_correct: 0,
            consecutive_wrong: 0,
            repeated_errors: 0,
            mastery_level: 0,
            first_practice_at: event.answered_at,
            last_practice_at: event.answered_at,
            practice_days: 1,
            version: 0,
        },
    };

    let previous_total = record.total_questions as f64;
    record.avg_answer_time_seconds = (record.avg_answer_time_seconds * previous_total
        + event.answer_time_seconds)
        / (previous_total + 1.0);
    record.total_questions += 1;
    record.fastest_answer_time = record.fastest_answer_time.min(event.answer_time_seconds);
    record.slowest_answer_time = record.slowest_answer_time.max(event.answer_time_seconds);

    if event.correct {
        record.correct_count += 1;
        record.consecutive_correct += 1;
        record.consecutive_wrong = 0;
    } else {
        if record.consecutive_wrong > 0 {
            record.repeated_errors += 1;
        }
        record.wrong_count += 1;
        record.consecutive_wrong += 1;
        record.consecutive_correct = 0;
    }

    if prior.is_some() && event.answered_at.date_naive() != record.last_practice_at.date_naive()
    {
        record.practice_days += 1;
    }
    record.last_practice_at = event.answered_at;
    record.version += 1;
    record.mastery_level = mastery_level(&record, now);
    record
}

pub fn breakdown(record: &MasteryRecord, now: DateTime<Utc>) -> MasteryBreakdown {
    let accuracy = record.accuracy();
    let speed = (1.0
        - (record.avg_answer_time_seconds - EXPECTED_ANSWER_SECONDS).max(0.0)
            / EXPECTED_ANSWER_SECONDS)
        .max(0.0);
    let stability = (record.consecutive_correct as f64 / STABILITY_STREAK).min(1.0);
    let idle_days = days_since(record.last_practice_at, now) as f64;
    let retention = (1.0 - idle_days / RETENTION_WINDOW_DAYS).max(0.0);
    let volume = (record.total_questions as f64 / VOLUME_TARGET).min(1.0);

    let weighted = accuracy * ACCURACY_WEIGHT
        + speed * SPEED_WEIGHT
        + stability * STABILITY_WEIGHT
        + retention * RETENTION_WEIGHT
        + volume * VOLUME_WEIGHT;

    MasteryBreakdown {
        accuracy,
        speed,
        stability,
        retention,
        volume,
        weighted,
    }
}

pub fn mastery_level(record: &MasteryRecord, now: DateTime<Utc>) -> u8 {
    if record.total_questions == 0 {
        return 0;
    }
    level_for_score(breakdown(record, now).weighted)
}

pub fn level_for_score(score: f64) -> u8 {
    match score {
        s if s >= 0.90 => 5,
        s if s >= 0.75 => 4,
        s if s >= 0.60 => 3,
        s if s >= 0.40 => 2,
        s if s >= 0.20 => 1,
        _ => 0,
    }
}
