use chrono::{DateTime, Utc};

use crate::error::{EngineError, Result};
use crate::graph::KnowledgeGraph;
use crate::mastery::{self, MAX_MASTERY_LEVEL};
use crate::models::{MasteryRecord, Severity, WeakPoint};

pub const DEFAULT_THRESHOLD: f64 = 0.6;

const FUNDAMENTAL_MULTIPLIER: f64 = 1.5;
const REPEATED_ERROR_CAP: f64 = 5.0;
const SLOW_ANSWER_SECONDS: f64 = 40.0;
const IDLE_DAYS: i64 = 7;

pub fn validate_threshold(threshold: f64) -> Result<()> {
    if threshold.is_finite() && threshold > 0.0 && threshold <= 1.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidInput(format!(
            "weak point threshold {threshold} outside (0, 1]"
        )))
    }
}

/// Records whose mastery falls below `threshold`, weakest first.
pub fn detect(
    records: &[MasteryRecord],
    graph: &KnowledgeGraph,
    subject: Option<&str>,
    threshold: f64,
    now: DateTime<Utc>,
) -> Result<Vec<WeakPoint>> {
    validate_threshold(threshold)?;

    let mut weak: Vec<&MasteryRecord> = records
        .iter()
        .filter(|record| {
            (record.mastery_level as f64 / MAX_MASTERY_LEVEL as f64) < threshold
        })
        .filter(|record| match subject {
            Some(subject) => graph
                .get(&record.knowledge_point_id)
                .is_some_and(|point| point.subject == subject),
            None => true,
        })
        .collect();

    weak.sort_by(|a, b| {
        a.mastery_level.cmp(&b.mastery_level).then_with(|| {
            a.accuracy()
                .partial_cmp(&b.accuracy())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    });

    Ok(weak
        .into_iter()
        .map(|record| diagnose(record, graph, now))
        .collect())
}

pub fn diagnose(record: &MasteryRecord, graph: &KnowledgeGraph, now: DateTime<Utc>) -> WeakPoint {
    let point = graph.get(&record.knowledge_point_id);
    let fundamental = point.is_some_and(|point| point.is_fundamental());
    let score = severity_score(record, fundamental);

    WeakPoint {
        knowledge_point_id: record.knowledge_point_id.clone(),
        name: point.map(|point| point.name.clone()),
        mastery_level: record.mastery_level,
        accuracy: record.accuracy(),
        severity: severity_bucket(score),
        severity_score: score,
        reason: diagnosis_reason(record, now),
    }
}

pub fn severity_score(record: &MasteryRecord, fundamental: bool) -> f64 {
    let error_rate = 1.0 - record.accuracy();
    let repetition = (record.repeated_errors as f64 / REPEATED_ERROR_CAP).min(1.0);
    let multiplier = if fundamental { FUNDAMENTAL_MULTIPLIER } else { 1.0 };
    ((error_rate + repetition + multiplier) / 3.0).min(1.0)
}

pub fn severity_bucket(score: f64) -> Severity {
    if score >= 0.7 {
        Severity::High
    } else if score >= 0.4 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

pub fn diagnosis_reason(record: &MasteryRecord, now: DateTime<Utc>) -> String {
    let mut clauses = Vec::new();
    let accuracy_pct = record.accuracy() * 100.0;
    let idle_days = mastery::days_since(record.last_practice_at, now);

    if record.consecutive_wrong >= 3 {
        clauses.push(format!("{} consecutive wrong answers", record.consecutive_wrong));
    }
    if record.repeated_errors >= 3 {
        clauses.push(format!("repeated errors ×{}", record.repeated_errors));
    }
    if accuracy_pct < 50.0 {
        clauses.push(format!("accuracy only {:.0}%", accuracy_pct));
    }
    if record.avg_answer_time_seconds > SLOW_ANSWER_SECONDS {
        clauses.push(format!(
            "slow answers (avg {:.0}s)",
            record.avg_answer_time_seconds
        ));
    }
    if idle_days > IDLE_DAYS {
        clauses.push(format!("idle for {idle_days} days"));
    }

    if clauses.is_empty() {
        "mastery below threshold, needs practice".to_string()
    } else {
        clauses.join("; ")
    }
}
