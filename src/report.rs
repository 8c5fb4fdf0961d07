use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::graph::KnowledgeGraph;
use crate::mastery;
use crate::models::{MasteryRecord, Recommendation, WeakPoint};

#[derive(Debug, Clone)]
pub struct SubjectSummary {
    pub subject: String,
    pub points: usize,
    pub avg_level: f64,
    pub questions: i32,
}

pub fn summarize_by_subject(records: &[MasteryRecord], graph: &KnowledgeGraph) -> Vec<SubjectSummary> {
    let mut map: std::collections::HashMap<String, (usize, u32, i32)> =
        std::collections::HashMap::new();

    for record in records {
        let subject = graph
            .get(&record.knowledge_point_id)
            .map(|point| point.subject.clone())
            .unwrap_or_else(|| "unknown".to_string());
        let entry = map.entry(subject).or_insert((0, 0, 0));
        entry.0 += 1;
        entry.1 += record.mastery_level as u32;
        entry.2 += record.total_questions;
    }

    let mut summaries: Vec<SubjectSummary> = map
        .into_iter()
        .map(|(subject, (points, total_level, questions))| SubjectSummary {
            subject,
            points,
            avg_level: if points == 0 {
                0.0
            } else {
                total_level as f64 / points as f64
            },
            questions,
        })
        .collect();

    summaries.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.subject.cmp(&b.subject)));
    summaries
}

pub fn build_report(
    user_id: &str,
    records: &[MasteryRecord],
    graph: &KnowledgeGraph,
    weak_points: &[WeakPoint],
    recommendations: &[Recommendation],
    now: DateTime<Utc>,
) -> String {
    let summaries = summarize_by_subject(records, graph);
    let name_of = |id: &str| {
        graph
            .get(id)
            .map(|point| point.name.clone())
            .unwrap_or_else(|| id.to_string())
    };

    let mut output = String::new();

    let _ = writeln!(output, "# Learning Report");
    let _ = writeln!(output, "Generated for {} on {}", user_id, now.date_naive());
    let _ = writeln!(output);
    let _ = writeln!(output, "## Subjects");

    if summaries.is_empty() {
        let _ = writeln!(output, "No practice recorded yet.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} knowledge points, avg level {:.1}, {} questions answered",
                summary.subject, summary.points, summary.avg_level, summary.questions
            );
        }
    }

    let mut by_level = records.to_vec();
    by_level.sort_by(|a, b| {
        b.mastery_level
            .cmp(&a.mastery_level)
            .then_with(|| a.knowledge_point_id.cmp(&b.knowledge_point_id))
    });
    let _ = writeln!(output);
    let _ = writeln!(output, "## Mastery");

    if by_level.is_empty() {
        let _ = writeln!(output, "No mastery records yet.");
    } else {
        for record in by_level.iter() {
            let scores = mastery::breakdown(record, now);
            let _ = writeln!(
                output,
                "- {} level {} (accuracy {:.0}%, speed {:.2}, stability {:.2}, retention {:.2}, volume {:.2}) over {} days",
                name_of(&record.knowledge_point_id),
                record.mastery_level,
                scores.accuracy * 100.0,
                scores.speed,
                scores.stability,
                scores.retention,
                scores.volume,
                record.practice_days
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Weak Points");

    if weak_points.is_empty() {
        let _ = writeln!(output, "No weak points below the threshold.");
    } else {
        for weak in weak_points.iter() {
            let _ = writeln!(
                output,
                "- {} [{}] level {}: {}",
                name_of(&weak.knowledge_point_id),
                weak.severity.as_str(),
                weak.mastery_level,
                weak.reason
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Up Next");

    if recommendations.is_empty() {
        let _ = writeln!(output, "Nothing to recommend right now.");
    } else {
        for recommendation in recommendations.iter() {
            let _ = writeln!(
                output,
                "- ({}, priority {}) {}: {} (~{} min)",
                recommendation.kind.as_str(),
                recommendation.priority,
                name_of(&recommendation.knowledge_point_id),
                recommendation.reason,
                recommendation.estimated_minutes
            );
        }
    }

    output
}
