use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::{EngineError, Result};
use crate::graph::KnowledgeGraph;
use crate::mastery;
use crate::models::{MasteryRecord, Recommendation, RecommendationType, WeakPoint};
use crate::path::MASTERED_LEVEL;

pub const DEFAULT_LIMIT: usize = 5;

/// Days since last practice at which a mastered point comes back for review.
pub const REVIEW_CHECKPOINTS: [i64; 4] = [1, 3, 7, 15];

const WEAK_POINT_SLOTS: usize = 2;
const WEAK_POINT_PRIORITY: i32 = 9;
const ADVANCE_PRIORITY: i32 = 1;

const WEAK_POINT_MINUTES: u32 = 30;
const REVIEW_MINUTES: u32 = 15;
const ADVANCE_MINUTES: u32 = 40;

pub fn review_priority(days_since_last: i64) -> i32 {
    7 - (days_since_last / 2) as i32
}

/// Ranked study queue for one learner. `weak_points` is the detector output,
/// weakest first.
pub fn recommend(
    weak_points: &[WeakPoint],
    records: &[MasteryRecord],
    graph: &KnowledgeGraph,
    limit: usize,
    now: DateTime<Utc>,
) -> Result<Vec<Recommendation>> {
    if limit == 0 {
        return Err(EngineError::InvalidInput(
            "recommendation limit must be at least 1".to_string(),
        ));
    }

    let resources_for = |id: &str| {
        graph
            .get(id)
            .map(|point| point.resources.clone())
            .unwrap_or_default()
    };

    let mut candidates: Vec<Recommendation> = weak_points
        .iter()
        .take(WEAK_POINT_SLOTS)
        .map(|weak| Recommendation {
            kind: RecommendationType::WeakPoint,
            priority: WEAK_POINT_PRIORITY,
            knowledge_point_id: weak.knowledge_point_id.clone(),
            reason: format!("weak point: {}", weak.reason),
            resources: resources_for(&weak.knowledge_point_id),
            estimated_minutes: WEAK_POINT_MINUTES,
        })
        .collect();

    for record in records.iter().filter(|r| r.mastery_level >= MASTERED_LEVEL) {
        let days = mastery::days_since(record.last_practice_at, now);
        if REVIEW_CHECKPOINTS.contains(&days) {
            candidates.push(Recommendation {
                kind: RecommendationType::Review,
                priority: review_priority(days),
                knowledge_point_id: record.knowledge_point_id.clone(),
                reason: format!("review: {days} days since last practice"),
                resources: resources_for(&record.knowledge_point_id),
                estimated_minutes: REVIEW_MINUTES,
            });
        }
    }

    // stable sort keeps the original order among equal priorities
    candidates.sort_by(|a, b| b.priority.cmp(&a.priority));
    let mut seen = HashSet::new();
    candidates.retain(|candidate| seen.insert(candidate.knowledge_point_id.clone()));
    candidates.truncate(limit);

    if candidates.len() < limit {
        let practised: HashSet<&str> = records
            .iter()
            .map(|record| record.knowledge_point_id.as_str())
            .collect();
        let fill = advance_candidates(graph, records, &practised, &seen)?;
        candidates.extend(fill.into_iter().take(limit - candidates.len()));
    }

    tracing::debug!(count = candidates.len(), limit, "recommendations ranked");
    Ok(candidates)
}

/// Unpractised points whose prerequisite chain is empty or mastered, easiest first.
fn advance_candidates(
    graph: &KnowledgeGraph,
    records: &[MasteryRecord],
    practised: &HashSet<&str>,
    already: &HashSet<String>,
) -> Result<Vec<Recommendation>> {
    let mastered = |id: &str| {
        records
            .iter()
            .any(|r| r.knowledge_point_id == id && r.mastery_level >= MASTERED_LEVEL)
    };
    let mut fill = Vec::new();
    for point in graph.points_in(None, None) {
        if practised.contains(point.id.as_str()) || already.contains(&point.id) {
            continue;
        }
        if !graph.prerequisites_satisfied(&point.id, &mastered)? {
            continue;
        }
        fill.push(Recommendation {
            kind: RecommendationType::Advance,
            priority: ADVANCE_PRIORITY,
            knowledge_point_id: point.id.clone(),
            reason: format!("ready to learn: {}", point.name),
            resources: point.resources.clone(),
            estimated_minutes: ADVANCE_MINUTES,
        });
    }
    Ok(fill)
}
