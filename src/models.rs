use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// Tag that marks a knowledge point as foundational for the rest of its subject.
pub const FUNDAMENTAL_TAG: &str = "fundamental";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceBundle {
    #[serde(default)]
    pub videos: Vec<String>,
    #[serde(default)]
    pub articles: Vec<String>,
    #[serde(default)]
    pub games: Vec<String>,
    #[serde(default)]
    pub questions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgePoint {
    pub id: String,
    pub name: String,
    pub description: String,
    pub subject: String,
    pub grade: String,
    pub difficulty: u8,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub related_ids: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub resources: ResourceBundle,
}

impl KnowledgePoint {
    pub fn is_fundamental(&self) -> bool {
        self.parent_id.is_none() || self.tags.iter().any(|tag| tag == FUNDAMENTAL_TAG)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerEvent {
    pub user_id: String,
    pub knowledge_point_id: String,
    pub difficulty_level: u8,
    pub correct: bool,
    pub answer_time_seconds: f64,
    #[serde(default)]
    pub hint_used: bool,
    pub answered_at: DateTime<Utc>,
}

/// The slice of an answer the difficulty adjuster looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attempt {
    pub correct: bool,
    pub answer_time_seconds: f64,
}

impl From<&AnswerEvent> for Attempt {
    fn from(event: &AnswerEvent) -> Self {
        Self {
            correct: event.correct,
            answer_time_seconds: event.answer_time_seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryRecord {
    pub user_id: String,
    pub knowledge_point_id: String,
    pub total_questions: i32,
    pub correct_count: i32,
    pub wrong_count: i32,
    pub avg_answer_time_seconds: f64,
    pub fastest_answer_time: f64,
    pub slowest_answer_time: f64,
    pub consecutive_correct: i32,
    pub consecutive_wrong: i32,
    pub repeated_errors: i32,
    pub mastery_level: u8,
    pub first_practice_at: DateTime<Utc>,
    pub last_practice_at: DateTime<Utc>,
    pub practice_days: i32,
    /// Bumped on every write; used by stores that apply updates optimistically.
    pub version: i64,
}

impl MasteryRecord {
    pub fn accuracy(&self) -> f64 {
        if self.total_questions == 0 {
            0.0
        } else {
            self.correct_count as f64 / self.total_questions as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    ImproveWeakPoints,
    ReviewAll,
    AdvanceLearning,
}

impl Goal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Goal::ImproveWeakPoints => "improve_weak_points",
            Goal::ReviewAll => "review_all",
            Goal::AdvanceLearning => "advance_learning",
        }
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Goal {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "improve_weak_points" => Ok(Goal::ImproveWeakPoints),
            "review_all" => Ok(Goal::ReviewAll),
            "advance_learning" => Ok(Goal::AdvanceLearning),
            other => Err(EngineError::InvalidInput(format!("unknown goal `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStatus {
    Active,
    Completed,
}

impl PathStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathStatus::Active => "active",
            PathStatus::Completed => "completed",
        }
    }
}

impl FromStr for PathStatus {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(PathStatus::Active),
            "completed" => Ok(PathStatus::Completed),
            other => Err(EngineError::InvalidInput(format!(
                "unknown path status `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningStep {
    pub knowledge_point_id: String,
    pub reason: String,
    pub resources: ResourceBundle,
    pub estimated_minutes: u32,
    pub difficulty: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningPath {
    pub id: Uuid,
    pub user_id: String,
    pub goal: Goal,
    pub steps: Vec<LearningStep>,
    pub total_steps: usize,
    pub estimated_days: u32,
    pub current_step: usize,
    pub status: PathStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    WeakPoint,
    Review,
    Advance,
}

impl RecommendationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationType::WeakPoint => "weak_point",
            RecommendationType::Review => "review",
            RecommendationType::Advance => "advance",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationType,
    pub priority: i32,
    pub knowledge_point_id: String,
    pub reason: String,
    pub resources: ResourceBundle,
    pub estimated_minutes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeakPoint {
    pub knowledge_point_id: String,
    pub name: Option<String>,
    pub mastery_level: u8,
    pub accuracy: f64,
    pub severity: Severity,
    pub severity_score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyAdjustment {
    pub new_difficulty: u8,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryBreakdown {
    pub accuracy: f64,
    pub speed: f64,
    pub stability: f64,
    pub retention: f64,
    pub volume: f64,
    pub weighted: f64,
}
