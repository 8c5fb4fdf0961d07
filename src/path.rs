//! Learning path planning: pick candidates for a goal, order them so that
//! prerequisites come first, then fill a time-boxed sequence of steps.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::graph::KnowledgeGraph;
use crate::models::{
    Goal, KnowledgePoint, LearningPath, LearningStep, MasteryRecord, PathStatus, ResourceBundle,
};
use crate::questions::QuestionBank;
use crate::weak_points;

/// Level from which a knowledge point counts as mastered.
pub const MASTERED_LEVEL: u8 = 3;

#[derive(Debug, Clone)]
pub struct PathRequest {
    pub user_id: String,
    pub subject: String,
    pub grade: Option<String>,
    pub goal: Goal,
    pub day_budget: u32,
    pub daily_minutes: u32,
    pub weak_threshold: f64,
}

impl PathRequest {
    fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(EngineError::InvalidInput("user id must not be empty".to_string()));
        }
        if self.day_budget == 0 {
            return Err(EngineError::InvalidInput("day budget must be at least 1".to_string()));
        }
        if self.daily_minutes == 0 {
            return Err(EngineError::InvalidInput(
                "daily minute budget must be at least 1".to_string(),
            ));
        }
        weak_points::validate_threshold(self.weak_threshold)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffortTier {
    New,
    Weak,
    Review,
}

impl EffortTier {
    pub fn for_level(level: u8) -> Self {
        match level {
            0 => EffortTier::New,
            1 | 2 => EffortTier::Weak,
            _ => EffortTier::Review,
        }
    }

    pub fn minutes(&self) -> u32 {
        match self {
            EffortTier::New => 40,
            EffortTier::Weak => 30,
            EffortTier::Review => 15,
        }
    }

    pub fn question_count(&self) -> usize {
        match self {
            EffortTier::New => 8,
            EffortTier::Weak => 10,
            EffortTier::Review => 5,
        }
    }

    fn reason(&self, level: u8) -> String {
        match self {
            EffortTier::New => "new knowledge point, start from the basics".to_string(),
            EffortTier::Weak => format!("mastery level {level}, needs reinforcement"),
            EffortTier::Review => format!("mastered at level {level}, review to consolidate"),
        }
    }

    fn resources(
        &self,
        point: &KnowledgePoint,
        questions: &dyn QuestionBank,
    ) -> ResourceBundle {
        let practice = questions.practice_questions(point, self.question_count());
        match self {
            EffortTier::New => ResourceBundle {
                videos: point.resources.videos.clone(),
                articles: point.resources.articles.clone(),
                games: point.resources.games.clone(),
                questions: practice,
            },
            EffortTier::Weak => ResourceBundle {
                videos: point.resources.videos.iter().take(1).cloned().collect(),
                questions: practice,
                ..ResourceBundle::default()
            },
            EffortTier::Review => ResourceBundle {
                questions: practice,
                ..ResourceBundle::default()
            },
        }
    }
}

/// Knowledge points a goal draws from, restricted to the subject and grade.
pub fn select_candidates<'g>(
    request: &PathRequest,
    graph: &'g KnowledgeGraph,
    records: &[MasteryRecord],
    now: DateTime<Utc>,
) -> Result<Vec<&'g KnowledgePoint>> {
    let subject = request.subject.as_str();
    let grade = request.grade.as_deref();
    let in_scope =
        |point: &KnowledgePoint| point.subject == subject && grade.map_or(true, |g| point.grade == g);
    let levels = levels_by_point(records);

    let candidates = match request.goal {
        Goal::ImproveWeakPoints => {
            weak_points::detect(records, graph, Some(subject), request.weak_threshold, now)?
                .iter()
                .filter_map(|weak| graph.get(&weak.knowledge_point_id))
                .filter(|point| in_scope(*point))
                .collect()
        }
        Goal::ReviewAll => graph
            .points_in(Some(subject), grade)
            .into_iter()
            .filter(|point| levels.contains_key(point.id.as_str()))
            .collect(),
        Goal::AdvanceLearning => {
            let mastered = |id: &str| levels.get(id).is_some_and(|level| *level >= MASTERED_LEVEL);
            let mut unlocked = Vec::new();
            for point in graph.points_in(Some(subject), grade) {
                if mastered(point.id.as_str()) {
                    continue;
                }
                if graph.prerequisites_satisfied(&point.id, &mastered)? {
                    unlocked.push(point);
                }
            }
            unlocked
        }
    };

    Ok(candidates)
}

/// Kahn's algorithm over the candidate set. Parent edges leaving the set are
/// ignored; anything left unprocessed means the parent pointers loop.
pub fn topological_order<'g>(candidates: &[&'g KnowledgePoint]) -> Result<Vec<&'g KnowledgePoint>> {
    let position: HashMap<&str, usize> = candidates
        .iter()
        .enumerate()
        .map(|(index, point)| (point.id.as_str(), index))
        .collect();

    let mut in_degree = vec![0usize; candidates.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); candidates.len()];
    for (index, point) in candidates.iter().enumerate() {
        if let Some(parent) = point.parent_id.as_deref().and_then(|id| position.get(id)) {
            in_degree[index] += 1;
            dependents[*parent].push(index);
        }
    }

    let mut queue: VecDeque<usize> = (0..candidates.len())
        .filter(|index| in_degree[*index] == 0)
        .collect();
    let mut ordered = Vec::with_capacity(candidates.len());

    while let Some(index) = queue.pop_front() {
        ordered.push(candidates[index]);
        for dependent in dependents[index].iter() {
            in_degree[*dependent] -= 1;
            if in_degree[*dependent] == 0 {
                queue.push_back(*dependent);
            }
        }
    }

    if ordered.len() < candidates.len() {
        let mut stuck: Vec<String> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree > 0)
            .map(|(index, _)| candidates[index].id.clone())
            .collect();
        stuck.sort();
        return Err(EngineError::CyclicDependency(stuck));
    }

    Ok(ordered)
}

/// Orders the goal's candidates by prerequisite and adds steps until the day
/// budget is spent. A plan with no steps comes back `Completed`.
pub fn generate_path(
    request: &PathRequest,
    graph: &KnowledgeGraph,
    records: &[MasteryRecord],
    questions: &dyn QuestionBank,
    now: DateTime<Utc>,
) -> Result<LearningPath> {
    request.validate()?;

    let candidates = select_candidates(request, graph, records, now)?;
    let ordered = topological_order(&candidates)?;
    let levels = levels_by_point(records);

    let mut steps = Vec::new();
    let mut total_minutes = 0u32;
    let mut estimated_days = 0u32;

    for point in ordered.iter() {
        let level = levels.get(point.id.as_str()).copied().unwrap_or(0);
        let tier = EffortTier::for_level(level);

        steps.push(LearningStep {
            knowledge_point_id: point.id.clone(),
            reason: tier.reason(level),
            resources: tier.resources(point, questions),
            estimated_minutes: tier.minutes(),
            difficulty: point.difficulty,
        });

        total_minutes += tier.minutes();
        estimated_days = total_minutes.div_ceil(request.daily_minutes);
        if estimated_days > request.day_budget {
            break;
        }
    }

    let truncated = steps.len() < ordered.len();
    tracing::info!(
        user_id = %request.user_id,
        goal = %request.goal,
        candidates = candidates.len(),
        steps = steps.len(),
        estimated_days,
        truncated,
        "learning path generated"
    );

    // A path with no steps already sits at its terminal cursor.
    let status = if steps.is_empty() {
        PathStatus::Completed
    } else {
        PathStatus::Active
    };
    Ok(LearningPath {
        id: Uuid::new_v4(),
        user_id: request.user_id.clone(),
        goal: request.goal,
        total_steps: steps.len(),
        steps,
        estimated_days,
        current_step: 0,
        status,
        created_at: now,
    })
}

/// Marks `completed_step` done and moves the cursor past it.
pub fn advance(path: &mut LearningPath, completed_step: usize) -> Result<()> {
    if path.status == PathStatus::Completed {
        return Err(EngineError::InvalidInput(format!(
            "learning path {} is already completed",
            path.id
        )));
    }
    if completed_step >= path.total_steps {
        return Err(EngineError::InvalidInput(format!(
            "step {completed_step} is outside a path of {} steps",
            path.total_steps
        )));
    }

    path.current_step = completed_step + 1;
    if path.current_step >= path.total_steps {
        path.status = PathStatus::Completed;
    }
    Ok(())
}

fn levels_by_point(records: &[MasteryRecord]) -> HashMap<&str, u8> {
    records
        .iter()
        .map(|record| (record.knowledge_point_id.as_str(), record.mastery_level))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::point;
    use crate::mastery::tests::at;
    use crate::questions::SequentialQuestionBank;

    fn record(id: &str, level: u8, correct: i32, wrong: i32) -> MasteryRecord {
        MasteryRecord {
            user_id: "learner-1".to_string(),
            knowledge_point_id: id.to_string(),
            total_questions: correct + wrong,
            correct_count: correct,
            wrong_count: wrong,
            avg_answer_time_seconds: 25.0,
            fastest_answer_time: 12.0,
            slowest_answer_time: 38.0,
            consecutive_correct: 0,
            consecutive_wrong: 0,
            repeated_errors: 0,
            mastery_level: level,
            first_practice_at: at(1, 9),
            last_practice_at: at(2, 9),
            practice_days: 2,
            version: 1,
        }
    }

    fn request(goal: Goal, day_budget: u32, daily_minutes: u32) -> PathRequest {
        PathRequest {
            user_id: "learner-1".to_string(),
            subject: "math".to_string(),
            grade: Some("5".to_string()),
            goal,
            day_budget,
            daily_minutes,
            weak_threshold: 0.6,
        }
    }

    fn graph() -> KnowledgeGraph {
        let mut numbers = point("numbers", None, 1);
        numbers.resources = ResourceBundle {
            videos: vec!["v-numbers-1".to_string(), "v-numbers-2".to_string()],
            articles: vec!["a-numbers".to_string()],
            games: vec!["g-numbers".to_string()],
            questions: Vec::new(),
        };
        KnowledgeGraph::new(vec![
            numbers,
            point("fractions", Some("numbers"), 2),
            point("decimals", Some("fractions"), 3),
            point("percentages", Some("decimals"), 4),
            point("geometry", None, 2),
        ])
    }

    fn ids(path: &LearningPath) -> Vec<&str> {
        path.steps
            .iter()
            .map(|step| step.knowledge_point_id.as_str())
            .collect()
    }

    #[test]
    fn prerequisites_precede_dependents() {
        let graph = graph();
        let candidates: Vec<&KnowledgePoint> = ["percentages", "decimals", "numbers", "fractions"]
            .iter()
            .filter_map(|id| graph.get(id))
            .collect();
        let ordered: Vec<&str> = topological_order(&candidates)
            .unwrap()
            .into_iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ordered, vec!["numbers", "fractions", "decimals", "percentages"]);
    }

    #[test]
    fn prerequisites_outside_the_set_do_not_gate() {
        let graph = graph();
        let candidates: Vec<&KnowledgePoint> = ["percentages", "fractions"]
            .iter()
            .filter_map(|id| graph.get(id))
            .collect();
        let ordered: Vec<&str> = topological_order(&candidates)
            .unwrap()
            .into_iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ordered, vec!["percentages", "fractions"]);
    }

    #[test]
    fn cycles_fail_loudly() {
        let a = point("a", Some("b"), 1);
        let b = point("b", Some("a"), 1);
        let c = point("c", None, 1);
        let err = topological_order(&[&a, &b, &c]).unwrap_err();
        assert!(err.to_string().contains("cyclic dependency detected"));
        assert!(matches!(err, EngineError::CyclicDependency(ids) if ids == vec!["a", "b"]));
    }

    #[test]
    fn review_all_uses_practised_points_with_tiers() {
        let records = vec![
            record("numbers", 4, 9, 1),
            record("fractions", 2, 5, 5),
            record("decimals", 0, 1, 6),
        ];
        let path = generate_path(
            &request(Goal::ReviewAll, 7, 60),
            &graph(),
            &records,
            &SequentialQuestionBank,
            at(3, 9),
        )
        .unwrap();

        assert_eq!(ids(&path), vec!["numbers", "fractions", "decimals"]);
        let minutes: Vec<u32> = path.steps.iter().map(|s| s.estimated_minutes).collect();
        assert_eq!(minutes, vec![15, 30, 40]);
        assert_eq!(path.steps[0].resources.questions.len(), 5);
        assert!(path.steps[0].resources.videos.is_empty());
        assert_eq!(path.steps[1].resources.questions.len(), 10);
        assert_eq!(path.steps[2].resources.questions.len(), 8);
        assert_eq!(path.estimated_days, 2);
        assert_eq!(path.total_steps, 3);
        assert_eq!(path.current_step, 0);
        assert_eq!(path.status, PathStatus::Active);
    }

    #[test]
    fn new_and_weak_tiers_pick_resources() {
        let graph = graph();
        let numbers = graph.get("numbers").unwrap();
        let fresh = EffortTier::New.resources(numbers, &SequentialQuestionBank);
        assert_eq!(fresh.videos.len(), 2);
        assert_eq!(fresh.articles, vec!["a-numbers"]);
        assert_eq!(fresh.games, vec!["g-numbers"]);
        let weak = EffortTier::Weak.resources(numbers, &SequentialQuestionBank);
        assert_eq!(weak.videos, vec!["v-numbers-1"]);
        assert!(weak.articles.is_empty());
    }

    #[test]
    fn path_stops_once_budget_is_exceeded() {
        let records = vec![
            record("numbers", 0, 0, 2),
            record("fractions", 0, 0, 2),
            record("decimals", 0, 0, 2),
            record("percentages", 0, 0, 2),
        ];
        let path = generate_path(
            &request(Goal::ReviewAll, 1, 60),
            &graph(),
            &records,
            &SequentialQuestionBank,
            at(3, 9),
        )
        .unwrap();
        assert_eq!(ids(&path), vec!["numbers", "fractions"]);
        assert_eq!(path.estimated_days, 2);
    }

    #[test]
    fn weak_point_goal_orders_detected_points() {
        let records = vec![
            record("decimals", 1, 1, 9),
            record("fractions", 2, 4, 6),
            record("numbers", 5, 10, 0),
        ];
        let path = generate_path(
            &request(Goal::ImproveWeakPoints, 7, 60),
            &graph(),
            &records,
            &SequentialQuestionBank,
            at(3, 9),
        )
        .unwrap();
        assert_eq!(ids(&path), vec!["fractions", "decimals"]);
    }

    #[test]
    fn advance_goal_unlocks_points_behind_mastered_prerequisites() {
        let records = vec![record("numbers", 4, 9, 1), record("fractions", 1, 2, 5)];
        let path = generate_path(
            &request(Goal::AdvanceLearning, 7, 60),
            &graph(),
            &records,
            &SequentialQuestionBank,
            at(3, 9),
        )
        .unwrap();
        assert_eq!(ids(&path), vec!["fractions", "geometry"]);
    }

    #[test]
    fn empty_candidate_set_yields_completed_empty_path() {
        let path = generate_path(
            &request(Goal::ReviewAll, 3, 30),
            &graph(),
            &[],
            &SequentialQuestionBank,
            at(3, 9),
        )
        .unwrap();
        assert!(path.steps.is_empty());
        assert_eq!(path.estimated_days, 0);
        assert_eq!(path.status, PathStatus::Completed);
    }

    #[test]
    fn rejects_zero_budgets() {
        for (days, minutes) in [(0, 30), (3, 0)] {
            let result = generate_path(
                &request(Goal::ReviewAll, days, minutes),
                &graph(),
                &[],
                &SequentialQuestionBank,
                at(3, 9),
            );
            assert!(matches!(result, Err(EngineError::InvalidInput(_))));
        }
    }

    #[test]
    fn advancing_moves_cursor_until_completed() {
        let records = vec![record("numbers", 4, 9, 1), record("fractions", 2, 5, 5)];
        let mut path = generate_path(
            &request(Goal::ReviewAll, 7, 60),
            &graph(),
            &records,
            &SequentialQuestionBank,
            at(3, 9),
        )
        .unwrap();

        advance(&mut path, 0).unwrap();
        assert_eq!(path.current_step, 1);
        assert_eq!(path.status, PathStatus::Active);
        assert!(advance(&mut path, 5).is_err());

        advance(&mut path, 1).unwrap();
        assert_eq!(path.current_step, 2);
        assert_eq!(path.status, PathStatus::Completed);
        assert!(matches!(advance(&mut path, 1), Err(EngineError::InvalidInput(_))));
    }
}
