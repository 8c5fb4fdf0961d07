//! Request-level entry points: fetch what an operation needs from the store,
//! run the pure computation, write back mastery records.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::difficulty;
use crate::error::{EngineError, Result};
use crate::graph::KnowledgeGraph;
use crate::mastery;
use crate::models::{
    AnswerEvent, Attempt, DifficultyAdjustment, LearningPath, MasteryRecord, Recommendation,
    WeakPoint,
};
use crate::path::{self, PathRequest};
use crate::questions::{QuestionBank, SequentialQuestionBank};
use crate::recommend;
use crate::store::{LearningStore, MasteryUpdate};
use crate::weak_points;

pub struct AdaptiveEngine<S> {
    store: S,
    questions: Arc<dyn QuestionBank>,
    weak_threshold: f64,
}

impl<S: LearningStore> AdaptiveEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            questions: Arc::new(SequentialQuestionBank),
            weak_threshold: weak_points::DEFAULT_THRESHOLD,
        }
    }

    pub fn with_question_bank(mut self, questions: Arc<dyn QuestionBank>) -> Self {
        self.questions = questions;
        self
    }

    pub fn with_weak_threshold(mut self, threshold: f64) -> Result<Self> {
        weak_points::validate_threshold(threshold)?;
        self.weak_threshold = threshold;
        Ok(self)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn graph(&self) -> Result<KnowledgeGraph> {
        Ok(KnowledgeGraph::new(self.store.knowledge_points().await?))
    }

    /// Folds one answer into the learner's record for that knowledge point.
    pub async fn record_answer(&self, event: &AnswerEvent) -> Result<MasteryRecord> {
        mastery::validate_event(event)?;
        let graph = self.graph().await?;
        graph.get_node(&event.knowledge_point_id)?;

        let now = Utc::now();
        let apply: MasteryUpdate<'_> = &|prior| mastery::apply_answer(prior, event, now);
        let record = self.store.record_answer(event, apply).await?;

        info!(
            user_id = %event.user_id,
            knowledge_point_id = %event.knowledge_point_id,
            correct = event.correct,
            mastery_level = record.mastery_level,
            "answer recorded"
        );
        Ok(record)
    }

    pub async fn mastery_records(&self, user_id: &str) -> Result<Vec<MasteryRecord>> {
        self.store.mastery_records(user_id).await
    }

    pub async fn detect_weak_points(
        &self,
        user_id: &str,
        subject: Option<&str>,
        threshold: Option<f64>,
    ) -> Result<Vec<WeakPoint>> {
        let graph = self.graph().await?;
        let records = self.store.mastery_records(user_id).await?;
        let weak = weak_points::detect(
            &records,
            &graph,
            subject,
            threshold.unwrap_or(self.weak_threshold),
            Utc::now(),
        )?;
        debug!(user_id, scanned = records.len(), weak = weak.len(), "weak point scan");
        Ok(weak)
    }

    /// Plans a path and persists it so progress can be tracked later.
    pub async fn generate_path(&self, request: &PathRequest) -> Result<LearningPath> {
        let graph = self.graph().await?;
        let records = self.store.mastery_records(&request.user_id).await?;
        let path = path::generate_path(
            request,
            &graph,
            &records,
            self.questions.as_ref(),
            Utc::now(),
        )?;
        self.store.save_path(&path).await?;
        Ok(path)
    }

    pub async fn advance_path(&self, path_id: Uuid, completed_step: usize) -> Result<LearningPath> {
        let mut learning_path = self
            .store
            .load_path(path_id)
            .await?
            .ok_or(EngineError::PathNotFound(path_id))?;
        path::advance(&mut learning_path, completed_step)?;
        self.store.save_path(&learning_path).await?;
        info!(
            path_id = %path_id,
            current_step = learning_path.current_step,
            status = learning_path.status.as_str(),
            "learning path advanced"
        );
        Ok(learning_path)
    }

    pub async fn adjust_difficulty(
        &self,
        user_id: &str,
        knowledge_point_id: &str,
        current_difficulty: u8,
    ) -> Result<DifficultyAdjustment> {
        self.graph().await?.get_node(knowledge_point_id)?;
        let attempts: Vec<Attempt> = self
            .store
            .recent_attempts(user_id, knowledge_point_id, difficulty::WINDOW)
            .await?
            .iter()
            .map(Attempt::from)
            .collect();
        let record = self.store.mastery_record(user_id, knowledge_point_id).await?;
        let adjustment = difficulty::adjust(
            current_difficulty,
            &attempts,
            record.map(|record| record.mastery_level),
        )?;
        if adjustment.new_difficulty != current_difficulty {
            info!(
                user_id,
                knowledge_point_id,
                from = current_difficulty,
                to = adjustment.new_difficulty,
                reason = %adjustment.reason,
                "difficulty adjusted"
            );
        }
        Ok(adjustment)
    }

    pub async fn recommend(&self, user_id: &str, limit: usize) -> Result<Vec<Recommendation>> {
        let graph = self.graph().await?;
        let records = self.store.mastery_records(user_id).await?;
        let now = Utc::now();
        let weak = weak_points::detect(&records, &graph, None, self.weak_threshold, now)?;
        recommend::recommend(&weak, &records, &graph, limit, now)
    }
}
