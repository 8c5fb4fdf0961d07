use crate::models::KnowledgePoint;

/// Source of practice question ids for a knowledge point. The question bank
/// itself (texts, options, grading) lives outside this crate.
pub trait QuestionBank: Send + Sync {
    fn practice_questions(&self, point: &KnowledgePoint, count: usize) -> Vec<String>;
}

/// Hands out `<point id>-q<n>` ids in order. Stands in until a real bank is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialQuestionBank;

impl QuestionBank for SequentialQuestionBank {
    fn practice_questions(&self, point: &KnowledgePoint, count: usize) -> Vec<String> {
        (1..=count).map(|n| format!("{}-q{n}", point.id)).collect()
    }
}
