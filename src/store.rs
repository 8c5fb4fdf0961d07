//! Persistence contract the engine runs against, plus an in-process store.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::difficulty;
use crate::error::Result;
use crate::models::{AnswerEvent, KnowledgePoint, LearningPath, MasteryRecord};

/// Builds the next record from the current one (`None` before the first answer).
pub type MasteryUpdate<'a> = &'a (dyn Fn(Option<&MasteryRecord>) -> MasteryRecord + Send + Sync);

#[async_trait]
pub trait LearningStore: Send + Sync {
    async fn knowledge_points(&self) -> Result<Vec<KnowledgePoint>>;

    async fn mastery_records(&self, user_id: &str) -> Result<Vec<MasteryRecord>>;

    async fn mastery_record(
        &self,
        user_id: &str,
        knowledge_point_id: &str,
    ) -> Result<Option<MasteryRecord>>;

    /// Folds one answer into the (user, knowledge point) record and appends
    /// it to the attempt log as a single unit: either both are stored or
    /// neither is. The update may run more than once if the store retries on
    /// contention.
    async fn record_answer(
        &self,
        event: &AnswerEvent,
        update: MasteryUpdate<'_>,
    ) -> Result<MasteryRecord>;

    /// Up to `limit` most recent attempts, oldest first.
    async fn recent_attempts(
        &self,
        user_id: &str,
        knowledge_point_id: &str,
        limit: usize,
    ) -> Result<Vec<AnswerEvent>>;

    async fn save_path(&self, path: &LearningPath) -> Result<()>;

    async fn load_path(&self, id: Uuid) -> Result<Option<LearningPath>>;
}

type RecordKey = (String, String);

fn record_key(user_id: &str, knowledge_point_id: &str) -> RecordKey {
    (user_id.to_string(), knowledge_point_id.to_string())
}

/// Mastery records and the attempts behind them, guarded together.
#[derive(Debug, Default)]
struct Ledger {
    records: HashMap<RecordKey, MasteryRecord>,
    /// Newest `difficulty::WINDOW` attempts per pair, oldest first.
    attempts: HashMap<RecordKey, VecDeque<AnswerEvent>>,
}

/// In-process store. Only the attempts the difficulty window can see are
/// retained.
#[derive(Debug, Default)]
pub struct MemoryStore {
    points: RwLock<Vec<KnowledgePoint>>,
    ledger: Mutex<Ledger>,
    paths: Mutex<HashMap<Uuid, LearningPath>>,
}

impl MemoryStore {
    pub fn new(points: Vec<KnowledgePoint>) -> Self {
        Self {
            points: RwLock::new(points),
            ..Self::default()
        }
    }

    pub fn insert_record(&self, record: MasteryRecord) {
        let key = (record.user_id.clone(), record.knowledge_point_id.clone());
        self.ledger.lock().records.insert(key, record);
    }
}

#[async_trait]
impl LearningStore for MemoryStore {
    async fn knowledge_points(&self) -> Result<Vec<KnowledgePoint>> {
        Ok(self.points.read().clone())
    }

    async fn mastery_records(&self, user_id: &str) -> Result<Vec<MasteryRecord>> {
        let mut records: Vec<MasteryRecord> = self
            .ledger
            .lock()
            .records
            .values()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.knowledge_point_id.cmp(&b.knowledge_point_id));
        Ok(records)
    }

    async fn mastery_record(
        &self,
        user_id: &str,
        knowledge_point_id: &str,
    ) -> Result<Option<MasteryRecord>> {
        let key = record_key(user_id, knowledge_point_id);
        Ok(self.ledger.lock().records.get(&key).cloned())
    }

    async fn record_answer(
        &self,
        event: &AnswerEvent,
        update: MasteryUpdate<'_>,
    ) -> Result<MasteryRecord> {
        let key = record_key(&event.user_id, &event.knowledge_point_id);
        let mut ledger = self.ledger.lock();
        let next = update(ledger.records.get(&key));

        let window = ledger.attempts.entry(key.clone()).or_default();
        window.push_back(event.clone());
        while window.len() > difficulty::WINDOW {
            window.pop_front();
        }
        ledger.records.insert(key, next.clone());
        Ok(next)
    }

    async fn recent_attempts(
        &self,
        user_id: &str,
        knowledge_point_id: &str,
        limit: usize,
    ) -> Result<Vec<AnswerEvent>> {
        let key = record_key(user_id, knowledge_point_id);
        let ledger = self.ledger.lock();
        let Some(window) = ledger.attempts.get(&key) else {
            return Ok(Vec::new());
        };
        Ok(window
            .iter()
            .skip(window.len().saturating_sub(limit))
            .cloned()
            .collect())
    }

    async fn save_path(&self, path: &LearningPath) -> Result<()> {
        self.paths.lock().insert(path.id, path.clone());
        Ok(())
    }

    async fn load_path(&self, id: Uuid) -> Result<Option<LearningPath>> {
        Ok(self.paths.lock().get(&id).cloned())
    }
}
