use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("knowledge point not found: {0}")]
    KnowledgePointNotFound(String),
    #[error("learning path not found: {0}")]
    PathNotFound(Uuid),
    #[error("cyclic dependency detected among {0:?}")]
    CyclicDependency(Vec<String>),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("mastery record for {user_id}/{knowledge_point_id} kept changing, update abandoned")]
    Conflict {
        user_id: String,
        knowledge_point_id: String,
    },
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
