//! Adaptive learning engine: mastery tracking over a prerequisite-ordered
//! knowledge graph, weak point diagnosis, learning path planning, difficulty
//! adjustment and study recommendations.

pub mod config;
pub mod db;
pub mod difficulty;
pub mod engine;
pub mod error;
pub mod graph;
pub mod logging;
pub mod mastery;
pub mod models;
pub mod path;
pub mod questions;
pub mod recommend;
pub mod report;
pub mod store;
pub mod weak_points;

pub use engine::AdaptiveEngine;
pub use error::{EngineError, Result};
pub use graph::KnowledgeGraph;
pub use store::{LearningStore, MemoryStore};
