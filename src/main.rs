use std::path::PathBuf;

use adaptive_learning::config::Config;
use adaptive_learning::db::{self, PgStore};
use adaptive_learning::models::{AnswerEvent, Goal};
use adaptive_learning::path::PathRequest;
use adaptive_learning::{logging, report, AdaptiveEngine};
use anyhow::Context;
use chrono::Utc;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "adaptive-learning")]
#[command(about = "Mastery tracking, learning paths and study recommendations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load the sample knowledge graph, optionally with practice for a demo learner
    Seed {
        #[arg(long)]
        demo_user: Option<String>,
    },
    /// Replay answer events from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Record a single answer
    #[command(group(
        ArgGroup::new("outcome")
            .args(["correct", "wrong"])
            .required(true)
            .multiple(false)
    ))]
    Answer {
        #[arg(long)]
        user: String,
        #[arg(long)]
        point: String,
        #[arg(long, default_value_t = 3)]
        difficulty: u8,
        #[arg(long)]
        correct: bool,
        #[arg(long)]
        wrong: bool,
        #[arg(long)]
        seconds: f64,
        #[arg(long)]
        hint: bool,
    },
    /// Show a knowledge point with its prerequisites and dependents
    Node {
        #[arg(long)]
        id: String,
    },
    /// Search knowledge points, easiest first
    Search {
        keyword: String,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        grade: Option<String>,
    },
    /// Diagnose weak points
    WeakPoints {
        #[arg(long)]
        user: String,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Plan a learning path
    Path {
        #[arg(long)]
        user: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        grade: Option<String>,
        #[arg(long, default_value = "improve_weak_points")]
        goal: String,
        #[arg(long, default_value_t = 7)]
        days: u32,
        #[arg(long, default_value_t = 60)]
        daily_minutes: u32,
    },
    /// Mark a path step as completed
    Advance {
        #[arg(long)]
        path: Uuid,
        #[arg(long)]
        step: usize,
    },
    /// Propose the next question difficulty
    Adjust {
        #[arg(long)]
        user: String,
        #[arg(long)]
        point: String,
        #[arg(long)]
        current: u8,
    },
    /// Rank what to study next
    Recommend {
        #[arg(long)]
        user: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Generate a markdown learner report
    Report {
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = logging::init_tracing(&config);

    let database_url = config
        .database_url
        .clone()
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    let engine = AdaptiveEngine::new(PgStore::new(pool.clone(), config.upsert_retries))
        .with_weak_threshold(config.weak_point_threshold)?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed { demo_user } => {
            let inserted = db::seed(&pool).await?;
            println!("Seeded {inserted} knowledge points.");
            if let Some(user) = demo_user {
                let events = db::demo_answers(&user, Utc::now());
                for event in events.iter() {
                    engine.record_answer(event).await?;
                }
                println!("Recorded {} demo answers for {user}.", events.len());
            }
        }
        Commands::Import { csv } => {
            let events = db::read_answer_csv(&csv)?;
            for event in events.iter() {
                engine
                    .record_answer(event)
                    .await
                    .with_context(|| {
                        format!(
                            "failed to record answer for {}/{}",
                            event.user_id, event.knowledge_point_id
                        )
                    })?;
            }
            println!("Recorded {} answers from {}.", events.len(), csv.display());
        }
        Commands::Answer {
            user,
            point,
            difficulty,
            correct,
            wrong: _,
            seconds,
            hint,
        } => {
            let record = engine
                .record_answer(&AnswerEvent {
                    user_id: user,
                    knowledge_point_id: point,
                    difficulty_level: difficulty,
                    correct,
                    answer_time_seconds: seconds,
                    hint_used: hint,
                    answered_at: Utc::now(),
                })
                .await?;
            println!(
                "{} now at level {} ({}/{} correct, streak +{} / -{}).",
                record.knowledge_point_id,
                record.mastery_level,
                record.correct_count,
                record.total_questions,
                record.consecutive_correct,
                record.consecutive_wrong
            );
        }
        Commands::Node { id } => {
            let graph = engine.graph().await?;
            let node = graph.get_node(&id)?;
            println!("{} ({}) difficulty {}", node.name, node.id, node.difficulty);
            let chain: Vec<&str> = graph
                .prerequisite_chain(&id)?
                .into_iter()
                .map(|point| point.id.as_str())
                .collect();
            if chain.is_empty() {
                println!("Prerequisites: none");
            } else {
                println!("Prerequisites: {}", chain.join(" -> "));
            }
            let related: Vec<&str> = graph
                .related(&id)?
                .into_iter()
                .map(|point| point.id.as_str())
                .collect();
            if !related.is_empty() {
                println!("See also: {}", related.join(", "));
            }
            let tree = graph.descendants(&id)?;
            println!("Unlocks {} knowledge points:", tree.size() - 1);
            let mut stack: Vec<(usize, &adaptive_learning::graph::KnowledgeTree)> =
                tree.children.iter().rev().map(|child| (1, child)).collect();
            while let Some((depth, node)) = stack.pop() {
                println!("{}- {} ({})", "  ".repeat(depth - 1), node.point.name, node.point.id);
                stack.extend(node.children.iter().rev().map(|child| (depth + 1, child)));
            }
        }
        Commands::Search {
            keyword,
            subject,
            grade,
        } => {
            let graph = engine.graph().await?;
            let found = graph.search(&keyword, subject.as_deref(), grade.as_deref());
            if found.is_empty() {
                println!("No knowledge points match \"{keyword}\".");
                return Ok(());
            }
            for point in found {
                println!(
                    "- {} ({}, {} grade {}) difficulty {}",
                    point.name, point.id, point.subject, point.grade, point.difficulty
                );
            }
        }
        Commands::WeakPoints {
            user,
            subject,
            threshold,
        } => {
            let weak = engine
                .detect_weak_points(&user, subject.as_deref(), threshold)
                .await?;
            if weak.is_empty() {
                println!("No weak points for {user}.");
                return Ok(());
            }
            println!("Weak points for {user}:");
            for point in weak.iter() {
                println!(
                    "- {} level {} severity {} ({:.2}): {}",
                    point.name.as_deref().unwrap_or(&point.knowledge_point_id),
                    point.mastery_level,
                    point.severity.as_str(),
                    point.severity_score,
                    point.reason
                );
            }
        }
        Commands::Path {
            user,
            subject,
            grade,
            goal,
            days,
            daily_minutes,
        } => {
            let request = PathRequest {
                user_id: user,
                subject,
                grade,
                goal: goal.parse::<Goal>()?,
                day_budget: days,
                daily_minutes,
                weak_threshold: config.weak_point_threshold,
            };
            let path = engine.generate_path(&request).await?;
            println!(
                "Path {} ({}): {} steps over ~{} days.",
                path.id, path.goal, path.total_steps, path.estimated_days
            );
            for (index, step) in path.steps.iter().enumerate() {
                println!(
                    "{}. {} [difficulty {}] {} min: {}",
                    index + 1,
                    step.knowledge_point_id,
                    step.difficulty,
                    step.estimated_minutes,
                    step.reason
                );
            }
        }
        Commands::Advance { path, step } => {
            let updated = engine.advance_path(path, step).await?;
            println!(
                "Path {} at step {}/{} ({}).",
                updated.id,
                updated.current_step,
                updated.total_steps,
                updated.status.as_str()
            );
        }
        Commands::Adjust {
            user,
            point,
            current,
        } => {
            let adjustment = engine.adjust_difficulty(&user, &point, current).await?;
            println!(
                "Next difficulty {} ({}).",
                adjustment.new_difficulty, adjustment.reason
            );
        }
        Commands::Recommend { user, limit } => {
            let recommendations = engine
                .recommend(&user, limit.unwrap_or(config.recommendation_limit))
                .await?;
            if recommendations.is_empty() {
                println!("Nothing to recommend for {user} yet.");
                return Ok(());
            }
            for recommendation in recommendations.iter() {
                println!(
                    "- [{}] {} priority {}: {} (~{} min)",
                    recommendation.kind.as_str(),
                    recommendation.knowledge_point_id,
                    recommendation.priority,
                    recommendation.reason,
                    recommendation.estimated_minutes
                );
            }
        }
        Commands::Report { user, out } => {
            let graph = engine.graph().await?;
            let records = engine.mastery_records(&user).await?;
            let weak = engine.detect_weak_points(&user, None, None).await?;
            let recommendations = engine
                .recommend(&user, config.recommendation_limit)
                .await?;
            let report = report::build_report(
                &user,
                &records,
                &graph,
                &weak,
                &recommendations,
                Utc::now(),
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
