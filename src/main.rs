use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use pathwise_core::profile::rolling_variance;
use pathwise_core::{
    ActivityCatalog, AdaptationEngine, Config, Difficulty, LearnerState, LearningGoal,
    NoGenerator, PathBuilder, Performance, ProficiencyLevel, Session, SkillInsight, SkillProfiler,
};
use pathwise_graph::{GraphStore, Skill, SkillCategory, SkillGraph, TomlGraphStore};
use pathwise_store::SqliteGateway;

#[derive(Parser)]
#[command(name = "pathwise")]
#[command(version, about = "Adaptive learning paths driven by a developer's skill profile")]
struct Cli {
    /// Path to the TOML config file (default: `$PATHWISE_CONFIG` or config/pathwise.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate the skill graph and print it in prerequisite order
    CheckGraph,

    /// Append a skill to the graph file
    Publish {
        id: String,
        #[arg(long, value_enum, default_value = "concept")]
        category: CategoryArg,
        /// Prerequisite skill ids
        #[arg(long = "requires", value_delimiter = ',')]
        prerequisites: Vec<String>,
    },

    /// Assess a developer and generate the first path
    Enroll {
        developer: String,
        /// Assessed level as `skill=level`, repeatable
        #[arg(long = "assess", value_parser = parse_assessment)]
        assessed: Vec<(String, ProficiencyLevel)>,
        /// Goal as `skill:target[:priority]`, repeatable
        #[arg(long = "goal", required = true)]
        goals: Vec<LearningGoal>,
    },

    /// Show the activity at the cursor with its content
    Next { developer: String },

    /// Record the result of the current activity
    Complete {
        developer: String,
        /// Fraction answered correctly, 0..=1
        accuracy: f64,
        #[arg(long, default_value_t = 1.0)]
        speed_ratio: f64,
        /// Accuracy variance; derived from the topic's recent samples when omitted
        #[arg(long)]
        consistency: Option<f64>,
        #[arg(long, default_value_t = 1)]
        attempts: u32,
    },

    /// Ask for a different difficulty on the next activity of a topic
    RequestDifficulty {
        developer: String,
        topic: String,
        difficulty: Difficulty,
    },

    /// Feed code-analysis evidence about a skill
    Insight {
        developer: String,
        skill: String,
        observed: ProficiencyLevel,
        #[arg(long, default_value_t = 1.0)]
        confidence: f64,
    },

    /// Replace the goal set and regenerate the path
    Goals {
        developer: String,
        #[arg(long = "goal", required = true)]
        goals: Vec<LearningGoal>,
    },

    /// Drop the remaining activities of the current path
    Abandon { developer: String },

    /// Print the skill summary as JSON
    Summary { developer: String },

    /// List enrolled developers
    Developers,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CategoryArg {
    Language,
    Framework,
    Algorithm,
    Design,
    Tool,
    Concept,
}

impl From<CategoryArg> for SkillCategory {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Language => Self::Language,
            CategoryArg::Framework => Self::Framework,
            CategoryArg::Algorithm => Self::Algorithm,
            CategoryArg::Design => Self::Design,
            CategoryArg::Tool => Self::Tool,
            CategoryArg::Concept => Self::Concept,
        }
    }
}

fn parse_assessment(s: &str) -> Result<(String, ProficiencyLevel), String> {
    let (skill, level) = s
        .split_once('=')
        .ok_or_else(|| format!("expected skill=level, got {s:?}"))?;
    let level = level.trim().parse().map_err(|e| format!("{e}"))?;
    Ok((skill.trim().to_owned(), level))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config);
    let config = Config::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;
    let graph_store = TomlGraphStore::new(&config.graph.skills_path);

    match cli.command {
        Command::CheckGraph => {
            let graph = graph_store.load_graph().await?;
            let order = graph.topological_order(graph.skills().map(|s| s.id.as_str()))?;
            println!("{} skills, acyclic", graph.len());
            for id in order {
                if let Some(skill) = graph.get(&id) {
                    let prereqs: Vec<&str> = skill.prerequisites.iter().map(String::as_str).collect();
                    println!("  {id} ({}) <- [{}]", skill.category, prereqs.join(", "));
                }
            }
        }
        Command::Publish {
            id,
            category,
            prerequisites,
        } => {
            graph_store
                .publish(Skill::new(&id, category.into()).with_prerequisites(prerequisites))
                .await?;
            println!("published {id}");
        }
        command => run_session(&config, &graph_store, command).await?,
    }
    Ok(())
}

async fn run_session(
    config: &Config,
    graph_store: &TomlGraphStore,
    command: Command,
) -> anyhow::Result<()> {
    let graph = Arc::new(graph_store.load_graph().await?);
    let session = open_session(config, graph).await?;
    let now = Utc::now();

    match command {
        Command::Enroll {
            developer,
            assessed,
            goals,
        } => {
            let assessed: BTreeMap<_, _> = assessed.into_iter().collect();
            let state = session.enroll(&developer, &assessed, &goals, now).await?;
            println!(
                "enrolled {developer}: {} activities, estimated completion {}",
                state.path.len(),
                state.path.estimated_completion().to_rfc3339()
            );
            for activity in state.path.activities() {
                println!("  {} ({} min)", activity.id, activity.estimated_minutes);
            }
        }
        Command::Next { developer } => match session.next_activity(&developer).await? {
            Some(next) => println!("{}", serde_json::to_string_pretty(&next)?),
            None => println!("{developer} has finished the current path"),
        },
        Command::Complete {
            developer,
            accuracy,
            speed_ratio,
            consistency,
            attempts,
        } => {
            let consistency = match consistency {
                Some(consistency) => consistency,
                None => {
                    let snapshot = session.snapshot(&developer).await?;
                    derived_consistency(&snapshot.state, accuracy, config.profiler.trend_window)
                }
            };
            let performance = Performance {
                accuracy,
                speed_ratio,
                consistency,
                attempts,
            };
            let report = session
                .record_completion(&developer, &performance, now)
                .await?;
            println!(
                "completed {} ({} -> {})",
                report.completed.id, report.transition.from, report.transition.to
            );
            for line in &report.rationale {
                println!("  {line}");
            }
            match report.next {
                Some(next) => println!("next: {}", next.id),
                None => println!("path finished"),
            }
        }
        Command::RequestDifficulty {
            developer,
            topic,
            difficulty,
        } => {
            for line in session
                .request_difficulty(&developer, &topic, difficulty)
                .await?
            {
                println!("{line}");
            }
        }
        Command::Insight {
            developer,
            skill,
            observed,
            confidence,
        } => {
            let insight = SkillInsight {
                skill,
                observed,
                confidence,
            };
            for line in session.record_insight(&developer, &insight, now).await? {
                println!("{line}");
            }
        }
        Command::Goals { developer, goals } => {
            let path = session.change_goals(&developer, &goals, now).await?;
            println!("regenerated path for {developer}: {} activities", path.len());
        }
        Command::Abandon { developer } => {
            session.abandon(&developer, now).await?;
            println!("abandoned remaining activities for {developer}");
        }
        Command::Summary { developer } => {
            let summary = session.summary(&developer).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Developers => {
            for id in session.gateway().developers().await? {
                println!("{id}");
            }
        }
        Command::CheckGraph | Command::Publish { .. } => {}
    }
    Ok(())
}

async fn open_session(
    config: &Config,
    graph: Arc<SkillGraph>,
) -> anyhow::Result<Session<SqliteGateway, NoGenerator>> {
    let catalog = Arc::new(load_catalog(config, &graph)?);
    let profiler = SkillProfiler::new(Arc::clone(&graph), config.profiler.clone());
    let builder = PathBuilder::new(graph, Arc::clone(&catalog), config.path.clone());
    let engine = AdaptationEngine::new(profiler, builder, config.adaptation.clone());

    let gateway = SqliteGateway::open(&config.store.sqlite_path)
        .await
        .with_context(|| format!("opening learner store {}", config.store.sqlite_path))?;

    Ok(Session::new(engine, catalog, gateway, NoGenerator)
        .with_max_save_retries(config.store.max_save_retries)
        .with_top_gaps(config.summary.top_gaps))
}

fn load_catalog(config: &Config, graph: &SkillGraph) -> anyhow::Result<ActivityCatalog> {
    let minutes = config.path.default_activity_minutes;
    let Some(path) = config.graph.catalog_path.as_deref() else {
        return Ok(ActivityCatalog::new(minutes));
    };
    let path = Path::new(path);
    if !path.exists() {
        tracing::warn!(path = %path.display(), "activity catalog missing, synthesizing activities");
        return Ok(ActivityCatalog::new(minutes));
    }
    let content = std::fs::read_to_string(path).context("failed to read activity catalog")?;
    let catalog = ActivityCatalog::parse(&content, minutes)?;
    catalog.validate_against(graph)?;
    tracing::info!(activities = catalog.len(), "activity catalog loaded");
    Ok(catalog)
}

/// Variance of the cursor topic's recent accuracies with `accuracy` as the newest one.
fn derived_consistency(state: &LearnerState, accuracy: f64, window: usize) -> f64 {
    state.path.next_activity().map_or(0.0, |activity| {
        rolling_variance(state.profile.samples(&activity.topic), accuracy, window)
    })
}

fn resolve_config_path(flag: Option<PathBuf>) -> PathBuf {
    if let Some(path) = flag {
        return path;
    }
    if let Ok(path) = std::env::var("PATHWISE_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/pathwise.toml")
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
