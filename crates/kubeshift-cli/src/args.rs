//! Command-line arguments.

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use kubeshift_core::migration::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_CONCURRENCY};
use kubeshift_core::{
    MigrationConfig, PlanOptions, ReporterConfig, ResourceType, RetryPolicy, RiskAnalyzer,
    RiskLevel,
};

use crate::formatter::OutputFormat;

/// kubeshift - custom resource migration planner
#[derive(Parser, Debug)]
#[command(name = "kubeshift")]
#[command(version, about = "Plan, check and simulate custom resource migrations")]
pub struct Args {
    /// Output format
    #[arg(long, global = true, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a plan from every fixture resource at the source type
    Plan(PlanArgs),
    /// Score the risk of a plan
    Analyze(AnalyzeArgs),
    /// Reorder a plan's resources with the default ordering strategies
    Order(OrderArgs),
    /// Check a plan for structural problems and show its batches
    Check(CheckArgs),
    /// Execute a plan against an in-memory copy of the fixtures
    Simulate(SimulateArgs),
    /// Show migration runs recorded in a history database
    History(HistoryArgs),
}

#[derive(ClapArgs, Debug)]
pub struct HistoryArgs {
    /// History database directory
    #[arg(long)]
    pub db: PathBuf,

    /// Most recent records to show; 0 shows all
    #[arg(short = 'n', long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(ClapArgs, Debug)]
pub struct PlanArgs {
    /// JSON array of resources
    #[arg(short, long)]
    pub fixtures: PathBuf,

    /// Source type, e.g. observability.io/v1beta1/Platform
    #[arg(long)]
    pub source: ResourceType,

    /// Target type, e.g. observability.io/v1/Platform
    #[arg(long)]
    pub target: ResourceType,

    /// Restrict the plan to one namespace
    #[arg(short, long)]
    pub namespace: Option<String>,

    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENCY)]
    pub max_concurrency: usize,

    /// Process one resource at a time
    #[arg(long)]
    pub sequential: bool,

    /// Mark the plan as a dry run
    #[arg(long)]
    pub dry_run: bool,

    /// Write the plan here instead of printing it
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl PlanArgs {
    pub fn to_options(&self) -> PlanOptions {
        let mut options = PlanOptions::default()
            .with_batch_size(self.batch_size)
            .with_max_concurrency(self.max_concurrency)
            .with_parallel(!self.sequential)
            .with_dry_run(self.dry_run);
        if let Some(namespace) = &self.namespace {
            options = options.with_namespace(namespace.clone());
        }
        options
    }
}

#[derive(ClapArgs, Debug)]
pub struct RiskArgs {
    /// Plans with more resources than this carry a resource-count factor
    #[arg(long)]
    pub resource_threshold: Option<usize>,

    /// Extra namespaces treated as production
    #[arg(long = "production-namespace")]
    pub production_namespaces: Vec<String>,
}

impl RiskArgs {
    pub fn to_analyzer(&self) -> RiskAnalyzer {
        let mut analyzer = RiskAnalyzer::new();
        if let Some(threshold) = self.resource_threshold {
            analyzer = analyzer.with_resource_count_threshold(threshold);
        }
        for namespace in &self.production_namespaces {
            analyzer = analyzer.with_production_namespace(namespace.clone());
        }
        analyzer
    }
}

#[derive(ClapArgs, Debug)]
pub struct AnalyzeArgs {
    /// Plan file
    pub plan: PathBuf,

    #[command(flatten)]
    pub risk: RiskArgs,
}

#[derive(ClapArgs, Debug)]
pub struct OrderArgs {
    /// Plan file
    pub plan: PathBuf,

    /// Rewrite the plan file in place
    #[arg(long)]
    pub write: bool,
}

#[derive(ClapArgs, Debug)]
pub struct CheckArgs {
    /// Plan file
    pub plan: PathBuf,
}

/// Highest risk level a simulation may run at without `--force`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MaxRisk {
    Low,
    Medium,
    High,
}

impl From<MaxRisk> for RiskLevel {
    fn from(value: MaxRisk) -> Self {
        match value {
            MaxRisk::Low => RiskLevel::Low,
            MaxRisk::Medium => RiskLevel::Medium,
            MaxRisk::High => RiskLevel::High,
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct SimulateArgs {
    /// Plan file
    pub plan: PathBuf,

    /// JSON array of resources loaded into the in-memory store
    #[arg(short, long)]
    pub fixtures: PathBuf,

    /// Move a spec field during conversion, as from=to (repeatable)
    #[arg(long = "rename")]
    pub renames: Vec<String>,

    /// Drop a spec field during conversion (repeatable)
    #[arg(long = "drop")]
    pub drops: Vec<String>,

    /// Run without writing, regardless of the plan
    #[arg(long)]
    pub dry_run: bool,

    /// Proceed despite validation errors and excess risk
    #[arg(long)]
    pub force: bool,

    #[arg(long, value_enum, default_value = "medium")]
    pub max_risk: MaxRisk,

    /// Skip pre-migration validation
    #[arg(long)]
    pub skip_pre_validation: bool,

    /// Skip post-migration validation
    #[arg(long)]
    pub skip_post_validation: bool,

    /// Attempts per resource for retryable failures
    #[arg(long, default_value_t = 1)]
    pub attempts: u32,

    /// Bound on each store and converter call, in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Roll back every backed-up resource if any resource fails
    #[arg(long)]
    pub rollback_on_failure: bool,

    /// Status update interval in milliseconds; 0 disables periodic updates
    #[arg(long, default_value_t = 1000)]
    pub update_interval_ms: u64,

    /// Record the plan and its result in this history database
    #[arg(long)]
    pub db: Option<PathBuf>,

    #[command(flatten)]
    pub risk: RiskArgs,
}

impl SimulateArgs {
    pub fn to_config(&self) -> MigrationConfig {
        let retry = if self.attempts > 1 {
            RetryPolicy::exponential(self.attempts)
        } else {
            RetryPolicy::none()
        };
        let mut config = MigrationConfig::default()
            .with_pre_validation(!self.skip_pre_validation)
            .with_post_validation(!self.skip_post_validation)
            .with_force(self.force)
            .with_max_allowed_risk(self.max_risk.into())
            .with_retry(retry);
        if let Some(ms) = self.timeout_ms {
            config = config.with_operation_timeout(Duration::from_millis(ms));
        }
        config
    }

    pub fn reporter_config(&self) -> ReporterConfig {
        ReporterConfig::default().with_update_interval(Duration::from_millis(self.update_interval_ms))
    }

    /// Parsed `--rename` pairs.
    pub fn mappings(&self) -> Result<Vec<(String, String)>, crate::error::CliError> {
        self.renames
            .iter()
            .map(|raw| match raw.split_once('=') {
                Some((from, to)) if !from.is_empty() && !to.is_empty() => {
                    Ok((from.to_string(), to.to_string()))
                }
                _ => Err(crate::error::CliError::Mapping(raw.clone())),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simulate() {
        let args = Args::try_parse_from([
            "kubeshift",
            "simulate",
            "plan.json",
            "--fixtures",
            "fixtures.json",
            "--rename",
            "retention=storage.retention",
            "--attempts",
            "3",
            "--max-risk",
            "high",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(args.format, OutputFormat::Json);
        let Command::Simulate(sim) = args.command else {
            panic!("expected simulate");
        };
        assert_eq!(
            sim.mappings().unwrap(),
            [("retention".to_string(), "storage.retention".to_string())]
        );
        let config = sim.to_config();
        assert_eq!(config.max_allowed_risk, RiskLevel::High);
        assert!(config.retry.should_retry(1));
        assert!(config.pre_validation);
    }

    #[test]
    fn test_bad_mapping_rejected() {
        let args = Args::try_parse_from([
            "kubeshift",
            "simulate",
            "plan.json",
            "-f",
            "fixtures.json",
            "--rename",
            "retention",
        ])
        .unwrap();
        let Command::Simulate(sim) = args.command else {
            panic!("expected simulate");
        };
        assert!(sim.mappings().is_err());
    }

    #[test]
    fn test_parse_history() {
        let args = Args::try_parse_from(["kubeshift", "history", "--db", "state", "-n", "5"]).unwrap();
        let Command::History(history) = args.command else {
            panic!("expected history");
        };
        assert_eq!(history.db, PathBuf::from("state"));
        assert_eq!(history.limit, 5);

        let args = Args::try_parse_from(["kubeshift", "history", "--db", "state"]).unwrap();
        let Command::History(history) = args.command else {
            panic!("expected history");
        };
        assert_eq!(history.limit, 20);
    }

    #[test]
    fn test_plan_types_parsed() {
        let args = Args::try_parse_from([
            "kubeshift",
            "plan",
            "-f",
            "fixtures.json",
            "--source",
            "observability.io/v1beta1/Platform",
            "--target",
            "observability.io/v1/Platform",
            "--sequential",
        ])
        .unwrap();
        let Command::Plan(plan) = args.command else {
            panic!("expected plan");
        };
        assert_eq!(plan.source.version, "v1beta1");
        let options = plan.to_options();
        assert!(!options.parallel);
        assert_eq!(options.batch_size, DEFAULT_BATCH_SIZE);
        assert!(Args::try_parse_from(["kubeshift", "plan", "-f", "x", "--source", "bad", "--target", "v1/X"]).is_err());
    }
}
