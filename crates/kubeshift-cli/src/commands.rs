//! Subcommand execution.

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use kubeshift_core::status::StatusReport;
use kubeshift_core::{
    ConversionOptimizer, FieldMappingConverter, MigrationContext, MigrationExecutor,
    MigrationPlan, MigrationResult, RollbackSummary, SchemaEvolutionTracker,
    SledSchemaStorage, TracingStatusHandler, ValidationEngine,
};

use crate::args::{
    AnalyzeArgs, Args, CheckArgs, Command, HistoryArgs, OrderArgs, PlanArgs, SimulateArgs,
};
use crate::error::CliError;
use crate::fixtures;
use crate::formatter::{create_formatter, Formatter};

/// Text to print and whether the command succeeded.
pub struct Outcome {
    pub output: String,
    pub success: bool,
}

impl Outcome {
    fn ok(output: String) -> Self {
        Self {
            output,
            success: true,
        }
    }
}

/// Structural check of a plan file.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanCheck {
    pub valid: bool,
    pub issues: Vec<String>,
    pub batches: Vec<BatchSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub index: usize,
    pub resources: usize,
    pub namespaces: Vec<String>,
}

impl PlanCheck {
    pub fn of(plan: &MigrationPlan) -> Self {
        let issues = match plan.validate() {
            Ok(()) => Vec::new(),
            Err(e) => vec![e.to_string()],
        };
        let batches = if plan.batch_size == 0 {
            Vec::new()
        } else {
            plan.batches()
                .enumerate()
                .map(|(index, batch)| BatchSummary {
                    index: index + 1,
                    resources: batch.len(),
                    namespaces: batch
                        .iter()
                        .map(|identity| identity.namespace.clone())
                        .collect::<BTreeSet<_>>()
                        .into_iter()
                        .collect(),
                })
                .collect()
        };
        Self {
            valid: issues.is_empty(),
            issues,
            batches,
        }
    }
}

/// Everything a simulated run produced.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Simulation {
    pub result: MigrationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<StatusReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackSummary>,
}

pub async fn run(args: Args) -> Result<Outcome, CliError> {
    let formatter = create_formatter(args.format);
    match args.command {
        Command::Plan(plan_args) => plan(&plan_args, &*formatter).await,
        Command::Analyze(analyze_args) => analyze(&analyze_args, &*formatter),
        Command::Order(order_args) => order(&order_args, &*formatter),
        Command::Check(check_args) => check(&check_args, &*formatter),
        Command::Simulate(simulate_args) => simulate(&simulate_args, &*formatter).await,
        Command::History(history_args) => history(&history_args, &*formatter).await,
    }
}

/// Open (or create) the sled database holding migration history.
fn open_history(path: &Path) -> Result<Arc<SledSchemaStorage>, CliError> {
    let db = sled::Config::new()
        .path(path)
        .open()
        .map_err(|source| CliError::Database {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(Arc::new(SledSchemaStorage::open(&db)?))
}

async fn history(args: &HistoryArgs, formatter: &dyn Formatter) -> Result<Outcome, CliError> {
    let tracker = SchemaEvolutionTracker::with_storage(open_history(&args.db)?);
    let records = tracker.history(args.limit).await?;
    Ok(Outcome::ok(formatter.format_history(&records)))
}

async fn plan(args: &PlanArgs, formatter: &dyn Formatter) -> Result<Outcome, CliError> {
    let store = Arc::new(fixtures::load_store(&args.fixtures)?);
    let converter = Arc::new(FieldMappingConverter::new(
        args.source.clone(),
        args.target.clone(),
    ));
    let executor = MigrationExecutor::new(store, converter, Default::default());
    let plan = executor
        .plan_migration(&args.source, &args.target, &args.to_options())
        .await?;

    match &args.output {
        Some(path) => {
            plan.save(path)?;
            Ok(Outcome::ok(format!(
                "Wrote plan with {} resource(s) to {}",
                plan.resources.len(),
                path.display()
            )))
        }
        None => Ok(Outcome::ok(formatter.format_plan(&plan))),
    }
}

fn analyze(args: &AnalyzeArgs, formatter: &dyn Formatter) -> Result<Outcome, CliError> {
    let plan = MigrationPlan::load(&args.plan)?;
    let risk = args.risk.to_analyzer().analyze(&plan);
    Ok(Outcome::ok(formatter.format_risk(&risk)))
}

fn order(args: &OrderArgs, formatter: &dyn Formatter) -> Result<Outcome, CliError> {
    let plan = MigrationPlan::load(&args.plan)?;
    let ordered = ConversionOptimizer::default().optimize_batch(plan.resources.clone());
    let plan = plan.with_resources(ordered);
    if args.write {
        plan.save(&args.plan)?;
    }
    Ok(Outcome::ok(formatter.format_plan(&plan)))
}

fn check(args: &CheckArgs, formatter: &dyn Formatter) -> Result<Outcome, CliError> {
    let plan = read_unchecked(&args.plan)?;
    let check = PlanCheck::of(&plan);
    Ok(Outcome {
        output: formatter.format_check(&check),
        success: check.valid,
    })
}

/// Read a plan without validating it.
fn read_unchecked(path: &Path) -> Result<MigrationPlan, CliError> {
    let json = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(MigrationPlan::from_json(&json)?)
}

async fn simulate(args: &SimulateArgs, formatter: &dyn Formatter) -> Result<Outcome, CliError> {
    let mut plan = MigrationPlan::load(&args.plan)?;
    if args.dry_run {
        plan = plan.with_dry_run(true);
    }

    let store = Arc::new(fixtures::load_store(&args.fixtures)?);
    if !store
        .snapshot()
        .iter()
        .any(|resource| resource.resource_type == plan.source_type)
    {
        return Err(CliError::NoResources(plan.source_type.clone()));
    }

    let mut converter = FieldMappingConverter::new(plan.source_type.clone(), plan.target_type.clone());
    for (from, to) in args.mappings()? {
        converter = converter.rename(from, to);
    }
    for path in &args.drops {
        converter = converter.drop_field(path.clone());
    }

    let mut validator = ValidationEngine::new(store.clone());
    validator.register_default_rules(&plan.source_type);

    let history_store = args.db.as_deref().map(open_history).transpose()?;
    let tracker = Arc::new(match &history_store {
        Some(storage) => SchemaEvolutionTracker::with_storage(storage.clone()),
        None => SchemaEvolutionTracker::new(),
    });
    if history_store.is_some() {
        if let Err(e) = tracker.record_migration_plan(&plan).await {
            tracing::warn!(error = %e, "failed to record plan");
        }
    }

    let executor = MigrationExecutor::new(store, Arc::new(converter), args.to_config())
        .with_validator(Arc::new(validator))
        .with_risk_analyzer(args.risk.to_analyzer())
        .with_tracker(tracker);

    let ctx = MigrationContext::new(args.reporter_config());
    ctx.reporter().add_handler(Arc::new(TracingStatusHandler));

    let token = ctx.cancel_token().clone();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("received interrupt, cancelling migration");
            token.cancel();
        }
    });

    let executed = executor.execute(&ctx, &plan).await;
    signal.abort();
    let result = executed?;

    let rollback = if args.rollback_on_failure && !result.dry_run && result.failed_count > 0 {
        Some(executor.rollback(&ctx, &plan, &result).await?)
    } else {
        None
    };

    if let Some(storage) = &history_store {
        storage.flush()?;
    }

    let report = ctx.reporter().generate_report().ok();
    let success = result.is_success() && rollback.as_ref().map_or(true, |r| r.is_success());
    let simulation = Simulation {
        result,
        report,
        rollback,
    };
    Ok(Outcome {
        output: formatter.format_simulation(&simulation),
        success,
    })
}
