//! Orchestrator: runs the load steps in dependency order.
//!
//! Order: relations -> revenue staging -> movie staging -> date dimension ->
//! distributor dimension -> movie dimension -> revenue facts -> entity
//! dimensions -> bridges. Facts need the movie, date and distributor
//! dimensions; each bridge needs the movie dimension and its entity dimension.
//!
//! Every step yields an explicit [`StepOutcome`]. A step whose prerequisite
//! broke is skipped instead of running against partial state.

use crate::schema::{create_relations, Attribute};
use crate::staging::{stage_movies, stage_revenues, RevenueRecord};
use crate::store::Store;
use crate::{bridge, date_dim, dimension, fact, journal, LoadCounts, Result};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// One unit of work in the fixed run order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    CreateRelations,
    StageRevenues,
    StageMovies,
    DateDimension,
    DistributionDimension,
    MovieDimension,
    RevenueFacts,
    EntityDimension(Attribute),
    Bridge(Attribute),
}

impl Step {
    pub const ORDER: [Step; 15] = [
        Step::CreateRelations,
        Step::StageRevenues,
        Step::StageMovies,
        Step::DateDimension,
        Step::DistributionDimension,
        Step::MovieDimension,
        Step::RevenueFacts,
        Step::EntityDimension(Attribute::Genre),
        Step::EntityDimension(Attribute::Director),
        Step::EntityDimension(Attribute::Writer),
        Step::EntityDimension(Attribute::Actor),
        Step::Bridge(Attribute::Genre),
        Step::Bridge(Attribute::Director),
        Step::Bridge(Attribute::Writer),
        Step::Bridge(Attribute::Actor),
    ];

    pub fn name(self) -> &'static str {
        match self {
            Step::CreateRelations => "create_relations",
            Step::StageRevenues => "stage_revenues",
            Step::StageMovies => "stage_movies",
            Step::DateDimension => "dim_date",
            Step::DistributionDimension => "dim_distribution",
            Step::MovieDimension => "dim_movies",
            Step::RevenueFacts => "fact_revenue",
            Step::EntityDimension(Attribute::Genre) => "dim_genre",
            Step::EntityDimension(Attribute::Director) => "dim_director",
            Step::EntityDimension(Attribute::Writer) => "dim_writer",
            Step::EntityDimension(Attribute::Actor) => "dim_actor",
            Step::Bridge(Attribute::Genre) => "bridge_movie_genre",
            Step::Bridge(Attribute::Director) => "bridge_movie_director",
            Step::Bridge(Attribute::Writer) => "bridge_movie_writer",
            Step::Bridge(Attribute::Actor) => "bridge_movie_actor",
        }
    }

    /// Steps that must have completed for this one to run
    pub fn dependencies(self) -> Vec<Step> {
        match self {
            Step::CreateRelations => vec![],
            Step::StageRevenues | Step::StageMovies | Step::DateDimension => {
                vec![Step::CreateRelations]
            }
            Step::DistributionDimension => vec![Step::StageRevenues],
            Step::MovieDimension => vec![Step::StageMovies],
            Step::RevenueFacts => vec![
                Step::StageRevenues,
                Step::DateDimension,
                Step::DistributionDimension,
                Step::MovieDimension,
            ],
            Step::EntityDimension(_) => vec![Step::StageMovies],
            Step::Bridge(attribute) => vec![Step::MovieDimension, Step::EntityDimension(attribute)],
        }
    }
}

impl Serialize for Step {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Loaded(LoadCounts),
    Skipped { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: Step,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: Option<Uuid>,
    pub steps: Vec<StepReport>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        !self
            .steps
            .iter()
            .any(|r| matches!(r.outcome, StepOutcome::Failed { .. }))
    }

    pub fn outcome(&self, step: Step) -> Option<&StepOutcome> {
        self.steps.iter().find(|r| r.step == step).map(|r| &r.outcome)
    }

    pub fn status(&self) -> &'static str {
        if self.succeeded() {
            "ok"
        } else {
            "failed"
        }
    }
}

/// What to do with the rest of the run once a step fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunPolicy {
    /// Keep running steps whose prerequisites are intact
    #[default]
    Continue,
    /// Stop at the first failure
    Halt,
}

/// Already-parsed source records for one run
#[derive(Debug, Clone, Default)]
pub struct PipelineInput {
    pub revenues: Vec<RevenueRecord>,
    /// Decoded metadata payloads, one per title
    pub payloads: Vec<Value>,
}

pub struct Pipeline<'a> {
    store: &'a Store,
    policy: RunPolicy,
}

impl<'a> Pipeline<'a> {
    pub fn new(store: &'a Store, policy: RunPolicy) -> Self {
        Self { store, policy }
    }

    /// Run every step in order and report each outcome.
    pub async fn run(&self, input: &PipelineInput) -> RunReport {
        let mut report = RunReport {
            run_id: None,
            steps: Vec::with_capacity(Step::ORDER.len()),
        };
        let mut broken: HashSet<Step> = HashSet::new();
        let mut halted_by: Option<Step> = None;

        for step in Step::ORDER {
            let outcome = if let Some(failed) = halted_by {
                broken.insert(step);
                StepOutcome::Skipped {
                    reason: format!("run halted after {} failed", failed.name()),
                }
            } else if let Some(dep) = step.dependencies().into_iter().find(|d| broken.contains(d)) {
                warn!("Skipping {}: prerequisite {} did not complete", step.name(), dep.name());
                broken.insert(step);
                StepOutcome::Skipped {
                    reason: format!("prerequisite {} did not complete", dep.name()),
                }
            } else {
                let span = info_span!("step", name = step.name());
                match self.execute(step, input).instrument(span).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("Step {} failed: {}", step.name(), e);
                        broken.insert(step);
                        if self.policy == RunPolicy::Halt {
                            halted_by = Some(step);
                        }
                        StepOutcome::Failed {
                            reason: e.to_string(),
                        }
                    }
                }
            };

            if step == Step::CreateRelations && !broken.contains(&step) {
                match journal::create_run(self.store).await {
                    Ok(run_id) => {
                        info!("Run {} started", run_id);
                        report.run_id = Some(run_id);
                    }
                    Err(e) => warn!("Run journal unavailable: {}", e),
                }
            }

            report.steps.push(StepReport { step, outcome });
        }

        if let Some(run_id) = report.run_id {
            let detail = serde_json::to_value(&report.steps).unwrap_or(Value::Null);
            if let Err(e) = journal::finish_run(self.store, run_id, report.status(), &detail).await {
                warn!("Failed to close run {}: {}", run_id, e);
            }
        }

        info!("Run finished: {}", report.status());
        report
    }

    async fn execute(&self, step: Step, input: &PipelineInput) -> Result<StepOutcome> {
        let store = self.store;
        let counts = match step {
            Step::CreateRelations => {
                create_relations(store).await?;
                LoadCounts::default()
            }
            Step::StageRevenues => LoadCounts {
                inserted: stage_revenues(store, &input.revenues).await?,
                ..LoadCounts::default()
            },
            Step::StageMovies => {
                let staged = stage_movies(store, &input.payloads).await?;
                if !staged.dropped_keys.is_empty() {
                    info!("{} metadata keys had no staging column", staged.dropped_keys.len());
                }
                LoadCounts {
                    inserted: staged.rows,
                    ..LoadCounts::default()
                }
            }
            Step::DateDimension => match date_dim::generate_date_dimension(store).await? {
                Some(counts) => counts,
                None => {
                    return Ok(StepOutcome::Skipped {
                        reason: "dim_date already populated".to_string(),
                    })
                }
            },
            Step::DistributionDimension => dimension::load_distribution_dimension(store).await?,
            Step::MovieDimension => dimension::load_movie_dimension(store).await?,
            Step::RevenueFacts => fact::load_revenue_facts(store).await?,
            Step::EntityDimension(attribute) => {
                dimension::load_attribute_dimension(store, attribute).await?
            }
            Step::Bridge(attribute) => bridge::load_bridge(store, attribute).await?,
        };
        Ok(StepOutcome::Loaded(counts))
    }
}
