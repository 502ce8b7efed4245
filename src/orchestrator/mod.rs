//! Investigation orchestrator: a fixed directed graph — planner →
//! analyzer-dispatcher → {device, network, location, logs, risk} →
//! aggregator → complete | planner (one retry) — scheduled either in
//! parallel (bounded by a semaphore) or sequentially.
//!
//! Grounded on the `Orchestrator` trait / `OrchestratorConfig` /
//! recursion-limited `recursive_call` shape of `orchestrator.rs`,
//! generalized from LLM-reasoning recursion to analyzer-graph recursion:
//! depth now counts graph node visits, and the "sub-call" is dispatching
//! one analyzer rather than an LLM turn.

pub mod checkpoint;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::aggregator::{aggregate, AggregateResult, AggregatorConfig};
use crate::analyzers::{run_analyzer, Analyzer, Domain, DomainFinding};
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::investigation::{FailureCause, Investigation, InvestigationStatus};
use crate::logging::context::with_investigation_id;
use crate::progress::{ToolExecution, ToolExecutionKind};
use crate::warehouse::{TimeRange, Transaction};

pub use checkpoint::{Checkpoint, CheckpointStore, InMemoryCheckpointStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingPolicy {
    Parallel,
    Sequential,
}

/// Fixed dispatch order for `SchedulingPolicy::Sequential`.
const SEQUENTIAL_ORDER: [Domain; 5] = [
    Domain::Device,
    Domain::Network,
    Domain::Location,
    Domain::Logs,
    Domain::Risk,
];

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub max_depth: u32,
    pub scheduling: SchedulingPolicy,
    /// Bound on concurrent analyzer dispatch; must not exceed
    /// `pool_size - 1` (one connection reserved for checkpointing).
    pub analyzer_concurrency: usize,
    pub aggregator: AggregatorConfig,
}

impl OrchestratorConfig {
    pub fn live() -> Self {
        Self {
            max_depth: 120,
            scheduling: SchedulingPolicy::Parallel,
            analyzer_concurrency: 4,
            aggregator: AggregatorConfig::default(),
        }
    }

    pub fn demo() -> Self {
        Self {
            max_depth: 150,
            ..Self::live()
        }
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    analyzers: HashMap<Domain, Arc<dyn Analyzer>>,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        analyzers: HashMap<Domain, Arc<dyn Analyzer>>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            config,
            analyzers,
            checkpoints,
        }
    }

    /// Run (or resume) an investigation to completion. Mutates
    /// `investigation` in place: status transitions, progress log
    /// entries, and accumulated findings are all recorded directly on it
    /// so the caller can persist the final state unconditionally.
    ///
    /// The whole run executes inside the investigation's ambient logging
    /// scope (spec §4.10) so every log line emitted here, by a
    /// sequentially-dispatched analyzer, or by a warehouse/LLM call made
    /// from within it, carries this investigation's id.
    pub async fn run(
        &self,
        investigation: &mut Investigation,
        entity: &Entity,
        transactions: &[Transaction],
        cancel: &CancellationToken,
    ) -> Result<AggregateResult> {
        let investigation_id = investigation.id.clone();
        with_investigation_id(
            investigation_id,
            self.run_scoped(investigation, entity, transactions, cancel),
        )
        .await
    }

    async fn run_scoped(
        &self,
        investigation: &mut Investigation,
        entity: &Entity,
        transactions: &[Transaction],
        cancel: &CancellationToken,
    ) -> Result<AggregateResult> {
        if investigation.status == InvestigationStatus::Pending {
            investigation.transition_to(InvestigationStatus::InProgress)?;
        }

        // Resume: seed in-flight findings from a prior checkpoint.
        if let Some(checkpoint) = self.checkpoints.load(&investigation.id).await? {
            for (domain, finding) in checkpoint.findings {
                investigation.findings.entry(domain).or_insert(finding);
            }
        }

        let window: TimeRange = investigation.window.into();
        let mut depth: u32 = 0;
        let mut retried = false;

        loop {
            depth += 1;
            if depth > self.config.max_depth {
                investigation.fail(FailureCause::RecursionLimit {
                    limit: self.config.max_depth,
                })?;
                return Err(Error::recursion_limit(self.config.max_depth));
            }

            if cancel.is_cancelled() {
                investigation.fail(FailureCause::Cancelled)?;
                return Err(Error::Cancelled);
            }

            let pending: Vec<Domain> = Domain::ALL
                .into_iter()
                .filter(|d| !investigation.findings.contains_key(d))
                .collect();

            if !pending.is_empty() {
                self.dispatch(investigation, entity, window, transactions, &pending, cancel)
                    .await?;
            }

            if cancel.is_cancelled() {
                investigation.fail(FailureCause::Cancelled)?;
                return Err(Error::Cancelled);
            }

            // Aggregator barrier: consume the findings map only after
            // every dispatched analyzer (or its failure record) has
            // landed (spec §5 ordering guarantees).
            let findings: Vec<DomainFinding> = Domain::ALL
                .into_iter()
                .filter_map(|d| investigation.findings.get(&d).cloned())
                .collect();

            let tools_used = investigation.progress.successes_for(ToolExecutionKind::AnalyzerCompleted);
            let result = aggregate(&findings, tools_used, Domain::ALL.len(), self.config.aggregator)?;

            investigation.progress.overall_risk_score = result.final_risk;
            investigation
                .progress
                .record(ToolExecution::new(ToolExecutionKind::AggregationComplete, depth, &result.narrative, true));

            self.checkpoints
                .save(
                    &investigation.id,
                    &Checkpoint {
                        findings: investigation.findings.clone(),
                        tool_executions: investigation.progress.tool_executions.clone(),
                    },
                )
                .await?;

            if result.final_risk.is_none() && !retried {
                // Aggregator -> planner: one retry with narrowed scope.
                // "Narrowed scope" here means re-running only the domains
                // whose finding carried zero evidence, on the theory that
                // a local failure (network blip, transient SIEM timeout)
                // rather than genuine absence of signal caused the gate.
                retried = true;
                let narrow: Vec<Domain> = Domain::ALL
                    .into_iter()
                    .filter(|d| {
                        investigation
                            .findings
                            .get(d)
                            .map(|f| f.risk_score.is_none() && f.evidence.is_empty())
                            .unwrap_or(true)
                    })
                    .collect();
                for d in narrow {
                    investigation.findings.remove(&d);
                }
                info!(investigation_id = %investigation.id, "aggregator returned bottom, retrying narrowed scope");
                continue;
            }

            investigation.transition_to(InvestigationStatus::Completed)?;
            return Ok(result);
        }
    }

    async fn dispatch(
        &self,
        investigation: &mut Investigation,
        entity: &Entity,
        window: TimeRange,
        transactions: &[Transaction],
        pending: &[Domain],
        cancel: &CancellationToken,
    ) -> Result<()> {
        match self.config.scheduling {
            SchedulingPolicy::Sequential => {
                for domain in SEQUENTIAL_ORDER.iter().filter(|d| pending.contains(d)) {
                    let finding = self.run_one(*domain, entity, window, transactions, cancel).await;
                    self.record_finding(investigation, *domain, finding);
                }
                Ok(())
            }
            SchedulingPolicy::Parallel => {
                let semaphore = Arc::new(Semaphore::new(self.config.analyzer_concurrency.max(1)));
                let mut handles = Vec::new();
                for domain in pending {
                    let domain = *domain;
                    let analyzer = self.analyzers.get(&domain).cloned();
                    let entity = entity.clone();
                    let transactions = transactions.to_vec();
                    let cancel = cancel.clone();
                    let semaphore = semaphore.clone();
                    // `tokio::spawn` starts a new top-level task, which does
                    // not inherit the parent task's task-local scope — the
                    // investigation id must be re-entered explicitly here so
                    // every log line this analyzer emits still carries it.
                    let investigation_id = investigation.id.clone();
                    handles.push(tokio::spawn(with_investigation_id(investigation_id, async move {
                        let _permit = semaphore.acquire_owned().await.ok();
                        let finding = match analyzer {
                            Some(a) => run_analyzer(a.as_ref(), &entity, window, &transactions, &cancel).await,
                            None => DomainFinding::failure(domain, "no analyzer registered"),
                        };
                        (domain, finding)
                    })));
                }
                for handle in handles {
                    match handle.await {
                        Ok((domain, finding)) => self.record_finding(investigation, domain, finding),
                        Err(e) => error!(error = %e, "analyzer task panicked"),
                    }
                }
                Ok(())
            }
        }
    }

    async fn run_one(
        &self,
        domain: Domain,
        entity: &Entity,
        window: TimeRange,
        transactions: &[Transaction],
        cancel: &CancellationToken,
    ) -> DomainFinding {
        match self.analyzers.get(&domain) {
            Some(analyzer) => run_analyzer(analyzer.as_ref(), entity, window, transactions, cancel).await,
            None => DomainFinding::failure(domain, "no analyzer registered"),
        }
    }

    fn record_finding(&self, investigation: &mut Investigation, domain: Domain, finding: DomainFinding) {
        let succeeded = finding.risk_score.is_some() || finding.evidence.iter().all(|e| e.evidence_type != "analyzer_failure");
        let kind = if succeeded {
            ToolExecutionKind::AnalyzerCompleted
        } else {
            ToolExecutionKind::AnalyzerFailed
        };
        if !succeeded {
            warn!(domain = %domain, "analyzer reported failure; recorded as evidence, investigation continues");
        }
        investigation.progress.record(
            ToolExecution::new(kind, 0, finding.narrative.clone(), succeeded).for_domain(domain),
        );
        investigation.findings.insert(domain, finding);
    }
}
