//! Gatekeeper Engine
//!
//! Runs every candidate of one question through parse, guard, constraint check
//! and repair, ranks the accepted ones and finalizes them in rank order. The
//! first candidate that finalizes wins; when none does the question gets the
//! fallback statement, which reads no table and returns no rows.

use crate::catalog::SchemaCatalog;
use crate::config::EngineConfig;
use crate::constraints::{ConstraintValidator, Coverage};
use crate::contract::{ColumnSelection, ContractBuilder, SafetyContract};
use crate::error::{GatekeeperError, Result};
use crate::finalizer::{Adjustment, Finalizer};
use crate::guard::Guard;
use crate::plan::Plan;
use crate::repair::{RepairAction, RepairEngine};
use crate::selector::{self, CandidateScore};
use crate::sql::{parse, render, ParsedStatement, Query};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Untrusted SQL from the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub sql: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Self-reported by the generator; never used for ranking.
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl Candidate {
    pub fn new(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            label: None,
            confidence: None,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }
}

/// One question's input. Either a ready contract, or a catalog and plan from
/// which the contract is built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationRequest {
    pub question_id: String,
    pub contract: Option<SafetyContract>,
    pub plan: Option<Plan>,
    pub catalog: Option<SchemaCatalog>,
    pub column_selection: Option<ColumnSelection>,
    pub candidates: Vec<Candidate>,
}

/// Pipeline stage at which a candidate was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Parse,
    Guard,
    Repair,
    Finalize,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRejection {
    pub index: usize,
    pub label: Option<String>,
    pub stage: Stage,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Rejected {
        reason: Stage,
        detail: String,
    },
    Accepted {
        normalized_statement: ParsedStatement,
        repairs_applied: Vec<RepairAction>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateEvaluation {
    pub index: usize,
    pub label: Option<String>,
    pub outcome: ValidationOutcome,
    pub coverage: Coverage,
}

impl CandidateEvaluation {
    fn rejected(index: usize, label: Option<String>, stage: Stage, detail: String) -> Self {
        Self {
            index,
            label,
            outcome: ValidationOutcome::Rejected { reason: stage, detail },
            coverage: Coverage::default(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self.outcome, ValidationOutcome::Accepted { .. })
    }

    fn score(&self) -> Option<CandidateScore> {
        match &self.outcome {
            ValidationOutcome::Accepted {
                normalized_statement,
                repairs_applied,
            } => Some(CandidateScore {
                index: self.index,
                repairs: repairs_applied.len(),
                coverage: self.coverage,
                joins: normalized_statement.branches.iter().map(|b| b.join_count()).sum(),
                predicates: normalized_statement.branches.iter().map(|b| b.predicate_count()).sum(),
            }),
            ValidationOutcome::Rejected { .. } => None,
        }
    }

    fn rejection(&self) -> Option<CandidateRejection> {
        match &self.outcome {
            ValidationOutcome::Rejected { reason, detail } => Some(CandidateRejection {
                index: self.index,
                label: self.label.clone(),
                stage: *reason,
                reason: detail.clone(),
            }),
            ValidationOutcome::Accepted { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EvaluationResult {
    Selected {
        question_id: String,
        candidate_index: usize,
        label: Option<String>,
        sql: String,
        repairs_applied: Vec<RepairAction>,
        adjustments: Vec<Adjustment>,
        optional_applicable: Vec<String>,
        rejections: Vec<CandidateRejection>,
    },
    Fallback {
        question_id: String,
        sql: String,
        rejections: Vec<CandidateRejection>,
    },
}

impl EvaluationResult {
    pub fn sql(&self) -> &str {
        match self {
            EvaluationResult::Selected { sql, .. } | EvaluationResult::Fallback { sql, .. } => sql,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, EvaluationResult::Fallback { .. })
    }

    pub fn rejections(&self) -> &[CandidateRejection] {
        match self {
            EvaluationResult::Selected { rejections, .. } | EvaluationResult::Fallback { rejections, .. } => rejections,
        }
    }
}

/// Everything needed to judge candidates for one question. Built once, shared
/// read-only by every candidate evaluation.
#[derive(Debug)]
pub struct PreparedQuestion {
    question_id: String,
    contract: SafetyContract,
    validator: ConstraintValidator,
    guard: Guard,
    repairer: RepairEngine,
    finalizer: Finalizer,
}

impl PreparedQuestion {
    pub fn new(question_id: &str, contract: SafetyContract, config: &EngineConfig) -> Result<Self> {
        let validator = ConstraintValidator::new(&contract)?;
        Ok(Self {
            question_id: question_id.to_string(),
            contract,
            validator,
            guard: Guard::new(config),
            repairer: RepairEngine::new(config),
            finalizer: Finalizer::new(config),
        })
    }

    pub fn contract(&self) -> &SafetyContract {
        &self.contract
    }

    /// Parse, guard, check and repair one candidate. Never fails; problems
    /// become a rejected outcome.
    pub fn evaluate_candidate(&self, index: usize, candidate: &Candidate) -> CandidateEvaluation {
        let label = candidate.label.clone();

        let parsed = match parse(&candidate.sql) {
            Ok(stmt) => stmt,
            Err(e) => {
                debug!("Candidate {} rejected by parser: {}", index, e);
                return CandidateEvaluation::rejected(index, label, Stage::Parse, e.to_string());
            }
        };

        let canonical = match self.guard.check(&parsed, &self.contract) {
            Ok(stmt) => stmt,
            Err(rejection) => {
                debug!("Candidate {} rejected by guard: {}", index, rejection);
                return CandidateEvaluation::rejected(index, label, Stage::Guard, rejection.to_string());
            }
        };

        let report = self.validator.check_mandatory(&canonical, &self.contract);
        let (statement, repairs) = if report.is_complete() {
            (canonical, Vec::new())
        } else {
            debug!("Candidate {} is missing: {}", index, report.summary());
            match self
                .repairer
                .repair(&canonical, &report.missing, &self.contract, &self.guard, &self.validator)
            {
                Ok(repaired) => (repaired.statement, repaired.actions),
                Err(e) => {
                    warn!("Candidate {} could not be repaired: {}", index, e);
                    return CandidateEvaluation::rejected(index, label, Stage::Repair, e.to_string());
                }
            }
        };

        let coverage = self.validator.coverage(&statement, &self.contract);
        CandidateEvaluation {
            index,
            label,
            outcome: ValidationOutcome::Accepted {
                normalized_statement: statement,
                repairs_applied: repairs,
            },
            coverage,
        }
    }

    /// Rank accepted candidates and finalize them best first.
    pub fn select(&self, evaluations: &[CandidateEvaluation]) -> EvaluationResult {
        let mut rejections: Vec<CandidateRejection> = evaluations.iter().filter_map(|e| e.rejection()).collect();
        let scores: Vec<CandidateScore> = evaluations.iter().filter_map(|e| e.score()).collect();

        for index in selector::rank(&scores) {
            let Some(evaluation) = evaluations.iter().find(|e| e.index == index) else {
                continue;
            };
            let ValidationOutcome::Accepted {
                normalized_statement,
                repairs_applied,
            } = &evaluation.outcome
            else {
                continue;
            };

            match self.finalizer.finalize(normalized_statement, &self.contract, &self.guard) {
                Ok(finalized) => {
                    info!(
                        "Question {}: selected candidate {} ({} repair(s))",
                        self.question_id,
                        index,
                        repairs_applied.len() + finalized.repairs.len()
                    );
                    rejections.sort_by_key(|r| r.index);
                    let mut repairs = repairs_applied.clone();
                    repairs.extend(finalized.repairs);
                    return EvaluationResult::Selected {
                        question_id: self.question_id.clone(),
                        candidate_index: index,
                        label: evaluation.label.clone(),
                        sql: finalized.sql,
                        repairs_applied: repairs,
                        adjustments: finalized.adjustments,
                        optional_applicable: self.validator.optional_applicable().to_vec(),
                        rejections,
                    };
                }
                Err(e) => {
                    warn!("Candidate {} failed finalization: {}", index, e);
                    rejections.push(CandidateRejection {
                        index,
                        label: evaluation.label.clone(),
                        stage: Stage::Finalize,
                        reason: e.to_string(),
                    });
                }
            }
        }

        rejections.sort_by_key(|r| r.index);
        info!(
            "Question {}: no candidate survived ({} rejected), using fallback",
            self.question_id,
            rejections.len()
        );
        EvaluationResult::Fallback {
            question_id: self.question_id.clone(),
            sql: render(&Query::fallback()),
            rejections,
        }
    }
}

/// Gatekeeper engine
pub struct Engine {
    config: Arc<EngineConfig>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolve the request's contract and compile its plan.
    pub fn prepare(&self, request: &EvaluationRequest) -> Result<PreparedQuestion> {
        let contract = match (&request.contract, &request.catalog, &request.plan) {
            (Some(contract), _, _) => contract.clone().normalized(),
            (None, Some(catalog), Some(plan)) => {
                ContractBuilder::new(catalog, &self.config).build(plan, request.column_selection.as_ref())?
            }
            _ => {
                return Err(GatekeeperError::Contract(
                    "request needs either a contract or a catalog and a plan".to_string(),
                ))
            }
        };
        PreparedQuestion::new(&request.question_id, contract, &self.config)
    }

    /// Evaluate candidates one after another.
    pub fn evaluate(&self, request: &EvaluationRequest) -> Result<EvaluationResult> {
        let question = self.prepare(request)?;
        info!(
            "Evaluating {} candidate(s) for question {}",
            request.candidates.len(),
            request.question_id
        );
        let evaluations: Vec<CandidateEvaluation> = request
            .candidates
            .iter()
            .enumerate()
            .map(|(index, candidate)| question.evaluate_candidate(index, candidate))
            .collect();
        Ok(question.select(&evaluations))
    }

    /// Evaluate candidates on blocking workers, at most `max_workers` at a time.
    /// Produces the same result as [`Engine::evaluate`].
    pub async fn evaluate_concurrent(&self, request: EvaluationRequest) -> Result<EvaluationResult> {
        let question = Arc::new(self.prepare(&request)?);
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        info!(
            "Evaluating {} candidate(s) for question {} with {} worker(s)",
            request.candidates.len(),
            request.question_id,
            self.config.max_workers
        );

        let labels: Vec<Option<String>> = request.candidates.iter().map(|c| c.label.clone()).collect();
        let handles: Vec<_> = request
            .candidates
            .into_iter()
            .enumerate()
            .map(|(index, candidate)| {
                let question = Arc::clone(&question);
                let semaphore = Arc::clone(&semaphore);
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.map_err(|e| e.to_string())?;
                    tokio::task::spawn_blocking(move || question.evaluate_candidate(index, &candidate))
                        .await
                        .map_err(|e| e.to_string())
                })
            })
            .collect();

        let mut evaluations = Vec::with_capacity(handles.len());
        for ((index, handle), label) in handles.into_iter().enumerate().zip(labels) {
            let evaluation = match handle.await {
                Ok(Ok(evaluation)) => evaluation,
                Ok(Err(reason)) => CandidateEvaluation::rejected(index, label, Stage::Internal, reason),
                Err(e) => CandidateEvaluation::rejected(index, label, Stage::Internal, e.to_string()),
            };
            evaluations.push(evaluation);
        }
        Ok(question.select(&evaluations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::TaskKind;

    fn request(candidates: &[&str]) -> EvaluationRequest {
        let plan = Plan::new(TaskKind::Count).must_predicate("orders.status = 'paid'");
        EvaluationRequest {
            question_id: "q1".to_string(),
            contract: Some(SafetyContract::new(plan).allow_table("orders", &["id", "status", "amount"])),
            candidates: candidates.iter().map(|s| Candidate::new(s)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_request_without_contract_is_an_error() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let req = EvaluationRequest::default();
        assert!(matches!(engine.evaluate(&req), Err(GatekeeperError::Contract(_))));
    }

    #[test]
    fn test_rejections_carry_stage() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let result = engine
            .evaluate(&request(&["DROP TABLE orders", "SELECT * FROM orders"]))
            .unwrap();
        assert!(result.is_fallback());
        let stages: Vec<Stage> = result.rejections().iter().map(|r| r.stage).collect();
        assert_eq!(stages, vec![Stage::Parse, Stage::Guard]);
    }

    #[test]
    fn test_evaluate_candidate_reports_coverage_and_repairs() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let question = engine.prepare(&request(&[])).unwrap();
        let evaluation = question.evaluate_candidate(0, &Candidate::new("SELECT COUNT(*) AS cnt FROM orders o"));
        match evaluation.outcome {
            ValidationOutcome::Accepted { repairs_applied, .. } => assert_eq!(repairs_applied.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_result_serializes_with_status_tag() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let result = engine.evaluate(&request(&["not sql"])).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "fallback");
        assert_eq!(json["sql"], "SELECT 1 WHERE 1 = 0");
    }
}
