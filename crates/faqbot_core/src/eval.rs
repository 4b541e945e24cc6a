//! Offline evaluation of retrieval + gate against labeled cases, and
//! threshold calibration.

use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::{FaqError, Result};
use crate::gate::RelevanceGate;
use crate::model::Decision;
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalCase {
    pub case_id: String,
    pub question: String,
    pub expected_decision: Decision,
    pub expected_faq_id: Option<String>,
    pub min_similarity: Option<f32>,
}

/// Absent -> `None`, null -> `Some(None)`, `"text"` -> `Some(Some("text"))`.
fn deserialize_optional_nullable_string<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let val: Option<String> = Option::deserialize(deserializer)?;
    Ok(Some(val))
}

/// One line of a cases file. Either `expected_decision` is given, or it is
/// derived from `expected_answer` (null means no confident match).
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvalCase {
    pub case_id: String,
    #[serde(alias = "input_question")]
    pub question: Option<String>,
    pub expected_decision: Option<Decision>,
    pub expected_faq_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_nullable_string")]
    pub expected_answer: Option<Option<String>>,
    pub min_similarity: Option<f32>,
}

impl RawEvalCase {
    pub fn into_eval_case(self) -> Result<EvalCase> {
        let question = self.question.ok_or_else(|| {
            FaqError::Config(format!("case {}: missing 'question'", self.case_id))
        })?;

        let expected_decision = match (self.expected_decision, &self.expected_answer) {
            (Some(decision), _) => decision,
            (None, Some(Some(_))) => Decision::Confident,
            (None, Some(None)) => Decision::NoConfidentMatch,
            (None, None) => {
                return Err(FaqError::Config(format!(
                    "case {}: needs 'expected_decision' or 'expected_answer'",
                    self.case_id
                )))
            }
        };

        Ok(EvalCase {
            case_id: self.case_id,
            question,
            expected_decision,
            expected_faq_id: self.expected_faq_id,
            min_similarity: self.min_similarity,
        })
    }
}

/// Read a cases file: a JSON array, or JSONL with one case per line (blank
/// lines skipped).
pub fn load_cases(path: &Path) -> Result<Vec<EvalCase>> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| FaqError::data_load(path, e.to_string()))?;

    let raw: Vec<RawEvalCase> = if contents.trim_start().starts_with('[') {
        serde_json::from_str(&contents).map_err(|e| FaqError::data_load(path, e.to_string()))?
    } else {
        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(line_no, line)| {
                serde_json::from_str(line)
                    .map_err(|e| FaqError::data_load(path, format!("line {}: {e}", line_no + 1)))
            })
            .collect::<Result<_>>()?
    };

    raw.into_iter().map(RawEvalCase::into_eval_case).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalOutcome {
    pub case_id: String,
    pub passed: bool,
    pub actual_decision: Decision,
    pub actual_faq_id: Option<String>,
    pub actual_answer: Option<String>,
    pub score: f32,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSummary {
    pub threshold: f32,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f32,
    pub outcomes: Vec<EvalOutcome>,
}

impl EvalSummary {
    pub fn meets(&self, required_pass_rate: f32) -> bool {
        self.pass_rate >= required_pass_rate
    }
}

pub struct CaseExpectation;

impl CaseExpectation {
    pub fn matches(
        expected_decision: Decision,
        expected_faq_id: Option<&str>,
        min_similarity: Option<f32>,
        actual_decision: Decision,
        actual_faq_id: Option<&str>,
        score: f32,
    ) -> bool {
        if expected_decision != actual_decision {
            return false;
        }

        if let Some(expected) = expected_faq_id {
            if actual_faq_id != Some(expected) {
                return false;
            }
        }

        if let Some(min_sim) = min_similarity {
            if score < min_sim {
                return false;
            }
        }

        true
    }
}

/// Best candidate for one case, independent of any threshold.
#[derive(Debug, Clone)]
pub struct CaseProbe {
    pub case: EvalCase,
    pub best_id: Option<String>,
    pub best_answer: Option<String>,
    pub score: f32,
    pub latency_ms: f64,
}

/// Run every case through translation, retrieval and reranking, without the
/// responder.
pub async fn probe_cases(pipeline: &Pipeline, cases: &[EvalCase]) -> Result<Vec<CaseProbe>> {
    let mut probes = Vec::with_capacity(cases.len());
    for case in cases {
        let start = Instant::now();
        let (question, _) = pipeline.to_pivot(case.question.trim()).await;
        let ranked = pipeline.search(&question).await?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let best = ranked.into_iter().next();
        probes.push(CaseProbe {
            case: case.clone(),
            score: best.as_ref().map(|b| b.score).unwrap_or(0.0),
            best_id: best.as_ref().map(|b| b.record.id.clone()),
            best_answer: best.map(|b| b.record.answer),
            latency_ms,
        });
    }
    Ok(probes)
}

/// Grade probes against one gate.
pub fn score_probes(probes: &[CaseProbe], gate: &RelevanceGate) -> EvalSummary {
    let outcomes: Vec<EvalOutcome> = probes
        .iter()
        .map(|probe| {
            let confident = probe.best_id.is_some() && gate.is_confident(probe.score);
            let (actual_decision, actual_faq_id, actual_answer) = if confident {
                (
                    Decision::Confident,
                    probe.best_id.clone(),
                    probe.best_answer.clone(),
                )
            } else {
                (Decision::NoConfidentMatch, None, None)
            };
            let passed = CaseExpectation::matches(
                probe.case.expected_decision,
                probe.case.expected_faq_id.as_deref(),
                probe.case.min_similarity,
                actual_decision,
                actual_faq_id.as_deref(),
                probe.score,
            );
            EvalOutcome {
                case_id: probe.case.case_id.clone(),
                passed,
                actual_decision,
                actual_faq_id,
                actual_answer,
                score: probe.score,
                latency_ms: probe.latency_ms,
            }
        })
        .collect();

    let total = outcomes.len();
    let passed = outcomes.iter().filter(|o| o.passed).count();
    let failed = total.saturating_sub(passed);
    let pass_rate = if total == 0 {
        0.0
    } else {
        passed as f32 / total as f32
    };

    EvalSummary {
        threshold: gate.threshold(),
        total,
        passed,
        failed,
        pass_rate,
        outcomes,
    }
}

/// Evaluate cases at the pipeline's own threshold.
pub async fn evaluate_cases(pipeline: &Pipeline, cases: &[EvalCase]) -> Result<EvalSummary> {
    let probes = probe_cases(pipeline, cases).await?;
    Ok(score_probes(&probes, pipeline.gate()))
}

/// Thresholds from `start` to `end` inclusive in `step` increments.
pub fn threshold_grid(start: f32, end: f32, step: f32) -> Vec<f32> {
    if step <= 0.0 || !start.is_finite() || !end.is_finite() || end < start {
        return vec![start];
    }
    let steps = ((end - start) / step + 1e-4).floor() as usize;
    (0..=steps)
        // two decimals keep reported thresholds readable
        .map(|i| ((start + step * i as f32) * 100.0).round() / 100.0)
        .collect()
}

/// Sweep the thresholds and return the best summary. On equal pass rates the
/// lowest threshold wins.
pub fn calibrate_threshold(probes: &[CaseProbe], thresholds: &[f32]) -> Option<EvalSummary> {
    let mut best: Option<EvalSummary> = None;
    for &threshold in thresholds {
        let summary = score_probes(probes, &RelevanceGate::new(threshold));
        tracing::debug!(threshold, pass_rate = summary.pass_rate, "threshold evaluated");
        let better = best
            .as_ref()
            .map(|b| summary.pass_rate > b.pass_rate)
            .unwrap_or(true);
        if better {
            best = Some(summary);
        }
    }
    best
}
