use crate::model::{Decision, RetrievalResult};

/// Threshold decision on the best candidate. The boundary is inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceGate {
    threshold: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GateOutcome<'a> {
    pub decision: Decision,
    pub best: Option<&'a RetrievalResult>,
    pub score: f32,
}

impl RelevanceGate {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn is_confident(&self, score: f32) -> bool {
        score >= self.threshold
    }

    /// `ranked` must be ordered best first, as retrievers and rerankers
    /// return it.
    pub fn assess<'a>(&self, ranked: &'a [RetrievalResult]) -> GateOutcome<'a> {
        match ranked.first() {
            Some(best) if self.is_confident(best.score) => GateOutcome {
                decision: Decision::Confident,
                best: Some(best),
                score: best.score,
            },
            Some(best) => GateOutcome {
                decision: Decision::NoConfidentMatch,
                best: Some(best),
                score: best.score,
            },
            None => GateOutcome {
                decision: Decision::NoConfidentMatch,
                best: None,
                score: 0.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FaqRecord;

    fn result(score: f32) -> RetrievalResult {
        RetrievalResult {
            record: FaqRecord {
                id: "e1".to_string(),
                question: "q".to_string(),
                answer: "answer-e1".to_string(),
            },
            score,
        }
    }

    #[test]
    fn score_at_threshold_is_confident() {
        let gate = RelevanceGate::new(0.55);
        let ranked = vec![result(0.55)];
        assert_eq!(gate.assess(&ranked).decision, Decision::Confident);
    }

    #[test]
    fn score_below_threshold_is_not_confident() {
        let gate = RelevanceGate::new(0.55);
        let ranked = vec![result(0.55 - f32::EPSILON * 4.0)];
        let outcome = gate.assess(&ranked);
        assert_eq!(outcome.decision, Decision::NoConfidentMatch);
        assert_eq!(outcome.best.map(|b| b.record.id.as_str()), Some("e1"));
    }

    #[test]
    fn nothing_retrieved_is_not_confident() {
        let gate = RelevanceGate::new(0.0);
        let outcome = gate.assess(&[]);
        assert_eq!(outcome.decision, Decision::NoConfidentMatch);
        assert!(outcome.best.is_none());
        assert_eq!(outcome.score, 0.0);
    }
}
