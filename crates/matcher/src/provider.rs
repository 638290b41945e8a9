use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use votematch_model::{
    Answer, CandidateDict, CategoryDict, ConstituencyDict, MunicipalityDict, PartyDict,
    QuestionDict,
};

/// Pairwise question correlations, keyed by question id on both axes.
pub type CorrelationMatrix = BTreeMap<String, BTreeMap<String, f64>>;

/// Free-form analytics parameters.
pub type EventParams = serde_json::Map<String, serde_json::Value>;

/// One-off anonymous summary of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatistics {
    /// Voter answers of all answerable questions in display order; `None`
    /// for unanswered ones.
    pub answers: Vec<Option<Answer>>,
    pub locale: String,
}

/// Source of election data and sink for analytics. Maps are keyed by
/// entity id; the matcher copies the key onto each entity after loading.
#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn constituencies(&self) -> anyhow::Result<ConstituencyDict>;

    async fn municipalities(&self) -> anyhow::Result<MunicipalityDict>;

    /// Municipalities, each standing as its own constituency.
    async fn municipalities_as_constituencies(&self) -> anyhow::Result<ConstituencyDict>;

    async fn categories(&self) -> anyhow::Result<CategoryDict>;

    async fn questions(&self, constituency_id: &str) -> anyhow::Result<QuestionDict>;

    async fn correlation_matrix(&self, constituency_id: &str) -> anyhow::Result<CorrelationMatrix>;

    async fn parties(&self) -> anyhow::Result<PartyDict>;

    async fn candidates(&self, constituency_id: &str) -> anyhow::Result<CandidateDict>;

    /// Fire-and-forget.
    fn log_event(&self, name: &str, params: &EventParams);

    async fn save_session_statistics(&self, statistics: &SessionStatistics) -> anyhow::Result<()>;
}

/// Drop rows and columns for questions not in `questions`.
pub fn reconcile_correlation_matrix(
    matrix: &mut CorrelationMatrix,
    questions: &QuestionDict,
) -> usize {
    let before = matrix.len();
    matrix.retain(|id, _| questions.contains_key(id));
    for row in matrix.values_mut() {
        row.retain(|id, _| questions.contains_key(id));
    }
    before - matrix.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use votematch_model::{NumericScale, Question};

    #[test]
    fn reconcile_removes_rows_and_cross_references() {
        let questions: QuestionDict = ["q1", "q2"]
            .into_iter()
            .map(|id| (id.to_string(), Question::numeric(id, NumericScale::default())))
            .collect();
        let row = |pairs: &[(&str, f64)]| -> BTreeMap<String, f64> {
            pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
        };
        let mut matrix = CorrelationMatrix::new();
        matrix.insert("q1".into(), row(&[("q2", 0.4), ("dropped", 0.9)]));
        matrix.insert("q2".into(), row(&[("q1", 0.4), ("dropped", 0.1)]));
        matrix.insert("dropped".into(), row(&[("q1", 0.9), ("q2", 0.1)]));

        assert_eq!(reconcile_correlation_matrix(&mut matrix, &questions), 1);
        assert_eq!(matrix.len(), 2);
        assert!(matrix.values().all(|row| !row.contains_key("dropped")));
        assert_eq!(matrix["q1"]["q2"], 0.4);
    }
}
