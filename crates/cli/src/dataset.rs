use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use votematch_matcher::{CorrelationMatrix, DataProvider, EventParams, SessionStatistics};
use votematch_model::{
    CandidateDict, CategoryDict, Constituency, ConstituencyDict, MunicipalityDict, PartyDict,
    QuestionDict,
};

/// Everything the matcher loads, in one JSON document. Questions and the
/// correlation matrix are shared by all constituencies; candidates are keyed
/// by constituency id.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub constituencies: ConstituencyDict,
    pub municipalities: MunicipalityDict,
    pub categories: CategoryDict,
    pub questions: QuestionDict,
    pub correlation_matrix: CorrelationMatrix,
    pub parties: PartyDict,
    pub candidates: BTreeMap<String, CandidateDict>,
}

impl Dataset {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read dataset {}", path.display()))?;
        let dataset: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid dataset {}", path.display()))?;
        log::debug!(
            "Dataset {}: {} constituencies, {} municipalities, {} questions",
            path.display(),
            dataset.constituencies.len(),
            dataset.municipalities.len(),
            dataset.questions.len()
        );
        Ok(dataset)
    }
}

/// Serves a [`Dataset`] from memory. Events and statistics go to the log.
pub struct DatasetProvider {
    dataset: Dataset,
}

impl DatasetProvider {
    pub fn new(dataset: Dataset) -> Self {
        Self { dataset }
    }
}

#[async_trait]
impl DataProvider for DatasetProvider {
    async fn constituencies(&self) -> Result<ConstituencyDict> {
        Ok(self.dataset.constituencies.clone())
    }

    async fn municipalities(&self) -> Result<MunicipalityDict> {
        Ok(self.dataset.municipalities.clone())
    }

    async fn municipalities_as_constituencies(&self) -> Result<ConstituencyDict> {
        Ok(self
            .dataset
            .municipalities
            .iter()
            .map(|(id, m)| {
                let constituency = Constituency {
                    id: id.clone(),
                    name: m.name.clone(),
                    total_candidates: None,
                };
                (id.clone(), constituency)
            })
            .collect())
    }

    async fn categories(&self) -> Result<CategoryDict> {
        Ok(self.dataset.categories.clone())
    }

    async fn questions(&self, _constituency_id: &str) -> Result<QuestionDict> {
        Ok(self.dataset.questions.clone())
    }

    async fn correlation_matrix(&self, _constituency_id: &str) -> Result<CorrelationMatrix> {
        Ok(self.dataset.correlation_matrix.clone())
    }

    async fn parties(&self) -> Result<PartyDict> {
        Ok(self.dataset.parties.clone())
    }

    async fn candidates(&self, constituency_id: &str) -> Result<CandidateDict> {
        Ok(self
            .dataset
            .candidates
            .get(constituency_id)
            .cloned()
            .unwrap_or_default())
    }

    fn log_event(&self, name: &str, params: &EventParams) {
        log::debug!("Event {}: {}", name, serde_json::Value::Object(params.clone()));
    }

    async fn save_session_statistics(&self, statistics: &SessionStatistics) -> Result<()> {
        log::info!(
            "Session statistics: {} answers ({})",
            statistics.answers.iter().filter(|a| a.is_some()).count(),
            statistics.locale
        );
        Ok(())
    }
}
