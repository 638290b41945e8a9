use crate::config::MatcherConfig;
use crate::error::{MatcherError, Result};
use crate::provider::{
    reconcile_correlation_matrix, CorrelationMatrix, DataProvider, EventParams, SessionStatistics,
};
use crate::registry::{MethodProperties, ProjectorRegistry};
use crate::status::{DataStatus, DataStream, Reaction, StatusBoard, StatusChange};
use crate::storage::{KeyValueStore, KEY_FAVOURITES, KEY_MUNICIPALITY, KEY_STATISTICS_SAVED};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use votematch_filter::{CandidateFilter, Filter};
use votematch_model::{
    AgreementType, Answer, AnswerSource, Candidate, CandidateDict, CategoryDict,
    ConstituencyDict, Municipality, MunicipalityDict, Party, PartyDict, Question, QuestionDict,
    QuestionKind,
};
use votematch_projection::{
    Coordinates, DataProjector, ProgressReporter, ProjectedMapping, ProjectionInput,
    ProjectionOptions,
};

const PROGRESS_CHANNEL_CAPACITY: usize = 128;
const EVENT_PAGE: &str = "_matcher";

/// Filter targeted by the party shortcuts.
pub const PARTY_FILTER: &str = "party";
/// Filter targeted by the agreement shortcuts.
pub const QUESTION_FILTER: &str = "question";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Selection {
    municipality_id: Option<String>,
    municipality: Option<String>,
    constituency_id: String,
    constituency: String,
}

/// Snapshot of what the voter has selected, for feedback reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatcherState {
    pub municipality: Option<String>,
    pub municipality_id: Option<String>,
    pub constituency: Option<String>,
    pub constituency_id: Option<String>,
    pub active_filters: Vec<String>,
}

/// Outcome of a projection run. Coordinates are index-aligned with
/// `candidate_ids` and already normalised.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingResult {
    pub method: String,
    pub candidate_ids: Vec<String>,
    pub coordinates: ProjectedMapping,
    pub voter: Option<Coordinates>,
}

struct LoadedConstituency {
    categories: CategoryDict,
    questions: QuestionDict,
    correlation_matrix: Option<CorrelationMatrix>,
    parties: PartyDict,
    candidates: CandidateDict,
}

/// Owns the current constituency's questions, candidates, filters and
/// mapping, and tracks the readiness of each.
///
/// All state changes happen inside `&mut self` calls. Status publications
/// cascade through [`crate::status::CASCADE`] before the call returns, so a
/// subscriber never sees a half-applied transition.
pub struct Matcher {
    config: MatcherConfig,
    provider: Arc<dyn DataProvider>,
    store: Box<dyn KeyValueStore>,
    registry: ProjectorRegistry,
    status: StatusBoard,
    progress_tx: broadcast::Sender<u8>,

    municipalities: MunicipalityDict,
    constituencies: ConstituencyDict,
    categories: CategoryDict,
    questions: QuestionDict,
    correlation_matrix: Option<CorrelationMatrix>,
    parties: PartyDict,
    candidates: CandidateDict,
    favourites: Vec<String>,
    filters: Vec<Filter>,
    selection: Option<Selection>,

    projector: Option<Box<dyn DataProjector>>,
    voter_disabled: bool,
    statistics_saved: bool,
}

impl Matcher {
    #[must_use]
    pub fn new(
        config: MatcherConfig,
        provider: Arc<dyn DataProvider>,
        store: Box<dyn KeyValueStore>,
    ) -> Self {
        Self::with_registry(config, provider, store, ProjectorRegistry::default())
    }

    #[must_use]
    pub fn with_registry(
        config: MatcherConfig,
        provider: Arc<dyn DataProvider>,
        store: Box<dyn KeyValueStore>,
        registry: ProjectorRegistry,
    ) -> Self {
        let (progress_tx, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Self {
            config,
            provider,
            store,
            registry,
            status: StatusBoard::new(),
            progress_tx,
            municipalities: MunicipalityDict::new(),
            constituencies: ConstituencyDict::new(),
            categories: CategoryDict::new(),
            questions: QuestionDict::new(),
            correlation_matrix: None,
            parties: PartyDict::new(),
            candidates: CandidateDict::new(),
            favourites: Vec::new(),
            filters: Vec::new(),
            selection: None,
            projector: None,
            voter_disabled: false,
            statistics_saved: false,
        }
    }

    // ------------------------------------------------------------------
    // Readiness
    // ------------------------------------------------------------------

    #[must_use]
    pub fn status(&self, stream: DataStream) -> DataStatus {
        self.status.get(stream)
    }

    #[must_use]
    pub fn statuses(&self) -> BTreeMap<DataStream, DataStatus> {
        self.status.snapshot()
    }

    #[must_use]
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusChange> {
        self.status.subscribe()
    }

    /// Projection progress percentages.
    #[must_use]
    pub fn subscribe_progress(&self) -> broadcast::Receiver<u8> {
        self.progress_tx.subscribe()
    }

    /// Single dispatch point for status changes and their cascades.
    fn publish(&mut self, stream: DataStream, status: DataStatus) -> Result<()> {
        for reaction in self.status.set(stream, status) {
            match reaction {
                Reaction::Publish(stream, status) => self.publish(stream, status)?,
                Reaction::RestoreFavourites => self.restore_favourites()?,
                Reaction::RebuildFilters => self.rebuild_filters(),
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Load municipalities and constituencies, then restore the stored
    /// municipality selection, if any.
    pub async fn init(&mut self) -> Result<()> {
        if self.config.use_municipality_as_constituency {
            let mut constituencies = self
                .provider
                .municipalities_as_constituencies()
                .await
                .map_err(MatcherError::DataProvider)?;
            for (id, constituency) in &mut constituencies {
                constituency.id = id.clone();
            }
            self.municipalities = constituencies
                .values()
                .map(|c| {
                    let municipality = Municipality {
                        id: c.id.clone(),
                        name: c.name.clone(),
                        constituency_id: c.id.clone(),
                    };
                    (c.id.clone(), municipality)
                })
                .collect();
            self.constituencies = constituencies;
        } else {
            let mut municipalities = self
                .provider
                .municipalities()
                .await
                .map_err(MatcherError::DataProvider)?;
            for (id, municipality) in &mut municipalities {
                municipality.id = id.clone();
            }
            let mut constituencies = self
                .provider
                .constituencies()
                .await
                .map_err(MatcherError::DataProvider)?;
            for (id, constituency) in &mut constituencies {
                constituency.id = id.clone();
            }
            self.municipalities = municipalities;
            self.constituencies = constituencies;
        }
        log::info!(
            "Loaded {} municipalities and {} constituencies",
            self.municipalities.len(),
            self.constituencies.len()
        );
        self.publish(DataStream::Constituencies, DataStatus::Ready)?;

        self.statistics_saved =
            self.read_key(KEY_STATISTICS_SAVED)?.as_deref() == Some("1");

        if let Some(id) = self.read_key(KEY_MUNICIPALITY)? {
            log::debug!("Restoring municipality '{}'", id);
            self.set_municipality(&id).await?;
        }
        Ok(())
    }

    /// Select a municipality and load its constituency. Re-selecting the
    /// current municipality is a no-op.
    pub async fn set_municipality(&mut self, id: &str) -> Result<()> {
        let municipality = self
            .municipalities
            .get(id)
            .ok_or_else(|| MatcherError::NotFound(format!("municipality '{id}'")))?;
        let constituency = self
            .constituencies
            .get(&municipality.constituency_id)
            .ok_or_else(|| {
                MatcherError::NotFound(format!(
                    "constituency '{}'",
                    municipality.constituency_id
                ))
            })?;
        let selection = Selection {
            municipality_id: Some(municipality.id.clone()),
            municipality: Some(municipality.name.clone()),
            constituency_id: constituency.id.clone(),
            constituency: constituency.name.clone(),
        };

        if self.municipality_id() == Some(id) && self.status(DataStream::Questions).is_ready() {
            return Ok(());
        }

        self.load_constituency(selection).await?;
        self.write_key(KEY_MUNICIPALITY, id)
    }

    /// Select a constituency directly, without a municipality.
    pub async fn select_constituency(&mut self, id: &str) -> Result<()> {
        let constituency = self
            .constituencies
            .get(id)
            .ok_or_else(|| MatcherError::NotFound(format!("constituency '{id}'")))?;
        let selection = Selection {
            municipality_id: None,
            municipality: None,
            constituency_id: constituency.id.clone(),
            constituency: constituency.name.clone(),
        };
        self.load_constituency(selection).await
    }

    async fn load_constituency(&mut self, selection: Selection) -> Result<()> {
        for stream in [
            DataStream::Questions,
            DataStream::Candidates,
            DataStream::Mapping,
            DataStream::Filters,
        ] {
            self.publish(stream, DataStatus::NotReady)?;
        }

        let loaded = self.fetch_constituency(&selection.constituency_id).await?;
        self.commit_constituency(selection, loaded)
    }

    async fn fetch_constituency(&self, id: &str) -> Result<LoadedConstituency> {
        let provider = Arc::clone(&self.provider);

        let categories = if self.config.use_question_categories {
            let mut categories = provider.categories().await.map_err(MatcherError::DataProvider)?;
            for (key, category) in &mut categories {
                category.id = key.clone();
            }
            categories
        } else {
            CategoryDict::new()
        };

        let mut questions = provider.questions(id).await.map_err(MatcherError::DataProvider)?;
        for (key, question) in &mut questions {
            question.id = key.clone();
        }

        let correlation_matrix = if self.config.use_correlation_matrices {
            let mut matrix = provider
                .correlation_matrix(id)
                .await
                .map_err(MatcherError::DataProvider)?;
            let dropped = reconcile_correlation_matrix(&mut matrix, &questions);
            if dropped > 0 {
                log::debug!("Dropped {} correlation rows without a question", dropped);
            }
            Some(matrix)
        } else {
            None
        };

        let mut parties = provider.parties().await.map_err(MatcherError::DataProvider)?;
        for (key, party) in &mut parties {
            party.id = key.clone();
        }

        let mut candidates = provider.candidates(id).await.map_err(MatcherError::DataProvider)?;
        for (key, candidate) in &mut candidates {
            candidate.id = key.clone();
        }

        Ok(LoadedConstituency {
            categories,
            questions,
            correlation_matrix,
            parties,
            candidates,
        })
    }

    fn commit_constituency(&mut self, selection: Selection, loaded: LoadedConstituency) -> Result<()> {
        let LoadedConstituency {
            categories,
            mut questions,
            correlation_matrix,
            mut parties,
            mut candidates,
        } = loaded;

        let restored = self.restore_voter_answers(&mut questions)?;

        {
            let present: BTreeSet<&str> =
                candidates.values().map(|c| c.party_id.as_str()).collect();
            parties.retain(|id, _| present.contains(id.as_str()));
        }

        let (culled, flagged) = cull_candidates(&self.config, &questions, &mut candidates);

        log::info!(
            "Loaded constituency '{}': {} questions ({} answers restored), {} candidates ({} culled, {} flagged), {} parties",
            selection.constituency,
            questions.len(),
            restored,
            candidates.len(),
            culled,
            flagged,
            parties.len()
        );

        if let Some(previous) = self.projector.as_mut() {
            previous.cancel();
        }
        self.projector = None;
        self.categories = categories;
        self.questions = questions;
        self.correlation_matrix = correlation_matrix;
        self.parties = parties;
        self.candidates = candidates;
        self.selection = Some(selection);

        self.publish(DataStream::Questions, DataStatus::Ready)?;
        if restored > 0 {
            self.publish(DataStream::Questions, DataStatus::Updated)?;
        }
        self.publish(DataStream::Candidates, DataStatus::Ready)
    }

    fn restore_voter_answers(&self, questions: &mut QuestionDict) -> Result<usize> {
        let mut restored = 0;
        for question in questions.values_mut().filter(|q| q.is_answerable()) {
            let Some(raw) = self.read_key(&question.id)? else {
                continue;
            };
            match question.parse_answer(&raw) {
                Ok(answer) => {
                    question.set_voter_answer(answer)?;
                    if question.voter_answer().is_some() {
                        restored += 1;
                    }
                }
                Err(err) => log::warn!("Ignoring stored answer: {}", err),
            }
        }
        Ok(restored)
    }

    /// Forget every voter answer and the loaded constituency.
    pub fn unset_voter_answers(&mut self) -> Result<()> {
        self.delete_all_matcher_keys()?;
        for question in self.questions.values_mut() {
            question.unset_voter_answer();
        }
        self.questions.clear();
        self.candidates.clear();
        self.parties.clear();
        for filter in &mut self.filters {
            if filter.is_active() {
                filter.clear_rules();
            }
        }
        self.correlation_matrix = None;
        self.favourites.clear();
        self.selection = None;
        self.publish(DataStream::Questions, DataStatus::NotReady)?;
        self.publish(DataStream::Candidates, DataStatus::NotReady)?;
        self.log_event("unset_voter_answers", EventParams::new());
        Ok(())
    }

    /// Remove the answer, favourites and municipality keys. The statistics
    /// flag is kept.
    pub fn delete_all_matcher_keys(&mut self) -> Result<()> {
        let mut keys: Vec<String> = self
            .answerable_questions(false)
            .into_iter()
            .map(|q| q.id.clone())
            .collect();
        keys.push(KEY_FAVOURITES.to_string());
        keys.push(KEY_MUNICIPALITY.to_string());
        for key in keys {
            self.store.delete(&key).map_err(MatcherError::Storage)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Constituencies and municipalities
    // ------------------------------------------------------------------

    #[must_use]
    pub fn municipalities(&self) -> &MunicipalityDict {
        &self.municipalities
    }

    /// Municipalities ordered by name.
    #[must_use]
    pub fn municipalities_sorted(&self) -> Vec<&Municipality> {
        let mut list: Vec<_> = self.municipalities.values().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        list
    }

    #[must_use]
    pub fn constituencies(&self) -> &ConstituencyDict {
        &self.constituencies
    }

    pub fn constituency_name(&self, id: &str) -> Result<&str> {
        self.constituencies
            .get(id)
            .map(|c| c.name.as_str())
            .ok_or_else(|| MatcherError::NotFound(format!("constituency '{id}'")))
    }

    pub fn constituency_name_by_municipality(&self, id: &str) -> Result<&str> {
        let municipality = self
            .municipalities
            .get(id)
            .ok_or_else(|| MatcherError::NotFound(format!("municipality '{id}'")))?;
        self.constituency_name(&municipality.constituency_id)
    }

    #[must_use]
    pub fn municipality(&self) -> Option<&str> {
        self.selection.as_ref()?.municipality.as_deref()
    }

    #[must_use]
    pub fn municipality_id(&self) -> Option<&str> {
        self.selection.as_ref()?.municipality_id.as_deref()
    }

    #[must_use]
    pub fn constituency(&self) -> Option<&str> {
        self.selection.as_ref().map(|s| s.constituency.as_str())
    }

    #[must_use]
    pub fn constituency_id(&self) -> Option<&str> {
        self.selection.as_ref().map(|s| s.constituency_id.as_str())
    }

    /// Everyone standing in the selected constituency.
    #[must_use]
    pub fn total_candidates(&self) -> Option<usize> {
        let id = self.constituency_id()?;
        self.constituencies.get(id)?.total_candidates
    }

    /// Candidates that answered and survived culling.
    #[must_use]
    pub fn total_participating_candidates(&self) -> Option<usize> {
        self.selection.as_ref().map(|_| self.candidates.len())
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn has_low_participation(&self) -> Option<bool> {
        let total = self.total_candidates()?;
        let participating = self.total_participating_candidates()?;
        let fraction = if total == 0 {
            0.0
        } else {
            participating as f64 / total as f64
        };
        Some(
            fraction < self.config.min_participation_fraction
                || participating < self.config.min_participation_number,
        )
    }

    // ------------------------------------------------------------------
    // Questions
    // ------------------------------------------------------------------

    #[must_use]
    pub fn questions(&self) -> &QuestionDict {
        &self.questions
    }

    pub fn question(&self, id: &str) -> Result<&Question> {
        self.questions
            .get(id)
            .ok_or_else(|| MatcherError::NotFound(format!("question '{id}'")))
    }

    pub fn questions_by_ids(&self, ids: &[&str]) -> Result<Vec<&Question>> {
        if self.selection.is_none() {
            return Err(MatcherError::InvalidState(
                "a constituency must be selected before getting questions".to_string(),
            ));
        }
        ids.iter().map(|id| self.question(id)).collect()
    }

    /// Questions the voter can answer, optionally in display order.
    #[must_use]
    pub fn answerable_questions(&self, sort: bool) -> Vec<&Question> {
        let mut questions: Vec<_> = self
            .questions
            .values()
            .filter(|q| q.is_answerable())
            .collect();
        if sort {
            questions.sort_by(|a, b| self.compare_questions(a, b));
        }
        questions
    }

    /// Category order (when categories are enabled), then question order.
    #[must_use]
    pub fn compare_questions(&self, a: &Question, b: &Question) -> Ordering {
        let category_order = |q: &Question| {
            q.category
                .as_ref()
                .and_then(|id| self.categories.get(id))
                .map_or(0, |c| c.order)
        };
        let by_category = if self.config.use_question_categories {
            category_order(a).cmp(&category_order(b))
        } else {
            Ordering::Equal
        };
        by_category
            .then(a.order.cmp(&b.order))
            .then_with(|| a.id.cmp(&b.id))
    }

    #[must_use]
    pub fn categories(&self) -> &CategoryDict {
        &self.categories
    }

    #[must_use]
    pub fn correlation_matrix(&self) -> Option<&CorrelationMatrix> {
        self.correlation_matrix.as_ref()
    }

    // ------------------------------------------------------------------
    // Voter answers
    // ------------------------------------------------------------------

    pub fn set_voter_answer(&mut self, question_id: &str, answer: Answer) -> Result<()> {
        let question = self
            .questions
            .get_mut(question_id)
            .ok_or_else(|| MatcherError::NotFound(format!("question '{question_id}'")))?;
        validate_answer(question, &answer)?;
        question.set_voter_answer(answer)?;
        question.set_skipped_by_voter(false)?;
        let serialized = question.voter_answer().map(Question::answer_to_string);
        match serialized {
            Some(serialized) => self.write_key(question_id, &serialized)?,
            None => self
                .store
                .delete(question_id)
                .map_err(MatcherError::Storage)?,
        }
        self.publish(DataStream::Questions, DataStatus::Updated)
    }

    /// Skipping a question also deletes its answer.
    pub fn set_skipped_by_voter(&mut self, question_id: &str, skipped: bool) -> Result<()> {
        let question = self
            .questions
            .get_mut(question_id)
            .ok_or_else(|| MatcherError::NotFound(format!("question '{question_id}'")))?;
        question.set_skipped_by_voter(skipped)?;
        if skipped {
            self.delete_voter_answer(question_id)
        } else {
            self.publish(DataStream::Questions, DataStatus::Updated)
        }
    }

    pub fn delete_voter_answer(&mut self, question_id: &str) -> Result<()> {
        let question = self
            .questions
            .get_mut(question_id)
            .ok_or_else(|| MatcherError::NotFound(format!("question '{question_id}'")))?;
        if !question.is_answerable() {
            return Err(MatcherError::InvalidState(format!(
                "question '{question_id}' does not take voter answers"
            )));
        }
        question.unset_voter_answer();
        self.store
            .delete(question_id)
            .map_err(MatcherError::Storage)?;
        self.publish(DataStream::Questions, DataStatus::Updated)
    }

    #[must_use]
    pub fn count_voter_answers(&self) -> usize {
        self.voter_answered_questions(false).len()
    }

    #[must_use]
    pub fn voter_answered_questions(&self, include_skipped: bool) -> Vec<&Question> {
        self.questions
            .values()
            .filter(|q| {
                q.is_answerable()
                    && (q.voter_answer().is_some() || (include_skipped && q.skipped_by_voter()))
            })
            .collect()
    }

    #[must_use]
    pub fn voter_answers(&self) -> BTreeMap<String, Answer> {
        self.questions
            .values()
            .filter_map(|q| Some((q.id.clone(), q.voter_answer()?.clone())))
            .collect()
    }

    #[must_use]
    pub fn has_enough_answers_for_mapping(&self) -> bool {
        self.count_voter_answers() >= self.config.min_vals_for_mapping
    }

    /// True when the voter was excluded from mapping or has no answers.
    #[must_use]
    pub fn voter_disabled(&self) -> bool {
        self.voter_disabled || self.count_voter_answers() == 0
    }

    pub fn set_voter_disabled(&mut self, disabled: bool) -> Result<()> {
        if self.voter_disabled() != disabled {
            self.voter_disabled = disabled;
            self.publish(DataStream::Mapping, DataStatus::NotReady)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Candidates and parties
    // ------------------------------------------------------------------

    #[must_use]
    pub fn candidates(&self) -> &CandidateDict {
        &self.candidates
    }

    pub fn candidate(&self, id: &str) -> Result<&Candidate> {
        self.candidates
            .get(id)
            .ok_or_else(|| MatcherError::NotFound(format!("candidate '{id}'")))
    }

    #[must_use]
    pub fn parties(&self) -> &PartyDict {
        &self.parties
    }

    pub fn party(&self, id: &str) -> Result<&Party> {
        self.parties
            .get(id)
            .ok_or_else(|| MatcherError::NotFound(format!("party '{id}'")))
    }

    /// Questions where the candidate agrees with the voter: exactly, or
    /// within one step when `approximate` (then ordered by distance).
    pub fn agreed_questions(&self, candidate_id: &str, approximate: bool) -> Result<Vec<&Question>> {
        let candidate = self.candidate(candidate_id)?;
        let kind = if approximate {
            AgreementType::MostlyAgree
        } else {
            AgreementType::Agree
        };
        let mut questions = self.questions_matching(candidate, kind)?;
        if approximate {
            self.sort_by_distance(candidate, &mut questions)?;
        }
        Ok(questions)
    }

    /// Questions where the candidate disagrees, largest distance first.
    pub fn disagreed_questions(
        &self,
        candidate_id: &str,
        approximate: bool,
    ) -> Result<Vec<&Question>> {
        let candidate = self.candidate(candidate_id)?;
        let kind = if approximate {
            AgreementType::StronglyDisagree
        } else {
            AgreementType::Disagree
        };
        let mut questions = self.questions_matching(candidate, kind)?;
        self.sort_by_distance(candidate, &mut questions)?;
        Ok(questions)
    }

    /// Agreement-capable questions the voter has not answered.
    #[must_use]
    pub fn unanswered_questions(&self) -> Vec<&Question> {
        self.answerable_questions(false)
            .into_iter()
            .filter(|q| q.is_numeric() && q.voter_answer().is_none())
            .collect()
    }

    fn questions_matching(&self, candidate: &Candidate, kind: AgreementType) -> Result<Vec<&Question>> {
        let mut matching = Vec::new();
        for question in self.answerable_questions(false) {
            if !question.is_numeric() {
                continue;
            }
            if question.matches_agreement_type(question.voter_answer(), candidate.answer(question), kind)? {
                matching.push(question);
            }
        }
        Ok(matching)
    }

    fn sort_by_distance(&self, candidate: &Candidate, questions: &mut Vec<&Question>) -> Result<()> {
        let mut keyed = Vec::with_capacity(questions.len());
        for question in questions.iter().copied() {
            let distance = question.distance(question.voter_answer(), candidate.answer(question))?;
            keyed.push((distance, question));
        }
        keyed.sort_by(|(da, a), (db, b)| {
            db.partial_cmp(da)
                .unwrap_or(Ordering::Equal)
                .then_with(|| self.compare_questions(a, b))
        });
        *questions = keyed.into_iter().map(|(_, q)| q).collect();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Favourites
    // ------------------------------------------------------------------

    #[must_use]
    pub fn favourites(&self) -> &[String] {
        &self.favourites
    }

    /// Favourites present in the current constituency.
    #[must_use]
    pub fn favourite_candidates(&self) -> Vec<&Candidate> {
        self.favourites
            .iter()
            .filter_map(|id| self.candidates.get(id))
            .collect()
    }

    pub fn add_favourite(&mut self, candidate_id: &str) -> Result<()> {
        if self.favourites.iter().any(|id| id == candidate_id) {
            return Ok(());
        }
        self.favourites.push(candidate_id.to_string());
        self.favourites_changed("favourites_add")
    }

    pub fn remove_favourite(&mut self, candidate_id: &str) -> Result<()> {
        let before = self.favourites.len();
        self.favourites.retain(|id| id != candidate_id);
        if self.favourites.len() == before {
            return Ok(());
        }
        self.favourites_changed("favourites_remove")
    }

    pub fn clear_favourites(&mut self) -> Result<()> {
        if self.favourites.is_empty() {
            return Ok(());
        }
        self.favourites.clear();
        self.favourites_changed("favourites_clear")
    }

    fn favourites_changed(&mut self, event: &str) -> Result<()> {
        self.publish(DataStream::Favourites, DataStatus::Updated)?;
        self.save_favourites()?;
        self.log_event(event, EventParams::new());
        Ok(())
    }

    fn save_favourites(&mut self) -> Result<()> {
        if self.favourites.is_empty() {
            self.store.delete(KEY_FAVOURITES)
        } else {
            self.store.write_list(KEY_FAVOURITES, &self.favourites)
        }
        .map_err(MatcherError::Storage)
    }

    fn restore_favourites(&mut self) -> Result<()> {
        let stored = self
            .store
            .read_list(KEY_FAVOURITES)
            .map_err(MatcherError::Storage)?;
        if let Some(favourites) = stored.filter(|list| !list.is_empty()) {
            self.favourites = favourites;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Filters
    // ------------------------------------------------------------------

    fn rebuild_filters(&mut self) {
        for candidate in self.candidates.values_mut() {
            candidate.reset_filter_state();
        }
        let mut filters = Vec::with_capacity(self.config.filters.len());
        for spec in &self.config.filters {
            let mut filter = spec.build();
            match &mut filter {
                Filter::Agreement(agreement) => {
                    agreement.set_value_getter(Box::new(voter_answered_numeric_ids));
                }
                Filter::Exact(exact) => exact.scan(&self.candidates),
                Filter::Range(range) => range.scan(&self.candidates),
            }
            filters.push(filter);
        }
        log::debug!("Built {} filters", filters.len());
        self.filters = filters;
    }

    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn filter(&self, name: &str) -> Result<&Filter> {
        self.ensure_filters_ready()?;
        self.filters
            .iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| MatcherError::NotFound(format!("filter '{name}'")))
    }

    #[must_use]
    pub fn active_filter_names(&self) -> Vec<String> {
        self.filters
            .iter()
            .filter(|f| f.is_active())
            .map(|f| f.name().to_string())
            .collect()
    }

    #[must_use]
    pub fn has_active_filters(&self) -> bool {
        self.filters.iter().any(CandidateFilter::is_active)
    }

    /// Re-evaluate one filter over all candidates. Returns the number it
    /// excluded.
    pub fn apply_filter(&mut self, name: &str) -> Result<usize> {
        self.ensure_filters_ready()?;
        let filter = self
            .filters
            .iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| MatcherError::NotFound(format!("filter '{name}'")))?;
        let excluded = filter.apply(&mut self.candidates, &self.questions);
        self.publish(DataStream::Filters, DataStatus::Updated)?;
        Ok(excluded)
    }

    /// Change a filter's rules, then re-apply it.
    pub fn update_filter<R>(
        &mut self,
        name: &str,
        update: impl FnOnce(&mut Filter) -> votematch_filter::Result<R>,
    ) -> Result<R> {
        self.ensure_filters_ready()?;
        let filter = self
            .filters
            .iter_mut()
            .find(|f| f.name() == name)
            .ok_or_else(|| MatcherError::NotFound(format!("filter '{name}'")))?;
        let result = update(filter)?;
        self.apply_filter(name)?;
        Ok(result)
    }

    /// Require (or exclude) a party, or clear the party filter with `None`.
    pub fn set_party_filter(&mut self, party: Option<&str>, exclude: bool) -> Result<()> {
        self.update_filter(PARTY_FILTER, |filter| {
            let parties = filter.exact_mut()?;
            match party {
                Some(party) if exclude => parties.exclude(party.into()),
                Some(party) => parties.require(party.into()),
                None => parties.clear_rules(),
            }
            Ok(())
        })
    }

    pub fn has_party_filter(&self) -> Result<bool> {
        Ok(self.filter(PARTY_FILTER)?.is_active())
    }

    /// With `only` set, true only if `party` is the single required party.
    pub fn party_is_required(&self, party: &str, only: bool) -> Result<bool> {
        let filter = self.filter(PARTY_FILTER)?;
        if !filter.is_active() {
            return Ok(false);
        }
        let parties = filter.exact()?;
        let required = parties.is_required(&party.into());
        Ok(if only {
            required && parties.required().len() == 1
        } else {
            required
        })
    }

    pub fn party_is_excluded(&self, party: &str) -> Result<bool> {
        Ok(self.filter(PARTY_FILTER)?.exact()?.is_excluded(&party.into()))
    }

    pub fn require_agreement(&mut self, kind: AgreementType, question_id: &str) -> Result<()> {
        self.ensure_agreement_capable(question_id)?;
        let question_id = question_id.to_string();
        self.update_filter(QUESTION_FILTER, |filter| {
            filter.agreement_mut()?.require(kind, question_id);
            Ok(())
        })
    }

    pub fn dont_require_agreement(&mut self, kind: AgreementType, question_id: &str) -> Result<()> {
        self.update_filter(QUESTION_FILTER, |filter| {
            filter.agreement_mut()?.dont_require(kind, question_id);
            Ok(())
        })
    }

    pub fn require_mostly_agree(&mut self, question_id: &str) -> Result<()> {
        self.require_agreement(AgreementType::MostlyAgree, question_id)
    }

    pub fn dont_require_mostly_agree(&mut self, question_id: &str) -> Result<()> {
        self.dont_require_agreement(AgreementType::MostlyAgree, question_id)
    }

    pub fn is_required_mostly_agree(&self, question_id: &str) -> Result<bool> {
        Ok(self
            .filter(QUESTION_FILTER)?
            .agreement()?
            .is_required_mostly_agree(question_id))
    }

    fn ensure_filters_ready(&self) -> Result<()> {
        if self.status(DataStream::Filters).is_ready() {
            Ok(())
        } else {
            Err(MatcherError::InvalidState(
                "filters are built once candidates are loaded".to_string(),
            ))
        }
    }

    fn ensure_agreement_capable(&self, question_id: &str) -> Result<()> {
        if self.question(question_id)?.is_numeric() {
            Ok(())
        } else {
            Err(MatcherError::InvalidState(format!(
                "question '{question_id}' does not support agreement"
            )))
        }
    }

    // ------------------------------------------------------------------
    // Mapping
    // ------------------------------------------------------------------

    /// Questions projected with `method`: every answerable question when
    /// the voter is disabled or the method asks for all, otherwise only the
    /// answered ones.
    pub fn mapping_questions(&self, method: &str) -> Result<Vec<&Question>> {
        let properties = self.registry.properties(method)?;
        Ok(if self.voter_disabled() || properties.use_all {
            self.answerable_questions(false)
        } else {
            self.voter_answered_questions(false)
        })
    }

    /// Normalised projection row for a candidate or party. Missing answers
    /// are imputed: neutral without a voter answer, otherwise the inverse
    /// of the voter's answer.
    pub fn mapping_data<S: AnswerSource + ?Sized>(
        &self,
        source: &S,
        questions: &[&Question],
    ) -> Result<Vec<f64>> {
        let voter_disabled = self.voter_disabled();
        let mut datum = Vec::new();
        for question in questions {
            let answer = source
                .answer(question)
                .filter(|&answer| !question.is_missing(Some(answer)));
            let values = match answer {
                Some(answer) => question.normalize_answer(answer)?,
                None => impute(question, voter_disabled)?,
            };
            datum.extend(values);
        }
        Ok(datum)
    }

    fn voter_vector(&self, questions: &[&Question]) -> Result<Vec<f64>> {
        let mut datum = Vec::new();
        for question in questions {
            match question.voter_answer() {
                Some(answer) => datum.extend(question.normalize_answer(answer)?),
                None => datum.extend(std::iter::repeat(f64::NAN).take(question.mapping_width())),
            }
        }
        Ok(datum)
    }

    /// Project every candidate (and the voter, unless disabled).
    ///
    /// With `preview` set, projects with that method and returns the result
    /// without touching candidates, parties or the mapping status.
    pub async fn init_mapping(&mut self, preview: Option<&str>) -> Result<MappingResult> {
        let method = preview.map_or_else(|| self.config.projection_method.clone(), str::to_string);
        let properties = self.registry.properties(&method)?;

        let (question_ids, candidate_ids, input) = {
            let questions = self.mapping_questions(&method)?;
            let data = self
                .candidates
                .values()
                .map(|candidate| self.mapping_data(candidate, &questions))
                .collect::<Result<Vec<_>>>()?;
            let voter = if self.voter_disabled() {
                None
            } else {
                Some(self.voter_vector(&questions)?)
            };
            let question_ids: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();
            let candidate_ids: Vec<String> = self.candidates.keys().cloned().collect();
            (question_ids, candidate_ids, ProjectionInput::new(data, voter))
        };

        let mut projector = self.registry.create(&method)?;
        if preview.is_none() {
            if let Some(mut previous) = self.projector.take() {
                previous.cancel();
            }
        }

        log::info!(
            "Projecting {} candidates over {} questions with {}{}",
            candidate_ids.len(),
            question_ids.len(),
            method,
            if preview.is_some() { " (preview)" } else { "" }
        );

        let progress = ProgressReporter::new(self.progress_tx.clone());
        let mut output = projector
            .project(input, progress, ProjectionOptions::default())
            .await?;

        if output.coordinates.len() != candidate_ids.len() {
            return Err(MatcherError::InvariantViolation(format!(
                "projector returned {} coordinates for {} candidates",
                output.coordinates.len(),
                candidate_ids.len()
            )));
        }
        if properties.distance_axis {
            for coordinates in &mut output.coordinates {
                normalize_distance(coordinates, question_ids.len());
            }
        }

        let result = MappingResult {
            method,
            candidate_ids,
            coordinates: output.coordinates,
            voter: output.voter,
        };
        if preview.is_some() {
            return Ok(result);
        }

        for (id, coordinates) in result.candidate_ids.iter().zip(&result.coordinates) {
            if let Some(candidate) = self.candidates.get_mut(id) {
                candidate.proj_x = Some(coordinates[0]);
                candidate.proj_y = Some(coordinates[1]);
                candidate.score = score(*coordinates, properties, result.voter);
            }
        }
        self.place_parties(projector.as_ref(), &question_ids, properties, result.voter)?;
        self.projector = Some(projector);
        self.publish(DataStream::Mapping, DataStatus::Ready)?;
        Ok(result)
    }

    /// Predict party positions from their average answers, or fall back to
    /// the centroid of their candidates.
    fn place_parties(
        &mut self,
        projector: &dyn DataProjector,
        question_ids: &[String],
        properties: MethodProperties,
        voter: Option<Coordinates>,
    ) -> Result<()> {
        let placements: Vec<(String, Coordinates)> = if projector.supports_predict() {
            let questions: Vec<&Question> = question_ids
                .iter()
                .filter_map(|id| self.questions.get(id))
                .collect();
            self.parties
                .values()
                .map(|party| {
                    let datum = self.mapping_data(party, &questions)?;
                    let mut coordinates = projector.predict(&datum)?;
                    if properties.distance_axis {
                        normalize_distance(&mut coordinates, questions.len());
                    }
                    Ok((party.id.clone(), coordinates))
                })
                .collect::<Result<_>>()?
        } else {
            centroids(&self.candidates)
                .into_iter()
                .filter(|(id, _)| self.parties.contains_key(id))
                .collect()
        };

        for (id, coordinates) in placements {
            if let Some(party) = self.parties.get_mut(&id) {
                party.proj_x = Some(coordinates[0]);
                party.proj_y = Some(coordinates[1]);
                party.score = score(coordinates, properties, voter);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Analytics and state
    // ------------------------------------------------------------------

    pub fn log_event(&self, name: &str, params: EventParams) {
        let mut all = EventParams::new();
        all.insert(
            "currentPage".to_string(),
            serde_json::Value::String(EVENT_PAGE.to_string()),
        );
        all.extend(params);
        self.provider.log_event(name, &all);
    }

    #[must_use]
    pub fn statistics_saved(&self) -> bool {
        self.statistics_saved
    }

    /// Send the voter's answers once per session history.
    pub async fn save_session_statistics(&mut self) -> Result<()> {
        if self.statistics_saved {
            return Ok(());
        }
        let statistics = SessionStatistics {
            answers: self
                .answerable_questions(true)
                .into_iter()
                .map(|q| q.voter_answer().cloned())
                .collect(),
            locale: self.config.locale.clone(),
        };
        self.provider
            .save_session_statistics(&statistics)
            .await
            .map_err(MatcherError::DataProvider)?;
        self.statistics_saved = true;
        self.write_key(KEY_STATISTICS_SAVED, "1")
    }

    #[must_use]
    pub fn state(&self) -> MatcherState {
        MatcherState {
            municipality: self.municipality().map(str::to_string),
            municipality_id: self.municipality_id().map(str::to_string),
            constituency: self.constituency().map(str::to_string),
            constituency_id: self.constituency_id().map(str::to_string),
            active_filters: self.active_filter_names(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    fn read_key(&self, key: &str) -> Result<Option<String>> {
        self.store.read(key).map_err(MatcherError::Storage)
    }

    fn write_key(&mut self, key: &str, value: &str) -> Result<()> {
        self.store.write(key, value).map_err(MatcherError::Storage)
    }
}

fn voter_answered_numeric_ids(questions: &QuestionDict) -> Vec<String> {
    questions
        .values()
        .filter(|q| q.is_numeric() && q.voter_answer().is_some())
        .map(|q| q.id.clone())
        .collect()
}

/// Numeric answers must be keys of the question's scale; rankings must list
/// distinct option keys.
#[allow(clippy::cast_possible_truncation)]
fn validate_answer(question: &Question, answer: &Answer) -> Result<()> {
    let is_key = |value: f64, keys: &[i64]| value.fract() == 0.0 && keys.contains(&(value as i64));
    let valid = match &question.kind {
        QuestionKind::Numeric { values } => answer
            .as_number()
            .is_some_and(|v| is_key(v, &values.value_keys())),
        // A ranking lists each option at most once
        QuestionKind::PreferenceOrder { options } => {
            let keys: Vec<i64> = options.options().iter().map(|o| o.key).collect();
            answer.as_sequence().is_some_and(|ranking| {
                ranking.iter().all(|v| is_key(*v, &keys))
                    && ranking
                        .iter()
                        .enumerate()
                        .all(|(i, v)| !ranking[..i].contains(v))
            })
        }
        QuestionKind::Text => true,
    };
    if valid {
        Ok(())
    } else {
        Err(MatcherError::InvalidState(format!(
            "'{}' is not a valid answer to question '{}'",
            answer, question.id
        )))
    }
}

/// Drop candidates over `max_missing_vals` and flag those over
/// `nonmissing_candidate_max_missing_vals`. Returns (culled, flagged).
fn cull_candidates(
    config: &MatcherConfig,
    questions: &QuestionDict,
    candidates: &mut CandidateDict,
) -> (usize, usize) {
    let ceiling = usize::try_from(config.max_missing_vals).ok();
    let warning = usize::try_from(config.nonmissing_candidate_max_missing_vals).ok();
    if ceiling.is_none() && warning.is_none() {
        return (0, 0);
    }

    let answerable: Vec<&Question> = questions.values().filter(|q| q.is_answerable()).collect();
    let before = candidates.len();
    let mut flagged = 0;
    candidates.retain(|_, candidate| {
        let missing = answerable
            .iter()
            .filter(|q| q.is_missing(candidate.answer(q)))
            .count();
        if ceiling.is_some_and(|max| missing > max) {
            return false;
        }
        if warning.is_some_and(|max| missing > max) {
            candidate.missing = true;
            flagged += 1;
        }
        true
    });
    (before - candidates.len(), flagged)
}

fn impute(question: &Question, voter_disabled: bool) -> Result<Vec<f64>> {
    if voter_disabled || question.voter_answer().is_none() {
        return Ok(question.neutral_vector());
    }
    match &question.kind {
        QuestionKind::Numeric { values } => {
            Ok(vec![values.normalize(question.inverted_voter_answer(true)?)])
        }
        _ => Ok(question.neutral_vector()),
    }
}

#[allow(clippy::cast_precision_loss)]
fn normalize_distance(coordinates: &mut Coordinates, question_count: usize) {
    if question_count > 0 {
        coordinates[0] /= question_count as f64;
    }
}

/// Compatibility in `[0, 1]`, higher is better.
fn score(coordinates: Coordinates, properties: MethodProperties, voter: Option<Coordinates>) -> Option<f64> {
    if properties.distance_axis {
        return Some(1.0 - coordinates[0]);
    }
    let voter = voter?;
    let distance = (coordinates[0] - voter[0]).hypot(coordinates[1] - voter[1]);
    Some((1.0 - distance).clamp(0.0, 1.0))
}

#[allow(clippy::cast_precision_loss)]
fn centroids(candidates: &CandidateDict) -> BTreeMap<String, Coordinates> {
    let mut sums: BTreeMap<&str, (f64, f64, usize)> = BTreeMap::new();
    for candidate in candidates.values() {
        let (Some(x), Some(y)) = (candidate.proj_x, candidate.proj_y) else {
            continue;
        };
        let entry = sums.entry(candidate.party_id.as_str()).or_default();
        entry.0 += x;
        entry.1 += y;
        entry.2 += 1;
    }
    sums.into_iter()
        .map(|(party, (x, y, n))| (party.to_string(), [x / n as f64, y / n as f64]))
        .collect()
}
