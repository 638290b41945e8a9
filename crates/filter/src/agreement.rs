use crate::filter::CandidateFilter;
use std::collections::BTreeSet;
use std::fmt;
use votematch_model::{AgreementType, AnswerSource, Candidate, QuestionDict};

/// Supplies the questions the filter may constrain, evaluated on demand
/// because the voter's answered set changes during a session.
pub type ValueGetter = Box<dyn Fn(&QuestionDict) -> Vec<String> + Send + Sync>;

/// Question ids per agreement kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleTable {
    agree: BTreeSet<String>,
    disagree: BTreeSet<String>,
    opinion_unknown: BTreeSet<String>,
    mostly_agree: BTreeSet<String>,
    strongly_disagree: BTreeSet<String>,
}

impl RuleTable {
    #[must_use]
    pub fn rules(&self, kind: AgreementType) -> &BTreeSet<String> {
        match kind {
            AgreementType::Agree => &self.agree,
            AgreementType::Disagree => &self.disagree,
            AgreementType::OpinionUnknown => &self.opinion_unknown,
            AgreementType::MostlyAgree => &self.mostly_agree,
            AgreementType::StronglyDisagree => &self.strongly_disagree,
        }
    }

    fn rules_mut(&mut self, kind: AgreementType) -> &mut BTreeSet<String> {
        match kind {
            AgreementType::Agree => &mut self.agree,
            AgreementType::Disagree => &mut self.disagree,
            AgreementType::OpinionUnknown => &mut self.opinion_unknown,
            AgreementType::MostlyAgree => &mut self.mostly_agree,
            AgreementType::StronglyDisagree => &mut self.strongly_disagree,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        AgreementType::ALL
            .into_iter()
            .all(|kind| self.rules(kind).is_empty())
    }

    /// Non-empty categories in `AgreementType::ALL` order.
    pub fn active(&self) -> impl Iterator<Item = (AgreementType, &BTreeSet<String>)> {
        AgreementType::ALL
            .into_iter()
            .map(move |kind| (kind, self.rules(kind)))
            .filter(|(_, rules)| !rules.is_empty())
    }
}

/// Keeps candidates whose answers relate to the voter's answers in the
/// required way, for every constrained question.
pub struct QuestionAgreementFilter {
    name: String,
    rules: RuleTable,
    value_getter: Option<ValueGetter>,
}

impl QuestionAgreementFilter {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: RuleTable::default(),
            value_getter: None,
        }
    }

    pub fn set_value_getter(&mut self, getter: ValueGetter) {
        self.value_getter = Some(getter);
    }

    /// Questions currently selectable. Empty until a getter is wired.
    #[must_use]
    pub fn values(&self, questions: &QuestionDict) -> Vec<String> {
        self.value_getter
            .as_ref()
            .map(|getter| getter(questions))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn require(&mut self, kind: AgreementType, question_id: impl Into<String>) {
        self.rules.rules_mut(kind).insert(question_id.into());
    }

    pub fn dont_require(&mut self, kind: AgreementType, question_id: &str) {
        self.rules.rules_mut(kind).remove(question_id);
    }

    #[must_use]
    pub fn is_required(&self, kind: AgreementType, question_id: &str) -> bool {
        self.rules.rules(kind).contains(question_id)
    }

    pub fn require_mostly_agree(&mut self, question_id: impl Into<String>) {
        self.require(AgreementType::MostlyAgree, question_id);
    }

    pub fn dont_require_mostly_agree(&mut self, question_id: &str) {
        self.dont_require(AgreementType::MostlyAgree, question_id);
    }

    #[must_use]
    pub fn is_required_mostly_agree(&self, question_id: &str) -> bool {
        self.is_required(AgreementType::MostlyAgree, question_id)
    }
}

impl fmt::Debug for QuestionAgreementFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuestionAgreementFilter")
            .field("name", &self.name)
            .field("rules", &self.rules)
            .field("has_value_getter", &self.value_getter.is_some())
            .finish()
    }
}

impl CandidateFilter for QuestionAgreementFilter {
    fn name(&self) -> &str {
        &self.name
    }

    /// Without a value getter the filter stays inactive whatever its rules.
    fn is_active(&self) -> bool {
        self.value_getter.is_some() && !self.rules.is_empty()
    }

    fn matches(&self, candidate: &Candidate, questions: &QuestionDict) -> bool {
        if !self.is_active() {
            return true;
        }
        for (kind, question_ids) in self.rules.active() {
            for id in question_ids {
                let Some(question) = questions.get(id) else {
                    log::warn!("Filter '{}' references unknown question '{}'", self.name, id);
                    continue;
                };
                let verdict = question.matches_agreement_type(
                    question.voter_answer(),
                    candidate.answer(question),
                    kind,
                );
                match verdict {
                    Ok(true) => {}
                    Ok(false) => return false,
                    Err(err) => {
                        log::debug!(
                            "Candidate '{}' fails '{}' on question '{}': {}",
                            candidate.id,
                            kind,
                            id,
                            err
                        );
                        return false;
                    }
                }
            }
        }
        true
    }

    fn clear_rules(&mut self) {
        self.rules = RuleTable::default();
    }
}
