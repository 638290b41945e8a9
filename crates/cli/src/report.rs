use anyhow::Result;
use serde::Serialize;
use votematch_matcher::Matcher;
use votematch_model::{Answer, Question, QuestionKind};

#[derive(Debug, Serialize)]
pub struct MunicipalityRow {
    pub id: String,
    pub name: String,
    pub constituency_id: String,
    pub constituency: String,
}

pub fn municipalities(matcher: &Matcher) -> Result<Vec<MunicipalityRow>> {
    matcher
        .municipalities_sorted()
        .into_iter()
        .map(|m| {
            Ok(MunicipalityRow {
                id: m.id.clone(),
                name: m.name.clone(),
                constituency_id: m.constituency_id.clone(),
                constituency: matcher.constituency_name(&m.constituency_id)?.to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct QuestionRow {
    pub id: String,
    pub text: String,
    pub category: Option<String>,
    pub kind: &'static str,
    /// Accepted numeric answers; empty for other kinds.
    pub values: Vec<i64>,
    pub voter_answer: Option<Answer>,
    pub skipped: bool,
}

impl From<&Question> for QuestionRow {
    fn from(question: &Question) -> Self {
        let (kind, values) = match &question.kind {
            QuestionKind::Numeric { values } => ("numeric", values.value_keys()),
            QuestionKind::PreferenceOrder { .. } => ("preference_order", Vec::new()),
            QuestionKind::Text => ("text", Vec::new()),
        };
        Self {
            id: question.id.clone(),
            text: question.text.clone(),
            category: question.category.clone(),
            kind,
            values,
            voter_answer: question.voter_answer().cloned(),
            skipped: question.skipped_by_voter(),
        }
    }
}

pub fn questions(matcher: &Matcher) -> Vec<QuestionRow> {
    matcher
        .answerable_questions(true)
        .into_iter()
        .map(QuestionRow::from)
        .collect()
}

#[derive(Debug, Serialize)]
pub struct CandidateRow {
    pub rank: usize,
    pub id: String,
    pub name: String,
    pub party: String,
    pub score: Option<f64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    /// Too many missing answers for the score to be trusted.
    pub missing: bool,
    pub agreed: Vec<String>,
    pub disagreed: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PartyRow {
    pub id: String,
    pub name: String,
    pub score: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct MatchReport {
    pub constituency: Option<String>,
    pub method: String,
    pub answered: usize,
    pub voter_disabled: bool,
    pub low_participation: Option<bool>,
    pub active_filters: Vec<String>,
    pub candidates: Vec<CandidateRow>,
    pub parties: Vec<PartyRow>,
}

fn question_ids(questions: Vec<&Question>) -> Vec<String> {
    questions.into_iter().map(|q| q.id.clone()).collect()
}

fn by_score_desc(a: Option<f64>, b: Option<f64>) -> std::cmp::Ordering {
    b.unwrap_or(f64::NEG_INFINITY)
        .total_cmp(&a.unwrap_or(f64::NEG_INFINITY))
}

/// Ranked candidates that passed every filter, best first.
pub fn match_report(matcher: &Matcher, method: String, top: Option<usize>) -> Result<MatchReport> {
    let voter_disabled = matcher.voter_disabled();
    let mut candidates: Vec<_> = matcher
        .candidates()
        .values()
        .filter(|c| c.filtered_out != Some(true))
        .collect();
    candidates.sort_by(|a, b| by_score_desc(a.score, b.score).then_with(|| a.id.cmp(&b.id)));

    let mut rows = Vec::with_capacity(candidates.len());
    for (index, candidate) in candidates
        .into_iter()
        .take(top.unwrap_or(usize::MAX))
        .enumerate()
    {
        let (agreed, disagreed) = if voter_disabled {
            (Vec::new(), Vec::new())
        } else {
            (
                question_ids(matcher.agreed_questions(&candidate.id, false)?),
                question_ids(matcher.disagreed_questions(&candidate.id, true)?),
            )
        };
        let name = if candidate.name.is_empty() {
            candidate.id.clone()
        } else {
            candidate.name.clone()
        };
        rows.push(CandidateRow {
            rank: index + 1,
            id: candidate.id.clone(),
            name,
            party: candidate.party_id.clone(),
            score: candidate.score,
            x: candidate.proj_x,
            y: candidate.proj_y,
            missing: candidate.missing,
            agreed,
            disagreed,
        });
    }

    let mut parties: Vec<_> = matcher
        .parties()
        .values()
        .map(|p| PartyRow {
            id: p.id.clone(),
            name: p.name.clone(),
            score: p.score,
        })
        .collect();
    parties.sort_by(|a, b| by_score_desc(a.score, b.score).then_with(|| a.id.cmp(&b.id)));

    Ok(MatchReport {
        constituency: matcher.constituency().map(str::to_string),
        method,
        answered: matcher.count_voter_answers(),
        voter_disabled,
        low_participation: matcher.has_low_participation(),
        active_filters: matcher.active_filter_names(),
        candidates: rows,
        parties,
    })
}
