#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use votematch_matcher::{
    CorrelationMatrix, DataProvider, EventParams, KeyValueStore, Matcher, MatcherConfig,
    MemoryStore, SessionStatistics,
};
use votematch_model::{
    Answer, Candidate, CandidateDict, Category, CategoryDict, Constituency, ConstituencyDict,
    Municipality, MunicipalityDict, NumericScale, Party, PartyDict, PreferenceScale, Question,
    QuestionDict, QuestionKind, ScaleValue,
};

/// Two constituencies; "north" carries the interesting data.
pub struct FakeProvider {
    pub events: Mutex<Vec<(String, EventParams)>>,
    pub statistics: Mutex<Vec<SessionStatistics>>,
    pub fail_questions: bool,
    /// Adds the preference-order question "rank" to "north".
    pub ranking: bool,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            statistics: Mutex::new(Vec::new()),
            fail_questions: false,
            ranking: false,
        }
    }

    pub fn event_names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

fn keyed<T>(items: impl IntoIterator<Item = (&'static str, T)>) -> BTreeMap<String, T> {
    items.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

pub fn questions() -> QuestionDict {
    let scale = NumericScale::default;
    keyed([
        (
            "q1",
            Question::numeric("", scale())
                .with_category("econ")
                .with_order(2)
                .with_party_average("red", Answer::Number(5.0))
                .with_party_average("blue", Answer::Number(1.0)),
        ),
        (
            "q2",
            Question::numeric("", scale())
                .with_category("social")
                .with_order(1)
                .with_party_average("red", Answer::Number(5.0)),
        ),
        (
            "q3",
            Question::numeric("", scale())
                .with_category("econ")
                .with_order(1)
                .with_party_average("red", Answer::Number(4.0)),
        ),
        ("age", Question::new("", QuestionKind::Text)),
        ("gender", Question::new("", QuestionKind::Text)),
    ])
}

pub fn ranking_question() -> Question {
    let options = (1..=3).map(ScaleValue::new).collect();
    Question::new(
        "",
        QuestionKind::PreferenceOrder {
            options: PreferenceScale::new(options).unwrap(),
        },
    )
    .with_category("social")
    .with_order(3)
}

pub fn candidates() -> CandidateDict {
    keyed([
        (
            "alice",
            Candidate::new("", "red")
                .with_answer("q1", 5.0)
                .with_answer("q2", 5.0)
                .with_answer("q3", 4.0)
                .with_answer("age", 34.0)
                .with_answer("gender", "f"),
        ),
        (
            "bob",
            Candidate::new("", "red")
                .with_answer("q1", 4.0)
                .with_answer("q2", 2.0)
                .with_answer("q3", 1.0)
                .with_answer("age", 51.0)
                .with_answer("gender", "m"),
        ),
        (
            "carol",
            Candidate::new("", "blue")
                .with_answer("q1", 1.0)
                .with_answer("q2", 1.0)
                .with_answer("q3", 2.0)
                .with_answer("age", 28.0)
                .with_answer("gender", "f"),
        ),
        ("dave", Candidate::new("", "green")),
        (
            "erin",
            Candidate::new("", "blue")
                .with_answer("q1", 2.0)
                .with_answer("q3", 3.0),
        ),
    ])
}

#[async_trait]
impl DataProvider for FakeProvider {
    async fn constituencies(&self) -> anyhow::Result<ConstituencyDict> {
        Ok(keyed([
            (
                "north",
                Constituency {
                    id: String::new(),
                    name: "North".to_string(),
                    total_candidates: Some(10),
                },
            ),
            (
                "south",
                Constituency {
                    id: String::new(),
                    name: "South".to_string(),
                    total_candidates: Some(1),
                },
            ),
        ]))
    }

    async fn municipalities(&self) -> anyhow::Result<MunicipalityDict> {
        let municipality = |name: &str, constituency: &str| Municipality {
            id: String::new(),
            name: name.to_string(),
            constituency_id: constituency.to_string(),
        };
        Ok(keyed([
            ("m1", municipality("Brook", "north")),
            ("m2", municipality("Aston", "north")),
            ("m3", municipality("Carden", "south")),
        ]))
    }

    async fn municipalities_as_constituencies(&self) -> anyhow::Result<ConstituencyDict> {
        let constituency = |name: &str| Constituency {
            id: String::new(),
            name: name.to_string(),
            total_candidates: None,
        };
        Ok(keyed([("m1", constituency("Brook")), ("m3", constituency("Carden"))]))
    }

    async fn categories(&self) -> anyhow::Result<CategoryDict> {
        let category = |name: &str, order| Category {
            id: String::new(),
            name: name.to_string(),
            order,
        };
        Ok(keyed([
            ("econ", category("Economy", 1)),
            ("social", category("Society", 2)),
        ]))
    }

    async fn questions(&self, constituency_id: &str) -> anyhow::Result<QuestionDict> {
        if self.fail_questions {
            anyhow::bail!("question service unavailable");
        }
        Ok(match constituency_id {
            "north" | "m1" if self.ranking => {
                let mut questions = questions();
                questions.insert("rank".to_string(), ranking_question());
                questions
            }
            "north" | "m1" => questions(),
            _ => keyed([("q1", Question::numeric("", NumericScale::default()))]),
        })
    }

    async fn correlation_matrix(&self, _constituency_id: &str) -> anyhow::Result<CorrelationMatrix> {
        let row = |pairs: &[(&str, f64)]| -> BTreeMap<String, f64> {
            pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
        };
        Ok(keyed([
            ("q1", row(&[("q2", 0.3), ("retired", 0.8)])),
            ("q2", row(&[("q1", 0.3)])),
            ("retired", row(&[("q1", 0.8)])),
        ]))
    }

    async fn parties(&self) -> anyhow::Result<PartyDict> {
        Ok(keyed([
            ("red", Party::new("", "Red")),
            ("blue", Party::new("", "Blue")),
            ("green", Party::new("", "Green")),
            ("orphan", Party::new("", "Orphan")),
        ]))
    }

    async fn candidates(&self, constituency_id: &str) -> anyhow::Result<CandidateDict> {
        Ok(match constituency_id {
            "north" | "m1" => candidates(),
            _ => keyed([("sam", Candidate::new("", "red").with_answer("q1", 3.0))]),
        })
    }

    fn log_event(&self, name: &str, params: &EventParams) {
        self.events
            .lock()
            .unwrap()
            .push((name.to_string(), params.clone()));
    }

    async fn save_session_statistics(&self, statistics: &SessionStatistics) -> anyhow::Result<()> {
        self.statistics.lock().unwrap().push(statistics.clone());
        Ok(())
    }
}

/// Store handle the test keeps while the matcher owns a clone.
#[derive(Clone, Default)]
pub struct SharedStore(pub Arc<Mutex<MemoryStore>>);

impl SharedStore {
    pub fn get(&self, key: &str) -> Option<String> {
        self.0.lock().unwrap().read(key).unwrap()
    }

    pub fn put(&self, key: &str, value: &str) {
        self.0.lock().unwrap().write(key, value).unwrap();
    }
}

impl KeyValueStore for SharedStore {
    fn read(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.0.lock().unwrap().read(key)
    }

    fn write(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.0.lock().unwrap().write(key, value)
    }

    fn read_list(&self, key: &str) -> anyhow::Result<Option<Vec<String>>> {
        self.0.lock().unwrap().read_list(key)
    }

    fn write_list(&mut self, key: &str, values: &[String]) -> anyhow::Result<()> {
        self.0.lock().unwrap().write_list(key, values)
    }

    fn delete(&mut self, key: &str) -> anyhow::Result<()> {
        self.0.lock().unwrap().delete(key)
    }
}

pub struct Harness {
    pub matcher: Matcher,
    pub provider: Arc<FakeProvider>,
    pub store: SharedStore,
}

pub fn harness(config: MatcherConfig) -> Harness {
    harness_with(config, FakeProvider::new(), SharedStore::default())
}

pub fn harness_with(config: MatcherConfig, provider: FakeProvider, store: SharedStore) -> Harness {
    let provider = Arc::new(provider);
    let matcher = Matcher::new(config, provider.clone(), Box::new(store.clone()));
    Harness {
        matcher,
        provider,
        store,
    }
}

/// Initialised and showing the "north" constituency through m1.
pub async fn loaded(config: MatcherConfig) -> Harness {
    let mut h = harness(config);
    h.matcher.init().await.unwrap();
    h.matcher.set_municipality("m1").await.unwrap();
    h
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
