mod support;

use std::sync::Arc;
use std::time::Duration;
use support::{approx, loaded, FakeProvider, SharedStore};
use votematch_matcher::{
    DataStatus, DataStream, Matcher, MatcherConfig, MatcherError, MethodProperties,
    ProjectorRegistry,
};
use votematch_model::Answer;
use votematch_projection::{DataProjector, StressOptions, StressProjector};

fn answer_all(matcher: &mut Matcher) {
    for (id, value) in [("q1", 5.0), ("q2", 5.0), ("q3", 4.0)] {
        matcher.set_voter_answer(id, Answer::Number(value)).unwrap();
    }
}

fn score(matcher: &Matcher, id: &str) -> f64 {
    matcher.candidate(id).unwrap().score.unwrap()
}

#[tokio::test]
async fn manhattan_scores_are_inverted_mean_distances() {
    let mut h = loaded(MatcherConfig::default()).await;
    answer_all(&mut h.matcher);

    let result = h.matcher.init_mapping(None).await.unwrap();

    assert_eq!(result.method, "Manhattan");
    assert_eq!(result.voter, Some([0.0, 0.0]));
    assert_eq!(result.candidate_ids.len(), 5);
    assert!(approx(score(&h.matcher, "alice"), 1.0));
    assert!(approx(score(&h.matcher, "bob"), 1.0 - 1.75 / 3.0));
    assert!(approx(score(&h.matcher, "carol"), 1.0 - 2.5 / 3.0));
    // Missing answers are imputed as the opposite of the voter's
    assert!(approx(score(&h.matcher, "dave"), 1.0 - 2.75 / 3.0));
    assert!(approx(score(&h.matcher, "erin"), 1.0 - 2.0 / 3.0));

    let alice = h.matcher.candidate("alice").unwrap();
    assert_eq!(alice.proj_x, Some(0.0));
    assert_eq!(h.matcher.status(DataStream::Mapping), DataStatus::Ready);
}

#[tokio::test]
async fn parties_are_placed_by_prediction() {
    let mut h = loaded(MatcherConfig::default()).await;
    answer_all(&mut h.matcher);

    h.matcher.init_mapping(None).await.unwrap();

    let red = h.matcher.party("red").unwrap();
    assert!(approx(red.score.unwrap(), 1.0));
    let blue = h.matcher.party("blue").unwrap();
    assert!(approx(blue.score.unwrap(), 1.0 - 2.75 / 3.0));
    assert!(blue.proj_x.is_some() && blue.proj_y.is_some());
}

#[tokio::test]
async fn disabled_voter_maps_every_question_around_the_centre() {
    let mut h = loaded(MatcherConfig::default()).await;
    h.matcher.set_voter_answer("q1", Answer::Number(5.0)).unwrap();
    h.matcher.set_voter_disabled(true).unwrap();

    assert_eq!(h.matcher.mapping_questions("Manhattan").unwrap().len(), 3);
    let result = h.matcher.init_mapping(None).await.unwrap();

    assert_eq!(result.voter, None);
    // dave has no answers, so he sits on the neutral centre
    assert!(approx(score(&h.matcher, "dave"), 1.0));
    assert!(approx(score(&h.matcher, "alice"), 1.0 - 1.25 / 3.0));
}

#[tokio::test]
async fn only_answered_questions_are_mapped_by_default() {
    let mut h = loaded(MatcherConfig::default()).await;
    h.matcher.set_voter_answer("q1", Answer::Number(5.0)).unwrap();

    let ids: Vec<_> = h
        .matcher
        .mapping_questions("Manhattan")
        .unwrap()
        .into_iter()
        .map(|q| q.id.clone())
        .collect();
    assert_eq!(ids, ["q1"]);

    let questions = h.matcher.answerable_questions(false);
    let dave = h.matcher.candidate("dave").unwrap();
    assert_eq!(
        h.matcher.mapping_data(dave, &questions).unwrap(),
        vec![0.0, 0.5, 0.5]
    );
}

#[tokio::test]
async fn preview_leaves_state_alone() {
    let mut h = loaded(MatcherConfig::default()).await;
    answer_all(&mut h.matcher);

    let preview = h.matcher.init_mapping(Some("Manhattan")).await.unwrap();

    assert_eq!(preview.coordinates.len(), 5);
    assert!(h.matcher.candidates().values().all(|c| c.score.is_none()));
    assert!(h.matcher.parties().values().all(|p| p.proj_x.is_none()));
    assert_eq!(h.matcher.status(DataStream::Mapping), DataStatus::NotReady);
}

#[tokio::test]
async fn unknown_methods_are_rejected() {
    let mut h = loaded(MatcherConfig::default()).await;
    assert!(matches!(
        h.matcher.init_mapping(Some("TSNE")).await,
        Err(MatcherError::UnsupportedConfiguration(_))
    ));

    let mut h = loaded(MatcherConfig {
        projection_method: "TSNE".to_string(),
        ..MatcherConfig::default()
    })
    .await;
    assert!(matches!(
        h.matcher.init_mapping(None).await,
        Err(MatcherError::UnsupportedConfiguration(_))
    ));
    assert_eq!(h.matcher.status(DataStream::Mapping), DataStatus::NotReady);
}

#[tokio::test]
async fn new_answers_invalidate_a_ready_mapping() {
    let mut h = loaded(MatcherConfig::default()).await;
    answer_all(&mut h.matcher);
    h.matcher.init_mapping(None).await.unwrap();
    assert!(h.matcher.status(DataStream::Mapping).is_ready());

    h.matcher.set_voter_answer("q2", Answer::Number(1.0)).unwrap();
    assert_eq!(h.matcher.status(DataStream::Mapping), DataStatus::NotReady);
}

#[tokio::test]
async fn progress_ends_at_one_hundred() {
    let mut h = loaded(MatcherConfig::default()).await;
    answer_all(&mut h.matcher);
    let mut progress = h.matcher.subscribe_progress();

    h.matcher.init_mapping(None).await.unwrap();

    let mut last = None;
    while let Ok(percent) = progress.try_recv() {
        last = Some(percent);
    }
    assert_eq!(last, Some(100));
}

async fn stress_matcher(options: StressOptions) -> Matcher {
    let mut registry = ProjectorRegistry::default();
    registry.register(
        "Stress",
        MethodProperties {
            use_all: true,
            distance_axis: false,
        },
        Box::new(move || -> Box<dyn DataProjector> {
            Box::new(StressProjector::new(options.clone()))
        }),
    );
    let config = MatcherConfig {
        projection_method: "Stress".to_string(),
        ..MatcherConfig::default()
    };
    let mut matcher = Matcher::with_registry(
        config,
        Arc::new(FakeProvider::new()),
        Box::new(SharedStore::default()),
        registry,
    );
    matcher.init().await.unwrap();
    matcher.set_municipality("m1").await.unwrap();
    matcher
}

#[tokio::test(start_paused = true)]
async fn layout_methods_place_parties_at_candidate_centroids() {
    let mut matcher = stress_matcher(StressOptions::default()).await;
    matcher.set_voter_answer("q1", Answer::Number(5.0)).unwrap();

    let result = matcher.init_mapping(None).await.unwrap();

    assert!(result.voter.is_some());
    for [x, y] in &result.coordinates {
        assert!((0.0..=1.0).contains(x) && (0.0..=1.0).contains(y));
    }
    for candidate in matcher.candidates().values() {
        let score = candidate.score.unwrap();
        assert!((0.0..=1.0).contains(&score));
    }

    let alice = matcher.candidate("alice").unwrap();
    let bob = matcher.candidate("bob").unwrap();
    let red = matcher.party("red").unwrap();
    assert!(approx(
        red.proj_x.unwrap(),
        (alice.proj_x.unwrap() + bob.proj_x.unwrap()) / 2.0
    ));
    assert!(approx(
        red.proj_y.unwrap(),
        (alice.proj_y.unwrap() + bob.proj_y.unwrap()) / 2.0
    ));
}

#[tokio::test(start_paused = true)]
async fn abandoned_mapping_runs_stop_reporting_progress() {
    let mut matcher = stress_matcher(StressOptions {
        tick: Duration::from_millis(10),
        max_chunks: 1000,
        ..StressOptions::default()
    })
    .await;
    matcher.set_voter_answer("q1", Answer::Number(5.0)).unwrap();

    let run = tokio::time::timeout(Duration::from_millis(50), matcher.init_mapping(None)).await;
    assert!(run.is_err());

    let mut progress = matcher.subscribe_progress();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(progress.try_recv().is_err());
    assert_eq!(matcher.status(DataStream::Mapping), DataStatus::NotReady);
    assert!(matcher.candidate("alice").unwrap().score.is_none());
}
