//! reqrank Integration Tests
//!
//! - Feature 1: Counting and deduplication
//! - Feature 2: Concurrent increments
//! - Feature 3: Ranking reads
//! - Feature 4: HTTP surface

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use bytes::Bytes;

use reqrank::adapters::{InMemoryRecorder, MemoryStore, NoopRecorder};
use reqrank::cache::{
    content_hash, data_key, hash_request, CounterRepository, RankingQuery, RepositoryConfig,
    COUNTERS_KEY,
};
use reqrank::domain::FizzBuzzRequest;
use reqrank::Error;

fn request(fst_str: &str) -> FizzBuzzRequest {
    FizzBuzzRequest::new(3, 5, 10, fst_str, "b")
}

fn setup() -> (Arc<MemoryStore>, Arc<InMemoryRecorder>, Arc<CounterRepository>) {
    let store = Arc::new(MemoryStore::new());
    let recorder = Arc::new(InMemoryRecorder::new());
    let repo = Arc::new(CounterRepository::new(store.clone(), recorder.clone()));
    (store, recorder, repo)
}

// =============================================================================
// Feature 1: Counting and deduplication
// =============================================================================

mod counting_tests {
    use super::*;

    #[tokio::test]
    async fn test_single_increment_round_trips() {
        let (_, _, repo) = setup();
        let req = request("a");

        let outcome = repo.increment_request(&req).await.unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.score, 1);

        let payload = repo.get_data(&outcome.hash).await.unwrap();
        let decoded: FizzBuzzRequest = serde_json::from_slice(&payload).unwrap();
        assert_eq!(decoded, req);

        let view = repo.get_counters(-1, -1).await.unwrap();
        assert_eq!(view.hashes(), vec![outcome.hash]);
        assert_eq!(view.scores(), vec![1]);
    }

    #[tokio::test]
    async fn test_payload_written_once() {
        let (store, recorder, repo) = setup();
        let req = request("a");

        for expected in 1..=4u64 {
            let outcome = repo.increment_request(&req).await.unwrap();
            assert_eq!(outcome.created, expected == 1);
            assert_eq!(outcome.score, expected);
        }

        let (payload, hash) = hash_request(&req).unwrap();
        assert_eq!(hash, content_hash(&payload));
        assert_eq!(repo.get_data(&hash).await.unwrap(), payload);
        assert_eq!(store.score(COUNTERS_KEY, &hash.to_string()), Some(4));

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.first_seen, 1);
        assert_eq!(snapshot.repeats, 3);
        assert_eq!(recorder.observations(&hash), 4);
    }

    #[tokio::test]
    async fn test_distinct_requests_distinct_entries() {
        let (store, _, repo) = setup();
        let a = repo.increment_request(&request("a")).await.unwrap();
        let b = repo.increment_request(&request("z")).await.unwrap();

        assert_ne!(a.hash, b.hash);
        assert!(store.contains_key(&data_key(&a.hash)));
        assert!(store.contains_key(&data_key(&b.hash)));
        assert_eq!(repo.get_counters(0, -1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_store_surfaces() {
        let (store, recorder, repo) = setup();
        store.set_unavailable(true);

        assert_matches!(
            repo.increment_request(&request("a")).await,
            Err(Error::StoreUnavailable(_))
        );
        assert_matches!(repo.get_counters(-1, -1).await, Err(Error::StoreUnavailable(_)));
        assert!(recorder.snapshot().store_errors >= 2);
    }
}

// =============================================================================
// Feature 2: Concurrent increments
// =============================================================================

mod concurrency_tests {
    use super::*;

    async fn hammer(repo: Arc<CounterRepository>, writers: usize) {
        let handles: Vec<_> = (0..writers)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.increment_request(&request("a")).await })
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            result.unwrap().unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_no_lost_updates() {
        let (store, recorder, repo) = setup();
        hammer(repo.clone(), 64).await;

        let hash = hash_request(&request("a")).unwrap().1;
        assert_eq!(store.score(COUNTERS_KEY, &hash.to_string()), Some(64));

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.first_seen, 1);
        assert_eq!(snapshot.repeats, 63);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_with_injected_conflicts() {
        let (store, recorder, repo) = setup();
        store.inject_conflicts(40);
        hammer(repo.clone(), 32).await;

        let hash = hash_request(&request("a")).unwrap().1;
        assert_eq!(store.score(COUNTERS_KEY, &hash.to_string()), Some(32));
        assert!(recorder.snapshot().conflicts >= 40);
    }

    #[tokio::test]
    async fn test_exhausted_retries_leave_no_state() {
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(InMemoryRecorder::new());
        let repo = CounterRepository::with_config(
            store.clone(),
            recorder.clone(),
            RepositoryConfig {
                max_retries: 5,
                increment_timeout: None,
            },
        );
        store.inject_conflicts(u64::MAX);

        let req = request("a");
        let err = repo.increment_request(&req).await.unwrap_err();
        assert_matches!(
            err,
            Error::TransactionConflictExceeded { ref key, attempts: 5 } if key == COUNTERS_KEY
        );

        let hash = hash_request(&req).unwrap().1;
        assert!(!store.contains_key(&data_key(&hash)));
        assert_eq!(store.score(COUNTERS_KEY, &hash.to_string()), None);
        assert_eq!(recorder.snapshot().conflicts, 5);
    }

    #[tokio::test]
    async fn test_increment_wall_clock_bound() {
        let store = Arc::new(MemoryStore::new());
        let repo = CounterRepository::with_config(
            store.clone(),
            Arc::new(NoopRecorder),
            RepositoryConfig {
                max_retries: usize::MAX,
                increment_timeout: Some(Duration::from_millis(20)),
            },
        );
        store.inject_conflicts(u64::MAX);

        assert_matches!(
            repo.increment_request(&request("a")).await,
            Err(Error::Timeout { .. })
        );
    }
}

// =============================================================================
// Feature 3: Ranking reads
// =============================================================================

mod ranking_tests {
    use super::*;

    async fn bump(repo: &CounterRepository, req: &FizzBuzzRequest, times: usize) {
        for _ in 0..times {
            repo.increment_request(req).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_most_requested_wins() {
        let (_, _, repo) = setup();
        bump(&repo, &request("x"), 3).await;
        bump(&repo, &request("y"), 1).await;

        let top = RankingQuery::new(repo)
            .most_requested::<FizzBuzzRequest>()
            .await
            .unwrap();
        assert_eq!(top.request, request("x"));
        assert_eq!(top.score, 3);
    }

    #[tokio::test]
    async fn test_rank_windows_over_ties() {
        let (_, _, repo) = setup();
        let (a, b, c) = (request("a"), request("b"), request("c"));
        bump(&repo, &a, 2).await;
        bump(&repo, &b, 2).await;
        bump(&repo, &c, 1).await;

        let ha = hash_request(&a).unwrap().1;
        let hb = hash_request(&b).unwrap().1;
        let hc = hash_request(&c).unwrap().1;

        // Highest two ranks hold the tied entries, ordered by member.
        let top_two = repo.get_counters(-2, -1).await.unwrap();
        assert_eq!(top_two.scores(), vec![2, 2]);
        let mut tied = vec![ha, hb];
        tied.sort_by_key(|h| h.to_string());
        assert_eq!(top_two.hashes(), tied);

        // Ranks count up from the lowest score.
        let bottom_two = repo.get_counters(0, 1).await.unwrap();
        assert_eq!(bottom_two.scores(), vec![1, 2]);
        assert_eq!(bottom_two.hashes()[0], hc);

        let all = repo.get_counters(0, -1).await.unwrap();
        assert_eq!(all.scores(), vec![1, 2, 2]);
        assert_eq!(all.highest().map(|e| e.score), Some(2));

        let top = RankingQuery::new(repo).top(2).await.unwrap();
        assert_eq!(top, top_two);
    }

    #[tokio::test]
    async fn test_empty_store_outcomes() {
        let (_, _, repo) = setup();
        assert!(repo.get_counters(-1, -1).await.unwrap().is_empty());
        assert_matches!(
            RankingQuery::new(repo)
                .most_requested::<FizzBuzzRequest>()
                .await,
            Err(Error::NoCountersFound)
        );
    }

    #[tokio::test]
    async fn test_missing_payload_is_no_data() {
        let (store, _, repo) = setup();
        let outcome = repo.increment_request(&request("a")).await.unwrap();
        store.remove(&data_key(&outcome.hash));

        assert_matches!(
            repo.get_data(&outcome.hash).await,
            Err(Error::CacheKeyNotFound(_))
        );
        assert_matches!(
            RankingQuery::new(repo)
                .most_requested::<FizzBuzzRequest>()
                .await,
            Err(Error::NoDataFound { .. })
        );
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_no_request() {
        let (_, _, repo) = setup();
        repo.increment_request(&vec![1, 2, 3]).await.unwrap();

        assert_matches!(
            RankingQuery::new(repo)
                .most_requested::<FizzBuzzRequest>()
                .await,
            Err(Error::NoRequestFound { .. })
        );
    }
}

// =============================================================================
// Feature 4: HTTP surface
// =============================================================================

mod http_tests {
    use super::*;
    use http_body_util::{BodyExt, Full};
    use hyper::{Method, Request, StatusCode};
    use prometheus::Registry;
    use reqrank::api::{handle, AppState};

    fn state() -> AppState {
        let store = Arc::new(MemoryStore::new());
        let repo = Arc::new(CounterRepository::new(store, Arc::new(NoopRecorder)));
        let ranking = RankingQuery::new(repo.clone());
        AppState::new(repo, ranking, Registry::new()).unwrap()
    }

    fn post(body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::POST)
            .uri("/fizzbuzz")
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    fn get(path: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_top_request_over_http() {
        let state = state();
        let x = r#"{"fst_mod":3,"snd_mod":5,"limit":10,"fst_str":"x","snd_str":"b"}"#;
        let y = r#"{"fst_mod":2,"snd_mod":7,"limit":10,"fst_str":"y","snd_str":"b"}"#;

        assert_eq!(handle(&state, get("/metrics")).await.status(), StatusCode::NO_CONTENT);

        for body in [x, x, x, y] {
            assert_eq!(handle(&state, post(body)).await.status(), StatusCode::OK);
        }

        let response = handle(&state, get("/metrics/")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["counter"], 3);
        assert_eq!(body["request"]["fst_str"], "x");
        assert_eq!(body["request"]["fst_mod"], 3);
    }
}
