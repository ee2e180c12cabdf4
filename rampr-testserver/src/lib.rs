use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_HELLO: &str = "/hello";
pub const PATH_ECHO: &str = "/echo";
pub const PATH_SLOW: &str = "/slow";
pub const PATH_STRINGINATE: &str = "/stringinate";
pub const PATH_TRANSFORM: &str = "/transform";
pub const PATH_STATS: &str = "/stats";
pub const PATH_RESET_STATS: &str = "/reset-stats";

/// Longest `input` accepted through the query string.
pub const MAX_QUERY_INPUT_LEN: usize = 1000;

const DEFAULT_SLOW_MS: u64 = 50;

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    stringinate_total: Arc<AtomicU64>,
    transform_total: Arc<AtomicU64>,
}

impl TestServerStats {
    fn inc_requests_total(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn stringinate_total(&self) -> u64 {
        self.stringinate_total.load(Ordering::Relaxed)
    }

    pub fn transform_total(&self) -> u64 {
        self.transform_total.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct TestServerUrls {
    pub base_url: String,
    pub hello: String,
    pub echo: String,
    pub slow: String,
    pub stringinate: String,
    pub transform: String,
    pub stats: String,
    pub reset_stats: String,
}

impl TestServerUrls {
    pub fn new(base_url: String) -> Self {
        Self {
            hello: format!("{base_url}{PATH_HELLO}"),
            echo: format!("{base_url}{PATH_ECHO}"),
            slow: format!("{base_url}{PATH_SLOW}"),
            stringinate: format!("{base_url}{PATH_STRINGINATE}"),
            transform: format!("{base_url}{PATH_TRANSFORM}"),
            stats: format!("{base_url}{PATH_STATS}"),
            reset_stats: format!("{base_url}{PATH_RESET_STATS}"),
            base_url,
        }
    }
}

/// Inputs seen by `/stringinate` and `/transform`.
#[derive(Debug, Default)]
struct SeenInputs {
    counts: BTreeMap<String, u64>,
    longest: String,
}

impl SeenInputs {
    fn remember(&mut self, input: &str) {
        *self.counts.entry(input.to_string()).or_insert(0) += 1;
        if input.chars().count() > self.longest.chars().count() {
            self.longest = input.to_string();
        }
    }

    fn most_popular(&self) -> Option<&str> {
        let mut best: Option<(&str, u64)> = None;
        for (input, count) in &self.counts {
            if best.is_none_or(|(_, c)| *count > c) {
                best = Some((input, *count));
            }
        }
        best.map(|(input, _)| input)
    }
}

#[derive(Clone, Default)]
struct AppState {
    stats: TestServerStats,
    seen: Arc<Mutex<SeenInputs>>,
}

#[derive(Debug, Deserialize)]
struct StringinateRequest {
    #[serde(default)]
    input: String,
}

#[derive(Debug, Serialize)]
struct StringinateResponse {
    input: String,
    length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    most_frequent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequent_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TransformRequest {
    #[serde(default)]
    text: String,
    #[serde(default)]
    transformation: String,
}

#[derive(Debug, Serialize)]
struct TransformResponse {
    original_text: String,
    transformed_text: String,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    inputs: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    most_popular: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    longest_input_received: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    longest_input_len: Option<usize>,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: &'static str,
}

fn bad_request(msg: &'static str) -> Response {
    (StatusCode::BAD_REQUEST, msg).into_response()
}

/// Most frequent character, ignoring whitespace and punctuation. Ties go to the character
/// that reached the winning count first.
fn most_frequent_char(input: &str) -> Option<(char, u64)> {
    let mut counts: HashMap<char, u64> = HashMap::new();
    let mut best: Option<(char, u64)> = None;
    for ch in input.chars() {
        if ch.is_whitespace() || ch.is_ascii_punctuation() {
            continue;
        }
        let n = counts.entry(ch).or_insert(0);
        *n += 1;
        if best.is_none_or(|(_, max)| *n > max) {
            best = Some((ch, *n));
        }
    }
    best
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for ch in text.chars() {
        if at_word_start && ch.is_alphabetic() {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        at_word_start = ch.is_whitespace();
    }
    out
}

fn stringinate(state: &AppState, input: String) -> Response {
    state.stats.stringinate_total.fetch_add(1, Ordering::Relaxed);
    if input.is_empty() {
        return bad_request("input is required");
    }

    state.seen.lock().remember(&input);

    let freq = most_frequent_char(&input);
    Json(StringinateResponse {
        length: input.len(),
        most_frequent: freq.map(|(ch, _)| ch.to_string()),
        frequent_count: freq.map(|(_, n)| n),
        input,
    })
    .into_response()
}

async fn handle_stringinate_post(State(state): State<AppState>, body: Bytes) -> Response {
    state.stats.inc_requests_total();
    match serde_json::from_slice::<StringinateRequest>(&body) {
        Ok(req) => stringinate(&state, req.input),
        Err(_) => bad_request("bad json"),
    }
}

async fn handle_stringinate_get(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.stats.inc_requests_total();
    let input = query.get("input").cloned().unwrap_or_default();
    if input.len() > MAX_QUERY_INPUT_LEN {
        return bad_request("input string is too long");
    }
    stringinate(&state, input)
}

async fn handle_transform(State(state): State<AppState>, body: Bytes) -> Response {
    state.stats.inc_requests_total();
    state.stats.transform_total.fetch_add(1, Ordering::Relaxed);

    let req: TransformRequest = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return bad_request("bad json"),
    };
    if req.text.is_empty() {
        return bad_request("text is required");
    }

    let transformed_text = match req.transformation.as_str() {
        "uppercase" => req.text.to_uppercase(),
        "lowercase" => req.text.to_lowercase(),
        "titlecase" => title_case(&req.text),
        _ => return bad_request("invalid transformation type"),
    };

    state.seen.lock().remember(&req.text);

    Json(TransformResponse {
        original_text: req.text,
        transformed_text,
    })
    .into_response()
}

async fn handle_stats(State(state): State<AppState>) -> Response {
    state.stats.inc_requests_total();

    let seen = state.seen.lock();
    let longest = (!seen.longest.is_empty()).then(|| seen.longest.clone());
    let res = StatsResponse {
        inputs: seen.counts.clone(),
        most_popular: seen.most_popular().map(str::to_string),
        longest_input_len: longest.as_ref().map(|s| s.chars().count()),
        longest_input_received: longest,
    };
    drop(seen);

    Json(res).into_response()
}

async fn handle_reset_stats(State(state): State<AppState>) -> Response {
    state.stats.inc_requests_total();
    *state.seen.lock() = SeenInputs::default();
    Json(MessageResponse {
        message: "Statistics reset successfully",
    })
    .into_response()
}

async fn handle_hello(State(state): State<AppState>) -> &'static str {
    state.stats.inc_requests_total();
    "Hello World!"
}

async fn handle_slow(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> &'static str {
    state.stats.inc_requests_total();
    let ms = query
        .get("ms")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_SLOW_MS);
    sleep(Duration::from_millis(ms)).await;
    "slow"
}

async fn handle_echo(State(state): State<AppState>, body: Bytes) -> (StatusCode, Bytes) {
    state.stats.inc_requests_total();
    (StatusCode::OK, body)
}

pub fn router(stats: TestServerStats) -> Router {
    let state = AppState {
        stats,
        seen: Arc::default(),
    };
    Router::new()
        .route(PATH_HELLO, get(handle_hello))
        .route(PATH_SLOW, get(handle_slow))
        .route(PATH_ECHO, post(handle_echo))
        .route(
            PATH_STRINGINATE,
            post(handle_stringinate_post).get(handle_stringinate_get),
        )
        .route(PATH_TRANSFORM, post(handle_transform))
        .route(PATH_STATS, get(handle_stats))
        .route(PATH_RESET_STATS, get(handle_reset_stats))
        .with_state(state)
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    urls: TestServerUrls,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        let base_url = format!("http://{addr}");
        let urls = TestServerUrls::new(base_url.clone());

        Ok(Self {
            addr,
            base_url,
            urls,
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn urls(&self) -> &TestServerUrls {
        &self.urls
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn most_frequent_skips_whitespace_and_punctuation() {
        assert_eq!(most_frequent_char("a b, b!"), Some(('b', 2)));
        assert_eq!(most_frequent_char("  ..."), None);
        // First character to reach the top count wins a tie.
        assert_eq!(most_frequent_char("xyyx"), Some(('y', 2)));
    }

    #[test]
    fn title_case_capitalizes_each_word() {
        assert_eq!(title_case("hello big  world"), "Hello Big  World");
        assert_eq!(title_case("already Title"), "Already Title");
    }

    #[test]
    fn seen_inputs_tracks_popularity_and_length() {
        let mut seen = SeenInputs::default();
        seen.remember("ab");
        seen.remember("abcd");
        seen.remember("ab");
        assert_eq!(seen.most_popular(), Some("ab"));
        assert_eq!(seen.longest, "abcd");
        assert_eq!(seen.counts.get("ab"), Some(&2));
    }
}
