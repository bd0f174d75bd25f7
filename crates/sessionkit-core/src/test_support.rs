//! Scripted transport and recording redirect for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt};
use reqwest::StatusCode;

use crate::api::{ApiError, ApiRequest, ApiResponse, LoginRedirect, Transport};

/// Canned outcome for a path
#[derive(Clone)]
pub enum Reply {
    Respond(StatusCode, String),
    Fail(Arc<dyn Fn() -> ApiError + Send + Sync>),
}

impl Reply {
    pub fn json(body: serde_json::Value) -> Self {
        Reply::Respond(StatusCode::OK, body.to_string())
    }

    pub fn status(status: StatusCode) -> Self {
        Reply::Respond(status, String::new())
    }

    pub fn error(make: impl Fn() -> ApiError + Send + Sync + 'static) -> Self {
        Reply::Fail(Arc::new(make))
    }
}

#[derive(Default)]
struct Route {
    queued: VecDeque<Reply>,
    fallback: Option<Reply>,
}

/// Transport answering from per-path scripts and logging every request.
///
/// Each send yields once before completing so concurrent callers interleave.
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<String, Route>>,
    log: Mutex<Vec<ApiRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request to `path` with `reply` once queued replies run out
    pub fn on(&self, path: &str, reply: Reply) {
        let mut routes = self.routes.lock().unwrap();
        routes.entry(path.to_string()).or_default().fallback = Some(reply);
    }

    /// Answer the next request to `path` with `reply`
    pub fn once(&self, path: &str, reply: Reply) {
        let mut routes = self.routes.lock().unwrap();
        routes.entry(path.to_string()).or_default().queued.push_back(reply);
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|r| r.path == path).count()
    }

    fn next_reply(&self, path: &str) -> Option<Reply> {
        let mut routes = self.routes.lock().unwrap();
        let route = routes.get_mut(path)?;
        route.queued.pop_front().or_else(|| route.fallback.clone())
    }
}

impl Transport for FakeTransport {
    fn send<'a>(&'a self, request: &'a ApiRequest) -> BoxFuture<'a, Result<ApiResponse, ApiError>> {
        self.log.lock().unwrap().push(request.clone());
        let reply = self.next_reply(&request.path);

        async move {
            tokio::task::yield_now().await;
            match reply {
                Some(Reply::Respond(status, body)) => Ok(ApiResponse::new(status, body)),
                Some(Reply::Fail(make)) => Err(make()),
                None => Ok(ApiResponse::new(StatusCode::NOT_FOUND, "no route")),
            }
        }
        .boxed()
    }
}

/// Redirect that remembers every login path it was sent to
#[derive(Default)]
pub struct RecordingRedirect {
    paths: Mutex<Vec<String>>,
}

impl RecordingRedirect {
    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

impl LoginRedirect for RecordingRedirect {
    fn redirect_to_login(&self, login_path: &str) {
        self.paths.lock().unwrap().push(login_path.to_string());
    }
}
