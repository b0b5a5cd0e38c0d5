use axum::extract::State;
use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
struct StubState {
    status: Arc<AtomicU16>,
    hits: Arc<AtomicUsize>,
    headers: Arc<Mutex<Vec<(String, String)>>>,
    last_auth: Arc<Mutex<Option<String>>>,
}

/// In-process HTTP endpoint answering every request with a configurable status.
pub struct StubServer {
    pub addr: SocketAddr,
    state: StubState,
}

impl StubServer {
    pub async fn start(status: u16) -> Self {
        let state = StubState::default();
        state.status.store(status, Ordering::SeqCst);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().fallback(respond).with_state(state.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_status(&self, status: u16) {
        self.state.status.store(status, Ordering::SeqCst);
    }

    pub fn add_header(&self, name: &str, value: &str) {
        self.state
            .headers
            .lock()
            .push((name.to_string(), value.to_string()));
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.state.last_auth.lock().clone()
    }
}

async fn respond(State(state): State<StubState>, headers: HeaderMap) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    *state.last_auth.lock() = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let status = StatusCode::from_u16(state.status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, "stub").into_response();
    for (name, value) in state.headers.lock().iter() {
        response.headers_mut().insert(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    response
}
