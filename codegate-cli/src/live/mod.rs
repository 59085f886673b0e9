//! Live review page served while the dispatch runs
//!
//! The page polls `/review/{id}/status`, which returns a fresh snapshot of
//! the run's result set on every request.

use std::net::Ipv4Addr;
use std::process::{Command, Stdio};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use codegate_core::{ReportMeta, ResultSet};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const PAGE: &str = include_str!("page.html");

#[derive(Clone)]
struct LiveState {
    id: Arc<str>,
    page: Arc<str>,
    results: Arc<ResultSet>,
}

/// Render the polling page for a run
pub fn render_page(meta: &ReportMeta) -> String {
    PAGE.replace("{{ID}}", &escape_html(&meta.id))
        .replace("{{SUBTITLE}}", &escape_html(&meta.subtitle))
        .replace("{{PROVIDER}}", &escape_html(&meta.provider))
        .replace("{{MODEL}}", &escape_html(&meta.model))
        .replace("{{DATETIME}}", &escape_html(&meta.datetime))
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Routes for one run; anything else is a 404
pub fn router(id: &str, page: String, results: Arc<ResultSet>) -> Router {
    let state = LiveState {
        id: Arc::from(id),
        page: Arc::from(page),
        results,
    };
    Router::new()
        .route("/review/{id}", get(page_handler))
        .route("/review/{id}/", get(page_handler))
        .route("/review/{id}/status", get(status_handler))
        .fallback(not_found)
        .with_state(state)
}

async fn page_handler(State(state): State<LiveState>, Path(id): Path<String>) -> Response {
    if id != *state.id {
        return not_found().await.into_response();
    }
    Html(state.page.to_string()).into_response()
}

async fn status_handler(State(state): State<LiveState>, Path(id): Path<String>) -> Response {
    if id != *state.id {
        return not_found().await.into_response();
    }
    Json(state.results.snapshot()).into_response()
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

/// A running (or file-backed) live view
pub struct LiveView {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl LiveView {
    /// Serve the page on `127.0.0.1:port`
    ///
    /// When the port cannot be bound the page is written to the temp
    /// directory and the view points at that file instead.
    pub async fn start(port: u16, meta: &ReportMeta, results: Arc<ResultSet>) -> Self {
        let page = render_page(meta);

        let listener = match TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await {
            Ok(listener) => listener,
            Err(e) => {
                warn!(port, error = %e, "Could not start live server, writing a static page");
                return Self::file_fallback(&meta.id, &page);
            }
        };
        let port = listener.local_addr().map(|a| a.port()).unwrap_or(port);
        let url = format!("http://localhost:{}/review/{}", port, meta.id);

        let app = router(&meta.id, page, results);
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let shutdown = async {
                let _ = rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!(error = %e, "Live server stopped");
            }
        });

        info!(url = %url, "Live server ready");
        Self {
            url,
            shutdown: Some(tx),
            task: Some(task),
        }
    }

    fn file_fallback(id: &str, page: &str) -> Self {
        let path = std::env::temp_dir().join(format!("codegate-{id}.html"));
        if let Err(e) = std::fs::write(&path, page) {
            warn!(path = %path.display(), error = %e, "Failed to write review page");
        }
        Self {
            url: format!("file://{}", path.display()),
            shutdown: None,
            task: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether an HTTP server backs this view
    pub fn is_served(&self) -> bool {
        self.task.is_some()
    }

    /// Stop the server and wait for it to finish
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!(error = %e, "Live server task ended abnormally");
            }
        }
    }
}

/// Open `url` in the default browser without waiting for it
pub fn open_browser(url: &str) {
    let mut command = if cfg!(target_os = "macos") {
        Command::new("open")
    } else if cfg!(windows) {
        let mut command = Command::new("cmd");
        command.args(["/c", "start", ""]);
        command
    } else {
        Command::new("xdg-open")
    };
    command
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    match command.spawn() {
        Ok(_) => debug!(url = %url, "Opened browser"),
        Err(e) => warn!(url = %url, error = %e, "Failed to open browser"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegate_core::{ReviewItem, ReviewMode};
    use serde_json::Value;

    fn meta(id: &str) -> ReportMeta {
        ReportMeta {
            id: id.to_string(),
            provider: "ollama".to_string(),
            model: "qwen2.5-coder".to_string(),
            datetime: "2026-01-01 12:00:00".to_string(),
            subtitle: "Branch: <main>".to_string(),
            mode: ReviewMode::Files,
            ai_invoked: false,
            ai_succeeded: false,
            status: String::new(),
        }
    }

    #[test]
    fn test_render_page_escapes() {
        let page = render_page(&meta("20260101-120000"));
        assert!(page.contains("Branch: &lt;main&gt;"));
        assert!(page.contains("const route = '/review/20260101-120000/status';"));
        assert!(!page.contains("{{"));
    }

    #[tokio::test]
    async fn test_serves_page_and_status() {
        let results = Arc::new(ResultSet::new(2));
        let view = LiveView::start(0, &meta("r1"), results.clone()).await;
        assert!(view.is_served());
        assert!(view.url().starts_with("http://localhost:"));
        assert!(view.url().ends_with("/review/r1"));

        let page = reqwest::get(view.url()).await.unwrap();
        assert_eq!(page.status(), 200);
        assert!(page.text().await.unwrap().contains("Code review r1"));

        let status_url = format!("{}/status", view.url());
        let status: Value = reqwest::get(&status_url).await.unwrap().json().await.unwrap();
        assert_eq!(status["done"], false);
        assert_eq!(status["files"].as_array().unwrap().len(), 0);

        results.push(ReviewItem::completed("a.rs", "ok", "diff"));
        results.push(ReviewItem::completed("Summary", "ok", "diff"));
        let status: Value = reqwest::get(&status_url).await.unwrap().json().await.unwrap();
        assert_eq!(status["done"], true);
        assert_eq!(status["files"][0]["file"], "a.rs");

        view.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_paths_are_not_found() {
        let view = LiveView::start(0, &meta("r2"), Arc::new(ResultSet::new(1))).await;
        let base = view.url().trim_end_matches("/review/r2").to_string();

        for path in ["/", "/review/other", "/review/other/status", "/favicon.ico"] {
            let response = reqwest::get(format!("{base}{path}")).await.unwrap();
            assert_eq!(response.status(), 404, "{path}");
        }
        view.shutdown().await;
    }

    #[tokio::test]
    async fn test_busy_port_falls_back_to_file() {
        let busy = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = busy.local_addr().unwrap().port();

        let view = LiveView::start(port, &meta("r3-fallback"), Arc::new(ResultSet::new(1))).await;
        assert!(!view.is_served());
        assert!(view.url().starts_with("file://"));
        let path = std::env::temp_dir().join("codegate-r3-fallback.html");
        assert!(std::fs::read_to_string(&path).unwrap().contains("Code review r3-fallback"));
        let _ = std::fs::remove_file(path);
    }
}
