// ABOUTME: Local preview server for a result directory
// ABOUTME: Serves report.html and the run artifacts on 127.0.0.1

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tracing::{info, warn};

use super::error::{ReportError, Result};

/// Serve `dir` on 127.0.0.1:port until interrupted, optionally opening
/// the system browser first.
pub async fn serve(dir: PathBuf, port: u16, open_browser: bool) -> Result<()> {
    let app = router(dir);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ReportError::ServerError(format!("cannot bind {}: {}", addr, e)))?;

    let url = format!("http://{}/", addr);
    info!("serving results at {} (Ctrl+C to stop)", url);
    if open_browser {
        spawn_browser(&url);
    }

    axum::serve(listener, app)
        .await
        .map_err(|e| ReportError::ServerError(e.to_string()))?;
    Ok(())
}

pub fn router(dir: PathBuf) -> Router {
    Router::new()
        .route("/", get(index))
        .fallback(asset)
        .with_state(Arc::new(dir))
}

async fn index(State(dir): State<Arc<PathBuf>>) -> Response {
    file_response(&dir.join("report.html")).await
}

async fn asset(State(dir): State<Arc<PathBuf>>, uri: Uri) -> Response {
    let relative = uri.path().trim_start_matches('/');
    let Some(path) = sanitize(&dir, relative) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    file_response(&path).await
}

/// Resolve a request path inside the served directory, refusing
/// anything that climbs out of it.
fn sanitize(dir: &Path, relative: &str) -> Option<PathBuf> {
    let candidate = PathBuf::from(relative);
    if candidate
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(dir.join(candidate))
}

async fn file_response(path: &Path) -> Response {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let content_type = content_type_for(path);
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        Some("tsv") | Some("nwk") | Some("fasta") | Some("log") | Some("txt") => {
            "text/plain; charset=utf-8"
        }
        _ => "application/octet-stream",
    }
}

/// Best-effort browser launch, the desktop openers tried in order.
fn spawn_browser(url: &str) {
    for opener in ["xdg-open", "open"] {
        if crate::tools::find_binary(opener).is_some() {
            match std::process::Command::new(opener)
                .arg(url)
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .spawn()
            {
                Ok(_) => return,
                Err(e) => warn!("{} failed: {}", opener, e),
            }
        }
    }
    info!("no browser opener found; open {} manually", url);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_refuses_traversal() {
        let dir = Path::new("/srv/results");
        assert!(sanitize(dir, "metadata.tsv").is_some());
        assert!(sanitize(dir, "ITS/ITS_msa.fasta").is_some());
        assert!(sanitize(dir, "../secrets").is_none());
        assert!(sanitize(dir, "a/../../b").is_none());
    }

    #[test]
    fn test_content_types() {
        assert_eq!(
            content_type_for(Path::new("report.html")),
            "text/html; charset=utf-8"
        );
        assert_eq!(content_type_for(Path::new("x.json")), "application/json");
        assert_eq!(
            content_type_for(Path::new("tree_TBE.nwk")),
            "text/plain; charset=utf-8"
        );
        assert_eq!(content_type_for(Path::new("blob.bin")), "application/octet-stream");
    }
}
