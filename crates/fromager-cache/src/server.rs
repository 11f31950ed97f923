//! The local simple-index HTTP server: served with `axum` over a
//! `tokio::net::TcpListener`, reading directly from `WheelCache`'s
//! `simple/`/`downloads/`/`prebuilt/` directories so reader and writer
//! share one source of truth in-process (`SPEC_FULL.md` §6).

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

#[derive(Clone)]
struct ServerState {
    root: Arc<PathBuf>,
}

/// Binds the local simple-index server to `bind_addr` (use port `0` to let
/// the OS choose) and serves `wheels_root` (the `WheelCache`'s root
/// directory, so both `/simple/...` and `/downloads/...` resolve) until
/// the returned future completes or is dropped.
///
/// Returns the bound address so callers can hand it to child build
/// environments as their extra index URL.
pub async fn serve(
    wheels_root: PathBuf,
    bind_addr: SocketAddr,
) -> std::io::Result<(SocketAddr, impl std::future::Future<Output = ()>)> {
    let state = ServerState {
        root: Arc::new(wheels_root),
    };
    let app = Router::new().fallback(get(serve_file)).with_state(state);

    let listener = TcpListener::bind(bind_addr).await?;
    let local_addr = listener.local_addr()?;

    let server = async move {
        let _ = axum::serve(listener, app).await;
    };

    Ok((local_addr, server))
}

async fn serve_file(State(state): State<ServerState>, uri: Uri) -> Response {
    let rel = uri.path().trim_start_matches('/');
    let rel = if rel.is_empty() || rel.ends_with('/') {
        format!("{rel}index.html")
    } else {
        rel.to_string()
    };

    match resolve_under_root(&state.root, &rel) {
        Some(path) => match fs_err::read(&path) {
            Ok(bytes) => {
                let content_type = if path.extension().is_some_and(|e| e == "html") {
                    "text/html; charset=utf-8"
                } else {
                    "application/octet-stream"
                };
                ([("content-type", content_type)], bytes).into_response()
            }
            Err(_) => StatusCode::NOT_FOUND.into_response(),
        },
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Rejects any request path containing `..` or an absolute component
/// before joining it onto `root`, the same traversal guard
/// `fromager-fs::join_relative` applies to `create_files`.
fn resolve_under_root(root: &Path, rel: &str) -> Option<PathBuf> {
    let candidate = Path::new(rel);
    if candidate
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
    {
        return None;
    }
    Some(root.join(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_under_root_rejects_traversal() {
        let root = Path::new("/wheels-repo");
        assert!(resolve_under_root(root, "../etc/passwd").is_none());
    }

    #[test]
    fn test_resolve_under_root_allows_nested() {
        let root = Path::new("/wheels-repo");
        assert_eq!(
            resolve_under_root(root, "simple/stevedore/index.html"),
            Some(PathBuf::from("/wheels-repo/simple/stevedore/index.html"))
        );
    }
}
