//! Static asset serving.
//!
//! Either a directory on disk or the single embedded web UI page. Only
//! `GET` and `HEAD` are served; paths never escape the configured root.

use std::path::{Component, Path, PathBuf};

use crate::{
    error::ServerError,
    http::{AUTH_COOKIE, Body, Request, Response, Status},
};

const EMBEDDED_INDEX: &str = include_str!("../assets/index.html");

/// Where static assets come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assets {
    /// Built-in single-page UI
    Embedded,
    /// Files under a directory
    Directory(PathBuf),
}

impl Assets {
    /// Select the asset source. A configured directory must exist.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::StaticDir` if `dir` is not a directory.
    pub fn from_config(dir: Option<PathBuf>) -> Result<Self, ServerError> {
        match dir {
            None => Ok(Self::Embedded),
            Some(path) if path.is_dir() => Ok(Self::Directory(path)),
            Some(path) => Err(ServerError::StaticDir { path }),
        }
    }

    /// Serve a non-API request.
    pub async fn serve(&self, req: &Request) -> Response {
        if !(req.method == "GET" || req.is_head()) {
            return Response::empty(Status::MethodNotAllowed).header("Allow", "GET, HEAD");
        }

        match self {
            Self::Embedded => match req.path.as_str() {
                "/" | "/index.html" => Response::with_body(
                    Status::Ok,
                    "text/html; charset=utf-8",
                    Body::Bytes(EMBEDDED_INDEX.as_bytes().to_vec()),
                ),
                _ => Response::empty(Status::NotFound),
            },
            Self::Directory(root) => {
                let Some(path) = resolve(root, &req.path) else {
                    return Response::empty(Status::NotFound);
                };
                match tokio::fs::read(&path).await {
                    Ok(bytes) => {
                        let content_type = mime_guess::from_path(&path).first_or_octet_stream();
                        Response::with_body(
                            Status::Ok,
                            content_type.as_ref(),
                            Body::Bytes(bytes),
                        )
                    },
                    Err(e) => {
                        tracing::debug!(path = %req.path, "static asset unavailable: {}", e);
                        Response::empty(Status::NotFound)
                    },
                }
            },
        }
    }
}

/// Answer `/?ak=<token>` by storing the token in the session cookie and
/// redirecting to `/`, so the token leaves the address bar.
pub fn session_redirect(token: &str) -> Response {
    Response::empty(Status::SeeOther)
        .header("Location", "/")
        .header("Set-Cookie", format!("{AUTH_COOKIE}={token}; Path=/; HttpOnly; SameSite=Strict"))
}

/// Map a request path onto a file below `root`. Directories resolve to
/// their `index.html`. Anything but plain components is refused.
fn resolve(root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = request_path.trim_start_matches('/');
    let mut path = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => path.push(part),
            _ => return None,
        }
    }
    if relative.is_empty() || relative.ends_with('/') || path.is_dir() {
        path.push("index.html");
    }
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_rejects_traversal() {
        let root = Path::new("/srv/static");
        assert_eq!(resolve(root, "/../etc/passwd"), None);
        assert_eq!(resolve(root, "/a/../../b"), None);
        assert_eq!(resolve(root, "/app.js"), Some(PathBuf::from("/srv/static/app.js")));
        assert_eq!(resolve(root, "/"), Some(PathBuf::from("/srv/static/index.html")));
    }

    #[test]
    fn missing_directory_fails_fast() {
        let result = Assets::from_config(Some(PathBuf::from("/definitely/not/here")));
        assert!(matches!(result, Err(ServerError::StaticDir { .. })));
    }

    #[tokio::test]
    async fn embedded_index_is_served() {
        let req = Request::new("GET", "/").unwrap();
        let resp = Assets::Embedded.serve(&req).await;
        assert_eq!(resp.status(), Status::Ok);
        assert!(resp.header_value("content-type").unwrap().starts_with("text/html"));
        assert!(!resp.body().is_empty());
    }

    #[tokio::test]
    async fn post_is_not_allowed() {
        let req = Request::new("POST", "/").unwrap();
        let resp = Assets::Embedded.serve(&req).await;
        assert_eq!(resp.status(), Status::MethodNotAllowed);
    }

    #[tokio::test]
    async fn directory_files_get_content_type() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("style.css"), "body{}").unwrap();
        let assets = Assets::from_config(Some(dir.path().to_path_buf())).unwrap();

        let resp = assets.serve(&Request::new("GET", "/style.css").unwrap()).await;
        assert_eq!(resp.status(), Status::Ok);
        assert_eq!(resp.header_value("content-type"), Some("text/css"));
        assert_eq!(resp.body(), b"body{}");

        let missing = assets.serve(&Request::new("GET", "/nope.js").unwrap()).await;
        assert_eq!(missing.status(), Status::NotFound);
    }

    #[test]
    fn redirect_sets_cookie() {
        let resp = session_redirect("abcd");
        assert_eq!(resp.status(), Status::SeeOther);
        assert_eq!(resp.header_value("location"), Some("/"));
        assert_eq!(
            resp.header_value("set-cookie"),
            Some("ak=abcd; Path=/; HttpOnly; SameSite=Strict")
        );
    }
}
