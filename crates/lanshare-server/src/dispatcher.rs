//! API Dispatcher
//!
//! Maps `/api/*` paths onto store operations and renders the results in the
//! JSON wire protocol.
//!
//! ## Authorization
//!
//! - `download` bypasses the cookie gate: the access key is the capability
//! - every other path needs at least remote access
//! - `delete` and unrecognised paths need manage
//!
//! Authorization failures are `{"ret":-1}` with HTTP 200. The dispatcher is
//! stateless per request; network reads happen before the store lock is
//! taken and responses are written after it is released.

use std::sync::Arc;

use lanshare_core::{
    AccessLevel, ApiResponse, Capabilities, Environment, Payload, RetCode, Store, StoreError,
    message::ACCESS_KEY_LEN,
};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{
    http::{AUTH_COOKIE, Body, Request, Response, Status, parse_urlencoded, percent_encode},
    netinfo::Advertise,
};

/// Largest accepted upload: sizes must fit in 31 bits.
pub const MAX_UPLOAD_BYTES: u64 = (1 << 31) - 1;

const OCTET_STREAM: &str = "application/octet-stream";

/// Default limit for `addText` form bodies.
pub const DEFAULT_MAX_FORM_BYTES: usize = 10 * 1024 * 1024;

/// Routes API requests to the store.
pub struct Dispatcher<E>
where
    E: Environment,
{
    store: Arc<Store<E>>,
    capabilities: Capabilities,
    advertise: Advertise,
    max_form_bytes: usize,
}

impl<E> Dispatcher<E>
where
    E: Environment,
{
    /// Create a dispatcher over `store`, gated by `capabilities`.
    pub fn new(
        store: Arc<Store<E>>,
        capabilities: Capabilities,
        advertise: Advertise,
        max_form_bytes: usize,
    ) -> Self {
        Self { store, capabilities, advertise, max_form_bytes }
    }

    /// The shared store.
    pub fn store(&self) -> &Arc<Store<E>> {
        &self.store
    }

    /// The process capability secrets.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// How the server advertises itself.
    pub fn advertise(&self) -> &Advertise {
        &self.advertise
    }

    /// Classify a request by its `ak` cookie.
    pub fn access_level(&self, req: &Request) -> AccessLevel {
        self.capabilities.classify(req.cookie(AUTH_COOKIE))
    }

    /// Handle one `/api/*` request. `body` yields at most the declared body
    /// length.
    pub async fn handle<B>(&self, req: &Request, body: &mut B) -> Response
    where
        B: AsyncRead + Unpin,
    {
        if req.path == "/api/download" {
            return self.download(req);
        }

        let level = self.access_level(req);
        if !level.can_remote_access() {
            tracing::debug!(path = %req.path, "rejected unauthenticated request");
            return Response::json(&ApiResponse::unauthorized());
        }

        match req.path.as_str() {
            "/api/getMsgList" => self.get_msg_list(),
            "/api/addText" => self.add_text(req, body).await,
            "/api/addFile" => self.add_file(req, body).await,
            "/api/delete" => self.delete(req, level),
            "/api/getAccessInfo" => self.get_access_info().await,
            _ => Self::fallback(req, level),
        }
    }

    /// Whether `req` will go on to read its body.
    ///
    /// Answers `Expect: 100-continue`: requests that would be rejected from
    /// the head alone get their final status without a `100 Continue`.
    pub fn wants_body(&self, req: &Request) -> bool {
        if !self.access_level(req).can_remote_access() {
            return false;
        }
        match req.path.as_str() {
            "/api/addText" => true,
            "/api/addFile" => upload_params(req).is_ok(),
            _ => false,
        }
    }

    fn get_msg_list(&self) -> Response {
        Response::json(&ApiResponse::message_list(self.store.list()))
    }

    async fn add_text<B>(&self, req: &Request, body: &mut B) -> Response
    where
        B: AsyncRead + Unpin,
    {
        let mut raw = Vec::new();
        let limit = self.max_form_bytes as u64 + 1;
        if let Err(e) = body.take(limit).read_to_end(&mut raw).await {
            tracing::warn!("addText body read failed: {}", e);
            return Response::json(&ApiResponse::code(RetCode::Truncated));
        }
        if raw.len() > self.max_form_bytes {
            tracing::warn!(limit = self.max_form_bytes, "addText body too large");
            return Response::json(&ApiResponse::code(RetCode::MissingParameter));
        }
        if req.content_length().ok().flatten().is_some_and(|declared| declared > raw.len() as u64)
        {
            tracing::warn!(received = raw.len(), "addText body truncated");
            return Response::json(&ApiResponse::code(RetCode::Truncated));
        }

        let form = parse_urlencoded(&String::from_utf8_lossy(&raw));
        let text = form.into_iter().find(|(k, _)| k == "text").map(|(_, v)| v).unwrap_or_default();

        Self::store_result(self.store.insert_text(text), "text")
    }

    async fn add_file<B>(&self, req: &Request, body: &mut B) -> Response
    where
        B: AsyncRead + Unpin,
    {
        let (name, size) = match upload_params(req) {
            Ok(params) => params,
            Err(code) => {
                tracing::debug!(?code, "addFile rejected before reading body");
                return Response::json(&ApiResponse::code(code));
            },
        };

        let Some(mut payload) = Payload::try_zeroed(size) else {
            tracing::warn!(size, "addFile buffer allocation failed");
            return Response::json(&ApiResponse::code(RetCode::MissingParameter));
        };

        if let Err(e) = body.read_exact(payload.as_mut_slice()).await {
            tracing::warn!(size, "addFile body truncated: {}", e);
            return Response::json(&ApiResponse::code(RetCode::Truncated));
        }

        Self::store_result(self.store.insert_file(name, payload), "file")
    }

    fn store_result(result: Result<u32, StoreError>, what: &str) -> Response {
        match result {
            Ok(id) => {
                tracing::info!(id, "{} added", what);
                Response::json(&ApiResponse::ok())
            },
            Err(e) => {
                tracing::error!("failed to store {}: {}", what, e);
                Response::empty(Status::ServiceUnavailable)
            },
        }
    }

    fn delete(&self, req: &Request, level: AccessLevel) -> Response {
        if !level.can_manage() {
            tracing::debug!("delete refused for remote-access client");
            return Response::json(&ApiResponse::unauthorized());
        }

        // Unknown or unparsable ids are a no-op that still succeeds
        let id = req.query_param("id").and_then(|v| v.parse::<u32>().ok());
        if let Some(mut removed) = id.and_then(|id| self.store.delete(id)) {
            removed.scrub();
            tracing::info!(id = removed.id(), "message deleted");
        }
        Response::json(&ApiResponse::ok())
    }

    fn download(&self, req: &Request) -> Response {
        let key = req.query_param("k").unwrap_or_default();
        if key.len() != ACCESS_KEY_LEN {
            return Response::empty(Status::NotFound);
        }
        let Some(content) = self.store.find_by_access_key(key) else {
            tracing::debug!("download with unknown key");
            return Response::empty(Status::NotFound);
        };

        let inline = req.query_param("p") == Some("1");
        let (disposition, content_type) = if inline {
            ("inline", inline_content_type(&content.name))
        } else {
            ("attachment", OCTET_STREAM.to_string())
        };
        let encoded = percent_encode(&content.name);

        tracing::info!(bytes = content.data.len(), inline, "file downloaded");
        Response::with_body(Status::Ok, &content_type, Body::Payload(content.data))
            .header(
                "Content-Disposition",
                format!("{disposition}; filename=\"{encoded}\"; filename*=UTF-8''{encoded}"),
            )
            .header("X-Content-Type-Options", "nosniff")
            .header("Content-Security-Policy", "sandbox")
    }

    async fn get_access_info(&self) -> Response {
        let info = self.advertise.access_info(self.capabilities.remote_access_token()).await;
        Response::json(&ApiResponse::access_info(info))
    }

    fn fallback(req: &Request, level: AccessLevel) -> Response {
        if !level.can_manage() {
            return Response::json(&ApiResponse::unauthorized());
        }
        tracing::debug!(path = %req.path, "no handler for api path");
        Response::empty(Status::Ok)
    }
}

impl<E> std::fmt::Debug for Dispatcher<E>
where
    E: Environment,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("store", &self.store)
            .field("capabilities", &self.capabilities)
            .field("advertise", &self.advertise)
            .field("max_form_bytes", &self.max_form_bytes)
            .finish()
    }
}

/// Content type for an inline preview.
///
/// Uploaded files share the UI's origin, so only passive formats are named;
/// anything that could run script (HTML, SVG, XML, JS) is sent as opaque
/// bytes.
fn inline_content_type(name: &str) -> String {
    let guess = mime_guess::from_path(name).first_or_octet_stream();
    let essence = guess.essence_str();
    let passive = matches!(essence, "application/pdf" | "text/plain")
        || (essence.starts_with("image/") && essence != "image/svg+xml");
    if passive { essence.to_string() } else { OCTET_STREAM.to_string() }
}

/// Validate `addFile` parameters from the request head alone.
fn upload_params(req: &Request) -> Result<(&str, usize), RetCode> {
    let name = req.query_param("name").unwrap_or_default();
    let size = req.query_param("size").and_then(parse_upload_size);
    let Some(size) = size.filter(|_| !name.is_empty()) else {
        return Err(RetCode::MissingParameter);
    };

    // Body cannot reach the declared size: reject before allocating
    if req.content_length().ok().flatten().is_some_and(|declared| declared < size as u64) {
        return Err(RetCode::Truncated);
    }
    Ok((name, size))
}

/// Parse a declared upload size: decimal, `1..=MAX_UPLOAD_BYTES`.
fn parse_upload_size(value: &str) -> Option<usize> {
    value
        .parse::<u64>()
        .ok()
        .filter(|n| (1..=MAX_UPLOAD_BYTES).contains(n))
        .and_then(|n| usize::try_from(n).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_types_are_passive_only() {
        assert_eq!(inline_content_type("doc.pdf"), "application/pdf");
        assert_eq!(inline_content_type("notes.txt"), "text/plain");
        assert_eq!(inline_content_type("photo.JPG"), "image/jpeg");
        assert_eq!(inline_content_type("shot.png"), "image/png");
        for active in ["evil.html", "evil.htm", "logo.svg", "feed.xml", "app.js", "noext"] {
            assert_eq!(inline_content_type(active), OCTET_STREAM, "{active}");
        }
    }

    #[test]
    fn upload_size_bounds() {
        assert_eq!(parse_upload_size("1"), Some(1));
        assert_eq!(parse_upload_size("2147483647"), Some(2_147_483_647));
        assert_eq!(parse_upload_size("0"), None);
        assert_eq!(parse_upload_size("2147483648"), None);
        assert_eq!(parse_upload_size("-5"), None);
        assert_eq!(parse_upload_size("12abc"), None);
        assert_eq!(parse_upload_size(""), None);
    }
}
