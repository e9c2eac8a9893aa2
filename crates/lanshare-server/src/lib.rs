//! Lanshare production server.
//!
//! This crate puts the lanshare store on the local network using:
//! - Tokio for the async runtime and TCP
//! - A minimal HTTP/1.1 codec (one request per connection)
//! - System time and cryptographic RNG
//!
//! ## Architecture
//!
//! ```text
//! lanshare-server
//!   ├─ SystemEnv     (production Environment impl)
//!   ├─ http          (request head parsing, response writing)
//!   ├─ Service       (routes /api/* vs static assets)
//!   │   ├─ Dispatcher  (access gate + store operations)
//!   │   └─ Assets      (static directory or embedded UI)
//!   └─ Store         (shared, lock-guarded messages)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod assets;
pub mod dispatcher;
mod error;
pub mod http;
pub mod netinfo;
mod system_env;

use std::{
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

pub use assets::Assets;
pub use dispatcher::Dispatcher;
pub use error::ServerError;
pub use http::{HttpError, Request, Response, Status};
use lanshare_core::{Capabilities, Environment, Store};
pub use netinfo::Advertise;
pub use system_env::SystemEnv;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpListener,
};

/// Unread request bytes discarded after responding, before closing.
const LINGER_DRAIN_BYTES: u64 = 1024 * 1024;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8042;

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:8042")
    pub bind_address: String,
    /// Serve static assets from this directory instead of the embedded UI
    pub static_dir: Option<PathBuf>,
    /// Deadline for reading a request and writing its response
    pub io_timeout: Duration,
    /// Largest accepted request head
    pub max_header_bytes: usize,
    /// Largest accepted `addText` form body
    pub max_form_bytes: usize,
    /// Advertised IPv4 address (discovered when `None`)
    pub advertise_ipv4: Option<Ipv4Addr>,
    /// Advertised IPv6 address (discovered when `None`)
    pub advertise_ipv6: Option<Ipv6Addr>,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("0.0.0.0:{DEFAULT_PORT}"),
            static_dir: None,
            io_timeout: Duration::from_secs(600),
            max_header_bytes: 1024 * 1024,
            max_form_bytes: dispatcher::DEFAULT_MAX_FORM_BYTES,
            advertise_ipv4: None,
            advertise_ipv6: None,
        }
    }
}

impl ServerRuntimeConfig {
    /// Reject limits that would make every request fail.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` naming the offending setting.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.io_timeout.is_zero() {
            return Err(ServerError::Config("io timeout must be non-zero".to_string()));
        }
        // Must at least fit a request line
        if self.max_header_bytes < 64 {
            return Err(ServerError::Config(format!(
                "max header bytes too small: {}",
                self.max_header_bytes
            )));
        }
        if self.max_form_bytes == 0 {
            return Err(ServerError::Config("max form bytes must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Routes a request to the API dispatcher or the static assets.
#[derive(Debug)]
pub struct Service<E>
where
    E: Environment,
{
    dispatcher: Dispatcher<E>,
    assets: Assets,
}

impl<E> Service<E>
where
    E: Environment,
{
    /// Compose a service.
    pub fn new(dispatcher: Dispatcher<E>, assets: Assets) -> Self {
        Self { dispatcher, assets }
    }

    /// The API dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher<E> {
        &self.dispatcher
    }

    /// Whether `req` will read its body, for `Expect: 100-continue`.
    pub fn wants_body(&self, req: &Request) -> bool {
        req.path.starts_with("/api/") && self.dispatcher.wants_body(req)
    }

    /// Handle one request. `body` yields at most the declared body length.
    pub async fn handle<B>(&self, req: &Request, body: &mut B) -> Response
    where
        B: AsyncRead + Unpin,
    {
        if req.path.starts_with("/api/") {
            return self.dispatcher.handle(req, body).await;
        }

        if req.path == "/" {
            if let Some(token) = req.query_param("ak") {
                let level = self.dispatcher.capabilities().classify(Some(token));
                if level.can_remote_access() {
                    tracing::info!(?level, "session cookie issued");
                    return assets::session_redirect(token);
                }
            }
        }

        self.assets.serve(req).await
    }
}

/// Serve a single request on `stream`, then close it.
///
/// Malformed heads are answered with a 4xx status; a peer that disconnects
/// before sending anything is not an error.
pub async fn serve_connection<S, E>(
    stream: S,
    service: &Service<E>,
    max_header_bytes: usize,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    E: Environment,
{
    let (read_half, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    let (response, include_body) = match read_head(&mut reader, max_header_bytes).await {
        Ok((req, body_len)) => {
            if body_len > 0 && req.expects_continue() && service.wants_body(&req) {
                writer.write_all(http::CONTINUE).await?;
                writer.flush().await?;
            }
            let mut body = (&mut reader).take(body_len);
            let response = service.handle(&req, &mut body).await;
            tracing::debug!(
                method = %req.method,
                path = %req.path,
                status = response.status().code(),
                "request served"
            );
            (response, !req.is_head())
        },
        Err(HttpError::Closed) => return Ok(()),
        Err(e) => match e.response() {
            Some(response) => {
                tracing::debug!("rejecting request: {}", e);
                (response, true)
            },
            None => return Err(e.into()),
        },
    };

    response.write_to(&mut writer, include_body).await?;
    writer.shutdown().await?;

    // Closing with unread input makes the kernel reset the connection, which
    // can destroy the response before the peer reads it.
    let mut rest = (&mut reader).take(LINGER_DRAIN_BYTES);
    if let Err(e) = tokio::io::copy(&mut rest, &mut tokio::io::sink()).await {
        tracing::trace!("drain after response failed: {}", e);
    }
    Ok(())
}

async fn read_head<R>(reader: &mut R, max_header_bytes: usize) -> Result<(Request, u64), HttpError>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let req = http::read_request(reader, max_header_bytes).await?;
    if req.has_transfer_encoding() {
        return Err(HttpError::UnsupportedTransferEncoding);
    }
    let body_len = req.content_length()?.unwrap_or(0);
    Ok((req, body_len))
}

/// Production lanshare server.
///
/// Owns the listening socket and the service (store, capability secrets,
/// asset source).
pub struct Server {
    listener: TcpListener,
    service: Arc<Service<SystemEnv>>,
    io_timeout: Duration,
    max_header_bytes: usize,
}

impl Server {
    /// Create and bind a new server with fresh capability secrets.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - A limit in the configuration is unusable
    /// - The static asset directory is configured but missing
    /// - Binding to the address fails
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let assets = Assets::from_config(config.static_dir)?;

        let listener = TcpListener::bind(&config.bind_address)
            .await
            .map_err(|source| ServerError::Bind { addr: config.bind_address.clone(), source })?;
        let port = listener.local_addr()?.port();

        let env = SystemEnv::new();
        let capabilities = Capabilities::generate(&env);
        let store = Arc::new(Store::new(env));
        let advertise = Advertise {
            ipv4: config.advertise_ipv4,
            ipv6: config.advertise_ipv6,
            ..Advertise::discover(port)
        };
        let dispatcher = Dispatcher::new(store, capabilities, advertise, config.max_form_bytes);

        Ok(Self {
            listener,
            service: Arc::new(Service::new(dispatcher, assets)),
            io_timeout: config.io_timeout,
            max_header_bytes: config.max_header_bytes,
        })
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// The capability secrets generated for this process.
    pub fn capabilities(&self) -> &Capabilities {
        self.service.dispatcher().capabilities()
    }

    /// Local URL that opens the UI with manage rights.
    pub fn manage_url(&self) -> String {
        self.service.dispatcher().advertise().manage_url(self.capabilities().manage_token())
    }

    /// The shared message store.
    pub fn store(&self) -> &Arc<Store<SystemEnv>> {
        self.service.dispatcher().store()
    }

    /// Run the server, accepting connections until the task is dropped.
    ///
    /// Each connection runs on its own task under the I/O deadline.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server starting on {}", self.local_addr()?);

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let service = Arc::clone(&self.service);
                    let io_timeout = self.io_timeout;
                    let max_header_bytes = self.max_header_bytes;

                    tokio::spawn(async move {
                        let served = tokio::time::timeout(
                            io_timeout,
                            serve_connection(stream, &*service, max_header_bytes),
                        )
                        .await;
                        match served {
                            Ok(Ok(())) => {},
                            Ok(Err(e)) => tracing::debug!(%peer, "connection error: {}", e),
                            Err(_) => tracing::warn!(%peer, "connection timed out"),
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.listener.local_addr().ok())
            .field("io_timeout", &self.io_timeout)
            .finish_non_exhaustive()
    }
}
