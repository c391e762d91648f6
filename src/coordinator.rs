//! Lazy, single-flight startup of the cache server
//!
//! The coordinator owns the listening socket. The first call to
//! `ensure_started` binds it and hands it to a dedicated server thread with
//! its own runtime, so the server outlives whatever runtime asked for it;
//! every other call, whether it arrives while that bind is still in flight or
//! long after, observes the same outcome. A failed bind is remembered and
//! never retried.

use crate::error::{QueryCacheError, QueryCacheResult};
use crate::handler::{self, RequestHandler, UreqFetcher};
use crate::plugin::QueryCacheOptions;
use axum::Router;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, OnceCell};
use tracing::{debug, error, info};

/// Owns the cache server socket and its one startup attempt
pub struct PortCoordinator {
    host: IpAddr,
    preferred_port: u16,
    app: Router,
    startup: OnceCell<Result<u16, String>>,
    listen_attempts: AtomicUsize,
}

impl PortCoordinator {
    /// Create a coordinator serving the caching request handler
    pub fn new(options: &QueryCacheOptions) -> Self {
        let fetcher = options
            .fetch
            .clone()
            .unwrap_or_else(|| Arc::new(UreqFetcher::new(options.fetch_timeout)));
        let request_handler =
            RequestHandler::new(fetcher, options.calculate_cache_key.clone());

        Self::with_router(options.host, options.port, handler::router(request_handler))
    }

    /// Create a coordinator serving an arbitrary router
    pub fn with_router(host: IpAddr, preferred_port: u16, app: Router) -> Self {
        Self {
            host,
            preferred_port,
            app,
            startup: OnceCell::new(),
            listen_attempts: AtomicUsize::new(0),
        }
    }

    /// Start the server if it is not running yet and return its port
    ///
    /// Callers arriving before the first bind completes wait for it rather
    /// than binding a second socket.
    pub async fn ensure_started(&self) -> QueryCacheResult<u16> {
        let outcome = self.startup.get_or_init(|| self.listen()).await;
        outcome.clone().map_err(QueryCacheError::StartupFailure)
    }

    /// Port of the running server, without starting it
    pub fn port(&self) -> Option<u16> {
        self.startup.get().and_then(|r| r.as_ref().ok().copied())
    }

    /// Whether a startup attempt has completed, successfully or not
    pub fn is_started(&self) -> bool {
        self.startup.initialized()
    }

    async fn listen(&self) -> Result<u16, String> {
        self.listen_attempts.fetch_add(1, Ordering::SeqCst);

        let addr = SocketAddr::new(self.host, self.preferred_port);
        debug!("Binding cache server on {}", addr);

        let listener = std::net::TcpListener::bind(addr)
            .map_err(|e| format!("could not bind {}: {}", addr, e))?;

        let port = listener
            .local_addr()
            .map_err(|e| format!("could not get port: {}", e))?
            .port();
        if port == 0 {
            return Err("could not get port".to_string());
        }
        if self.preferred_port != 0 && port != self.preferred_port {
            return Err(format!(
                "requested port {} but bound {}",
                self.preferred_port, port
            ));
        }
        listener
            .set_nonblocking(true)
            .map_err(|e| format!("could not configure socket: {}", e))?;

        let (ready_tx, ready_rx) = oneshot::channel();
        let app = self.app.clone();
        thread::Builder::new()
            .name(format!("query-cache-{}", port))
            .spawn(move || serve_forever(listener, app, ready_tx))
            .map_err(|e| format!("could not spawn server thread: {}", e))?;

        ready_rx
            .await
            .map_err(|_| "server thread exited before listening".to_string())??;

        info!("Up on port {}.", port);
        Ok(port)
    }
}

/// Body of the server thread: owns a runtime for the life of the process
fn serve_forever(
    listener: std::net::TcpListener,
    app: Router,
    ready: oneshot::Sender<Result<(), String>>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready.send(Err(format!("could not start server runtime: {}", e)));
            return;
        }
    };

    runtime.block_on(async move {
        let listener = match TcpListener::from_std(listener) {
            Ok(listener) => listener,
            Err(e) => {
                let _ = ready.send(Err(format!("could not register socket: {}", e)));
                return;
            }
        };
        let _ = ready.send(Ok(()));

        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Cache server stopped");
        }
    });
}
