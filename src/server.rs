// server.rs - Router assembly and the connection accept loop

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use hyper::{body::Incoming, server::conn::http1, Request};
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::time::Instant;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::{RequestBodyTimeoutLayer, TimeoutLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::config::{config, AppConfig, ServerConfig};
use crate::database::UserStore;
use crate::error::ApiError;
use crate::handlers;
use crate::middleware::{handle_panic, make_request_span, REQUEST_ID_HEADER};

/// Full application router using the global config
pub fn app(store: UserStore) -> Router {
    app_with_config(store, config())
}

pub fn app_with_config(store: UserStore, config: &AppConfig) -> Router {
    let routes = Router::new()
        .route("/health", get(handlers::health))
        .merge(user_routes())
        .fallback(route_not_found)
        .with_state(store);

    with_middleware(routes, config)
}

/// Wraps routes in body limits, request ids, access logging, timeouts and
/// panic recovery
pub fn with_middleware(routes: Router, config: &AppConfig) -> Router {
    routes
        .layer(DefaultBodyLimit::max(config.api.max_request_size_bytes))
        // Outermost first: tag, log, then recover closest to the handlers
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(make_request_span)
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
                .layer(TimeoutLayer::new(config.server.write_timeout()))
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(RequestBodyTimeoutLayer::new(config.server.read_timeout())),
        )
}

fn user_routes() -> Router<UserStore> {
    use axum::routing::post;
    use handlers::users;

    Router::new()
        .route(
            "/api/users",
            post(users::user_create).get(users::user_list),
        )
        .route(
            "/api/users/:id",
            get(users::user_show)
                .put(users::user_update)
                .delete(users::user_delete),
        )
}

async fn route_not_found() -> ApiError {
    ApiError::not_found("route not found")
}

/// Accepts connections until `shutdown` resolves.
///
/// Each connection gets its own task. Request headers must arrive within the
/// read timeout of their first byte (of accept, for the first request); the
/// body is bounded by the same timeout in the middleware stack. Keep-alive
/// connections are closed once idle for longer than the idle timeout.
pub async fn serve<F>(listener: TcpListener, app: Router, server: &ServerConfig, shutdown: F)
where
    F: Future<Output = ()>,
{
    let read_timeout = server.read_timeout();
    let idle_timeout = server.idle_timeout();
    tokio::pin!(shutdown);

    loop {
        let (stream, remote_addr) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            },
            _ = &mut shutdown => {
                tracing::info!("shutdown requested, no longer accepting connections");
                return;
            }
        };

        tracing::debug!(%remote_addr, "accepted connection");
        let app = app.clone();
        tokio::spawn(async move {
            serve_connection(stream, app, read_timeout, idle_timeout).await;
            tracing::debug!(%remote_addr, "connection closed");
        });
    }
}

async fn serve_connection(
    stream: TcpStream,
    app: Router,
    read_timeout: Duration,
    idle_timeout: Duration,
) {
    let activity = Arc::new(Activity::new());
    let tracker = activity.clone();
    let service = hyper::service::service_fn(move |request: Request<Incoming>| {
        let in_flight = tracker.begin();
        let app = app.clone();
        async move {
            let response = app.oneshot(request).await;
            drop(in_flight);
            response
        }
    });

    // Read and idle bounds are enforced below, so hyper's own header timer
    // must not close keep-alive connections waiting for their next request.
    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(None)
        .keep_alive(true);

    let io = TrackedStream {
        inner: stream,
        activity: activity.clone(),
    };
    let conn = builder.serve_connection(TokioIo::new(io), service);
    tokio::pin!(conn);

    let mut closing = false;
    loop {
        let deadline = activity
            .next_deadline(read_timeout, idle_timeout)
            .unwrap_or_else(|| Instant::now() + idle_timeout);

        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    tracing::debug!("connection ended with error: {}", e);
                }
                return;
            }
            _ = activity.changed.notified() => {}
            _ = tokio::time::sleep_until(deadline), if !closing => {
                match activity.expired(read_timeout, idle_timeout, Instant::now()) {
                    Some(Expiry::Read) => {
                        tracing::debug!("request not received within read timeout, dropping connection");
                        return;
                    }
                    Some(Expiry::Idle) => {
                        tracing::debug!("closing idle connection");
                        conn.as_mut().graceful_shutdown();
                        closing = true;
                    }
                    None => {}
                }
            }
        }
    }
}

const NOT_READING: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expiry {
    Read,
    Idle,
}

/// Per-connection bookkeeping for the read and idle timeouts.
///
/// A connection is in one of three phases: reading a request (from its first
/// byte, or from accept for the first request), handling one, or idle between
/// requests. Times are milliseconds since `started`.
struct Activity {
    started: Instant,
    in_flight: AtomicUsize,
    last_active_ms: AtomicU64,
    reading_since_ms: AtomicU64,
    changed: Notify,
}

impl Activity {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            in_flight: AtomicUsize::new(0),
            last_active_ms: AtomicU64::new(0),
            // The first request is read from accept onwards
            reading_since_ms: AtomicU64::new(0),
            changed: Notify::new(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn touch(&self) {
        self.last_active_ms.store(self.now_ms(), Ordering::SeqCst);
    }

    fn begin(self: &Arc<Self>) -> InFlight {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.reading_since_ms.store(NOT_READING, Ordering::SeqCst);
        self.touch();
        self.changed.notify_one();
        InFlight(self.clone())
    }

    /// Called when bytes arrive; starts the read clock if the connection was idle
    fn mark_reading(&self) {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            return;
        }
        let started = self
            .reading_since_ms
            .compare_exchange(NOT_READING, self.now_ms(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if started {
            self.changed.notify_one();
        }
    }

    /// None while a request is being handled
    fn next_deadline(&self, read_timeout: Duration, idle_timeout: Duration) -> Option<Instant> {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            return None;
        }
        let reading = self.reading_since_ms.load(Ordering::SeqCst);
        let deadline = if reading == NOT_READING {
            let last = self.last_active_ms.load(Ordering::SeqCst);
            self.started + Duration::from_millis(last) + idle_timeout
        } else {
            self.started + Duration::from_millis(reading) + read_timeout
        };
        Some(deadline)
    }

    fn expired(&self, read_timeout: Duration, idle_timeout: Duration, now: Instant) -> Option<Expiry> {
        let deadline = self.next_deadline(read_timeout, idle_timeout)?;
        if deadline > now {
            return None;
        }
        if self.reading_since_ms.load(Ordering::SeqCst) == NOT_READING {
            Some(Expiry::Idle)
        } else {
            Some(Expiry::Read)
        }
    }
}

struct InFlight(Arc<Activity>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.touch();
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.0.changed.notify_one();
    }
}

/// Socket wrapper reporting inbound bytes to the connection's `Activity`
struct TrackedStream {
    inner: TcpStream,
    activity: Arc<Activity>,
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let result = Pin::new(&mut self.inner).poll_read(cx, buf);
        if matches!(result, Poll::Ready(Ok(()))) && buf.filled().len() > before {
            self.activity.mark_reading();
        }
        result
    }
}

impl AsyncWrite for TrackedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Resolves on Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;

    const READ: Duration = Duration::from_secs(10);
    const IDLE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_first_request_is_bounded_by_read_timeout() {
        let activity = Activity::new();

        let deadline = activity.next_deadline(READ, IDLE).unwrap();
        assert!(deadline <= activity.started + READ + Duration::from_millis(5));
        assert_eq!(activity.expired(READ, IDLE, activity.started + READ), Some(Expiry::Read));
        assert_eq!(activity.expired(READ, IDLE, Instant::now()), None);
    }

    #[tokio::test]
    async fn test_idle_connection_gets_idle_timeout_until_bytes_arrive() {
        let activity = Arc::new(Activity::new());

        let first = activity.begin();
        let second = activity.begin();
        assert!(activity.next_deadline(READ, IDLE).is_none());

        drop(first);
        assert!(activity.next_deadline(READ, IDLE).is_none());

        // Between requests only the idle timeout applies
        drop(second);
        let deadline = activity.next_deadline(READ, IDLE).unwrap();
        assert!(deadline > Instant::now() + Duration::from_secs(59));
        assert!(deadline <= Instant::now() + IDLE);
        assert_eq!(activity.expired(READ, IDLE, Instant::now() + READ + READ), None);
        assert_eq!(activity.expired(READ, IDLE, deadline), Some(Expiry::Idle));

        // The next request's first byte restarts the read clock
        activity.mark_reading();
        let deadline = activity.next_deadline(READ, IDLE).unwrap();
        assert!(deadline <= Instant::now() + READ);
        assert_eq!(activity.expired(READ, IDLE, deadline), Some(Expiry::Read));
    }

    #[tokio::test]
    async fn test_bytes_during_a_request_do_not_start_read_clock() {
        let activity = Arc::new(Activity::new());

        let in_flight = activity.begin();
        activity.mark_reading();
        drop(in_flight);

        assert_eq!(activity.reading_since_ms.load(Ordering::SeqCst), NOT_READING);
    }

    async fn explode() -> &'static str {
        panic!("handler exploded")
    }

    #[tokio::test]
    async fn test_panicking_route_returns_generic_500() {
        let routes = Router::new().route("/explode", get(explode));
        let app = with_middleware(routes, &AppConfig::development());

        let request = axum::http::Request::builder()
            .uri("/explode")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({ "error": "something went wrong" }));
    }
}
