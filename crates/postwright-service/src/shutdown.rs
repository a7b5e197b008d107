use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};

use http::{Request, Response, StatusCode};
use http_body::Body;
use pin_project::pin_project;
use tokio::sync::Notify;
use tower::{Layer, Service};

struct Inner {
    is_shutting_down: AtomicBool,
    in_flight_count: AtomicUsize,
    started: Notify,
    drained: Notify,
}

/// Shared shutdown flag plus a count of in-flight work (HTTP requests and
/// image jobs).
#[derive(Clone)]
pub struct ShutdownState {
    inner: Arc<Inner>,
}

impl Default for ShutdownState {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                is_shutting_down: AtomicBool::new(false),
                in_flight_count: AtomicUsize::new(0),
                started: Notify::new(),
                drained: Notify::new(),
            }),
        }
    }

    /// Signal that shutdown has started
    pub fn start_shutdown(&self) {
        self.inner.is_shutting_down.store(true, Ordering::SeqCst);
        self.inner.started.notify_waiters();
        self.inner.drained.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.is_shutting_down.load(Ordering::SeqCst)
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight_count.load(Ordering::SeqCst)
    }

    /// Registers a unit of work; it counts as in flight until the guard drops.
    pub fn track(&self) -> InFlightGuard {
        self.inner.in_flight_count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            state: self.clone(),
        }
    }

    /// Resolves once shutdown has started.
    pub async fn cancelled(&self) {
        let notified = self.inner.started.notified();
        if self.is_shutting_down() {
            return;
        }
        notified.await;
    }

    /// Resolves once shutdown has started and no tracked work remains.
    pub fn completed(&self) -> impl Future<Output = ()> + Send + 'static {
        let state = self.clone();
        async move {
            loop {
                let notified = state.inner.drained.notified();
                if state.is_shutting_down() && state.in_flight_count() == 0 {
                    return;
                }
                notified.await;
            }
        }
    }
}

/// Decrements the in-flight count when dropped, including when the tracked
/// future is cancelled by a timeout.
pub struct InFlightGuard {
    state: ShutdownState,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let previous = self
            .state
            .inner
            .in_flight_count
            .fetch_sub(1, Ordering::SeqCst);
        if previous == 1 {
            self.state.inner.drained.notify_waiters();
        }
    }
}

/// Tower layer that answers 503 once shutdown has begun and tracks the
/// requests it lets through.
#[derive(Clone)]
pub struct GracefulShutdownLayer {
    state: ShutdownState,
}

impl GracefulShutdownLayer {
    pub fn new(state: ShutdownState) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for GracefulShutdownLayer {
    type Service = GracefulShutdownService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GracefulShutdownService {
            inner,
            state: self.state.clone(),
        }
    }
}

#[derive(Clone)]
pub struct GracefulShutdownService<S> {
    inner: S,
    state: ShutdownState,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for GracefulShutdownService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    ResBody: Body + Default,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = GracefulShutdownFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        if self.state.is_shutting_down() {
            return GracefulShutdownFuture {
                kind: FutureKind::Rejected,
                _guard: None,
            };
        }

        GracefulShutdownFuture {
            _guard: Some(self.state.track()),
            kind: FutureKind::Inner(self.inner.call(req)),
        }
    }
}

#[pin_project]
pub struct GracefulShutdownFuture<F> {
    #[pin]
    kind: FutureKind<F>,
    _guard: Option<InFlightGuard>,
}

#[pin_project(project = FutureKindProj)]
enum FutureKind<F> {
    Inner(#[pin] F),
    Rejected,
}

impl<F, B, E> Future for GracefulShutdownFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
    B: Body + Default,
{
    type Output = Result<Response<B>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project().kind.project() {
            FutureKindProj::Inner(fut) => fut.poll(cx),
            FutureKindProj::Rejected => {
                let mut response = Response::new(B::default());
                *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
                Poll::Ready(Ok(response))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::Empty;
    use std::time::Duration;
    use tower::{ServiceBuilder, ServiceExt};

    #[derive(Clone)]
    struct SlowService;

    impl Service<Request<Empty<Bytes>>> for SlowService {
        type Response = Response<Empty<Bytes>>;
        type Error = std::convert::Infallible;
        type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Request<Empty<Bytes>>) -> Self::Future {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(Response::new(Empty::new()))
            })
        }
    }

    fn request() -> Request<Empty<Bytes>> {
        Request::builder().body(Empty::new()).unwrap()
    }

    #[tokio::test]
    async fn test_requests_pass_and_are_untracked_after_completion() {
        let state = ShutdownState::new();
        let service = ServiceBuilder::new()
            .layer(GracefulShutdownLayer::new(state.clone()))
            .service(SlowService);

        let response = service.oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_rejects_new_requests_during_shutdown() {
        let state = ShutdownState::new();
        let service = ServiceBuilder::new()
            .layer(GracefulShutdownLayer::new(state.clone()))
            .service(SlowService);

        state.start_shutdown();

        let response = service.oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(state.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_timed_out_request_is_released() {
        let state = ShutdownState::new();
        let service = ServiceBuilder::new()
            .layer(GracefulShutdownLayer::new(state.clone()))
            .service(SlowService);

        let result =
            tokio::time::timeout(Duration::from_millis(1), service.oneshot(request())).await;
        assert!(result.is_err());
        assert_eq!(state.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_completed_waits_for_tracked_work() {
        let state = ShutdownState::new();
        let guard = state.track();
        let completed = tokio::spawn(state.completed());

        state.start_shutdown();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!completed.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), completed)
            .await
            .expect("completion should resolve once work drains")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_start() {
        let state = ShutdownState::new();
        let waiter = tokio::spawn({
            let state = state.clone();
            async move { state.cancelled().await }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        state.start_shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();

        // Already shut down: resolves immediately.
        state.cancelled().await;
    }
}
