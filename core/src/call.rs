//! Cold, cancelable asynchronous results.
//!
//! # Design
//! A `Call<T>` is a recipe, not a running operation. Every `observe` builds a
//! fresh future from the recipe, spawns it on the client's runtime, and
//! schedules the terminal callbacks on the delivery context. Nothing is
//! shared between two subscriptions of the same call.
//!
//! Operators (`retry`, `then`, `zip`, `all`, `cancel_when`) compose recipes,
//! so a composed call still dispatches from scratch on every subscription and
//! keeps the one-terminal-signal contract.
//!
//! A subscription owns its callbacks behind a mutex. Whoever takes them first
//! (the completed task or `Cancelable::cancel`) decides the terminal signal;
//! the loser does nothing.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::delivery::DeliveryContext;
use crate::error::ApiError;

/// Why a recipe stopped without a value.
pub(crate) enum Halt {
    Failed(ApiError),
    Canceled,
}

type Source<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, Halt>> + Send + Sync>;

/// Background runtime plus delivery context shared by all calls of a client.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    pub(crate) runtime: Handle,
    pub(crate) delivery: Arc<dyn DeliveryContext>,
}

/// A lazily dispatched request yielding one `T` or one `ApiError`.
pub struct Call<T> {
    source: Source<T>,
    dispatcher: Dispatcher,
}

impl<T> Clone for Call<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<T> fmt::Debug for Call<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Call<T> {
    fn from_source<F>(dispatcher: Dispatcher, source: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<T, Halt>> + Send + Sync + 'static,
    {
        Self {
            source: Arc::new(source),
            dispatcher,
        }
    }

    pub(crate) fn from_fn<F, Fut>(dispatcher: Dispatcher, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        Self::from_source(dispatcher, move || f().map(|r| r.map_err(Halt::Failed)).boxed())
    }

    /// Start a new, independent dispatch.
    ///
    /// `on_start` runs before this returns; every other callback runs on the
    /// delivery context.
    pub fn observe(&self, observer: Observer<T>) -> Cancelable {
        let Observer {
            on_start,
            on_success,
            on_error,
            on_end,
        } = observer;

        let id = Uuid::new_v4();
        if let Some(on_start) = on_start {
            on_start();
        }

        let subscription = Arc::new(Subscription {
            id,
            callbacks: Mutex::new(Some(Callbacks {
                on_success,
                on_error,
                on_end,
            })),
            task: Mutex::new(None),
            delivery: self.dispatcher.delivery.clone(),
        });

        tracing::trace!(subscription = %id, "subscribed");
        let future = (self.source)();
        let settled = subscription.clone();
        let handle = self.dispatcher.runtime.spawn(async move {
            let outcome = future.await;
            let delivery = settled.delivery.clone();
            delivery.schedule(Box::new(move || settled.settle(outcome)));
        });
        subscription.attach(handle.abort_handle());

        Cancelable::new(subscription)
    }

    /// Subscribe and wait for the delivered outcome.
    ///
    /// Dropping the returned future cancels the subscription.
    pub async fn outcome(&self) -> Outcome<T> {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let send = move |outcome: Outcome<T>| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(outcome);
            }
        };
        let (on_success, on_error, on_end) = (send.clone(), send.clone(), send);

        let _guard = CancelOnDrop(self.observe(
            Observer::new()
                .on_success(move |value| on_success(Outcome::Success(value)))
                .on_error(move |err| on_error(Outcome::Failure(err)))
                .on_end(move || on_end(Outcome::Canceled)),
        ));
        rx.await.unwrap_or(Outcome::Canceled)
    }

    /// On failure, dispatch again after `delay`, at most `max_retry_count`
    /// extra times. The last error is propagated unchanged.
    pub fn retry(self, delay: Duration, max_retry_count: u32) -> Call<T> {
        self.retry_with(max_retry_count, move |_| delay)
    }

    /// Like `retry`, waiting `base` raised to the attempt number (in seconds)
    /// before attempt `n`.
    pub fn retry_exponential(self, base: Duration, max_retry_count: u32) -> Call<T> {
        self.retry_with(max_retry_count, move |attempt| exponential_delay(base, attempt))
    }

    fn retry_with<B>(self, max_retry_count: u32, backoff: B) -> Call<T>
    where
        B: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        let source = self.source;
        let backoff = Arc::new(backoff);
        Call::from_source(self.dispatcher, move || {
            let source = source.clone();
            let backoff = backoff.clone();
            async move {
                let mut attempt = 0;
                loop {
                    match source().await {
                        Err(Halt::Failed(err)) if attempt < max_retry_count => {
                            attempt += 1;
                            let delay = backoff(attempt);
                            tracing::debug!(attempt, ?delay, error = %err, "retrying");
                            tokio::time::sleep(delay).await;
                        }
                        other => return other,
                    }
                }
            }
            .boxed()
        })
    }

    /// Dispatch the call produced by `next` once this one succeeds.
    pub fn then<U, F>(self, next: F) -> Call<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Call<U> + Send + Sync + 'static,
    {
        let source = self.source;
        let next = Arc::new(next);
        Call::from_source(self.dispatcher, move || {
            let source = source.clone();
            let next = next.clone();
            async move {
                let value = source().await?;
                let follow_up = next(value);
                (follow_up.source)().await
            }
            .boxed()
        })
    }

    /// Dispatch every call produced by `next` concurrently once this one
    /// succeeds.
    pub fn then_all<U, F>(self, next: F) -> Call<Vec<U>>
    where
        U: Send + 'static,
        F: Fn(T) -> Vec<Call<U>> + Send + Sync + 'static,
    {
        let source = self.source;
        let next = Arc::new(next);
        Call::from_source(self.dispatcher, move || {
            let source = source.clone();
            let next = next.clone();
            async move {
                let value = source().await?;
                let calls = next(value);
                future::try_join_all(calls.iter().map(|call| (call.source)())).await
            }
            .boxed()
        })
    }

    /// Run both calls concurrently; the first failure cancels the other.
    pub fn zip<U: Send + 'static>(self, other: Call<U>) -> Call<(T, U)> {
        let left = self.source;
        let right = other.source;
        Call::from_source(self.dispatcher, move || {
            future::try_join(left(), right()).boxed()
        })
    }

    /// Run every call concurrently and collect the results in input order.
    ///
    /// The first failure cancels the remaining calls and becomes the error
    /// of the combined call.
    pub(crate) fn join_all(dispatcher: Dispatcher, calls: Vec<Call<T>>) -> Call<Vec<T>> {
        let sources: Arc<Vec<Source<T>>> = Arc::new(calls.into_iter().map(|c| c.source).collect());
        Call::from_source(dispatcher, move || {
            future::try_join_all(sources.iter().map(|source| source())).boxed()
        })
    }

    /// Cancel every subscription of this call once `signal` fires.
    pub fn cancel_when(self, signal: CancelSignal) -> Call<T> {
        let source = self.source;
        Call::from_source(self.dispatcher, move || {
            let future = source();
            let signal = signal.clone();
            async move {
                tokio::select! {
                    biased;
                    _ = signal.fired() => Err(Halt::Canceled),
                    result = future => result,
                }
            }
            .boxed()
        })
    }
}

fn exponential_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    Duration::try_from_secs_f64(base.as_secs_f64().powi(exponent)).unwrap_or(Duration::MAX)
}

/// Terminal state of one subscription, as seen by `Call::outcome`.
#[derive(Debug)]
pub enum Outcome<T> {
    Success(T),
    Failure(ApiError),
    Canceled,
}

impl<T> Outcome<T> {
    /// `None` when the subscription was canceled.
    pub fn into_result(self) -> Option<Result<T, ApiError>> {
        match self {
            Outcome::Success(value) => Some(Ok(value)),
            Outcome::Failure(err) => Some(Err(err)),
            Outcome::Canceled => None,
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Outcome::Canceled)
    }
}

type OnStart = Box<dyn FnOnce() + Send>;
type OnSuccess<T> = Box<dyn FnOnce(T) + Send>;
type OnError = Box<dyn FnOnce(ApiError) + Send>;
type OnEnd = Box<dyn FnOnce() + Send>;

/// Callbacks for one subscription. All are optional.
pub struct Observer<T> {
    on_start: Option<OnStart>,
    on_success: OnSuccess<T>,
    on_error: OnError,
    on_end: OnEnd,
}

impl<T> Observer<T> {
    pub fn new() -> Self {
        Self {
            on_start: None,
            on_success: Box::new(|_| {}),
            on_error: Box::new(|_| {}),
            on_end: Box::new(|| {}),
        }
    }

    pub fn on_start(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_start = Some(Box::new(f));
        self
    }

    pub fn on_success(mut self, f: impl FnOnce(T) + Send + 'static) -> Self {
        self.on_success = Box::new(f);
        self
    }

    pub fn on_error(mut self, f: impl FnOnce(ApiError) + Send + 'static) -> Self {
        self.on_error = Box::new(f);
        self
    }

    /// Runs exactly once, after success, after error, or after cancellation.
    pub fn on_end(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_end = Box::new(f);
        self
    }
}

impl<T> Default for Observer<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct Callbacks<T> {
    on_success: OnSuccess<T>,
    on_error: OnError,
    on_end: OnEnd,
}

struct Subscription<T> {
    id: Uuid,
    callbacks: Mutex<Option<Callbacks<T>>>,
    task: Mutex<Option<AbortHandle>>,
    delivery: Arc<dyn DeliveryContext>,
}

impl<T> Subscription<T> {
    fn attach(&self, handle: AbortHandle) {
        let mut task = self.task.lock();
        if self.callbacks.lock().is_none() {
            handle.abort();
        } else {
            *task = Some(handle);
        }
    }

    /// Runs on the delivery context.
    fn settle(&self, outcome: Result<T, Halt>) {
        let Some(callbacks) = self.callbacks.lock().take() else {
            tracing::trace!(subscription = %self.id, "outcome discarded after cancel");
            return;
        };
        self.task.lock().take();
        match outcome {
            Ok(value) => (callbacks.on_success)(value),
            Err(Halt::Failed(err)) => (callbacks.on_error)(err),
            Err(Halt::Canceled) => {
                tracing::debug!(subscription = %self.id, "canceled by lifetime signal");
            }
        }
        (callbacks.on_end)();
    }
}

/// Something that can be disposed once.
pub trait Disposable: Send + Sync {
    fn dispose(&self);
    fn is_disposed(&self) -> bool;
}

impl<T: Send + 'static> Disposable for Subscription<T> {
    fn dispose(&self) {
        let Some(callbacks) = self.callbacks.lock().take() else {
            return;
        };
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        tracing::debug!(subscription = %self.id, "canceled");
        self.delivery.schedule(Box::new(move || (callbacks.on_end)()));
    }

    fn is_disposed(&self) -> bool {
        self.callbacks.lock().is_none()
    }
}

/// Handle returned by `Call::observe`.
#[derive(Clone)]
pub struct Cancelable {
    inner: Arc<dyn Disposable>,
}

impl Cancelable {
    pub fn new(inner: Arc<dyn Disposable>) -> Self {
        Self { inner }
    }

    /// Stop delivery and abort the dispatch. Idempotent; a no-op once the
    /// subscription has terminated.
    pub fn cancel(&self) {
        self.inner.dispose();
    }

    /// True after `cancel` or once a terminal signal was delivered.
    pub fn is_canceled(&self) -> bool {
        self.inner.is_disposed()
    }
}

impl fmt::Debug for Cancelable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancelable")
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

struct CancelOnDrop(Cancelable);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Owner-held guard; its signal fires when the guard is dropped or ended.
#[derive(Debug)]
pub struct Lifetime {
    tx: watch::Sender<bool>,
}

impl Lifetime {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Fire the signal now.
    pub fn end(self) {}
}

impl Default for Lifetime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Lifetime {
    fn drop(&mut self) {
        self.tx.send_replace(true);
    }
}

/// Completion signal of a `Lifetime`.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_fired(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once the owning `Lifetime` has ended.
    pub async fn fired(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|fired| *fired).await;
    }
}
