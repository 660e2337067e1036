//! Observable query state for the presentation layer.
//!
//! The store owns one [`QueryState`] per [`Slot`]. Each `request_*` call bumps
//! the slot's sequence number and moves it to `Loading` right away; the returned
//! future performs the network call and applies the result only if no newer
//! request was issued for the same slot in the meantime.
//!
//! Listeners are notified in transition order. Notifications are queued per slot
//! and delivered with the slot lock released, so a listener may call back into
//! the store.

use std::{
    collections::VecDeque,
    fmt,
    future::Future,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{
    error::{ErrorKind, LocationError},
    location::LocationProvider,
    model::{CityQuery, Coordinates, CurrentWeather, ForecastList},
    provider::WeatherClient,
};

/// Future returned by the `request_*` operations. It must be awaited or spawned
/// for the request to reach the provider.
pub type RequestFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Where a query's position comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    City,
    Location,
}

/// One of the four independently tracked queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    CurrentByCity,
    ForecastByCity,
    CurrentByLocation,
    ForecastByLocation,
}

#[derive(Debug, PartialEq)]
pub enum QueryState<T> {
    Idle,
    Loading,
    Success(Arc<T>),
    Failure(ErrorKind),
}

impl<T> QueryState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, QueryState::Loading)
    }

    pub fn value(&self) -> Option<&Arc<T>> {
        match self {
            QueryState::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<ErrorKind> {
        match self {
            QueryState::Failure(kind) => Some(*kind),
            _ => None,
        }
    }

    fn from_result(result: Result<T, ErrorKind>) -> Self {
        match result {
            Ok(value) => QueryState::Success(Arc::new(value)),
            Err(kind) => QueryState::Failure(kind),
        }
    }
}

// Manual impls: cloning only clones the `Arc`, so `T: Clone` is not required.
impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        match self {
            QueryState::Idle => QueryState::Idle,
            QueryState::Loading => QueryState::Loading,
            QueryState::Success(value) => QueryState::Success(Arc::clone(value)),
            QueryState::Failure(kind) => QueryState::Failure(*kind),
        }
    }
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        QueryState::Idle
    }
}

/// Handle returned by `subscribe_*`. Delivery stops on [`unsubscribe`](Self::unsubscribe) or drop.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(detach: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self { detach: Some(Box::new(detach)) }
    }

    pub fn unsubscribe(mut self) {
        self.detach_now();
    }

    fn detach_now(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("active", &self.detach.is_some()).finish()
    }
}

type Callback<T> = dyn Fn(&QueryState<T>) + Send + Sync;

struct Listener<T> {
    active: AtomicBool,
    callback: Box<Callback<T>>,
}

/// A state snapshot together with the listeners registered when it was produced.
struct Delivery<T> {
    targets: Vec<Arc<Listener<T>>>,
    state: QueryState<T>,
}

impl<T> Delivery<T> {
    /// A panicking listener is logged and skipped; the others still run.
    fn deliver(self, slot: Slot) {
        for listener in &self.targets {
            if !listener.active.load(Ordering::Acquire) {
                continue;
            }
            let callback = AssertUnwindSafe(|| (listener.callback)(&self.state));
            if panic::catch_unwind(callback).is_err() {
                warn!(?slot, "State listener panicked");
            }
        }
    }
}

struct SlotInner<T> {
    state: QueryState<T>,
    seq: u64,
    listeners: Vec<Arc<Listener<T>>>,
    pending: VecDeque<Delivery<T>>,
    dispatching: bool,
}

struct SlotCell<T> {
    slot: Slot,
    inner: Mutex<SlotInner<T>>,
}

impl<T: Send + Sync + 'static> SlotCell<T> {
    fn new(slot: Slot) -> Arc<Self> {
        Arc::new(Self {
            slot,
            inner: Mutex::new(SlotInner {
                state: QueryState::Idle,
                seq: 0,
                listeners: Vec::new(),
                pending: VecDeque::new(),
                dispatching: false,
            }),
        })
    }

    fn state(&self) -> QueryState<T> {
        self.inner.lock().state.clone()
    }

    /// Start a new request: supersede older ones and enter `Loading`.
    fn begin(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.seq += 1;
        let seq = inner.seq;
        debug!(slot = ?self.slot, seq, "Request issued");
        self.transition(inner, QueryState::Loading);
        seq
    }

    /// Fail a request locally without contacting the provider.
    fn reject(&self, kind: ErrorKind) {
        let mut inner = self.inner.lock();
        inner.seq += 1;
        debug!(slot = ?self.slot, seq = inner.seq, ?kind, "Request rejected before dispatch");
        self.transition(inner, QueryState::Failure(kind));
    }

    /// Apply a completion. Returns `false` when a newer request made it stale.
    fn complete(&self, seq: u64, result: Result<T, ErrorKind>) -> bool {
        let inner = self.inner.lock();
        if seq != inner.seq {
            debug!(slot = ?self.slot, seq, latest = inner.seq, "Discarding stale response");
            return false;
        }
        self.transition(inner, QueryState::from_result(result));
        true
    }

    /// The request's future went away before completing.
    fn abandon(&self, seq: u64) {
        let inner = self.inner.lock();
        if seq != inner.seq {
            return;
        }
        debug!(slot = ?self.slot, seq, "Request dropped before completion");
        self.transition(inner, QueryState::Failure(ErrorKind::Transport));
    }

    fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(&QueryState<T>) + Send + Sync + 'static,
    ) -> Subscription {
        let listener =
            Arc::new(Listener { active: AtomicBool::new(true), callback: Box::new(callback) });

        let mut inner = self.inner.lock();
        inner.listeners.push(Arc::clone(&listener));
        let initial = Delivery { targets: vec![Arc::clone(&listener)], state: inner.state.clone() };
        inner.pending.push_back(initial);
        self.drain(inner);

        let cell: Weak<Self> = Arc::downgrade(self);
        Subscription::new(move || {
            listener.active.store(false, Ordering::Release);
            if let Some(cell) = cell.upgrade() {
                cell.inner.lock().listeners.retain(|l| !Arc::ptr_eq(l, &listener));
            }
        })
    }

    fn transition(&self, mut inner: MutexGuard<'_, SlotInner<T>>, state: QueryState<T>) {
        inner.state = state.clone();
        let targets = inner.listeners.clone();
        inner.pending.push_back(Delivery { targets, state });
        self.drain(inner);
    }

    /// Deliver queued notifications unless another caller is already doing so.
    fn drain(&self, mut inner: MutexGuard<'_, SlotInner<T>>) {
        if inner.dispatching {
            return;
        }
        inner.dispatching = true;
        let slot = self.slot;
        while let Some(delivery) = inner.pending.pop_front() {
            MutexGuard::unlocked(&mut inner, || delivery.deliver(slot));
        }
        inner.dispatching = false;
    }
}

/// Ties a dispatched request to its slot. Dropping it unfinished (the future
/// was dropped, cancelled or panicked) ends the request as `Transport` so the
/// slot never stays `Loading`.
struct InFlight<T: Send + Sync + 'static> {
    cell: Option<Arc<SlotCell<T>>>,
    seq: u64,
}

impl<T: Send + Sync + 'static> InFlight<T> {
    fn finish(&mut self, result: Result<T, ErrorKind>) {
        if let Some(cell) = self.cell.take() {
            cell.complete(self.seq, result);
        }
    }
}

impl<T: Send + Sync + 'static> Drop for InFlight<T> {
    fn drop(&mut self) {
        if let Some(cell) = self.cell.take() {
            cell.abandon(self.seq);
        }
    }
}

/// Holds the latest result of each query and drives the [`WeatherClient`].
///
/// Cloning is cheap; clones share the same slots.
#[derive(Clone)]
pub struct WeatherStateStore {
    client: Arc<dyn WeatherClient>,
    current_by_city: Arc<SlotCell<CurrentWeather>>,
    forecast_by_city: Arc<SlotCell<ForecastList>>,
    current_by_location: Arc<SlotCell<CurrentWeather>>,
    forecast_by_location: Arc<SlotCell<ForecastList>>,
}

impl fmt::Debug for WeatherStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeatherStateStore").field("client", &self.client).finish_non_exhaustive()
    }
}

impl WeatherStateStore {
    pub fn new(client: Arc<dyn WeatherClient>) -> Self {
        Self {
            client,
            current_by_city: SlotCell::new(Slot::CurrentByCity),
            forecast_by_city: SlotCell::new(Slot::ForecastByCity),
            current_by_location: SlotCell::new(Slot::CurrentByLocation),
            forecast_by_location: SlotCell::new(Slot::ForecastByLocation),
        }
    }

    fn current_cell(&self, source: Source) -> &Arc<SlotCell<CurrentWeather>> {
        match source {
            Source::City => &self.current_by_city,
            Source::Location => &self.current_by_location,
        }
    }

    fn forecast_cell(&self, source: Source) -> &Arc<SlotCell<ForecastList>> {
        match source {
            Source::City => &self.forecast_by_city,
            Source::Location => &self.forecast_by_location,
        }
    }

    pub fn current_state(&self, source: Source) -> QueryState<CurrentWeather> {
        self.current_cell(source).state()
    }

    pub fn forecast_state(&self, source: Source) -> QueryState<ForecastList> {
        self.forecast_cell(source).state()
    }

    /// Observe a current-weather slot. The listener first receives the present state.
    pub fn subscribe_current(
        &self,
        source: Source,
        listener: impl Fn(&QueryState<CurrentWeather>) + Send + Sync + 'static,
    ) -> Subscription {
        self.current_cell(source).subscribe(listener)
    }

    /// Observe a forecast slot. The listener first receives the present state.
    pub fn subscribe_forecast(
        &self,
        source: Source,
        listener: impl Fn(&QueryState<ForecastList>) + Send + Sync + 'static,
    ) -> Subscription {
        self.forecast_cell(source).subscribe(listener)
    }

    pub fn request_current_by_city(&self, query: &str) -> RequestFuture {
        let query = match CityQuery::new(query) {
            Ok(query) => query,
            Err(kind) => return Self::rejected(&self.current_by_city, kind),
        };
        let client = Arc::clone(&self.client);
        Self::dispatch(&self.current_by_city, async move {
            client.fetch_current_by_city(&query).await
        })
    }

    pub fn request_forecast_by_city(&self, query: &str) -> RequestFuture {
        let query = match CityQuery::new(query) {
            Ok(query) => query,
            Err(kind) => return Self::rejected(&self.forecast_by_city, kind),
        };
        let client = Arc::clone(&self.client);
        Self::dispatch(&self.forecast_by_city, async move {
            client.fetch_forecast_by_city(&query).await
        })
    }

    pub fn request_current_by_location(&self, coords: Coordinates) -> RequestFuture {
        let client = Arc::clone(&self.client);
        Self::dispatch(&self.current_by_location, async move {
            client.fetch_current_by_coordinates(coords).await
        })
    }

    pub fn request_forecast_by_location(&self, coords: Coordinates) -> RequestFuture {
        let client = Arc::clone(&self.client);
        Self::dispatch(&self.forecast_by_location, async move {
            client.fetch_forecast_by_coordinates(coords).await
        })
    }

    /// Current weather and forecast for a searched city, issued together.
    pub fn search_city(&self, query: &str) -> RequestFuture {
        let current = self.request_current_by_city(query);
        let forecast = self.request_forecast_by_city(query);
        Box::pin(async move {
            tokio::join!(current, forecast);
        })
    }

    /// Query both location slots for the provider's last known position.
    ///
    /// A location failure is returned to the caller and leaves every slot untouched.
    pub async fn refresh_from_location(
        &self,
        provider: &dyn LocationProvider,
    ) -> Result<Coordinates, LocationError> {
        let coords = provider.last_known_location().await?;
        debug!(%coords, "Location fix obtained");

        let current = self.request_current_by_location(coords);
        let forecast = self.request_forecast_by_location(coords);
        tokio::join!(current, forecast);
        Ok(coords)
    }

    fn dispatch<T, F>(cell: &Arc<SlotCell<T>>, fetch: F) -> RequestFuture
    where
        T: Send + Sync + 'static,
        F: Future<Output = Result<T, ErrorKind>> + Send + 'static,
    {
        let in_flight = InFlight { seq: cell.begin(), cell: Some(Arc::clone(cell)) };
        Box::pin(async move {
            let mut in_flight = in_flight;
            let result = fetch.await;
            in_flight.finish(result);
        })
    }

    fn rejected<T: Send + Sync + 'static>(cell: &SlotCell<T>, kind: ErrorKind) -> RequestFuture {
        cell.reject(kind);
        Box::pin(std::future::ready(()))
    }
}
