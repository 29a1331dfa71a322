//! Per-destination delayed action queues.
//!
//! Each registered destination gets a lane: a queue of action batches and a
//! drain task that pops one batch per tick and dispatches it. Pushing a
//! batch replaces whatever is still queued for that destination, so a venue
//! only ever receives the most recent schedule.
//!
//! Every action of a batch runs as its own task on a shared
//! [`TaskTracker`]. Venue errors are logged per action and never reach the
//! drain loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rekon_scheduler::{Action, ActionKind, DestinationId};
use rekon_telemetry::Metrics;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::error::{ExecutorError, ExecutorResult};
use crate::exchange::DynExchange;

/// Drain interval used when none is configured.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// Queue and venue of one destination.
struct Lane {
    destination: DestinationId,
    exchange: DynExchange,
    delay: Duration,
    queue: Mutex<VecDeque<Vec<Action>>>,
    closed: AtomicBool,
}

impl Lane {
    fn pop(&self) -> Option<Vec<Action>> {
        let mut queue = self.queue.lock();
        let batch = queue.pop_front();
        Metrics::queue_depth(self.destination.as_str(), queue.len());
        batch
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let dropped: usize = self.queue.lock().drain(..).map(|b| b.len()).sum();
        if dropped > 0 {
            debug!(destination = %self.destination, dropped, "Dropped queued actions on close");
        }
        Metrics::queue_depth(self.destination.as_str(), 0);
    }
}

/// Serializes and rate-limits action submission per destination.
pub struct ActionExecutor {
    lanes: DashMap<DestinationId, Arc<Lane>>,
    tracker: TaskTracker,
    drains: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionExecutor {
    pub fn new() -> Self {
        Self {
            lanes: DashMap::new(),
            tracker: TaskTracker::new(),
            drains: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Register a destination with its venue and drain delay.
    ///
    /// A destination registered after [`start`](Self::start) gets its drain
    /// task immediately.
    pub fn register(
        &self,
        destination: DestinationId,
        exchange: DynExchange,
        delay: Option<Duration>,
    ) -> ExecutorResult<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ExecutorError::Stopped);
        }
        let Entry::Vacant(slot) = self.lanes.entry(destination.clone()) else {
            return Err(ExecutorError::DuplicateDestination(destination));
        };

        let lane = Arc::new(Lane {
            destination: destination.clone(),
            exchange,
            delay: delay.unwrap_or(DEFAULT_DELAY),
            queue: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
        });
        info!(%destination, delay_ms = lane.delay.as_millis() as u64, "Registered destination");

        slot.insert(lane.clone());
        if self.started.load(Ordering::SeqCst) {
            self.spawn_drain(lane);
        }
        Ok(())
    }

    pub fn destinations(&self) -> Vec<DestinationId> {
        self.lanes.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Spawn one drain task per registered destination.
    pub fn start(&self) -> ExecutorResult<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ExecutorError::Stopped);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ExecutorError::AlreadyStarted);
        }
        let lanes: Vec<Arc<Lane>> = self.lanes.iter().map(|e| e.value().clone()).collect();
        for lane in lanes {
            self.spawn_drain(lane);
        }
        info!(lanes = self.lanes.len(), "Action executor started");
        Ok(())
    }

    fn spawn_drain(&self, lane: Arc<Lane>) {
        let tracker = self.tracker.clone();
        let handle = tokio::spawn(drain(lane, tracker));
        self.drains.lock().push(handle);
    }

    /// Queue a batch for its destination, discarding any batch still
    /// waiting there. Empty batches are ignored.
    ///
    /// Returns the number of discarded actions.
    pub fn push(&self, actions: Vec<Action>) -> ExecutorResult<usize> {
        let Some(first) = actions.first() else {
            return Ok(0);
        };
        let destination = first.destination.clone();

        let Some(lane) = self.lanes.get(&destination).map(|e| e.value().clone()) else {
            error!(%destination, actions = actions.len(), "Push to unknown destination");
            return Err(ExecutorError::UnknownDestination(destination));
        };
        if lane.closed.load(Ordering::SeqCst) {
            return Err(ExecutorError::Stopped);
        }

        let mut queue = lane.queue.lock();
        let discarded: usize = queue.drain(..).map(|batch| batch.len()).sum();
        if discarded > 0 {
            debug!(%destination, discarded, "Discarded stale actions");
            Metrics::actions_discarded(destination.as_str(), discarded);
        }
        queue.push_back(actions);
        Metrics::queue_depth(destination.as_str(), queue.len());
        Ok(discarded)
    }

    /// Number of batches waiting for a destination.
    pub fn pending(&self, destination: &DestinationId) -> usize {
        self.lanes
            .get(destination)
            .map(|lane| lane.queue.lock().len())
            .unwrap_or(0)
    }

    /// Cancel every drain task and close every queue. Actions already
    /// dispatched keep running.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        for handle in self.drains.lock().drain(..) {
            handle.abort();
        }
        for lane in self.lanes.iter() {
            lane.value().close();
        }
        self.tracker.close();
        info!("Action executor stopped");
    }

    /// Stop, then wait for in-flight actions to finish.
    pub async fn shutdown(&self) {
        self.stop();
        self.tracker.wait().await;
    }

    /// Actions currently running against a venue.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }
}

async fn drain(lane: Arc<Lane>, tracker: TaskTracker) {
    let start = tokio::time::Instant::now() + lane.delay;
    let mut ticker = tokio::time::interval_at(start, lane.delay);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if lane.closed.load(Ordering::SeqCst) {
            break;
        }
        let Some(batch) = lane.pop() else {
            continue;
        };

        debug!(destination = %lane.destination, actions = batch.len(), "Dispatching batch");
        for action in batch {
            tracker.spawn(execute(lane.destination.clone(), lane.exchange.clone(), action));
        }
    }
}

/// Run one action against its venue. Failures are logged, never returned.
async fn execute(destination: DestinationId, exchange: DynExchange, action: Action) {
    let kind = action.kind_label();
    let started = Instant::now();
    Metrics::action_dispatched(destination.as_str(), kind);

    match action.kind {
        ActionKind::OrderCreate { order } => match exchange.create_order(order.clone()).await {
            Ok(response) if response.is_success() => {
                debug!(%destination, %order, id = ?response.id, "Order created");
            }
            Ok(response) => {
                warn!(%destination, %order, status = response.status, "Order create rejected");
                Metrics::action_failed(destination.as_str(), kind, "status");
            }
            Err(e) => {
                warn!(%destination, %order, error = %e, "Order create failed");
                Metrics::action_failed(destination.as_str(), kind, "error");
            }
        },
        ActionKind::OrderStop { id, order } => match exchange.stop_order(id.clone()).await {
            Ok(()) => {
                debug!(%destination, %id, %order, "Order stopped");
            }
            Err(e) => {
                warn!(%destination, %id, error = %e, "Order stop failed");
                Metrics::action_failed(destination.as_str(), kind, "error");
            }
        },
    }

    Metrics::action_latency(
        destination.as_str(),
        kind,
        started.elapsed().as_secs_f64() * 1000.0,
    );
}
