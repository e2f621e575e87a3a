use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

use castray_common::{ClusterSnapshot, FeedError, PushMessage, SnapshotSource};

use crate::fetch::try_fetch;
use crate::normalize::Normalizer;
use crate::push::{apply_push, PushOutcome};
use crate::sampler::UsageSampler;
use crate::stats::build_snapshot;
use crate::synthetic::synthetic_snapshot;
use crate::transport::{ClusterTransport, PushStream};
use crate::util::now_ms;

/// Pushes remembered while fetches are in flight. Older entries are dropped
/// past this bound.
const MAX_JOURNAL: usize = 256;
const ERROR_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub refresh_interval: Duration,
    pub fetch_timeout: Duration,
    /// Serve the last live node list as `STALE` for this long after the feed
    /// starts failing. `None` falls back to simulated data immediately.
    pub stale_after: Option<Duration>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(10),
            stale_after: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct FeedStats {
    refreshes_total: AtomicU64,
    live_total: AtomicU64,
    simulated_total: AtomicU64,
    stale_total: AtomicU64,
    pushes_applied_total: AtomicU64,
    pushes_unmatched_total: AtomicU64,
    pushes_ignored_total: AtomicU64,
    pushes_malformed_total: AtomicU64,
    pushes_replayed_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedStatsSnapshot {
    pub refreshes_total: u64,
    pub live_total: u64,
    pub simulated_total: u64,
    pub stale_total: u64,
    pub pushes_applied_total: u64,
    pub pushes_unmatched_total: u64,
    pub pushes_ignored_total: u64,
    pub pushes_malformed_total: u64,
    pub pushes_replayed_total: u64,
}

impl FeedStats {
    fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_source(&self, source: SnapshotSource) {
        Self::inc(&self.refreshes_total);
        match source {
            SnapshotSource::Live => Self::inc(&self.live_total),
            SnapshotSource::Simulated => Self::inc(&self.simulated_total),
            SnapshotSource::Stale => Self::inc(&self.stale_total),
        }
    }

    pub fn snapshot(&self) -> FeedStatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        FeedStatsSnapshot {
            refreshes_total: get(&self.refreshes_total),
            live_total: get(&self.live_total),
            simulated_total: get(&self.simulated_total),
            stale_total: get(&self.stale_total),
            pushes_applied_total: get(&self.pushes_applied_total),
            pushes_unmatched_total: get(&self.pushes_unmatched_total),
            pushes_ignored_total: get(&self.pushes_ignored_total),
            pushes_malformed_total: get(&self.pushes_malformed_total),
            pushes_replayed_total: get(&self.pushes_replayed_total),
        }
    }
}

/// Write-side bookkeeping. Every publication happens with this locked, so
/// subscribers observe snapshots in completion order.
#[derive(Debug, Default)]
struct Slot {
    push_seq: u64,
    /// Pushes that arrived while at least one fetch was running.
    journal: VecDeque<(u64, PushMessage)>,
    /// Fetch token to the push sequence number current when it started.
    inflight: BTreeMap<u64, u64>,
    next_token: u64,
    last_live: Option<(Instant, Arc<ClusterSnapshot>)>,
}

impl Slot {
    fn begin_fetch(&mut self) -> (u64, u64) {
        let token = self.next_token;
        self.next_token += 1;
        self.inflight.insert(token, self.push_seq);
        (token, self.push_seq)
    }

    fn finish_fetch(&mut self, token: u64) {
        self.inflight.remove(&token);
        match self.inflight.values().min().copied() {
            Some(oldest) => self.journal.retain(|(seq, _)| *seq > oldest),
            None => self.journal.clear(),
        }
    }

    fn record_push(&mut self, msg: PushMessage) {
        self.push_seq += 1;
        if self.inflight.is_empty() {
            return;
        }
        self.journal.push_back((self.push_seq, msg));
        if self.journal.len() > MAX_JOURNAL {
            self.journal.pop_front();
            tracing::warn!(limit = MAX_JOURNAL, "push journal full, dropping oldest entry");
        }
    }
}

/// Owns the published snapshot and keeps it fresh.
pub struct FeedEngine {
    transport: Arc<dyn ClusterTransport>,
    normalizer: Normalizer,
    config: FeedConfig,
    slot: Mutex<Slot>,
    tx: watch::Sender<Arc<ClusterSnapshot>>,
    errors: broadcast::Sender<FeedError>,
    stats: FeedStats,
}

impl std::fmt::Debug for FeedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedEngine")
            .field("transport", &self.transport.describe())
            .field("config", &self.config)
            .finish()
    }
}

impl FeedEngine {
    /// Run the first fetch and seed the snapshot slot with its result.
    pub async fn connect(
        transport: Arc<dyn ClusterTransport>,
        config: FeedConfig,
        sampler: Arc<dyn UsageSampler>,
    ) -> Arc<Self> {
        // Nobody can subscribe before the first refresh below replaces this.
        let placeholder = build_snapshot(Vec::new(), SnapshotSource::Simulated, None, None, now_ms());
        let (initial, _) = watch::channel(Arc::new(placeholder));
        let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
        let engine = Arc::new(Self {
            transport,
            normalizer: Normalizer::new(sampler),
            config,
            slot: Mutex::new(Slot::default()),
            tx: initial,
            errors,
            stats: FeedStats::default(),
        });
        let first = engine.refresh().await;
        tracing::info!(
            backend = %engine.transport.describe(),
            source = ?first.source,
            nodes = first.nodes.len(),
            "cluster feed connected"
        );
        engine
    }

    /// Fetch once and publish the result.
    ///
    /// Pushes applied while the fetch was running are replayed onto its
    /// result in arrival order before it is published.
    pub async fn refresh(&self) -> Arc<ClusterSnapshot> {
        let (token, started_at_seq) = self.slot.lock().await.begin_fetch();

        let result = try_fetch(
            self.transport.as_ref(),
            &self.normalizer,
            self.config.fetch_timeout,
        )
        .await;

        let mut slot = self.slot.lock().await;
        let now = now_ms();
        let mut snapshot = self.settle(result, &slot, now);

        for (seq, msg) in slot.journal.iter() {
            if *seq <= started_at_seq {
                continue;
            }
            if let PushOutcome::Updated(next) = apply_push(&snapshot, msg, now) {
                snapshot = next;
                FeedStats::inc(&self.stats.pushes_replayed_total);
            }
        }
        slot.finish_fetch(token);

        self.stats.record_source(snapshot.source);
        let snapshot = Arc::new(snapshot);
        if snapshot.is_live() {
            slot.last_live = Some((Instant::now(), Arc::clone(&snapshot)));
        }
        self.tx.send_replace(Arc::clone(&snapshot));
        snapshot
    }

    /// Turn a fetch outcome into the snapshot to publish.
    fn settle(
        &self,
        result: Result<ClusterSnapshot, FeedError>,
        slot: &Slot,
        now: u64,
    ) -> ClusterSnapshot {
        let err = match result {
            Ok(snapshot) => return snapshot,
            Err(e) => e,
        };
        let _ = self.errors.send(err.clone());

        if let (Some(window), Some((at, last))) = (self.config.stale_after, &slot.last_live) {
            let age = at.elapsed();
            if age < window {
                tracing::warn!(
                    error = %err,
                    age_ms = age.as_millis() as u64,
                    "cluster feed unavailable, serving last live data as stale"
                );
                return build_snapshot(
                    last.nodes.clone(),
                    SnapshotSource::Stale,
                    last.backend_connected,
                    Some(err),
                    now,
                );
            }
        }

        tracing::warn!(
            backend = %self.transport.describe(),
            kind = err.kind(),
            error = %err,
            "cluster feed unavailable, using simulated data"
        );
        synthetic_snapshot(&self.normalizer, Some(err), now)
    }

    /// Apply one raw push message.
    ///
    /// Returns the published snapshot when the message was applied, the
    /// current snapshot when it named an unknown node, and `None` when it was
    /// ignored or rejected.
    pub async fn handle_push(&self, raw: &str) -> Option<Arc<ClusterSnapshot>> {
        self.try_handle_push(raw).await.ok().flatten()
    }

    /// Like [`FeedEngine::handle_push`], but reports rejected messages.
    pub async fn try_handle_push(
        &self,
        raw: &str,
    ) -> Result<Option<Arc<ClusterSnapshot>>, FeedError> {
        let msg = match PushMessage::parse(raw) {
            Ok(msg) => msg,
            Err(e) => {
                self.reject(e.clone());
                return Err(e);
            }
        };

        let mut slot = self.slot.lock().await;
        let current = self.current();
        match apply_push(&current, &msg, now_ms()) {
            PushOutcome::Updated(next) => {
                FeedStats::inc(&self.stats.pushes_applied_total);
                slot.record_push(msg);
                let next = Arc::new(next);
                self.tx.send_replace(Arc::clone(&next));
                Ok(Some(next))
            }
            PushOutcome::Unchanged => {
                FeedStats::inc(&self.stats.pushes_unmatched_total);
                // The node may exist in a fetch that has not landed yet.
                slot.record_push(msg);
                Ok(Some(current))
            }
            PushOutcome::Ignored => {
                FeedStats::inc(&self.stats.pushes_ignored_total);
                Ok(None)
            }
            PushOutcome::Rejected(e) => {
                self.reject(e.clone());
                Err(e)
            }
        }
    }

    fn reject(&self, err: FeedError) {
        FeedStats::inc(&self.stats.pushes_malformed_total);
        tracing::warn!(error = %err, "dropping push message");
        let _ = self.errors.send(err);
    }

    pub fn current(&self) -> Arc<ClusterSnapshot> {
        Arc::clone(&self.tx.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ClusterSnapshot>> {
        self.tx.subscribe()
    }

    pub fn updates(&self) -> WatchStream<Arc<ClusterSnapshot>> {
        WatchStream::new(self.subscribe())
    }

    pub fn errors(&self) -> broadcast::Receiver<FeedError> {
        self.errors.subscribe()
    }

    pub fn stats(&self) -> FeedStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Start the periodic refresh loop and, when given, the push listener.
    pub fn spawn(self: &Arc<Self>, push: Option<PushStream>) -> RefreshHandle {
        let cancel = CancellationToken::new();
        let mut tasks = Vec::with_capacity(2);

        tasks.push(tokio::spawn(
            Arc::clone(self).refresh_loop(cancel.child_token()),
        ));
        if let Some(stream) = push {
            tasks.push(tokio::spawn(
                Arc::clone(self).push_loop(stream, cancel.child_token()),
            ));
        }

        RefreshHandle { cancel, tasks }
    }

    async fn refresh_loop(self: Arc<Self>, cancel: CancellationToken) {
        let period = self.config.refresh_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = self.refresh().await;
                    tracing::debug!(
                        source = ?snapshot.source,
                        nodes = snapshot.nodes.len(),
                        "cluster feed refreshed"
                    );
                }
            }
        }
        tracing::debug!("refresh loop stopped");
    }

    async fn push_loop(self: Arc<Self>, mut stream: PushStream, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = stream.next() => match next {
                    Some(raw) => {
                        self.handle_push(&raw).await;
                    }
                    None => {
                        tracing::info!("push stream ended");
                        break;
                    }
                },
            }
        }
        tracing::debug!("push listener stopped");
    }
}

/// Running background tasks of a [`FeedEngine`]. Dropping the handle cancels
/// them without waiting.
#[derive(Debug)]
pub struct RefreshHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl RefreshHandle {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel and wait for both loops to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "feed task ended abnormally");
            }
        }
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
