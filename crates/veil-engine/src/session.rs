//! Per-page event loop.
//!
//! The session turns page events and store notifications into
//! reconciliation passes. Load runs a pass at once; DOM mutations and
//! relevant store changes are debounced into one trailing pass. Word
//! statistics are flushed on a timer and on unload.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use veil_core::{StoreName, StoreNotification};
use veil_settings::EngineSettings;
use veil_store::StoreGateway;
use veil_store::preferences::FILTERING_KEYS;

use crate::debounce::Debouncer;
use crate::dom::ElementId;
use crate::reconciler::Reconciler;
use crate::stats::StatsAggregator;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Input from the page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageEvent {
    /// Initial load; runs a pass immediately.
    Loaded,
    /// The document subtree changed.
    Mutated,
    /// The page is going away; flush and stop.
    Unloaded,
    /// The user clicked "unfilter and ignore" on an element.
    UnfilterAndIgnore(ElementId),
    /// The user re-allowed an ignored element.
    Reallow(ElementId),
}

/// Counters returned when a session ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Passes that completed.
    pub passes: u64,
    /// Passes that returned an error.
    pub failed_passes: u64,
}

/// Whether a store change can alter what should be filtered.
fn is_relevant(note: &StoreNotification) -> bool {
    match note.store() {
        StoreName::FilterLists | StoreName::MlSubjects | StoreName::Blacklist => true,
        StoreName::Settings => FILTERING_KEYS.contains(&note.key()),
        StoreName::WordStats => false,
    }
}

/// Drives one page's reconciler.
pub struct FilterSession {
    reconciler: Arc<Reconciler>,
    stats: Arc<StatsAggregator>,
    events: mpsc::Receiver<PageEvent>,
    changes: broadcast::Receiver<StoreNotification>,
    debouncer: Debouncer,
    flush_every: Duration,
    sweep_every: Duration,
    summary: SessionSummary,
}

impl FilterSession {
    /// Create a session and the sender the page uses to feed it.
    pub fn new(
        reconciler: Arc<Reconciler>,
        stats: Arc<StatsAggregator>,
        gateway: &StoreGateway,
        settings: &EngineSettings,
    ) -> (Self, mpsc::Sender<PageEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let session = Self {
            reconciler,
            stats,
            events: rx,
            changes: gateway.subscribe(),
            debouncer: Debouncer::new(Duration::from_millis(settings.debounce_ms)),
            flush_every: Duration::from_millis(settings.stats_flush_interval_ms.max(1)),
            sweep_every: Duration::from_secs(settings.liveness_sweep_secs.max(1)),
            summary: SessionSummary::default(),
        };
        (session, tx)
    }

    /// Run until the page unloads or every sender is dropped.
    pub async fn run(mut self) -> SessionSummary {
        let mut flush = time::interval(self.flush_every);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let _ = flush.tick().await;
        let mut sweep = time::interval(self.sweep_every);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let _ = sweep.tick().await;
        let mut bus_open = true;

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(PageEvent::Loaded) => {
                        self.debouncer.cancel();
                        self.run_pass().await;
                    }
                    Some(PageEvent::Mutated) => self.debouncer.trigger(),
                    Some(PageEvent::UnfilterAndIgnore(el)) => {
                        let _ = self.reconciler.unfilter_and_ignore(el);
                    }
                    Some(PageEvent::Reallow(el)) => {
                        if self.reconciler.reallow(el) {
                            self.debouncer.trigger();
                        }
                    }
                    Some(PageEvent::Unloaded) | None => break,
                },
                note = self.changes.recv(), if bus_open => match note {
                    Ok(note) if is_relevant(&note) => {
                        debug!(store = %note.store(), key = note.key(), "store change, pass scheduled");
                        self.debouncer.trigger();
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "store notifications lagged");
                        self.debouncer.trigger();
                    }
                    Err(RecvError::Closed) => bus_open = false,
                },
                () = self.debouncer.wait() => self.run_pass().await,
                _ = flush.tick() => self.flush_stats().await,
                _ = sweep.tick() => {
                    let _ = self.reconciler.prune_disconnected();
                }
            }
        }

        self.flush_stats().await;
        info!(
            passes = self.summary.passes,
            failed = self.summary.failed_passes,
            "filter session ended"
        );
        self.summary
    }

    async fn run_pass(&mut self) {
        match self.reconciler.reconcile().await {
            Ok(report) => {
                self.summary.passes += 1;
                if report.stale_discarded > 0 {
                    self.debouncer.trigger();
                }
            }
            Err(e) if e.is_budget_exceeded() => {
                self.summary.failed_passes += 1;
                warn!(error = %e, "semantic filtering paused");
            }
            Err(e) => {
                self.summary.failed_passes += 1;
                error!(error = %e, "reconciliation pass failed");
            }
        }
    }

    async fn flush_stats(&self) {
        if let Err(e) = self.stats.flush().await {
            warn!(error = %e, "word stats not flushed");
        }
    }
}

#[cfg(test)]
mod tests {
    use veil_store::{FilterListRepository, WordStatsRepository};

    use super::*;
    use crate::dom::{MemoryDom, PageDom};
    use crate::effects::APPLIED_ACTION_ATTR;
    use crate::site::SelectorSiteSupport;

    const HOST: &str = "news.example";

    struct Harness {
        dom: Arc<MemoryDom>,
        gateway: StoreGateway,
        reconciler: Arc<Reconciler>,
        tx: mpsc::Sender<PageEvent>,
        handle: tokio::task::JoinHandle<SessionSummary>,
    }

    async fn start(words: &[&str]) -> Harness {
        let gateway = StoreGateway::in_memory();
        let words: Vec<String> = words.iter().map(|w| (*w).to_string()).collect();
        let _ = FilterListRepository::new(gateway.clone())
            .create_list("news", &words)
            .await
            .unwrap();
        let dom = Arc::new(MemoryDom::new(HOST));
        let stats = Arc::new(StatsAggregator::new(&gateway));
        let reconciler = Arc::new(Reconciler::new(
            dom.clone(),
            Arc::new(SelectorSiteSupport::new().with_site(HOST, "article")),
            &gateway,
            None,
            Arc::clone(&stats),
        ));
        let (session, tx) = FilterSession::new(
            Arc::clone(&reconciler),
            stats,
            &gateway,
            &EngineSettings::default(),
        );
        let handle = tokio::spawn(session.run());
        Harness {
            dom,
            gateway,
            reconciler,
            tx,
            handle,
        }
    }

    impl Harness {
        async fn stop(self) -> SessionSummary {
            self.tx.send(PageEvent::Unloaded).await.unwrap();
            self.handle.await.unwrap()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn load_runs_one_pass() {
        let h = start(&["trigger"]).await;
        let el = h.dom.append_text(h.dom.root(), "article", "a trigger here");
        h.tx.send(PageEvent::Loaded).await.unwrap();
        let dom = h.dom.clone();
        let summary = h.stop().await;
        assert_eq!(summary.passes, 1);
        assert_eq!(dom.attribute(el, APPLIED_ACTION_ATTR).as_deref(), Some("blur"));
    }

    #[tokio::test(start_paused = true)]
    async fn mutation_bursts_collapse_into_one_pass() {
        let h = start(&["trigger"]).await;
        let el = h.dom.append_text(h.dom.root(), "article", "a trigger here");
        for _ in 0..5 {
            h.tx.send(PageEvent::Mutated).await.unwrap();
            time::sleep(Duration::from_millis(100)).await;
        }
        assert!(!h.reconciler.is_filtered(el));
        time::sleep(Duration::from_millis(600)).await;
        assert!(h.reconciler.is_filtered(el));
        assert_eq!(h.stop().await.passes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn list_change_triggers_pass() {
        let h = start(&["other"]).await;
        let el = h.dom.append_text(h.dom.root(), "article", "a trigger here");
        h.tx.send(PageEvent::Loaded).await.unwrap();
        time::sleep(Duration::from_millis(10)).await;
        assert!(!h.reconciler.is_filtered(el));

        let _ = FilterListRepository::new(h.gateway.clone())
            .add_word("news", "trigger")
            .await
            .unwrap();
        time::sleep(Duration::from_millis(600)).await;
        assert!(h.reconciler.is_filtered(el));
        assert_eq!(h.stop().await.passes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unload_flushes_stats() {
        let h = start(&["trigger"]).await;
        let _ = h.dom.append_text(h.dom.root(), "article", "a trigger here");
        h.tx.send(PageEvent::Loaded).await.unwrap();
        let gateway = h.gateway.clone();
        let _ = h.stop().await;
        assert_eq!(WordStatsRepository::new(gateway).count("trigger").await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ignore_event_unfilters() {
        let h = start(&["trigger"]).await;
        let el = h.dom.append_text(h.dom.root(), "article", "a trigger here");
        h.tx.send(PageEvent::Loaded).await.unwrap();
        h.tx.send(PageEvent::UnfilterAndIgnore(el)).await.unwrap();
        h.tx.send(PageEvent::Mutated).await.unwrap();
        time::sleep(Duration::from_millis(600)).await;
        assert!(!h.reconciler.is_filtered(el));
        assert_eq!(h.dom.attribute(el, APPLIED_ACTION_ATTR), None);
        let _ = h.stop().await;
    }

    #[test]
    fn relevance_filter() {
        let note = |store, key: &str| StoreNotification::DataChanged {
            store,
            key: key.into(),
            value: None,
        };
        assert!(is_relevant(&note(StoreName::FilterLists, "news")));
        assert!(is_relevant(&note(StoreName::Blacklist, "a.com")));
        assert!(is_relevant(&note(StoreName::Settings, "defaultAction")));
        assert!(!is_relevant(&note(StoreName::Settings, "costLedger")));
        assert!(!is_relevant(&note(StoreName::WordStats, "trigger")));
    }
}
