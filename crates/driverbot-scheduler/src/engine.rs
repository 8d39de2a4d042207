//! Run coordinator: one evaluation cycle, guarded against re-entry.
//!
//! Every due stage is handled in two steps: [`Coordinator::commit`] records
//! the decision in the store (watermark set, item removed, queue cleared) and
//! only then [`Coordinator::execute`] sends. A crash between the two drops the
//! announcement instead of repeating it on every following poll.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use driverbot_core::error::Result;
use driverbot_core::types::LinkButton;
use driverbot_core::{ChatTransport, Document, StateStore};
use serde::Serialize;

use crate::dispatch::{BroadcastReport, Fanout};
use crate::evaluator::{Dispatch, Evaluator};
use crate::notify::{DeliveryLog, DeliveryRecord};
use crate::snapshot::SnapshotCache;
use crate::writer::DocumentWriter;

/// What the weekly campaign says and where its button points.
#[derive(Debug, Clone)]
pub struct CampaignContent {
    pub message: String,
    /// Deep link into the questionnaire; `None` when the bot username is unknown.
    pub link: Option<LinkButton>,
}

/// Result of one `evaluate_and_dispatch` call.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Another cycle was already running.
    Skipped,
    /// The poll driver is shutting down.
    Stopped,
    /// The document could not be loaded.
    Aborted { reason: String },
    Completed(CycleReport),
}

impl CycleOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CycleOutcome::Completed(_))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    /// Snapshot version current at the end of the cycle.
    pub version: u64,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub kind: &'static str,
    /// False when the commit save failed and the send went ahead anyway.
    pub committed: bool,
    pub broadcasts: Vec<BroadcastReport>,
}

/// Coordinates evaluation, commit and fan-out.
pub struct Coordinator {
    writer: Arc<DocumentWriter>,
    fanout: Fanout,
    evaluator: Evaluator,
    campaign: CampaignContent,
    running: tokio::sync::Mutex<()>,
    journal: Mutex<DeliveryLog>,
}

impl Coordinator {
    pub fn new(
        writer: Arc<DocumentWriter>,
        transport: Arc<dyn ChatTransport>,
        evaluator: Evaluator,
        campaign: CampaignContent,
    ) -> Self {
        Self {
            writer,
            fanout: Fanout::new(transport),
            evaluator,
            campaign,
            running: tokio::sync::Mutex::new(()),
            journal: Mutex::new(DeliveryLog::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        self.writer.store()
    }

    pub fn snapshot(&self) -> &Arc<SnapshotCache> {
        self.writer.snapshot()
    }

    pub fn writer(&self) -> &Arc<DocumentWriter> {
        &self.writer
    }

    /// True while a cycle holds the guard.
    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Recent broadcasts, oldest first.
    pub fn deliveries(&self) -> Vec<DeliveryRecord> {
        self.journal
            .lock()
            .map(|j| j.entries().to_vec())
            .unwrap_or_default()
    }

    /// Run one cycle at `now`. Returns immediately if a cycle is in flight.
    pub async fn evaluate_and_dispatch(&self, now: DateTime<Utc>) -> CycleOutcome {
        let Ok(_guard) = self.running.try_lock() else {
            tracing::debug!("⏭️ Broadcast cycle already running, skipping");
            return CycleOutcome::Skipped;
        };

        let mut doc = match self.store().load().await {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!("⚠️ Cycle aborted, could not load state: {e}");
                return CycleOutcome::Aborted {
                    reason: e.to_string(),
                };
            }
        };

        let decision = self.evaluator.evaluate(&doc, now);
        let mut report = CycleReport::default();
        if decision.is_empty() {
            report.version = self.snapshot().publish(doc);
            return CycleOutcome::Completed(report);
        }

        for (i, stage) in decision.stages.iter().enumerate() {
            tracing::info!("🔔 {} broadcast due", stage.label());
            let committed = match self.commit(&mut doc, &decision.stages[..=i]).await {
                Ok(()) => true,
                Err(e) => {
                    // Sending anyway: a possible duplicate next cycle beats
                    // holding back every due announcement.
                    tracing::warn!("⚠️ Commit for {} not persisted: {e}", stage.label());
                    false
                }
            };
            let broadcasts = self.execute(&doc, stage).await;
            report.stages.push(StageReport {
                kind: stage.label(),
                committed,
                broadcasts,
            });
        }

        report.version = self.snapshot().current().version;
        CycleOutcome::Completed(report)
    }

    /// Apply a stage's state change to `doc` without persisting it.
    /// Applying the same stage twice changes nothing.
    pub fn apply(doc: &mut Document, stage: &Dispatch) {
        match stage {
            Dispatch::Weekly { watermark } => {
                doc.last_weekly_run = watermark.clone();
            }
            Dispatch::OneOff { items } => {
                for item in items {
                    if let Some(pos) = doc.scheduled_queue.iter().position(|q| q == item) {
                        doc.scheduled_queue.remove(pos);
                    }
                }
            }
            Dispatch::Immediate { message } => {
                // A newer message written since the load stays queued.
                if doc.immediate_queue.as_deref() == Some(message.as_str()) {
                    doc.immediate_queue = None;
                }
            }
        }
    }

    /// Phase one: record the decision in the store.
    ///
    /// `stages` is every stage decided so far this cycle, the one being
    /// committed last. All of them are re-applied to a freshly loaded
    /// document: concurrent writes made since the cycle started survive, and
    /// a load that misses an earlier commit of this cycle cannot undo it. On
    /// success `doc` becomes the saved document; on failure it still carries
    /// the local change.
    pub async fn commit(&self, doc: &mut Document, stages: &[Dispatch]) -> Result<()> {
        let Some(current) = stages.last() else {
            return Ok(());
        };
        for stage in stages {
            Self::apply(doc, stage);
        }
        let (saved, _) = self
            .writer
            .update(|fresh| {
                for stage in stages {
                    Self::apply(fresh, stage);
                }
                Some(())
            })
            .await?;
        *doc = saved;
        tracing::debug!("💾 Committed {} decision", current.label());
        Ok(())
    }

    /// Phase two: send. Failures stay inside the returned reports.
    pub async fn execute(&self, doc: &Document, stage: &Dispatch) -> Vec<BroadcastReport> {
        let mut reports = Vec::new();
        match stage {
            Dispatch::Weekly { .. } => {
                let link = self.campaign_link(doc, true);
                let r = self
                    .fanout
                    .broadcast(&self.campaign.message, &doc.groups, link)
                    .await;
                self.journal(stage.label(), &self.campaign.message, &r);
                reports.push(r);
            }
            Dispatch::OneOff { items } => {
                for item in items {
                    let link = self.campaign_link(doc, item.include_campaign_link);
                    let r = self.fanout.broadcast(&item.text, &doc.groups, link).await;
                    self.journal(stage.label(), &item.text, &r);
                    reports.push(r);
                }
            }
            Dispatch::Immediate { message } => {
                let r = self.fanout.broadcast(message, &doc.groups, None).await;
                self.journal(stage.label(), message, &r);
                reports.push(r);
            }
        }
        reports
    }

    /// The questionnaire link only makes sense when there are questions.
    fn campaign_link<'a>(&'a self, doc: &Document, wanted: bool) -> Option<&'a LinkButton> {
        if wanted && doc.has_questions() {
            self.campaign.link.as_ref()
        } else {
            None
        }
    }

    fn journal(&self, source: &str, text: &str, report: &BroadcastReport) {
        if let Ok(mut j) = self.journal.lock() {
            j.record(source, text, report.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::CampaignClock;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use driverbot_channels::RecordingTransport;
    use driverbot_core::types::{OutgoingMessage, ReplyMarkup};
    use driverbot_core::{Destination, Question, ScheduledItem, WeeklyCampaignConfig};
    use driverbot_store::MemoryStore;

    const NORTH: i64 = -1001;
    const SOUTH: i64 = -1002;
    const OFF: i64 = -1003;
    const HQ: i64 = -2001;

    fn groups() -> Vec<Destination> {
        let mut off = Destination::driver(OFF, "Closed depot");
        off.enabled = false;
        vec![
            Destination::driver(NORTH, "North"),
            Destination::admin(HQ, "HQ"),
            off,
            Destination::driver(SOUTH, "South"),
        ]
    }

    fn link() -> LinkButton {
        LinkButton {
            label: "📝 Give feedback".into(),
            url: "https://t.me/fleet_bot?start=feedback".into(),
        }
    }

    fn coordinator(
        store: Arc<dyn StateStore>,
        transport: Arc<dyn ChatTransport>,
    ) -> Coordinator {
        let writer = Arc::new(DocumentWriter::new(store, Arc::new(SnapshotCache::default())));
        Coordinator::new(
            writer,
            transport,
            Evaluator::new(CampaignClock::utc(), 60),
            CampaignContent {
                message: "Weekly check-in".into(),
                link: Some(link()),
            },
        )
    }

    // 2026-03-02 is a Monday.
    fn monday(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    fn weekly_doc() -> Document {
        Document {
            groups: groups(),
            questions: vec![Question::free_text("How was the week?")],
            weekly_schedule: WeeklyCampaignConfig {
                weekday: 1,
                hour: 9,
                minute: 0,
                enabled: true,
            },
            ..Document::default()
        }
    }

    fn item(text: &str, fire_at: DateTime<Utc>) -> ScheduledItem {
        ScheduledItem {
            text: text.into(),
            fire_at,
            include_campaign_link: false,
        }
    }

    #[tokio::test]
    async fn test_one_off_fires_once_and_is_removed() {
        let t = monday(12, 0);
        let doc = Document {
            groups: groups(),
            scheduled_queue: vec![item("A", t)],
            ..Document::default()
        };
        let store = Arc::new(MemoryStore::with_document(&doc));
        let transport = Arc::new(RecordingTransport::new());
        let coord = coordinator(store.clone(), transport.clone());

        assert!(coord.evaluate_and_dispatch(t).await.is_completed());
        assert!(store.load().await.unwrap().scheduled_queue.is_empty());
        assert_eq!(transport.sent_to(NORTH).len(), 1);
        assert_eq!(transport.sent_to(SOUTH).len(), 1);
        assert!(transport.sent_to(NORTH)[0].text.contains('A'));
        assert!(transport.sent_to(HQ).is_empty());
        assert!(transport.sent_to(OFF).is_empty());

        // Polling again sends nothing.
        coord.evaluate_and_dispatch(t + Duration::minutes(1)).await;
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_weekly_fires_at_most_once_per_day() {
        let store = Arc::new(MemoryStore::with_document(&weekly_doc()));
        let transport = Arc::new(RecordingTransport::new());
        let coord = coordinator(store.clone(), transport.clone());

        for i in 0..100 {
            coord
                .evaluate_and_dispatch(monday(9, 0) + Duration::minutes(i))
                .await;
        }
        assert_eq!(transport.sent().len(), 2);
        assert_eq!(store.load().await.unwrap().last_weekly_run, "2026-03-02");

        // A week later it fires again.
        let next_monday = monday(9, 0) + Duration::days(7);
        coord.evaluate_and_dispatch(next_monday).await;
        assert_eq!(transport.sent().len(), 4);
    }

    #[tokio::test]
    async fn test_weekly_catch_up_after_restart() {
        let store = Arc::new(MemoryStore::with_document(&weekly_doc()));
        let transport = Arc::new(RecordingTransport::new());

        // Process comes back at 15:00; a fresh coordinator has no memory.
        let coord = coordinator(store.clone(), transport.clone());
        coord.evaluate_and_dispatch(monday(15, 0)).await;
        assert_eq!(transport.sent().len(), 2);

        let restarted = coordinator(store.clone(), transport.clone());
        restarted.evaluate_and_dispatch(monday(15, 1)).await;
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_weekly_link_only_with_questions() {
        let store = Arc::new(MemoryStore::with_document(&weekly_doc()));
        let transport = Arc::new(RecordingTransport::new());
        coordinator(store, transport.clone())
            .evaluate_and_dispatch(monday(9, 0))
            .await;
        assert_eq!(transport.sent()[0].markup, Some(ReplyMarkup::Link(link())));

        let mut doc = weekly_doc();
        doc.questions.clear();
        let store = Arc::new(MemoryStore::with_document(&doc));
        let transport = Arc::new(RecordingTransport::new());
        coordinator(store, transport.clone())
            .evaluate_and_dispatch(monday(9, 0))
            .await;
        assert_eq!(transport.sent().len(), 2);
        assert!(transport.sent()[0].markup.is_none());
    }

    #[tokio::test]
    async fn test_reentrant_call_is_skipped() {
        let doc = Document {
            groups: groups(),
            immediate_queue: Some("Storm warning".into()),
            ..Document::default()
        };
        let store = Arc::new(MemoryStore::with_document(&doc));
        let transport = Arc::new(RecordingTransport::with_delay(
            std::time::Duration::from_millis(50),
        ));
        let coord = coordinator(store.clone(), transport.clone());

        let now = monday(10, 0);
        let (a, b) = tokio::join!(
            coord.evaluate_and_dispatch(now),
            coord.evaluate_and_dispatch(now)
        );
        assert!(a.is_completed());
        assert!(matches!(b, CycleOutcome::Skipped));
        assert_eq!(transport.sent().len(), 2);
        assert!(!coord.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_triggers_send_once() {
        let doc = Document {
            groups: groups(),
            immediate_queue: Some("Storm warning".into()),
            scheduled_queue: vec![item("B", monday(10, 0))],
            ..Document::default()
        };
        let store = Arc::new(MemoryStore::with_document(&doc));
        let transport = Arc::new(RecordingTransport::with_delay(
            std::time::Duration::from_millis(20),
        ));
        let coord = Arc::new(coordinator(store.clone(), transport.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = coord.clone();
                tokio::spawn(async move { c.evaluate_and_dispatch(monday(10, 0)).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }
        // Two drivers × (one-off + immediate).
        assert_eq!(transport.sent().len(), 4);
    }

    #[tokio::test]
    async fn test_partial_failure_completes_cycle() {
        let doc = Document {
            groups: vec![
                Destination::driver(1, "one"),
                Destination::driver(2, "two"),
                Destination::driver(3, "three"),
            ],
            immediate_queue: Some("Bridge closed".into()),
            ..Document::default()
        };
        let store = Arc::new(MemoryStore::with_document(&doc));
        let transport = Arc::new(RecordingTransport::new());
        transport.fail_for(2);
        let coord = coordinator(store.clone(), transport.clone());

        let CycleOutcome::Completed(report) = coord.evaluate_and_dispatch(monday(10, 0)).await
        else {
            panic!("cycle should complete");
        };
        let ids: Vec<_> = transport.sent().iter().map(|m| m.chat_id).collect();
        assert_eq!(ids, [1, 3]);
        assert_eq!(report.stages[0].broadcasts[0].failed.len(), 1);
        // No automatic retry.
        assert!(store.load().await.unwrap().immediate_queue.is_none());
        coord.evaluate_and_dispatch(monday(10, 1)).await;
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_excluded_destinations_for_every_source() {
        let now = monday(9, 0);
        let mut doc = weekly_doc();
        doc.scheduled_queue = vec![item("one-off", now)];
        doc.immediate_queue = Some("immediate".into());
        let store = Arc::new(MemoryStore::with_document(&doc));
        let transport = Arc::new(RecordingTransport::new());
        let coord = coordinator(store, transport.clone());

        coord.evaluate_and_dispatch(now).await;
        assert_eq!(transport.sent_to(NORTH).len(), 3);
        assert_eq!(transport.sent_to(SOUTH).len(), 3);
        assert!(transport.sent_to(HQ).is_empty());
        assert!(transport.sent_to(OFF).is_empty());

        // Weekly, then one-off, then immediate.
        let texts: Vec<_> = transport.sent_to(NORTH).into_iter().map(|m| m.text).collect();
        assert!(texts[0].contains("Weekly check-in"));
        assert!(texts[1].contains("one-off"));
        assert!(texts[2].contains("immediate"));
    }

    /// Transport that records what the store held at the moment of each send.
    struct StoreSpy {
        store: Arc<MemoryStore>,
        seen: Mutex<Vec<serde_json::Value>>,
    }

    #[async_trait]
    impl ChatTransport for StoreSpy {
        fn name(&self) -> &str {
            "spy"
        }

        async fn send(&self, _message: OutgoingMessage) -> Result<()> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(self.store.raw());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_commit_happens_before_send() {
        let now = monday(9, 0);
        let mut doc = weekly_doc();
        doc.scheduled_queue = vec![item("A", now), item("later", now + Duration::hours(2))];
        doc.immediate_queue = Some("now".into());
        let store = Arc::new(MemoryStore::with_document(&doc));
        let spy = Arc::new(StoreSpy {
            store: store.clone(),
            seen: Mutex::new(Vec::new()),
        });
        let coord = coordinator(store.clone(), spy.clone());
        coord.evaluate_and_dispatch(now).await;

        let seen = spy.seen.lock().unwrap().clone();
        // Weekly sends (2 drivers) already see the watermark.
        assert_eq!(seen[0]["last_weekly_run"], "2026-03-02");
        // One-off sends see the item gone but the later one kept.
        assert_eq!(seen[2]["scheduled_queue"].as_array().unwrap().len(), 1);
        // Immediate sends see the queue cleared.
        assert!(seen[4]["immediate_queue"].is_null());
    }

    /// Transport that queues a new immediate message on its first send, as an
    /// admin write landing mid-cycle would.
    struct MidCycleWrite {
        store: Arc<MemoryStore>,
        done: Mutex<bool>,
    }

    #[async_trait]
    impl ChatTransport for MidCycleWrite {
        fn name(&self) -> &str {
            "mid-cycle"
        }

        async fn send(&self, _message: OutgoingMessage) -> Result<()> {
            let mut done = self.done.lock().unwrap();
            if !*done {
                let mut raw = self.store.raw();
                raw["immediate_queue"] = "second".into();
                raw["groups"]
                    .as_array_mut()
                    .unwrap()
                    .push(serde_json::json!({"id": 77, "name": "New depot"}));
                self.store.replace_raw(raw);
                *done = true;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_commit_keeps_writes_made_mid_cycle() {
        let now = monday(12, 0);
        let doc = Document {
            groups: groups(),
            scheduled_queue: vec![item("A", now)],
            immediate_queue: Some("first".into()),
            ..Document::default()
        };
        let store = Arc::new(MemoryStore::with_document(&doc));
        let transport = Arc::new(MidCycleWrite {
            store: store.clone(),
            done: Mutex::new(false),
        });
        let coord = coordinator(store.clone(), transport);
        coord.evaluate_and_dispatch(now).await;

        let after = store.load().await.unwrap();
        assert_eq!(after.immediate_queue.as_deref(), Some("second"));
        assert!(after.group(77).is_some());
        assert!(after.scheduled_queue.is_empty());
    }

    #[tokio::test]
    async fn test_crash_between_commit_and_send_drops_not_duplicates() {
        let now = monday(12, 0);
        let doc = Document {
            groups: groups(),
            scheduled_queue: vec![item("A", now)],
            ..Document::default()
        };
        let store = Arc::new(MemoryStore::with_document(&doc));
        let transport = Arc::new(RecordingTransport::new());
        let coord = coordinator(store.clone(), transport.clone());

        // Commit only, as if the process died before sending.
        let mut local = store.load().await.unwrap();
        let decision = Evaluator::new(CampaignClock::utc(), 60).evaluate(&local, now);
        coord.commit(&mut local, &decision.stages[..1]).await.unwrap();

        // After restart nothing is resent.
        let restarted = coordinator(store.clone(), transport.clone());
        restarted.evaluate_and_dispatch(now + Duration::minutes(1)).await;
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_load_failure_aborts_cycle() {
        let doc = Document {
            groups: groups(),
            immediate_queue: Some("x".into()),
            ..Document::default()
        };
        let store = Arc::new(MemoryStore::with_document(&doc));
        store.fail_next_loads(1);
        let transport = Arc::new(RecordingTransport::new());
        let coord = coordinator(store.clone(), transport.clone());

        let outcome = coord.evaluate_and_dispatch(monday(10, 0)).await;
        assert!(matches!(outcome, CycleOutcome::Aborted { .. }));
        assert!(transport.sent().is_empty());
        assert!(!coord.is_running());

        // Next tick retries from scratch.
        assert!(coord.evaluate_and_dispatch(monday(10, 1)).await.is_completed());
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_commit_still_sends() {
        let doc = Document {
            groups: groups(),
            immediate_queue: Some("x".into()),
            ..Document::default()
        };
        let store = Arc::new(MemoryStore::with_document(&doc));
        store.fail_next_saves(1);
        let transport = Arc::new(RecordingTransport::new());
        let coord = coordinator(store.clone(), transport.clone());

        let CycleOutcome::Completed(report) = coord.evaluate_and_dispatch(monday(10, 0)).await
        else {
            panic!("cycle should complete");
        };
        assert!(!report.stages[0].committed);
        assert_eq!(transport.sent().len(), 2);
        // The unrecorded decision may repeat on the next cycle.
        assert_eq!(
            store.load().await.unwrap().immediate_queue.as_deref(),
            Some("x")
        );
    }

    #[tokio::test]
    async fn test_cycle_publishes_snapshot_and_journal() {
        let doc = Document {
            groups: groups(),
            immediate_queue: Some("Fuel prices".into()),
            ..Document::default()
        };
        let store = Arc::new(MemoryStore::with_document(&doc));
        let transport = Arc::new(RecordingTransport::new());
        let coord = coordinator(store, transport);

        let CycleOutcome::Completed(report) = coord.evaluate_and_dispatch(monday(10, 0)).await
        else {
            panic!("cycle should complete");
        };
        assert_eq!(report.version, 1);
        let snap = coord.snapshot().current();
        assert_eq!(snap.version, 1);
        assert!(snap.doc.immediate_queue.is_none());
        assert_eq!(snap.doc.groups.len(), 4);

        let deliveries = coord.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].source, "immediate");
        assert_eq!(deliveries[0].report.delivered, 2);
    }

    /// Store whose first load after the first save still returns the
    /// document from before that save, like a lagging replica.
    struct LaggyStore {
        inner: MemoryStore,
        before_first_save: Mutex<Option<serde_json::Value>>,
        stale_reads_left: Mutex<u32>,
    }

    impl LaggyStore {
        fn new(doc: &Document) -> Self {
            Self {
                inner: MemoryStore::with_document(doc),
                before_first_save: Mutex::new(None),
                stale_reads_left: Mutex::new(1),
            }
        }
    }

    #[async_trait]
    impl StateStore for LaggyStore {
        fn name(&self) -> &str {
            "laggy"
        }

        async fn load_raw(&self) -> Result<serde_json::Value> {
            if let Some(stale) = self.before_first_save.lock().unwrap().clone() {
                let mut left = self.stale_reads_left.lock().unwrap();
                if *left > 0 {
                    *left -= 1;
                    return Ok(stale);
                }
            }
            self.inner.load_raw().await
        }

        async fn save(&self, doc: &Document) -> Result<()> {
            {
                let mut before = self.before_first_save.lock().unwrap();
                if before.is_none() {
                    *before = Some(self.inner.raw());
                }
            }
            self.inner.save(doc).await
        }
    }

    #[tokio::test]
    async fn test_stale_read_between_commits_keeps_earlier_stage() {
        let mut doc = weekly_doc();
        doc.immediate_queue = Some("Depot closed".into());
        let store = Arc::new(LaggyStore::new(&doc));
        let transport = Arc::new(RecordingTransport::new());
        let coord = coordinator(store.clone(), transport.clone());

        // The immediate commit loads the pre-weekly document.
        assert!(coord.evaluate_and_dispatch(monday(9, 0)).await.is_completed());
        let after = store.load().await.unwrap();
        assert_eq!(after.last_weekly_run, "2026-03-02");
        assert!(after.immediate_queue.is_none());

        for i in 1..=3 {
            coord.evaluate_and_dispatch(monday(9, i)).await;
        }
        let weekly_sends = transport
            .sent_to(NORTH)
            .iter()
            .filter(|m| m.text.contains("Weekly check-in"))
            .count();
        assert_eq!(weekly_sends, 1);
        assert_eq!(transport.sent_to(NORTH).len(), 2);
    }

    #[tokio::test]
    async fn test_stale_read_does_not_restore_sent_one_off() {
        let now = monday(12, 0);
        let doc = Document {
            groups: groups(),
            scheduled_queue: vec![item("A", now)],
            immediate_queue: Some("now".into()),
            ..Document::default()
        };
        let store = Arc::new(LaggyStore::new(&doc));
        let transport = Arc::new(RecordingTransport::new());
        let coord = coordinator(store.clone(), transport.clone());

        coord.evaluate_and_dispatch(now).await;
        assert!(store.load().await.unwrap().scheduled_queue.is_empty());
        coord.evaluate_and_dispatch(now + Duration::minutes(1)).await;
        // One one-off plus one immediate per driver group.
        assert_eq!(transport.sent_to(NORTH).len(), 2);
    }
}
