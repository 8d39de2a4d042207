//! Schedule evaluator: decides what is due at a given instant.
//!
//! Pure functions over a document snapshot; nothing here performs I/O.

use chrono::{DateTime, Duration, Utc};
use driverbot_core::{Document, ScheduledItem, WeeklyCampaignConfig};
use serde::Serialize;

use crate::clock::CampaignClock;

/// One unit of work, committed and then executed on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dispatch {
    /// Weekly campaign; `watermark` is today's local date.
    Weekly { watermark: String },
    /// Due one-off items, in queue order.
    OneOff { items: Vec<ScheduledItem> },
    /// The immediate queue message.
    Immediate { message: String },
}

impl Dispatch {
    pub fn label(&self) -> &'static str {
        match self {
            Dispatch::Weekly { .. } => "weekly",
            Dispatch::OneOff { .. } => "one-off",
            Dispatch::Immediate { .. } => "immediate",
        }
    }
}

/// Everything due in one cycle, in commit order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decision {
    pub stages: Vec<Dispatch>,
}

impl Decision {
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Evaluates weekly and one-off due-ness.
#[derive(Debug, Clone)]
pub struct Evaluator {
    clock: CampaignClock,
    early_fire: Duration,
}

impl Evaluator {
    pub fn new(clock: CampaignClock, early_fire_secs: i64) -> Self {
        Self {
            clock,
            early_fire: Duration::seconds(early_fire_secs.max(0)),
        }
    }

    /// Today's watermark if the weekly campaign is due, `None` otherwise.
    ///
    /// Fires at or after the configured time, so a process that was down at
    /// the trigger minute still sends once later the same day.
    pub fn weekly_due(
        &self,
        config: &WeeklyCampaignConfig,
        last_weekly_run: &str,
        now: DateTime<Utc>,
    ) -> Option<String> {
        if !config.enabled {
            return None;
        }
        let local = self.clock.local_fields(now);
        if local.weekday != config.weekday {
            return None;
        }
        if (local.hour, local.minute) < (config.hour, config.minute) {
            return None;
        }
        if last_weekly_run == local.date {
            return None;
        }
        Some(local.date)
    }

    /// An item is due from `fire_at - early_fire` on.
    pub fn one_off_due(&self, item: &ScheduledItem, now: DateTime<Utc>) -> bool {
        now >= item.fire_at - self.early_fire
    }

    /// Compute the full decision for `doc` at `now`.
    pub fn evaluate(&self, doc: &Document, now: DateTime<Utc>) -> Decision {
        let mut stages = Vec::new();

        if let Some(watermark) = self.weekly_due(&doc.weekly_schedule, &doc.last_weekly_run, now) {
            stages.push(Dispatch::Weekly { watermark });
        }

        let due: Vec<ScheduledItem> = doc
            .scheduled_queue
            .iter()
            .filter(|item| self.one_off_due(item, now))
            .cloned()
            .collect();
        if !due.is_empty() {
            stages.push(Dispatch::OneOff { items: due });
        }

        if let Some(message) = &doc.immediate_queue {
            stages.push(Dispatch::Immediate {
                message: message.clone(),
            });
        }

        Decision { stages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn evaluator() -> Evaluator {
        Evaluator::new(CampaignClock::utc(), 60)
    }

    fn monday_9am() -> WeeklyCampaignConfig {
        WeeklyCampaignConfig {
            weekday: 1,
            hour: 9,
            minute: 0,
            enabled: true,
        }
    }

    // 2026-03-02 is a Monday.
    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    fn item(text: &str, fire_at: DateTime<Utc>) -> ScheduledItem {
        ScheduledItem {
            text: text.into(),
            fire_at,
            include_campaign_link: false,
        }
    }

    #[test]
    fn test_weekly_due_at_and_after_target() {
        let ev = evaluator();
        assert_eq!(ev.weekly_due(&monday_9am(), "", at(9, 0)).as_deref(), Some("2026-03-02"));
        // Catch-up hours later the same day.
        assert!(ev.weekly_due(&monday_9am(), "", at(17, 45)).is_some());
        assert!(ev.weekly_due(&monday_9am(), "", at(8, 59)).is_none());
    }

    #[test]
    fn test_weekly_watermark_blocks_same_day() {
        let ev = evaluator();
        assert!(ev.weekly_due(&monday_9am(), "2026-03-02", at(9, 30)).is_none());
        // Last week's watermark does not block.
        assert!(ev.weekly_due(&monday_9am(), "2026-02-23", at(9, 30)).is_some());
    }

    #[test]
    fn test_weekly_wrong_day_or_disabled() {
        let ev = evaluator();
        let tuesday = Utc.with_ymd_and_hms(2026, 3, 3, 10, 0, 0).unwrap();
        assert!(ev.weekly_due(&monday_9am(), "", tuesday).is_none());

        let disabled = WeeklyCampaignConfig {
            enabled: false,
            ..monday_9am()
        };
        assert!(ev.weekly_due(&disabled, "", at(9, 0)).is_none());
    }

    #[test]
    fn test_weekly_minute_comparison_is_lexicographic() {
        let ev = evaluator();
        let cfg = WeeklyCampaignConfig {
            hour: 9,
            minute: 30,
            ..monday_9am()
        };
        assert!(ev.weekly_due(&cfg, "", at(9, 29)).is_none());
        assert!(ev.weekly_due(&cfg, "", at(10, 0)).is_some());
    }

    #[test]
    fn test_early_fire_boundary() {
        let ev = evaluator();
        let t = at(12, 0);
        let it = item("A", t);
        assert!(ev.one_off_due(&it, t - Duration::seconds(59)));
        assert!(ev.one_off_due(&it, t - Duration::seconds(60)));
        assert!(!ev.one_off_due(&it, t - Duration::seconds(61)));
        assert!(ev.one_off_due(&it, t + Duration::hours(3)));
    }

    #[test]
    fn test_evaluate_orders_stages() {
        let ev = evaluator();
        let now = at(9, 5);
        let doc = Document {
            weekly_schedule: monday_9am(),
            scheduled_queue: vec![
                item("later", now + Duration::hours(1)),
                item("due-1", now - Duration::minutes(5)),
                item("due-2", now),
            ],
            immediate_queue: Some("now!".into()),
            ..Document::default()
        };

        let decision = ev.evaluate(&doc, now);
        let labels: Vec<_> = decision.stages.iter().map(Dispatch::label).collect();
        assert_eq!(labels, ["weekly", "one-off", "immediate"]);
        match &decision.stages[1] {
            Dispatch::OneOff { items } => {
                let texts: Vec<_> = items.iter().map(|i| i.text.as_str()).collect();
                assert_eq!(texts, ["due-1", "due-2"]);
            }
            other => panic!("unexpected stage {other:?}"),
        }
    }

    #[test]
    fn test_evaluate_nothing_due() {
        let ev = evaluator();
        let doc = Document::default();
        assert!(ev.evaluate(&doc, at(9, 0)).is_empty());
    }
}
