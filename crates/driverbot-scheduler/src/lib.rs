//! # DriverBot Scheduler
//!
//! Decides which announcements are due and sends each one at most once.
//!
//! ## Architecture
//! ```text
//! PollDriver (tokio interval + manual trigger)
//!   └── Coordinator::evaluate_and_dispatch(now)   ← single re-entrancy guard
//!         ├── load + normalize
//!         ├── Evaluator → [weekly, one-off, immediate]
//!         └── per stage: commit (DocumentWriter) → execute (Fanout)
//! ```
//!
//! Decisions are persisted before anything is sent. A crash in between drops
//! the announcement rather than repeating it.

pub mod clock;
pub mod dispatch;
pub mod driver;
pub mod engine;
pub mod evaluator;
pub mod notify;
pub mod snapshot;
pub mod writer;

pub use clock::CampaignClock;
pub use dispatch::{BroadcastReport, Fanout, format_announcement};
pub use driver::PollDriver;
pub use engine::{CampaignContent, Coordinator, CycleOutcome, CycleReport, StageReport};
pub use evaluator::{Decision, Dispatch, Evaluator};
pub use notify::{DeliveryLog, DeliveryRecord};
pub use snapshot::{Snapshot, SnapshotCache};
pub use writer::DocumentWriter;
