//! # DriverBot Core
//! Document model, normalizer, configuration, errors and the trait seams
//! (state store, chat transport) shared by every other crate.

pub mod config;
pub mod document;
pub mod error;
pub mod normalize;
pub mod traits;
pub mod types;

pub use document::{
    Answer, Destination, DestinationRole, Document, InProgressSurvey, Question, QuestionKind,
    ScheduledItem, SubmittedReport, WeeklyCampaignConfig,
};
pub use error::{DriverBotError, Result};
pub use traits::{ChatTransport, StateStore};
