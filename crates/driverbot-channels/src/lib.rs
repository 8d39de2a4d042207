//! # DriverBot Channels
//! Chat transport implementations.

pub mod mock;
pub mod telegram;

pub use mock::RecordingTransport;
pub use telegram::{TelegramChannel, TelegramSender, deep_link};
