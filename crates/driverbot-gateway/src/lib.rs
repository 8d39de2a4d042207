//! # DriverBot Gateway
//! Admin HTTP API: read the document, queue announcements, edit schedules and
//! destinations, trigger a cycle.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
