//! Villa operations: properties, bookings, rule-based housekeeping,
//! maintenance, inventory and the Guesty / Google Sheets integrations over a
//! local SQLite store.

pub mod bookings;
pub mod cleaning;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod functions;
pub mod guesty;
pub mod housekeeping;
pub mod id;
pub mod inventory;
pub mod logging;
pub mod maintenance;
pub mod migrate;
pub mod perf;
pub mod preferences;
pub mod properties;
pub mod realtime;
pub mod reports;
pub mod repo;
pub mod retry;
pub mod sheets;
pub mod state;
pub mod time;
pub mod users;
pub mod validation;

pub use error::{AppError, AppResult, Notification, NotificationLevel};
pub use state::{AppState, Store};
