mod connection;
mod helpers;
mod migrations;
mod repositories;

pub use connection::Database;
pub use repositories::automation_logs::{DEFAULT_LOG_RETENTION_DAYS, RECENT_LOGS_LIMIT};
