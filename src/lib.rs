pub mod clock;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod limits;
pub mod messages;
pub mod model;
pub mod notify;
pub mod observability;
pub mod sink;
pub mod sweep;
pub mod wal;
