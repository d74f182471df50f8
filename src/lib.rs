pub mod body;
pub mod classify;
pub mod error;
pub mod logger;
pub mod record;
pub mod render;
pub mod serialize;
pub mod session;
pub mod sink;
pub mod store;

#[cfg(feature = "clickhouse")]
pub mod clickhouse;

pub mod env;

pub use body::Body;
pub use classify::Arg;
pub use error::{LoggedError, StoreError};
pub use logger::{Logger, LoggerConfig};
pub use record::{Base, Direction, Level, Record};
pub use session::{Session, SessionConfig};
pub use sink::{DurableSink, SinkConfig, SinkState};
