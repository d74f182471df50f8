use crate::body::Body;
use crate::classify::Arg;
use crate::error::LoggedError;
use crate::logger::Logger;
use crate::record::{Base, Direction};
use crate::serialize::SerializeError;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Configuration for [`Logger::session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Correlation id; a random 8-character token when absent.
    pub connection_id: Option<String>,
    /// Direction of the opening record. Facade calls use the inverse.
    pub direction: Direction,
    pub protocol: String,
    pub path: String,
    pub body: Option<Body>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            connection_id: None,
            direction: Direction::Out,
            protocol: "INFO".to_string(),
            path: "none".to_string(),
            body: None,
        }
    }
}

/// Scoped handle for paired request/response logging.
///
/// Every call reuses the correlation id, protocol and path of the opening
/// record with the direction flipped: the initiator logs OUT, the responder
/// logs IN against the same id (or vice versa).
pub struct Session {
    logger: Logger,
    connection_id: String,
    direction: Direction,
    protocol: String,
    path: String,
}

impl Session {
    pub(crate) fn new(logger: Logger, config: &SessionConfig, connection_id: String) -> Session {
        Session {
            logger,
            connection_id,
            direction: config.direction.invert(),
            protocol: config.protocol.clone(),
            path: config.path.clone(),
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn info(&self, body: Body) -> Result<(), SerializeError> {
        self.logger.info(self.base(Some(body)))
    }

    pub fn info_with_serialized(&self, body: Body, serialized: String) -> Result<(), SerializeError> {
        self.logger
            .info_with_serialized(self.base(Some(body)), serialized)
    }

    pub fn warn(&self, mut args: Vec<Arg>) -> LoggedError {
        args.insert(0, Arg::Base(self.base(None)));
        self.logger.warn(args)
    }

    pub fn error(&self, mut args: Vec<Arg>) -> LoggedError {
        args.insert(0, Arg::Base(self.base(None)));
        self.logger.error(args)
    }

    fn base(&self, body: Option<Body>) -> Base {
        Base {
            connection_id: self.connection_id.clone(),
            direction: Some(self.direction),
            protocol: Some(self.protocol.clone()),
            path: self.path.clone(),
            body,
        }
    }
}

pub(crate) fn random_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_short_and_lowercase() {
        let token = random_token();
        assert_eq!(token.chars().count(), 8);
        assert_eq!(token, token.to_lowercase());
    }

    #[test]
    fn tokens_differ_between_calls() {
        assert_ne!(random_token(), random_token());
    }
}
