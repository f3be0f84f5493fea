//! Named rooms: one relay session per room, one peer task per connection

mod registry;

pub use registry::{RoomHandle, RoomRegistry, RoomSummary};

use crate::relay::RelayError;

/// Longest accepted room name
pub const MAX_ROOM_NAME: usize = 32;

/// Room errors
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("Invalid room name: {0:?}")]
    InvalidName(String),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl RoomError {
    pub fn is_full(&self) -> bool {
        matches!(self, RoomError::Relay(RelayError::RoomFull { .. }))
    }
}

/// Room names are short ASCII slugs
pub fn validate_room_name(name: &str) -> Result<(), RoomError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_ROOM_NAME
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(RoomError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_slugs() {
        assert!(validate_room_name("arena-1").is_ok());
        assert!(validate_room_name("night_owls").is_ok());
    }

    #[test]
    fn rejects_bad_names() {
        assert!(validate_room_name("").is_err());
        assert!(validate_room_name("has space").is_err());
        assert!(validate_room_name(&"x".repeat(MAX_ROOM_NAME + 1)).is_err());
    }
}
