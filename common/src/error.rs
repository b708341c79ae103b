use thiserror::Error;

use crate::types::RoomId;

pub const MIN_CMD_ID_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("setpoint_c must be within [0, 120], got {0}")]
    SetpointOutOfRange(f64),
    #[error("duration_s must be within [1, 86400], got {0}")]
    DurationOutOfRange(i64),
    #[error("cmd_id must be at least 8 characters")]
    CmdIdTooShort,
    #[error("missing profile")]
    MissingProfile,
    #[error("invalid profile: {0}")]
    InvalidProfile(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoomError {
    #[error("room {0} not found")]
    NotFound(RoomId),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("a cycle is already running")]
    CycleActive,
    #[error("no cycle is running")]
    NoActiveCycle,
}

/// A command payload that could not be decoded. No ack can be sent because
/// the payload carries no trustworthy cmd_id.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("malformed command payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub fn validate_cmd_id(cmd_id: &str) -> Result<(), ValidationError> {
    if cmd_id.chars().count() < MIN_CMD_ID_LEN {
        return Err(ValidationError::CmdIdTooShort);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_bounds() {
        let err = ValidationError::SetpointOutOfRange(150.0);
        assert_eq!(
            err.to_string(),
            "setpoint_c must be within [0, 120], got 150"
        );

        let err = RoomError::from(ValidationError::DurationOutOfRange(0));
        assert_eq!(
            err.to_string(),
            "duration_s must be within [1, 86400], got 0"
        );
    }

    #[test]
    fn cmd_id_needs_eight_characters() {
        assert_eq!(validate_cmd_id("abc"), Err(ValidationError::CmdIdTooShort));
        assert!(validate_cmd_id("abc12345").is_ok());
    }
}
