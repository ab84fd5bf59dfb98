//! # Session Lifecycle
//!
//! Both endpoints walk the same states:
//!
//! ```text
//! AwaitingCredentials ──readyForSession──▶ Credentialed ──sessionRunning──▶ Running
//!          │                                    │                              │
//!          └────────────────────────────────────┴───── transport fault ───────▶ Closed
//! ```
//!
//! Nothing but the handshake is processed before `Credentialed`.

use std::fmt;

use crate::error::DecodeError;
use crate::protocol::commands::READY_FOR_SESSION;
use crate::protocol::Command;

/// The triad the render side opens with.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionCredentials {
    /// Credential for the session service.
    pub api_key: String,
    /// Application id.
    pub app_id: String,
    /// Session name.
    pub session_name: String,
}

impl SessionCredentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(
        api_key: impl Into<String>,
        app_id: impl Into<String>,
        session_name: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            app_id: app_id.into(),
            session_name: session_name.into(),
        }
    }

    /// Reads the triad from a `readyForSession` command.
    pub fn from_command(command: &Command) -> Result<Self, DecodeError> {
        command.require(3)?;
        Ok(Self::new(
            command.args[0].as_str(),
            command.args[1].as_str(),
            command.args[2].as_str(),
        ))
    }

    /// Builds the `readyForSession` command.
    #[must_use]
    pub fn to_command(&self) -> Command {
        Command::new(
            READY_FOR_SESSION,
            vec![
                self.api_key.clone(),
                self.app_id.clone(),
                self.session_name.clone(),
            ],
        )
    }
}

/// Where a session is in its lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Connected, handshake not yet seen.
    #[default]
    AwaitingCredentials = 0,
    /// Handshake seen; the shared session is being joined.
    Credentialed = 1,
    /// The shared session is live.
    Running = 2,
    /// The connection is gone.
    Closed = 3,
}

impl SessionState {
    /// True once the handshake has been seen and before close.
    #[must_use]
    pub const fn accepts_traffic(self) -> bool {
        matches!(self, Self::Credentialed | Self::Running)
    }

    /// True once closed.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitingCredentials => "awaiting-credentials",
            Self::Credentialed => "credentialed",
            Self::Running => "running",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode_command;

    #[test]
    fn test_credentials_round_trip_through_command() {
        let creds = SessionCredentials::new("key", "io.tether.demo", "lobby");
        let wire = creds.to_command().encode();
        assert_eq!(wire, "readyForSession\x01key\x01io.tether.demo\x01lobby");

        let parsed = SessionCredentials::from_command(&decode_command(&wire).unwrap()).unwrap();
        assert_eq!(parsed, creds);
    }

    #[test]
    fn test_short_handshake_rejected() {
        let command = decode_command("readyForSession\x01key").unwrap();
        assert!(matches!(
            SessionCredentials::from_command(&command),
            Err(DecodeError::MissingArguments { expected: 3, got: 1, .. })
        ));
    }

    #[test]
    fn test_state_predicates() {
        assert!(!SessionState::default().accepts_traffic());
        assert!(SessionState::Credentialed.accepts_traffic());
        assert!(SessionState::Running.accepts_traffic());
        assert!(SessionState::Closed.is_closed());
        assert_eq!(SessionState::Running.to_string(), "running");
    }
}
