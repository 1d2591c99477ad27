//! WebSocket connection state machine as defined in RFC 6455.

/// Protocol phase of a server-side connection.
///
/// ```text
/// AwaitingHandshake -> Open -> CloseSent ------> Closed
///                          \-> CloseReceived -/
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ConnectionState {
    /// Upgrade request not yet accepted.
    #[default]
    AwaitingHandshake,
    /// Connection is open and ready for data transfer.
    Open,
    /// We sent a Close and wait for the peer's.
    CloseSent,
    /// Peer sent a Close; our echo is queued but not yet taken by the host.
    CloseReceived,
    /// Connection is fully closed.
    Closed,
}

impl ConnectionState {
    /// Returns `false` only for `Closed`.
    #[must_use]
    #[inline]
    pub const fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Closed)
    }

    /// Check if sending data is allowed in this state.
    ///
    /// Returns `true` only for `Open` state.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Check if inbound frames are still processed.
    ///
    /// Returns `true` for `Open` and `CloseSent`; in `CloseSent` only the
    /// peer's Close matters.
    #[must_use]
    #[inline]
    pub const fn can_receive(&self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::CloseSent)
    }

    /// Returns `true` while one side of the close handshake is outstanding.
    #[must_use]
    #[inline]
    pub const fn is_closing(&self) -> bool {
        matches!(
            self,
            ConnectionState::CloseSent | ConnectionState::CloseReceived
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::AwaitingHandshake => write!(f, "AwaitingHandshake"),
            ConnectionState::Open => write!(f, "Open"),
            ConnectionState::CloseSent => write!(f, "CloseSent"),
            ConnectionState::CloseReceived => write!(f, "CloseReceived"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        assert_eq!(
            ConnectionState::default(),
            ConnectionState::AwaitingHandshake
        );
    }

    #[test]
    fn test_can_send_in_each_state() {
        assert!(!ConnectionState::AwaitingHandshake.can_send());
        assert!(ConnectionState::Open.can_send());
        assert!(!ConnectionState::CloseSent.can_send());
        assert!(!ConnectionState::CloseReceived.can_send());
        assert!(!ConnectionState::Closed.can_send());
    }

    #[test]
    fn test_can_receive_in_each_state() {
        assert!(!ConnectionState::AwaitingHandshake.can_receive());
        assert!(ConnectionState::Open.can_receive());
        assert!(ConnectionState::CloseSent.can_receive());
        assert!(!ConnectionState::CloseReceived.can_receive());
        assert!(!ConnectionState::Closed.can_receive());
    }

    #[test]
    fn test_closing_states() {
        assert!(ConnectionState::CloseSent.is_closing());
        assert!(ConnectionState::CloseReceived.is_closing());
        assert!(!ConnectionState::Open.is_closing());
        assert!(!ConnectionState::Closed.is_closing());
        assert!(ConnectionState::CloseReceived.is_active());
        assert!(!ConnectionState::Closed.is_active());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(
            ConnectionState::AwaitingHandshake.to_string(),
            "AwaitingHandshake"
        );
        assert_eq!(ConnectionState::Open.to_string(), "Open");
        assert_eq!(ConnectionState::CloseSent.to_string(), "CloseSent");
        assert_eq!(ConnectionState::CloseReceived.to_string(), "CloseReceived");
        assert_eq!(ConnectionState::Closed.to_string(), "Closed");
    }
}
