//! # Declared lifecycle states.
//!
//! The state flag is the only mechanism for surfacing failure upward: there
//! is no out-of-band error channel to the supervisor.

/// Lifecycle state a service declares through its mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Resources probed and initialized; not serving.
    Ready,
    /// Actively serving.
    Running,
    /// Terminal failure; the channel will not be serviced further.
    Disabled,
}

impl ServiceState {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(self) -> &'static str {
        match self {
            ServiceState::Ready => "ready",
            ServiceState::Running => "running",
            ServiceState::Disabled => "disabled",
        }
    }

    /// Encodes the state for the channel's control region (0 means unset).
    pub fn to_wire(self) -> u8 {
        match self {
            ServiceState::Ready => 1,
            ServiceState::Running => 2,
            ServiceState::Disabled => 3,
        }
    }

    /// Decodes a control-region byte; unknown values read as unset.
    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(ServiceState::Ready),
            2 => Some(ServiceState::Running),
            3 => Some(ServiceState::Disabled),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_roundtrip() {
        for state in [
            ServiceState::Ready,
            ServiceState::Running,
            ServiceState::Disabled,
        ] {
            assert_eq!(ServiceState::from_wire(state.to_wire()), Some(state));
        }
        assert_eq!(ServiceState::from_wire(0), None);
        assert_eq!(ServiceState::from_wire(200), None);
    }
}
