//! Protocol Error Codes
//!
//! Numeric codes reported to peers when a control request fails. The
//! request protocol itself is handled by the caller; this module only pins
//! the values so every handler reports the same numbers.

/// Failure categories reported over the control socket
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProtocolError {
    /// Local I/O failure while serving the request
    Io,
    /// The referenced peer does not exist
    NoPeer,
    /// A line was not of the form `key=value`
    NoKeyValue,
    /// Unknown key
    InvalidKey,
    /// Value could not be parsed for its key
    InvalidValue,
}

impl ProtocolError {
    /// The errno value sent on the wire
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::Io => i64::from(libc::EIO),
            Self::NoPeer | Self::NoKeyValue | Self::InvalidKey | Self::InvalidValue => {
                i64::from(libc::EPROTO)
            }
        }
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Io => "io error",
            Self::NoPeer => "no such peer",
            Self::NoKeyValue => "expected key=value",
            Self::InvalidKey => "invalid key",
            Self::InvalidValue => "invalid value",
        };
        write!(f, "{name} (errno={})", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(ProtocolError::Io.code(), i64::from(libc::EIO));
        for err in [
            ProtocolError::NoPeer,
            ProtocolError::NoKeyValue,
            ProtocolError::InvalidKey,
            ProtocolError::InvalidValue,
        ] {
            assert_eq!(err.code(), i64::from(libc::EPROTO));
        }
    }

    #[test]
    fn test_display_includes_code() {
        let shown = ProtocolError::InvalidKey.to_string();
        assert!(shown.contains("invalid key"));
        assert!(shown.contains(&libc::EPROTO.to_string()));
    }
}
