//! Serial commands understood by the Pico firmware.

/// A newline-terminated text command sent to the Pico over serial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PicoCommand {
    /// Ask the Pico to acknowledge the link.
    TestConnection,
    /// Ask the Pico for its current status.
    Status,
    /// Ask the Pico to start its BLE scan.
    StartScan,
}

impl PicoCommand {
    /// The command keyword without the line terminator.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::TestConnection => "test_connection",
            Self::Status => "status",
            Self::StartScan => "start_scan",
        }
    }

    /// The exact bytes written to the port.
    pub fn as_line(&self) -> &'static [u8] {
        match self {
            Self::TestConnection => b"test_connection\n",
            Self::Status => b"status\n",
            Self::StartScan => b"start_scan\n",
        }
    }

    /// Human-readable description for the event log.
    pub fn description(&self) -> &'static str {
        match self {
            Self::TestConnection => "test connection",
            Self::Status => "status",
            Self::StartScan => "start scan",
        }
    }
}

impl std::fmt::Display for PicoCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}
