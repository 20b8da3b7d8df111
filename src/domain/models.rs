//! Domain models for the reader link.
//!
//! These types describe tags read from the device and the observable state
//! of the connection to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Highest RF power the reader accepts, in mW.
pub const MAX_POWER_MW: u32 = 199;

/// Power value reported across the remote boundary when the reading is unknown.
pub const POWER_UNKNOWN: i64 = -1;

/// A tag as returned by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Raw identifier bytes, most significant first.
    pub id: Vec<u8>,
}

impl Tag {
    /// Create a tag from raw identifier bytes.
    #[must_use]
    pub fn new(id: impl Into<Vec<u8>>) -> Self {
        Self { id: id.into() }
    }

    /// Identifier as published to clients.
    #[must_use]
    pub fn hex_id(&self) -> String {
        tag_id_hex(&self.id)
    }
}

/// Encode raw id bytes as an unsigned big-endian number in uppercase hex.
///
/// Leading zeros are dropped, so the result is not a fixed width:
/// `[0x00, 0x1A, 0xBF]` becomes `"1ABF"`. An all-zero or empty id is `"0"`.
#[must_use]
pub fn tag_id_hex(raw: &[u8]) -> String {
    let encoded = hex::encode_upper(raw);
    let trimmed = encoded.trim_start_matches('0');

    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Phase of the reader link state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPhase {
    /// No session, nobody trying yet.
    Disconnected = 0,
    /// A connect attempt is in progress.
    Connecting = 1,
    /// A session answered its last probe.
    Connected = 2,
    /// The supervisor is retrying connects after a failed probe.
    Recovering = 3,
    /// Torn down; terminal.
    Shutdown = 4,
}

impl From<u8> for LinkPhase {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Recovering,
            4 => Self::Shutdown,
            _ => Self::Disconnected,
        }
    }
}

impl std::fmt::Display for LinkPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Recovering => write!(f, "recovering"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Point-in-time view of the link, safe to hand to callers.
#[derive(Debug, Clone, Serialize)]
pub struct LinkStatus {
    /// Current state machine phase.
    pub phase: LinkPhase,
    /// Whether the last probe succeeded.
    pub live: bool,
    /// Port the current session is bound to.
    pub port: Option<String>,
    /// Firmware string reported on the last successful connect.
    pub firmware: Option<String>,
    /// Number of successful connects since startup.
    pub reconnects: u64,
    /// When the supervisor last probed the reader.
    pub last_probe: Option<DateTime<Utc>>,
}

/// Kind of an enumerated port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortKind {
    /// Serial-class device the reader may sit behind.
    Serial,
    /// Anything else the OS reports; never probed.
    Other,
}

/// A port reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortEntry {
    /// Device name to open (`/dev/ttyUSB0`, `COM3`, ...).
    pub name: String,
    /// Port class.
    pub kind: PortKind,
    /// Free-form details (USB vendor/product, bus), if known.
    pub description: Option<String>,
}

impl PortEntry {
    /// A plain serial port without details.
    #[must_use]
    pub fn serial(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PortKind::Serial,
            description: None,
        }
    }

    /// A non-serial entry.
    #[cfg(test)]
    #[must_use]
    pub fn other(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PortKind::Other,
            description: None,
        }
    }

    /// Whether the link may probe this port.
    #[must_use]
    pub fn is_serial(&self) -> bool {
        self.kind == PortKind::Serial
    }
}
