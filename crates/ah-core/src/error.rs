//! Error types for asio-host

use thiserror::Error;

/// Plain success status
pub const ASE_OK: i32 = 0;
/// Success status returned by the `future` entry point
pub const ASE_SUCCESS: i32 = 0x3f48_47a0;

/// Hardware input or output is not present or available
pub const ASE_NOT_PRESENT: i32 = -1000;
/// Hardware is malfunctioning
pub const ASE_HW_MALFUNCTION: i32 = -999;
/// Input parameter invalid
pub const ASE_INVALID_PARAMETER: i32 = -998;
/// Hardware is in a bad mode or used in a bad mode
pub const ASE_INVALID_MODE: i32 = -997;
/// Hardware is not running when sample position is inquired
pub const ASE_SP_NOT_ADVANCING: i32 = -996;
/// Sample clock or rate cannot be determined or is not present
pub const ASE_NO_CLOCK: i32 = -995;
/// Not enough memory for completing the request
pub const ASE_NO_MEMORY: i32 = -994;

/// Main error type
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),
}

/// Errors raised while enumerating installed drivers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Failed to open key {path}: os error {code}")]
    OpenKey { path: String, code: u32 },

    #[error("Failed to enumerate sub-key #{index}: os error {code}")]
    Enumerate { index: u32, code: u32 },

    #[error("Failed to read value {value} of {key}: os error {code}")]
    ReadValue {
        key: String,
        value: String,
        code: u32,
    },

    #[error("Value {value} of {key} is missing")]
    MissingValue { key: String, value: String },

    #[error("Malformed activation identifier: {0:?}")]
    MalformedId(String),

    #[error("Driver registry is not available on this platform")]
    Unsupported,
}

/// Errors raised while turning an activation identifier into a live instance
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActivationError {
    #[error("No component is registered under this identifier")]
    NotFound,

    #[error("Access to the component was denied")]
    AccessDenied,

    #[error("Component does not support the requested interface")]
    Incompatible,

    #[error("Component runtime could not be initialized (HRESULT 0x{0:08x})")]
    RuntimeInit(u32),

    #[error("Activation failed (HRESULT 0x{0:08x})")]
    Runtime(u32),
}

/// Decoded driver status.
///
/// The known band maps to a fixed set of conditions; anything else carries the
/// raw code plus whatever text the driver reported for it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AsioError {
    #[error("hardware input or output is not present or available")]
    NotPresent,

    #[error("hardware is malfunctioning")]
    HwMalfunction,

    #[error("input parameter invalid")]
    InvalidParameter,

    #[error("hardware is in a bad mode or used in a bad mode")]
    InvalidMode,

    #[error("hardware is not running when sample position is inquired")]
    SpNotAdvancing,

    #[error("sample clock or rate cannot be determined or is not present")]
    NoClock,

    #[error("not enough memory for completing the request")]
    NoMemory,

    #[error("driver error {code}: {message}")]
    Unrecognized { code: i32, message: String },
}

impl AsioError {
    /// Look up a code in the known band.
    ///
    /// The band counts up from `ASE_NOT_PRESENT`; the mirrored encoding that
    /// counts down from it (`-1001` for a malfunction) is accepted as well.
    pub fn from_known(code: i32) -> Option<Self> {
        let code = if (ASE_NOT_PRESENT - 6..ASE_NOT_PRESENT).contains(&code) {
            2 * ASE_NOT_PRESENT - code
        } else {
            code
        };
        match code {
            ASE_NOT_PRESENT => Some(Self::NotPresent),
            ASE_HW_MALFUNCTION => Some(Self::HwMalfunction),
            ASE_INVALID_PARAMETER => Some(Self::InvalidParameter),
            ASE_INVALID_MODE => Some(Self::InvalidMode),
            ASE_SP_NOT_ADVANCING => Some(Self::SpNotAdvancing),
            ASE_NO_CLOCK => Some(Self::NoClock),
            ASE_NO_MEMORY => Some(Self::NoMemory),
            _ => None,
        }
    }

    /// Canonical status code for this error
    pub fn code(&self) -> i32 {
        match self {
            Self::NotPresent => ASE_NOT_PRESENT,
            Self::HwMalfunction => ASE_HW_MALFUNCTION,
            Self::InvalidParameter => ASE_INVALID_PARAMETER,
            Self::InvalidMode => ASE_INVALID_MODE,
            Self::SpNotAdvancing => ASE_SP_NOT_ADVANCING,
            Self::NoClock => ASE_NO_CLOCK,
            Self::NoMemory => ASE_NO_MEMORY,
            Self::Unrecognized { code, .. } => *code,
        }
    }

    /// Whether the code is outside the known band
    pub fn is_unrecognized(&self) -> bool {
        matches!(self, Self::Unrecognized { .. })
    }
}

/// Decode a raw driver status.
///
/// `message` is only invoked for codes outside the known band, since asking the
/// driver for its error text is itself a foreign call.
pub fn decode_status<F>(raw: i32, message: F) -> std::result::Result<(), AsioError>
where
    F: FnOnce() -> String,
{
    match raw {
        ASE_OK | ASE_SUCCESS => Ok(()),
        code => Err(AsioError::from_known(code).unwrap_or_else(|| AsioError::Unrecognized {
            code,
            message: message(),
        })),
    }
}

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// The caller sequenced operations incorrectly. This is a defect in the
    /// calling code, never a condition worth retrying.
    #[error("Precondition violated: {operation} is not valid in state {state}")]
    Precondition {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Activation failed: {0}")]
    Activation(#[from] ActivationError),

    #[error("Driver init failed: {message}")]
    InitFailed { message: String },

    #[error("Driver error: {0}")]
    Driver(#[from] AsioError),

    #[error(
        "Buffer size {requested} not supported (min {min}, max {max}, preferred {preferred}, granularity {granularity})"
    )]
    InvalidBufferSize {
        requested: i32,
        min: i32,
        max: i32,
        preferred: i32,
        granularity: i32,
    },

    #[error("No buffer descriptors supplied")]
    NoChannels,

    #[error("{direction} channel {channel} is out of range (driver has {available})")]
    ChannelOutOfRange {
        channel: i32,
        direction: &'static str,
        available: i32,
    },

    #[error("Channel {channel} uses sample type {raw}, which has no known width")]
    UnsupportedSampleType { channel: i32, raw: i32 },

    #[error("Another session already owns the realtime callback slot")]
    CallbackSlotBusy,
}

impl SessionError {
    /// Whether this error marks a caller sequencing defect
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition { .. })
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("No configuration directory available")]
    NoConfigDir,
}

/// Errors raised while installing the log subscriber
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to create log file {path}: {source}")]
    LogFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("A global log subscriber is already installed")]
    AlreadyInstalled(#[from] tracing_subscriber::util::TryInitError),
}

/// Result type alias for host operations
pub type Result<T> = std::result::Result<T, HostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_success_codes() {
        assert_eq!(decode_status(0, || unreachable!()), Ok(()));
        assert_eq!(decode_status(0x3f4847a0, || unreachable!()), Ok(()));
    }

    #[test]
    fn test_decode_known_codes() {
        assert_eq!(decode_status(-1000, || unreachable!()), Err(AsioError::NotPresent));
        assert_eq!(decode_status(-999, || unreachable!()), Err(AsioError::HwMalfunction));
        assert_eq!(decode_status(-994, || unreachable!()), Err(AsioError::NoMemory));
    }

    #[test]
    fn test_decode_mirrored_band() {
        assert_eq!(decode_status(-1001, || unreachable!()), Err(AsioError::HwMalfunction));
        assert_eq!(decode_status(-1006, || unreachable!()), Err(AsioError::NoMemory));
        assert_eq!(AsioError::from_known(-1002).map(|e| e.code()), Some(ASE_INVALID_PARAMETER));
        assert!(AsioError::from_known(-1007).is_none());
    }

    #[test]
    fn test_decode_unrecognized_queries_message() {
        let err = decode_status(-12345, || "card on fire".to_string()).unwrap_err();
        assert_eq!(
            err,
            AsioError::Unrecognized {
                code: -12345,
                message: "card on fire".to_string()
            }
        );
        assert!(err.is_unrecognized());
        assert_eq!(err.code(), -12345);
    }

    #[test]
    fn test_known_code_round_trip() {
        for code in ASE_NOT_PRESENT..=ASE_NO_MEMORY {
            let err = AsioError::from_known(code).unwrap();
            assert_eq!(err.code(), code);
        }
        assert!(AsioError::from_known(-993).is_none());
    }
}
