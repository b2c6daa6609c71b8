// src/infra/errors.rs — Error types for Lumino

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LuminoError {
    // Session errors (fatal to session start)
    #[error("Invalid therapy parameters: {0}")]
    InvalidParameters(String),

    #[error("Therapy time has already elapsed")]
    AlreadyComplete,

    #[error("Cannot {op} while session is {state}")]
    InvalidTransition { op: &'static str, state: String },

    // Monitor link
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("Malformed message dropped: {0}")]
    MalformedMessage(String),

    // Startup
    #[error(transparent)]
    DescriptorLoad(#[from] DescriptorLoadError),

    // Monitor process
    #[error("Failed to start monitor application '{program}': {message}")]
    Spawn { program: String, message: String },

    #[error(transparent)]
    ProcessTermination(#[from] ProcessTerminationError),

    // Infra
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures establishing or using the controller/monitor socket.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Port {port} is already in use on {host}")]
    BindInUse { host: String, port: u16 },

    #[error("Could not connect to the monitoring application at {addr} after {attempts} attempts")]
    Refused { addr: String, attempts: u32 },

    #[error("Connection to the monitoring application was closed")]
    Closed,

    #[error("Socket error: {0}")]
    Io(#[source] std::io::Error),
}

/// Distinct reasons a session descriptor could not be loaded.
///
/// Each variant carries an operator-facing message; none of them is coerced
/// into zeroed parameters.
#[derive(Error, Debug)]
pub enum DescriptorLoadError {
    #[error("Directory for the session descriptor does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("Session descriptor not found at {}; select a body part and condition first", .0.display())]
    MissingFile(PathBuf),

    #[error("Session descriptor path {} exists but is not a file", .0.display())]
    NotAFile(PathBuf),

    #[error("No read permission for session descriptor {}", .0.display())]
    Permission(PathBuf),

    #[error("Failed to decode session descriptor {} (corrupted or empty): {message}", .path.display())]
    Decode { path: PathBuf, message: String },

    #[error("Session descriptor field '{field}' is not a valid number: {value}")]
    NonNumeric { field: String, value: String },

    #[error("OS error while reading session descriptor {}: {source}", .path.display())]
    Os {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DescriptorLoadError {
    /// Short machine-readable kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DescriptorLoadError::MissingDirectory(_) => "missing_directory",
            DescriptorLoadError::MissingFile(_) => "missing_file",
            DescriptorLoadError::NotAFile(_) => "not_a_file",
            DescriptorLoadError::Permission(_) => "permission",
            DescriptorLoadError::Decode { .. } => "decode",
            DescriptorLoadError::NonNumeric { .. } => "non_numeric",
            DescriptorLoadError::Os { .. } => "os",
        }
    }
}

#[derive(Error, Debug)]
pub enum ProcessTerminationError {
    #[error("Monitor process {pid} did not exit within {grace_ms}ms; force-killed")]
    GraceExpired { pid: u32, grace_ms: u64 },

    #[error("Failed to terminate monitor process: {0}")]
    Kill(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LuminoError>;
