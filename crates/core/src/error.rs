use thiserror::Error;

/// Checkpoint at which a success ratio was evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdStage {
    /// Go/no-go gate after the non-latest job of a dual run.
    NonLatestGate,
    /// Aggregate over every job produced by the run.
    Overall,
}

impl std::fmt::Display for ThresholdStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThresholdStage::NonLatestGate => f.write_str("non-latest version job"),
            ThresholdStage::Overall => f.write_str("overall"),
        }
    }
}

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("inventory configuration '{name}' does not exist on bucket '{bucket}'")]
    ConfigurationNotFound { bucket: String, name: String },

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("no inventory manifest found after {attempts} attempts")]
    ManifestNotFound { attempts: u32 },

    #[error("inventory manifest is corrupt or malformed: {0}")]
    MalformedManifest(String),

    #[error("invalid inventory file schema: '{0}'")]
    InvalidSchema(String),

    #[error("file schema does not contain field '{column}', provided file schema: '{schema}'")]
    MissingColumn { column: String, schema: String },

    #[error("{operation} failed: {message}")]
    Remote {
        operation: &'static str,
        message: String,
    },

    #[error("{stage} success ratio {achieved:.4} is below required threshold {required:.4}")]
    ThresholdNotMet {
        stage: ThresholdStage,
        achieved: f64,
        required: f64,
    },

    #[error("select record stream is closed")]
    ReaderClosed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl MigrationError {
    pub fn remote(operation: &'static str, message: impl Into<String>) -> Self {
        MigrationError::Remote {
            operation,
            message: message.into(),
        }
    }

    /// True for failures the manifest retry loop may wait out.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MigrationError::Remote { .. })
    }

    /// Short class label used in the final log line of a failed run.
    pub fn class(&self) -> &'static str {
        match self {
            MigrationError::ManifestNotFound { .. } => "transient-exhausted",
            MigrationError::ConfigurationNotFound { .. } | MigrationError::PreconditionFailed(_) => {
                "precondition"
            }
            MigrationError::MalformedManifest(_)
            | MigrationError::InvalidSchema(_)
            | MigrationError::MissingColumn { .. }
            | MigrationError::InvalidArgument(_) => "malformed-input",
            MigrationError::Remote { .. } | MigrationError::ReaderClosed => "remote-service",
            MigrationError::ThresholdNotMet { .. } => "threshold",
            MigrationError::Cancelled => "cancelled",
        }
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;
