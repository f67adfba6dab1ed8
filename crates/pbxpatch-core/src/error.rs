use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("config not found: {0} (run 'pbxpatch init')")]
    ConfigNotFound(String),

    #[error("descriptor not found: {0}")]
    DescriptorNotFound(String),

    #[error("parse error at byte {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("region '{0}' has a begin marker but no end marker")]
    UnterminatedRegion(String),

    #[error("invalid object identifier '{0}': must be 24 uppercase hex characters")]
    InvalidIdentifier(String),

    #[error("identifier {0} is already used in the descriptor")]
    IdentifierCollision(String),

    #[error("main target not found: {0}")]
    MainTargetNotFound(String),

    #[error("record not found: {0}")]
    RecordNotFound(String),

    #[error("missing anchors: {0}")]
    AnchorMissing(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, PatchError>;
