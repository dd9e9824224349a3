/// Convenience result alias used across the crate.
pub type AssetResult<T> = Result<T, AssetError>;

/// Failure classes from the pipeline error taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input or allocation failure detected before any output exists.
    Configuration,
    /// Mid-stream append, disk or path failure.
    Io,
    /// An expected track was missing on read.
    TrackAbsence,
    /// A multi-channel join observed a failed channel.
    Rendezvous,
    /// Composition/export engine failure.
    Export,
    /// Metadata could not be written or parsed.
    Metadata,
}

/// Every failure surfaced by the asset pipeline.
#[derive(thiserror::Error, Debug)]
pub enum AssetError {
    #[error("no frames to encode")]
    NoFrames,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("could not write asset")]
    CouldNotWriteAsset,

    #[error("media writer error: {0}")]
    Writer(String),

    #[error("could not create composition: {0}")]
    CouldNotCreateComposition(String),

    #[error("could not create export session: {0}")]
    CouldNotCreateExportSession(String),

    #[error("could not create output location: {0}")]
    CouldNotCreateOutputLocation(String),

    #[error("{channel} channel failed: {reason}")]
    ChannelFailed { channel: String, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("unknown export failure: {0}")]
    Unknown(String),

    #[error("could not create gif destination: {0}")]
    CouldNotCreateDestination(String),

    #[error("failed to finalize gif destination: {0}")]
    FailedToFinalizeDestination(String),

    #[error("could not access video track")]
    CouldNotAccessVideoTrack,

    #[error("metadata error: {0}")]
    Metadata(String),

    #[error("another operation is already in flight")]
    Busy,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AssetError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn writer(msg: impl Into<String>) -> Self {
        Self::Writer(msg.into())
    }

    pub fn composition(msg: impl Into<String>) -> Self {
        Self::CouldNotCreateComposition(msg.into())
    }

    pub fn export_session(msg: impl Into<String>) -> Self {
        Self::CouldNotCreateExportSession(msg.into())
    }

    pub fn output_location(msg: impl Into<String>) -> Self {
        Self::CouldNotCreateOutputLocation(msg.into())
    }

    pub fn channel_failed(channel: impl std::fmt::Debug, reason: impl std::fmt::Display) -> Self {
        Self::ChannelFailed {
            channel: format!("{channel:?}"),
            reason: reason.to_string(),
        }
    }

    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }

    /// Taxonomy class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoFrames | Self::Configuration(_) | Self::Busy => ErrorKind::Configuration,
            Self::CouldNotWriteAsset
            | Self::Writer(_)
            | Self::CouldNotCreateOutputLocation(_)
            | Self::CouldNotCreateDestination(_)
            | Self::FailedToFinalizeDestination(_)
            | Self::Io(_)
            | Self::Other(_) => ErrorKind::Io,
            Self::CouldNotAccessVideoTrack => ErrorKind::TrackAbsence,
            Self::ChannelFailed { .. } => ErrorKind::Rendezvous,
            Self::CouldNotCreateComposition(_)
            | Self::CouldNotCreateExportSession(_)
            | Self::Cancelled
            | Self::Unknown(_) => ErrorKind::Export,
            Self::Metadata(_) => ErrorKind::Metadata,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
