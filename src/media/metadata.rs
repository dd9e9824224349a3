//! Typed metadata keys for paired assets.
//!
//! The literal key strings are an interop surface with paired-asset consumers and must not
//! change.

/// Key space of container-level metadata items.
pub const KEY_SPACE_MDTA: &str = "mdta";

/// Container/timed metadata keys understood by paired-asset consumers.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum MetadataKey {
    #[serde(rename = "com.apple.quicktime.content.identifier")]
    ContentIdentifier,
    #[serde(rename = "com.apple.quicktime.still-image-time")]
    StillImageTime,
}

impl MetadataKey {
    pub const ALL: [MetadataKey; 2] = [Self::ContentIdentifier, Self::StillImageTime];

    pub const fn wire_key(self) -> &'static str {
        match self {
            Self::ContentIdentifier => "com.apple.quicktime.content.identifier",
            Self::StillImageTime => "com.apple.quicktime.still-image-time",
        }
    }

    pub fn from_wire_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.wire_key() == key)
    }
}

/// Private per-image vendor (maker note) fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VendorField {
    ContentIdentifier,
}

impl VendorField {
    /// Key of the field inside the vendor dictionary.
    pub const fn wire_key(self) -> &'static str {
        match self {
            Self::ContentIdentifier => "17",
        }
    }

    /// Numeric maker-note tag carrying the field.
    pub const fn tag(self) -> u16 {
        match self {
            Self::ContentIdentifier => 17,
        }
    }
}

/// A container-level metadata item.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MetadataItem {
    pub key: MetadataKey,
    pub value: String,
}

impl MetadataItem {
    pub fn content_identifier(id: impl Into<String>) -> Self {
        Self {
            key: MetadataKey::ContentIdentifier,
            value: id.into(),
        }
    }
}

/// One sample of a timed-metadata track.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TimedMetadata {
    pub key: MetadataKey,
    /// Sample position in seconds.
    pub pts: f64,
    pub value: i8,
}

impl TimedMetadata {
    /// The single marker consumers use to locate the still frame inside the video.
    pub fn still_image_time(pts: f64) -> Self {
        Self {
            key: MetadataKey::StillImageTime,
            pts,
            value: -1,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/media/metadata.rs"]
mod tests;
