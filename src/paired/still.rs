use std::path::Path;

use image::RgbaImage;

use crate::compose::orientation::orientation_from_transform;
use crate::foundation::error::{AssetError, AssetResult};
use crate::media::backend::{MediaBackend, MediaInfo};

/// Where the paired still came from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StillSource {
    /// Supplied by the caller.
    Supplied,
    /// Frame at the video's embedded still-image-time marker.
    Marker(f64),
    /// Frame at a fraction of the video's duration.
    Offset(f64),
}

/// A selected still plus the offset its marker will be written at.
#[derive(Clone, Debug)]
pub struct SelectedStill {
    pub image: RgbaImage,
    pub source: StillSource,
    /// Seconds into the video.
    pub time: f64,
}

/// Offset of the still frame: the existing marker when the video has one, else `fraction` of
/// the duration.
pub fn still_time(info: &MediaInfo, fraction: f64) -> (f64, bool) {
    match info.still_image_time() {
        Some(t) => (t, true),
        None => (info.duration.max(0.0) * fraction.clamp(0.0, 1.0), false),
    }
}

/// Pick the paired still: `supplied`, else the marker frame, else the frame at `fraction`.
///
/// Extracted frames are rotated into display orientation.
pub fn select_still(
    backend: &dyn MediaBackend,
    video: &Path,
    info: &MediaInfo,
    supplied: Option<RgbaImage>,
    fraction: f64,
) -> AssetResult<SelectedStill> {
    let (time, from_marker) = still_time(info, fraction);
    if let Some(image) = supplied {
        return Ok(SelectedStill {
            image,
            source: StillSource::Supplied,
            time,
        });
    }

    let track = info
        .video_track()
        .ok_or(AssetError::CouldNotAccessVideoTrack)?;
    let frame = backend.frame_at(video, time)?;
    let (orientation, _) = orientation_from_transform(track.transform);
    Ok(SelectedStill {
        image: orientation.to_display(frame),
        source: if from_marker {
            StillSource::Marker(time)
        } else {
            StillSource::Offset(time)
        },
        time,
    })
}

#[cfg(test)]
#[path = "../../tests/unit/paired/still.rs"]
mod tests;
