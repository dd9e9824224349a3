use std::path::{Path, PathBuf};

use crate::foundation::cache::remove_if_exists;
use crate::foundation::error::{AssetError, AssetResult};
use crate::media::backend::{MediaBackend, MuxInput, MuxRequest};
use crate::media::sample::TrackKind;

/// Separately finalized per-channel files of one live session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelFiles {
    pub video: Option<PathBuf>,
    /// One file per audio channel that received buffers, in channel order.
    pub audio: Vec<PathBuf>,
}

impl ChannelFiles {
    pub fn all(&self) -> impl Iterator<Item = &Path> {
        self.video
            .iter()
            .chain(self.audio.iter())
            .map(PathBuf::as_path)
    }

    /// Delete every intermediate file. Missing files are ignored.
    pub fn remove_all(&self) {
        for path in self.all() {
            if let Err(e) = remove_if_exists(path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove intermediate");
            }
        }
    }
}

/// Copy the full time range of the video file and every audio file into `out`.
///
/// The merged container carries one video track (its transform preserved) plus one track per
/// audio file.
#[tracing::instrument(skip(backend, files), fields(out = %out.display()))]
pub fn merge_channels(
    backend: &dyn MediaBackend,
    files: &ChannelFiles,
    out: &Path,
) -> AssetResult<PathBuf> {
    let video = files
        .video
        .as_ref()
        .ok_or(AssetError::CouldNotAccessVideoTrack)?;
    let info = backend.probe(video)?;
    if info.video_track().is_none() {
        return Err(AssetError::CouldNotAccessVideoTrack);
    }

    let mut inputs = vec![MuxInput {
        path: video.clone(),
        kind: TrackKind::Video,
    }];
    inputs.extend(files.audio.iter().map(|path| MuxInput {
        path: path.clone(),
        kind: TrackKind::Audio,
    }));

    backend.mux(&MuxRequest {
        inputs,
        output: out.to_path_buf(),
        ..MuxRequest::default()
    })?;
    tracing::debug!(audio_tracks = files.audio.len(), "live channels merged");
    Ok(out.to_path_buf())
}
