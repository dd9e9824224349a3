use crate::encode::pixel::PixelBuffer;
use crate::foundation::core::Affine;

/// Kind of a track inside a container.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Video,
    Audio,
    Metadata,
}

#[derive(Clone, Debug)]
pub struct VideoSample {
    /// Presentation time in seconds.
    pub pts: f64,
    pub buffer: PixelBuffer,
}

/// Interleaved `f32` PCM.
#[derive(Clone, Debug)]
pub struct AudioSample {
    pub pts: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub pcm: Vec<f32>,
}

impl AudioSample {
    /// PCM frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.pcm.len() / usize::from(self.channels.max(1))
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }
}

/// One unit of media handed to a writer, in presentation order.
#[derive(Clone, Debug)]
pub enum Sample {
    Video(VideoSample),
    Audio(AudioSample),
}

impl Sample {
    pub fn kind(&self) -> TrackKind {
        match self {
            Self::Video(_) => TrackKind::Video,
            Self::Audio(_) => TrackKind::Audio,
        }
    }

    pub fn pts(&self) -> f64 {
        match self {
            Self::Video(v) => v.pts,
            Self::Audio(a) => a.pts,
        }
    }

    pub(crate) fn with_pts(mut self, pts: f64) -> Self {
        match &mut self {
            Self::Video(v) => v.pts = pts,
            Self::Audio(a) => a.pts = pts,
        }
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VideoTrackSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Preferred display transform stored with the track.
    pub transform: Affine,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioTrackSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

/// What a new output track will carry.
#[derive(Clone, Debug, PartialEq)]
pub enum TrackSpec {
    Video(VideoTrackSpec),
    Audio(AudioTrackSpec),
}

impl TrackSpec {
    pub fn kind(&self) -> TrackKind {
        match self {
            Self::Video(_) => TrackKind::Video,
            Self::Audio(_) => TrackKind::Audio,
        }
    }
}
