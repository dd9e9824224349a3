//! Backend driving the system `ffmpeg`/`ffprobe` binaries.
//!
//! Raw frames and PCM are streamed over stdin/stdout pipes; container probing parses
//! `ffprobe -print_format json`. Timed-metadata tracks, which `ffmpeg` cannot author, are added
//! after muxing by [`crate::media::timed_track`].

use std::collections::BTreeMap;
use std::io::{BufReader, Read, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use image::RgbaImage;

use crate::compose::orientation::{Orientation, orientation_from_transform};
use crate::encode::pixel::{BYTES_PER_PIXEL, PixelBuffer};
use crate::foundation::cache::{ensure_parent_dir, remove_if_exists};
use crate::foundation::core::Affine;
use crate::foundation::error::{AssetError, AssetResult};
use crate::media::backend::{
    MediaBackend, MediaInfo, MuxRequest, SampleReader, SampleSink, TrackInfo,
};
use crate::media::sample::{
    AudioSample, AudioTrackSpec, Sample, TrackKind, TrackSpec, VideoSample, VideoTrackSpec,
};
use crate::media::timed_track::{append_timed_metadata_tracks, read_timed_metadata};

/// PCM frames per decoded audio sample.
const AUDIO_CHUNK_FRAMES: usize = 1024;

#[derive(Clone, Debug)]
pub struct FfmpegBackend {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegBackend {
    pub fn new() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }

    /// Use binaries at explicit locations instead of `PATH` lookups.
    pub fn with_binaries(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-v", "error", "-nostdin"]);
        cmd
    }

    fn spawn_encoder(&self, mut cmd: Command) -> AssetResult<EncoderProcess> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(|e| {
            AssetError::writer(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AssetError::writer("failed to open ffmpeg stdin (unexpected)"))?;
        let stderr_drain = drain_stderr(&mut child)?;
        Ok(EncoderProcess {
            child: Some(child),
            stdin: Some(stdin),
            stderr_drain: Some(stderr_drain),
        })
    }

    fn spawn_decoder(&self, mut cmd: Command) -> AssetResult<DecoderProcess> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(|e| {
            AssetError::composition(format!("failed to spawn ffmpeg decoder: {e}"))
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AssetError::composition("failed to open ffmpeg stdout (unexpected)"))?;
        let stderr_drain = drain_stderr(&mut child)?;
        Ok(DecoderProcess {
            child: Some(child),
            stdout: BufReader::new(stdout),
            stderr_drain: Some(stderr_drain),
        })
    }
}

type StderrDrain = JoinHandle<std::io::Result<Vec<u8>>>;

fn drain_stderr(child: &mut Child) -> AssetResult<StderrDrain> {
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| AssetError::writer("failed to open ffmpeg stderr (unexpected)"))?;
    Ok(std::thread::spawn(move || {
        let mut bytes = Vec::new();
        stderr.read_to_end(&mut bytes)?;
        Ok(bytes)
    }))
}

/// Wait for `child`, turning a non-zero exit into an error message carrying stderr.
fn reap(child: Child, stderr_drain: Option<StderrDrain>) -> Result<(), String> {
    let mut child = child;
    let status = child
        .wait()
        .map_err(|e| format!("failed to wait for ffmpeg to finish: {e}"))?;
    let stderr_bytes = match stderr_drain {
        Some(handle) => handle
            .join()
            .map_err(|_| "ffmpeg stderr drain thread panicked".to_string())?
            .map_err(|e| format!("ffmpeg stderr read failed: {e}"))?,
        None => Vec::new(),
    };
    if !status.success() {
        return Err(format!(
            "ffmpeg exited with status {status}: {}",
            String::from_utf8_lossy(&stderr_bytes).trim()
        ));
    }
    Ok(())
}

struct EncoderProcess {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<StderrDrain>,
}

impl EncoderProcess {
    fn write_all(&mut self, bytes: &[u8]) -> AssetResult<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(AssetError::writer("ffmpeg encoder is already finalized"));
        };
        stdin
            .write_all(bytes)
            .map_err(|e| AssetError::writer(format!("failed to write to ffmpeg stdin: {e}")))
    }

    fn finish(&mut self) -> AssetResult<()> {
        drop(self.stdin.take());
        let child = self
            .child
            .take()
            .ok_or_else(|| AssetError::writer("ffmpeg encoder not started"))?;
        reap(child, self.stderr_drain.take()).map_err(AssetError::Writer)
    }
}

impl Drop for EncoderProcess {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

struct DecoderProcess {
    child: Option<Child>,
    stdout: BufReader<ChildStdout>,
    stderr_drain: Option<StderrDrain>,
}

impl DecoderProcess {
    /// Fill `buf` completely. `Ok(false)` on a clean end of stream; a trailing partial read
    /// is truncated into `buf` and reported through `filled`.
    fn read_full(&mut self, buf: &mut [u8], filled: &mut usize) -> AssetResult<bool> {
        *filled = 0;
        while *filled < buf.len() {
            match self.stdout.read(&mut buf[*filled..]) {
                Ok(0) => break,
                Ok(n) => *filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(AssetError::composition(format!(
                        "failed to read decoded media: {e}"
                    )));
                }
            }
        }
        Ok(*filled == buf.len())
    }

    fn finish(&mut self) -> AssetResult<()> {
        match self.child.take() {
            Some(child) => {
                reap(child, self.stderr_drain.take()).map_err(AssetError::CouldNotCreateComposition)
            }
            None => Ok(()),
        }
    }
}

impl Drop for DecoderProcess {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Constant-frame-rate video sink.
///
/// Presentation times are quantized to frame slots: gaps repeat the previous frame and a
/// sample landing on an already written slot is dropped.
struct FfmpegVideoSink {
    proc: EncoderProcess,
    spec: VideoTrackSpec,
    current: Vec<u8>,
    previous: Vec<u8>,
    last_slot: Option<u64>,
}

impl SampleSink for FfmpegVideoSink {
    fn write(&mut self, sample: Sample) -> AssetResult<()> {
        let Sample::Video(v) = sample else {
            return Err(AssetError::writer("audio sample sent to a video track"));
        };
        if v.buffer.width != self.spec.width || v.buffer.height != self.spec.height {
            return Err(AssetError::writer(format!(
                "pixel buffer size mismatch: got {}x{}, expected {}x{}",
                v.buffer.width, v.buffer.height, self.spec.width, self.spec.height
            )));
        }

        let slot = (v.pts.max(0.0) * f64::from(self.spec.fps)).round() as u64;
        if let Some(last) = self.last_slot
            && slot <= last
        {
            tracing::debug!(pts = v.pts, slot, "dropping sample that collides with a written slot");
            return Ok(());
        }

        flatten_argb_over_black(&mut self.current, &v.buffer.data)?;
        if let Some(last) = self.last_slot {
            for _ in last + 1..slot {
                self.proc.write_all(&self.previous)?;
            }
        }
        self.proc.write_all(&self.current)?;
        std::mem::swap(&mut self.current, &mut self.previous);
        self.last_slot = Some(slot);
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> AssetResult<()> {
        self.proc.finish()
    }
}

/// Interleaved `f32le` audio sink; timestamp gaps are padded with silence.
struct FfmpegAudioSink {
    proc: EncoderProcess,
    spec: AudioTrackSpec,
    written_frames: u64,
    bytes: Vec<u8>,
}

impl SampleSink for FfmpegAudioSink {
    fn write(&mut self, sample: Sample) -> AssetResult<()> {
        let Sample::Audio(a) = sample else {
            return Err(AssetError::writer("video sample sent to an audio track"));
        };
        if a.channels != self.spec.channels || a.sample_rate != self.spec.sample_rate {
            return Err(AssetError::writer(format!(
                "audio format mismatch: got {} Hz x{}, expected {} Hz x{}",
                a.sample_rate, a.channels, self.spec.sample_rate, self.spec.channels
            )));
        }

        let rate = f64::from(self.spec.sample_rate);
        let expected = self.written_frames as f64 / rate;
        let gap_frames = ((a.pts - expected) * rate).round();
        let channels = usize::from(self.spec.channels);

        self.bytes.clear();
        if gap_frames >= 1.0 {
            let pad = gap_frames as usize * channels * 4;
            self.bytes.resize(pad, 0);
            self.written_frames += gap_frames as u64;
        }
        for s in &a.pcm {
            self.bytes.extend_from_slice(&s.to_le_bytes());
        }
        self.written_frames += a.frames() as u64;
        self.proc.write_all(&self.bytes)
    }

    fn finish(mut self: Box<Self>) -> AssetResult<()> {
        self.proc.finish()
    }
}

fn flatten_argb_over_black(dst: &mut Vec<u8>, src_premul: &[u8]) -> AssetResult<()> {
    if !src_premul.len().is_multiple_of(BYTES_PER_PIXEL) {
        return Err(AssetError::writer("argb buffer length is not a multiple of 4"));
    }
    dst.clear();
    dst.reserve(src_premul.len());
    // Premultiplied over black keeps the color channels and forces alpha to opaque.
    for px in src_premul.chunks_exact(BYTES_PER_PIXEL) {
        dst.extend_from_slice(&[255, px[1], px[2], px[3]]);
    }
    Ok(())
}

struct FfmpegVideoReader {
    proc: DecoderProcess,
    width: u32,
    height: u32,
    fps: f64,
    index: u64,
    frame: Vec<u8>,
}

impl SampleReader for FfmpegVideoReader {
    fn next_sample(&mut self) -> AssetResult<Option<Sample>> {
        let mut filled = 0;
        let mut frame = std::mem::take(&mut self.frame);
        let complete = self.proc.read_full(&mut frame, &mut filled)?;
        if !complete {
            self.frame = frame;
            self.proc.finish()?;
            return Ok(None);
        }
        // ffmpeg emits straight alpha; decoded video is opaque so it equals premultiplied.
        let data = frame.clone();
        self.frame = frame;
        let pts = self.index as f64 / self.fps;
        self.index += 1;
        Ok(Some(Sample::Video(VideoSample {
            pts,
            buffer: PixelBuffer {
                width: self.width,
                height: self.height,
                data,
            },
        })))
    }
}

struct FfmpegAudioReader {
    proc: DecoderProcess,
    sample_rate: u32,
    channels: u16,
    frames_read: u64,
    chunk: Vec<u8>,
    done: bool,
}

impl SampleReader for FfmpegAudioReader {
    fn next_sample(&mut self) -> AssetResult<Option<Sample>> {
        if self.done {
            return Ok(None);
        }
        let mut filled = 0;
        let mut chunk = std::mem::take(&mut self.chunk);
        let complete = self.proc.read_full(&mut chunk, &mut filled)?;
        let frame_bytes = usize::from(self.channels) * 4;
        let usable = filled - filled % frame_bytes;
        if !complete {
            self.done = true;
            self.proc.finish()?;
        }
        if usable == 0 {
            self.chunk = chunk;
            return Ok(None);
        }

        let pcm: Vec<f32> = chunk[..usable]
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        self.chunk = chunk;
        let pts = self.frames_read as f64 / f64::from(self.sample_rate);
        self.frames_read += (usable / frame_bytes) as u64;
        Ok(Some(Sample::Audio(AudioSample {
            pts,
            sample_rate: self.sample_rate,
            channels: self.channels,
            pcm,
        })))
    }
}

#[derive(serde::Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

#[derive(serde::Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    nb_read_packets: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(serde::Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(serde::Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

fn parse_rational(s: &str) -> Option<f64> {
    let (num, den) = s.split_once('/').unwrap_or((s, "1"));
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    (den != 0.0 && num > 0.0).then_some(num / den)
}

/// Clockwise display rotation of a probed stream.
fn stream_rotation(stream: &ProbeStream) -> i64 {
    // The display matrix reports counter-clockwise degrees; the legacy tag is clockwise.
    if let Some(rot) = stream.side_data_list.iter().find_map(|s| s.rotation) {
        return -(rot.round() as i64);
    }
    stream
        .tags
        .get("rotate")
        .and_then(|r| r.trim().parse::<i64>().ok())
        .unwrap_or(0)
}

fn track_from_stream(stream: &ProbeStream) -> Option<TrackInfo> {
    match stream.codec_type.as_deref()? {
        "video" => {
            let fps = stream
                .avg_frame_rate
                .as_deref()
                .and_then(parse_rational)
                .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rational));
            let count = stream
                .nb_read_packets
                .as_deref()
                .or(stream.nb_frames.as_deref())
                .and_then(|n| n.parse::<usize>().ok())
                .unwrap_or(0);
            let sample_times = match fps {
                Some(fps) => (0..count).map(|i| i as f64 / fps).collect(),
                None => Vec::new(),
            };
            Some(TrackInfo {
                kind: TrackKind::Video,
                natural_size: stream.width.zip(stream.height),
                transform: Orientation::from_rotation_degrees(stream_rotation(stream)).transform(),
                frame_rate: fps,
                sample_rate: None,
                channels: None,
                sample_times,
            })
        }
        "audio" => Some(TrackInfo {
            kind: TrackKind::Audio,
            natural_size: None,
            transform: Affine::IDENTITY,
            frame_rate: None,
            sample_rate: stream.sample_rate.as_deref().and_then(|s| s.parse().ok()),
            channels: stream.channels,
            sample_times: Vec::new(),
        }),
        _ => None,
    }
}

/// Encoder pixel format. 4:2:0 subsampling needs even dimensions, so odd frame sizes are
/// kept exact with 4:4:4 instead of being cropped or padded.
fn output_pix_fmt(width: u32, height: u32) -> &'static str {
    if width.is_multiple_of(2) && height.is_multiple_of(2) {
        "yuv420p"
    } else {
        "yuv444p"
    }
}

impl MediaBackend for FfmpegBackend {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn open_sink(&self, path: &Path, spec: &TrackSpec) -> AssetResult<Box<dyn SampleSink>> {
        ensure_parent_dir(path)?;
        let mut cmd = self.command();
        cmd.arg("-y");

        match spec {
            TrackSpec::Video(v) => {
                if v.width == 0 || v.height == 0 || v.fps == 0 {
                    return Err(AssetError::configuration(
                        "video track needs non-zero size and fps",
                    ));
                }
                cmd.args([
                    "-f",
                    "rawvideo",
                    "-pix_fmt",
                    "argb",
                    "-s",
                    &format!("{}x{}", v.width, v.height),
                    "-r",
                    &v.fps.to_string(),
                    "-i",
                    "pipe:0",
                    "-an",
                    "-c:v",
                    "libx264",
                    "-pix_fmt",
                    output_pix_fmt(v.width, v.height),
                ]);
                let rotation = orientation_from_transform(v.transform).0.rotation_degrees();
                if rotation != 0 {
                    cmd.args(["-metadata:s:v:0", &format!("rotate={rotation}")]);
                }
                cmd.arg(path);
                let proc = self.spawn_encoder(cmd)?;
                let frame_len = v.width as usize * v.height as usize * BYTES_PER_PIXEL;
                Ok(Box::new(FfmpegVideoSink {
                    proc,
                    spec: v.clone(),
                    current: Vec::with_capacity(frame_len),
                    previous: Vec::with_capacity(frame_len),
                    last_slot: None,
                }))
            }
            TrackSpec::Audio(a) => {
                if a.sample_rate == 0 || a.channels == 0 {
                    return Err(AssetError::configuration(
                        "audio sample_rate/channels must be non-zero",
                    ));
                }
                cmd.args([
                    "-f",
                    "f32le",
                    "-ar",
                    &a.sample_rate.to_string(),
                    "-ac",
                    &a.channels.to_string(),
                    "-i",
                    "pipe:0",
                    "-vn",
                    "-c:a",
                    "aac",
                ])
                .arg(path);
                let proc = self.spawn_encoder(cmd)?;
                Ok(Box::new(FfmpegAudioSink {
                    proc,
                    spec: *a,
                    written_frames: 0,
                    bytes: Vec::new(),
                }))
            }
        }
    }

    fn probe(&self, path: &Path) -> AssetResult<MediaInfo> {
        let out = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-count_packets",
                "-print_format",
                "json",
                "-show_streams",
                "-show_format",
            ])
            .arg(path)
            .output()
            .map_err(|e| AssetError::composition(format!("failed to run ffprobe: {e}")))?;
        if !out.status.success() {
            return Err(AssetError::composition(format!(
                "ffprobe failed for '{}': {}",
                path.display(),
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }

        let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
            .map_err(|e| AssetError::composition(format!("ffprobe json parse failed: {e}")))?;
        let format = parsed.format.unwrap_or(ProbeFormat {
            duration: None,
            tags: BTreeMap::new(),
        });

        let timed_metadata = read_timed_metadata(path).unwrap_or_else(|e| {
            tracing::debug!(path = %path.display(), error = %e, "no readable timed metadata");
            Vec::new()
        });

        Ok(MediaInfo {
            duration: format
                .duration
                .as_deref()
                .and_then(|d| d.parse().ok())
                .unwrap_or(0.0),
            tracks: parsed.streams.iter().filter_map(track_from_stream).collect(),
            metadata: format.tags,
            timed_metadata,
        })
    }

    fn open_reader(&self, path: &Path, kind: TrackKind) -> AssetResult<Box<dyn SampleReader>> {
        let info = self.probe(path)?;
        match kind {
            TrackKind::Video => {
                let track = info.video_track().ok_or(AssetError::CouldNotAccessVideoTrack)?;
                let (width, height) = track
                    .natural_size
                    .ok_or(AssetError::CouldNotAccessVideoTrack)?;
                let fps = track.frame_rate.unwrap_or(30.0);
                let mut cmd = self.command();
                cmd.args(["-noautorotate", "-i"])
                    .arg(path)
                    .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "argb", "pipe:1"]);
                let proc = self.spawn_decoder(cmd)?;
                Ok(Box::new(FfmpegVideoReader {
                    proc,
                    width,
                    height,
                    fps,
                    index: 0,
                    frame: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
                }))
            }
            TrackKind::Audio => {
                let track = info.audio_tracks().next().ok_or_else(|| {
                    AssetError::composition(format!("no audio track in '{}'", path.display()))
                })?;
                let sample_rate = track.sample_rate.unwrap_or(48_000);
                let channels = track.channels.unwrap_or(2);
                let mut cmd = self.command();
                cmd.arg("-i").arg(path).args([
                    "-map",
                    "0:a:0",
                    "-f",
                    "f32le",
                    "-acodec",
                    "pcm_f32le",
                    "-ar",
                    &sample_rate.to_string(),
                    "-ac",
                    &channels.to_string(),
                    "pipe:1",
                ]);
                let proc = self.spawn_decoder(cmd)?;
                Ok(Box::new(FfmpegAudioReader {
                    proc,
                    sample_rate,
                    channels,
                    frames_read: 0,
                    chunk: vec![0; AUDIO_CHUNK_FRAMES * usize::from(channels) * 4],
                    done: false,
                }))
            }
            TrackKind::Metadata => Err(AssetError::composition(
                "timed metadata tracks cannot be decoded as samples",
            )),
        }
    }

    fn frame_at(&self, path: &Path, seconds: f64) -> AssetResult<RgbaImage> {
        let info = self.probe(path)?;
        let (width, height) = info
            .video_track()
            .and_then(|t| t.natural_size)
            .ok_or(AssetError::CouldNotAccessVideoTrack)?;

        let out = self
            .command()
            .args(["-ss", &format!("{:.6}", seconds.max(0.0)), "-noautorotate", "-i"])
            .arg(path)
            .args([
                "-frames:v",
                "1",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgba",
                "pipe:1",
            ])
            .output()
            .map_err(|e| AssetError::composition(format!("failed to run ffmpeg: {e}")))?;
        if !out.status.success() {
            return Err(AssetError::composition(format!(
                "ffmpeg frame extraction failed for '{}': {}",
                path.display(),
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        let expected = width as usize * height as usize * 4;
        if out.stdout.len() < expected {
            return Err(AssetError::composition(format!(
                "ffmpeg returned no frame at {seconds:.3}s for '{}'",
                path.display()
            )));
        }
        RgbaImage::from_raw(width, height, out.stdout[..expected].to_vec())
            .ok_or_else(|| AssetError::composition("decoded frame has unexpected size"))
    }

    fn mux(&self, request: &MuxRequest) -> AssetResult<()> {
        remove_if_exists(&request.output)?;
        ensure_parent_dir(&request.output)?;

        let mut cmd = self.command();
        cmd.arg("-y");
        for input in &request.inputs {
            cmd.arg("-i").arg(&input.path);
        }
        for (idx, input) in request.inputs.iter().enumerate() {
            let selector = match input.kind {
                TrackKind::Video => "v",
                TrackKind::Audio => "a",
                TrackKind::Metadata => "d",
            };
            cmd.args(["-map", &format!("{idx}:{selector}:0")]);
        }
        cmd.args(["-c", "copy"]);

        if !request.metadata.is_empty() {
            cmd.args(["-movflags", "use_metadata_tags"]);
        }
        for item in &request.metadata {
            cmd.args([
                "-metadata",
                &format!("{}={}", item.key.wire_key(), item.value),
            ]);
        }
        cmd.arg(&request.output);

        let out = cmd
            .output()
            .map_err(|e| AssetError::export_session(format!("failed to run ffmpeg: {e}")))?;
        if !out.status.success() {
            return Err(AssetError::composition(format!(
                "ffmpeg mux into '{}' failed: {}",
                request.output.display(),
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        if let Err(e) = append_timed_metadata_tracks(&request.output, &request.timed_metadata) {
            let _ = remove_if_exists(&request.output);
            return Err(e);
        }
        Ok(())
    }
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "../../tests/unit/media/ffmpeg.rs"]
mod tests;
