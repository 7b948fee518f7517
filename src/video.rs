//! Video container I/O through the system `ffmpeg` and `ffprobe` binaries.
//!
//! Decoding streams raw frames out of `ffmpeg` over a pipe and encoding
//! streams them back in, so any container and codec the local `ffmpeg`
//! supports can be used. Both binaries must be on `PATH` (or configured in
//! [`FfmpegOptions`]); if they are missing the export fails with an I/O
//! error rather than falling back to anything else.

use std::ffi::OsString;
use std::fs;
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pipeline::{FrameSink, FrameSource};
use crate::raster::{ChannelOrder, Raster};

/// Frame rate assumed when the container does not report a usable one.
pub const DEFAULT_FPS: f64 = 30.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegOptions {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    /// Video encoder passed to `-c:v`.
    pub codec: String,
    /// Constant rate factor for encoders that support it.
    pub crf: u8,
}

impl Default for FfmpegOptions {
    fn default() -> Self {
        FfmpegOptions {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            codec: "libx264".to_string(),
            crf: 18,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: usize,
    pub height: usize,
    pub fps: f64,
    /// Exact frame count from the container header, if it has one.
    pub frame_count: Option<usize>,
    /// `duration * fps`, for progress when the header has no frame count.
    pub estimated_frames: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<usize>,
    height: Option<usize>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

/// Reads the dimensions, frame rate and frame count of the first video
/// stream in `path`.
pub fn probe(path: &Path, options: &FfmpegOptions) -> Result<VideoInfo> {
    let output = Command::new(&options.ffprobe)
        .args(probe_args(path))
        .output()
        .map_err(|e| Error::io(format!("failed to run {}", options.ffprobe.display()), e))?;
    if !output.status.success() {
        return Err(Error::Decode(format!(
            "cannot open {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    parse_probe(&output.stdout)
}

fn probe_args(path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-v",
        "error",
        "-select_streams",
        "v:0",
        "-show_entries",
        "stream=width,height,r_frame_rate,avg_frame_rate,nb_frames,duration:format=duration",
        "-of",
        "json",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(path.as_os_str().to_owned());
    args
}

fn parse_probe(json: &[u8]) -> Result<VideoInfo> {
    let probe: ProbeOutput = serde_json::from_slice(json)
        .map_err(|e| Error::Decode(format!("unreadable ffprobe output: {e}")))?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| Error::Decode("no video stream found".to_string()))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(Error::Decode("video stream has no dimensions".to_string())),
    };
    let fps = stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.avg_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or_else(|| {
            warn!("no usable frame rate reported, assuming {DEFAULT_FPS}");
            DEFAULT_FPS
        });
    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.trim().parse::<usize>().ok())
        .filter(|&n| n > 0);
    let duration = stream
        .duration
        .as_deref()
        .and_then(parse_seconds)
        .or_else(|| {
            probe
                .format
                .as_ref()
                .and_then(|f| f.duration.as_deref())
                .and_then(parse_seconds)
        });
    let estimated_frames = frame_count.or_else(|| {
        duration
            .map(|secs| (secs * fps).round() as usize)
            .filter(|&n| n > 0)
    });

    Ok(VideoInfo {
        width,
        height,
        fps,
        frame_count,
        estimated_frames,
    })
}

fn parse_seconds(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs > 0.0)
}

/// Parses rates such as `"25"`, `"29.97"` or `"30000/1001"`.
pub fn parse_frame_rate(text: &str) -> Option<f64> {
    let fps = match text.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            num / den
        }
        None => text.trim().parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

fn pix_fmt(order: ChannelOrder) -> &'static str {
    match order {
        ChannelOrder::Rgb => "rgb24",
        ChannelOrder::Bgr => "bgr24",
    }
}

/// Splits a byte stream of packed 8-bit frames into rasters.
pub struct RawFrameReader<R> {
    reader: R,
    width: usize,
    height: usize,
    order: ChannelOrder,
    strict: bool,
    frame_count: Option<usize>,
    frames_read: usize,
}

impl<R: Read> RawFrameReader<R> {
    pub fn new(reader: R, width: usize, height: usize, order: ChannelOrder, strict: bool) -> Self {
        RawFrameReader {
            reader,
            width,
            height,
            order,
            strict,
            frame_count: None,
            frames_read: 0,
        }
    }

    pub fn with_frame_count(mut self, frame_count: Option<usize>) -> Self {
        self.frame_count = frame_count;
        self
    }

    pub fn frames_read(&self) -> usize {
        self.frames_read
    }
}

impl<R: Read + Send> FrameSource for RawFrameReader<R> {
    fn next_frame(&mut self) -> Result<Option<Raster>> {
        let frame_len = self.width * self.height * 3;
        let mut buffer = vec![0u8; frame_len];
        let filled = read_full(&mut self.reader, &mut buffer)
            .map_err(|e| Error::io("failed to read decoded frames", e))?;

        if filled == 0 {
            return Ok(None);
        }
        if filled < frame_len {
            if self.strict {
                return Err(Error::Decode(format!(
                    "frame {} truncated: {filled} of {frame_len} bytes",
                    self.frames_read
                )));
            }
            warn!(
                "frame {} truncated ({filled} of {frame_len} bytes), ending stream",
                self.frames_read
            );
            return Ok(None);
        }

        self.frames_read += 1;
        Raster::from_raw(self.width, self.height, buffer, self.order).map(Some)
    }

    fn frame_count(&self) -> Option<usize> {
        self.frame_count
    }
}

fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Decodes a video file into RGB frames.
///
/// The end of the decoder's output is only treated as the end of the video
/// when the decoder also exits cleanly; a failed or crashed decoder turns
/// into a [`Error::Decode`].
pub struct FfmpegSource {
    child: Child,
    frames: RawFrameReader<ChildStdout>,
    info: VideoInfo,
    path: PathBuf,
}

impl FfmpegSource {
    pub fn open(path: &Path, options: &FfmpegOptions, strict: bool) -> Result<Self> {
        let info = probe(path, options)?;
        let mut child = Command::new(&options.ffmpeg)
            .args(decode_args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| Error::io(format!("failed to run {}", options.ffmpeg.display()), e))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Decode("decoder output pipe unavailable".to_string()))?;

        info!(
            "opened {} ({}x{}, {:.3} fps, {} frames)",
            path.display(),
            info.width,
            info.height,
            info.fps,
            match (info.frame_count, info.estimated_frames) {
                (Some(n), _) => n.to_string(),
                (None, Some(n)) => format!("about {n}"),
                (None, None) => "unknown".to_string(),
            }
        );
        let frames = RawFrameReader::new(stdout, info.width, info.height, ChannelOrder::Rgb, strict)
            .with_frame_count(info.frame_count);
        Ok(FfmpegSource {
            child,
            frames,
            info,
            path: path.to_path_buf(),
        })
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    /// Reaps the decoder once its output has ended.
    fn check_decoder(&mut self) -> Result<()> {
        let status = self
            .child
            .wait()
            .map_err(|e| Error::io("failed to wait for decoder", e))?;
        if !status.success() {
            return Err(Error::Decode(format!(
                "decoder for {} exited with {status} after {} frames",
                self.path.display(),
                self.frames.frames_read()
            )));
        }
        Ok(())
    }
}

fn decode_args(path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-v".into(),
        "error".into(),
        "-nostdin".into(),
        // Keep frames at the size ffprobe reported.
        "-noautorotate".into(),
        "-i".into(),
    ];
    args.push(path.as_os_str().to_owned());
    args.extend(
        ["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"]
            .iter()
            .map(OsString::from),
    );
    args
}

impl FrameSource for FfmpegSource {
    fn next_frame(&mut self) -> Result<Option<Raster>> {
        match self.frames.next_frame() {
            Ok(None) => {
                self.check_decoder()?;
                Ok(None)
            }
            Err(Error::Decode(msg)) => {
                self.check_decoder()?;
                Err(Error::Decode(msg))
            }
            other => other,
        }
    }

    fn frame_count(&self) -> Option<usize> {
        self.frames.frame_count()
    }

    fn estimated_frame_count(&self) -> Option<usize> {
        self.info.estimated_frames
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        // The decoder may still be running if the export stopped early.
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Encodes frames into a video file. Audio is never written.
pub struct FfmpegSink {
    child: Child,
    stdin: Option<ChildStdin>,
    width: usize,
    height: usize,
    order: ChannelOrder,
    path: PathBuf,
    frames: usize,
}

impl FfmpegSink {
    pub fn create(
        path: &Path,
        width: usize,
        height: usize,
        fps: f64,
        order: ChannelOrder,
        options: &FfmpegOptions,
    ) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| Error::io(format!("failed to create {}", parent.display()), e))?;
        }
        let mut child = Command::new(&options.ffmpeg)
            .args(encode_args(path, width, height, fps, order, options))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| Error::io(format!("failed to run {}", options.ffmpeg.display()), e))?;
        let stdin = child.stdin.take();
        debug!(
            "encoding {}x{} {} frames at {fps} fps into {}",
            width,
            height,
            pix_fmt(order),
            path.display()
        );
        Ok(FfmpegSink {
            child,
            stdin,
            width,
            height,
            order,
            path: path.to_path_buf(),
            frames: 0,
        })
    }
}

fn encode_args(
    path: &Path,
    width: usize,
    height: usize,
    fps: f64,
    order: ChannelOrder,
    options: &FfmpegOptions,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-y".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        pix_fmt(order).to_string(),
        "-s".to_string(),
        format!("{width}x{height}"),
        "-r".to_string(),
        format!("{fps}"),
        "-i".to_string(),
        "-".to_string(),
        "-an".to_string(),
        "-c:v".to_string(),
        options.codec.clone(),
        "-crf".to_string(),
        options.crf.to_string(),
        // yuv420p needs even dimensions; odd dome sizes get one black column/row.
        "-vf".to_string(),
        "pad=ceil(iw/2)*2:ceil(ih/2)*2".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push(path.as_os_str().to_owned());
    args
}

impl FrameSink for FfmpegSink {
    fn write_frame(&mut self, frame: &Raster) -> Result<()> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(Error::invalid(format!(
                "frame is {}x{}, encoder expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Encode("encoder already finished".to_string()))?;
        let swapped;
        let bytes = if frame.order() == self.order {
            frame.as_bytes()
        } else {
            swapped = frame.with_order(self.order);
            swapped.as_bytes()
        };
        stdin.write_all(bytes).map_err(|e| match e.kind() {
            ErrorKind::BrokenPipe => {
                Error::Encode(format!("encoder for {} exited early", self.path.display()))
            }
            _ => Error::io(format!("failed to write {}", self.path.display()), e),
        })?;
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        drop(self.stdin.take());
        let status = self
            .child
            .wait()
            .map_err(|e| Error::io("failed to wait for encoder", e))?;
        if !status.success() {
            return Err(Error::Encode(format!(
                "encoder for {} exited with {status}",
                self.path.display()
            )));
        }
        info!("wrote {} frames to {}", self.frames, self.path.display());
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.stdin.take().is_some() {
            let _ = self.child.wait();
        }
    }
}
