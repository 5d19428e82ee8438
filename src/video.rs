// video.rs — image-sequence video source decoded on a background thread
//
// A directory of frames (sorted by file name) or a single still image. The
// decoder thread paces itself to the requested frame rate and loops; a full
// channel blocks it, so at most two decoded frames wait in memory.

use crate::render::{VideoFrame, VideoSource};
use image::io::Reader as ImageReader;
use image::{GenericImageView, RgbaImage};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const FRAME_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no frames (jpg, jpeg, png, bmp) under {}", .0.display())]
    NoFrames(PathBuf),
}

pub struct FrameSequence {
    rx: Receiver<RgbaImage>,
    current: Option<RgbaImage>,
    fresh: bool,
    disconnected: bool,
}

impl FrameSequence {
    /// Starts decoding `path` (a frame directory or one image) at `fps`.
    /// Frames larger than `max_dimension` on either side are downscaled.
    pub fn open(path: &Path, fps: f32, max_dimension: u32) -> Result<Self, VideoError> {
        let files = collect_frames(path)?;
        if files.is_empty() {
            return Err(VideoError::NoFrames(path.to_path_buf()));
        }
        log::info!("playing {} frame(s) from {} at {fps} fps", files.len(), path.display());

        let interval = Duration::from_secs_f32(1.0 / fps.max(0.1));
        let (tx, rx) = sync_channel(2);
        thread::Builder::new()
            .name("frame-decoder".into())
            .spawn(move || decode_loop(files, interval, max_dimension, tx))?;

        Ok(Self {
            rx,
            current: None,
            fresh: false,
            disconnected: false,
        })
    }

    /// Pulls everything the decoder produced and keeps the newest frame.
    fn drain(&mut self) {
        if self.disconnected {
            return;
        }
        loop {
            match self.rx.try_recv() {
                Ok(frame) => {
                    self.current = Some(frame);
                    self.fresh = true;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    log::debug!("frame decoder finished");
                    self.disconnected = true;
                    break;
                }
            }
        }
    }
}

impl VideoSource for FrameSequence {
    fn is_ready(&mut self) -> bool {
        self.drain();
        self.fresh
    }

    fn current_frame(&mut self) -> Option<VideoFrame<'_>> {
        self.drain();
        self.fresh = false;
        self.current.as_ref().map(|img| VideoFrame {
            width: img.width(),
            height: img.height(),
            pixels: img.as_raw(),
        })
    }
}

/// Frame files under `path`, sorted by name. A file path yields itself.
pub fn collect_frames(path: &Path) -> Result<Vec<PathBuf>, VideoError> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_frame_extension(p))
        .collect();
    files.sort();
    Ok(files)
}

fn has_frame_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FRAME_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

fn decode_loop(files: Vec<PathBuf>, interval: Duration, max_dimension: u32, tx: SyncSender<RgbaImage>) {
    let still = files.len() == 1;
    loop {
        let mut decoded = 0usize;
        for path in &files {
            let started = Instant::now();
            match decode_frame(path, max_dimension) {
                Ok(frame) => {
                    decoded += 1;
                    if tx.send(frame).is_err() {
                        // receiver dropped: viewer closed
                        return;
                    }
                }
                Err(e) => log::warn!("skipping frame {}: {e}", path.display()),
            }
            if still {
                return;
            }
            thread::sleep(interval.saturating_sub(started.elapsed()));
        }
        if decoded == 0 {
            log::error!("no frame in the sequence could be decoded; stopping playback");
            return;
        }
    }
}

/// Decodes one frame to RGBA8, downscaling it to fit `max_dimension`.
pub fn decode_frame(path: &Path, max_dimension: u32) -> Result<RgbaImage, image::ImageError> {
    let reader = BufReader::new(File::open(path).map_err(image::ImageError::IoError)?);
    let img = ImageReader::new(reader)
        .with_guessed_format()
        .map_err(image::ImageError::IoError)
        .and_then(|mut r| {
            r.no_limits();
            r.decode()
        })?;

    let (w, h) = (img.width(), img.height());
    if max_dimension > 0 && (w > max_dimension || h > max_dimension) {
        let scale = max_dimension as f32 / w.max(h) as f32;
        let new_w = ((w as f32 * scale) as u32).max(1);
        let new_h = ((h as f32 * scale) as u32).max(1);
        log::warn!("frame {w}x{h} exceeds GPU limit {max_dimension}, scaled to {new_w}x{new_h}");
        return Ok(img
            .resize(new_w, new_h, image::imageops::FilterType::Lanczos3)
            .to_rgba8());
    }
    Ok(img.to_rgba8())
}
