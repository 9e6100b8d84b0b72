use anyhow::{anyhow, bail, Context, Result};
use opencv::{core, imgproc, prelude::*, videoio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::frame::FrameData;
use crate::core::frame_queue::FrameQueue;

/// Consecutive decode failures tolerated before the stream is declared dead.
/// A single corrupt packet is skipped; a wall of them means the source is gone.
const MAX_CONSECUTIVE_FAILURES: u32 = 30;

pub struct VideoDecoder {
    capture: videoio::VideoCapture,
    width: u32,
    height: u32,
    fps: f64,
}

impl VideoDecoder {
    /// Opens the input and validates that it carries a video stream.
    /// All structural failures surface here, before any thread is spawned.
    pub fn new(path: &str, width: u32, height: u32) -> Result<Self> {
        // CAP_ANY lets OpenCV pick the platform backend
        // (AVFoundation / Media Foundation / V4L2-GStreamer).
        let mut capture = videoio::VideoCapture::from_file(path, videoio::CAP_ANY)
            .with_context(|| format!("could not open {path}"))?;

        // Best effort; not every backend honors it.
        let _ = capture.set(
            videoio::CAP_PROP_HW_ACCELERATION,
            videoio::VIDEO_ACCELERATION_ANY as f64,
        );

        if !capture.is_opened()? {
            bail!("could not open {path}");
        }

        let fps = capture.get(videoio::CAP_PROP_FPS)?;
        let src_width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let src_height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
        if src_width == 0 || src_height == 0 {
            bail!("no video stream found in {path}");
        }

        tracing::info!(source = path, src_width, src_height, fps, "opened video");

        Ok(Self {
            capture,
            width,
            height,
            fps,
        })
    }

    /// Frame rate reported by the container, for logging and diagnostics.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Runs the decode loop on a worker thread until end of stream,
    /// cancellation, or a closed queue. The queue is closed on every exit
    /// path so the render side always observes end of stream.
    pub fn spawn_decoding_thread(
        mut self,
        queue: Arc<FrameQueue>,
        cancel: Arc<AtomicBool>,
    ) -> JoinHandle<Result<()>> {
        thread::spawn(move || {
            let result = self.decode_loop(&queue, &cancel);
            queue.close();
            result
        })
    }

    fn decode_loop(&mut self, queue: &FrameQueue, cancel: &AtomicBool) -> Result<()> {
        let mut consecutive_failures = 0u32;
        let mut frames = 0u64;

        while !cancel.load(Ordering::SeqCst) {
            let mut buffer = Vec::new();
            match self.read_frame_into(&mut buffer) {
                Ok(true) => {
                    consecutive_failures = 0;
                    let frame = FrameData::new(buffer, self.width, self.height);
                    if queue.push(frame).is_err() {
                        // Render side shut down first.
                        break;
                    }
                    frames += 1;
                }
                Ok(false) => break, // end of stream
                Err(e) => {
                    consecutive_failures += 1;
                    tracing::warn!(error = %e, "skipping undecodable frame");
                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        bail!("decoder failed {consecutive_failures} frames in a row");
                    }
                }
            }
        }

        tracing::debug!(frames, "decode loop finished");
        Ok(())
    }

    /// Decodes and converts one frame into `buffer` as a packed RGB24
    /// canvas of the target size, centered with black letterboxing.
    /// `Ok(false)` means end of stream.
    fn read_frame_into(&mut self, buffer: &mut Vec<u8>) -> Result<bool> {
        let mut frame = Mat::default();
        if !self.capture.read(&mut frame)? {
            return Ok(false);
        }
        if frame.empty() {
            return Ok(false);
        }

        // Scale into the target box, keeping the source aspect ratio.
        let orig_w = frame.cols();
        let orig_h = frame.rows();
        let scale_w = self.width as f64 / orig_w as f64;
        let scale_h = self.height as f64 / orig_h as f64;
        let scale = scale_w.min(scale_h);
        let new_w = ((orig_w as f64 * scale).round() as i32).max(1);
        let new_h = ((orig_h as f64 * scale).round() as i32).max(1);
        let mut resized = Mat::default();
        imgproc::resize(
            &frame,
            &mut resized,
            core::Size::new(new_w, new_h),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;

        // Center on a black canvas of exactly the target size.
        let mut canvas = Mat::zeros(self.height as i32, self.width as i32, frame.typ())?.to_mat()?;
        let x_off = ((self.width as i32 - resized.cols()) / 2).max(0);
        let y_off = ((self.height as i32 - resized.rows()) / 2).max(0);
        let roi = core::Rect::new(x_off, y_off, resized.cols(), resized.rows());
        let mut canvas_roi = Mat::roi_mut(&mut canvas, roi)?;
        resized.copy_to(&mut canvas_roi)?;

        let mut rgb = Mat::default();
        imgproc::cvt_color(
            &canvas,
            &mut rgb,
            imgproc::COLOR_BGR2RGB,
            0,
            core::AlgorithmHint::ALGO_HINT_DEFAULT,
        )?;

        if !rgb.is_continuous() {
            return Err(anyhow!("frame data is not continuous"));
        }
        buffer.clear();
        buffer.extend_from_slice(rgb.data_bytes()?);
        Ok(true)
    }
}
