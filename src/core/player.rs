use anyhow::{anyhow, bail, Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyModifiers};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::core::frame_queue::{FrameQueue, DEFAULT_CAPACITY};
use crate::decoder::VideoDecoder;
use crate::renderer::{CellData, DisplayManager, DisplayMode, FrameProcessor};

/// One playback run. Owns the shared frame queue, the cancel flag, the
/// decode thread handle, and the terminal; everything lives exactly as
/// long as the session. Dropping the session restores the terminal.
pub struct PlaybackSession {
    queue: Arc<FrameQueue>,
    cancel: Arc<AtomicBool>,
    decode_thread: Option<JoinHandle<Result<()>>>,
    display: DisplayManager,
    processor: FrameProcessor,
    cells: Vec<CellData>,
    canvas_width: usize,
    frame_duration: Duration,
}

impl PlaybackSession {
    /// Sizes the canvas from the terminal, opens the decoder (all fatal
    /// startup errors surface here), and spawns the decode thread.
    pub fn start(video_path: &str, frame_rate: f64, mode: DisplayMode) -> Result<Self> {
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            bail!("frame rate must be a positive number, got {frame_rate}");
        }

        let display = DisplayManager::new(mode)?;
        let (cols, rows) = display.size().context("could not query terminal size")?;
        // Half-block cells pack two pixel rows into one character row.
        let canvas_width = cols as usize;
        let canvas_height = rows as usize * 2;

        let decoder = VideoDecoder::new(video_path, canvas_width as u32, canvas_height as u32)?;
        tracing::debug!(
            source_fps = decoder.fps(),
            target_fps = frame_rate,
            canvas_width,
            canvas_height,
            "starting playback"
        );

        let queue = Arc::new(FrameQueue::new(DEFAULT_CAPACITY));
        let cancel = Arc::new(AtomicBool::new(false));

        // Ctrl-C must also wake a decoder blocked on a full queue, which
        // closing the queue does.
        {
            let cancel = Arc::clone(&cancel);
            let queue = Arc::clone(&queue);
            ctrlc::set_handler(move || {
                cancel.store(true, Ordering::SeqCst);
                queue.close();
            })
            .context("could not register Ctrl-C handler")?;
        }

        let decode_thread = decoder.spawn_decoding_thread(Arc::clone(&queue), Arc::clone(&cancel));

        let processor = FrameProcessor::new(canvas_width, canvas_height);
        let cells = vec![CellData::default(); processor.cell_count()];

        Ok(Self {
            queue,
            cancel,
            decode_thread: Some(decode_thread),
            display,
            processor,
            cells,
            canvas_width,
            frame_duration: Duration::from_secs_f64(1.0 / frame_rate),
        })
    }

    /// The render loop. One tick per frame period: take at most one frame,
    /// paint it, never wait on the decoder. An empty queue is a skipped
    /// tick (the previous frame stays on screen), not an error. Ends when
    /// cancelled, quit, or the queue is closed and drained.
    pub fn run(mut self) -> Result<()> {
        let start = Instant::now();
        let mut tick: u32 = 0;

        loop {
            let due = self.frame_duration * tick;
            let elapsed = start.elapsed();
            if due > elapsed {
                thread::sleep(due - elapsed);
            }
            tick = tick.saturating_add(1);

            if self.cancel.load(Ordering::SeqCst) || self.quit_requested()? {
                break;
            }

            match self.queue.try_pop() {
                Some(frame) => {
                    self.processor.process_frame_into(&frame.buffer, &mut self.cells);
                    self.display.render_diff(&self.cells, self.canvas_width)?;
                }
                // Drained and the decoder is gone: playback is over.
                None if self.queue.is_closed() => break,
                None => {}
            }
        }

        self.shutdown()
    }

    fn quit_requested(&self) -> Result<bool> {
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                let ctrl_c = key.code == KeyCode::Char('c')
                    && key.modifiers.contains(KeyModifiers::CONTROL);
                if key.code == KeyCode::Char('q') || key.code == KeyCode::Esc || ctrl_c {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn shutdown(&mut self) -> Result<()> {
        self.cancel.store(true, Ordering::SeqCst);
        self.queue.close();
        match self.decode_thread.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(_) => Err(anyhow!("decode thread panicked")),
            },
            None => Ok(()),
        }
    }
}

pub fn play(video_path: &str, frame_rate: f64, mode: DisplayMode) -> Result<()> {
    PlaybackSession::start(video_path, frame_rate, mode)?.run()
}
