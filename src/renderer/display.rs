use anyhow::{anyhow, Result};
use crossterm::terminal;
use std::io::{BufWriter, Write};
use std::thread::JoinHandle;

use super::cell::CellData;

#[derive(Copy, Clone, PartialEq, Eq, Debug, clap::ValueEnum)]
pub enum DisplayMode {
    /// Truecolor half-block cells.
    Rgb,
    /// Plain grayscale glyph ramp, no color escapes.
    Ascii,
}

/// Squared RGB distance below which a repaint of an unchanged glyph is
/// skipped. Noisy sources flip colors by a hair every frame; repainting
/// those cells costs more bandwidth than the eye can see.
const DIFF_THRESHOLD: i32 = 100;

const ASCII_RAMP: &[u8] = b" .:-=+*#%@";

/// Terminal output stage. Owns raw mode and the alternate screen, renders
/// cell-grid diffs into an escape-sequence buffer, and hands finished
/// buffers to a dedicated writer thread over a bounded channel so a slow
/// terminal never stalls the render tick.
pub struct DisplayManager {
    tx: Option<crossbeam_channel::Sender<Vec<u8>>>,
    writer: Option<JoinHandle<()>>,
    mode: DisplayMode,
    last_cells: Vec<CellData>,
    render_buffer: Vec<u8>,
}

impl DisplayManager {
    pub fn new(mode: DisplayMode) -> Result<Self> {
        // Capacity 2: one paint in flight, one waiting. Anything beyond
        // that is dropped in render_diff rather than queued up as lag.
        let (tx, rx) = crossbeam_channel::bounded::<Vec<u8>>(2);
        let writer = std::thread::spawn(move || {
            let mut out = BufWriter::with_capacity(1 << 20, std::io::stdout());
            while let Ok(chunk) = rx.recv() {
                if out.write_all(&chunk).and_then(|_| out.flush()).is_err() {
                    break;
                }
            }
        });

        let mut display = Self {
            tx: Some(tx),
            writer: Some(writer),
            mode,
            last_cells: Vec::new(),
            render_buffer: Vec::with_capacity(1 << 20),
        };
        display.enter_terminal()?;
        Ok(display)
    }

    fn enter_terminal(&mut self) -> Result<()> {
        terminal::enable_raw_mode()?;
        let mut seq = Vec::new();
        seq.extend_from_slice(b"\x1b[?1049h"); // alternate screen
        seq.extend_from_slice(b"\x1b[?25l"); // hide cursor
        seq.extend_from_slice(b"\x1b[?7l"); // no line wrap
        seq.extend_from_slice(b"\x1b[2J");
        self.send_blocking(seq);
        Ok(())
    }

    /// Terminal size in character cells.
    pub fn size(&self) -> Result<(u16, u16)> {
        Ok(terminal::size()?)
    }

    /// Paints the difference between `cells` and the previously rendered
    /// grid. `width` is the cell-grid width; the content is centered in
    /// the live terminal. If the writer thread is still busy with the
    /// previous paint, this one is dropped instead of queued.
    pub fn render_diff(&mut self, cells: &[CellData], width: usize) -> Result<()> {
        if width == 0 {
            return Ok(());
        }
        self.render_buffer.clear();

        let force_redraw = self.last_cells.len() != cells.len();
        if force_redraw {
            self.render_buffer.extend_from_slice(b"\x1b[2J");
            self.last_cells = vec![CellData::default(); cells.len()];
        }

        let buffer = &mut self.render_buffer;
        buffer.extend_from_slice(b"\x1b[?2026h"); // begin synchronized update

        let (term_cols, term_rows) = terminal::size().unwrap_or((80, 24));
        let content_width = width as u16;
        let content_height = (cells.len() / width) as u16;
        let offset_x = term_cols.saturating_sub(content_width) / 2;
        let offset_y = term_rows.saturating_sub(content_height) / 2;

        let mut last_fg: Option<(u8, u8, u8)> = None;
        let mut last_bg: Option<(u8, u8, u8)> = None;
        // Where the terminal cursor will be after the last emitted cell;
        // None forces an explicit move before the next write.
        let mut cursor: Option<(u16, u16)> = None;

        for (i, cell) in cells.iter().enumerate() {
            let old = &self.last_cells[i];
            let changed = force_redraw
                || cell.ch != old.ch
                || color_distance_sq(cell.fg, old.fg) > DIFF_THRESHOLD
                || color_distance_sq(cell.bg, old.bg) > DIFF_THRESHOLD;
            if !changed {
                cursor = None;
                continue;
            }

            let x = (i % width) as u16 + offset_x;
            let y = (i / width) as u16 + offset_y;
            if x >= term_cols || y >= term_rows {
                cursor = None;
                continue;
            }

            if cursor != Some((x, y)) {
                buffer.extend_from_slice(b"\x1b[");
                write_u16(buffer, y + 1);
                buffer.push(b';');
                write_u16(buffer, x + 1);
                buffer.push(b'H');
            }

            match self.mode {
                DisplayMode::Rgb => {
                    if last_fg != Some(cell.fg) {
                        buffer.extend_from_slice(b"\x1b[38;2;");
                        write_rgb(buffer, cell.fg);
                        buffer.push(b'm');
                        last_fg = Some(cell.fg);
                    }
                    if last_bg != Some(cell.bg) {
                        buffer.extend_from_slice(b"\x1b[48;2;");
                        write_rgb(buffer, cell.bg);
                        buffer.push(b'm');
                        last_bg = Some(cell.bg);
                    }
                    let mut utf8 = [0u8; 4];
                    buffer.extend_from_slice(cell.ch.encode_utf8(&mut utf8).as_bytes());
                }
                DisplayMode::Ascii => {
                    buffer.push(ascii_glyph(cell.fg));
                }
            }

            self.last_cells[i] = *cell;
            cursor = Some((x + 1, y));
        }

        buffer.extend_from_slice(b"\x1b[0m");
        buffer.extend_from_slice(b"\x1b[?2026l"); // end synchronized update

        let Some(tx) = &self.tx else {
            return Ok(());
        };
        match tx.try_send(buffer.clone()) {
            // Dropping the paint is better than stalling the tick.
            Ok(()) | Err(crossbeam_channel::TrySendError::Full(_)) => Ok(()),
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => {
                Err(anyhow!("terminal writer thread exited"))
            }
        }
    }

    fn send_blocking(&self, seq: Vec<u8>) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(seq);
        }
    }
}

impl Drop for DisplayManager {
    fn drop(&mut self) {
        let mut seq = Vec::new();
        seq.extend_from_slice(b"\x1b[0m");
        seq.extend_from_slice(b"\x1b[?25h"); // show cursor
        seq.extend_from_slice(b"\x1b[?7h");
        seq.extend_from_slice(b"\x1b[?1049l"); // back to the main screen
        self.send_blocking(seq);

        // Closing the channel lets the writer drain and exit; joining it
        // guarantees the restore sequence reaches the terminal before the
        // process does anything else.
        self.tx.take();
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
        let _ = terminal::disable_raw_mode();
    }
}

// Decimal writers keep the hot path free of format! allocations.
fn write_u16(buffer: &mut Vec<u8>, n: u16) {
    let mut digits = [0u8; 5];
    let mut i = digits.len();
    let mut n = n;
    loop {
        i -= 1;
        digits[i] = b'0' + (n % 10) as u8;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    buffer.extend_from_slice(&digits[i..]);
}

fn write_rgb(buffer: &mut Vec<u8>, (r, g, b): (u8, u8, u8)) {
    write_u16(buffer, r as u16);
    buffer.push(b';');
    write_u16(buffer, g as u16);
    buffer.push(b';');
    write_u16(buffer, b as u16);
}

fn color_distance_sq(a: (u8, u8, u8), b: (u8, u8, u8)) -> i32 {
    let dr = a.0 as i32 - b.0 as i32;
    let dg = a.1 as i32 - b.1 as i32;
    let db = a.2 as i32 - b.2 as i32;
    dr * dr + dg * dg + db * db
}

fn ascii_glyph((r, g, b): (u8, u8, u8)) -> u8 {
    let luma = (r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000;
    ASCII_RAMP[luma as usize * (ASCII_RAMP.len() - 1) / 255]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_writer_matches_format() {
        for n in [0u16, 7, 42, 99, 100, 255, 999, 1000, 9999, 65535] {
            let mut buffer = Vec::new();
            write_u16(&mut buffer, n);
            assert_eq!(buffer, format!("{n}").into_bytes());
        }
    }

    #[test]
    fn rgb_writer_is_semicolon_separated() {
        let mut buffer = Vec::new();
        write_rgb(&mut buffer, (255, 0, 64));
        assert_eq!(buffer, b"255;0;64");
    }

    #[test]
    fn color_distance_is_squared_euclidean() {
        assert_eq!(color_distance_sq((0, 0, 0), (0, 0, 0)), 0);
        assert_eq!(color_distance_sq((10, 0, 0), (0, 0, 0)), 100);
        assert_eq!(color_distance_sq((1, 2, 3), (4, 6, 3)), 9 + 16);
    }

    #[test]
    fn ascii_ramp_spans_black_to_white() {
        assert_eq!(ascii_glyph((0, 0, 0)), b' ');
        assert_eq!(ascii_glyph((255, 255, 255)), b'@');
        // mid grays land strictly inside the ramp
        let mid = ascii_glyph((128, 128, 128));
        assert!(mid != b' ' && mid != b'@');
    }
}
