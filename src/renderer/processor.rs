use rayon::prelude::*;

use super::cell::CellData;

/// Converts a packed RGB24 canvas into a half-block cell grid.
///
/// One character covers two vertically stacked pixels: the upper half
/// block `▀` shows the top pixel as foreground and the bottom pixel as
/// background, doubling the vertical resolution of the terminal.
pub struct FrameProcessor {
    width: usize,
    height: usize,
}

impl FrameProcessor {
    /// `width`/`height` are canvas pixels; the resulting cell grid is
    /// `width` columns by `height / 2` rows.
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub fn cell_count(&self) -> usize {
        self.width * (self.height / 2)
    }

    pub fn process_frame(&self, pixel_data: &[u8]) -> Vec<CellData> {
        let mut cells = vec![CellData::default(); self.cell_count()];
        self.process_frame_into(pixel_data, &mut cells);
        cells
    }

    pub fn process_frame_into(&self, pixel_data: &[u8], cells: &mut [CellData]) {
        let width = self.width;
        let rows = self.height / 2;
        if cells.len() != width * rows {
            return;
        }

        // Large grids get a fixed chunk size; small ones split evenly
        // across the worker threads.
        let total = width * rows;
        let chunk_size = if total > 10_000 {
            2_000
        } else {
            (total / rayon::current_num_threads().max(1)).max(1)
        };

        cells
            .par_chunks_mut(chunk_size)
            .enumerate()
            .for_each(|(chunk_index, chunk)| {
                let start = chunk_index * chunk_size;
                for (i, cell) in chunk.iter_mut().enumerate() {
                    let index = start + i;
                    let cx = index % width;
                    let cy = index / width;

                    let pixel = |x: usize, y: usize| -> (u8, u8, u8) {
                        let offset = (y * width + x) * 3;
                        if offset + 2 < pixel_data.len() {
                            (
                                pixel_data[offset],
                                pixel_data[offset + 1],
                                pixel_data[offset + 2],
                            )
                        } else {
                            (0, 0, 0)
                        }
                    };

                    *cell = CellData {
                        ch: '▀',
                        fg: pixel(cx, cy * 2),
                        bg: pixel(cx, cy * 2 + 1),
                    };
                }
            });
    }
}
