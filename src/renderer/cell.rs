/// One terminal character cell: glyph plus truecolor foreground/background.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CellData {
    pub ch: char,
    pub fg: (u8, u8, u8),
    pub bg: (u8, u8, u8),
}

impl Default for CellData {
    fn default() -> Self {
        Self {
            ch: ' ',
            fg: (0, 0, 0),
            bg: (0, 0, 0),
        }
    }
}
