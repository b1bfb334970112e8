//! Rows, row identity, and the page-serial allocator.
//!
//! Every live row carries a 64-bit identifier composed as
//! `page_serial * 1000 + index_in_page`. Serials are handed out by
//! [`RowIdAllocator`] and strictly increase for the lifetime of a pane, so
//! an identifier can never alias another — including rows allocated for
//! the alternate screen, which draw from the same counter and are retired
//! when the alternate screen is left.

// Rust guideline compliant 2026-03

use std::collections::BTreeMap;

use crate::cell::Cell;

/// Stable row identifier: `page_serial * 1000 + index_in_page`.
pub type RowId = u64;

/// Rows per identity page. The composite id reserves three decimal
/// digits for the in-page index; the allocator closes a page at exactly
/// this count.
pub const PAGE_ROWS: u64 = 1000;

/// Extract the page serial from a row id.
#[must_use]
pub fn page_serial(id: RowId) -> u64 {
    id / PAGE_ROWS
}

/// Extract the in-page index from a row id.
#[must_use]
pub fn row_in_page(id: RowId) -> u64 {
    id % PAGE_ROWS
}

/// Monotonic allocator of row identifiers.
///
/// Serials start at 1 and never repeat; slot indices run 0..999 within a
/// page. Retired ids (pruned scrollback, dropped alternate screens) are
/// never reissued.
#[derive(Debug)]
pub struct RowIdAllocator {
    serial: u64,
    slot: u64,
}

impl RowIdAllocator {
    /// Create an allocator positioned at the first id of page 1.
    #[must_use]
    pub fn new() -> Self {
        Self { serial: 1, slot: 0 }
    }

    /// Allocate the next row id.
    pub fn next_id(&mut self) -> RowId {
        let id = self.serial * PAGE_ROWS + self.slot;
        self.slot += 1;
        if self.slot == PAGE_ROWS {
            self.serial += 1;
            self.slot = 0;
        }
        id
    }
}

impl Default for RowIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// One grid row: identity, packed cells, and grapheme continuations.
///
/// The grapheme map is keyed by column; a cell whose content tag is
/// `Grapheme` has its continuation codepoints here. The map is kept in
/// lockstep with the cells: overwriting or shifting a cell drops or moves
/// its entry.
#[derive(Debug, Clone)]
pub struct Row {
    id: RowId,
    cells: Vec<Cell>,
    graphemes: BTreeMap<u16, Vec<char>>,
}

impl Row {
    /// Create a row of `cols` copies of `fill`.
    #[must_use]
    pub fn new(id: RowId, cols: usize, fill: Cell) -> Self {
        Self {
            id,
            cells: vec![fill; cols],
            graphemes: BTreeMap::new(),
        }
    }

    /// Stable identifier of this row.
    #[must_use]
    pub fn id(&self) -> RowId {
        self.id
    }

    /// Stored width (the column count at the time content was written).
    #[must_use]
    pub fn width(&self) -> usize {
        self.cells.len()
    }

    /// Cell at column `x`, or blank when `x` is past the stored width.
    #[must_use]
    pub fn cell(&self, x: usize) -> Cell {
        self.cells.get(x).copied().unwrap_or(Cell::BLANK)
    }

    /// All stored cells.
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Grapheme continuations, keyed by column.
    #[must_use]
    pub fn graphemes(&self) -> &BTreeMap<u16, Vec<char>> {
        &self.graphemes
    }

    /// Overwrite the cell at `x`, dropping any grapheme continuation.
    pub fn set_cell(&mut self, x: usize, cell: Cell) {
        if x >= self.cells.len() {
            return;
        }
        self.cells[x] = cell;
        self.graphemes.remove(&(x as u16));
    }

    /// Append a continuation codepoint to the cell at `x` and retag it.
    pub fn push_continuation(&mut self, x: usize, ch: char) {
        if x >= self.cells.len() {
            return;
        }
        self.cells[x] = self.cells[x].with_grapheme();
        self.graphemes.entry(x as u16).or_default().push(ch);
    }

    /// Fill `range` with copies of `fill`, dropping graphemes in range.
    pub fn fill_range(&mut self, range: std::ops::Range<usize>, fill: Cell) {
        let end = range.end.min(self.cells.len());
        for x in range.start..end {
            self.cells[x] = fill;
            self.graphemes.remove(&(x as u16));
        }
    }

    /// Shift cells right by `n` starting at `x`; vacated cells get `fill`.
    ///
    /// Cells pushed past the stored width fall off the end.
    pub fn insert_cells(&mut self, x: usize, n: usize, fill: Cell) {
        let width = self.cells.len();
        if x >= width || n == 0 {
            return;
        }
        let n = n.min(width - x);
        self.cells[x..].rotate_right(n);
        for cell in &mut self.cells[x..x + n] {
            *cell = fill;
        }
        self.shift_graphemes(x, n as isize, width);
    }

    /// Shift cells left by `n` starting at `x`; the tail gets `fill`.
    pub fn delete_cells(&mut self, x: usize, n: usize, fill: Cell) {
        let width = self.cells.len();
        if x >= width || n == 0 {
            return;
        }
        let n = n.min(width - x);
        self.cells[x..].rotate_left(n);
        for cell in &mut self.cells[width - n..] {
            *cell = fill;
        }
        self.shift_graphemes(x, -(n as isize), width);
    }

    /// Re-key the grapheme map after a cell shift at or past column `x`.
    fn shift_graphemes(&mut self, x: usize, delta: isize, width: usize) {
        let moved: Vec<(u16, Vec<char>)> = self
            .graphemes
            .split_off(&(x as u16))
            .into_iter()
            .collect();
        for (col, chars) in moved {
            let new_col = col as isize + delta;
            if new_col >= x as isize && (new_col as usize) < width {
                self.graphemes.insert(new_col as u16, chars);
            }
        }
    }

    /// Resize the stored width, truncating or padding with `fill`.
    pub fn resize_width(&mut self, cols: usize, fill: Cell) {
        if cols < self.cells.len() {
            self.graphemes.retain(|&x, _| usize::from(x) < cols);
        }
        self.cells.resize(cols, fill);
    }

    /// Take this row's content, leaving it blank-filled.
    ///
    /// Used to move content between fixed rows during partial-region
    /// scrolls, where identity stays with the position.
    pub fn take_content(&mut self, fill: Cell) -> (Vec<Cell>, BTreeMap<u16, Vec<char>>) {
        let width = self.cells.len();
        let cells = std::mem::replace(&mut self.cells, vec![fill; width]);
        let graphemes = std::mem::take(&mut self.graphemes);
        (cells, graphemes)
    }

    /// Replace this row's content, keeping its identity.
    pub fn put_content(&mut self, cells: Vec<Cell>, graphemes: BTreeMap<u16, Vec<char>>) {
        let width = self.cells.len();
        self.cells = cells;
        self.cells.resize(width, Cell::BLANK);
        self.graphemes = graphemes;
        self.graphemes.retain(|&x, _| usize::from(x) < width);
    }

    /// Serialize the cells as little-endian 8-byte groups, padded or
    /// truncated to exactly `cols` cells.
    #[must_use]
    pub fn encode_cells(&self, cols: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(cols * 8);
        for x in 0..cols {
            out.extend_from_slice(&self.cell(x).to_bits().to_le_bytes());
        }
        out
    }
}
