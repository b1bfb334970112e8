//! Terminal grid: screen, scrollback, cursor, and dirty-row collection.
//!
//! The grid stores the primary screen and its scrollback as one
//! chronological run of [`Row`]s; the screen is the trailing `rows`
//! entries. A full-screen scroll therefore moves nothing: a fresh row is
//! appended and the old top row simply *becomes* scrollback, keeping its
//! identity. Partial-region scrolls (DECSTBM, IL/DL) move content between
//! fixed rows instead, so identifiers always appear in allocation order
//! from top to bottom — the ordering clients rely on to compose their
//! row cache into a viewport.
//!
//! ```text
//! Grid
//!  ├── primary: VecDeque<Row>   (scrollback ++ screen, oldest first)
//!  ├── alt: Option<Vec<Row>>    (alternate screen, no scrollback)
//!  ├── ids: RowIdAllocator      (page serials, never reused)
//!  ├── styles: StyleTable       (interned SGR records)
//!  └── dirty: HashSet<RowId>    (drained by the pane after each feed)
//! ```
//!
//! Mutations mark affected rows dirty; structural upheavals (resize,
//! alternate-screen swap) raise the `structural` flag instead, which the
//! pane turns into a dirty-tracking rebase.

// Rust guideline compliant 2026-03

pub mod row;

use std::collections::{HashSet, VecDeque};

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthChar;

use crate::cell::{Cell, WidthClass};
use crate::style::{Color, Style, StyleTable, DEFAULT_STYLE};

pub use row::{page_serial, row_in_page, Row, RowId, RowIdAllocator, PAGE_ROWS};

/// Cursor position, screen-relative (0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    /// Column.
    pub x: usize,
    /// Row within the screen.
    pub y: usize,
}

/// Terminal modes observable by the replication and input layers.
#[derive(Debug, Clone, Copy)]
pub struct Modes {
    /// DECTCEM - cursor visible.
    pub show_cursor: bool,
    /// DECCKM - application cursor keys.
    pub app_cursor: bool,
    /// DECOM - origin mode (cursor addressing relative to the region).
    pub origin: bool,
    /// DECAWM - autowrap.
    pub autowrap: bool,
    /// Bracketed paste (DECSET 2004).
    pub bracketed_paste: bool,
}

impl Default for Modes {
    fn default() -> Self {
        Self {
            show_cursor: true,
            app_cursor: false,
            origin: false,
            autowrap: true,
            bracketed_paste: false,
        }
    }
}

/// Current writing attributes carried by printed cells.
#[derive(Debug, Clone, Copy, Default)]
struct Pen {
    style: Style,
    protected: bool,
    hyperlink: bool,
}

/// Mutation summary drained by the pane after each parser feed.
#[derive(Debug, Default)]
pub struct GridEvents {
    /// Rows whose content changed.
    pub dirty: Vec<RowId>,
    /// A resize or screen swap invalidated every row identity.
    pub structural: bool,
    /// Anything observable changed (including cursor-only motion).
    pub changed: bool,
}

/// Most recent printed cell, tracked for grapheme-cluster continuation.
#[derive(Debug)]
struct LastPrint {
    row_id: RowId,
    x: usize,
    cluster: String,
}

/// The in-memory screen of one pane.
#[derive(Debug)]
pub struct Grid {
    cols: usize,
    rows: usize,
    scrollback_max: usize,
    ids: RowIdAllocator,
    primary: VecDeque<Row>,
    alt: Option<Vec<Row>>,
    cursor: Cursor,
    saved_cursor: Option<Cursor>,
    pen: Pen,
    styles: StyleTable,
    scroll_top: usize,
    scroll_bot: usize,
    modes: Modes,
    cursor_style: u8,
    title: Option<String>,
    wrap_pending: bool,
    viewport_offset: usize,
    last_print: Option<LastPrint>,
    dirty: HashSet<RowId>,
    structural: bool,
    changed: bool,
}

impl Grid {
    /// Create a blank grid.
    #[must_use]
    pub fn new(cols: usize, rows: usize, scrollback_max: usize) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        let mut ids = RowIdAllocator::new();
        let primary = (0..rows)
            .map(|_| Row::new(ids.next_id(), cols, Cell::BLANK))
            .collect();
        Self {
            cols,
            rows,
            scrollback_max,
            ids,
            primary,
            alt: None,
            cursor: Cursor::default(),
            saved_cursor: None,
            pen: Pen::default(),
            styles: StyleTable::new(),
            scroll_top: 0,
            scroll_bot: rows - 1,
            modes: Modes::default(),
            cursor_style: 0,
            title: None,
            wrap_pending: false,
            viewport_offset: 0,
            last_print: None,
            dirty: HashSet::new(),
            structural: false,
            changed: false,
        }
    }

    // ── Read side ─────────────────────────────────────────────────────────────

    /// Current column count.
    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Current screen row count.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Live row count: scrollback plus screen for the active buffer.
    #[must_use]
    pub fn total_rows(&self) -> usize {
        if self.alt.is_some() {
            self.rows
        } else {
            self.primary.len()
        }
    }

    /// Index of the first visible row within the live run.
    #[must_use]
    pub fn viewport_top(&self) -> usize {
        if self.alt.is_some() {
            0
        } else {
            self.primary.len() - self.rows - self.viewport_offset
        }
    }

    /// Whether the alternate screen is active.
    #[must_use]
    pub fn alt_active(&self) -> bool {
        self.alt.is_some()
    }

    /// Cursor position.
    #[must_use]
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// DECSCUSR cursor shape (0 = terminal default).
    #[must_use]
    pub fn cursor_shape(&self) -> u8 {
        self.cursor_style
    }

    /// Mode flags.
    #[must_use]
    pub fn modes(&self) -> Modes {
        self.modes
    }

    /// OSC 0/2 window title, if any has been set.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// The style-interning table.
    #[must_use]
    pub fn styles(&self) -> &StyleTable {
        &self.styles
    }

    /// Rows currently in the viewport, top first.
    #[must_use]
    pub fn visible_rows(&self) -> Vec<&Row> {
        if let Some(alt) = &self.alt {
            alt.iter().collect()
        } else {
            let start = self.viewport_top();
            self.primary.iter().skip(start).take(self.rows).collect()
        }
    }

    /// Identifiers of the visible rows, top first.
    #[must_use]
    pub fn visible_row_ids(&self) -> Vec<RowId> {
        self.visible_rows().iter().map(|r| r.id()).collect()
    }

    /// Identifiers of every live row (scrollback included).
    #[must_use]
    pub fn live_row_ids(&self) -> Vec<RowId> {
        if let Some(alt) = &self.alt {
            alt.iter().map(Row::id).collect()
        } else {
            self.primary.iter().map(Row::id).collect()
        }
    }

    /// Plain-text rendering of the screen, one line per row.
    ///
    /// Test helper; spacer and background-only cells render as spaces.
    #[must_use]
    pub fn contents(&self) -> String {
        let mut out = String::new();
        for y in 0..self.rows {
            if y > 0 {
                out.push('\n');
            }
            let row = self.screen_row(y);
            for x in 0..self.cols {
                let cell = row.cell(x);
                if cell.width() == WidthClass::WideSpacer {
                    continue;
                }
                out.push(cell.codepoint().unwrap_or(' '));
            }
        }
        out
    }

    /// Drain the mutation summary accumulated since the last call.
    pub fn take_events(&mut self) -> GridEvents {
        GridEvents {
            dirty: self.dirty.drain().collect(),
            structural: std::mem::take(&mut self.structural),
            changed: std::mem::take(&mut self.changed),
        }
    }

    // ── Screen row plumbing ───────────────────────────────────────────────────

    fn screen_row(&self, y: usize) -> &Row {
        if let Some(alt) = &self.alt {
            &alt[y]
        } else {
            &self.primary[self.primary.len() - self.rows + y]
        }
    }

    fn screen_row_mut(&mut self, y: usize) -> &mut Row {
        if let Some(alt) = self.alt.as_mut() {
            &mut alt[y]
        } else {
            let idx = self.primary.len() - self.rows + y;
            &mut self.primary[idx]
        }
    }

    fn screen_y_of(&self, id: RowId) -> Option<usize> {
        (0..self.rows).find(|&y| self.screen_row(y).id() == id)
    }

    fn touch(&mut self, y: usize) {
        let id = self.screen_row(y).id();
        self.dirty.insert(id);
        self.changed = true;
    }

    /// Cursor-affecting operations reset pending wrap and cluster joins.
    fn cursor_moved(&mut self) {
        self.wrap_pending = false;
        self.last_print = None;
        self.changed = true;
    }

    fn intern_pen(&mut self) -> u16 {
        if self.pen.style.is_default() {
            DEFAULT_STYLE
        } else {
            self.styles.intern(self.pen.style)
        }
    }

    /// Cell used to fill erased regions (background color erase).
    fn erase_cell(&mut self) -> Cell {
        match self.pen.style.bg {
            Color::Default => Cell::BLANK,
            Color::Palette(i) => {
                let id = self.intern_pen();
                Cell::palette_bg(i, id)
            }
            Color::Rgb(r, g, b) => {
                let id = self.intern_pen();
                Cell::rgb_bg(r, g, b, id)
            }
        }
    }

    /// Write one cell, fixing up any wide glyph it overlaps.
    fn put_cell(&mut self, y: usize, x: usize, cell: Cell) {
        if x >= self.cols || y >= self.rows {
            return;
        }
        let old = self.screen_row(y).cell(x);
        if old.width() == WidthClass::WideSpacer && x > 0 {
            self.screen_row_mut(y).set_cell(x - 1, Cell::BLANK);
        }
        if old.width() == WidthClass::Wide && x + 1 < self.cols {
            self.screen_row_mut(y).set_cell(x + 1, Cell::BLANK);
        }
        self.screen_row_mut(y).set_cell(x, cell);
        self.touch(y);
    }

    // ── Printing ──────────────────────────────────────────────────────────────

    /// Print one character at the cursor.
    pub fn print(&mut self, ch: char) {
        if self.try_extend_cluster(ch) {
            return;
        }
        let width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if width == 0 {
            // Combining character with no base cell to attach to.
            return;
        }

        if self.wrap_pending {
            self.wrap_pending = false;
            if self.modes.autowrap {
                self.cursor.x = 0;
                self.linefeed_scroll();
            }
        }

        // A wide glyph that would straddle the last column pads it and wraps.
        if width == 2 && self.cursor.x + 1 >= self.cols {
            if self.cols < 2 {
                return;
            }
            if self.modes.autowrap {
                let pad = self.erase_cell().with_width(WidthClass::NarrowPadding);
                let (x, y) = (self.cursor.x, self.cursor.y);
                self.put_cell(y, x, pad);
                self.cursor.x = 0;
                self.linefeed_scroll();
            } else {
                self.cursor.x = self.cols - 2;
            }
        }

        let style_id = self.intern_pen();
        let mut cell = Cell::glyph(ch, style_id)
            .with_protected(self.pen.protected)
            .with_hyperlink(self.pen.hyperlink);
        if width == 2 {
            cell = cell.with_width(WidthClass::Wide);
        }
        let (x, y) = (self.cursor.x, self.cursor.y);
        self.put_cell(y, x, cell);
        if width == 2 && x + 1 < self.cols {
            let spacer = Cell::glyph(' ', style_id).with_width(WidthClass::WideSpacer);
            self.put_cell(y, x + 1, spacer);
        }

        self.last_print = Some(LastPrint {
            row_id: self.screen_row(y).id(),
            x,
            cluster: ch.to_string(),
        });

        let next = x + width;
        if next >= self.cols {
            self.cursor.x = self.cols - 1;
            self.wrap_pending = self.modes.autowrap;
        } else {
            self.cursor.x = next;
        }
    }

    /// Attach `ch` to the previously printed cell when the two still form
    /// a single grapheme cluster (combining marks, emoji modifiers, ZWJ
    /// sequences).
    fn try_extend_cluster(&mut self, ch: char) -> bool {
        let Some(lp) = self.last_print.as_ref() else {
            return false;
        };
        let mut combined = lp.cluster.clone();
        combined.push(ch);
        if combined.graphemes(true).count() != 1 {
            return false;
        }
        let Some(y) = self.screen_y_of(lp.row_id) else {
            self.last_print = None;
            return false;
        };
        let x = lp.x;
        self.screen_row_mut(y).push_continuation(x, ch);
        self.touch(y);
        if let Some(lp) = self.last_print.as_mut() {
            lp.cluster = combined;
        }
        true
    }

    // ── Cursor movement ───────────────────────────────────────────────────────

    /// Carriage return.
    pub fn carriage_return(&mut self) {
        self.cursor.x = 0;
        self.cursor_moved();
    }

    /// Line feed (scrolls at the bottom of the region).
    pub fn linefeed(&mut self) {
        self.linefeed_scroll();
        self.cursor_moved();
    }

    fn linefeed_scroll(&mut self) {
        if self.cursor.y == self.scroll_bot {
            self.scroll_up(1);
        } else if self.cursor.y + 1 < self.rows {
            self.cursor.y += 1;
        }
        self.changed = true;
    }

    /// Backspace: move one column left, stopping at the margin.
    pub fn backspace(&mut self) {
        self.cursor.x = self.cursor.x.saturating_sub(1);
        self.cursor_moved();
    }

    /// Horizontal tab to the next 8-column stop.
    pub fn tab(&mut self) {
        let next = (self.cursor.x / 8 + 1) * 8;
        self.cursor.x = next.min(self.cols - 1);
        self.cursor_moved();
    }

    /// Absolute cursor addressing (CUP/HVP); origin-mode aware.
    pub fn move_to(&mut self, x: usize, y: usize) {
        let (base, max) = if self.modes.origin {
            (self.scroll_top, self.scroll_bot)
        } else {
            (0, self.rows - 1)
        };
        self.cursor.y = (base + y).min(max);
        self.cursor.x = x.min(self.cols - 1);
        self.cursor_moved();
    }

    /// Relative cursor movement (CUU/CUD/CUF/CUB), clamped to the region
    /// when the cursor is inside it.
    pub fn move_rel(&mut self, dx: isize, dy: isize) {
        let min_y = if self.cursor.y >= self.scroll_top {
            self.scroll_top
        } else {
            0
        };
        let max_y = if self.cursor.y <= self.scroll_bot {
            self.scroll_bot
        } else {
            self.rows - 1
        };
        let y = self.cursor.y as isize + dy;
        self.cursor.y = y.clamp(min_y as isize, max_y as isize) as usize;
        let x = self.cursor.x as isize + dx;
        self.cursor.x = x.clamp(0, self.cols as isize - 1) as usize;
        self.cursor_moved();
    }

    /// Move to column `x` on the current row (CHA).
    pub fn move_to_column(&mut self, x: usize) {
        self.cursor.x = x.min(self.cols - 1);
        self.cursor_moved();
    }

    /// Save the cursor position (DECSC, CSI s, DECSET 1048).
    pub fn save_cursor(&mut self) {
        self.saved_cursor = Some(self.cursor);
    }

    /// Restore the saved cursor position (DECRC, CSI u, DECRST 1048).
    pub fn restore_cursor(&mut self) {
        if let Some(saved) = self.saved_cursor {
            self.cursor.x = saved.x.min(self.cols - 1);
            self.cursor.y = saved.y.min(self.rows - 1);
        }
        self.cursor_moved();
    }

    /// Reverse index (ESC M): up one row, scrolling down at the top.
    pub fn reverse_index(&mut self) {
        if self.cursor.y == self.scroll_top {
            self.rotate_down(self.scroll_top, self.scroll_bot, 1);
        } else if self.cursor.y > 0 {
            self.cursor.y -= 1;
        }
        self.cursor_moved();
    }

    // ── Scrolling ─────────────────────────────────────────────────────────────

    /// Scroll the region up by `n` lines.
    ///
    /// A full-screen scroll on the primary buffer appends fresh rows and
    /// lets the old top rows become scrollback, preserving their
    /// identities. Every other case moves content between fixed rows.
    pub fn scroll_up(&mut self, n: usize) {
        let span = self.scroll_bot - self.scroll_top + 1;
        let n = n.min(span);
        if n == 0 {
            return;
        }
        let full_screen = self.scroll_top == 0 && self.scroll_bot == self.rows - 1;
        if self.alt.is_none() && full_screen {
            let fill = self.erase_cell();
            for _ in 0..n {
                let id = self.ids.next_id();
                self.dirty.insert(id);
                self.primary.push_back(Row::new(id, self.cols, fill));
            }
            self.prune_overflow();
            self.changed = true;
        } else {
            self.rotate_up(self.scroll_top, self.scroll_bot, n);
        }
    }

    /// Scroll the region down by `n` lines (CSI T).
    pub fn scroll_down(&mut self, n: usize) {
        self.rotate_down(self.scroll_top, self.scroll_bot, n);
    }

    /// Shift content up between fixed rows; identity stays positional.
    fn rotate_up(&mut self, top: usize, bot: usize, n: usize) {
        let n = n.min(bot - top + 1);
        if n == 0 {
            return;
        }
        let fill = self.erase_cell();
        for y in top..(bot + 1 - n) {
            let (cells, graphemes) = self.screen_row_mut(y + n).take_content(fill);
            self.screen_row_mut(y).put_content(cells, graphemes);
        }
        let cols = self.cols;
        for y in (bot + 1 - n)..=bot {
            self.screen_row_mut(y).fill_range(0..cols, fill);
        }
        for y in top..=bot {
            self.touch(y);
        }
    }

    /// Shift content down between fixed rows.
    fn rotate_down(&mut self, top: usize, bot: usize, n: usize) {
        let n = n.min(bot - top + 1);
        if n == 0 {
            return;
        }
        let fill = self.erase_cell();
        for y in ((top + n)..=bot).rev() {
            let (cells, graphemes) = self.screen_row_mut(y - n).take_content(fill);
            self.screen_row_mut(y).put_content(cells, graphemes);
        }
        let cols = self.cols;
        for y in top..(top + n) {
            self.screen_row_mut(y).fill_range(0..cols, fill);
        }
        for y in top..=bot {
            self.touch(y);
        }
    }

    fn prune_overflow(&mut self) {
        while self.primary.len() > self.rows + self.scrollback_max {
            if let Some(row) = self.primary.pop_front() {
                // Pruned identifiers are retired; stop replicating them.
                self.dirty.remove(&row.id());
            }
        }
        let scrollback = self.primary.len() - self.rows;
        self.viewport_offset = self.viewport_offset.min(scrollback);
    }

    /// Set the scrolling region (DECSTBM); 0-based inclusive bounds.
    pub fn set_scroll_region(&mut self, top: usize, bot: usize) {
        let bot = bot.min(self.rows - 1);
        if top >= bot {
            return;
        }
        self.scroll_top = top;
        self.scroll_bot = bot;
        self.move_to(0, 0);
    }

    /// Shift the viewport by `delta` lines; positive scrolls into history.
    ///
    /// Returns the identifiers of rows newly revealed by the move.
    pub fn scroll_viewport(&mut self, delta: i64) -> Vec<RowId> {
        if self.alt.is_some() {
            return Vec::new();
        }
        let scrollback = (self.primary.len() - self.rows) as i64;
        let new_offset = (self.viewport_offset as i64 + delta).clamp(0, scrollback) as usize;
        if new_offset == self.viewport_offset {
            return Vec::new();
        }
        let old_start = self.primary.len() - self.rows - self.viewport_offset;
        let new_start = self.primary.len() - self.rows - new_offset;
        let old_range = old_start..old_start + self.rows;
        let revealed = (new_start..new_start + self.rows)
            .filter(|i| !old_range.contains(i))
            .map(|i| self.primary[i].id())
            .collect();
        self.viewport_offset = new_offset;
        self.changed = true;
        revealed
    }

    // ── Erase and edit ────────────────────────────────────────────────────────

    /// Erase within the current line (EL / DECSEL).
    pub fn erase_line(&mut self, mode: u8, selective: bool) {
        let (x, cols) = (self.cursor.x, self.cols);
        let range = match mode {
            0 => x..cols,
            1 => 0..(x + 1).min(cols),
            _ => 0..cols,
        };
        let y = self.cursor.y;
        self.erase_row_range(y, range, selective);
        self.last_print = None;
    }

    /// Erase within the display (ED / DECSED).
    pub fn erase_display(&mut self, mode: u8, selective: bool) {
        let (x, y, cols, rows) = (self.cursor.x, self.cursor.y, self.cols, self.rows);
        match mode {
            0 => {
                self.erase_row_range(y, x..cols, selective);
                for yy in (y + 1)..rows {
                    self.erase_row_range(yy, 0..cols, selective);
                }
            }
            1 => {
                for yy in 0..y {
                    self.erase_row_range(yy, 0..cols, selective);
                }
                self.erase_row_range(y, 0..(x + 1).min(cols), selective);
            }
            2 => {
                for yy in 0..rows {
                    self.erase_row_range(yy, 0..cols, selective);
                }
            }
            3 => self.clear_scrollback(),
            _ => {}
        }
        self.last_print = None;
    }

    fn erase_row_range(&mut self, y: usize, range: std::ops::Range<usize>, selective: bool) {
        let fill = self.erase_cell();
        if selective {
            for x in range {
                if !self.screen_row(y).cell(x).is_protected() {
                    self.screen_row_mut(y).set_cell(x, fill);
                }
            }
        } else {
            self.screen_row_mut(y).fill_range(range, fill);
        }
        self.touch(y);
    }

    /// Drop all scrollback rows (ED 3), retiring their identifiers.
    pub fn clear_scrollback(&mut self) {
        if self.alt.is_some() {
            return;
        }
        while self.primary.len() > self.rows {
            if let Some(row) = self.primary.pop_front() {
                self.dirty.remove(&row.id());
            }
        }
        self.viewport_offset = 0;
        self.changed = true;
    }

    /// Insert `n` blank characters at the cursor (ICH).
    pub fn insert_chars(&mut self, n: usize) {
        let fill = self.erase_cell();
        let (x, y) = (self.cursor.x, self.cursor.y);
        self.screen_row_mut(y).insert_cells(x, n, fill);
        self.touch(y);
        self.last_print = None;
    }

    /// Delete `n` characters at the cursor (DCH).
    pub fn delete_chars(&mut self, n: usize) {
        let fill = self.erase_cell();
        let (x, y) = (self.cursor.x, self.cursor.y);
        self.screen_row_mut(y).delete_cells(x, n, fill);
        self.touch(y);
        self.last_print = None;
    }

    /// Erase `n` characters at the cursor without shifting (ECH).
    pub fn erase_chars(&mut self, n: usize) {
        let (x, y, cols) = (self.cursor.x, self.cursor.y, self.cols);
        self.erase_row_range(y, x..(x + n).min(cols), false);
        self.last_print = None;
    }

    /// Insert `n` blank lines at the cursor (IL).
    pub fn insert_lines(&mut self, n: usize) {
        if self.cursor.y < self.scroll_top || self.cursor.y > self.scroll_bot {
            return;
        }
        self.rotate_down(self.cursor.y, self.scroll_bot, n);
        self.last_print = None;
    }

    /// Delete `n` lines at the cursor (DL).
    pub fn delete_lines(&mut self, n: usize) {
        if self.cursor.y < self.scroll_top || self.cursor.y > self.scroll_bot {
            return;
        }
        self.rotate_up(self.cursor.y, self.scroll_bot, n);
        self.last_print = None;
    }

    // ── Modes, pen, screens ───────────────────────────────────────────────────

    /// Apply a DECSET/DECRST private mode change.
    pub fn set_private_mode(&mut self, mode: u16, enable: bool) {
        match mode {
            1 => self.modes.app_cursor = enable,
            6 => {
                self.modes.origin = enable;
                self.move_to(0, 0);
            }
            7 => self.modes.autowrap = enable,
            25 => self.modes.show_cursor = enable,
            47 | 1047 => {
                if enable {
                    self.enter_alt(false);
                } else {
                    self.exit_alt(false);
                }
            }
            1048 => {
                if enable {
                    self.save_cursor();
                } else {
                    self.restore_cursor();
                }
            }
            1049 => {
                if enable {
                    self.enter_alt(true);
                } else {
                    self.exit_alt(true);
                }
            }
            2004 => self.modes.bracketed_paste = enable,
            _ => return,
        }
        self.changed = true;
    }

    fn enter_alt(&mut self, save_cursor: bool) {
        if self.alt.is_some() {
            return;
        }
        if save_cursor {
            self.save_cursor();
        }
        let alt = (0..self.rows)
            .map(|_| Row::new(self.ids.next_id(), self.cols, Cell::BLANK))
            .collect();
        self.alt = Some(alt);
        self.viewport_offset = 0;
        self.wrap_pending = false;
        self.last_print = None;
        self.structural = true;
        self.changed = true;
    }

    fn exit_alt(&mut self, restore_cursor: bool) {
        if self.alt.take().is_none() {
            return;
        }
        if restore_cursor {
            self.restore_cursor();
        }
        self.wrap_pending = false;
        self.last_print = None;
        self.structural = true;
        self.changed = true;
    }

    /// Mutable access to the SGR pen for the performer.
    pub fn pen_style_mut(&mut self) -> &mut Style {
        &mut self.pen.style
    }

    /// Set the DECSCA character-protection attribute.
    pub fn set_protected(&mut self, protected: bool) {
        self.pen.protected = protected;
    }

    /// Set or clear the active OSC 8 hyperlink state.
    pub fn set_hyperlink(&mut self, active: bool) {
        self.pen.hyperlink = active;
    }

    /// Set the DECSCUSR cursor shape.
    pub fn set_cursor_shape(&mut self, shape: u8) {
        self.cursor_style = shape.min(6);
        self.changed = true;
    }

    /// Record the OSC 0/2 window title.
    pub fn set_title(&mut self, title: String) {
        self.title = Some(title);
        self.changed = true;
    }

    /// Full reset (RIS): clear the screen and all modes.
    pub fn reset(&mut self) {
        let cols = self.cols;
        self.alt = None;
        self.pen = Pen::default();
        self.modes = Modes::default();
        self.scroll_top = 0;
        self.scroll_bot = self.rows - 1;
        self.cursor = Cursor::default();
        self.saved_cursor = None;
        self.cursor_style = 0;
        self.wrap_pending = false;
        self.last_print = None;
        self.viewport_offset = 0;
        for y in 0..self.rows {
            self.screen_row_mut(y).fill_range(0..cols, Cell::BLANK);
        }
        self.structural = true;
        self.changed = true;
    }

    // ── Resize ────────────────────────────────────────────────────────────────

    /// Resize the grid. Screen rows are truncated or padded per column;
    /// growth pulls rows back out of scrollback before allocating blanks.
    pub fn resize(&mut self, new_cols: usize, new_rows: usize) {
        let new_cols = new_cols.max(1);
        let new_rows = new_rows.max(1);
        if new_cols == self.cols && new_rows == self.rows {
            return;
        }

        if new_rows > self.rows {
            let scrollback = self.primary.len() - self.rows;
            let pull = (new_rows - self.rows).min(scrollback);
            let append = new_rows - self.rows - pull;
            for _ in 0..append {
                let id = self.ids.next_id();
                self.primary.push_back(Row::new(id, new_cols, Cell::BLANK));
            }
            self.cursor.y += pull;
        } else {
            let dropped = self.rows - new_rows;
            self.cursor.y = self.cursor.y.saturating_sub(dropped);
        }
        self.rows = new_rows;
        self.cols = new_cols;

        let start = self.primary.len() - self.rows;
        for i in start..self.primary.len() {
            self.primary[i].resize_width(new_cols, Cell::BLANK);
        }
        if self.alt.is_some() {
            let alt = (0..self.rows)
                .map(|_| Row::new(self.ids.next_id(), self.cols, Cell::BLANK))
                .collect();
            self.alt = Some(alt);
        }

        self.prune_overflow();
        self.scroll_top = 0;
        self.scroll_bot = self.rows - 1;
        self.cursor.x = self.cursor.x.min(self.cols - 1);
        self.cursor.y = self.cursor.y.min(self.rows - 1);
        self.viewport_offset = 0;
        self.wrap_pending = false;
        self.last_print = None;
        self.structural = true;
        self.changed = true;
    }
}
