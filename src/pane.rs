//! Pane: one PTY, one emulator, and the replication bookkeeping.
//!
//! The pane is the unit of replication. It owns the persistent parser for
//! its PTY byte stream and tracks two things the encoder needs:
//!
//! - a monotonically increasing **generation**, bumped on every
//!   observable state change (output, resize, viewport scroll);
//! - the **dirty set**, mapping each row identifier changed since
//!   `dirty_base_gen` to the generation that last dirtied it.
//!
//! A client whose acknowledged generation is at least `dirty_base_gen`
//! can be served a delta of the visible rows dirtied past its
//! generation; anyone older must take a snapshot. Structural upheavals
//! (resize, screen swap) and dirty-set overflow past the delta budget
//! rebase tracking, deliberately making every client stale at once.

// Rust guideline compliant 2026-03

use std::collections::{BTreeSet, HashMap};

use anyhow::Result;

use crate::encode;
use crate::grid::{Grid, RowId};
use crate::pty::PtyProcess;
use crate::term::Emulator;

/// Pane identifier. Id 0 is reserved for the server's debug pane.
pub type PaneId = u16;

/// The debug pane's well-known id.
pub const DEBUG_PANE: PaneId = 0;

/// Cursor state as replicated to clients.
#[derive(Debug, Clone, Copy)]
pub struct CursorState {
    /// Column.
    pub x: u16,
    /// Screen row.
    pub y: u16,
    /// DECTCEM visibility.
    pub visible: bool,
    /// DECSCUSR shape (0 = terminal default).
    pub shape: u8,
}

/// Materialized full pane state at one generation.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Pane id.
    pub pane: PaneId,
    /// Generation the snapshot captures.
    pub gen: u64,
    /// Columns.
    pub cols: u16,
    /// Rows.
    pub rows: u16,
    /// Cursor state.
    pub cursor: CursorState,
    /// Whether the alternate screen is active.
    pub alt_screen: bool,
    /// Live rows in the active buffer (scrollback included).
    pub total_rows: u64,
    /// Index of the first visible row within the live run.
    pub viewport_top: u64,
    /// `cols * rows * 8` bytes, row-major from the viewport top.
    pub cells: Vec<u8>,
    /// `rows * 8` bytes of little-endian row identifiers.
    pub row_ids: Vec<u8>,
    /// Full style table in wire form.
    pub styles: Vec<u8>,
    /// Grapheme continuation records keyed by global cell index.
    pub graphemes: Vec<u8>,
}

/// One changed row inside a delta.
#[derive(Debug, Clone)]
pub struct DeltaRow {
    /// Stable row identifier.
    pub id: RowId,
    /// `cols * 8` cell bytes.
    pub cells: Vec<u8>,
    /// Grapheme records keyed by column; empty when the row has none.
    pub graphemes: Vec<u8>,
}

/// Incremental update valid for clients at or past `dirty_base_gen`.
#[derive(Debug, Clone)]
pub struct Delta {
    /// Pane id.
    pub pane: PaneId,
    /// New generation after applying this delta.
    pub gen: u64,
    /// Cursor state at the new generation.
    pub cursor: CursorState,
    /// Whether the alternate screen is active.
    pub alt_screen: bool,
    /// Live rows in the active buffer.
    pub total_rows: u64,
    /// Index of the first visible row.
    pub viewport_top: u64,
    /// Dirty rows intersected with the viewport, in viewport order.
    pub rows: Vec<DeltaRow>,
    /// Style records referenced by the rows above (default id omitted).
    pub styles: Vec<u8>,
}

/// One replicated terminal.
#[derive(Debug)]
pub struct Pane {
    id: PaneId,
    emu: Emulator,
    pty: Option<PtyProcess>,
    generation: u64,
    dirty_rows: HashMap<RowId, u64>,
    dirty_base_gen: u64,
    delta_budget: usize,
}

impl Pane {
    /// Create a pane without a PTY (the debug pane, and tests).
    #[must_use]
    pub fn new(id: PaneId, cols: u16, rows: u16, scrollback: usize) -> Self {
        Self {
            id,
            emu: Emulator::new(usize::from(cols), usize::from(rows), scrollback),
            pty: None,
            generation: 0,
            dirty_rows: HashMap::new(),
            dirty_base_gen: 0,
            delta_budget: 0,
        }
    }

    /// Attach a spawned PTY to this pane.
    pub fn attach_pty(&mut self, pty: PtyProcess) {
        self.pty = Some(pty);
    }

    /// Override the dirty-row budget above which the pane rebases
    /// (0 selects the default of twice the row count).
    pub fn set_delta_budget(&mut self, budget: usize) {
        self.delta_budget = budget;
    }

    /// Pane id.
    #[must_use]
    pub fn id(&self) -> PaneId {
        self.id
    }

    /// Current column count.
    #[must_use]
    pub fn cols(&self) -> u16 {
        self.emu.grid().cols() as u16
    }

    /// Current row count.
    #[must_use]
    pub fn rows(&self) -> u16 {
        self.emu.grid().rows() as u16
    }

    /// Current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Generation at which dirty tracking was last rebased.
    #[must_use]
    pub fn dirty_base_gen(&self) -> u64 {
        self.dirty_base_gen
    }

    /// Number of rows currently tracked as dirty.
    #[must_use]
    pub fn dirty_len(&self) -> usize {
        self.dirty_rows.len()
    }

    /// The underlying grid (read access for the encoder and tests).
    #[must_use]
    pub fn grid(&self) -> &Grid {
        self.emu.grid()
    }

    /// Whether this pane has a live PTY attached.
    #[must_use]
    pub fn has_pty(&self) -> bool {
        self.pty.is_some()
    }

    /// OSC window title, if the application set one.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.emu.grid().title()
    }

    fn threshold(&self) -> usize {
        if self.delta_budget > 0 {
            self.delta_budget
        } else {
            self.emu.grid().rows() * 2
        }
    }

    fn rebase(&mut self) {
        self.dirty_rows.clear();
        self.dirty_base_gen = self.generation;
    }

    /// Fold the grid's mutation summary into generation/dirty tracking.
    fn absorb_events(&mut self) {
        let events = self.emu.grid_mut().take_events();
        if !events.changed && !events.structural {
            return;
        }
        self.generation += 1;
        if events.structural {
            // Every row identity may have changed; force snapshots.
            self.rebase();
            return;
        }
        for id in events.dirty {
            self.dirty_rows.insert(id, self.generation);
        }
        if self.dirty_rows.len() > self.threshold() {
            self.rebase();
        }
    }

    // ── Operations ────────────────────────────────────────────────────────────

    /// Advance the persistent parser with PTY output bytes.
    pub fn feed(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.emu.process(bytes);
        self.absorb_events();
    }

    /// Enqueue input bytes to the PTY master.
    ///
    /// Panes without a PTY (the debug pane) drop input silently.
    ///
    /// # Errors
    ///
    /// Returns an error if the PTY write fails.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        match &mut self.pty {
            Some(pty) => pty.write(bytes),
            None => {
                log::debug!(
                    "pane {} has no PTY; dropping {} input bytes",
                    self.id,
                    bytes.len()
                );
                Ok(())
            }
        }
    }

    /// Resize the grid and PTY. Structural: every client resnapshots.
    ///
    /// # Errors
    ///
    /// Returns an error if the PTY resize fails; the grid is resized
    /// regardless so replication stays coherent.
    pub fn resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        self.emu.resize(usize::from(cols.max(1)), usize::from(rows.max(1)));
        self.absorb_events();
        if let Some(pty) = &self.pty {
            pty.resize(cols.max(1), rows.max(1))?;
        }
        Ok(())
    }

    /// Shift the viewport; positive `delta` scrolls into history.
    ///
    /// Rows newly revealed by the move join the dirty set so clients
    /// that never cached them receive their contents.
    pub fn scroll(&mut self, delta: i64) {
        let revealed = self.emu.grid_mut().scroll_viewport(delta);
        let events = self.emu.grid_mut().take_events();
        if !events.changed {
            return;
        }
        self.generation += 1;
        for id in revealed.into_iter().chain(events.dirty) {
            self.dirty_rows.insert(id, self.generation);
        }
        if self.dirty_rows.len() > self.threshold() {
            self.rebase();
        }
    }

    /// Reap the PTY child after its reader reported EOF.
    pub fn reap(&mut self) -> Option<i32> {
        self.pty.as_mut().and_then(PtyProcess::wait_exit)
    }

    /// Tear down the PTY (kills the child if still running).
    pub fn shutdown(&mut self) {
        if let Some(mut pty) = self.pty.take() {
            pty.kill();
        }
    }

    // ── Read-side snapshot API ────────────────────────────────────────────────

    fn cursor_state(&self) -> CursorState {
        let grid = self.emu.grid();
        let cursor = grid.cursor();
        CursorState {
            x: cursor.x as u16,
            y: cursor.y as u16,
            visible: grid.modes().show_cursor,
            shape: grid.cursor_shape(),
        }
    }

    /// Materialize the full pane state at the current generation.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let grid = self.emu.grid();
        let cols = grid.cols();
        let rows = grid.rows();
        let visible = grid.visible_rows();

        let mut cells = Vec::with_capacity(cols * rows * 8);
        let mut row_ids = Vec::with_capacity(rows * 8);
        let mut records: Vec<(u32, Vec<char>)> = Vec::new();
        for (y, row) in visible.iter().enumerate() {
            cells.extend_from_slice(&row.encode_cells(cols));
            row_ids.extend_from_slice(&row.id().to_le_bytes());
            for (&x, chars) in row.graphemes() {
                if usize::from(x) < cols {
                    let index = (y * cols + usize::from(x)) as u32;
                    records.push((index, chars.clone()));
                }
            }
        }

        Snapshot {
            pane: self.id,
            gen: self.generation,
            cols: cols as u16,
            rows: rows as u16,
            cursor: self.cursor_state(),
            alt_screen: grid.alt_active(),
            total_rows: grid.total_rows() as u64,
            viewport_top: grid.viewport_top() as u64,
            cells,
            row_ids,
            styles: grid.styles().encode(),
            graphemes: encode::grapheme_blob(&records),
        }
    }

    /// Compute the incremental update for a client at `client_gen`.
    ///
    /// Carries exactly the visible rows dirtied after `client_gen`; a
    /// row untouched since the client's generation is never re-sent.
    /// Returns `None` when the client is too stale for deltas
    /// (`client_gen < dirty_base_gen`) and must take a snapshot instead.
    #[must_use]
    pub fn delta_since(&self, client_gen: u64) -> Option<Delta> {
        if client_gen < self.dirty_base_gen {
            return None;
        }
        let grid = self.emu.grid();
        let cols = grid.cols();

        let mut rows_out = Vec::new();
        let mut style_ids: BTreeSet<u16> = BTreeSet::new();
        for row in grid.visible_rows() {
            let dirtied_at = self.dirty_rows.get(&row.id()).copied().unwrap_or(0);
            if dirtied_at <= client_gen {
                continue;
            }
            for x in 0..cols {
                style_ids.insert(row.cell(x).style_id());
            }
            let records: Vec<(u32, Vec<char>)> = row
                .graphemes()
                .iter()
                .filter(|(&x, _)| usize::from(x) < cols)
                .map(|(&x, chars)| (u32::from(x), chars.clone()))
                .collect();
            rows_out.push(DeltaRow {
                id: row.id(),
                cells: row.encode_cells(cols),
                graphemes: encode::grapheme_blob(&records),
            });
        }

        // The default style is known to every client a priori.
        style_ids.remove(&crate::style::DEFAULT_STYLE);
        let ids: Vec<u16> = style_ids.into_iter().collect();

        Some(Delta {
            pane: self.id,
            gen: self.generation,
            cursor: self.cursor_state(),
            alt_screen: grid.alt_active(),
            total_rows: grid.total_rows() as u64,
            viewport_top: grid.viewport_top() as u64,
            rows: rows_out,
            styles: grid.styles().encode_subset(&ids),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pane() -> Pane {
        Pane::new(1, 80, 24, 100)
    }

    #[test]
    fn feed_bumps_generation_once_per_chunk() {
        let mut p = pane();
        assert_eq!(p.generation(), 0);
        p.feed(b"A");
        assert_eq!(p.generation(), 1);
        p.feed(b"BC");
        assert_eq!(p.generation(), 2);
    }

    #[test]
    fn noop_bytes_do_not_bump_generation() {
        let mut p = pane();
        p.feed(b"");
        assert_eq!(p.generation(), 0);
    }

    #[test]
    fn feed_tracks_dirty_rows() {
        let mut p = pane();
        p.feed(b"A");
        assert_eq!(p.dirty_len(), 1);
        p.feed(b"\r\nB");
        assert_eq!(p.dirty_len(), 2);
    }

    #[test]
    fn cursor_only_feed_bumps_gen_without_dirtying() {
        let mut p = pane();
        p.feed(b"A");
        let before = p.dirty_len();
        p.feed(b"\x1b[10;10H");
        assert_eq!(p.generation(), 2);
        assert_eq!(p.dirty_len(), before);
    }

    #[test]
    fn resize_rebases_dirty_tracking() {
        let mut p = pane();
        p.feed(b"content");
        assert!(p.dirty_len() > 0);
        p.resize(100, 30).expect("resize");
        assert_eq!(p.dirty_len(), 0);
        assert_eq!(p.dirty_base_gen(), p.generation());
        assert_eq!(p.cols(), 100);
        assert_eq!(p.rows(), 30);
    }

    #[test]
    fn delta_refused_below_dirty_base() {
        let mut p = pane();
        p.feed(b"A");
        p.resize(80, 25).expect("resize");
        // gen 1 predates the rebase at gen 2.
        assert!(p.delta_since(1).is_none());
        assert!(p.delta_since(p.generation()).is_some());
    }

    #[test]
    fn delta_contains_only_dirty_visible_rows() {
        let mut p = pane();
        p.feed(b"A");
        let delta = p.delta_since(0).expect("delta");
        assert_eq!(delta.rows.len(), 1);
        assert_eq!(delta.gen, 1);
        assert_eq!(delta.rows[0].cells.len(), 80 * 8);
    }

    #[test]
    fn snapshot_blob_sizes_match_geometry() {
        let mut p = pane();
        p.feed(b"hello");
        p.resize(41, 17).expect("resize");
        p.feed(b"more");
        let snap = p.snapshot();
        assert_eq!(snap.cells.len(), 41 * 17 * 8);
        assert_eq!(snap.row_ids.len(), 17 * 8);
        assert_eq!(snap.cols, 41);
        assert_eq!(snap.rows, 17);
    }

    #[test]
    fn dirty_overflow_rebases() {
        let mut p = Pane::new(1, 20, 4, 1000);
        p.set_delta_budget(6);
        // Scroll enough distinct rows through the screen to pass the budget.
        for i in 0..10 {
            p.feed(format!("line{i}\r\n").as_bytes());
        }
        // The rebase dropped the dirty set below the budget at some point;
        // a client from before the rebase must snapshot.
        assert!(p.dirty_base_gen() > 0);
        assert!(p.delta_since(0).is_none());
    }

    #[test]
    fn scroll_marks_revealed_rows_dirty() {
        let mut p = Pane::new(1, 20, 4, 1000);
        for i in 0..12 {
            p.feed(format!("line{i}\r\n").as_bytes());
        }
        // Rebase so the dirty set starts empty, then scroll into history.
        p.resize(20, 5).expect("resize");
        assert_eq!(p.dirty_len(), 0);
        let gen_before = p.generation();
        p.scroll(2);
        assert_eq!(p.generation(), gen_before + 1);
        assert_eq!(p.dirty_len(), 2);
        let delta = p.delta_since(gen_before).expect("delta");
        assert_eq!(delta.rows.len(), 2);
        // A client already at the new generation has nothing to fetch.
        let current = p.delta_since(p.generation()).expect("delta");
        assert!(current.rows.is_empty());
    }

    #[test]
    fn scroll_beyond_history_is_inert() {
        let mut p = pane();
        let gen = p.generation();
        p.scroll(5);
        assert_eq!(p.generation(), gen);
    }

    #[test]
    fn debug_pane_write_is_dropped() {
        let mut p = Pane::new(DEBUG_PANE, 80, 24, 100);
        p.write(b"ignored").expect("write");
        assert_eq!(p.generation(), 0);
    }

    #[test]
    fn delta_styles_cover_referenced_ids() {
        let mut p = pane();
        p.feed(b"\x1b[1;38;2;215;119;87mX");
        let delta = p.delta_since(0).expect("delta");
        let styles = crate::style::StyleTable::decode(&delta.styles).expect("styles");
        assert_eq!(styles.len(), 1);
        let (_, style) = styles[0];
        assert_eq!(style.fg, crate::style::Color::Rgb(215, 119, 87));
    }
}
