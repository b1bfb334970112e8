//! End-to-end replication tests at the pane/encoder level.
//!
//! Exercises the contract a browser client relies on: snapshots are
//! self-contained, deltas applied to a row cache keyed by row id
//! reproduce the next snapshot's visible cells, and the whole pipeline
//! survives the compressor round trip.

use std::collections::HashMap;

use dullahan::encode::{
    self, decode_grapheme_blob, FrameCompressor, FrameDecompressor,
};
use dullahan::{Cell, ContentTag, Pane, StyleTable, Value};

/// Minimal model of the browser-side row cache.
#[derive(Default)]
struct ClientCache {
    rows: HashMap<u64, Vec<u8>>,
    visible: Vec<u64>,
    gen: u64,
    cols: usize,
}

impl ClientCache {
    fn apply_snapshot(&mut self, frame: &[u8]) {
        let value = Value::decode(frame).expect("snapshot decodes");
        assert_eq!(value.get("type").and_then(Value::as_str), Some("snapshot"));
        let cols = value.get("cols").and_then(Value::as_u64).expect("cols") as usize;
        let rows = value.get("rows").and_then(Value::as_u64).expect("rows") as usize;
        let cells = value.get("cells").and_then(Value::as_bin).expect("cells");
        let row_ids = value.get("rowIds").and_then(Value::as_bin).expect("rowIds");
        assert_eq!(cells.len(), cols * rows * 8);
        assert_eq!(row_ids.len(), rows * 8);

        self.rows.clear();
        self.visible.clear();
        self.cols = cols;
        for y in 0..rows {
            let id = u64::from_le_bytes(row_ids[y * 8..y * 8 + 8].try_into().expect("8 bytes"));
            self.visible.push(id);
            self.rows
                .insert(id, cells[y * cols * 8..(y + 1) * cols * 8].to_vec());
        }
        self.gen = value.get("gen").and_then(Value::as_u64).expect("gen");
    }

    fn apply_delta(&mut self, frame: &[u8]) {
        let value = Value::decode(frame).expect("delta decodes");
        assert_eq!(value.get("type").and_then(Value::as_str), Some("delta"));
        let new_gen = value.get("gen").and_then(Value::as_u64).expect("gen");
        assert!(new_gen > self.gen, "generations strictly increase");
        for row in value.get("rows").and_then(Value::as_array).expect("rows") {
            let id = row.get("id").and_then(Value::as_u64).expect("id");
            let cells = row.get("cells").and_then(Value::as_bin).expect("cells");
            assert_eq!(cells.len(), self.cols * 8);
            self.rows.insert(id, cells.to_vec());
        }
        self.gen = new_gen;
    }

    /// Check the cache holds exactly the visible cells of `snap_frame`.
    fn assert_matches_snapshot(&self, snap_frame: &[u8]) {
        let value = Value::decode(snap_frame).expect("snapshot decodes");
        let cols = value.get("cols").and_then(Value::as_u64).expect("cols") as usize;
        let cells = value.get("cells").and_then(Value::as_bin).expect("cells");
        let row_ids = value.get("rowIds").and_then(Value::as_bin).expect("rowIds");
        for (y, id_bytes) in row_ids.chunks_exact(8).enumerate() {
            let id = u64::from_le_bytes(id_bytes.try_into().expect("8 bytes"));
            let expected = &cells[y * cols * 8..(y + 1) * cols * 8];
            let cached = self
                .rows
                .get(&id)
                .unwrap_or_else(|| panic!("row {id} missing from cache"));
            assert_eq!(cached.as_slice(), expected, "row {id} (y={y}) diverged");
        }
    }
}

fn snapshot_of(pane: &Pane) -> Vec<u8> {
    encode::snapshot_frame(&pane.snapshot())
}

// ── E1: split SGR sequence ────────────────────────────────────────────────────

#[test]
fn split_sgr_sequence_renders_one_styled_glyph() {
    let mut pane = Pane::new(1, 80, 24, 1000);
    pane.feed(b"\x1b[38;2;215;119;87");
    pane.feed("m\u{2502}".as_bytes());

    let snap = pane.snapshot();
    let first = Cell::from_bits(u64::from_le_bytes(snap.cells[0..8].try_into().unwrap()));
    assert_eq!(first.codepoint(), Some('\u{2502}'));
    let styles = StyleTable::decode(&snap.styles).expect("styles");
    let (_, style) = styles
        .iter()
        .find(|(id, _)| *id == first.style_id())
        .expect("style present");
    assert_eq!(style.fg, dullahan::Color::Rgb(215, 119, 87));

    // No stray 'm' anywhere in the grid.
    assert!(!pane.grid().contents().contains('m'));
}

// ── E2: snapshot → delta → delta ──────────────────────────────────────────────

#[test]
fn snapshot_then_deltas_track_single_dirty_rows() {
    let mut pane = Pane::new(1, 80, 24, 1000);
    let mut cache = ClientCache::default();

    pane.feed(b"A");
    assert_eq!(pane.generation(), 1);
    cache.apply_snapshot(&snapshot_of(&pane));
    assert_eq!(cache.gen, 1);

    pane.feed(b"B");
    let delta = pane.delta_since(1).expect("delta at gen 1");
    assert_eq!(delta.gen, 2);
    assert_eq!(delta.rows.len(), 1);
    let cells = &delta.rows[0].cells;
    let c0 = Cell::from_bits(u64::from_le_bytes(cells[0..8].try_into().unwrap()));
    let c1 = Cell::from_bits(u64::from_le_bytes(cells[8..16].try_into().unwrap()));
    assert_eq!(c0.codepoint(), Some('A'));
    assert_eq!(c1.codepoint(), Some('B'));
    cache.apply_delta(&encode::delta_frame(&delta));
    cache.assert_matches_snapshot(&snapshot_of(&pane));

    // A newline plus a glyph dirties only the second row; the cursor
    // motion alone does not re-dirty row 0.
    pane.feed(b"\nC");
    let delta = pane.delta_since(2).expect("delta at gen 2");
    assert_eq!(delta.gen, 3);
    assert_eq!(delta.rows.len(), 1);
    cache.apply_delta(&encode::delta_frame(&delta));
    cache.assert_matches_snapshot(&snapshot_of(&pane));
}

// ── E3: stale client upgrades to snapshot ─────────────────────────────────────

#[test]
fn stale_client_is_refused_a_delta() {
    let mut pane = Pane::new(1, 80, 24, 1000);
    pane.feed(b"A");
    assert!(pane.delta_since(1).is_some());

    // A resize rebases dirty tracking past generation 1.
    pane.resize(81, 24).expect("resize");
    assert!(pane.dirty_base_gen() > 1);
    assert!(pane.delta_since(1).is_none(), "stale client must snapshot");
    assert!(pane.delta_since(pane.generation()).is_some());
}

// ── E5: grapheme continuation on the wire ─────────────────────────────────────

#[test]
fn emoji_modifier_lands_in_grapheme_blob() {
    let mut pane = Pane::new(1, 80, 24, 1000);
    // Position (x=5, y=3), then a thumbs-up with a skin-tone modifier.
    pane.feed(b"\x1b[4;6H");
    pane.feed("\u{1F44D}\u{1F3FB}".as_bytes());

    let snap = pane.snapshot();
    let index = 3 * 80 + 5;
    let cell = Cell::from_bits(u64::from_le_bytes(
        snap.cells[index * 8..index * 8 + 8].try_into().unwrap(),
    ));
    assert_eq!(cell.tag(), ContentTag::Grapheme);
    assert_eq!(cell.codepoint(), Some('\u{1F44D}'));

    let records = decode_grapheme_blob(&snap.graphemes).expect("grapheme blob");
    assert_eq!(records, vec![(index as u32, vec!['\u{1F3FB}'])]);
}

// ── Property 1: re-chunking invariance ────────────────────────────────────────

#[test]
fn any_rechunking_of_pty_bytes_yields_identical_state() {
    let script: &[u8] = b"\x1b[2J\x1b[H\x1b[1;38;2;215;119;87mhead\x1b[0m\r\n\
        plain text \xf0\x9f\x91\x8d\xf0\x9f\x8f\xbb tail\r\n\
        \x1b[48;5;17m    \x1b[0m\x1b[4:3mcurly\x1b[0m\x1b[5;10Hmoved";

    let reference = {
        let mut pane = Pane::new(1, 40, 10, 100);
        pane.feed(script);
        pane.snapshot()
    };

    // Split the byte stream at every pair of positions derived from a
    // small deterministic sequence, including mid-UTF-8 and mid-escape.
    let mut state = 0x2545_F491u32;
    for _ in 0..200 {
        state = state.wrapping_mul(1664525).wrapping_add(1013904223);
        let a = (state as usize >> 8) % script.len();
        state = state.wrapping_mul(1664525).wrapping_add(1013904223);
        let b = (state as usize >> 8) % script.len();
        let (lo, hi) = (a.min(b), a.max(b));

        let mut pane = Pane::new(1, 40, 10, 100);
        pane.feed(&script[..lo]);
        pane.feed(&script[lo..hi]);
        pane.feed(&script[hi..]);
        let snap = pane.snapshot();
        assert_eq!(snap.cells, reference.cells, "split at ({lo}, {hi})");
        assert_eq!(snap.styles, reference.styles, "styles at ({lo}, {hi})");
        assert_eq!(snap.graphemes, reference.graphemes, "graphemes at ({lo}, {hi})");
    }
}

// ── Property 2: delta application law over a long trajectory ──────────────────

#[test]
fn deltas_reproduce_every_intermediate_snapshot() {
    let mut pane = Pane::new(1, 30, 6, 1000);
    let mut cache = ClientCache::default();
    cache.apply_snapshot(&snapshot_of(&pane));

    let chunks: Vec<Vec<u8>> = (0..40)
        .map(|i| match i % 5 {
            0 => format!("line {i}\r\n").into_bytes(),
            1 => b"\x1b[31mred\x1b[0m ".to_vec(),
            2 => b"\x1b[2Aup\x1b[2B".to_vec(),
            3 => format!("wide \u{4E2D}\u{6587} {i}\r\n").into_bytes(),
            _ => b"\x1b[K".to_vec(),
        })
        .collect();

    for chunk in &chunks {
        let before_gen = cache.gen;
        pane.feed(chunk);
        if pane.generation() == before_gen {
            continue;
        }
        match pane.delta_since(before_gen) {
            Some(delta) => cache.apply_delta(&encode::delta_frame(&delta)),
            None => cache.apply_snapshot(&snapshot_of(&pane)),
        }
        cache.assert_matches_snapshot(&snapshot_of(&pane));
    }
}

// ── Property 3: row identity uniqueness and no reuse ──────────────────────────

#[test]
fn row_ids_never_alias_across_a_stormy_lifetime() {
    let mut pane = Pane::new(1, 20, 4, 8);
    let mut retired: std::collections::HashSet<u64> = std::collections::HashSet::new();
    let mut previous_live: std::collections::HashSet<u64> = std::collections::HashSet::new();

    let mut step = |pane: &mut Pane,
                    retired: &mut std::collections::HashSet<u64>,
                    previous_live: &mut std::collections::HashSet<u64>| {
        let live: Vec<u64> = pane.grid().live_row_ids();
        let unique: std::collections::HashSet<u64> = live.iter().copied().collect();
        assert_eq!(unique.len(), live.len(), "live ids must be unique");
        for id in &unique {
            assert!(!retired.contains(id), "retired id {id} came back");
        }
        for gone in previous_live.difference(&unique) {
            retired.insert(*gone);
        }
        *previous_live = unique;
    };

    for i in 0..30 {
        pane.feed(format!("scroll {i}\r\n").as_bytes());
        step(&mut pane, &mut retired, &mut previous_live);
    }
    pane.feed(b"\x1b[?1049h");
    step(&mut pane, &mut retired, &mut previous_live);
    pane.feed(b"alt content\r\n");
    step(&mut pane, &mut retired, &mut previous_live);
    pane.feed(b"\x1b[?1049l");
    step(&mut pane, &mut retired, &mut previous_live);
    pane.resize(25, 6).expect("resize");
    step(&mut pane, &mut retired, &mut previous_live);
    for i in 0..30 {
        pane.feed(format!("more {i}\r\n").as_bytes());
        step(&mut pane, &mut retired, &mut previous_live);
    }
}

// ── Property 4: resize geometry law ───────────────────────────────────────────

#[test]
fn snapshot_cell_blob_tracks_resize_exactly() {
    let mut pane = Pane::new(1, 80, 24, 1000);
    pane.feed(b"before resize\r\n");
    for (cols, rows) in [(132u16, 43u16), (20, 5), (80, 24), (1, 1)] {
        pane.resize(cols, rows).expect("resize");
        pane.feed(b"after resize");
        let snap = pane.snapshot();
        assert_eq!(snap.cells.len(), 8 * usize::from(cols) * usize::from(rows));
        assert_eq!(snap.row_ids.len(), 8 * usize::from(rows));
    }
}

// ── Round-trip law: frames survive the compressed transport ───────────────────

#[test]
fn compressed_frames_round_trip_in_order() {
    let mut pane = Pane::new(1, 40, 10, 1000);
    let mut comp = FrameCompressor::new();
    let mut decomp = FrameDecompressor::new();
    let mut cache = ClientCache::default();

    pane.feed(b"initial contents\r\n");
    let frames = vec![
        encode::snapshot_frame(&pane.snapshot()),
        {
            pane.feed(b"\x1b[1mmore\x1b[0m");
            let delta = pane.delta_since(1).expect("delta");
            encode::delta_frame(&delta)
        },
        {
            pane.feed(b"\r\nand more");
            let delta = pane.delta_since(2).expect("delta");
            encode::delta_frame(&delta)
        },
    ];

    for (i, frame) in frames.iter().enumerate() {
        let wire_bytes = comp.compress(frame).expect("compress");
        let restored = decomp.decompress(&wire_bytes).expect("decompress");
        assert_eq!(&restored, frame, "frame {i} corrupted in transit");
        if i == 0 {
            cache.apply_snapshot(&restored);
        } else {
            cache.apply_delta(&restored);
        }
    }
    cache.assert_matches_snapshot(&encode::snapshot_frame(&pane.snapshot()));
}

// ── Viewport scroll replication ───────────────────────────────────────────────

#[test]
fn scroll_into_history_ships_revealed_rows() {
    let mut pane = Pane::new(1, 20, 4, 100);
    for i in 0..12 {
        pane.feed(format!("history {i}\r\n").as_bytes());
    }
    let mut cache = ClientCache::default();
    cache.apply_snapshot(&snapshot_of(&pane));

    let before = pane.generation();
    let visible_before: std::collections::HashSet<u64> =
        pane.grid().visible_row_ids().into_iter().collect();
    pane.scroll(3);
    let revealed: Vec<u64> = pane
        .grid()
        .visible_row_ids()
        .into_iter()
        .filter(|id| !visible_before.contains(id))
        .collect();
    assert_eq!(revealed.len(), 3);

    let delta = pane.delta_since(before).expect("delta after scroll");
    let shipped: std::collections::HashSet<u64> = delta.rows.iter().map(|r| r.id).collect();
    for id in &revealed {
        assert!(shipped.contains(id), "revealed row {id} missing from delta");
    }
    cache.apply_delta(&encode::delta_frame(&delta));
    cache.assert_matches_snapshot(&snapshot_of(&pane));
}
