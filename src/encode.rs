//! Snapshot/delta frame encoding and the streaming frame compressor.
//!
//! Frames are [`wire::Value`] maps serialized to MessagePack, then run
//! through a per-client zlib stream ([`FrameCompressor`]). The stream is
//! sync-flushed at each frame boundary but never reset, so the
//! compression dictionary persists across frames — consecutive updates
//! to the same pane compress against each other, which is where most of
//! the bandwidth win comes from. The client feeds every binary frame
//! through the mirrored inflate stream in arrival order.
//!
//! # Frame shapes
//!
//! ```text
//! snapshot  {type, paneId, gen, cols, rows, cursor{x,y,visible,style},
//!            altScreen, viewport{totalRows,viewportTop},
//!            cells, rowIds, styles, graphemes}
//! delta     {type, paneId, gen, cursor, altScreen, viewport,
//!            rows:[{id, cells, graphemes?}], styles}
//! others    {type: pong | layout | pane-added | pane-closed | master-changed, …}
//! ```

// Rust guideline compliant 2026-03

use anyhow::{bail, Context, Result};
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::pane::{CursorState, Delta, PaneId, Snapshot};
use crate::wire::Value;

// ── Grapheme blob ─────────────────────────────────────────────────────────────

/// Serialize grapheme continuation records.
///
/// Layout: `u32 LE count`, then per record `u32 LE cell_index`,
/// `u8 num_codepoints`, and `num` codepoints as 21-bit values in three
/// little-endian bytes each.
#[must_use]
pub fn grapheme_blob(records: &[(u32, Vec<char>)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + records.len() * 8);
    out.extend_from_slice(&(records.len() as u32).to_le_bytes());
    for (index, chars) in records {
        out.extend_from_slice(&index.to_le_bytes());
        out.push(chars.len().min(255) as u8);
        for &ch in chars.iter().take(255) {
            let cp = ch as u32;
            out.push((cp & 0xFF) as u8);
            out.push(((cp >> 8) & 0xFF) as u8);
            out.push(((cp >> 16) & 0x1F) as u8);
        }
    }
    out
}

/// Parse a grapheme blob back into records (tests and tooling).
///
/// # Errors
///
/// Returns an error on truncation or codepoints outside Unicode.
pub fn decode_grapheme_blob(bytes: &[u8]) -> Result<Vec<(u32, Vec<char>)>> {
    if bytes.len() < 4 {
        bail!("grapheme blob too short: {} bytes", bytes.len());
    }
    let count = u32::from_le_bytes(bytes[0..4].try_into().expect("len 4")) as usize;
    let mut pos = 4;
    let mut records = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        if pos + 5 > bytes.len() {
            bail!("truncated grapheme record at offset {pos}");
        }
        let index = u32::from_le_bytes(bytes[pos..pos + 4].try_into().expect("len 4"));
        let num = usize::from(bytes[pos + 4]);
        pos += 5;
        if pos + num * 3 > bytes.len() {
            bail!("truncated grapheme codepoints at offset {pos}");
        }
        let mut chars = Vec::with_capacity(num);
        for i in 0..num {
            let b = &bytes[pos + i * 3..pos + i * 3 + 3];
            let cp = u32::from(b[0]) | (u32::from(b[1]) << 8) | (u32::from(b[2]) << 16);
            chars.push(char::from_u32(cp).context("invalid codepoint in grapheme blob")?);
        }
        pos += num * 3;
        records.push((index, chars));
    }
    Ok(records)
}

// ── Frame builders ────────────────────────────────────────────────────────────

fn cursor_value(cursor: &CursorState) -> Value {
    Value::map(vec![
        ("x", Value::Uint(u64::from(cursor.x))),
        ("y", Value::Uint(u64::from(cursor.y))),
        ("visible", Value::Bool(cursor.visible)),
        ("style", Value::Uint(u64::from(cursor.shape))),
    ])
}

fn viewport_value(total_rows: u64, viewport_top: u64) -> Value {
    Value::map(vec![
        ("totalRows", Value::Uint(total_rows)),
        ("viewportTop", Value::Uint(viewport_top)),
    ])
}

/// Encode a full-state snapshot frame (uncompressed).
#[must_use]
pub fn snapshot_frame(snap: &Snapshot) -> Vec<u8> {
    Value::map(vec![
        ("type", Value::str("snapshot")),
        ("paneId", Value::Uint(u64::from(snap.pane))),
        ("gen", Value::Uint(snap.gen)),
        ("cols", Value::Uint(u64::from(snap.cols))),
        ("rows", Value::Uint(u64::from(snap.rows))),
        ("cursor", cursor_value(&snap.cursor)),
        ("altScreen", Value::Bool(snap.alt_screen)),
        ("viewport", viewport_value(snap.total_rows, snap.viewport_top)),
        ("cells", Value::Bin(snap.cells.clone())),
        ("rowIds", Value::Bin(snap.row_ids.clone())),
        ("styles", Value::Bin(snap.styles.clone())),
        ("graphemes", Value::Bin(snap.graphemes.clone())),
    ])
    .encode()
}

/// Encode a dirty-row delta frame (uncompressed).
#[must_use]
pub fn delta_frame(delta: &Delta) -> Vec<u8> {
    let rows = delta
        .rows
        .iter()
        .map(|row| {
            let mut entries = vec![
                ("id", Value::Uint(row.id)),
                ("cells", Value::Bin(row.cells.clone())),
            ];
            // An empty blob is just the zero count header; omit it.
            if row.graphemes.len() > 4 {
                entries.push(("graphemes", Value::Bin(row.graphemes.clone())));
            }
            Value::map(entries)
        })
        .collect();
    Value::map(vec![
        ("type", Value::str("delta")),
        ("paneId", Value::Uint(u64::from(delta.pane))),
        ("gen", Value::Uint(delta.gen)),
        ("cursor", cursor_value(&delta.cursor)),
        ("altScreen", Value::Bool(delta.alt_screen)),
        ("viewport", viewport_value(delta.total_rows, delta.viewport_top)),
        ("rows", Value::Array(rows)),
        ("styles", Value::Bin(delta.styles.clone())),
    ])
    .encode()
}

/// Encode the reply to a client `ping`.
#[must_use]
pub fn pong_frame() -> Vec<u8> {
    Value::map(vec![("type", Value::str("pong"))]).encode()
}

/// Encode a layout broadcast from the windows' JSON representation.
///
/// # Errors
///
/// Returns an error if the JSON carries values outside the wire subset.
pub fn layout_frame(windows: &serde_json::Value) -> Result<Vec<u8>> {
    Ok(Value::map(vec![
        ("type", Value::str("layout")),
        ("windows", Value::from_json(windows)?),
    ])
    .encode())
}

/// Encode a pane-added structural event.
#[must_use]
pub fn pane_added_frame(pane: PaneId, cols: u16, rows: u16) -> Vec<u8> {
    Value::map(vec![
        ("type", Value::str("pane-added")),
        ("paneId", Value::Uint(u64::from(pane))),
        ("cols", Value::Uint(u64::from(cols))),
        ("rows", Value::Uint(u64::from(rows))),
    ])
    .encode()
}

/// Encode a pane-closed structural event.
#[must_use]
pub fn pane_closed_frame(pane: PaneId) -> Vec<u8> {
    Value::map(vec![
        ("type", Value::str("pane-closed")),
        ("paneId", Value::Uint(u64::from(pane))),
    ])
    .encode()
}

/// Encode a master-identity change. `owner` is absent when the pane has
/// no master.
#[must_use]
pub fn master_changed_frame(pane: PaneId, owner: Option<&str>) -> Vec<u8> {
    let mut entries = vec![
        ("type", Value::str("master-changed")),
        ("paneId", Value::Uint(u64::from(pane))),
    ];
    if let Some(owner) = owner {
        entries.push(("client", Value::str(owner)));
    }
    Value::map(entries).encode()
}

// ── Streaming compression ─────────────────────────────────────────────────────

/// Per-client deflate stream; the dictionary persists across frames.
#[derive(Debug)]
pub struct FrameCompressor {
    raw: Compress,
}

impl FrameCompressor {
    /// Create a zlib-framed compressor at the default level.
    #[must_use]
    pub fn new() -> Self {
        Self {
            raw: Compress::new(Compression::default(), true),
        }
    }

    /// Compress one frame, sync-flushing so the receiver can decode it
    /// without waiting for more input.
    ///
    /// # Errors
    ///
    /// Returns an error if the deflate stream is corrupted (which ends
    /// the client connection; the stream is not recoverable).
    pub fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(input.len() / 4 + 64);
        let mut consumed = 0usize;
        loop {
            if out.len() == out.capacity() {
                out.reserve(4096);
            }
            let before = self.raw.total_in();
            let status = self
                .raw
                .compress_vec(&input[consumed..], &mut out, FlushCompress::Sync)
                .context("deflate stream error")?;
            consumed += (self.raw.total_in() - before) as usize;
            if consumed >= input.len() && out.len() < out.capacity() {
                // All input taken and the sync flush fit: frame complete.
                break;
            }
            if status == Status::StreamEnd {
                break;
            }
        }
        Ok(out)
    }
}

impl Default for FrameCompressor {
    fn default() -> Self {
        Self::new()
    }
}

/// Mirror of [`FrameCompressor`] for tests and tooling.
#[derive(Debug)]
pub struct FrameDecompressor {
    raw: Decompress,
}

impl FrameDecompressor {
    /// Create the inflate side of the stream.
    #[must_use]
    pub fn new() -> Self {
        Self {
            raw: Decompress::new(true),
        }
    }

    /// Decompress one sync-flushed frame.
    ///
    /// # Errors
    ///
    /// Returns an error on a corrupt stream.
    pub fn decompress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(input.len() * 4 + 64);
        let mut consumed = 0usize;
        loop {
            if out.len() == out.capacity() {
                out.reserve(4096);
            }
            let before = self.raw.total_in();
            let status = self
                .raw
                .decompress_vec(&input[consumed..], &mut out, FlushDecompress::Sync)
                .context("inflate stream error")?;
            consumed += (self.raw.total_in() - before) as usize;
            if consumed >= input.len() && out.len() < out.capacity() {
                break;
            }
            if status == Status::StreamEnd {
                break;
            }
        }
        Ok(out)
    }
}

impl Default for FrameDecompressor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pane::Pane;

    fn sample_pane() -> Pane {
        let mut pane = Pane::new(3, 20, 5, 100);
        pane.feed(b"\x1b[1mhello\x1b[0m world");
        pane
    }

    #[test]
    fn snapshot_frame_has_required_keys() {
        let frame = snapshot_frame(&sample_pane().snapshot());
        let value = Value::decode(&frame).expect("decode");
        assert_eq!(value.get("type").and_then(Value::as_str), Some("snapshot"));
        assert_eq!(value.get("paneId").and_then(Value::as_u64), Some(3));
        assert_eq!(value.get("gen").and_then(Value::as_u64), Some(1));
        assert_eq!(value.get("cols").and_then(Value::as_u64), Some(20));
        assert_eq!(value.get("rows").and_then(Value::as_u64), Some(5));
        let cells = value.get("cells").and_then(Value::as_bin).expect("cells");
        assert_eq!(cells.len(), 20 * 5 * 8);
        let row_ids = value.get("rowIds").and_then(Value::as_bin).expect("rowIds");
        assert_eq!(row_ids.len(), 5 * 8);
        assert!(value.get("styles").and_then(Value::as_bin).is_some());
        assert!(value.get("graphemes").and_then(Value::as_bin).is_some());
        let viewport = value.get("viewport").expect("viewport");
        assert_eq!(viewport.get("totalRows").and_then(Value::as_u64), Some(5));
        let cursor = value.get("cursor").expect("cursor");
        assert_eq!(cursor.get("visible").and_then(Value::as_bool), Some(true));
    }

    #[test]
    fn delta_frame_lists_dirty_rows() {
        let pane = sample_pane();
        let delta = pane.delta_since(0).expect("delta");
        let value = Value::decode(&delta_frame(&delta)).expect("decode");
        assert_eq!(value.get("type").and_then(Value::as_str), Some("delta"));
        let rows = value.get("rows").and_then(Value::as_array).expect("rows");
        assert_eq!(rows.len(), 1);
        let cells = rows[0].get("cells").and_then(Value::as_bin).expect("cells");
        assert_eq!(cells.len(), 20 * 8);
        assert!(rows[0].get("id").and_then(Value::as_u64).is_some());
        // No graphemes were written, so the key is omitted.
        assert!(rows[0].get("graphemes").is_none());
    }

    #[test]
    fn delta_frame_includes_grapheme_rows() {
        let mut pane = Pane::new(1, 80, 24, 100);
        pane.feed("\u{1F44D}\u{1F3FB}".as_bytes());
        let delta = pane.delta_since(0).expect("delta");
        let value = Value::decode(&delta_frame(&delta)).expect("decode");
        let rows = value.get("rows").and_then(Value::as_array).expect("rows");
        let blob = rows[0]
            .get("graphemes")
            .and_then(Value::as_bin)
            .expect("graphemes");
        let records = decode_grapheme_blob(blob).expect("records");
        assert_eq!(records, vec![(0, vec!['\u{1F3FB}'])]);
    }

    #[test]
    fn grapheme_blob_round_trips() {
        let records = vec![
            (245, vec!['\u{1F3FB}']),
            (0, vec!['\u{0301}', '\u{0308}']),
            (1599, vec!['\u{200D}']),
        ];
        let blob = grapheme_blob(&records);
        assert_eq!(decode_grapheme_blob(&blob).expect("decode"), records);
    }

    #[test]
    fn grapheme_blob_empty() {
        let blob = grapheme_blob(&[]);
        assert_eq!(blob, vec![0, 0, 0, 0]);
        assert!(decode_grapheme_blob(&blob).expect("decode").is_empty());
    }

    #[test]
    fn structural_frames_decode() {
        let added = Value::decode(&pane_added_frame(4, 80, 24)).expect("decode");
        assert_eq!(added.get("type").and_then(Value::as_str), Some("pane-added"));
        assert_eq!(added.get("cols").and_then(Value::as_u64), Some(80));

        let closed = Value::decode(&pane_closed_frame(4)).expect("decode");
        assert_eq!(closed.get("type").and_then(Value::as_str), Some("pane-closed"));

        let master = Value::decode(&master_changed_frame(4, Some("abc123"))).expect("decode");
        assert_eq!(master.get("client").and_then(Value::as_str), Some("abc123"));
        let vacated = Value::decode(&master_changed_frame(4, None)).expect("decode");
        assert!(vacated.get("client").is_none());

        let pong = Value::decode(&pong_frame()).expect("decode");
        assert_eq!(pong.get("type").and_then(Value::as_str), Some("pong"));
    }

    #[test]
    fn compressor_round_trips_single_frame() {
        let frame = snapshot_frame(&sample_pane().snapshot());
        let mut comp = FrameCompressor::new();
        let mut decomp = FrameDecompressor::new();
        let compressed = comp.compress(&frame).expect("compress");
        let restored = decomp.decompress(&compressed).expect("decompress");
        assert_eq!(restored, frame);
    }

    #[test]
    fn compressor_dictionary_spans_frames() {
        let frame = snapshot_frame(&sample_pane().snapshot());
        let mut comp = FrameCompressor::new();
        let mut decomp = FrameDecompressor::new();
        let first = comp.compress(&frame).expect("compress");
        let second = comp.compress(&frame).expect("compress");
        // The second identical frame compresses against the dictionary.
        assert!(second.len() < first.len() / 2);
        assert_eq!(decomp.decompress(&first).expect("d1"), frame);
        assert_eq!(decomp.decompress(&second).expect("d2"), frame);
    }

    #[test]
    fn compressor_handles_large_incompressible_input() {
        // Pseudo-random bytes defeat compression; output grows past the
        // initial capacity and the loop must keep reserving.
        let mut state = 0x12345678u32;
        let input: Vec<u8> = (0..200_000)
            .map(|_| {
                state = state.wrapping_mul(1664525).wrapping_add(1013904223);
                (state >> 24) as u8
            })
            .collect();
        let mut comp = FrameCompressor::new();
        let mut decomp = FrameDecompressor::new();
        let compressed = comp.compress(&input).expect("compress");
        assert_eq!(decomp.decompress(&compressed).expect("decompress"), input);
    }
}
