//! SGR style records and the per-pane interning table.
//!
//! Cells carry a 16-bit `style_id` instead of inline attributes; the id
//! indexes a table of [`Style`] records that is replicated to clients.
//! Interning keeps the common case (long runs of identically-styled text)
//! at one table entry, and gives deltas a compact way to ship only the
//! records their rows reference.
//!
//! # Wire format
//!
//! ```text
//! u16 LE count
//! count x { u16 LE id, u8[4] fg, u8[4] bg, u8[4] underline, u16 LE flags }
//! ```
//!
//! Each color is `{ tag, b1, b2, b3 }`: tag 0 = default (bytes zero),
//! tag 1 = palette (b1 is the index), tag 2 = RGB (b1..b3 are r, g, b).

// Rust guideline compliant 2026-03

use std::collections::HashMap;

use anyhow::{bail, Result};

/// Style id of the default (empty) style; always present in the table.
pub const DEFAULT_STYLE: u16 = 0;

/// Bold attribute flag.
pub const FLAG_BOLD: u16 = 1 << 0;
/// Italic attribute flag.
pub const FLAG_ITALIC: u16 = 1 << 1;
/// Underline kind mask (bits 2-4): 0 none, 1 single, 2 double, 3 curly,
/// 4 dotted, 5 dashed.
pub const FLAG_UNDERLINE_MASK: u16 = 0b111 << 2;
const FLAG_UNDERLINE_SHIFT: u16 = 2;
/// Blink attribute flag.
pub const FLAG_BLINK: u16 = 1 << 5;
/// Inverse-video attribute flag.
pub const FLAG_INVERSE: u16 = 1 << 6;
/// Invisible (SGR 8) attribute flag.
pub const FLAG_INVISIBLE: u16 = 1 << 7;
/// Strikethrough attribute flag.
pub const FLAG_STRIKETHROUGH: u16 = 1 << 8;

/// A color slot in a style record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Color {
    /// Terminal default for the slot.
    #[default]
    Default,
    /// 256-color palette index.
    Palette(u8),
    /// Direct 24-bit color.
    Rgb(u8, u8, u8),
}

impl Color {
    /// Serialize to the four-byte wire form.
    #[must_use]
    pub fn to_wire(self) -> [u8; 4] {
        match self {
            Color::Default => [0, 0, 0, 0],
            Color::Palette(i) => [1, i, 0, 0],
            Color::Rgb(r, g, b) => [2, r, g, b],
        }
    }

    /// Parse the four-byte wire form.
    pub fn from_wire(bytes: [u8; 4]) -> Result<Self> {
        match bytes[0] {
            0 => Ok(Color::Default),
            1 => Ok(Color::Palette(bytes[1])),
            2 => Ok(Color::Rgb(bytes[1], bytes[2], bytes[3])),
            other => bail!("unknown color tag: {other}"),
        }
    }
}

/// One style record: colors plus the attribute flag word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Style {
    /// Foreground color.
    pub fg: Color,
    /// Background color.
    pub bg: Color,
    /// Underline color (SGR 58/59); `Default` means "follow foreground".
    pub underline: Color,
    /// Attribute flags; see the `FLAG_*` constants.
    pub flags: u16,
}

impl Style {
    /// Underline kind (0 = none, 1 = single, 2 = double, 3 = curly,
    /// 4 = dotted, 5 = dashed).
    #[must_use]
    pub fn underline_kind(&self) -> u8 {
        ((self.flags & FLAG_UNDERLINE_MASK) >> FLAG_UNDERLINE_SHIFT) as u8
    }

    /// Return this style with the underline kind replaced.
    #[must_use]
    pub fn with_underline_kind(mut self, kind: u8) -> Self {
        self.flags = (self.flags & !FLAG_UNDERLINE_MASK)
            | ((u16::from(kind.min(5))) << FLAG_UNDERLINE_SHIFT);
        self
    }

    /// Whether this is the all-default style.
    #[must_use]
    pub fn is_default(&self) -> bool {
        *self == Style::default()
    }
}

/// Interning table mapping styles to stable 16-bit ids.
///
/// Id 0 is always the default style. Ids are stable for the lifetime of
/// the pane; the table never shrinks. If an application manages to
/// produce 65 536 distinct styles the table saturates and further novel
/// styles collapse to the default id rather than aliasing an existing one.
#[derive(Debug)]
pub struct StyleTable {
    records: Vec<Style>,
    index: HashMap<Style, u16>,
    saturated: bool,
}

impl StyleTable {
    /// Create a table holding only the default style.
    #[must_use]
    pub fn new() -> Self {
        let mut index = HashMap::new();
        index.insert(Style::default(), DEFAULT_STYLE);
        Self {
            records: vec![Style::default()],
            index,
            saturated: false,
        }
    }

    /// Intern a style, returning its id.
    pub fn intern(&mut self, style: Style) -> u16 {
        if let Some(&id) = self.index.get(&style) {
            return id;
        }
        if self.records.len() > usize::from(u16::MAX) {
            if !self.saturated {
                log::warn!("style table saturated at {} entries", self.records.len());
                self.saturated = true;
            }
            return DEFAULT_STYLE;
        }
        let id = self.records.len() as u16;
        self.records.push(style);
        self.index.insert(style, id);
        id
    }

    /// Look up a style by id; unknown ids resolve to the default style.
    #[must_use]
    pub fn get(&self, id: u16) -> Style {
        self.records
            .get(usize::from(id))
            .copied()
            .unwrap_or_default()
    }

    /// Number of interned styles (including the default).
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether only the default style is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.len() <= 1
    }

    /// Serialize the full table for a snapshot.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        self.encode_ids(
            (0..self.records.len()).map(|i| i as u16),
            self.records.len(),
        )
    }

    /// Serialize only the given ids, for the incremental delta table.
    ///
    /// `ids` must be sorted and deduplicated by the caller.
    #[must_use]
    pub fn encode_subset(&self, ids: &[u16]) -> Vec<u8> {
        self.encode_ids(ids.iter().copied(), ids.len())
    }

    fn encode_ids(&self, ids: impl Iterator<Item = u16>, count: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + count * 16);
        out.extend_from_slice(&(count as u16).to_le_bytes());
        for id in ids {
            let style = self.get(id);
            out.extend_from_slice(&id.to_le_bytes());
            out.extend_from_slice(&style.fg.to_wire());
            out.extend_from_slice(&style.bg.to_wire());
            out.extend_from_slice(&style.underline.to_wire());
            out.extend_from_slice(&style.flags.to_le_bytes());
        }
        out
    }

    /// Parse an encoded table into `(id, style)` pairs.
    ///
    /// Used by tests and the admin tooling; the server itself only encodes.
    pub fn decode(bytes: &[u8]) -> Result<Vec<(u16, Style)>> {
        if bytes.len() < 2 {
            bail!("style table too short: {} bytes", bytes.len());
        }
        let count = usize::from(u16::from_le_bytes([bytes[0], bytes[1]]));
        let body = &bytes[2..];
        if body.len() != count * 16 {
            bail!(
                "style table length mismatch: {count} records but {} body bytes",
                body.len()
            );
        }
        let mut out = Vec::with_capacity(count);
        for rec in body.chunks_exact(16) {
            let id = u16::from_le_bytes([rec[0], rec[1]]);
            let fg = Color::from_wire([rec[2], rec[3], rec[4], rec[5]])?;
            let bg = Color::from_wire([rec[6], rec[7], rec[8], rec[9]])?;
            let underline = Color::from_wire([rec[10], rec[11], rec[12], rec[13]])?;
            let flags = u16::from_le_bytes([rec[14], rec[15]]);
            out.push((
                id,
                Style {
                    fg,
                    bg,
                    underline,
                    flags,
                },
            ));
        }
        Ok(out)
    }
}

impl Default for StyleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_style_is_id_zero() {
        let mut table = StyleTable::new();
        assert_eq!(table.intern(Style::default()), DEFAULT_STYLE);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn intern_is_stable() {
        let mut table = StyleTable::new();
        let bold = Style {
            flags: FLAG_BOLD,
            ..Style::default()
        };
        let id1 = table.intern(bold);
        let id2 = table.intern(bold);
        assert_eq!(id1, id2);
        assert_ne!(id1, DEFAULT_STYLE);
        assert_eq!(table.get(id1), bold);
    }

    #[test]
    fn distinct_styles_get_distinct_ids() {
        let mut table = StyleTable::new();
        let red = Style {
            fg: Color::Palette(1),
            ..Style::default()
        };
        let rgb = Style {
            fg: Color::Rgb(215, 119, 87),
            ..Style::default()
        };
        assert_ne!(table.intern(red), table.intern(rgb));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn unknown_id_resolves_to_default() {
        let table = StyleTable::new();
        assert_eq!(table.get(999), Style::default());
    }

    #[test]
    fn underline_kind_round_trips() {
        let style = Style::default().with_underline_kind(3);
        assert_eq!(style.underline_kind(), 3);
        let style = style.with_underline_kind(0);
        assert_eq!(style.underline_kind(), 0);
    }

    #[test]
    fn underline_kind_clamps() {
        let style = Style::default().with_underline_kind(200);
        assert_eq!(style.underline_kind(), 5);
    }

    #[test]
    fn color_wire_round_trip() {
        for color in [
            Color::Default,
            Color::Palette(196),
            Color::Rgb(215, 119, 87),
        ] {
            assert_eq!(Color::from_wire(color.to_wire()).unwrap(), color);
        }
    }

    #[test]
    fn color_bad_tag_rejected() {
        assert!(Color::from_wire([9, 0, 0, 0]).is_err());
    }

    #[test]
    fn encode_decode_full_table() {
        let mut table = StyleTable::new();
        table.intern(Style {
            fg: Color::Rgb(1, 2, 3),
            bg: Color::Palette(4),
            underline: Color::Default,
            flags: FLAG_BOLD | FLAG_INVERSE,
        });
        table.intern(Style {
            fg: Color::Default,
            bg: Color::Default,
            underline: Color::Rgb(9, 9, 9),
            flags: FLAG_STRIKETHROUGH,
        });

        let encoded = table.encode();
        let decoded = StyleTable::decode(&encoded).unwrap();
        assert_eq!(decoded.len(), 3);
        for (id, style) in decoded {
            assert_eq!(table.get(id), style);
        }
    }

    #[test]
    fn encode_subset_only_carries_requested_ids() {
        let mut table = StyleTable::new();
        let a = table.intern(Style {
            flags: FLAG_BOLD,
            ..Style::default()
        });
        let _b = table.intern(Style {
            flags: FLAG_ITALIC,
            ..Style::default()
        });

        let encoded = table.encode_subset(&[a]);
        let decoded = StyleTable::decode(&encoded).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].0, a);
    }

    #[test]
    fn decode_rejects_truncated_body() {
        let mut table = StyleTable::new();
        table.intern(Style {
            flags: FLAG_BOLD,
            ..Style::default()
        });
        let mut encoded = table.encode();
        encoded.pop();
        assert!(StyleTable::decode(&encoded).is_err());
    }
}
