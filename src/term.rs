//! Terminal emulator: a persistent [`vte::Parser`] driving a [`Grid`].
//!
//! Presents a simple `process(bytes)` / `resize(cols, rows)` interface.
//! The parser instance lives as long as the pane, so escape sequences
//! split across PTY read boundaries are reassembled transparently —
//! feeding `ESC [ 3 8 ; 2 ; …` in one chunk and the terminating `m` in
//! the next yields the same grid as feeding them together.
//!
//! # Architecture
//!
//! ```text
//! Emulator
//!  ├── parser: vte::Parser     (escape-sequence state machine)
//!  └── grid: Grid              (screen, scrollback, styles, dirty rows)
//! ```
//!
//! The [`Performer`] borrows the grid only for the duration of one
//! `process` call, so the emulator stays freely movable — no back
//! references survive between feeds.
//!
//! The performer is total over bytes: unknown or malformed sequences are
//! parsed and discarded without error.

// Rust guideline compliant 2026-03

use vte::{Params, Perform};

use crate::grid::Grid;
use crate::style::{Color, Style};

/// Persistent VT parser plus the grid it mutates.
pub struct Emulator {
    parser: vte::Parser,
    grid: Grid,
}

impl std::fmt::Debug for Emulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emulator")
            .field("cols", &self.grid.cols())
            .field("rows", &self.grid.rows())
            .finish_non_exhaustive()
    }
}

impl Emulator {
    /// Create an emulator with a blank grid.
    #[must_use]
    pub fn new(cols: usize, rows: usize, scrollback: usize) -> Self {
        Self {
            parser: vte::Parser::new(),
            grid: Grid::new(cols, rows, scrollback),
        }
    }

    /// Feed raw PTY bytes. Hot path; infallible at the byte level.
    pub fn process(&mut self, bytes: &[u8]) {
        let mut performer = Performer {
            grid: &mut self.grid,
        };
        self.parser.advance(&mut performer, bytes);
    }

    /// Resize the underlying grid.
    pub fn resize(&mut self, cols: usize, rows: usize) {
        self.grid.resize(cols, rows);
    }

    /// Borrow the grid for reading.
    #[must_use]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Mutably borrow the grid (viewport scrolls, event draining).
    pub fn grid_mut(&mut self) -> &mut Grid {
        &mut self.grid
    }
}

/// One-feed adapter translating [`Perform`] callbacks into grid mutations.
struct Performer<'a> {
    grid: &'a mut Grid,
}

impl Performer<'_> {
    /// First parameter of group `i`, with `0` treated as the default.
    fn arg(ps: &[Vec<u16>], i: usize, default: u16) -> u16 {
        ps.get(i)
            .and_then(|g| g.first())
            .copied()
            .filter(|&v| v != 0)
            .unwrap_or(default)
    }

    /// First parameter of group `i`, zero preserved.
    fn raw(ps: &[Vec<u16>], i: usize) -> u16 {
        ps.get(i).and_then(|g| g.first()).copied().unwrap_or(0)
    }

    fn sgr(&mut self, ps: &[Vec<u16>]) {
        if ps.is_empty() {
            *self.grid.pen_style_mut() = Style::default();
            return;
        }
        let mut i = 0;
        while i < ps.len() {
            let group = &ps[i];
            let code = group.first().copied().unwrap_or(0);
            if matches!(code, 38 | 48 | 58) {
                if let Some(color) = Self::extended_color(ps, &mut i) {
                    let pen = self.grid.pen_style_mut();
                    match code {
                        38 => pen.fg = color,
                        48 => pen.bg = color,
                        _ => pen.underline = color,
                    }
                }
                i += 1;
                continue;
            }
            let pen = self.grid.pen_style_mut();
            match code {
                0 => *pen = Style::default(),
                1 => pen.flags |= crate::style::FLAG_BOLD,
                3 => pen.flags |= crate::style::FLAG_ITALIC,
                4 => {
                    // 4:k selects the underline kind; bare 4 is single.
                    let kind = group.get(1).copied().unwrap_or(1).min(5) as u8;
                    *pen = pen.with_underline_kind(kind);
                }
                5 => pen.flags |= crate::style::FLAG_BLINK,
                7 => pen.flags |= crate::style::FLAG_INVERSE,
                8 => pen.flags |= crate::style::FLAG_INVISIBLE,
                9 => pen.flags |= crate::style::FLAG_STRIKETHROUGH,
                21 => *pen = pen.with_underline_kind(2),
                22 => pen.flags &= !crate::style::FLAG_BOLD,
                23 => pen.flags &= !crate::style::FLAG_ITALIC,
                24 => *pen = pen.with_underline_kind(0),
                25 => pen.flags &= !crate::style::FLAG_BLINK,
                27 => pen.flags &= !crate::style::FLAG_INVERSE,
                28 => pen.flags &= !crate::style::FLAG_INVISIBLE,
                29 => pen.flags &= !crate::style::FLAG_STRIKETHROUGH,
                30..=37 => pen.fg = Color::Palette((code - 30) as u8),
                39 => pen.fg = Color::Default,
                40..=47 => pen.bg = Color::Palette((code - 40) as u8),
                49 => pen.bg = Color::Default,
                59 => pen.underline = Color::Default,
                90..=97 => pen.fg = Color::Palette((code - 90 + 8) as u8),
                100..=107 => pen.bg = Color::Palette((code - 100 + 8) as u8),
                _ => {}
            }
            i += 1;
        }
    }

    /// Parse a 38/48/58 extended color in either the colon form
    /// (`38:2:r:g:b`, one group) or the legacy semicolon form
    /// (`38;2;r;g;b`, consecutive groups). Advances `i` past consumed
    /// groups in the semicolon form.
    fn extended_color(ps: &[Vec<u16>], i: &mut usize) -> Option<Color> {
        let group = &ps[*i];
        if group.len() >= 2 {
            match group[1] {
                5 => group.get(2).map(|&idx| Color::Palette(idx as u8)),
                2 => {
                    // An optional colorspace id may precede r, g, b.
                    if group.len() >= 5 {
                        let n = group.len();
                        Some(Color::Rgb(
                            group[n - 3] as u8,
                            group[n - 2] as u8,
                            group[n - 1] as u8,
                        ))
                    } else {
                        None
                    }
                }
                _ => None,
            }
        } else {
            let kind = ps.get(*i + 1).and_then(|g| g.first()).copied()?;
            match kind {
                5 => {
                    let idx = ps.get(*i + 2).and_then(|g| g.first()).copied()?;
                    *i += 2;
                    Some(Color::Palette(idx as u8))
                }
                2 => {
                    let r = ps.get(*i + 2).and_then(|g| g.first()).copied()?;
                    let g = ps.get(*i + 3).and_then(|g| g.first()).copied()?;
                    let b = ps.get(*i + 4).and_then(|g| g.first()).copied()?;
                    *i += 4;
                    Some(Color::Rgb(r as u8, g as u8, b as u8))
                }
                _ => None,
            }
        }
    }
}

impl Perform for Performer<'_> {
    fn print(&mut self, c: char) {
        self.grid.print(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            0x08 => self.grid.backspace(),
            0x09 => self.grid.tab(),
            0x0A..=0x0C => self.grid.linefeed(),
            0x0D => self.grid.carriage_return(),
            _ => {}
        }
    }

    fn csi_dispatch(
        &mut self,
        params: &Params,
        intermediates: &[u8],
        ignore: bool,
        action: char,
    ) {
        if ignore {
            return;
        }
        let ps: Vec<Vec<u16>> = params.iter().map(<[u16]>::to_vec).collect();
        match (action, intermediates) {
            ('A', []) => self.grid.move_rel(0, -(Self::arg(&ps, 0, 1) as isize)),
            ('B', []) | ('e', []) => {
                self.grid.move_rel(0, Self::arg(&ps, 0, 1) as isize);
            }
            ('C', []) | ('a', []) => {
                self.grid.move_rel(Self::arg(&ps, 0, 1) as isize, 0);
            }
            ('D', []) => self.grid.move_rel(-(Self::arg(&ps, 0, 1) as isize), 0),
            ('E', []) => {
                self.grid.move_rel(0, Self::arg(&ps, 0, 1) as isize);
                self.grid.carriage_return();
            }
            ('F', []) => {
                self.grid.move_rel(0, -(Self::arg(&ps, 0, 1) as isize));
                self.grid.carriage_return();
            }
            ('G', []) | ('`', []) => {
                self.grid.move_to_column(usize::from(Self::arg(&ps, 0, 1)) - 1);
            }
            ('H', []) | ('f', []) => {
                let row = usize::from(Self::arg(&ps, 0, 1)) - 1;
                let col = usize::from(Self::arg(&ps, 1, 1)) - 1;
                self.grid.move_to(col, row);
            }
            ('d', []) => {
                let x = self.grid.cursor().x;
                self.grid.move_to(x, usize::from(Self::arg(&ps, 0, 1)) - 1);
            }
            ('J', []) => self.grid.erase_display(Self::raw(&ps, 0) as u8, false),
            ('J', [b'?']) => self.grid.erase_display(Self::raw(&ps, 0) as u8, true),
            ('K', []) => self.grid.erase_line(Self::raw(&ps, 0) as u8, false),
            ('K', [b'?']) => self.grid.erase_line(Self::raw(&ps, 0) as u8, true),
            ('L', []) => self.grid.insert_lines(usize::from(Self::arg(&ps, 0, 1))),
            ('M', []) => self.grid.delete_lines(usize::from(Self::arg(&ps, 0, 1))),
            ('@', []) => self.grid.insert_chars(usize::from(Self::arg(&ps, 0, 1))),
            ('P', []) => self.grid.delete_chars(usize::from(Self::arg(&ps, 0, 1))),
            ('X', []) => self.grid.erase_chars(usize::from(Self::arg(&ps, 0, 1))),
            ('S', []) => self.grid.scroll_up(usize::from(Self::arg(&ps, 0, 1))),
            ('T', []) => self.grid.scroll_down(usize::from(Self::arg(&ps, 0, 1))),
            ('r', []) => {
                let rows = self.grid.rows() as u16;
                let top = usize::from(Self::arg(&ps, 0, 1)) - 1;
                let bot = usize::from(Self::arg(&ps, 1, rows)) - 1;
                self.grid.set_scroll_region(top, bot);
            }
            ('s', []) => self.grid.save_cursor(),
            ('u', []) => self.grid.restore_cursor(),
            ('h', [b'?']) => {
                for group in &ps {
                    if let Some(&mode) = group.first() {
                        self.grid.set_private_mode(mode, true);
                    }
                }
            }
            ('l', [b'?']) => {
                for group in &ps {
                    if let Some(&mode) = group.first() {
                        self.grid.set_private_mode(mode, false);
                    }
                }
            }
            ('m', []) => self.sgr(&ps),
            ('q', [b' ']) => self.grid.set_cursor_shape(Self::raw(&ps, 0) as u8),
            ('q', [b'"']) => {
                // DECSCA: 1 protects, 0 and 2 unprotect.
                self.grid.set_protected(Self::raw(&ps, 0) == 1);
            }
            _ => {}
        }
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], ignore: bool, byte: u8) {
        if ignore || !intermediates.is_empty() {
            // Charset designation and other intermediated escapes.
            return;
        }
        match byte {
            b'7' => self.grid.save_cursor(),
            b'8' => self.grid.restore_cursor(),
            b'D' => self.grid.linefeed(),
            b'E' => {
                self.grid.carriage_return();
                self.grid.linefeed();
            }
            b'M' => self.grid.reverse_index(),
            b'c' => self.grid.reset(),
            _ => {}
        }
    }

    fn osc_dispatch(&mut self, params: &[&[u8]], _bell_terminated: bool) {
        match params.first().copied() {
            Some(b"0" | b"2") => {
                if let Some(title) = params.get(1) {
                    self.grid
                        .set_title(String::from_utf8_lossy(title).into_owned());
                }
            }
            Some(b"8") => {
                // OSC 8 ; params ; URI - an empty URI ends the hyperlink.
                let uri = params.get(2).copied().unwrap_or(b"");
                self.grid.set_hyperlink(!uri.is_empty());
            }
            _ => {}
        }
    }
}
