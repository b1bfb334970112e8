//! Keyboard event translation: browser key events to PTY byte sequences.
//!
//! Clients forward raw `KeyboardEvent` data; the server owns the
//! translation because it knows the pane's terminal modes (application
//! cursor keys change how arrows are encoded). Encodings follow xterm:
//! CSI sequences with the standard modifier parameter, SS3 variants in
//! application mode, and C0 controls for Ctrl chords.

// Rust guideline compliant 2026-03

use crate::protocol::{KeyState, Modifiers};

/// Translate one key event into the bytes to write to the PTY.
///
/// Returns `None` for key releases, bare modifier keys, and events that
/// have no terminal encoding.
#[must_use]
pub fn encode_key(
    key: &str,
    state: KeyState,
    modifiers: Modifiers,
    app_cursor: bool,
) -> Option<Vec<u8>> {
    if state == KeyState::Up {
        return None;
    }
    match key {
        "Shift" | "Control" | "Alt" | "Meta" | "CapsLock" | "NumLock" | "Dead" => None,
        "Enter" => Some(with_alt_prefix(modifiers, vec![b'\r'])),
        "Tab" => {
            if modifiers.shift {
                Some(b"\x1b[Z".to_vec())
            } else {
                Some(vec![b'\t'])
            }
        }
        "Backspace" => {
            let byte = if modifiers.ctrl { 0x08 } else { 0x7f };
            Some(with_alt_prefix(modifiers, vec![byte]))
        }
        "Escape" => Some(vec![0x1b]),
        "ArrowUp" => Some(cursor_key(b'A', modifiers, app_cursor)),
        "ArrowDown" => Some(cursor_key(b'B', modifiers, app_cursor)),
        "ArrowRight" => Some(cursor_key(b'C', modifiers, app_cursor)),
        "ArrowLeft" => Some(cursor_key(b'D', modifiers, app_cursor)),
        "Home" => Some(cursor_key(b'H', modifiers, app_cursor)),
        "End" => Some(cursor_key(b'F', modifiers, app_cursor)),
        "Insert" => Some(tilde_key(2, modifiers)),
        "Delete" => Some(tilde_key(3, modifiers)),
        "PageUp" => Some(tilde_key(5, modifiers)),
        "PageDown" => Some(tilde_key(6, modifiers)),
        "F1" => Some(function_key_low(b'P', modifiers)),
        "F2" => Some(function_key_low(b'Q', modifiers)),
        "F3" => Some(function_key_low(b'R', modifiers)),
        "F4" => Some(function_key_low(b'S', modifiers)),
        "F5" => Some(tilde_key(15, modifiers)),
        "F6" => Some(tilde_key(17, modifiers)),
        "F7" => Some(tilde_key(18, modifiers)),
        "F8" => Some(tilde_key(19, modifiers)),
        "F9" => Some(tilde_key(20, modifiers)),
        "F10" => Some(tilde_key(21, modifiers)),
        "F11" => Some(tilde_key(23, modifiers)),
        "F12" => Some(tilde_key(24, modifiers)),
        _ => {
            let mut chars = key.chars();
            let ch = chars.next()?;
            if chars.next().is_some() {
                // Multi-character named key we do not encode.
                return None;
            }
            Some(character_key(ch, modifiers))
        }
    }
}

/// Encode a printable character, applying Ctrl and Alt chords.
fn character_key(ch: char, modifiers: Modifiers) -> Vec<u8> {
    if modifiers.ctrl {
        if let Some(byte) = control_byte(ch) {
            return with_alt_prefix(modifiers, vec![byte]);
        }
    }
    let mut buf = [0u8; 4];
    let bytes = ch.encode_utf8(&mut buf).as_bytes().to_vec();
    with_alt_prefix(modifiers, bytes)
}

/// C0 control byte for a Ctrl chord, per the ASCII `& 0x1f` convention.
fn control_byte(ch: char) -> Option<u8> {
    match ch {
        'a'..='z' => Some(ch as u8 & 0x1f),
        'A'..='Z' => Some(ch.to_ascii_lowercase() as u8 & 0x1f),
        '@' | ' ' => Some(0x00),
        '[' => Some(0x1b),
        '\\' => Some(0x1c),
        ']' => Some(0x1d),
        '^' => Some(0x1e),
        '_' | '/' => Some(0x1f),
        '?' => Some(0x7f),
        _ => None,
    }
}

/// Alt prefixes the sequence with ESC.
fn with_alt_prefix(modifiers: Modifiers, mut bytes: Vec<u8>) -> Vec<u8> {
    if modifiers.alt {
        bytes.insert(0, 0x1b);
    }
    bytes
}

/// Arrow/Home/End final byte, CSI or SS3 depending on mode, with the
/// xterm modifier parameter when any modifier is held.
fn cursor_key(final_byte: u8, modifiers: Modifiers, app_cursor: bool) -> Vec<u8> {
    if modifiers.any() {
        format!("\x1b[1;{}{}", modifiers.xterm_code(), final_byte as char).into_bytes()
    } else if app_cursor {
        vec![0x1b, b'O', final_byte]
    } else {
        vec![0x1b, b'[', final_byte]
    }
}

/// `CSI n ~` editing/function keys.
fn tilde_key(n: u8, modifiers: Modifiers) -> Vec<u8> {
    if modifiers.any() {
        format!("\x1b[{};{}~", n, modifiers.xterm_code()).into_bytes()
    } else {
        format!("\x1b[{n}~").into_bytes()
    }
}

/// F1-F4 use SS3 finals without modifiers, CSI 1;m finals with.
fn function_key_low(final_byte: u8, modifiers: Modifiers) -> Vec<u8> {
    if modifiers.any() {
        format!("\x1b[1;{}{}", modifiers.xterm_code(), final_byte as char).into_bytes()
    } else {
        vec![0x1b, b'O', final_byte]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mods(ctrl: bool, alt: bool, shift: bool) -> Modifiers {
        Modifiers {
            ctrl,
            alt,
            shift,
            meta: false,
        }
    }

    fn down(key: &str, modifiers: Modifiers, app_cursor: bool) -> Option<Vec<u8>> {
        encode_key(key, KeyState::Down, modifiers, app_cursor)
    }

    #[test]
    fn key_up_produces_nothing() {
        assert_eq!(
            encode_key("a", KeyState::Up, Modifiers::default(), false),
            None
        );
    }

    #[test]
    fn plain_character() {
        assert_eq!(down("a", Modifiers::default(), false), Some(b"a".to_vec()));
        assert_eq!(
            down("é", Modifiers::default(), false),
            Some("é".as_bytes().to_vec())
        );
    }

    #[test]
    fn ctrl_chords() {
        assert_eq!(down("c", mods(true, false, false), false), Some(vec![0x03]));
        assert_eq!(down("a", mods(true, false, false), false), Some(vec![0x01]));
        assert_eq!(down("[", mods(true, false, false), false), Some(vec![0x1b]));
    }

    #[test]
    fn alt_prefixes_escape() {
        assert_eq!(
            down("b", mods(false, true, false), false),
            Some(vec![0x1b, b'b'])
        );
        assert_eq!(
            down("c", mods(true, true, false), false),
            Some(vec![0x1b, 0x03])
        );
    }

    #[test]
    fn arrows_follow_cursor_mode() {
        assert_eq!(
            down("ArrowUp", Modifiers::default(), false),
            Some(b"\x1b[A".to_vec())
        );
        assert_eq!(
            down("ArrowUp", Modifiers::default(), true),
            Some(b"\x1bOA".to_vec())
        );
    }

    #[test]
    fn modified_arrow_uses_csi_parameter() {
        // Ctrl+Right = CSI 1;5C regardless of application mode.
        assert_eq!(
            down("ArrowRight", mods(true, false, false), true),
            Some(b"\x1b[1;5C".to_vec())
        );
        assert_eq!(
            down("ArrowLeft", mods(false, false, true), false),
            Some(b"\x1b[1;2D".to_vec())
        );
    }

    #[test]
    fn named_editing_keys() {
        assert_eq!(
            down("Delete", Modifiers::default(), false),
            Some(b"\x1b[3~".to_vec())
        );
        assert_eq!(
            down("PageUp", Modifiers::default(), false),
            Some(b"\x1b[5~".to_vec())
        );
        assert_eq!(
            down("PageUp", mods(false, false, true), false),
            Some(b"\x1b[5;2~".to_vec())
        );
    }

    #[test]
    fn enter_tab_backspace_escape() {
        assert_eq!(
            down("Enter", Modifiers::default(), false),
            Some(vec![b'\r'])
        );
        assert_eq!(down("Tab", Modifiers::default(), false), Some(vec![b'\t']));
        assert_eq!(
            down("Tab", mods(false, false, true), false),
            Some(b"\x1b[Z".to_vec())
        );
        assert_eq!(
            down("Backspace", Modifiers::default(), false),
            Some(vec![0x7f])
        );
        assert_eq!(
            down("Escape", Modifiers::default(), false),
            Some(vec![0x1b])
        );
    }

    #[test]
    fn function_keys() {
        assert_eq!(
            down("F1", Modifiers::default(), false),
            Some(b"\x1bOP".to_vec())
        );
        assert_eq!(
            down("F1", mods(false, false, true), false),
            Some(b"\x1b[1;2P".to_vec())
        );
        assert_eq!(
            down("F5", Modifiers::default(), false),
            Some(b"\x1b[15~".to_vec())
        );
        assert_eq!(
            down("F12", Modifiers::default(), false),
            Some(b"\x1b[24~".to_vec())
        );
    }

    #[test]
    fn bare_modifiers_are_swallowed() {
        for key in ["Shift", "Control", "Alt", "Meta"] {
            assert_eq!(down(key, Modifiers::default(), false), None);
        }
    }

    #[test]
    fn unknown_named_keys_are_swallowed() {
        assert_eq!(down("MediaPlayPause", Modifiers::default(), false), None);
    }
}
