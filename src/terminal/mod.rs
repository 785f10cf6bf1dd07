//! Terminal capability detection: inline-image protocol and cell-width
//! math (§6, §9).
//!
//! The engine has no GUI surface of its own; the renderer (out of scope
//! here) needs two facts from this module before it can decide how to
//! paint artwork: which inline-image escape dialect the host terminal
//! understands, and how many terminal cells a string of text occupies.
//! Neither depends on a real TTY, so both are unit-testable from fixed
//! environment snapshots instead of the live process environment.

use std::collections::HashMap;

use unicode_width::UnicodeWidthStr;

/// Inline-image escape dialects a terminal might support, in the order
/// §6 lists them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageProtocol {
    /// iTerm2's OSC 1337 `File=` escape.
    Iterm2,
    /// Kitty's graphics protocol (APC `_G`).
    Kitty,
    /// Sixel (DEC private escape, widely supported by modern emulators).
    Sixel,
    /// No inline-image support detected; render as a placeholder glyph.
    None,
}

/// Detect which [`ImageProtocol`] the current terminal supports.
///
/// `OUROBOROS_IMAGE_PROTOCOL` overrides detection outright (`iterm2`,
/// `kitty`, `sixel`, or `none`, case-insensitive) for testing and for
/// terminals that misreport their own capabilities. Otherwise detection
/// inspects `TERM_PROGRAM`, `TERM`, and `KITTY_WINDOW_ID` in that order.
pub fn detect_protocol() -> ImageProtocol {
    detect_protocol_from(&std::env::vars().collect())
}

/// Testable core of [`detect_protocol`], operating on a supplied
/// environment snapshot instead of the real process environment.
pub fn detect_protocol_from(env: &HashMap<String, String>) -> ImageProtocol {
    if let Some(forced) = env.get("OUROBOROS_IMAGE_PROTOCOL") {
        return match forced.to_lowercase().as_str() {
            "iterm2" => ImageProtocol::Iterm2,
            "kitty" => ImageProtocol::Kitty,
            "sixel" => ImageProtocol::Sixel,
            _ => ImageProtocol::None,
        };
    }

    if env.contains_key("KITTY_WINDOW_ID") {
        return ImageProtocol::Kitty;
    }

    if let Some(program) = env.get("TERM_PROGRAM") {
        match program.as_str() {
            "iTerm.app" | "WezTerm" => return ImageProtocol::Iterm2,
            _ => {}
        }
    }

    if let Some(term) = env.get("TERM") {
        let term = term.to_lowercase();
        if term.contains("kitty") {
            return ImageProtocol::Kitty;
        }
        if term.contains("sixel") || term.contains("mlterm") {
            return ImageProtocol::Sixel;
        }
    }

    ImageProtocol::None
}

/// Number of terminal cells `text` occupies, accounting for
/// double-width CJK characters and zero-width combining marks. This is
/// the wcwidth-equivalent boundary §9 calls for: the renderer lays out
/// fixed-width columns against this, never `str::len` or `chars().count()`.
pub fn display_width(text: &str) -> usize {
    UnicodeWidthStr::width(text)
}

/// Truncate `text` to at most `max_cells` terminal cells, never
/// splitting a multi-byte or double-width character. Returns the
/// original string unchanged if it already fits.
pub fn truncate_to_width(text: &str, max_cells: usize) -> String {
    if display_width(text) <= max_cells {
        return text.to_string();
    }

    let mut result = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = UnicodeWidthStr::width(ch.encode_utf8(&mut [0; 4]) as &str);
        if used + w > max_cells {
            break;
        }
        result.push(ch);
        used += w;
    }
    result
}
