//! Terminal styling and color utilities.
//!
//! ANSI escape code definitions plus color detection that honours the
//! `NO_COLOR` and `TERM=dumb` conventions.

use everoute_lib::{ActivityLevel, SecurityClass};

/// ANSI escape codes for text styling and colors.
pub mod colors {
    /// Reset all styling.
    pub const RESET: &str = "\x1b[0m";
    /// Bright bold white for system names.
    pub const WHITE_BOLD: &str = "\x1b[1;97m";
    /// Gray for secondary elements.
    pub const GRAY: &str = "\x1b[90m";
    /// Cyan for wormhole jumps.
    pub const CYAN: &str = "\x1b[36m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    /// Orange (256-color).
    pub const ORANGE: &str = "\x1b[38;5;208m";
    pub const RED: &str = "\x1b[31m";
}

/// Resolved color codes, either ANSI sequences or empty strings when color
/// is disabled.
#[derive(Debug, Clone, Copy)]
pub struct ColorPalette {
    pub reset: &'static str,
    pub white_bold: &'static str,
    pub gray: &'static str,
    pub cyan: &'static str,
    pub green: &'static str,
    pub yellow: &'static str,
    pub orange: &'static str,
    pub red: &'static str,
}

impl ColorPalette {
    #[must_use]
    pub const fn colored() -> Self {
        Self {
            reset: colors::RESET,
            white_bold: colors::WHITE_BOLD,
            gray: colors::GRAY,
            cyan: colors::CYAN,
            green: colors::GREEN,
            yellow: colors::YELLOW,
            orange: colors::ORANGE,
            red: colors::RED,
        }
    }

    #[must_use]
    pub const fn plain() -> Self {
        Self {
            reset: "",
            white_bold: "",
            gray: "",
            cyan: "",
            green: "",
            yellow: "",
            orange: "",
            red: "",
        }
    }

    /// Palette matching the terminal's capabilities.
    #[must_use]
    pub fn detect() -> Self {
        if supports_color() {
            Self::colored()
        } else {
            Self::plain()
        }
    }

    /// Color for a security band; unknown status is gray.
    pub fn security(&self, class: Option<SecurityClass>) -> &'static str {
        match class {
            Some(SecurityClass::High) => self.green,
            Some(SecurityClass::Low) => self.yellow,
            Some(SecurityClass::Null) => self.red,
            None => self.gray,
        }
    }

    pub fn activity(&self, level: ActivityLevel) -> &'static str {
        match level {
            ActivityLevel::Quiet => self.green,
            ActivityLevel::Active => self.orange,
            ActivityLevel::Hot => self.red,
            ActivityLevel::Unknown => self.gray,
        }
    }
}

impl Default for ColorPalette {
    fn default() -> Self {
        Self::detect()
    }
}

/// Check if the terminal supports ANSI color codes.
///
/// Respects `NO_COLOR` (https://no-color.org/) and `TERM=dumb`.
#[must_use]
pub fn supports_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if let Ok(term) = std::env::var("TERM") {
        if term.eq_ignore_ascii_case("dumb") {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_palette_has_no_escape_codes() {
        let p = ColorPalette::plain();
        assert!(p.reset.is_empty());
        assert!(p.security(Some(SecurityClass::Null)).is_empty());
        assert!(p.activity(ActivityLevel::Hot).is_empty());
    }

    #[test]
    fn colored_palette_maps_danger_to_red() {
        let p = ColorPalette::colored();
        assert_eq!(p.security(Some(SecurityClass::Null)), colors::RED);
        assert_eq!(p.activity(ActivityLevel::Hot), colors::RED);
        assert_eq!(p.activity(ActivityLevel::Quiet), colors::GREEN);
        assert_eq!(p.security(None), colors::GRAY);
    }
}
