//! Controller button mask
//!
//! Bit layout follows the emulated device's HID key word, so a mask can be
//! handed to the hardware layer unchanged.

use bitflags::bitflags;

bitflags! {
    /// Pressed-button mask (1 = pressed)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Buttons: u32 {
        /// Face button A
        const A = 1 << 0;
        /// Face button B
        const B = 1 << 1;
        /// Face button X
        const X = 1 << 2;
        /// Face button Y
        const Y = 1 << 3;
        /// Left stick click
        const LSTICK = 1 << 4;
        /// Right stick click
        const RSTICK = 1 << 5;
        /// Left shoulder
        const L = 1 << 6;
        /// Right shoulder
        const R = 1 << 7;
        /// Left trigger
        const ZL = 1 << 8;
        /// Right trigger
        const ZR = 1 << 9;
        /// Plus / start
        const PLUS = 1 << 10;
        /// Minus / select
        const MINUS = 1 << 11;
        /// D-pad left
        const DLEFT = 1 << 12;
        /// D-pad up
        const DUP = 1 << 13;
        /// D-pad right
        const DRIGHT = 1 << 14;
        /// D-pad down
        const DDOWN = 1 << 15;
    }
}

/// Script names for each button, in bit order
const KEY_NAMES: [(&str, Buttons); 16] = [
    ("A", Buttons::A),
    ("B", Buttons::B),
    ("X", Buttons::X),
    ("Y", Buttons::Y),
    ("LSTICK", Buttons::LSTICK),
    ("RSTICK", Buttons::RSTICK),
    ("L", Buttons::L),
    ("R", Buttons::R),
    ("ZL", Buttons::ZL),
    ("ZR", Buttons::ZR),
    ("PLUS", Buttons::PLUS),
    ("MINUS", Buttons::MINUS),
    ("DLEFT", Buttons::DLEFT),
    ("DUP", Buttons::DUP),
    ("DRIGHT", Buttons::DRIGHT),
    ("DDOWN", Buttons::DDOWN),
];

impl Buttons {
    /// Look up a single script key name.
    ///
    /// Accepts both `KEY_A` and `A`, case-insensitively.
    pub fn from_key_name(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        let bare = upper.strip_prefix("KEY_").unwrap_or(&upper);
        KEY_NAMES
            .iter()
            .find(|(key, _)| *key == bare)
            .map(|(_, button)| *button)
    }

    /// Script key names (`KEY_*`) of every pressed button, in bit order
    pub fn key_names(&self) -> Vec<String> {
        KEY_NAMES
            .iter()
            .filter(|(_, button)| self.contains(*button))
            .map(|(key, _)| format!("KEY_{key}"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_name_lookup() {
        assert_eq!(Buttons::from_key_name("KEY_A"), Some(Buttons::A));
        assert_eq!(Buttons::from_key_name("a"), Some(Buttons::A));
        assert_eq!(Buttons::from_key_name("key_dleft"), Some(Buttons::DLEFT));
        assert_eq!(Buttons::from_key_name("KEY_HOME"), None);
    }

    #[test]
    fn test_key_names_bit_order() {
        let mask = Buttons::ZR | Buttons::A | Buttons::DDOWN;
        assert_eq!(mask.key_names(), vec!["KEY_A", "KEY_ZR", "KEY_DDOWN"]);
        assert!(Buttons::empty().key_names().is_empty());
    }
}
