//! Selector colours.
//!
//! Each group has a base colour; the ten selectors of a group are that base
//! scaled from 0.8 to 1.16 in steps of 0.04. Purely cosmetic.
use std::fmt;

use serde::{Serialize, Serializer};

use crate::{SelectorId, GROUP_COUNT, SELECTORS_PER_GROUP};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const fn from_hex(hex: u32) -> Self {
        Rgb((hex >> 16) as u8, (hex >> 8) as u8, hex as u8)
    }

    /// Multiplies every channel by `factor`, flooring and capping at 255
    pub fn scale(self, factor: f64) -> Self {
        let channel = |c: u8| (c as f64 * factor).floor().clamp(0.0, 255.0) as u8;
        Rgb(channel(self.0), channel(self.1), channel(self.2))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Base colour of a group plus its hover/active accents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GroupPalette {
    pub base: Rgb,
    pub hover: Rgb,
    pub active: Rgb,
}

const fn group(base: u32, hover: u32, active: u32) -> GroupPalette {
    GroupPalette {
        base: Rgb::from_hex(base),
        hover: Rgb::from_hex(hover),
        active: Rgb::from_hex(active),
    }
}

pub const GROUP_PALETTES: [GroupPalette; GROUP_COUNT] = [
    group(0xff4444, 0xff6666, 0xff2222), // red
    group(0x4444ff, 0x6666ff, 0x2222ff), // blue
    group(0x44ff44, 0x66ff66, 0x22ff22), // green
    group(0xffaa44, 0xffbb66, 0xff9922), // orange
    group(0xaa44ff, 0xbb66ff, 0x9922ff), // violet
    group(0x44ffaa, 0x66ffbb, 0x22ff99), // cyan
    group(0xff44aa, 0xff66bb, 0xff2299), // pink
    group(0xaaff44, 0xbbff66, 0x99ff22), // lime
    group(0x4444aa, 0x6666bb, 0x222299), // dark blue
    group(0xaa4444, 0xbb6666, 0x992222), // dark red
];

/// Palette of group `group_index`; wraps around past the last group.
pub fn group_palette(group_index: usize) -> GroupPalette {
    GROUP_PALETTES[group_index % GROUP_COUNT]
}

/// Colour variant for a position inside a group
pub fn variant(group_index: usize, position: usize) -> Rgb {
    let position = position % SELECTORS_PER_GROUP;
    group_palette(group_index)
        .base
        .scale(0.8 + position as f64 * 0.04)
}

pub fn selector_color(id: SelectorId) -> Rgb {
    variant(id.group_index(), id.position_in_group())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_as_hex() {
        assert_eq!(Rgb::from_hex(0xff4444).to_string(), "#ff4444");
        assert_eq!(Rgb(0, 10, 255).to_string(), "#000aff");
    }

    #[test]
    fn scaling_floors_and_caps() {
        assert_eq!(Rgb(255, 68, 68).scale(0.8), Rgb(204, 54, 54));
        assert_eq!(Rgb(255, 68, 68).scale(1.16), Rgb(255, 78, 78));
    }

    #[test]
    fn first_selector_is_darkened_red() {
        let id = SelectorId::new(1).unwrap();
        assert_eq!(selector_color(id).to_string(), "#cc3636");
    }

    #[test]
    fn colour_is_deterministic() {
        for id in SelectorId::all() {
            assert_eq!(selector_color(id), selector_color(id));
        }
    }

    #[test]
    fn groups_differ_at_every_position() {
        for position in 0..SELECTORS_PER_GROUP {
            for a in 0..GROUP_COUNT {
                for b in (a + 1)..GROUP_COUNT {
                    assert_ne!(variant(a, position), variant(b, position));
                }
            }
        }
    }

    #[test]
    fn variants_brighten_within_a_group() {
        let shades: Vec<Rgb> = (0..SELECTORS_PER_GROUP)
            .map(|position| variant(1, position))
            .collect();
        assert_eq!(shades.len(), SELECTORS_PER_GROUP);
        assert!(shades.windows(2).all(|pair| pair[0].2 <= pair[1].2));
    }
}
