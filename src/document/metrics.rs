//! Base-14 font selection, glyph widths and WinAnsi encoding.
//!
//! Widths are in 1/1000 em, taken from the standard Adobe font metrics for
//! the printable ASCII range. Characters above 0x7E use a per-font average,
//! which is close enough for line filling.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    Sans,
    Serif,
    Mono,
}

/// The fonts a generated document may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Font {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    HelveticaBoldOblique,
    TimesRoman,
    TimesBold,
    TimesItalic,
    TimesBoldItalic,
    Courier,
    CourierBold,
    Symbol,
}

impl Font {
    pub const ALL: [Font; 11] = [
        Font::Helvetica,
        Font::HelveticaBold,
        Font::HelveticaOblique,
        Font::HelveticaBoldOblique,
        Font::TimesRoman,
        Font::TimesBold,
        Font::TimesItalic,
        Font::TimesBoldItalic,
        Font::Courier,
        Font::CourierBold,
        Font::Symbol,
    ];

    pub fn styled(family: Family, bold: bool, italic: bool) -> Font {
        match (family, bold, italic) {
            (Family::Sans, false, false) => Font::Helvetica,
            (Family::Sans, true, false) => Font::HelveticaBold,
            (Family::Sans, false, true) => Font::HelveticaOblique,
            (Family::Sans, true, true) => Font::HelveticaBoldOblique,
            (Family::Serif, false, false) => Font::TimesRoman,
            (Family::Serif, true, false) => Font::TimesBold,
            (Family::Serif, false, true) => Font::TimesItalic,
            (Family::Serif, true, true) => Font::TimesBoldItalic,
            (Family::Mono, false, _) => Font::Courier,
            (Family::Mono, true, _) => Font::CourierBold,
        }
    }

    /// Symbol uses its built-in encoding; every other font is WinAnsi.
    pub fn is_symbolic(self) -> bool {
        self == Font::Symbol
    }

    /// Advance width of one encoded byte, in 1/1000 em.
    pub fn glyph_width(self, byte: u8) -> u16 {
        match self {
            Font::Courier | Font::CourierBold => 600,
            Font::Symbol => {
                if byte == b' ' {
                    250
                } else {
                    600
                }
            }
            Font::Helvetica | Font::HelveticaOblique => table_width(&HELVETICA, byte, 556),
            Font::HelveticaBold | Font::HelveticaBoldOblique => {
                table_width(&HELVETICA_BOLD, byte, 611)
            }
            Font::TimesRoman | Font::TimesItalic => table_width(&TIMES_ROMAN, byte, 500),
            Font::TimesBold | Font::TimesBoldItalic => {
                (u32::from(table_width(&TIMES_ROMAN, byte, 500)) * 105 / 100) as u16
            }
        }
    }

    /// Width of encoded `bytes` at `size` points.
    pub fn text_width(self, bytes: &[u8], size: f32) -> f32 {
        let units: u32 = bytes.iter().map(|b| u32::from(self.glyph_width(*b))).sum();
        units as f32 * size / 1000.0
    }
}

fn table_width(table: &[u16; 95], byte: u8, fallback: u16) -> u16 {
    match byte {
        32..=126 => table[usize::from(byte - 32)],
        0xA0 => table[0],
        _ => fallback,
    }
}

/// Encode `text` as WinAnsi bytes; anything outside the repertoire becomes `?`.
pub fn encode_winansi(text: &str) -> Vec<u8> {
    text.chars().map(winansi_byte).collect()
}

pub fn winansi_byte(c: char) -> u8 {
    match c {
        '\t' => b' ',
        ' '..='~' => c as u8,
        '\u{A0}'..='\u{FF}' => c as u32 as u8,
        _ => WINANSI_HIGH
            .iter()
            .find(|(_, ch)| *ch == c)
            .map_or(b'?', |(b, _)| *b),
    }
}

/// Unicode text for encoded `bytes` in `font`. PDFium re-encodes it against
/// the font's own encoding when the text object is created.
pub fn decode(font: Font, bytes: &[u8]) -> String {
    if font.is_symbolic() {
        bytes.iter().map(|b| symbol_char(*b)).collect()
    } else {
        bytes.iter().map(|b| winansi_char(*b)).collect()
    }
}

fn winansi_char(byte: u8) -> char {
    match byte {
        0x20..=0x7E | 0xA0..=0xFF => char::from(byte),
        _ => WINANSI_HIGH
            .iter()
            .find(|(b, _)| *b == byte)
            .map_or('?', |(_, c)| *c),
    }
}

/// WinAnsi code points in 0x80..=0x9F.
const WINANSI_HIGH: [(u8, char); 27] = [
    (0x80, '€'),
    (0x82, '‚'),
    (0x83, 'ƒ'),
    (0x84, '„'),
    (0x85, '…'),
    (0x86, '†'),
    (0x87, '‡'),
    (0x88, 'ˆ'),
    (0x89, '‰'),
    (0x8A, 'Š'),
    (0x8B, '‹'),
    (0x8C, 'Œ'),
    (0x8E, 'Ž'),
    (0x91, '‘'),
    (0x92, '’'),
    (0x93, '“'),
    (0x94, '”'),
    (0x95, '•'),
    (0x96, '–'),
    (0x97, '—'),
    (0x98, '˜'),
    (0x99, '™'),
    (0x9A, 'š'),
    (0x9B, '›'),
    (0x9C, 'œ'),
    (0x9E, 'ž'),
    (0x9F, 'Ÿ'),
];

/// Adobe Symbol encoding, restricted to the glyphs math typesetting emits.
fn symbol_char(byte: u8) -> char {
    match byte {
        b'A' => 'Α',
        b'B' => 'Β',
        b'C' => 'Χ',
        b'D' => 'Δ',
        b'E' => 'Ε',
        b'F' => 'Φ',
        b'G' => 'Γ',
        b'H' => 'Η',
        b'I' => 'Ι',
        b'J' => 'ϑ',
        b'K' => 'Κ',
        b'L' => 'Λ',
        b'M' => 'Μ',
        b'N' => 'Ν',
        b'O' => 'Ο',
        b'P' => 'Π',
        b'Q' => 'Θ',
        b'R' => 'Ρ',
        b'S' => 'Σ',
        b'T' => 'Τ',
        b'U' => 'Υ',
        b'V' => 'ς',
        b'W' => 'Ω',
        b'X' => 'Ξ',
        b'Y' => 'Ψ',
        b'Z' => 'Ζ',
        b'a' => 'α',
        b'b' => 'β',
        b'c' => 'χ',
        b'd' => 'δ',
        b'e' => 'ε',
        b'f' => 'φ',
        b'g' => 'γ',
        b'h' => 'η',
        b'i' => 'ι',
        b'j' => 'ϕ',
        b'k' => 'κ',
        b'l' => 'λ',
        b'm' => 'μ',
        b'n' => 'ν',
        b'o' => 'ο',
        b'p' => 'π',
        b'q' => 'θ',
        b'r' => 'ρ',
        b's' => 'σ',
        b't' => 'τ',
        b'u' => 'υ',
        b'v' => 'ϖ',
        b'w' => 'ω',
        b'x' => 'ξ',
        b'y' => 'ψ',
        b'z' => 'ζ',
        0x22 => '∀',
        0x24 => '∃',
        0x2D => '−',
        0x40 => '≅',
        0x5E => '⊥',
        0x7E => '∼',
        0xA1 => 'ϒ',
        0xA2 => '′',
        0xA3 => '≤',
        0xA5 => '∞',
        0xAB => '↔',
        0xAC => '←',
        0xAD => '↑',
        0xAE => '→',
        0xAF => '↓',
        0xB0 => '°',
        0xB1 => '±',
        0xB3 => '≥',
        0xB4 => '×',
        0xB5 => '∝',
        0xB6 => '∂',
        0xB7 => '•',
        0xB8 => '÷',
        0xB9 => '≠',
        0xBA => '≡',
        0xBB => '≈',
        0xBC => '…',
        0xC0 => 'ℵ',
        0xC1 => 'ℑ',
        0xC2 => 'ℜ',
        0xC4 => '⊗',
        0xC5 => '⊕',
        0xC6 => '∅',
        0xC7 => '∩',
        0xC8 => '∪',
        0xC9 => '⊃',
        0xCA => '⊇',
        0xCC => '⊂',
        0xCD => '⊆',
        0xCE => '∈',
        0xCF => '∉',
        0xD0 => '∠',
        0xD1 => '∇',
        0xD5 => '∏',
        0xD6 => '√',
        0xD7 => '⋅',
        0xD8 => '¬',
        0xD9 => '∧',
        0xDA => '∨',
        0xDB => '⇔',
        0xDC => '⇐',
        0xDE => '⇒',
        0xE1 => '〈',
        0xE5 => '∑',
        0xF1 => '〉',
        0xF2 => '∫',
        0x20..=0x7E => char::from(byte),
        _ => '?',
    }
}

#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

#[rustfmt::skip]
const TIMES_ROMAN: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444,
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722,
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500,
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500,
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];
