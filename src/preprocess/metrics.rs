//! Glyph widths of the PDF base-14 fonts used by the renderer, and folding of
//! arbitrary text into the range those fonts can show.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontFace {
    Regular,
    Bold,
    Oblique,
    Mono,
}

/// Helvetica advance widths for ASCII 32..=126, in 1/1000 em.
#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

/// Helvetica-Bold advance widths for ASCII 32..=126, in 1/1000 em.
#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

const COURIER: u16 = 600;

fn glyph_width(face: FontFace, c: char) -> u16 {
    let idx = (c as usize).wrapping_sub(32);
    match face {
        FontFace::Mono => COURIER,
        FontFace::Bold => HELVETICA_BOLD.get(idx).copied().unwrap_or(556),
        FontFace::Regular | FontFace::Oblique => HELVETICA.get(idx).copied().unwrap_or(556),
    }
}

/// Width of `text` set in `face` at `size_pt`, in points.
pub fn text_width(text: &str, face: FontFace, size_pt: f32) -> f32 {
    let units: u32 = text.chars().map(|c| u32::from(glyph_width(face, c))).sum();
    units as f32 * size_pt / 1000.0
}

/// Map text onto printable ASCII. Typographic punctuation gets its ASCII
/// look-alike, accented letters lose their marks, anything else becomes `?`.
pub fn fold_to_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\n' || (' '..='~').contains(&c) {
            out.push(c);
            continue;
        }
        let mapped = match c {
            '\t' => " ",
            '\u{2018}' | '\u{2019}' | '\u{201a}' | '\u{201b}' | '\u{2032}' => "'",
            '\u{201c}' | '\u{201d}' | '\u{201e}' | '\u{201f}' | '\u{2033}' | '\u{ab}' | '\u{bb}' => "\"",
            '\u{2010}'..='\u{2015}' | '\u{2212}' => "-",
            '\u{2026}' => "...",
            '\u{2022}' | '\u{00b7}' => "*",
            '\u{a0}' | '\u{2000}'..='\u{200a}' | '\u{202f}' | '\u{205f}' | '\u{3000}' => " ",
            '\u{200b}'..='\u{200d}' | '\u{feff}' | '\u{ad}' => "",
            '\u{d7}' => "x",
            '\u{2192}' => "->",
            '\u{2190}' => "<-",
            '\u{a9}' => "(c)",
            '\u{ae}' => "(R)",
            '\u{2122}' => "TM",
            '\u{20ac}' => "EUR",
            '\u{df}' => "ss",
            '\u{e6}' => "ae",
            '\u{c6}' => "AE",
            '\u{153}' => "oe",
            '\u{152}' => "OE",
            '\u{f8}' => "o",
            '\u{d8}' => "O",
            '\u{142}' => "l",
            '\u{141}' => "L",
            '\u{111}' => "d",
            '\u{110}' => "D",
            c if c.is_control() => "",
            _ => {
                let before = out.len();
                out.extend(
                    c.nfkd()
                        .filter(|d| !is_combining_mark(*d))
                        .filter(|d| (' '..='~').contains(d)),
                );
                if out.len() == before {
                    out.push('?');
                }
                continue;
            }
        };
        out.push_str(mapped);
    }
    out
}
