//! Note, chord and colour value domain.
//!
//! Chord names resolve through a fixed interval table; unknown names fall
//! back to the bare root so a typo degrades gracefully instead of failing
//! the whole pattern. Chord modifiers transform the resolved interval list
//! before it is spread into simultaneous events.

use std::collections::HashMap;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::mini_notation::Parseable;
use crate::pattern::Pattern;

/// A pitch in semitones relative to c5 (which is 0). Fractional values are
/// legal and mean detuning.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Note(pub f64);

/// An RGB colour resolved from a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Colour {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Colour {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Look a colour up by name.
    pub fn named(name: &str) -> Option<Colour> {
        NAMED_COLOURS.get(name).copied()
    }
}

/// A transformation of a chord's interval list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modifier {
    /// Extend (or truncate) to the first `n` notes of the chord repeated
    /// up through the octaves.
    Range(i64),
    /// Drop the `n`-th voice from the top down an octave, moving it to the
    /// bottom.
    Drop(i64),
    /// Move the lowest note up an octave.
    Invert,
    /// Open voicing: spread the lower voices down an octave.
    Open,
}

/// Upper bound on the interval list a `Range` modifier may request.
const RANGE_CAP: i64 = 128;

lazy_static! {
    static ref CHORD_TABLE: HashMap<&'static str, Vec<i64>> = {
        let mut m = HashMap::new();
        // Triads
        m.insert("major", vec![0, 4, 7]);
        m.insert("maj", vec![0, 4, 7]);
        m.insert("M", vec![0, 4, 7]);
        m.insert("minor", vec![0, 3, 7]);
        m.insert("min", vec![0, 3, 7]);
        m.insert("m", vec![0, 3, 7]);
        m.insert("aug", vec![0, 4, 8]);
        m.insert("plus", vec![0, 4, 8]);
        m.insert("diminished", vec![0, 3, 6]);
        m.insert("dim", vec![0, 3, 6]);
        m.insert("one", vec![0]);
        m.insert("1", vec![0]);
        m.insert("five", vec![0, 7]);
        m.insert("5", vec![0, 7]);
        // Suspensions
        m.insert("sus2", vec![0, 2, 7]);
        m.insert("sus4", vec![0, 5, 7]);
        m.insert("sevenSus2", vec![0, 2, 7, 10]);
        m.insert("7sus2", vec![0, 2, 7, 10]);
        m.insert("sevenSus4", vec![0, 5, 7, 10]);
        m.insert("7sus4", vec![0, 5, 7, 10]);
        m.insert("nineSus4", vec![0, 5, 7, 10, 14]);
        m.insert("9sus4", vec![0, 5, 7, 10, 14]);
        // Sixths
        m.insert("six", vec![0, 4, 7, 9]);
        m.insert("6", vec![0, 4, 7, 9]);
        m.insert("minorSix", vec![0, 3, 7, 9]);
        m.insert("m6", vec![0, 3, 7, 9]);
        // Sevenths
        m.insert("major7", vec![0, 4, 7, 11]);
        m.insert("maj7", vec![0, 4, 7, 11]);
        m.insert("dom7", vec![0, 4, 7, 10]);
        m.insert("7", vec![0, 4, 7, 10]);
        m.insert("minor7", vec![0, 3, 7, 10]);
        m.insert("min7", vec![0, 3, 7, 10]);
        m.insert("m7", vec![0, 3, 7, 10]);
        m.insert("diminished7", vec![0, 3, 6, 9]);
        m.insert("dim7", vec![0, 3, 6, 9]);
        m.insert("m7b5", vec![0, 3, 6, 10]);
        m.insert("sevenFlat5", vec![0, 4, 6, 10]);
        m.insert("7f5", vec![0, 4, 6, 10]);
        m.insert("sevenSharp5", vec![0, 4, 8, 10]);
        m.insert("7s5", vec![0, 4, 8, 10]);
        m.insert("sevenFlat9", vec![0, 4, 7, 10, 13]);
        m.insert("7f9", vec![0, 4, 7, 10, 13]);
        // Extended
        m.insert("major9", vec![0, 4, 7, 11, 14]);
        m.insert("maj9", vec![0, 4, 7, 11, 14]);
        m.insert("dom9", vec![0, 4, 7, 10, 14]);
        m.insert("9", vec![0, 4, 7, 10, 14]);
        m.insert("minor9", vec![0, 3, 7, 10, 14]);
        m.insert("m9", vec![0, 3, 7, 10, 14]);
        m.insert("add9", vec![0, 4, 7, 14]);
        m.insert("eleven", vec![0, 4, 7, 10, 14, 17]);
        m.insert("11", vec![0, 4, 7, 10, 14, 17]);
        m.insert("m11", vec![0, 3, 7, 10, 14, 17]);
        m.insert("add11", vec![0, 4, 7, 17]);
        m.insert("thirteen", vec![0, 4, 7, 10, 14, 17, 21]);
        m.insert("13", vec![0, 4, 7, 10, 14, 17, 21]);
        m.insert("m13", vec![0, 3, 7, 10, 14, 17, 21]);
        m
    };

    static ref NAMED_COLOURS: HashMap<&'static str, Colour> = {
        let mut m = HashMap::new();
        m.insert("black", Colour::new(0, 0, 0));
        m.insert("white", Colour::new(255, 255, 255));
        m.insert("red", Colour::new(255, 0, 0));
        m.insert("green", Colour::new(0, 128, 0));
        m.insert("lime", Colour::new(0, 255, 0));
        m.insert("blue", Colour::new(0, 0, 255));
        m.insert("yellow", Colour::new(255, 255, 0));
        m.insert("cyan", Colour::new(0, 255, 255));
        m.insert("aqua", Colour::new(0, 255, 255));
        m.insert("magenta", Colour::new(255, 0, 255));
        m.insert("fuchsia", Colour::new(255, 0, 255));
        m.insert("orange", Colour::new(255, 165, 0));
        m.insert("purple", Colour::new(128, 0, 128));
        m.insert("violet", Colour::new(238, 130, 238));
        m.insert("indigo", Colour::new(75, 0, 130));
        m.insert("pink", Colour::new(255, 192, 203));
        m.insert("brown", Colour::new(165, 42, 42));
        m.insert("grey", Colour::new(128, 128, 128));
        m.insert("gray", Colour::new(128, 128, 128));
        m.insert("silver", Colour::new(192, 192, 192));
        m.insert("gold", Colour::new(255, 215, 0));
        m.insert("navy", Colour::new(0, 0, 128));
        m.insert("teal", Colour::new(0, 128, 128));
        m.insert("olive", Colour::new(128, 128, 0));
        m.insert("maroon", Colour::new(128, 0, 0));
        m.insert("coral", Colour::new(255, 127, 80));
        m.insert("salmon", Colour::new(250, 128, 114));
        m.insert("khaki", Colour::new(240, 230, 140));
        m.insert("crimson", Colour::new(220, 20, 60));
        m.insert("ivory", Colour::new(255, 255, 240));
        m
    };
}

/// Intervals for a chord name, falling back to the bare root when unknown.
pub fn chord_intervals(name: &str) -> Vec<f64> {
    match CHORD_TABLE.get(name) {
        Some(intervals) => intervals.iter().map(|&i| i as f64).collect(),
        None => {
            warn!(chord = name, "unknown chord name, using root only");
            vec![0.0]
        }
    }
}

/// Apply one modifier to an interval list.
pub fn apply_modifier(modifier: &Modifier, notes: Vec<f64>) -> Vec<f64> {
    match modifier {
        Modifier::Range(n) => {
            if notes.is_empty() {
                return notes;
            }
            let want = (*n).clamp(0, RANGE_CAP) as usize;
            let mut out = Vec::with_capacity(want);
            let mut octave = 0.0;
            while out.len() < want {
                for d in &notes {
                    if out.len() == want {
                        break;
                    }
                    out.push(d + octave);
                }
                octave += 12.0;
            }
            out
        }
        Modifier::Invert => {
            if notes.is_empty() {
                return notes;
            }
            let mut out = notes[1..].to_vec();
            out.push(notes[0] + 12.0);
            out
        }
        Modifier::Open => {
            if notes.len() > 2 {
                let mut out = vec![notes[0] - 12.0, notes[2] - 12.0, notes[1]];
                out.extend_from_slice(&notes[3..]);
                out
            } else {
                notes
            }
        }
        Modifier::Drop(n) => {
            let len = notes.len() as i64;
            if *n < 1 || len < *n {
                return notes;
            }
            let s = (len - n) as usize;
            let mut out = vec![notes[s] - 12.0];
            out.extend_from_slice(&notes[..s]);
            out.extend_from_slice(&notes[s + 1..]);
            out
        }
    }
}

/// Resolve a chord name against a root and fold the modifiers through the
/// interval list, left to right.
pub fn expand_chord(root: f64, name: &str, mods: &[Modifier]) -> Vec<f64> {
    let mut notes: Vec<f64> = chord_intervals(name).iter().map(|d| d + root).collect();
    for m in mods {
        notes = apply_modifier(m, notes);
    }
    notes
}

/// Compile a chord: the root, name and modifier-group patterns are bound
/// jointly, each binding expands to an interval list, and the list-valued
/// events are then split into simultaneous scalars with their source
/// contexts distributed positionally.
pub fn chord_to_pattern<T: Parseable>(
    root: Pattern<T>,
    name: Pattern<String>,
    mods: Vec<Pattern<Vec<Modifier>>>,
) -> Pattern<T> {
    let base = root.app_both_with(name, |r, n| (r.clone(), n.clone()));
    let bound = mods.into_iter().fold(
        base.fmap(|(r, n)| (r, n, Vec::new())),
        |acc, group| {
            acc.app_both_with(group, |(r, n, ms), extra| {
                let mut ms: Vec<Modifier> = ms.clone();
                ms.extend(extra.iter().copied());
                (r.clone(), n.clone(), ms)
            })
        },
    );
    bound
        .fmap(|(r, n, ms)| match r.as_chord_root() {
            Some(base) => expand_chord(base, &n, &ms)
                .into_iter()
                .filter_map(T::from_chord_interval)
                .collect::<Vec<T>>(),
            None => Vec::new(),
        })
        .uncollect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lookup_known_and_unknown() {
        assert_eq!(chord_intervals("maj"), vec![0.0, 4.0, 7.0]);
        assert_eq!(chord_intervals("m7"), vec![0.0, 3.0, 7.0, 10.0]);
        assert_eq!(chord_intervals("nosuchchord"), vec![0.0]);
    }

    #[test]
    fn invert_rotates_the_bass_up() {
        let maj = vec![0.0, 4.0, 7.0];
        assert_eq!(apply_modifier(&Modifier::Invert, maj), vec![4.0, 7.0, 12.0]);
        assert_eq!(apply_modifier(&Modifier::Invert, vec![]), Vec::<f64>::new());
    }

    #[test]
    fn open_spreads_voices() {
        let maj = vec![0.0, 4.0, 7.0];
        assert_eq!(apply_modifier(&Modifier::Open, maj), vec![-12.0, -5.0, 4.0]);
        // too small to open
        assert_eq!(
            apply_modifier(&Modifier::Open, vec![0.0, 7.0]),
            vec![0.0, 7.0]
        );
    }

    #[test]
    fn drop_lowers_an_upper_voice() {
        let maj7 = vec![0.0, 4.0, 7.0, 11.0];
        // drop the second voice from the top
        assert_eq!(
            apply_modifier(&Modifier::Drop(2), maj7.clone()),
            vec![-5.0, 0.0, 4.0, 11.0]
        );
        // out-of-range drops leave the chord alone
        assert_eq!(apply_modifier(&Modifier::Drop(9), maj7.clone()), maj7);
        assert_eq!(apply_modifier(&Modifier::Drop(0), maj7.clone()), maj7);
    }

    #[test]
    fn range_walks_the_octaves() {
        let maj = vec![0.0, 4.0, 7.0];
        assert_eq!(
            apply_modifier(&Modifier::Range(5), maj.clone()),
            vec![0.0, 4.0, 7.0, 12.0, 16.0]
        );
        assert_eq!(apply_modifier(&Modifier::Range(2), maj), vec![0.0, 4.0]);
    }

    #[test]
    fn range_is_capped() {
        let out = apply_modifier(&Modifier::Range(1_000_000), vec![0.0]);
        assert_eq!(out.len(), RANGE_CAP as usize);
    }

    #[test]
    fn expansion_offsets_and_folds() {
        assert_eq!(expand_chord(2.0, "maj", &[]), vec![2.0, 6.0, 9.0]);
        assert_eq!(
            expand_chord(0.0, "maj", &[Modifier::Invert, Modifier::Invert]),
            vec![7.0, 12.0, 16.0]
        );
    }

    #[test]
    fn colours_resolve() {
        assert_eq!(Colour::named("red"), Some(Colour::new(255, 0, 0)));
        assert_eq!(Colour::named("mauve"), None);
    }
}
