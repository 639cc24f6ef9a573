//! # Ostinato - Temporal Pattern Mini-Notation
//!
//! Ostinato parses the mini-notation used by live coders to describe
//! cyclic rhythmic structures, and compiles it into pure, rational-time
//! patterns that can be sampled over any window.
//!
//! ## Quick start
//!
//! ```rust
//! use ostinato::{parse_pattern, State};
//!
//! let pat = parse_pattern::<String>("bd ~ sn ~").unwrap();
//! let events = pat.query(&State::cycle(0));
//! assert_eq!(events.len(), 2);
//! assert_eq!(events[0].value, "bd");
//! ```
//!
//! Patterns are typed by their leaf value. The same grammar reads drum
//! names, numbers, exact ratios, pitches with chord suffixes, booleans or
//! colours, depending on the requested type:
//!
//! ```rust
//! use ostinato::{pattern, Note, State};
//!
//! let chord = pattern::<Note>("c'maj");
//! let notes: Vec<f64> = chord
//!     .query(&State::cycle(0))
//!     .iter()
//!     .map(|hap| hap.value.0)
//!     .collect();
//! assert_eq!(notes, vec![0.0, 4.0, 7.0]);
//! ```
//!
//! ## Mini-notation summary
//!
//! - **`bd sn hh`** - sequence: the steps share one cycle
//! - **`~`** - rest
//! - **`bd*2`**, **`bd/2`** - speed up / slow down a step
//! - **`[bd sn]`** - grouping: the group takes a single step
//! - **`[bd, sn]`** - stack: layers play simultaneously
//! - **`[bd|sn]`** - choose one layer per cycle
//! - **`<bd sn cp>`** - alternate: one step per cycle
//! - **`{a b, c d e}`** - polyrhythm; **`{...}%4`** sets the step rate
//! - **`bd(3,8)`** - Euclidean rhythm, optionally `bd(3,8,1)` rotated
//! - **`bd?`**, **`bd?0.3`** - probabilistically drop a step
//! - **`bd@3`**, **`bd _ _`** - elongate; **`bd!3`**, **`bd ! !`** - repeat
//! - **`a . b c . d`** - feet: dots split a sequence into equal groups
//! - **`0 .. 3`** - inclusive enumeration
//! - **`c'maj'i`** - chord expansion with voicing modifiers
//! - **`^name`** - read a named control channel
//!
//! Events report exact rational spans: a `whole` (logical extent) and a
//! `part` (the visible slice), plus the source locations they originate
//! from, so editors can highlight the text behind each sound.

pub mod bjorklund;
pub mod mini_notation;
pub mod pattern;
pub mod tonal;

pub use mini_notation::{
    parse_pattern, parse_tpat, pattern, Enumerable, ParseError, Parseable, TPat,
};
pub use pattern::{frac, rand, Fraction, Hap, Loc, Pattern, State, TimeSpan};
pub use tonal::{Colour, Modifier, Note};
