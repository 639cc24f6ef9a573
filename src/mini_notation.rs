//! Mini-notation parser and compiler.
//!
//! Parses strings like `"bd [sn sn, hh*4] . cp(3,8)"` into a typed
//! [`TPat`] tree and compiles the tree into a [`Pattern`]. The leaf type is
//! chosen by the caller: `parse_pattern::<String>` reads vocables,
//! `parse_pattern::<Note>` reads pitches with chord suffixes, and so on
//! through every type implementing [`Parseable`].
//!
//! The parser is a backtracking recursive descent over a character cursor.
//! Alternatives are tried by saving and restoring the cursor, the deepest
//! failure position is kept for error reporting, and a counter in the
//! cursor hands out deterministic seeds to `?` and `|` constructs as they
//! are consumed.

use std::fmt;

use num_traits::{One, Zero};
use tracing::debug;

use crate::pattern::{frac, rand, Fraction, Hap, Loc, Pattern};
use crate::tonal::{Colour, Modifier, Note};

/// Typed pattern syntax tree, polymorphic in the leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum TPat<T> {
    Atom {
        loc: Option<Loc>,
        value: T,
    },
    Fast(Box<TPat<Fraction>>, Box<TPat<T>>),
    Slow(Box<TPat<Fraction>>, Box<TPat<T>>),
    DegradeBy {
        seed: i64,
        amount: f64,
        inner: Box<TPat<T>>,
    },
    CycleChoose {
        seed: i64,
        choices: Vec<TPat<T>>,
    },
    Euclid {
        pulses: Box<TPat<i64>>,
        steps: Box<TPat<i64>>,
        rotation: Box<TPat<i64>>,
        inner: Box<TPat<T>>,
    },
    Stack(Vec<TPat<T>>),
    Polyrhythm {
        steprate: Option<Box<TPat<Fraction>>>,
        children: Vec<TPat<T>>,
    },
    Seq(Vec<TPat<T>>),
    Silence,
    /// In-sequence `.` marker; eliminated by foot resolution before a
    /// sequence leaves the parser.
    Foot,
    Elongate {
        ratio: Fraction,
        inner: Box<TPat<T>>,
    },
    Repeat {
        count: i64,
        inner: Box<TPat<T>>,
    },
    EnumFromTo(Box<TPat<T>>, Box<TPat<T>>),
    Var(String),
    Chord {
        root: Box<TPat<T>>,
        name: Box<TPat<String>>,
        mods: Vec<TPat<Vec<Modifier>>>,
    },
}

impl<T: Parseable + Enumerable> TPat<T> {
    /// Fold the tree into a queryable pattern.
    pub fn to_pattern(&self) -> Pattern<T> {
        match self {
            TPat::Atom {
                loc: Some(loc),
                value,
            } => Pattern::pure(value.clone()).with_context(*loc),
            TPat::Atom { loc: None, value } => Pattern::pure(value.clone()),
            TPat::Fast(rate, inner) => inner.to_pattern().fast_pat(rate.to_pattern()),
            TPat::Slow(rate, inner) => inner.to_pattern().slow_pat(rate.to_pattern()),
            TPat::DegradeBy {
                seed,
                amount,
                inner,
            } => inner
                .to_pattern()
                .degrade_by_using(rand().rotl(frac(*seed, 10000)), *amount),
            TPat::CycleChoose { seed, choices } => {
                let pats: Vec<Pattern<T>> = choices.iter().map(|c| c.to_pattern()).collect();
                Pattern::choose_by(rand().rotl(frac(*seed, 10000)), pats)
                    .segment(Fraction::one())
                    .join()
            }
            TPat::Euclid {
                pulses,
                steps,
                rotation,
                inner,
            } => T::euclid(
                pulses.to_pattern(),
                steps.to_pattern(),
                rotation.to_pattern(),
                inner.to_pattern(),
            ),
            TPat::Stack(children) => {
                Pattern::stack(children.iter().map(|c| c.to_pattern()).collect())
            }
            TPat::Polyrhythm { steprate, children } => {
                let resolved: Vec<(Fraction, Pattern<T>)> =
                    children.iter().map(resolve_seq).collect();
                let base = resolved
                    .first()
                    .map(|(size, _)| *size)
                    .unwrap_or_else(Fraction::zero);
                let rate: Pattern<Fraction> = match steprate {
                    Some(tp) => tp.to_pattern(),
                    None => Pattern::pure(base),
                };
                Pattern::stack(
                    resolved
                        .into_iter()
                        .map(|(size, pat)| {
                            if size.is_zero() {
                                pat
                            } else {
                                pat.fast_pat(rate.clone().fmap(move |r| r / size))
                            }
                        })
                        .collect(),
                )
            }
            TPat::Seq(_) => resolve_seq(self).1,
            TPat::Silence => Pattern::silence(),
            TPat::Foot => unreachable!("foot markers are eliminated when a sequence is parsed"),
            // Only meaningful as sequence steps; bare occurrences are silent.
            TPat::Elongate { .. } | TPat::Repeat { .. } => Pattern::silence(),
            TPat::EnumFromTo(a, b) => a
                .to_pattern()
                .app_both_with(b.to_pattern(), |x, y| {
                    Pattern::fast_from_list(T::from_to(x, y))
                })
                .join(),
            TPat::Var(name) => T::control(name),
            TPat::Chord { root, name, mods } => crate::tonal::chord_to_pattern(
                root.to_pattern(),
                name.to_pattern(),
                mods.iter().map(|m| m.to_pattern()).collect(),
            ),
        }
    }
}

/// A sequence step's share of the cycle: elongation widens one slot,
/// repetition emits several unit slots, anything else takes one.
fn step_weights<T: Clone>(step: &TPat<T>) -> Vec<(Fraction, TPat<T>)> {
    match step {
        TPat::Elongate { ratio, inner } => vec![(*ratio, (**inner).clone())],
        TPat::Repeat { count, inner } => (0..*count)
            .map(|_| (Fraction::one(), (**inner).clone()))
            .collect(),
        other => vec![(Fraction::one(), other.clone())],
    }
}

/// Resolve a sequence node to its total step count and compiled pattern.
/// Non-sequence nodes count as a single step.
fn resolve_seq<T: Parseable + Enumerable>(t: &TPat<T>) -> (Fraction, Pattern<T>) {
    match t {
        TPat::Seq(steps) => {
            let weighted: Vec<(Fraction, Pattern<T>)> = steps
                .iter()
                .flat_map(step_weights)
                .map(|(w, tp)| (w, tp.to_pattern()))
                .collect();
            let total = weighted
                .iter()
                .map(|(w, _)| *w)
                .fold(Fraction::zero(), |a, b| a + b);
            (total, Pattern::timecat(weighted))
        }
        other => (Fraction::one(), other.to_pattern()),
    }
}

/// Split a step list at its feet. With no feet the list is returned flat;
/// otherwise each group becomes a sub-sequence occupying one step.
fn resolve_feet<T>(steps: Vec<TPat<T>>) -> Vec<TPat<T>> {
    if !steps.iter().any(|s| matches!(s, TPat::Foot)) {
        return steps;
    }
    let mut groups: Vec<Vec<TPat<T>>> = Vec::new();
    let mut current = Vec::new();
    for step in steps {
        if matches!(step, TPat::Foot) {
            groups.push(std::mem::take(&mut current));
        } else {
            current.push(step);
        }
    }
    groups.push(current);
    groups.into_iter().map(TPat::Seq).collect()
}

// ============= Errors =============

/// A parse failure: the deepest position reached together with what was
/// found there and what would have been accepted. Displays as the
/// offending line with a caret under the failing column.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub line: u32,
    pub column: u32,
    pub unexpected: Option<String>,
    pub expected: Vec<String>,
    pub input: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line_text = self
            .input
            .lines()
            .nth((self.line as usize).saturating_sub(1))
            .unwrap_or("");
        writeln!(f, "{}", line_text)?;
        writeln!(f, "{}^", " ".repeat((self.column as usize).saturating_sub(1)))?;
        write!(f, "(line {}, column {})", self.line, self.column)?;
        if let Some(u) = &self.unexpected {
            write!(f, "\nunexpected {}", u)?;
        }
        if !self.expected.is_empty() {
            write!(f, "\nexpecting {}", join_alternatives(&self.expected))?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

fn join_alternatives(items: &[String]) -> String {
    match items.len() {
        0 => String::new(),
        1 => items[0].clone(),
        n => format!("{} or {}", items[..n - 1].join(", "), items[n - 1]),
    }
}

// ============= Parser cursor =============

pub type PResult<T> = Result<T, ()>;

/// Character cursor with position tracking, deepest-failure bookkeeping
/// and the seed counter for `?` / `|` constructs.
pub struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    seed: i64,
    err_pos: usize,
    err_line: u32,
    err_col: u32,
    expected: Vec<String>,
}

#[derive(Clone, Copy)]
struct Mark {
    pos: usize,
    line: u32,
    col: u32,
    seed: i64,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            seed: 0,
            err_pos: 0,
            err_line: 1,
            err_col: 1,
            expected: Vec::new(),
        }
    }

    fn mark(&self) -> Mark {
        Mark {
            pos: self.pos,
            line: self.line,
            col: self.col,
            seed: self.seed,
        }
    }

    /// Backtrack to a saved position. The seed counter rolls back too, so
    /// only constructs that survive into the final tree consume seeds.
    fn reset(&mut self, mark: Mark) {
        self.pos = mark.pos;
        self.line = mark.line;
        self.col = mark.col;
        self.seed = mark.seed;
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    /// (column, line) of the cursor, 1-based.
    fn position(&self) -> (u32, u32) {
        (self.col, self.line)
    }

    /// Record a failure. The deepest failure position wins; expectations
    /// recorded at the same position accumulate.
    fn fail<T>(&mut self, expected: &str) -> PResult<T> {
        if self.pos > self.err_pos {
            self.err_pos = self.pos;
            self.err_line = self.line;
            self.err_col = self.col;
            self.expected.clear();
        }
        if self.pos == self.err_pos && !self.expected.iter().any(|e| e == expected) {
            self.expected.push(expected.to_string());
        }
        Err(())
    }

    fn eat(&mut self, c: char) -> PResult<()> {
        if self.peek() == Some(c) {
            self.bump();
            Ok(())
        } else {
            self.fail(&format!("'{}'", c))
        }
    }

    fn skip_spaces(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t' | '\n' | '\r')) {
            self.bump();
        }
    }

    fn digits(&mut self) -> PResult<String> {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if s.is_empty() {
            self.fail("digit")
        } else {
            Ok(s)
        }
    }

    fn natural(&mut self) -> PResult<i64> {
        let digits = self.digits()?;
        match digits.parse::<i64>() {
            Ok(n) => Ok(n),
            Err(_) => self.fail("smaller number"),
        }
    }

    fn new_seed(&mut self) -> i64 {
        let seed = self.seed;
        self.seed += 1;
        seed
    }

    fn into_error(self) -> ParseError {
        let unexpected = if self.err_pos >= self.chars.len() {
            Some("end of input".to_string())
        } else {
            Some(format!("'{}'", self.chars[self.err_pos]))
        };
        ParseError {
            line: self.err_line,
            column: self.err_col,
            unexpected,
            expected: self.expected,
            input: self.input.to_string(),
        }
    }
}

// ============= Grammar =============

fn p_sequence<T: Parseable>(p: &mut Parser) -> PResult<TPat<T>> {
    p.skip_spaces();
    let mut steps: Vec<TPat<T>> = Vec::new();
    loop {
        // A lone dot at step position is a foot marker.
        if p.peek() == Some('.') {
            p.bump();
            p.skip_spaces();
            steps.push(TPat::Foot);
            continue;
        }
        let start = p.mark();
        let part = match p_part::<T>(p) {
            Ok(part) => part,
            Err(()) => {
                p.reset(start);
                break;
            }
        };
        p.skip_spaces();
        if p.peek() == Some('.') && p.peek_at(1) == Some('.') {
            p.bump();
            p.bump();
            p.skip_spaces();
            let end = p_part::<T>(p)?;
            p.skip_spaces();
            steps.push(TPat::EnumFromTo(Box::new(part), Box::new(end)));
            continue;
        }
        if matches!(p.peek(), Some('@' | '_')) {
            let ratio = p_elongation(p)?;
            steps.push(TPat::Elongate {
                ratio,
                inner: Box::new(part),
            });
            continue;
        }
        if p.peek() == Some('!') {
            let count = p_repetition(p)?;
            steps.push(TPat::Repeat {
                count,
                inner: Box::new(part),
            });
            continue;
        }
        steps.push(part);
    }
    let seq = TPat::Seq(resolve_feet(steps));
    p_rand_opt(p, seq)
}

/// One or more `@`/`_` marks after a step. A bare mark adds one step of
/// weight, `@n` makes that mark worth `n`.
fn p_elongation(p: &mut Parser) -> PResult<Fraction> {
    let mut total = Fraction::one();
    while matches!(p.peek(), Some('@' | '_')) {
        p.bump();
        let start = p.mark();
        match p_ratio(p) {
            Ok(r) => total += r - Fraction::one(),
            Err(()) => {
                p.reset(start);
                total += Fraction::one();
            }
        }
        p.skip_spaces();
    }
    Ok(total)
}

/// One or more `!` marks after a step. A bare mark adds one copy, `!n`
/// makes the step total `n` copies.
fn p_repetition(p: &mut Parser) -> PResult<i64> {
    let mut total: i64 = 1;
    while p.peek() == Some('!') {
        p.bump();
        let start = p.mark();
        match p.natural() {
            Ok(n) => total += n - 1,
            Err(()) => {
                p.reset(start);
                total += 1;
            }
        }
        p.skip_spaces();
    }
    Ok(total)
}

fn p_part<T: Parseable>(p: &mut Parser) -> PResult<TPat<T>> {
    let base = match p.peek() {
        Some('[') => p_poly_in::<T>(p)?,
        Some('{') => p_poly_braces::<T>(p)?,
        Some('<') => p_poly_angles::<T>(p)?,
        Some('^') => p_var::<T>(p)?,
        Some('~') => {
            p.bump();
            p.skip_spaces();
            let rest = p_rand_opt(p, TPat::Silence)?;
            p.skip_spaces();
            p_mult_opt(p, rest)?
        }
        _ => {
            let leaf = T::parse_leaf(p)?;
            p.skip_spaces();
            let leaf = p_rand_opt(p, leaf)?;
            p.skip_spaces();
            p_mult_opt(p, leaf)?
        }
    };
    p.skip_spaces();
    let base = p_rand_opt(p, base)?;
    p.skip_spaces();
    let base = p_euclid_opt(p, base)?;
    p.skip_spaces();
    p_rand_opt(p, base)
}

fn p_rand_opt<T: Parseable>(p: &mut Parser, thing: TPat<T>) -> PResult<TPat<T>> {
    if p.peek() == Some('?') {
        p.bump();
        let amount = p_float_opt(p).unwrap_or(0.5);
        p.skip_spaces();
        let seed = p.new_seed();
        Ok(TPat::DegradeBy {
            seed,
            amount,
            inner: Box::new(thing),
        })
    } else {
        Ok(thing)
    }
}

fn p_euclid_opt<T: Parseable>(p: &mut Parser, thing: TPat<T>) -> PResult<TPat<T>> {
    if p.peek() != Some('(') {
        return Ok(thing);
    }
    p.bump();
    let pulses = p_sequence::<i64>(p)?;
    p.eat(',')?;
    let steps = p_sequence::<i64>(p)?;
    let rotation = if p.peek() == Some(',') {
        p.bump();
        p_sequence::<i64>(p)?
    } else {
        TPat::Atom {
            loc: None,
            value: 0,
        }
    };
    p.eat(')')?;
    p.skip_spaces();
    Ok(TPat::Euclid {
        pulses: Box::new(pulses),
        steps: Box::new(steps),
        rotation: Box::new(rotation),
        inner: Box::new(thing),
    })
}

fn p_var<T: Parseable>(p: &mut Parser) -> PResult<TPat<T>> {
    p.eat('^')?;
    let mut name = String::new();
    while let Some(c) = p.peek() {
        if c.is_ascii_alphanumeric() || matches!(c, ':' | '.' | '-' | '_') {
            name.push(c);
            p.bump();
        } else {
            break;
        }
    }
    if name.is_empty() {
        return p.fail("control name");
    }
    Ok(TPat::Var(name))
}

fn p_poly_in<T: Parseable>(p: &mut Parser) -> PResult<TPat<T>> {
    p.eat('[')?;
    let first = p_sequence::<T>(p)?;
    let node = match p.peek() {
        Some(',') => {
            let mut seqs = vec![first];
            while p.peek() == Some(',') {
                p.bump();
                seqs.push(p_sequence::<T>(p)?);
            }
            TPat::Stack(seqs)
        }
        Some('|') => {
            let mut seqs = vec![first];
            while p.peek() == Some('|') {
                p.bump();
                seqs.push(p_sequence::<T>(p)?);
            }
            let seed = p.new_seed();
            TPat::CycleChoose {
                seed,
                choices: seqs,
            }
        }
        _ => first,
    };
    p.eat(']')?;
    p.skip_spaces();
    p_mult_opt(p, node)
}

fn p_poly_braces<T: Parseable>(p: &mut Parser) -> PResult<TPat<T>> {
    p.eat('{')?;
    let mut seqs = vec![p_sequence::<T>(p)?];
    while p.peek() == Some(',') {
        p.bump();
        seqs.push(p_sequence::<T>(p)?);
    }
    p.eat('}')?;
    p.skip_spaces();
    let steprate = if p.peek() == Some('%') {
        p.bump();
        let r = p_ratio(p)?;
        p.skip_spaces();
        Some(Box::new(TPat::Atom {
            loc: None,
            value: r,
        }))
    } else {
        None
    };
    p_mult_opt(
        p,
        TPat::Polyrhythm {
            steprate,
            children: seqs,
        },
    )
}

fn p_poly_angles<T: Parseable>(p: &mut Parser) -> PResult<TPat<T>> {
    p.eat('<')?;
    let mut seqs = vec![p_sequence::<T>(p)?];
    while p.peek() == Some(',') {
        p.bump();
        seqs.push(p_sequence::<T>(p)?);
    }
    p.eat('>')?;
    p.skip_spaces();
    p_mult_opt(
        p,
        TPat::Polyrhythm {
            steprate: Some(Box::new(TPat::Atom {
                loc: None,
                value: Fraction::one(),
            })),
            children: seqs,
        },
    )
}

fn p_mult_opt<T: Parseable>(p: &mut Parser, thing: TPat<T>) -> PResult<TPat<T>> {
    match p.peek() {
        Some('*') => {
            p.bump();
            let rate = p_factor(p)?;
            Ok(TPat::Fast(Box::new(rate), Box::new(thing)))
        }
        Some('/') => {
            p.bump();
            let rate = p_factor(p)?;
            Ok(TPat::Slow(Box::new(rate), Box::new(thing)))
        }
        _ => Ok(thing),
    }
}

/// A speed factor: a single ratio, or a bracketed pattern of ratios.
fn p_factor(p: &mut Parser) -> PResult<TPat<Fraction>> {
    match p.peek() {
        Some('[') => p_poly_in::<Fraction>(p),
        Some('{') => p_poly_braces::<Fraction>(p),
        Some('<') => p_poly_angles::<Fraction>(p),
        _ => {
            let begin = p.position();
            let r = p_ratio(p)?;
            Ok(TPat::Atom {
                loc: Some((begin, p.position())),
                value: r,
            })
        }
    }
}

// ============= Lexer primitives =============

/// Duration letters multiply a ratio: `3e` is three eighths.
fn duration_letter(c: char) -> Option<Fraction> {
    Some(match c {
        'w' => frac(1, 1),
        'h' => frac(1, 2),
        'q' => frac(1, 4),
        'e' => frac(1, 8),
        's' => frac(1, 16),
        't' => frac(1, 3),
        'f' => frac(1, 5),
        'x' => frac(1, 6),
        _ => return None,
    })
}

fn p_ratio(p: &mut Parser) -> PResult<Fraction> {
    let neg = if p.peek() == Some('-') {
        p.bump();
        true
    } else {
        false
    };
    let int = p.natural()?;
    let mut value = if p.peek() == Some('%') {
        p.bump();
        let denom = p.natural()?;
        if denom == 0 {
            return p.fail("nonzero denominator");
        }
        frac(int, denom)
    } else if p.peek() == Some('.') && p.peek_at(1).map_or(false, |c| c.is_ascii_digit()) {
        p.bump();
        let fractional = p.digits()?;
        let denom = match 10_i64.checked_pow(fractional.len() as u32) {
            Some(d) => d,
            None => return p.fail("shorter decimal"),
        };
        let numer = match fractional.parse::<i64>() {
            Ok(n) => n,
            Err(_) => return p.fail("shorter decimal"),
        };
        Fraction::from_integer(int) + frac(numer, denom)
    } else {
        Fraction::from_integer(int)
    };
    while let Some(f) = p.peek().and_then(duration_letter) {
        p.bump();
        value *= f;
    }
    Ok(if neg { -value } else { value })
}

/// Unsigned decimal, returning `None` without consuming anything when the
/// input does not start with a digit.
fn p_float_opt(p: &mut Parser) -> Option<f64> {
    let start = p.mark();
    let mut s = match p.digits() {
        Ok(d) => d,
        Err(()) => {
            p.reset(start);
            return None;
        }
    };
    if p.peek() == Some('.') && p.peek_at(1).map_or(false, |c| c.is_ascii_digit()) {
        p.bump();
        s.push('.');
        if let Ok(d) = p.digits() {
            s.push_str(&d);
        }
    }
    s.parse().ok()
}

/// Decimal with optional fraction and exponent.
fn p_number_f64(p: &mut Parser) -> PResult<f64> {
    let mut s = p.digits()?;
    if p.peek() == Some('.') && p.peek_at(1).map_or(false, |c| c.is_ascii_digit()) {
        p.bump();
        s.push('.');
        if let Ok(d) = p.digits() {
            s.push_str(&d);
        }
    }
    let start = p.mark();
    if matches!(p.peek(), Some('e' | 'E')) {
        p.bump();
        let mut exp = String::new();
        if let Some(sign @ ('+' | '-')) = p.peek() {
            p.bump();
            exp.push(sign);
        }
        match p.digits() {
            Ok(d) => {
                s.push('e');
                s.push_str(&exp);
                s.push_str(&d);
            }
            Err(()) => p.reset(start),
        }
    }
    match s.parse() {
        Ok(v) => Ok(v),
        Err(_) => p.fail("number"),
    }
}

/// Note literal: letter `a`-`g`, then sharps/flats/naturals, then an
/// optional octave (default 5). The value is semitones relative to c5.
fn p_note_value(p: &mut Parser) -> PResult<f64> {
    let base = match p.peek() {
        Some('c') => 0,
        Some('d') => 2,
        Some('e') => 4,
        Some('f') => 5,
        Some('g') => 7,
        Some('a') => 9,
        Some('b') => 11,
        _ => return p.fail("note name"),
    };
    p.bump();
    let mut semis = base as f64;
    loop {
        match p.peek() {
            Some('s') => {
                semis += 1.0;
                p.bump();
            }
            Some('f') => {
                semis -= 1.0;
                p.bump();
            }
            Some('n') => {
                p.bump();
            }
            _ => break,
        }
    }
    let octave = if p.peek().map_or(false, |c| c.is_ascii_digit()) {
        p.natural()?
    } else {
        5
    };
    Ok(semis + ((octave - 5) * 12) as f64)
}

/// Numeric literal or note literal, with optional leading sign.
fn p_pitch_or_number(p: &mut Parser) -> PResult<f64> {
    let neg = if p.peek() == Some('-') {
        p.bump();
        true
    } else {
        false
    };
    let v = if p.peek().map_or(false, |c| c.is_ascii_digit()) {
        p_number_f64(p)?
    } else {
        p_note_value(p)?
    };
    Ok(if neg { -v } else { v })
}

/// Signed integer; fractional input is rejected rather than truncated.
fn p_integral(p: &mut Parser) -> PResult<i64> {
    let neg = if p.peek() == Some('-') {
        p.bump();
        true
    } else {
        false
    };
    let n = p.natural()?;
    if p.peek() == Some('.') && p.peek_at(1).map_or(false, |c| c.is_ascii_digit()) {
        return p.fail("integer");
    }
    Ok(if neg { -n } else { n })
}

/// Identifier of letters, digits, `:`, `.`, `-` and `_`, starting with a
/// letter or digit.
fn p_vocable(p: &mut Parser) -> PResult<String> {
    match p.peek() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return p.fail("vocable"),
    }
    let mut s = String::new();
    while let Some(c) = p.peek() {
        if c.is_ascii_alphanumeric() || matches!(c, ':' | '.' | '-' | '_') {
            s.push(c);
            p.bump();
        } else {
            break;
        }
    }
    Ok(s)
}

/// Chord suffix after a numeric atom: `'name`, then further `'mods`
/// groups.
fn p_chord_opt<T: Parseable>(p: &mut Parser, root: TPat<T>) -> PResult<TPat<T>> {
    if p.peek() != Some('\'') {
        return Ok(root);
    }
    p.bump();
    let begin = p.position();
    let name = p_vocable(p)?;
    let name_atom = TPat::Atom {
        loc: Some((begin, p.position())),
        value: name,
    };
    let mut mods: Vec<TPat<Vec<Modifier>>> = Vec::new();
    while p.peek() == Some('\'') {
        p.bump();
        mods.push(<Vec<Modifier> as Parseable>::parse_leaf(p)?);
    }
    Ok(TPat::Chord {
        root: Box::new(root),
        name: Box::new(name_atom),
        mods,
    })
}

/// One chord-modifier group: runs of `i` or `o`, `d` with a count, or a
/// bare integer selecting a range.
fn p_modifier_group(p: &mut Parser) -> PResult<Vec<Modifier>> {
    match p.peek() {
        Some('i') => {
            let mut out = Vec::new();
            while p.peek() == Some('i') {
                p.bump();
                out.push(Modifier::Invert);
            }
            Ok(out)
        }
        Some('o') => {
            let mut out = Vec::new();
            while p.peek() == Some('o') {
                p.bump();
                out.push(Modifier::Open);
            }
            Ok(out)
        }
        Some('d') => {
            p.bump();
            let n = p.natural()?;
            Ok(vec![Modifier::Drop(n)])
        }
        Some(c) if c.is_ascii_digit() => {
            let n = p.natural()?;
            Ok(vec![Modifier::Range(n)])
        }
        _ => p.fail("chord modifier"),
    }
}

// ============= Leaf-type dispatch =============

/// Types that can appear at the leaves of mini-notation. The impl decides
/// how a literal is lexed, which Euclidean flavour applies, and how the
/// type connects to named control channels and chord expansion.
pub trait Parseable: Clone + Send + Sync + PartialEq + fmt::Debug + 'static + Sized {
    /// Parse one literal of this type, with source position.
    fn parse_leaf(p: &mut Parser) -> PResult<TPat<Self>>;

    /// Euclidean rhythm flavour for this leaf type.
    fn euclid(
        pulses: Pattern<i64>,
        steps: Pattern<i64>,
        rotation: Pattern<i64>,
        inner: Pattern<Self>,
    ) -> Pattern<Self> {
        inner.euclid_with(pulses, steps, rotation)
    }

    /// Convert a control-channel value, if this type has channels.
    fn from_control_value(_value: f64) -> Option<Self> {
        None
    }

    /// The pattern of a named control channel; silence when the type has
    /// no channels.
    fn control(name: &str) -> Pattern<Self> {
        let name = name.to_string();
        Pattern::new(move |state| {
            match state
                .controls
                .get(&name)
                .and_then(|v| Self::from_control_value(*v))
            {
                Some(v) => vec![Hap::new(None, state.span, v)],
                None => Vec::new(),
            }
        })
    }

    /// Numeric view of the value for chord expansion.
    fn as_chord_root(&self) -> Option<f64> {
        None
    }

    /// Rebuild a value from a chord interval.
    fn from_chord_interval(_value: f64) -> Option<Self> {
        None
    }
}

/// Inclusive enumeration between leaf values, for the `..` construct.
/// Numeric types count up or down; others degenerate to the endpoints.
pub trait Enumerable: Sized + Clone {
    fn from_to(a: &Self, b: &Self) -> Vec<Self>;
    fn from_then_to(a: &Self, b: &Self, c: &Self) -> Vec<Self>;
}

impl Parseable for char {
    fn parse_leaf(p: &mut Parser) -> PResult<TPat<char>> {
        let begin = p.position();
        match p.peek() {
            Some(c) if c.is_ascii_alphanumeric() => {
                p.bump();
                Ok(TPat::Atom {
                    loc: Some((begin, p.position())),
                    value: c,
                })
            }
            _ => p.fail("letter or digit"),
        }
    }
}

impl Enumerable for char {
    fn from_to(a: &char, b: &char) -> Vec<char> {
        let (x, y) = (*a as u32, *b as u32);
        if x <= y {
            (x..=y).filter_map(char::from_u32).collect()
        } else {
            (y..=x).rev().filter_map(char::from_u32).collect()
        }
    }

    fn from_then_to(a: &char, b: &char, c: &char) -> Vec<char> {
        vec![*a, *b, *c]
    }
}

impl Parseable for String {
    fn parse_leaf(p: &mut Parser) -> PResult<TPat<String>> {
        let begin = p.position();
        let word = p_vocable(p)?;
        Ok(TPat::Atom {
            loc: Some((begin, p.position())),
            value: word,
        })
    }
}

impl Enumerable for String {
    fn from_to(a: &String, b: &String) -> Vec<String> {
        vec![a.clone(), b.clone()]
    }

    fn from_then_to(a: &String, b: &String, c: &String) -> Vec<String> {
        vec![a.clone(), b.clone(), c.clone()]
    }
}

impl Parseable for bool {
    fn parse_leaf(p: &mut Parser) -> PResult<TPat<bool>> {
        let begin = p.position();
        let value = match p.peek() {
            Some('t') | Some('1') => true,
            Some('f') | Some('0') => false,
            _ => return p.fail("boolean (t, f, 1 or 0)"),
        };
        p.bump();
        Ok(TPat::Atom {
            loc: Some((begin, p.position())),
            value,
        })
    }

    fn euclid(
        pulses: Pattern<i64>,
        steps: Pattern<i64>,
        rotation: Pattern<i64>,
        inner: Pattern<bool>,
    ) -> Pattern<bool> {
        inner.euclid_bool_with(pulses, steps, rotation)
    }

    fn from_control_value(value: f64) -> Option<bool> {
        Some(value > 0.5)
    }
}

impl Enumerable for bool {
    fn from_to(a: &bool, b: &bool) -> Vec<bool> {
        vec![*a, *b]
    }

    fn from_then_to(a: &bool, b: &bool, c: &bool) -> Vec<bool> {
        vec![*a, *b, *c]
    }
}

impl Parseable for f64 {
    fn parse_leaf(p: &mut Parser) -> PResult<TPat<f64>> {
        let begin = p.position();
        let v = p_pitch_or_number(p)?;
        let root = TPat::Atom {
            loc: Some((begin, p.position())),
            value: v,
        };
        p_chord_opt(p, root)
    }

    fn from_control_value(value: f64) -> Option<f64> {
        Some(value)
    }

    fn as_chord_root(&self) -> Option<f64> {
        Some(*self)
    }

    fn from_chord_interval(value: f64) -> Option<f64> {
        Some(value)
    }
}

impl Enumerable for f64 {
    fn from_to(a: &f64, b: &f64) -> Vec<f64> {
        enum_f64(*a, if *a <= *b { 1.0 } else { -1.0 }, *b)
    }

    fn from_then_to(a: &f64, b: &f64, c: &f64) -> Vec<f64> {
        enum_f64(*a, *b - *a, *c)
    }
}

/// Step from `a` towards `c`, overshooting by half a step as floating
/// point ranges conventionally do.
fn enum_f64(a: f64, step: f64, c: f64) -> Vec<f64> {
    if step == 0.0 {
        return vec![a];
    }
    let mut out = Vec::new();
    let mut v = a;
    let limit = c + step / 2.0;
    if step > 0.0 {
        while v <= limit {
            out.push(v);
            v += step;
        }
    } else {
        while v >= limit {
            out.push(v);
            v += step;
        }
    }
    out
}

impl Parseable for Note {
    fn parse_leaf(p: &mut Parser) -> PResult<TPat<Note>> {
        let begin = p.position();
        let v = p_pitch_or_number(p)?;
        let root = TPat::Atom {
            loc: Some((begin, p.position())),
            value: Note(v),
        };
        p_chord_opt(p, root)
    }

    fn from_control_value(value: f64) -> Option<Note> {
        Some(Note(value))
    }

    fn as_chord_root(&self) -> Option<f64> {
        Some(self.0)
    }

    fn from_chord_interval(value: f64) -> Option<Note> {
        Some(Note(value))
    }
}

impl Enumerable for Note {
    fn from_to(a: &Note, b: &Note) -> Vec<Note> {
        f64::from_to(&a.0, &b.0).into_iter().map(Note).collect()
    }

    fn from_then_to(a: &Note, b: &Note, c: &Note) -> Vec<Note> {
        f64::from_then_to(&a.0, &b.0, &c.0)
            .into_iter()
            .map(Note)
            .collect()
    }
}

macro_rules! impl_parseable_integral {
    ($t:ty) => {
        impl Parseable for $t {
            fn parse_leaf(p: &mut Parser) -> PResult<TPat<$t>> {
                let begin = p.position();
                let v = p_integral(p)?;
                Ok(TPat::Atom {
                    loc: Some((begin, p.position())),
                    value: v as $t,
                })
            }

            fn from_control_value(value: f64) -> Option<$t> {
                Some(value as $t)
            }

            fn as_chord_root(&self) -> Option<f64> {
                Some(*self as f64)
            }

            fn from_chord_interval(value: f64) -> Option<$t> {
                Some(value as $t)
            }
        }

        impl Enumerable for $t {
            fn from_to(a: &$t, b: &$t) -> Vec<$t> {
                if a <= b {
                    (*a..=*b).collect()
                } else {
                    (*b..=*a).rev().collect()
                }
            }

            fn from_then_to(a: &$t, b: &$t, c: &$t) -> Vec<$t> {
                let step = *b - *a;
                if step == 0 {
                    return vec![*a];
                }
                let mut out = Vec::new();
                let mut v = *a;
                loop {
                    if (step > 0 && v > *c) || (step < 0 && v < *c) {
                        break;
                    }
                    out.push(v);
                    v = match v.checked_add(step) {
                        Some(next) => next,
                        None => break,
                    };
                }
                out
            }
        }
    };
}

impl_parseable_integral!(i32);
impl_parseable_integral!(i64);

impl Parseable for Fraction {
    fn parse_leaf(p: &mut Parser) -> PResult<TPat<Fraction>> {
        let begin = p.position();
        let v = p_ratio(p)?;
        Ok(TPat::Atom {
            loc: Some((begin, p.position())),
            value: v,
        })
    }

    fn from_control_value(value: f64) -> Option<Fraction> {
        Fraction::approximate_float(value)
    }
}

impl Enumerable for Fraction {
    fn from_to(a: &Fraction, b: &Fraction) -> Vec<Fraction> {
        enum_fraction(
            *a,
            if a <= b {
                Fraction::one()
            } else {
                -Fraction::one()
            },
            *b,
        )
    }

    fn from_then_to(a: &Fraction, b: &Fraction, c: &Fraction) -> Vec<Fraction> {
        enum_fraction(*a, *b - *a, *c)
    }
}

fn enum_fraction(a: Fraction, step: Fraction, c: Fraction) -> Vec<Fraction> {
    if step.is_zero() {
        return vec![a];
    }
    let mut out = Vec::new();
    let mut v = a;
    loop {
        if (step > Fraction::zero() && v > c) || (step < Fraction::zero() && v < c) {
            break;
        }
        out.push(v);
        v += step;
    }
    out
}

impl Parseable for Colour {
    fn parse_leaf(p: &mut Parser) -> PResult<TPat<Colour>> {
        let start = p.mark();
        let begin = p.position();
        let mut name = String::new();
        while let Some(c) = p.peek() {
            if c.is_ascii_alphabetic() {
                name.push(c);
                p.bump();
            } else {
                break;
            }
        }
        if name.is_empty() {
            return p.fail("colour name");
        }
        match Colour::named(&name) {
            Some(colour) => Ok(TPat::Atom {
                loc: Some((begin, p.position())),
                value: colour,
            }),
            None => {
                p.reset(start);
                p.fail("colour name")
            }
        }
    }
}

impl Enumerable for Colour {
    fn from_to(a: &Colour, b: &Colour) -> Vec<Colour> {
        vec![*a, *b]
    }

    fn from_then_to(a: &Colour, b: &Colour, c: &Colour) -> Vec<Colour> {
        vec![*a, *b, *c]
    }
}

impl Parseable for Vec<Modifier> {
    fn parse_leaf(p: &mut Parser) -> PResult<TPat<Vec<Modifier>>> {
        let begin = p.position();
        let group = p_modifier_group(p)?;
        Ok(TPat::Atom {
            loc: Some((begin, p.position())),
            value: group,
        })
    }
}

impl Enumerable for Vec<Modifier> {
    fn from_to(a: &Vec<Modifier>, b: &Vec<Modifier>) -> Vec<Vec<Modifier>> {
        vec![a.clone(), b.clone()]
    }

    fn from_then_to(
        a: &Vec<Modifier>,
        b: &Vec<Modifier>,
        c: &Vec<Modifier>,
    ) -> Vec<Vec<Modifier>> {
        vec![a.clone(), b.clone(), c.clone()]
    }
}

// ============= Entry points =============

/// Parse mini-notation into a syntax tree.
pub fn parse_tpat<T: Parseable>(input: &str) -> Result<TPat<T>, ParseError> {
    let mut p = Parser::new(input);
    match p_sequence::<T>(&mut p) {
        Ok(tpat) if p.at_end() => {
            debug!(input, "parsed mini-notation");
            Ok(tpat)
        }
        Ok(_) => {
            let _: PResult<()> = p.fail("end of input");
            Err(p.into_error())
        }
        Err(()) => Err(p.into_error()),
    }
}

/// Parse and compile mini-notation.
pub fn parse_pattern<T: Parseable + Enumerable>(input: &str) -> Result<Pattern<T>, ParseError> {
    parse_tpat::<T>(input).map(|tpat| tpat.to_pattern())
}

/// Parse and compile, panicking with the rendered diagnostic on failure.
/// For contexts where a malformed pattern is a programming error.
pub fn pattern<T: Parseable + Enumerable>(input: &str) -> Pattern<T> {
    match parse_pattern::<T>(input) {
        Ok(p) => p,
        Err(e) => panic!("{e}"),
    }
}
