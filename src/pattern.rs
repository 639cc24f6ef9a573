//! Rational-time pattern engine.
//!
//! A [`Pattern`] is a pure function from a time window to the events active
//! within it. Querying the same window always yields the same events, so
//! patterns can be freely shared between threads and re-sampled while the
//! underlying description is edited.
//!
//! All time arithmetic is exact: positions and durations are [`Fraction`]s
//! and a cycle is the unit interval. Nested speed changes, polyrhythms and
//! long sampling runs never accumulate floating-point drift.

use std::collections::HashMap;
use std::sync::Arc;

use num_rational::Rational64;
use num_traits::{One, Zero};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Exact time value. One cycle spans `[0, 1)`.
pub type Fraction = Rational64;

/// Shorthand for building a [`Fraction`] from numerator and denominator.
#[inline]
pub fn frac(numer: i64, denom: i64) -> Fraction {
    Fraction::new(numer, denom)
}

/// Source span attached to an event: ((column, line) begin, (column, line) end).
/// Columns and lines are 1-based.
pub type Loc = ((u32, u32), (u32, u32));

/// A half-open time interval `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub begin: Fraction,
    pub end: Fraction,
}

impl TimeSpan {
    pub fn new(begin: Fraction, end: Fraction) -> Self {
        Self { begin, end }
    }

    pub fn duration(&self) -> Fraction {
        self.end - self.begin
    }

    pub fn midpoint(&self) -> Fraction {
        (self.begin + self.end) / Fraction::from_integer(2)
    }

    /// The whole cycle containing `t`.
    pub fn cycle_of(t: Fraction) -> TimeSpan {
        let sam = t.floor();
        TimeSpan::new(sam, sam + Fraction::one())
    }

    /// Intersection of two spans. Zero-width results are kept except when
    /// they are degenerate leftovers at the end of a non-empty span.
    pub fn sect(&self, other: &TimeSpan) -> Option<TimeSpan> {
        let begin = self.begin.max(other.begin);
        let end = self.end.min(other.end);
        if begin > end {
            return None;
        }
        if begin == end {
            if begin == self.end && self.begin < self.end {
                return None;
            }
            if begin == other.end && other.begin < other.end {
                return None;
            }
        }
        Some(TimeSpan::new(begin, end))
    }

    /// Split the span at cycle boundaries. A zero-width span is preserved.
    pub fn cycles(&self) -> Vec<TimeSpan> {
        if self.begin == self.end {
            return vec![*self];
        }
        let mut out = Vec::new();
        let mut begin = self.begin;
        while begin < self.end {
            let next = begin.floor() + Fraction::one();
            let end = next.min(self.end);
            out.push(TimeSpan::new(begin, end));
            begin = end;
        }
        out
    }
}

/// A timed event. `whole` is the full logical extent (absent for sampled
/// continuous signals); `part` is the slice visible in the queried window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hap<T> {
    pub whole: Option<TimeSpan>,
    pub part: TimeSpan,
    pub value: T,
    pub context: Vec<Loc>,
}

impl<T: Clone> Hap<T> {
    pub fn new(whole: Option<TimeSpan>, part: TimeSpan, value: T) -> Self {
        Self {
            whole,
            part,
            value,
            context: Vec::new(),
        }
    }

    pub fn with_value<U>(&self, f: impl FnOnce(&T) -> U) -> Hap<U> {
        Hap {
            whole: self.whole,
            part: self.part,
            value: f(&self.value),
            context: self.context.clone(),
        }
    }

    /// The whole if present, otherwise the part.
    pub fn whole_or_part(&self) -> TimeSpan {
        self.whole.unwrap_or(self.part)
    }
}

/// State for pattern queries: the window plus named control values.
#[derive(Debug, Clone)]
pub struct State {
    pub span: TimeSpan,
    pub controls: HashMap<String, f64>,
}

impl State {
    pub fn new(span: TimeSpan) -> Self {
        Self {
            span,
            controls: HashMap::new(),
        }
    }

    /// Query state covering cycle `n`.
    pub fn cycle(n: i64) -> Self {
        Self::new(TimeSpan::new(
            Fraction::from_integer(n),
            Fraction::from_integer(n + 1),
        ))
    }
}

/// Core pattern type: a query function from window to events.
pub struct Pattern<T: Clone + Send + Sync> {
    query: Arc<dyn Fn(&State) -> Vec<Hap<T>> + Send + Sync>,
}

impl<T: Clone + Send + Sync> std::fmt::Debug for Pattern<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pattern").field("query", &"<closure>").finish()
    }
}

impl<T: Clone + Send + Sync> Clone for Pattern<T> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Pattern<T> {
    pub fn new(query: impl Fn(&State) -> Vec<Hap<T>> + Send + Sync + 'static) -> Self {
        Self {
            query: Arc::new(query),
        }
    }

    pub fn query(&self, state: &State) -> Vec<Hap<T>> {
        (self.query)(state)
    }

    /// One event per cycle, repeating forever.
    pub fn pure(value: T) -> Self {
        Self::new(move |state| {
            state
                .span
                .cycles()
                .into_iter()
                .filter_map(|span| {
                    let whole = TimeSpan::cycle_of(span.begin);
                    let part = whole.sect(&span)?;
                    Some(Hap::new(Some(whole), part, value.clone()))
                })
                .collect()
        })
    }

    pub fn silence() -> Self {
        Self::new(|_| Vec::new())
    }

    /// A continuous signal sampled at the midpoint of each query window.
    /// Signal events carry no `whole`.
    pub fn signal(f: impl Fn(Fraction) -> T + Send + Sync + 'static) -> Self {
        Self::new(move |state| vec![Hap::new(None, state.span, f(state.span.midpoint()))])
    }

    pub fn fmap<U: Clone + Send + Sync + 'static>(
        self,
        f: impl Fn(T) -> U + Send + Sync + 'static,
    ) -> Pattern<U> {
        Pattern::new(move |state| {
            self.query(state)
                .into_iter()
                .map(|hap| hap.with_value(|v| f(v.clone())))
                .collect()
        })
    }

    /// Rewrite the full event list of every query.
    pub fn with_events<U: Clone + Send + Sync + 'static>(
        self,
        f: impl Fn(Vec<Hap<T>>) -> Vec<Hap<U>> + Send + Sync + 'static,
    ) -> Pattern<U> {
        Pattern::new(move |state| f(self.query(state)))
    }

    pub fn filter_events(
        self,
        pred: impl Fn(&Hap<T>) -> bool + Send + Sync + 'static,
    ) -> Self {
        Pattern::new(move |state| {
            self.query(state).into_iter().filter(|h| pred(h)).collect()
        })
    }

    pub fn filter_values(self, pred: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.filter_events(move |hap| pred(&hap.value))
    }

    /// Append a source location to every event's context.
    pub fn with_context(self, loc: Loc) -> Self {
        Pattern::new(move |state| {
            self.query(state)
                .into_iter()
                .map(|mut hap| {
                    hap.context.push(loc);
                    hap
                })
                .collect()
        })
    }

    // ============= Time transforms =============

    pub fn with_query_time(
        self,
        f: impl Fn(Fraction) -> Fraction + Send + Sync + 'static,
    ) -> Self {
        Pattern::new(move |state| {
            let span = TimeSpan::new(f(state.span.begin), f(state.span.end));
            self.query(&State {
                span,
                controls: state.controls.clone(),
            })
        })
    }

    pub fn with_result_time(
        self,
        f: impl Fn(Fraction) -> Fraction + Send + Sync + 'static,
    ) -> Self {
        Pattern::new(move |state| {
            self.query(state)
                .into_iter()
                .map(|mut hap| {
                    hap.part = TimeSpan::new(f(hap.part.begin), f(hap.part.end));
                    hap.whole = hap.whole.map(|w| TimeSpan::new(f(w.begin), f(w.end)));
                    hap
                })
                .collect()
        })
    }

    /// Speed up by an exact factor. Zero is silence, negative reverses.
    pub fn fast(self, factor: Fraction) -> Self {
        if factor.is_zero() {
            return Pattern::silence();
        }
        if factor < Fraction::zero() {
            return self.rev().fast(-factor);
        }
        self.with_query_time(move |t| t * factor)
            .with_result_time(move |t| t / factor)
    }

    pub fn slow(self, factor: Fraction) -> Self {
        if factor.is_zero() {
            return Pattern::silence();
        }
        self.fast(factor.recip())
    }

    /// Speed up by a patterned factor, sampled wherever the factor pattern
    /// places its events.
    pub fn fast_pat(self, factor: Pattern<Fraction>) -> Self {
        let inner = self;
        factor.fmap(move |r| inner.clone().fast(r)).inner_join()
    }

    pub fn slow_pat(self, factor: Pattern<Fraction>) -> Self {
        let inner = self;
        factor.fmap(move |r| inner.clone().slow(r)).inner_join()
    }

    /// Reverse each cycle in place.
    pub fn rev(self) -> Self {
        Pattern::new(move |state| {
            let mut out = Vec::new();
            for span in state.span.cycles() {
                let sam = span.begin.floor();
                let next = sam + Fraction::one();
                let reflect =
                    move |s: TimeSpan| TimeSpan::new(sam + next - s.end, sam + next - s.begin);
                let inner = State {
                    span: reflect(span),
                    controls: state.controls.clone(),
                };
                for mut hap in self.query(&inner) {
                    hap.part = reflect(hap.part);
                    hap.whole = hap.whole.map(reflect);
                    out.push(hap);
                }
            }
            out
        })
    }

    /// Rotate earlier in time by `amount` cycles.
    pub fn rotl(self, amount: Fraction) -> Self {
        self.with_query_time(move |t| t + amount)
            .with_result_time(move |t| t - amount)
    }

    /// Rotate later in time by `amount` cycles.
    pub fn rotr(self, amount: Fraction) -> Self {
        self.rotl(-amount)
    }

    // ============= Combination =============

    /// Play patterns simultaneously.
    pub fn stack(patterns: Vec<Pattern<T>>) -> Pattern<T> {
        Pattern::new(move |state| patterns.iter().flat_map(|p| p.query(state)).collect())
    }

    /// Squeeze a pattern into `[begin, end)` of every cycle.
    pub fn compress(self, begin: Fraction, end: Fraction) -> Self {
        if begin >= end || begin < Fraction::zero() || end > Fraction::one() {
            return Pattern::silence();
        }
        let width = end - begin;
        Pattern::new(move |state| {
            let mut out = Vec::new();
            for span in state.span.cycles() {
                let sam = span.begin.floor();
                let seg = TimeSpan::new(sam + begin, sam + end);
                let window = match seg.sect(&span) {
                    Some(w) if w.begin < w.end => w,
                    _ => continue,
                };
                let to_child = move |t: Fraction| sam + (t - seg.begin) / width;
                let from_child = move |t: Fraction| seg.begin + (t - sam) * width;
                let inner = State {
                    span: TimeSpan::new(to_child(window.begin), to_child(window.end)),
                    controls: state.controls.clone(),
                };
                for mut hap in self.query(&inner) {
                    hap.part =
                        TimeSpan::new(from_child(hap.part.begin), from_child(hap.part.end));
                    hap.whole = hap
                        .whole
                        .map(|w| TimeSpan::new(from_child(w.begin), from_child(w.end)));
                    out.push(hap);
                }
            }
            out
        })
    }

    /// Concatenate children within a single cycle, each taking a share of
    /// the cycle proportional to its weight.
    pub fn timecat(pairs: Vec<(Fraction, Pattern<T>)>) -> Pattern<T> {
        let total: Fraction = pairs
            .iter()
            .map(|(w, _)| *w)
            .fold(Fraction::zero(), |a, b| a + b);
        if total <= Fraction::zero() {
            return Pattern::silence();
        }
        let mut onset = Fraction::zero();
        let mut layers = Vec::with_capacity(pairs.len());
        for (weight, pattern) in pairs {
            if weight <= Fraction::zero() {
                continue;
            }
            let begin = onset / total;
            let end = (onset + weight) / total;
            layers.push(pattern.compress(begin, end));
            onset += weight;
        }
        Pattern::stack(layers)
    }

    /// All values in one cycle, equal widths.
    pub fn fast_from_list(values: Vec<T>) -> Pattern<T> {
        Pattern::timecat(
            values
                .into_iter()
                .map(|v| (Fraction::one(), Pattern::pure(v)))
                .collect(),
        )
    }

    /// Sample this pattern `n` times per cycle, each sample becoming a
    /// discrete event with its own whole.
    pub fn segment(self, n: Fraction) -> Self {
        Pattern::pure(()).fast(n).app_left_with(self, |_, v| v.clone())
    }

    /// Choose a value per sample of `rnd` (`floor(r * len)`, clamped).
    pub fn choose_by(rnd: Pattern<f64>, choices: Vec<T>) -> Pattern<T> {
        if choices.is_empty() {
            return Pattern::silence();
        }
        let len = choices.len();
        rnd.fmap(move |r| {
            let idx = ((r * len as f64).floor() as usize).min(len - 1);
            choices[idx].clone()
        })
    }

    // ============= Applicative combination =============

    /// Pair events from both patterns wherever their parts intersect.
    /// Wholes intersect too; a pairing with disjoint wholes is dropped,
    /// and a signal on either side leaves the whole absent.
    pub fn app_both_with<B, C, F>(self, other: Pattern<B>, f: F) -> Pattern<C>
    where
        B: Clone + Send + Sync + 'static,
        C: Clone + Send + Sync + 'static,
        F: Fn(&T, &B) -> C + Send + Sync + 'static,
    {
        Pattern::new(move |state| {
            let lefts = self.query(state);
            let rights = other.query(state);
            let mut out = Vec::new();
            for l in &lefts {
                for r in &rights {
                    let part = match l.part.sect(&r.part) {
                        Some(p) => p,
                        None => continue,
                    };
                    let whole = match sub_maybe_span(l.whole, r.whole) {
                        Some(w) => w,
                        None => continue,
                    };
                    let mut context = l.context.clone();
                    context.extend(r.context.iter().copied());
                    out.push(Hap {
                        whole,
                        part,
                        value: f(&l.value, &r.value),
                        context,
                    });
                }
            }
            out
        })
    }

    /// Keep the structure (wholes) of `self`; sample `other` over each
    /// event's whole.
    pub fn app_left_with<B, C, F>(self, other: Pattern<B>, f: F) -> Pattern<C>
    where
        B: Clone + Send + Sync + 'static,
        C: Clone + Send + Sync + 'static,
        F: Fn(&T, &B) -> C + Send + Sync + 'static,
    {
        Pattern::new(move |state| {
            let mut out = Vec::new();
            for l in self.query(state) {
                let inner = State {
                    span: l.whole_or_part(),
                    controls: state.controls.clone(),
                };
                for r in other.query(&inner) {
                    let part = match l.part.sect(&r.part) {
                        Some(p) => p,
                        None => continue,
                    };
                    let mut context = l.context.clone();
                    context.extend(r.context.iter().copied());
                    out.push(Hap {
                        whole: l.whole,
                        part,
                        value: f(&l.value, &r.value),
                        context,
                    });
                }
            }
            out
        })
    }

    // ============= Randomness =============

    /// Probabilistically drop events. Structure comes from `self`; `rnd` is
    /// sampled over each event's whole, and the event survives when the
    /// sample is at least `amount`.
    pub fn degrade_by_using(self, rnd: Pattern<f64>, amount: f64) -> Self {
        self.app_left_with(rnd, |v, r| (v.clone(), *r))
            .filter_values(move |pair| pair.1 >= amount)
            .fmap(|pair| pair.0)
    }

    // ============= Euclidean rhythms =============

    /// Distribute pulses over steps with Bjorklund's algorithm; each `true`
    /// step plays the value of `self` active at that step. All three
    /// arguments are patterns, sampled per cycle position.
    pub fn euclid_with(
        self,
        pulses: Pattern<i64>,
        steps: Pattern<i64>,
        rotation: Pattern<i64>,
    ) -> Self {
        let inner = self;
        pulses
            .app_both_with(steps, |a, b| (*a, *b))
            .app_both_with(rotation, |ab, c| (ab.0, ab.1, *c))
            .fmap(move |(n, k, r)| {
                let bits = crate::bjorklund::bjorklund_rotated(n, k, r);
                Pattern::fast_from_list(bits)
                    .filter_values(|b| *b)
                    .app_both_with(inner.clone(), |_, v| v.clone())
            })
            .inner_join()
    }

    // ============= Event grouping =============

    /// Group events by an equivalence, merging each group into one
    /// list-valued event. Order within a group is first-occurrence order;
    /// contexts are concatenated.
    pub fn collect_by(
        self,
        same_group: impl Fn(&Hap<T>, &Hap<T>) -> bool + Send + Sync + 'static,
    ) -> Pattern<Vec<T>> {
        self.with_events(move |haps| {
            let mut reps: Vec<Hap<T>> = Vec::new();
            let mut groups: Vec<Hap<Vec<T>>> = Vec::new();
            for hap in haps {
                if let Some(i) = reps.iter().position(|rep| same_group(rep, &hap)) {
                    groups[i].value.push(hap.value.clone());
                    groups[i].context.extend(hap.context.iter().copied());
                } else {
                    groups.push(Hap {
                        whole: hap.whole,
                        part: hap.part,
                        value: vec![hap.value.clone()],
                        context: hap.context.clone(),
                    });
                    reps.push(hap);
                }
            }
            groups
        })
    }

    /// Group events sharing both whole and part.
    pub fn collect(self) -> Pattern<Vec<T>> {
        self.collect_by(|a, b| a.whole == b.whole && a.part == b.part)
    }
}

impl Pattern<bool> {
    /// Euclidean rhythm keeping the full step grid: every step is an event
    /// whose boolean is the Bjorklund bit, inverted when the underlying
    /// pattern's value is false.
    pub fn euclid_bool_with(
        self,
        pulses: Pattern<i64>,
        steps: Pattern<i64>,
        rotation: Pattern<i64>,
    ) -> Pattern<bool> {
        let inner = self;
        pulses
            .app_both_with(steps, |a, b| (*a, *b))
            .app_both_with(rotation, |ab, c| (ab.0, ab.1, *c))
            .fmap(move |(n, k, r)| {
                let bits = crate::bjorklund::bjorklund_rotated(n, k, r);
                Pattern::fast_from_list(bits)
                    .app_both_with(inner.clone(), |bit, v| if *v { *bit } else { !*bit })
            })
            .inner_join()
    }
}

impl<T: Clone + Send + Sync + 'static> Pattern<Vec<T>> {
    /// Split each list-valued event into simultaneous scalar events.
    /// Contexts distribute positionally: event `i` keeps context entry `i`
    /// when present, otherwise an empty context.
    pub fn uncollect(self) -> Pattern<T> {
        self.with_events(|haps| {
            haps.into_iter()
                .flat_map(|hap| {
                    let ctx = hap.context.clone();
                    hap.value
                        .iter()
                        .enumerate()
                        .map(|(i, v)| Hap {
                            whole: hap.whole,
                            part: hap.part,
                            value: v.clone(),
                            context: ctx.get(i).map(|c| vec![*c]).unwrap_or_default(),
                        })
                        .collect::<Vec<_>>()
                })
                .collect()
        })
    }
}

impl<T: Clone + Send + Sync + 'static> Pattern<Pattern<T>> {
    /// Flatten a pattern of patterns, intersecting outer and inner
    /// structure.
    pub fn join(self) -> Pattern<T> {
        Pattern::new(move |state| {
            let mut out = Vec::new();
            for outer in self.query(state) {
                let inner_state = State {
                    span: outer.part,
                    controls: state.controls.clone(),
                };
                for inner in outer.value.query(&inner_state) {
                    let part = match outer.part.sect(&inner.part) {
                        Some(p) => p,
                        None => continue,
                    };
                    let whole = match sub_maybe_span(outer.whole, inner.whole) {
                        Some(w) => w,
                        None => continue,
                    };
                    let mut context = inner.context.clone();
                    context.extend(outer.context.iter().copied());
                    out.push(Hap {
                        whole,
                        part,
                        value: inner.value.clone(),
                        context,
                    });
                }
            }
            out
        })
    }

    /// Flatten a pattern of patterns, keeping the inner structure.
    pub fn inner_join(self) -> Pattern<T> {
        Pattern::new(move |state| {
            let mut out = Vec::new();
            for outer in self.query(state) {
                let inner_state = State {
                    span: outer.part,
                    controls: state.controls.clone(),
                };
                for inner in outer.value.query(&inner_state) {
                    let part = match state.span.sect(&inner.part) {
                        Some(p) => p,
                        None => continue,
                    };
                    let mut context = inner.context.clone();
                    context.extend(outer.context.iter().copied());
                    out.push(Hap {
                        whole: inner.whole,
                        part,
                        value: inner.value.clone(),
                        context,
                    });
                }
            }
            out
        })
    }
}

/// Intersect optional wholes. `None` on either side yields an absent whole;
/// two wholes with an empty intersection drop the pairing entirely (outer
/// `None`).
fn sub_maybe_span(a: Option<TimeSpan>, b: Option<TimeSpan>) -> Option<Option<TimeSpan>> {
    match (a, b) {
        (Some(a), Some(b)) => a.sect(&b).map(Some),
        _ => Some(None),
    }
}

/// Deterministic noise signal in `[0, 1)`. The value over a window is a
/// hash of the window midpoint, so identical windows always sample
/// identically, across queries, threads and processes.
pub fn rand() -> Pattern<f64> {
    Pattern::signal(time_to_rand)
}

fn time_to_rand(t: Fraction) -> f64 {
    let seed = (*t.numer() as u64)
        .wrapping_mul(2654435761)
        .wrapping_add((*t.denom() as u64).wrapping_mul(0x9e3779b9));
    StdRng::seed_from_u64(seed).gen::<f64>()
}
