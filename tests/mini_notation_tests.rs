//! End-to-end tests: parse mini-notation, sample a cycle window, check the
//! exact rational event list.

use std::collections::HashMap;

use ostinato::{frac, parse_pattern, Fraction, Note, Pattern, State, TimeSpan};
use pretty_assertions::assert_eq;

fn events<T: Clone + Send + Sync + 'static>(
    p: &Pattern<T>,
    cycle: i64,
) -> Vec<(Fraction, Fraction, T)> {
    let mut haps = p.query(&State::cycle(cycle));
    haps.sort_by_key(|h| h.part.begin);
    haps.into_iter()
        .map(|h| (h.part.begin, h.part.end, h.value))
        .collect()
}

fn values<T: Clone + Send + Sync + 'static>(p: &Pattern<T>, cycle: i64) -> Vec<T> {
    events(p, cycle).into_iter().map(|(_, _, v)| v).collect()
}

#[test]
fn four_vocables_quarter_each() {
    let p = parse_pattern::<String>("a b c d").unwrap();
    assert_eq!(
        events(&p, 0),
        vec![
            (frac(0, 1), frac(1, 4), "a".to_string()),
            (frac(1, 4), frac(1, 2), "b".to_string()),
            (frac(1, 2), frac(3, 4), "c".to_string()),
            (frac(3, 4), frac(1, 1), "d".to_string()),
        ]
    );
}

#[test]
fn rests_leave_gaps() {
    let p = parse_pattern::<String>("a ~ b ~").unwrap();
    assert_eq!(
        events(&p, 0),
        vec![
            (frac(0, 1), frac(1, 4), "a".to_string()),
            (frac(1, 2), frac(3, 4), "b".to_string()),
        ]
    );
}

#[test]
fn stacked_layers_sample_independently() {
    let p = parse_pattern::<String>("[a b, c d e]").unwrap();
    assert_eq!(
        events(&p, 0),
        vec![
            (frac(0, 1), frac(1, 2), "a".to_string()),
            (frac(0, 1), frac(1, 3), "c".to_string()),
            (frac(1, 3), frac(2, 3), "d".to_string()),
            (frac(1, 2), frac(1, 1), "b".to_string()),
            (frac(2, 3), frac(1, 1), "e".to_string()),
        ]
    );
}

#[test]
fn star_speeds_a_step_up() {
    let p = parse_pattern::<String>("a*2").unwrap();
    assert_eq!(
        events(&p, 0),
        vec![
            (frac(0, 1), frac(1, 2), "a".to_string()),
            (frac(1, 2), frac(1, 1), "a".to_string()),
        ]
    );
}

#[test]
fn slash_stretches_across_cycles() {
    let p = parse_pattern::<String>("a/2").unwrap();
    let haps = p.query(&State::cycle(0));
    assert_eq!(haps.len(), 1);
    assert_eq!(haps[0].part, TimeSpan::new(frac(0, 1), frac(1, 1)));
    assert_eq!(haps[0].whole, Some(TimeSpan::new(frac(0, 1), frac(2, 1))));
}

#[test]
fn bang_repeats_in_place() {
    let p = parse_pattern::<String>("a!3").unwrap();
    assert_eq!(
        events(&p, 0),
        vec![
            (frac(0, 1), frac(1, 3), "a".to_string()),
            (frac(1, 3), frac(2, 3), "a".to_string()),
            (frac(2, 3), frac(1, 1), "a".to_string()),
        ]
    );
}

#[test]
fn elongation_weights_the_cycle() {
    let p = parse_pattern::<String>("a@3 b").unwrap();
    assert_eq!(
        events(&p, 0),
        vec![
            (frac(0, 1), frac(3, 4), "a".to_string()),
            (frac(3, 4), frac(1, 1), "b".to_string()),
        ]
    );
}

#[test]
fn feet_split_the_cycle_evenly() {
    let p = parse_pattern::<String>("a . b c").unwrap();
    assert_eq!(
        events(&p, 0),
        vec![
            (frac(0, 1), frac(1, 2), "a".to_string()),
            (frac(1, 2), frac(3, 4), "b".to_string()),
            (frac(3, 4), frac(1, 1), "c".to_string()),
        ]
    );
}

#[test]
fn euclid_places_three_in_eight() {
    let p = parse_pattern::<String>("bd(3,8)").unwrap();
    assert_eq!(
        events(&p, 0),
        vec![
            (frac(0, 1), frac(1, 8), "bd".to_string()),
            (frac(3, 8), frac(4, 8), "bd".to_string()),
            (frac(6, 8), frac(7, 8), "bd".to_string()),
        ]
    );
}

#[test]
fn euclid_rotation_shifts_onsets() {
    let p = parse_pattern::<String>("bd(3,8,2)").unwrap();
    let onsets: Vec<Fraction> = events(&p, 0).into_iter().map(|(b, _, _)| b).collect();
    assert_eq!(onsets, vec![frac(1, 8), frac(4, 8), frac(6, 8)]);
}

#[test]
fn boolean_euclid_keeps_the_grid() {
    let p = parse_pattern::<bool>("t(3,8)").unwrap();
    let evs = events(&p, 0);
    assert_eq!(evs.len(), 8);
    let on: Vec<Fraction> = evs
        .iter()
        .filter(|(_, _, v)| *v)
        .map(|(b, _, _)| *b)
        .collect();
    assert_eq!(on, vec![frac(0, 1), frac(3, 8), frac(6, 8)]);
}

#[test]
fn chord_expands_to_simultaneous_notes() {
    let p = parse_pattern::<Note>("c'maj").unwrap();
    let haps = p.query(&State::cycle(0));
    assert_eq!(haps.len(), 3);
    let whole = TimeSpan::new(frac(0, 1), frac(1, 1));
    for hap in &haps {
        assert_eq!(hap.whole, Some(whole));
        assert_eq!(hap.part, whole);
    }
    let notes: Vec<f64> = haps.iter().map(|h| h.value.0).collect();
    assert_eq!(notes, vec![0.0, 4.0, 7.0]);
}

#[test]
fn chord_modifiers_change_voicing() {
    let inverted = parse_pattern::<Note>("c'maj'i").unwrap();
    assert_eq!(values(&inverted, 0), vec![Note(4.0), Note(7.0), Note(12.0)]);
    let open = parse_pattern::<f64>("0'maj'o").unwrap();
    assert_eq!(values(&open, 0), vec![-12.0, -5.0, 4.0]);
}

#[test]
fn chord_contexts_distribute_positionally() {
    let p = parse_pattern::<Note>("c'maj").unwrap();
    let haps = p.query(&State::cycle(0));
    // root atom location, chord name location, then nothing left
    assert_eq!(haps[0].context.len(), 1);
    assert_eq!(haps[1].context.len(), 1);
    assert!(haps[2].context.is_empty());
}

#[test]
fn enumeration_is_inclusive() {
    let p = parse_pattern::<i64>("0 .. 3").unwrap();
    assert_eq!(
        events(&p, 0),
        vec![
            (frac(0, 1), frac(1, 4), 0),
            (frac(1, 4), frac(1, 2), 1),
            (frac(1, 2), frac(3, 4), 2),
            (frac(3, 4), frac(1, 1), 3),
        ]
    );
}

#[test]
fn enumeration_descends_when_reversed() {
    let p = parse_pattern::<i64>("3 .. 0").unwrap();
    assert_eq!(values(&p, 0), vec![3, 2, 1, 0]);
}

#[test]
fn angle_brackets_alternate_per_cycle() {
    let p = parse_pattern::<String>("<a b c>").unwrap();
    assert_eq!(values(&p, 0), vec!["a".to_string()]);
    assert_eq!(values(&p, 1), vec!["b".to_string()]);
    assert_eq!(values(&p, 2), vec!["c".to_string()]);
    assert_eq!(values(&p, 3), vec!["a".to_string()]);
}

#[test]
fn polyrhythm_normalises_to_first_child() {
    let p = parse_pattern::<String>("{a b, c d e}").unwrap();
    assert_eq!(
        events(&p, 0),
        vec![
            (frac(0, 1), frac(1, 2), "a".to_string()),
            (frac(0, 1), frac(1, 2), "c".to_string()),
            (frac(1, 2), frac(1, 1), "b".to_string()),
            (frac(1, 2), frac(1, 1), "d".to_string()),
        ]
    );
    // the slower layer rotates through its remaining steps next cycle
    assert_eq!(
        values(&p, 1),
        vec![
            "a".to_string(),
            "e".to_string(),
            "b".to_string(),
            "c".to_string()
        ]
    );
}

#[test]
fn polyrhythm_with_explicit_rate() {
    let p = parse_pattern::<String>("{a b c}%4").unwrap();
    assert_eq!(
        values(&p, 0),
        vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "a".to_string()
        ]
    );
}

#[test]
fn degrade_is_deterministic_across_parses() {
    let a = parse_pattern::<String>("[x!16]?0.4").unwrap();
    let b = parse_pattern::<String>("[x!16]?0.4").unwrap();
    let left = events(&a, 0);
    assert_eq!(left, events(&a, 0));
    assert_eq!(left, events(&b, 0));
    assert!(left.len() < 16);
    assert!(!left.is_empty());
}

#[test]
fn cycle_choice_is_deterministic() {
    let p = parse_pattern::<String>("[a|b|c]").unwrap();
    let first = events(&p, 0);
    assert_eq!(first.len(), 1);
    assert_eq!(first, events(&p, 0));
    let allowed = ["a", "b", "c"];
    assert!(allowed.contains(&first[0].2.as_str()));
    // over many cycles every alternative shows up
    let mut seen: Vec<String> = (0..64).flat_map(|c| values(&p, c)).collect();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 3);
}

#[test]
fn controls_feed_variables() {
    let p = parse_pattern::<f64>("^pan").unwrap();
    let mut state = State::cycle(0);
    assert!(p.query(&state).is_empty());
    state.controls = HashMap::from([("pan".to_string(), 0.25)]);
    let haps = p.query(&state);
    assert_eq!(haps.len(), 1);
    assert_eq!(haps[0].value, 0.25);
}

#[test]
fn variables_without_channels_are_silent() {
    let p = parse_pattern::<String>("^pan").unwrap();
    let mut state = State::cycle(0);
    state.controls = HashMap::from([("pan".to_string(), 0.25)]);
    assert!(p.query(&state).is_empty());
}
