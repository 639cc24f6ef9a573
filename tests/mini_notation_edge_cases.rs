//! Edge cases: odd but legal inputs, malformed inputs, and the grammar
//! corners that interact (feet, elongation, repetition, polyrhythm
//! normalisation).

use ostinato::{frac, parse_pattern, Enumerable, Fraction, Note, Pattern, State};
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

#[test]
fn empty_input_is_silence() {
    for input in ["", "   ", "\t\n"] {
        let p = parse_pattern::<String>(input).unwrap();
        assert!(p.query(&State::cycle(0)).is_empty(), "input {:?}", input);
    }
}

#[test]
fn empty_brackets_are_silence() {
    let p = parse_pattern::<String>("a [] b").unwrap();
    let evs = events(&p, 0);
    assert_eq!(evs.len(), 2);
    assert_eq!(evs[0].0, frac(0, 1));
    assert_eq!(evs[1].0, frac(2, 3));
}

#[test]
fn underscores_extend_the_previous_step() {
    let p = parse_pattern::<String>("a _ _ b").unwrap();
    assert_eq!(
        events(&p, 0),
        vec![
            (frac(0, 1), frac(3, 4), "a".to_string()),
            (frac(3, 4), frac(1, 1), "b".to_string()),
        ]
    );
}

#[test]
fn bare_bangs_accumulate() {
    let p = parse_pattern::<String>("a ! ! b").unwrap();
    let evs = events(&p, 0);
    assert_eq!(evs.len(), 4);
    assert_eq!(evs[0].2, "a");
    assert_eq!(evs[2].2, "a");
    assert_eq!(evs[3].2, "b");
}

#[test]
fn patterned_speed_factor() {
    let p = parse_pattern::<String>("a*[2 3]").unwrap();
    let begins: Vec<Fraction> = events(&p, 0).into_iter().map(|(b, _, _)| b).collect();
    assert_eq!(begins, vec![frac(0, 1), frac(1, 2), frac(2, 3)]);
}

#[test]
fn trailing_foot_adds_an_empty_group() {
    let p = parse_pattern::<String>("a b .").unwrap();
    assert_eq!(
        events(&p, 0),
        vec![
            (frac(0, 1), frac(1, 4), "a".to_string()),
            (frac(1, 4), frac(1, 2), "b".to_string()),
        ]
    );
}

#[test]
fn nested_groups_nest_timing() {
    let p = parse_pattern::<String>("a [b [c d]]").unwrap();
    assert_eq!(
        events(&p, 0),
        vec![
            (frac(0, 1), frac(1, 2), "a".to_string()),
            (frac(1, 2), frac(3, 4), "b".to_string()),
            (frac(3, 4), frac(7, 8), "c".to_string()),
            (frac(7, 8), frac(1, 1), "d".to_string()),
        ]
    );
}

#[test]
fn euclid_arguments_may_alternate() {
    let p = parse_pattern::<String>("bd(<3 4>,8)").unwrap();
    assert_eq!(events(&p, 0).len(), 3);
    assert_eq!(events(&p, 1).len(), 4);
    assert_eq!(events(&p, 2).len(), 3);
}

#[test]
fn degrade_amount_zero_keeps_everything() {
    let p = parse_pattern::<String>("[a b c d]?0").unwrap();
    assert_eq!(events(&p, 0).len(), 4);
}

#[test]
fn string_enumeration_degenerates_to_endpoints() {
    let p = parse_pattern::<String>("a .. d").unwrap();
    assert_eq!(
        events(&p, 0),
        vec![
            (frac(0, 1), frac(1, 2), "a".to_string()),
            (frac(1, 2), frac(1, 1), "d".to_string()),
        ]
    );
}

#[test]
fn fractional_enumeration_steps_by_one() {
    let p = parse_pattern::<f64>("0.5 .. 2.5").unwrap();
    let vals: Vec<f64> = events(&p, 0).into_iter().map(|(_, _, v)| v).collect();
    assert_eq!(vals, vec![0.5, 1.5, 2.5]);
}

#[test]
fn from_then_to_strides() {
    assert_eq!(i64::from_then_to(&0, &2, &8), vec![0, 2, 4, 6, 8]);
    assert_eq!(i64::from_then_to(&8, &6, &0), vec![8, 6, 4, 2, 0]);
    assert_eq!(
        Fraction::from_then_to(&frac(0, 1), &frac(1, 2), &frac(3, 2)),
        vec![frac(0, 1), frac(1, 2), frac(1, 1), frac(3, 2)]
    );
}

#[test]
fn rational_durations_multiply() {
    let p = parse_pattern::<Fraction>("1%2 3h").unwrap();
    let vals: Vec<Fraction> = events(&p, 0).into_iter().map(|(_, _, v)| v).collect();
    assert_eq!(vals, vec![frac(1, 2), frac(3, 2)]);
}

#[test]
fn unterminated_bracket_is_an_error() {
    let err = parse_pattern::<String>("a [b").unwrap_err();
    assert_eq!(err.line, 1);
    assert_eq!(err.column, 5);
    assert_eq!(err.unexpected.as_deref(), Some("end of input"));
}

#[test]
fn missing_euclid_argument_is_an_error() {
    let err = parse_pattern::<String>("bd(3").unwrap_err();
    assert_eq!(err.column, 5);
    assert!(err.expected.iter().any(|e| e.contains(',')));
}

#[test]
fn error_reports_second_line_positions() {
    let err = parse_pattern::<String>("a b\nc )").unwrap_err();
    assert_eq!(err.line, 2);
    assert_eq!(err.column, 3);
    let shown = err.to_string();
    let lines: Vec<&str> = shown.lines().collect();
    assert_eq!(lines[0], "c )");
    assert_eq!(lines[1], "  ^");
}

#[test]
fn unknown_chord_names_default_to_the_root() {
    let p = parse_pattern::<Note>("c'blorp").unwrap();
    let haps = p.query(&State::cycle(0));
    assert_eq!(haps.len(), 1);
    assert_eq!(haps[0].value, Note(0.0));
}

#[test]
fn chord_range_extends_through_octaves() {
    let p = parse_pattern::<Note>("c'maj'5").unwrap();
    let vals: Vec<f64> = events(&p, 0).into_iter().map(|(_, _, v)| v.0).collect();
    assert_eq!(vals, vec![0.0, 4.0, 7.0, 12.0, 16.0]);
}

#[test]
fn chord_drop_moves_a_voice_down() {
    let p = parse_pattern::<Note>("c'maj7'd2").unwrap();
    let vals: Vec<f64> = events(&p, 0).into_iter().map(|(_, _, v)| v.0).collect();
    assert_eq!(vals, vec![-5.0, 0.0, 4.0, 11.0]);
}

#[test]
fn sampling_many_cycles_stays_finite_and_exact() {
    let p = parse_pattern::<String>("a*3 [b c]/2 {d e, f g h}").unwrap();
    for cycle in 0..32 {
        let evs = events(&p, cycle);
        assert!(!evs.is_empty());
        for (begin, end, _) in evs {
            assert!(begin >= frac(cycle, 1));
            assert!(end <= frac(cycle + 1, 1));
            assert!(begin < end);
        }
    }
}
