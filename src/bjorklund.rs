//! Bjorklund's algorithm for Euclidean rhythms.
//!
//! Distributes `pulses` onsets as evenly as possible across `steps` slots,
//! the spacing scheme behind rhythms like `(3,8)` = `x..x..x.` and
//! `(5,8)` = `x.xx.xx.`.

/// Compute the Euclidean onset pattern for `pulses` over `steps`.
pub fn bjorklund(pulses: usize, steps: usize) -> Vec<bool> {
    if steps == 0 {
        return Vec::new();
    }
    if pulses == 0 {
        return vec![false; steps];
    }
    if pulses >= steps {
        return vec![true; steps];
    }

    // Repeatedly pair the current groups with the remainder groups until
    // at most one remainder group is left, then flatten in order.
    let mut groups: Vec<Vec<bool>> = vec![vec![true]; pulses];
    let mut remainder: Vec<Vec<bool>> = vec![vec![false]; steps - pulses];

    while remainder.len() > 1 {
        let pairs = groups.len().min(remainder.len());
        let mut paired = Vec::with_capacity(pairs);
        for i in 0..pairs {
            let mut g = groups[i].clone();
            g.extend_from_slice(&remainder[i]);
            paired.push(g);
        }
        let leftover_groups: Vec<Vec<bool>> = groups.split_off(pairs);
        let leftover_remainder: Vec<Vec<bool>> = remainder.split_off(pairs);
        groups = paired;
        remainder = if leftover_groups.is_empty() {
            leftover_remainder
        } else {
            leftover_groups
        };
    }

    let mut out = Vec::with_capacity(steps);
    for g in groups.into_iter().chain(remainder) {
        out.extend(g);
    }
    out
}

/// Bjorklund pattern with signed arguments as they arrive from parsed
/// sub-patterns: a negative pulse count inverts the onsets, the rotation
/// shifts the pattern left and may be negative, and a non-positive step
/// count yields an empty grid.
pub fn bjorklund_rotated(pulses: i64, steps: i64, rotation: i64) -> Vec<bool> {
    if steps <= 0 {
        return Vec::new();
    }
    let k = steps as usize;
    let mut bits = if pulses < 0 {
        bjorklund((-pulses) as usize, k)
            .into_iter()
            .map(|b| !b)
            .collect()
    } else {
        bjorklund(pulses as usize, k)
    };
    let shift = rotation.rem_euclid(steps) as usize;
    bits.rotate_left(shift);
    bits
}
