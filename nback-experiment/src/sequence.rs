use std::collections::TryReserveError;

use nback_core::Color;
use rand::Rng;

/// Builds a stimulus sequence with roughly a quarter of the trials as n-back
/// matches.
///
/// Every position is first filled uniformly from the first `cardinality`
/// palette colors. Then `trial_count / 4` positions in
/// `[n_back, trial_count)` are drawn (with repetition) and overwritten with
/// the color `n_back` places earlier. Natural matches from the first pass
/// are kept, so the density is approximate.
///
/// Callers validate `n_back >= 1` and `trial_count > n_back`.
pub fn generate<R: Rng + ?Sized>(
    rng: &mut R,
    n_back: usize,
    trial_count: usize,
    cardinality: usize,
) -> Result<Vec<Color>, TryReserveError> {
    let cardinality = cardinality.clamp(1, Color::PALETTE.len());

    let mut sequence = Vec::new();
    sequence.try_reserve_exact(trial_count)?;
    sequence.extend((0..trial_count).map(|_| Color::PALETTE[rng.random_range(0..cardinality)]));

    if n_back == 0 || trial_count <= n_back {
        return Ok(sequence);
    }

    for _ in 0..trial_count / 4 {
        let pos = rng.random_range(n_back..trial_count);
        sequence[pos] = sequence[pos - n_back];
    }

    Ok(sequence)
}

/// The one definition of a target trial, shared by generation checks and the
/// engine.
pub fn is_target(sequence: &[Color], index: usize, n_back: usize) -> bool {
    n_back > 0 && index >= n_back && index < sequence.len() && sequence[index] == sequence[index - n_back]
}

pub fn target_count(sequence: &[Color], n_back: usize) -> usize {
    (0..sequence.len())
        .filter(|&i| is_target(sequence, i, n_back))
        .count()
}

/// Palette indices separated by spaces, targets marked with `*`.
pub fn describe(sequence: &[Color], n_back: usize) -> String {
    sequence
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let mark = if is_target(sequence, i, n_back) { "*" } else { "" };
            format!("{}{}", c.index(), mark)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Result of laying a host-supplied color list over a sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomSequence {
    /// Positions overwritten from the list.
    pub applied: usize,
    /// Names that did not parse; each was replaced by red.
    pub unknown: Vec<String>,
}

/// Overwrites `sequence` from a comma-separated color list.
///
/// Unknown names become red. A short list leaves the tail untouched; extra
/// names are ignored.
pub fn apply_custom(sequence: &mut [Color], list: &str) -> CustomSequence {
    let mut report = CustomSequence::default();
    for (slot, name) in sequence.iter_mut().zip(list.split_terminator(',')) {
        *slot = name.parse().unwrap_or_else(|_| {
            report.unknown.push(name.trim().to_string());
            Color::Red
        });
        report.applied += 1;
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn generated_targets_match_their_n_back_position() {
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let n = 1 + (seed as usize % 3);
            let seq = generate(&mut rng, n, 30, Color::GENERATED).unwrap();
            assert_eq!(seq.len(), 30);
            for i in 0..seq.len() {
                if is_target(&seq, i, n) {
                    assert_eq!(seq[i], seq[i - n]);
                }
            }
            assert!(seq.iter().all(|c| c.index() < Color::GENERATED));
        }
    }

    #[test]
    fn target_density_is_near_a_quarter() {
        let mut total = 0;
        let runs = 200;
        for seed in 0..runs {
            let mut rng = StdRng::seed_from_u64(seed);
            let seq = generate(&mut rng, 2, 40, Color::GENERATED).unwrap();
            total += target_count(&seq, 2);
        }
        let mean = total as f64 / runs as f64;
        // 10 forced placements on top of ~1/4 natural matches lands near 15.5.
        assert!(mean > 12.0 && mean < 19.0, "mean targets {mean}");
    }

    #[test]
    fn same_seed_same_sequence() {
        let a = generate(&mut StdRng::seed_from_u64(7), 2, 20, 4).unwrap();
        let b = generate(&mut StdRng::seed_from_u64(7), 2, 20, 4).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn no_targets_before_n_back() {
        let seq = vec![Color::Red; 6];
        assert!(!is_target(&seq, 0, 2));
        assert!(!is_target(&seq, 1, 2));
        assert!(is_target(&seq, 2, 2));
        assert!(!is_target(&seq, 6, 2));
        assert_eq!(target_count(&seq, 2), 4);
    }

    #[test]
    fn describe_marks_targets() {
        let seq = [Color::Red, Color::Green, Color::Blue, Color::Red];
        assert_eq!(describe(&seq, 3), "0 1 2 0*");
    }

    #[test]
    fn custom_list_overlays_sequence() {
        let mut seq = vec![Color::Yellow; 5];
        let report = apply_custom(&mut seq, "red,GREEN,teal,blue,");
        assert_eq!(report.applied, 4);
        assert_eq!(report.unknown, vec!["teal".to_string()]);
        assert_eq!(
            seq,
            vec![Color::Red, Color::Green, Color::Red, Color::Blue, Color::Yellow]
        );

        let mut short = vec![Color::Blue; 2];
        let report = apply_custom(&mut short, "white,white,white");
        assert_eq!(report.applied, 2);
        assert_eq!(short, vec![Color::White, Color::White]);
    }
}
