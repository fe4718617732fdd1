use std::collections::BTreeSet;

use crate::config::ClockKind;
use crate::error::Error;
use crate::stats::SampleValue;

/// Which side of a threshold counts as a hit.
///
/// Counter deltas grow with latency, interpolation counts shrink with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Larger samples mean slower accesses.
    Direct,
    /// Smaller samples mean slower accesses.
    Inverted,
}

impl From<ClockKind> for Polarity {
    fn from(kind: ClockKind) -> Self {
        match kind {
            ClockKind::SharedCounter => Polarity::Direct,
            ClockKind::Interpolation => Polarity::Inverted,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdChoice {
    pub threshold: u64,
    pub false_hit_rate: f64,
    pub false_miss_rate: f64,
    pub error_rate: f64,
}

fn sorted<T: SampleValue>(samples: &[T], what: &'static str) -> Result<Vec<f64>, Error> {
    let mut values: Vec<f64> = samples.iter().filter_map(SampleValue::value).collect();
    if values.is_empty() {
        return Err(Error::EmptyPopulation(what));
    }
    values.sort_by(f64::total_cmp);
    Ok(values)
}

fn count_below(sorted: &[f64], t: f64) -> usize {
    sorted.partition_point(|&v| v < t)
}

fn count_above(sorted: &[f64], t: f64) -> usize {
    sorted.len() - sorted.partition_point(|&v| v <= t)
}

fn misses_taken_for_hits(misses: &[f64], t: u64, polarity: Polarity) -> f64 {
    let n = match polarity {
        Polarity::Direct => count_below(misses, t as f64),
        Polarity::Inverted => count_above(misses, t as f64),
    };
    n as f64 / misses.len() as f64
}

fn hits_taken_for_misses(hits: &[f64], t: u64, polarity: Polarity) -> f64 {
    let n = match polarity {
        Polarity::Direct => count_above(hits, t as f64),
        Polarity::Inverted => count_below(hits, t as f64),
    };
    n as f64 / hits.len() as f64
}

/// Fraction of misses that `threshold` classifies as hits.
pub fn false_hit_rate<T: SampleValue>(
    misses: &[T],
    threshold: u64,
    polarity: Polarity,
) -> Result<f64, Error> {
    let misses = sorted(misses, "false hit rate")?;
    Ok(misses_taken_for_hits(&misses, threshold, polarity))
}

/// Fraction of hits that `threshold` classifies as misses.
pub fn false_miss_rate<T: SampleValue>(
    hits: &[T],
    threshold: u64,
    polarity: Polarity,
) -> Result<f64, Error> {
    let hits = sorted(hits, "false miss rate")?;
    Ok(hits_taken_for_misses(&hits, threshold, polarity))
}

/// Mean of the false hit and false miss rates.
pub fn error_rate<T: SampleValue>(
    hits: &[T],
    misses: &[T],
    threshold: u64,
    polarity: Polarity,
) -> Result<f64, Error> {
    Ok((false_hit_rate(misses, threshold, polarity)? + false_miss_rate(hits, threshold, polarity)?)
        / 2.0)
}

/// Rates of a caller-chosen threshold.
pub fn evaluate_threshold<T: SampleValue>(
    hits: &[T],
    misses: &[T],
    threshold: u64,
    polarity: Polarity,
) -> Result<ThresholdChoice, Error> {
    Ok(ThresholdChoice {
        threshold,
        false_hit_rate: false_hit_rate(misses, threshold, polarity)?,
        false_miss_rate: false_miss_rate(hits, threshold, polarity)?,
        error_rate: error_rate(hits, misses, threshold, polarity)?,
    })
}

/// Integer threshold in `0..max(sample)` with the lowest error rate. Ties go
/// to the lowest threshold.
///
/// The error rate only changes where a threshold crosses a sample, so only
/// those points (and 0) are evaluated.
pub fn best_threshold<T: SampleValue>(
    hits: &[T],
    misses: &[T],
    polarity: Polarity,
) -> Result<ThresholdChoice, Error> {
    let hits = sorted(hits, "best threshold")?;
    let misses = sorted(misses, "best threshold")?;

    let max = hits[hits.len() - 1].max(misses[misses.len() - 1]).floor() as u64;
    let mut candidates = BTreeSet::new();
    candidates.insert(0u64);
    for &v in hits.iter().chain(misses.iter()) {
        let floor = v.floor() as u64;
        candidates.insert(floor);
        candidates.insert(floor + 1);
        candidates.insert(v.ceil() as u64);
    }

    let mut best: Option<ThresholdChoice> = None;
    for t in candidates.into_iter().filter(|&t| t == 0 || t < max) {
        let fh = misses_taken_for_hits(&misses, t, polarity);
        let fm = hits_taken_for_misses(&hits, t, polarity);
        let rate = (fh + fm) / 2.0;
        if best.as_ref().map_or(true, |b| rate < b.error_rate) {
            best = Some(ThresholdChoice {
                threshold: t,
                false_hit_rate: fh,
                false_miss_rate: fm,
                error_rate: rate,
            });
        }
    }

    best.ok_or(Error::EmptyPopulation("best threshold"))
}

/// Means of consecutive groups of `k` samples; the last group may be short.
pub fn grouped_means(samples: &[u64], k: usize) -> Vec<f64> {
    samples
        .chunks(k.max(1))
        .map(|c| c.iter().map(|&v| v as f64).sum::<f64>() / c.len() as f64)
        .collect()
}

/// Best achievable error rate when every decision averages `k` measurements,
/// for `k` in `1..min(len(hits), len(misses), max_reps)`.
pub fn error_rate_by_repetitions(
    hits: &[u64],
    misses: &[u64],
    polarity: Polarity,
    max_reps: usize,
) -> Result<Vec<(usize, f64)>, Error> {
    if hits.is_empty() || misses.is_empty() {
        return Err(Error::EmptyPopulation("error rate by repetitions"));
    }
    let upper = hits.len().min(misses.len()).min(max_reps);
    let mut rates = Vec::with_capacity(upper.saturating_sub(1));
    for k in 1..upper {
        let choice = best_threshold(&grouped_means(hits, k), &grouped_means(misses, k), polarity)?;
        rates.push((k, choice.error_rate));
    }
    Ok(rates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha20Rng;
    use rand_core::{RngCore, SeedableRng};

    fn brute_force_best(hits: &[u64], misses: &[u64], polarity: Polarity) -> f64 {
        let max = *hits.iter().chain(misses).max().unwrap();
        (0..max.max(1))
            .map(|t| error_rate(hits, misses, t, polarity).unwrap())
            .fold(f64::INFINITY, f64::min)
    }

    #[test]
    fn test_polarity_from_clock() {
        assert_eq!(Polarity::from(ClockKind::SharedCounter), Polarity::Direct);
        assert_eq!(Polarity::from(ClockKind::Interpolation), Polarity::Inverted);
    }

    #[test]
    fn test_direct_rates() {
        let hits = [10u64, 11, 12];
        let misses = [20u64, 21, 22];
        assert_eq!(error_rate(&hits, &misses, 15, Polarity::Direct).unwrap(), 0.0);
        assert_eq!(false_miss_rate(&hits, 11, Polarity::Direct).unwrap(), 1.0 / 3.0);
        assert_eq!(false_hit_rate(&misses, 11, Polarity::Direct).unwrap(), 0.0);
        assert_eq!(false_hit_rate(&misses, 22, Polarity::Direct).unwrap(), 2.0 / 3.0);
    }

    #[test]
    fn test_inverted_rates() {
        // Interpolation: hits leave more of the tick, so they count higher
        let hits = [30u64, 31];
        let misses = [5u64, 6];
        assert_eq!(error_rate(&hits, &misses, 10, Polarity::Inverted).unwrap(), 0.0);
        assert_eq!(false_hit_rate(&misses, 5, Polarity::Inverted).unwrap(), 0.5);
        assert_eq!(false_miss_rate(&hits, 31, Polarity::Inverted).unwrap(), 0.5);
        // The same threshold is maximally wrong for the other polarity
        assert_eq!(error_rate(&hits, &misses, 10, Polarity::Direct).unwrap(), 1.0);
    }

    #[test]
    fn test_evaluate_threshold() {
        let choice =
            evaluate_threshold(&[1u64, 2, 3, 4], &[3u64, 4, 5, 6], 4, Polarity::Direct).unwrap();
        assert_eq!(choice.threshold, 4);
        assert_eq!(choice.false_hit_rate, 0.25);
        assert_eq!(choice.false_miss_rate, 0.0);
        assert_eq!(choice.error_rate, 0.125);
        let best = best_threshold(&[1u64, 2, 3, 4], &[3u64, 4, 5, 6], Polarity::Direct).unwrap();
        let same = evaluate_threshold(&[1u64, 2, 3, 4], &[3u64, 4, 5, 6], best.threshold, Polarity::Direct)
            .unwrap();
        assert_eq!(best, same);
    }

    #[test]
    fn test_best_threshold_separated() {
        let choice = best_threshold(&[10u64, 11, 12], &[20u64, 21, 22], Polarity::Direct).unwrap();
        assert_eq!(choice.threshold, 12);
        assert_eq!(choice.error_rate, 0.0);
    }

    #[test]
    fn test_best_threshold_overlapping() {
        let choice =
            best_threshold(&[1u64, 2, 3, 4], &[3u64, 4, 5, 6], Polarity::Direct).unwrap();
        assert_eq!(choice.threshold, 3);
        assert_eq!(choice.error_rate, 0.125);
    }

    #[test]
    fn test_best_threshold_matches_full_scan() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        for polarity in [Polarity::Direct, Polarity::Inverted] {
            for _ in 0..20 {
                let hits: Vec<u64> = (0..40).map(|_| (rng.next_u32() % 60) as u64).collect();
                let misses: Vec<u64> =
                    (0..40).map(|_| 20 + (rng.next_u32() % 60) as u64).collect();
                let choice = best_threshold(&hits, &misses, polarity).unwrap();
                let expected = brute_force_best(&hits, &misses, polarity);
                assert_eq!(choice.error_rate, expected);
            }
        }
    }

    #[test]
    fn test_empty_populations_fail() {
        let empty: [u64; 0] = [];
        assert!(matches!(
            false_hit_rate(&empty, 1, Polarity::Direct),
            Err(Error::EmptyPopulation(_))
        ));
        assert!(best_threshold(&[1u64], &empty, Polarity::Direct).is_err());
        assert!(error_rate_by_repetitions(&empty, &[1], Polarity::Direct, 50).is_err());
    }

    #[test]
    fn test_grouped_means() {
        assert_eq!(grouped_means(&[1, 2, 3, 4, 5], 2), vec![1.5, 3.5, 5.0]);
        assert_eq!(grouped_means(&[4, 8], 1), vec![4.0, 8.0]);
        assert_eq!(grouped_means(&[4, 8], 0), vec![4.0, 8.0]);
    }

    #[test]
    fn test_error_rate_by_repetitions_range() {
        let hits: Vec<u64> = (0..10).collect();
        let misses: Vec<u64> = (5..15).collect();
        let rates = error_rate_by_repetitions(&hits, &misses, Polarity::Direct, 50).unwrap();
        assert_eq!(rates.len(), 9);
        assert_eq!(rates[0].0, 1);
        assert!(rates.iter().all(|&(_, r)| (0.0..=1.0).contains(&r)));

        let capped = error_rate_by_repetitions(&hits, &misses, Polarity::Direct, 5).unwrap();
        assert_eq!(capped.len(), 4);
    }

    #[test]
    fn test_averaging_reduces_error() {
        // Alternating noise: single samples overlap, pairs separate cleanly
        let hits = [0u64, 10, 0, 10, 0, 10, 0, 10];
        let misses = [6u64, 16, 6, 16, 6, 16, 6, 16];
        let rates = error_rate_by_repetitions(&hits, &misses, Polarity::Direct, 50).unwrap();
        assert!(rates[0].1 > 0.0);
        assert_eq!(rates[1].1, 0.0);
    }
}
