use crate::error::Error;

/// A sample entry that may be blank. Blank entries are skipped by every
/// aggregate instead of being counted as zero.
pub trait SampleValue {
    fn value(&self) -> Option<f64>;
}

impl SampleValue for u64 {
    fn value(&self) -> Option<f64> {
        Some(*self as f64)
    }
}

impl SampleValue for f64 {
    fn value(&self) -> Option<f64> {
        if self.is_nan() {
            None
        } else {
            Some(*self)
        }
    }
}

impl<T: SampleValue> SampleValue for Option<T> {
    fn value(&self) -> Option<f64> {
        self.as_ref().and_then(SampleValue::value)
    }
}

fn present<T: SampleValue>(samples: &[T]) -> Vec<f64> {
    samples.iter().filter_map(SampleValue::value).collect()
}

/// Arithmetic mean.
pub fn average<T: SampleValue>(samples: &[T]) -> Result<f64, Error> {
    let values = present(samples);
    if values.is_empty() {
        return Err(Error::EmptyPopulation("average"));
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance (divides by n). Zero when fewer than two values are present.
pub fn variance<T: SampleValue>(samples: &[T]) -> f64 {
    let values = present(samples);
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values
        .iter()
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum::<f64>()
        / n
}

pub fn std_dev<T: SampleValue>(samples: &[T]) -> f64 {
    variance(samples).sqrt()
}

/// Median of the ascending-sorted values. Even-length inputs average the two
/// central elements. The input slice is left untouched.
pub fn median<T: SampleValue>(samples: &[T]) -> Result<f64, Error> {
    let mut values = present(samples);
    if values.is_empty() {
        return Err(Error::EmptyPopulation("median"));
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Ok((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Ok(values[mid])
    }
}

/// Aggregates of one sample population.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub average: f64,
    pub variance: f64,
    pub std_dev: f64,
    pub median: f64,
    pub min: u64,
    pub max: u64,
}

pub fn summarize(samples: &[u64]) -> Result<Summary, Error> {
    let average = average(samples)?;
    let median = median(samples)?;
    let variance = variance(samples);
    Ok(Summary {
        count: samples.len(),
        average,
        variance,
        std_dev: variance.sqrt(),
        median,
        min: samples.iter().copied().min().unwrap_or(0),
        max: samples.iter().copied().max().unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average() {
        assert_eq!(average(&[1u64, 2, 3, 4, 5]).unwrap(), 3.0);
        assert_eq!(average(&[2.5f64]).unwrap(), 2.5);
    }

    #[test]
    fn test_average_empty_fails() {
        let empty: [u64; 0] = [];
        assert!(matches!(average(&empty), Err(Error::EmptyPopulation(_))));
        let blanks: [Option<u64>; 2] = [None, None];
        assert!(average(&blanks).is_err());
    }

    #[test]
    fn test_variance_degenerate() {
        let empty: [u64; 0] = [];
        assert_eq!(variance(&empty), 0.0);
        assert_eq!(variance(&[5u64]), 0.0);
    }

    #[test]
    fn test_variance_population() {
        assert_eq!(variance(&[2u64, 4, 4, 4, 5, 5, 7, 9]), 4.0);
        assert_eq!(std_dev(&[2u64, 4, 4, 4, 5, 5, 7, 9]), 2.0);
    }

    #[test]
    fn test_variance_skips_blanks() {
        let with_blanks = [
            Some(2u64),
            None,
            Some(4),
            Some(4),
            Some(4),
            None,
            Some(5),
            Some(5),
            Some(7),
            Some(9),
        ];
        assert_eq!(variance(&with_blanks), 4.0);
        assert_eq!(variance(&[Some(5u64), None]), 0.0);
        assert_eq!(variance(&[1.0f64, f64::NAN, 3.0]), 1.0);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[1u64, 2, 3]).unwrap(), 2.0);
        assert_eq!(median(&[1u64, 2, 3, 4]).unwrap(), 2.5);
        assert_eq!(median(&[9u64, 1, 5]).unwrap(), 5.0);
        assert_eq!(median(&[7u64]).unwrap(), 7.0);
    }

    #[test]
    fn test_median_does_not_reorder_input() {
        let samples = [3u64, 1, 2];
        median(&samples).unwrap();
        assert_eq!(samples, [3, 1, 2]);
    }

    #[test]
    fn test_median_empty_fails() {
        let empty: [u64; 0] = [];
        assert!(matches!(median(&empty), Err(Error::EmptyPopulation(_))));
    }

    #[test]
    fn test_summarize() {
        let s = summarize(&[2, 4, 4, 4, 5, 5, 7, 9]).unwrap();
        assert_eq!(s.count, 8);
        assert_eq!(s.average, 5.0);
        assert_eq!(s.variance, 4.0);
        assert_eq!(s.std_dev, 2.0);
        assert_eq!(s.median, 4.5);
        assert_eq!(s.min, 2);
        assert_eq!(s.max, 9);
        assert!(summarize(&[]).is_err());
    }
}
