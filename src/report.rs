use std::io::{self, Write};

use crate::classify::{self, Polarity, ThresholdChoice};
use crate::config::ClockKind;
use crate::error::Error;
use crate::sampler::Session;
use crate::stats::{self, Summary};

/// Whether the medians are ordered the way a working clock would order them:
/// hits faster than misses.
pub fn separation_observed(hit_median: f64, miss_median: f64, polarity: Polarity) -> bool {
    match polarity {
        Polarity::Direct => hit_median < miss_median,
        Polarity::Inverted => hit_median > miss_median,
    }
}

fn percent(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}

fn write_summary_header(out: &mut dyn Write) -> io::Result<()> {
    writeln!(
        out,
        "{:<12} {:>8} {:>12} {:>12} {:>12} {:>10} {:>10}",
        "Population", "Count", "Average", "Std dev", "Median", "Min", "Max"
    )
}

fn write_summary_row(out: &mut dyn Write, name: &str, s: &Summary) -> io::Result<()> {
    writeln!(
        out,
        "{:<12} {:>8} {:>12.2} {:>12.2} {:>12.1} {:>10} {:>10}",
        name, s.count, s.average, s.std_dev, s.median, s.min, s.max
    )
}

fn write_threshold(out: &mut dyn Write, label: &str, t: &ThresholdChoice) -> io::Result<()> {
    writeln!(
        out,
        "{}: {}  false hits {}  false misses {}  error {}",
        label,
        t.threshold,
        percent(t.false_hit_rate),
        percent(t.false_miss_rate),
        percent(t.error_rate)
    )
}

/// Aggregates and classifier results of one hit/miss session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub clock: ClockKind,
    pub polarity: Polarity,
    pub hits: Summary,
    pub misses: Summary,
    pub threshold: ThresholdChoice,
    pub fixed_threshold: Option<ThresholdChoice>,
    pub by_repetitions: Option<Vec<(usize, f64)>>,
    pub separated: bool,
}

impl SessionReport {
    /// Summarize `session`. With `error_reps`, also compute the error rate
    /// for averaging up to that many measurements per decision; with
    /// `fixed_threshold`, the rates of that threshold next to the best one.
    pub fn build(
        session: &Session,
        error_reps: Option<usize>,
        fixed_threshold: Option<u64>,
    ) -> Result<Self, Error> {
        let polarity = Polarity::from(session.clock);
        let hits = stats::summarize(session.hits.as_slice())?;
        let misses = stats::summarize(session.misses.as_slice())?;
        let threshold = classify::best_threshold(
            session.hits.as_slice(),
            session.misses.as_slice(),
            polarity,
        )?;
        let fixed_threshold = match fixed_threshold {
            Some(t) => Some(classify::evaluate_threshold(
                session.hits.as_slice(),
                session.misses.as_slice(),
                t,
                polarity,
            )?),
            None => None,
        };
        let by_repetitions = match error_reps {
            Some(max) => Some(classify::error_rate_by_repetitions(
                session.hits.as_slice(),
                session.misses.as_slice(),
                polarity,
                max,
            )?),
            None => None,
        };
        let separated = separation_observed(hits.median, misses.median, polarity);

        Ok(Self {
            clock: session.clock,
            polarity,
            hits,
            misses,
            threshold,
            fixed_threshold,
            by_repetitions,
            separated,
        })
    }

    pub fn write_summary(&self, out: &mut dyn Write) -> io::Result<()> {
        let direction = match self.polarity {
            Polarity::Direct => "larger is slower",
            Polarity::Inverted => "smaller is slower",
        };
        writeln!(out, "Clock: {} ({})", self.clock.name(), direction)?;
        writeln!(out)?;
        write_summary_header(out)?;
        write_summary_row(out, "hit", &self.hits)?;
        write_summary_row(out, "miss", &self.misses)?;
        writeln!(out)?;

        write_threshold(out, "Best threshold", &self.threshold)?;
        if let Some(ref fixed) = self.fixed_threshold {
            write_threshold(out, "Given threshold", fixed)?;
        }
        if !self.separated {
            writeln!(out, "Warning: hit and miss medians are not separated")?;
        }

        if let Some(ref rates) = self.by_repetitions {
            writeln!(out)?;
            writeln!(out, "Error rate by repetitions:")?;
            writeln!(out, "{:>6} {:>10}", "Reps", "Error")?;
            for &(k, rate) in rates {
                writeln!(out, "{:>6} {:>10}", k, percent(rate))?;
            }
        }
        Ok(())
    }
}

/// Increments counted over full coarse-clock periods.
#[derive(Debug, Clone)]
pub struct DistributionReport {
    pub coarse: String,
    pub resolution_ns: u64,
    pub samples: Vec<u64>,
    pub summary: Summary,
}

impl DistributionReport {
    pub fn build(coarse: String, resolution_ns: u64, samples: Vec<u64>) -> Result<Self, Error> {
        let summary = stats::summarize(&samples)?;
        Ok(Self {
            coarse,
            resolution_ns,
            samples,
            summary,
        })
    }

    /// Approximate duration of one increment, in nanoseconds.
    pub fn ns_per_increment(&self) -> Option<f64> {
        if self.summary.average > 0.0 && self.resolution_ns > 0 {
            Some(self.resolution_ns as f64 / self.summary.average)
        } else {
            None
        }
    }

    pub fn write_summary(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "Coarse clock: {}", self.coarse)?;
        writeln!(out)?;
        write_summary_header(out)?;
        write_summary_row(out, "period", &self.summary)?;
        if let Some(ns) = self.ns_per_increment() {
            writeln!(out)?;
            writeln!(out, "Resolution: ~{:.3} ns per increment", ns)?;
        }
        Ok(())
    }

    pub fn write_lines(&self, out: &mut dyn Write) -> io::Result<()> {
        for v in &self.samples {
            writeln!(out, "{}", v)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{Population, SampleSet};

    fn session(clock: ClockKind, hits: &[u64], misses: &[u64]) -> Session {
        let mut h = SampleSet::with_capacity(Population::Hit, hits.len());
        for &v in hits {
            h.push(v);
        }
        let mut m = SampleSet::with_capacity(Population::Miss, misses.len());
        for &v in misses {
            m.push(v);
        }
        Session {
            clock,
            hits: h,
            misses: m,
        }
    }

    fn render(report: &SessionReport) -> String {
        let mut buf = Vec::new();
        report.write_summary(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_separation_by_polarity() {
        assert!(separation_observed(10.0, 20.0, Polarity::Direct));
        assert!(!separation_observed(20.0, 10.0, Polarity::Direct));
        assert!(separation_observed(20.0, 10.0, Polarity::Inverted));
        assert!(!separation_observed(10.0, 10.0, Polarity::Inverted));
    }

    #[test]
    fn test_counter_session_report() {
        let s = session(ClockKind::SharedCounter, &[10, 11, 12], &[20, 21, 22]);
        let report = SessionReport::build(&s, None, None).unwrap();
        assert_eq!(report.polarity, Polarity::Direct);
        assert_eq!(report.hits.median, 11.0);
        assert_eq!(report.misses.median, 21.0);
        assert_eq!(report.threshold.error_rate, 0.0);
        assert!(report.separated);
        assert!(report.by_repetitions.is_none());

        let text = render(&report);
        assert!(text.starts_with("Clock: shared-counter (larger is slower)"));
        assert!(text.contains("Best threshold: 12"));
        assert!(!text.contains("Warning"));
        assert!(!text.contains("Error rate by repetitions"));
    }

    #[test]
    fn test_interpolation_session_report() {
        // Interpolation counts shrink as accesses slow down
        let s = session(ClockKind::Interpolation, &[40, 41, 42, 43], &[5, 6, 7, 8]);
        let report = SessionReport::build(&s, Some(50), None).unwrap();
        assert_eq!(report.polarity, Polarity::Inverted);
        assert!(report.separated);
        assert_eq!(report.threshold.error_rate, 0.0);
        assert_eq!(report.by_repetitions.as_ref().unwrap().len(), 3);

        let text = render(&report);
        assert!(text.contains("smaller is slower"));
        assert!(text.contains("Error rate by repetitions:"));
    }

    #[test]
    fn test_given_threshold_reported() {
        let s = session(ClockKind::SharedCounter, &[10, 11, 12], &[20, 21, 22]);
        let report = SessionReport::build(&s, None, Some(21)).unwrap();
        let fixed = report.fixed_threshold.as_ref().unwrap();
        assert_eq!(fixed.threshold, 21);
        assert_eq!(fixed.false_hit_rate, 1.0 / 3.0);
        assert_eq!(fixed.false_miss_rate, 0.0);
        assert!(render(&report).contains("Given threshold: 21"));
        assert!(SessionReport::build(&s, None, None)
            .unwrap()
            .fixed_threshold
            .is_none());
    }

    #[test]
    fn test_unseparated_session_warns() {
        let s = session(ClockKind::SharedCounter, &[30, 31], &[5, 6]);
        let report = SessionReport::build(&s, None, None).unwrap();
        assert!(!report.separated);
        assert!(render(&report).contains("Warning: hit and miss medians are not separated"));
    }

    #[test]
    fn test_empty_session_fails() {
        let s = session(ClockKind::SharedCounter, &[], &[1]);
        assert!(matches!(
            SessionReport::build(&s, None, None),
            Err(Error::EmptyPopulation(_))
        ));
    }

    #[test]
    fn test_distribution_report() {
        let report = DistributionReport::build("test clock".into(), 1000, vec![8, 8, 12, 12]).unwrap();
        assert_eq!(report.summary.average, 10.0);
        assert_eq!(report.summary.median, 10.0);
        assert_eq!(report.summary.std_dev, 2.0);
        assert_eq!(report.ns_per_increment(), Some(100.0));

        let mut buf = Vec::new();
        report.write_summary(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Coarse clock: test clock"));
        assert!(text.contains("100.000 ns per increment"));

        let mut buf = Vec::new();
        report.write_lines(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "8\n8\n12\n12\n");
    }

    #[test]
    fn test_distribution_report_empty_fails() {
        assert!(DistributionReport::build("x".into(), 1, vec![]).is_err());
    }
}
