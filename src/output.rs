use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::cli::OutputFormat;
use crate::report::SessionReport;
use crate::sampler::{SampleSet, Session};

/// Run `write` against the output file, or stdout when none is given.
pub fn with_output<F>(output_file: Option<&Path>, write: F) -> io::Result<()>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    match output_file {
        Some(path) => {
            let f = File::create(path)?;
            let mut out = BufWriter::new(f);
            write(&mut out)?;
            out.flush()
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            write(&mut out)?;
            out.flush()
        }
    }
}

/// Writes a finished session to stdout or a file in the specified format.
pub fn write_output(
    session: &Session,
    report: &SessionReport,
    format: &OutputFormat,
    output_file: Option<&Path>,
) -> io::Result<()> {
    with_output(output_file, |out| format_output(session, report, format, out))
}

fn format_output(
    session: &Session,
    report: &SessionReport,
    format: &OutputFormat,
    out: &mut dyn Write,
) -> io::Result<()> {
    match format {
        OutputFormat::Summary => report.write_summary(out)?,
        OutputFormat::Lines => {
            for set in [&session.hits, &session.misses] {
                write_lines(set, out)?;
            }
        }
        OutputFormat::Csv => {
            writeln!(out, "population,index,value")?;
            for set in [&session.hits, &session.misses] {
                write_csv_rows(set, out)?;
            }
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, session).map_err(io::Error::from)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

fn write_lines(set: &SampleSet, out: &mut dyn Write) -> io::Result<()> {
    let name = set.population().name();
    for v in set.as_slice() {
        writeln!(out, "{} {}", name, v)?;
    }
    Ok(())
}

fn write_csv_rows(set: &SampleSet, out: &mut dyn Write) -> io::Result<()> {
    let name = set.population().name();
    for (i, v) in set.as_slice().iter().enumerate() {
        writeln!(out, "{},{},{}", name, i, v)?;
    }
    Ok(())
}
