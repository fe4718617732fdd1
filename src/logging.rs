use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::{Args, ValueEnum};
use log::{Level, LevelFilter, Log, Metadata, Record};

type SyslogLogger = syslog::Logger<syslog::LoggerBackend, syslog::Formatter3164>;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
        }
    }
}

#[derive(Debug, Args)]
pub struct LogArgs {
    /// Log level (default: warn)
    #[arg(long = "log-level", value_enum)]
    pub log_level: Option<LogLevel>,

    /// Append log messages to a file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Send log messages to syslog
    #[arg(long)]
    pub syslog: bool,
}

/// Where formatted records go. Stderr is always the first sink.
enum Sink {
    Stream(Mutex<Box<dyn Write + Send>>),
    Syslog(Mutex<SyslogLogger>),
}

impl Sink {
    fn stream<W: Write + Send + 'static>(w: W) -> Self {
        Sink::Stream(Mutex::new(Box::new(w)))
    }

    fn append_to(path: &Path) -> io::Result<Self> {
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Sink::stream(f))
    }

    /// Streams get the prefixed line; syslog carries its own header and
    /// gets the bare message at the matching severity.
    fn emit(&self, level: Level, line: &str, text: &str) {
        match self {
            Sink::Stream(w) => {
                if let Ok(mut w) = w.lock() {
                    let _ = writeln!(w, "{}", line);
                }
            }
            Sink::Syslog(l) => {
                if let Ok(mut l) = l.lock() {
                    let _ = match level {
                        Level::Error => l.err(text),
                        Level::Warn => l.warning(text),
                        Level::Info => l.info(text),
                        Level::Debug | Level::Trace => l.debug(text),
                    };
                }
            }
        }
    }

    fn flush(&self) {
        if let Sink::Stream(w) = self {
            if let Ok(mut w) = w.lock() {
                let _ = w.flush();
            }
        }
    }
}

struct CachetimerLogger {
    sinks: Vec<Sink>,
}

impl Log for CachetimerLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(record.target(), record.level(), record.args());
        let text = record.args().to_string();
        for sink in &self.sinks {
            sink.emit(record.level(), &line, &text);
        }
    }

    fn flush(&self) {
        self.sinks.iter().for_each(Sink::flush);
    }
}

/// Sinks for `args`. A log file or syslog that cannot be opened is reported
/// on stderr and left out.
fn open_sinks(args: &LogArgs) -> Vec<Sink> {
    let mut sinks = vec![Sink::stream(io::stderr())];

    if let Some(ref path) = args.log_file {
        match Sink::append_to(path) {
            Ok(sink) => sinks.push(sink),
            Err(e) => eprintln!(
                "{}",
                format_line(
                    "cachetimer",
                    Level::Warn,
                    &format_args!("cannot open log file {}: {}", path.display(), e)
                )
            ),
        }
    }

    if args.syslog {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_USER,
            hostname: None,
            process: "cachetimer".into(),
            pid: std::process::id(),
        };
        match syslog::unix(formatter) {
            Ok(l) => sinks.push(Sink::Syslog(Mutex::new(l))),
            Err(e) => eprintln!(
                "{}",
                format_line(
                    "cachetimer",
                    Level::Warn,
                    &format_args!("cannot connect to syslog: {}", e)
                )
            ),
        }
    }
    sinks
}

pub fn init(args: &LogArgs) {
    let level = args.log_level.unwrap_or(LogLevel::Warn);
    let logger = CachetimerLogger {
        sinks: open_sinks(args),
    };
    let _ = log::set_boxed_logger(Box::new(logger));
    log::set_max_level(level.to_level_filter());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_prefix_by_target() {
        assert_eq!(prefix("cachetimer::sampler"), "cachetimer");
        assert_eq!(prefix("cachetimer::counter"), "cachetimer counter");
        assert_eq!(prefix("cachetimer::clock::counter"), "cachetimer counter");
    }

    #[test]
    fn test_format_line() {
        let line = format_line("cachetimer::counter", Level::Debug, &format_args!("stopped"));
        assert_eq!(line, "[cachetimer counter] debug: stopped");
        let line = format_line("cachetimer", Level::Warn, &format_args!("{} hits", 3));
        assert_eq!(line, "[cachetimer] warning: 3 hits");
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_every_stream_sink_gets_the_line() {
        let a = Captured::default();
        let b = Captured::default();
        let logger = CachetimerLogger {
            sinks: vec![Sink::stream(a.clone()), Sink::stream(b.clone())],
        };
        logger.log(
            &Record::builder()
                .args(format_args!("thread started"))
                .level(Level::Info)
                .target("cachetimer::counter")
                .build(),
        );
        logger.flush();
        assert_eq!(a.text(), "[cachetimer counter] info: thread started\n");
        assert_eq!(a.text(), b.text());
    }

    #[test]
    fn test_log_file_appends() {
        let path = std::env::temp_dir().join("cachetimer_test_log_append.log");
        let _ = std::fs::remove_file(&path);
        for msg in ["first", "second"] {
            let sink = Sink::append_to(&path).unwrap();
            sink.emit(Level::Warn, msg, msg);
            sink.flush();
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_unopenable_log_file_is_skipped() {
        let args = LogArgs {
            log_level: None,
            log_file: Some(PathBuf::from("/nonexistent-dir/cachetimer.log")),
            syslog: false,
        };
        assert_eq!(open_sinks(&args).len(), 1);
    }

    #[test]
    fn test_level_filters() {
        assert_eq!(LogLevel::Error.to_level_filter(), LevelFilter::Error);
        assert_eq!(LogLevel::Debug.to_level_filter(), LevelFilter::Debug);
    }
}
