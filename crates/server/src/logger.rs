//! Logger initialization for the server

use jiff::{Zoned, tz::TimeZone};
use logforth::{append::Stderr, filter::EnvFilter, layout::Layout};
use std::{fmt::Write, io::IsTerminal, str::FromStr, sync::Once};

static INIT: Once = Once::new();

/// One line per record: UTC timestamp, level and message.
#[derive(Debug)]
struct UtcLayout {
    colored: bool,
}

fn ansi_color(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "31",
        log::Level::Warn => "33",
        log::Level::Info => "32",
        log::Level::Debug => "34",
        log::Level::Trace => "35",
    }
}

impl Layout for UtcLayout {
    fn format(
        &self,
        record: &log::Record<'_>,
        _diagnostics: &[Box<dyn logforth::diagnostic::Diagnostic>],
    ) -> anyhow::Result<Vec<u8>> {
        let mut line = String::new();
        let now = Zoned::now().with_time_zone(TimeZone::UTC);

        write!(line, "{} ", now.strftime("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = record.level();

        if self.colored {
            write!(line, "\x1b[{}m{level:>5}\x1b[0m", ansi_color(level))?;
        } else {
            write!(line, "{level:>5}")?;
        }

        write!(line, "  {}", record.args())?;

        Ok(line.into_bytes())
    }
}

/// Initialize the stderr logger once per process.
///
/// The filter is a string like `info` or `server=debug,llm=debug`. Invalid filters fall
/// back to `info`.
pub fn init(log_filter: &str) {
    let log_filter = log_filter.to_owned();
    INIT.call_once(move || apply_logger(&log_filter));
}

fn apply_logger(log_filter: &str) {
    let filter = EnvFilter::from_str(log_filter).unwrap_or_else(|_| {
        eprintln!("Invalid log filter '{log_filter}', using 'info'");
        EnvFilter::from_str("info").expect("default filter should be valid")
    });

    let layout = UtcLayout {
        colored: std::io::stderr().is_terminal(),
    };

    logforth::builder()
        .dispatch(move |d| d.filter(filter).append(Stderr::default().with_layout(layout)))
        .apply();
}
