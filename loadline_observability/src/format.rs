use std::fmt;

use nu_ansi_term::Color;
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

const TIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[month]-[day]|[hour]:[minute]:[second].[subsecond digits:3]");

/// Compact console format: `[LEVEL] [MM-DD|HH:MM:SS.mmm] span: message key=value`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleFormat;

impl<S, N> FormatEvent<S, N> for ConsoleFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let ansi = writer.has_ansi_escapes();
        write!(writer, "{} ", FmtLevel::new(event.metadata().level(), ansi))?;

        match OffsetDateTime::now_utc().format(TIME_FORMAT) {
            Ok(now) => write!(writer, "[{now}] ")?,
            Err(_) => write!(writer, "[<unknown-timestamp>] ")?,
        }

        if let Some(scope) = ctx.event_scope() {
            let names = scope
                .from_root()
                .map(|span| span.name())
                .collect::<Vec<_>>()
                .join(":");
            if ansi {
                write!(writer, "{}: ", Color::DarkGray.paint(names))?;
            } else {
                write!(writer, "{names}: ")?;
            }
        }

        ctx.format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

struct FmtLevel<'a> {
    level: &'a Level,
    ansi: bool,
}

impl<'a> FmtLevel<'a> {
    fn new(level: &'a Level, ansi: bool) -> Self {
        Self { level, ansi }
    }
}

impl fmt::Display for FmtLevel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (name, color) = match *self.level {
            Level::TRACE => ("TRACE", Color::Purple),
            Level::DEBUG => ("DEBUG", Color::Blue),
            Level::INFO => ("INFO", Color::Green),
            Level::WARN => ("WARN", Color::Yellow),
            Level::ERROR => ("ERROR", Color::Red),
        };

        if self.ansi {
            write!(f, "[{}]", color.paint(name))
        } else {
            write!(f, "[{name}]")
        }
    }
}
