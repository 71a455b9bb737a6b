//! Record formatting
//!
//! A [`Formatter`] turns a [`LogRecord`] into one line of text using a
//! `%(field)s` layout and a strftime `datefmt` for the `asctime` field.
//!
//! # Examples
//!
//! ```
//! use logging_registry::core::{Callsite, Formatter, LogLevel, LogRecord, TimeZoneMode};
//!
//! let formatter = Formatter::new(
//!     "brief",
//!     Some("%(levelname)s | %(funcName)s | %(message)s"),
//!     None,
//!     TimeZoneMode::Utc,
//! )
//! .unwrap();
//!
//! let record = LogRecord::new(
//!     "partitioning",
//!     LogLevel::Warning,
//!     "split skewed",
//!     Callsite::new("src/split.rs", 10, Some("split")),
//! );
//! assert_eq!(formatter.format(&record), "WARNING | split | split skewed");
//! ```

use super::error::{LoggerError, Result};
use super::log_record::LogRecord;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Layout used when a formatter declares no `format`
pub const DEFAULT_FORMAT: &str = "%(message)s";

/// `asctime` layout used when a formatter declares no `datefmt`
const DEFAULT_DATEFMT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Timezone in which `asctime` is rendered
///
/// `Local` resolves the host zone (the `TZ` variable, else the system
/// setting) so that `%Z` renders an abbreviation such as `CEST`. If no named
/// zone can be resolved and the host is not on UTC, `%Z` renders the local
/// offset numerically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeZoneMode {
    #[default]
    Local,
    Utc,
}

impl std::str::FromStr for TimeZoneMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "localtime" => Ok(TimeZoneMode::Local),
            "utc" | "gmt" | "gmtime" => Ok(TimeZoneMode::Utc),
            other => Err(format!("unknown timezone mode '{}'", other)),
        }
    }
}

/// Named zone of the host, if one can be determined
///
/// A host without any zone setting runs on UTC.
fn local_zone() -> Option<Tz> {
    match std::env::var("TZ") {
        // A POSIX rule string is left to chrono's own local time handling
        Ok(tz) if !tz.trim().is_empty() => tz.trim().trim_start_matches(':').parse().ok(),
        _ => iana_time_zone::get_timezone()
            .ok()
            .and_then(|name| name.parse().ok())
            .or_else(|| {
                let offset = Local::now().offset().local_minus_utc();
                (offset == 0).then_some(chrono_tz::UTC)
            }),
    }
}

fn render_time<Z>(timestamp: &DateTime<Utc>, zone: &Z, datefmt: &str) -> String
where
    Z: TimeZone,
    Z::Offset: std::fmt::Display,
{
    timestamp.with_timezone(zone).format(datefmt).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Name,
    LevelName,
    LevelNo,
    Pathname,
    Filename,
    Module,
    Lineno,
    FuncName,
    Process,
    Thread,
    ThreadName,
    Created,
    Msecs,
    Asctime,
    Message,
}

impl Field {
    fn parse(key: &str) -> Option<Self> {
        Some(match key {
            "name" => Field::Name,
            "levelname" => Field::LevelName,
            "levelno" => Field::LevelNo,
            "pathname" => Field::Pathname,
            "filename" => Field::Filename,
            "module" => Field::Module,
            "lineno" => Field::Lineno,
            "funcName" => Field::FuncName,
            "process" => Field::Process,
            "thread" => Field::Thread,
            "threadName" => Field::ThreadName,
            "created" => Field::Created,
            "msecs" => Field::Msecs,
            "asctime" => Field::Asctime,
            "message" => Field::Message,
            _ => return None,
        })
    }

    fn key(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::LevelName => "levelname",
            Field::LevelNo => "levelno",
            Field::Pathname => "pathname",
            Field::Filename => "filename",
            Field::Module => "module",
            Field::Lineno => "lineno",
            Field::FuncName => "funcName",
            Field::Process => "process",
            Field::Thread => "thread",
            Field::ThreadName => "threadName",
            Field::Created => "created",
            Field::Msecs => "msecs",
            Field::Asctime => "asctime",
            Field::Message => "message",
        }
    }

    fn is_numeric(self) -> bool {
        matches!(
            self,
            Field::LevelNo
                | Field::Lineno
                | Field::Process
                | Field::Thread
                | Field::Created
                | Field::Msecs
        )
    }
}

enum Value<'a> {
    Str(Cow<'a, str>),
    Int(i64),
    Float(f64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Placeholder {
    field: Field,
    left_align: bool,
    zero_pad: bool,
    width: Option<usize>,
    precision: Option<usize>,
    conversion: char,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Placeholder),
}

/// Named, immutable record template
#[derive(Debug, Clone)]
pub struct Formatter {
    name: String,
    format: String,
    datefmt: Option<String>,
    timezone: TimeZoneMode,
    /// Host zone resolved at construction for `TimeZoneMode::Local`
    zone: Option<Tz>,
    segments: Vec<Segment>,
}

impl Formatter {
    /// Compile a formatter
    ///
    /// # Errors
    ///
    /// Returns a formatter error if the layout is malformed, names an unknown
    /// field, applies a numeric conversion to a text field, or if `datefmt`
    /// contains an invalid strftime specifier.
    pub fn new(
        name: impl Into<String>,
        format: Option<&str>,
        datefmt: Option<&str>,
        timezone: TimeZoneMode,
    ) -> Result<Self> {
        let name = name.into();
        let format = format.unwrap_or(DEFAULT_FORMAT).to_string();
        let segments = parse_layout(&format).map_err(|msg| LoggerError::formatter(&name, msg))?;

        if let Some(datefmt) = datefmt {
            if StrftimeItems::new(datefmt).any(|item| matches!(item, Item::Error)) {
                return Err(LoggerError::formatter(
                    &name,
                    format!("invalid datefmt '{}'", datefmt),
                ));
            }
        }

        let zone = match timezone {
            TimeZoneMode::Local => local_zone(),
            TimeZoneMode::Utc => None,
        };

        Ok(Self {
            name,
            format,
            datefmt: datefmt.map(String::from),
            timezone,
            zone,
            segments,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format_string(&self) -> &str {
        &self.format
    }

    pub fn datefmt(&self) -> Option<&str> {
        self.datefmt.as_deref()
    }

    pub fn timezone(&self) -> TimeZoneMode {
        self.timezone
    }

    /// True if the layout references `asctime`
    pub fn uses_time(&self) -> bool {
        self.segments
            .iter()
            .any(|s| {
                matches!(s, Segment::Field(p) if p.field == Field::Asctime)
            })
    }

    /// Render the record timestamp with this formatter's `datefmt` and timezone
    pub fn format_time(&self, record: &LogRecord) -> String {
        let datefmt = self.datefmt.as_deref().unwrap_or(DEFAULT_DATEFMT);
        match (self.timezone, self.zone) {
            (TimeZoneMode::Utc, _) => record.timestamp.format(datefmt).to_string(),
            (TimeZoneMode::Local, Some(zone)) => render_time(&record.timestamp, &zone, datefmt),
            (TimeZoneMode::Local, None) => render_time(&record.timestamp, &Local, datefmt),
        }
    }

    /// Render a record as a single line (without trailing newline)
    pub fn format(&self, record: &LogRecord) -> String {
        let mut out = String::with_capacity(self.format.len() + record.message.len() + 64);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(placeholder) => {
                    let value = self.value_of(placeholder.field, record);
                    render_placeholder(&mut out, placeholder, value);
                }
            }
        }
        out
    }

    fn value_of<'a>(&self, field: Field, record: &'a LogRecord) -> Value<'a> {
        match field {
            Field::Name => Value::Str(Cow::Borrowed(&record.logger)),
            Field::LevelName => Value::Str(Cow::Borrowed(record.level.to_str())),
            Field::LevelNo => Value::Int(i64::from(record.level.levelno())),
            Field::Pathname => Value::Str(Cow::Borrowed(&record.pathname)),
            Field::Filename => Value::Str(Cow::Borrowed(record.filename())),
            Field::Module => Value::Str(Cow::Borrowed(record.module())),
            Field::Lineno => Value::Int(i64::from(record.line)),
            Field::FuncName => Value::Str(Cow::Borrowed(record.function_name())),
            Field::Process => Value::Int(i64::from(record.process_id)),
            Field::Thread => Value::Int(record.thread_id as i64),
            Field::ThreadName => Value::Str(Cow::Owned(record.thread_label())),
            Field::Created => Value::Float(record.timestamp.timestamp_micros() as f64 / 1e6),
            Field::Msecs => Value::Int(i64::from(record.timestamp.timestamp_subsec_millis())),
            Field::Asctime => Value::Str(Cow::Owned(self.format_time(record))),
            Field::Message => Value::Str(Cow::Borrowed(&record.message)),
        }
    }

    /// Match a rendered line against the layout and recover each field's text
    ///
    /// Every field must be followed by a literal delimiter (or end the layout);
    /// the field extends to the first occurrence of that delimiter. Padding
    /// added by a width is trimmed. Returns `None` if the line does not match
    /// or if two fields are adjacent.
    pub fn parse_line(&self, line: &str) -> Option<BTreeMap<&'static str, String>> {
        let mut fields = BTreeMap::new();
        let mut rest = line;
        let mut iter = self.segments.iter().peekable();

        while let Some(segment) = iter.next() {
            match segment {
                Segment::Literal(text) => {
                    rest = rest.strip_prefix(text.as_str())?;
                }
                Segment::Field(placeholder) => {
                    let (value, remainder) = match iter.peek() {
                        None => (rest, ""),
                        Some(Segment::Literal(delim)) => {
                            let end = rest.find(delim.as_str())?;
                            (&rest[..end], &rest[end..])
                        }
                        Some(Segment::Field(_)) => return None,
                    };
                    let value = if placeholder.width.is_some() {
                        value.trim()
                    } else {
                        value
                    };
                    fields.insert(placeholder.field.key(), value.to_string());
                    rest = remainder;
                }
            }
        }

        rest.is_empty().then_some(fields)
    }
}

fn parse_layout(format: &str) -> std::result::Result<Vec<Segment>, String> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = format.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        if c != '%' {
            literal.push(c);
            continue;
        }
        match chars.next() {
            Some((_, '%')) => literal.push('%'),
            Some((_, '(')) => {
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some((_, ')')) => break,
                        Some((_, ch)) => key.push(ch),
                        None => return Err(format!("unterminated placeholder at offset {}", pos)),
                    }
                }
                let field = Field::parse(&key).ok_or_else(|| format!("unknown field '{}'", key))?;

                let mut placeholder = Placeholder {
                    field,
                    left_align: false,
                    zero_pad: false,
                    width: None,
                    precision: None,
                    conversion: 's',
                };
                while let Some(&(_, flag)) = chars.peek() {
                    match flag {
                        '-' => placeholder.left_align = true,
                        '0' => placeholder.zero_pad = true,
                        _ => break,
                    }
                    chars.next();
                }
                placeholder.width = take_number(&mut chars);
                if matches!(chars.peek(), Some((_, '.'))) {
                    chars.next();
                    placeholder.precision = Some(take_number(&mut chars).unwrap_or(0));
                }
                placeholder.conversion = match chars.next() {
                    Some((_, conv @ ('s' | 'r' | 'd' | 'i' | 'f'))) => conv,
                    Some((_, other)) => {
                        return Err(format!("unsupported conversion '{}' for '{}'", other, key))
                    }
                    None => return Err(format!("missing conversion for '{}'", key)),
                };
                if matches!(placeholder.conversion, 'd' | 'i' | 'f') && !field.is_numeric() {
                    return Err(format!(
                        "numeric conversion '{}' applied to text field '{}'",
                        placeholder.conversion, key
                    ));
                }

                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Field(placeholder));
            }
            _ => return Err(format!("stray '%' at offset {}", pos)),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn take_number(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
) -> Option<usize> {
    let mut digits = String::new();
    while let Some(&(_, d)) = chars.peek() {
        if !d.is_ascii_digit() {
            break;
        }
        digits.push(d);
        chars.next();
    }
    digits.parse().ok()
}

fn render_placeholder(out: &mut String, placeholder: &Placeholder, value: Value<'_>) {
    let text: Cow<'_, str> = match (placeholder.conversion, value) {
        ('d' | 'i', Value::Int(n)) => Cow::Owned(n.to_string()),
        ('d' | 'i', Value::Float(f)) => Cow::Owned((f.trunc() as i64).to_string()),
        ('f', Value::Int(n)) => {
            Cow::Owned(format!(
                "{:.*}",
                placeholder.precision.unwrap_or(6),
                n as f64
            ))
        }
        ('f', Value::Float(f)) => {
            Cow::Owned(format!("{:.*}", placeholder.precision.unwrap_or(6), f))
        }
        (_, Value::Int(n)) => Cow::Owned(n.to_string()),
        (_, Value::Float(f)) => Cow::Owned(f.to_string()),
        (_, Value::Str(s)) => match placeholder.precision {
            Some(max) => Cow::Owned(s.chars().take(max).collect()),
            None => s,
        },
    };

    let len = text.chars().count();
    let pad = placeholder.width.map_or(0, |w| w.saturating_sub(len));
    if pad == 0 {
        out.push_str(&text);
    } else if placeholder.left_align {
        out.push_str(&text);
        out.extend(std::iter::repeat_n(' ', pad));
    } else {
        let fill = if placeholder.zero_pad && placeholder.conversion != 's' { '0' } else { ' ' };
        out.extend(std::iter::repeat_n(fill, pad));
        out.push_str(&text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::log_level::LogLevel;
    use crate::core::log_record::Callsite;
    use chrono::{DateTime, TimeZone, Utc};

    const VERBOSE: &str = "%(levelname)s | %(filename)s:%(lineno)d | %(funcName)s | \
                           %(process)d:%(thread)d | %(asctime)s | %(message)s";
    const DATEFMT: &str = "%d/%m/%y %H:%M:%S %Z";

    fn fixed_datetime() -> DateTime<Utc> {
        // 2025-01-08 10:30:45.123456 UTC
        Utc.with_ymd_and_hms(2025, 1, 8, 10, 30, 45)
            .single()
            .expect("valid datetime")
            + chrono::Duration::microseconds(123456)
    }

    fn record(level: LogLevel, message: &str) -> LogRecord {
        LogRecord::new(
            "preprocessing",
            level,
            message,
            Callsite::new("src/stages/load.rs", 88, Some("load_rows")),
        )
        .with_timestamp(fixed_datetime())
    }

    #[test]
    fn test_verbose_layout() {
        let formatter =
            Formatter::new("verbose", Some(VERBOSE), Some(DATEFMT), TimeZoneMode::Utc).unwrap();
        let rec = record(LogLevel::Debug, "parsed row 42");
        let line = formatter.format(&rec);
        assert_eq!(
            line,
            format!(
                "DEBUG | load.rs:88 | load_rows | {}:{} | 08/01/25 10:30:45 UTC | parsed row 42",
                rec.process_id, rec.thread_id
            )
        );
    }

    #[test]
    fn test_default_layout_and_datefmt() {
        let formatter = Formatter::new("plain", None, None, TimeZoneMode::Utc).unwrap();
        let rec = record(LogLevel::Info, "hello");
        assert_eq!(formatter.format(&rec), "hello");
        assert_eq!(formatter.format_time(&rec), "2025-01-08 10:30:45,123");
        assert!(!formatter.uses_time());
    }

    #[test]
    fn test_width_and_alignment() {
        let formatter = Formatter::new(
            "aligned",
            Some("[%(levelname)-8s] %(lineno)5d %(msecs)03d %(name).3s"),
            None,
            TimeZoneMode::Utc,
        )
        .unwrap();
        let line = formatter.format(&record(LogLevel::Info, "x"));
        assert_eq!(line, "[INFO    ]    88 123 pre");
    }

    #[test]
    fn test_numeric_fields() {
        let formatter = Formatter::new(
            "numbers",
            Some("%(levelno)d %(created).3f %%"),
            None,
            TimeZoneMode::Utc,
        )
        .unwrap();
        let line = formatter.format(&record(LogLevel::Error, "x"));
        assert_eq!(
            line,
            format!("40 {:.3} %", fixed_datetime().timestamp_micros() as f64 / 1e6)
        );
    }

    #[test]
    fn test_rejects_unknown_field() {
        let err = Formatter::new(
            "bad",
            Some("%(lvl)s %(message)s"),
            None,
            TimeZoneMode::Local,
        )
        .unwrap_err();
        assert!(matches!(err, LoggerError::FormatterError { .. }));
        assert!(err.to_string().contains("unknown field 'lvl'"));
    }

    #[test]
    fn test_rejects_malformed_layouts() {
        for layout in ["%(message", "%(message)", "%(message)q", "100% done", "%(levelname)d"] {
            assert!(
                Formatter::new("bad", Some(layout), None, TimeZoneMode::Local).is_err(),
                "layout {:?} should be rejected",
                layout
            );
        }
    }

    #[test]
    fn test_rejects_invalid_datefmt() {
        assert!(
            Formatter::new("bad", None, Some("%Y-%Q"), TimeZoneMode::Local).is_err()
        );
    }

    #[test]
    fn test_parse_line_round_trip() {
        let formatter =
            Formatter::new("verbose", Some(VERBOSE), Some(DATEFMT), TimeZoneMode::Utc).unwrap();
        let rec = record(LogLevel::Warning, "value | with | pipes");
        let parsed = formatter.parse_line(&formatter.format(&rec)).unwrap();

        assert_eq!(parsed["levelname"], "WARNING");
        assert_eq!(parsed["funcName"], "load_rows");
        assert_eq!(parsed["filename"], "load.rs");
        assert_eq!(parsed["lineno"], "88");
        assert_eq!(parsed["asctime"], "08/01/25 10:30:45 UTC");
        assert_eq!(parsed["message"], "value | with | pipes");
    }

    #[test]
    fn test_parse_line_rejects_mismatch() {
        let formatter = Formatter::new(
            "brief",
            Some("%(levelname)s | %(message)s"),
            None,
            TimeZoneMode::Utc,
        )
        .unwrap();
        assert!(formatter.parse_line("no delimiter here").is_none());

        let adjacent = Formatter::new(
            "adjacent",
            Some("%(levelname)s%(message)s"),
            None,
            TimeZoneMode::Utc,
        )
        .unwrap();
        assert!(adjacent.parse_line("INFOhello").is_none());
    }

    #[test]
    fn test_named_zone_renders_abbreviation() {
        let mut formatter = Formatter::new(
            "brief",
            Some("%(asctime)s"),
            Some(DATEFMT),
            TimeZoneMode::Local,
        )
        .unwrap();
        formatter.zone = Some(chrono_tz::Europe::Berlin);

        // Winter and summer time
        let rec = record(LogLevel::Info, "x");
        assert_eq!(formatter.format(&rec), "08/01/25 11:30:45 CET");

        let summer = Utc
            .with_ymd_and_hms(2025, 7, 8, 10, 30, 45)
            .single()
            .expect("valid datetime");
        let rec = record(LogLevel::Info, "x").with_timestamp(summer);
        assert_eq!(formatter.format(&rec), "08/07/25 12:30:45 CEST");
    }

    #[test]
    fn test_resolved_local_zone_renders_abbreviation() {
        let formatter = Formatter::new(
            "brief",
            Some("%(asctime)s"),
            Some("%Z"),
            TimeZoneMode::Local,
        )
        .unwrap();
        if formatter.zone.is_some() {
            let tz = formatter.format(&record(LogLevel::Info, "x"));
            assert!(!tz.contains(':'), "zone rendered as an offset: {:?}", tz);
        }
    }

    #[test]
    fn test_utc_mode_ignores_host_zone() {
        let formatter =
            Formatter::new("utc", Some("%(asctime)s"), Some("%Z"), TimeZoneMode::Utc).unwrap();
        assert!(formatter.zone.is_none());
        assert_eq!(formatter.format(&record(LogLevel::Info, "x")), "UTC");
    }

    #[test]
    fn test_timezone_mode_parse() {
        assert_eq!("UTC".parse::<TimeZoneMode>(), Ok(TimeZoneMode::Utc));
        assert_eq!("local".parse::<TimeZoneMode>(), Ok(TimeZoneMode::Local));
        assert!("mars".parse::<TimeZoneMode>().is_err());
    }
}
