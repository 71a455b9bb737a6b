//! INI configuration source
//!
//! Two stages: [`IniDocument::parse`] reads sections and options, then
//! [`to_config`] interprets the `[loggers]`/`[handlers]`/`[formatters]`
//! layout into a [`LoggingConfig`].

use super::args::{parse_dict, parse_tuple, ArgValue};
use super::{FormatterSpec, HandlerSpec, LoggerSpec, LoggingConfig, SinkSpec, ROOT_LOGGER};
use crate::appenders::{ConsoleStream, FileMode};
use crate::core::error::{LoggerError, Result};
use crate::core::formatter::TimeZoneMode;
use crate::core::log_level::LogLevel;
use std::path::PathBuf;

#[derive(Debug)]
struct Entry {
    key: String,
    value: String,
}

#[derive(Debug)]
struct Section {
    name: String,
    entries: Vec<Entry>,
}

impl Section {
    fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.value.as_str())
    }
}

/// Sections and options of an INI text, in document order
#[derive(Debug, Default)]
pub(crate) struct IniDocument {
    sections: Vec<Section>,
}

impl IniDocument {
    pub(crate) fn parse(text: &str) -> Result<Self> {
        let mut doc = IniDocument::default();
        // Continuations are only legal directly after an option line
        let mut continuing = false;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim_end_matches('\r');
            let trimmed = line.trim();

            if trimmed.is_empty() {
                continuing = false;
                continue;
            }
            if trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            if line.starts_with([' ', '\t']) && continuing {
                if let Some(entry) = doc.sections.last_mut().and_then(|s| s.entries.last_mut()) {
                    entry.value.push('\n');
                    entry.value.push_str(trimmed);
                }
                continue;
            }

            if let Some(header) = trimmed.strip_prefix('[') {
                let name = header
                    .strip_suffix(']')
                    .ok_or_else(|| {
                        LoggerError::syntax(line_no, "unterminated section header")
                    })?
                    .trim();
                if name.is_empty() {
                    return Err(LoggerError::syntax(line_no, "empty section name"));
                }
                if doc.section(name).is_some() {
                    return Err(LoggerError::syntax(
                        line_no,
                        format!("duplicate section [{}]", name),
                    ));
                }
                doc.sections.push(Section {
                    name: name.to_string(),
                    entries: Vec::new(),
                });
                continuing = false;
                continue;
            }

            let split = trimmed.find(['=', ':']).ok_or_else(|| {
                LoggerError::syntax(
                    line_no,
                    format!("expected 'key=value', found '{}'", trimmed),
                )
            })?;
            let key = trimmed[..split].trim().to_lowercase();
            let value = trimmed[split + 1..].trim().to_string();
            if key.is_empty() {
                return Err(LoggerError::syntax(line_no, "option without a name"));
            }

            let section = doc
                .sections
                .last_mut()
                .ok_or_else(|| {
                    LoggerError::syntax(line_no, "option outside of any section")
                })?;
            if section.get(&key).is_some() {
                return Err(LoggerError::syntax(
                    line_no,
                    format!("duplicate option '{}' in section [{}]", key, section.name),
                ));
            }
            section.entries.push(Entry { key, value });
            continuing = true;
        }

        Ok(doc)
    }

    fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.name == name)
    }

    /// Keys listed by an index section such as `[handlers] keys=a,b`
    fn index_keys(&self, index: &str) -> Result<Vec<String>> {
        let section = self.section(index).ok_or_else(|| {
            LoggerError::config(index, format!("missing index section [{}]", index))
        })?;
        let keys = section
            .get("keys")
            .ok_or_else(|| {
                LoggerError::config(index, "index section has no 'keys' option")
            })?;
        let keys = split_list(keys);
        for (i, key) in keys.iter().enumerate() {
            if keys[..i].contains(key) {
                return Err(LoggerError::config(
                    index,
                    format!("key '{}' listed twice", key),
                ));
            }
        }
        Ok(keys)
    }

    fn keyed_section(&self, prefix: &str, key: &str) -> Result<&Section> {
        let name = format!("{}_{}", prefix, key);
        self.section(&name).ok_or_else(|| {
            LoggerError::config(
                format!("{} '{}'", prefix, key),
                format!("listed but section [{}] is missing", name),
            )
        })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

/// Parse a level option; `NOTSET` means "no own level"
fn parse_level(component: &str, value: &str) -> Result<Option<LogLevel>> {
    if value.trim().eq_ignore_ascii_case("NOTSET") {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|e: String| LoggerError::config(component, e))
}

/// Interpret an INI document as a logging configuration
pub(crate) fn to_config(doc: &IniDocument) -> Result<LoggingConfig> {
    let mut config = LoggingConfig::default();

    for key in doc.index_keys("formatters")? {
        let section = doc.keyed_section("formatter", &key)?;
        config.formatters.push(formatter_spec(&key, section)?);
    }
    for key in doc.index_keys("handlers")? {
        let section = doc.keyed_section("handler", &key)?;
        config.handlers.push(handler_spec(&key, section)?);
    }
    for key in doc.index_keys("loggers")? {
        let section = doc.keyed_section("logger", &key)?;
        config.loggers.push(logger_spec(&key, section)?);
    }

    Ok(config)
}

fn formatter_spec(key: &str, section: &Section) -> Result<FormatterSpec> {
    let component = format!("formatter '{}'", key);

    if let Some(style) = section.get("style") {
        if style != "%" {
            return Err(LoggerError::config(
                component.as_str(),
                format!(
                    "unsupported style '{}', only '%' layouts are recognized",
                    style
                ),
            ));
        }
    }
    if let Some(class) = section.get("class") {
        if !matches!(class, "Formatter" | "logging.Formatter") {
            return Err(LoggerError::config(
                component.as_str(),
                format!("unknown formatter class '{}'", class),
            ));
        }
    }

    let timezone = match section.get("timezone") {
        Some(value) => value
            .parse::<TimeZoneMode>()
            .map_err(|e| LoggerError::config(component.as_str(), e))?,
        None => TimeZoneMode::default(),
    };

    Ok(FormatterSpec {
        name: key.to_string(),
        format: section.get("format").map(String::from),
        datefmt: section.get("datefmt").map(String::from),
        timezone,
    })
}

fn logger_spec(key: &str, section: &Section) -> Result<LoggerSpec> {
    let component = format!("logger '{}'", key);
    let is_root = key == ROOT_LOGGER;

    let name = if is_root {
        ROOT_LOGGER.to_string()
    } else {
        let qualname = section.get("qualname").unwrap_or(key).trim();
        if qualname.is_empty() {
            return Err(LoggerError::config(
                component.as_str(),
                "qualname must not be empty",
            ));
        }
        if qualname == ROOT_LOGGER {
            return Err(LoggerError::config(
                component.as_str(),
                "qualname 'root' is reserved for the root logger",
            ));
        }
        qualname.to_string()
    };

    let level = match section.get("level") {
        // NOTSET on the root lets every record through
        Some(value) if is_root => {
            Some(parse_level(&component, value)?.unwrap_or(LogLevel::Debug))
        }
        Some(value) => parse_level(&component, value)?,
        None => None,
    };

    let propagate = match section.get("propagate") {
        None => true,
        Some(value) => match value.trim().parse::<i64>() {
            Ok(flag) => flag != 0,
            Err(_) => {
                return Err(LoggerError::config(
                    component.as_str(),
                    format!("propagate must be 0 or 1, found '{}'", value),
                ))
            }
        },
    };

    let parent = section
        .get("parent")
        .map(str::trim)
        .filter(|parent| !parent.is_empty())
        .map(String::from);

    Ok(LoggerSpec {
        name,
        level,
        handlers: section.get("handlers").map(split_list).unwrap_or_default(),
        propagate,
        parent,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandlerClass {
    Stream,
    RotatingFile,
    File,
}

impl HandlerClass {
    fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "StreamHandler" | "logging.StreamHandler" => Some(HandlerClass::Stream),
            "RotatingFileHandler"
            | "handlers.RotatingFileHandler"
            | "logging.handlers.RotatingFileHandler" => Some(HandlerClass::RotatingFile),
            "FileHandler" | "logging.FileHandler" => Some(HandlerClass::File),
            _ => None,
        }
    }

    fn parameters(self) -> &'static [&'static str] {
        match self {
            HandlerClass::Stream => &["stream"],
            HandlerClass::RotatingFile => &[
                "filename",
                "mode",
                "maxBytes",
                "backupCount",
                "encoding",
                "delay",
            ],
            HandlerClass::File => &["filename", "mode", "encoding", "delay"],
        }
    }
}

/// Positional and keyword arguments bound to parameter names
struct BoundArgs<'a> {
    component: &'a str,
    values: Vec<(&'static str, ArgValue)>,
}

impl<'a> BoundArgs<'a> {
    fn bind(component: &'a str, class: HandlerClass, args: &str, kwargs: &str) -> Result<Self> {
        let positional = parse_tuple(args).map_err(|e| {
            LoggerError::config(component, format!("invalid args {}: {}", args, e))
        })?;
        let keyword = parse_dict(kwargs).map_err(|e| {
            LoggerError::config(component, format!("invalid kwargs {}: {}", kwargs, e))
        })?;

        let parameters = class.parameters();
        if positional.len() > parameters.len() {
            return Err(LoggerError::config(
                component,
                format!(
                    "expected at most {} arguments, found {}",
                    parameters.len(),
                    positional.len()
                ),
            ));
        }

        let mut values: Vec<(&'static str, ArgValue)> =
            parameters.iter().copied().zip(positional).collect();
        for (name, value) in keyword {
            let parameter = parameters
                .iter()
                .copied()
                .find(|p| *p == name)
                .ok_or_else(|| {
                    LoggerError::config(
                        component,
                        format!("unexpected keyword argument '{}'", name),
                    )
                })?;
            if values.iter().any(|(bound, _)| *bound == parameter) {
                return Err(LoggerError::config(
                    component,
                    format!("argument '{}' given twice", name),
                ));
            }
            values.push((parameter, value));
        }

        Ok(Self { component, values })
    }

    fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values
            .iter()
            .find(|(bound, _)| *bound == name)
            .map(|(_, value)| value)
    }

    fn string(&self, name: &str) -> Result<Option<&str>> {
        match self.get(name) {
            None | Some(ArgValue::None) => Ok(None),
            Some(ArgValue::Str(s)) => Ok(Some(s)),
            Some(other) => Err(LoggerError::config(
                self.component,
                format!("{} must be a string, found {}", name, other),
            )),
        }
    }

    fn non_negative(&self, name: &str) -> Result<u64> {
        match self.get(name) {
            None => Ok(0),
            Some(ArgValue::Int(n)) if *n >= 0 => Ok(*n as u64),
            Some(other) => Err(LoggerError::config(
                self.component,
                format!("{} must be a non-negative integer, found {}", name, other),
            )),
        }
    }

    fn flag(&self, name: &str) -> Result<bool> {
        match self.get(name) {
            None => Ok(false),
            Some(ArgValue::Bool(b)) => Ok(*b),
            Some(ArgValue::Int(n @ (0 | 1))) => Ok(*n == 1),
            Some(other) => Err(LoggerError::config(
                self.component,
                format!("{} must be True or False, found {}", name, other),
            )),
        }
    }
}

fn handler_spec(key: &str, section: &Section) -> Result<HandlerSpec> {
    let component = format!("handler '{}'", key);

    let class_name = section
        .get("class")
        .ok_or_else(|| {
            LoggerError::config(component.as_str(), "missing 'class' option")
        })?;
    let class = HandlerClass::from_name(class_name).ok_or_else(|| {
        LoggerError::config(
            component.as_str(),
            format!("unknown handler class '{}'", class_name),
        )
    })?;

    let level = match section.get("level") {
        Some(value) => parse_level(&component, value)?,
        None => None,
    };

    let args = BoundArgs::bind(
        &component,
        class,
        section.get("args").unwrap_or("()"),
        section.get("kwargs").unwrap_or("{}"),
    )?;

    let sink = match class {
        HandlerClass::Stream => {
            let stream = match args.get("stream") {
                None | Some(ArgValue::None) => ConsoleStream::default(),
                Some(ArgValue::Ident(reference)) => ConsoleStream::from_reference(reference)
                    .ok_or_else(|| {
                        LoggerError::config(
                            component.as_str(),
                            format!(
                                "unknown stream '{}', expected sys.stderr or sys.stdout",
                                reference
                            ),
                        )
                    })?,
                Some(other) => {
                    return Err(LoggerError::config(
                        component.as_str(),
                        format!("stream must be sys.stderr or sys.stdout, found {}", other),
                    ))
                }
            };
            SinkSpec::Console { stream }
        }
        HandlerClass::RotatingFile | HandlerClass::File => {
            let filename = args.string("filename")?.ok_or_else(|| {
                LoggerError::config(component.as_str(), "missing filename argument")
            })?;
            let mode = match args.string("mode")? {
                None => FileMode::default(),
                Some(mode) => FileMode::from_mode_str(mode).ok_or_else(|| {
                    LoggerError::config(
                        component.as_str(),
                        format!("unsupported file mode '{}', expected 'w' or 'a'", mode),
                    )
                })?,
            };
            if let Some(encoding) = args.string("encoding")? {
                if !matches!(encoding.to_lowercase().as_str(), "utf-8" | "utf8") {
                    return Err(LoggerError::config(
                        component.as_str(),
                        format!("unsupported encoding '{}', only UTF-8 is written", encoding),
                    ));
                }
            }
            let max_bytes = args.non_negative("maxBytes")?;
            let backup_count = usize::try_from(args.non_negative("backupCount")?)
                .map_err(|_| {
                    LoggerError::config(component.as_str(), "backupCount is too large")
                })?;

            SinkSpec::RotatingFile {
                filename: PathBuf::from(filename),
                mode,
                max_bytes,
                backup_count,
                delay: args.flag("delay")?,
            }
        }
    };

    Ok(HandlerSpec {
        name: key.to_string(),
        level,
        formatter: section
            .get("formatter")
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from),
        sink,
    })
}
