//! Log records forwarded by workers.
//!
//! Workers ship records produced by a `%`-style logging library. The
//! argument list may arrive either as an array (a tuple flattened by the
//! transport) or as an object of named arguments; both are accepted.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const LEVEL_DEBUG: u32 = 10;
pub const LEVEL_INFO: u32 = 20;
pub const LEVEL_WARNING: u32 = 30;
pub const LEVEL_ERROR: u32 = 40;
pub const LEVEL_CRITICAL: u32 = 50;

/// Largest precision honoured in a conversion; anything above stays literal.
const MAX_PRECISION: usize = 1024;

/// Numeric level for a level name, case-insensitive.
pub fn level_from_name(name: &str) -> Option<u32> {
    match name.to_ascii_uppercase().as_str() {
        "NOTSET" => Some(0),
        "DEBUG" => Some(LEVEL_DEBUG),
        "INFO" => Some(LEVEL_INFO),
        "WARN" | "WARNING" => Some(LEVEL_WARNING),
        "ERROR" => Some(LEVEL_ERROR),
        "FATAL" | "CRITICAL" => Some(LEVEL_CRITICAL),
        other => other.parse().ok(),
    }
}

/// Arguments interpolated into [`LogRecord::msg`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogArgs {
    Positional(Vec<Value>),
    Named(Map<String, Value>),
    None(()),
}

impl Default for LogArgs {
    fn default() -> Self {
        Self::Positional(Vec::new())
    }
}

impl LogArgs {
    fn is_empty(&self) -> bool {
        match self {
            Self::Positional(args) => args.is_empty(),
            Self::Named(args) => args.is_empty(),
            Self::None(()) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(default = "default_logger_name")]
    pub name: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub args: LogArgs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levelno: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levelname: Option<String>,
    #[serde(default)]
    pub pathname: String,
    #[serde(default)]
    pub lineno: u32,
    /// Creation time as seconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<f64>,
}

fn default_logger_name() -> String {
    "root".to_string()
}

impl LogRecord {
    /// Numeric level, derived from the name when the number is missing.
    pub fn level(&self) -> u32 {
        self.levelno
            .or_else(|| self.levelname.as_deref().and_then(level_from_name))
            .unwrap_or(0)
    }

    pub fn level_name(&self) -> String {
        if let Some(name) = &self.levelname {
            return name.clone();
        }
        match self.level() {
            LEVEL_CRITICAL.. => "CRITICAL",
            LEVEL_ERROR.. => "ERROR",
            LEVEL_WARNING.. => "WARNING",
            LEVEL_INFO.. => "INFO",
            LEVEL_DEBUG.. => "DEBUG",
            _ => "NOTSET",
        }
        .to_string()
    }

    /// The message with its arguments interpolated.
    pub fn message(&self) -> String {
        if self.args.is_empty() {
            return self.msg.clone();
        }
        interpolate(&self.msg, &self.args)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created
            .and_then(|secs| {
                #[allow(clippy::cast_possible_truncation)]
                let millis = (secs * 1000.0) as i64;
                Utc.timestamp_millis_opt(millis).single()
            })
            .unwrap_or_else(Utc::now)
    }

    /// One line of a per-test log file:
    /// `<time> [<L>] [<logger>] <message> (<path>:<line>)`.
    pub fn format_line(&self) -> String {
        let initial = self.level_name().chars().next().unwrap_or('?');
        format!(
            "{} [{}] [{}] {} ({}:{})",
            self.created_at().format("%Y-%m-%d %H:%M:%S,%3f"),
            initial,
            self.name,
            self.message(),
            self.pathname,
            self.lineno
        )
    }
}

/// `%`-style interpolation. Conversions without a matching argument are
/// left as literal text.
fn interpolate(msg: &str, args: &LogArgs) -> String {
    let mut out = String::with_capacity(msg.len());
    let empty: &[Value] = &[];
    let mut positional = match args {
        LogArgs::Positional(values) => values.iter(),
        _ => empty.iter(),
    };
    let mut chars = msg.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut key = None;
        if let Some(&(_, '(')) = chars.peek() {
            chars.next();
            let mut name = String::new();
            for (_, nc) in chars.by_ref() {
                if nc == ')' {
                    break;
                }
                name.push(nc);
            }
            key = Some(name);
        }

        let mut precision: Option<usize> = None;
        let mut in_precision = false;
        let mut precision_too_large = false;
        let mut conversion = None;
        for (_, nc) in chars.by_ref() {
            match nc {
                '-' | '+' | ' ' | '#' => {}
                '.' => {
                    in_precision = true;
                    precision = Some(0);
                }
                '0'..='9' => {
                    if in_precision {
                        let digit = nc.to_digit(10).unwrap_or(0) as usize;
                        precision = precision
                            .unwrap_or(0)
                            .checked_mul(10)
                            .and_then(|p| p.checked_add(digit))
                            .filter(|&p| p <= MAX_PRECISION);
                        precision_too_large |= precision.is_none();
                    }
                }
                _ => {
                    conversion = Some(nc);
                    break;
                }
            }
        }

        let end = chars.peek().map_or(msg.len(), |&(i, _)| i);
        let literal = &msg[start..end];

        let Some(conversion) = conversion.filter(|_| !precision_too_large) else {
            out.push_str(literal);
            continue;
        };
        if conversion == '%' && key.is_none() {
            out.push('%');
            continue;
        }

        let value = match (&key, args) {
            (Some(name), LogArgs::Named(map)) => map.get(name),
            (None, LogArgs::Positional(_)) => positional.next(),
            _ => None,
        };
        match value {
            Some(value) => out.push_str(&convert(value, conversion, precision)),
            None => out.push_str(literal),
        }
    }

    out
}

fn convert(value: &Value, conversion: char, precision: Option<usize>) -> String {
    match conversion {
        'd' | 'i' | 'u' => match value {
            Value::Number(n) => n
                .as_i64()
                .map(|i| i.to_string())
                .or_else(|| {
                    #[allow(clippy::cast_possible_truncation)]
                    n.as_f64().map(|f| (f.trunc() as i64).to_string())
                })
                .unwrap_or_else(|| n.to_string()),
            other => display(other),
        },
        'f' | 'F' => match value.as_f64() {
            Some(f) => format!("{:.*}", precision.unwrap_or(6), f),
            None => display(value),
        },
        'e' | 'E' => match value.as_f64() {
            Some(f) => {
                let formatted = scientific(f, precision.unwrap_or(6));
                if conversion == 'E' {
                    formatted.to_uppercase()
                } else {
                    formatted
                }
            }
            None => display(value),
        },
        'g' | 'G' => match value.as_f64() {
            Some(f) => {
                let formatted = general(f, precision.unwrap_or(6));
                if conversion == 'G' {
                    formatted.to_uppercase()
                } else {
                    formatted
                }
            }
            None => display(value),
        },
        'r' => match value {
            Value::String(s) => format!("'{s}'"),
            other => display(other),
        },
        _ => display(value),
    }
}

/// `1.5e0` becomes `1.5e+00`: signed exponent, at least two digits.
fn scientific(f: f64, precision: usize) -> String {
    let formatted = format!("{f:.precision$e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = exponent
                .strip_prefix('-')
                .map_or(('+', exponent), |digits| ('-', digits));
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => formatted,
    }
}

/// Shortest of fixed and scientific notation with trailing zeros removed.
fn general(f: f64, precision: usize) -> String {
    if !f.is_finite() {
        return f.to_string();
    }
    let precision = precision.max(1);
    let mantissa_digits = precision - 1;
    let exponent = format!("{f:.mantissa_digits$e}")
        .split_once('e')
        .and_then(|(_, e)| e.parse::<i64>().ok())
        .unwrap_or(0);
    let limit = i64::try_from(precision).unwrap_or(i64::MAX);
    if (-4..limit).contains(&exponent) {
        let decimals = usize::try_from(limit - 1 - exponent).unwrap_or(0);
        trim_zeros(&format!("{f:.decimals$}")).to_string()
    } else {
        let formatted = scientific(f, precision - 1);
        match formatted.split_once('e') {
            Some((mantissa, exponent)) => format!("{}e{exponent}", trim_zeros(mantissa)),
            None => formatted,
        }
    }
}

fn trim_zeros(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(msg: &str, args: Value) -> LogRecord {
        serde_json::from_value(json!({
            "name": "iqe.tests",
            "msg": msg,
            "args": args,
            "levelname": "INFO",
            "levelno": 20,
            "pathname": "tests/test_x.py",
            "lineno": 42,
            "created": 1_700_000_000.5
        }))
        .unwrap()
    }

    #[test]
    fn test_array_args_are_positional() {
        let r = record("%s took %d seconds (%.2f%%)", json!(["login", 3, 12.346]));
        assert_eq!(r.message(), "login took 3 seconds (12.35%)");
    }

    #[test]
    fn test_named_args() {
        let r = record("user %(name)s has %(count)d items", json!({"name": "bob", "count": 2}));
        assert_eq!(r.message(), "user bob has 2 items");
    }

    #[test]
    fn test_no_args_leaves_message_untouched() {
        let r = record("100% done", json!([]));
        assert_eq!(r.message(), "100% done");
        let r = record("100% done", Value::Null);
        assert_eq!(r.message(), "100% done");
    }

    #[test]
    fn test_missing_args_degrade_to_literal() {
        let r = record("%s and %s", json!(["one"]));
        assert_eq!(r.message(), "one and %s");
    }

    #[test]
    fn test_repr_conversion_quotes_strings() {
        let r = record("got %r", json!(["x"]));
        assert_eq!(r.message(), "got 'x'");
    }

    #[test]
    fn test_oversized_precision_stays_literal() {
        let r = record("took %.99999999999999999999f s", json!([1.5]));
        assert_eq!(r.message(), "took %.99999999999999999999f s");

        let r = record("took %.200000000f s", json!([1.5]));
        assert_eq!(r.message(), "took %.200000000f s");

        let r = record("took %.3f s", json!([1.5]));
        assert_eq!(r.message(), "took 1.500 s");
    }

    #[test]
    fn test_scientific_and_general_conversions() {
        let r = record("%e|%.2e|%E", json!([1.5, 12345.678, 0.00012]));
        assert_eq!(r.message(), "1.500000e+00|1.23e+04|1.200000E-04");

        let r = record("%g|%g|%g|%g|%.3g", json!([1.5, 100000, 1_234_567.0, 0.0001, 0.00001234]));
        assert_eq!(r.message(), "1.5|100000|1.23457e+06|0.0001|1.23e-05");
    }

    #[test]
    fn test_levels() {
        assert_eq!(level_from_name("debug"), Some(LEVEL_DEBUG));
        assert_eq!(level_from_name("WARNING"), Some(LEVEL_WARNING));
        assert_eq!(level_from_name("15"), Some(15));
        assert_eq!(level_from_name("loud"), None);

        let mut r = record("x", json!([]));
        r.levelno = None;
        r.levelname = Some("ERROR".to_string());
        assert_eq!(r.level(), LEVEL_ERROR);

        r.levelname = None;
        r.levelno = Some(35);
        assert_eq!(r.level_name(), "WARNING");
    }

    #[test]
    fn test_format_line() {
        let line = record("hello %s", json!(["world"])).format_line();
        assert!(line.contains("[I] [iqe.tests] hello world (tests/test_x.py:42)"), "{line}");
        assert!(line.starts_with("2023-11-14"), "{line}");
    }
}
