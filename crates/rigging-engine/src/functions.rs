//! Pure template functions exposed by the static context
//!
//! Names follow the release template convention (`RandomString`, `ToLower`,
//! ...). None of these read external state.

use base64::Engine as _;
use minijinja::value::ValueKind;
use minijinja::{Error, ErrorKind, Value};
use rand::Rng;
use regex::Regex;

/// Character class used by `RandomString` when none is given
pub const DEFAULT_CHARSET: &str = "[_A-Za-z0-9]";

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

/// Random string drawn from a regex character class
///
/// Usage: {{repl RandomString(16) }} or {{repl RandomString(8, "[a-f0-9]") }}
pub fn random_string(length: u32, charset: Option<String>) -> Result<String, Error> {
    let class = charset.unwrap_or_else(|| DEFAULT_CHARSET.to_string());
    let pattern = Regex::new(&format!("^(?:{})$", class))
        .map_err(|e| invalid(format!("invalid charset '{}': {}", class, e)))?;

    let alphabet: Vec<char> = (0x20u8..0x7f)
        .map(char::from)
        .filter(|c| pattern.is_match(c.encode_utf8(&mut [0; 4])))
        .collect();

    if alphabet.is_empty() {
        return Err(invalid(format!("charset '{}' matches no printable characters", class)));
    }

    let mut rng = rand::rng();
    Ok((0..length)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())])
        .collect())
}

/// Current UTC time, RFC 3339
///
/// Usage: {{repl Now() }}
pub fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Current UTC time with a strftime format
///
/// Usage: {{repl NowFmt("%Y-%m-%d") }}
pub fn now_fmt(format: String) -> String {
    chrono::Utc::now().format(&format).to_string()
}

pub fn to_lower(s: String) -> String {
    s.to_lowercase()
}

pub fn to_upper(s: String) -> String {
    s.to_uppercase()
}

pub fn trim_space(s: String) -> String {
    s.trim().to_string()
}

/// Trim a set of characters (whitespace when no cutset is given)
///
/// Usage: {{repl Trim("--x--", "-") }}
pub fn trim(s: String, cutset: Option<String>) -> String {
    match cutset {
        Some(cutset) => s.trim_matches(|c| cutset.contains(c)).to_string(),
        None => s.trim().to_string(),
    }
}

/// Split a string into a list
///
/// Usage: {%repl for host in Split(ConfigOption("hosts"), ",") %}...{%repl endfor %}
pub fn split(s: String, sep: String) -> Vec<String> {
    if s.is_empty() {
        return Vec::new();
    }
    s.split(sep.as_str()).map(str::to_string).collect()
}

pub fn url_encode(s: String) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

pub fn base64_encode(s: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(s.as_bytes())
}

pub fn base64_decode(s: String) -> Result<String, Error> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(s.trim().as_bytes())
        .map_err(|e| invalid(format!("base64 decode error: {}", e)))?;

    String::from_utf8(decoded).map_err(|e| invalid(format!("UTF-8 decode error: {}", e)))
}

/// Boolean parsing shared with the builder's `render_bool`
///
/// Accepts `1 t T TRUE true True 0 f F FALSE false False`.
pub fn parse_bool_str(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

pub fn parse_bool(s: String) -> Result<bool, Error> {
    parse_bool_str(s.trim()).ok_or_else(|| invalid(format!("cannot parse '{}' as bool", s)))
}

pub fn parse_int(s: String, base: Option<u32>) -> Result<i64, Error> {
    i64::from_str_radix(s.trim(), base.unwrap_or(10))
        .map_err(|e| invalid(format!("cannot parse '{}' as int: {}", s, e)))
}

pub fn parse_uint(s: String, base: Option<u32>) -> Result<u64, Error> {
    u64::from_str_radix(s.trim(), base.unwrap_or(10))
        .map_err(|e| invalid(format!("cannot parse '{}' as uint: {}", s, e)))
}

pub fn parse_float(s: String) -> Result<f64, Error> {
    s.trim()
        .parse::<f64>()
        .map_err(|e| invalid(format!("cannot parse '{}' as float: {}", s, e)))
}

/// Numeric operand: integers stay integers, strings are parsed
enum Number {
    Int(i64),
    Float(f64),
}

fn number(value: &Value) -> Result<Number, Error> {
    if let Some(s) = value.as_str() {
        let s = s.trim();
        return s
            .parse::<i64>()
            .map(Number::Int)
            .or_else(|_| s.parse::<f64>().map(Number::Float))
            .map_err(|_| invalid(format!("'{}' is not a number", s)));
    }

    match value.kind() {
        ValueKind::Number => match value.as_i64() {
            Some(n) => Ok(Number::Int(n)),
            None => f64::try_from(value.clone())
                .map(Number::Float)
                .map_err(|_| invalid(format!("{} is not a number", value))),
        },
        _ => Err(invalid(format!("{} is not a number", value))),
    }
}

fn arithmetic(
    a: Value,
    b: Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, Error> {
    match (number(&a)?, number(&b)?) {
        (Number::Int(x), Number::Int(y)) => int_op(x, y)
            .map(Value::from)
            .ok_or_else(|| invalid("integer overflow")),
        (x, y) => {
            let as_f = |n: Number| match n {
                Number::Int(i) => i as f64,
                Number::Float(f) => f,
            };
            Ok(Value::from(float_op(as_f(x), as_f(y))))
        }
    }
}

pub fn add(a: Value, b: Value) -> Result<Value, Error> {
    arithmetic(a, b, i64::checked_add, |x, y| x + y)
}

pub fn sub(a: Value, b: Value) -> Result<Value, Error> {
    arithmetic(a, b, i64::checked_sub, |x, y| x - y)
}

pub fn mult(a: Value, b: Value) -> Result<Value, Error> {
    arithmetic(a, b, i64::checked_mul, |x, y| x * y)
}

pub fn div(a: Value, b: Value) -> Result<Value, Error> {
    if let Ok(Number::Int(0)) = number(&b) {
        return Err(invalid("division by zero"));
    }
    if let Ok(Number::Float(f)) = number(&b)
        && f == 0.0
    {
        return Err(invalid("division by zero"));
    }
    arithmetic(a, b, i64::checked_div, |x, y| x / y)
}

/// Decimal human-readable size with four significant digits
///
/// Usage: {{repl HumanSize(1500) }} -> "1.5kB"
pub fn human_size(bytes: Value) -> Result<String, Error> {
    const UNITS: [&str; 9] = ["B", "kB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

    let mut size = match number(&bytes)? {
        Number::Int(i) => i as f64,
        Number::Float(f) => f,
    };
    let mut unit = 0;
    while size >= 1000.0 && unit < UNITS.len() - 1 {
        size /= 1000.0;
        unit += 1;
    }

    let integer_digits = if size < 1.0 { 1 } else { size.log10().floor() as usize + 1 };
    let decimals = 4usize.saturating_sub(integer_digits);
    let mut formatted = format!("{:.*}", decimals, size);
    if formatted.contains('.') {
        formatted = formatted.trim_end_matches('0').trim_end_matches('.').to_string();
    }

    Ok(format!("{}{}", formatted, UNITS[unit]))
}
