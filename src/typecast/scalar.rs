//! Builtin constructors and lenient coercions for each [`TypeClass`].
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use indexmap::IndexMap;

use super::time;
use crate::class::ClassLink;
use crate::error::{CastError, Result};
use crate::property::TypeClass;
use crate::value::Value;

fn build_error(class: &TypeClass, reason: impl Into<String>) -> CastError {
    CastError::Build { type_name: class.name().to_string(), reason: reason.into() }
}

fn single(class: &TypeClass, mut args: Vec<Value>) -> Result<Value> {
    match args.len() {
        1 => Ok(args.pop().unwrap_or_default()),
        n => Err(build_error(class, format!("expected 1 argument, got {n}"))),
    }
}

// ----------------------------- Dispatch ----------------------------------- //

/// The type's ordinary constructor.
pub fn construct_default(class: &TypeClass, args: Vec<Value>) -> Result<Value> {
    match class {
        TypeClass::Object => single(class, args),
        TypeClass::String => coerce_string(class, single(class, args)?),
        TypeClass::Integer => coerce_integer(class, single(class, args)?),
        TypeClass::Float => coerce_float(class, single(class, args)?),
        TypeClass::Boolean => coerce_boolean(class, single(class, args)?),
        TypeClass::Hash => match args.len() {
            0 => Ok(Value::Map(IndexMap::new())),
            _ => match single(class, args)? {
                v @ Value::Map(_) => Ok(v),
                other => Err(build_error(class, format!("cannot build from {}", other.kind_name()))),
            },
        },
        TypeClass::Date => match args.len() {
            1 => coerce_date(class, single(class, args)?),
            _ => date_from_parts(class, &args),
        },
        TypeClass::Time => match args.len() {
            1 => coerce_time(class, single(class, args)?),
            _ => time_from_parts(class, &args),
        },
        TypeClass::Model(link) => build_model(link, args),
    }
}

/// A named factory, e.g. `Date::parse` or a factory registered on a model class.
pub fn construct_named(class: &TypeClass, method: &str, args: Vec<Value>) -> Result<Value> {
    match (class, method) {
        (_, "new") => construct_default(class, args),
        (TypeClass::Date, "parse") => {
            let value = single(class, args)?;
            let text = value.as_str().ok_or_else(|| build_error(class, "parse expects a string"))?;
            time::parse_date(text)
                .map(Value::Date)
                .ok_or_else(|| build_error(class, format!("unparseable date `{text}`")))
        }
        (TypeClass::Time, "parse" | "parse_iso8601") => {
            let value = single(class, args)?;
            let text = value.as_str().ok_or_else(|| build_error(class, "parse expects a string"))?;
            time::parse(text)
                .map(Value::Time)
                .ok_or_else(|| build_error(class, format!("unparseable time `{text}`")))
        }
        (TypeClass::Time, "at") => match single(class, args)? {
            Value::Integer(secs) => epoch(class, secs as f64),
            Value::Float(secs) => epoch(class, secs),
            other => Err(build_error(class, format!("at expects seconds, got {}", other.kind_name()))),
        },
        (TypeClass::Model(link), name) => {
            let target = link.resolve()?;
            let factory = target
                .factory(name)
                .ok_or_else(|| build_error(class, format!("no factory named `{name}`")))?;
            factory(&args).map_err(|reason| build_error(class, reason))
        }
        (_, name) => Err(build_error(class, format!("{} does not respond to `{name}`", class.name()))),
    }
}

fn build_model(link: &ClassLink, args: Vec<Value>) -> Result<Value> {
    let target = link.resolve()?;
    let attrs = match args.len() {
        0 => IndexMap::new(),
        _ => match single(&TypeClass::Model(link.clone()), args)? {
            Value::Map(m) => m,
            other => {
                return Err(CastError::Build {
                    type_name: link.name().to_string(),
                    reason: format!("expected a hash of attributes, got {}", other.kind_name()),
                });
            }
        },
    };
    target.new_instance(attrs).map(Value::Model)
}

// ----------------------------- Coercions ---------------------------------- //

fn coerce_string(class: &TypeClass, value: Value) -> Result<Value> {
    match value {
        v @ Value::String(_) => Ok(v),
        Value::Integer(i) => Ok(Value::String(i.to_string())),
        Value::Float(f) => Ok(Value::String(f.to_string())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        Value::Date(d) => Ok(Value::String(d.format("%Y-%m-%d").to_string())),
        Value::Time(t) => Ok(Value::String(time::format_time(&t, 3))),
        other => Err(build_error(class, format!("cannot build from {}", other.kind_name()))),
    }
}

fn coerce_integer(class: &TypeClass, value: Value) -> Result<Value> {
    match value {
        v @ Value::Integer(_) => Ok(v),
        Value::Float(f) if f.is_finite() => Ok(Value::Integer(f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Ok(Value::Integer(i));
            }
            match s.parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(Value::Integer(f.trunc() as i64)),
                _ => Err(build_error(class, format!("`{s}` is not numeric"))),
            }
        }
        other => Err(build_error(class, format!("cannot build from {}", other.kind_name()))),
    }
}

fn coerce_float(class: &TypeClass, value: Value) -> Result<Value> {
    match value {
        v @ Value::Float(_) => Ok(v),
        Value::Integer(i) => Ok(Value::Float(i as f64)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| build_error(class, format!("`{s}` is not numeric"))),
        other => Err(build_error(class, format!("cannot build from {}", other.kind_name()))),
    }
}

fn coerce_boolean(class: &TypeClass, value: Value) -> Result<Value> {
    match value {
        v @ Value::Bool(_) => Ok(v),
        Value::Integer(1) => Ok(Value::Bool(true)),
        Value::Integer(0) => Ok(Value::Bool(false)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => Ok(Value::Bool(true)),
            "false" | "f" | "0" => Ok(Value::Bool(false)),
            _ => Err(build_error(class, format!("`{s}` is not a boolean"))),
        },
        other => Err(build_error(class, format!("cannot build from {}", other.kind_name()))),
    }
}

fn coerce_date(class: &TypeClass, value: Value) -> Result<Value> {
    match value {
        v @ Value::Date(_) => Ok(v),
        Value::Time(t) => Ok(Value::Date(t.date_naive())),
        Value::String(s) => time::parse_date(&s)
            .map(Value::Date)
            .ok_or_else(|| build_error(class, format!("unparseable date `{s}`"))),
        other => Err(build_error(class, format!("cannot build from {}", other.kind_name()))),
    }
}

fn coerce_time(class: &TypeClass, value: Value) -> Result<Value> {
    match value {
        v @ Value::Time(_) => Ok(v),
        Value::Date(d) => d
            .and_hms_opt(0, 0, 0)
            .map(|naive| Value::Time(Utc.from_utc_datetime(&naive).fixed_offset()))
            .ok_or_else(|| build_error(class, "date out of range")),
        Value::Integer(secs) => epoch(class, secs as f64),
        Value::Float(secs) => epoch(class, secs),
        Value::String(s) => time::parse(&s)
            .map(Value::Time)
            .ok_or_else(|| build_error(class, format!("unparseable time `{s}`"))),
        other => Err(build_error(class, format!("cannot build from {}", other.kind_name()))),
    }
}

fn epoch(class: &TypeClass, secs: f64) -> Result<Value> {
    if !secs.is_finite() {
        return Err(build_error(class, "seconds must be finite"));
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::<Utc>::from_timestamp(whole as i64, nanos)
        .map(|t| Value::Time(t.fixed_offset()))
        .ok_or_else(|| build_error(class, "timestamp out of range"))
}

fn int_arg(class: &TypeClass, args: &[Value], i: usize) -> Result<i64> {
    match args.get(i) {
        None => Ok(0),
        Some(Value::Integer(n)) => Ok(*n),
        Some(other) => Err(build_error(class, format!("argument {i} must be an integer, got {}", other.kind_name()))),
    }
}

/// Integer argument `i` narrowed to the component type.
fn part<T: TryFrom<i64>>(class: &TypeClass, args: &[Value], i: usize, what: &str) -> Result<T> {
    let n = int_arg(class, args, i)?;
    T::try_from(n).map_err(|_| build_error(class, format!("{what} {n} out of range")))
}

fn date_from_parts(class: &TypeClass, args: &[Value]) -> Result<Value> {
    if args.len() != 3 {
        return Err(build_error(class, format!("expected (year, month, day), got {} arguments", args.len())));
    }
    let y: i32 = part(class, args, 0, "year")?;
    let m: u32 = part(class, args, 1, "month")?;
    let d: u32 = part(class, args, 2, "day")?;
    NaiveDate::from_ymd_opt(y, m, d)
        .map(Value::Date)
        .ok_or_else(|| build_error(class, format!("invalid date {y}-{m}-{d}")))
}

/// `(year, month, day, hour, min, sec[, zone])`; seconds may be fractional,
/// zone is `±hh:mm`. Without a zone the time is UTC.
fn time_from_parts(class: &TypeClass, args: &[Value]) -> Result<Value> {
    if args.len() < 3 || args.len() > 7 {
        return Err(build_error(class, format!("expected 3 to 7 arguments, got {}", args.len())));
    }
    let seconds = match args.get(5) {
        None => 0.0,
        Some(v) => v.as_f64().ok_or_else(|| build_error(class, "seconds must be numeric"))?,
    };
    if !(0.0..61.0).contains(&seconds) {
        return Err(build_error(class, format!("seconds {seconds} out of range")));
    }
    let offset = match args.get(6) {
        None | Some(Value::Null) => 0,
        Some(Value::String(zone)) => time::parse_zone(zone)
            .ok_or_else(|| build_error(class, format!("invalid zone `{zone}`")))?,
        Some(other) => return Err(build_error(class, format!("zone must be a string, got {}", other.kind_name()))),
    };
    let parts = time::Parts {
        year: part(class, args, 0, "year")?,
        month: part(class, args, 1, "month")?,
        day: part(class, args, 2, "day")?,
        hour: part(class, args, 3, "hour")?,
        minute: part(class, args, 4, "minute")?,
        second: seconds.trunc() as u32,
        nanos: (seconds.fract() * 1e9).round().min(999_999_999.0) as u32,
        offset_secs: offset,
    };
    parts
        .build()
        .map(Value::Time)
        .ok_or_else(|| build_error(class, "invalid time components"))
}

// ------------------------------- Tests ------------------------------------ //
