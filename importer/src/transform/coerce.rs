//! Field coercion: raw cell -> typed value for the declared field kind.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CoercionError, CoercionResult};
use crate::mapping::FieldKind;
use crate::models::{CoercedValue, RawValue, SectionObject};

static INTEGER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+$").expect("INTEGER_RE should compile - this is a bug"));

static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("DATE_RE should compile - this is a bug"));

// Seconds are tolerated on input and dropped on output.
static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{2}):(\d{2})(?::\d{2})?$").expect("TIME_RE should compile - this is a bug")
});

static SCHEDULE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})(?:[ T](\d{2}:\d{2}(?::\d{2})?))?$")
        .expect("SCHEDULE_RE should compile - this is a bug")
});

/// Result of coercing one cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    Value(CoercedValue),
    /// A `{date, time}` pair; the time is omitted when the cell has none.
    Schedule {
        date: NaiveDate,
        time: Option<NaiveTime>,
    },
}

impl Coerced {
    /// Write the value at `path` (a schedule writes `path.date`/`path.time`).
    pub fn insert_into(self, target: &mut SectionObject, path: &str) {
        match self {
            Coerced::Value(value) => target.insert_path(path, value),
            Coerced::Schedule { date, time } => {
                target.insert_path(&format!("{}.date", path), CoercedValue::IsoDate(date));
                if let Some(time) = time {
                    target.insert_path(&format!("{}.time", path), CoercedValue::IsoTime(time));
                }
            }
        }
    }
}

/// Coerce a non-empty raw value to `kind`.
pub fn coerce(raw: &RawValue, kind: FieldKind) -> CoercionResult<Coerced> {
    let value = match kind {
        FieldKind::Integer => CoercedValue::Integer(to_integer(raw)?),
        FieldKind::Text => CoercedValue::Text(to_text(raw)),
        FieldKind::Date => CoercedValue::IsoDate(to_date(raw)?),
        FieldKind::Time => CoercedValue::IsoTime(to_time(raw)?),
        FieldKind::DateTime => {
            let (date, time) = to_schedule(raw)?;
            return Ok(Coerced::Schedule { date, time });
        }
        FieldKind::BooleanList => CoercedValue::BooleanList(to_boolean_list(raw)?),
        FieldKind::IntegerList => CoercedValue::IntegerList(to_integer_list(raw)?),
    };
    Ok(Coerced::Value(value))
}

/// Coerce `raw` and insert it into `target`.
///
/// Empty cells are skipped: returns `Ok(false)` and leaves `target` as is.
pub fn coerce_into(
    target: &mut SectionObject,
    path: &str,
    kind: FieldKind,
    raw: &RawValue,
) -> CoercionResult<bool> {
    if raw.is_empty() {
        return Ok(false);
    }
    coerce(raw, kind)?.insert_into(target, path);
    Ok(true)
}

fn unsupported(raw: &RawValue, kind: FieldKind) -> CoercionError {
    CoercionError::UnsupportedValue {
        value_type: raw.type_name(),
        kind: kind.as_str(),
    }
}

fn parse_integer(text: &str) -> CoercionResult<i64> {
    let trimmed = text.trim();
    if !INTEGER_RE.is_match(trimmed) {
        return Err(CoercionError::NotInteger(trimmed.to_string()));
    }
    trimmed
        .parse::<i64>()
        .map_err(|_| CoercionError::NotInteger(trimmed.to_string()))
}

/// Whole number that fits in an i64 without saturating.
fn is_whole_i64(f: f64) -> bool {
    f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64
}

fn to_integer(raw: &RawValue) -> CoercionResult<i64> {
    match raw {
        RawValue::Integer(i) => Ok(*i),
        // Spreadsheet numbers arrive as floats.
        RawValue::Float(f) if is_whole_i64(*f) => Ok(*f as i64),
        RawValue::Float(f) => Err(CoercionError::NotInteger(f.to_string())),
        RawValue::Text(s) => parse_integer(s),
        other => Err(unsupported(other, FieldKind::Integer)),
    }
}

fn to_text(raw: &RawValue) -> String {
    match raw {
        RawValue::Text(s) => s.trim().to_string(),
        RawValue::Float(f) if is_whole_i64(*f) => format!("{}", *f as i64),
        RawValue::DateTime(dt) => dt.format("%Y-%m-%d").to_string(),
        other => other.to_string(),
    }
}

fn to_date(raw: &RawValue) -> CoercionResult<NaiveDate> {
    match raw {
        RawValue::Date(d) => Ok(*d),
        RawValue::DateTime(dt) => Ok(dt.date()),
        RawValue::Text(s) => {
            let trimmed = s.trim();
            if !DATE_RE.is_match(trimmed) {
                return Err(CoercionError::NotDate(trimmed.to_string()));
            }
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .map_err(|_| CoercionError::NotDate(trimmed.to_string()))
        }
        other => Err(unsupported(other, FieldKind::Date)),
    }
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    let caps = TIME_RE.captures(text)?;
    let hour = caps.get(1)?.as_str().parse().ok()?;
    let minute = caps.get(2)?.as_str().parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn to_time(raw: &RawValue) -> CoercionResult<NaiveTime> {
    match raw {
        RawValue::Time(t) => Ok(truncate_seconds(*t)),
        RawValue::DateTime(dt) => Ok(truncate_seconds(dt.time())),
        RawValue::Text(s) => {
            let trimmed = s.trim();
            parse_time(trimmed).ok_or_else(|| CoercionError::NotTime(trimmed.to_string()))
        }
        other => Err(unsupported(other, FieldKind::Time)),
    }
}

fn truncate_seconds(t: NaiveTime) -> NaiveTime {
    use chrono::Timelike;
    NaiveTime::from_hms_opt(t.hour(), t.minute(), 0).unwrap_or(t)
}

fn to_schedule(raw: &RawValue) -> CoercionResult<(NaiveDate, Option<NaiveTime>)> {
    match raw {
        RawValue::Date(d) => Ok((*d, None)),
        RawValue::DateTime(dt) => Ok(split_datetime(dt)),
        RawValue::Text(s) => {
            let trimmed = s.trim();
            let not_datetime = || CoercionError::NotDateTime(trimmed.to_string());
            let caps = SCHEDULE_RE.captures(trimmed).ok_or_else(not_datetime)?;
            let date = caps
                .get(1)
                .and_then(|m| NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d").ok())
                .ok_or_else(not_datetime)?;
            let time = match caps.get(2) {
                Some(m) => Some(parse_time(m.as_str()).ok_or_else(not_datetime)?),
                None => None,
            };
            Ok((date, time))
        }
        other => Err(unsupported(other, FieldKind::DateTime)),
    }
}

fn split_datetime(dt: &NaiveDateTime) -> (NaiveDate, Option<NaiveTime>) {
    (dt.date(), Some(truncate_seconds(dt.time())))
}

fn to_boolean_list(raw: &RawValue) -> CoercionResult<Vec<bool>> {
    match raw {
        RawValue::Bool(b) => Ok(vec![*b]),
        RawValue::Text(s) => s
            .split(',')
            .map(str::trim)
            .map(|token| match token.to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(CoercionError::NotBoolean {
                    token: token.to_string(),
                }),
            })
            .collect(),
        other => Err(unsupported(other, FieldKind::BooleanList)),
    }
}

fn to_integer_list(raw: &RawValue) -> CoercionResult<Vec<i64>> {
    match raw {
        RawValue::Integer(_) | RawValue::Float(_) => Ok(vec![to_integer(raw)?]),
        RawValue::Text(s) => s.split(',').map(parse_integer).collect(),
        other => Err(unsupported(other, FieldKind::IntegerList)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(raw: impl Into<RawValue>, kind: FieldKind) -> CoercionResult<CoercedValue> {
        match coerce(&raw.into(), kind)? {
            Coerced::Value(v) => Ok(v),
            Coerced::Schedule { .. } => panic!("unexpected schedule"),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_integer_rule() {
        assert_eq!(value("18", FieldKind::Integer), Ok(CoercedValue::Integer(18)));
        assert_eq!(value(" -2 ", FieldKind::Integer), Ok(CoercedValue::Integer(-2)));
        assert_eq!(value(4.0, FieldKind::Integer), Ok(CoercedValue::Integer(4)));
        assert_eq!(value(7_i64, FieldKind::Integer), Ok(CoercedValue::Integer(7)));
        assert!(matches!(value("1.5", FieldKind::Integer), Err(CoercionError::NotInteger(_))));
        assert!(matches!(value("12a", FieldKind::Integer), Err(CoercionError::NotInteger(_))));
        assert!(matches!(value(2.5, FieldKind::Integer), Err(CoercionError::NotInteger(_))));
        assert!(matches!(
            value(true, FieldKind::Integer),
            Err(CoercionError::UnsupportedValue { .. })
        ));
    }

    #[test]
    fn test_integer_out_of_range_float_rejected() {
        assert!(matches!(value(1e20, FieldKind::Integer), Err(CoercionError::NotInteger(_))));
        assert!(matches!(value(-1e20, FieldKind::IntegerList), Err(CoercionError::NotInteger(_))));
        assert_eq!(value(1e20, FieldKind::Text), Ok(CoercedValue::Text("100000000000000000000".into())));
        assert_eq!(value(-9.0e15, FieldKind::Integer), Ok(CoercedValue::Integer(-9_000_000_000_000_000)));
    }

    #[test]
    fn test_boolean_list_round_trip() {
        let coerced = value("true,false,true", FieldKind::BooleanList).unwrap();
        assert_eq!(coerced, CoercedValue::BooleanList(vec![true, false, true]));
        assert_eq!(coerced.to_string(), "true,false,true");

        assert_eq!(
            value(" TRUE , False", FieldKind::BooleanList),
            Ok(CoercedValue::BooleanList(vec![true, false]))
        );
        assert_eq!(
            value("true,maybe", FieldKind::BooleanList),
            Err(CoercionError::NotBoolean { token: "maybe".into() })
        );
    }

    #[test]
    fn test_integer_list_rule() {
        assert_eq!(
            value("5, 8,15", FieldKind::IntegerList),
            Ok(CoercedValue::IntegerList(vec![5, 8, 15]))
        );
        assert_eq!(value(12.0, FieldKind::IntegerList), Ok(CoercedValue::IntegerList(vec![12])));
        assert!(matches!(
            value("5,x", FieldKind::IntegerList),
            Err(CoercionError::NotInteger(t)) if t == "x"
        ));
    }

    #[test]
    fn test_dates_and_times() {
        assert_eq!(value("2024-03-15", FieldKind::Date), Ok(CoercedValue::IsoDate(date(2024, 3, 15))));
        assert_eq!(value("16:30", FieldKind::Time), Ok(CoercedValue::IsoTime(time(16, 30))));
        assert_eq!(value("08:15:42", FieldKind::Time), Ok(CoercedValue::IsoTime(time(8, 15))));
        assert!(matches!(value("15/03/2024", FieldKind::Date), Err(CoercionError::NotDate(_))));
        assert!(matches!(value("2024-02-30", FieldKind::Date), Err(CoercionError::NotDate(_))));
        assert!(matches!(value("25:00", FieldKind::Time), Err(CoercionError::NotTime(_))));

        let native = date(2024, 3, 20).and_hms_opt(18, 0, 0).unwrap();
        assert_eq!(value(native, FieldKind::Date), Ok(CoercedValue::IsoDate(date(2024, 3, 20))));
        assert_eq!(value(native, FieldKind::Time), Ok(CoercedValue::IsoTime(time(18, 0))));
        assert_eq!(value(native, FieldKind::Text), Ok(CoercedValue::Text("2024-03-20".into())));
    }

    #[test]
    fn test_schedule_rule() {
        let coerced = coerce(&"2024-03-15 16:30".into(), FieldKind::DateTime).unwrap();
        assert_eq!(
            coerced,
            Coerced::Schedule { date: date(2024, 3, 15), time: Some(time(16, 30)) }
        );

        let coerced = coerce(&"2024-03-15".into(), FieldKind::DateTime).unwrap();
        assert_eq!(coerced, Coerced::Schedule { date: date(2024, 3, 15), time: None });

        assert!(matches!(
            coerce(&"tomorrow".into(), FieldKind::DateTime),
            Err(CoercionError::NotDateTime(_))
        ));
    }

    #[test]
    fn test_text_rule() {
        assert_eq!(value("  A  ", FieldKind::Text), Ok(CoercedValue::Text("A".into())));
        assert_eq!(value(12.0, FieldKind::Text), Ok(CoercedValue::Text("12".into())));
        assert_eq!(value(12.5, FieldKind::Text), Ok(CoercedValue::Text("12.5".into())));
    }

    #[test]
    fn test_coerce_into_skips_empty() {
        let mut target = SectionObject::new();
        assert_eq!(coerce_into(&mut target, "status", FieldKind::Integer, &"  ".into()), Ok(false));
        assert_eq!(coerce_into(&mut target, "status", FieldKind::Integer, &RawValue::Empty), Ok(false));
        assert!(target.is_empty());

        assert_eq!(
            coerce_into(&mut target, "deadline", FieldKind::DateTime, &"2024-03-15 16:30".into()),
            Ok(true)
        );
        assert_eq!(
            serde_json::to_value(&target).unwrap(),
            serde_json::json!({"deadline": {"date": "2024-03-15", "time": "16:30"}})
        );
    }
}
