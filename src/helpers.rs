//! Implements [`Environment`] for [`Payload`]: plain field lookup for bare
//! identifiers, plus the date/cast helper functions available to every
//! embedded expression (`Now()`, `DaysAgo(created_at)`, `IsWeekend()`, ...).
//!
//! Every helper here is fallible by construction -- a malformed date string
//! in a payload must fail the single evaluation it's part of, not the whole
//! process, so parse errors become [`ExprError::DateParse`] instead of
//! panics (the source this crate is modeled on panics on bad dates).

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, Timelike};
use serde_json::Value;

use crate::error::ExprError;
use crate::expr::Environment;
use crate::value::{value_to_int, value_to_string, Payload};

const DATE_FMT: &str = "%Y-%m-%d";
const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

impl Environment for Payload {
    fn get_var(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }

    fn call(&self, name: &str, args: &[Value]) -> Result<Value, ExprError> {
        call_helper(self, name, args)
    }
}

fn call_helper(payload: &Payload, name: &str, args: &[Value]) -> Result<Value, ExprError> {
    match name {
        "Now" => Ok(Value::from(Local::now().to_rfc3339())),
        "Date" => {
            let s = arg_str(args, 0, name)?;
            let d = parse_date(&s)?;
            Ok(Value::from(d.format(DATE_FMT).to_string()))
        }
        "DateTime" => {
            let s = arg_str(args, 0, name)?;
            let dt = parse_datetime(&s)?;
            Ok(Value::from(dt.format(DATETIME_FMT).to_string()))
        }
        "DaysAgo" => {
            let s = arg_str(args, 0, name)?;
            if s.is_empty() {
                return Ok(Value::from(0));
            }
            let dt = parse_datetime(&s)?;
            Ok(Value::from(since_hours(dt) / 24))
        }
        "HoursAgo" => {
            let s = arg_str(args, 0, name)?;
            if s.is_empty() {
                return Ok(Value::from(0));
            }
            let dt = parse_datetime(&s)?;
            Ok(Value::from(since_hours(dt)))
        }
        "MinutesAgo" => {
            let s = arg_str(args, 0, name)?;
            if s.is_empty() {
                return Ok(Value::from(0));
            }
            let dt = parse_datetime(&s)?;
            Ok(Value::from(since_minutes(dt)))
        }
        "IsBefore" => {
            let s = arg_str(args, 0, name)?;
            let dt = parse_flexible(&s)?;
            Ok(Value::Bool(Local::now().naive_local() < dt))
        }
        "IsAfter" => {
            let s = arg_str(args, 0, name)?;
            let dt = parse_flexible(&s)?;
            Ok(Value::Bool(Local::now().naive_local() > dt))
        }
        "IsBetween" => {
            let begin = arg_str(args, 0, name)?;
            let end = arg_str(args, 1, name)?;
            let now = Local::now().naive_local();
            let after = now > parse_flexible(&begin)?;
            let before = now < parse_flexible(&end)?;
            Ok(Value::Bool(after && before))
        }
        "IsWeekday" => {
            let day = arg_int(args, 0, name)?;
            let today = Local::now().weekday().num_days_from_sunday() as i64;
            Ok(Value::Bool(today == day))
        }
        "IsWeekend" => {
            let today = Local::now().weekday().num_days_from_sunday();
            Ok(Value::Bool(today == 0 || today == 6))
        }
        "IsToday" => {
            let s = arg_str(args, 0, name)?;
            Ok(Value::Bool(Local::now().format(DATE_FMT).to_string() == s))
        }
        "IsHourRange" => {
            let begin = arg_int(args, 0, name)?;
            let end = arg_int(args, 1, name)?;
            let now = Local::now().hour() as i64;
            Ok(Value::Bool(now >= begin && now <= end))
        }
        "ToString" => {
            let v = args.first().ok_or_else(|| arity_err(name, 1, args.len()))?;
            Ok(Value::from(value_to_string(v)))
        }
        "ToInt" => {
            let v = args.first().ok_or_else(|| arity_err(name, 1, args.len()))?;
            Ok(Value::from(value_to_int(v)))
        }
        other => Err(ExprError::UndefinedFunction(other.to_string())),
    }
}

fn arg_str(args: &[Value], idx: usize, fn_name: &str) -> Result<String, ExprError> {
    args.get(idx)
        .map(value_to_string)
        .ok_or_else(|| arity_err(fn_name, idx + 1, args.len()))
}

fn arg_int(args: &[Value], idx: usize, fn_name: &str) -> Result<i64, ExprError> {
    args.get(idx)
        .map(value_to_int)
        .ok_or_else(|| arity_err(fn_name, idx + 1, args.len()))
}

fn arity_err(name: &str, expected: usize, got: usize) -> ExprError {
    ExprError::Arity {
        name: name.to_string(),
        expected,
        got,
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, ExprError> {
    NaiveDate::parse_from_str(s, DATE_FMT).map_err(|e| ExprError::DateParse {
        kind: "date",
        value: s.to_string(),
        reason: e.to_string(),
    })
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime, ExprError> {
    NaiveDateTime::parse_from_str(s, DATETIME_FMT).map_err(|e| ExprError::DateParse {
        kind: "datetime",
        value: s.to_string(),
        reason: e.to_string(),
    })
}

/// `IsBefore`/`IsAfter`/`IsBetween` accept either a bare date (`2021-01-02`)
/// or a full timestamp (`2021-01-02 15:04:05`), distinguished by length --
/// matches the behavior this crate is modeled on.
fn parse_flexible(s: &str) -> Result<NaiveDateTime, ExprError> {
    if s.len() == 10 {
        parse_date(s).map(|d| d.and_hms_opt(0, 0, 0).expect("midnight is always valid"))
    } else {
        parse_datetime(s)
    }
}

fn since_hours(dt: NaiveDateTime) -> i64 {
    let now = Local::now().naive_local();
    (now - dt).num_hours()
}

fn since_minutes(dt: NaiveDateTime) -> i64 {
    let now = Local::now().naive_local();
    (now - dt).num_minutes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{compile, run};
    use crate::value::Payload;

    fn payload_with(pairs: &[(&str, Value)]) -> Payload {
        Payload::from_pairs(pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())))
    }

    #[test]
    fn is_weekend_and_is_weekday_are_consistent() {
        let payload = payload_with(&[]);
        let program = compile("IsWeekend() || !IsWeekend()").unwrap();
        assert_eq!(run(&program, &payload).unwrap(), Value::Bool(true));
    }

    #[test]
    fn days_ago_on_empty_string_is_zero() {
        let payload = payload_with(&[("created_at", Value::from(""))]);
        let program = compile("DaysAgo(created_at) == 0").unwrap();
        assert_eq!(run(&program, &payload).unwrap(), Value::Bool(true));
    }

    #[test]
    fn days_ago_on_far_past_date_is_positive() {
        let payload = payload_with(&[("created_at", Value::from("2000-01-01 00:00:00"))]);
        let program = compile("DaysAgo(created_at) > 1000").unwrap();
        assert_eq!(run(&program, &payload).unwrap(), Value::Bool(true));
    }

    #[test]
    fn malformed_date_is_a_catchable_error_not_a_panic() {
        let payload = payload_with(&[("created_at", Value::from("not-a-date"))]);
        let program = compile("DaysAgo(created_at) > 0").unwrap();
        let err = run(&program, &payload).unwrap_err();
        assert!(matches!(err, ExprError::DateParse { .. }));
    }

    #[test]
    fn to_int_and_to_string_round_trip_through_cast_semantics() {
        let payload = payload_with(&[("amount", Value::from("42"))]);
        let program = compile("ToInt(amount) == 42").unwrap();
        assert_eq!(run(&program, &payload).unwrap(), Value::Bool(true));
    }

    #[test]
    fn is_before_accepts_bare_dates_and_full_timestamps() {
        let payload = payload_with(&[]);
        let program = compile(r#"IsBefore("2999-01-01")"#).unwrap();
        assert_eq!(run(&program, &payload).unwrap(), Value::Bool(true));
        let program = compile(r#"IsBefore("2999-01-01 00:00:00")"#).unwrap();
        assert_eq!(run(&program, &payload).unwrap(), Value::Bool(true));
    }
}
