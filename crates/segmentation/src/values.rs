//! Built-in value parsers: `date`, `duration` and the geo shapes.

use std::sync::Arc;

use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};

use crate::ast::{ValueKind, ValueNode};
use crate::context::ParsingContext;
use crate::duration::Iso8601Duration;
use crate::error::{SegmentationError, SegmentationResult};
use crate::geo::{GeoBox, GeoCircle, GeoLocation, GeoPolygon, Geohash};
use crate::registry::ValueNodeParser;

static RELATIVE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]?P").unwrap());

static ABSOLUTE_DATE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([0-9]{4}(?:-[0-9]{2}(?:-[0-9]{2})?)?)(?:T([0-9]{2}(?::[0-9]{2}(?::[0-9]{2}(?:\.[0-9]{3})?)?)?))?(Z|[+-][0-9]{2}(?::[0-9]{2})?)?$",
    )
    .unwrap()
});

static HUMAN_DURATION_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([+-]?[0-9.]+(?:[eE][+-]?[0-9]+)?)\s*([a-zA-Z]*)\s*$").unwrap());

const DATE_DEFAULTS: &str = "1970-01-01";
const TIME_DEFAULTS: &str = "00:00:00.000";
const OFFSET_DEFAULTS: &str = "+00:00";

type ValueParseResult = SegmentationResult<Option<ValueNode>>;

pub fn default_value_parser() -> SegmentationResult<ValueNodeParser> {
    let mut registry = ValueNodeParser::for_values();
    registry.register_exact("date", parse_date)?;
    registry.register_exact("duration", parse_duration)?;
    registry.register_exact("geolocation", parse_geolocation)?;
    registry.register_exact("geobox", parse_geobox)?;
    registry.register_exact("geocircle", parse_geocircle)?;
    registry.register_exact("geopolygon", parse_geopolygon)?;
    Ok(registry)
}

/// Parses a possibly truncated ISO-8601 date-time into epoch milliseconds.
///
/// Missing parts default to `1970-01-01`, `00:00:00.000` and UTC, so
/// `"2020"` is the first millisecond of 2020 in UTC.
pub fn parse_absolute_date(input: &str) -> Option<i64> {
    let captures = ABSOLUTE_DATE_REGEX.captures(input)?;
    let date = captures.get(1).map_or("", |m| m.as_str());
    let time = captures.get(2).map_or("", |m| m.as_str());
    let offset = match captures.get(3).map_or("", |m| m.as_str()) {
        "Z" => "",
        other => other,
    };
    let normalized = format!(
        "{date}{}T{time}{}{offset}{}",
        DATE_DEFAULTS.get(date.len()..)?,
        TIME_DEFAULTS.get(time.len()..)?,
        OFFSET_DEFAULTS.get(offset.len()..)?,
    );
    DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.3f%:z")
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Converts `"1.5 hours"`-style strings into milliseconds.
pub fn parse_human_duration(input: &str) -> SegmentationResult<f64> {
    let captures = HUMAN_DURATION_REGEX
        .captures(input)
        .ok_or_else(|| SegmentationError::bad_input(format!("\"duration\" cannot parse \"{input}\"")))?;
    let amount: f64 = captures[1]
        .parse()
        .map_err(|_| SegmentationError::bad_input(format!("\"duration\" expects a valid number, got \"{}\"", &captures[1])))?;
    let unit = captures.get(2).map_or("", |m| m.as_str());
    Ok(amount * unit_millis(unit)?)
}

fn unit_millis(unit: &str) -> SegmentationResult<f64> {
    let millis = match unit {
        "nanoseconds" | "nanosecond" | "nanos" | "ns" => 1e-6,
        "microseconds" | "microsecond" | "micros" | "us" => 1e-3,
        "milliseconds" | "millisecond" | "millis" | "ms" => 1.0,
        "seconds" | "second" | "secs" | "sec" | "s" => 1_000.0,
        "minutes" | "minute" | "min" | "m" => 60_000.0,
        "hours" | "hour" | "hr" | "h" => 3_600_000.0,
        "days" | "day" | "d" => 86_400_000.0,
        "weeks" | "week" | "w" => 604_800_000.0,
        other => {
            return Err(SegmentationError::bad_input(format!(
                "\"duration\" expects a valid unit, got \"{other}\""
            )))
        }
    };
    Ok(millis)
}

fn millis_number(millis: f64) -> SegmentationResult<Number> {
    Number::from_f64(millis).ok_or_else(|| SegmentationError::bad_input("\"duration\" is out of range"))
}

pub fn parse_date(context: &Arc<ParsingContext>, key: &str, input: &Value) -> ValueParseResult {
    let kind = match input {
        Value::Number(n) => ValueKind::Date(n.clone()),
        Value::String(s) if RELATIVE_REGEX.is_match(s) => ValueKind::RelativeDate(Iso8601Duration::parse(s)?),
        Value::String(s) => {
            let millis = parse_absolute_date(s).ok_or_else(|| {
                SegmentationError::bad_input(format!("\"{key}\" expects a valid ISO 8601 date, got \"{s}\""))
            })?;
            ValueKind::Date(millis.into())
        }
        _ => {
            return Err(SegmentationError::bad_input(format!(
                "\"{key}\" expects a number or a string"
            )))
        }
    };
    Ok(Some(ValueNode::new(context, kind)))
}

pub fn parse_duration(context: &Arc<ParsingContext>, key: &str, input: &Value) -> ValueParseResult {
    let kind = match input {
        Value::Number(n) => ValueKind::Duration(n.clone()),
        Value::String(s) if RELATIVE_REGEX.is_match(s) => ValueKind::CalendarDuration(Iso8601Duration::parse(s)?),
        Value::String(s) => ValueKind::Duration(millis_number(parse_human_duration(s)?)?),
        _ => {
            return Err(SegmentationError::bad_input(format!(
                "\"{key}\" expects a number or a string"
            )))
        }
    };
    Ok(Some(ValueNode::new(context, kind)))
}

fn number_field(key: &str, object: &serde_json::Map<String, Value>, field: &str) -> SegmentationResult<f64> {
    object
        .get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| SegmentationError::bad_input(format!("\"{key}\" expects a numeric \"{field}\"")))
}

fn read_geolocation(key: &str, input: &Value) -> SegmentationResult<GeoLocation> {
    match input {
        Value::String(hash) => Ok(Geohash::parse(hash)?.to_geo_location()),
        Value::Object(object) => Ok(GeoLocation::new(
            number_field(key, object, "lat")?,
            number_field(key, object, "lon")?,
        )),
        _ => Err(SegmentationError::bad_input(format!(
            "\"{key}\" expects a geohash or an object with \"lat\" and \"lon\""
        ))),
    }
}

pub fn parse_geolocation(context: &Arc<ParsingContext>, key: &str, input: &Value) -> ValueParseResult {
    let location = read_geolocation(key, input)?;
    Ok(Some(ValueNode::new(context, ValueKind::GeoLocation(location))))
}

pub fn parse_geobox(context: &Arc<ParsingContext>, key: &str, input: &Value) -> ValueParseResult {
    let geo_box = match input {
        Value::String(hash) => Geohash::parse(hash)?.to_geo_box(),
        Value::Object(object) => {
            if let (Some(top_left), Some(bottom_right)) = (object.get("topLeft"), object.get("bottomRight")) {
                GeoBox::from_top_left_and_bottom_right(
                    read_geolocation("geolocation", top_left)?,
                    read_geolocation("geolocation", bottom_right)?,
                )
            } else if let (Some(top_right), Some(bottom_left)) = (object.get("topRight"), object.get("bottomLeft")) {
                GeoBox::from_top_right_and_bottom_left(
                    read_geolocation("geolocation", top_right)?,
                    read_geolocation("geolocation", bottom_left)?,
                )
            } else if ["top", "right", "bottom", "left"].iter().all(|f| object.contains_key(*f)) {
                GeoBox::from_top_right_bottom_left(
                    number_field(key, object, "top")?,
                    number_field(key, object, "right")?,
                    number_field(key, object, "bottom")?,
                    number_field(key, object, "left")?,
                )
            } else {
                return Err(SegmentationError::bad_input(format!(
                    "\"{key}\" expects topLeft/bottomRight, topRight/bottomLeft or top/right/bottom/left"
                )));
            }
        }
        _ => {
            return Err(SegmentationError::bad_input(format!(
                "\"{key}\" expects a geohash or an object"
            )))
        }
    };
    Ok(Some(ValueNode::new(context, ValueKind::GeoBox(geo_box))))
}

pub fn parse_geocircle(context: &Arc<ParsingContext>, key: &str, input: &Value) -> ValueParseResult {
    let object = input
        .as_object()
        .ok_or_else(|| SegmentationError::bad_input(format!("\"{key}\" expects an object")))?;
    let radius = number_field(key, object, "radius")?;
    let center = object
        .get("center")
        .ok_or_else(|| SegmentationError::bad_input(format!("\"{key}\" expects a \"center\"")))?;
    let circle = GeoCircle::new(read_geolocation("geolocation", center)?, radius);
    Ok(Some(ValueNode::new(context, ValueKind::GeoCircle(circle))))
}

pub fn parse_geopolygon(context: &Arc<ParsingContext>, key: &str, input: &Value) -> ValueParseResult {
    let points = input
        .as_array()
        .ok_or_else(|| SegmentationError::bad_input(format!("\"{key}\" expects an array")))?;
    if points.len() < 3 {
        return Err(SegmentationError::bad_input(format!(
            "\"{key}\" expects at least 3 points, got {}",
            points.len()
        )));
    }
    let points = points
        .iter()
        .map(|point| read_geolocation("geolocation", point))
        .collect::<SegmentationResult<Vec<_>>>()?;
    Ok(Some(ValueNode::new(context, ValueKind::GeoPolygon(GeoPolygon::new(points)))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::DataSource;
    use crate::parser::SegmentationDslParser;
    use serde_json::json;

    fn value(input: Value) -> SegmentationResult<ValueKind> {
        let parser = SegmentationDslParser::default_parser().unwrap();
        let context = ParsingContext::root(parser.clone(), DataSource::Installation);
        parser.parse_value(&context, &input).map(|node| node.kind)
    }

    #[test]
    fn test_absolute_dates_fill_defaults() {
        assert_eq!(parse_absolute_date("1970"), Some(0));
        assert_eq!(parse_absolute_date("2020"), Some(1_577_836_800_000));
        assert_eq!(parse_absolute_date("2020-01-01T00:00:00.000Z"), Some(1_577_836_800_000));
        assert_eq!(parse_absolute_date("2020-01-01T01+01:00"), Some(1_577_836_800_000));
        assert_eq!(parse_absolute_date("2020-01-01T01:00+01"), Some(1_577_836_800_000));
        assert_eq!(parse_absolute_date("2020-02"), Some(1_580_515_200_000));
        assert_eq!(parse_absolute_date("2020-01-01T00:00:00.123"), Some(1_577_836_800_123));
    }

    #[test]
    fn test_absolute_dates_reject_garbage() {
        for input in ["", "20", "2020-1-1", "2020-13-01", "2020-01-01T", "2020-01-01 00:00", "yesterday", "\u{0662}020", "2020-0\u{0661}"] {
            assert_eq!(parse_absolute_date(input), None, "{input}");
        }
    }

    #[test]
    fn test_date_values() {
        assert_eq!(value(json!({"date": 1234})).unwrap(), ValueKind::Date(1234.into()));
        assert_eq!(
            value(json!({"date": "2020"})).unwrap(),
            ValueKind::Date(1_577_836_800_000_i64.into())
        );
        assert_eq!(
            value(json!({"date": "-P1D"})).unwrap(),
            ValueKind::RelativeDate(Iso8601Duration::new(false, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0))
        );
        assert!(value(json!({"date": "tomorrow"})).unwrap_err().is_bad_input());
        assert!(value(json!({"date": true})).unwrap_err().is_bad_input());
        assert!(value(json!({"date": "P1H"})).unwrap_err().is_bad_input());
    }

    #[test]
    fn test_human_durations() {
        assert_eq!(parse_human_duration("1s").unwrap(), 1_000.0);
        assert_eq!(parse_human_duration(" 1.5 hours ").unwrap(), 5_400_000.0);
        assert_eq!(parse_human_duration("2d").unwrap(), 172_800_000.0);
        assert_eq!(parse_human_duration("1e3ms").unwrap(), 1_000.0);
        assert_eq!(parse_human_duration("-1w").unwrap(), -604_800_000.0);
        assert_eq!(parse_human_duration("500000ns").unwrap(), 0.5);
        assert!(parse_human_duration("100").unwrap_err().is_bad_input());
        assert!(parse_human_duration("1 fortnight").unwrap_err().is_bad_input());
        assert!(parse_human_duration("1.2.3s").unwrap_err().is_bad_input());
        assert!(parse_human_duration("one second").unwrap_err().is_bad_input());
    }

    #[test]
    fn test_duration_values() {
        assert_eq!(value(json!({"duration": 60000})).unwrap(), ValueKind::Duration(60000.into()));
        assert!(matches!(
            value(json!({"duration": "1 min"})).unwrap(),
            ValueKind::Duration(n) if n.as_f64() == Some(60_000.0)
        ));
        assert!(matches!(
            value(json!({"duration": "P1M"})).unwrap(),
            ValueKind::CalendarDuration(d) if d.months == 1.0
        ));
        assert!(value(json!({"duration": null})).unwrap_err().is_bad_input());
    }

    #[test]
    fn test_geolocation_values() {
        assert_eq!(
            value(json!({"geolocation": {"lat": 1, "lon": 2}})).unwrap(),
            ValueKind::GeoLocation(GeoLocation::new(1.0, 2.0))
        );
        assert!(matches!(value(json!({"geolocation": "ezs42"})).unwrap(), ValueKind::GeoLocation(_)));
        assert!(value(json!({"geolocation": {"lat": 1}})).unwrap_err().is_bad_input());
        assert!(value(json!({"geolocation": "ezs42!"})).unwrap_err().is_bad_input());
        assert!(value(json!({"geolocation": 3})).unwrap_err().is_bad_input());
    }

    #[test]
    fn test_geobox_forms() {
        let expected = ValueKind::GeoBox(GeoBox::from_top_right_bottom_left(10.0, 5.0, -10.0, -5.0));
        assert_eq!(
            value(json!({"geobox": {"topLeft": {"lat": 10, "lon": -5}, "bottomRight": {"lat": -10, "lon": 5}}})).unwrap(),
            expected
        );
        assert_eq!(
            value(json!({"geobox": {"topRight": {"lat": 10, "lon": 5}, "bottomLeft": {"lat": -10, "lon": -5}}})).unwrap(),
            expected
        );
        assert_eq!(
            value(json!({"geobox": {"top": 10, "right": 5, "bottom": -10, "left": -5}})).unwrap(),
            expected
        );
        assert!(matches!(value(json!({"geobox": "u09"})).unwrap(), ValueKind::GeoBox(_)));
        assert!(value(json!({"geobox": {"top": 10}})).unwrap_err().is_bad_input());
        assert!(value(json!({"geobox": []})).unwrap_err().is_bad_input());
    }

    #[test]
    fn test_geocircle_and_polygon() {
        assert_eq!(
            value(json!({"geocircle": {"radius": 100, "center": {"lat": 1, "lon": 2}}})).unwrap(),
            ValueKind::GeoCircle(GeoCircle::new(GeoLocation::new(1.0, 2.0), 100.0))
        );
        assert!(value(json!({"geocircle": {"radius": 100}})).unwrap_err().is_bad_input());
        assert!(value(json!({"geocircle": {"center": "u09"}})).unwrap_err().is_bad_input());
        assert!(value(json!({"geocircle": {"radius": 1, "center": null}})).unwrap_err().is_bad_input());

        let polygon = value(json!({"geopolygon": ["u09", {"lat": 0, "lon": 0}, {"lat": 1, "lon": 1}]})).unwrap();
        assert!(matches!(polygon, ValueKind::GeoPolygon(ref p) if p.points.len() == 3));
        assert!(value(json!({"geopolygon": ["u09", "u08"]})).unwrap_err().is_bad_input());
        assert!(value(json!({"geopolygon": "u09"})).unwrap_err().is_bad_input());
    }
}
