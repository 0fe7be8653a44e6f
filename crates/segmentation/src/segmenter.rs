//! Evaluates parsed segments against an installation's data.

use std::sync::Arc;

use campaign_core::{Clock, SystemClock};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use tracing::{debug, trace, warn};

use crate::ast::{Comparator, CriterionKind, CriterionNode, SubscriptionStatus, ValueKind, ValueNode};
use crate::compare::{compare_values, values_equal};
use crate::datasource::{DataSource, FieldPath};
use crate::error::SegmentationResult;
use crate::geo::{GeoArea, GeoLocation};
use crate::parser::SegmentationDslParser;
use crate::values::parse_absolute_date;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceInfo {
    pub from_date: i64,
    pub until_date: i64,
    pub elapsed_time: i64,
}

impl PresenceInfo {
    pub fn new(from_date: i64, until_date: i64, elapsed_time: i64) -> Self {
        Self {
            from_date,
            until_date,
            elapsed_time,
        }
    }
}

/// Everything a segment can look at for one installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Data {
    #[serde(default = "empty_object")]
    pub installation: Value,
    #[serde(default)]
    pub user: Option<Value>,
    #[serde(default, rename = "events", alias = "allEvents")]
    pub all_events: Vec<Value>,
    #[serde(default)]
    pub presence_info: Option<PresenceInfo>,
    #[serde(default)]
    pub last_app_open_date: i64,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

static EMPTY_RECORD: Lazy<Value> = Lazy::new(empty_object);

impl Default for Data {
    fn default() -> Self {
        Self::new(empty_object())
    }
}

impl Data {
    pub fn new(installation: Value) -> Self {
        Self {
            installation,
            user: None,
            all_events: Vec::new(),
            presence_info: None,
            last_app_open_date: 0,
        }
    }

    pub fn with_installation(self, installation: Value) -> Self {
        Self { installation, ..self }
    }

    pub fn with_user(self, user: Value) -> Self {
        Self {
            user: Some(user),
            ..self
        }
    }

    pub fn with_all_events(self, all_events: Vec<Value>) -> Self {
        Self { all_events, ..self }
    }

    pub fn with_newer_event(mut self, event: Value) -> Self {
        self.all_events.push(event);
        self
    }

    pub fn with_presence_info(self, presence_info: Option<PresenceInfo>) -> Self {
        Self { presence_info, ..self }
    }

    pub fn with_last_app_open_date(self, last_app_open_date: i64) -> Self {
        Self {
            last_app_open_date,
            ..self
        }
    }
}

pub struct Segmenter {
    data: Data,
    clock: Arc<dyn Clock>,
}

impl Segmenter {
    pub fn new(data: Data) -> Self {
        Self::with_clock(data, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(data: Data, clock: Arc<dyn Clock>) -> Self {
        Self { data, clock }
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    /// Parses `segment` with the lenient built-in parser, rooted at the
    /// installation.
    pub fn parse_installation_segment(segment: &Value) -> SegmentationResult<CriterionNode> {
        SegmentationDslParser::default_parser()?.parse(segment, DataSource::Installation)
    }

    pub fn matches(&self, criterion: &CriterionNode) -> bool {
        self.matches_installation(criterion)
    }

    /// Whether the installation belongs to the segment. Relative dates and
    /// presence are resolved against a single reading of the clock.
    pub fn matches_installation(&self, criterion: &CriterionNode) -> bool {
        let visitor = Visitor {
            data: &self.data,
            record: &self.data.installation,
            now: self.clock.now_millis(),
        };
        let result = visitor.matches(criterion);
        debug!(criterion = criterion.label(), result, "evaluated segment");
        result
    }
}

/// Evaluation state: the record that field sources read from, which
/// changes when a join moves to a user or an event.
#[derive(Clone, Copy)]
struct Visitor<'a> {
    data: &'a Data,
    record: &'a Value,
    now: i64,
}

impl<'a> Visitor<'a> {
    fn on(&self, record: &'a Value) -> Self {
        Self { record, ..*self }
    }

    fn matches(&self, node: &CriterionNode) -> bool {
        let result = match &node.kind {
            CriterionKind::MatchAll => true,
            CriterionKind::Equality(value) => self.matches_equality(node.context.data_source(), value),
            CriterionKind::Comparison { comparator, value } => {
                self.matches_comparison(node.context.data_source(), *comparator, value)
            }
            CriterionKind::Prefix(value) => self.matches_prefix(node.context.data_source(), value),
            CriterionKind::Any(values) => self.matches_any(node.context.data_source(), values),
            CriterionKind::All(values) => self.matches_all(node.context.data_source(), values),
            CriterionKind::Not(child) => !self.matches(child),
            CriterionKind::And(children) => children.iter().all(|child| self.matches(child)),
            CriterionKind::Or(children) => children.iter().any(|child| self.matches(child)),
            CriterionKind::Inside(area) => self.matches_inside(node.context.data_source(), area),
            CriterionKind::Geo { location, date } => {
                location.as_ref().map_or(true, |c| self.matches(c)) && date.as_ref().map_or(true, |c| self.matches(c))
            }
            CriterionKind::LastActivityDate(comparison) => match comparison {
                Some(comparison) => self.matches(comparison),
                None => self.data.last_app_open_date > 0,
            },
            CriterionKind::Presence {
                present,
                since_date,
                elapsed_time,
            } => self.matches_presence(*present, since_date.as_deref(), elapsed_time.as_deref()),
            CriterionKind::SubscriptionStatus(expected) => self.subscription_status() == *expected,
            CriterionKind::Join(child) => self.matches_join(node.context.data_source(), child),
            CriterionKind::Unknown { key, .. } => {
                warn!(key = %key, "unknown criterion never matches");
                false
            }
        };
        trace!(criterion = node.label(), data_source = %node.context.data_source(), result);
        result
    }

    fn resolve(&self, value: &ValueNode) -> Option<Value> {
        match &value.kind {
            ValueKind::Null => Some(Value::Null),
            ValueKind::Boolean(b) => Some(Value::Bool(*b)),
            ValueKind::Number(n) | ValueKind::Date(n) | ValueKind::Duration(n) => Some(Value::Number(n.clone())),
            ValueKind::String(s) => Some(Value::String(s.clone())),
            ValueKind::RelativeDate(duration) => Some(Value::from(duration.apply_to(self.now))),
            ValueKind::CalendarDuration(duration) => {
                Some(Value::from(duration.apply_to(self.now).saturating_sub(self.now)))
            }
            ValueKind::GeoLocation(_) | ValueKind::GeoBox(_) | ValueKind::GeoCircle(_) | ValueKind::GeoPolygon(_) => {
                None
            }
            ValueKind::Unknown { key, .. } => {
                warn!(key = %key, "unknown value never matches");
                None
            }
        }
    }

    fn values(&self, data_source: &DataSource) -> Vec<Value> {
        match data_source {
            DataSource::Installation | DataSource::User | DataSource::Event => Vec::new(),
            DataSource::Field { .. } => field_values(self.record, &data_source.full_path()),
            DataSource::LastActivityDate { .. } => vec![Value::from(self.data.last_app_open_date)],
            DataSource::PresenceSinceDate { present, .. } => {
                let since = match (self.data.presence_info, present) {
                    (None, true) => self.now,
                    (None, false) => i64::MAX,
                    (Some(info), true) => info.from_date,
                    (Some(info), false) => info.until_date,
                };
                vec![Value::from(since)]
            }
            DataSource::PresenceElapsedTime { present, .. } => {
                let elapsed = match (self.data.presence_info, present) {
                    (None, _) => 0,
                    (Some(info), true) => self.now.saturating_sub(info.from_date).max(0),
                    (Some(info), false) => info.elapsed_time,
                };
                vec![Value::from(elapsed)]
            }
            DataSource::GeoLocation { .. } => field_values(&self.data.installation, &FieldPath::parse("geo.location")),
            DataSource::GeoDate { .. } => field_values(&self.data.installation, &FieldPath::parse("geo.date")),
        }
    }

    fn matches_equality(&self, data_source: &DataSource, value: &ValueNode) -> bool {
        self.contains(&self.values(data_source), value)
    }

    /// `null` stands for "no value at all".
    fn contains(&self, values: &[Value], value: &ValueNode) -> bool {
        match self.resolve(value) {
            None => false,
            Some(Value::Null) => values.is_empty(),
            Some(expected) => values.iter().any(|actual| values_equal(&expected, actual)),
        }
    }

    fn matches_any(&self, data_source: &DataSource, candidates: &[ValueNode]) -> bool {
        let values = self.values(data_source);
        candidates.iter().any(|candidate| self.contains(&values, candidate))
    }

    fn matches_all(&self, data_source: &DataSource, required: &[ValueNode]) -> bool {
        let values = self.values(data_source);
        required.iter().all(|value| self.contains(&values, value))
    }

    fn matches_comparison(&self, data_source: &DataSource, comparator: Comparator, value: &ValueNode) -> bool {
        let Some(expected) = self.resolve(value) else {
            return false;
        };
        self.values(data_source).iter().any(|actual| {
            compare_values(actual, &expected).map_or(false, |ordering| comparator.accepts(ordering))
        })
    }

    fn matches_prefix(&self, data_source: &DataSource, value: &ValueNode) -> bool {
        let Some(prefix) = value.as_str() else {
            return false;
        };
        self.values(data_source)
            .iter()
            .any(|actual| actual.as_str().map_or(false, |s| s.starts_with(prefix)))
    }

    fn matches_inside(&self, data_source: &DataSource, area: &GeoArea) -> bool {
        self.values(data_source)
            .iter()
            .filter_map(GeoLocation::from_json)
            .any(|point| area.contains(&point))
    }

    fn matches_presence(
        &self,
        expected: bool,
        since_date: Option<&CriterionNode>,
        elapsed_time: Option<&CriterionNode>,
    ) -> bool {
        let present = self
            .data
            .presence_info
            .map_or(true, |info| info.from_date <= self.now && self.now <= info.until_date);
        if present != expected {
            debug!(expected, present, "presence mismatch");
            return false;
        }
        elapsed_time.map_or(true, |c| self.matches(c)) && since_date.map_or(true, |c| self.matches(c))
    }

    fn subscription_status(&self) -> SubscriptionStatus {
        let installation = self.data.installation.as_object();
        let has_push_token = installation
            .and_then(|i| i.get("pushToken"))
            .and_then(|t| t.get("data"))
            .and_then(Value::as_str)
            .map_or(false, |token| !token.is_empty());
        if !has_push_token {
            return SubscriptionStatus::OptOut;
        }
        let opted_out = installation
            .and_then(|i| i.get("preferences"))
            .and_then(|p| p.get("subscriptionStatus"))
            .and_then(Value::as_str)
            == Some("optOut");
        if opted_out {
            SubscriptionStatus::SoftOptOut
        } else {
            SubscriptionStatus::OptIn
        }
    }

    fn matches_join(&self, target: &DataSource, child: &CriterionNode) -> bool {
        match target {
            DataSource::Event => {
                let matched = self.data.all_events.iter().any(|event| self.on(event).matches(child));
                debug!(events = self.data.all_events.len(), matched, "evaluated event join");
                matched
            }
            DataSource::Installation => self.on(&self.data.installation).matches(child),
            DataSource::User => match &self.data.user {
                Some(user) => self.on(user).matches(child),
                None => {
                    debug!("no user record, user fields read as absent");
                    self.on(&EMPTY_RECORD).matches(child)
                }
            },
            other => {
                warn!(data_source = %other, "unsupported join target");
                false
            }
        }
    }
}

fn read_path<'v>(record: &'v Value, path: &FieldPath) -> Option<&'v Value> {
    path.parts().iter().try_fold(record, |current, part| match current {
        Value::Object(map) => map.get(part),
        Value::Array(items) => items.get(part.parse::<usize>().ok()?),
        _ => None,
    })
}

fn is_custom_date(path: &FieldPath) -> bool {
    let parts = path.parts();
    parts.len() >= 2
        && parts[0] == "custom"
        && parts.last().map_or(false, |last| last.starts_with("date_"))
}

/// Values found at `path`: array elements minus nulls, nothing for a
/// missing or null field, or the single value otherwise. Strings under
/// `custom.…date_*` fields read as epoch milliseconds when they parse as
/// dates.
fn field_values(record: &Value, path: &FieldPath) -> Vec<Value> {
    let values: Vec<Value> = match read_path(record, path) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter(|item| !item.is_null()).cloned().collect(),
        Some(value) => vec![value.clone()],
    };
    if !is_custom_date(path) {
        return values;
    }
    values
        .into_iter()
        .map(|value| {
            let millis = value.as_str().and_then(parse_absolute_date);
            millis.map_or(value, |millis| Value::Number(Number::from(millis)))
        })
        .collect()
}
