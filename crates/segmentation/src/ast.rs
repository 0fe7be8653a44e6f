//! Parsed form of a segment document.
//!
//! Every node keeps the [`ParsingContext`] it was built under, so the
//! evaluator knows which data source a criterion reads from.

use std::fmt;
use std::sync::Arc;

use serde_json::{Number, Value};

use crate::context::ParsingContext;
use crate::duration::Iso8601Duration;
use crate::error::{SegmentationError, SegmentationResult};
use crate::geo::{GeoArea, GeoBox, GeoCircle, GeoLocation, GeoPolygon};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparator {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "gt" => Some(Comparator::Gt),
            "gte" => Some(Comparator::Gte),
            "lt" => Some(Comparator::Lt),
            "lte" => Some(Comparator::Lte),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::Gt => "gt",
            Comparator::Gte => "gte",
            Comparator::Lt => "lt",
            Comparator::Lte => "lte",
        }
    }

    pub fn accepts(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Comparator::Gt => ordering == Greater,
            Comparator::Gte => ordering != Less,
            Comparator::Lt => ordering == Less,
            Comparator::Lte => ordering != Greater,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    OptIn,
    OptOut,
    SoftOptOut,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::OptIn => "optIn",
            SubscriptionStatus::OptOut => "optOut",
            SubscriptionStatus::SoftOptOut => "softOptOut",
        }
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = SegmentationError;

    fn from_str(s: &str) -> SegmentationResult<Self> {
        match s {
            "optIn" => Ok(SubscriptionStatus::OptIn),
            "optOut" => Ok(SubscriptionStatus::OptOut),
            "softOptOut" => Ok(SubscriptionStatus::SoftOptOut),
            other => Err(SegmentationError::bad_input(format!(
                "\"subscriptionStatus\" expects one of \"optIn\", \"optOut\" or \"softOptOut\", got \"{other}\""
            ))),
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CriterionNode {
    pub context: Arc<ParsingContext>,
    pub kind: CriterionKind,
}

#[derive(Debug, Clone)]
pub enum CriterionKind {
    MatchAll,
    Equality(ValueNode),
    Comparison {
        comparator: Comparator,
        value: ValueNode,
    },
    /// The value is always a string literal.
    Prefix(ValueNode),
    All(Vec<ValueNode>),
    Any(Vec<ValueNode>),
    Not(Box<CriterionNode>),
    And(Vec<CriterionNode>),
    Or(Vec<CriterionNode>),
    Inside(GeoArea),
    Geo {
        location: Option<Box<CriterionNode>>,
        date: Option<Box<CriterionNode>>,
    },
    /// Without a comparison, matches any recorded activity.
    LastActivityDate(Option<Box<CriterionNode>>),
    Presence {
        present: bool,
        since_date: Option<Box<CriterionNode>>,
        elapsed_time: Option<Box<CriterionNode>>,
    },
    SubscriptionStatus(SubscriptionStatus),
    /// Evaluates `child` against the records of the context's data source.
    Join(Box<CriterionNode>),
    Unknown {
        key: String,
        value: Value,
    },
}

impl CriterionNode {
    pub fn new(context: &Arc<ParsingContext>, kind: CriterionKind) -> Self {
        Self {
            context: Arc::clone(context),
            kind,
        }
    }

    pub fn boxed(self) -> Box<Self> {
        Box::new(self)
    }

    /// Short name of the node, used in logs.
    pub fn label(&self) -> &'static str {
        match &self.kind {
            CriterionKind::MatchAll => "matchAll",
            CriterionKind::Equality(_) => "eq",
            CriterionKind::Comparison { comparator, .. } => comparator.as_str(),
            CriterionKind::Prefix(_) => "prefix",
            CriterionKind::All(_) => "all",
            CriterionKind::Any(_) => "any",
            CriterionKind::Not(_) => "not",
            CriterionKind::And(_) => "and",
            CriterionKind::Or(_) => "or",
            CriterionKind::Inside(_) => "inside",
            CriterionKind::Geo { .. } => "geo",
            CriterionKind::LastActivityDate(_) => "lastActivityDate",
            CriterionKind::Presence { .. } => "presence",
            CriterionKind::SubscriptionStatus(_) => "subscriptionStatus",
            CriterionKind::Join(_) => "join",
            CriterionKind::Unknown { .. } => "unknown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValueNode {
    pub context: Arc<ParsingContext>,
    pub kind: ValueKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Null,
    Boolean(bool),
    Number(Number),
    String(String),
    /// Milliseconds since the Unix epoch.
    Date(Number),
    /// Resolved against the evaluation clock.
    RelativeDate(Iso8601Duration),
    /// Milliseconds.
    Duration(Number),
    /// Calendar duration, resolved against the evaluation clock.
    CalendarDuration(Iso8601Duration),
    GeoLocation(GeoLocation),
    GeoBox(GeoBox),
    GeoCircle(GeoCircle),
    GeoPolygon(GeoPolygon),
    Unknown {
        key: String,
        value: Value,
    },
}

impl ValueNode {
    pub fn new(context: &Arc<ParsingContext>, kind: ValueKind) -> Self {
        Self {
            context: Arc::clone(context),
            kind,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ValueKind::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_geo_area(&self) -> Option<GeoArea> {
        match &self.kind {
            ValueKind::GeoBox(b) => Some(GeoArea::Box(*b)),
            ValueKind::GeoCircle(c) => Some(GeoArea::Circle(*c)),
            ValueKind::GeoPolygon(p) => Some(GeoArea::Polygon(p.clone())),
            _ => None,
        }
    }
}
