//! Built-in criterion parsers.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::ast::{Comparator, CriterionKind, CriterionNode, SubscriptionStatus, ValueNode};
use crate::context::ParsingContext;
use crate::datasource::{DataSource, FieldPath};
use crate::error::{SegmentationError, SegmentationResult};
use crate::registry::CriterionNodeParser;

type CriterionParseResult = SegmentationResult<Option<CriterionNode>>;

pub fn default_criterion_parser() -> SegmentationResult<CriterionNodeParser> {
    let mut registry = CriterionNodeParser::for_criteria();
    registry.register_dynamic(parse_field);
    registry.register_exact("and", parse_and)?;
    registry.register_exact("or", parse_or)?;
    registry.register_exact("not", parse_not)?;
    registry.register_exact("eq", parse_eq)?;
    registry.register_exact("any", parse_any)?;
    registry.register_exact("all", parse_all)?;
    for key in ["gt", "gte", "lt", "lte"] {
        registry.register_exact(key, parse_comparison)?;
    }
    registry.register_exact("prefix", parse_prefix)?;
    registry.register_exact("inside", parse_inside)?;
    registry.register_exact("geo", parse_geo)?;
    registry.register_exact("lastActivityDate", parse_last_activity_date)?;
    registry.register_exact("presence", parse_presence)?;
    registry.register_exact("subscriptionStatus", parse_subscription_status)?;
    registry.register_exact("user", |ctx, key, input| parse_join(ctx, key, input, DataSource::User))?;
    registry.register_exact("installation", |ctx, key, input| {
        parse_join(ctx, key, input, DataSource::Installation)
    })?;
    registry.register_exact("event", |ctx, key, input| parse_join(ctx, key, input, DataSource::Event))?;
    Ok(registry)
}

fn ensure_object<'a>(key: &str, input: &'a Value) -> SegmentationResult<&'a Map<String, Value>> {
    input
        .as_object()
        .ok_or_else(|| SegmentationError::bad_input(format!("\"{key}\" expects an object")))
}

fn ensure_array<'a>(key: &str, input: &'a Value) -> SegmentationResult<&'a Vec<Value>> {
    input
        .as_array()
        .ok_or_else(|| SegmentationError::bad_input(format!("\"{key}\" expects an array")))
}

fn ensure_field_context(context: &ParsingContext, key: &str) -> SegmentationResult<()> {
    if context.data_source().is_root() {
        return Err(SegmentationError::bad_input(format!(
            "\"{key}\" cannot be used directly on \"{}\"",
            context.data_source()
        )));
    }
    Ok(())
}

fn ensure_installation_context(context: &ParsingContext, key: &str) -> SegmentationResult<()> {
    if context.data_source() != &DataSource::Installation {
        return Err(SegmentationError::bad_input(format!(
            "\"{key}\" is only available on installations, not on \"{}\"",
            context.data_source()
        )));
    }
    Ok(())
}

fn parse_child(context: &Arc<ParsingContext>, key: &str, input: &Value) -> SegmentationResult<CriterionNode> {
    context.parser.parse_criterion(context, ensure_object(key, input)?)
}

fn parse_values(context: &Arc<ParsingContext>, key: &str, input: &Value) -> SegmentationResult<Vec<ValueNode>> {
    ensure_array(key, input)?
        .iter()
        .map(|value| context.parser.parse_value(context, value))
        .collect()
}

/// `.foo.bar`: projects a field out of the current data source.
pub fn parse_field(context: &Arc<ParsingContext>, key: &str, input: &Value) -> CriterionParseResult {
    let Some(path) = key.strip_prefix('.') else {
        return Ok(None);
    };
    let input = ensure_object(key, input)?;
    let field = DataSource::field(&context.data_source, FieldPath::parse(path));
    let child_context = context.with_data_source(field);
    context.parser.parse_criterion(&child_context, input).map(Some)
}

fn parse_children(context: &Arc<ParsingContext>, key: &str, input: &Value) -> SegmentationResult<Vec<CriterionNode>> {
    ensure_array(key, input)?
        .iter()
        .map(|child| parse_child(context, key, child))
        .collect()
}

pub fn parse_and(context: &Arc<ParsingContext>, key: &str, input: &Value) -> CriterionParseResult {
    let children = parse_children(context, key, input)?;
    Ok(Some(CriterionNode::new(context, CriterionKind::And(children))))
}

pub fn parse_or(context: &Arc<ParsingContext>, key: &str, input: &Value) -> CriterionParseResult {
    let children = parse_children(context, key, input)?;
    Ok(Some(CriterionNode::new(context, CriterionKind::Or(children))))
}

pub fn parse_not(context: &Arc<ParsingContext>, key: &str, input: &Value) -> CriterionParseResult {
    let child = parse_child(context, key, input)?;
    Ok(Some(CriterionNode::new(context, CriterionKind::Not(child.boxed()))))
}

pub fn parse_eq(context: &Arc<ParsingContext>, key: &str, input: &Value) -> CriterionParseResult {
    ensure_field_context(context, key)?;
    let value = context.parser.parse_value(context, input)?;
    Ok(Some(CriterionNode::new(context, CriterionKind::Equality(value))))
}

pub fn parse_any(context: &Arc<ParsingContext>, key: &str, input: &Value) -> CriterionParseResult {
    ensure_field_context(context, key)?;
    let values = parse_values(context, key, input)?;
    Ok(Some(CriterionNode::new(context, CriterionKind::Any(values))))
}

pub fn parse_all(context: &Arc<ParsingContext>, key: &str, input: &Value) -> CriterionParseResult {
    ensure_field_context(context, key)?;
    let values = parse_values(context, key, input)?;
    Ok(Some(CriterionNode::new(context, CriterionKind::All(values))))
}

pub fn parse_comparison(context: &Arc<ParsingContext>, key: &str, input: &Value) -> CriterionParseResult {
    let Some(comparator) = Comparator::from_key(key) else {
        return Ok(None);
    };
    ensure_field_context(context, key)?;
    let value = context.parser.parse_value(context, input)?;
    Ok(Some(CriterionNode::new(
        context,
        CriterionKind::Comparison { comparator, value },
    )))
}

pub fn parse_prefix(context: &Arc<ParsingContext>, key: &str, input: &Value) -> CriterionParseResult {
    ensure_field_context(context, key)?;
    let value = context.parser.parse_value(context, input)?;
    if value.as_str().is_none() {
        return Err(SegmentationError::bad_input(format!("\"{key}\" expects a string")));
    }
    Ok(Some(CriterionNode::new(context, CriterionKind::Prefix(value))))
}

pub fn parse_inside(context: &Arc<ParsingContext>, key: &str, input: &Value) -> CriterionParseResult {
    ensure_field_context(context, key)?;
    let value = context.parser.parse_value(context, input)?;
    let area = value.as_geo_area().ok_or_else(|| {
        SegmentationError::bad_input(format!("\"{key}\" expects a geobox, a geocircle or a geopolygon"))
    })?;
    Ok(Some(CriterionNode::new(context, CriterionKind::Inside(area))))
}

fn parse_optional_child(
    context: &Arc<ParsingContext>,
    object: &Map<String, Value>,
    field: &str,
    data_source: impl FnOnce() -> DataSource,
) -> SegmentationResult<Option<Box<CriterionNode>>> {
    match object.get(field) {
        None => Ok(None),
        Some(input) => {
            let child_context = context.with_data_source(data_source());
            Ok(Some(parse_child(&child_context, field, input)?.boxed()))
        }
    }
}

pub fn parse_geo(context: &Arc<ParsingContext>, key: &str, input: &Value) -> CriterionParseResult {
    ensure_installation_context(context, key)?;
    let object = ensure_object(key, input)?;
    let parent = &context.data_source;
    let location = parse_optional_child(context, object, "location", || DataSource::GeoLocation {
        parent: Arc::clone(parent),
    })?;
    let date = parse_optional_child(context, object, "date", || DataSource::GeoDate {
        parent: Arc::clone(parent),
    })?;
    Ok(Some(CriterionNode::new(context, CriterionKind::Geo { location, date })))
}

pub fn parse_last_activity_date(context: &Arc<ParsingContext>, key: &str, input: &Value) -> CriterionParseResult {
    ensure_installation_context(context, key)?;
    let child_context = context.with_data_source(DataSource::LastActivityDate {
        parent: Arc::clone(&context.data_source),
    });
    let comparison = parse_child(&child_context, key, input)?;
    Ok(Some(CriterionNode::new(
        context,
        CriterionKind::LastActivityDate(Some(comparison.boxed())),
    )))
}

pub fn parse_presence(context: &Arc<ParsingContext>, key: &str, input: &Value) -> CriterionParseResult {
    ensure_installation_context(context, key)?;
    let object = ensure_object(key, input)?;
    let present = object
        .get("present")
        .and_then(Value::as_bool)
        .ok_or_else(|| SegmentationError::bad_input(format!("\"{key}\" expects a boolean \"present\"")))?;
    let parent = &context.data_source;
    let since_date = parse_optional_child(context, object, "sinceDate", || DataSource::PresenceSinceDate {
        parent: Arc::clone(parent),
        present,
    })?;
    let elapsed_time = parse_optional_child(context, object, "elapsedTime", || DataSource::PresenceElapsedTime {
        parent: Arc::clone(parent),
        present,
    })?;
    Ok(Some(CriterionNode::new(
        context,
        CriterionKind::Presence {
            present,
            since_date,
            elapsed_time,
        },
    )))
}

pub fn parse_subscription_status(context: &Arc<ParsingContext>, key: &str, input: &Value) -> CriterionParseResult {
    ensure_installation_context(context, key)?;
    let status: SubscriptionStatus = input
        .as_str()
        .ok_or_else(|| SegmentationError::bad_input(format!("\"{key}\" expects a string")))?
        .parse()?;
    Ok(Some(CriterionNode::new(context, CriterionKind::SubscriptionStatus(status))))
}

/// Moves evaluation to another kind of record.
///
/// Staying on the same root needs no join. Installations sit between users
/// and events, so going from one to the other takes two hops.
pub fn parse_join(
    context: &Arc<ParsingContext>,
    key: &str,
    input: &Value,
    target: DataSource,
) -> CriterionParseResult {
    let input = ensure_object(key, input)?;
    let current = context.data_source().root().clone();
    let parser = &context.parser;

    if current == target {
        let child_context = context.with_data_source(target);
        return parser.parse_criterion(&child_context, input).map(Some);
    }

    if current == DataSource::Installation || target == DataSource::Installation {
        let join_context = context.with_data_source(target);
        let child = parser.parse_criterion(&join_context, input)?;
        return Ok(Some(CriterionNode::new(&join_context, CriterionKind::Join(child.boxed()))));
    }

    let one_hop = context.with_data_source(DataSource::Installation);
    let two_hops = one_hop.with_data_source(target);
    let child = parser.parse_criterion(&two_hops, input)?;
    let inner = CriterionNode::new(&two_hops, CriterionKind::Join(child.boxed()));
    Ok(Some(CriterionNode::new(&one_hop, CriterionKind::Join(inner.boxed()))))
}
