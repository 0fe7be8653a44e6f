//! Segment document parser.
//!
//! A segment is a JSON object; each key names a criterion and its value is
//! handed to the parser registered for that key. Criterion and value parsers
//! are looked up in the registries carried by [`ParserConfig`], so new
//! criteria plug in without touching this module.

use std::fmt;
use std::sync::Arc;

use campaign_core::config::ParserSettings;
use serde_json::{Map, Value};
use tracing::debug;

use crate::ast::{CriterionKind, CriterionNode, ValueKind, ValueNode};
use crate::context::ParsingContext;
use crate::criteria::default_criterion_parser;
use crate::datasource::DataSource;
use crate::error::{SegmentationError, SegmentationResult};
use crate::registry::{CriterionNodeParser, ValueNodeParser};
use crate::values::default_value_parser;

pub struct ParserConfig {
    pub value_parser: ValueNodeParser,
    pub criterion_parser: CriterionNodeParser,
    /// Keep unrecognised criteria as `Unknown` nodes instead of failing.
    pub accept_unknown_criteria: bool,
    /// Keep unrecognised values as `Unknown` nodes instead of failing.
    pub accept_unknown_values: bool,
}

impl ParserConfig {
    pub fn new(
        value_parser: ValueNodeParser,
        criterion_parser: CriterionNodeParser,
        accept_unknown_criteria: bool,
        accept_unknown_values: bool,
    ) -> Self {
        Self {
            value_parser,
            criterion_parser,
            accept_unknown_criteria,
            accept_unknown_values,
        }
    }

    /// Built-in registries with the leniency flags from `settings`.
    pub fn from_settings(settings: &ParserSettings) -> SegmentationResult<Self> {
        Ok(Self::new(
            default_value_parser()?,
            default_criterion_parser()?,
            settings.accept_unknown_criteria,
            settings.accept_unknown_values,
        ))
    }
}

impl fmt::Debug for ParserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserConfig")
            .field("value_parsers", &self.value_parser.len())
            .field("criterion_parsers", &self.criterion_parser.len())
            .field("accept_unknown_criteria", &self.accept_unknown_criteria)
            .field("accept_unknown_values", &self.accept_unknown_values)
            .finish()
    }
}

/// Cheap to clone; clones share the same configuration.
#[derive(Clone, Debug)]
pub struct SegmentationDslParser {
    config: Arc<ParserConfig>,
}

impl SegmentationDslParser {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Built-in parsers; unknown criteria and values are kept.
    pub fn default_parser() -> SegmentationResult<Self> {
        Self::from_settings(&ParserSettings::default())
    }

    /// Built-in parsers; unknown criteria and values are errors.
    pub fn default_throwing_parser() -> SegmentationResult<Self> {
        Self::from_settings(&ParserSettings::strict())
    }

    pub fn from_settings(settings: &ParserSettings) -> SegmentationResult<Self> {
        Ok(Self::new(ParserConfig::from_settings(settings)?))
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn config_handle(&self) -> Arc<ParserConfig> {
        Arc::clone(&self.config)
    }

    /// Parses a whole segment document rooted at `data_source`.
    pub fn parse(&self, input: &Value, data_source: DataSource) -> SegmentationResult<CriterionNode> {
        let object = input
            .as_object()
            .ok_or_else(|| SegmentationError::bad_input("A segment must be a JSON object"))?;
        let context = ParsingContext::root(self.clone(), data_source);
        self.parse_criterion(&context, object)
    }

    /// Parses an object of criteria. Several keys are combined with a
    /// logical and, in document order.
    pub fn parse_criterion(
        &self,
        context: &Arc<ParsingContext>,
        input: &Map<String, Value>,
    ) -> SegmentationResult<CriterionNode> {
        match input.len() {
            0 if context.data_source().is_root() => Ok(CriterionNode::new(context, CriterionKind::MatchAll)),
            0 => Err(SegmentationError::bad_input(format!(
                "Missing data criterion for \"{}\"",
                context.data_source()
            ))),
            1 => {
                let (key, value) = input.iter().next().ok_or_else(|| SegmentationError::bad_input("Empty criterion"))?;
                self.parse_single_criterion(context, key, value)
            }
            _ => {
                let children = input
                    .iter()
                    .map(|(key, value)| self.parse_single_criterion(context, key, value))
                    .collect::<SegmentationResult<Vec<_>>>()?;
                Ok(CriterionNode::new(context, CriterionKind::And(children)))
            }
        }
    }

    fn parse_single_criterion(
        &self,
        context: &Arc<ParsingContext>,
        key: &str,
        value: &Value,
    ) -> SegmentationResult<CriterionNode> {
        if key.is_empty() {
            return Err(SegmentationError::bad_input("Criterion keys cannot be empty"));
        }
        match self.config.criterion_parser.parse(context, key, value)? {
            Some(node) => Ok(node),
            None if self.config.accept_unknown_criteria => {
                debug!(key, data_source = %context.data_source(), "keeping unknown criterion");
                Ok(CriterionNode::new(
                    context,
                    CriterionKind::Unknown {
                        key: key.to_string(),
                        value: value.clone(),
                    },
                ))
            }
            None => Err(SegmentationError::UnknownCriterion {
                key: key.to_string(),
                value: value.clone(),
            }),
        }
    }

    /// Parses a value: JSON scalars are literals, single-key objects go
    /// through the value registry.
    pub fn parse_value(&self, context: &Arc<ParsingContext>, input: &Value) -> SegmentationResult<ValueNode> {
        let kind = match input {
            Value::Null => ValueKind::Null,
            Value::Bool(b) => ValueKind::Boolean(*b),
            Value::Number(n) => ValueKind::Number(n.clone()),
            Value::String(s) => ValueKind::String(s.clone()),
            Value::Array(_) => return Err(SegmentationError::bad_input("Arrays are not valid values")),
            Value::Object(object) => return self.parse_object_value(context, object),
        };
        Ok(ValueNode::new(context, kind))
    }

    fn parse_object_value(
        &self,
        context: &Arc<ParsingContext>,
        object: &Map<String, Value>,
    ) -> SegmentationResult<ValueNode> {
        let mut entries = object.iter();
        let (key, value) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(SegmentationError::bad_input(format!(
                    "Object values must have exactly one key, got {}",
                    object.len()
                )))
            }
        };
        if key.is_empty() {
            return Err(SegmentationError::bad_input("Value keys cannot be empty"));
        }
        match self.config.value_parser.parse(context, key, value)? {
            Some(node) => Ok(node),
            None if self.config.accept_unknown_values => {
                debug!(key, "keeping unknown value");
                Ok(ValueNode::new(
                    context,
                    ValueKind::Unknown {
                        key: key.clone(),
                        value: value.clone(),
                    },
                ))
            }
            None => Err(SegmentationError::UnknownValue {
                key: key.clone(),
                value: value.clone(),
            }),
        }
    }
}
