//! Key-dispatched parser registries.
//!
//! A registry first tries the parser registered for the exact key, then each
//! dynamic parser in registration order. A parser returns `Ok(None)` when the
//! key is not its own.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::ast::{CriterionNode, ValueNode};
use crate::context::ParsingContext;
use crate::error::{SegmentationError, SegmentationResult};

pub type ParseFn<T> =
    Box<dyn Fn(&Arc<ParsingContext>, &str, &Value) -> SegmentationResult<Option<T>> + Send + Sync>;

pub type CriterionNodeParser = ParserRegistry<CriterionNode>;
pub type ValueNodeParser = ParserRegistry<ValueNode>;

pub struct ParserRegistry<T> {
    exact: HashMap<String, ParseFn<T>>,
    dynamic: Vec<ParseFn<T>>,
    already_exists: fn(String) -> SegmentationError,
}

impl ParserRegistry<CriterionNode> {
    pub fn for_criteria() -> Self {
        Self::with_conflict_error(SegmentationError::CriterionParserAlreadyExists)
    }
}

impl ParserRegistry<ValueNode> {
    pub fn for_values() -> Self {
        Self::with_conflict_error(SegmentationError::ValueParserAlreadyExists)
    }
}

impl<T> ParserRegistry<T> {
    fn with_conflict_error(already_exists: fn(String) -> SegmentationError) -> Self {
        Self {
            exact: HashMap::new(),
            dynamic: Vec::new(),
            already_exists,
        }
    }

    /// Registers a parser for exactly `key`. A key can only be claimed once.
    pub fn register_exact<F>(&mut self, key: &str, parser: F) -> SegmentationResult<()>
    where
        F: Fn(&Arc<ParsingContext>, &str, &Value) -> SegmentationResult<Option<T>> + Send + Sync + 'static,
    {
        if self.exact.contains_key(key) {
            return Err((self.already_exists)(key.to_string()));
        }
        self.exact.insert(key.to_string(), Box::new(parser));
        Ok(())
    }

    pub fn register_dynamic<F>(&mut self, parser: F)
    where
        F: Fn(&Arc<ParsingContext>, &str, &Value) -> SegmentationResult<Option<T>> + Send + Sync + 'static,
    {
        self.dynamic.push(Box::new(parser));
    }

    pub fn has_exact(&self, key: &str) -> bool {
        self.exact.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.dynamic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `Ok(None)` when no parser claims the key.
    pub fn parse(&self, context: &Arc<ParsingContext>, key: &str, input: &Value) -> SegmentationResult<Option<T>> {
        if let Some(parser) = self.exact.get(key) {
            if let Some(node) = parser(context, key, input)? {
                return Ok(Some(node));
            }
        }
        for parser in &self.dynamic {
            if let Some(node) = parser(context, key, input)? {
                return Ok(Some(node));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ValueKind;
    use crate::datasource::DataSource;
    use crate::parser::SegmentationDslParser;
    use serde_json::json;

    fn context() -> Arc<ParsingContext> {
        ParsingContext::root(SegmentationDslParser::default_parser().unwrap(), DataSource::Installation)
    }

    #[test]
    fn test_exact_key_conflict() {
        let mut registry = ParserRegistry::for_values();
        registry.register_exact("answer", |ctx, _, _| Ok(Some(ValueNode::new(ctx, ValueKind::Null)))).unwrap();
        let err = registry.register_exact("answer", |_, _, _| Ok(None)).unwrap_err();
        assert_eq!(err, SegmentationError::ValueParserAlreadyExists("answer".into()));

        let mut criteria = ParserRegistry::for_criteria();
        criteria.register_exact("x", |_, _, _| Ok(None)).unwrap();
        assert!(matches!(
            criteria.register_exact("x", |_, _, _| Ok(None)),
            Err(SegmentationError::CriterionParserAlreadyExists(_))
        ));
    }

    #[test]
    fn test_exact_before_dynamic() {
        let mut registry = ParserRegistry::for_values();
        registry.register_dynamic(|ctx, _, _| Ok(Some(ValueNode::new(ctx, ValueKind::Boolean(false)))));
        registry
            .register_exact("answer", |ctx, _, _| Ok(Some(ValueNode::new(ctx, ValueKind::Boolean(true)))))
            .unwrap();

        let ctx = context();
        let exact = registry.parse(&ctx, "answer", &json!(1)).unwrap().unwrap();
        assert_eq!(exact.kind, ValueKind::Boolean(true));
        let other = registry.parse(&ctx, "other", &json!(1)).unwrap().unwrap();
        assert_eq!(other.kind, ValueKind::Boolean(false));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_dynamic_order_and_miss() {
        let mut registry = ParserRegistry::for_values();
        registry.register_dynamic(|ctx, key, _| {
            Ok(key.starts_with('a').then(|| ValueNode::new(ctx, ValueKind::String("first".into()))))
        });
        registry.register_dynamic(|ctx, _, _| Ok(Some(ValueNode::new(ctx, ValueKind::String("second".into())))));

        let ctx = context();
        assert_eq!(registry.parse(&ctx, "abc", &json!(null)).unwrap().unwrap().as_str(), Some("first"));
        assert_eq!(registry.parse(&ctx, "xyz", &json!(null)).unwrap().unwrap().as_str(), Some("second"));
        assert!(ParserRegistry::for_values().parse(&ctx, "xyz", &json!(null)).unwrap().is_none());
    }

    #[test]
    fn test_errors_propagate() {
        let mut registry = ParserRegistry::for_criteria();
        registry.register_exact("bad", |_, _, _| Err(SegmentationError::bad_input("nope"))).unwrap();
        assert!(registry.parse(&context(), "bad", &json!({})).unwrap_err().is_bad_input());
    }
}
