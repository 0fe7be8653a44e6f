use std::fmt;
use std::sync::Arc;

use crate::datasource::DataSource;
use crate::parser::SegmentationDslParser;

/// Immutable parsing state shared by every node built under it.
///
/// Contexts form a chain through `parent`; a child only ever reads its
/// parent.
pub struct ParsingContext {
    pub parser: SegmentationDslParser,
    pub parent: Option<Arc<ParsingContext>>,
    pub data_source: Arc<DataSource>,
}

impl ParsingContext {
    pub fn root(parser: SegmentationDslParser, data_source: DataSource) -> Arc<Self> {
        Arc::new(Self {
            parser,
            parent: None,
            data_source: Arc::new(data_source),
        })
    }

    /// A child context reading from `data_source`, sharing this context's parser.
    pub fn with_data_source(self: &Arc<Self>, data_source: DataSource) -> Arc<Self> {
        Arc::new(Self {
            parser: self.parser.clone(),
            parent: Some(Arc::clone(self)),
            data_source: Arc::new(data_source),
        })
    }

    pub fn data_source(&self) -> &DataSource {
        &self.data_source
    }

    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent.as_deref();
        while let Some(context) = current {
            depth += 1;
            current = context.parent.as_deref();
        }
        depth
    }
}

impl fmt::Debug for ParsingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsingContext")
            .field("data_source", &self.data_source.name())
            .field("depth", &self.depth())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::FieldPath;

    #[test]
    fn test_child_context_links_to_parent() {
        let parser = SegmentationDslParser::default_parser().unwrap();
        let root = ParsingContext::root(parser, DataSource::Installation);
        let field = DataSource::field(&root.data_source, FieldPath::parse("foo"));
        let child = root.with_data_source(field);

        assert!(root.parent.is_none());
        assert!(Arc::ptr_eq(child.parent.as_ref().unwrap(), &root));
        assert_eq!(child.data_source().name(), "installation.foo");
        assert_eq!(child.depth(), 1);
        assert_eq!(root.data_source(), &DataSource::Installation);
        assert!(Arc::ptr_eq(&child.parser.config_handle(), &root.parser.config_handle()));
    }
}
