//! Segmentation DSL: parses JSON segment documents into a typed criterion
//! tree and evaluates it against installation, user and event records.
//!
//! ```ignore
//! let criterion = Segmenter::parse_installation_segment(&json!({".lang": {"eq": "fr"}}))?;
//! let member = Segmenter::new(Data::new(json!({"lang": "fr"}))).matches_installation(&criterion);
//! ```

pub mod ast;
pub mod catalog;
pub mod compare;
pub mod context;
pub mod criteria;
pub mod datasource;
pub mod duration;
pub mod error;
pub mod geo;
pub mod parser;
pub mod registry;
pub mod segmenter;
pub mod values;

pub use ast::{Comparator, CriterionKind, CriterionNode, SubscriptionStatus, ValueKind, ValueNode};
pub use catalog::{Segment, SegmentCatalog};
pub use context::ParsingContext;
pub use datasource::{DataSource, FieldPath};
pub use duration::Iso8601Duration;
pub use error::{SegmentationError, SegmentationResult};
pub use geo::{GeoArea, GeoBox, GeoCircle, GeoLocation, GeoPolygon, Geohash};
pub use parser::{ParserConfig, SegmentationDslParser};
pub use registry::{CriterionNodeParser, ParserRegistry, ValueNodeParser};
pub use segmenter::{Data, PresenceInfo, Segmenter};
