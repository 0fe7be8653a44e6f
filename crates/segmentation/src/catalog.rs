//! Named segments, parsed once and evaluated many times.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use campaign_core::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::ast::CriterionNode;
use crate::datasource::DataSource;
use crate::error::SegmentationResult;
use crate::parser::SegmentationDslParser;
use crate::segmenter::{Data, Segmenter};

#[derive(Debug, Clone)]
pub struct Segment {
    pub id: Uuid,
    pub name: String,
    /// The document the segment was parsed from.
    pub document: Value,
    pub criteria: Arc<CriterionNode>,
    pub created_at: DateTime<Utc>,
    /// Registration order within the catalog.
    pub sequence: u64,
}

pub struct SegmentCatalog {
    parser: SegmentationDslParser,
    clock: Arc<dyn Clock>,
    segments: DashMap<Uuid, Segment>,
    next_sequence: AtomicU64,
}

impl SegmentCatalog {
    pub fn new(parser: SegmentationDslParser) -> Self {
        Self::with_clock(parser, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(parser: SegmentationDslParser, clock: Arc<dyn Clock>) -> Self {
        Self {
            parser,
            clock,
            segments: DashMap::new(),
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Parses `document` as an installation segment and stores it. Nothing
    /// is stored when parsing fails.
    pub fn register(&self, name: impl Into<String>, document: Value) -> SegmentationResult<Uuid> {
        let criteria = self.parser.parse(&document, DataSource::Installation)?;
        let segment = Segment {
            id: Uuid::new_v4(),
            name: name.into(),
            document,
            criteria: Arc::new(criteria),
            created_at: Utc::now(),
            sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
        };
        let id = segment.id;
        info!(segment_id = %id, name = %segment.name, "registered segment");
        self.segments.insert(id, segment);
        Ok(id)
    }

    pub fn get(&self, id: &Uuid) -> Option<Segment> {
        self.segments.get(id).map(|s| s.clone())
    }

    pub fn remove(&self, id: &Uuid) -> Option<Segment> {
        self.segments.remove(id).map(|(_, segment)| segment)
    }

    /// All segments, in registration order.
    pub fn list(&self) -> Vec<Segment> {
        let mut segments: Vec<Segment> = self.segments.iter().map(|s| s.value().clone()).collect();
        segments.sort_by_key(|segment| segment.sequence);
        segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Ids of the segments `data` belongs to, in registration order.
    pub fn matching_segments(&self, data: &Data) -> Vec<Uuid> {
        let segmenter = Segmenter::with_clock(data.clone(), Arc::clone(&self.clock));
        self.list()
            .into_iter()
            .filter(|segment| segmenter.matches_installation(&segment.criteria))
            .map(|segment| segment.id)
            .collect()
    }
}
