//! Where a criterion reads its values from.
//!
//! `Installation`, `User` and `Event` are the roots. Every other source wraps
//! a parent and projects something out of it.

use std::fmt;
use std::sync::Arc;

/// A dotted path into a JSON record, split into its segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FieldPath {
    parts: Vec<String>,
}

impl FieldPath {
    pub fn new(parts: Vec<String>) -> Self {
        Self { parts }
    }

    pub fn parse(dotted: &str) -> Self {
        Self::new(dotted.split('.').map(str::to_string).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn concat(&self, other: &FieldPath) -> FieldPath {
        let mut parts = self.parts.clone();
        parts.extend(other.parts.iter().cloned());
        FieldPath::new(parts)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.parts.join("."))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    Installation,
    User,
    Event,
    Field {
        parent: Arc<DataSource>,
        path: FieldPath,
    },
    LastActivityDate {
        parent: Arc<DataSource>,
    },
    PresenceSinceDate {
        parent: Arc<DataSource>,
        present: bool,
    },
    PresenceElapsedTime {
        parent: Arc<DataSource>,
        present: bool,
    },
    GeoLocation {
        parent: Arc<DataSource>,
    },
    GeoDate {
        parent: Arc<DataSource>,
    },
}

impl DataSource {
    /// Projects `path` out of `parent`. Projecting out of a field extends
    /// that field's path instead of nesting a second field source.
    pub fn field(parent: &Arc<DataSource>, path: FieldPath) -> DataSource {
        match parent.as_ref() {
            DataSource::Field {
                parent: grand_parent,
                path: parent_path,
            } => DataSource::Field {
                parent: Arc::clone(grand_parent),
                path: parent_path.concat(&path),
            },
            _ => DataSource::Field {
                parent: Arc::clone(parent),
                path,
            },
        }
    }

    pub fn parent(&self) -> Option<&Arc<DataSource>> {
        match self {
            DataSource::Installation | DataSource::User | DataSource::Event => None,
            DataSource::Field { parent, .. }
            | DataSource::LastActivityDate { parent }
            | DataSource::PresenceSinceDate { parent, .. }
            | DataSource::PresenceElapsedTime { parent, .. }
            | DataSource::GeoLocation { parent }
            | DataSource::GeoDate { parent } => Some(parent),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    /// The nearest of `Installation`, `User` or `Event` up the parent chain.
    pub fn root(&self) -> &DataSource {
        let mut current = self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    pub fn name(&self) -> String {
        match self {
            DataSource::Installation => "installation".to_string(),
            DataSource::User => "user".to_string(),
            DataSource::Event => "event".to_string(),
            DataSource::Field { parent, path } => format!("{}.{}", parent.name(), path),
            DataSource::LastActivityDate { .. } => "lastActivityDate".to_string(),
            DataSource::PresenceSinceDate { .. } => "presence.sinceDate".to_string(),
            DataSource::PresenceElapsedTime { .. } => "presence.elapsedTime".to_string(),
            DataSource::GeoLocation { .. } => "geo.location".to_string(),
            DataSource::GeoDate { .. } => "geo.date".to_string(),
        }
    }

    /// Path of a field source relative to its root record, with the paths
    /// of any field ancestors prepended.
    pub fn full_path(&self) -> FieldPath {
        match self {
            DataSource::Field { parent, path } => parent.full_path().concat(path),
            _ => FieldPath::default(),
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(parts: &[&str]) -> FieldPath {
        FieldPath::new(parts.iter().map(|p| p.to_string()).collect())
    }

    #[test]
    fn test_source_names() {
        let installation = Arc::new(DataSource::Installation);
        let user = Arc::new(DataSource::User);
        let event = Arc::new(DataSource::Event);
        assert_eq!(DataSource::field(&user, path(&["foo", "bar"])).name(), "user.foo.bar");
        assert_eq!(DataSource::field(&installation, path(&["foo", "bar"])).name(), "installation.foo.bar");
        assert_eq!(DataSource::field(&event, path(&["foo", "bar"])).name(), "event.foo.bar");
        let nested = DataSource::Field {
            parent: Arc::new(DataSource::field(&installation, path(&["foo"]))),
            path: path(&["bar"]),
        };
        assert_eq!(nested.name(), "installation.foo.bar");
        assert_eq!(nested.full_path(), path(&["foo", "bar"]));

        let parent = Arc::clone(&installation);
        assert_eq!(DataSource::LastActivityDate { parent: parent.clone() }.name(), "lastActivityDate");
        assert_eq!(DataSource::PresenceSinceDate { parent: parent.clone(), present: false }.name(), "presence.sinceDate");
        assert_eq!(DataSource::PresenceElapsedTime { parent: parent.clone(), present: false }.name(), "presence.elapsedTime");
        assert_eq!(DataSource::GeoLocation { parent: parent.clone() }.name(), "geo.location");
        assert_eq!(DataSource::GeoDate { parent }.name(), "geo.date");
    }

    #[test]
    fn test_root_follows_parents() {
        let user = Arc::new(DataSource::User);
        let field = Arc::new(DataSource::field(&user, path(&["a"])));
        let deeper = DataSource::field(&field, path(&["b"]));
        assert_eq!(deeper.root(), &DataSource::User);
        assert!(!deeper.is_root());
        assert!(user.is_root());
        assert_eq!(user.root(), &DataSource::User);

        let since = DataSource::PresenceSinceDate {
            parent: Arc::new(DataSource::Installation),
            present: true,
        };
        assert_eq!(since.root(), &DataSource::Installation);
    }

    #[test]
    fn test_field_projection_folds_paths() {
        let installation = Arc::new(DataSource::Installation);
        let foo = Arc::new(DataSource::field(&installation, FieldPath::parse("foo")));
        let folded = DataSource::field(&foo, FieldPath::parse("bar.baz"));
        match &folded {
            DataSource::Field { parent, path } => {
                assert_eq!(parent.as_ref(), &DataSource::Installation);
                assert_eq!(path.parts(), ["foo", "bar", "baz"]);
            }
            other => panic!("expected a field source, got {other:?}"),
        }
    }
}
