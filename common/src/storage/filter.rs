//! Backend-agnostic filter tree over package records.
//!
//! The query compiler produces these, the package store renders them into
//! its own query language.

use std::fmt;

/// Free-text fields matched by case-insensitive substring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Name,
    Description,
    Author,
}

/// Set-valued projections matched by exact membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetField {
    Tags,
    VersionStrings,
    VersionSources,
    PackageManagers,
    Contributors,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    MatchAll,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    TextContains { field: TextField, value: String },
    SetContains { field: SetField, value: String },
}

impl Filter {
    pub fn text(field: TextField, value: impl Into<String>) -> Self {
        Filter::TextContains {
            field,
            value: value.into(),
        }
    }

    pub fn tag(value: impl Into<String>) -> Self {
        Filter::SetContains {
            field: SetField::Tags,
            value: value.into(),
        }
    }

    pub fn contains(field: SetField, value: impl Into<String>) -> Self {
        Filter::SetContains {
            field,
            value: value.into(),
        }
    }

    /// AND of the given clauses, collapsing the empty conjunction to `MatchAll`.
    pub fn all(clauses: Vec<Filter>) -> Self {
        if clauses.is_empty() {
            Filter::MatchAll
        } else {
            Filter::And(clauses)
        }
    }
}

impl fmt::Display for TextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TextField::Name => "name",
            TextField::Description => "description",
            TextField::Author => "author",
        })
    }
}

impl fmt::Display for SetField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SetField::Tags => "tags",
            SetField::VersionStrings => "versions.version",
            SetField::VersionSources => "versions.source",
            SetField::PackageManagers => "versions.packageManager",
            SetField::Contributors => "contributors.username",
        })
    }
}

/// Compact notation used in logs and test assertions, e.g.
/// `AND(OR(name~alpha, tags CONTAINS alpha))`.
impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::MatchAll => f.write_str("*"),
            Filter::And(children) => write_group(f, "AND", children),
            Filter::Or(children) => write_group(f, "OR", children),
            Filter::TextContains { field, value } => write!(f, "{field}~{value}"),
            Filter::SetContains { field, value } => write!(f, "{field} CONTAINS {value}"),
        }
    }
}

fn write_group(f: &mut fmt::Formatter<'_>, op: &str, children: &[Filter]) -> fmt::Result {
    write!(f, "{op}(")?;
    for (idx, child) in children.iter().enumerate() {
        if idx > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{child}")?;
    }
    f.write_str(")")
}
