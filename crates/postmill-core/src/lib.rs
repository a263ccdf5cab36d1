//! Core domain model for postmill: posts, field grammars, records and merge outcomes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const CRATE_NAME: &str = "postmill-core";

/// Parsed output of one post: field name -> JSON value, in grammar order.
pub type Record = Map<String, Value>;

/// A raw feed post. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    #[serde(rename = "message", default)]
    pub text: String,
    #[serde(default)]
    pub created_time: String,
    #[serde(rename = "permalink_url", default, skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    #[serde(rename = "full_picture", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// A nested label inside a compound or group field, e.g. `("city", "City:")`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubLabel {
    pub key: &'static str,
    pub label: &'static str,
}

pub const fn sub(key: &'static str, label: &'static str) -> SubLabel {
    SubLabel { key, label }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Rest of the first line starting with the label.
    Line,
    /// Single line split on any of the delimiters.
    List { delimiters: &'static [char] },
    /// Itemized lines between the label and the terminator.
    Block { terminator: &'static str },
    /// Bounded block parsed into an object of sub-labels.
    Compound {
        terminator: &'static str,
        members: &'static [SubLabel],
    },
    /// Object of sub-labels each searched as a single-line field over the whole text.
    Group { members: &'static [SubLabel] },
    /// Everything after the label up to the end of the text.
    Trailing,
}

/// A named extraction rule.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Value,
}

impl FieldSpec {
    fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            required: false,
            default: Value::Null,
        }
    }

    pub fn line(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Line)
    }

    pub fn list(name: &'static str, label: &'static str, delimiters: &'static [char]) -> Self {
        Self::new(name, label, FieldKind::List { delimiters })
    }

    pub fn block(name: &'static str, label: &'static str, terminator: &'static str) -> Self {
        Self::new(name, label, FieldKind::Block { terminator })
    }

    pub fn compound(
        name: &'static str,
        label: &'static str,
        terminator: &'static str,
        members: &'static [SubLabel],
    ) -> Self {
        Self::new(name, label, FieldKind::Compound { terminator, members })
    }

    pub fn group(name: &'static str, members: &'static [SubLabel]) -> Self {
        Self::new(name, "", FieldKind::Group { members })
    }

    pub fn trailing(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Trailing)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

}

/// Ordered field rules plus text-level options for one kind of post.
#[derive(Debug, Clone, PartialEq)]
pub struct Grammar {
    pub name: &'static str,
    pub fields: Vec<FieldSpec>,
    /// Field that falls back to the first non-empty line when its label is absent.
    pub title_fallback: Option<&'static str>,
}

impl Grammar {
    pub fn new(name: &'static str, fields: Vec<FieldSpec>) -> Self {
        Self {
            name,
            fields,
            title_fallback: None,
        }
    }

    pub fn with_title_fallback(mut self, field: &'static str) -> Self {
        self.title_fallback = Some(field);
        self
    }
}

/// Non-fatal anomaly noticed while producing a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    MissingField { field: String },
    MalformedBlock { field: String, terminator: String },
    UnresolvedReference { catalog: String, id: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field } => write!(f, "required field `{field}` not found"),
            Self::MalformedBlock { field, terminator } => {
                write!(f, "block `{field}` has no `{terminator}` terminator")
            }
            Self::UnresolvedReference { catalog, id } => {
                write!(f, "id `{id}` not found in {catalog} catalog")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    Inserted,
    SkippedDuplicate,
    /// The candidate has no usable identity key and was rejected.
    MissingIdentity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    /// New records are deduplicated by identity and prepended.
    Ingest,
    /// The whole collection is recomputed from its existing records.
    Rebuild,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Recruitments,
    Events,
    FacebookPosts,
    News,
    Blogs,
    Companies,
    Authors,
}

impl StoreKind {
    pub const ALL: [StoreKind; 7] = [
        StoreKind::Recruitments,
        StoreKind::Events,
        StoreKind::FacebookPosts,
        StoreKind::News,
        StoreKind::Blogs,
        StoreKind::Companies,
        StoreKind::Authors,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recruitments => "recruitments",
            Self::Events => "events",
            Self::FacebookPosts => "facebook_posts",
            Self::News => "news",
            Self::Blogs => "blogs",
            Self::Companies => "companies",
            Self::Authors => "authors",
        }
    }

    pub fn mode(self) -> StoreMode {
        match self {
            Self::Recruitments | Self::Events | Self::FacebookPosts | Self::News => {
                StoreMode::Ingest
            }
            Self::Blogs | Self::Companies | Self::Authors => StoreMode::Rebuild,
        }
    }

    /// Field used to deduplicate records of this store.
    pub fn identity_field(self) -> &'static str {
        match self {
            Self::Events => "title",
            _ => "id",
        }
    }

    pub fn default_file_name(self) -> String {
        format!("{}.json", self.as_str())
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| format!("unknown store `{s}`"))
    }
}

/// Identity key of a record as a string; `None` when missing, null or not scalar.
pub fn identity_key(record: &Record, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
