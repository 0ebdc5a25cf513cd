//! Allow-listed equality filters for document listings
//!
//! Listings filter on exactly one metadata field. The field name arrives as
//! untrusted text, so it is resolved against a closed set of keys before it
//! can reach a query; the value is parsed into a typed form that stores bind
//! as a parameter.

use crate::{DocError, DocResult, DocumentMeta, Timestamp};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metadata fields a listing may filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKey {
    Name,
    IsFile,
    Mime,
    Public,
    CreatedAt,
}

impl FilterKey {
    pub const ALL: [FilterKey; 5] = [
        FilterKey::Name,
        FilterKey::IsFile,
        FilterKey::Mime,
        FilterKey::Public,
        FilterKey::CreatedAt,
    ];

    /// Resolve an untrusted key against the allow-list.
    pub fn parse(key: &str) -> DocResult<Self> {
        match key {
            "name" => Ok(FilterKey::Name),
            "file" | "is_file" => Ok(FilterKey::IsFile),
            "mime" => Ok(FilterKey::Mime),
            "public" => Ok(FilterKey::Public),
            "created" | "created_at" => Ok(FilterKey::CreatedAt),
            _ => Err(DocError::invalid_filter(key, "key is not filterable")),
        }
    }

    /// Column backing this key in the metadata table.
    pub fn column(&self) -> &'static str {
        match self {
            FilterKey::Name => "name",
            FilterKey::IsFile => "is_file",
            FilterKey::Mime => "mime",
            FilterKey::Public => "public",
            FilterKey::CreatedAt => "created_at",
        }
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Typed right-hand side of a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Text(String),
    Bool(bool),
    Timestamp(Timestamp),
}

/// A single `key = value` filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub key: FilterKey,
    pub value: FilterValue,
}

impl Filter {
    /// Parse an untrusted key/value pair.
    pub fn parse(key: &str, value: &str) -> DocResult<Self> {
        let key = FilterKey::parse(key)?;
        let value = match key {
            FilterKey::Name | FilterKey::Mime => FilterValue::Text(value.to_string()),
            FilterKey::IsFile | FilterKey::Public => match value {
                "true" | "1" => FilterValue::Bool(true),
                "false" | "0" => FilterValue::Bool(false),
                _ => {
                    return Err(DocError::invalid_filter(
                        key.column(),
                        format!("expected boolean, got '{}'", value),
                    ))
                }
            },
            FilterKey::CreatedAt => {
                let ts = DateTime::parse_from_rfc3339(value).map_err(|e| {
                    DocError::invalid_filter(key.column(), format!("expected RFC 3339 timestamp: {}", e))
                })?;
                FilterValue::Timestamp(ts.with_timezone(&chrono::Utc))
            }
        };
        Ok(Self { key, value })
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self {
            key: FilterKey::Name,
            value: FilterValue::Text(name.into()),
        }
    }

    /// Whether `meta` satisfies this filter.
    pub fn matches(&self, meta: &DocumentMeta) -> bool {
        match (&self.key, &self.value) {
            (FilterKey::Name, FilterValue::Text(v)) => &meta.name == v,
            (FilterKey::Mime, FilterValue::Text(v)) => &meta.mime == v,
            (FilterKey::IsFile, FilterValue::Bool(v)) => meta.is_file == *v,
            (FilterKey::Public, FilterValue::Bool(v)) => meta.public == *v,
            (FilterKey::CreatedAt, FilterValue::Timestamp(v)) => meta.created_at == *v,
            _ => false,
        }
    }
}
