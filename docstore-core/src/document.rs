//! Document metadata and access relations

use crate::{ContentRef, DocumentId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Metadata row of a stored document.
///
/// `content_ref` is `Some` exactly when `is_file` is true. Inline (non-file)
/// payloads live next to the row in the store and never appear here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub id: DocumentId,
    pub owner: String,
    /// Identities allowed to read the document besides the owner. Order
    /// round-trips through the store.
    #[serde(default)]
    pub grant: Vec<String>,
    pub name: String,
    #[serde(default)]
    pub mime: String,
    #[serde(rename = "file")]
    pub is_file: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content_ref: Option<ContentRef>,
    #[serde(default)]
    pub public: bool,
    #[serde(rename = "created")]
    pub created_at: Timestamp,
    pub size: i64,
}

impl DocumentMeta {
    /// Build the metadata of a not-yet-saved document from a draft.
    ///
    /// `created_at`, `size` and `content_ref` are placeholders here; the
    /// content store overwrites them with the committed values.
    pub fn from_draft(id: DocumentId, owner: impl Into<String>, draft: DocumentDraft) -> Self {
        Self {
            id,
            owner: owner.into(),
            grant: draft.grant,
            name: draft.name,
            mime: draft.mime,
            is_file: draft.is_file,
            content_ref: None,
            public: draft.public,
            created_at: chrono::Utc::now(),
            size: 0,
        }
    }

    /// Whether `identity` may read this document (owner or grantee).
    ///
    /// `public` is advisory and does not widen visibility.
    pub fn is_visible_to(&self, identity: &str) -> bool {
        self.owner == identity || self.is_granted_to(identity)
    }

    pub fn is_granted_to(&self, identity: &str) -> bool {
        self.grant.iter().any(|g| g == identity)
    }

    /// Whether `identity` relates to this document through `kind`.
    pub fn is_accessible_as(&self, kind: AccessorKind, identity: &str) -> bool {
        match kind {
            AccessorKind::Owner => self.owner == identity,
            AccessorKind::Grantee => self.is_granted_to(identity),
        }
    }

    /// Owner followed by every distinct grantee, in grant order.
    pub fn accessors(&self) -> Vec<String> {
        let mut identities = Vec::with_capacity(self.grant.len() + 1);
        identities.push(self.owner.clone());
        for grantee in &self.grant {
            if !identities.iter().any(|i| i == grantee) {
                identities.push(grantee.clone());
            }
        }
        identities
    }
}

/// Caller-supplied part of a new document's metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDraft {
    pub name: String,
    #[serde(default)]
    pub mime: String,
    #[serde(rename = "file", default)]
    pub is_file: bool,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub grant: Vec<String>,
}

impl DocumentDraft {
    /// Draft of a file document.
    pub fn file(name: impl Into<String>, mime: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            is_file: true,
            ..Default::default()
        }
    }

    /// Draft of an inline JSON document.
    pub fn json(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime: "application/json".to_string(),
            is_file: false,
            ..Default::default()
        }
    }

    pub fn with_grant<I, S>(mut self, grant: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grant = grant.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }
}

/// How an identity is related to the documents being listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessorKind {
    /// Documents the identity created.
    Owner,
    /// Documents the identity was granted.
    Grantee,
}

impl fmt::Display for AccessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessorKind::Owner => write!(f, "owner"),
            AccessorKind::Grantee => write!(f, "grantee"),
        }
    }
}

impl FromStr for AccessorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "owner" => Ok(AccessorKind::Owner),
            "grantee" | "login" => Ok(AccessorKind::Grantee),
            other => Err(format!("unknown accessor kind: {}", other)),
        }
    }
}
