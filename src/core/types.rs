//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`EntityId`] - Store-allocated entity identifier
//! - [`Ident`] - Stable `namespace/name` handle for an entity
//! - [`AttrName`] - Qualified attribute name
//! - [`ModuleName`] - Dotted configuration module name
//! - [`QualifiedName`] - Fully qualified function name
//! - [`TempId`] - Caller-chosen placeholder for a not-yet-created entity
//! - [`EvalNamespace`] - Identifier of an isolated script evaluation context
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, preventing entire classes of bugs.
//!
//! # Examples
//!
//! ```
//! use heddle::core::types::{AttrName, Ident, ModuleName};
//!
//! // Valid constructions
//! let ident = Ident::new("app/web-server").unwrap();
//! let attr = AttrName::new("http/port").unwrap();
//! let module = ModuleName::new("app.config.http").unwrap();
//!
//! // Invalid constructions fail at creation time
//! assert!(Ident::new("no-separator").is_err());
//! assert!(ModuleName::new("app..http").is_err());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid ident: {0}")]
    InvalidIdent(String),

    #[error("invalid attribute name: {0}")]
    InvalidAttrName(String),

    #[error("invalid module name: {0}")]
    InvalidModuleName(String),

    #[error("invalid qualified name: {0}")]
    InvalidQualifiedName(String),

    #[error("invalid tempid: {0}")]
    InvalidTempId(String),

    #[error("invalid eval namespace: {0}")]
    InvalidEvalNamespace(String),
}

/// Checks a `namespace/name` pair: exactly one slash, both halves
/// non-empty, characters drawn from `[A-Za-z0-9._-]`, and no leading,
/// trailing, or doubled dots within a half.
fn check_qualified(raw: &str, label: &str) -> Result<(), String> {
    if raw.is_empty() {
        return Err(format!("{label} cannot be empty"));
    }
    let mut halves = raw.splitn(3, '/');
    let ns = halves.next().unwrap_or("");
    let name = match halves.next() {
        Some(n) => n,
        None => return Err(format!("{label} '{raw}' must contain a '/' separator")),
    };
    if halves.next().is_some() {
        return Err(format!("{label} '{raw}' contains more than one '/'"));
    }
    for (half, which) in [(ns, "namespace"), (name, "name")] {
        if half.is_empty() {
            return Err(format!("{label} '{raw}' has an empty {which} half"));
        }
        if half.starts_with('.') || half.ends_with('.') {
            return Err(format!(
                "{label} '{raw}' {which} half cannot start or end with '.'"
            ));
        }
        if half.contains("..") {
            return Err(format!("{label} '{raw}' cannot contain '..'"));
        }
        if let Some(c) = half
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '_' | '-'))
        {
            return Err(format!("{label} '{raw}' contains invalid character {c:?}"));
        }
    }
    Ok(())
}

/// A store-allocated entity identifier.
///
/// Ids are minted sequentially within a graph, so applying the same
/// operations to the same starting graph allocates the same ids.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct EntityId(u64);

impl EntityId {
    pub fn new(id: u64) -> Self {
        EntityId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        EntityId(id)
    }
}

impl From<EntityId> for u64 {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

/// A validated stable ident, the durable `namespace/name` handle an
/// entity can be looked up by across rebuilds.
///
/// Idents are the upsert key of the store: writing against an ident
/// reuses the entity that already carries it, or creates a new one.
///
/// # Example
///
/// ```
/// use heddle::core::types::Ident;
///
/// let ident = Ident::new("app/web-server").unwrap();
/// assert_eq!(ident.as_str(), "app/web-server");
/// assert!(Ident::new("two/many/slashes").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ident(String);

impl Ident {
    pub fn new(raw: impl Into<String>) -> Result<Self, TypeError> {
        let raw = raw.into();
        Self::validate(&raw)?;
        Ok(Ident(raw))
    }

    fn validate(raw: &str) -> Result<(), TypeError> {
        check_qualified(raw, "ident").map_err(TypeError::InvalidIdent)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Ident {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ident::new(value)
    }
}

impl From<Ident> for String {
    fn from(ident: Ident) -> Self {
        ident.0
    }
}

impl AsRef<str> for Ident {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A validated attribute name, e.g. `http/port`.
///
/// Attribute names share the `namespace/name` shape of [`Ident`]. The
/// `heddle/` namespace is reserved for attributes the store maintains
/// itself, currently only [`AttrName::stable_id`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AttrName(String);

impl AttrName {
    pub fn new(raw: impl Into<String>) -> Result<Self, TypeError> {
        let raw = raw.into();
        Self::validate(&raw)?;
        Ok(AttrName(raw))
    }

    fn validate(raw: &str) -> Result<(), TypeError> {
        check_qualified(raw, "attribute name").map_err(TypeError::InvalidAttrName)
    }

    /// The attribute under which an entity's stable ident is stored.
    ///
    /// Safe to construct without validation because the literal is
    /// known to be well-formed.
    pub fn stable_id() -> Self {
        AttrName("heddle/id".to_string())
    }

    /// True for attributes in the store-reserved `heddle/` namespace.
    pub fn is_reserved(&self) -> bool {
        self.0.starts_with("heddle/")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttrName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for AttrName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AttrName::new(value)
    }
}

impl From<AttrName> for String {
    fn from(attr: AttrName) -> Self {
        attr.0
    }
}

impl AsRef<str> for AttrName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A validated module name in dotted form, e.g. `app.config.http`.
///
/// # Example
///
/// ```
/// use heddle::core::types::ModuleName;
///
/// let name = ModuleName::new("app.config.http").unwrap();
/// assert_eq!(name.as_str(), "app.config.http");
/// assert!(ModuleName::new(".app").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleName(String);

impl ModuleName {
    pub fn new(raw: impl Into<String>) -> Result<Self, TypeError> {
        let raw = raw.into();
        Self::validate(&raw)?;
        Ok(ModuleName(raw))
    }

    fn validate(raw: &str) -> Result<(), TypeError> {
        if raw.is_empty() {
            return Err(TypeError::InvalidModuleName(
                "module name cannot be empty".to_string(),
            ));
        }
        if raw.starts_with('.') || raw.ends_with('.') {
            return Err(TypeError::InvalidModuleName(format!(
                "module name '{raw}' cannot start or end with '.'"
            )));
        }
        for segment in raw.split('.') {
            if segment.is_empty() {
                return Err(TypeError::InvalidModuleName(format!(
                    "module name '{raw}' has an empty segment"
                )));
            }
            if let Some(c) = segment
                .chars()
                .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '_' | '-'))
            {
                return Err(TypeError::InvalidModuleName(format!(
                    "module name '{raw}' contains invalid character {c:?}"
                )));
            }
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ModuleName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ModuleName::new(value)
    }
}

impl From<ModuleName> for String {
    fn from(name: ModuleName) -> Self {
        name.0
    }
}

impl AsRef<str> for ModuleName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A fully qualified function name, e.g. `app.dsl/server`.
///
/// The namespace half may be dotted; the name half is a single segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QualifiedName(String);

impl QualifiedName {
    pub fn new(raw: impl Into<String>) -> Result<Self, TypeError> {
        let raw = raw.into();
        Self::validate(&raw)?;
        Ok(QualifiedName(raw))
    }

    fn validate(raw: &str) -> Result<(), TypeError> {
        check_qualified(raw, "qualified name").map_err(TypeError::InvalidQualifiedName)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The namespace half, before the `/`.
    pub fn namespace(&self) -> &str {
        self.0.split('/').next().unwrap_or("")
    }

    /// The name half, after the `/`.
    pub fn name(&self) -> &str {
        self.0.split('/').nth(1).unwrap_or("")
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for QualifiedName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        QualifiedName::new(value)
    }
}

impl From<QualifiedName> for String {
    fn from(name: QualifiedName) -> Self {
        name.0
    }
}

impl AsRef<str> for QualifiedName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A caller-chosen placeholder for an entity that does not exist yet.
///
/// Tempids appear in operation batches, both as the target a batch
/// writes to and inside values as forward references. The store mints a
/// fresh entity per distinct tempid per batch and records the mapping
/// so callers can recover the allocated [`EntityId`] afterwards.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TempId(String);

impl TempId {
    pub fn new(raw: impl Into<String>) -> Result<Self, TypeError> {
        let raw = raw.into();
        Self::validate(&raw)?;
        Ok(TempId(raw))
    }

    fn validate(raw: &str) -> Result<(), TypeError> {
        if raw.is_empty() {
            return Err(TypeError::InvalidTempId(
                "tempid cannot be empty".to_string(),
            ));
        }
        if let Some(c) = raw.chars().find(|c| c.is_whitespace() || c.is_control()) {
            return Err(TypeError::InvalidTempId(format!(
                "tempid '{raw}' contains whitespace or control character {c:?}"
            )));
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for TempId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TempId::new(value)
    }
}

impl From<TempId> for String {
    fn from(tempid: TempId) -> Self {
        tempid.0
    }
}

impl AsRef<str> for TempId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The identifier of an isolated script evaluation context.
///
/// Every script evaluation gets a fresh namespace so repeated
/// evaluations of the same source never observe each other's state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EvalNamespace(String);

impl EvalNamespace {
    pub fn new(raw: impl Into<String>) -> Result<Self, TypeError> {
        let raw = raw.into();
        Self::validate(&raw)?;
        Ok(EvalNamespace(raw))
    }

    /// Mints a unique namespace with the given prefix.
    pub fn fresh(prefix: &str) -> Self {
        EvalNamespace(format!("{prefix}-{}", uuid::Uuid::new_v4()))
    }

    fn validate(raw: &str) -> Result<(), TypeError> {
        if raw.is_empty() {
            return Err(TypeError::InvalidEvalNamespace(
                "eval namespace cannot be empty".to_string(),
            ));
        }
        if let Some(c) = raw
            .chars()
            .find(|c| c.is_whitespace() || c.is_control() || *c == '/')
        {
            return Err(TypeError::InvalidEvalNamespace(format!(
                "eval namespace '{raw}' contains invalid character {c:?}"
            )));
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EvalNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for EvalNamespace {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        EvalNamespace::new(value)
    }
}

impl From<EvalNamespace> for String {
    fn from(ns: EvalNamespace) -> Self {
        ns.0
    }
}

impl AsRef<str> for EvalNamespace {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
