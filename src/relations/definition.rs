//! Relation definitions and the declarative configuration surface
//!
//! A [`RelationDefinition`] is the immutable configuration for one named
//! relation on an owning entity type. Definitions are registered once at
//! entity-type initialization and read-only thereafter; omitted optional
//! settings resolve through the naming defaults at use time.

use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::{RelationError, RelationResult};
use crate::relations::naming;

/// The four relation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationKind {
    HasOne,
    BelongsTo,
    HasMany,
    ManyToMany,
}

impl RelationKind {
    /// Returns true if resolving this relation yields a record set
    pub fn is_collection(self) -> bool {
        matches!(self, Self::HasMany | Self::ManyToMany)
    }

    /// Returns true if this kind is mediated by a junction table
    pub fn requires_junction(self) -> bool {
        matches!(self, Self::ManyToMany)
    }

    /// Returns true if `as_fields` mapping is honored for this kind
    pub fn supports_as_fields(self) -> bool {
        matches!(self, Self::HasOne | Self::BelongsTo)
    }
}

/// Selects which relations an operation applies to.
///
/// An empty selection matches everything: booleans and empty name sets in
/// the configuration surface deserialize to [`NameFilter::All`]-equivalent
/// behavior. Unknown names simply match nothing.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum NameFilter {
    /// Match every registered relation
    #[default]
    All,
    /// Match a single mapping name
    Name(String),
    /// Match any mapping name in the set
    Names(Vec<String>),
}

impl NameFilter {
    /// True when the filter selects the given mapping name
    pub fn matches(&self, mapping_name: &str) -> bool {
        match self {
            NameFilter::All => true,
            NameFilter::Name(name) => name == mapping_name,
            // An empty set is an empty filter, which matches all.
            NameFilter::Names(names) => names.is_empty() || names.iter().any(|n| n == mapping_name),
        }
    }
}

impl From<&str> for NameFilter {
    fn from(name: &str) -> Self {
        if name.is_empty() {
            NameFilter::All
        } else {
            NameFilter::Name(name.to_string())
        }
    }
}

impl From<Vec<String>> for NameFilter {
    fn from(names: Vec<String>) -> Self {
        NameFilter::Names(names)
    }
}

impl Serialize for NameFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NameFilter::All => serializer.serialize_bool(true),
            NameFilter::Name(name) => serializer.serialize_str(name),
            NameFilter::Names(names) => names.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for NameFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NameFilterVisitor;

        impl<'de> Visitor<'de> for NameFilterVisitor {
            type Value = NameFilter;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a boolean, a relation name, or a list of relation names")
            }

            fn visit_bool<E: de::Error>(self, _: bool) -> Result<NameFilter, E> {
                Ok(NameFilter::All)
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<NameFilter, E> {
                Ok(NameFilter::from(value))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<NameFilter, A::Error> {
                let mut names = Vec::new();
                while let Some(name) = seq.next_element::<String>()? {
                    names.push(name);
                }
                Ok(NameFilter::Names(names))
            }
        }

        deserializer.deserialize_any(NameFilterVisitor)
    }
}

/// One entry of an `as_fields` mapping: copy `source` from the related
/// record onto the owner, optionally under a different name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsField {
    pub source: String,
    pub alias: Option<String>,
}

impl AsField {
    /// The owner-record field name this entry writes to
    pub fn target_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.source)
    }
}

/// Parse a comma-separated `as_fields` list, entries optionally renamed
/// with `source:alias`.
pub fn parse_as_fields(list: &str) -> RelationResult<Vec<AsField>> {
    let mut fields = Vec::new();
    for entry in list.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(RelationError::Configuration(format!(
                "empty entry in as_fields list '{list}'"
            )));
        }
        match entry.split_once(':') {
            Some((source, alias)) if !source.trim().is_empty() && !alias.trim().is_empty() => {
                fields.push(AsField {
                    source: source.trim().to_string(),
                    alias: Some(alias.trim().to_string()),
                });
            }
            Some(_) => {
                return Err(RelationError::Configuration(format!(
                    "malformed as_fields entry '{entry}'"
                )));
            }
            None => fields.push(AsField {
                source: entry.to_string(),
                alias: None,
            }),
        }
    }
    Ok(fields)
}

/// Immutable configuration for one named relation on an owning entity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDefinition {
    /// The relation kind
    pub kind: RelationKind,
    /// Name of the related entity type; may equal the owner (self-reference)
    pub target: String,
    /// Attribute name under which resolved data is attached.
    /// Defaults to the definition's registration key when empty.
    pub mapping_name: String,
    /// Field on the owning record used as the join value (default: owner pk)
    pub mapping_key: Option<String>,
    /// Field on the related record referencing the owner
    pub foreign_key: Option<String>,
    /// Parent key used instead of `foreign_key` for self-references
    pub parent_key: Option<String>,
    /// Fields fetched for related records (default `*`)
    pub mapping_fields: String,
    /// Extra condition ANDed into (read) or replacing (write) the join filter
    pub condition: Option<String>,
    /// Read-path ordering
    pub order: Option<String>,
    /// Read-path row limit
    pub limit: Option<u64>,
    /// Map related fields directly onto the owner instead of nesting.
    /// Only honored for HAS_ONE / BELONGS_TO.
    pub as_fields: Option<Vec<AsField>>,
    /// Junction column referencing the target (MANY_TO_MANY only)
    pub relation_foreign_key: Option<String>,
    /// Junction table name, possibly templated with `__NAME__` tokens
    pub relation_table: Option<String>,
    /// Nested relation-name filter applied recursively to related records
    pub deep: Option<NameFilter>,
}

impl RelationDefinition {
    fn with_kind(kind: RelationKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            mapping_name: String::new(),
            mapping_key: None,
            foreign_key: None,
            parent_key: None,
            mapping_fields: "*".to_string(),
            condition: None,
            order: None,
            limit: None,
            as_fields: None,
            relation_foreign_key: None,
            relation_table: None,
            deep: None,
        }
    }

    /// One-to-one relation: the owner's key appears on one related record
    pub fn has_one(target: impl Into<String>) -> Self {
        Self::with_kind(RelationKind::HasOne, target)
    }

    /// Many-to-one relation: the owner holds the foreign key
    pub fn belongs_to(target: impl Into<String>) -> Self {
        Self::with_kind(RelationKind::BelongsTo, target)
    }

    /// One-to-many relation
    pub fn has_many(target: impl Into<String>) -> Self {
        Self::with_kind(RelationKind::HasMany, target)
    }

    /// Many-to-many relation through a junction table
    pub fn many_to_many(target: impl Into<String>) -> Self {
        Self::with_kind(RelationKind::ManyToMany, target)
    }

    /// Override the attribute name resolved data attaches under
    pub fn with_mapping_name(mut self, name: impl Into<String>) -> Self {
        self.mapping_name = name.into();
        self
    }

    /// Override the owner field used as the join value
    pub fn with_mapping_key(mut self, key: impl Into<String>) -> Self {
        self.mapping_key = Some(key.into());
        self
    }

    /// Override the foreign key on the related record
    pub fn with_foreign_key(mut self, key: impl Into<String>) -> Self {
        self.foreign_key = Some(key.into());
        self
    }

    /// Override the parent key for self-references
    pub fn with_parent_key(mut self, key: impl Into<String>) -> Self {
        self.parent_key = Some(key.into());
        self
    }

    /// Restrict fetched fields
    pub fn with_fields(mut self, fields: impl Into<String>) -> Self {
        self.mapping_fields = fields.into();
        self
    }

    /// Attach an extra filter condition
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Set read-path ordering
    pub fn with_order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    /// Set read-path row limit
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Map related fields directly onto the owner record
    pub fn with_as_fields(mut self, list: &str) -> RelationResult<Self> {
        self.as_fields = Some(parse_as_fields(list)?);
        Ok(self)
    }

    /// Set the junction column referencing the target
    pub fn with_relation_foreign_key(mut self, key: impl Into<String>) -> Self {
        self.relation_foreign_key = Some(key.into());
        self
    }

    /// Set the junction table name (may contain `__NAME__` tokens)
    pub fn with_relation_table(mut self, table: impl Into<String>) -> Self {
        self.relation_table = Some(table.into());
        self
    }

    /// Apply a nested relation filter recursively to related records
    pub fn with_deep(mut self, deep: impl Into<NameFilter>) -> Self {
        self.deep = Some(deep.into());
        self
    }

    /// Build a definition from the declarative configuration surface,
    /// resolving the defaults that depend on the registration key.
    pub fn from_config(name: &str, config: RelationConfig) -> RelationResult<Self> {
        let as_fields = config
            .as_fields
            .as_deref()
            .map(parse_as_fields)
            .transpose()?;
        Ok(Self {
            kind: config.mapping_type,
            target: config.class_name.unwrap_or_else(|| name.to_string()),
            mapping_name: config.mapping_name.unwrap_or_else(|| name.to_string()),
            mapping_key: config.mapping_key,
            foreign_key: config.foreign_key,
            parent_key: config.parent_key,
            mapping_fields: config.mapping_fields.unwrap_or_else(|| "*".to_string()),
            condition: config.condition,
            order: config.mapping_order,
            limit: config.mapping_limit,
            as_fields,
            relation_foreign_key: config.relation_foreign_key,
            relation_table: config.relation_table,
            deep: config.relation_deep,
        })
    }

    /// Validate the definition for internal consistency
    pub fn validate(&self) -> RelationResult<()> {
        if self.target.is_empty() {
            return Err(RelationError::Configuration(
                "relation definition must name a target entity type".to_string(),
            ));
        }
        if self.as_fields.is_some() && !self.kind.supports_as_fields() {
            return Err(RelationError::Configuration(format!(
                "as_fields on relation '{}' is only valid for HAS_ONE / BELONGS_TO",
                self.mapping_name
            )));
        }
        if !self.kind.requires_junction()
            && (self.relation_foreign_key.is_some() || self.relation_table.is_some())
        {
            return Err(RelationError::Configuration(format!(
                "junction settings on relation '{}' are only valid for MANY_TO_MANY",
                self.mapping_name
            )));
        }
        Ok(())
    }

    /// True when this relation targets its own owner
    pub fn is_self_reference(&self, owner: &str) -> bool {
        naming::is_self_reference(owner, &self.target)
    }

    /// Owner field holding the join value, defaulting to the owner's pk
    pub fn mapping_key_or<'a>(&'a self, owner_pk: &'a str) -> &'a str {
        self.mapping_key.as_deref().unwrap_or(owner_pk)
    }

    /// Effective foreign key on the related side referencing the owner.
    /// Self-references use the parent key, never `<owner>_id`.
    pub fn foreign_key_for(&self, owner: &str) -> String {
        if self.is_self_reference(owner) {
            self.parent_key
                .clone()
                .unwrap_or_else(|| naming::DEFAULT_PARENT_KEY.to_string())
        } else {
            self.foreign_key
                .clone()
                .unwrap_or_else(|| naming::default_foreign_key(owner, &self.target))
        }
    }

    /// Effective foreign key held on the owner for BELONGS_TO; the default
    /// derives from the target type's name, not the owner's.
    pub fn belongs_to_key(&self, owner: &str) -> String {
        if self.is_self_reference(owner) {
            self.parent_key
                .clone()
                .unwrap_or_else(|| naming::DEFAULT_PARENT_KEY.to_string())
        } else {
            self.foreign_key
                .clone()
                .unwrap_or_else(|| naming::default_belongs_to_key(owner, &self.target))
        }
    }

    /// Effective junction column referencing the target side
    pub fn relation_foreign_key_or_default(&self) -> String {
        self.relation_foreign_key
            .clone()
            .unwrap_or_else(|| naming::default_relation_foreign_key(&self.target))
    }

    /// Effective junction table name for the given owner and table prefix
    pub fn junction_table(&self, owner: &str, prefix: &str) -> String {
        match &self.relation_table {
            Some(template) => naming::expand_junction_template(template, prefix),
            None => naming::default_junction_table(owner, &self.target, prefix),
        }
    }
}

/// Declarative relation-definition configuration, as registered at entity
/// type setup. Omitted optional fields resolve via the naming defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationConfig {
    pub mapping_type: RelationKind,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub mapping_name: Option<String>,
    #[serde(default)]
    pub mapping_key: Option<String>,
    #[serde(default)]
    pub foreign_key: Option<String>,
    #[serde(default)]
    pub parent_key: Option<String>,
    #[serde(default)]
    pub mapping_fields: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub mapping_order: Option<String>,
    #[serde(default, deserialize_with = "deserialize_limit")]
    pub mapping_limit: Option<u64>,
    #[serde(default)]
    pub as_fields: Option<String>,
    #[serde(default)]
    pub relation_foreign_key: Option<String>,
    #[serde(default)]
    pub relation_table: Option<String>,
    #[serde(default)]
    pub relation_deep: Option<NameFilter>,
}

/// Accepts either a number or a numeric string for `mapping_limit`
fn deserialize_limit<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid mapping_limit '{s}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_serde_names() {
        assert_eq!(
            serde_json::to_value(RelationKind::HasOne).unwrap(),
            json!("HAS_ONE")
        );
        let kind: RelationKind = serde_json::from_value(json!("MANY_TO_MANY")).unwrap();
        assert_eq!(kind, RelationKind::ManyToMany);
        assert!(serde_json::from_value::<RelationKind>(json!("HAS_SOME")).is_err());
    }

    #[test]
    fn test_kind_properties() {
        assert!(RelationKind::HasMany.is_collection());
        assert!(RelationKind::ManyToMany.is_collection());
        assert!(!RelationKind::HasOne.is_collection());
        assert!(RelationKind::ManyToMany.requires_junction());
        assert!(RelationKind::BelongsTo.supports_as_fields());
        assert!(!RelationKind::HasMany.supports_as_fields());
    }

    #[test]
    fn test_name_filter_matching() {
        assert!(NameFilter::All.matches("anything"));
        assert!(NameFilter::from("items").matches("items"));
        assert!(!NameFilter::from("items").matches("tags"));
        let set = NameFilter::Names(vec!["a".to_string(), "b".to_string()]);
        assert!(set.matches("b"));
        assert!(!set.matches("c"));
        // Empty selections match everything.
        assert!(NameFilter::from("").matches("items"));
        assert!(NameFilter::Names(Vec::new()).matches("items"));
    }

    #[test]
    fn test_name_filter_deserialization() {
        let filter: NameFilter = serde_json::from_value(json!("items")).unwrap();
        assert_eq!(filter, NameFilter::Name("items".to_string()));

        let filter: NameFilter = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert_eq!(
            filter,
            NameFilter::Names(vec!["a".to_string(), "b".to_string()])
        );

        let filter: NameFilter = serde_json::from_value(json!(true)).unwrap();
        assert_eq!(filter, NameFilter::All);
    }

    #[test]
    fn test_parse_as_fields() {
        let fields = parse_as_fields("title:post_title, author").unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].source, "title");
        assert_eq!(fields[0].target_name(), "post_title");
        assert_eq!(fields[1].source, "author");
        assert_eq!(fields[1].target_name(), "author");

        assert!(parse_as_fields("title:,x").is_err());
        assert!(parse_as_fields("a,,b").is_err());
    }

    #[test]
    fn test_from_config_defaults() {
        let config: RelationConfig = serde_json::from_value(json!({
            "mapping_type": "HAS_MANY",
            "mapping_limit": "25",
        }))
        .unwrap();
        let def = RelationDefinition::from_config("items", config).unwrap();

        assert_eq!(def.kind, RelationKind::HasMany);
        assert_eq!(def.target, "items");
        assert_eq!(def.mapping_name, "items");
        assert_eq!(def.mapping_fields, "*");
        assert_eq!(def.limit, Some(25));
        assert!(def.deep.is_none());
    }

    #[test]
    fn test_from_config_full() {
        let config: RelationConfig = serde_json::from_value(json!({
            "mapping_type": "MANY_TO_MANY",
            "class_name": "Tag",
            "mapping_name": "tags",
            "relation_foreign_key": "tag_id",
            "relation_table": "__ORDER_TAG__",
            "relation_deep": ["owner"],
            "mapping_limit": 10,
        }))
        .unwrap();
        let def = RelationDefinition::from_config("tag_link", config).unwrap();

        assert_eq!(def.target, "Tag");
        assert_eq!(def.mapping_name, "tags");
        assert_eq!(def.relation_foreign_key.as_deref(), Some("tag_id"));
        assert_eq!(def.limit, Some(10));
        assert_eq!(def.deep, Some(NameFilter::Names(vec!["owner".to_string()])));
    }

    #[test]
    fn test_validate_rejects_as_fields_on_collections() {
        let def = RelationDefinition::has_many("OrderItem")
            .with_mapping_name("items")
            .with_as_fields("sku")
            .unwrap();
        assert!(matches!(
            def.validate(),
            Err(RelationError::Configuration(_))
        ));

        let def = RelationDefinition::belongs_to("Post")
            .with_mapping_name("post")
            .with_as_fields("title:post_title")
            .unwrap();
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_junction_settings_off_many_to_many() {
        let def = RelationDefinition::has_many("OrderItem")
            .with_mapping_name("items")
            .with_relation_table("order_item_link");
        assert!(matches!(
            def.validate(),
            Err(RelationError::Configuration(_))
        ));
    }

    #[test]
    fn test_effective_keys() {
        let def = RelationDefinition::has_many("OrderItem").with_mapping_name("items");
        assert_eq!(def.foreign_key_for("Order"), "order_id");
        assert_eq!(def.mapping_key_or("id"), "id");

        let def = RelationDefinition::belongs_to("Post").with_mapping_name("post");
        assert_eq!(def.belongs_to_key("Comment"), "post_id");

        // Self-reference without explicit parent_key uses parent_id.
        let def = RelationDefinition::has_many("Category").with_mapping_name("children");
        assert_eq!(def.foreign_key_for("Category"), "parent_id");

        let def = RelationDefinition::has_many("Category")
            .with_mapping_name("children")
            .with_parent_key("super_id");
        assert_eq!(def.foreign_key_for("Category"), "super_id");
    }

    #[test]
    fn test_junction_table_resolution() {
        let def = RelationDefinition::many_to_many("Tag").with_mapping_name("tags");
        assert_eq!(def.junction_table("Order", "app_"), "app_order_tag");

        let def = def.with_relation_table("__ORDER_TAG__");
        assert_eq!(def.junction_table("Order", "app_"), "app_order_tag");
        assert_eq!(def.relation_foreign_key_or_default(), "tag_id");
    }
}
