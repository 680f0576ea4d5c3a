//! Caller-declared description of tables, fields and relations.
//!
//! A [Schema] is built once from a configuration value and shared read-only
//! across compiles. Every name the translator resolves must exist here.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{Error, Reason, WithErrorInfo};
use crate::Result;

/// Scalar type of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Text,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Json,
}

/// Cardinality of a declared relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
}

/// Schema configuration as supplied by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaConfig {
    pub tables: HashMap<String, TableConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    /// Physical table name.
    pub table: String,
    #[serde(default)]
    pub fields: HashMap<String, FieldConfig>,
    #[serde(default)]
    pub relations: HashMap<String, RelationConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldConfig {
    /// Physical column name.
    pub column: String,
    #[serde(rename = "type")]
    pub ty: ScalarType,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationConfig {
    /// Logical name of the target table.
    pub target: String,
    /// Column on the owning table holding the key.
    pub foreign_key: String,
    /// Column on the target table the key points at.
    pub target_key: String,
    #[serde(rename = "type")]
    pub ty: Cardinality,
}

/// Validated, immutable schema registry.
#[derive(Debug, Clone)]
pub struct Schema {
    tables: HashMap<String, TableConfig>,
}

impl Schema {
    /// Validate a configuration and build the registry. Fails when a relation
    /// targets an undeclared table.
    pub fn new(config: SchemaConfig) -> Result<Self> {
        for (table_name, table) in &config.tables {
            for (rel_name, rel) in &table.relations {
                if !config.tables.contains_key(&rel.target) {
                    return Err(Error::new(Reason::NotFound {
                        name: rel.target.clone(),
                        namespace: "relation target table".to_string(),
                    })
                    .push_hint(format!(
                        "declared by relation `{rel_name}` on table `{table_name}`"
                    )));
                }
            }
        }
        Ok(Schema {
            tables: config.tables,
        })
    }

    /// Build a schema from its JSON configuration form.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SchemaConfig = serde_json::from_str(json)
            .map_err(|e| Error::new_simple(format!("invalid schema configuration: {e}")))?;
        Schema::new(config)
    }

    pub fn table(&self, name: &str) -> Option<&TableConfig> {
        self.tables.get(name)
    }

    pub fn field<'a>(&'a self, table: &str, name: &str) -> Option<&'a FieldConfig> {
        self.tables.get(table)?.fields.get(name)
    }

    pub fn relation<'a>(&'a self, table: &str, name: &str) -> Option<&'a RelationConfig> {
        self.tables.get(table)?.relations.get(name)
    }

    pub fn expect_table(&self, name: &str) -> Result<&TableConfig> {
        self.table(name).ok_or_else(|| {
            Error::new(Reason::NotFound {
                name: name.to_string(),
                namespace: "table".to_string(),
            })
        })
    }

    pub fn expect_field(&self, table: &str, name: &str) -> Result<&FieldConfig> {
        self.field(table, name).ok_or_else(|| {
            Error::new(Reason::NotFound {
                name: name.to_string(),
                namespace: format!("field of table `{table}`"),
            })
        })
    }

    pub fn expect_relation(&self, table: &str, name: &str) -> Result<&RelationConfig> {
        self.relation(table, name).ok_or_else(|| {
            Error::new(Reason::NotFound {
                name: name.to_string(),
                namespace: format!("relation of table `{table}`"),
            })
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn config() -> &'static str {
        r#"{
            "tables": {
                "pubs": {
                    "table": "pubs",
                    "fields": {
                        "id": { "column": "id", "type": "integer" },
                        "title": { "column": "title", "type": "text" }
                    },
                    "relations": {
                        "author": {
                            "target": "authors",
                            "foreignKey": "author_id",
                            "targetKey": "id",
                            "type": "one"
                        }
                    }
                },
                "authors": {
                    "table": "authors",
                    "fields": {
                        "id": { "column": "id", "type": "integer" },
                        "name": { "column": "name", "type": "text" }
                    }
                }
            }
        }"#
    }

    #[test]
    fn builds_from_json() {
        let schema = Schema::from_json(config()).unwrap();
        assert_eq!(schema.table("pubs").unwrap().table, "pubs");
        assert_eq!(schema.field("pubs", "title").unwrap().column, "title");
        let rel = schema.relation("pubs", "author").unwrap();
        assert_eq!(rel.target, "authors");
        assert_eq!(rel.ty, Cardinality::One);
    }

    #[test]
    fn rejects_dangling_relation_target() {
        let json = r#"{
            "tables": {
                "pubs": {
                    "table": "pubs",
                    "fields": {},
                    "relations": {
                        "author": {
                            "target": "missing",
                            "foreignKey": "author_id",
                            "targetKey": "id",
                            "type": "one"
                        }
                    }
                }
            }
        }"#;
        let err = Schema::from_json(json).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn expect_helpers_report_namespace() {
        let schema = Schema::from_json(config()).unwrap();
        let err = schema.expect_field("pubs", "nope").unwrap_err();
        assert!(matches!(err.reason, Reason::NotFound { .. }));
        assert!(schema.expect_relation("authors", "author").is_err());
    }
}
