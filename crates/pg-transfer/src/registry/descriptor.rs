//! Table descriptor: the static description of one entity type to migrate.

use serde::{Deserialize, Serialize};

/// Static configuration for one table, immutable for the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Stable identifier used in reports (e.g. "articles").
    pub name: String,

    /// Migration rank. Referenced tables have lower ranks than referencing ones.
    pub order: u32,

    /// Schema holding the table.
    pub schema: String,

    /// Physical table name (e.g. "Article" for Prisma-managed schemas).
    pub relation: String,

    /// Primary key columns, used for keyset paging and error identifiers.
    pub primary_key: Vec<String>,

    /// Names of the descriptors this table holds foreign keys to.
    pub parents: Vec<String>,
}

impl TableDescriptor {
    /// Create a descriptor in the `public` schema keyed by `id`.
    pub fn new(name: &str, order: u32, relation: &str) -> Self {
        Self {
            name: name.to_string(),
            order,
            schema: "public".to_string(),
            relation: relation.to_string(),
            primary_key: vec!["id".to_string()],
            parents: Vec::new(),
        }
    }

    pub fn in_schema(mut self, schema: &str) -> Self {
        self.schema = schema.to_string();
        self
    }

    pub fn with_primary_key<'a>(mut self, columns: impl IntoIterator<Item = &'a str>) -> Self {
        self.primary_key = columns.into_iter().map(str::to_string).collect();
        self
    }

    pub fn with_parents<'a>(mut self, parents: impl IntoIterator<Item = &'a str>) -> Self {
        self.parents = parents.into_iter().map(str::to_string).collect();
        self
    }

    /// Schema-qualified name for logs, e.g. `public.Article`.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.relation)
    }

    /// Schema-qualified, quoted name for SQL, e.g. `"public"."Article"`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.relation))
    }

    /// Whether the primary key is a single column (sequence sync applies).
    pub fn has_single_pk(&self) -> bool {
        self.primary_key.len() == 1
    }
}

/// Quote a PostgreSQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
