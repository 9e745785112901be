//! PostgreSQL SQL text for the pipeline's queries.
//!
//! Identifiers are always quoted: Prisma-managed relations and columns are
//! mixed-case (`"User"`, `"authorId"`).

use crate::registry::{quote_ident, TableDescriptor};

/// PostgreSQL query builder.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }

    /// First page of a keyset scan: `SELECT * ... ORDER BY pk LIMIT n`.
    pub fn first_page_query(&self, table: &TableDescriptor, page_size: usize) -> String {
        format!(
            "SELECT * FROM {} ORDER BY {} LIMIT {}",
            table.qualified_name(),
            self.key_list(table),
            page_size
        )
    }

    /// Following pages: rows strictly after the last key seen, one parameter per key column.
    pub fn next_page_query(&self, table: &TableDescriptor, page_size: usize) -> String {
        let params = (1..=table.primary_key.len())
            .map(|i| format!("${}", i))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "SELECT * FROM {} WHERE ({}) > ({}) ORDER BY {} LIMIT {}",
            table.qualified_name(),
            self.key_list(table),
            params,
            self.key_list(table),
            page_size
        )
    }

    /// Plain INSERT of the given columns, no conflict clause.
    ///
    /// Conflicts must surface as unique violations so the loader can count them.
    pub fn insert_query(&self, table: &TableDescriptor, columns: &[String]) -> String {
        if columns.is_empty() {
            return format!("INSERT INTO {} DEFAULT VALUES", table.qualified_name());
        }

        let cols = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let params = (1..=columns.len())
            .map(|i| format!("${}", i))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.qualified_name(),
            cols,
            params
        )
    }

    pub fn count_query(&self, table: &TableDescriptor) -> String {
        format!("SELECT COUNT(*)::int8 FROM {}", table.qualified_name())
    }

    /// Sequence owning the key column, or NULL. Takes the table name and column as parameters.
    pub fn serial_sequence_query(&self) -> &'static str {
        "SELECT pg_get_serial_sequence($1, $2)"
    }

    /// Move the sequence (`$1`) so the next value follows the current maximum key.
    ///
    /// On an empty table the sequence is reset so the next value is 1.
    pub fn setval_query(&self, table: &TableDescriptor) -> String {
        let pk = quote_ident(&table.primary_key[0]);
        format!(
            "SELECT setval($1::text::regclass, COALESCE(MAX({pk})::int8, 1), MAX({pk}) IS NOT NULL) FROM {}",
            table.qualified_name(),
            pk = pk
        )
    }

    fn key_list(&self, table: &TableDescriptor) -> String {
        table
            .primary_key
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn articles() -> TableDescriptor {
        TableDescriptor::new("articles", 1, "Article")
    }

    fn tokens() -> TableDescriptor {
        TableDescriptor::new("verification_tokens", 1, "VerificationToken")
            .with_primary_key(["identifier", "token"])
    }

    #[test]
    fn test_first_page_query() {
        let dialect = PostgresDialect::new();
        assert_eq!(
            dialect.first_page_query(&articles(), 500),
            "SELECT * FROM \"public\".\"Article\" ORDER BY \"id\" LIMIT 500"
        );
    }

    #[test]
    fn test_next_page_query_single_key() {
        let dialect = PostgresDialect::new();
        assert_eq!(
            dialect.next_page_query(&articles(), 500),
            "SELECT * FROM \"public\".\"Article\" WHERE (\"id\") > ($1) ORDER BY \"id\" LIMIT 500"
        );
    }

    #[test]
    fn test_next_page_query_composite_key() {
        let dialect = PostgresDialect::new();
        let sql = dialect.next_page_query(&tokens(), 100);
        assert!(sql.contains("WHERE (\"identifier\", \"token\") > ($1, $2)"));
        assert!(sql.contains("ORDER BY \"identifier\", \"token\""));
    }

    #[test]
    fn test_insert_query() {
        let dialect = PostgresDialect::new();
        let sql = dialect.insert_query(
            &articles(),
            &["id".to_string(), "authorId".to_string(), "title".to_string()],
        );
        assert_eq!(
            sql,
            "INSERT INTO \"public\".\"Article\" (\"id\", \"authorId\", \"title\") VALUES ($1, $2, $3)"
        );
        assert!(!sql.contains("ON CONFLICT"));
    }

    #[test]
    fn test_setval_query() {
        let dialect = PostgresDialect::new();
        let sql = dialect.setval_query(&TableDescriptor::new("users", 0, "User"));
        assert!(sql.starts_with("SELECT setval($1::text::regclass, COALESCE(MAX(\"id\")::int8, 1)"));
        assert!(sql.ends_with("FROM \"public\".\"User\""));
    }
}
