//! Table descriptor registry.
//!
//! The registry is the single place where entity types and their foreign-key
//! ranks are declared. It is checked once at startup: a child ranked at or
//! below one of its parents, an unknown parent, a duplicate name or an empty
//! primary key stops the process before any connection is opened.

mod builtin;
mod descriptor;

pub use descriptor::{quote_ident, TableDescriptor};

use crate::error::{MigrateError, Result};
use std::collections::HashMap;
use tracing::debug;

/// Ordered, validated set of table descriptors.
#[derive(Debug, Clone)]
pub struct TableRegistry {
    descriptors: Vec<TableDescriptor>,
}

impl TableRegistry {
    /// Validate descriptors and sort them by rank (ties keep declaration order).
    pub fn new(mut descriptors: Vec<TableDescriptor>) -> Result<Self> {
        check_invariants(&descriptors)?;
        descriptors.sort_by_key(|d| d.order);

        debug!(
            "Registry order: {}",
            descriptors
                .iter()
                .map(|d| d.name.as_str())
                .collect::<Vec<_>>()
                .join(" -> ")
        );

        Ok(Self { descriptors })
    }

    /// The application's entity types.
    pub fn builtin() -> Result<Self> {
        Self::new(builtin::descriptors())
    }

    /// All descriptors, ascending by `order`.
    pub fn all_descriptors(&self) -> &[TableDescriptor] {
        &self.descriptors
    }

    /// Look up a descriptor by report name.
    pub fn get(&self, name: &str) -> Option<&TableDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

fn check_invariants(descriptors: &[TableDescriptor]) -> Result<()> {
    let mut by_name: HashMap<&str, &TableDescriptor> = HashMap::new();
    for d in descriptors {
        if d.name.trim().is_empty() {
            return Err(MigrateError::Registry("table name cannot be empty".into()));
        }
        if by_name.insert(d.name.as_str(), d).is_some() {
            return Err(MigrateError::Registry(format!(
                "table '{}' is registered more than once",
                d.name
            )));
        }
        if d.primary_key.is_empty() {
            return Err(MigrateError::Registry(format!(
                "table '{}' has no primary key columns",
                d.name
            )));
        }
    }

    for child in descriptors {
        for parent_name in &child.parents {
            let parent = by_name.get(parent_name.as_str()).ok_or_else(|| {
                MigrateError::Registry(format!(
                    "table '{}' references unregistered table '{}'",
                    child.name, parent_name
                ))
            })?;

            if parent.order >= child.order {
                return Err(MigrateError::Registry(format!(
                    "table '{}' (order {}) must come after its parent '{}' (order {})",
                    child.name, child.order, parent.name, parent.order
                )));
            }
        }
    }

    Ok(())
}
