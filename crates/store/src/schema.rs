//! Explicit registration of table definitions.
//!
//! Each module hands its model list to the registry during startup; the
//! backend then creates the tables in registration order.

use crate::{Result, StoreError};

/// A named table definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSchema {
    pub name: &'static str,
    /// Idempotent DDL (`CREATE TABLE IF NOT EXISTS …`).
    pub ddl: &'static str,
}

/// Ordered collection of models to bootstrap.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    models: Vec<ModelSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module's models. Fails without registering anything if
    /// any name is already taken.
    pub fn register(&mut self, models: &[ModelSchema]) -> Result<()> {
        for (i, model) in models.iter().enumerate() {
            let clashes = self.models.iter().any(|m| m.name == model.name)
                || models[..i].iter().any(|m| m.name == model.name);
            if clashes {
                return Err(StoreError::Schema(format!(
                    "model '{}' registered twice",
                    model.name
                )));
            }
        }
        self.models.extend_from_slice(models);
        Ok(())
    }

    pub fn models(&self) -> &[ModelSchema] {
        &self.models
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
