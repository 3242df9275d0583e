//! The closed catalog of permission names a key may be granted.

use std::{collections::BTreeSet, sync::Arc};

use crate::error::AppError;

pub const VIEW_KEYS: &str = "VIEW_KEYS";
pub const CREATE_KEYS: &str = "CREATE_KEYS";
pub const EDIT_KEYS: &str = "EDIT_KEYS";
pub const DEACTIVATE_KEYS: &str = "DEACTIVATE_KEYS";

/// Built-in catalog, used unless `PERMISSION_CATALOG` overrides it.
pub const DEFAULT_CATALOG: &[&str] = &[
    VIEW_KEYS,
    CREATE_KEYS,
    EDIT_KEYS,
    DEACTIVATE_KEYS,
    "VIEW_BRANDS",
    "EDIT_BRANDS",
    "VIEW_DIVISIONS",
    "EDIT_DIVISIONS",
    "VIEW_ENGINES",
    "EDIT_ENGINES",
    "VIEW_HULL_TYPES",
    "EDIT_HULL_TYPES",
    "VIEW_REPAIRS",
    "EDIT_REPAIRS",
    "VIEW_USERS",
    "EDIT_USERS",
];

/// Read-only set of recognized permission names.
#[derive(Debug, Clone)]
pub struct PermissionCatalog {
    names: Arc<BTreeSet<String>>,
}

impl PermissionCatalog {
    pub fn builtin() -> Self {
        Self::from_names(DEFAULT_CATALOG.iter().copied())
    }

    /// Builds a catalog from arbitrary names; blanks are dropped and whitespace trimmed.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        Self {
            names: Arc::new(names),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Checks a grant set before it is persisted.
    ///
    /// # Errors
    ///
    /// `AppError::Validation` if the set is empty or holds any unknown name.
    /// Every unknown name is reported, in input order, once.
    pub fn validate(&self, permissions: &[String]) -> Result<(), AppError> {
        if permissions.is_empty() {
            return Err(AppError::validation("At least one permission is required"));
        }

        let mut invalid: Vec<String> = Vec::new();
        for permission in permissions {
            if !self.contains(permission) && !invalid.contains(permission) {
                invalid.push(permission.clone());
            }
        }

        if invalid.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation {
                message: format!("Invalid permissions: {}", invalid.join(", ")),
                invalid,
            })
        }
    }
}
