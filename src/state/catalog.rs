//! Panel function catalog
//!
//! The catalog is built once from a static table. Declaration order is the
//! navigation order.

use std::collections::HashSet;

use crate::error::PanelError;

/// Debounce source for functions that are only actionable in manual mode
pub const MANUAL_MODE: &str = "operating_mode.manual";

/// Functions enabled once a non-informational error log is reported
pub const ERROR_DETAIL_FUNCTIONS: [u8; 3] = [11, 12, 13];

/// Static description of one panel function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSpec {
    pub id: u8,
    pub enabled: bool,
    pub requires_debounce: bool,
    pub debounce_source: Option<&'static str>,
    /// Inclusive upper bound of the nested sub-function range
    pub sub_range: Option<u8>,
}

impl FunctionSpec {
    const fn plain(id: u8, enabled: bool) -> Self {
        Self {
            id,
            enabled,
            requires_debounce: false,
            debounce_source: None,
            sub_range: None,
        }
    }

    const fn debounced(id: u8) -> Self {
        Self {
            id,
            enabled: false,
            requires_debounce: true,
            debounce_source: Some(MANUAL_MODE),
            sub_range: None,
        }
    }

    const fn ranged(id: u8, upper: u8) -> Self {
        Self {
            id,
            enabled: true,
            requires_debounce: false,
            debounce_source: None,
            sub_range: Some(upper),
        }
    }
}

/// Default panel function table
pub const DEFAULT_FUNCTIONS: &[FunctionSpec] = &[
    FunctionSpec::plain(1, true),
    FunctionSpec::plain(2, true),
    FunctionSpec::debounced(3),
    FunctionSpec::plain(4, true),
    FunctionSpec::debounced(8),
    FunctionSpec::plain(11, false),
    FunctionSpec::plain(12, false),
    FunctionSpec::plain(13, false),
    FunctionSpec::plain(20, true),
    FunctionSpec::plain(21, true),
    FunctionSpec::plain(22, true),
    FunctionSpec::plain(25, true),
    FunctionSpec::plain(26, true),
    FunctionSpec::ranged(30, 3),
    FunctionSpec::plain(34, true),
    FunctionSpec::plain(41, true),
    FunctionSpec::plain(42, true),
    FunctionSpec::plain(43, true),
    FunctionSpec::ranged(55, 2),
    FunctionSpec::ranged(63, 9),
    FunctionSpec::ranged(64, 9),
];

/// One catalog entry; only `enabled` changes at runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub id: u8,
    pub enabled: bool,
    pub requires_debounce: bool,
    pub debounce_source: Option<String>,
    pub sub_range: Option<u8>,
}

impl From<&FunctionSpec> for Function {
    fn from(spec: &FunctionSpec) -> Self {
        Self {
            id: spec.id,
            enabled: spec.enabled,
            requires_debounce: spec.requires_debounce,
            debounce_source: spec.debounce_source.map(str::to_string),
            sub_range: spec.sub_range,
        }
    }
}

/// Ordered set of panel functions
#[derive(Debug, Clone)]
pub struct FunctionCatalog {
    functions: Vec<Function>,
}

impl FunctionCatalog {
    /// Build a catalog from a static table, rejecting duplicate ids
    pub fn from_table(table: &[FunctionSpec]) -> Result<Self, PanelError> {
        let mut seen = HashSet::new();
        for spec in table {
            if !seen.insert(spec.id) {
                return Err(PanelError::DuplicateFunction(spec.id));
            }
        }

        Ok(Self {
            functions: table.iter().map(Function::from).collect(),
        })
    }

    /// Catalog built from [`DEFAULT_FUNCTIONS`]
    pub fn default_catalog() -> Self {
        Self {
            functions: DEFAULT_FUNCTIONS.iter().map(Function::from).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Function> {
        self.functions.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter()
    }

    /// Look up a function by id
    pub fn find(&self, id: u8) -> Option<&Function> {
        self.functions.iter().find(|f| f.id == id)
    }

    pub(crate) fn position(&self, id: u8) -> Option<usize> {
        self.functions.iter().position(|f| f.id == id)
    }

    pub(crate) fn set_enabled(&mut self, index: usize, enabled: bool) {
        if let Some(function) = self.functions.get_mut(index) {
            function.enabled = enabled;
        }
    }

    /// Ids of every enabled function, in navigation order
    pub fn enabled_ids(&self) -> Vec<u8> {
        self.functions
            .iter()
            .filter(|f| f.enabled)
            .map(|f| f.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_is_valid() {
        let catalog = FunctionCatalog::from_table(DEFAULT_FUNCTIONS).unwrap();
        assert_eq!(catalog.len(), DEFAULT_FUNCTIONS.len());
        assert_eq!(catalog.enabled_ids().first(), Some(&1));
        assert_eq!(catalog.enabled_ids().last(), Some(&64));
        assert!(!catalog.find(3).unwrap().enabled);
        assert!(!catalog.find(8).unwrap().enabled);
        assert_eq!(catalog.find(30).unwrap().sub_range, Some(3));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let table = [FunctionSpec::plain(1, true), FunctionSpec::plain(1, false)];
        assert!(matches!(
            FunctionCatalog::from_table(&table),
            Err(PanelError::DuplicateFunction(1))
        ));
    }

    #[test]
    fn test_debounced_functions_carry_source() {
        let catalog = FunctionCatalog::default_catalog();
        let fast_power_off = catalog.find(8).unwrap();
        assert!(fast_power_off.requires_debounce);
        assert_eq!(fast_power_off.debounce_source.as_deref(), Some(MANUAL_MODE));
    }
}
