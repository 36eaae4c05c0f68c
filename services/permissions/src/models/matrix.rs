//! Editable permission matrix of a single role

use std::collections::BTreeMap;

use super::role::{PermissionGrant, RolePermission};
use super::section::{ApplicationSection, FunctionId, SectionId};

/// Full section/function cross-product of a role, keyed by `(section, function)`.
///
/// Edits are made on the whole matrix and submitted back as a complete grant set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionMatrix {
    entries: BTreeMap<(SectionId, FunctionId), RolePermission>,
}

impl PermissionMatrix {
    pub fn new(entries: Vec<RolePermission>) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| ((entry.section.id, entry.function.id), entry))
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, section_id: SectionId, function_id: FunctionId) -> Option<&RolePermission> {
        self.entries.get(&(section_id, function_id))
    }

    /// Flip the grant of one pair, returning the new flag
    pub fn toggle(&mut self, section_id: SectionId, function_id: FunctionId) -> Option<bool> {
        self.entries
            .get_mut(&(section_id, function_id))
            .map(|entry| {
                entry.has_access = !entry.has_access;
                entry.has_access
            })
    }

    pub fn into_entries(self) -> Vec<RolePermission> {
        self.entries.into_values().collect()
    }

    /// Complete grant set, one per pair, for submission
    pub fn grants(&self) -> Vec<PermissionGrant> {
        self.entries.values().map(RolePermission::grant).collect()
    }

    /// Distinct sections of the matrix in identifier order
    pub fn sections(&self) -> Vec<ApplicationSection> {
        let mut sections: Vec<ApplicationSection> = Vec::new();
        for entry in self.entries.values() {
            if sections.last().map(|s| s.id) != Some(entry.section.id) {
                sections.push(entry.section.clone());
            }
        }
        sections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::section::reference_data;

    fn blank_matrix() -> PermissionMatrix {
        let entries = reference_data()
            .into_iter()
            .flat_map(|s| {
                let section = s.section.clone();
                s.functions.into_iter().map(move |function| RolePermission {
                    section: section.clone(),
                    function,
                    has_access: false,
                })
            })
            .collect();
        PermissionMatrix::new(entries)
    }

    #[test]
    fn test_toggle_flips_only_the_addressed_pair() {
        let mut matrix = blank_matrix();

        assert_eq!(matrix.toggle(3, 9), Some(true));
        assert!(matrix.get(3, 9).map(|e| e.has_access).unwrap_or(false));
        assert_eq!(matrix.grants().iter().filter(|g| g.has_access).count(), 1);

        assert_eq!(matrix.toggle(3, 9), Some(false));
        assert!(matrix.grants().iter().all(|g| !g.has_access));
    }

    #[test]
    fn test_toggle_rejects_function_outside_section() {
        let mut matrix = blank_matrix();
        // "Add Operator" lives in section 3, not section 1
        assert_eq!(matrix.toggle(1, 9), None);
        assert!(matrix.grants().iter().all(|g| !g.has_access));
    }

    #[test]
    fn test_sections_are_distinct_and_ordered() {
        let matrix = blank_matrix();
        let names: Vec<String> = matrix.sections().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "Estate",
                "Merchant",
                "Operator",
                "Contract",
                "File Processing",
                "Reporting"
            ]
        );
        assert_eq!(matrix.len(), 21);
    }
}
