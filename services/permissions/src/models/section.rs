//! Application sections and the functions checked inside them

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub type SectionId = i32;
pub type FunctionId = i32;

/// Top-level area of the back-office UI
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSection {
    pub id: SectionId,
    pub name: String,
}

/// Permission-checked capability within a section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    pub id: FunctionId,
    pub application_section_id: SectionId,
    pub name: String,
}

/// A section together with its functions, in identifier order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionWithFunctions {
    #[serde(flatten)]
    pub section: ApplicationSection,
    pub functions: Vec<Function>,
}

impl SectionWithFunctions {
    /// Find a function of this section by name
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// Seeded sections and functions, in the order the seed migration numbers them.
pub const REFERENCE_SECTIONS: &[(&str, &[&str])] = &[
    ("Estate", &["View Estate", "Edit Estate"]),
    (
        "Merchant",
        &[
            "View Merchant List",
            "View Merchant",
            "Add Merchant",
            "Edit Merchant",
            "Make Deposit",
        ],
    ),
    (
        "Operator",
        &["View Operator List", "Add Operator", "Edit Operator"],
    ),
    (
        "Contract",
        &[
            "View Contract List",
            "Add Contract",
            "View Products",
            "Add Product",
            "View Fees",
            "Add Fee",
        ],
    ),
    ("File Processing", &["View Import Log", "View File Details"]),
    (
        "Reporting",
        &[
            "Transaction Analysis",
            "Settlement Analysis",
            "Merchant Analysis",
        ],
    ),
];

/// Build the reference data with the identifiers assigned by the seed migration
pub fn reference_data() -> Vec<SectionWithFunctions> {
    let mut next_function_id: FunctionId = 1;

    REFERENCE_SECTIONS
        .iter()
        .zip(1..)
        .map(|((section_name, function_names), section_id)| {
            let functions = function_names
                .iter()
                .map(|name| {
                    let function = Function {
                        id: next_function_id,
                        application_section_id: section_id,
                        name: (*name).to_string(),
                    };
                    next_function_id += 1;
                    function
                })
                .collect();

            SectionWithFunctions {
                section: ApplicationSection {
                    id: section_id,
                    name: (*section_name).to_string(),
                },
                functions,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_ids_follow_seed_migration() {
        let sections = reference_data();
        assert_eq!(sections.len(), 6);

        let estate = &sections[0];
        assert_eq!(estate.section.id, 1);
        assert_eq!(estate.function("View Estate").map(|f| f.id), Some(1));
        assert_eq!(estate.function("Edit Estate").map(|f| f.id), Some(2));

        let operator = &sections[2];
        assert_eq!(operator.section.name, "Operator");
        assert_eq!(operator.function("Add Operator").map(|f| f.id), Some(9));

        let reporting = &sections[5];
        assert_eq!(reporting.section.id, 6);
        assert_eq!(
            reporting.function("Merchant Analysis").map(|f| f.id),
            Some(21)
        );
    }

    #[test]
    fn test_functions_point_at_their_section() {
        for section in reference_data() {
            assert!(
                section
                    .functions
                    .iter()
                    .all(|f| f.application_section_id == section.section.id)
            );
        }
    }
}
