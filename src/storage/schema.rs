//! Field schema: which fields are read from which side of the document

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::LayoutError;

/// Side of a two-sided document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Front,
    Back,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Front, Side::Back];

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Front => "front",
            Side::Back => "back",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered field lists per side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSchema {
    /// Fields printed on the front
    pub front_fields: Vec<String>,
    /// Fields printed on the back (including the MRZ block)
    pub back_fields: Vec<String>,
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self::polish_id_card()
    }
}

impl FieldSchema {
    /// Layout of the Polish identity card (dowód osobisty)
    pub fn polish_id_card() -> Self {
        let to_owned = |names: &[&str]| names.iter().map(|n| n.to_string()).collect();
        Self {
            front_fields: to_owned(&[
                "f_nazwisko",
                "f_imiona",
                "f_obywatelstwo",
                "f_data_urodzenia",
                "f_plec",
                "f_numer_ID",
                "f_data_waznosci",
                "f_numer_kodu",
            ]),
            back_fields: to_owned(&[
                "b_seria_id",
                "b_numer_id",
                "b_numer_ident",
                "b_data_wydania",
                "b_kto_wydal",
                "b_imiona_rodzicow",
                "b_nazwisko_rodowe",
                "b_miejsce_urodzenia",
                "MRZ",
            ]),
        }
    }

    /// Field list for one side
    pub fn fields(&self, side: Side) -> &[String] {
        match side {
            Side::Front => &self.front_fields,
            Side::Back => &self.back_fields,
        }
    }

    /// Total number of fields across both sides
    pub fn total_fields(&self) -> usize {
        self.front_fields.len() + self.back_fields.len()
    }

    /// Reject duplicate names within a side and names shared between sides.
    ///
    /// Merged results are keyed by field name, so an overlap would silently
    /// drop the front value.
    pub fn validate(&self) -> Result<(), LayoutError> {
        for fields in [&self.front_fields, &self.back_fields] {
            let mut seen = HashSet::new();
            for field in fields {
                if !seen.insert(field.as_str()) {
                    return Err(LayoutError::DuplicateField(field.clone()));
                }
            }
        }

        let front: HashSet<&str> = self.front_fields.iter().map(String::as_str).collect();
        let shared: Vec<String> = self
            .back_fields
            .iter()
            .filter(|f| front.contains(f.as_str()))
            .cloned()
            .collect();
        if !shared.is_empty() {
            return Err(LayoutError::FieldCollision(shared));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schema_sizes() {
        let schema = FieldSchema::default();
        assert_eq!(schema.fields(Side::Front).len(), 8);
        assert_eq!(schema.fields(Side::Back).len(), 9);
        assert_eq!(schema.total_fields(), 17);
        assert!(schema.back_fields.contains(&"MRZ".to_string()));
    }

    #[test]
    fn test_default_schema_is_valid() {
        assert!(FieldSchema::default().validate().is_ok());
    }

    #[test]
    fn test_schema_rejects_collision() {
        let schema = FieldSchema {
            front_fields: vec!["name".into(), "number".into()],
            back_fields: vec!["number".into(), "mrz".into()],
        };
        match schema.validate() {
            Err(LayoutError::FieldCollision(names)) => assert_eq!(names, vec!["number".to_string()]),
            other => panic!("expected collision, got {:?}", other),
        }
    }

    #[test]
    fn test_schema_rejects_duplicate() {
        let schema = FieldSchema {
            front_fields: vec!["name".into(), "name".into()],
            back_fields: vec![],
        };
        assert!(matches!(schema.validate(), Err(LayoutError::DuplicateField(_))));
    }

    #[test]
    fn test_side_display() {
        assert_eq!(Side::Front.to_string(), "front");
        assert_eq!(Side::Back.as_str(), "back");
    }
}
