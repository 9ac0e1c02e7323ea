//! Sanction categories used to group work in the shell.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::item::WorkItem;

const ABSENCES_AND_LEAVE: &[&str] = &["FALTA", "PERMISO"];
const OVERTIME_AND_REST_DAYS: &[&str] = &["HORAS EXTRAS", "FRANCO TRABAJADO"];

/// Known types that land in `Other`. Kept for reference; anything not listed
/// in the first two groups goes there anyway.
pub const OTHER_KNOWN_TYPES: &[&str] = &[
    "ATRASO",
    "DORMIDO",
    "MALA URBANIDAD",
    "FALTA DE RESPETO",
    "MAL UNIFORMADO",
    "ABANDONO DE PUESTO",
    "MAL SERVICIO DE GUARDIA",
    "INCUMPLIMIENTO DE POLITICAS",
    "MAL USO DEL EQUIPO DE DOTACIÓN",
];

/// Display order is the declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    AbsencesAndLeave,
    OvertimeAndRestDays,
    Other,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::AbsencesAndLeave,
        Category::OvertimeAndRestDays,
        Category::Other,
    ];

    /// Classify a raw sanction type (case-insensitive, surrounding whitespace ignored).
    pub fn of(sanction_type: &str) -> Self {
        let normalized = sanction_type.trim().to_uppercase();
        if ABSENCES_AND_LEAVE.contains(&normalized.as_str()) {
            Category::AbsencesAndLeave
        } else if OVERTIME_AND_REST_DAYS.contains(&normalized.as_str()) {
            Category::OvertimeAndRestDays
        } else {
            Category::Other
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::AbsencesAndLeave => "Faltas y Permisos",
            Category::OvertimeAndRestDays => "Horas y Franco",
            Category::Other => "Resto",
        }
    }

    /// Parse either the label or a short slug (`faltas`, `horas`, `resto`).
    pub fn parse(input: &str) -> Option<Self> {
        let needle = input.trim().to_lowercase();
        Category::ALL.into_iter().find(|c| {
            c.label().to_lowercase() == needle || c.slug() == needle
        })
    }

    pub fn slug(self) -> &'static str {
        match self {
            Category::AbsencesAndLeave => "faltas",
            Category::OvertimeAndRestDays => "horas",
            Category::Other => "resto",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Group items by category. Every category is present, possibly empty.
pub fn categorize(items: impl IntoIterator<Item = WorkItem>) -> BTreeMap<Category, Vec<WorkItem>> {
    let mut groups: BTreeMap<Category, Vec<WorkItem>> =
        Category::ALL.into_iter().map(|c| (c, Vec::new())).collect();
    for item in items {
        groups.entry(item.category()).or_default().push(item);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("FALTA", Category::AbsencesAndLeave)]
    #[case("permiso", Category::AbsencesAndLeave)]
    #[case(" Horas Extras ", Category::OvertimeAndRestDays)]
    #[case("FRANCO TRABAJADO", Category::OvertimeAndRestDays)]
    #[case("ATRASO", Category::Other)]
    #[case("FALTA DE RESPETO", Category::Other)]
    #[case("", Category::Other)]
    #[case("ALGO NUEVO", Category::Other)]
    fn classifies_sanction_types(#[case] raw: &str, #[case] expected: Category) {
        assert_eq!(Category::of(raw), expected);
    }

    #[test]
    fn listed_other_types_stay_in_other() {
        for raw in OTHER_KNOWN_TYPES {
            assert_eq!(Category::of(raw), Category::Other, "{raw}");
        }
    }

    #[test]
    fn categorize_keeps_every_group() {
        let items = vec![
            WorkItem::new("a").with_sanction_type("FALTA"),
            WorkItem::new("b").with_sanction_type("DORMIDO"),
            WorkItem::new("c"),
        ];
        let groups = categorize(items);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[&Category::AbsencesAndLeave].len(), 1);
        assert!(groups[&Category::OvertimeAndRestDays].is_empty());
        assert_eq!(groups[&Category::Other].len(), 2);
    }

    #[rstest]
    #[case("faltas", Some(Category::AbsencesAndLeave))]
    #[case("Horas y Franco", Some(Category::OvertimeAndRestDays))]
    #[case("RESTO", Some(Category::Other))]
    #[case("nope", None)]
    fn parses_labels_and_slugs(#[case] raw: &str, #[case] expected: Option<Category>) {
        assert_eq!(Category::parse(raw), expected);
    }
}
