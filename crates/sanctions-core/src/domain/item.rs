//! Work items: approved sanctions as read from the remote table.
//!
//! Field names on the wire follow the remote table (`empleado_cod`,
//! `tipo_sancion`, ...). Unknown columns are ignored so schema additions on the
//! remote side do not break decoding.

use serde::{Deserialize, Serialize};

use super::category::Category;
use super::ids::SanctionId;

/// One approved sanction awaiting (or already past) HR processing.
///
/// Owned by the caller. The engine reads it and, on success, writes the new
/// comment into `hr_comment` of the caller's copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: SanctionId,

    #[serde(rename = "empleado_cod", default)]
    pub employee_code: Option<i64>,

    #[serde(rename = "empleado_nombre", default)]
    pub employee_name: Option<String>,

    #[serde(rename = "puesto", default)]
    pub position: Option<String>,

    #[serde(rename = "agente", default)]
    pub agent: Option<String>,

    #[serde(rename = "fecha", default)]
    pub date: Option<String>,

    #[serde(rename = "hora", default)]
    pub time: Option<String>,

    #[serde(rename = "tipo_sancion", default)]
    pub sanction_type: Option<String>,

    #[serde(rename = "observaciones", default)]
    pub observations: Option<String>,

    #[serde(default)]
    pub status: Option<String>,

    /// The claim marker. Non-empty means somebody already processed the record.
    #[serde(rename = "comentarios_rrhh", default)]
    pub hr_comment: Option<String>,
}

impl WorkItem {
    /// Minimal item, mostly useful for tests and seeding.
    pub fn new(id: impl Into<SanctionId>) -> Self {
        Self {
            id: id.into(),
            employee_code: None,
            employee_name: None,
            position: None,
            agent: None,
            date: None,
            time: None,
            sanction_type: None,
            observations: None,
            status: None,
            hr_comment: None,
        }
    }

    pub fn with_sanction_type(mut self, sanction_type: impl Into<String>) -> Self {
        self.sanction_type = Some(sanction_type.into());
        self
    }

    pub fn category(&self) -> Category {
        Category::of(self.sanction_type.as_deref().unwrap_or_default())
    }

    /// Has the claim marker been set? Any non-empty text counts.
    pub fn is_claimed(&self) -> bool {
        self.hr_comment.as_deref().is_some_and(|c| !c.is_empty())
    }
}

/// Payload for inserting a new record (used to seed a test sanction).
#[derive(Debug, Clone, Serialize)]
pub struct NewSanction {
    #[serde(rename = "empleado_cod")]
    pub employee_code: i64,
    #[serde(rename = "empleado_nombre")]
    pub employee_name: String,
    #[serde(rename = "puesto")]
    pub position: String,
    #[serde(rename = "agente")]
    pub agent: String,
    #[serde(rename = "fecha")]
    pub date: String,
    #[serde(rename = "hora")]
    pub time: String,
    #[serde(rename = "tipo_sancion")]
    pub sanction_type: String,
    #[serde(rename = "observaciones")]
    pub observations: String,
    pub status: String,
    #[serde(rename = "comentarios_rrhh")]
    pub hr_comment: Option<String>,
    pub supervisor_id: String,
}

impl NewSanction {
    /// An approved, unclaimed record that shows up in the pending list.
    pub fn test_record(today: chrono::NaiveDate, created_at: &str) -> Self {
        Self {
            employee_code: 99999,
            employee_name: "EMPLEADO PRUEBA SISTEMA".to_string(),
            position: "VIGILANTE DE PRUEBA".to_string(),
            agent: "SISTEMA AUTOMATICO".to_string(),
            date: today.format("%Y-%m-%d").to_string(),
            time: "08:00:00".to_string(),
            sanction_type: "ATRASO".to_string(),
            observations: format!("Sanción de prueba creada el {created_at}"),
            status: "aprobado".to_string(),
            hr_comment: None,
            supervisor_id: "00000000-0000-0000-0000-000000000000".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_remote_row_and_ignores_unknown_columns() {
        let row = json!({
            "id": "0f8fad5b-d9cb-469f-a165-70867728950e",
            "empleado_cod": 1234,
            "empleado_nombre": "JUAN PEREZ",
            "tipo_sancion": "FALTA",
            "fecha": "2025-07-01",
            "status": "aprobado",
            "comentarios_rrhh": null,
            "supervisor_id": "x",
            "updated_at": "2025-07-01T10:00:00Z"
        });
        let item: WorkItem = serde_json::from_value(row).unwrap();
        assert_eq!(item.id.short(), "0f8fad5b");
        assert_eq!(item.employee_code, Some(1234));
        assert_eq!(item.sanction_type.as_deref(), Some("FALTA"));
        assert!(!item.is_claimed());
    }

    #[test]
    fn empty_comment_is_not_a_claim() {
        let mut item = WorkItem::new("a");
        item.hr_comment = Some(String::new());
        assert!(!item.is_claimed());
        item.hr_comment = Some("Procesado para nómina - 2025-07-01 10:00 - rrhh".to_string());
        assert!(item.is_claimed());
    }

    #[test]
    fn test_record_is_approved_and_unclaimed() {
        let today = chrono::NaiveDate::from_ymd_opt(2025, 7, 14).unwrap();
        let rec = NewSanction::test_record(today, "2025-07-14 09:00:00");
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["status"], "aprobado");
        assert_eq!(v["fecha"], "2025-07-14");
        assert!(v["comentarios_rrhh"].is_null());
    }
}
