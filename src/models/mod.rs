use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const MENU_STATE_VERSION: u32 = 1;
pub const MENU_LIBRARY_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Weekday {
    Lunes,
    Martes,
    #[serde(rename = "Miércoles", alias = "Miercoles")]
    Miercoles,
    Jueves,
    Viernes,
}

impl Weekday {
    pub const ALL: [Weekday; 5] = [
        Weekday::Lunes,
        Weekday::Martes,
        Weekday::Miercoles,
        Weekday::Jueves,
        Weekday::Viernes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Weekday::Lunes => "Lunes",
            Weekday::Martes => "Martes",
            Weekday::Miercoles => "Miércoles",
            Weekday::Jueves => "Jueves",
            Weekday::Viernes => "Viernes",
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Weekday {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lunes" => Ok(Weekday::Lunes),
            "martes" => Ok(Weekday::Martes),
            "miércoles" | "miercoles" => Ok(Weekday::Miercoles),
            "jueves" => Ok(Weekday::Jueves),
            "viernes" => Ok(Weekday::Viernes),
            other => Err(format!("Unknown weekday: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayMenu {
    pub weekday: Weekday,
    pub plato_del_dia: String,
    pub precio_plato_del_dia: Option<f64>,
    pub precio_menu: Option<f64>,
    pub primeros: Vec<String>,
    pub segundos: Vec<String>,
    pub postres: Vec<String>,
    pub telefono: String,
    #[serde(default)]
    pub notas: String,
}

impl DayMenu {
    pub fn list(&self, category: MenuCategory) -> &[String] {
        match category {
            MenuCategory::Primeros => &self.primeros,
            MenuCategory::Segundos => &self.segundos,
            MenuCategory::Postres => &self.postres,
        }
    }

    pub fn apply(&mut self, patch: DayMenuPatch) {
        if let Some(value) = patch.plato_del_dia {
            self.plato_del_dia = value;
        }
        if let Some(value) = patch.precio_plato_del_dia {
            self.precio_plato_del_dia = value;
        }
        if let Some(value) = patch.precio_menu {
            self.precio_menu = value;
        }
        if let Some(value) = patch.primeros {
            self.primeros = value;
        }
        if let Some(value) = patch.segundos {
            self.segundos = value;
        }
        if let Some(value) = patch.postres {
            self.postres = value;
        }
        if let Some(value) = patch.telefono {
            self.telefono = value;
        }
        if let Some(value) = patch.notas {
            self.notas = value;
        }
    }
}

/// Partial update of a day. Prices are doubly optional so a patch can clear them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayMenuPatch {
    pub plato_del_dia: Option<String>,
    pub precio_plato_del_dia: Option<Option<f64>>,
    pub precio_menu: Option<Option<f64>>,
    pub primeros: Option<Vec<String>>,
    pub segundos: Option<Vec<String>>,
    pub postres: Option<Vec<String>>,
    pub telefono: Option<String>,
    pub notas: Option<String>,
}

impl DayMenuPatch {
    pub fn is_empty(&self) -> bool {
        *self == DayMenuPatch::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekMenu {
    #[serde(rename = "Lunes")]
    pub lunes: DayMenu,
    #[serde(rename = "Martes")]
    pub martes: DayMenu,
    #[serde(rename = "Miércoles")]
    pub miercoles: DayMenu,
    #[serde(rename = "Jueves")]
    pub jueves: DayMenu,
    #[serde(rename = "Viernes")]
    pub viernes: DayMenu,
}

impl WeekMenu {
    pub fn get(&self, weekday: Weekday) -> &DayMenu {
        match weekday {
            Weekday::Lunes => &self.lunes,
            Weekday::Martes => &self.martes,
            Weekday::Miercoles => &self.miercoles,
            Weekday::Jueves => &self.jueves,
            Weekday::Viernes => &self.viernes,
        }
    }

    pub fn get_mut(&mut self, weekday: Weekday) -> &mut DayMenu {
        match weekday {
            Weekday::Lunes => &mut self.lunes,
            Weekday::Martes => &mut self.martes,
            Weekday::Miercoles => &mut self.miercoles,
            Weekday::Jueves => &mut self.jueves,
            Weekday::Viernes => &mut self.viernes,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &DayMenu> {
        Weekday::ALL.into_iter().map(move |day| self.get(day))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuSettings {
    pub footer_lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuState {
    pub version: u32,
    pub days: WeekMenu,
    pub settings: MenuSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MenuCategory {
    Primeros,
    Segundos,
    Postres,
}

impl MenuCategory {
    pub const ALL: [MenuCategory; 3] = [
        MenuCategory::Primeros,
        MenuCategory::Segundos,
        MenuCategory::Postres,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MenuCategory::Primeros => "primeros",
            MenuCategory::Segundos => "segundos",
            MenuCategory::Postres => "postres",
        }
    }
}

impl FromStr for MenuCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "primeros" => Ok(MenuCategory::Primeros),
            "segundos" => Ok(MenuCategory::Segundos),
            "postres" => Ok(MenuCategory::Postres),
            other => Err(format!("Unknown category: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuLibrary {
    pub version: u32,
    pub primeros: Vec<String>,
    pub segundos: Vec<String>,
    pub postres: Vec<String>,
}

impl MenuLibrary {
    pub fn empty() -> Self {
        MenuLibrary {
            version: MENU_LIBRARY_VERSION,
            primeros: Vec::new(),
            segundos: Vec::new(),
            postres: Vec::new(),
        }
    }

    pub fn list(&self, category: MenuCategory) -> &Vec<String> {
        match category {
            MenuCategory::Primeros => &self.primeros,
            MenuCategory::Segundos => &self.segundos,
            MenuCategory::Postres => &self.postres,
        }
    }

    pub fn list_mut(&mut self, category: MenuCategory) -> &mut Vec<String> {
        match category {
            MenuCategory::Primeros => &mut self.primeros,
            MenuCategory::Segundos => &mut self.segundos,
            MenuCategory::Postres => &mut self.postres,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Uploaded,
    Processing,
    Parsed,
    Error,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Uploaded => "uploaded",
            InvoiceStatus::Processing => "processing",
            InvoiceStatus::Parsed => "parsed",
            InvoiceStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Parsed | InvoiceStatus::Error)
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "uploaded" => Ok(InvoiceStatus::Uploaded),
            "processing" => Ok(InvoiceStatus::Processing),
            "parsed" => Ok(InvoiceStatus::Parsed),
            "error" => Ok(InvoiceStatus::Error),
            other => Err(format!("Unknown status: {}", other)),
        }
    }
}

impl InvoiceStatus {
    /// Parses a status filter value. Blank and `all` match every status.
    pub fn parse_filter(raw: &str) -> Result<Option<Self>, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Ok(None);
        }
        trimmed.parse().map(Some)
    }
}

fn status_or_all<'de, D>(deserializer: D) -> Result<Option<InvoiceStatus>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => InvoiceStatus::parse_filter(&raw).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLineDto {
    pub id: String,
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<f64>,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDto {
    pub id: String,
    pub number: String,
    pub vendor: String,
    pub currency: String,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub original_file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<Vec<InvoiceLineDto>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvoiceDto {
    pub fn has_lines(&self) -> bool {
        self.lines.as_ref().map(|l| !l.is_empty()).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceFilters {
    pub vendor: Option<String>,
    /// `None` matches every status. Deserializes `"all"` as `None`.
    #[serde(default, deserialize_with = "status_or_all")]
    pub status: Option<InvoiceStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub total_min: Option<f64>,
    pub total_max: Option<f64>,
    pub currency: Option<String>,
    pub query: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Number,
    Vendor,
    Currency,
    Status,
    IssueDate,
    DueDate,
    Confidence,
    Subtotal,
    Tax,
    Total,
    OriginalFileName,
    CreatedAt,
    UpdatedAt,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.trim().to_string()))
            .map_err(|_| format!("Unknown sort field: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
    #[default]
    #[serde(rename = "")]
    None,
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            "" | "none" => Ok(SortDirection::None),
            other => Err(format!("Unknown sort direction: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub active: SortField,
    pub direction: SortDirection,
}

impl Default for SortSpec {
    fn default() -> Self {
        SortSpec {
            active: SortField::IssueDate,
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceListResponse {
    pub items: Vec<InvoiceDto>,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Queued,
    Uploading,
    Uploaded,
    Error,
    Canceled,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStatus::Uploaded | UploadStatus::Error | UploadStatus::Canceled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadItemDto {
    pub id: String,
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub progress: u8,
    pub status: UploadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareJobStatus {
    Queued,
    Processing,
    Ready,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareJobDto {
    pub id: String,
    pub invoice_ids: Vec<String>,
    pub status: CompareJobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareTotalsRow {
    pub invoice_id: String,
    pub vendor: String,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineValues {
    pub unit_price: f64,
    pub quantity: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareLineItem {
    pub description: String,
    pub unit_price: f64,
    pub quantity: f64,
    pub total: f64,
    pub by_invoice: BTreeMap<String, LineValues>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareResultDto {
    pub baseline_id: String,
    pub has_line_items: bool,
    pub vendors: Vec<String>,
    pub currency: String,
    pub totals: Vec<CompareTotalsRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_items: Option<Vec<CompareLineItem>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub sheets_endpoint: Option<String>,
    pub upload_endpoint: String,
    pub allowed_emails: Vec<String>,
    pub simulate_latency: bool,
    pub page_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            sheets_endpoint: None,
            upload_endpoint: "http://localhost:4200/api/invoices/upload".to_string(),
            allowed_emails: Vec::new(),
            simulate_latency: true,
            page_size: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekday_accepts_accented_and_plain_names() {
        assert_eq!("miércoles".parse::<Weekday>(), Ok(Weekday::Miercoles));
        assert_eq!(" Miercoles ".parse::<Weekday>(), Ok(Weekday::Miercoles));
        assert!("sábado".parse::<Weekday>().is_err());
        assert_eq!(
            serde_json::to_value(Weekday::Miercoles).unwrap(),
            serde_json::json!("Miércoles")
        );
    }

    #[test]
    fn sort_values_use_wire_names() {
        assert_eq!("issueDate".parse::<SortField>(), Ok(SortField::IssueDate));
        assert!("issue_date".parse::<SortField>().is_err());
        assert_eq!("".parse::<SortDirection>(), Ok(SortDirection::None));
        assert_eq!(
            serde_json::to_value(SortDirection::None).unwrap(),
            serde_json::json!("")
        );
    }

    #[test]
    fn status_filter_all_matches_everything() {
        let filters: InvoiceFilters = serde_json::from_value(serde_json::json!({"status": "all"})).unwrap();
        assert_eq!(filters.status, None);
        let filters: InvoiceFilters = serde_json::from_value(serde_json::json!({"status": "parsed"})).unwrap();
        assert_eq!(filters.status, Some(InvoiceStatus::Parsed));
        let filters: InvoiceFilters = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(filters.status, None);
        assert!(serde_json::from_value::<InvoiceFilters>(serde_json::json!({"status": "done"})).is_err());
        assert_eq!(InvoiceStatus::parse_filter(" ALL "), Ok(None));
    }

    #[test]
    fn upload_item_serializes_type_field() {
        let item = UploadItemDto {
            id: "upl-1".into(),
            name: "a.pdf".into(),
            size: 3,
            mime_type: "application/pdf".into(),
            progress: 0,
            status: UploadStatus::Queued,
            error: None,
            invoice_id: None,
        };
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["type"], "application/pdf");
        assert!(value.get("invoiceId").is_none());
        assert!(!item.status.is_terminal());
    }
}
