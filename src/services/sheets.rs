use async_trait::async_trait;
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{DayMenu, MenuCategory, Weekday};
use crate::utils::parse_decimal;

/// Remote spreadsheet endpoint used as a crude key-value sync target.
#[async_trait]
pub trait SheetsApi: Send + Sync {
    async fn read_menu(&self) -> Result<Option<RemoteMenu>>;
    async fn read_suggestions(&self) -> Result<RemoteSuggestions>;
    async fn append_suggestions(&self, category: MenuCategory, items: &[String]) -> Result<()>;
    async fn publish_day(&self, payload: &PublishPayload) -> Result<PublishOutcome>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteMenu {
    pub days: Vec<DayMenu>,
    pub footer_lines: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RemoteSuggestions {
    #[serde(default)]
    pub primeros: Vec<String>,
    #[serde(default)]
    pub segundos: Vec<String>,
    #[serde(default)]
    pub postres: Vec<String>,
}

impl RemoteSuggestions {
    pub fn list(&self, category: MenuCategory) -> &[String] {
        match category {
            MenuCategory::Primeros => &self.primeros,
            MenuCategory::Segundos => &self.segundos,
            MenuCategory::Postres => &self.postres,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishPayload {
    pub weekday: String,
    pub plato_del_dia: String,
    pub precio_plato_del_dia: Option<f64>,
    pub precio_menu: Option<f64>,
    pub primeros: Vec<String>,
    pub segundos: Vec<String>,
    pub postres: Vec<String>,
    pub telefono: String,
    pub notas: String,
}

impl From<&DayMenu> for PublishPayload {
    fn from(day: &DayMenu) -> Self {
        PublishPayload {
            weekday: day.weekday.as_str().to_string(),
            plato_del_dia: day.plato_del_dia.clone(),
            precio_plato_del_dia: day.precio_plato_del_dia,
            precio_menu: day.precio_menu,
            primeros: day.primeros.clone(),
            segundos: day.segundos.clone(),
            postres: day.postres.clone(),
            telefono: day.telefono.clone(),
            notas: day.notas.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(untagged)]
enum ListCell {
    List(Vec<String>),
    Text(String),
    #[default]
    Empty,
}

impl ListCell {
    fn into_items(self) -> Vec<String> {
        let raw = match self {
            ListCell::List(items) => items,
            ListCell::Text(text) => text
                .split(|c| c == ';' || c == '\n')
                .map(|s| s.to_string())
                .collect(),
            ListCell::Empty => Vec::new(),
        };
        raw.into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(untagged)]
enum PriceCell {
    Number(f64),
    Text(String),
    #[default]
    Empty,
}

impl PriceCell {
    fn into_price(self) -> Result<Option<f64>> {
        match self {
            PriceCell::Number(value) => Ok(Some(value)),
            PriceCell::Text(text) if text.trim().is_empty() => Ok(None),
            PriceCell::Text(text) => parse_decimal(&text)
                .map(Some)
                .map_err(|e| AppError::Sync(e.to_string())),
            PriceCell::Empty => Ok(None),
        }
    }
}

/// One spreadsheet row. Unknown columns are rejected; missing ones take the defaults below.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DayRow {
    weekday: String,
    #[serde(default)]
    plato_del_dia: String,
    #[serde(default)]
    precio_plato_del_dia: PriceCell,
    #[serde(default)]
    precio_menu: PriceCell,
    #[serde(default)]
    primeros: ListCell,
    #[serde(default)]
    segundos: ListCell,
    #[serde(default)]
    postres: ListCell,
    #[serde(default)]
    telefono: String,
    #[serde(default)]
    notas: String,
    #[serde(default, rename = "updatedAt")]
    _updated_at: Option<String>,
}

impl DayRow {
    fn into_day(self) -> Result<DayMenu> {
        let weekday = self
            .weekday
            .parse::<Weekday>()
            .map_err(AppError::Sync)?;
        Ok(DayMenu {
            weekday,
            plato_del_dia: self.plato_del_dia.trim().to_string(),
            precio_plato_del_dia: self.precio_plato_del_dia.into_price()?,
            precio_menu: self.precio_menu.into_price()?,
            primeros: self.primeros.into_items(),
            segundos: self.segundos.into_items(),
            postres: self.postres.into_items(),
            telefono: self.telefono.trim().to_string(),
            notas: self.notas,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MenuReadResponse {
    #[serde(default)]
    rows: Vec<DayRow>,
    #[serde(default)]
    footer_lines: Option<Vec<String>>,
}

fn menu_read_schema() -> Value {
    let list_cell = json!({"type": ["array", "string", "null"], "items": {"type": "string"}});
    let price_cell = json!({"type": ["number", "string", "null"]});
    json!({
        "type": "object",
        "required": ["ok"],
        "properties": {
            "ok": {"type": "boolean"},
            "error": {"type": ["string", "null"]},
            "rows": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["weekday"],
                    "properties": {
                        "weekday": {"type": "string"},
                        "platoDelDia": {"type": "string"},
                        "precioPlatoDelDia": price_cell.clone(),
                        "precioMenu": price_cell,
                        "primeros": list_cell.clone(),
                        "segundos": list_cell.clone(),
                        "postres": list_cell,
                        "telefono": {"type": "string"},
                        "notas": {"type": "string"}
                    }
                }
            },
            "footerLines": {"type": ["array", "null"], "items": {"type": "string"}}
        }
    })
}

fn suggestions_read_schema() -> Value {
    let list = json!({"type": ["array", "null"], "items": {"type": "string"}});
    json!({
        "type": "object",
        "required": ["ok"],
        "properties": {
            "ok": {"type": "boolean"},
            "error": {"type": ["string", "null"]},
            "primeros": list.clone(),
            "segundos": list.clone(),
            "postres": list
        }
    })
}

fn envelope_schema() -> Value {
    json!({
        "type": "object",
        "required": ["ok"],
        "properties": {
            "ok": {"type": "boolean"},
            "error": {"type": ["string", "null"]}
        }
    })
}

fn validate(schema: &Value, value: &Value) -> Result<()> {
    let compiled = JSONSchema::compile(schema)
        .map_err(|e| AppError::Sync(format!("Invalid schema: {}", e)))?;
    if let Err(errors) = compiled.validate(value) {
        let messages = errors.map(|e| e.to_string()).collect::<Vec<_>>();
        return Err(AppError::Sync(format!(
            "Unexpected response shape: {}",
            messages.join("; ")
        )));
    }
    Ok(())
}

fn check_envelope(value: &Value) -> Result<()> {
    if value.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(());
    }
    let message = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("remote reported failure");
    Err(AppError::Sync(message.to_string()))
}

/// Strict decode of a `menu-read` response. An empty row set means "nothing stored remotely".
pub fn decode_menu_response(value: Value) -> Result<Option<RemoteMenu>> {
    validate(&menu_read_schema(), &value)?;
    check_envelope(&value)?;
    let response: MenuReadResponse =
        serde_json::from_value(strip_envelope(value)).map_err(|e| AppError::Sync(e.to_string()))?;

    if response.rows.is_empty() {
        return Ok(None);
    }

    let days = response
        .rows
        .into_iter()
        .map(DayRow::into_day)
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(RemoteMenu {
        days,
        footer_lines: response.footer_lines,
    }))
}

pub fn decode_suggestions_response(value: Value) -> Result<RemoteSuggestions> {
    validate(&suggestions_read_schema(), &value)?;
    check_envelope(&value)?;
    let mut suggestions = RemoteSuggestions::default();
    for category in MenuCategory::ALL {
        let items = value
            .get(category.as_str())
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        match category {
            MenuCategory::Primeros => suggestions.primeros = items,
            MenuCategory::Segundos => suggestions.segundos = items,
            MenuCategory::Postres => suggestions.postres = items,
        }
    }
    Ok(suggestions)
}

/// Publish responses may be opaque; a non-JSON success body counts as ok.
pub fn decode_publish_response(body: &str) -> Result<PublishOutcome> {
    let value = match serde_json::from_str::<Value>(body) {
        Ok(value) => value,
        Err(_) => {
            return Ok(PublishOutcome {
                ok: true,
                error: None,
            })
        }
    };
    validate(&envelope_schema(), &value)?;
    Ok(serde_json::from_value(value)?)
}

fn strip_envelope(mut value: Value) -> Value {
    if let Some(map) = value.as_object_mut() {
        map.remove("ok");
        map.remove("error");
    }
    value
}

pub struct SheetsClient {
    client: reqwest::Client,
    endpoint: String,
    journal: Option<Arc<Mutex<Database>>>,
}

impl SheetsClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        SheetsClient {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            journal: None,
        }
    }

    /// Record every remote call's outcome in the `sync_logs` table.
    pub fn with_journal(mut self, db: Arc<Mutex<Database>>) -> Self {
        self.journal = Some(db);
        self
    }

    fn record<T>(&self, action: &str, result: &Result<T>) {
        let Some(db) = &self.journal else {
            return;
        };
        let (status, message) = match result {
            Ok(_) => ("success", None),
            Err(err) => ("failed", Some(err.to_string())),
        };
        match db.lock() {
            Ok(db) => {
                if let Err(err) = db.log_sync(action, status, message.as_deref()) {
                    warn!(error = %err, action, "Could not write sync log");
                }
            }
            Err(_) => warn!(action, "Sync log lock poisoned"),
        }
    }

    async fn get_action(&self, action: &str) -> Result<Value> {
        debug!(action, "GET sheets endpoint");
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("action", action)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::Sync(format!("{} returned HTTP {}", action, status)));
        }
        Ok(response.json::<Value>().await?)
    }

    async fn post_form(&self, action: &str, form: &[(&str, String)]) -> Result<String> {
        debug!(action, "POST sheets endpoint");
        let response = self.client.post(&self.endpoint).form(form).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Sync(format!("{} returned HTTP {}: {}", action, status, body)));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl SheetsApi for SheetsClient {
    async fn read_menu(&self) -> Result<Option<RemoteMenu>> {
        let result = match self.get_action("menu-read").await {
            Ok(value) => decode_menu_response(value),
            Err(err) => Err(err),
        };
        self.record("menu-read", &result);
        result
    }

    async fn read_suggestions(&self) -> Result<RemoteSuggestions> {
        let result = match self.get_action("suggestions-read").await {
            Ok(value) => decode_suggestions_response(value),
            Err(err) => Err(err),
        };
        self.record("suggestions-read", &result);
        result
    }

    async fn append_suggestions(&self, category: MenuCategory, items: &[String]) -> Result<()> {
        let form = [
            ("action", "suggestions-append".to_string()),
            ("category", category.as_str().to_string()),
            ("items", serde_json::to_string(items)?),
        ];
        let result = match self.post_form("suggestions-append", &form).await {
            Ok(body) => decode_publish_response(&body).and_then(|outcome| {
                if outcome.ok {
                    Ok(())
                } else {
                    Err(AppError::Sync(outcome.error.unwrap_or_else(|| "append rejected".to_string())))
                }
            }),
            Err(err) => Err(err),
        };
        self.record("suggestions-append", &result);
        result
    }

    async fn publish_day(&self, payload: &PublishPayload) -> Result<PublishOutcome> {
        let form = [("payload", serde_json::to_string(payload)?)];
        let result = match self.post_form("publishDay", &form).await {
            Ok(body) => decode_publish_response(&body),
            Err(err) => Err(err),
        };
        self.record("publishDay", &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_rows_with_mixed_cell_shapes() {
        let value = json!({
            "ok": true,
            "rows": [{
                "weekday": "miercoles",
                "platoDelDia": " Cocido ",
                "precioPlatoDelDia": "5,20",
                "precioMenu": 11.5,
                "primeros": "Sopa; Ensalada\nCrema",
                "segundos": ["Merluza", " "],
                "telefono": "600 000 000"
            }],
            "footerLines": ["Linea 1"]
        });

        let menu = decode_menu_response(value).unwrap().expect("rows present");
        let day = &menu.days[0];
        assert_eq!(day.weekday, Weekday::Miercoles);
        assert_eq!(day.plato_del_dia, "Cocido");
        assert_eq!(day.precio_plato_del_dia, Some(5.2));
        assert_eq!(day.precio_menu, Some(11.5));
        assert_eq!(day.primeros, vec!["Sopa", "Ensalada", "Crema"]);
        assert_eq!(day.segundos, vec!["Merluza"]);
        assert!(day.postres.is_empty());
        assert_eq!(menu.footer_lines, Some(vec!["Linea 1".to_string()]));
    }

    #[test]
    fn rejects_unknown_columns() {
        let value = json!({"ok": true, "rows": [{"weekday": "Lunes", "colorFondo": "rojo"}]});
        assert!(matches!(decode_menu_response(value), Err(AppError::Sync(_))));
    }

    #[test]
    fn rejects_unknown_weekday_and_bad_price() {
        let bad_day = json!({"ok": true, "rows": [{"weekday": "Sabado"}]});
        assert!(decode_menu_response(bad_day).is_err());
        let bad_price = json!({"ok": true, "rows": [{"weekday": "Lunes", "precioMenu": "gratis"}]});
        assert!(decode_menu_response(bad_price).is_err());
    }

    #[test]
    fn empty_rows_mean_nothing_remote() {
        let value = json!({"ok": true, "rows": []});
        assert_eq!(decode_menu_response(value).unwrap(), None);
    }

    #[test]
    fn error_envelope_is_a_sync_failure() {
        let value = json!({"ok": false, "error": "sheet locked"});
        match decode_menu_response(value) {
            Err(AppError::Sync(message)) => assert_eq!(message, "sheet locked"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn schema_mismatch_is_rejected() {
        let value = json!({"ok": "yes", "rows": 3});
        assert!(decode_menu_response(value).is_err());
    }

    #[test]
    fn suggestions_decode_trims_and_defaults() {
        let value = json!({"ok": true, "primeros": [" Sopa ", ""], "postres": ["Flan"]});
        let suggestions = decode_suggestions_response(value).unwrap();
        assert_eq!(suggestions.primeros, vec!["Sopa"]);
        assert!(suggestions.segundos.is_empty());
        assert_eq!(suggestions.list(MenuCategory::Postres), ["Flan".to_string()]);
    }

    #[test]
    fn opaque_publish_body_counts_as_ok() {
        assert!(decode_publish_response("<html>ok</html>").unwrap().ok);
        let failed = decode_publish_response(r#"{"ok": false, "error": "quota"}"#).unwrap();
        assert!(!failed.ok);
        assert_eq!(failed.error.as_deref(), Some("quota"));
    }
}
