use serde::{Deserialize, Serialize};

use crate::models::{DayMenu, DayMenuPatch, MenuCategory, MenuState, Weekday};
use crate::services::preview::render_day;
use crate::services::sheets::PublishOutcome;
use crate::services::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct UpdateDayPayload {
    pub plato_del_dia: Option<String>,
    pub precio_plato_del_dia: Option<String>,
    pub precio_menu: Option<String>,
    pub primeros: Option<Vec<String>>,
    pub segundos: Option<Vec<String>>,
    pub postres: Option<Vec<String>>,
    pub telefono: Option<String>,
    pub notas: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub menu: bool,
    pub suggestions: bool,
}

/// Blank clears the price, anything else must parse as a decimal.
fn parse_price(raw: Option<String>) -> Result<Option<Option<f64>>, String> {
    match raw {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(Some(None)),
        Some(value) => crate::utils::parse_decimal(&value)
            .map(|v| Some(Some(v)))
            .map_err(|e| e.to_string()),
    }
}

pub fn get_menu(state: &AppState) -> MenuState {
    state.menu.state().as_ref().clone()
}

pub fn get_day(state: &AppState, weekday: Weekday) -> DayMenu {
    state.menu.day(weekday)
}

pub async fn update_day(
    state: &AppState,
    weekday: Weekday,
    payload: UpdateDayPayload,
) -> Result<DayMenu, String> {
    let patch = DayMenuPatch {
        precio_plato_del_dia: parse_price(payload.precio_plato_del_dia)?,
        precio_menu: parse_price(payload.precio_menu)?,
        plato_del_dia: payload.plato_del_dia,
        primeros: payload.primeros,
        segundos: payload.segundos,
        postres: payload.postres,
        telefono: payload.telefono,
        notas: payload.notas,
    };
    if patch.is_empty() {
        return Err("Nothing to update".to_string());
    }

    let typed = MenuCategory::ALL
        .into_iter()
        .filter_map(|category| {
            let items = match category {
                MenuCategory::Primeros => patch.primeros.clone(),
                MenuCategory::Segundos => patch.segundos.clone(),
                MenuCategory::Postres => patch.postres.clone(),
            }?;
            Some((category, items))
        })
        .collect::<Vec<_>>();

    state
        .menu
        .update_day(weekday, patch)
        .map_err(|e| e.to_string())?;

    let sheets = state.sheets();
    for (category, items) in typed {
        let result = match &sheets {
            Some(api) => state.library.add_items_synced(api.as_ref(), category, &items).await,
            None => state.library.add_items(category, &items),
        };
        result.map_err(|e| e.to_string())?;
    }
    Ok(state.menu.day(weekday))
}

pub fn set_footer(state: &AppState, lines: Vec<String>) -> Result<Vec<String>, String> {
    let lines = lines
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>();
    state
        .menu
        .update_footer_lines(lines)
        .map_err(|e| e.to_string())?;
    Ok(state.menu.state().settings.footer_lines.clone())
}

pub fn reset_menu(state: &AppState, weekday: Option<Weekday>) -> Result<MenuState, String> {
    let result = match weekday {
        Some(day) => state.menu.reset_day_to_defaults(day),
        None => state.menu.reset_all_to_defaults(),
    };
    result.map_err(|e| e.to_string())?;
    Ok(get_menu(state))
}

pub fn preview_day(state: &AppState, weekday: Weekday) -> String {
    let menu = state.menu.state();
    render_day(menu.days.get(weekday), &menu.settings)
}

pub async fn sync_from_sheets(state: &AppState) -> Result<SyncReport, String> {
    let api = state
        .sheets()
        .ok_or_else(|| "Sheets endpoint not configured".to_string())?;
    let menu = state.menu.load_from_sheets(api.as_ref()).await;
    let suggestions = state.library.load_from_sheets(api.as_ref()).await;
    Ok(SyncReport { menu, suggestions })
}

pub async fn publish_day(state: &AppState, weekday: Weekday) -> Result<PublishOutcome, String> {
    let api = state
        .sheets()
        .ok_or_else(|| "Sheets endpoint not configured".to_string())?;
    Ok(state.menu.publish_day(api.as_ref(), weekday).await)
}

pub async fn add_suggestions(
    state: &AppState,
    category: MenuCategory,
    items: Vec<String>,
) -> Result<Vec<String>, String> {
    let result = match state.sheets() {
        Some(api) => state.library.add_items_synced(api.as_ref(), category, &items).await,
        None => state.library.add_items(category, &items),
    };
    result.map_err(|e| e.to_string())
}

pub fn list_suggestions(
    state: &AppState,
    category: MenuCategory,
    query: &str,
    weekday: Option<Weekday>,
) -> Vec<String> {
    let existing = weekday
        .map(|day| state.menu.day(day).list(category).to_vec())
        .unwrap_or_default();
    state.library.suggestions(category, query, &existing)
}
