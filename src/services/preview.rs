//! Plain-text rendering of the printable day sheet.

use crate::models::{DayMenu, MenuSettings};

const COLUMN_WIDTH: usize = 36;

/// `5.2` becomes `"5,20 €"`.
pub fn format_eur(value: f64) -> String {
    format!("{:.2} €", value).replace('.', ",")
}

pub fn format_price(value: Option<f64>) -> String {
    value.map(format_eur).unwrap_or_default()
}

/// Upper-cases the first non-blank character and keeps leading whitespace.
pub fn format_dessert(value: &str) -> String {
    let trimmed = value.trim_start();
    let Some(first) = trimmed.chars().next() else {
        return value.to_string();
    };
    let lead = &value[..value.len() - trimmed.len()];
    let rest = &trimmed[first.len_utf8()..];
    format!("{}{}{}", lead, first.to_uppercase(), rest)
}

/// Desserts split into two columns: even positions left, odd positions right.
pub fn dessert_columns(postres: &[String]) -> (Vec<String>, Vec<String>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    for (index, item) in postres.iter().enumerate() {
        let formatted = format_dessert(item);
        if index % 2 == 0 {
            left.push(formatted);
        } else {
            right.push(formatted);
        }
    }
    (left, right)
}

fn title(label: &str, price: &str) -> String {
    if price.is_empty() {
        label.to_string()
    } else {
        format!("{}  {}", label, price)
    }
}

fn bullets(items: &[String]) -> impl Iterator<Item = String> + '_ {
    items.iter().map(|item| format!("  - {}", item))
}

pub fn render_day(day: &DayMenu, settings: &MenuSettings) -> String {
    let mut lines = vec![
        day.weekday.as_str().to_uppercase(),
        String::new(),
        title("PLATO DEL DÍA", &format_price(day.precio_plato_del_dia)),
        day.plato_del_dia.clone(),
        String::new(),
        title("MENÚ", &format_price(day.precio_menu)),
        String::new(),
        "PRIMEROS PLATOS".to_string(),
    ];
    lines.extend(bullets(&day.primeros));
    lines.push(String::new());
    lines.push("SEGUNDOS PLATOS".to_string());
    lines.extend(bullets(&day.segundos));
    lines.push(String::new());

    lines.push("POSTRES CASEROS".to_string());
    let (left, right) = dessert_columns(&day.postres);
    for (index, item) in left.iter().enumerate() {
        lines.push(match right.get(index) {
            Some(other) => format!("  - {:<width$}  - {}", item, other, width = COLUMN_WIDTH),
            None => format!("  - {}", item),
        });
    }
    lines.push(String::new());

    lines.push(format!("RESERVA TU MENÚ EN EL TLF: {}", day.telefono));
    lines.extend(settings.footer_lines.iter().cloned());
    if !day.notas.trim().is_empty() {
        lines.push(String::new());
        lines.push(day.notas.trim().to_string());
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
