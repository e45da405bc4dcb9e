//! Built-in week menu used on first start and by the reset operations.

use crate::models::{DayMenu, MenuSettings, MenuState, WeekMenu, Weekday, MENU_STATE_VERSION};

const TELEFONO: &str = "637 690 946 / 91 227 7899";

pub const DEFAULT_FOOTER_LINES: [&str; 3] = [
    "NO ENTRAN DOS SEGUNDOS COMO MENÚ",
    "LOS PEDIDOS TIENEN QUE ESPERAR SU TURNO",
    "EL MENÚ ESTÁ PREPARADO A PARTIR DE LAS 12.30h",
];

fn day(
    weekday: Weekday,
    plato_del_dia: &str,
    primeros: &[&str],
    segundos: &[&str],
    postres: &[&str],
) -> DayMenu {
    let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    DayMenu {
        weekday,
        plato_del_dia: plato_del_dia.to_string(),
        precio_plato_del_dia: Some(5.2),
        precio_menu: Some(11.5),
        primeros: owned(primeros),
        segundos: owned(segundos),
        postres: owned(postres),
        telefono: TELEFONO.to_string(),
        notas: String::new(),
    }
}

pub fn default_day(weekday: Weekday) -> DayMenu {
    match weekday {
        Weekday::Lunes => day(
            Weekday::Lunes,
            "Arroz de campo",
            &[
                "Arroz de campo",
                "Guiso de patatas con calamar y langostinos",
                "Calabacín relleno",
                "Raviolis de carne en salsa",
                "Ensalada alemana",
            ],
            &[
                "Librillo de pavo y queso",
                "Pechuga de pollo con salsa de champiñones",
                "Calamares a la andaluza",
                "Huevos fritos con bacon",
            ],
            &[
                "Yogurt con mermelada de frambuesa",
                "Profiteroles con chocolate",
                "Cóctel de frutas",
                "melón",
                "pudin casero",
                "tarta de wisky",
                "tarta de zanahoria casera",
                ",.etc",
            ],
        ),
        Weekday::Martes => day(
            Weekday::Martes,
            "Lentejas caseras",
            &[
                "Lentejas caseras",
                "Fideuá de marisco y pollo",
                "Espinacas a la crema",
                "Raviolis de carne en salsa",
                "vichyssoise",
            ],
            &["Pollo con tomate", "Lenguado al horno", "Cachopo", "Huevos con lomo"],
            &[
                "cóctel de frutas",
                "natillas caseras",
                "melón",
                "tarta limón",
                "profiteroles con chocolate",
                "tarta de wisky",
                "yogurt con mermelada de frambuesa, tarta de chocolate casera",
                "flan casero, .. etc",
            ],
        ),
        Weekday::Miercoles => day(
            Weekday::Miercoles,
            "Cocido madrileño (garbanzos, carne y verdura)",
            &[
                "Sopa de cocido con fideos",
                "Espaguetis a la carbonara",
                "Coliflor a la romana",
                "Ensalada de lechuga con salmón",
            ],
            &[
                "Cocido (garbanzos, carne y verdura)",
                "Merluza rebozada",
                "Pollo relleno",
                "Redondo en salsa",
            ],
            &[
                "Macedonia de frutas",
                "Melón",
                "Tarta de manzana",
                "Tarta de maracuyá",
                "Natillas caseras",
                "pudin casero",
                "flan casero",
                "yogurt con mermelada de frambuesa",
                "etc",
            ],
        ),
        Weekday::Jueves => day(
            Weekday::Jueves,
            "Paella mixta de pollo y mariscos",
            &[
                "Paella mixta de pollo y mariscos",
                "Guiso de patatas con costillas",
                "Crema de puerro y patata",
                "Canelones de pollo",
                "Arroz a la cubana",
            ],
            &[
                "Cazon adobado",
                "Secreto a la mostaza y miel",
                "Pollo al ajillo",
                "Huevos con gula",
            ],
            &[
                "Macedonia de frutas",
                "Melón",
                "Natillas caseras",
                "Profiteroles con chocolate",
                "puding",
                "yogurt con mermelada",
                "tarta de manzana ... etc",
            ],
        ),
        Weekday::Viernes => day(
            Weekday::Viernes,
            "Fabada asturiana",
            &[
                "Fabada asturiana",
                "Arroz caldoso",
                "Guisantes con jamón",
                "Macarrones con salsa de gambas",
                "Ensalada de  garbanzos",
            ],
            &[
                "Sepia con ali oli",
                "Carrillada",
                "Contramuslo encebollado al horno",
                "Huevos con chistorra",
            ],
            &[
                "Macedonia de frutas",
                "Natillas caseras",
                "profiteroles con chocolate",
                "tarta de manzana",
                "yogurt con mermelada de melocotón",
                "tiramisú casero",
                "melón,  etc",
            ],
        ),
    }
}

pub fn default_settings() -> MenuSettings {
    MenuSettings {
        footer_lines: DEFAULT_FOOTER_LINES.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn default_state() -> MenuState {
    MenuState {
        version: MENU_STATE_VERSION,
        days: WeekMenu {
            lunes: default_day(Weekday::Lunes),
            martes: default_day(Weekday::Martes),
            miercoles: default_day(Weekday::Miercoles),
            jueves: default_day(Weekday::Jueves),
            viernes: default_day(Weekday::Viernes),
        },
        settings: default_settings(),
    }
}
