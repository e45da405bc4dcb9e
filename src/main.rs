use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::Level;

use menu_diario::commands;
use menu_diario::commands::invoices::InvoiceQuery;
use menu_diario::commands::menu::UpdateDayPayload;
use menu_diario::db::Database;
use menu_diario::models::{MenuCategory, Weekday};
use menu_diario::services::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "menu-diario", version, about = "Daily menu editor and invoice review tool")]
struct Cli {
    /// Directory holding the local database
    #[arg(long, global = true, default_value = ".menu-diario")]
    data_dir: PathBuf,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Edit and publish the week's menu
    Menu {
        #[command(subcommand)]
        action: MenuAction,
    },
    /// Manage dish suggestions
    Suggest {
        #[command(subcommand)]
        action: SuggestAction,
    },
    /// Review supplier invoices
    Invoices {
        #[command(subcommand)]
        action: InvoicesAction,
    },
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

#[derive(Subcommand, Debug)]
enum MenuAction {
    Show {
        weekday: Option<Weekday>,
    },
    Set {
        weekday: Weekday,
        #[arg(long)]
        plato: Option<String>,
        /// Empty string clears the price
        #[arg(long)]
        precio_plato: Option<String>,
        #[arg(long)]
        precio_menu: Option<String>,
        #[arg(long = "primero")]
        primeros: Option<Vec<String>>,
        #[arg(long = "segundo")]
        segundos: Option<Vec<String>>,
        #[arg(long = "postre")]
        postres: Option<Vec<String>>,
        #[arg(long)]
        telefono: Option<String>,
        #[arg(long)]
        notas: Option<String>,
    },
    Footer {
        lines: Vec<String>,
    },
    /// Restore the built-in menu for one day, or the whole week
    Reset {
        weekday: Option<Weekday>,
    },
    Preview {
        weekday: Weekday,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Pull menu and suggestions from the remote sheet
    Sync,
    Publish {
        weekday: Weekday,
    },
}

#[derive(Subcommand, Debug)]
enum SuggestAction {
    Add {
        category: MenuCategory,
        #[arg(required = true)]
        items: Vec<String>,
    },
    List {
        category: MenuCategory,
        #[arg(short, long, default_value = "")]
        query: String,
        /// Hide dishes already on this day
        #[arg(long)]
        weekday: Option<Weekday>,
    },
}

#[derive(Subcommand, Debug)]
enum InvoicesAction {
    List {
        #[arg(long)]
        vendor: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        min_total: Option<f64>,
        #[arg(long)]
        max_total: Option<f64>,
        #[arg(short, long)]
        query: Option<String>,
        #[arg(long)]
        page: Option<usize>,
        #[arg(long)]
        page_size: Option<usize>,
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        direction: Option<String>,
    },
    Show {
        id: String,
    },
    Delete {
        id: String,
    },
    Retry {
        id: String,
        /// Poll until extraction finishes
        #[arg(long)]
        wait: bool,
    },
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Post to the configured upload endpoint instead of the local backend
        #[arg(long)]
        remote: bool,
        #[arg(long)]
        wait: bool,
    },
    Compare {
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long)]
        baseline: Option<String>,
        /// Write the totals as CSV to this file
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    Set { key: String, value: String },
    /// Recent remote sheet calls
    Logs {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
enum AuthAction {
    /// Sign in with an identity token
    Login { credential: String },
    Logout,
    Whoami,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("Create data dir {}", cli.data_dir.display()))?;
    let db = Database::new(cli.data_dir.join("menu-diario.sqlite"))?;
    let settings = commands::settings::load_settings(&db);
    let state = AppState::new(db, settings);

    match cli.command {
        Command::Menu { action } => run_menu(&state, action).await,
        Command::Suggest { action } => run_suggest(&state, action).await,
        Command::Invoices { action } => run_invoices(&state, action).await,
        Command::Settings { action } => run_settings(&state, action),
        Command::Auth { action } => run_auth(&state, action),
    }
}

async fn run_menu(state: &AppState, action: MenuAction) -> Result<()> {
    use commands::menu;

    match action {
        MenuAction::Show { weekday: Some(day) } => print_json(&menu::get_day(state, day)),
        MenuAction::Show { weekday: None } => print_json(&menu::get_menu(state)),
        MenuAction::Set {
            weekday,
            plato,
            precio_plato,
            precio_menu,
            primeros,
            segundos,
            postres,
            telefono,
            notas,
        } => {
            let payload = UpdateDayPayload {
                plato_del_dia: plato,
                precio_plato_del_dia: precio_plato,
                precio_menu,
                primeros,
                segundos,
                postres,
                telefono,
                notas,
            };
            let day = menu::update_day(state, weekday, payload)
                .await
                .map_err(anyhow::Error::msg)?;
            print_json(&day)
        }
        MenuAction::Footer { lines } => {
            print_json(&menu::set_footer(state, lines).map_err(anyhow::Error::msg)?)
        }
        MenuAction::Reset { weekday } => {
            print_json(&menu::reset_menu(state, weekday).map_err(anyhow::Error::msg)?)
        }
        MenuAction::Preview { weekday, output } => {
            let text = menu::preview_day(state, weekday);
            match output {
                Some(path) => std::fs::write(&path, text)
                    .with_context(|| format!("Write preview {}", path.display()))?,
                None => print!("{}", text),
            }
            Ok(())
        }
        MenuAction::Sync => {
            print_json(&menu::sync_from_sheets(state).await.map_err(anyhow::Error::msg)?)
        }
        MenuAction::Publish { weekday } => {
            let outcome = menu::publish_day(state, weekday)
                .await
                .map_err(anyhow::Error::msg)?;
            print_json(&outcome)?;
            if outcome.ok {
                Ok(())
            } else {
                Err(anyhow!("Publish failed"))
            }
        }
    }
}

async fn run_suggest(state: &AppState, action: SuggestAction) -> Result<()> {
    use commands::menu;

    match action {
        SuggestAction::Add { category, items } => {
            let added = menu::add_suggestions(state, category, items)
                .await
                .map_err(anyhow::Error::msg)?;
            print_json(&added)
        }
        SuggestAction::List {
            category,
            query,
            weekday,
        } => print_json(&menu::list_suggestions(state, category, &query, weekday)),
    }
}

async fn run_invoices(state: &AppState, action: InvoicesAction) -> Result<()> {
    use commands::invoices;

    match action {
        InvoicesAction::List {
            vendor,
            status,
            currency,
            from,
            to,
            min_total,
            max_total,
            query,
            page,
            page_size,
            sort,
            direction,
        } => {
            let query = InvoiceQuery {
                vendor,
                status,
                currency,
                date_from: from,
                date_to: to,
                total_min: min_total,
                total_max: max_total,
                query,
                page,
                page_size,
                sort,
                direction,
            };
            let page = invoices::list_invoices(state, query)
                .await
                .map_err(anyhow::Error::msg)?;
            print_json(&page)
        }
        InvoicesAction::Show { id } => print_json(
            &invoices::get_invoice(state, &id)
                .await
                .map_err(anyhow::Error::msg)?,
        ),
        InvoicesAction::Delete { id } => {
            invoices::delete_invoice(state, &id)
                .await
                .map_err(anyhow::Error::msg)?;
            println!("Deleted {}", id);
            Ok(())
        }
        InvoicesAction::Retry { id, wait } => print_json(
            &invoices::retry_extraction(state, &id, wait)
                .await
                .map_err(anyhow::Error::msg)?,
        ),
        InvoicesAction::Upload {
            paths,
            remote,
            wait,
        } => print_json(
            &invoices::upload_files(state, paths, remote, wait)
                .await
                .map_err(anyhow::Error::msg)?,
        ),
        InvoicesAction::Compare { ids, baseline, csv } => {
            let report = invoices::compare_invoices(state, ids, baseline)
                .await
                .map_err(anyhow::Error::msg)?;
            if let Some(path) = csv {
                let content = invoices::compare_csv(&report).map_err(anyhow::Error::msg)?;
                std::fs::write(&path, content)
                    .with_context(|| format!("Write CSV {}", path.display()))?;
            }
            print_json(&report)
        }
    }
}

fn run_settings(state: &AppState, action: SettingsAction) -> Result<()> {
    use commands::settings;

    match action {
        SettingsAction::Show => {
            print_json(&settings::get_settings(state).map_err(anyhow::Error::msg)?)
        }
        SettingsAction::Set { key, value } => print_json(
            &settings::save_setting(state, &key, &value).map_err(anyhow::Error::msg)?,
        ),
        SettingsAction::Logs { limit } => {
            print_json(&settings::get_sync_logs(state, limit).map_err(anyhow::Error::msg)?)
        }
    }
}

fn run_auth(state: &AppState, action: AuthAction) -> Result<()> {
    use commands::auth;

    match action {
        AuthAction::Login { credential } => {
            print_json(&auth::login(state, &credential).map_err(anyhow::Error::msg)?)
        }
        AuthAction::Logout => {
            auth::logout(state).map_err(anyhow::Error::msg)?;
            println!("Signed out");
            Ok(())
        }
        AuthAction::Whoami => match auth::whoami(state) {
            Some(user) => print_json(&user),
            None => {
                println!("Not signed in");
                Ok(())
            }
        },
    }
}
