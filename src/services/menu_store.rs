use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::data::{default_day, default_state};
use crate::db::KeyValueStore;
use crate::error::Result;
use crate::models::{DayMenu, DayMenuPatch, MenuState, Weekday, MENU_STATE_VERSION};
use crate::services::sheets::{PublishOutcome, PublishPayload, SheetsApi};

pub const MENU_STATE_KEY: &str = "menu-diario-state-v1";

/// Owner of the week's menu. Every mutation is persisted before subscribers are notified.
pub struct MenuStore {
    store: Arc<dyn KeyValueStore>,
    state: watch::Sender<Arc<MenuState>>,
}

/// Live view of a single weekday.
pub struct DayWatch {
    weekday: Weekday,
    rx: watch::Receiver<Arc<MenuState>>,
}

impl DayWatch {
    pub fn current(&self) -> DayMenu {
        self.rx.borrow().days.get(self.weekday).clone()
    }

    /// Waits for the next state change and returns the day as it is afterwards.
    pub async fn changed(&mut self) -> Option<DayMenu> {
        self.rx.changed().await.ok()?;
        let state = self.rx.borrow_and_update();
        Some(state.days.get(self.weekday).clone())
    }
}

impl MenuStore {
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let initial = load_initial(store.as_ref());
        let (state, _) = watch::channel(Arc::new(initial));
        MenuStore { store, state }
    }

    pub fn state(&self) -> Arc<MenuState> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<MenuState>> {
        self.state.subscribe()
    }

    pub fn day(&self, weekday: Weekday) -> DayMenu {
        self.state.borrow().days.get(weekday).clone()
    }

    pub fn watch_day(&self, weekday: Weekday) -> DayWatch {
        DayWatch {
            weekday,
            rx: self.state.subscribe(),
        }
    }

    pub fn update_day(&self, weekday: Weekday, patch: DayMenuPatch) -> Result<()> {
        let mut next = (*self.state()).clone();
        let day = next.days.get_mut(weekday);
        day.apply(patch);
        day.weekday = weekday;
        self.commit(next)
    }

    pub fn update_footer_lines(&self, lines: Vec<String>) -> Result<()> {
        let mut next = (*self.state()).clone();
        next.settings.footer_lines = lines;
        self.commit(next)
    }

    pub fn reset_day_to_defaults(&self, weekday: Weekday) -> Result<()> {
        let mut next = (*self.state()).clone();
        *next.days.get_mut(weekday) = default_day(weekday);
        self.commit(next)
    }

    pub fn reset_all_to_defaults(&self) -> Result<()> {
        self.commit(default_state())
    }

    /// Replaces local state with the remote menu. Failures are logged and reported as `false`.
    pub async fn load_from_sheets(&self, api: &dyn SheetsApi) -> bool {
        let remote = match api.read_menu().await {
            Ok(Some(remote)) => remote,
            Ok(None) => {
                debug!("Remote menu is empty, keeping local state");
                return false;
            }
            Err(err) => {
                warn!(error = %err, "Menu sync failed");
                return false;
            }
        };

        let mut next = (*self.state()).clone();
        for day in remote.days {
            let weekday = day.weekday;
            *next.days.get_mut(weekday) = day;
        }
        if let Some(lines) = remote.footer_lines {
            next.settings.footer_lines = lines;
        }

        match self.commit(next) {
            Ok(()) => {
                info!("Menu replaced from remote sheet");
                true
            }
            Err(err) => {
                warn!(error = %err, "Could not persist remote menu");
                false
            }
        }
    }

    pub async fn publish_day(&self, api: &dyn SheetsApi, weekday: Weekday) -> PublishOutcome {
        let payload = PublishPayload::from(&self.day(weekday));
        match api.publish_day(&payload).await {
            Ok(outcome) => {
                if outcome.ok {
                    info!(%weekday, "Day published");
                } else {
                    warn!(%weekday, error = ?outcome.error, "Publish rejected");
                }
                outcome
            }
            Err(err) => {
                warn!(%weekday, error = %err, "Publish failed");
                PublishOutcome {
                    ok: false,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    fn commit(&self, next: MenuState) -> Result<()> {
        let raw = serde_json::to_string(&next)?;
        self.store.set(MENU_STATE_KEY, &raw)?;
        self.state.send_replace(Arc::new(next));
        Ok(())
    }
}

fn load_initial(store: &dyn KeyValueStore) -> MenuState {
    let raw = match store.get(MENU_STATE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return default_state(),
        Err(err) => {
            warn!(error = %err, "Could not read stored menu, using defaults");
            return default_state();
        }
    };
    decode_stored(&raw).unwrap_or_else(default_state)
}

/// Overlays a stored blob on the defaults. Days that fail to decode keep their default.
fn decode_stored(raw: &str) -> Option<MenuState> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "Stored menu is not valid JSON, discarding");
            return None;
        }
    };

    if value.get("version").and_then(Value::as_u64) != Some(u64::from(MENU_STATE_VERSION)) {
        debug!("Stored menu has a different version, discarding");
        return None;
    }

    let mut state = default_state();
    if let Some(days) = value.get("days").and_then(Value::as_object) {
        for weekday in Weekday::ALL {
            let Some(raw_day) = days.get(weekday.as_str()) else {
                continue;
            };
            match serde_json::from_value::<DayMenu>(raw_day.clone()) {
                Ok(mut day) => {
                    day.weekday = weekday;
                    *state.days.get_mut(weekday) = day;
                }
                Err(err) => warn!(%weekday, error = %err, "Stored day is malformed, using default"),
            }
        }
    }

    if let Some(lines) = value.get("settings").and_then(|s| s.get("footerLines")) {
        match serde_json::from_value::<Vec<String>>(lines.clone()) {
            Ok(lines) => state.settings.footer_lines = lines,
            Err(err) => warn!(error = %err, "Stored footer lines are malformed"),
        }
    }

    Some(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::error::AppError;
    use crate::services::sheets::{RemoteMenu, RemoteSuggestions};
    use crate::models::MenuCategory;
    use async_trait::async_trait;

    struct FixedSheets {
        menu: Option<RemoteMenu>,
        fail: bool,
    }

    #[async_trait]
    impl SheetsApi for FixedSheets {
        async fn read_menu(&self) -> Result<Option<RemoteMenu>> {
            if self.fail {
                return Err(AppError::Sync("offline".into()));
            }
            Ok(self.menu.clone())
        }

        async fn read_suggestions(&self) -> Result<RemoteSuggestions> {
            Ok(RemoteSuggestions::default())
        }

        async fn append_suggestions(&self, _: MenuCategory, _: &[String]) -> Result<()> {
            Ok(())
        }

        async fn publish_day(&self, payload: &PublishPayload) -> Result<PublishOutcome> {
            if self.fail {
                return Err(AppError::Sync("offline".into()));
            }
            assert_eq!(payload.weekday, "Martes");
            Ok(PublishOutcome { ok: true, error: None })
        }
    }

    fn memory_store() -> Arc<dyn KeyValueStore> {
        Arc::new(MemoryStore::new())
    }

    #[test]
    fn starts_from_defaults_when_nothing_is_stored() {
        let store = MenuStore::load(memory_store());
        assert_eq!(*store.state(), default_state());
    }

    #[test]
    fn persisted_state_round_trips() {
        let kv = memory_store();
        let store = MenuStore::load(kv.clone());
        store
            .update_day(
                Weekday::Jueves,
                DayMenuPatch {
                    plato_del_dia: Some("Pisto".into()),
                    precio_menu: Some(None),
                    postres: Some(vec!["Flan".into()]),
                    notas: Some("sin gluten".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        store.update_footer_lines(vec!["Solo efectivo".into()]).unwrap();

        let reloaded = MenuStore::load(kv);
        assert_eq!(*reloaded.state(), *store.state());
        let jueves = reloaded.day(Weekday::Jueves);
        assert_eq!(jueves.plato_del_dia, "Pisto");
        assert_eq!(jueves.precio_menu, None);
        assert_eq!(jueves.weekday, Weekday::Jueves);
    }

    #[test]
    fn wrong_version_is_discarded() {
        let kv = memory_store();
        let mut stale = serde_json::to_value(default_state()).unwrap();
        stale["version"] = Value::from(2);
        stale["days"]["Lunes"]["platoDelDia"] = Value::from("Otro");
        kv.set(MENU_STATE_KEY, &stale.to_string()).unwrap();

        let store = MenuStore::load(kv);
        assert_eq!(*store.state(), default_state());
    }

    #[test]
    fn partial_blob_overlays_defaults() {
        let kv = memory_store();
        let mut viernes = serde_json::to_value(default_day(Weekday::Viernes)).unwrap();
        viernes["platoDelDia"] = Value::from("Pulpo");
        let blob = serde_json::json!({
            "version": 1,
            "days": { "Viernes": viernes, "Lunes": { "broken": true } },
        });
        kv.set(MENU_STATE_KEY, &blob.to_string()).unwrap();

        let store = MenuStore::load(kv);
        assert_eq!(store.day(Weekday::Viernes).plato_del_dia, "Pulpo");
        assert_eq!(store.day(Weekday::Lunes), default_day(Weekday::Lunes));
        assert_eq!(store.state().settings, crate::data::default_settings());
    }

    #[test]
    fn each_mutation_notifies_once() {
        let store = MenuStore::load(memory_store());
        let mut rx = store.subscribe();
        store.reset_day_to_defaults(Weekday::Lunes).unwrap();
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn reset_discards_edits() {
        let store = MenuStore::load(memory_store());
        let patch = DayMenuPatch {
            telefono: Some("000".into()),
            ..Default::default()
        };
        store.update_day(Weekday::Martes, patch.clone()).unwrap();
        store.update_day(Weekday::Viernes, patch).unwrap();
        store.reset_day_to_defaults(Weekday::Martes).unwrap();
        assert_eq!(store.day(Weekday::Martes), default_day(Weekday::Martes));
        assert_eq!(store.day(Weekday::Viernes).telefono, "000");
        store.reset_all_to_defaults().unwrap();
        assert_eq!(*store.state(), default_state());
    }

    #[tokio::test]
    async fn day_watch_sees_updates() {
        let store = MenuStore::load(memory_store());
        let mut live = store.watch_day(Weekday::Martes);
        store
            .update_day(
                Weekday::Martes,
                DayMenuPatch {
                    plato_del_dia: Some("Migas".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let day = live.changed().await.expect("sender alive");
        assert_eq!(day.plato_del_dia, "Migas");
        assert_eq!(live.current().plato_del_dia, "Migas");
    }

    #[tokio::test]
    async fn remote_menu_replaces_named_days() {
        let store = MenuStore::load(memory_store());
        let mut remote_day = default_day(Weekday::Lunes);
        remote_day.plato_del_dia = "Paella".into();
        let sheets = FixedSheets {
            menu: Some(RemoteMenu {
                days: vec![remote_day.clone()],
                footer_lines: Some(vec!["Remoto".into()]),
            }),
            fail: false,
        };

        assert!(store.load_from_sheets(&sheets).await);
        assert_eq!(store.day(Weekday::Lunes), remote_day);
        assert_eq!(store.day(Weekday::Martes), default_day(Weekday::Martes));
        assert_eq!(store.state().settings.footer_lines, vec!["Remoto".to_string()]);
    }

    #[tokio::test]
    async fn remote_failures_are_swallowed() {
        let store = MenuStore::load(memory_store());
        let sheets = FixedSheets { menu: None, fail: true };
        assert!(!store.load_from_sheets(&sheets).await);
        assert_eq!(*store.state(), default_state());

        let outcome = store.publish_day(&sheets, Weekday::Martes).await;
        assert!(!outcome.ok);
        assert!(outcome.error.unwrap().contains("offline"));
    }

    #[tokio::test]
    async fn publish_sends_the_requested_day() {
        let store = MenuStore::load(memory_store());
        let sheets = FixedSheets { menu: None, fail: false };
        assert!(store.publish_day(&sheets, Weekday::Martes).await.ok);
    }
}
