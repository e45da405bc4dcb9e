use crate::models::AuthUser;
use crate::services::state::AppState;

pub fn login(state: &AppState, credential: &str) -> Result<AuthUser, String> {
    state
        .auth
        .sign_in(credential.trim())
        .map_err(|e| e.to_string())
}

pub fn logout(state: &AppState) -> Result<(), String> {
    state.auth.sign_out().map_err(|e| e.to_string())
}

pub fn whoami(state: &AppState) -> Option<AuthUser> {
    state.auth.current_user()
}
