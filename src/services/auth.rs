use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::db::KeyValueStore;
use crate::error::{AppError, Result};
use crate::models::AuthUser;
use crate::utils::normalize_email;

pub const AUTH_KEY: &str = "menu-diario-auth-v1";

#[derive(Deserialize)]
struct TokenClaims {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

/// Decodes the payload segment of an identity token.
///
/// The signature segment is not checked, so the result only identifies the
/// account the holder claims to be.
fn decode_claims(credential: &str) -> Result<TokenClaims> {
    let payload = credential
        .split('.')
        .nth(1)
        .ok_or_else(|| AppError::Credential("token has no payload segment".into()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AppError::Credential(e.to_string()))?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn allow_list(emails: &[String]) -> HashSet<String> {
    emails
        .iter()
        .map(|e| normalize_email(e))
        .filter(|e| !e.is_empty())
        .collect()
}

pub struct AuthService {
    store: Arc<dyn KeyValueStore>,
    allowed: Mutex<HashSet<String>>,
    user: Mutex<Option<AuthUser>>,
}

impl AuthService {
    pub fn new(store: Arc<dyn KeyValueStore>, allowed_emails: &[String]) -> Self {
        let allowed = allow_list(allowed_emails);
        let user = match store.get(AUTH_KEY) {
            Ok(Some(raw)) => serde_json::from_str::<AuthUser>(&raw).ok(),
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "Could not read stored user");
                None
            }
        };
        AuthService {
            store,
            allowed: Mutex::new(allowed),
            user: Mutex::new(user),
        }
    }

    pub fn is_allowed(&self, email: &str) -> bool {
        self.allowed
            .lock()
            .map(|allowed| allowed.contains(&normalize_email(email)))
            .unwrap_or(false)
    }

    /// Replaces the allow-list. A signed-in user stays signed in until the next `sign_in`.
    pub fn set_allowed_emails(&self, allowed_emails: &[String]) -> Result<()> {
        *self.allowed.lock().map_err(|_| AppError::Lock("allow-list"))? = allow_list(allowed_emails);
        Ok(())
    }

    pub fn sign_in(&self, credential: &str) -> Result<AuthUser> {
        let claims = decode_claims(credential)?;
        let email = normalize_email(claims.email.as_deref().unwrap_or_default());
        if email.is_empty() {
            return Err(AppError::Credential("token carries no email".into()));
        }
        if !self.is_allowed(&email) {
            self.sign_out()?;
            return Err(AppError::AuthDenied(email));
        }

        let user = AuthUser {
            name: claims.name.unwrap_or_else(|| email.clone()),
            email,
            picture: claims.picture,
        };
        self.store.set(AUTH_KEY, &serde_json::to_string(&user)?)?;
        *self.user.lock().map_err(|_| AppError::Lock("auth user"))? = Some(user.clone());
        info!(email = %user.email, "Signed in");
        Ok(user)
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        self.user.lock().ok().and_then(|u| u.clone())
    }

    pub fn sign_out(&self) -> Result<()> {
        self.store.remove(AUTH_KEY)?;
        *self.user.lock().map_err(|_| AppError::Lock("auth user"))? = None;
        Ok(())
    }
}
