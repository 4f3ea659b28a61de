use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

use crate::oauth::{self, TokenInfo};

pub const COOKIE_NAME: &str = "spotify-login";

/// Sessions untouched for this long are dropped on the next write.
pub const SESSION_IDLE_SECS: i64 = 30 * 24 * 60 * 60;

type HmacSha256 = Hmac<Sha256>;

/// Server-side session records keyed by a random id. The browser only holds
/// the id plus an HMAC binding it to the configured secret.
pub struct Sessions {
    secret: String,
    records: Mutex<HashMap<String, SessionRecord>>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionRecord {
    pub token: Option<TokenInfo>,
    /// Unix seconds of the last read or write.
    pub last_seen: i64,
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| {
        tracing::warn!("session map poisoned, recovering");
        e.into_inner()
    })
}

impl Sessions {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn new_id() -> String {
        let mut rng = rand::rng();
        let bytes: [u8; 16] = rng.random();
        hex(&bytes)
    }

    fn mac(&self, id: &str) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes()).ok()?;
        mac.update(id.as_bytes());
        Some(mac)
    }

    /// Cookie value for a session id.
    pub fn sign(&self, id: &str) -> Option<String> {
        let tag = self.mac(id)?.finalize().into_bytes();
        Some(format!("{id}.{}", hex(&tag)))
    }

    /// Session id from a cookie value, if its tag verifies.
    pub fn verify(&self, cookie_value: &str) -> Option<String> {
        let (id, tag) = cookie_value.split_once('.')?;
        if id.is_empty() {
            return None;
        }
        let tag = unhex(tag)?;
        self.mac(id)?.verify_slice(&tag).ok()?;
        Some(id.to_string())
    }

    pub fn token(&self, id: &str) -> Option<TokenInfo> {
        let mut records = lock_or_recover(&self.records);
        let record = records.get_mut(id)?;
        record.last_seen = oauth::now_unix();
        record.token.clone()
    }

    /// Replace the stored credential; `None` discards it.
    pub fn store_token(&self, id: &str, token: Option<TokenInfo>) {
        let now = oauth::now_unix();
        let mut records = lock_or_recover(&self.records);
        match token {
            Some(token) => {
                let record = records.entry(id.to_string()).or_default();
                record.token = Some(token);
                record.last_seen = now;
            }
            None => {
                records.remove(id);
            }
        }
        prune_idle(&mut records, now);
    }

    /// Store `token` only if the session still holds `expected`. Returns
    /// whether the write happened.
    pub fn replace_token(&self, id: &str, expected: &TokenInfo, token: Option<TokenInfo>) -> bool {
        let mut records = lock_or_recover(&self.records);
        let Some(record) = records.get_mut(id) else {
            return false;
        };
        if record.token.as_ref() != Some(expected) {
            return false;
        }
        match token {
            Some(token) => {
                record.token = Some(token);
                record.last_seen = oauth::now_unix();
            }
            None => {
                records.remove(id);
            }
        }
        true
    }

    pub fn clear_token(&self, id: &str) {
        self.store_token(id, None);
    }

}

fn prune_idle(records: &mut HashMap<String, SessionRecord>, now: i64) {
    let before = records.len();
    records.retain(|_, record| now - record.last_seen <= SESSION_IDLE_SECS);
    let dropped = before - records.len();
    if dropped > 0 {
        tracing::debug!("dropped {dropped} idle sessions");
    }
}

pub fn set_cookie_value(signed: &str) -> String {
    format!("{COOKIE_NAME}={signed}; Path=/; HttpOnly; SameSite=Lax")
}

/// Value of a named cookie from the request's `Cookie` headers.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn unhex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 || !s.is_ascii() {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}
