//! Persisted session credentials shared by every tab.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::accounts::TokenGrant;
use crate::protocol_constants::{ACCESS_TOKEN_KEY, EXPIRES_AT_KEY, REFRESH_TOKEN_KEY};
use crate::storage::{SharedStorage, StorageResult};

/// OAuth credentials for the provider session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredentials {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix milliseconds after which `access_token` must not be used.
    pub expires_at_ms: u64,
}

impl SessionCredentials {
    /// Builds credentials from a token grant.
    ///
    /// Refresh grants usually omit the refresh token; the previous one is kept in
    /// that case. Returns `None` when neither is available.
    #[must_use]
    pub fn from_grant(grant: &TokenGrant, previous_refresh: Option<&str>, now_ms: u64) -> Option<Self> {
        let refresh_token = grant
            .refresh_token
            .clone()
            .or_else(|| previous_refresh.map(str::to_string))?;
        Some(Self {
            access_token: grant.access_token.clone(),
            refresh_token,
            expires_at_ms: now_ms.saturating_add(grant.expires_in.saturating_mul(1000)),
        })
    }

    /// Parses the URL fragment the auth callback redirects to
    /// (`#access_token=…&refresh_token=…&expires_in=…`).
    ///
    /// A fragment without `expires_in` yields already-expired credentials so the
    /// scheduler refreshes them immediately.
    #[must_use]
    pub fn from_fragment(fragment: &str, now_ms: u64) -> Option<Self> {
        let fragment = fragment.trim_start_matches('#');
        let mut access_token = None;
        let mut refresh_token = None;
        let mut expires_in = None;

        for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
            match key.as_ref() {
                "access_token" if !value.is_empty() => access_token = Some(value.into_owned()),
                "refresh_token" if !value.is_empty() => refresh_token = Some(value.into_owned()),
                "expires_in" => expires_in = value.parse::<u64>().ok(),
                _ => {}
            }
        }

        Some(Self {
            access_token: access_token?,
            refresh_token: refresh_token?,
            expires_at_ms: expires_in
                .map(|secs| now_ms.saturating_add(secs.saturating_mul(1000)))
                .unwrap_or(0),
        })
    }

    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

/// Reads and writes [`SessionCredentials`] in shared storage.
///
/// Every change is announced through a generation counter so the refresh
/// scheduler and the device session can react. Changes made here announce
/// themselves; changes written by other tabs are picked up by [`sync`], which
/// the periodic loops call.
///
/// [`sync`]: TokenStore::sync
pub struct TokenStore {
    storage: Arc<dyn SharedStorage>,
    /// Credentials as last announced.
    last_seen: Mutex<Option<SessionCredentials>>,
    changes: watch::Sender<u64>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn SharedStorage>) -> Self {
        let (changes, _) = watch::channel(0);
        let last_seen = match read_credentials(storage.as_ref()) {
            Ok(creds) => creds,
            Err(e) => {
                log::warn!("[TokenStore] Failed to read credentials: {}", e);
                None
            }
        };
        Self {
            storage,
            last_seen: Mutex::new(last_seen),
            changes,
        }
    }

    /// Returns the stored credentials, if complete.
    ///
    /// An access token stored without a refresh token is a legacy session that
    /// can never be renewed; it is removed so the user is asked to authorize
    /// again. A missing or unparsable expiry reads as already expired.
    pub fn get(&self) -> StorageResult<Option<SessionCredentials>> {
        read_credentials(self.storage.as_ref())
    }

    /// Returns the stored credentials only if they have not expired at `now_ms`.
    pub fn valid(&self, now_ms: u64) -> StorageResult<Option<SessionCredentials>> {
        Ok(self.get()?.filter(|creds| !creds.is_expired(now_ms)))
    }

    /// Returns the access token if it is still valid at `now_ms`, logging (not
    /// propagating) storage failures.
    ///
    /// Used as the device's token callback, which has no error channel.
    #[must_use]
    pub fn access_token(&self, now_ms: u64) -> Option<String> {
        match self.valid(now_ms) {
            Ok(creds) => creds.map(|c| c.access_token),
            Err(e) => {
                log::warn!("[TokenStore] Failed to read credentials: {}", e);
                None
            }
        }
    }

    pub fn set(&self, creds: &SessionCredentials) -> StorageResult<()> {
        self.storage.set(ACCESS_TOKEN_KEY, &creds.access_token)?;
        self.storage.set(REFRESH_TOKEN_KEY, &creds.refresh_token)?;
        self.storage
            .set(EXPIRES_AT_KEY, &creds.expires_at_ms.to_string())?;
        self.announce(Some(creds.clone()));
        Ok(())
    }

    pub fn clear(&self) -> StorageResult<()> {
        self.storage.remove(ACCESS_TOKEN_KEY)?;
        self.storage.remove(REFRESH_TOKEN_KEY)?;
        self.storage.remove(EXPIRES_AT_KEY)?;
        self.announce(None);
        Ok(())
    }

    /// Re-reads shared storage and announces credentials written or cleared by
    /// another tab. Returns true if they differed from the last announcement.
    pub fn sync(&self) -> StorageResult<bool> {
        let current = self.get()?;
        if *self.last_seen.lock() == current {
            return Ok(false);
        }
        log::debug!(
            "[TokenStore] Credentials {} by another tab",
            if current.is_some() { "updated" } else { "cleared" }
        );
        self.announce(current);
        Ok(true)
    }

    fn announce(&self, creds: Option<SessionCredentials>) {
        *self.last_seen.lock() = creds;
        self.changes.send_modify(|generation| *generation += 1);
    }

    /// Subscribes to credential changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

fn read_credentials(storage: &dyn SharedStorage) -> StorageResult<Option<SessionCredentials>> {
    let access_token = storage.get(ACCESS_TOKEN_KEY)?;
    let refresh_token = storage.get(REFRESH_TOKEN_KEY)?;

    match (access_token, refresh_token) {
        (Some(access_token), Some(refresh_token)) => {
            let expires_at_ms = storage
                .get(EXPIRES_AT_KEY)?
                .as_deref()
                .and_then(parse_instant)
                .unwrap_or(0);
            Ok(Some(SessionCredentials {
                access_token,
                refresh_token,
                expires_at_ms,
            }))
        }
        (Some(_), None) => {
            log::info!("[TokenStore] Legacy session without refresh token, clearing");
            storage.remove(ACCESS_TOKEN_KEY)?;
            Ok(None)
        }
        _ => Ok(None),
    }
}

/// Parses a stored instant. The web frontend writes `Date.now()` arithmetic,
/// which is integral in practice but may carry a fractional part.
fn parse_instant(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    raw.parse::<u64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v as u64))
}
