//! OAuth2 credential management for the Gmail API
//!
//! [`CredentialProvider::ensure_valid`] is the single entry point: it loads the
//! cached credential from a [`CredentialStore`], refreshes it when expired and
//! falls back to the interactive consent flow of an [`AuthorizationFlow`].

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use yup_oauth2::authenticator_delegate::InstalledFlowDelegate;
use yup_oauth2::storage::{TokenInfo, TokenStorage, TokenStorageError};
use yup_oauth2::{ApplicationSecret, InstalledFlowAuthenticator, InstalledFlowReturnMethod};

use crate::error::{InsightsError, Result};

/// Read-only Gmail scope, the only one this tool requests
pub const READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// Credentials this close to expiry are refreshed before use
const EXPIRY_SKEW_SECS: i64 = 60;

/// Cached OAuth2 credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// True when the access token must not be used any more at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - ChronoDuration::seconds(EXPIRY_SKEW_SECS) <= now,
            None => false,
        }
    }
}

/// Where the cached credential stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Missing,
    Valid,
    Expired,
}

impl CredentialState {
    pub fn of(credential: Option<&Credential>, now: DateTime<Utc>) -> Self {
        match credential {
            None => CredentialState::Missing,
            Some(c) if c.is_expired(now) => CredentialState::Expired,
            Some(_) => CredentialState::Valid,
        }
    }
}

/// Persistence for the cached credential
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<Credential>>;

    async fn save(&self, credential: &Credential) -> Result<()>;
}

/// Ways of obtaining a fresh credential
#[async_trait]
pub trait AuthorizationFlow: Send + Sync {
    /// Exchange a refresh token for a new access token
    async fn refresh(&self, refresh_token: &str) -> Result<Credential>;

    /// Run the interactive consent flow
    async fn authorize(&self) -> Result<Credential>;
}

/// JSON file credential cache
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the cached credential, if any
    pub async fn clear(&self) -> Result<()> {
        if tokio::fs::try_exists(&self.path).await? {
            tokio::fs::remove_file(&self.path).await?;
            info!("Removed cached credential at {:?}", self.path);
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<Credential>> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        let credential = serde_json::from_str(&content)?;
        Ok(Some(credential))
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let content = serde_json::to_string_pretty(credential)?;
        tokio::fs::write(&self.path, content).await?;
        secure_token_file(&self.path).await?;
        debug!("Cached credential at {:?}", self.path);
        Ok(())
    }
}

/// Secure token file permissions on Unix systems
///
/// Sets file permissions to 0600 (read/write for owner only)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows uses ACLs; the file keeps the permissions of its directory
#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}

/// Loads, refreshes or acquires the credential
pub struct CredentialProvider<S, F> {
    store: S,
    flow: F,
}

impl<S: CredentialStore, F: AuthorizationFlow> CredentialProvider<S, F> {
    pub fn new(store: S, flow: F) -> Self {
        Self { store, flow }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn load_cached(&self) -> Option<Credential> {
        match self.store.load().await {
            Ok(credential) => credential,
            Err(e) => {
                warn!("Ignoring unreadable credential cache: {}", e);
                None
            }
        }
    }

    pub async fn state(&self, now: DateTime<Utc>) -> CredentialState {
        CredentialState::of(self.load_cached().await.as_ref(), now)
    }

    async fn persist(&self, credential: &Credential) {
        if let Err(e) = self.store.save(credential).await {
            warn!("Failed to cache credential: {}", e);
        }
    }

    /// Return a credential that is valid right now
    ///
    /// Refresh failures fall through to the consent flow; consent failures
    /// are returned as [`InsightsError::AuthError`].
    pub async fn ensure_valid(&self) -> Result<Credential> {
        let cached = self.load_cached().await;

        match (CredentialState::of(cached.as_ref(), Utc::now()), cached) {
            (CredentialState::Valid, Some(credential)) => {
                debug!("Using cached credential");
                return Ok(credential);
            }
            (CredentialState::Expired, Some(credential)) => {
                if let Some(refresh_token) = credential.refresh_token {
                    info!("Cached credential expired, refreshing");
                    match self.flow.refresh(&refresh_token).await {
                        Ok(mut refreshed) => {
                            if refreshed.refresh_token.is_none() {
                                refreshed.refresh_token = Some(refresh_token);
                            }
                            self.persist(&refreshed).await;
                            return Ok(refreshed);
                        }
                        Err(e) => warn!("Credential refresh failed: {}", e),
                    }
                } else {
                    info!("Cached credential expired and has no refresh token");
                }
            }
            _ => info!("No cached credential found"),
        }

        let credential = self.flow.authorize().await.map_err(|e| match e {
            InsightsError::AuthError(_) => e,
            other => InsightsError::AuthError(other.to_string()),
        })?;
        self.persist(&credential).await;
        Ok(credential)
    }
}

/// Token storage handed to the yup-oauth2 authenticator
///
/// Persistence stays with [`CredentialStore`]: this only seeds the authenticator
/// with a refresh token and captures whatever token it issues.
#[derive(Clone, Default)]
struct HandoffStorage {
    seed: Option<TokenInfo>,
    issued: Arc<Mutex<Option<TokenInfo>>>,
}

impl HandoffStorage {
    fn seeded_with_refresh_token(refresh_token: &str) -> Self {
        Self {
            seed: Some(TokenInfo {
                access_token: None,
                refresh_token: Some(refresh_token.to_string()),
                expires_at: None,
                id_token: None,
            }),
            ..Self::default()
        }
    }

    async fn take_issued(&self) -> Result<Credential> {
        let token = self.issued.lock().await.take().ok_or_else(|| {
            InsightsError::AuthError("Authorization server issued no token".to_string())
        })?;
        credential_from_token(token)
    }
}

#[async_trait]
impl TokenStorage for HandoffStorage {
    async fn set(
        &self,
        _scopes: &[&str],
        token: TokenInfo,
    ) -> std::result::Result<(), TokenStorageError> {
        *self.issued.lock().await = Some(token);
        Ok(())
    }

    async fn get(&self, _scopes: &[&str]) -> Option<TokenInfo> {
        self.seed.clone()
    }
}

fn credential_from_token(token: TokenInfo) -> Result<Credential> {
    let access_token = token.access_token.ok_or_else(|| {
        InsightsError::AuthError("Token response carried no access token".to_string())
    })?;
    let expires_at = token
        .expires_at
        .and_then(|t| DateTime::<Utc>::from_timestamp(t.unix_timestamp(), t.nanosecond()));

    Ok(Credential {
        access_token,
        refresh_token: token.refresh_token,
        expires_at,
    })
}

/// Shows the consent URL and optionally opens it in the default browser
struct BrowserDelegate {
    open_browser: bool,
}

impl InstalledFlowDelegate for BrowserDelegate {
    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        _need_code: bool,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<String, String>> + Send + 'a>> {
        Box::pin(async move {
            println!("Please visit this URL to authorize this application:\n{}\n", url);
            if self.open_browser {
                if let Err(e) = open::that(url) {
                    warn!("Could not open browser automatically: {}", e);
                }
            }
            // The redirect listener receives the code
            Ok(String::new())
        })
    }
}

/// Refuses interactive consent so a rejected refresh token surfaces as an error
struct NoConsentDelegate;

impl InstalledFlowDelegate for NoConsentDelegate {
    fn present_user_url<'a>(
        &'a self,
        _url: &'a str,
        _need_code: bool,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<String, String>> + Send + 'a>> {
        Box::pin(async { Err("refresh token was rejected".to_string()) })
    }
}

/// Google installed-app flow with the redirect listener on a fixed local port
pub struct InstalledAppFlow {
    secret: ApplicationSecret,
    port: u16,
    callback_timeout: Duration,
    open_browser: bool,
}

impl InstalledAppFlow {
    pub fn new(secret: ApplicationSecret, port: u16, callback_timeout: Duration) -> Self {
        Self {
            secret,
            port,
            callback_timeout,
            open_browser: true,
        }
    }

    /// Load the client registration (Google "installed" JSON format)
    pub async fn from_secret_file(
        path: &Path,
        port: u16,
        callback_timeout: Duration,
    ) -> Result<Self> {
        let secret = yup_oauth2::read_application_secret(path).await.map_err(|e| {
            InsightsError::AuthError(format!("Failed to read client secret {:?}: {}", path, e))
        })?;
        Ok(Self::new(secret, port, callback_timeout))
    }

    /// Only print the authorization URL instead of launching a browser
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}", self.port)
    }
}

#[async_trait]
impl AuthorizationFlow for InstalledAppFlow {
    async fn refresh(&self, refresh_token: &str) -> Result<Credential> {
        let storage = HandoffStorage::seeded_with_refresh_token(refresh_token);
        let auth = InstalledFlowAuthenticator::builder(
            self.secret.clone(),
            InstalledFlowReturnMethod::Interactive,
        )
        .flow_delegate(Box::new(NoConsentDelegate))
        .with_storage(Box::new(storage.clone()))
        .build()
        .await
        .map_err(|e| InsightsError::AuthError(format!("Failed to build authenticator: {}", e)))?;

        auth.force_refreshed_token(&[READONLY_SCOPE])
            .await
            .map_err(|e| InsightsError::AuthError(format!("Token refresh failed: {}", e)))?;
        storage.take_issued().await
    }

    async fn authorize(&self) -> Result<Credential> {
        let storage = HandoffStorage::default();
        let auth = InstalledFlowAuthenticator::builder(
            self.secret.clone(),
            InstalledFlowReturnMethod::HTTPPortRedirect(self.port),
        )
        .force_account_selection(true)
        .flow_delegate(Box::new(BrowserDelegate {
            open_browser: self.open_browser,
        }))
        .with_storage(Box::new(storage.clone()))
        .build()
        .await
        .map_err(|e| InsightsError::AuthError(format!("Failed to build authenticator: {}", e)))?;

        debug!("Waiting for the OAuth callback on {}", self.redirect_uri());
        tokio::time::timeout(self.callback_timeout, auth.token(&[READONLY_SCOPE]))
            .await
            .map_err(|_| {
                InsightsError::AuthError(format!(
                    "Timed out after {}s waiting for the OAuth callback",
                    self.callback_timeout.as_secs()
                ))
            })?
            .map_err(|e| InsightsError::AuthError(format!("Authorization failed: {}", e)))?;
        info!("Received OAuth tokens");

        storage.take_issued().await
    }
}

/// [`InstalledAppFlow`] whose client registration is read on first use
///
/// A valid cached credential never needs the client secret file.
pub struct ClientSecretFlow {
    path: PathBuf,
    port: u16,
    callback_timeout: Duration,
}

impl ClientSecretFlow {
    pub fn new(path: impl Into<PathBuf>, port: u16, callback_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            port,
            callback_timeout,
        }
    }

    async fn load(&self) -> Result<InstalledAppFlow> {
        InstalledAppFlow::from_secret_file(&self.path, self.port, self.callback_timeout).await
    }
}

#[async_trait]
impl AuthorizationFlow for ClientSecretFlow {
    async fn refresh(&self, refresh_token: &str) -> Result<Credential> {
        self.load().await?.refresh(refresh_token).await
    }

    async fn authorize(&self) -> Result<Credential> {
        self.load().await?.authorize().await
    }
}
