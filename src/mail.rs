//! Gmail API access: recent message ids and their snippets

use async_trait::async_trait;
use google_gmail1::{hyper_rustls, hyper_util, Gmail};
use tracing::{debug, warn};

use crate::credentials::READONLY_SCOPE;
use crate::error::{InsightsError, Result};

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub =
    Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Trait defining the mail operations the shell needs, for easier testing
#[async_trait]
pub trait MailClient: Send + Sync {
    /// List up to `max_results` message ids carrying `label`, newest first
    async fn list_message_ids(&self, label: &str, max_results: u32) -> Result<Vec<String>>;

    /// Fetch the provider-generated preview of one message
    async fn get_snippet(&self, id: &str) -> Result<String>;
}

/// Build a Gmail hub authorized with a bearer access token
pub fn build_hub(access_token: &str) -> Result<GmailHub> {
    // HTTP/1 for compatibility with google-gmail1
    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| InsightsError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, access_token.to_string()))
}

/// Gmail REST implementation of [`MailClient`]
pub struct GmailMailClient {
    hub: GmailHub,
}

impl GmailMailClient {
    pub fn new(hub: GmailHub) -> Self {
        Self { hub }
    }

    pub fn hub(&self) -> &GmailHub {
        &self.hub
    }

    /// Email address of the authenticated account
    pub async fn profile_address(&self) -> Result<String> {
        let (_, profile) = self
            .hub
            .users()
            .get_profile("me")
            .add_scope(READONLY_SCOPE)
            .doit()
            .await?;
        Ok(profile.email_address.unwrap_or_default())
    }
}

#[async_trait]
impl MailClient for GmailMailClient {
    async fn list_message_ids(&self, label: &str, max_results: u32) -> Result<Vec<String>> {
        let (_, response) = self
            .hub
            .users()
            .messages_list("me")
            .add_label_ids(label)
            .max_results(max_results)
            .add_scope(READONLY_SCOPE)
            .doit()
            .await?;

        Ok(response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|msg_ref| msg_ref.id)
            .collect())
    }

    async fn get_snippet(&self, id: &str) -> Result<String> {
        let (_, message) = self
            .hub
            .users()
            .messages_get("me", id)
            .format("minimal")
            .add_scope(READONLY_SCOPE)
            .doit()
            .await?;

        Ok(message.snippet.unwrap_or_default())
    }
}

/// Snippets of the `n` most recent messages carrying `label`
///
/// Messages are fetched one by one in listing order. Any failure fails the
/// whole call: snippets fetched before the error are discarded rather than
/// returned as a partial list.
pub async fn list_recent(client: &dyn MailClient, label: &str, n: u32) -> Result<Vec<String>> {
    let mut ids = client.list_message_ids(label, n).await?;
    ids.truncate(n as usize);
    debug!("Listed {} message ids in {}", ids.len(), label);

    let mut snippets = Vec::with_capacity(ids.len());
    for id in &ids {
        snippets.push(client.get_snippet(id).await?);
    }
    Ok(snippets)
}

/// Result of a fetch whose failure is reported, not raised
#[derive(Debug, Default)]
pub struct Fetched {
    pub snippets: Vec<String>,
    /// User-facing message when the fetch failed
    pub warning: Option<String>,
}

/// [`list_recent`] with recoverable errors turned into an empty result
pub async fn fetch_or_report(client: &dyn MailClient, label: &str, n: u32) -> Result<Fetched> {
    match list_recent(client, label, n).await {
        Ok(snippets) => Ok(Fetched {
            snippets,
            warning: None,
        }),
        Err(e) if e.is_recoverable() => {
            warn!("{}", e);
            Ok(Fetched {
                snippets: Vec::new(),
                warning: Some(e.to_string()),
            })
        }
        Err(e) => Err(e),
    }
}
