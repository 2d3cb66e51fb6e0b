//! Gmail Insights
//!
//! An interactive terminal tool that reads your most recent Gmail messages
//! (read-only) and either renders their previews as a word cloud or sends a
//! chosen message to a chat model for a summary and a sentiment label.
//!
//! # Overview
//!
//! - **Credentials**: OAuth2 installed-app flow with a cached, refreshable token
//! - **Mail**: Snippets of the N most recent messages in a label
//! - **Normalization**: Lowercasing, non-letter stripping and stop-word removal
//! - **Word Cloud**: Frequency ranking and spiral layout into a PNG
//! - **Analysis**: Summary and sentiment prompts against a chat-completion API
//! - **Shell**: Menu-driven session tying the above together
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_insights::config::Config;
//! use gmail_insights::credentials::{ClientSecretFlow, CredentialProvider, FileCredentialStore};
//! use gmail_insights::mail::{build_hub, list_recent, GmailMailClient};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let provider = CredentialProvider::new(
//!         FileCredentialStore::new(".gmail-insights/token.json"),
//!         ClientSecretFlow::new("client_secret.json", 8501, Duration::from_secs(300)),
//!     );
//!     let credential = provider.ensure_valid().await?;
//!
//!     let client = GmailMailClient::new(build_hub(&credential.access_token)?);
//!     let snippets = list_recent(&client, &config.mail.label, 10).await?;
//!     println!("{} snippets", snippets.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`cli`] - Command-line interface and command handlers
//! - [`config`] - Configuration management
//! - [`credentials`] - OAuth2 credential lifecycle and token cache
//! - [`error`] - Error types and result aliases
//! - [`llm`] - Summary and sentiment prompts
//! - [`mail`] - Gmail API access
//! - [`normalize`] - Text normalization for the word cloud
//! - [`session`] - Session state and mode actions
//! - [`shell`] - Interactive menu
//! - [`wordcloud`] - Word cloud layout and rendering

pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod llm;
pub mod mail;
pub mod normalize;
pub mod session;
pub mod shell;
pub mod wordcloud;

pub use error::{InsightsError, Result};
pub use session::{Mode, Session};
