//! Per-run session state and the actions the shell dispatches

use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{InsightsError, Result};
use crate::llm::EmailAnalyst;
use crate::mail::{fetch_or_report, Fetched, MailClient};
use crate::wordcloud::WordCloudRenderer;

/// The two analysis modes offered in the menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    WordCloud,
    SummaryAndSentiment,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::WordCloud, Mode::SummaryAndSentiment];
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::WordCloud => write!(f, "Generate Word Cloud"),
            Mode::SummaryAndSentiment => write!(f, "Email Summary & Sentiment Analysis"),
        }
    }
}

/// An authenticated mail connection
struct Connection {
    access_token: String,
    mail: Box<dyn MailClient>,
}

/// Session state, created when the shell starts and dropped when it exits
///
/// The session moves from unauthenticated to authenticated exactly once;
/// later calls to [`Session::connect`] only swap the connection (e.g. after a
/// token refresh).
#[derive(Default)]
pub struct Session {
    connection: Option<Connection>,
}

/// Outcome of the word cloud action
#[derive(Debug, PartialEq)]
pub enum WordCloudOutcome {
    Rendered(PathBuf),
    NoEmails { warning: Option<String> },
}

/// Summary and sentiment of one email
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub summary: String,
    pub sentiment: String,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.connection.is_some()
    }

    /// Attach (or replace) the mail connection for `access_token`
    pub fn connect(&mut self, access_token: &str, mail: Box<dyn MailClient>) {
        if !self.is_authenticated() {
            info!("Session authenticated");
        }
        self.connection = Some(Connection {
            access_token: access_token.to_string(),
            mail,
        });
    }

    /// True when the connection was built for a different token
    pub fn needs_reconnect(&self, access_token: &str) -> bool {
        match &self.connection {
            Some(connection) => connection.access_token != access_token,
            None => true,
        }
    }

    pub fn mail(&self) -> Result<&dyn MailClient> {
        self.connection
            .as_ref()
            .map(|c| c.mail.as_ref())
            .ok_or_else(|| {
                InsightsError::AuthError("Not authenticated with Gmail yet".to_string())
            })
    }

    /// Fetch recent snippets and render them as a word cloud PNG at `output`
    pub async fn word_cloud(
        &self,
        renderer: &WordCloudRenderer,
        label: &str,
        count: u32,
        output: &Path,
    ) -> Result<WordCloudOutcome> {
        let fetched = fetch_or_report(self.mail()?, label, count).await?;
        if fetched.snippets.is_empty() {
            return Ok(WordCloudOutcome::NoEmails {
                warning: fetched.warning,
            });
        }

        let image = renderer.render(&fetched.snippets);
        renderer.save(&image, output)?;
        info!(
            "Rendered word cloud from {} emails to {:?}",
            fetched.snippets.len(),
            output
        );
        Ok(WordCloudOutcome::Rendered(output.to_path_buf()))
    }

    /// Snippets offered for the summary & sentiment mode
    pub async fn analysis_candidates(&self, label: &str, count: u32) -> Result<Fetched> {
        fetch_or_report(self.mail()?, label, count).await
    }

    /// Summarize and label one snippet
    pub async fn analyze(&self, analyst: &dyn EmailAnalyst, snippet: &str) -> Result<Analysis> {
        let summary = analyst.summarize(snippet).await?;
        let sentiment = analyst.analyze_sentiment(snippet).await?;
        Ok(Analysis { summary, sentiment })
    }
}
