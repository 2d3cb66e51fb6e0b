//! Interactive terminal shell
//!
//! One blocking prompt at a time: every menu choice runs to completion
//! before the menu is shown again.

use crossterm::style::Stylize;
use inquire::Select;
use std::fmt;
use std::ops::ControlFlow;
use tracing::{debug, warn};

use crate::cli::{truncate_string, ProgressReporter};
use crate::config::Config;
use crate::credentials::{
    AuthorizationFlow, Credential, CredentialProvider, CredentialStore,
};
use crate::error::{InsightsError, Result};
use crate::llm::EmailAnalyst;
use crate::mail::{build_hub, GmailMailClient};
use crate::session::{Mode, Session, WordCloudOutcome};
use crate::wordcloud::WordCloudRenderer;

pub const TITLE: &str = "Gmail Analysis Tool";

/// Entries of the main menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Authenticate,
    Run(Mode),
    Quit,
}

impl fmt::Display for MenuChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MenuChoice::Authenticate => write!(f, "Authenticate with Gmail"),
            MenuChoice::Run(mode) => write!(f, "{}", mode),
            MenuChoice::Quit => write!(f, "Quit"),
        }
    }
}

/// Menu entries for the current session state
pub fn menu_choices(authenticated: bool) -> Vec<MenuChoice> {
    let mut choices = Vec::with_capacity(4);
    if !authenticated {
        choices.push(MenuChoice::Authenticate);
    }
    choices.extend(Mode::ALL.into_iter().map(MenuChoice::Run));
    choices.push(MenuChoice::Quit);
    choices
}

/// Whether the menu loop goes on after an action finished with `result`
///
/// Fatal errors stop the loop; anything else is reported and the menu is shown again.
fn after_action(result: Result<()>) -> ControlFlow<InsightsError> {
    match result {
        Ok(()) => ControlFlow::Continue(()),
        Err(e) if e.is_fatal() => ControlFlow::Break(e),
        Err(InsightsError::OperationCancelled(_)) => {
            debug!("Prompt cancelled");
            ControlFlow::Continue(())
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            ControlFlow::Continue(())
        }
    }
}

/// A selectable email in the analysis picker
#[derive(Debug, Clone)]
struct SnippetChoice {
    index: usize,
    preview: String,
}

impl fmt::Display for SnippetChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>2}. {}", self.index + 1, self.preview)
    }
}

fn snippet_choices(snippets: &[String]) -> Vec<SnippetChoice> {
    snippets
        .iter()
        .enumerate()
        .map(|(index, snippet)| SnippetChoice {
            index,
            preview: if snippet.trim().is_empty() {
                "(no preview)".to_string()
            } else {
                truncate_string(snippet.trim(), 80)
            },
        })
        .collect()
}

/// Terminal view over one [`Session`]
pub struct Shell<S, F> {
    config: Config,
    provider: CredentialProvider<S, F>,
    analyst: Box<dyn EmailAnalyst>,
    renderer: WordCloudRenderer,
    session: Session,
    progress: ProgressReporter,
}

impl<S: CredentialStore, F: AuthorizationFlow> Shell<S, F> {
    pub fn new(
        config: Config,
        provider: CredentialProvider<S, F>,
        analyst: Box<dyn EmailAnalyst>,
        progress: ProgressReporter,
    ) -> Result<Self> {
        let renderer = WordCloudRenderer::from_config(&config.word_cloud)?;
        Ok(Self {
            config,
            provider,
            analyst,
            renderer,
            session: Session::new(),
            progress,
        })
    }

    /// Menu loop; returns on Quit or on a fatal error
    pub async fn run(mut self) -> Result<()> {
        println!("\n{}\n", TITLE.bold().underlined());

        loop {
            let choices = menu_choices(self.session.is_authenticated());
            let choice = match Select::new("Choose an option", choices).prompt() {
                Ok(choice) => choice,
                Err(e) => match InsightsError::from(e) {
                    InsightsError::OperationCancelled(_) => break,
                    other => return Err(other),
                },
            };

            let result = match choice {
                MenuChoice::Authenticate => self.authenticate().await,
                MenuChoice::Run(mode) => self.run_mode(mode).await,
                MenuChoice::Quit => break,
            };

            if let ControlFlow::Break(e) = after_action(result) {
                return Err(e);
            }
        }

        debug!("Shell closed");
        Ok(())
    }

    fn connect(&mut self, credential: &Credential) -> Result<()> {
        let hub = build_hub(&credential.access_token)?;
        self.session.connect(
            &credential.access_token,
            Box::new(GmailMailClient::new(hub)),
        );
        Ok(())
    }

    async fn authenticate(&mut self) -> Result<()> {
        let credential = self.provider.ensure_valid().await?;
        self.connect(&credential)?;
        println!("{}", "Successfully authenticated with Gmail!".green());
        Ok(())
    }

    /// Re-check the credential before talking to Gmail again
    async fn refresh_connection(&mut self) -> Result<()> {
        let credential = self.provider.ensure_valid().await?;
        if self.session.needs_reconnect(&credential.access_token) {
            debug!("Access token changed, reconnecting");
            self.connect(&credential)?;
        }
        Ok(())
    }

    async fn run_mode(&mut self, mode: Mode) -> Result<()> {
        if !self.session.is_authenticated() {
            println!("{}", "Authenticate with Gmail first.".yellow());
            return Ok(());
        }
        self.refresh_connection().await?;

        match mode {
            Mode::WordCloud => self.word_cloud().await,
            Mode::SummaryAndSentiment => self.summary_and_sentiment().await,
        }
    }

    async fn word_cloud(&self) -> Result<()> {
        let spinner = self.progress.add_spinner("Generating word cloud...");
        let outcome = self
            .session
            .word_cloud(
                &self.renderer,
                &self.config.mail.label,
                self.config.mail.word_cloud_messages,
                &self.config.word_cloud.output,
            )
            .await;

        match outcome {
            Ok(WordCloudOutcome::Rendered(path)) => {
                self.progress
                    .finish_spinner(&spinner, &format!("Word cloud saved to {}", path.display()));
                if self.config.word_cloud.open_viewer {
                    if let Err(e) = open::that(&path) {
                        warn!("Could not open image viewer: {}", e);
                    }
                }
            }
            Ok(WordCloudOutcome::NoEmails { warning }) => {
                spinner.finish_and_clear();
                if let Some(warning) = warning {
                    eprintln!("{}", warning.red());
                }
                println!("No emails found.");
            }
            Err(e) => {
                spinner.finish_and_clear();
                return Err(e);
            }
        }
        Ok(())
    }

    async fn summary_and_sentiment(&self) -> Result<()> {
        let spinner = self.progress.add_spinner("Retrieving latest emails...");
        let fetched = self
            .session
            .analysis_candidates(&self.config.mail.label, self.config.mail.analysis_messages)
            .await;
        spinner.finish_and_clear();
        let fetched = fetched?;

        if let Some(warning) = &fetched.warning {
            eprintln!("{}", warning.clone().red());
        }
        if fetched.snippets.is_empty() {
            println!("No emails found.");
            return Ok(());
        }

        let picked = Select::new(
            "Select an email to analyze",
            snippet_choices(&fetched.snippets),
        )
        .with_page_size(10)
        .prompt()?;

        let snippet = &fetched.snippets[picked.index];
        if snippet.trim().is_empty() {
            println!("The selected email has no preview text to analyze.");
            return Ok(());
        }

        let spinner = self.progress.add_spinner("Analyzing selected email...");
        let analysis = self.session.analyze(self.analyst.as_ref(), snippet).await;
        spinner.finish_and_clear();
        let analysis = analysis?;

        println!("\n{} {}", "Summary:".bold(), analysis.summary);
        println!("{} {}\n", "Sentiment:".bold(), analysis.sentiment);
        Ok(())
    }
}
