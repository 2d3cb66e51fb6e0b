//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::config::{Config, MAX_MESSAGES};
use crate::credentials::{ClientSecretFlow, CredentialProvider, FileCredentialStore};
use crate::error::{InsightsError, Result};
use crate::llm::{api_key_from_env, OpenAiAnalyst};
use crate::mail::{build_hub, GmailMailClient};
use crate::session::{Session, WordCloudOutcome};
use crate::shell::Shell;
use crate::wordcloud::WordCloudRenderer;

#[derive(Parser, Debug)]
#[command(name = "gmail-insights")]
#[command(version = "0.1.0")]
#[command(about = "Word clouds, summaries and sentiment for your recent Gmail", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to the OAuth2 client secret file
    #[arg(long, default_value = "client_secret.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".gmail-insights/token.json")]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Start the interactive menu (default)
    Shell,

    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Render a word cloud of recent emails without the menu
    WordCloud {
        /// Where to write the PNG (defaults to word_cloud.output)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of recent emails to include (defaults to mail.word_cloud_messages)
        #[arg(short = 'n', long)]
        count: Option<u32>,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Shell)
    }
}

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    /// Reporter drawing through `multi`, shared with the log writer
    pub fn new(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        Self {
            multi,
            spinner_style,
        }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        println!("  ✓ {}", msg);
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(MultiProgress::new())
    }
}

/// Credential provider over the token cache and the client secret file
pub fn credential_provider(
    cli: &Cli,
    config: &Config,
) -> CredentialProvider<FileCredentialStore, ClientSecretFlow> {
    CredentialProvider::new(
        FileCredentialStore::new(&cli.token_cache),
        ClientSecretFlow::new(
            &cli.credentials,
            config.auth.callback_port,
            Duration::from_secs(config.auth.callback_timeout_secs),
        ),
    )
}

/// Run the interactive menu until the user quits
pub async fn run_shell(cli: &Cli, config: Config, progress: ProgressReporter) -> Result<()> {
    // Fail before any prompt is shown
    let api_key = api_key_from_env()?;
    let analyst = OpenAiAnalyst::new(&api_key, config.model.clone());
    let provider = credential_provider(cli, &config);

    Shell::new(config, provider, Box::new(analyst), progress)?
        .run()
        .await
}

/// Authenticate (optionally discarding the cached credential) and report the account
pub async fn run_auth(cli: &Cli, config: &Config, force: bool) -> Result<String> {
    let provider = credential_provider(cli, config);
    if force {
        provider.store().clear().await?;
    }

    let credential = provider.ensure_valid().await?;
    let client = GmailMailClient::new(build_hub(&credential.access_token)?);
    let address = client.profile_address().await?;

    println!("Successfully authenticated with Gmail!");
    println!("Token cached at: {:?}", cli.token_cache);
    println!("Connected to account: {}", address);
    Ok(address)
}

/// Render a word cloud without entering the menu
pub async fn run_word_cloud(
    cli: &Cli,
    config: &Config,
    output: Option<PathBuf>,
    count: Option<u32>,
    progress: &ProgressReporter,
) -> Result<Option<PathBuf>> {
    let output = output.unwrap_or_else(|| config.word_cloud.output.clone());
    let count = count.unwrap_or(config.mail.word_cloud_messages);
    if count == 0 || count > MAX_MESSAGES {
        return Err(InsightsError::ConfigError(format!(
            "--count must be between 1 and {}",
            MAX_MESSAGES
        )));
    }
    let renderer = WordCloudRenderer::from_config(&config.word_cloud)?;

    let credential = credential_provider(cli, config).ensure_valid().await?;
    let mut session = Session::new();
    session.connect(
        &credential.access_token,
        Box::new(GmailMailClient::new(build_hub(&credential.access_token)?)),
    );

    let spinner = progress.add_spinner("Generating word cloud...");
    let outcome = session
        .word_cloud(&renderer, &config.mail.label, count, &output)
        .await;

    match outcome {
        Ok(WordCloudOutcome::Rendered(path)) => {
            progress.finish_spinner(&spinner, &format!("Word cloud saved to {}", path.display()));
            Ok(Some(path))
        }
        Ok(WordCloudOutcome::NoEmails { warning }) => {
            spinner.finish_and_clear();
            if let Some(warning) = warning {
                eprintln!("{}", warning);
            }
            println!("No emails found.");
            Ok(None)
        }
        Err(e) => {
            spinner.finish_and_clear();
            Err(e)
        }
    }
}

/// Write a default configuration file
pub async fn run_init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(InsightsError::ConfigError(format!(
            "Configuration file already exists at {:?}. Use --force to overwrite.",
            output
        )));
    }

    Config::create_example(output).await?;
    info!("Generated example configuration file");

    println!("Created example configuration file at: {:?}", output);
    println!("\nPlease edit this file to customize your settings.");
    println!("Key settings to review:");
    println!("  - mail.label: Which label to read (INBOX, SPAM, ...)");
    println!("  - model.model: Chat model used for summaries and sentiment");
    println!("  - word_cloud.output: Where the word cloud image is written");
    Ok(())
}
