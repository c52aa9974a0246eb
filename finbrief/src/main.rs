/*
finbrief - daily financial news briefing
Collects headlines, asks an LLM for the three that matter, archives the result and mails it to subscribers.
*/

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::{Config, LlmAdapter, LlmConfig, MailCredentials, StoreConnection};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use finbrief::analyzer::{format_analysis, Analyzer};
use finbrief::archive::BriefingArchive;
use finbrief::collector::Collector;
use finbrief::llm::gemini::GeminiProvider;
use finbrief::llm::remote::RemoteLlmProvider;
use finbrief::llm::LlmProvider;
use finbrief::mailer::ResendMailer;
use finbrief::messenger::Messenger;
use finbrief::pipeline::{BriefingPipeline, RunOptions};
use finbrief::server::{launch_server, AppState};
use finbrief::subscribers::{connect_store, SubscriberStore};

#[derive(Parser, Debug)]
#[command(name = "finbrief", version, about = "Daily financial news briefing")]
struct Args {
    /// Path to finbrief.toml
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect, analyze, archive and email today's briefing
    Run {
        /// Skip email delivery
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the most recent archived briefing
    Latest,
    /// Start the HTTP server (subscribe, unsubscribe, latest briefing)
    Serve,
    /// List the models the configured LLM endpoint offers
    Models,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(args.config).await?;

    match args.command {
        Command::Run { dry_run } => run_briefing(&config, dry_run).await,
        Command::Latest => print_latest(&config).await,
        Command::Serve => serve(&config).await,
        Command::Models => list_models(&config).await,
    }
}

async fn load_config(explicit: Option<PathBuf>) -> Result<Config> {
    let default_path = PathBuf::from("finbrief.default.toml");

    let override_path = if let Some(p) = explicit {
        if !p.exists() {
            anyhow::bail!("Config file not found: {}", p.display());
        }
        Some(p)
    } else {
        let p = PathBuf::from("finbrief.toml");
        if p.exists() { Some(p) } else { None }
    };

    let config = Config::load_with_defaults(
        if default_path.exists() { Some(default_path.as_path()) } else { None },
        override_path.as_deref(),
    )
    .await?;
    info!(default = ?default_path, override = ?override_path, "configuration loaded");
    Ok(config)
}

/// Create an LLM provider based on configuration
fn create_llm_provider(llm_config: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    let api_key = llm_config.api_key()?;
    let endpoint = llm_config.endpoint();

    let provider: Arc<dyn LlmProvider> = match llm_config.adapter {
        LlmAdapter::Gemini => Arc::new(
            GeminiProvider::new(&endpoint, api_key, &llm_config.model).with_defaults(
                llm_config.timeout_seconds,
                llm_config.max_tokens,
                llm_config.temperature,
            ),
        ),
        LlmAdapter::OpenAi => Arc::new(
            RemoteLlmProvider::new(&endpoint, api_key, &llm_config.model).with_defaults(
                llm_config.timeout_seconds,
                llm_config.max_tokens,
                llm_config.temperature,
            ),
        ),
    };
    info!(adapter = ?llm_config.adapter, model = %llm_config.model, %endpoint, "LLM provider initialized");
    Ok(provider)
}

async fn open_store(connection: &StoreConnection, config: &Config) -> Result<Arc<dyn SubscriberStore>> {
    connect_store(connection, config.subscribers.timeout_seconds)
        .await
        .context("failed to open subscriber store")
}

fn create_messenger(
    config: &Config,
    credentials: MailCredentials,
    store: Arc<dyn SubscriberStore>,
) -> Result<Messenger> {
    let mail = &config.mail;
    let mailer = ResendMailer::new(
        &mail.api_url,
        credentials.api_key,
        Duration::from_secs(mail.timeout_seconds),
    )?;
    Ok(
        Messenger::new(store, Arc::new(mailer), credentials.from, credentials.base_url)
            .with_max_concurrent_sends(mail.max_concurrent_sends),
    )
}

async fn run_briefing(config: &Config, dry_run: bool) -> Result<()> {
    // Resolve every secret before touching the network or the filesystem.
    let provider = create_llm_provider(&config.llm)?;
    let delivery = if dry_run {
        None
    } else {
        Some((config.subscribers.connection()?, config.mail.credentials()?))
    };

    let messenger = match delivery {
        Some((connection, credentials)) => {
            let store = open_store(&connection, config).await?;
            Some(create_messenger(config, credentials, store)?)
        }
        None => None,
    };

    let collector = Collector::new(&config.collector)?;
    let analyzer = Analyzer::new(provider, config.llm.on_parse_failure)
        .with_generation(config.llm.max_tokens, config.llm.temperature);
    let archive = BriefingArchive::new(&config.archive.dir);

    let pipeline = BriefingPipeline::new(collector, analyzer, messenger, archive);
    let report = pipeline.run(RunOptions { dry_run }).await?;

    info!(
        news = report.news_count,
        archive = %report.archive_path.display(),
        "briefing complete"
    );

    if let Some(dispatch) = report.dispatch {
        let summary = dispatch.summary();
        println!("{}", serde_json::to_string(&summary)?);
        if !summary.success {
            anyhow::bail!(summary.error.unwrap_or_else(|| "email dispatch failed".to_string()));
        }
    }
    Ok(())
}

async fn print_latest(config: &Config) -> Result<()> {
    let archive = BriefingArchive::new(&config.archive.dir);
    match archive.latest().await? {
        Some(record) => {
            println!("{} ({} headlines collected)", record.date, record.news_count);
            println!("{}", format_analysis(&record.analysis));
        }
        None => warn!(dir = %archive.dir().display(), "no briefing archived yet"),
    }
    Ok(())
}

async fn serve(config: &Config) -> Result<()> {
    let connection = config.subscribers.connection()?;
    let credentials = config.mail.credentials();
    let store = open_store(&connection, config).await?;

    let messenger = match credentials {
        Ok(credentials) => Some(Arc::new(create_messenger(config, credentials, store.clone())?)),
        Err(e) => {
            warn!("mail delivery not configured, welcome emails disabled: {}", e);
            None
        }
    };

    let state = AppState {
        store,
        messenger,
        archive: BriefingArchive::new(&config.archive.dir),
    };
    launch_server(state, &config.server).await
}

async fn list_models(config: &Config) -> Result<()> {
    let provider = create_llm_provider(&config.llm)?;
    let models = provider.list_models().await?;
    info!(count = models.len(), "models available");
    for model in models {
        match model.description {
            Some(desc) => println!("{}  {}", model.name, desc),
            None => println!("{}", model.name),
        }
    }
    Ok(())
}
