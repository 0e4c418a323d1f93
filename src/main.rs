use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use saju_chat::categories::Catalog;
use saju_chat::chat::{self, ChatContext};
use saju_chat::config::{self, ApiKey};
use saju_chat::constants;
use saju_chat::gemini::{GeminiConfig, GeminiOracle};
use saju_chat::prompt::PromptBuilder;
use saju_chat::web_server;

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that talks to Gemini.
#[derive(clap::Args, Debug)]
struct OracleArgs {
    #[arg(long, env = "GEMINI_MODEL", default_value_t = constants::GEMINI_MODEL.clone(), help = "Gemini model identifier.")]
    model: String,
    #[arg(long, env = "GEMINI_API_BASE", default_value_t = constants::GEMINI_API_BASE.clone(), help = "Gemini API base URL.")]
    api_base: String,
    #[arg(long, env = "SAJU_SECRETS_PATH", default_value_t = constants::SECRETS_PATH.clone(), help = "Deployment secrets file consulted when GOOGLE_API_KEY is unset.")]
    secrets: String,
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the fortune-telling web UI.
    Serve {
        #[arg(long, default_value_t = 8501, help = "Port for the web server.")]
        port: u16,
        #[arg(long, default_value = "templates", help = "Directory holding the page templates.")]
        templates: PathBuf,
        #[arg(long, default_value = "static", help = "Directory holding static assets.")]
        static_dir: PathBuf,
        #[command(flatten)]
        oracle: OracleArgs,
    },
    /// Hold a consultation in the terminal.
    Chat {
        #[arg(long, default_value = "정통운세", help = "Main category.")]
        main: String,
        #[arg(long, help = "Sub-category (defaults to the first one of the main category).")]
        sub: Option<String>,
        #[command(flatten)]
        oracle: OracleArgs,
    },
    /// List the available fortune categories.
    Categories,
}

fn build_oracle(args: &OracleArgs) -> Result<Arc<GeminiOracle>> {
    let secrets_path = PathBuf::from(&args.secrets);
    let (api_key, source) = config::resolve_api_key(&secrets_path)?;
    info!(?source, model = %args.model, "Resolved Gemini credentials");
    let oracle = oracle_with_key(api_key, args)?;
    Ok(Arc::new(oracle))
}

fn oracle_with_key(api_key: ApiKey, args: &OracleArgs) -> Result<GeminiOracle> {
    let config = GeminiConfig::new(api_key)
        .with_model(&args.model)
        .with_api_base(&args.api_base);
    GeminiOracle::new(config).context("Failed to initialize the Gemini client")
}

// The main entry point of the application, using tokio's async runtime
#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for environment variables like API keys)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG environment variable (e.g., RUST_LOG=info,saju_chat=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    info!("saju-chat starting with command: {:?}", cli.command);

    match cli.command {
        Commands::Serve {
            port,
            templates,
            static_dir,
            oracle,
        } => {
            let oracle = build_oracle(&oracle)?;
            let prompts = PromptBuilder::new().context("Failed to compile the instruction template")?;
            let templates = web_server::create_minijinja_env(&templates);
            let state = web_server::AppState::new(templates, oracle, prompts, Catalog::default());

            let mut web_server_handle = tokio::spawn(async move {
                if let Err(e) = web_server::start_web_server(port, state, static_dir).await {
                    error!("Web server failed: {:?}", e);
                }
            });

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);

            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, shutting down...");
                    web_server_handle.abort();
                }
                res = &mut web_server_handle => {
                    if let Err(e) = res {
                        error!("Web server task panicked: {:?}", e);
                    }
                }
            }
        }
        Commands::Chat { main, sub, oracle } => {
            let oracle = build_oracle(&oracle)?;
            let prompts = PromptBuilder::new().context("Failed to compile the instruction template")?;
            let ctx = ChatContext::new(Catalog::default(), oracle, Arc::new(prompts));
            chat::run_terminal_chat(ctx, &main, sub.as_deref()).await?;
        }
        Commands::Categories => {
            for category in Catalog::default().categories() {
                println!("{}", category.name);
                for sub in category.subcategories {
                    println!("  - {}", sub);
                }
            }
        }
    }

    info!("saju-chat shut down.");
    Ok(())
}
