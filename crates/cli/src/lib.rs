pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use ledgerchat_core::config::{AppConfig, ConfigOverrides, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "ledgerchat",
    about = "Ledgerchat bookkeeping assistant",
    long_about = "Talk to the bookkeeping assistant, extract invoices from documents, and inspect \
                  configuration and model readiness.",
    after_help = "Examples:\n  ledgerchat chat\n  ledgerchat ask \"Create an invoice for Jane for \
                  $500\"\n  ledgerchat extract invoice.txt\n  ledgerchat doctor --json"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    #[arg(long, global = true, help = "Path to a ledgerchat.toml file (must exist)")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override logging.level for this run")]
    log_level: Option<String>,
    #[arg(long, global = true, help = "Skip the model and use keyword classification only")]
    offline: bool,
}

impl GlobalArgs {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                log_level: self.log_level.clone(),
                llm_enabled: self.offline.then_some(false),
                ..ConfigOverrides::default()
            },
        }
    }
}

#[derive(Debug, Args)]
pub struct SessionArgs {
    #[arg(long, default_value = "local", help = "User id the conversation belongs to")]
    pub user: String,
    #[arg(long, default_value = "cli", help = "Conversation id within the user's history")]
    pub conversation: String,
}

impl Default for SessionArgs {
    fn default() -> Self {
        Self { user: "local".to_string(), conversation: "cli".to_string() }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive chat session (/upload <path> to add a document)")]
    Chat {
        #[command(flatten)]
        session: SessionArgs,
    },
    #[command(about = "Send a single message and print the structured response")]
    Ask {
        message: String,
        #[command(flatten)]
        session: SessionArgs,
    },
    #[command(about = "Extract invoice fields from a text document")]
    Extract {
        path: PathBuf,
        #[arg(long, help = "MIME type; inferred from the file extension when omitted")]
        mime: Option<String>,
        #[command(flatten)]
        session: SessionArgs,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and model endpoint reachability")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.global.load_options();

    if let Ok(config) = AppConfig::load(options.clone()) {
        logging::init_logging(&config);
    }

    let result = match cli.command {
        Command::Chat { session } => commands::chat::run(&options, &session),
        Command::Ask { message, session } => commands::ask::run(&options, &session, &message),
        Command::Extract { path, mime, session } => {
            commands::extract::run(&options, &session, &path, mime.as_deref())
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(&options) }
        }
        Command::Doctor { json } => commands::doctor::run(&options, json),
    };

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}
