use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::assistant::{Assistant, OpenAiClient};
use crate::conversation::Role;
use crate::loader::load_portfolios;
use crate::profile::{Choice, InvestorProfile};
use crate::session::{Session, SessionEvent};

use clap::{arg, ArgMatches, Command};
use colored::Colorize;
use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod assistant;
mod conversation;
mod error;
mod loader;
mod portfolio;
mod position;
mod profile;
mod session;
mod tui;

const APP_NAME: &str = "portfolio_chat";

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct Config {
    /// CSV loaded as "Uploaded CSV" when no file argument is given
    portfolio_file: String,
    model: String,
    temperature: f32,
    api_base: String,
    /// Name of the environment variable holding the API key
    api_key_env: String,
    log_file: String,
    profile: InvestorProfile,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            portfolio_file: String::new(),
            model: "gpt-4".to_string(),
            temperature: 0.3,
            api_base: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            log_file: String::new(),
            profile: InvestorProfile::default(),
        }
    }
}

fn file_arg() -> clap::Arg {
    arg!([FILE] "CSV file with Symbol, Quantity, Cost and Current columns")
}

fn cli() -> Command {
    Command::new(APP_NAME)
        .about("Portfolio tables with a chat assistant that knows your holdings")
        .subcommand(Command::new("config").about("Print the path to the config file"))
        .subcommand(
            Command::new("tui")
                .about("Start the interactive terminal UI (default)")
                .arg(file_arg()),
        )
        .subcommand(
            Command::new("balances")
                .about("Show the positions, gains and totals of every portfolio")
                .arg(file_arg()),
        )
        .subcommand(
            Command::new("allocation")
                .about("Show the allocation of every portfolio")
                .arg(file_arg()),
        )
        .subcommand(
            Command::new("ask")
                .about("Ask the assistant a single question")
                .arg(arg!(<QUESTION> "Question for the assistant"))
                .arg(file_arg()),
        )
}

// the FILE argument wins over the configured portfolio file
fn upload_path(matches: Option<&ArgMatches>, cfg: &Config) -> Option<PathBuf> {
    matches
        .and_then(|m| m.get_one::<String>("FILE"))
        .filter(|f| !f.is_empty())
        .or(Some(&cfg.portfolio_file).filter(|f| !f.is_empty()))
        .map(PathBuf::from)
}

fn init_logging(cfg: &Config, interactive: bool) -> eyre::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    if !cfg.log_file.is_empty() {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&cfg.log_file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else if !interactive {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    // the TUI owns the terminal, so it only logs to a file
    Ok(())
}

fn build_session(cfg: &Config, upload: Option<PathBuf>) -> eyre::Result<Session> {
    let portfolios = load_portfolios(upload.as_deref())?;

    // read once; a missing key surfaces as an error reply on first use
    let api_key = std::env::var(&cfg.api_key_env).ok();
    if api_key.is_none() {
        tracing::warn!(variable = %cfg.api_key_env, "no API key in environment");
    }
    let client = OpenAiClient::new(&cfg.api_base, api_key, &cfg.api_key_env);
    let assistant = Assistant::new(Arc::new(client), &cfg.model, cfg.temperature);

    Ok(Session::new(portfolios, cfg.profile, assistant).with_upload_path(upload))
}

async fn ask(mut session: Session, question: &str) -> eyre::Result<()> {
    let profile = session.profile();
    println!(
        "{} risk {}, tax sensitivity {}, horizon {}",
        "Profile:".bold(),
        profile.risk.as_str(),
        profile.tax.as_str(),
        profile.horizon.as_str()
    );

    session
        .dispatch(SessionEvent::Submit(question.to_string()))
        .await?;

    for message in session.history() {
        let label = match message.role {
            Role::User => "you".cyan().bold(),
            Role::Assistant => "assistant".green().bold(),
            Role::System => "system".dimmed(),
        };
        println!("{label}: {}", message.content);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cfg: Config = confy::load(APP_NAME, "config")?;
    let matches = cli().get_matches();

    let subcommand = matches.subcommand_name().unwrap_or("tui");
    let sub_matches = matches.subcommand().map(|(_, m)| m);
    init_logging(&cfg, subcommand == "tui")?;

    match subcommand {
        "config" => {
            let path = confy::get_configuration_file_path(APP_NAME, "config")?;
            println!("Your config file is located here: \n{}", path.display());
        }
        "balances" => {
            let session = build_session(&cfg, upload_path(sub_matches, &cfg))?;
            for portfolio in session.portfolios() {
                portfolio.print(true);
            }
        }
        "allocation" => {
            let session = build_session(&cfg, upload_path(sub_matches, &cfg))?;
            for portfolio in session.portfolios() {
                println!("Portfolio: {}", portfolio.name);
                portfolio.draw_pie_chart();
                portfolio.print_allocation();
            }
        }
        "ask" => {
            let session = build_session(&cfg, upload_path(sub_matches, &cfg))?;
            let question = sub_matches
                .and_then(|m| m.get_one::<String>("QUESTION"))
                .map(String::as_str)
                .unwrap_or_default();
            ask(session, question).await?;
        }
        _ => {
            let session = build_session(&cfg, upload_path(sub_matches, &cfg))?;
            tui::run_tui(session).await?;
        }
    }
    Ok(())
}
