use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use habitbot::heatmap;
use habitbot::{
    Clock, Config, Dispatcher, FileStore, FixedClock, Gate, GitHubClient, HabitStore, LocalStore,
    LogNotifier, Notifier, SystemClock, TelegramClient, Webhook,
};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "habitbot")]
#[command(author, version, about = "Habit tracking chat bot backed by a yearly file in GitHub")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: ./habitbot.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the Telegram webhook server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        bind: Option<String>,

        /// Keep habit files in this directory instead of GitHub
        #[arg(long)]
        local: Option<PathBuf>,
    },

    /// Run one chat command and print the reply
    Send {
        /// Message text, e.g. `/add reading` or `r`
        #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,

        /// Keep habit files in this directory instead of GitHub
        #[arg(long)]
        local: Option<PathBuf>,

        /// Pretend today is this date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        today: Option<NaiveDate>,
    },

    /// Draw the calendar heatmap for a year
    Heatmap {
        /// Year to draw (default: current year)
        #[arg(short, long)]
        year: Option<i32>,

        /// Only this habit instead of every habit
        #[arg(long)]
        habit: Option<String>,

        /// Keep habit files in this directory instead of GitHub
        #[arg(long)]
        local: Option<PathBuf>,

        /// Print JSON instead of a terminal drawing
        #[arg(long)]
        json: bool,

        /// Pretend today is this date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        today: Option<NaiveDate>,
    },

    /// Generate shell completions
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_date(value: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| format!("{} ({})", e, value))
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Args::parse()) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    Config::load(path).context("Failed to load configuration")
}

fn run(args: Args) -> Result<()> {
    let config_path = args.config;

    match args.command {
        Command::Completion { shell } => {
            clap_complete::generate(shell, &mut Args::command(), "habitbot", &mut std::io::stdout());
        }

        Command::Serve { port, bind, local } => {
            let config = load_config(config_path.as_deref())?;
            config.validate_for_webhook()?;
            let files = open_store(&config, local.as_deref())?;
            let notifier = open_notifier(&config)?;
            let gate = Gate::new(
                config.webhook_secret.clone().unwrap_or_default(),
                config.allowed_chat_id.clone().unwrap_or_default(),
            );
            let dispatcher = Dispatcher::new(
                HabitStore::with_prefix(files, &config.github.path_prefix),
                SystemClock,
            );

            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let port = port.unwrap_or(config.server.port);
            habitbot::serve::start_server(&bind, port, Webhook::new(gate, dispatcher, notifier))
                .context("Server error")?;
        }

        Command::Send { text, local, today } => {
            let config = load_config(config_path.as_deref())?;
            let files = open_store(&config, local.as_deref())?;
            let store = HabitStore::with_prefix(files, &config.github.path_prefix);
            let reply = match today {
                Some(date) => Dispatcher::new(store, FixedClock(date)).handle(&text.join(" "))?,
                None => Dispatcher::new(store, SystemClock).handle(&text.join(" "))?,
            };
            println!("{}", reply);
        }

        Command::Heatmap {
            year,
            habit,
            local,
            json,
            today,
        } => {
            let config = load_config(config_path.as_deref())?;
            let files = open_store(&config, local.as_deref())?;
            let store = HabitStore::with_prefix(files, &config.github.path_prefix);
            let today = today.unwrap_or_else(|| SystemClock.today());
            let year = year.unwrap_or_else(|| today.year());

            let doc = store
                .peek(year)
                .with_context(|| format!("Failed to read {}", store.path_for(year)))?
                .map(|v| v.document)
                .unwrap_or_default();

            let maps = match habit {
                Some(name) => {
                    let Some(dates) = doc.habits.get(&name) else {
                        bail!("No habit named \"{}\" in {}", name, year);
                    };
                    vec![heatmap::habit_heatmap(year, &name, dates, today)]
                }
                None => {
                    let view = heatmap::year_view(year, &doc, today);
                    std::iter::once(view.rollup).chain(view.habits).collect()
                }
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&maps)?);
            } else {
                for map in &maps {
                    println!("{}", heatmap::render_terminal(map));
                }
            }
        }
    }

    Ok(())
}

fn open_store(config: &Config, local: Option<&Path>) -> Result<Box<dyn FileStore>> {
    if let Some(dir) = local {
        let store = LocalStore::new(dir);
        log::debug!("Using local store at {}", store.root().display());
        return Ok(Box::new(store));
    }

    config.validate_for_github()?;
    let client = GitHubClient::new(&config.github).context("Failed to create GitHub client")?;
    log::debug!("Using GitHub store {}@{}", client.repo_name(), client.branch());
    Ok(Box::new(client))
}

fn open_notifier(config: &Config) -> Result<Box<dyn Notifier>> {
    if !config.has_bot_token() {
        log::warn!("TELEGRAM_BOT_TOKEN not set, replies will only be logged");
        return Ok(Box::new(LogNotifier));
    }
    let client = TelegramClient::new(&config.telegram).context("Failed to create Telegram client")?;
    Ok(Box::new(client))
}
