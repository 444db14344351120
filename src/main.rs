mod camera;
mod catalog;
mod cli;
mod clock;
mod config;
mod i18n;
mod journal;
mod lifecycle;
mod navigation;
mod scanner;
mod session;
mod storage;

use anyhow::Result;
use clap::Parser;
use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "goti", about = "Connectivity package client: sessions, countdown and QR connect")]
pub struct Args {
    #[arg(short, long, help = "Run a single command and exit (e.g. \"/status\")")]
    pub command: Option<String>,

    #[arg(long, help = "Config file path")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "GOTI_DATA_DIR", help = "Directory for the session record and history")]
    pub data_dir: Option<PathBuf>,

    #[arg(long, value_name = "LANG", help = "Display language: en or bn")]
    pub lang: Option<String>,

    #[arg(long, help = "Do not write the event journal")]
    pub no_journal: bool,

    #[arg(long, help = "Debug logging to stderr")]
    pub debug: bool,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut cfg = if let Some(config_path) = &args.config {
        config::Config::load_from(config_path)?
    } else {
        config::Config::load()?
    };

    if let Some(dir) = &args.data_dir {
        cfg.storage.dir = Some(dir.clone());
    }
    if let Some(lang) = &args.lang {
        match i18n::Language::from_str(lang) {
            Some(l) => cfg.language = Some(l),
            None => anyhow::bail!("Invalid language: {}. Use: en, bn", lang),
        }
    }
    if args.no_journal {
        cfg.journal.enabled = false;
    }

    if let Err(errors) = cfg.validate() {
        for e in &errors {
            eprintln!("config error: {}", e);
        }
        anyhow::bail!("{} configuration error(s)", errors.len());
    }

    let level = if args.debug {
        "goti=debug".to_string()
    } else {
        cfg.log_level().to_string()
    };
    init_tracing(&level);

    let data_dir = cfg.data_dir();
    std::fs::create_dir_all(&data_dir)?;
    tracing::debug!(data_dir = %data_dir.display(), "using data directory");

    let clock: Arc<dyn clock::Clock> = Arc::new(clock::SystemClock);
    let storage: Arc<dyn storage::Storage> = Arc::new(storage::FileStorage::new(&data_dir));
    let session =
        session::SessionContext::restore(storage, Arc::clone(&clock), cfg.session_settings());

    let journal = if cfg.journal.enabled {
        let session_id = uuid::Uuid::new_v4().to_string();
        match journal::Journal::new(&data_dir.join("events.jsonl"), &session_id) {
            Ok(j) => {
                tracing::debug!(path = %j.path.display(), "journal opened");
                Some(j)
            }
            Err(e) => {
                tracing::warn!(error = %e, "journal disabled");
                None
            }
        }
    } else {
        None
    };

    let ctx = cli::Context {
        catalog: catalog::Catalog::new(cfg.packages.clone()),
        lang: RefCell::new(cfg.language()),
        config: cfg,
        data_dir,
        clock,
        session: RefCell::new(session),
        navigator: RefCell::new(navigation::Navigator::default()),
        journal: RefCell::new(journal),
    };

    if let Some(command) = &args.command {
        cli::run_once(&ctx, command)
    } else {
        cli::run_repl(ctx)
    }
}
