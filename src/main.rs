use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cache;
mod controller;
mod dataset;
mod domain;
mod insights;
mod loader;
mod model;
mod normalizer;
mod table;
mod ui;

use controller::Controller;
use dataset::DatasetKind;
use domain::{DEFAULT_API_BASE, DEFAULT_MODEL, DashConfig, Message, RtvError};
use insights::ChatCompletionsClient;
use loader::{Loader, Source};
use model::{Model, Status};
use ui::DashboardUI;

#[derive(Parser, Debug)]
#[command(name = "rtv", version, about = "A tui based retail spreadsheet dashboard.")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Write logs to this file. The dashboard defaults to rtv.log, clean logs to stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Sales spreadsheet, local path or URL
    #[arg(long, default_value = "sales.xls")]
    sales: String,

    /// Purchase spreadsheet, local path or URL
    #[arg(long, default_value = "purchase.xls")]
    purchase: String,

    /// Stock spreadsheet, local path or URL
    #[arg(long, default_value = "stock.xls")]
    stock: String,
}

impl SourceArgs {
    fn resolve(&self) -> Vec<(DatasetKind, Source)> {
        vec![
            (DatasetKind::Sales, Source::parse(&self.sales)),
            (DatasetKind::Purchase, Source::parse(&self.purchase)),
            (DatasetKind::Stock, Source::parse(&self.stock)),
        ]
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Normalize the raw exports and print a preview of each table
    Clean {
        #[command(flatten)]
        sources: SourceArgs,

        /// Write cleaned_<kind>_data.csv files into this directory
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Rows shown per table
        #[arg(long, default_value_t = 5)]
        rows: usize,
    },
    /// Open the interactive dashboard
    Dashboard {
        #[command(flatten)]
        sources: SourceArgs,

        /// Seconds a loaded dataset is reused before it is fetched again
        #[arg(long, default_value_t = 3600)]
        cache_ttl: u64,

        #[arg(long, env = "RTV_MODEL", default_value = DEFAULT_MODEL)]
        model: String,

        #[arg(long, env = "RTV_API_BASE", default_value = DEFAULT_API_BASE)]
        api_base: String,

        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        #[arg(long, default_value_t = 24)]
        max_column_width: usize,
    },
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match run(cli) {
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn run(cli: Cli) -> Result<(), RtvError> {
    match cli.command {
        Command::Clean {
            sources,
            out_dir,
            rows,
        } => {
            init_logging(cli.log_file.as_deref())?;
            run_clean(&sources, out_dir.as_deref(), rows)
        }
        Command::Dashboard {
            sources,
            cache_ttl,
            model,
            api_base,
            api_key,
            max_column_width,
        } => {
            let log_file = cli.log_file.unwrap_or_else(|| PathBuf::from("rtv.log"));
            init_logging(Some(&log_file))?;

            let mut config = DashConfig::default()
                .with_cache_ttl(Duration::from_secs(cache_ttl))
                .with_model(model)
                .with_api_base(api_base)
                .with_max_column_width(max_column_width);
            if let Some(key) = api_key {
                config = config.with_api_key(key);
            }
            run_dashboard(&config, sources.resolve())
        }
    }
}

fn init_logging(log_file: Option<&Path>) -> Result<(), RtvError> {
    let filter = EnvFilter::try_from_env("RTV_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(ErrorLayer::default());

    match log_file {
        Some(path) => {
            let file = File::create(path)?;
            registry
                .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
                .try_init()
        }
        None => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    }
    .map_err(|e| RtvError::Logging(e.to_string()))
}

fn run_clean(sources: &SourceArgs, out_dir: Option<&Path>, rows: usize) -> Result<(), RtvError> {
    let loader = Loader::new();
    if let Some(dir) = out_dir {
        fs::create_dir_all(dir)?;
    }

    for (kind, source) in sources.resolve() {
        let frame = loader
            .load_clean(&source)
            .and_then(|clean| {
                dataset::to_frame(&clean).map_err(|e| domain::LoadError::new(source.to_string(), e))
            });
        match frame {
            Ok(mut df) => {
                println!("{}", dataset::head_summary(kind, &df, rows));
                if let Some(dir) = out_dir {
                    dataset::write_csv(&mut df, dir, kind)?;
                }
            }
            // An absent table is reported, the others are still processed
            Err(e) => error!("Error loading data from {}: {}", e.source_id, e.cause),
        }
    }
    Ok(())
}

fn run_dashboard(config: &DashConfig, sources: Vec<(DatasetKind, Source)>) -> Result<(), RtvError> {
    info!("Starting rtv!");
    let generator = ChatCompletionsClient::new(config);
    let mut model = Model::init(config, sources, Loader::new(), 0, 0);
    let mut ui = DashboardUI::new(config);
    let controller = Controller::new(config);

    let mut terminal = ratatui::init();
    let result = (|| -> Result<(), RtvError> {
        let size = terminal.size()?;
        model.update(Some(Message::Resize(size.width as usize, size.height as usize)));

        while model.status != Status::QUITTING {
            // Render the current view
            terminal.draw(|f| ui.draw(&model, f))?;

            // A requested generation runs once its pending state is on screen
            if model.has_pending_generation() {
                model.run_pending(&generator);
                continue;
            }

            // Handle events and map to a Message
            let message = controller.handle_event(&model)?;
            model.update(message);
        }
        Ok(())
    })();
    ratatui::restore();
    info!("Exiting rtv");
    result
}
