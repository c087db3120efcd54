use std::fs::File;
use std::process::ExitCode;
use std::sync::Mutex;
use std::sync::mpsc::{Receiver, TryRecvError};

use clap::Parser;
use ratatui::DefaultTerminal;
use tracing::info;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod controller;
mod domain;
mod inputter;
mod model;
mod pipeline;
mod record;
mod source;
mod ui;

use controller::Controller;
use domain::{Message, TableConfig, TableError};
use model::{Model, Status};
use record::Dataset;
use ui::TableUI;

fn main() -> ExitCode {
    let config = TableConfig::parse();
    if let Err(e) = init_logging(&config) {
        eprintln!("Error: can not set up logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(&config) {
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

// The terminal belongs to the UI, so logs only go to a file when asked for.
fn init_logging(config: &TableConfig) -> Result<(), TableError> {
    let Some(path) = &config.log_file else {
        return Ok(());
    };
    let file = File::create(path)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .with(ErrorLayer::default())
        .init();
    Ok(())
}

fn run(config: &TableConfig) -> Result<(), TableError> {
    info!("Starting ekitable on {}", config.source);
    let loader = source::load(&config.source);

    let mut terminal = ratatui::init();
    let result = event_loop(config, &loader, &mut terminal);
    ratatui::restore();
    result
}

fn event_loop(
    config: &TableConfig,
    loader: &Receiver<Result<Dataset, TableError>>,
    terminal: &mut DefaultTerminal,
) -> Result<(), TableError> {
    let mut model = Model::init(config);
    let mut ui = TableUI::new();
    let controller = Controller::new(config);

    while model.status != Status::QUITTING {
        if model.status == Status::LOADING {
            match loader.try_recv() {
                Ok(result) => model.update(Message::Loaded(result)),
                Err(TryRecvError::Disconnected) => model.update(Message::Loaded(Err(
                    TableError::LoadingFailed("loader stopped without a result".into()),
                ))),
                Err(TryRecvError::Empty) => {}
            }
        }

        // Render the current view
        terminal.draw(|f| ui.draw(&model, f))?;

        // Handle events and map to a Message
        if let Some(message) = controller.handle_event(&model)? {
            model.update(message);
        };
    }

    Ok(())
}
