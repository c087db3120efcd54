use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Instant;

use tracing::{error, info, instrument};

use crate::domain::TableError;
use crate::record::{self, Dataset};

/// Where the raw dataset text comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    File(PathBuf),
    Url(String),
}

impl Source {
    pub fn parse(location: &str) -> Result<Self, TableError> {
        if location.starts_with("http://") || location.starts_with("https://") {
            return Ok(Source::Url(location.to_string()));
        }
        let expanded = shellexpand::full(location)
            .map_err(|e| TableError::LoadingFailed(format!("Can not expand path: {e}")))?;
        Ok(Source::File(PathBuf::from(expanded.as_ref())))
    }

    pub fn name(&self) -> String {
        match self {
            Source::File(path) => path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("???")
                .to_string(),
            Source::Url(url) => url.rsplit('/').next().unwrap_or(url).to_string(),
        }
    }

    /// Read the raw text body. Any non-success outcome is an error, never an empty body.
    #[instrument]
    pub fn fetch(&self) -> Result<String, TableError> {
        match self {
            Source::File(path) => {
                let metadata = fs::metadata(path)?;
                if !metadata.is_file() {
                    return Err(TableError::LoadingFailed("Not a file!".into()));
                }
                Ok(fs::read_to_string(path)?)
            }
            Source::Url(url) => {
                let response = reqwest::blocking::get(url)?.error_for_status()?;
                Ok(response.text()?)
            }
        }
    }
}

/// Resolve `location` and load it. A location that can not be resolved is
/// delivered as a failed load, like any fetch error.
pub fn load(location: &str) -> Receiver<Result<Dataset, TableError>> {
    match Source::parse(location) {
        Ok(source) => {
            info!("Loading from {source:?}");
            spawn_load(source)
        }
        Err(e) => {
            error!("Can not resolve {location}: {e}");
            let (tx, rx) = mpsc::channel();
            let _ = tx.send(Err(e));
            rx
        }
    }
}

/// Fetch and parse `source` on a background thread. The receiver yields exactly one result.
pub fn spawn_load(source: Source) -> Receiver<Result<Dataset, TableError>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let start_time = Instant::now();
        let result = source.fetch().map(|raw| record::parse(&raw));
        match &result {
            Ok(ds) => info!(
                "Loading {} ({} records) took {}ms ...",
                source.name(),
                ds.len(),
                start_time.elapsed().as_millis()
            ),
            Err(e) => error!("Loading {} failed: {e}", source.name()),
        }
        // The receiver is gone when the app quit before loading finished.
        let _ = tx.send(result);
    });
    rx
}
