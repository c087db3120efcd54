use std::fmt;
use std::io::{Error, ErrorKind};
use std::path::PathBuf;

use clap::Parser;
use derive_setters::Setters;
use ratatui::crossterm::event::KeyEvent;

use crate::record::Dataset;

/// The allowed page sizes, in the order `+`/`-` cycles through them.
pub const PAGE_SIZES: [usize; 4] = [5, 10, 20, 50];

pub const DEFAULT_PAGE_SIZE: usize = 10;

pub const HELP_TEXT: &str = "\
ekitable - station table viewer

  /            Search all fields
  f            Filter the column under the cursor
  s            Sort by column under the cursor (again to reverse)
  Left/Right   Move column cursor
  Up/Down      Move row cursor
  n, PageDown  Next page
  p, PageUp    Previous page
  Home/End     First/last page
  + / -        Larger/smaller page size
  Enter        Show record details
  Esc          Close details or popup
  y            Copy record to clipboard
  ?            This help
  q            Quit";

#[derive(Debug)]
pub enum TableError {
    IoError(Error),
    HttpError(reqwest::Error),
    LoadingFailed(String),
    FileNotFound,
    PermissionDenied,
}

impl From<Error> for TableError {
    fn from(err: Error) -> Self {
        match err.kind() {
            ErrorKind::NotFound => TableError::FileNotFound,
            ErrorKind::PermissionDenied => TableError::PermissionDenied,
            _ => TableError::IoError(err),
        }
    }
}

impl From<reqwest::Error> for TableError {
    fn from(err: reqwest::Error) -> Self {
        TableError::HttpError(err)
    }
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::IoError(e) => write!(f, "I/O error: {e}"),
            TableError::HttpError(e) => write!(f, "Request failed: {e}"),
            TableError::LoadingFailed(reason) => write!(f, "Loading failed: {reason}"),
            TableError::FileNotFound => write!(f, "File not found"),
            TableError::PermissionDenied => write!(f, "Permission denied"),
        }
    }
}

impl std::error::Error for TableError {}

fn parse_page_size(s: &str) -> Result<usize, String> {
    let size: usize = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if PAGE_SIZES.contains(&size) {
        Ok(size)
    } else {
        Err(format!("page size must be one of {PAGE_SIZES:?}"))
    }
}

#[derive(Parser, Setters, Debug, Clone)]
#[command(version, about = "A tui based station table viewer.")]
#[setters(prefix = "with_")]
pub struct TableConfig {
    /// CSV file path or http(s) URL of the dataset
    #[setters(into)]
    pub source: String,

    /// Records shown per page
    #[arg(short = 'n', long, default_value_t = DEFAULT_PAGE_SIZE, value_parser = parse_page_size)]
    pub page_size: usize,

    /// Field holding the image reference of a record
    #[arg(long, default_value = "imgurURL2")]
    #[setters(into)]
    pub image_field: String,

    /// Field used as title of the detail view, defaults to the first column
    #[arg(long)]
    #[setters(strip_option, into)]
    pub title_field: Option<String>,

    /// Event poll timeout in ms
    #[arg(long, default_value_t = 100)]
    pub event_poll_time: u64,

    /// Write tracing output to this file
    #[arg(short, long)]
    #[setters(strip_option)]
    pub log_file: Option<PathBuf>,
}

impl Default for TableConfig {
    fn default() -> Self {
        TableConfig {
            source: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
            image_field: "imgurURL2".to_string(),
            title_field: None,
            event_poll_time: 100,
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CMDMode {
    Search,
    FilterColumn,
}

#[derive(Debug)]
pub enum Message {
    Quit,
    Help,
    Enter,
    Exit,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    Sort,
    NextPage,
    PreviousPage,
    FirstPage,
    LastPage,
    GrowPageSize,
    ShrinkPageSize,
    CopyRecord,
    Search,
    FilterColumn,
    RawKey(KeyEvent),
    Loaded(Result<Dataset, TableError>),
}
