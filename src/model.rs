use arboard::Clipboard;
use ratatui::crossterm::event::KeyEvent;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::domain::{CMDMode, Message, PAGE_SIZES, TableConfig, TableError};
use crate::inputter::{InputResult, Inputter};
use crate::pipeline::{self, DerivedView, SortDirection, SortSpec, ViewState};
use crate::record::{Dataset, Record};

#[derive(Debug, PartialEq)]
pub enum Status {
    LOADING,
    READY,
    FAILED,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Modus {
    TABLE,
    RECORD,
    POPUP,
    CMDINPUT,
}

pub struct Model {
    config: TableConfig,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    dataset: Option<Dataset>,
    load_error: Option<TableError>,
    state: ViewState,
    curser_row: usize,    // Row inside the visible page
    curser_column: usize, // Schema field index
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    last_input: InputResult,
    filter_field: Option<String>,
    clipboard: Option<Clipboard>,
    status_message: String,
    last_status_message_update: Instant,
}

impl Model {
    pub fn init(config: &TableConfig) -> Self {
        Self {
            config: config.clone(),
            status: Status::LOADING,
            modus: Modus::TABLE,
            previous_modus: Modus::TABLE,
            dataset: None,
            load_error: None,
            state: ViewState::with_page_size(config.page_size),
            curser_row: 0,
            curser_column: 0,
            input: Inputter::default(),
            cmd_mode: None,
            last_input: InputResult::default(),
            filter_field: None,
            clipboard: None,
            status_message: "Loading ...".to_string(),
            last_status_message_update: Instant::now(),
        }
    }

    pub fn update(&mut self, message: Message) {
        trace!("Update: Modus {:?}, Message {:?}", self.modus, message);
        match message {
            Message::Quit => return self.quit(),
            Message::Loaded(result) => return self.loaded(result),
            _ => (),
        }
        if self.status != Status::READY {
            warn!("Ignoring {message:?} while {:?}", self.status);
            return;
        }

        match self.modus {
            Modus::TABLE => match message {
                Message::MoveUp => self.move_curser_up(),
                Message::MoveDown => self.move_curser_down(),
                Message::MoveLeft => self.curser_column = self.curser_column.saturating_sub(1),
                Message::MoveRight => self.move_curser_right(),
                Message::Sort => self.sort_current_column(),
                Message::NextPage => self.next_page(),
                Message::PreviousPage => self.previous_page(),
                Message::FirstPage => self.go_to_page(1),
                Message::LastPage => self.go_to_page(usize::MAX),
                Message::GrowPageSize => self.step_page_size(true),
                Message::ShrinkPageSize => self.step_page_size(false),
                Message::CopyRecord => self.copy_record(),
                Message::Search => self.enter_cmd_mode(CMDMode::Search),
                Message::FilterColumn => self.enter_cmd_mode(CMDMode::FilterColumn),
                Message::Enter => self.open_record(),
                Message::Help => self.show_help(),
                _ => (),
            },
            Modus::RECORD => match message {
                Message::Exit | Message::Enter => self.exit(),
                Message::CopyRecord => self.copy_record(),
                Message::Help => self.show_help(),
                _ => (),
            },
            Modus::POPUP => {
                if let Message::Exit | Message::Enter | Message::Help = message {
                    self.exit()
                }
            }
            Modus::CMDINPUT => {
                if let Message::RawKey(key) = message {
                    self.raw_input(key)
                }
            }
        }
    }

    // -------------------- View state handlers ---------------------- //

    /// Apply `change` to a copy of the view state, clamp it and swap it in.
    fn apply(&mut self, action: &str, change: impl FnOnce(&mut ViewState)) {
        let Some(dataset) = self.dataset.as_ref() else {
            warn!("Ignoring {action}, no dataset loaded");
            return;
        };
        let mut next = self.state.clone();
        change(&mut next);
        next.clamp_page(dataset);
        debug!(
            "{action}: search {:?}, filters {:?}, sort {:?}, page {}/{}",
            next.search_term, next.column_filters, next.sort, next.current_page, next.page_size
        );
        self.state = next;
        self.clamp_curser();
    }

    pub fn set_search_term(&mut self, text: &str) {
        self.apply("set_search_term", |s| {
            s.search_term = text.to_string();
            s.current_page = 1;
        });
    }

    pub fn set_column_filter(&mut self, field: &str, text: &str) {
        let known = self
            .dataset
            .as_ref()
            .is_some_and(|ds| ds.schema().position(field).is_some());
        if !known {
            warn!("Ignoring filter on unknown field {field:?}");
            return;
        }
        self.apply("set_column_filter", |s| {
            if text.is_empty() {
                s.column_filters.remove(field);
            } else {
                s.column_filters.insert(field.to_string(), text.to_string());
            }
            s.current_page = 1;
        });
    }

    pub fn request_sort(&mut self, key: &str) {
        self.apply("request_sort", |s| {
            let direction = match &s.sort {
                Some(spec) if spec.key == key && spec.direction == SortDirection::Ascending => {
                    SortDirection::Descending
                }
                _ => SortDirection::Ascending,
            };
            s.sort = Some(SortSpec {
                key: key.to_string(),
                direction,
            });
        });
    }

    pub fn set_page_size(&mut self, size: usize) {
        if !PAGE_SIZES.contains(&size) {
            warn!("Ignoring page size {size}, allowed are {PAGE_SIZES:?}");
            return;
        }
        self.apply("set_page_size", |s| {
            s.page_size = size;
            s.current_page = 1;
        });
    }

    pub fn go_to_page(&mut self, page: usize) {
        self.apply("go_to_page", |s| s.current_page = page);
    }

    pub fn next_page(&mut self) {
        let page = self.state.current_page.saturating_add(1);
        self.go_to_page(page);
    }

    pub fn previous_page(&mut self) {
        let page = self.state.current_page.saturating_sub(1);
        self.go_to_page(page);
    }

    pub fn select_record(&mut self, idx: usize) {
        if self.dataset.as_ref().and_then(|ds| ds.get(idx)).is_none() {
            warn!("Ignoring selection of unknown record {idx}");
            return;
        }
        self.apply("select_record", |s| s.selected = Some(idx));
    }

    pub fn clear_selection(&mut self) {
        self.apply("clear_selection", |s| s.selected = None);
    }

    // -------------------- Accessors ---------------------- //

    pub fn view(&self) -> Option<DerivedView> {
        self.dataset
            .as_ref()
            .map(|ds| pipeline::derive(ds, &self.state))
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    pub fn load_error(&self) -> Option<&TableError> {
        self.load_error.as_ref()
    }

    pub fn selected_record(&self) -> Option<&Record> {
        let idx = self.state.selected?;
        self.dataset.as_ref()?.get(idx)
    }

    pub fn modus(&self) -> Modus {
        self.modus
    }

    pub fn curser(&self) -> (usize, usize) {
        (self.curser_row, self.curser_column)
    }

    pub fn cmd_input(&self) -> Option<(CMDMode, &InputResult)> {
        self.cmd_mode.map(|mode| (mode, &self.last_input))
    }

    pub fn filter_field(&self) -> Option<&str> {
        self.filter_field.as_deref()
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn status_message(&self) -> (&str, Instant) {
        (&self.status_message, self.last_status_message_update)
    }

    pub fn raw_keyevents(&self) -> bool {
        self.modus == Modus::CMDINPUT
    }

    /// Title of a record in the detail view.
    pub fn record_title<'a>(&self, record: &'a Record) -> &'a str {
        match &self.config.title_field {
            Some(field) => record.get(field).unwrap_or(""),
            None => record.value(0),
        }
    }

    // -------------------- Control handling functions ---------------------- //

    fn loaded(&mut self, result: Result<Dataset, TableError>) {
        if self.status != Status::LOADING {
            warn!("Dropping load result, status is {:?}", self.status);
            return;
        }
        match result {
            Ok(dataset) => {
                info!("Dataset ready with {} records", dataset.len());
                self.set_status_message(format!("Loaded {} records", dataset.len()));
                self.dataset = Some(dataset);
                self.state = ViewState::with_page_size(self.config.page_size);
                self.status = Status::READY;
            }
            Err(e) => {
                warn!("Load failed: {e}");
                self.set_status_message(format!("Unable to load data: {e}"));
                self.load_error = Some(e);
                self.status = Status::FAILED;
            }
        }
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.last_status_message_update = Instant::now();
    }

    fn visible_len(&self) -> usize {
        self.view().map(|v| v.visible().len()).unwrap_or(0)
    }

    fn clamp_curser(&mut self) {
        self.curser_row = self
            .curser_row
            .min(self.visible_len().saturating_sub(1));
        let nfields = self.dataset.as_ref().map(|ds| ds.schema().len()).unwrap_or(0);
        self.curser_column = self.curser_column.min(nfields.saturating_sub(1));
    }

    fn move_curser_up(&mut self) {
        if self.curser_row > 0 {
            self.curser_row -= 1;
        } else if self.state.current_page > 1 {
            // Top of the page, continue at the bottom of the previous one
            self.previous_page();
            self.curser_row = self.visible_len().saturating_sub(1);
        }
    }

    fn move_curser_down(&mut self) {
        if self.curser_row + 1 < self.visible_len() {
            self.curser_row += 1;
        } else if self.view().is_some_and(|v| v.has_next()) {
            self.next_page();
            self.curser_row = 0;
        }
    }

    fn move_curser_right(&mut self) {
        let nfields = self.dataset.as_ref().map(|ds| ds.schema().len()).unwrap_or(0);
        if self.curser_column + 1 < nfields {
            self.curser_column += 1;
        }
    }

    fn current_field(&self) -> Option<String> {
        self.dataset
            .as_ref()?
            .schema()
            .fields()
            .get(self.curser_column)
            .cloned()
    }

    fn curser_record(&self) -> Option<usize> {
        self.view()?.visible().get(self.curser_row).copied()
    }

    fn sort_current_column(&mut self) {
        if let Some(field) = self.current_field() {
            self.request_sort(&field);
            if let Some(spec) = &self.state.sort {
                let msg = format!("Sorted by {} {}", spec.key, spec.direction.arrow());
                self.set_status_message(msg);
            }
        }
    }

    fn step_page_size(&mut self, grow: bool) {
        let current = self.state.page_size;
        let next = if grow {
            PAGE_SIZES.iter().copied().find(|&s| s > current)
        } else {
            PAGE_SIZES.iter().rev().copied().find(|&s| s < current)
        };
        if let Some(size) = next {
            self.set_page_size(size);
            self.set_status_message(format!("{size} records per page"));
        }
    }

    fn open_record(&mut self) {
        if let Some(idx) = self.curser_record() {
            self.select_record(idx);
            self.previous_modus = self.modus;
            self.modus = Modus::RECORD;
        }
    }

    fn exit(&mut self) {
        match self.modus {
            Modus::TABLE => {}
            Modus::RECORD => {
                self.clear_selection();
                self.previous_modus = Modus::RECORD;
                self.modus = Modus::TABLE;
            }
            Modus::POPUP => {
                trace!("Close popup ...");
                self.modus = self.previous_modus;
                self.previous_modus = Modus::POPUP;
            }
            Modus::CMDINPUT => {}
        }
    }

    fn show_help(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
    }

    fn copy_record(&mut self) {
        let line = match self.selected_record() {
            Some(record) => record.to_csv_line(),
            None => match self.curser_record().and_then(|idx| self.dataset.as_ref()?.get(idx)) {
                Some(record) => record.to_csv_line(),
                None => return,
            },
        };
        trace!("Record content: {}", line);

        if self.clipboard.is_none() {
            match Clipboard::new() {
                Ok(clipboard) => self.clipboard = Some(clipboard),
                Err(e) => {
                    warn!("No clipboard available: {e:?}");
                    self.set_status_message("No clipboard available");
                    return;
                }
            }
        }
        if let Some(clipboard) = self.clipboard.as_mut() {
            match clipboard.set_text(line) {
                Ok(_) => self.set_status_message("Copied record to clipboard"),
                Err(e) => {
                    warn!("Error copying to clipboard: {:?}", e);
                    self.set_status_message("Copy failed");
                }
            }
        }
    }

    fn enter_cmd_mode(&mut self, mode: CMDMode) {
        trace!("Entering command mode {mode:?} ...");
        let initial = match mode {
            CMDMode::Search => self.state.search_term.clone(),
            CMDMode::FilterColumn => {
                let Some(field) = self.current_field() else {
                    return;
                };
                let text = self
                    .state
                    .column_filters
                    .get(&field)
                    .cloned()
                    .unwrap_or_default();
                self.filter_field = Some(field);
                text
            }
        };
        self.previous_modus = self.modus;
        self.modus = Modus::CMDINPUT;
        self.cmd_mode = Some(mode);
        self.input.set(&initial);
        self.last_input = self.input.get();
    }

    fn raw_input(&mut self, key: KeyEvent) {
        self.last_input = self.input.read(key);
        let text = self.last_input.input.clone();
        match self.cmd_mode {
            Some(CMDMode::Search) => {
                if text != self.state.search_term {
                    self.set_search_term(&text);
                }
            }
            Some(CMDMode::FilterColumn) => {
                if let Some(field) = self.filter_field.clone() {
                    let current = self.state.column_filters.get(&field).map(String::as_str);
                    if current.unwrap_or("") != text {
                        self.set_column_filter(&field, &text);
                    }
                }
            }
            None => {}
        }
        if self.last_input.finished {
            self.leave_cmd_mode();
        }
    }

    fn leave_cmd_mode(&mut self) {
        trace!("Leaving command mode ...");
        let matches = self.view().map(|v| v.rows.len()).unwrap_or(0);
        if matches == 0 {
            self.set_status_message("No results");
        } else {
            self.set_status_message(format!("{matches} matching records"));
        }
        self.modus = self.previous_modus;
        self.previous_modus = Modus::CMDINPUT;
        self.cmd_mode = None;
        self.filter_field = None;
    }
}
