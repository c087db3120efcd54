use std::time::Duration;

use ratatui::{
    Frame,
    layout::{Constraint, Layout, Position, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
};

use crate::domain::{CMDMode, HELP_TEXT};
use crate::model::{Model, Modus, Status};
use crate::pipeline::DerivedView;
use crate::record::{Dataset, Record};

pub const STATUS_MESSAGE_TIMEOUT: Duration = Duration::from_secs(5);
pub const NO_IMAGE: &str = "no image";

#[derive(Default)]
pub struct TableUI {
    table_state: TableState,
}

impl TableUI {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw(&mut self, model: &Model, frame: &mut Frame) {
        match model.status {
            Status::LOADING => Self::draw_loading(model, frame),
            Status::FAILED => Self::draw_failure(model, frame),
            Status::READY | Status::QUITTING => self.draw_table(model, frame),
        }
    }

    fn draw_loading(model: &Model, frame: &mut Frame) {
        let text = format!("Loading {} ...", model.config().source);
        let [_, middle, _] = Layout::vertical([
            Constraint::Fill(1),
            Constraint::Length(1),
            Constraint::Fill(1),
        ])
        .areas(frame.area());
        frame.render_widget(Paragraph::new(text).centered(), middle);
    }

    // Terminal for the session, only quitting is possible from here.
    fn draw_failure(model: &Model, frame: &mut Frame) {
        let reason = model
            .load_error()
            .map(|e| e.to_string())
            .unwrap_or_default();
        let lines = vec![
            Line::from("Unable to load data".bold().red()),
            Line::from(""),
            Line::from(reason),
            Line::from(""),
            Line::from(vec!["Press ".into(), "q".blue().bold(), " to quit".into()]),
        ];
        let area = popup_area(frame.area(), 60, 40);
        frame.render_widget(
            Paragraph::new(lines)
                .centered()
                .wrap(Wrap { trim: true })
                .block(Block::bordered().title(" ekitable ")),
            area,
        );
    }

    fn draw_table(&mut self, model: &Model, frame: &mut Frame) {
        let (Some(dataset), Some(view)) = (model.dataset(), model.view()) else {
            return;
        };
        let [search_area, table_area, status_area] = Layout::vertical([
            Constraint::Length(3),
            Constraint::Fill(1),
            Constraint::Length(1),
        ])
        .areas(frame.area());

        Self::draw_search_bar(model, frame, search_area);
        if view.is_empty() {
            frame.render_widget(
                Paragraph::new("No results".italic())
                    .centered()
                    .block(Block::bordered()),
                table_area,
            );
        } else {
            self.draw_rows(model, dataset, &view, frame, table_area);
        }
        Self::draw_statusline(model, &view, frame, status_area);

        match model.modus() {
            Modus::RECORD => {
                if let Some(record) = model.selected_record() {
                    Self::draw_record(model, record, frame);
                }
            }
            Modus::POPUP => Self::draw_help(frame),
            Modus::TABLE | Modus::CMDINPUT => {}
        }
    }

    fn draw_search_bar(model: &Model, frame: &mut Frame, area: Rect) {
        let state = model.state();
        let mut spans = Vec::new();

        let editing = model.cmd_input();
        let (label, text) = match editing {
            Some((CMDMode::Search, input)) => ("Search: ", input.input.as_str()),
            Some((CMDMode::FilterColumn, input)) => ("Filter: ", input.input.as_str()),
            None => ("Search: ", state.search_term.as_str()),
        };
        if let Some((CMDMode::FilterColumn, _)) = editing {
            spans.push(Span::from(model.filter_field().unwrap_or_default()).yellow());
            spans.push(Span::from(" "));
        }
        spans.push(Span::from(label).bold());
        let text_start = spans.iter().map(|s| s.width()).sum::<usize>();
        spans.push(Span::from(text.to_string()));

        for (field, filter) in state.column_filters.iter() {
            spans.push(Span::from("  "));
            spans.push(Span::from(format!("{field}~{filter}")).yellow());
        }

        frame.render_widget(
            Paragraph::new(Line::from(spans)).block(Block::bordered()),
            area,
        );

        if let Some((_, input)) = editing {
            let before_curser: String = input.input.chars().take(input.curser_pos).collect();
            let offset = text_start + Span::from(before_curser).width();
            let x = area.x + 1 + offset.min(area.width.saturating_sub(3) as usize) as u16;
            frame.set_cursor_position(Position::new(x, area.y + 1));
        }
    }

    fn draw_rows(
        &mut self,
        model: &Model,
        dataset: &Dataset,
        view: &DerivedView,
        frame: &mut Frame,
        area: Rect,
    ) {
        let (curser_row, curser_column) = model.curser();
        let image_field = model.config().image_field.as_str();
        let fields = dataset.schema().fields();

        let header = Row::new(fields.iter().enumerate().map(|(idx, name)| {
            let mut title = name.clone();
            if let Some(sort) = view.sort.as_ref().filter(|s| &s.key == name) {
                title.push(' ');
                title.push_str(sort.direction.arrow());
            }
            let mut style = Style::default().add_modifier(Modifier::BOLD);
            if idx == curser_column {
                style = style.add_modifier(Modifier::UNDERLINED).fg(Color::Yellow);
            }
            Cell::from(title).style(style)
        }));

        let rows = view.visible().iter().filter_map(|&idx| dataset.get(idx)).map(|record| {
            Row::new(fields.iter().enumerate().map(|(cidx, name)| {
                if name == image_field {
                    match record.image_ref(image_field) {
                        Some(_) => Cell::from("image").fg(Color::Cyan),
                        None => Cell::from(NO_IMAGE).fg(Color::DarkGray),
                    }
                } else {
                    Cell::from(record.value(cidx).to_string())
                }
            }))
        });

        let widths = vec![Constraint::Fill(1); fields.len()];
        let table = Table::new(rows, widths)
            .header(header)
            .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol("> ")
            .block(Block::bordered());

        self.table_state.select(Some(curser_row));
        frame.render_stateful_widget(table, area, &mut self.table_state);
    }

    fn draw_statusline(model: &Model, view: &DerivedView, frame: &mut Frame, area: Rect) {
        let total = model.dataset().map(|ds| ds.len()).unwrap_or(0);
        let mut spans = vec![
            Span::from(format!("Page {} of {}", view.page, view.total_pages)).bold(),
            Span::from(format!(" | {} of {} records", view.rows.len(), total)),
            Span::from(format!(" | {} per page", view.page_size)),
        ];
        if !view.has_previous() {
            spans.push(Span::from(" | first").dark_gray());
        }
        if !view.has_next() {
            spans.push(Span::from(" | last").dark_gray());
        }
        let (message, updated) = model.status_message();
        if updated.elapsed() < STATUS_MESSAGE_TIMEOUT && !message.is_empty() {
            spans.push(Span::from(format!(" | {message}")).italic());
        }
        spans.push(Span::from(" | ? help").dark_gray());
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn draw_record(model: &Model, record: &Record, frame: &mut Frame) {
        let image_field = model.config().image_field.as_str();
        let mut lines: Vec<Line> = record
            .fields()
            .filter(|(name, _)| *name != image_field)
            .map(|(name, value)| Line::from(vec![Span::from(format!("{name}: ")).bold(), value.into()]))
            .collect();
        lines.push(Line::from(""));
        lines.push(match record.image_ref(image_field) {
            Some(url) => Line::from(vec!["Image: ".bold(), Span::from(url).cyan()]),
            None => Line::from("No image available".dark_gray()),
        });

        let title = format!(" {} ", model.record_title(record));
        let area = popup_area(frame.area(), 70, 60);
        frame.render_widget(Clear, area);
        frame.render_widget(
            Paragraph::new(lines)
                .wrap(Wrap { trim: false })
                .block(
                    Block::bordered()
                        .title(Line::from(title.bold()).centered())
                        .title_bottom(Line::from(" Esc close | y copy ").centered()),
                ),
            area,
        );
    }

    fn draw_help(frame: &mut Frame) {
        let area = popup_area(frame.area(), 60, 70);
        frame.render_widget(Clear, area);
        frame.render_widget(
            Paragraph::new(HELP_TEXT).block(Block::bordered().title(" Help ")),
            area,
        );
    }
}

fn popup_area(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let width = (area.width as u32 * percent_x as u32 / 100) as u16;
    let height = (area.height as u32 * percent_y as u32 / 100) as u16;
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Message, TableConfig, TableError};
    use crate::record::parse;
    use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use ratatui::{Terminal, backend::TestBackend};

    fn render(model: &Model) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        let mut ui = TableUI::new();
        terminal.draw(|f| ui.draw(model, f)).unwrap();
        let buffer = terminal.backend().buffer();
        buffer
            .content()
            .chunks(buffer.area.width as usize)
            .map(|line| line.iter().map(|c| c.symbol()).collect::<String>())
            .collect::<Vec<String>>()
            .join("\n")
    }

    fn ready() -> Model {
        let mut model = Model::init(&TableConfig::default().with_source("stations.csv"));
        model.update(Message::Loaded(Ok(parse(include_str!(
            "../tests/fixtures/stations.csv"
        )))));
        model
    }

    #[test]
    fn popup_is_centered() {
        let area = Rect::new(0, 0, 100, 50);
        assert_eq!(popup_area(area, 50, 50), Rect::new(25, 12, 50, 25));
    }

    #[test]
    fn renders_loading_and_failure() {
        let mut model = Model::init(&TableConfig::default().with_source("stations.csv"));
        assert!(render(&model).contains("Loading stations.csv"));
        model.update(Message::Loaded(Err(TableError::FileNotFound)));
        let screen = render(&model);
        assert!(screen.contains("Unable to load data"));
        assert!(screen.contains("File not found"));
    }

    #[test]
    fn renders_page_and_image_fallback() {
        let mut model = ready();
        model.request_sort("StationEN");
        let screen = render(&model);
        assert!(screen.contains("StationEN ↑"));
        assert!(screen.contains("Page 1 of 2"));
        assert!(screen.contains(NO_IMAGE));
        assert!(screen.contains("Akihabara"));
    }

    #[test]
    fn renders_no_results() {
        let mut model = ready();
        model.set_search_term("osaka");
        let screen = render(&model);
        assert!(screen.contains("No results"));
        assert!(screen.contains("Page 1 of 1"));
    }

    #[test]
    fn curser_follows_wide_characters() {
        let mut model = ready();
        model.update(Message::Search);
        for c in "東京".chars() {
            model.update(Message::RawKey(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)));
        }
        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        let mut ui = TableUI::new();
        terminal.draw(|f| ui.draw(&model, f)).unwrap();
        // Border, "Search: " and two double width characters
        assert_eq!(
            terminal.get_cursor_position().unwrap(),
            Position::new(1 + 8 + 4, 1)
        );
    }

    #[test]
    fn renders_detail_overlay() {
        let mut model = ready();
        model.update(Message::MoveDown);
        model.update(Message::Enter);
        let screen = render(&model);
        assert!(screen.contains("Shibuya"));
        assert!(screen.contains("No image available"));
    }
}
