use std::time::Duration;
use tracing::trace;

use crate::domain::{Message, TableConfig, TableError};
use crate::model::Model;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyModifiers};

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &TableConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    pub fn handle_event(&self, model: &Model) -> Result<Option<Message>, TableError> {
        if event::poll(Duration::from_millis(self.event_poll_time))?
            && let Event::Key(key) = event::read()?
            && key.kind == event::KeyEventKind::Press
        {
            return Ok(Self::map_key(key, model.raw_keyevents()));
        }
        Ok(None)
    }

    // While text is typed keys go to the input, only Ctrl+C still quits.
    fn map_key(key: event::KeyEvent, raw: bool) -> Option<Message> {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Some(Message::Quit);
        }
        if raw {
            return Some(Message::RawKey(key));
        }
        Self::handle_key(key)
    }

    fn handle_key(key: event::KeyEvent) -> Option<Message> {
        let message = match (key.code, key.modifiers) {
            (KeyCode::Char('q'), _) => Some(Message::Quit),
            (KeyCode::Char('?'), _) => Some(Message::Help),
            (KeyCode::Char('/'), _) => Some(Message::Search),
            (KeyCode::Char('f'), _) => Some(Message::FilterColumn),
            (KeyCode::Char('s'), _) => Some(Message::Sort),
            (KeyCode::Char('y'), _) => Some(Message::CopyRecord),
            (KeyCode::Char('n'), _) | (KeyCode::PageDown, _) => Some(Message::NextPage),
            (KeyCode::Char('p'), _) | (KeyCode::PageUp, _) => Some(Message::PreviousPage),
            (KeyCode::Home, _) => Some(Message::FirstPage),
            (KeyCode::End, _) => Some(Message::LastPage),
            (KeyCode::Char('+'), _) => Some(Message::GrowPageSize),
            (KeyCode::Char('-'), _) => Some(Message::ShrinkPageSize),
            (KeyCode::Up, _) | (KeyCode::Char('k'), _) => Some(Message::MoveUp),
            (KeyCode::Down, _) | (KeyCode::Char('j'), _) => Some(Message::MoveDown),
            (KeyCode::Left, _) | (KeyCode::Char('h'), _) => Some(Message::MoveLeft),
            (KeyCode::Right, _) | (KeyCode::Char('l'), _) => Some(Message::MoveRight),
            (KeyCode::Enter, _) => Some(Message::Enter),
            (KeyCode::Esc, _) => Some(Message::Exit),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyEvent;

    fn map(code: KeyCode) -> Option<Message> {
        Controller::handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn maps_navigation_keys() {
        assert!(matches!(map(KeyCode::Char('q')), Some(Message::Quit)));
        assert!(matches!(map(KeyCode::PageDown), Some(Message::NextPage)));
        assert!(matches!(map(KeyCode::Char('p')), Some(Message::PreviousPage)));
        assert!(matches!(map(KeyCode::Char('s')), Some(Message::Sort)));
        assert!(matches!(map(KeyCode::Enter), Some(Message::Enter)));
        assert!(matches!(map(KeyCode::Esc), Some(Message::Exit)));
        assert!(map(KeyCode::Char('z')).is_none());
    }

    #[test]
    fn ctrl_c_quits() {
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(matches!(Controller::map_key(key, false), Some(Message::Quit)));
        assert!(matches!(Controller::map_key(key, true), Some(Message::Quit)));
    }

    #[test]
    fn raw_mode_forwards_keys() {
        let key = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE);
        assert!(matches!(Controller::map_key(key, true), Some(Message::RawKey(_))));
        assert!(matches!(Controller::map_key(key, false), Some(Message::Quit)));
    }
}
