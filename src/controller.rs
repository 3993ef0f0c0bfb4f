use std::time::Duration;
use tracing::trace;

use ratatui::crossterm::event::{self, Event, KeyCode, KeyModifiers};
use crate::domain::{DashConfig, Message, Page};
use crate::model::Model;

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &DashConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    pub fn handle_event(&self, _model: &Model) -> std::io::Result<Option<Message>> {
        if event::poll(Duration::from_millis(self.event_poll_time))? {
            return Ok(match event::read()? {
                Event::Key(key) if key.kind == event::KeyEventKind::Press => self.handle_key(key),
                Event::Resize(width, height) => Some(Message::Resize(width as usize, height as usize)),
                _ => None,
            });
        }
        Ok(None)
    }

    fn handle_key(&self, key: event::KeyEvent) -> Option<Message> {
        let message = match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Message::Quit),
            (KeyCode::Char('q'), _) => Some(Message::Quit),
            (KeyCode::Tab, _) => Some(Message::NextPage),
            (KeyCode::Char('1'), _) => Some(Message::GoToPage(Page::Sales)),
            (KeyCode::Char('2'), _) => Some(Message::GoToPage(Page::Inventory)),
            (KeyCode::Char('3'), _) => Some(Message::GoToPage(Page::Executive)),
            (KeyCode::Char('m'), _) => Some(Message::NextMarketingGroup),
            (KeyCode::Char('M'), _) => Some(Message::PrevMarketingGroup),
            (KeyCode::Char('c'), _) => Some(Message::NextCategory),
            (KeyCode::Char('C'), _) => Some(Message::PrevCategory),
            (KeyCode::Up, _) | (KeyCode::Char('k'), _) => Some(Message::MoveUp),
            (KeyCode::Down, _) | (KeyCode::Char('j'), _) => Some(Message::MoveDown),
            (KeyCode::PageUp, _) => Some(Message::MovePageUp),
            (KeyCode::PageDown, _) => Some(Message::MovePageDown),
            (KeyCode::Char('g'), _) => Some(Message::GenerateInsights),
            (KeyCode::Char('y'), _) => Some(Message::CopyInsights),
            (KeyCode::Char('r'), _) => Some(Message::Reload),
            (KeyCode::Char('?'), _) => Some(Message::Help),
            (KeyCode::Esc, _) => Some(Message::Exit),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}
