//! Key bindings.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use super::{Command, Direction, Scroll};

/// The parts of dashboard state a binding depends on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyContext {
    pub in_logs: bool,
    pub child_focus: bool,
}

pub fn command_for(key: KeyEvent, context: KeyContext) -> Option<Command> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(Command::Quit);
    }

    if context.in_logs {
        return match key.code {
            KeyCode::Char('q') | KeyCode::Esc => Some(Command::CloseLogs),
            KeyCode::Up | KeyCode::Char('k') => Some(Command::Scroll(Scroll::Up)),
            KeyCode::Down | KeyCode::Char('j') => Some(Command::Scroll(Scroll::Down)),
            KeyCode::PageUp => Some(Command::Scroll(Scroll::PageUp)),
            KeyCode::PageDown | KeyCode::Char(' ') => Some(Command::Scroll(Scroll::PageDown)),
            KeyCode::Home | KeyCode::Char('g') => Some(Command::Scroll(Scroll::Top)),
            KeyCode::End | KeyCode::Char('G') => Some(Command::Scroll(Scroll::Bottom)),
            _ => None,
        };
    }

    match key.code {
        KeyCode::Up | KeyCode::Char('k') => Some(Command::Navigate(Direction::Up)),
        KeyCode::Down | KeyCode::Char('j') => Some(Command::Navigate(Direction::Down)),
        KeyCode::Enter | KeyCode::Right => Some(Command::Open),
        KeyCode::Esc | KeyCode::Left if context.child_focus => Some(Command::Back),
        KeyCode::Tab => Some(Command::ToggleFocus),
        KeyCode::Char(' ') => Some(Command::ToggleExpand),
        KeyCode::Char('r') => Some(Command::RetryFocused),
        KeyCode::Char('c') => Some(Command::CancelFocused),
        KeyCode::Char('l') => Some(Command::ViewLogsFocused),
        KeyCode::Char('q') => Some(Command::Quit),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    const DASHBOARD: KeyContext = KeyContext {
        in_logs: false,
        child_focus: false,
    };
    const JOBS: KeyContext = KeyContext {
        in_logs: false,
        child_focus: true,
    };
    const LOGS: KeyContext = KeyContext {
        in_logs: true,
        child_focus: true,
    };

    #[test]
    fn test_navigation_keys() {
        for code in [KeyCode::Up, KeyCode::Char('k')] {
            assert_eq!(
                command_for(press(code), DASHBOARD),
                Some(Command::Navigate(Direction::Up))
            );
        }
        for code in [KeyCode::Down, KeyCode::Char('j')] {
            assert_eq!(
                command_for(press(code), JOBS),
                Some(Command::Navigate(Direction::Down))
            );
        }
    }

    #[test]
    fn test_action_keys() {
        assert_eq!(command_for(press(KeyCode::Char('r')), JOBS), Some(Command::RetryFocused));
        assert_eq!(command_for(press(KeyCode::Char('c')), JOBS), Some(Command::CancelFocused));
        assert_eq!(command_for(press(KeyCode::Char('l')), JOBS), Some(Command::ViewLogsFocused));
        assert_eq!(command_for(press(KeyCode::Tab), DASHBOARD), Some(Command::ToggleFocus));
        assert_eq!(command_for(press(KeyCode::Char(' ')), DASHBOARD), Some(Command::ToggleExpand));
        assert_eq!(command_for(press(KeyCode::Enter), DASHBOARD), Some(Command::Open));
    }

    #[test]
    fn test_escape_only_leaves_job_focus() {
        assert_eq!(command_for(press(KeyCode::Esc), JOBS), Some(Command::Back));
        assert_eq!(command_for(press(KeyCode::Esc), DASHBOARD), None);
    }

    #[test]
    fn test_log_view_keys() {
        assert_eq!(command_for(press(KeyCode::Char('q')), LOGS), Some(Command::CloseLogs));
        assert_eq!(command_for(press(KeyCode::Esc), LOGS), Some(Command::CloseLogs));
        assert_eq!(
            command_for(press(KeyCode::PageDown), LOGS),
            Some(Command::Scroll(Scroll::PageDown))
        );
        assert_eq!(command_for(press(KeyCode::Char('r')), LOGS), None);
    }

    #[test]
    fn test_ctrl_c_quits_everywhere() {
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(command_for(key, DASHBOARD), Some(Command::Quit));
        assert_eq!(command_for(key, LOGS), Some(Command::Quit));
    }

    #[test]
    fn test_release_events_are_ignored() {
        let mut key = press(KeyCode::Char('q'));
        key.kind = KeyEventKind::Release;
        assert_eq!(command_for(key, DASHBOARD), None);
    }
}
