use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Foreground commands, one per key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    PauseToggle,
    Next,
    Previous,
    List,
    Stop,
    Quit,
}

impl Command {
    /// Map a key press; unknown keys are ignored.
    pub fn from_key(key: &KeyEvent) -> Option<Self> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') | KeyCode::Char('C') => Some(Self::Quit),
                _ => None,
            };
        }
        match key.code {
            KeyCode::Char(' ') => Some(Self::PauseToggle),
            KeyCode::Char('n') | KeyCode::Char('N') => Some(Self::Next),
            KeyCode::Char('p') | KeyCode::Char('P') => Some(Self::Previous),
            KeyCode::Char('l') | KeyCode::Char('L') => Some(Self::List),
            KeyCode::Char('s') | KeyCode::Char('S') => Some(Self::Stop),
            KeyCode::Char('q') | KeyCode::Char('Q') => Some(Self::Quit),
            _ => None,
        }
    }
}
