//! Key routing for the queue dashboard.
//!
//! Resolution is pure: a key plus the current input mode maps to at most one
//! [`InputAction`]. The dashboard loop owns all side effects.

#![allow(missing_docs)]

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::queue::scheduler::JobAction;

/// What the keyboard is currently driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// Table navigation and single-key commands.
    #[default]
    Normal,
    /// Typing a filter pattern after `/`.
    EditPattern,
    /// Waiting for y/n before a bulk action.
    Confirm(JobAction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    Quit,
    ScrollUp,
    ScrollDown,
    PageUp,
    PageDown,
    JumpTop,
    JumpBottom,
    /// Apply to the selected job.
    Act(JobAction),
    /// Apply to every job in the snapshot.
    ActAll(JobAction),
    Refresh,
    CycleAttribute,
    BeginPatternEdit,
    PatternInput(char),
    PatternBackspace,
    PatternApply,
    PatternCancel,
    Confirm,
    Cancel,
}

/// Map `key` to an action under `mode`. Key releases and unbound keys yield `None`.
#[must_use]
pub fn resolve_key_event(key: &KeyEvent, mode: InputMode) -> Option<InputAction> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(InputAction::Quit);
    }
    match mode {
        InputMode::Normal => resolve_normal_key(key),
        InputMode::EditPattern => resolve_pattern_key(key),
        InputMode::Confirm(_) => resolve_confirm_key(key),
    }
}

fn resolve_normal_key(key: &KeyEvent) -> Option<InputAction> {
    let action = match key.code {
        KeyCode::Char('q') | KeyCode::Esc => InputAction::Quit,
        KeyCode::Up => InputAction::ScrollUp,
        KeyCode::Down => InputAction::ScrollDown,
        KeyCode::PageUp => InputAction::PageUp,
        KeyCode::PageDown => InputAction::PageDown,
        KeyCode::Home => InputAction::JumpTop,
        KeyCode::End => InputAction::JumpBottom,
        KeyCode::Char('h') => InputAction::Act(JobAction::Hold),
        KeyCode::Char('r') => InputAction::Act(JobAction::Release),
        KeyCode::Char('k') => InputAction::Act(JobAction::Kill),
        KeyCode::Char('H') => InputAction::ActAll(JobAction::Hold),
        KeyCode::Char('R') => InputAction::ActAll(JobAction::Release),
        KeyCode::Char('K') => InputAction::ActAll(JobAction::Kill),
        KeyCode::Char('u') => InputAction::Refresh,
        KeyCode::Char('f') | KeyCode::Tab => InputAction::CycleAttribute,
        KeyCode::Char('/') => InputAction::BeginPatternEdit,
        _ => return None,
    };
    Some(action)
}

fn resolve_pattern_key(key: &KeyEvent) -> Option<InputAction> {
    match key.code {
        KeyCode::Enter => Some(InputAction::PatternApply),
        KeyCode::Esc => Some(InputAction::PatternCancel),
        KeyCode::Backspace => Some(InputAction::PatternBackspace),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(InputAction::PatternInput(c))
        }
        _ => None,
    }
}

fn resolve_confirm_key(key: &KeyEvent) -> Option<InputAction> {
    match key.code {
        KeyCode::Char('y' | 'Y') | KeyCode::Enter => Some(InputAction::Confirm),
        KeyCode::Char('n' | 'N' | 'q') | KeyCode::Esc => Some(InputAction::Cancel),
        _ => None,
    }
}

/// Footer help for `mode`: `(keys, description)` pairs.
#[must_use]
pub const fn help_bindings(mode: InputMode) -> &'static [(&'static str, &'static str)] {
    match mode {
        InputMode::Normal => &NORMAL_HELP,
        InputMode::EditPattern => &PATTERN_HELP,
        InputMode::Confirm(_) => &CONFIRM_HELP,
    }
}

const NORMAL_HELP: [(&str, &str); 7] = [
    ("↑↓", "select"),
    ("h/r/k", "hold/release/kill"),
    ("H/R/K", "all jobs"),
    ("u", "refresh"),
    ("f", "attribute"),
    ("/", "pattern"),
    ("q", "quit"),
];

const PATTERN_HELP: [(&str, &str); 2] = [("Enter", "apply"), ("Esc", "cancel")];

const CONFIRM_HELP: [(&str, &str); 2] = [("y", "confirm"), ("n", "cancel")];

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    #[test]
    fn lowercase_acts_on_selection_uppercase_on_all() {
        let normal = InputMode::Normal;
        assert_eq!(
            resolve_key_event(&press(KeyCode::Char('k')), normal),
            Some(InputAction::Act(JobAction::Kill))
        );
        assert_eq!(
            resolve_key_event(&press(KeyCode::Char('K')), normal),
            Some(InputAction::ActAll(JobAction::Kill))
        );
        assert_eq!(
            resolve_key_event(&press(KeyCode::Char('h')), normal),
            Some(InputAction::Act(JobAction::Hold))
        );
        assert_eq!(
            resolve_key_event(&press(KeyCode::Char('R')), normal),
            Some(InputAction::ActAll(JobAction::Release))
        );
        assert_eq!(
            resolve_key_event(&press(KeyCode::Char('u')), normal),
            Some(InputAction::Refresh)
        );
    }

    #[test]
    fn ctrl_c_quits_in_every_mode() {
        for mode in [
            InputMode::Normal,
            InputMode::EditPattern,
            InputMode::Confirm(JobAction::Kill),
        ] {
            assert_eq!(resolve_key_event(&ctrl('c'), mode), Some(InputAction::Quit));
        }
    }

    #[test]
    fn pattern_mode_captures_command_letters() {
        let mode = InputMode::EditPattern;
        assert_eq!(
            resolve_key_event(&press(KeyCode::Char('q')), mode),
            Some(InputAction::PatternInput('q'))
        );
        assert_eq!(
            resolve_key_event(&press(KeyCode::Char('K')), mode),
            Some(InputAction::PatternInput('K'))
        );
        assert_eq!(
            resolve_key_event(&press(KeyCode::Esc), mode),
            Some(InputAction::PatternCancel)
        );
        assert_eq!(
            resolve_key_event(&press(KeyCode::Enter), mode),
            Some(InputAction::PatternApply)
        );
    }

    #[test]
    fn confirm_mode_only_accepts_yes_or_no() {
        let mode = InputMode::Confirm(JobAction::Hold);
        assert_eq!(
            resolve_key_event(&press(KeyCode::Char('y')), mode),
            Some(InputAction::Confirm)
        );
        assert_eq!(
            resolve_key_event(&press(KeyCode::Esc), mode),
            Some(InputAction::Cancel)
        );
        assert_eq!(resolve_key_event(&press(KeyCode::Char('k')), mode), None);
    }

    #[test]
    fn key_release_is_ignored() {
        let mut key = press(KeyCode::Char('q'));
        key.kind = KeyEventKind::Release;
        assert_eq!(resolve_key_event(&key, InputMode::Normal), None);
    }

    #[test]
    fn every_mode_has_help() {
        assert!(!help_bindings(InputMode::Normal).is_empty());
        assert!(!help_bindings(InputMode::EditPattern).is_empty());
        assert!(!help_bindings(InputMode::Confirm(JobAction::Kill)).is_empty());
    }
}
