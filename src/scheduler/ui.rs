//! The UI seam: a non-blocking pump that turns user input into commands

use crate::logging::LogStats;
use crate::scripting::list_scripts;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    /// Shows where the session log is and resets the counters
    ShowLog,
    /// Opens the scripts directory
    Edit,
    Switch(String),
}

/// One menu entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub label: String,
    pub enabled: bool,
    /// `Some` for entries shown with a check mark
    pub checked: Option<bool>,
    pub command: Command,
}

impl Action {
    fn plain(label: impl Into<String>, command: Command) -> Self {
        Self {
            label: label.into(),
            enabled: true,
            checked: None,
            command,
        }
    }
}

/// Source of the action list, built only when a UI asks for it
pub struct Menu<'a> {
    pub scripts_dir: &'a Path,
    pub current: Option<&'a str>,
    pub stats: &'a LogStats,
}

impl Menu<'_> {
    pub fn actions(&self) -> Vec<Action> {
        let mut actions = vec![
            Action::plain("Quit", Command::Quit),
            Action::plain(self.stats.label(), Command::ShowLog),
            Action::plain("Edit", Command::Edit),
        ];
        actions.extend(list_scripts(self.scripts_dir).into_iter().map(|name| Action {
            checked: Some(self.current == Some(name.as_str())),
            enabled: true,
            command: Command::Switch(name.clone()),
            label: name,
        }));
        actions
    }
}

pub trait Ui {
    /// Handles pending UI events without blocking
    fn pump(&mut self, menu: &Menu<'_>) -> Vec<Command>;
}

/// No UI at all
#[derive(Debug, Default)]
pub struct HeadlessUi;

impl Ui for HeadlessUi {
    fn pump(&mut self, _menu: &Menu<'_>) -> Vec<Command> {
        Vec::new()
    }
}

/// Feeds queued commands to the scheduler, one per tick
///
/// Clones share the queue, so a test or another component can push
/// commands while the scheduler owns the UI.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    pending: Rc<RefCell<VecDeque<Command>>>,
    seen: Rc<RefCell<Vec<Action>>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, command: Command) {
        self.pending.borrow_mut().push_back(command);
    }

    /// Action list as of the last pump that carried a command
    pub fn last_actions(&self) -> Vec<Action> {
        self.seen.borrow().clone()
    }
}

impl Ui for CommandQueue {
    fn pump(&mut self, menu: &Menu<'_>) -> Vec<Command> {
        let Some(command) = self.pending.borrow_mut().pop_front() else {
            return Vec::new();
        };
        *self.seen.borrow_mut() = menu.actions();
        vec![command]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn action_list_marks_the_current_script() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.rhai"), "").unwrap();
        std::fs::write(dir.path().join("a.rhai"), "").unwrap();
        let stats = LogStats::new();
        let menu = Menu {
            scripts_dir: dir.path(),
            current: Some("b"),
            stats: &stats,
        };

        let actions = menu.actions();
        let labels: Vec<&str> = actions.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, vec!["Quit", "Log", "Edit", "a", "b"]);
        assert_eq!(actions[3].checked, Some(false));
        assert_eq!(actions[4].checked, Some(true));
        assert_eq!(actions[4].command, Command::Switch("b".into()));
        assert_eq!(actions[0].checked, None);
    }

    #[test]
    fn queue_hands_out_one_command_per_pump() {
        let stats = LogStats::new();
        let dir = TempDir::new().unwrap();
        let menu = Menu {
            scripts_dir: dir.path(),
            current: None,
            stats: &stats,
        };
        let mut queue = CommandQueue::new();
        queue.clone().push(Command::Edit);
        queue.push(Command::Quit);

        assert_eq!(queue.pump(&menu), vec![Command::Edit]);
        assert_eq!(queue.pump(&menu), vec![Command::Quit]);
        assert!(queue.pump(&menu).is_empty());
        assert_eq!(queue.last_actions().len(), 3);
    }
}
