//! Application state for the TUI.
//!
//! Contains the main App struct and related types for managing UI state.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::editor::Editor;
use super::widgets::spinner::Spinner;
use crate::error::Result;
use crate::loader::load_from_str;
use crate::pipeline::Analysis;
use crate::report;

/// Lines moved by PageUp/PageDown.
const PAGE_SIZE: u16 = 10;

/// Which pane currently has focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    Editor,
    Plan,
    Pipe,
}

impl Focus {
    /// Cycles to the next pane.
    pub fn next(self) -> Self {
        match self {
            Self::Editor => Self::Plan,
            Self::Plan => Self::Pipe,
            Self::Pipe => Self::Editor,
        }
    }
}

/// What the status line reports.
#[derive(Debug, Clone)]
pub enum Status {
    Idle,
    Running(Spinner),
    Ok(String),
    Error(String),
}

/// Work the event loop must carry out for a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Analyze these statements.
    Submit(Vec<String>),
    Quit,
}

/// Main application state.
pub struct App {
    /// Whether the application is still running.
    pub running: bool,
    pub focus: Focus,
    pub editor: Editor,
    /// Contents of the "Query Execution Plan" pane.
    pub plan_text: String,
    /// Contents of the "Pipe Syntax Version" pane.
    pub pipe_text: String,
    pub plan_scroll: u16,
    pub pipe_scroll: u16,
    pub status: Status,
    /// Database connection info for display.
    pub connection_info: String,
}

impl App {
    pub fn new(connection_info: impl Into<String>) -> Self {
        Self {
            running: true,
            focus: Focus::default(),
            editor: Editor::new(),
            plan_text: String::new(),
            pipe_text: String::new(),
            plan_scroll: 0,
            pipe_scroll: 0,
            status: Status::Idle,
            connection_info: connection_info.into(),
        }
    }

    pub fn is_running_analysis(&self) -> bool {
        matches!(self.status, Status::Running(_))
    }

    /// Spinner to animate, while an analysis runs.
    pub fn spinner(&self) -> Option<&Spinner> {
        match &self.status {
            Status::Running(spinner) => Some(spinner),
            _ => None,
        }
    }

    /// Handles a key press, returning work for the event loop if any.
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => return Some(self.quit()),
            KeyCode::Char('c' | 'q') if ctrl => return Some(self.quit()),
            KeyCode::Char('r') if ctrl => return self.submit(),
            KeyCode::F(5) => return self.submit(),
            KeyCode::Tab => {
                self.focus = self.focus.next();
                return None;
            }
            _ => {}
        }

        match self.focus {
            Focus::Editor => self.edit(key),
            Focus::Plan | Focus::Pipe => self.scroll(key.code),
        }
        None
    }

    fn quit(&mut self) -> Action {
        self.running = false;
        Action::Quit
    }

    fn edit(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.editor.insert(c)
            }
            KeyCode::Enter => self.editor.newline(),
            KeyCode::Backspace => self.editor.backspace(),
            KeyCode::Delete => self.editor.delete(),
            KeyCode::Left => self.editor.move_left(),
            KeyCode::Right => self.editor.move_right(),
            KeyCode::Up => self.editor.move_up(),
            KeyCode::Down => self.editor.move_down(),
            KeyCode::Home => self.editor.move_home(),
            KeyCode::End => self.editor.move_end(),
            _ => {}
        }
    }

    fn scroll(&mut self, code: KeyCode) {
        let offset = match self.focus {
            Focus::Plan => &mut self.plan_scroll,
            Focus::Pipe => &mut self.pipe_scroll,
            Focus::Editor => return,
        };
        match code {
            KeyCode::Up => *offset = offset.saturating_sub(1),
            KeyCode::Down => *offset = offset.saturating_add(1),
            KeyCode::PageUp => *offset = offset.saturating_sub(PAGE_SIZE),
            KeyCode::PageDown => *offset = offset.saturating_add(PAGE_SIZE),
            KeyCode::Home => *offset = 0,
            _ => {}
        }
    }

    /// Starts an analysis of the editor contents, unless one is running.
    fn submit(&mut self) -> Option<Action> {
        if self.is_running_analysis() {
            // Status keeps showing the spinner; the log records the ignored submit
            tracing::info!("Ignoring submit while an analysis is running");
            return None;
        }

        let statements = load_from_str(&self.editor.text());
        if statements.is_empty() {
            self.status = Status::Error("No SQL input provided.".to_string());
            return None;
        }

        self.status = Status::Running(Spinner::analyzing());
        Some(Action::Submit(statements))
    }

    /// Shows the outcome of an analysis in the output panes.
    pub fn apply_results(&mut self, results: Vec<Result<Analysis>>) {
        let numbered = results.len() > 1;
        let mut plans = Vec::new();
        let mut pipes = Vec::new();
        let mut failures = Vec::new();

        for (i, result) in results.iter().enumerate() {
            let heading = if numbered {
                format!("-- Statement {}\n", i + 1)
            } else {
                String::new()
            };
            match result {
                Ok(analysis) => {
                    plans.push(format!(
                        "{heading}{}",
                        report::plan_section(&analysis.explain)
                    ));
                    pipes.push(format!("{heading}{}", analysis.pipe_syntax));
                }
                Err(e) => {
                    plans.push(format!("{heading}{e}"));
                    pipes.push(format!("{heading}-- no translation"));
                    failures.push(e.to_string());
                }
            }
        }

        self.plan_text = plans.join("\n\n");
        self.pipe_text = pipes.join("\n\n");
        self.plan_scroll = 0;
        self.pipe_scroll = 0;

        let total = results.len();
        self.status = match failures.first() {
            None => Status::Ok(format!(
                "Analyzed {total} statement{}",
                if total == 1 { "" } else { "s" }
            )),
            Some(first) if failures.len() == total => Status::Error(first.clone()),
            Some(first) => Status::Error(format!(
                "{} of {total} statements failed: {first}",
                failures.len()
            )),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SqlPipeError;
    use crate::plan::Explain;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            let code = if c == '\n' {
                KeyCode::Enter
            } else {
                KeyCode::Char(c)
            };
            app.handle_key(key(code));
        }
    }

    fn analysis() -> Analysis {
        let explain = Explain::from_json_str(
            r#"{"Plan": {"Node Type": "Seq Scan", "Relation Name": "nation", "Alias": "nation"}, "Execution Time": 0.1}"#,
        )
        .unwrap();
        Analysis {
            sql: "SELECT * FROM nation".to_string(),
            classification: crate::safety::check_explainable("SELECT * FROM nation").unwrap(),
            steps: Vec::new(),
            pipe: Default::default(),
            pipe_syntax: "FROM nation".to_string(),
            graph: crate::graph::PlanGraph::from_plan(&explain.plan),
            explain,
        }
    }

    #[test]
    fn test_focus_cycles() {
        let mut app = App::new("test");
        assert_eq!(app.focus, Focus::Editor);
        app.handle_key(key(KeyCode::Tab));
        assert_eq!(app.focus, Focus::Plan);
        app.handle_key(key(KeyCode::Tab));
        assert_eq!(app.focus, Focus::Pipe);
        app.handle_key(key(KeyCode::Tab));
        assert_eq!(app.focus, Focus::Editor);
    }

    #[test]
    fn test_typing_goes_to_editor() {
        let mut app = App::new("test");
        type_text(&mut app, "SELECT 1\nFROM t");
        assert_eq!(app.editor.text(), "SELECT 1\nFROM t");
    }

    #[test]
    fn test_submit_empty_editor_reports_error() {
        let mut app = App::new("test");
        assert_eq!(app.handle_key(key(KeyCode::F(5))), None);
        assert!(matches!(&app.status, Status::Error(msg) if msg == "No SQL input provided."));
    }

    #[test]
    fn test_submit_splits_statements() {
        let mut app = App::new("test");
        type_text(&mut app, "SELECT 1; SELECT 2;");
        let action = app.handle_key(ctrl('r'));
        assert_eq!(
            action,
            Some(Action::Submit(vec![
                "SELECT 1".to_string(),
                "SELECT 2".to_string()
            ]))
        );
        assert!(app.is_running_analysis());
        assert!(app.spinner().is_some());
    }

    #[test]
    fn test_second_submit_is_ignored_while_running() {
        let mut app = App::new("test");
        type_text(&mut app, "SELECT 1");
        assert!(app.handle_key(key(KeyCode::F(5))).is_some());
        assert_eq!(app.handle_key(key(KeyCode::F(5))), None);
        assert!(app.is_running_analysis());
    }

    #[test]
    fn test_quit_keys() {
        for event in [key(KeyCode::Esc), ctrl('c'), ctrl('q')] {
            let mut app = App::new("test");
            assert_eq!(app.handle_key(event), Some(Action::Quit));
            assert!(!app.running);
        }
    }

    #[test]
    fn test_scroll_focused_pane() {
        let mut app = App::new("test");
        app.handle_key(key(KeyCode::Tab));
        app.handle_key(key(KeyCode::PageDown));
        app.handle_key(key(KeyCode::Down));
        assert_eq!(app.plan_scroll, 11);
        app.handle_key(key(KeyCode::Up));
        assert_eq!(app.plan_scroll, 10);
        assert_eq!(app.pipe_scroll, 0);

        app.handle_key(key(KeyCode::Tab));
        app.handle_key(key(KeyCode::PageUp));
        assert_eq!(app.pipe_scroll, 0);
    }

    #[test]
    fn test_apply_results_success() {
        let mut app = App::new("test");
        app.plan_scroll = 5;
        app.apply_results(vec![Ok(analysis())]);

        assert!(app.plan_text.starts_with("-- Query Execution Plan"));
        assert!(app.plan_text.contains("Seq Scan on nation"));
        assert_eq!(app.pipe_text, "FROM nation");
        assert_eq!(app.plan_scroll, 0);
        assert!(matches!(&app.status, Status::Ok(msg) if msg == "Analyzed 1 statement"));
    }

    #[test]
    fn test_apply_results_partial_failure() {
        let mut app = App::new("test");
        app.apply_results(vec![
            Ok(analysis()),
            Err(SqlPipeError::query("relation \"x\" does not exist")),
        ]);

        assert!(app.pipe_text.starts_with("-- Statement 1\nFROM nation"));
        assert!(app.plan_text.contains("-- Statement 2\nQuery error"));
        assert!(matches!(&app.status, Status::Error(msg) if msg.starts_with("1 of 2 statements failed")));
    }
}
