//! Interactive workbench.
//!
//! A SQL editor beside the "Query Execution Plan" and "Pipe Syntax Version"
//! panes. Analyses run on a tokio task and report back over a channel.

pub mod app;
pub mod editor;
pub mod events;
mod ui;
pub mod widgets;

pub use app::App;
pub use events::{Event, EventHandler};

use crate::error::{Result, SqlPipeError};
use crate::pipeline::{Analysis, Pipeline};
use app::Action;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Stdout};
use std::panic;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Messages sent from analysis tasks to the main loop.
#[derive(Debug)]
pub enum AsyncMessage {
    AnalysisFinished(Vec<Result<Analysis>>),
}

/// The main TUI application runner.
pub struct Tui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    event_handler: EventHandler,
}

impl Tui {
    /// Creates a new TUI instance, initializing the terminal.
    pub fn new() -> Result<Self> {
        Ok(Self {
            terminal: Self::setup_terminal()?,
            event_handler: EventHandler::new(),
        })
    }

    /// Sets up the terminal for TUI rendering.
    fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
        enable_raw_mode()
            .map_err(|e| SqlPipeError::internal(format!("Failed to enable raw mode: {e}")))?;

        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen).map_err(|e| {
            SqlPipeError::internal(format!("Failed to enter alternate screen: {e}"))
        })?;

        Terminal::new(CrosstermBackend::new(stdout))
            .map_err(|e| SqlPipeError::internal(format!("Failed to create terminal: {e}")))
    }

    /// Restores the terminal to its original state.
    fn restore_terminal(&mut self) -> Result<()> {
        disable_raw_mode()
            .map_err(|e| SqlPipeError::internal(format!("Failed to disable raw mode: {e}")))?;

        execute!(self.terminal.backend_mut(), LeaveAlternateScreen).map_err(|e| {
            SqlPipeError::internal(format!("Failed to leave alternate screen: {e}"))
        })?;

        self.terminal
            .show_cursor()
            .map_err(|e| SqlPipeError::internal(format!("Failed to show cursor: {e}")))
    }

    /// Runs the workbench until the user quits.
    pub async fn run(
        &mut self,
        pipeline: Pipeline,
        connection_info: String,
        initial_sql: Option<String>,
    ) -> Result<()> {
        // Restore the terminal on panic
        let original_hook = panic::take_hook();
        panic::set_hook(Box::new(move |panic_info| {
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen);
            original_hook(panic_info);
        }));

        let pipeline = Arc::new(pipeline);
        let mut app_state = App::new(connection_info);
        if let Some(sql) = initial_sql {
            app_state.editor = editor::Editor::with_text(sql.trim_end());
        }
        let (tx, mut rx) = mpsc::channel::<AsyncMessage>(8);

        let result = self
            .run_event_loop(&mut app_state, &pipeline, tx, &mut rx)
            .await;

        if let Err(e) = pipeline.close().await {
            warn!("Error closing database connection: {}", e);
        }

        let _ = panic::take_hook();
        result
    }

    async fn run_event_loop(
        &mut self,
        app_state: &mut App,
        pipeline: &Arc<Pipeline>,
        tx: mpsc::Sender<AsyncMessage>,
        rx: &mut mpsc::Receiver<AsyncMessage>,
    ) -> Result<()> {
        while app_state.running {
            while let Ok(msg) = rx.try_recv() {
                match msg {
                    AsyncMessage::AnalysisFinished(results) => app_state.apply_results(results),
                }
            }

            self.terminal
                .draw(|frame| ui::render(frame, app_state))
                .map_err(|e| SqlPipeError::internal(format!("Failed to draw: {e}")))?;

            let Event::Key(key) = self.event_handler.next().await? else {
                continue;
            };
            if let Some(Action::Submit(statements)) = app_state.handle_key(key) {
                info!("Analyzing {} statement(s)", statements.len());
                spawn_analysis(Arc::clone(pipeline), statements, tx.clone());
            }
        }
        Ok(())
    }
}

impl Drop for Tui {
    fn drop(&mut self) {
        let _ = self.restore_terminal();
    }
}

fn spawn_analysis(
    pipeline: Arc<Pipeline>,
    statements: Vec<String>,
    tx: mpsc::Sender<AsyncMessage>,
) {
    tokio::spawn(async move {
        let results = pipeline.analyze_all(&statements).await;
        if tx
            .send(AsyncMessage::AnalysisFinished(results))
            .await
            .is_err()
        {
            // The workbench quit while the analysis ran
            info!("Dropping analysis result after shutdown");
        }
    });
}

/// Runs the workbench, optionally with SQL already in the editor.
pub async fn run(
    pipeline: Pipeline,
    connection_info: String,
    initial_sql: Option<String>,
) -> Result<()> {
    let mut tui = Tui::new()?;
    tui.run(pipeline, connection_info, initial_sql).await
}
