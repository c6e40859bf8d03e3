use std::any::Any;
use std::process::ExitCode;

use crate::cli::{NotesCommands, OutputMode};
use crate::commands::CommandHandler;
use crate::errors::AppResult;
use crate::notes::{self, NotesOutcome};
use crate::output::render_notes;

pub struct NotesHandler {
    command: NotesCommands,
    run: Box<dyn Fn(&NotesCommands) -> AppResult<NotesOutcome> + Send + Sync>,
    render: Box<dyn Fn(&NotesOutcome, OutputMode) -> AppResult<()> + Send + Sync>,
}

impl NotesHandler {
    pub fn new(command: NotesCommands) -> Self {
        Self::with_dependencies(command, notes::run_notes, render_notes)
    }

    pub fn with_dependencies(
        command: NotesCommands,
        run: impl Fn(&NotesCommands) -> AppResult<NotesOutcome> + Send + Sync + 'static,
        render: impl Fn(&NotesOutcome, OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            command,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for NotesHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let outcome = (self.run)(&self.command)?;
        (self.render)(&outcome, mode)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
