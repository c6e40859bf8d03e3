use std::any::Any;
use std::process::ExitCode;

use crate::cli::{Commands, OutputMode};
use crate::errors::AppResult;

pub trait CommandHandler: Send + Sync {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode>;
    fn as_any(&self) -> &dyn Any;
}

mod doctor;
mod enroll;
mod notes;
mod remove;
mod verify;
mod whoami;

pub use doctor::DoctorHandler;
pub use enroll::EnrollHandler;
pub use notes::NotesHandler;
pub use remove::RemoveHandler;
pub use verify::{LoginHandler, VerifyHandler};
pub use whoami::WhoamiHandler;

impl From<Commands> for Box<dyn CommandHandler> {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Enroll(args) => Box::new(EnrollHandler::new(args)),
            Commands::Verify(args) => Box::new(VerifyHandler::new(args)),
            Commands::Login(args) => Box::new(LoginHandler::new(args)),
            Commands::Remove(args) => Box::new(RemoveHandler::new(args)),
            Commands::Whoami(args) => Box::new(WhoamiHandler::new(args)),
            Commands::Notes(cmd) => Box::new(NotesHandler::new(cmd)),
            Commands::Doctor => Box::new(DoctorHandler::new()),
        }
    }
}
