use std::any::Any;
use std::process::ExitCode;

use facegate_core::sessions::Session;

use crate::cli::{OutputMode, WhoamiArgs};
use crate::commands::CommandHandler;
use crate::errors::AppResult;
use crate::identity;
use crate::output::render_whoami;

type Runner = Box<dyn Fn(&WhoamiArgs) -> AppResult<Session> + Send + Sync>;
type Renderer = Box<dyn Fn(&Session, OutputMode) -> AppResult<()> + Send + Sync>;

pub struct WhoamiHandler {
    args: WhoamiArgs,
    run: Runner,
    render: Renderer,
}

impl WhoamiHandler {
    pub fn new(args: WhoamiArgs) -> Self {
        Self::with_dependencies(args, identity::run_whoami, render_whoami)
    }

    pub fn with_dependencies(
        args: WhoamiArgs,
        run: impl Fn(&WhoamiArgs) -> AppResult<Session> + Send + Sync + 'static,
        render: impl Fn(&Session, OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for WhoamiHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let session = (self.run)(&self.args)?;
        (self.render)(&session, mode)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
