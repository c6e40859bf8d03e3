use std::any::Any;
use std::process::ExitCode;

use facegate_core::faces::{FaceVerificationOutcome, LoginOutcome};

use crate::cli::{OutputMode, VerifyArgs};
use crate::commands::CommandHandler;
use crate::errors::AppResult;
use crate::identity;
use crate::output::{render_login, render_verify};

type Runner<T> = dyn Fn(&VerifyArgs) -> AppResult<T> + Send + Sync;
type Renderer<T> = dyn Fn(&T, OutputMode, bool) -> AppResult<()> + Send + Sync;

/// Runs `verify`; a rejected face surfaces as a `FaceMismatch` error.
pub struct VerifyHandler {
    args: VerifyArgs,
    run: Box<Runner<FaceVerificationOutcome>>,
    render: Box<Renderer<FaceVerificationOutcome>>,
}

impl VerifyHandler {
    pub fn new(args: VerifyArgs) -> Self {
        Self::with_dependencies(args, identity::run_verify, render_verify)
    }

    pub fn with_dependencies(
        args: VerifyArgs,
        run: impl Fn(&VerifyArgs) -> AppResult<FaceVerificationOutcome> + Send + Sync + 'static,
        render: impl Fn(&FaceVerificationOutcome, OutputMode, bool) -> AppResult<()>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            args,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for VerifyHandler {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode> {
        let outcome = (self.run)(&self.args)?;
        (self.render)(&outcome, mode, verbose)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct LoginHandler {
    args: VerifyArgs,
    run: Box<Runner<LoginOutcome>>,
    render: Box<Renderer<LoginOutcome>>,
}

impl LoginHandler {
    pub fn new(args: VerifyArgs) -> Self {
        Self::with_dependencies(args, identity::run_login, render_login)
    }

    pub fn with_dependencies(
        args: VerifyArgs,
        run: impl Fn(&VerifyArgs) -> AppResult<LoginOutcome> + Send + Sync + 'static,
        render: impl Fn(&LoginOutcome, OutputMode, bool) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for LoginHandler {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode> {
        let outcome = (self.run)(&self.args)?;
        (self.render)(&outcome, mode, verbose)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
