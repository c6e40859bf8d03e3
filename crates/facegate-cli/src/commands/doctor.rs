use std::any::Any;
use std::process::ExitCode;

use tracing::warn;

use crate::cli::OutputMode;
use crate::commands::CommandHandler;
use crate::doctor::{self, CheckStatus, DoctorContext, DoctorOutcome};
use crate::errors::AppResult;
use crate::output::render_doctor;

type Runner = Box<dyn Fn(&DoctorContext) -> AppResult<DoctorOutcome> + Send + Sync>;
type Renderer = Box<dyn Fn(&DoctorOutcome, OutputMode) -> AppResult<()> + Send + Sync>;

/// Runs the self-check; exits 1 when any check failed. Warnings alone pass.
pub struct DoctorHandler {
    context: DoctorContext,
    run: Runner,
    render: Renderer,
}

impl DoctorHandler {
    pub fn new() -> Self {
        Self::with_dependencies(
            DoctorContext::default(),
            doctor::run_doctor_with,
            render_doctor,
        )
    }

    pub fn with_dependencies(
        context: DoctorContext,
        run: impl Fn(&DoctorContext) -> AppResult<DoctorOutcome> + Send + Sync + 'static,
        render: impl Fn(&DoctorOutcome, OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            context,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl Default for DoctorHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandHandler for DoctorHandler {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode> {
        let outcome = (self.run)(&self.context)?;
        if verbose {
            for check in outcome
                .checks
                .iter()
                .filter(|check| check.status != CheckStatus::Pass)
            {
                warn!(check = %check.name, status = ?check.status, "{}", check.message);
            }
        }
        (self.render)(&outcome, mode)?;
        if outcome.ok {
            Ok(ExitCode::SUCCESS)
        } else {
            Ok(ExitCode::from(1))
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
