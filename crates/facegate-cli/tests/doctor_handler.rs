use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use facegate_cli::cli::OutputMode;
use facegate_cli::commands::{CommandHandler, DoctorHandler};
use facegate_cli::doctor::{
    run_doctor_with, CheckStatus, DoctorCheck, DoctorContext, DoctorOutcome, DoctorPaths,
};
use facegate_cli::errors::{AppError, ErrorKind};
use facegate_config::ResolvedConfig;
use tempfile::TempDir;

fn outcome_with(status: CheckStatus) -> DoctorOutcome {
    DoctorOutcome {
        ok: status != CheckStatus::Fail,
        checks: vec![DoctorCheck {
            name: "token_secret".into(),
            status,
            message: "token_secret_file is not configured".into(),
            path: None,
        }],
    }
}

fn context_in(tmp: &TempDir) -> DoctorContext {
    let mut fallback = ResolvedConfig::default();
    fallback.embedding_store_dir = tmp.path().join("identities");
    fallback.notes_store_dir = tmp.path().join("notes");
    DoctorContext {
        paths: DoctorPaths {
            config_paths: vec![tmp.path().join("missing.toml")],
        },
        fallback_config: fallback,
        backend_available: false,
    }
}

#[test]
fn failed_check_exits_with_one_after_rendering() {
    let tmp = TempDir::new().unwrap();
    let renders = Arc::new(Mutex::new(Vec::new()));
    let handler = DoctorHandler::with_dependencies(
        context_in(&tmp),
        |_ctx| Ok(outcome_with(CheckStatus::Fail)),
        {
            let renders = Arc::clone(&renders);
            move |outcome, mode| {
                renders.lock().unwrap().push((outcome.ok, mode));
                Ok(())
            }
        },
    );

    let code = handler.execute(OutputMode::Human, true).unwrap();
    assert_eq!(code, ExitCode::from(1));
    assert_eq!(*renders.lock().unwrap(), vec![(false, OutputMode::Human)]);
}

#[test]
fn warnings_alone_exit_successfully() {
    let tmp = TempDir::new().unwrap();
    let handler = DoctorHandler::with_dependencies(
        context_in(&tmp),
        |_ctx| Ok(outcome_with(CheckStatus::Warn)),
        |_outcome, _mode| Ok(()),
    );
    assert_eq!(
        handler.execute(OutputMode::Json, false).unwrap(),
        ExitCode::SUCCESS
    );
}

#[test]
fn handler_passes_its_context_to_the_runner() {
    let tmp = TempDir::new().unwrap();
    let expected = tmp.path().join("missing.toml");
    let handler = DoctorHandler::with_dependencies(
        context_in(&tmp),
        move |ctx| {
            assert_eq!(ctx.paths.config_paths, vec![expected.clone()]);
            assert!(!ctx.backend_available);
            Ok(outcome_with(CheckStatus::Pass))
        },
        |_outcome, _mode| Ok(()),
    );
    assert_eq!(
        handler.execute(OutputMode::Json, false).unwrap(),
        ExitCode::SUCCESS
    );
}

#[test]
fn real_checks_flag_missing_backend_and_secret() {
    let tmp = TempDir::new().unwrap();
    let handler =
        DoctorHandler::with_dependencies(context_in(&tmp), run_doctor_with, |outcome, _mode| {
            let failing: Vec<&str> = outcome
                .checks
                .iter()
                .filter(|check| check.status == CheckStatus::Fail)
                .map(|check| check.name.as_str())
                .collect();
            assert!(failing.contains(&"embedding_backend"));
            assert!(failing.contains(&"token_secret"));
            Ok(())
        });
    assert_eq!(
        handler.execute(OutputMode::Json, false).unwrap(),
        ExitCode::from(1)
    );
}

#[test]
fn runner_errors_propagate() {
    let tmp = TempDir::new().unwrap();
    let handler = DoctorHandler::with_dependencies(
        context_in(&tmp),
        |_ctx| Err(AppError::Internal("boom".into())),
        |_outcome, _mode| Ok(()),
    );

    let err = handler.execute(OutputMode::Json, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
}
