use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use facegate_cli::cli::{EnrollArgs, ImageArgs, OutputMode};
use facegate_cli::commands::{CommandHandler, EnrollHandler};
use facegate_cli::errors::AppError;
use facegate_core::faces::{EnrollmentRecord, FaceEnrollmentOutcome};

fn sample_args() -> EnrollArgs {
    EnrollArgs {
        image: ImageArgs {
            user: Some("alice".into()),
            image: Some(PathBuf::from("face.b64")),
            raw: false,
        },
        store_dir: Some(PathBuf::from("/var/lib/facegate/identities")),
        ..EnrollArgs::default()
    }
}

fn sample_outcome() -> FaceEnrollmentOutcome {
    FaceEnrollmentOutcome {
        user: "alice".into(),
        record: EnrollmentRecord {
            id: "abc".into(),
            embedding_len: 128,
            created_at: "2024-01-01T00:00:00.000Z".into(),
        },
        faces_detected: 1,
        logs: vec!["enrolled".into()],
    }
}

#[test]
fn enroll_handler_passes_verbose_flag_to_renderer() {
    let render_calls = Arc::new(Mutex::new(Vec::new()));
    let handler = EnrollHandler::with_dependencies(sample_args(), |_args| Ok(sample_outcome()), {
        let render_calls = Arc::clone(&render_calls);
        move |outcome, mode, verbose| {
            render_calls
                .lock()
                .unwrap()
                .push((outcome.user.clone(), mode, verbose));
            Ok(())
        }
    });

    let exit = handler.execute(OutputMode::Json, true).unwrap();
    assert_eq!(exit, ExitCode::SUCCESS);
    let calls = render_calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], ("alice".to_string(), OutputMode::Json, true));
}

#[test]
fn enroll_handler_surfaces_duplicate_user() {
    let handler = EnrollHandler::with_dependencies(
        sample_args(),
        |args| {
            Err(AppError::DuplicateUsername {
                user: args.image.user.clone().unwrap_or_default(),
            })
        },
        |_outcome, _mode, _verbose| panic!("render must not run on failure"),
    );

    let err = handler.execute(OutputMode::Human, false).unwrap_err();
    assert_eq!(err.exit_code(), ExitCode::from(5));
    match err {
        AppError::DuplicateUsername { user } => assert_eq!(user, "alice"),
        other => panic!("unexpected error: {other}"),
    }
}
