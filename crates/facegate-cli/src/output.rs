use std::error::Error;
use std::io::{self, Write};

use facegate_core::faces::{FaceEnrollmentOutcome, FaceVerificationOutcome, LoginOutcome};
use facegate_core::sessions::Session;
use serde_json::{json, Value};

use crate::cli::OutputMode;
use crate::doctor::{CheckStatus, DoctorOutcome};
use crate::errors::{AppError, AppResult};
use crate::identity::RemovalOutcome;
use crate::notes::NotesOutcome;

fn write_json(payload: &Value) -> AppResult<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let payload = serde_json::to_string(payload)?;
    handle.write_all(payload.as_bytes())?;
    handle.write_all(b"\n")?;
    Ok(())
}

fn log_lines(lines: &[String], verbose: bool) {
    if verbose {
        for line in lines {
            tracing::info!("{line}");
        }
    }
}

pub fn render_enroll(
    outcome: &FaceEnrollmentOutcome,
    mode: OutputMode,
    verbose: bool,
) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            log_lines(&outcome.logs, verbose);
            println!(
                "Enrollment successful for user {} (embedding {}, length {})",
                outcome.user, outcome.record.id, outcome.record.embedding_len
            );
        }
        OutputMode::Json => write_json(&enroll_json_payload(outcome))?,
    }
    Ok(())
}

fn enroll_json_payload(outcome: &FaceEnrollmentOutcome) -> Value {
    json!({
        "status": "ok",
        "user": outcome.user,
        "record": outcome.record,
        "faces_detected": outcome.faces_detected,
    })
}

pub fn render_verify(
    outcome: &FaceVerificationOutcome,
    mode: OutputMode,
    verbose: bool,
) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            log_lines(&outcome.logs, verbose);
            println!(
                "Face accepted for user {} (distance {:.4}, threshold {:.4})",
                outcome.result.user, outcome.result.distance, outcome.result.threshold
            );
        }
        OutputMode::Json => write_json(&verify_json_payload(outcome))?,
    }
    Ok(())
}

fn verify_json_payload(outcome: &FaceVerificationOutcome) -> Value {
    json!({
        "status": "ok",
        "user": outcome.result.user,
        "identity_id": outcome.result.identity_id,
        "accepted": outcome.result.accepted,
        "distance": outcome.result.distance,
        "threshold": outcome.result.threshold,
        "faces_detected": outcome.result.faces_detected,
        "stages": outcome.stages,
    })
}

pub fn render_login(outcome: &LoginOutcome, mode: OutputMode, verbose: bool) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            log_lines(&outcome.verification.logs, verbose);
            println!(
                "Login successful for user {} (distance {:.4})",
                outcome.verification.result.user, outcome.verification.result.distance
            );
            println!("{}", outcome.credential.access_token);
        }
        OutputMode::Json => write_json(&login_json_payload(outcome))?,
    }
    Ok(())
}

fn login_json_payload(outcome: &LoginOutcome) -> Value {
    json!({
        "status": "ok",
        "user": outcome.verification.result.user,
        "distance": outcome.verification.result.distance,
        "threshold": outcome.verification.result.threshold,
        "access_token": outcome.credential.access_token,
        "token_type": outcome.credential.token_type,
        "expires_at": outcome.credential.expires_at,
    })
}

pub fn render_remove(outcome: &RemovalOutcome, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            println!(
                "Removed enrollment {} for user {} ({} note(s) deleted)",
                outcome.id, outcome.user, outcome.notes_removed
            );
        }
        OutputMode::Json => write_json(&json!({
            "status": "ok",
            "user": outcome.user,
            "removed_id": outcome.id,
            "notes_removed": outcome.notes_removed,
        }))?,
    }
    Ok(())
}

pub fn render_whoami(session: &Session, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            println!(
                "{} (enrollment {}, enrolled {})",
                session.username, session.identity_id, session.enrolled_at
            );
        }
        OutputMode::Json => write_json(&whoami_json_payload(session))?,
    }
    Ok(())
}

fn whoami_json_payload(session: &Session) -> Value {
    json!({
        "status": "ok",
        "username": session.username,
        "user_id": session.identity_id,
        "enrolled_at": session.enrolled_at,
        "expires_at": session.expires_at,
    })
}

pub fn render_notes(outcome: &NotesOutcome, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => match outcome {
            NotesOutcome::Listed { user, notes } => {
                if notes.is_empty() {
                    println!("No notes for user {user}");
                }
                for note in notes {
                    println!("#{} {} ({})", note.id, note.title, note.updated_at);
                    if !note.content.is_empty() {
                        println!("    {}", note.content);
                    }
                }
            }
            NotesOutcome::Created { note, .. } => println!("Created note #{}", note.id),
            NotesOutcome::Updated { note, .. } => println!("Updated note #{}", note.id),
            NotesOutcome::Deleted { note, .. } => println!("Deleted note #{}", note.id),
        },
        OutputMode::Json => write_json(&notes_json_payload(outcome))?,
    }
    Ok(())
}

fn notes_json_payload(outcome: &NotesOutcome) -> Value {
    match outcome {
        NotesOutcome::Listed { user, notes } => json!({
            "status": "ok",
            "user": user,
            "notes": notes,
        }),
        NotesOutcome::Created { user, note } => json!({
            "status": "created",
            "user": user,
            "note": note,
        }),
        NotesOutcome::Updated { user, note } => json!({
            "status": "updated",
            "user": user,
            "note": note,
        }),
        NotesOutcome::Deleted { user, note } => json!({
            "status": "deleted",
            "user": user,
            "id": note.id,
        }),
    }
}

pub fn render_doctor(outcome: &DoctorOutcome, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            for check in &outcome.checks {
                let tag = match check.status {
                    CheckStatus::Pass => "PASS",
                    CheckStatus::Warn => "WARN",
                    CheckStatus::Fail => "FAIL",
                };
                println!("[{tag}] {}: {}", check.name, check.message);
            }
            println!(
                "{}",
                if outcome.ok {
                    "All checks passed"
                } else {
                    "Some checks need attention"
                }
            );
        }
        OutputMode::Json => write_json(&serde_json::to_value(outcome)?)?,
    }
    Ok(())
}

fn error_json_payload(err: &AppError) -> Value {
    let mut payload = json!({
        "status": "error",
        "kind": err.kind(),
        "error": err.human_message(),
    });
    if let AppError::FaceMismatch {
        user,
        distance,
        threshold,
    } = err
    {
        payload["user"] = json!(user);
        payload["distance"] = json!(distance);
        payload["threshold"] = json!(threshold);
    }
    payload
}

pub fn render_error(err: &AppError, mode: OutputMode) {
    match mode {
        OutputMode::Human => {
            eprintln!("error: {}", err.human_message());
        }
        OutputMode::Json => {
            if let Ok(json) = serde_json::to_string(&error_json_payload(err)) {
                println!("{json}");
            }
        }
    }
    if let Some(source) = err.source() {
        eprintln!("cause: {source}");
    }
}
