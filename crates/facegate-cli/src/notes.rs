use facegate_core::credentials::CredentialIssuer;
use facegate_core::faces::EmbeddingStore;
use facegate_core::notes::{Note, NotePatch, NoteStore, NotesService};
use facegate_core::sessions::SessionAuthenticator;

use crate::cli::NotesCommands;
use crate::config::{apply_notes_dir_override, apply_store_dir_override, load_settings};
use crate::errors::AppResult;
use crate::runtime::{build_issuer, open_embedding_store, open_note_store};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotesOutcome {
    Listed { user: String, notes: Vec<Note> },
    Created { user: String, note: Note },
    Updated { user: String, note: Note },
    Deleted { user: String, note: Note },
}

impl NotesOutcome {
    pub fn user(&self) -> &str {
        match self {
            NotesOutcome::Listed { user, .. }
            | NotesOutcome::Created { user, .. }
            | NotesOutcome::Updated { user, .. }
            | NotesOutcome::Deleted { user, .. } => user,
        }
    }
}

pub fn run_notes(command: &NotesCommands) -> AppResult<NotesOutcome> {
    let auth = command.auth();
    let mut settings = load_settings()?;
    apply_notes_dir_override(&mut settings.resolved, auth.notes_dir.as_ref());
    apply_store_dir_override(&mut settings.resolved, auth.store_dir.as_ref());
    let issuer = build_issuer(&settings)?;
    let identities = open_embedding_store(&settings.resolved)?;
    let store = open_note_store(&settings.resolved)?;
    let service = NotesService::new(SessionAuthenticator::new(issuer, identities), store);
    run_notes_with(&service, command)
}

pub fn run_notes_with<I, S, N>(
    service: &NotesService<I, S, N>,
    command: &NotesCommands,
) -> AppResult<NotesOutcome>
where
    I: CredentialIssuer,
    S: EmbeddingStore,
    N: NoteStore,
{
    let token = command.auth().token.as_deref();
    match command {
        NotesCommands::List(_) => {
            let (user, notes) = service.list(token)?;
            Ok(NotesOutcome::Listed { user, notes })
        }
        NotesCommands::Add(args) => {
            let (user, note) =
                service.create(token, args.title.as_deref(), args.content.as_deref())?;
            Ok(NotesOutcome::Created { user, note })
        }
        NotesCommands::Update(args) => {
            let patch = NotePatch {
                title: args.title.as_deref(),
                content: args.content.as_deref(),
            };
            let (user, note) = service.update(token, args.id, patch)?;
            Ok(NotesOutcome::Updated { user, note })
        }
        NotesCommands::Delete(args) => {
            let (user, note) = service.delete(token, args.id)?;
            Ok(NotesOutcome::Deleted { user, note })
        }
    }
}
