use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// facegate - face-verified identity and per-user notes
#[derive(Parser, Debug)]
#[command(name = "facegate", version, about, long_about = None)]
pub struct Cli {
    /// Emit machine-readable JSON instead of human text
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default `tracing` filter for the `-v` count; `RUST_LOG` still wins.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    pub fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Register a user's face
    Enroll(EnrollArgs),
    /// Check a face against a user's enrollment
    Verify(VerifyArgs),
    /// Verify a face and mint a bearer token on success
    Login(VerifyArgs),
    /// Delete a user's enrolled face and notes
    Remove(RemoveArgs),
    /// Show the enrolled identity a bearer token belongs to
    Whoami(WhoamiArgs),
    /// Manage the notes of the token holder
    #[command(subcommand)]
    Notes(NotesCommands),
    /// Check configuration, stores, models and the token secret
    Doctor,
}

/// Where the face image comes from.
#[derive(Args, Debug, Clone, Default)]
pub struct ImageArgs {
    /// User name (ASCII letters, digits, '-' and '_')
    #[arg(long)]
    pub user: Option<String>,

    /// File holding a base64 or data URI image payload; `-` reads stdin
    #[arg(long)]
    pub image: Option<PathBuf>,

    /// Treat the image file as raw PNG/JPEG bytes instead of a base64 payload
    #[arg(long)]
    pub raw: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ModelArgs {
    /// dlib 68-point landmark model (overrides config and $DLIB_LANDMARK_MODEL)
    #[arg(long, value_name = "PATH")]
    pub landmark_model: Option<PathBuf>,

    /// dlib ResNet face encoder model (overrides config and $DLIB_ENCODER_MODEL)
    #[arg(long, value_name = "PATH")]
    pub encoder_model: Option<PathBuf>,

    /// Re-sampling passes per face when computing embeddings
    #[arg(long)]
    pub jitters: Option<u32>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct EnrollArgs {
    #[command(flatten)]
    pub image: ImageArgs,

    #[command(flatten)]
    pub models: ModelArgs,

    /// Directory of enrolled identities (overrides config)
    #[arg(long, value_name = "DIR")]
    pub store_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub image: ImageArgs,

    #[command(flatten)]
    pub models: ModelArgs,

    /// Directory of enrolled identities (overrides config)
    #[arg(long, value_name = "DIR")]
    pub store_dir: Option<PathBuf>,

    /// Maximum Euclidean distance accepted as a match (overrides config)
    #[arg(long)]
    pub threshold: Option<f64>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RemoveArgs {
    /// User whose enrollment is deleted
    #[arg(long)]
    pub user: String,

    /// Directory of enrolled identities (overrides config)
    #[arg(long, value_name = "DIR")]
    pub store_dir: Option<PathBuf>,

    /// Directory of note books (overrides config)
    #[arg(long, value_name = "DIR")]
    pub notes_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct WhoamiArgs {
    /// Bearer token returned by `facegate login`
    #[arg(long)]
    pub token: Option<String>,

    /// Directory of enrolled identities (overrides config)
    #[arg(long, value_name = "DIR")]
    pub store_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct TokenArgs {
    /// Bearer token returned by `facegate login`
    #[arg(long)]
    pub token: Option<String>,

    /// Directory of note books (overrides config)
    #[arg(long, value_name = "DIR")]
    pub notes_dir: Option<PathBuf>,

    /// Directory of enrolled identities the token is checked against (overrides config)
    #[arg(long, value_name = "DIR")]
    pub store_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum NotesCommands {
    /// List notes
    List(NoteListArgs),
    /// Create a note
    Add(NoteAddArgs),
    /// Change a note's title and/or content
    Update(NoteUpdateArgs),
    /// Delete a note
    Delete(NoteDeleteArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct NoteListArgs {
    #[command(flatten)]
    pub auth: TokenArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct NoteAddArgs {
    #[command(flatten)]
    pub auth: TokenArgs,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub content: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct NoteUpdateArgs {
    #[command(flatten)]
    pub auth: TokenArgs,

    #[arg(long)]
    pub id: u64,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub content: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct NoteDeleteArgs {
    #[command(flatten)]
    pub auth: TokenArgs,

    #[arg(long)]
    pub id: u64,
}

impl NotesCommands {
    pub fn auth(&self) -> &TokenArgs {
        match self {
            NotesCommands::List(args) => &args.auth,
            NotesCommands::Add(args) => &args.auth,
            NotesCommands::Update(args) => &args.auth,
            NotesCommands::Delete(args) => &args.auth,
        }
    }
}
