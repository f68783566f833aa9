#![forbid(unsafe_code)]

use crate::config::{CliConfig, Command};
use serde::Deserialize;
use serde_json::json;
use std::io::Read;
use toc_core::{
    ActorId, BookId, EngineError, MutationOperation, MutationRequest, MutationResult, TocEngine,
};
use toc_storage::{SqliteStore, StoreError};

#[derive(Debug)]
pub(crate) enum CliError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Store(StoreError),
    Engine(EngineError),
    Input(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Json(err) => write!(f, "json: {err}"),
            Self::Store(err) => write!(f, "store: {err}"),
            Self::Engine(err) => write!(f, "{err}"),
            Self::Input(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<StoreError> for CliError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<EngineError> for CliError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Ok,
    Conflict,
    Rejected,
}

impl Outcome {
    fn of(result: &MutationResult) -> Self {
        match result {
            MutationResult::Applied { .. } => Self::Ok,
            MutationResult::Conflict { .. } => Self::Conflict,
            MutationResult::Rejected { .. } => Self::Rejected,
        }
    }

    pub(crate) fn exit_code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Conflict => 3,
            Self::Rejected => 4,
        }
    }
}

/// Request body accepted by `apply`. Book and actor fall back to the
/// command-line config; a body naming a different book is refused.
#[derive(Debug, Deserialize)]
pub(crate) struct ApplyBody {
    #[serde(default)]
    book_id: Option<BookId>,
    #[serde(default)]
    actor_id: Option<ActorId>,
    #[serde(default)]
    base_version: u64,
    operations: Vec<MutationOperation>,
}

pub(crate) fn parse_apply_body(raw: &str, cfg: &CliConfig) -> Result<MutationRequest, CliError> {
    let body: ApplyBody = serde_json::from_str(raw)?;
    if let Some(book_id) = &body.book_id
        && book_id != &cfg.book_id
    {
        return Err(CliError::Input(format!(
            "request is for book {book_id} but --book is {}",
            cfg.book_id
        )));
    }
    Ok(MutationRequest {
        book_id: cfg.book_id.clone(),
        base_version: body.base_version,
        operations: body.operations,
        actor_id: body.actor_id.unwrap_or_else(|| cfg.actor_id.clone()),
    })
}

fn read_source(source: &str) -> Result<String, CliError> {
    if source == "-" {
        let mut raw = String::new();
        std::io::stdin().read_to_string(&mut raw)?;
        return Ok(raw);
    }
    Ok(std::fs::read_to_string(source)?)
}

fn print_json(value: &impl serde::Serialize) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn run(cfg: &CliConfig) -> Result<Outcome, CliError> {
    let store = SqliteStore::open_with(&cfg.storage_dir, cfg.store_options())?;
    let mut engine = TocEngine::new(store, cfg.engine_config());
    tracing::debug!(
        storage_dir = %cfg.storage_dir.display(),
        book_id = %cfg.book_id,
        command = ?cfg.command,
        "running command"
    );

    match &cfg.command {
        Command::Show => {
            print_json(&engine.outline(&cfg.book_id)?)?;
            Ok(Outcome::Ok)
        }
        Command::Apply { source } => {
            let request = parse_apply_body(&read_source(source)?, cfg)?;
            let result = engine.submit(request)?;
            print_json(&result)?;
            Ok(Outcome::of(&result))
        }
        Command::Undo { base_version } => {
            let base_version = match base_version {
                Some(version) => *version,
                None => engine.outline(&cfg.book_id)?.version(),
            };
            let result = engine.undo_last(&cfg.book_id, base_version, cfg.actor_id.clone())?;
            print_json(&result)?;
            Ok(Outcome::of(&result))
        }
        Command::History { since, limit } => {
            print_json(&engine.audit_log(&cfg.book_id, *since, *limit)?)?;
            Ok(Outcome::Ok)
        }
        Command::Delete => {
            let deleted = engine.delete_book(&cfg.book_id)?;
            print_json(&json!({ "book_id": cfg.book_id, "deleted": deleted }))?;
            Ok(Outcome::Ok)
        }
    }
}
