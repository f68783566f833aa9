#![forbid(unsafe_code)]

use crate::defaults::{DEFAULT_ACTOR, default_storage_dir};
use std::path::PathBuf;
use std::time::Duration;
use toc_core::{ActorId, BookId, EngineConfig, RetryPolicy};
use toc_storage::StoreOptions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Show,
    /// `-` reads the request from stdin.
    Apply { source: String },
    Undo { base_version: Option<u64> },
    History { since: u64, limit: usize },
    Delete,
}

#[derive(Debug)]
pub(crate) struct CliConfig {
    pub storage_dir: PathBuf,
    pub book_id: BookId,
    pub actor_id: ActorId,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub busy_timeout_ms: u64,
    pub command: Command,
}

impl CliConfig {
    pub(crate) fn engine_config(&self) -> EngineConfig {
        let defaults = RetryPolicy::default();
        let base_delay = Duration::from_millis(self.backoff_ms);
        EngineConfig {
            retry: RetryPolicy {
                max_attempts: self.max_attempts.max(1),
                base_delay,
                max_delay: defaults.max_delay.max(base_delay),
            },
            ..EngineConfig::default()
        }
    }

    pub(crate) fn store_options(&self) -> StoreOptions {
        StoreOptions {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }
}

pub(crate) fn usage() -> &'static str {
    "tocctl: edit a book's table of contents with optimistic versioning\n\n\
USAGE:\n\
  tocctl [--storage-dir DIR] --book BOOK [--actor ACTOR]\n\
         [--max-attempts N] [--backoff-ms MS] [--busy-timeout-ms MS]\n\
         <COMMAND>\n\n\
COMMANDS:\n\
  show                       print the current outline state\n\
  apply <FILE|->             submit a mutation request (JSON)\n\
  undo [--base-version N]    revert the latest transition as a new version\n\
  history [--since V] [--limit N]\n\
                             print audit records after version V\n\
  delete                     delete the book's outline for good\n\n\
ENV:\n\
  TOC_STORAGE_DIR, TOC_BOOK, TOC_ACTOR, TOC_MAX_ATTEMPTS, TOC_BACKOFF_MS,\n\
  TOC_BUSY_TIMEOUT_MS; log filter via TOC_LOG or RUST_LOG (default: warn).\n\n\
EXIT CODES:\n\
  0 applied / ok, 3 conflict, 4 rejected, 1 storage or fatal error, 2 usage\n"
}

pub(crate) fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn wants_help(args: &[String]) -> bool {
    args.iter().any(|a| a == "-h" || a == "--help")
}

fn parse_number<T: std::str::FromStr>(flag: &str, raw: &str) -> Result<T, String> {
    raw.parse::<T>()
        .map_err(|_| format!("{flag} must be a non-negative integer"))
}

/// Env values first, flags override. `env` is injected so tests do not
/// depend on the process environment.
pub(crate) fn parse_args_from(
    args: &[String],
    env: impl Fn(&str) -> Option<String>,
) -> Result<CliConfig, String> {
    let mut storage_dir: Option<PathBuf> = env("TOC_STORAGE_DIR").map(PathBuf::from);
    let mut book: Option<String> = env("TOC_BOOK");
    let mut actor: Option<String> = env("TOC_ACTOR");
    let mut max_attempts: u32 = env("TOC_MAX_ATTEMPTS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(3);
    let mut backoff_ms: u64 = env("TOC_BACKOFF_MS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(20);
    let mut busy_timeout_ms: u64 = env("TOC_BUSY_TIMEOUT_MS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(5_000);
    let mut positional: Vec<String> = Vec::new();
    let mut base_version: Option<u64> = None;
    let mut since: u64 = 0;
    let mut limit: usize = 50;

    let mut i = 0usize;
    while i < args.len() {
        let a = args[i].as_str();
        match a {
            "--storage-dir" => {
                i += 1;
                let v = args.get(i).ok_or("--storage-dir requires DIR")?;
                storage_dir = Some(PathBuf::from(v));
            }
            "--book" => {
                i += 1;
                let v = args.get(i).ok_or("--book requires BOOK")?;
                book = Some(v.to_string());
            }
            "--actor" => {
                i += 1;
                let v = args.get(i).ok_or("--actor requires ACTOR")?;
                actor = Some(v.to_string());
            }
            "--max-attempts" => {
                i += 1;
                let v = args.get(i).ok_or("--max-attempts requires N")?;
                max_attempts = parse_number(a, v)?;
            }
            "--backoff-ms" => {
                i += 1;
                let v = args.get(i).ok_or("--backoff-ms requires MS")?;
                backoff_ms = parse_number(a, v)?;
            }
            "--busy-timeout-ms" => {
                i += 1;
                let v = args.get(i).ok_or("--busy-timeout-ms requires MS")?;
                busy_timeout_ms = parse_number(a, v)?;
            }
            "--base-version" => {
                i += 1;
                let v = args.get(i).ok_or("--base-version requires N")?;
                base_version = Some(parse_number(a, v)?);
            }
            "--since" => {
                i += 1;
                let v = args.get(i).ok_or("--since requires V")?;
                since = parse_number(a, v)?;
            }
            "--limit" => {
                i += 1;
                let v = args.get(i).ok_or("--limit requires N")?;
                limit = parse_number(a, v)?;
            }
            "-" => positional.push(a.to_string()),
            other if other.starts_with('-') => {
                return Err(format!("unknown flag {other}\n\n{}", usage()));
            }
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        Some("show") => Command::Show,
        Some("apply") => Command::Apply {
            source: positional.next().ok_or("apply requires FILE or -")?,
        },
        Some("undo") => Command::Undo { base_version },
        Some("history") => Command::History { since, limit },
        Some("delete") => Command::Delete,
        Some(other) => return Err(format!("unknown command {other}\n\n{}", usage())),
        None => return Err(format!("missing command\n\n{}", usage())),
    };
    if let Some(extra) = positional.next() {
        return Err(format!("unexpected argument {extra}"));
    }

    let book = book.ok_or("--book requires BOOK (or set TOC_BOOK)")?;
    let book_id = BookId::try_new(book).map_err(|err| format!("invalid book id: {err}"))?;
    let actor_id = ActorId::try_new(actor.unwrap_or_else(|| DEFAULT_ACTOR.to_string()))
        .map_err(|err| format!("invalid actor id: {err}"))?;

    Ok(CliConfig {
        storage_dir: storage_dir.unwrap_or_else(default_storage_dir),
        book_id,
        actor_id,
        max_attempts,
        backoff_ms,
        busy_timeout_ms,
        command,
    })
}

pub(crate) fn parse_args() -> Result<CliConfig, String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    if wants_help(&args) {
        print!("{}", usage());
        std::process::exit(0);
    }
    parse_args_from(&args, env_var)
}
