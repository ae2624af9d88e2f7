use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use sieve_syntax::config::{self, LogLevel, Settings};
use sieve_syntax::store::script_io::{self, ScriptIoError};
use sieve_syntax::{emit, parse_with, ParseError, Scanner, TokenKind};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT"),
    " ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser)]
#[command(name = "sieve-syntax")]
#[command(about = "Check, inspect and format SIEVE (RFC 5228) scripts")]
#[command(version = VERSION)]
struct Cli {
    /// Log verbosity; overrides the settings file
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Parse a script and report the first error
    Check { file: PathBuf },
    /// Print the token stream, one token per line
    Tokens { file: PathBuf },
    /// Print the syntax tree as JSON
    Dump { file: PathBuf },
    /// Print the script in canonical form
    Fmt {
        file: PathBuf,
        /// Rewrite the file in place
        #[arg(long)]
        write: bool,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Read(#[from] ScriptIoError),
    #[error("cannot write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("{}:{line}:{column}: {source}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        column: usize,
        source: ParseError,
    },
    #[error("cannot encode tree: {0}")]
    Json(#[from] serde_json::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let (settings, settings_err) = match config::load_settings() {
        Ok(settings) => (settings, None),
        Err(err) => (Settings::default(), Some(err)),
    };
    let level = cli.log_level.unwrap_or(settings.log_level);
    tracing_subscriber::fmt()
        .with_max_level(level.as_tracing())
        .with_writer(io::stderr)
        .init();
    if let Some(err) = settings_err {
        warn!("{err}; using default settings");
    }

    match run(cli.command, &settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Cmd, settings: &Settings) -> Result<(), CliError> {
    match command {
        Cmd::Check { file } => {
            let text = read(&file, settings)?;
            let tree = parse_file(&file, &text, settings)?;
            info!(commands = tree.commands().len(), "script is valid");
            println!("ok");
        }
        Cmd::Tokens { file } => {
            let text = read(&file, settings)?;
            for item in Scanner::new(&text) {
                let token = item.map_err(|err| parse_error(&file, &text, err.into()))?;
                if token.kind == TokenKind::Eof {
                    break;
                }
                println!("{:>6} {:<16} {:?}", token.pos.offset(), format!("{:?}", token.kind), token.text);
            }
        }
        Cmd::Dump { file } => {
            let text = read(&file, settings)?;
            let tree = parse_file(&file, &text, settings)?;
            println!("{}", serde_json::to_string_pretty(&tree)?);
        }
        Cmd::Fmt { file, write } => {
            let text = read(&file, settings)?;
            let tree = parse_file(&file, &text, settings)?;
            let formatted = emit(&tree);
            if write {
                script_io::save_script(&file, &formatted).map_err(|source| CliError::Write {
                    path: file.clone(),
                    source,
                })?;
                info!(path = %file.display(), "rewrote script");
            } else {
                print!("{formatted}");
            }
        }
    }
    Ok(())
}

fn read(path: &Path, settings: &Settings) -> Result<String, CliError> {
    Ok(script_io::load_script(path, settings.parse.max_script_bytes)?)
}

fn parse_file(path: &Path, text: &str, settings: &Settings) -> Result<sieve_syntax::Tree, CliError> {
    parse_with(text, &settings.parse).map_err(|err| parse_error(path, text, err))
}

fn parse_error(path: &Path, text: &str, err: ParseError) -> CliError {
    let (line, column) = err.position().line_col(text);
    CliError::Parse {
        path: path.to_path_buf(),
        line,
        column,
        source: err,
    }
}
