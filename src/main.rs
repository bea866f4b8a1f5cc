//! Purpose: `machinery` diagnostic CLI entry point.
//! Role: Binary crate root; loads libmachinery, prints version and capability queries.
//! Invariants: stdout carries only the report (text or JSON); logs and errors go to stderr.
//! Invariants: Errors are human text on a terminal and JSON otherwise.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
use std::error::Error as StdError;
use std::ffi::OsString;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::{
    CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod report;

use machinery::api::{Error, ErrorKind, LIBRARY_ENV, Machinery, Resolver, to_exit_code};
use report::{FlagKind, FlagSet, Report, version_json, version_text};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }
}

fn main() {
    let exit_code = match run(std::env::args_os()) {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

#[derive(Parser)]
#[command(
    name = "machinery",
    version,
    about = "Inspect the installed libmachinery: version, features, and modules",
    long_about = None,
    after_help = r#"LIBRARY LOOKUP
  1. --library <PATH> or $MACHINERY_LIBRARY, when given
  2. the canonical soname (libmachinery.so.0 on Linux)
  3. a search of the loader path and system library directories

EXAMPLES
  $ machinery
  $ machinery --format json
  $ machinery feature unicode debug
  $ machinery --library ./build/libmachinery.so.0 module x86"#
)]
struct Cli {
    #[arg(
        long,
        env = LIBRARY_ENV,
        help = "Load libmachinery from this path instead of searching",
        value_hint = ValueHint::FilePath
    )]
    library: Option<PathBuf>,
    #[arg(
        long,
        default_value = "text",
        value_enum,
        help = "Output format for stdout: text|json"
    )]
    format: OutputFormat,
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Print the version string and the demonstration feature/module checks (default)")]
    Report,
    #[command(about = "Print the library version")]
    Version,
    #[command(about = "Check whether the library was built with the named features")]
    Feature {
        #[arg(required = true, help = "Feature names, e.g. ascii, debug, unicode")]
        names: Vec<String>,
    },
    #[command(about = "Check whether the library includes the named modules")]
    Module {
        #[arg(required = true, help = "Module names, e.g. arm, mips, x86, ir, jit")]
        names: Vec<String>,
    },
    #[command(
        about = "Generate shell completions",
        long_about = r#"Generate shell completion scripts.

Prints a completion script for the given shell to stdout."#,
        after_help = r#"EXAMPLES
  $ machinery completion bash > ~/.local/share/bash-completion/completions/machinery
  $ machinery completion zsh > ~/.zfunc/_machinery"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

fn run<I>(args: I) -> Result<RunOutcome, (Error, ColorMode)>
where
    I: IntoIterator<Item = OsString>,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                return Ok(RunOutcome::ok());
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `machinery --help`."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing();

    let color_mode = cli.color;
    dispatch(cli)
        .map(|()| RunOutcome::ok())
        .map_err(|err| (err, color_mode))
}

fn dispatch(cli: Cli) -> Result<(), Error> {
    let format = cli.format;
    match cli.command.unwrap_or(Command::Report) {
        Command::Completion { shell } => {
            let mut out = io::stdout();
            clap_complete::aot::generate(shell, &mut Cli::command(), "machinery", &mut out);
            Ok(())
        }
        Command::Report => {
            let report = Report::collect(&load(cli.library)?);
            write_stdout(&match format {
                OutputFormat::Text => report.to_text(),
                OutputFormat::Json => json_line(&report.to_json()),
            })
        }
        Command::Version => {
            let machinery = load(cli.library)?;
            write_stdout(&match format {
                OutputFormat::Text => version_text(machinery.version()),
                OutputFormat::Json => json_line(&version_json(machinery.version())),
            })
        }
        Command::Feature { names } => {
            let machinery = load(cli.library)?;
            let flags = FlagSet::query(&machinery, FlagKind::Feature, &names);
            write_stdout(&flags_output(flags, format))
        }
        Command::Module { names } => {
            let machinery = load(cli.library)?;
            let flags = FlagSet::query(&machinery, FlagKind::Module, &names);
            write_stdout(&flags_output(flags, format))
        }
    }
}

// clap already folds MACHINERY_LIBRARY into `--library`.
fn load(library: Option<PathBuf>) -> Result<Machinery, Error> {
    let resolver = match library {
        Some(path) => Resolver::default().with_explicit(path),
        None => Resolver::default(),
    };
    Machinery::load_with(&resolver)
}

fn flags_output(flags: FlagSet, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => flags.to_text(),
        OutputFormat::Json => json_line(&flags.to_json()),
    }
}

fn json_line(value: &Value) -> String {
    let mut line = value.to_string();
    line.push('\n');
    line
}

fn write_stdout(output: &str) -> Result<(), Error> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(output.as_bytes())
        .and_then(|()| stdout.flush())
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to write output")
                .with_source(err)
        })
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::LibraryLoad => "failed to load libmachinery".to_string(),
        ErrorKind::SymbolNotFound => "libmachinery is missing a required symbol".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(symbol) = err.symbol() {
        inner.insert("symbol".to_string(), json!(symbol));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }
    if let Some(symbol) = err.symbol() {
        lines.push(format!(
            "{} {symbol}",
            colorize_label("symbol:", use_color, AnsiColor::Yellow)
        ));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
