//! Binary entry point for the varpatch CLI.
//!
//! ## Usage
//!
//! ```bash
//! # Transfer the edit between two versions onto another variant
//! varpatch patch --before old.c --after new.c --target variant.c
//!
//! # Same, from a unified diff, reporting the outcome as JSON
//! varpatch patch --diff change.patch --target variant.c --format json
//!
//! # Show how a directive line is abstracted
//! varpatch annotation '#if defined(A) && B > 2'
//!
//! # Show the variation tree of a file
//! varpatch tree variant.c
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};

use varpatch_core::error::{OutputErrorCode, VarPatchError};
use varpatch_core::feature::{AnnotationParser, Dialect};
use varpatch_core::matching::is_equivalent_result;
use varpatch_core::output::{
    emit_response, AnnotationResponse, ErrorResponse, PatchResponse, TreeResponse,
};
use varpatch_core::patch::{patch, PatchOptions};
use varpatch_core::variation::{VariationDiff, VariationTree};

// ============================================================================
// CLI Structure
// ============================================================================

/// Transfer conditional-compilation edits between variants.
#[derive(Parser, Debug)]
#[command(
    name = "varpatch",
    version,
    about = "Transfer conditional-compilation edits between variants"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Global arguments shared by all subcommands.
#[derive(Parser, Debug)]
struct GlobalArgs {
    /// Log level for tracing output.
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Plain text (patched source, rendered tree).
    #[default]
    Text,
    /// JSON response.
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Patch a target variant with the edit between two source versions.
    Patch(PatchArgs),
    /// Classify a single line and print its abstracted formula.
    Annotation {
        /// The source line.
        line: String,
        #[arg(long, value_enum, default_value_t)]
        dialect: Dialect,
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// Print the variation tree of a source file.
    Tree {
        /// The source file.
        file: PathBuf,
        #[arg(long, value_enum, default_value_t)]
        dialect: Dialect,
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
}

#[derive(Args, Debug)]
struct PatchArgs {
    /// Source version before the edit.
    #[arg(long, requires = "after", required_unless_present = "diff")]
    before: Option<PathBuf>,

    /// Source version after the edit.
    #[arg(long, requires = "before")]
    after: Option<PathBuf>,

    /// Unified diff of the edit, instead of `--before`/`--after`.
    #[arg(long, conflicts_with_all = ["before", "after"])]
    diff: Option<PathBuf>,

    /// Variant to patch.
    #[arg(long)]
    target: PathBuf,

    /// Expected result; reports whether the patched target matches it.
    #[arg(long)]
    expected: Option<PathBuf>,

    /// Annotation dialect of the input files.
    #[arg(long, value_enum, default_value_t)]
    dialect: Dialect,

    /// Number of siblings on each side used to locate a change.
    #[arg(long)]
    context_size: Option<usize>,

    /// Transfer blocks of features that the edit introduces.
    #[arg(long)]
    patch_new_features: bool,

    /// Reject unless source and target agree before the edit.
    #[arg(long)]
    require_zero_variant_drift: bool,

    /// JSON file with patch options; flags take precedence.
    #[arg(long)]
    options: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.global.log_level);

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let error_code = OutputErrorCode::from(&err);
            let response = ErrorResponse::from_error(&err);

            // Errors go to stdout as JSON
            let _ = emit_response(&response, &mut io::stdout());
            let _ = io::stdout().flush();

            ExitCode::from(error_code.code())
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: LogLevel) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Execute the CLI command.
fn execute(cli: Cli) -> Result<(), VarPatchError> {
    match cli.command {
        Command::Patch(args) => execute_patch(&args),
        Command::Annotation {
            line,
            dialect,
            format,
        } => execute_annotation(&line, dialect, format),
        Command::Tree {
            file,
            dialect,
            format,
        } => execute_tree(&file, dialect, format),
    }
}

// ============================================================================
// Commands
// ============================================================================

fn execute_patch(args: &PatchArgs) -> Result<(), VarPatchError> {
    let options = resolve_options(args)?;
    let parser = args.dialect.parser();

    let diff = match (&args.diff, &args.before, &args.after) {
        (Some(diff), _, _) => VariationDiff::from_unified(&read_file(diff)?, &parser)?,
        (None, Some(before), Some(after)) => {
            let before_name = before.display().to_string();
            let after_name = after.display().to_string();
            let (before_text, after_text) = (read_file(before)?, read_file(after)?);
            VariationDiff::from_named_sources(
                (before_name.as_str(), before_text.as_str()),
                (after_name.as_str(), after_text.as_str()),
                &parser,
            )?
        }
        _ => {
            return Err(VarPatchError::invalid_args(
                "either --diff or both --before and --after are required",
            ))
        }
    };
    let target = parse_tree(&args.target, &parser)?;
    tracing::debug!(target_size = target.size(), "inputs parsed");

    let outcome = patch(&diff, &target, &options)?;

    let matches_expected = match &args.expected {
        Some(path) => {
            let expected = parse_tree(path, &parser)?;
            Some(is_equivalent_result(&outcome.result_tree(), &expected))
        }
        None => None,
    };

    let mut stdout = io::stdout();
    match args.format {
        OutputFormat::Json => {
            emit_response(&PatchResponse::new(&outcome, matches_expected), &mut stdout)?
        }
        OutputFormat::Text => {
            write!(stdout, "{}", outcome.result_tree().unparse())?;
            if let Some(matches) = matches_expected {
                eprintln!(
                    "result {} the expected tree",
                    if matches { "matches" } else { "differs from" }
                );
            }
        }
    }
    Ok(())
}

fn execute_annotation(
    line: &str,
    dialect: Dialect,
    format: OutputFormat,
) -> Result<(), VarPatchError> {
    let annotation = dialect.parser().parse_annotation(line)?;
    let mut stdout = io::stdout();
    match format {
        OutputFormat::Json => {
            emit_response(&AnnotationResponse::new(line, &annotation), &mut stdout)?
        }
        OutputFormat::Text => writeln!(stdout, "{}", annotation)?,
    }
    Ok(())
}

fn execute_tree(file: &Path, dialect: Dialect, format: OutputFormat) -> Result<(), VarPatchError> {
    let tree = parse_tree(file, &dialect.parser())?;
    let mut stdout = io::stdout();
    match format {
        OutputFormat::Json => emit_response(&TreeResponse::new(&tree), &mut stdout)?,
        OutputFormat::Text => write!(stdout, "{}", tree)?,
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Patch options from the options file, overridden by explicit flags.
fn resolve_options(args: &PatchArgs) -> Result<PatchOptions, VarPatchError> {
    let mut options = match &args.options {
        Some(path) => serde_json::from_str(&read_file(path)?).map_err(|e| {
            VarPatchError::invalid_args(format!("invalid options file {}: {}", path.display(), e))
        })?,
        None => PatchOptions::default(),
    };
    if let Some(context_size) = args.context_size {
        options.context_size = context_size;
    }
    options.patch_new_features |= args.patch_new_features;
    options.require_zero_variant_drift |= args.require_zero_variant_drift;
    Ok(options)
}

fn read_file(path: &Path) -> Result<String, VarPatchError> {
    fs::read_to_string(path).map_err(|e| {
        VarPatchError::invalid_args(format!("cannot read {}: {}", path.display(), e))
    })
}

fn parse_tree(path: &Path, parser: &dyn AnnotationParser) -> Result<VariationTree, VarPatchError> {
    let source = read_file(path)?;
    Ok(VariationTree::parse(&path.display().to_string(), &source, parser)?)
}

// ============================================================================
// Tests
// ============================================================================
