mod cli;
mod commands;
mod config;
mod document;
mod engine;
mod paths;
mod progress;
mod sigint;
mod ui;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use commands::Exit;
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };
    let global = &cli.global;

    let result = match &cli.command {
        Command::Plan(args) => commands::plan::run(&ctx, global, args),
        Command::Validate(args) => commands::validate::run(&ctx, global, args),
        Command::Apply(args) => commands::apply::run(&ctx, global, args),
        Command::Destroy(args) => commands::destroy::run(&ctx, global, args),
        Command::Resolve(args) => commands::resolve::run(&ctx, global, args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(*shell, &mut cmd, "stratum", &mut io::stdout());
            Ok(Exit::Success)
        }
    };

    let exit = match result {
        Ok(exit) => exit,
        Err(err) => report_error(&err),
    };
    ExitCode::from(exit.code())
}

/// Print an error with its remediation and pick the exit status.
fn report_error(err: &anyhow::Error) -> Exit {
    ui::error(&format!("{err:#}"));

    if let Some(engine_err) = err.downcast_ref::<converge::Error>() {
        if let converge::Error::Validation { findings } = engine_err {
            for finding in findings {
                ui::error(&format!("{}: {}", finding.resource, finding.message));
                ui::hint(&finding.remediation);
            }
        }
        ui::hint(&engine_err.remediation());
        return exit_for(engine_err);
    }
    if let Some(doc_err) = err.downcast_ref::<document::DocumentError>() {
        ui::hint(doc_err.remediation());
        return Exit::Invalid;
    }
    Exit::Fatal
}

fn exit_for(err: &converge::Error) -> Exit {
    use converge::Error;

    match err {
        Error::Cycle { .. }
        | Error::DuplicateResource { .. }
        | Error::UnknownDependency { .. }
        | Error::UnknownTarget { .. }
        | Error::Validation { .. }
        | Error::PurgeNotConfirmed
        | Error::PurgeProtected { .. } => Exit::Invalid,
        Error::DriftConflict { .. } => Exit::Declined,
        Error::Backend(_) | Error::Confirm(_) | Error::ThreadPool(_) => Exit::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudkit::ResourceKey;

    #[test]
    fn test_graph_errors_are_validation_failures() {
        let err = converge::Error::Cycle {
            path: vec![ResourceKey::scope("ScopeA"), ResourceKey::scope("ScopeA")],
        };
        assert_eq!(exit_for(&err), Exit::Invalid);
    }

    #[test]
    fn test_drift_conflict_is_declined() {
        let err = anyhow::Error::new(converge::Error::DriftConflict {
            resources: vec!["endpoint/ScopeA/Endpoint1".into()],
        });
        assert_eq!(report_error(&err), Exit::Declined);
    }

    #[test]
    fn test_document_errors_survive_context() {
        let err = anyhow::Error::new(document::DocumentError::UnsupportedFormat {
            path: "infra.yaml".into(),
        })
        .context("Failed to load infra.yaml");
        assert_eq!(report_error(&err), Exit::Invalid);
    }

    #[test]
    fn test_backend_errors_are_fatal() {
        let err = anyhow::anyhow!("state file is corrupt");
        assert_eq!(report_error(&err), Exit::Fatal);
    }
}
