//! Command dispatcher
//!
//! Routes CLI commands to their appropriate handlers.

use crate::cli::args::{Cli, Command, StatusCommand};
use crate::commands::{self, Session};
use crate::error::Result;

/// Dispatch the parsed CLI command to the appropriate handler
pub fn dispatch(args: &Cli) -> Result<()> {
    let format = args.global.output_format().map(String::from);

    match &args.command {
        // these never touch a backend
        Command::Settings { command } => return commands::settings::run(command),
        Command::Completions { shell } => return commands::completions::run(*shell),
        _ => {}
    }

    let session = Session::open(args.global.backend.as_deref())?;

    match &args.command {
        Command::Install { app, packages } => commands::install::run(
            &session,
            commands::install::InstallOptions {
                app: app.clone(),
                packages: packages.clone(),
                format,
            },
        ),

        Command::Purge { app, update } => commands::purge::run(
            &session,
            commands::purge::PurgeOptions {
                app: app.clone(),
                update: *update,
                format,
            },
        ),

        Command::Query { what, package } => {
            commands::query::run(&session, *what, package, format.as_deref())
        }

        Command::Repo { command } => commands::repo::run(&session, command),

        Command::LockWait => commands::maintenance::lock_wait(&session),

        Command::Update => commands::maintenance::update(&session),

        Command::Status {
            command: StatusCommand::Refresh,
        } => commands::maintenance::refresh_status(&session, format.as_deref()),

        Command::Backend => commands::backend::run(&session, format.as_deref()),

        Command::PackageName { app } => commands::backend::package_name(&session, app),

        Command::Settings { .. } | Command::Completions { .. } => Ok(()),
    }
}
