//! Query command
//!
//! Read-only questions about one package. A "not found" answer from a
//! value query exits non-zero so scripts can branch on it.

use super::Session;
use crate::cli::args::QueryKind;
use crate::error::{AppkgError, Result};
use crate::packages::PackageBackend;
use crate::ui as output;
use crate::utils::machine_output;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryAnswer {
    Flag(bool),
    Text(Option<String>),
    List(Option<Vec<String>>),
}

/// Ask `backend` without printing anything.
pub fn answer(backend: &dyn PackageBackend, kind: QueryKind, package: &str) -> Result<QueryAnswer> {
    Ok(match kind {
        QueryKind::Installed => QueryAnswer::Flag(backend.is_installed(package)?),
        QueryKind::Available => QueryAnswer::Flag(backend.is_available(package)?),
        QueryKind::Deps => QueryAnswer::List(backend.dependencies(package)?),
        QueryKind::Version => QueryAnswer::Text(backend.installed_version(package)?),
        QueryKind::Latest => QueryAnswer::Text(backend.latest_version(package)?),
        QueryKind::Info => QueryAnswer::Text(backend.info(package)?),
    })
}

pub fn run(session: &Session, kind: QueryKind, package: &str, format: Option<&str>) -> Result<()> {
    let answer = answer(session.backend.as_ref(), kind, package)?;

    if let Some(format) = format {
        let command = format!("query {}", kind.as_str());
        return machine_output::emit_v1(&command, session.kind.as_str(), &answer, vec![], format);
    }

    match answer {
        QueryAnswer::Flag(true) => println!("yes"),
        QueryAnswer::Flag(false) => {
            println!("no");
            return Err(AppkgError::PackageNotFound(package.to_string()));
        }
        QueryAnswer::Text(Some(text)) => println!("{}", text.trim_end()),
        QueryAnswer::List(Some(list)) => {
            if list.is_empty() {
                output::verbose(&format!("{} has no dependencies", package));
            }
            for item in list {
                println!("{}", item);
            }
        }
        QueryAnswer::Text(None) | QueryAnswer::List(None) => {
            return Err(AppkgError::PackageNotFound(package.to_string()));
        }
    }
    Ok(())
}
