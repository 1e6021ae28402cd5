//! Repo command
//!
//! Direct access to the local repository, for installers that stage files
//! themselves.

use super::Session;
use crate::cli::args::RepoCommand;
use crate::error::Result;
use crate::ui as output;
use std::path::PathBuf;

pub fn run(session: &Session, command: &RepoCommand) -> Result<()> {
    let backend = session.backend.as_ref();
    match command {
        RepoCommand::Add { files } => {
            let files: Vec<PathBuf> = files.iter().map(PathBuf::from).collect();
            let staged = backend.add_local(&files)?;
            for file in &staged {
                output::indent(&file.display().to_string(), 1);
            }
            output::success(&format!("Staged {} package file(s)", staged.len()));
        }
        RepoCommand::Refresh => {
            backend.refresh_local_index()?;
            output::success("Local repository index regenerated");
        }
        RepoCommand::Remove => {
            backend.remove_local()?;
            output::success("Local repository removed");
        }
    }
    Ok(())
}
