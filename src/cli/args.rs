use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

#[derive(Parser, Debug)]
#[command(
    name = "appkg",
    about = "Install and remove the system packages an app needs",
    long_about = "Cross-distro package orchestration for app installers.\n\
                  Stages local packages, waits for package-manager locks and \
                  remembers which packages each app pulled in.",
    version,
    next_line_help = false,
    term_width = 80
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalFlags,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Parser, Debug)]
pub struct GlobalFlags {
    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Quiet mode
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Package manager to use (auto, dpkg, apk, pacman, null)
    #[arg(long, value_name = "BACKEND", global = true)]
    pub backend: Option<String>,

    /// Machine-readable output format
    #[arg(long, value_name = "FORMAT", value_parser = ["json", "yaml"], global = true)]
    pub format: Option<String>,

    /// Shorthand for --format json
    #[arg(long, global = true, conflicts_with = "format")]
    pub json: bool,
}

impl GlobalFlags {
    pub fn output_format(&self) -> Option<&str> {
        if self.json {
            Some("json")
        } else {
            self.format.as_deref()
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install packages on behalf of an app
    Install {
        /// App the packages belong to
        app: String,

        /// Package names, `name (>= version)`, local files, URLs or `*` patterns.
        /// `-t <release>` pins the following names to a release (apt only)
        #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        packages: Vec<String>,
    },

    /// Remove the packages an app installed
    Purge {
        app: String,

        /// Keep dependencies around because the app is about to be reinstalled
        #[arg(long)]
        update: bool,
    },

    /// Ask the package manager about one package
    Query {
        #[arg(value_enum)]
        what: QueryKind,

        package: String,
    },

    /// Manage the local package repository directly
    Repo {
        #[command(subcommand)]
        command: RepoCommand,
    },

    /// Wait until the package manager is free
    LockWait,

    /// Refresh package indices
    Update,

    /// Package-app status
    Status {
        #[command(subcommand)]
        command: StatusCommand,
    },

    /// Show the detected backend and architecture
    Backend,

    /// Print the placeholder package name for an app
    PackageName { app: String },

    /// Show or change settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryKind {
    Installed,
    Available,
    Deps,
    Version,
    Latest,
    Info,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Installed => "installed",
            QueryKind::Available => "available",
            QueryKind::Deps => "deps",
            QueryKind::Version => "version",
            QueryKind::Latest => "latest",
            QueryKind::Info => "info",
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum RepoCommand {
    /// Move package files into the local repository
    Add {
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Regenerate the local repository index
    Refresh,
    /// Delete the local repository
    Remove,
}

#[derive(Subcommand, Debug)]
pub enum StatusCommand {
    /// Re-check every package-app against the package manager
    Refresh,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Show all settings
    Show,
    /// Set a setting value
    Set { key: String, value: String },
    /// Reset a setting to its default
    Reset { key: String },
}
