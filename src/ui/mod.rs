use colored::Colorize;
use std::sync::atomic::{AtomicBool, Ordering};

pub mod notice;

static QUIET: AtomicBool = AtomicBool::new(false);
static VERBOSE: AtomicBool = AtomicBool::new(false);
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Apply the `color` setting. `auto` follows NO_COLOR and whether stdout is a tty.
pub fn init_colors(mode: &str) {
    match mode {
        "always" => colored::control::set_override(true),
        "never" => colored::control::set_override(false),
        _ => {
            let enabled =
                std::env::var_os("NO_COLOR").is_none() && atty::is(atty::Stream::Stdout);
            colored::control::set_override(enabled);
        }
    }
}

pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::Relaxed);
}

pub fn set_verbose(verbose: bool) {
    VERBOSE.store(verbose, Ordering::Relaxed);
}

pub fn is_quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

pub fn mark_interrupted() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

pub fn header(title: &str) {
    if is_quiet() {
        return;
    }
    println!("\n{}", title.bold().underline());
}

pub fn success(msg: &str) {
    if is_quiet() {
        return;
    }
    println!("{} {}", "✓".green().bold(), msg);
}

pub fn info(msg: &str) {
    if is_quiet() {
        return;
    }
    println!("{} {}", "ℹ".blue().bold(), msg);
}

/// Debug-level note, only shown with `--verbose`.
pub fn verbose(msg: &str) {
    if !is_verbose() {
        return;
    }
    eprintln!("{} {}", "·".bright_black(), msg.bright_black());
}

pub fn warning(msg: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), msg);
}

pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

pub fn separator() {
    let width = terminal_size::terminal_size()
        .map(|(terminal_size::Width(w), _)| usize::from(w).min(80))
        .unwrap_or(60);
    eprintln!("{}", "─".repeat(width).bright_black());
}

pub fn keyval(key: &str, val: &str) {
    println!("{}: {}", key.bold(), val);
}

pub fn indent(msg: &str, level: usize) {
    if is_quiet() {
        return;
    }
    let spaces = " ".repeat(level * 2);
    println!("{}{}", spaces, msg);
}

/// Dump captured tool output for manual diagnosis. Never suppressed by `--quiet`.
pub fn raw_output(output: &str) {
    separator();
    eprintln!("{}", output.trim_end());
    separator();
}

/// Render a command line the way a user would type it.
pub fn render_command(program: &str, args: &[String]) -> String {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(program);
    parts.extend(args.iter().map(String::as_str));
    shlex::try_join(parts).unwrap_or_else(|_| format!("{} {}", program, args.join(" ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_command_quotes_spaces() {
        let rendered = render_command(
            "apt-get",
            &["install".to_string(), "a (>= 1.0)".to_string()],
        );
        assert!(rendered.starts_with("apt-get install "));
        assert!(rendered.contains("a (>= 1.0)"));
        assert_ne!(rendered, "apt-get install a (>= 1.0)");
    }
}
