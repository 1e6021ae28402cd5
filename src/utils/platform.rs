use crate::process::Invocation;
use std::process::Command;

/// Build a direct program invocation.
///
/// - plain: `program args...`
/// - elevated: `sudo -E program args...`, so the per-invocation locale
///   survives the privilege switch
pub fn build_program_command(invocation: &Invocation) -> Command {
    let (program, args) = invocation.argv();
    let mut cmd = Command::new(program);
    cmd.args(args);
    for (key, value) in &invocation.env {
        cmd.env(key, value);
    }
    if let Some(dir) = &invocation.cwd {
        cmd.current_dir(dir);
    }
    cmd
}

/// Architecture this binary was built for (`x86_64`, `aarch64`...).
pub fn machine_arch() -> &'static str {
    std::env::consts::ARCH
}
