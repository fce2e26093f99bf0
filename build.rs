//! Build script for the EmoSense runtime
//!
//! Embeds git revision, build timestamp, target and compiler version so
//! `emosense-runtime version` and benchmark reports can identify the build.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let git_hash = command_output("git", &["rev-parse", "--short=8", "HEAD"]);
    let git_branch = command_output("git", &["rev-parse", "--abbrev-ref", "HEAD"]);
    let git_dirty = is_git_dirty();
    let rustc_version = command_output("rustc", &["--version"]);

    let build_timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    let host = env::var("HOST").unwrap_or_else(|_| "unknown".to_string());

    for (key, value) in [
        ("EMOSENSE_GIT_HASH", git_hash.as_str()),
        ("EMOSENSE_GIT_BRANCH", git_branch.as_str()),
        ("EMOSENSE_GIT_DIRTY", git_dirty),
        ("EMOSENSE_BUILD_TIMESTAMP", build_timestamp.as_str()),
        ("EMOSENSE_TARGET", target.as_str()),
        ("EMOSENSE_PROFILE", profile.as_str()),
        ("EMOSENSE_RUSTC_VERSION", rustc_version.as_str()),
        ("EMOSENSE_HOST", host.as_str()),
    ] {
        println!("cargo:rustc-env={}={}", key, value);
    }

    eprintln!("Building EmoSense runtime:");
    eprintln!("  Git:     {}{}", git_hash, if git_dirty == "true" { " (dirty)" } else { "" });
    eprintln!("  Target:  {}", target);
    eprintln!("  Profile: {}", profile);
}

/// Trimmed stdout of a successful command, or "unknown"
fn command_output(program: &str, args: &[&str]) -> String {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn is_git_dirty() -> &'static str {
    Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| if output.stdout.is_empty() { "false" } else { "true" })
        .unwrap_or("unknown")
}
