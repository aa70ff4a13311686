use std::process::Command;

/// Set when packaging from a source tarball, where there is no `.git`.
const OVERRIDE: &str = "DUEJOBS_BUILD_SHA";

fn main() {
    // `duejobs-worker --version` reports which commit a deployed worker runs.
    let revision = std::env::var(OVERRIDE)
        .ok()
        .filter(|sha| !sha.trim().is_empty())
        .or_else(git_head)
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=DUEJOBS_GIT_SHA={revision}");
    println!("cargo:rerun-if-env-changed={OVERRIDE}");
    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=../../.git/refs/");
}

fn git_head() -> Option<String> {
    let out = Command::new("git")
        .args(["rev-parse", "--short=10", "HEAD"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let sha = String::from_utf8(out.stdout).ok()?;
    Some(sha.trim().to_string()).filter(|s| !s.is_empty())
}
