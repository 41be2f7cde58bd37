use std::process::Command;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// `git describe` of the workspace, marked `-dirty` when there are local edits.
fn git_revision() -> Option<String> {
    let out = Command::new("git")
        .args(["describe", "--always", "--dirty", "--abbrev=10"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let rev = String::from_utf8(out.stdout).ok()?.trim().to_string();
    (!rev.is_empty()).then_some(rev)
}

/// Reproducible builds pin the timestamp through `SOURCE_DATE_EPOCH`.
fn build_time() -> OffsetDateTime {
    std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
        .unwrap_or_else(OffsetDateTime::now_utc)
}

fn main() {
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
    println!("cargo:rerun-if-changed=../../.git/HEAD");

    let rev = git_revision().unwrap_or_else(|| "unknown".to_string());
    let date = build_time()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown-date".to_string());

    println!("cargo:rustc-env=GIT_SHA={rev}");
    println!("cargo:rustc-env=BUILD_DATE={date}");
}
