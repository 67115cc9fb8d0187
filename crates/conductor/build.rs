use std::{env, fs, path::PathBuf, process::Command};

fn main() {
    write_version().expect("write version.rs");

    println!("cargo:rerun-if-env-changed=GIT_SHA");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=../../.git/HEAD");
}

fn write_version() -> anyhow::Result<()> {
    let pkg_version = env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());
    let git_sha = env::var("GIT_SHA")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(git_short_sha)
        .unwrap_or_else(|| "unknown".to_string());
    let built_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let full_version = format!("{pkg_version} (git {git_sha}, built {built_at})");

    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let contents = format!(
        "pub const VERSION: &str = \"{pkg_version}\";\n\
         pub const GIT_SHA: &str = \"{git_sha}\";\n\
         pub const BUILD_TIMESTAMP: &str = \"{built_at}\";\n\
         pub const FULL_VERSION: &str = \"{full_version}\";\n"
    );
    fs::write(out_dir.join("version.rs"), contents)?;
    Ok(())
}

fn git_short_sha() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
