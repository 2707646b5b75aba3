use std::{env, fs, io::BufRead, path::PathBuf};

/// Returns stdout of a successful git invocation, `None` when git is unavailable or fails, e.g. when building from a
/// source archive.
fn git<'a, I: IntoIterator<Item = &'a str>>(args: I) -> Option<Vec<u8>> {
    let output = std::process::Command::new("git")
        .args(args)
        .output()
        .ok()?;
    output.status.success().then_some(output.stdout)
}

fn git_commit_hash() -> Option<String> {
    let stdout = git(["rev-parse", "--short", "HEAD"])?;
    let mut lines = stdout.lines();
    let commit_hash = lines.next()?.ok()?;
    lines.next().is_none().then_some(commit_hash)
}

fn git_is_clean() -> bool {
    git(["status", "--porcelain"]).is_some_and(|stdout| stdout.is_empty())
}

fn main() {
    println!("cargo:rerun-if-env-changed=DRMAA2_K8S_RELEASE");

    let doing_release = option_env!("DRMAA2_K8S_RELEASE")
        .map(|env| matches!(env, "1" | "true"))
        .unwrap_or_default();

    let mut version = env!("CARGO_PKG_VERSION").to_owned();
    if !doing_release {
        if let Some(commit_hash) = git_commit_hash() {
            version.push('+');
            version.push_str(&commit_hash);
            if !git_is_clean() {
                version.push_str(".dirty");
            }
        }
    }

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").expect("cargo sets OUT_DIR"));
    fs::write(
        out_dir.join("version.rs"),
        format!("pub const VERSION: &str = {version:?};"),
    )
    .expect("unable to write version.rs");
}
