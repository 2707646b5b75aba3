/// Returns a random path in the temporary directory with the given extension. The file is not created.
pub fn tmp_path(extension: &str) -> std::path::PathBuf {
    use rand::distributions::{Alphanumeric, DistString};

    const LEN: usize = 16;

    let mut name = String::with_capacity(LEN + 1 + extension.len());
    Alphanumeric.append_string(&mut rand::thread_rng(), &mut name, LEN);
    name.push('.');
    name.push_str(extension);
    std::env::temp_dir().join(name)
}
