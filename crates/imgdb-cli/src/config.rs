use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use imgdb_store::StoreConfig;

/// Environment variable naming the database file.
pub const PATH_ENV: &str = "IMDB_PATH";

/// Store settings from the optional TOML file, with the database path taken
/// from `--db`, then `IMDB_PATH`, then the file.
pub fn load(config_file: Option<&Path>, db: Option<&Path>) -> anyhow::Result<StoreConfig> {
    let env = std::env::var_os(PATH_ENV).map(PathBuf::from);
    resolve(config_file, db, env)
}

fn resolve(
    config_file: Option<&Path>,
    db: Option<&Path>,
    env: Option<PathBuf>,
) -> anyhow::Result<StoreConfig> {
    let mut config = match config_file {
        Some(file) => {
            let text = fs::read_to_string(file)
                .with_context(|| format!("reading config {}", file.display()))?;
            toml::from_str(&text).with_context(|| format!("parsing config {}", file.display()))?
        }
        None => StoreConfig::default(),
    };
    if let Some(path) = db.map(Path::to_path_buf).or(env) {
        config.path = path;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, text: &str) -> PathBuf {
        let file = dir.path().join("imgdb.toml");
        fs::write(&file, text).unwrap();
        file
    }

    #[test]
    fn defaults_without_file() {
        let config = resolve(None, None, None).unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn file_settings_are_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(
            &dir,
            "path = \"images.imdb\"\ncompression_level = 9\nsync_on_commit = true\n",
        );
        let config = resolve(Some(file.as_path()), None, None).unwrap();
        assert_eq!(config.path, PathBuf::from("images.imdb"));
        assert_eq!(config.compression_level, 9);
        assert!(config.sync_on_commit);
        assert_eq!(config.kdf_iterations, 100_000);
    }

    #[test]
    fn flag_beats_env_beats_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(&dir, "path = \"file.imdb\"\n");

        let config = resolve(Some(file.as_path()), None, Some("env.imdb".into())).unwrap();
        assert_eq!(config.path, PathBuf::from("env.imdb"));

        let flag = Path::new("flag.imdb");
        let config = resolve(Some(file.as_path()), Some(flag), Some("env.imdb".into())).unwrap();
        assert_eq!(config.path, PathBuf::from("flag.imdb"));
    }

    #[test]
    fn bad_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_config(&dir, "compression_level = \"high\"\n");
        let err = resolve(Some(file.as_path()), None, None).unwrap_err();
        assert!(err.to_string().contains("parsing config"));

        let missing = dir.path().join("missing.toml");
        assert!(resolve(Some(missing.as_path()), None, None).is_err());
    }
}
