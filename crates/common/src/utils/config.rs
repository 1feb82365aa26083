use anyhow::{Context, Result};
use ::config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Loads configuration into a struct from an optional file layered under
/// environment variables.
///
/// The file format follows the extension (TOML, YAML, JSON). Environment keys
/// use `<PREFIX>_` and `__` as the nesting separator, so `FAUCET_API__LISTEN_PORT`
/// maps to `api.listen_port`. Keys listed in `list_keys` are split on commas.
pub fn load_config<T: DeserializeOwned, P: AsRef<Path>>(
    path: P,
    env_prefix: &str,
    list_keys: &[&str],
) -> Result<T> {
    let mut env = Environment::with_prefix(env_prefix)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true);
    if !list_keys.is_empty() {
        env = env.list_separator(",");
        for key in list_keys {
            env = env.with_list_parse_key(key);
        }
    }

    let settings = Config::builder()
        .add_source(File::from(path.as_ref()).required(false))
        .add_source(env)
        .build()
        .context("Failed to build configuration")?;

    settings.try_deserialize::<T>().context("Failed to deserialize configuration")
}

/// Writes a configuration struct as TOML, creating parent directories.
pub fn save_config<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create config directory {}", parent.display()))?;
    }
    let text = toml::to_string_pretty(value).context("Failed to serialize configuration")?;
    std::fs::write(path, text).with_context(|| format!("cannot write {}", path.display()))
}
