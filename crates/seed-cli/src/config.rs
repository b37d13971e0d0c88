use seed_domain::config::Config;

const CONFIG_FILE: &str = "seed.toml";

/// Loads `./seed.toml` if present, falling back to defaults. Mirrors the
/// teacher's "config file is optional, defaults carry a usable workspace"
/// stance rather than requiring a config file to exist.
pub fn load_config() -> anyhow::Result<Config> {
    match std::fs::read_to_string(CONFIG_FILE) {
        Ok(contents) => Ok(Config::from_toml_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
        Err(e) => Err(e.into()),
    }
}
