use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

/// `~/.quadrant/config.toml`. Only the OAuth client credentials are
/// required; everything else has defaults.
#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct QuadrantConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Overrides the Google Tasks endpoint; mainly for test servers.
    pub tasks_base_url: Option<String>,
}

/// The quadrant home holds `config.toml`, `session.json`, and the
/// provider's refresh-token file. `QUADRANT_HOME` overrides the default
/// `~/.quadrant`.
pub fn find_quadrant_home() -> anyhow::Result<PathBuf> {
    let home = match std::env::var("QUADRANT_HOME") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()
            .context("could not determine a home directory")?
            .join(".quadrant"),
    };
    std::fs::create_dir_all(&home)
        .with_context(|| format!("could not create {}", home.display()))?;
    Ok(home)
}

pub fn load_config(home: &Path) -> anyhow::Result<QuadrantConfig> {
    let path = home.join("config.toml");
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(QuadrantConfig::default());
        }
        Err(err) => {
            return Err(anyhow::Error::from(err)
                .context(format!("could not read {}", path.display())));
        }
    };
    toml::from_str(&contents).with_context(|| format!("could not parse {}", path.display()))
}
