use anyhow::{Context, Result};
use reconcile_core::EngineConfig;
use reconcile_document::Package;
use std::env;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Environment variable consulted when `--config` is not given
pub const CONFIG_ENV: &str = "RECONCILE_CONFIG";

/// `--config` wins over [`CONFIG_ENV`]; neither means defaults
pub fn resolve_config_path(flag: Option<PathBuf>) -> Option<PathBuf> {
    flag.or_else(|| {
        env::var_os(CONFIG_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    })
}

pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config = EngineConfig::from_toml_str(&raw)
        .with_context(|| format!("Invalid config in {}", path.display()))?;
    log::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Read a package from `input`, or stdin when absent
pub fn read_package(input: Option<&Path>) -> Result<Package> {
    let raw = match input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read package from {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read package from stdin")?;
            buffer
        }
    };

    if raw.trim().is_empty() {
        anyhow::bail!("Package is empty. Provide --input or pipe a ResourceList via stdin.");
    }
    Package::from_json(&raw).context("Invalid ResourceList")
}

/// Write JSON to `output`, or stdout when absent
pub fn write_json(json: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => fs::write(path, format!("{json}\n"))
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{json}").context("Failed to write to stdout")
        }
    }
}
