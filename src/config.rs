use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_TAGS: &[&str] = &[
    "Mercado",
    "Feira",
    "Conveniência",
    "Restaurante/Bar",
    "iFood",
    "Farmácia",
    "Transporte",
    "Casa",
    "Pet",
    "Outros",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Name of the household ledger; each household gets its own database.
    pub household: String,

    /// Everyone who shares the household's costs.
    #[serde(default)]
    pub users: Vec<String>,

    /// User acting when no `--user` is given.
    #[serde(default)]
    pub current_user: Option<String>,

    /// Tags offered alongside the ones already in the ledger.
    ///
    /// If missing (older configs), it is auto-filled with the built-in list.
    #[serde(default)]
    pub default_tags: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            household: "home".to_string(),
            users: Vec::new(),
            current_user: None,
            default_tags: builtin_tags(),
        }
    }
}

impl AppConfig {
    /// Adds `name` to the roster. The first user added becomes the current user.
    pub fn add_user(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("User name must not be empty"));
        }
        if self.users.iter().any(|u| u == name) {
            return Err(anyhow!("User '{name}' already exists"));
        }
        self.users.push(name.to_string());
        if self.current_user.is_none() {
            self.current_user = Some(name.to_string());
        }
        Ok(())
    }

    pub fn switch_user(&mut self, name: &str) -> Result<()> {
        if !self.users.iter().any(|u| u == name) {
            return Err(anyhow!(
                "No such user: '{name}'. Add it with: houseledger user add {name}"
            ));
        }
        self.current_user = Some(name.to_string());
        Ok(())
    }
}

fn builtin_tags() -> Vec<String> {
    DEFAULT_TAGS.iter().map(|t| t.to_string()).collect()
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

pub fn app_paths(override_home: Option<PathBuf>) -> Result<AppPaths> {
    if let Some(home) = override_home {
        return Ok(AppPaths {
            config_dir: home.join("config"),
            data_dir: home.join("data"),
        });
    }

    let proj = ProjectDirs::from("com", "houseledger", "houseledger")
        .context("Failed to resolve platform directories")?;

    Ok(AppPaths {
        config_dir: proj.config_dir().to_path_buf(),
        data_dir: proj.data_dir().to_path_buf(),
    })
}

pub fn load_or_init_config(paths: &AppPaths) -> Result<(AppConfig, PathBuf)> {
    fs::create_dir_all(&paths.config_dir)
        .with_context(|| format!("Failed to create config dir {}", paths.config_dir.display()))?;

    let cfg_path = paths.config_dir.join("config.json");
    if !cfg_path.exists() {
        let cfg = AppConfig::default();
        write_config(&cfg_path, &cfg)?;
        return Ok((cfg, cfg_path));
    }

    let raw = fs::read_to_string(&cfg_path)
        .with_context(|| format!("Failed to read {}", cfg_path.display()))?;
    let mut cfg: AppConfig = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", cfg_path.display()))?;

    // Auto-migrate older config versions.
    let mut changed = false;
    if cfg.default_tags.is_empty() {
        cfg.default_tags = builtin_tags();
        changed = true;
    }
    if let Some(current) = cfg.current_user.clone() {
        if !cfg.users.contains(&current) {
            cfg.users.push(current);
            changed = true;
        }
    }
    if changed {
        write_config(&cfg_path, &cfg)?;
    }

    Ok((cfg, cfg_path))
}

pub fn write_config(path: &Path, cfg: &AppConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(cfg)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn household_slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        let mapped = match ch {
            'a'..='z' | '0'..='9' | '-' | '_' => Some(ch),
            'A'..='Z' => Some(ch.to_ascii_lowercase()),
            ' ' | ':' | '/' | '\\' => Some('-'),
            _ => None,
        };
        if let Some(c) = mapped {
            if !(c == '-' && out.ends_with('-')) {
                out.push(c);
            }
        }
    }

    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "household".to_string()
    } else {
        trimmed.to_string()
    }
}
