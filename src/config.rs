use std::path::{Path, PathBuf};

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Behavior
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct Behavior {
    /// A terminal created by splitting starts in the split terminal's cwd.
    pub preserve_cwd: bool,
    /// Fraction moved per adjust-split-position keypress.
    pub split_step: f64,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            preserve_cwd: true,
            split_step: 0.05,
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    pub save: bool,
    pub restore: bool,
    /// Overrides the default location under the data dir.
    pub path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            save: true,
            restore: true,
            path: None,
        }
    }
}

impl SessionConfig {
    pub fn file_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(crate::session::store::state_file_path)
    }

    /// Where the run loop should write the session, if anywhere.
    pub fn save_path(&self) -> Option<PathBuf> {
        self.save.then(|| self.file_path())
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Config {
    pub behavior: Behavior,
    pub session: SessionConfig,
}

impl Config {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("splitpane").join("config.toml"))
            .unwrap_or_default()
    }

    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Self::default(),
        };

        match Self::from_toml(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("invalid config at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        let raw: RawConfig = toml::from_str(content)?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawConfig) -> Self {
        let mut config = Self::default();

        if let Some(b) = raw.behavior {
            if let Some(v) = b.preserve_cwd {
                config.behavior.preserve_cwd = v;
            }
            if let Some(v) = b.split_step {
                if v.is_finite() && v > 0.0 && v <= 1.0 {
                    config.behavior.split_step = v;
                } else {
                    tracing::warn!("ignoring split_step {} outside (0, 1]", v);
                }
            }
        }

        if let Some(s) = raw.session {
            if let Some(v) = s.save {
                config.session.save = v;
            }
            if let Some(v) = s.restore {
                config.session.restore = v;
            }
            if let Some(p) = s.path {
                config.session.path = Some(expand_home(&p));
            }
        }

        config
    }
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

// ---------------------------------------------------------------------------
// Raw deserialization structs
// ---------------------------------------------------------------------------

#[derive(Deserialize, Default)]
struct RawConfig {
    behavior: Option<RawBehavior>,
    session: Option<RawSession>,
}

#[derive(Deserialize, Default)]
struct RawBehavior {
    preserve_cwd: Option<bool>,
    split_step: Option<f64>,
}

#[derive(Deserialize, Default)]
struct RawSession {
    save: Option<bool>,
    restore: Option<bool>,
    path: Option<String>,
}
