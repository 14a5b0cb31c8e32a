//! Simple configuration persistence for NEXUS
//!
//! Stores start-up defaults and the last folder a track was loaded from.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use nexus_audio::{
    EngineSettings, DEFAULT_BPM, DEFAULT_REVERB_SIZE, DEFAULT_REVERB_TIME, DEFAULT_TAPE_STOP_SECS,
};
use tracing::warn;

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Nominal BPM given to freshly loaded decks
    pub default_bpm: f32,
    /// Tape stop length when none is given
    pub tape_stop_secs: f64,
    pub reverb_time: f32,
    pub reverb_size: f32,
    /// Last folder a track was loaded from; relative paths resolve against it
    pub last_track_folder: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_bpm: DEFAULT_BPM,
            tape_stop_secs: DEFAULT_TAPE_STOP_SECS,
            reverb_time: DEFAULT_REVERB_TIME,
            reverb_size: DEFAULT_REVERB_SIZE,
            last_track_folder: None,
        }
    }
}

impl Config {
    /// Load config from the default location
    ///
    /// Returns default config if file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        let path = Self::config_path();
        Self::load_from(&path).unwrap_or_default()
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Save config to the default location
    pub fn save(&self) -> io::Result<()> {
        let path = Self::config_path();
        self.save_to(&path)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = self.serialize();
        fs::write(path, content)
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nexus")
            .join("config.txt")
    }

    /// Engine start-up defaults drawn from this config
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            default_bpm: self.default_bpm,
            tape_stop_secs: self.tape_stop_secs,
            reverb_time: self.reverb_time,
            reverb_size: self.reverb_size,
        }
    }

    /// Resolve a track path typed by the user
    ///
    /// A relative path that doesn't exist from the working directory is
    /// tried against the last folder a track was loaded from.
    pub fn resolve_track_path(&self, path: &Path) -> PathBuf {
        if path.is_relative() && !path.exists() {
            if let Some(ref folder) = self.last_track_folder {
                let candidate = folder.join(path);
                if candidate.exists() {
                    return candidate;
                }
            }
        }
        path.to_path_buf()
    }

    /// Remember the folder of a track that loaded successfully
    pub fn remember_track(&mut self, path: &Path) {
        let folder = fs::canonicalize(path)
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));
        if let Some(folder) = folder {
            self.last_track_folder = Some(folder);
        }
    }

    /// Parse config from simple key=value format
    fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "default_bpm" => parse_into(key, value, &mut config.default_bpm, |v| v > 0.0),
                "tape_stop_secs" => parse_into(key, value, &mut config.tape_stop_secs, |v| v > 0.0),
                "reverb_time" => parse_into(key, value, &mut config.reverb_time, |v| v > 0.0),
                "reverb_size" => {
                    parse_into(key, value, &mut config.reverb_size, |v| (0.0..=1.0).contains(&v))
                }
                "last_track_folder" => {
                    if !value.is_empty() {
                        config.last_track_folder = Some(PathBuf::from(value));
                    }
                }
                _ => {} // Ignore unknown keys
            }
        }

        config
    }

    /// Serialize config to simple key=value format
    fn serialize(&self) -> String {
        let mut lines = vec![
            "# NEXUS Configuration".to_string(),
            format!("default_bpm={}", self.default_bpm),
            format!("tape_stop_secs={}", self.tape_stop_secs),
            format!("reverb_time={}", self.reverb_time),
            format!("reverb_size={}", self.reverb_size),
        ];

        if let Some(ref folder) = self.last_track_folder {
            lines.push(format!("last_track_folder={}", folder.display()));
        }

        lines.join("\n")
    }
}

/// Overwrite `slot` when `value` parses and passes `valid`; keep it otherwise
fn parse_into<T>(key: &str, value: &str, slot: &mut T, valid: impl Fn(T) -> bool)
where
    T: std::str::FromStr + Copy,
{
    match value.parse::<T>() {
        Ok(parsed) if valid(parsed) => *slot = parsed,
        _ => warn!(key, value, "Ignoring invalid config value"),
    }
}
