//! CLI configuration management.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Workflow file used when a command is given no path.
    #[serde(default = "default_workflow")]
    pub workflow: PathBuf,
    /// Job whose needs decide a local run's verdict.
    #[serde(default)]
    pub gate_job: Option<String>,
    /// Output format.
    #[serde(default)]
    pub output_format: OutputFormat,
    /// Maximum concurrently running jobs during `run`.
    #[serde(default)]
    pub max_parallel: Option<usize>,
    /// Shell for `run` steps.
    #[serde(default = "default_shell")]
    pub shell: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            workflow: default_workflow(),
            gate_job: None,
            output_format: OutputFormat::default(),
            max_parallel: None,
            shell: default_shell(),
        }
    }
}

fn default_workflow() -> PathBuf {
    PathBuf::from(".github/workflows/integration_test.yaml")
}

fn default_shell() -> String {
    "sh".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

impl CliConfig {
    /// Load configuration from file.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(serde_yaml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the configuration file path.
    pub fn config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let dirs = directories::ProjectDirs::from("dev", "gatekeeper", "gatekeeper")
            .ok_or("Could not determine config directory")?;
        Ok(dirs.config_dir().join("config.yaml"))
    }

    /// Set a configuration value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "workflow" => self.workflow = PathBuf::from(value),
            "gate_job" => self.gate_job = Some(value.to_string()).filter(|v| !v.is_empty()),
            "shell" => self.shell = value.to_string(),
            "max_parallel" => {
                self.max_parallel = match value {
                    "" | "none" => None,
                    n => Some(
                        n.parse()
                            .ok()
                            .filter(|n| *n > 0)
                            .ok_or_else(|| format!("Invalid max_parallel: {}", value))?,
                    ),
                };
            }
            "output_format" => {
                self.output_format = OutputFormat::from_str(value, true)
                    .map_err(|_| format!("Invalid output format: {}", value))?;
            }
            _ => return Err(format!("Unknown config key: {}", key)),
        }
        Ok(())
    }
}
