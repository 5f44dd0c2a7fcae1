use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Results root and mutation workspace locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Test runner used to classify passing and failing tests
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Mutation tool invocation
    #[serde(default)]
    pub mutation: MutationToolConfig,

    /// Module under test
    #[serde(default)]
    pub module: ModuleConfig,

    /// Per-experiment artifact file names
    #[serde(default)]
    pub files: FilesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root directory searched for experiment directories
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// The mutation tool's workspace, shared by every experiment
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Program and leading arguments; the test module and `-v` are appended
    #[serde(default = "default_runner_command")]
    pub command: Vec<String>,

    #[serde(default = "default_runner_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationToolConfig {
    /// Program and leading arguments; `run` / `results` are appended
    #[serde(default = "default_mutation_command")]
    pub command: Vec<String>,

    /// Hard limit for the `run` step
    #[serde(default = "default_mutation_timeout")]
    pub timeout_seconds: u64,

    /// Where the reduced test source is written, relative to the workspace
    #[serde(default = "default_staged_test_path")]
    pub staged_test_path: PathBuf,

    /// Cache and per-mutant metadata purged before every run, relative to the workspace
    #[serde(default = "default_reset_globs")]
    pub reset_globs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Import name of the module under test
    #[serde(default = "default_module_name")]
    pub name: String,

    /// Directory holding the module, relative to the workspace
    #[serde(default = "default_module_search_path")]
    pub search_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    #[serde(default = "default_test_file")]
    pub test_file: String,

    #[serde(default = "default_results_file")]
    pub results_file: String,

    #[serde(default = "default_stats_file")]
    pub stats_file: String,

    #[serde(default = "default_analysis_file")]
    pub analysis_file: String,

    #[serde(default = "default_experiment_file")]
    pub experiment_file: String,

    /// Report file name is `<prefix>-<model>.md`
    #[serde(default = "default_report_prefix")]
    pub report_prefix: String,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("wyniki")
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("mutmut_workspace")
}

fn default_runner_command() -> Vec<String> {
    vec!["python".to_string(), "-m".to_string(), "unittest".to_string()]
}

fn default_runner_timeout() -> u64 {
    120
}

fn default_mutation_command() -> Vec<String> {
    vec!["mutmut".to_string()]
}

fn default_mutation_timeout() -> u64 {
    600 // 10 minutes
}

fn default_staged_test_path() -> PathBuf {
    PathBuf::from("tests").join("test_generated.py")
}

fn default_reset_globs() -> Vec<String> {
    vec![".mutmut-cache".to_string(), "mutants/**/*.meta".to_string()]
}

fn default_module_name() -> String {
    "calculator".to_string()
}

fn default_module_search_path() -> PathBuf {
    PathBuf::from("src")
}

fn default_test_file() -> String {
    "mutmut_test.py".to_string()
}

fn default_results_file() -> String {
    "mutmut_results.txt".to_string()
}

fn default_stats_file() -> String {
    "mutmut-stats.json".to_string()
}

fn default_analysis_file() -> String {
    "analysis_results.json".to_string()
}

fn default_experiment_file() -> String {
    "experiment.json".to_string()
}

fn default_report_prefix() -> String {
    "podsumowanie".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            workspace_dir: default_workspace_dir(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command: default_runner_command(),
            timeout_seconds: default_runner_timeout(),
        }
    }
}

impl Default for MutationToolConfig {
    fn default() -> Self {
        Self {
            command: default_mutation_command(),
            timeout_seconds: default_mutation_timeout(),
            staged_test_path: default_staged_test_path(),
            reset_globs: default_reset_globs(),
        }
    }
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            name: default_module_name(),
            search_path: default_module_search_path(),
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            test_file: default_test_file(),
            results_file: default_results_file(),
            stats_file: default_stats_file(),
            analysis_file: default_analysis_file(),
            experiment_file: default_experiment_file(),
            report_prefix: default_report_prefix(),
        }
    }
}

impl Config {
    /// Load configuration from file, or use defaults if not found
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(Self::default_config_path);

        let config = if let Some(ref path) = config_path {
            if path.exists() {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config from {:?}", path))?;
                toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config from {:?}", path))?
            } else {
                Config::default()
            }
        } else {
            Config::default()
        };

        Ok(config)
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "mutmut-backfill", "mutmut-backfill")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Apply command line overrides on top of the loaded file.
    pub fn apply_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(ref dir) = overrides.results_dir {
            self.paths.results_dir = dir.clone();
        }
        if let Some(ref dir) = overrides.workspace_dir {
            self.paths.workspace_dir = dir.clone();
        }
        if let Some(ref level) = overrides.log_level {
            self.general.log_level = level.clone();
        }
    }

    /// Absolute-or-relative path of the staged test file inside the workspace.
    pub fn staged_test_file(&self) -> PathBuf {
        self.paths
            .workspace_dir
            .join(&self.mutation.staged_test_path)
    }
}

/// Values given on the command line that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub results_dir: Option<PathBuf>,
    pub workspace_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}
