use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use humantime::parse_duration;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::cli::CommandLineArgs;
use crate::model::{ResizePolicy, StoreOptions, MAX_TASKS, MIN_TASKS};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read config file {}.", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file {}.", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Task count {0} is outside {}..={}.", MIN_TASKS, MAX_TASKS)]
    TaskCount(usize),

    #[error("Tick period must be longer than zero.")]
    ZeroTick,
}

/// Everything a session can be tuned with. Values come from the defaults,
/// then the config file, then the command line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Settings {
    /// Task slots at the start of the day.
    pub tasks: usize,
    #[serde(deserialize_with = "human_duration")]
    pub tick: Duration,
    pub resize_policy: ResizePolicy,
    pub require_focus_time: bool,
    pub live: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            tasks: MIN_TASKS,
            tick: Duration::from_secs(1),
            resize_policy: ResizePolicy::default(),
            require_focus_time: true,
            live: false,
        }
    }
}

fn human_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    parse_duration(&text).map_err(serde::de::Error::custom)
}

/// Where the config file lives when none is given on the command line.
pub fn default_config_file() -> Option<PathBuf> {
    ProjectDirs::from("com", "gozque", "dayfocus")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

impl Settings {
    pub fn from_toml(text: &str) -> Result<Settings, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn load(path: &Path) -> Result<Settings, SettingsError> {
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Settings::from_toml(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the explicitly requested file, or the default one if it exists,
    /// or fall back to the defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Settings, SettingsError> {
        if let Some(path) = explicit {
            debug!(path = %path.display(), "loading config");
            return Settings::load(path);
        }
        match default_config_file() {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "loading default config");
                Settings::load(&path)
            }
            _ => Ok(Settings::default()),
        }
    }

    /// Let command-line flags override what the file said.
    pub fn with_args(mut self, args: &CommandLineArgs) -> Settings {
        if let Some(tasks) = args.tasks {
            self.tasks = tasks;
        }
        if let Some(tick) = args.tick {
            self.tick = tick;
        }
        if let Some(policy) = args.resize_policy {
            self.resize_policy = policy;
        }
        if args.allow_empty_completion {
            self.require_focus_time = false;
        }
        if args.live {
            self.live = true;
        }
        self
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(MIN_TASKS..=MAX_TASKS).contains(&self.tasks) {
            return Err(SettingsError::TaskCount(self.tasks));
        }
        if self.tick == Duration::from_secs(0) {
            return Err(SettingsError::ZeroTick);
        }
        Ok(())
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            initial_count: self.tasks,
            resize_policy: self.resize_policy,
            require_focus_time: self.require_focus_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use structopt::StructOpt;

    fn args(flags: &[&str]) -> CommandLineArgs {
        CommandLineArgs::from_iter_safe(std::iter::once("dayfocus").chain(flags.iter().copied()))
            .unwrap()
    }

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(Settings::from_toml("").unwrap(), Settings::default());
    }

    #[test]
    fn file_values_are_read() {
        let settings = Settings::from_toml(
            r#"
            tasks = 5
            tick = "250ms"
            resize-policy = "keep-work"
            require-focus-time = false
            live = true
            "#,
        )
        .unwrap();

        assert_eq!(settings.tasks, 5);
        assert_eq!(settings.tick, Duration::from_millis(250));
        assert_eq!(settings.resize_policy, ResizePolicy::KeepWork);
        assert!(!settings.require_focus_time);
        assert!(settings.live);
    }

    #[rstest]
    #[case("tick = \"soon\"")]
    #[case("resize-policy = \"shrink\"")]
    #[case("colour = \"blue\"")]
    fn bad_files_are_rejected(#[case] text: &str) {
        assert!(Settings::from_toml(text).is_err());
    }

    #[test]
    fn command_line_overrides_file() {
        let file = Settings::from_toml("tasks = 5\ntick = \"2s\"").unwrap();
        let settings = file.with_args(&args(&[
            "--tasks",
            "3",
            "--resize-policy",
            "keep-work",
            "--allow-empty-completion",
        ]));

        assert_eq!(settings.tasks, 3);
        assert_eq!(settings.tick, Duration::from_secs(2));
        assert_eq!(settings.resize_policy, ResizePolicy::KeepWork);
        assert!(!settings.require_focus_time);
        assert!(!settings.live);
    }

    #[rstest]
    #[case(0)]
    #[case(11)]
    fn out_of_range_task_count_is_invalid(#[case] tasks: usize) {
        let settings = Settings {
            tasks,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::TaskCount(n)) if n == tasks
        ));
    }

    #[test]
    fn zero_tick_is_invalid() {
        let settings = Settings {
            tick: Duration::from_secs(0),
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(SettingsError::ZeroTick)));
    }

    #[test]
    fn loads_an_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tasks = 7").unwrap();

        let settings = Settings::resolve(Some(file.path())).unwrap();

        assert_eq!(settings.tasks, 7);
        assert_eq!(settings.store_options().initial_count, 7);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");

        let err = Settings::resolve(Some(&missing)).unwrap_err();

        assert!(matches!(err, SettingsError::Read { .. }));
        assert!(err.to_string().contains("nope.toml"));
    }
}
