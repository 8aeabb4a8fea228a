//! Batch configuration.
//!
//! Two pieces live here: the [`AppConfig`] struct holding the paths and
//! version threaded explicitly through the run (no executable-relative
//! globals), and the INI-style batch file reader. The batch file has one
//! `general` section of defaults plus one section per task; a key present in
//! both resolves to the task-local value with a warning.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::ConfigError;
use crate::task::TaskSpec;

/// Section holding batch-wide defaults.
const GENERAL_SECTION: &str = "general";

/// Process-wide configuration, constructed once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory of the batch config file; task definition paths resolve
    /// against it.
    pub config_dir: PathBuf,
    /// Output directory for intermediate artifacts and results.
    pub output_dir: PathBuf,
    /// Tool version written to the batch version marker.
    pub version: String,
}

impl AppConfig {
    /// Creates an application config with the crate version.
    pub fn new(config_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            output_dir: output_dir.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// One parsed config section: name plus key/value items.
type Section = (String, HashMap<String, String>);

/// Reads the batch config file and resolves every task section into a
/// [`TaskSpec`], with `general` defaults merged in.
///
/// Required path keys are validated here, once per batch, before any task
/// runs.
///
/// # Errors
///
/// Returns [`ConfigError`] for a missing file, missing `general` section,
/// malformed syntax, no task sections, or an invalid task section.
pub fn load_tasks(config_file: &Path, app: &AppConfig) -> Result<Vec<TaskSpec>, ConfigError> {
    if !config_file.is_file() {
        return Err(ConfigError::NotFound(config_file.to_path_buf()));
    }
    let text = fs::read_to_string(config_file)?;
    let sections = parse_sections(&text)?;

    let general = sections
        .iter()
        .find(|(name, _)| name == GENERAL_SECTION)
        .map(|(_, items)| items.clone())
        .ok_or(ConfigError::MissingGeneralSection)?;

    let mut tasks = Vec::new();
    for (name, items) in &sections {
        if name == GENERAL_SECTION {
            continue;
        }
        let merged = merge_general(name, items, &general);
        tasks.push(TaskSpec::resolve(name, &merged, app)?);
    }

    if tasks.is_empty() {
        return Err(ConfigError::NoTasks);
    }
    Ok(tasks)
}

/// Merges the `general` defaults into a task section. The task-local value
/// wins on conflict, with a warning.
fn merge_general(
    section: &str,
    items: &HashMap<String, String>,
    general: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = items.clone();
    for (key, value) in general {
        if let Some(local) = merged.get(key) {
            warn!(
                section,
                key,
                value = %local,
                "general config setting redefined in the task, the task-specific one will be used"
            );
        } else {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Parses INI-style text: `[section]` headers, `key = value` or `key: value`
/// items, `#`/`;` comments. Keys are lowercased; values keep their inner
/// whitespace.
fn parse_sections(text: &str) -> Result<Vec<Section>, ConfigError> {
    let mut sections: Vec<Section> = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            sections.push((name.trim().to_string(), HashMap::new()));
            continue;
        }

        let split = line
            .char_indices()
            .find(|(_, c)| *c == '=' || *c == ':')
            .map(|(i, _)| i);
        let Some(current) = sections.last_mut() else {
            return Err(ConfigError::MalformedLine {
                line: idx + 1,
                content: raw.to_string(),
            });
        };
        match split {
            Some(i) if i > 0 => {
                let key = line[..i].trim().to_lowercase();
                let value = line[i + 1..].trim().to_string();
                current.1.insert(key, value);
            }
            _ => {
                return Err(ConfigError::MalformedLine {
                    line: idx + 1,
                    content: raw.to_string(),
                })
            }
        }
    }

    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = "\
# batch defaults
[general]
featurefile = features.h5f
distancefile = distances.dat
scorefile = scores.dat
analyzefile = analyze.csv
outputfile = results.txt
type = within

[task_1s]
taskfile: tasks/1s.abx
on = phone
by = talker context

[task_120s]
taskfile = tasks/120s.abx
on = phone
type = across
";

    fn write_config(text: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("eval.cfg");
        fs::write(&path, text).unwrap();
        (dir, path)
    }

    fn app(dir: &Path) -> AppConfig {
        AppConfig::new(dir, dir.join("out"))
    }

    #[test]
    fn test_load_tasks_merges_general() {
        let (dir, path) = write_config(SAMPLE);
        let tasks = load_tasks(&path, &app(dir.path())).unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].section, "task_1s");
        assert_eq!(tasks[0].task_type.as_deref(), Some("within"));
        assert_eq!(tasks[0].on.as_deref(), Some("phone"));
        assert_eq!(tasks[0].by.as_deref(), Some("talker context"));
        // Task-local value wins over the general default.
        assert_eq!(tasks[1].task_type.as_deref(), Some("across"));
        // Colon separator accepted.
        assert!(tasks[0].task_file.ends_with("tasks/1s.abx"));
    }

    #[test]
    fn test_load_tasks_missing_file() {
        let dir = tempdir().unwrap();
        let err = load_tasks(&dir.path().join("absent.cfg"), &app(dir.path())).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_tasks_missing_general() {
        let (dir, path) = write_config("[task]\ntaskfile = t.abx\n");
        let err = load_tasks(&path, &app(dir.path())).unwrap_err();
        assert!(matches!(err, ConfigError::MissingGeneralSection));
    }

    #[test]
    fn test_load_tasks_no_tasks() {
        let (dir, path) = write_config("[general]\nkey = value\n");
        let err = load_tasks(&path, &app(dir.path())).unwrap_err();
        assert!(matches!(err, ConfigError::NoTasks));
    }

    #[test]
    fn test_load_tasks_missing_required_key() {
        // taskfile only comes from the task sections; drop it from one.
        let text = SAMPLE.replace("taskfile = tasks/120s.abx\n", "");
        let (dir, path) = write_config(&text);
        let err = load_tasks(&path, &app(dir.path())).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { .. }));
        assert!(err.to_string().contains("task_120s"));
    }

    #[test]
    fn test_parse_sections_malformed_line() {
        let err = parse_sections("[general]\nthis is not a pair\n").unwrap_err();
        assert!(matches!(err, ConfigError::MalformedLine { line: 2, .. }));
    }

    #[test]
    fn test_parse_sections_item_before_header() {
        assert!(parse_sections("key = value\n").is_err());
    }

    #[test]
    fn test_parse_sections_lowercases_keys() {
        let sections = parse_sections("[general]\nTaskFile = x\n").unwrap();
        assert_eq!(sections[0].1.get("taskfile").map(String::as_str), Some("x"));
    }
}
