//! Input Specification File (ISF) format
//!
//! One `key=value` pair per line. Text after `#` is a comment and blank lines
//! are ignored. Entry order is preserved so a written ISF reads the same way
//! as the map it came from.

use crate::error::{PipelineError, Result};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Isf {
    entries: Vec<(String, String)>,
}

impl Isf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse ISF text. `source` is only used in error messages.
    pub fn parse(content: &str, source: &Path) -> Result<Self> {
        let mut isf = Isf::new();

        for (lineno, raw) in content.lines().enumerate() {
            let line = match raw.find('#') {
                Some(pos) => &raw[..pos],
                None => raw,
            }
            .trim();

            if line.is_empty() {
                continue;
            }

            let parts: Vec<&str> = line.split('=').collect();
            if parts.len() != 2 || parts[0].trim().is_empty() {
                return Err(PipelineError::Config(format!(
                    "Malformed line {} in ISF {}: '{}'",
                    lineno + 1,
                    source.display(),
                    raw.trim()
                )));
            }

            isf.set_if_absent(parts[0].trim(), parts[1].trim());
        }

        Ok(isf)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Cannot read ISF {}: {}", path.display(), e))
        })?;
        Self::parse(&content, path)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_string())?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Set `key`, overwriting an existing value in place
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Set `key` only if it has no value yet. Returns whether it was set.
    pub fn set_if_absent(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.contains(&key) {
            return false;
        }
        self.entries.push((key, value.into()));
        true
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Isf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.entries {
            writeln!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_skips_comments_and_blank_lines() -> anyhow::Result<()> {
        let isf = Isf::parse(
            "# header\n\nsimulation_plan=data/plan.xml  # trailing\nmdb = data/mdb.xml\n",
            Path::new("isf.txt"),
        )?;
        assert_eq!(isf.len(), 2);
        assert_eq!(isf.get("simulation_plan"), Some("data/plan.xml"));
        assert_eq!(isf.get("mdb"), Some("data/mdb.xml"));
        Ok(())
    }

    #[test]
    fn test_malformed_line_is_config_error() {
        let err = Isf::parse("a=b=c\n", Path::new("bad.txt")).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert!(err.to_string().contains("bad.txt"));

        assert!(Isf::parse("no_separator\n", Path::new("bad.txt")).is_err());
    }

    #[test]
    fn test_first_occurrence_wins_in_template() -> anyhow::Result<()> {
        let isf = Isf::parse("a=1\na=2\n", Path::new("isf.txt"))?;
        assert_eq!(isf.get("a"), Some("1"));
        Ok(())
    }

    #[test]
    fn test_set_overwrites_in_place() {
        let mut isf = Isf::new();
        isf.set("workdir", "/a");
        isf.set("logdir", "logs");
        isf.set("workdir", "/b");
        assert_eq!(isf.keys(), vec!["workdir".to_string(), "logdir".to_string()]);
        assert_eq!(isf.get("workdir"), Some("/b"));
        assert!(!isf.set_if_absent("logdir", "other"));
    }

    #[test]
    fn test_write_then_read() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("out.txt");
        let mut isf = Isf::new();
        isf.set("workdir", "/work");
        isf.set("simulation_config", "data/sim_config_0.xml");
        isf.write(&path)?;

        assert_eq!(
            std::fs::read_to_string(&path)?,
            "workdir=/work\nsimulation_config=data/sim_config_0.xml\n"
        );
        assert_eq!(Isf::read(&path)?, isf);
        Ok(())
    }
}
