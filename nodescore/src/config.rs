use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScoreConfig {
    pub timeout_ms: Option<u64>,
    pub concurrency: Option<usize>,
    pub qps: Option<u32>,
    pub retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub progress_every: Option<usize>,
    pub format: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
pub struct Config {
    pub score: Option<ScoreConfig>,
}

/// Load `path`, or `./nodescore.yaml` when no path is given and it exists.
/// A file that cannot be read or parsed is reported and ignored.
pub fn load_config(path: Option<&Path>) -> Option<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new("nodescore.yaml");
            if p.exists() { p.to_path_buf() } else { return None; }
        }
    };
    let s = match fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config unreadable, ignoring");
            return None;
        }
    };
    match parse_config(&s) {
        Ok(c) => Some(c),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config invalid, ignoring");
            None
        }
    }
}

pub fn parse_config(s: &str) -> Result<Config, serde_yaml::Error> {
    serde_yaml::from_str(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_score_section() {
        let cfg = parse_config("score:\n  timeout_ms: 3000\n  concurrency: 8\n  format: jsonl\n").unwrap();
        let s = cfg.score.unwrap();
        assert_eq!(s.timeout_ms, Some(3000));
        assert_eq!(s.concurrency, Some(8));
        assert_eq!(s.format.as_deref(), Some("jsonl"));
        assert_eq!(s.qps, None);
    }

    #[test]
    fn empty_and_unknown_keys() {
        assert_eq!(parse_config("{}").unwrap(), Config::default());
        assert!(parse_config("score:\n  timeout: 3\n").is_err());
    }

    #[test]
    fn missing_explicit_file_is_ignored() {
        assert_eq!(load_config(Some(Path::new("/nonexistent/nodescore.yaml"))), None);
    }
}
