//! Self-check diagnostics exposed via the `doctor` CLI subcommand (§6).
//!
//! Unlike a hardware-readiness probe, this is a startup sanity check:
//! can the config file be parsed, are the cache files present and
//! readable (or absent, which is fine on first run), do the configured
//! music directories actually exist. Each check is independent and a
//! failure in one never stops the rest from running, mirroring the
//! teacher's own `src/health/mod.rs` "collect every finding, then
//! report" shape.

use std::path::{Path, PathBuf};

use crate::config::Config;

/// Outcome of a single diagnostic check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warning,
    Fail,
}

impl CheckStatus {
    pub fn emoji(&self) -> &'static str {
        match self {
            CheckStatus::Pass => "✓",
            CheckStatus::Warning => "~",
            CheckStatus::Fail => "✗",
        }
    }
}

/// One named check and its result.
#[derive(Debug, Clone)]
pub struct DiagnosticCheck {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

impl DiagnosticCheck {
    fn pass(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Pass,
            detail: detail.into(),
        }
    }

    fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warning,
            detail: detail.into(),
        }
    }

    fn fail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Fail,
            detail: detail.into(),
        }
    }
}

/// A full diagnostic pass: the config used and every check run against it.
#[derive(Debug, Clone)]
pub struct DiagnosticReport {
    pub checks: Vec<DiagnosticCheck>,
}

impl DiagnosticReport {
    /// Run every check against the on-disk config and caches. Never
    /// panics; a check that can't determine its own status reports
    /// `Warning` rather than aborting the rest of the report.
    pub fn generate() -> Self {
        let config = crate::config::load();
        let mut checks = Vec::new();

        checks.push(check_config_path());
        checks.push(check_music_directories(&config));
        checks.push(check_library_cache(&config));
        checks.push(check_artwork_cache(&config));

        Self { checks }
    }

    /// True if every check passed.
    pub fn is_healthy(&self) -> bool {
        self.checks.iter().all(|c| c.status == CheckStatus::Pass)
    }

    /// Checks that did not pass, in the order they were run.
    pub fn issues(&self) -> Vec<&DiagnosticCheck> {
        self.checks
            .iter()
            .filter(|c| c.status != CheckStatus::Pass)
            .collect()
    }

    pub fn print(&self) {
        for check in &self.checks {
            println!("{} {}: {}", check.status.emoji(), check.name, check.detail);
        }
    }
}

fn check_config_path() -> DiagnosticCheck {
    match crate::config::config_path() {
        Some(path) if path.exists() => {
            DiagnosticCheck::pass("config file", format!("loaded from {}", path.display()))
        }
        Some(path) => DiagnosticCheck::warn(
            "config file",
            format!("{} not found, using defaults", path.display()),
        ),
        None => DiagnosticCheck::warn("config file", "could not determine config directory"),
    }
}

fn check_music_directories(config: &Config) -> DiagnosticCheck {
    let roots = config.paths.all_roots();
    if roots.is_empty() {
        return DiagnosticCheck::fail(
            "music directories",
            "no music directory configured and no default audio directory found",
        );
    }

    let missing: Vec<&PathBuf> = roots.iter().filter(|r| !r.is_dir()).collect();
    if missing.is_empty() {
        DiagnosticCheck::pass(
            "music directories",
            format!(
                "{} director{} configured",
                roots.len(),
                if roots.len() == 1 { "y" } else { "ies" }
            ),
        )
    } else {
        DiagnosticCheck::fail(
            "music directories",
            format!(
                "missing: {}",
                missing
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        )
    }
}

fn check_library_cache(config: &Config) -> DiagnosticCheck {
    check_cache_file("library cache", &config.cache.library_cache_path())
}

fn check_artwork_cache(config: &Config) -> DiagnosticCheck {
    check_cache_file("artwork cache", &config.cache.artwork_cache_path())
}

fn check_cache_file(name: &str, path: &Path) -> DiagnosticCheck {
    if !path.exists() {
        return DiagnosticCheck::pass(
            name,
            format!("{} absent, will be created on first scan", path.display()),
        );
    }
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => {
            DiagnosticCheck::pass(name, format!("{} ({} bytes)", path.display(), meta.len()))
        }
        Ok(_) => DiagnosticCheck::fail(
            name,
            format!("{} exists but is not a regular file", path.display()),
        ),
        Err(e) => DiagnosticCheck::fail(name, format!("{} unreadable: {}", path.display(), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_check_passes_when_file_is_absent() {
        let check = check_cache_file("test cache", Path::new("/nonexistent/path/library.bin"));
        assert_eq!(check.status, CheckStatus::Pass);
    }

    #[test]
    fn cache_check_passes_when_file_exists_and_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.bin");
        std::fs::write(&path, b"fake cache contents").unwrap();

        let check = check_cache_file("test cache", &path);
        assert_eq!(check.status, CheckStatus::Pass);
    }

    #[test]
    fn cache_check_fails_when_path_is_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let check = check_cache_file("test cache", dir.path());
        assert_eq!(check.status, CheckStatus::Fail);
    }

    #[test]
    fn music_directories_check_fails_when_none_exist() {
        let mut config = Config::default();
        config.paths.music_directories = vec![PathBuf::from("/definitely/not/a/real/path")];
        let check = check_music_directories(&config);
        assert_eq!(check.status, CheckStatus::Fail);
    }

    #[test]
    fn music_directories_check_passes_for_a_real_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.paths.music_directories = vec![dir.path().to_path_buf()];
        let check = check_music_directories(&config);
        assert_eq!(check.status, CheckStatus::Pass);
    }

    #[test]
    fn report_is_healthy_only_when_every_check_passes() {
        let report = DiagnosticReport {
            checks: vec![
                DiagnosticCheck::pass("a", "ok"),
                DiagnosticCheck::pass("b", "ok"),
            ],
        };
        assert!(report.is_healthy());
        assert!(report.issues().is_empty());

        let report = DiagnosticReport {
            checks: vec![
                DiagnosticCheck::pass("a", "ok"),
                DiagnosticCheck::fail("b", "broken"),
            ],
        };
        assert!(!report.is_healthy());
        assert_eq!(report.issues().len(), 1);
    }
}
