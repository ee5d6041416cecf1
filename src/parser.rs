//! Survey directory parser.
//!
//! Every immediate subdirectory of the surveys root is one survey, named
//! after the directory. Recognized files (matched case-insensitively):
//!
//! | File | Required | Becomes |
//! |------|----------|---------|
//! | `metadata.yaml` | yes | title, intro, outro, theme, webhook |
//! | `questions.yaml` | yes | `questions` |
//! | `security.yaml` | yes | `security` |
//! | `variables.yaml` | no | `variables` |
//! | `theme.css` | no | `theme_css` (raw text) |
//!
//! A directory holding none of these files is skipped. A missing required
//! file, an unparsable file or a config that fails validation yields one
//! [`SurveyParseError`] for that directory and the batch carries on.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::Span;
use walkdir::WalkDir;

use formwork_core::models::{ParsedSurvey, SurveyParseError, SurveysSyncResult};
use formwork_core::question::Questions;
use formwork_core::survey_config::{Security, SurveyConfig, Variables, WebhookConfig};

const METADATA_FILE: &str = "metadata.yaml";
const QUESTIONS_FILE: &str = "questions.yaml";
const SECURITY_FILE: &str = "security.yaml";
const VARIABLES_FILE: &str = "variables.yaml";
const THEME_FILE: &str = "theme.css";

const KNOWN_FILES: [&str; 5] = [
    METADATA_FILE,
    QUESTIONS_FILE,
    SECURITY_FILE,
    VARIABLES_FILE,
    THEME_FILE,
];

/// Top-level fields authored in `metadata.yaml`.
#[derive(Debug, Default, Deserialize)]
struct SurveyMetadata {
    #[serde(default)]
    title: String,
    #[serde(default)]
    intro: String,
    #[serde(default)]
    outro: String,
    #[serde(default)]
    theme: String,
    #[serde(default)]
    webhook: Option<WebhookConfig>,
}

#[derive(Clone)]
pub struct SurveyParser {
    root: PathBuf,
    span: Span,
}

impl SurveyParser {
    pub fn new(root: impl Into<PathBuf>, span: Span) -> Self {
        Self {
            root: root.into(),
            span,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Parses every survey directory under the root. Fails only when the
    /// root itself cannot be listed.
    pub fn read(&self) -> Result<SurveysSyncResult> {
        if !self.root.is_dir() {
            bail!("Surveys root does not exist: {}", self.root.display());
        }

        let mut result = SurveysSyncResult::default();

        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry
                .with_context(|| format!("Failed to list surveys root: {}", self.root.display()))?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }

            match self.read_survey(entry.path()) {
                Ok(Some(config)) => {
                    tracing::debug!(parent: &self.span, survey = %name, hash = %config.hash, "survey parsed");
                    result.surveys.push(ParsedSurvey { name, config });
                }
                Ok(None) => {
                    tracing::debug!(parent: &self.span, survey = %name, "empty survey directory skipped");
                }
                Err(error) => {
                    tracing::debug!(parent: &self.span, survey = %name, %error, "survey failed to parse");
                    result.errors.push(SurveyParseError { name, error });
                }
            }
        }

        result.surveys.sort_by(|a, b| a.name.cmp(&b.name));
        result.errors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    /// `Ok(None)` for a directory with no recognized files.
    fn read_survey(&self, dir: &Path) -> std::result::Result<Option<SurveyConfig>, String> {
        let files = find_survey_files(dir)?;
        if files.is_empty() {
            return Ok(None);
        }

        let metadata: SurveyMetadata = read_yaml(&files, METADATA_FILE, true)?.unwrap_or_default();
        let questions: Option<Questions> = read_yaml(&files, QUESTIONS_FILE, true)?;
        let security: Option<Security> = read_yaml(&files, SECURITY_FILE, true)?;
        let variables: Option<Variables> = read_yaml(&files, VARIABLES_FILE, false)?;
        let theme_css = match files.get(THEME_FILE) {
            Some(path) => Some(read_file(path, THEME_FILE)?),
            None => None,
        };

        let mut config = SurveyConfig {
            title: metadata.title,
            intro: metadata.intro,
            outro: metadata.outro,
            theme: metadata.theme,
            webhook: metadata.webhook,
            questions,
            security,
            variables,
            theme_css,
            ..Default::default()
        };

        config.generate_hash();
        config.validate().map_err(|e| e.to_string())?;
        config.normalize();
        Ok(Some(config))
    }
}

/// Recognized files in `dir`, keyed by their canonical lowercase name.
fn find_survey_files(dir: &Path) -> std::result::Result<HashMap<&'static str, PathBuf>, String> {
    let mut files = HashMap::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| format!("unable to read directory: {}", e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let lowered = entry.file_name().to_string_lossy().to_ascii_lowercase();
        if let Some(known) = KNOWN_FILES.iter().find(|k| **k == lowered) {
            files.insert(*known, entry.path().to_path_buf());
        }
    }
    Ok(files)
}

fn read_file(path: &Path, name: &str) -> std::result::Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("unable to read file '{}': {}", name, e))
}

/// Reads and decodes one YAML file. An empty file decodes to `T::default()`.
fn read_yaml<T: DeserializeOwned + Default>(
    files: &HashMap<&'static str, PathBuf>,
    name: &str,
    required: bool,
) -> std::result::Result<Option<T>, String> {
    let Some(path) = files.get(name) else {
        if required {
            return Err(format!("required file '{}' not found", name));
        }
        return Ok(None);
    };

    let content = read_file(path, name)?;
    if content.trim().is_empty() {
        return Ok(Some(T::default()));
    }
    serde_yaml::from_str(&content)
        .map(Some)
        .map_err(|e| format!("unable to parse file '{}': {}", name, e))
}
