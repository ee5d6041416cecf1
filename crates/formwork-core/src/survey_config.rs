//! Survey configuration: the typed form of one survey directory.
//!
//! Lifecycle inside the parser is fixed: [`SurveyConfig::generate_hash`],
//! then [`SurveyConfig::validate`], then [`SurveyConfig::normalize`]. A
//! config that fails validation is never normalized.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{SurveyError, SurveyResult};
use crate::question::{Question, Questions};

pub const THEME_DEFAULT: &str = "default";
pub const THEME_CUSTOM: &str = "custom";
pub const SUPPORTED_THEMES: [&str; 2] = [THEME_DEFAULT, THEME_CUSTOM];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurveyConfig {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub intro: String,
    #[serde(default)]
    pub outro: String,
    #[serde(default)]
    pub theme: String,
    /// Hex SHA-256 fingerprint of the parsed config.
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub questions: Option<Questions>,
    #[serde(default)]
    pub variables: Option<Variables>,
    #[serde(default)]
    pub security: Option<Security>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_css: Option<String>,
}

/// `variables.yaml` document root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variables {
    #[serde(default)]
    pub variables: Vec<Variable>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: VariableType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VariableType {
    List,
}

impl TryFrom<String> for VariableType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "list" => Ok(VariableType::List),
            other => Err(format!("variables[].type is invalid: {}", other)),
        }
    }
}

impl From<VariableType> for String {
    fn from(value: VariableType) -> Self {
        match value {
            VariableType::List => "list".to_string(),
        }
    }
}

/// `security.yaml` document root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Security {
    #[serde(default)]
    pub duplicate_protection: DuplicateProtection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateProtection {
    /// Left to the client; the server accepts every session.
    #[default]
    Cookie,
    Ip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_webhook_method")]
    pub method: String,
}

fn default_webhook_method() -> String {
    "POST".to_string()
}

impl WebhookConfig {
    pub fn validate(&self) -> SurveyResult<()> {
        let parsed = url::Url::parse(&self.url)
            .map_err(|_| SurveyError::validation("webhook url format invalid"))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(SurveyError::validation("webhook scheme invalid"));
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(SurveyError::validation("webhook host invalid"));
        }
        if !self.method.eq_ignore_ascii_case("POST") {
            return Err(SurveyError::validation(
                "unsupported http method for webhook",
            ));
        }
        Ok(())
    }
}

impl Variables {
    pub fn validate(&self) -> SurveyResult<()> {
        let mut unique = HashSet::new();
        for variable in &self.variables {
            if variable.id.is_empty() {
                return Err(SurveyError::validation("variables[].id is required"));
            }
            if !unique.insert(variable.id.as_str()) {
                return Err(SurveyError::validation(format!(
                    "variables[].id is duplicated: {}",
                    variable.id
                )));
            }
        }
        Ok(())
    }

    pub fn find_list(&self, id: &str) -> Option<&Variable> {
        self.variables
            .iter()
            .find(|v| v.id == id && v.kind == VariableType::List)
    }
}

impl SurveyConfig {
    pub fn questions(&self) -> &[Question] {
        self.questions
            .as_ref()
            .map(|q| q.questions.as_slice())
            .unwrap_or_default()
    }

    pub fn duplicate_protection(&self) -> DuplicateProtection {
        self.security
            .as_ref()
            .map(|s| s.duplicate_protection)
            .unwrap_or_default()
    }

    pub fn validate(&mut self) -> SurveyResult<()> {
        if self.title.is_empty() {
            return Err(SurveyError::validation("metadata.title is required"));
        }
        if self.theme.is_empty() {
            self.theme = THEME_DEFAULT.to_string();
        }
        if !SUPPORTED_THEMES.contains(&self.theme.as_str()) {
            return Err(SurveyError::validation(format!(
                "theme is invalid: {}",
                self.theme
            )));
        }
        if self.questions.is_none() {
            return Err(SurveyError::validation("questions is required"));
        }
        if let Some(variables) = &self.variables {
            variables.validate()?;
        }
        self.set_options_from_variables()?;
        if let Some(questions) = &self.questions {
            questions.validate()?;
        }
        if let Some(webhook) = &self.webhook {
            webhook.validate()?;
        }
        Ok(())
    }

    /// Replaces `optionsFromVariable` references with the referenced list.
    pub fn set_options_from_variables(&mut self) -> SurveyResult<()> {
        let Some(questions) = self.questions.as_mut() else {
            return Ok(());
        };
        for question in questions.questions.iter_mut() {
            let Some(var_id) = question.options_from_variable.as_deref() else {
                continue;
            };
            if var_id.is_empty() {
                continue;
            }
            let variable = self
                .variables
                .as_ref()
                .and_then(|vars| vars.find_list(var_id))
                .ok_or_else(|| {
                    SurveyError::validation(format!(
                        "variable with id {} and type list is not found",
                        var_id
                    ))
                })?;
            question.options = variable.options.clone();
        }
        Ok(())
    }

    /// Strips markup from free-text fields and gives every question a unique
    /// ID. Missing IDs are derived from the question's content hash;
    /// collisions get `-2`, `-3`, ... appended.
    pub fn normalize(&mut self) {
        self.intro = strip_tags(&self.intro);
        self.outro = strip_tags(&self.outro);

        let Some(questions) = self.questions.as_mut() else {
            return;
        };
        let mut seen: HashSet<String> = HashSet::new();
        for question in questions.questions.iter_mut() {
            question.description = strip_tags(&question.description);
            if question.id.is_empty() {
                question.id = question.generate_hash();
            }

            let original = question.id.clone();
            let mut suffix = 2;
            while !seen.insert(question.id.clone()) {
                question.id = format!("{}-{}", original, suffix);
                suffix += 1;
            }
        }
    }

    /// Fingerprint over the canonical JSON encoding, excluding the hash field
    /// itself.
    pub fn generate_hash(&mut self) {
        let mut canonical = self.clone();
        canonical.hash.clear();
        let encoded = serde_json::to_vec(&canonical).unwrap_or_default();
        self.hash = format!("{:x}", Sha256::digest(&encoded));
    }

    pub fn find_question_by_uuid(&self, question_uuid: &str) -> SurveyResult<&Question> {
        self.questions()
            .iter()
            .find(|q| !q.uuid.is_empty() && q.uuid == question_uuid)
            .ok_or_else(|| SurveyError::not_found("question not found"))
    }
}

fn strip_tags(input: &str) -> String {
    ammonia::Builder::empty()
        .clean_content_tags(HashSet::from(["script", "style"]))
        .clean(input)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::QuestionType;

    fn config_with(questions: Vec<Question>) -> SurveyConfig {
        SurveyConfig {
            title: "Survey Title".to_string(),
            questions: Some(Questions { questions }),
            security: Some(Security::default()),
            ..Default::default()
        }
    }

    fn text(label: &str) -> Question {
        Question::new(QuestionType::ShortText, label)
    }

    #[test]
    fn test_validate_defaults_theme() {
        let mut cfg = config_with(vec![text("Name")]);
        cfg.validate().unwrap();
        assert_eq!(cfg.theme, THEME_DEFAULT);
    }

    #[test]
    fn test_validate_rejects_unknown_theme() {
        let mut cfg = config_with(vec![text("Name")]);
        cfg.theme = "neon".to_string();
        assert_eq!(
            cfg.validate().unwrap_err().to_string(),
            "theme is invalid: neon"
        );
    }

    #[test]
    fn test_validate_requires_title_and_questions() {
        let mut cfg = config_with(vec![text("Name")]);
        cfg.title.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = config_with(vec![]);
        cfg.questions = None;
        assert_eq!(cfg.validate().unwrap_err().to_string(), "questions is required");
    }

    #[test]
    fn test_options_resolved_from_variables() {
        let mut q = Question::new(QuestionType::SingleChoice, "Country");
        q.options_from_variable = Some("countries".to_string());
        let mut cfg = config_with(vec![q]);
        cfg.variables = Some(Variables {
            variables: vec![Variable {
                id: "countries".to_string(),
                kind: VariableType::List,
                options: vec!["DE".to_string(), "FR".to_string()],
            }],
        });
        cfg.validate().unwrap();
        assert_eq!(cfg.questions()[0].options, vec!["DE", "FR"]);
    }

    #[test]
    fn test_missing_variable_fails() {
        let mut q = Question::new(QuestionType::SingleChoice, "Country");
        q.options_from_variable = Some("countries".to_string());
        let mut cfg = config_with(vec![q]);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("countries"));
    }

    #[test]
    fn test_duplicate_variable_ids() {
        let var = Variable {
            id: "v".to_string(),
            kind: VariableType::List,
            options: vec![],
        };
        let vars = Variables {
            variables: vec![var.clone(), var],
        };
        assert!(vars.validate().is_err());
    }

    #[test]
    fn test_webhook_validation() {
        let ok = WebhookConfig {
            url: "https://hooks.example.com/x".to_string(),
            method: "post".to_string(),
        };
        assert!(ok.validate().is_ok());
        let ftp = WebhookConfig {
            url: "ftp://example.com".to_string(),
            method: "POST".to_string(),
        };
        assert!(ftp.validate().is_err());
        let get = WebhookConfig {
            url: "http://example.com".to_string(),
            method: "GET".to_string(),
        };
        assert!(get.validate().is_err());
        let junk = WebhookConfig {
            url: "not a url".to_string(),
            method: "POST".to_string(),
        };
        assert!(junk.validate().is_err());
    }

    #[test]
    fn test_normalize_strips_html() {
        let mut q = text("Name");
        q.description = "<b>bold</b> words".to_string();
        let mut cfg = config_with(vec![q]);
        cfg.intro = "<p>Hello <script>alert(1)</script>there</p>".to_string();
        cfg.normalize();
        assert_eq!(cfg.intro, "Hello there");
        assert_eq!(cfg.questions()[0].description, "bold words");
    }

    #[test]
    fn test_normalize_generates_unique_ids() {
        let mut explicit = text("Explicit");
        explicit.id = "q".to_string();
        let mut clash = text("Clash");
        clash.id = "q".to_string();
        let mut cfg = config_with(vec![explicit, clash, text("Same"), text("Same")]);
        cfg.normalize();

        let ids: Vec<&str> = cfg.questions().iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids[0], "q");
        assert_eq!(ids[1], "q-2");
        assert_eq!(ids[2].len(), 64);
        assert_eq!(ids[3], format!("{}-2", ids[2]));
        let unique: HashSet<&&str> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn test_generate_hash_deterministic() {
        let mut a = config_with(vec![text("Name")]);
        let mut b = a.clone();
        a.generate_hash();
        b.generate_hash();
        assert_eq!(a.hash.len(), 64);
        assert_eq!(a.hash, b.hash);

        let before = a.hash.clone();
        a.generate_hash();
        assert_eq!(a.hash, before);
    }

    #[test]
    fn test_find_question_by_uuid() {
        let mut q = text("Name");
        q.uuid = "u-1".to_string();
        let cfg = config_with(vec![q, text("Other")]);
        assert_eq!(cfg.find_question_by_uuid("u-1").unwrap().label, "Name");
        assert!(matches!(
            cfg.find_question_by_uuid("u-2"),
            Err(SurveyError::NotFound(_))
        ));
        assert!(cfg.find_question_by_uuid("").is_err());
    }
}
