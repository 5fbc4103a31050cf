use crate::error::{GuardianError, Result};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_ANALYSIS_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_CARE_PLAN_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Clone)]
pub struct GuardianConfig {
    pub api_key: String,
    pub base_url: String,
    pub analysis_model: String,
    pub care_plan_model: String,
    pub chat_model: String,
    pub port: u16,
}

impl std::fmt::Debug for GuardianConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardianConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("analysis_model", &self.analysis_model)
            .field("care_plan_model", &self.care_plan_model)
            .field("chat_model", &self.chat_model)
            .field("port", &self.port)
            .finish()
    }
}

impl GuardianConfig {
    /// Reads the configuration from the process environment.
    ///
    /// `API_KEY` (or `GEMINI_API_KEY`) is required; everything else has a default.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Host part of `base_url`, without the API version segment. The chat
    /// provider appends its own `/v1beta/...` path.
    pub fn chat_base_url(&self) -> &str {
        ["/v1beta", "/v1"]
            .iter()
            .find_map(|version| self.base_url.strip_suffix(version))
            .unwrap_or(&self.base_url)
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = non_empty("API_KEY")
            .or_else(|| non_empty("GEMINI_API_KEY"))
            .ok_or_else(|| {
                GuardianError::Config("API_KEY environment variable is not set".to_string())
            })?;

        let base_url = non_empty("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let port = non_empty("PORT")
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            analysis_model: non_empty("ANALYSIS_MODEL")
                .unwrap_or_else(|| DEFAULT_ANALYSIS_MODEL.to_string()),
            care_plan_model: non_empty("CARE_PLAN_MODEL")
                .unwrap_or_else(|| DEFAULT_CARE_PLAN_MODEL.to_string()),
            chat_model: non_empty("CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let err = GuardianConfig::from_lookup(lookup(&[("PORT", "8080")])).unwrap_err();
        assert!(matches!(err, GuardianError::Config(_)));

        let err = GuardianConfig::from_lookup(lookup(&[("API_KEY", "  ")])).unwrap_err();
        assert!(matches!(err, GuardianError::Config(_)));
    }

    #[test]
    fn test_defaults_apply() {
        let config = GuardianConfig::from_lookup(lookup(&[("API_KEY", "secret")])).unwrap();
        assert_eq!(config.api_key, "secret");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.analysis_model, "gemini-2.5-pro");
        assert_eq!(config.chat_model, "gemini-2.5-flash");
        assert_eq!(config.port, 3000);
        assert!(!format!("{:?}", config).contains("secret"));
    }

    #[test]
    fn test_overrides_and_fallback_key() {
        let config = GuardianConfig::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "fallback"),
            ("GEMINI_BASE_URL", "http://localhost:9000/v1/"),
            ("CHAT_MODEL", "gemini-2.0-flash"),
            ("PORT", "not-a-port"),
        ]))
        .unwrap();
        assert_eq!(config.api_key, "fallback");
        assert_eq!(config.base_url, "http://localhost:9000/v1");
        assert_eq!(config.chat_model, "gemini-2.0-flash");
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_chat_base_url_follows_override() {
        let config = GuardianConfig::from_lookup(lookup(&[("API_KEY", "k")])).unwrap();
        assert_eq!(config.chat_base_url(), "https://generativelanguage.googleapis.com");

        let config = GuardianConfig::from_lookup(lookup(&[
            ("API_KEY", "k"),
            ("GEMINI_BASE_URL", "http://localhost:9000/v1/"),
        ]))
        .unwrap();
        assert_eq!(config.chat_base_url(), "http://localhost:9000");

        let config = GuardianConfig::from_lookup(lookup(&[
            ("API_KEY", "k"),
            ("GEMINI_BASE_URL", "http://proxy.internal"),
        ]))
        .unwrap();
        assert_eq!(config.chat_base_url(), "http://proxy.internal");
    }
}
