//! # Configuration Module
//!
//! Loads the service configuration from environment variables (and an optional
//! `.env` file), then validates it before anything is constructed from it.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::workflow::WorkflowSettings;

// =============================================================================
// CONFIGURATION STRUCT
// =============================================================================
/// Main configuration for the research service.
#[derive(Debug, Clone)]
pub struct Config {
    /// OpenRouter API key. Empty means every completion call fails.
    pub api_key: String,

    /// Model used for planning and synthesis
    pub smart_model: String,

    /// Model used for per-paper summarization
    pub fast_model: String,

    /// Resource-constrained mode: fewer papers per question and a PDF size cap
    pub lightweight_mode: bool,

    /// Disable the vector index entirely (summaries still reach the writer)
    pub skip_vector_store: bool,

    /// arXiv API endpoint
    pub arxiv_base_url: String,

    /// Minimum spacing between arXiv requests, in seconds
    pub arxiv_rate_limit_seconds: f64,

    /// Default result limit for arXiv searches
    pub arxiv_max_results: usize,

    /// Chunk size for the text splitter, in characters
    pub pdf_chunk_size: usize,

    /// Overlap between consecutive chunks, in characters
    pub pdf_chunk_overlap: usize,

    /// Character budget for summary input and for writer context
    pub max_context_chars: usize,

    /// Hard cap on steps per session
    pub max_workflow_steps: usize,

    /// HTTP bind host
    pub host: String,

    /// HTTP bind port
    pub port: u16,

    /// Log level for the application
    pub log_level: String,
}

// =============================================================================
// DEFAULT IMPLEMENTATION
// =============================================================================
impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            smart_model: "xiaomi/mimo-v2-flash:free".to_string(),
            fast_model: "mistralai/devstral-2512:free".to_string(),
            lightweight_mode: false,
            skip_vector_store: false,
            arxiv_base_url: "http://export.arxiv.org/api/query".to_string(),
            arxiv_rate_limit_seconds: 3.0,
            arxiv_max_results: 10,
            pdf_chunk_size: 1000,
            pdf_chunk_overlap: 200,
            max_context_chars: 8000,
            max_workflow_steps: 50,
            host: "127.0.0.1".to_string(),
            port: 8000,
            log_level: "info".to_string(),
        }
    }
}

// =============================================================================
// CONFIGURATION LOADING
// =============================================================================
impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    /// Unset variables keep their defaults; malformed ones are an error.
    ///
    /// # Example
    /// ```ignore
    /// let config = Config::from_env()?;
    /// config.validate()?;
    /// ```
    pub fn from_env() -> Result<Self> {
        // Missing .env is fine
        let _ = dotenvy::dotenv();

        let mut config = Config::default();

        if let Ok(val) = env::var("OPENROUTER_API_KEY") {
            config.api_key = val;
        }

        if let Ok(val) = env::var("SMART_MODEL") {
            config.smart_model = val;
        }

        if let Ok(val) = env::var("FAST_MODEL") {
            config.fast_model = val;
        }

        if let Ok(val) = env::var("LIGHTWEIGHT_MODE") {
            config.lightweight_mode = parse_flag(&val);
        }

        // SKIP_VECTOR_STORE inherits from LIGHTWEIGHT_MODE unless set explicitly
        config.skip_vector_store = match env::var("SKIP_VECTOR_STORE") {
            Ok(val) => parse_flag(&val),
            Err(_) => config.lightweight_mode,
        };

        if let Ok(val) = env::var("ARXIV_BASE_URL") {
            config.arxiv_base_url = val;
        }

        if let Some(val) = parse_var("ARXIV_RATE_LIMIT_SECONDS")? {
            config.arxiv_rate_limit_seconds = val;
        }

        if let Some(val) = parse_var("ARXIV_MAX_RESULTS")? {
            config.arxiv_max_results = val;
        }

        if let Some(val) = parse_var("PDF_CHUNK_SIZE")? {
            config.pdf_chunk_size = val;
        }

        if let Some(val) = parse_var("PDF_CHUNK_OVERLAP")? {
            config.pdf_chunk_overlap = val;
        }

        if let Some(val) = parse_var("MAX_CONTEXT_CHARS")? {
            config.max_context_chars = val;
        }

        if let Some(val) = parse_var("MAX_WORKFLOW_STEPS")? {
            config.max_workflow_steps = val;
        }

        if let Ok(val) = env::var("HOST") {
            config.host = val;
        }

        if let Some(val) = parse_var("PORT")? {
            config.port = val;
        }

        if let Ok(val) = env::var("RUST_LOG") {
            config.log_level = val;
        }

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.smart_model.is_empty() || self.fast_model.is_empty() {
            anyhow::bail!("SMART_MODEL and FAST_MODEL cannot be empty");
        }

        if self.pdf_chunk_size == 0 {
            anyhow::bail!("PDF_CHUNK_SIZE must be at least 1");
        }

        if self.pdf_chunk_overlap >= self.pdf_chunk_size {
            anyhow::bail!(
                "PDF_CHUNK_OVERLAP ({}) must be smaller than PDF_CHUNK_SIZE ({})",
                self.pdf_chunk_overlap,
                self.pdf_chunk_size
            );
        }

        if self.max_context_chars == 0 {
            anyhow::bail!("MAX_CONTEXT_CHARS must be at least 1");
        }

        if self.max_workflow_steps == 0 {
            anyhow::bail!("MAX_WORKFLOW_STEPS must be at least 1");
        }

        if self.arxiv_max_results == 0 {
            anyhow::bail!("ARXIV_MAX_RESULTS must be at least 1");
        }

        if !self.arxiv_rate_limit_seconds.is_finite() || self.arxiv_rate_limit_seconds < 0.0 {
            anyhow::bail!(
                "ARXIV_RATE_LIMIT_SECONDS must be a non-negative number, got: {}",
                self.arxiv_rate_limit_seconds
            );
        }

        Ok(())
    }

    /// Whether a completion API key is present.
    pub fn api_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Spacing enforced between arXiv requests.
    pub fn arxiv_rate_limit(&self) -> Duration {
        Duration::from_secs_f64(self.arxiv_rate_limit_seconds)
    }

    /// Settings consumed by the workflow steps and the run loop.
    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            papers_per_question: if self.lightweight_mode { 1 } else { 2 },
            max_context_chars: self.max_context_chars,
            max_steps: self.max_workflow_steps,
            ..WorkflowSettings::default()
        }
    }
}

/// "true" (any case) enables a flag, anything else disables it.
fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(val) => val
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} has an invalid value: {:?}", name, val)),
        Err(_) => Ok(None),
    }
}

// =============================================================================
// UNIT TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.smart_model, "xiaomi/mimo-v2-flash:free");
        assert_eq!(config.fast_model, "mistralai/devstral-2512:free");
        assert_eq!(config.pdf_chunk_size, 1000);
        assert_eq!(config.pdf_chunk_overlap, 200);
        assert_eq!(config.max_context_chars, 8000);
        assert!(!config.lightweight_mode);
        assert!(!config.skip_vector_store);
        assert!(!config.api_configured());
    }

    #[test]
    fn test_config_validation_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_overlap_too_large() {
        let mut config = Config::default();
        config.pdf_chunk_overlap = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_step_cap() {
        let mut config = Config::default();
        config.max_workflow_steps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_negative_rate_limit() {
        let mut config = Config::default();
        config.arxiv_rate_limit_seconds = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("TRUE"));
        assert!(parse_flag(" True "));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("1"));
    }

    #[test]
    fn test_workflow_settings_lightweight() {
        let mut config = Config::default();
        assert_eq!(config.workflow_settings().papers_per_question, 2);

        config.lightweight_mode = true;
        config.max_workflow_steps = 7;
        let settings = config.workflow_settings();
        assert_eq!(settings.papers_per_question, 1);
        assert_eq!(settings.max_steps, 7);
    }
}
