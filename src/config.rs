use crate::llm::{LlmSettings, Provider};
use clap::Parser;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::env;
use std::time::Duration;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path (YAML)
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Chronological log location (`sqlite://...` or `memory`)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub agents: AgentsConfig,
    pub memory: MemoryConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub request_timeout_secs: u64,
    pub cors_permissive: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentsConfig {
    pub execution_timeout_secs: u64,
    pub python_bin: String,
    pub max_search_results: usize,
    pub max_output_chars: usize,
    pub provider_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    Hashing,
    Fastembed,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    pub database_url: String,
    pub embedder: EmbedderKind,
    pub vector_dimension: usize,
}

impl MemoryConfig {
    pub fn is_in_memory(&self) -> bool {
        self.database_url.eq_ignore_ascii_case("memory")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub json: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    /// Defaults, then the YAML file, then `ORCHESTRA_` env vars, then CLI
    /// flags (and their env equivalents), lowest to highest.
    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder()
            .set_default("server.port", 8000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.request_timeout_secs", 120)?
            .set_default("server.cors_permissive", true)?
            .set_default("agents.execution_timeout_secs", 30)?
            .set_default("agents.python_bin", "python3")?
            .set_default("agents.max_search_results", 5)?
            .set_default("agents.max_output_chars", 20_000)?
            .set_default("agents.provider_timeout_secs", 60)?
            .set_default("memory.database_url", "sqlite://data/memory.db")?
            .set_default("memory.embedder", "hashing")?
            .set_default("memory.vector_dimension", 512)?
            .set_default("search.endpoint", crate::search::serpapi::DEFAULT_ENDPOINT)?
            .set_default("logging.json", false)?;

        builder = match &cli.config {
            Some(path) => builder.add_source(File::new(path, FileFormat::Yaml)),
            None => builder.add_source(File::new("config.yaml", FileFormat::Yaml).required(false)),
        };

        // E.g. ORCHESTRA_SERVER__PORT=9000, ORCHESTRA_MEMORY__EMBEDDER=fastembed
        builder = builder.add_source(
            Environment::with_prefix("ORCHESTRA")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Ok(key) = env::var("SERPAPI_API_KEY") {
            if !key.trim().is_empty() {
                builder = builder.set_default("search.api_key", key)?;
            }
        }

        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(url) = cli.database_url {
            builder = builder.set_override("memory.database_url", url)?;
        }
        if cli.log_json {
            builder = builder.set_override("logging.json", true)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Bound on search and generation calls, kept below the request timeout.
    pub fn provider_timeout(&self) -> Duration {
        let ceiling = self.server.request_timeout_secs.saturating_sub(1).max(1);
        Duration::from_secs(self.agents.provider_timeout_secs.clamp(1, ceiling))
    }
}

/// LLM settings from `LLM_BASE_URL` / `LLM_MODEL` / `LLM_API_KEY`, or just
/// `OPENAI_API_KEY` for the public OpenAI endpoint.
///
/// Returns an error describing what is missing when neither is configured;
/// the caller then falls back to the offline template generator.
pub fn load_llm_settings() -> Result<LlmSettings, String> {
    let non_empty = |name: &str| env::var(name).ok().filter(|s| !s.trim().is_empty());

    let api_key = non_empty("LLM_API_KEY").or_else(|| non_empty("OPENAI_API_KEY"));
    let base_url = match non_empty("LLM_BASE_URL") {
        Some(url) => url,
        None if api_key.is_some() => OPENAI_BASE_URL.to_string(),
        None => return Err("Missing env var: LLM_BASE_URL (or OPENAI_API_KEY)".to_string()),
    };
    let model = non_empty("LLM_MODEL").unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string());

    let mut provider = Provider::detect_from_url(&base_url);
    if let Provider::AzureOpenAI { .. } = &provider {
        if let Some(deployment) = non_empty("AZURE_DEPLOYMENT_NAME") {
            provider = Provider::AzureOpenAI {
                deployment_name: deployment,
                api_version: non_empty("AZURE_API_VERSION")
                    .unwrap_or_else(|| crate::llm::provider::AZURE_API_VERSION.to_string()),
            };
        }
    }

    Ok(LlmSettings {
        base_url,
        api_key,
        model,
        provider,
        temperature: 0.7,
        max_tokens: 2000,
    })
}
