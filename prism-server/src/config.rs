use std::path::PathBuf;

use clap::{builder::BoolishValueParser, ArgAction, Parser};
use prism_core::{gemini, DeviceMap};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

// Define command line arguments; every flag can also come from the environment or `.env`.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Prism photo editing server")]
pub struct Args {
    /// Host address to bind the server to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the server to
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Comma-separated list of origins allowed by CORS, or `*`
    #[arg(
        long,
        env = "ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000,http://localhost:5173"
    )]
    pub allowed_origins: Vec<String>,

    /// Directory `/upload` writes into
    #[arg(long, env = "UPLOAD_DIR", default_value = "./uploads")]
    pub upload_dir: PathBuf,

    /// Shared on-disk cache for model manifests and weights
    #[arg(long, env = "MODEL_CACHE_DIR", default_value = "./models")]
    pub model_cache_dir: PathBuf,

    /// cpu, cuda[:N], mps[:N] or auto
    #[arg(long, env = "DEVICE", default_value = "cpu")]
    pub device: DeviceMap,

    #[arg(long, env = "ENABLE_STABLE_DIFFUSION", action = ArgAction::Set,
          value_parser = BoolishValueParser::new(), default_value = "false")]
    pub enable_stable_diffusion: bool,

    #[arg(long, env = "ENABLE_ADVANCED_MODELS", action = ArgAction::Set,
          value_parser = BoolishValueParser::new(), default_value = "false")]
    pub enable_advanced_models: bool,

    #[arg(long, env = "ENABLE_BACKGROUND_REMOVAL", action = ArgAction::Set,
          value_parser = BoolishValueParser::new(), default_value = "true")]
    pub enable_background_removal: bool,

    /// Base URL of the inference worker that hosts the pipelines
    #[arg(long, env = "INFERENCE_WORKER_URL")]
    pub inference_worker_url: Option<String>,

    /// Token for gated model repositories
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    pub hf_token: Option<String>,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    #[arg(long, env = "GEMINI_MODEL", default_value = gemini::DEFAULT_MODEL)]
    pub gemini_model: String,

    #[arg(long, env = "GEMINI_API_BASE", default_value = gemini::DEFAULT_API_BASE)]
    pub gemini_api_base: String,

    /// Largest accepted request body
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,
}

impl Args {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn cors(&self) -> CorsConfig {
        let origins: Vec<String> = self
            .allowed_origins
            .iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            CorsConfig::AllowAll
        } else {
            CorsConfig::AllowOrigins(origins)
        }
    }

    /// The Gemini key, ignoring blank values.
    pub fn gemini_key(&self) -> Option<&str> {
        self.gemini_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

/// CORS policy for the router.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CorsConfig {
    #[default]
    AllowAll,
    AllowOrigins(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let argv = std::iter::once("prism-server").chain(extra.iter().copied());
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn flags_accept_boolish_values() {
        let args = parse(&["--enable-stable-diffusion", "yes", "--enable-background-removal", "0"]);
        assert!(args.enable_stable_diffusion);
        assert!(!args.enable_background_removal);
    }

    #[test]
    fn wildcard_origin_allows_all() {
        let args = parse(&["--allowed-origins", "http://a.test,*"]);
        assert_eq!(args.cors(), CorsConfig::AllowAll);
        let args = parse(&["--allowed-origins", "http://a.test, http://b.test"]);
        assert_eq!(
            args.cors(),
            CorsConfig::AllowOrigins(vec!["http://a.test".into(), "http://b.test".into()])
        );
    }

    #[test]
    fn device_is_parsed() {
        assert_eq!(parse(&["--device", "cuda:1"]).device, DeviceMap::Cuda(1));
        assert!(Args::try_parse_from(["prism-server", "--device", "tpu"]).is_err());
    }
}
