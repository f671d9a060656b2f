use std::env;

/// Which completion endpoint to call. Chat is the current API; the
/// legacy completion endpoint is kept for providers that only support
/// prompt+suffix infill.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiKind {
    Chat,
    Completion,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub openai_api_hostname: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub api_kind: ApiKind,
    pub temperature: f32,
    pub max_completion_tokens: u32,
    pub tokenizer_model: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let openai_api_hostname = env::var("CURATOR_API_HOST")
            .unwrap_or_else(|_| "https://api.openai.com".to_string());
        let openai_api_key = env::var("OPENAI_API_KEY").unwrap_or_else(|_| "".to_string());
        let openai_model =
            env::var("CURATOR_MODEL").unwrap_or_else(|_| "gpt-4.1-mini".to_string());
        let api_kind = match env::var("CURATOR_API_KIND").as_deref() {
            Ok("completion") => ApiKind::Completion,
            _ => ApiKind::Chat,
        };
        let temperature = env::var("CURATOR_TEMPERATURE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.7);
        let max_completion_tokens = env::var("CURATOR_MAX_COMPLETION_TOKENS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(200);
        let tokenizer_model =
            env::var("CURATOR_TOKENIZER").unwrap_or_else(|_| "gpt-4".to_string());

        Self {
            openai_api_hostname,
            openai_api_key,
            openai_model,
            api_kind,
            temperature,
            max_completion_tokens,
            tokenizer_model,
        }
    }
}
