//! Generation configuration for the session manager

/// Configuration for reply generation
#[derive(Clone, Debug)]
pub struct GenerationConfig {
    /// Model identifier, exactly as the backend knows it
    pub model_id: String,

    /// Maximum tokens to generate per response
    pub max_tokens: usize,

    /// Temperature for sampling (0.0 = deterministic)
    pub temperature: f32,

    /// Top-p (nucleus) sampling parameter
    pub top_p: f32,

    /// Keep inline reasoning blocks in cleaned output, visually separated,
    /// instead of stripping them
    pub show_thinking: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model_id: "llama3.1:8b".to_string(),
            max_tokens: 512,
            temperature: 0.7,
            top_p: 0.9,
            show_thinking: false,
        }
    }
}

impl GenerationConfig {
    /// Create a new configuration with the specified model
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            ..Default::default()
        }
    }

    /// Set the maximum tokens per response
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set top-p sampling
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    /// Show or strip inline reasoning blocks
    pub fn with_show_thinking(mut self, show: bool) -> Self {
        self.show_thinking = show;
        self
    }
}
