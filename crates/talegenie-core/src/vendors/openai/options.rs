pub(crate) const STORYTELLER_INSTRUCTION: &str = "You are a creative storyteller who writes engaging fairytales for children. Keep the stories appropriate for all ages and include moral lessons. Keep the stories concise, around 200-300 words.";

pub(crate) const USER_PROMPT_PREFIX: &str = "Create a fairytale about: ";

/// Options for the streamed chat completion that writes a tale.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TaleRequestOptions {
    /// Chat model name.
    pub model: String,
    /// System instruction sent before the user prompt.
    pub system_prompt: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
}

impl Default for TaleRequestOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4-turbo-preview".to_string(),
            system_prompt: STORYTELLER_INSTRUCTION.to_string(),
            temperature: 0.7,
            max_tokens: 500,
        }
    }
}

impl TaleRequestOptions {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Options for the speech synthesis request.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SpeechRequestOptions {
    /// Speech model name.
    pub model: String,
    /// Voice preset.
    pub voice: String,
    /// Encoded audio format returned by the endpoint.
    pub response_format: String,
    /// Playback speed multiplier.
    pub speed: f64,
}

impl Default for SpeechRequestOptions {
    fn default() -> Self {
        Self {
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            response_format: "mp3".to_string(),
            speed: 1.0,
        }
    }
}

impl SpeechRequestOptions {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }
}
