/// OpenAI chat completions and speech endpoints.
pub mod openai;
