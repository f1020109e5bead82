use std::collections::VecDeque;
use std::sync::Arc;

use futures::StreamExt as _;
use futures::stream;
use tracing::debug;

use crate::chunker::AudioChunker;
use crate::errors::{Pipeline, TaleError, failure_from_transport};
use crate::http::{ByteStream, ReqwestTransport, StreamRequest, Transport};
use crate::run::{StoryRun, StoryRunOptions};
use crate::stream::{AudioChunk, AudioStream, TextEvent, TextStream};

use super::config::OpenAiClientConfig;
use super::options::{SpeechRequestOptions, TaleRequestOptions, USER_PROMPT_PREFIX};
use super::transport::ChatDeltaDecoder;

/// Client for streamed tale generation and speech synthesis.
///
/// Each call opens a fresh connection and a fresh decoder; nothing is shared
/// between requests apart from the transport itself.
pub struct OpenAiTaleClient {
    transport: Arc<dyn Transport>,
    config: OpenAiClientConfig,
    tale_options: TaleRequestOptions,
    speech_options: SpeechRequestOptions,
}

impl OpenAiTaleClient {
    /// Creates a client backed by `reqwest`.
    pub fn new(config: OpenAiClientConfig) -> Result<Self, TaleError> {
        let transport = ReqwestTransport::new(config.timeout)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Creates a client using `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self, TaleError> {
        Self::new(OpenAiClientConfig::from_env()?)
    }

    /// Creates a client over any transport (fakes in tests, proxies, etc.).
    pub fn with_transport(
        config: OpenAiClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, TaleError> {
        if config.api_key.trim().is_empty() {
            return Err(TaleError::Config(
                "OpenAI client config api_key must not be empty".into(),
            ));
        }
        Ok(Self {
            transport,
            config,
            tale_options: TaleRequestOptions::default(),
            speech_options: SpeechRequestOptions::default(),
        })
    }

    pub fn tale_options(mut self, options: TaleRequestOptions) -> Self {
        self.tale_options = options;
        self
    }

    pub fn speech_options(mut self, options: SpeechRequestOptions) -> Self {
        self.speech_options = options;
        self
    }

    /// Requests a tale and returns its text increments as they arrive.
    ///
    /// A rejected request fails here with `InvalidResponse` before any event
    /// is produced.
    pub async fn generate_tale(&self, prompt: &str) -> Result<TextStream, TaleError> {
        if prompt.trim().is_empty() {
            return Err(TaleError::Validation("prompt must not be empty".into()));
        }
        let request = StreamRequest::new(
            self.config.chat_completions_url(),
            &self.config.api_key,
            build_tale_body(prompt, &self.tale_options),
        );
        debug!(model = %self.tale_options.model, prompt_len = prompt.len(), "starting tale stream");
        let body = self.open(&request, Pipeline::Text).await?;
        Ok(text_event_stream(body))
    }

    /// Requests speech for `text` and returns the audio in fixed-size chunks.
    pub async fn generate_audio(&self, text: &str) -> Result<AudioStream, TaleError> {
        if text.trim().is_empty() {
            return Err(TaleError::Validation("speech input must not be empty".into()));
        }
        let request = StreamRequest::new(
            self.config.speech_url(),
            &self.config.api_key,
            build_speech_body(text, &self.speech_options),
        );
        debug!(model = %self.speech_options.model, voice = %self.speech_options.voice, text_len = text.len(), "starting speech stream");
        let body = self.open(&request, Pipeline::Audio).await?;
        Ok(audio_chunk_stream(body))
    }

    /// Requests a tale and drains it on a background task.
    pub async fn start_story(&self, prompt: &str) -> Result<StoryRun, TaleError> {
        let stream = self.generate_tale(prompt).await?;
        StoryRun::spawn(stream, StoryRunOptions::default())
    }

    async fn open(
        &self,
        request: &StreamRequest,
        pipeline: Pipeline,
    ) -> Result<ByteStream, TaleError> {
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| failure_from_transport(pipeline, &e))?;
        if !response.is_ok() {
            let status = response.status;
            let body = response.text_lossy().await;
            return Err(TaleError::invalid_status(
                status,
                format!("{} returned status {status}: {body}", request.url()),
            ));
        }
        Ok(response.body)
    }
}

pub(crate) fn build_tale_body(prompt: &str, options: &TaleRequestOptions) -> serde_json::Value {
    serde_json::json!({
        "model": options.model,
        "messages": [
            { "role": "system", "content": options.system_prompt },
            { "role": "user", "content": format!("{USER_PROMPT_PREFIX}{prompt}") },
        ],
        "stream": true,
        "temperature": options.temperature,
        "max_tokens": options.max_tokens,
    })
}

pub(crate) fn build_speech_body(text: &str, options: &SpeechRequestOptions) -> serde_json::Value {
    serde_json::json!({
        "model": options.model,
        "input": text,
        "voice": options.voice,
        "response_format": options.response_format,
        "speed": options.speed,
    })
}

/// Decodes a chat completions body into text increments.
///
/// Ends after `[DONE]` or at end of body; a failed read ends the stream with
/// `FailedToGenerateText` after every event decoded so far.
pub fn text_event_stream(bytes_stream: ByteStream) -> TextStream {
    struct State {
        bytes_stream: ByteStream,
        decoder: ChatDeltaDecoder,
        pending: VecDeque<TextEvent>,
        done: bool,
    }

    Box::pin(stream::try_unfold(
        State {
            bytes_stream,
            decoder: ChatDeltaDecoder::default(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Ok(Some((event, state)));
                }
                if state.done {
                    return Ok(None);
                }

                match state.bytes_stream.next().await {
                    Some(Ok(chunk)) => {
                        let decoded = state.decoder.push_chunk(&chunk);
                        state.pending.extend(decoded.events);
                        state.done = decoded.done;
                    }
                    Some(Err(e)) => return Err(failure_from_transport(Pipeline::Text, &e)),
                    None => {
                        state.pending.extend(state.decoder.finish().events);
                        state.done = true;
                    }
                }
            }
        },
    ))
}

/// Regroups a speech body into `AUDIO_CHUNK_THRESHOLD`-sized chunks.
pub fn audio_chunk_stream(bytes_stream: ByteStream) -> AudioStream {
    struct State {
        bytes_stream: ByteStream,
        chunker: AudioChunker,
        pending: VecDeque<AudioChunk>,
        done: bool,
    }

    Box::pin(stream::try_unfold(
        State {
            bytes_stream,
            chunker: AudioChunker::default(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(chunk) = state.pending.pop_front() {
                    return Ok(Some((chunk, state)));
                }
                if state.done {
                    return Ok(None);
                }

                match state.bytes_stream.next().await {
                    Some(Ok(bytes)) => state.pending.extend(state.chunker.push(&bytes)),
                    Some(Err(e)) => return Err(failure_from_transport(Pipeline::Audio, &e)),
                    None => {
                        state.pending.extend(state.chunker.finish());
                        state.done = true;
                    }
                }
            }
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::AUDIO_CHUNK_THRESHOLD;
    use crate::errors::TransportError;
    use crate::http::TransportResponse;
    use bytes::Bytes;
    use futures::TryStreamExt as _;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeTransport {
        status: u16,
        reads: Vec<Result<Bytes, TransportError>>,
        calls: AtomicUsize,
        seen: Mutex<Vec<StreamRequest>>,
    }

    impl FakeTransport {
        fn new(status: u16, reads: Vec<Result<Bytes, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                status,
                reads,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl Transport for FakeTransport {
        async fn send(&self, request: &StreamRequest) -> Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.clone());
            Ok(TransportResponse {
                status: self.status,
                body: Box::pin(stream::iter(self.reads.clone())),
            })
        }
    }

    struct UnreachableTransport;

    #[async_trait::async_trait]
    impl Transport for UnreachableTransport {
        async fn send(&self, _request: &StreamRequest) -> Result<TransportResponse, TransportError> {
            Err(TransportError::Request("connection refused".into()))
        }
    }

    fn client(transport: Arc<dyn Transport>) -> OpenAiTaleClient {
        OpenAiTaleClient::with_transport(
            OpenAiClientConfig::new("sk-test").base_url("http://fake"),
            transport,
        )
        .expect("client")
    }

    fn reads(parts: &[&str]) -> Vec<Result<Bytes, TransportError>> {
        parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect()
    }

    #[test]
    fn tale_body_matches_chat_completions_shape() {
        let body = build_tale_body("a brave turtle", &TaleRequestOptions::default());
        assert_eq!(body["model"], "gpt-4-turbo-preview");
        assert_eq!(body["stream"], true);
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(
            body["messages"][0]["content"]
                .as_str()
                .is_some_and(|s| s.starts_with("You are a creative storyteller"))
        );
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(
            body["messages"][1]["content"],
            "Create a fairytale about: a brave turtle"
        );
    }

    #[test]
    fn speech_body_uses_tts_defaults() {
        let body = build_speech_body("Once upon a time", &SpeechRequestOptions::default());
        assert_eq!(
            body,
            serde_json::json!({
                "model": "tts-1",
                "input": "Once upon a time",
                "voice": "alloy",
                "response_format": "mp3",
                "speed": 1.0,
            })
        );
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let result = OpenAiTaleClient::with_transport(
            OpenAiClientConfig::new("  "),
            Arc::new(UnreachableTransport),
        );
        assert!(matches!(result, Err(TaleError::Config(_))));
    }

    #[tokio::test]
    async fn streams_tale_split_across_reads() {
        let transport = FakeTransport::new(
            200,
            reads(&[
                "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"Once\"}}]}\ndata: {\"choi",
                "ces\":[{\"delta\":{\"content\":\" upon\"}}]}\n",
                "data: [DONE]\n",
            ]),
        );
        let client = client(transport.clone());
        let events: Vec<TextEvent> = client
            .generate_tale("dragons")
            .await
            .expect("stream")
            .try_collect()
            .await
            .expect("events");
        let text: String = events.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(text, "Once upon");

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].url(), "http://fake/v1/chat/completions");
        assert_eq!(seen[0].bearer_token(), "sk-test");
    }

    #[tokio::test]
    async fn non_200_fails_before_any_event() {
        let transport = FakeTransport::new(429, reads(&["rate limited"]));
        let err = match client(transport.clone()).generate_tale("x").await {
            Ok(_) => panic!("429 should fail"),
            Err(err) => err,
        };
        assert!(matches!(
            err,
            TaleError::InvalidResponse { status: Some(429), ref message } if message.contains("rate limited")
        ));

        let err = match client(transport).generate_audio("x").await {
            Ok(_) => panic!("429 should fail"),
            Err(err) => err,
        };
        assert!(err.is_invalid_response());
    }

    #[tokio::test]
    async fn mid_stream_failure_follows_decoded_events() {
        let transport = FakeTransport::new(
            200,
            vec![
                Ok(Bytes::from_static(
                    b"data: {\"choices\":[{\"delta\":{\"content\":\"Once\"}}]}\n",
                )),
                Err(TransportError::Read("reset by peer".into())),
                Ok(Bytes::from_static(
                    b"data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n",
                )),
            ],
        );
        let mut stream = client(transport).generate_tale("x").await.expect("stream");
        assert_eq!(
            stream.next().await.map(|r| r.expect("first")),
            Some(TextEvent::new("Once"))
        );
        assert!(matches!(
            stream.next().await,
            Some(Err(TaleError::FailedToGenerateText(msg))) if msg.contains("reset by peer")
        ));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn send_failure_maps_to_pipeline_error() {
        let client = client(Arc::new(UnreachableTransport));
        assert!(matches!(
            client.generate_tale("x").await.err(),
            Some(TaleError::FailedToGenerateText(_))
        ));
        assert!(matches!(
            client.generate_audio("x").await.err(),
            Some(TaleError::FailedToGenerateAudio(_))
        ));
    }

    #[tokio::test]
    async fn blank_prompt_is_rejected_without_a_request() {
        let transport = FakeTransport::new(200, Vec::new());
        let client = client(transport.clone());
        assert!(matches!(
            client.generate_tale("   ").await.err(),
            Some(TaleError::Validation(_))
        ));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn audio_is_rechunked_and_reassembles_exactly() {
        let audio: Vec<u8> = (0..(2 * AUDIO_CHUNK_THRESHOLD + 5))
            .map(|i| (i % 256) as u8)
            .collect();
        let body = audio
            .chunks(10_000)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let transport = FakeTransport::new(200, body);
        let client = client(transport.clone());
        let chunks: Vec<AudioChunk> = client
            .generate_audio("hello")
            .await
            .expect("stream")
            .try_collect()
            .await
            .expect("chunks");
        assert_eq!(
            chunks.iter().map(AudioChunk::len).collect::<Vec<_>>(),
            vec![AUDIO_CHUNK_THRESHOLD, AUDIO_CHUNK_THRESHOLD, 5]
        );
        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.as_bytes().to_vec()).collect();
        assert_eq!(joined, audio);
        assert_eq!(
            transport.seen.lock().unwrap()[0].url(),
            "http://fake/v1/audio/speech"
        );
    }

    #[tokio::test]
    async fn audio_read_failure_ends_with_audio_error() {
        let transport = FakeTransport::new(
            200,
            vec![
                Ok(Bytes::from_static(b"ID3")),
                Err(TransportError::Read("eof".into())),
            ],
        );
        let result: Result<Vec<AudioChunk>, TaleError> = client(transport)
            .generate_audio("hello")
            .await
            .expect("stream")
            .try_collect()
            .await;
        assert!(matches!(result, Err(TaleError::FailedToGenerateAudio(_))));
    }
}
