//! Concrete classification backends: a local executable and three hosted
//! vision models reached over blocking HTTP.

use std::io::{self, Read, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::debug;

use crate::crop::EncodedImage;
use crate::enrichment::Attributes;
use crate::provider::{analysis_prompt, parse_attributes, Provider, ProviderError};

const MAX_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.1;

fn agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(timeout).build()
}

fn send(request: ureq::Request, body: &Value) -> Result<Value, ProviderError> {
    let response = request
        .set("Content-Type", "application/json")
        .send_string(&body.to_string())
        .map_err(map_ureq_error)?;

    let text = response.into_string()?;

    serde_json::from_str(&text).map_err(|err| ProviderError::Malformed(err.to_string()))
}

fn map_ureq_error(err: ureq::Error) -> ProviderError {
    match err {
        ureq::Error::Status(code, _) => ProviderError::Http(code),
        ureq::Error::Transport(transport) => {
            let timed_out = std::error::Error::source(&transport)
                .and_then(|src| src.downcast_ref::<io::Error>())
                .map_or(false, |io| {
                    matches!(io.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
                });

            if timed_out {
                ProviderError::Timeout
            } else {
                ProviderError::Transport(transport.to_string())
            }
        }
    }
}

fn reply_text<'a>(reply: &'a Value, pointer: &str) -> Result<&'a str, ProviderError> {
    reply
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::Malformed(format!("no text at {}", pointer)))
}

fn credential(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

pub struct OpenAiProvider {
    api_key: Option<String>,
    model: String,
    endpoint: String,
    agent: ureq::Agent,
}

impl OpenAiProvider {
    pub const ENDPOINT: &'static str = "https://api.openai.com/v1/chat/completions";

    pub fn new(api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            api_key,
            model: "gpt-4o".to_string(),
            endpoint: Self::ENDPOINT.to_string(),
            agent: agent(timeout),
        }
    }
}

impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn classify(&self, image: &EncodedImage, class: &str) -> Result<Attributes, ProviderError> {
        let key = self.api_key.as_deref().ok_or(ProviderError::Unconfigured)?;

        let body = json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": analysis_prompt(class) },
                    {
                        "type": "image_url",
                        "image_url": { "url": format!("data:image/jpeg;base64,{}", image.base64()) }
                    }
                ]
            }],
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
        });

        let request = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", key));

        let reply = send(request, &body)?;
        parse_attributes(reply_text(&reply, "/choices/0/message/content")?)
    }
}

pub struct AnthropicProvider {
    api_key: Option<String>,
    model: String,
    endpoint: String,
    agent: ureq::Agent,
}

impl AnthropicProvider {
    pub const ENDPOINT: &'static str = "https://api.anthropic.com/v1/messages";
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            api_key,
            model: "claude-3-5-sonnet-latest".to_string(),
            endpoint: Self::ENDPOINT.to_string(),
            agent: agent(timeout),
        }
    }
}

impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn classify(&self, image: &EncodedImage, class: &str) -> Result<Attributes, ProviderError> {
        let key = self.api_key.as_deref().ok_or(ProviderError::Unconfigured)?;

        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": "image/jpeg",
                            "data": image.base64(),
                        }
                    },
                    { "type": "text", "text": analysis_prompt(class) }
                ]
            }],
        });

        let request = self
            .agent
            .post(&self.endpoint)
            .set("x-api-key", key)
            .set("anthropic-version", Self::API_VERSION);

        let reply = send(request, &body)?;
        parse_attributes(reply_text(&reply, "/content/0/text")?)
    }
}

pub struct GeminiProvider {
    api_key: Option<String>,
    endpoint: String,
    agent: ureq::Agent,
}

impl GeminiProvider {
    pub const ENDPOINT: &'static str =
        "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

    pub fn new(api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            api_key,
            endpoint: Self::ENDPOINT.to_string(),
            agent: agent(timeout),
        }
    }
}

impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "google"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn classify(&self, image: &EncodedImage, class: &str) -> Result<Attributes, ProviderError> {
        let key = self.api_key.as_deref().ok_or(ProviderError::Unconfigured)?;

        let body = json!({
            "contents": [{
                "parts": [
                    { "text": analysis_prompt(class) },
                    { "inline_data": { "mime_type": "image/jpeg", "data": image.base64() } }
                ]
            }],
            "generationConfig": {
                "temperature": TEMPERATURE,
                "maxOutputTokens": MAX_TOKENS,
            }
        });

        let request = self.agent.post(&self.endpoint).query("key", key);

        let reply = send(request, &body)?;
        parse_attributes(reply_text(&reply, "/candidates/0/content/parts/0/text")?)
    }
}

/// Runs a local executable per crop: JPEG bytes on stdin, the class as its
/// only argument, the attribute JSON expected on stdout.
pub struct CommandProvider {
    program: Option<String>,
    timeout: Duration,
}

impl CommandProvider {
    const POLL: Duration = Duration::from_millis(10);

    pub fn new(program: Option<String>, timeout: Duration) -> Self {
        Self { program, timeout }
    }
}

impl Provider for CommandProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn is_configured(&self) -> bool {
        self.program.is_some()
    }

    fn classify(&self, image: &EncodedImage, class: &str) -> Result<Attributes, ProviderError> {
        let program = self.program.as_deref().ok_or(ProviderError::Unconfigured)?;

        let mut child = Command::new(program)
            .arg(class)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        // a classifier may exit without draining stdin; the writer just gets EPIPE
        if let Some(mut stdin) = child.stdin.take() {
            let jpeg = image.jpeg.clone();
            thread::spawn(move || stdin.write_all(&jpeg));
        }

        let (tx, rx) = mpsc::channel();
        if let Some(mut stdout) = child.stdout.take() {
            thread::spawn(move || {
                let mut out = String::new();
                let _ = tx.send(stdout.read_to_string(&mut out).map(|_| out));
            });
        }

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }

            if Instant::now() >= deadline {
                debug!(program, "killing classifier after timeout");
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProviderError::Timeout);
            }

            thread::sleep(Self::POLL);
        };

        // stdout stays open while anything the classifier spawned still holds it
        let out = match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(res) => res?,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                debug!(program, "classifier output still open after timeout");
                return Err(ProviderError::Timeout);
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(ProviderError::Malformed("no output captured".into()))
            }
        };

        if !status.success() {
            return Err(ProviderError::Transport(format!("{} exited with {}", program, status)));
        }

        parse_attributes(&out)
    }
}

/// The default provider order, configured from the environment.
pub struct ProviderSet {
    providers: Vec<Box<dyn Provider>>,
}

impl ProviderSet {
    pub const LOCAL_CLASSIFIER_VAR: &'static str = "QTRACK_LOCAL_CLASSIFIER";

    /// Local command first (cheapest), then OpenAI, Anthropic and Gemini.
    pub fn from_env(timeout: Duration) -> Self {
        Self {
            providers: vec![
                Box::new(CommandProvider::new(credential(Self::LOCAL_CLASSIFIER_VAR), timeout)),
                Box::new(OpenAiProvider::new(credential("OPENAI_API_KEY"), timeout)),
                Box::new(AnthropicProvider::new(credential("ANTHROPIC_API_KEY"), timeout)),
                Box::new(GeminiProvider::new(credential("GOOGLE_API_KEY"), timeout)),
            ],
        }
    }

    pub fn into_vec(self) -> Vec<Box<dyn Provider>> {
        self.providers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> EncodedImage {
        EncodedImage {
            jpeg: vec![0xff, 0xd8, 0xff, 0xd9],
            width: 1,
            height: 1,
        }
    }

    #[test]
    fn missing_credentials_mean_unconfigured() {
        let t = Duration::from_secs(1);
        let providers: Vec<Box<dyn Provider>> = vec![
            Box::new(OpenAiProvider::new(None, t)),
            Box::new(AnthropicProvider::new(None, t)),
            Box::new(GeminiProvider::new(None, t)),
            Box::new(CommandProvider::new(None, t)),
        ];

        for p in &providers {
            assert!(!p.is_configured(), "{}", p.name());
            assert!(matches!(p.classify(&image(), "car"), Err(ProviderError::Unconfigured)));
        }
    }

    #[test]
    fn reply_text_follows_pointer() {
        let reply = json!({ "content": [{ "type": "text", "text": "{}" }] });

        assert_eq!(reply_text(&reply, "/content/0/text").unwrap(), "{}");
        assert!(matches!(
            reply_text(&reply, "/choices/0/message/content"),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[cfg(unix)]
    fn script(name: &str, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = std::env::temp_dir().join(format!("qtrack-{}-{}.sh", name, std::process::id()));
        std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        path
    }

    #[cfg(unix)]
    #[test]
    fn command_provider_reads_stdout() {
        let path = script(
            "classifier",
            "cat > /dev/null\nprintf '{\"brand\":\"Acme\",\"type\":\"%s\",\"confidence\":0.9}' \"$1\"\n",
        );

        let provider = CommandProvider::new(Some(path.to_string_lossy().into_owned()), Duration::from_secs(5));
        let attrs = provider.classify(&image(), "laptop").unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(attrs.brand.as_deref(), Some("Acme"));
        assert_eq!(attrs.kind.as_deref(), Some("laptop"));
    }

    #[cfg(unix)]
    #[test]
    fn command_provider_bounded_when_stdout_outlives_child() {
        let path = script(
            "lingering",
            "cat > /dev/null\nsleep 3 &\nprintf '{\"brand\":\"Acme\",\"confidence\":0.9}'\n",
        );

        let provider = CommandProvider::new(Some(path.to_string_lossy().into_owned()), Duration::from_millis(200));
        let started = Instant::now();
        let res = provider.classify(&image(), "car");
        let elapsed = started.elapsed();
        let _ = std::fs::remove_file(&path);

        assert!(matches!(res, Err(ProviderError::Timeout)), "{:?}", res);
        assert!(elapsed < Duration::from_secs(2), "took {:?}", elapsed);
    }

    #[cfg(unix)]
    #[test]
    fn command_provider_reports_failed_exit() {
        let provider = CommandProvider::new(Some("false".into()), Duration::from_secs(5));
        assert!(matches!(provider.classify(&image(), "car"), Err(ProviderError::Transport(_))));
    }

    #[cfg(unix)]
    #[test]
    fn command_provider_times_out() {
        let provider = CommandProvider::new(Some("sleep".into()), Duration::from_millis(50));

        // `sleep 5`
        assert!(matches!(provider.classify(&image(), "5"), Err(ProviderError::Timeout)));
    }
}
