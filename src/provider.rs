use thiserror::Error;

use crate::crop::EncodedImage;
use crate::enrichment::Attributes;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no credentials configured")]
    Unconfigured,

    #[error("HTTP status {0}")]
    Http(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out")]
    Timeout,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of asking one provider about one crop.
#[derive(Debug)]
pub enum ProviderOutcome {
    Success(Attributes),
    Failure(ProviderError),
}

impl ProviderOutcome {
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, ProviderOutcome::Success(_))
    }
}

impl From<Result<Attributes, ProviderError>> for ProviderOutcome {
    fn from(res: Result<Attributes, ProviderError>) -> Self {
        match res {
            Ok(attributes) => ProviderOutcome::Success(attributes),
            Err(err) => ProviderOutcome::Failure(err),
        }
    }
}

/// A classification backend that describes an object crop.
///
/// Implementations block for at most their own timeout and report every
/// problem as a [`ProviderError`]; they never panic on bad input.
pub trait Provider {
    fn name(&self) -> &str;

    /// Providers lacking credentials are left out of the chain.
    fn is_configured(&self) -> bool {
        true
    }

    fn classify(&self, image: &EncodedImage, class: &str) -> Result<Attributes, ProviderError>;
}

const SCHEMA: &str = r#"{
    "brand": "brand name, if recognisable",
    "model": "model name, if recognisable",
    "type": "specific type or category",
    "color": "dominant colour",
    "distinctive_features": ["feature 1", "feature 2", "feature 3"],
    "estimated_value": "estimated price range, if known",
    "condition": "new / used / worn",
    "confidence": 0.0
}"#;

/// Instruction sent along with the crop.
pub fn analysis_prompt(class: &str) -> String {
    let mut prompt = format!(
        "Analyse the {class} visible in this image in detail.\n\n\
         Reply with JSON of exactly this shape, confidence being a number between 0 and 1:\n\
         {SCHEMA}\n\n\
         Look closely at logos and design cues, identify model-specific details, \
         and be as specific as the image allows.\n\
         Respond with the JSON object only, without any other text."
    );

    let hints = match class {
        "cell phone" => Some(
            "For a smartphone check the camera layout and count, whether there is a home button, \
             brand-specific design (notch, curved edges) and the proportions.",
        ),
        "car" => Some(
            "For a car check the grille and badge, the headlight shape, \
             the body lines and the wheel design.",
        ),
        "laptop" => Some(
            "For a laptop check the logo position, the screen bezel thickness \
             and the keyboard layout.",
        ),
        _ => None,
    };

    if let Some(hints) = hints {
        prompt.push_str("\n\n");
        prompt.push_str(hints);
    }

    prompt
}

/// Reads provider text into attributes. Markdown code fences and chatter
/// around the JSON object are tolerated.
pub fn parse_attributes(text: &str) -> Result<Attributes, ProviderError> {
    let body = strip_fences(text.trim());

    match serde_json::from_str(body) {
        Ok(attributes) => Ok(attributes),
        Err(err) => {
            let inner = body
                .find('{')
                .zip(body.rfind('}'))
                .filter(|(start, end)| start < end)
                .map(|(start, end)| &body[start..=end]);

            match inner {
                Some(inner) if inner.len() < body.len() => serde_json::from_str(inner)
                    .map_err(|err| ProviderError::Malformed(err.to_string())),
                _ => Err(ProviderError::Malformed(err.to_string())),
            }
        }
    }
}

fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };

    // drop the info string ("json") up to the first newline
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };

    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
