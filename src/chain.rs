use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::crop::EncodedImage;
use crate::enrichment::Enrichment;
use crate::provider::{Provider, ProviderOutcome};

/// Ordered providers tried one after another until one answers.
pub struct FallbackChain {
    providers: Vec<Box<dyn Provider>>,
}

impl FallbackChain {
    /// Providers without credentials are dropped here, once.
    pub fn new(providers: Vec<Box<dyn Provider>>) -> Self {
        let providers: Vec<_> = providers
            .into_iter()
            .filter(|p| {
                let configured = p.is_configured();
                if !configured {
                    info!(provider = p.name(), "provider not configured, skipping");
                }
                configured
            })
            .collect();

        Self { providers }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// First successful answer, tagged with its provider and `now`.
    pub fn run(&self, image: &EncodedImage, class: &str, now: DateTime<Utc>) -> Option<Enrichment> {
        for provider in &self.providers {
            match ProviderOutcome::from(provider.classify(image, class)) {
                ProviderOutcome::Success(attributes) => {
                    debug!(provider = provider.name(), class, confidence = attributes.confidence, "classified");
                    return Some(Enrichment::new(attributes, provider.name(), now));
                }
                ProviderOutcome::Failure(err) => {
                    warn!(provider = provider.name(), class, %err, "provider failed");
                }
            }
        }

        None
    }
}

impl std::fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChain")
            .field("providers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::Attributes;
    use crate::provider::ProviderError;

    struct Fixed {
        name: &'static str,
        configured: bool,
        answer: Option<&'static str>,
    }

    impl Provider for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        fn classify(&self, _: &EncodedImage, _: &str) -> Result<Attributes, ProviderError> {
            match self.answer {
                Some(brand) => Ok(Attributes {
                    brand: Some(brand.to_string()),
                    confidence: 0.9,
                    ..Default::default()
                }),
                None => Err(ProviderError::Http(503)),
            }
        }
    }

    fn image() -> EncodedImage {
        EncodedImage {
            jpeg: Vec::new(),
            width: 0,
            height: 0,
        }
    }

    #[test]
    fn unconfigured_providers_are_skipped() {
        let chain = FallbackChain::new(vec![
            Box::new(Fixed { name: "a", configured: false, answer: Some("A") }),
            Box::new(Fixed { name: "b", configured: true, answer: Some("B") }),
        ]);

        assert_eq!(chain.names(), vec!["b"]);

        let e = chain.run(&image(), "car", Utc::now()).unwrap();
        assert_eq!(e.provider, "b");
    }

    #[test]
    fn all_failing_yields_none() {
        let chain = FallbackChain::new(vec![
            Box::new(Fixed { name: "a", configured: true, answer: None }),
            Box::new(Fixed { name: "b", configured: true, answer: None }),
        ]);

        assert!(chain.run(&image(), "car", Utc::now()).is_none());
        assert!(FallbackChain::new(Vec::new()).run(&image(), "car", Utc::now()).is_none());
    }
}
