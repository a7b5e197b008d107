//! Image prompt derivation with a keyword fallback.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::errors::GenerationError;

#[async_trait]
pub trait PromptWriter: Send + Sync {
    /// Asks a model for two image prompts describing `seed_text`.
    async fn derive_prompts(&self, seed_text: &str) -> Result<[String; 2], GenerationError>;
}

/// A topic keyword and the prompts used when it appears in the seed text.
pub struct TopicRule {
    pub topic: &'static str,
    pub prompts: [&'static str; 2],
}

/// Evaluated in order; the first topic found as a whole word wins.
pub const TOPIC_RULES: &[TopicRule] = &[
    TopicRule {
        topic: "ai",
        prompts: [
            "Futuristic digital brain built from glowing neural network nodes and streams of data, clean tech illustration in blue and purple gradients",
            "Abstract artificial intelligence concept with geometric circuitry and flowing data visualizations in corporate colors",
        ],
    },
    TopicRule {
        topic: "technology",
        prompts: [
            "Modern workspace of connected devices and holographic interfaces, minimalist and bright",
            "Innovation concept of interlocking gears and digital networks rising upward, professional blue tones",
        ],
    },
    TopicRule {
        topic: "business",
        prompts: [
            "Diverse team collaborating in a modern office, warm light, sense of growth and momentum",
            "Corporate success visualization with charts and upward trend lines in a refined color palette",
        ],
    },
    TopicRule {
        topic: "finance",
        prompts: [
            "Financial growth concept with rising charts, currency symbols and investment graphics in gold and blue",
            "Secure banking illustration with protected transactions and economic indicators, professional style",
        ],
    },
    TopicRule {
        topic: "marketing",
        prompts: [
            "Digital marketing concept with social icons, engagement metrics and connected brand elements",
            "Modern campaign visualization with a target audience and communication channels, vibrant but professional",
        ],
    },
    TopicRule {
        topic: "leadership",
        prompts: [
            "Leadership concept with an organizational network and a guiding figure silhouette, no faces",
            "Mentoring and professional development visualization with growth arrows connecting people shapes",
        ],
    },
    TopicRule {
        topic: "innovation",
        prompts: [
            "Creativity concept with a glowing lightbulb, gears and breakthrough light rays",
            "Research and development scene with scientific instruments and technological progress motifs",
        ],
    },
];

pub const DEFAULT_PROMPTS: [&str; 2] = [
    "Professional business concept illustration with modern design elements, corporate colors and innovation symbols",
    "Abstract professional graphic showing growth and forward-looking strategy with geometric elements",
];

fn contains_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|token| token == word)
}

/// Picks the prompt pair of the first rule whose topic occurs in `seed_text`
/// as a whole word, ignoring case. Falls back to [`DEFAULT_PROMPTS`].
pub fn select_fallback_prompts(seed_text: &str) -> (Option<&'static str>, [String; 2]) {
    let lower = seed_text.to_lowercase();
    match TOPIC_RULES
        .iter()
        .find(|rule| contains_word(&lower, rule.topic))
    {
        Some(rule) => (Some(rule.topic), rule.prompts.map(str::to_string)),
        None => (None, DEFAULT_PROMPTS.map(str::to_string)),
    }
}

/// Two prompts for `seed_text`: model-written when possible, otherwise from
/// the keyword table. Never fails.
pub async fn derive_image_prompts(writer: &dyn PromptWriter, seed_text: &str) -> [String; 2] {
    match writer.derive_prompts(seed_text).await {
        Ok(prompts) => {
            info!(?prompts, "Derived image prompts");
            prompts
        }
        Err(err) => {
            warn!(error = %err, "Prompt derivation failed, using keyword fallback");
            let (topic, prompts) = select_fallback_prompts(seed_text);
            match topic {
                Some(topic) => info!(topic, "Detected topic for fallback prompts"),
                None => info!("Using default fallback prompts"),
            }
            prompts
        }
    }
}
