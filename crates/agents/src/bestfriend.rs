//! BestFriend agent - casual, supportive chat in a texting register.

use std::ops::RangeInclusive;
use std::sync::Arc;

use async_trait::async_trait;
use buddy_common::{AgentReply, Envelope, MemoryContext, Mode, ModeAgent, Namespace, Result};
use buddy_llm::LlmClient;
use tracing::{debug, warn};

use crate::prompt::{ask, build_request, truncate};
use crate::side_effects::{extract, user_fact};

const BESTFRIEND_SYSTEM_PROMPT: &str = r#"You are the user's best friend, chatting casually over text.

- Use 2-4 emojis naturally
- Be casual ("omg", "aww", "yesss", "honestly", "literally")
- Keep it brief (1-3 sentences)
- React naturally: supportive, excited or empathetic
- Don't interrogate with follow-up questions
- Sound like a text message, never formal
"#;

/// Emoji count the persona aims for.
pub const EMOJI_GUIDANCE: RangeInclusive<usize> = 2..=4;

/// Rough emoji count: pictographic and symbol blocks, ignoring joiners and
/// variation selectors.
pub fn count_emoji(text: &str) -> usize {
    text.chars()
        .filter(|c| {
            matches!(*c as u32,
                0x1F300..=0x1FAFF   // pictographs, emoticons, transport, supplemental
                | 0x2600..=0x27BF   // misc symbols, dingbats
                | 0x1F1E6..=0x1F1FF // regional indicators
            )
        })
        .count()
}

/// Advisory text when `reply` strays from the emoji guidance.
pub fn emoji_advisory(reply: &str) -> Option<String> {
    let count = count_emoji(reply);
    (!EMOJI_GUIDANCE.contains(&count)).then(|| {
        format!(
            "emoji_density: {count} emoji, expected {}-{}",
            EMOJI_GUIDANCE.start(),
            EMOJI_GUIDANCE.end()
        )
    })
}

pub struct BestFriendAgent {
    llm: Arc<dyn LlmClient>,
}

impl BestFriendAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ModeAgent for BestFriendAgent {
    fn mode(&self) -> Mode {
        Mode::BestFriend
    }

    fn read_namespaces(&self) -> &'static [Namespace] {
        &[]
    }

    fn system_prompt(&self) -> &str {
        BESTFRIEND_SYSTEM_PROMPT
    }

    async fn handle(&self, envelope: &Envelope, context: &MemoryContext) -> Result<AgentReply> {
        let request = build_request(
            BESTFRIEND_SYSTEM_PROMPT,
            context,
            format!("I just said: \"{}\"\n\nJust vibe with it!", envelope.text),
        );

        let (content, tokens) = match ask(self.llm.as_ref(), request).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(trace_id = %envelope.trace_id, error = %e, "BestFriend LLM call failed");
                return Ok(AgentReply::degraded(format!(
                    "aww bestie 💕 i'm here for you always! \"{}\" ... i totally get it 🫂",
                    truncate(envelope.text.trim(), 80)
                )));
            }
        };

        let extraction = extract(&content);
        let mut reply = AgentReply::new(if extraction.reply.is_empty() {
            content.clone()
        } else {
            extraction.reply.clone()
        });
        reply.tokens = tokens;
        reply.side_effects = extraction.side_effects();
        reply.side_effects.extend(user_fact(&envelope.text));

        if let Some(advisory) = emoji_advisory(&reply.reply) {
            debug!(trace_id = %envelope.trace_id, %advisory, "Reply outside emoji guidance");
            reply.advisories.push(advisory);
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buddy_common::BuddyError;
    use buddy_llm::{LlmRequest, LlmResponse};

    struct FixedLlm(Option<&'static str>);

    #[async_trait]
    impl LlmClient for FixedLlm {
        async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse> {
            self.0
                .map(|content| LlmResponse {
                    content: content.into(),
                    model: "fixed".into(),
                    usage: None,
                    finish_reason: None,
                })
                .ok_or_else(|| BuddyError::UpstreamUnavailable("down".into()))
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    fn envelope(text: &str) -> Envelope {
        Envelope::new("u1", "s1", text, Some("bestfriend".into())).unwrap()
    }

    #[test]
    fn test_count_emoji() {
        assert_eq!(count_emoji("omg yesss 🎉✨"), 2);
        assert_eq!(count_emoji("no emoji here"), 0);
        assert_eq!(count_emoji("❤️"), 1);
    }

    #[test]
    fn test_emoji_advisory_range() {
        assert!(emoji_advisory("aww 💕 you got this ✨").is_none());
        assert!(emoji_advisory("aww you got this").is_some());
        assert!(emoji_advisory("🎉🎉🎉🎉🎉").unwrap().contains("5 emoji"));
    }

    #[tokio::test]
    async fn test_reply_within_guidance_has_no_advisory() {
        let agent = BestFriendAgent::new(Arc::new(FixedLlm(Some("omg yesss 🎉 so proud of you ✨"))));
        let reply = agent.handle(&envelope("I got the job!"), &MemoryContext::default()).await.unwrap();
        assert_eq!(reply.reply, "omg yesss 🎉 so proud of you ✨");
        assert!(reply.advisories.is_empty());
        assert!(!reply.degraded);
    }

    #[tokio::test]
    async fn test_emoji_outside_guidance_is_advisory_only() {
        let agent = BestFriendAgent::new(Arc::new(FixedLlm(Some("that's great"))));
        let reply = agent.handle(&envelope("I got the job!"), &MemoryContext::default()).await.unwrap();
        assert_eq!(reply.reply, "that's great");
        assert_eq!(reply.advisories.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_degrades_with_casual_tone() {
        let agent = BestFriendAgent::new(Arc::new(FixedLlm(None)));
        let reply = agent.handle(&envelope("rough day"), &MemoryContext::default()).await.unwrap();
        assert!(reply.degraded);
        assert!(reply.reply.starts_with("aww bestie"));
        assert!(reply.side_effects.is_empty());
    }
}
