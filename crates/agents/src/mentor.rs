//! Mentor agent - teaching, advice, planning, problem solving and review.

use std::sync::Arc;

use async_trait::async_trait;
use buddy_common::{
    AgentReply, Envelope, MemoryContext, MentorPlan, Mode, ModeAgent, Namespace, Result,
    SideEffect,
};
use buddy_llm::LlmClient;
use tracing::{debug, info, warn};

use crate::prompt::{ask, build_request};
use crate::side_effects::{extract, user_fact};

const MENTOR_SYSTEM_PROMPT: &str = r#"You are a patient, knowledgeable mentor. You teach, advise, plan and review.

Give substantive answers directly rather than asking follow-up questions.
Structure longer answers with short paragraphs or numbered steps.
Be encouraging but honest about trade-offs.
"#;

/// Key under which the most recent plan is kept in `mentor_plans`.
pub const LATEST_PLAN_KEY: &str = "latest";

/// Sub-style picked from the user's wording. Earlier variants win.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentorStyle {
    Teaching,
    Advice,
    Planning,
    ProblemSolving,
    Review,
    General,
}

impl MentorStyle {
    const KEYWORDS: [(MentorStyle, &'static [&'static str]); 5] = [
        (
            MentorStyle::Teaching,
            &["explain", "teach", "what is", "how does", "understand", "learn", "concept"],
        ),
        (
            MentorStyle::Advice,
            &["advice", "suggest", "recommend", "should i", "what do you think", "opinion"],
        ),
        (
            MentorStyle::Planning,
            &["plan", "roadmap", "steps", "how to", "guide", "prepare"],
        ),
        (
            MentorStyle::ProblemSolving,
            &["problem", "stuck", "help", "don't know", "confused", "issue"],
        ),
        (
            MentorStyle::Review,
            &["review", "feedback", "check", "correct", "improve", "better"],
        ),
    ];

    pub fn detect(text: &str) -> Self {
        let lower = text.to_lowercase();
        Self::KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
            .map_or(MentorStyle::General, |(style, _)| *style)
    }

    fn instruction(&self, text: &str) -> String {
        match self {
            MentorStyle::Teaching => format!(
                "Explain clearly: \"{text}\"\n\nBreak the concept down simply, use a real-world example or analogy, and finish with the key takeaway. Three to five paragraphs."
            ),
            MentorStyle::Advice => format!(
                "Give advice on: \"{text}\"\n\nConsider perspectives and trade-offs, give actionable suggestions, and stay supportive but realistic. Two to four paragraphs."
            ),
            MentorStyle::Planning => format!(
                "Create a plan for: \"{text}\"\n\nWrite 6-10 specific, numbered steps with timeframes and milestones, and a brief tip for each step."
            ),
            MentorStyle::ProblemSolving => format!(
                "Help with this problem: \"{text}\"\n\nIdentify the core issue, break it into manageable parts and offer practical solutions. Two to four paragraphs."
            ),
            MentorStyle::Review => format!(
                "Review this: \"{text}\"\n\nAcknowledge strengths, point out specific improvements and give actionable suggestions. Two to three paragraphs."
            ),
            MentorStyle::General => format!(
                "The student said: \"{text}\"\n\nRespond warmly and helpfully in one to three sentences."
            ),
        }
    }

    fn header(&self) -> Option<&'static str> {
        match self {
            MentorStyle::Teaching => Some("📚 **Teaching Mode**"),
            MentorStyle::Advice => Some("💡 **Mentor's Advice**"),
            MentorStyle::Planning => Some("🗺️ **Your Personalized Roadmap**"),
            MentorStyle::ProblemSolving => Some("🔍 **Problem-Solving Mode**"),
            MentorStyle::Review => Some("✍️ **Review & Feedback**"),
            MentorStyle::General => None,
        }
    }

    fn fallback(&self) -> &'static str {
        match self {
            MentorStyle::Teaching => "📚 I'd love to explain that. Give me a moment and ask again.",
            MentorStyle::Advice => "💡 I want to give you good advice on this. Let's try again in a moment.",
            MentorStyle::Planning => "🗺️ I couldn't put the roadmap together just now. Ask me again shortly.",
            MentorStyle::ProblemSolving => "🔍 Let's work through this together. Try me again in a moment.",
            MentorStyle::Review => "✍️ I'll review that for you as soon as I can. Please try again shortly.",
            MentorStyle::General => "I'm here to help guide you. Let's talk about that again in a moment.",
        }
    }
}

/// A request to look at the stored plan: the word `plan` next to a viewing
/// verb, or the phrase "saved plan". Whole words only.
fn wants_saved_plan(text: &str) -> bool {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has = |word: &str| words.contains(&word);

    let viewing = ["show", "view", "see", "display"].iter().any(|&v| has(v));
    (viewing && (has("plan") || has("plans")))
        || words.windows(2).any(|pair| pair == ["saved", "plan"])
}

/// Teaches and plans; planning replies are kept as `mentor_plans/latest`.
pub struct MentorAgent {
    llm: Arc<dyn LlmClient>,
}

impl MentorAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn saved_plan(context: &MemoryContext) -> Option<MentorPlan> {
        context
            .records_in(Namespace::MentorPlans)
            .find(|r| r.key == LATEST_PLAN_KEY)
            .and_then(|r| serde_json::from_value(r.value.clone()).ok())
    }
}

#[async_trait]
impl ModeAgent for MentorAgent {
    fn mode(&self) -> Mode {
        Mode::Mentor
    }

    fn read_namespaces(&self) -> &'static [Namespace] {
        &[Namespace::MentorPlans]
    }

    fn system_prompt(&self) -> &str {
        MENTOR_SYSTEM_PROMPT
    }

    async fn handle(&self, envelope: &Envelope, context: &MemoryContext) -> Result<AgentReply> {
        if wants_saved_plan(&envelope.text) {
            let reply = match Self::saved_plan(context) {
                Some(plan) => format!("📋 **Saved Plan: {}**\n\n{}", plan.topic, plan.content),
                None => "📋 You don't have a saved plan yet. Ask me to plan something and I'll keep it for you.".into(),
            };
            return Ok(AgentReply::new(reply));
        }

        let style = MentorStyle::detect(&envelope.text);
        debug!(trace_id = %envelope.trace_id, style = ?style, "Mentor style selected");

        let request = build_request(MENTOR_SYSTEM_PROMPT, context, style.instruction(&envelope.text));
        let (content, tokens) = match ask(self.llm.as_ref(), request).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(trace_id = %envelope.trace_id, error = %e, "Mentor LLM call failed");
                return Ok(AgentReply::degraded(style.fallback()));
            }
        };

        let extraction = extract(&content);
        let body = if extraction.reply.is_empty() {
            content.clone()
        } else {
            extraction.reply.clone()
        };

        let mut side_effects = extraction.side_effects();
        let text = match (style, style.header()) {
            (MentorStyle::Planning, Some(header)) => {
                let plan = MentorPlan {
                    topic: envelope.text.trim().to_string(),
                    content: body.clone(),
                };
                side_effects.push(SideEffect::Upsert {
                    namespace: Namespace::MentorPlans,
                    key: LATEST_PLAN_KEY.into(),
                    value: serde_json::to_value(&plan)?,
                });
                format!("{header}\n\n{body}\n\n✓ Plan saved! Type 'show my plan' anytime to review.")
            }
            (_, Some(header)) => format!("{header}\n\n{body}"),
            (_, None) => body,
        };
        side_effects.extend(user_fact(&envelope.text));

        info!(
            trace_id = %envelope.trace_id,
            style = ?style,
            tokens = tokens.total(),
            "Mentor replied"
        );

        Ok(AgentReply {
            reply: text,
            side_effects,
            tokens,
            degraded: false,
            advisories: Vec::new(),
        })
    }
}
