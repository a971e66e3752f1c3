// src/core/resolver.rs
//! Endpoint disambiguation
//!
//! Turns a free-text query into one endpoint through a strict cascade. Each stage
//! either selects a single endpoint or hands the (possibly narrowed) candidate list
//! to its successor; nothing is ever guessed among several equally good matches.
//! The last stage asks the human, so the resolver itself stays stateless.

use serde::Serialize;
use tera::{Context, Tera};
use tracing::{debug, info, warn};

use crate::core::boundary::CallGuard;
use crate::core::llm::{collect_reply, LanguageAssistant, PromptMessage};
use crate::core::routes::{normalize_path, sort_endpoints, EndpointDescriptor, HttpMethod};
use crate::core::sink::OutputSink;
use crate::error::Result;

const PROMPT_TEMPLATE: &str = "assistant_prompt.txt";
const CLARIFICATION_TEMPLATE: &str = "clarification.md";

const SYSTEM_PROMPT: &str = "You map requests about a web application onto its HTTP endpoints. \
Answer with a single candidate number or the word None, nothing else.";

const PROMPT_SOURCE: &str = "\
Request: {{ query }}

Candidate endpoints:
{% for c in candidates %}{{ loop.index }}. {{ c.method }} {{ c.path }} (handler: {{ c.handler_name }})
{% endfor %}
Reply with the number of the one endpoint the request refers to. \
Reply None if no endpoint fits or several fit equally well.";

const CLARIFICATION_SOURCE: &str = "\
{% if query %}Several endpoints could match **{{ query }}**.{% else %}Several endpoints are available.{% endif %} \
Which one did you mean?

{% for c in candidates %}{{ loop.index }}. `{{ c.method }} {{ c.path }}` ({{ c.handler_name }} in {{ c.location.file }})
{% endfor %}";

/// Cascade stages, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    /// Zero or one candidate
    Trivial,
    /// Query is exactly `<METHOD> <path>`
    DirectMatch,
    /// Query is a substring of one path or handler name, or the other way around
    KeywordMatch,
    Assistant,
    Clarification,
}

impl Stage {
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Trivial => Some(Stage::DirectMatch),
            Stage::DirectMatch => Some(Stage::KeywordMatch),
            Stage::KeywordMatch => Some(Stage::Assistant),
            Stage::Assistant => Some(Stage::Clarification),
            Stage::Clarification => None,
        }
    }
}

/// Outcome of one resolution
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Selected { endpoint: EndpointDescriptor, stage: Stage },
    /// There was nothing to choose from
    NotFound,
    /// The human has to pick; the candidates were shown through the sink
    NeedsClarification { candidates: Vec<EndpointDescriptor> },
    Cancelled,
}

impl Resolution {
    pub fn into_endpoint(self) -> Option<EndpointDescriptor> {
        match self {
            Resolution::Selected { endpoint, .. } => Some(endpoint),
            _ => None,
        }
    }
}

/// What a stage did with the candidates
enum StageOutcome {
    Selected(usize),
    Continue,
    Cancelled,
}

/// Assistant reply, interpreted against the candidate count
#[derive(Debug, PartialEq)]
enum AssistantChoice {
    Index(usize),
    Declined,
    OutOfRange(usize),
    Unparseable(String),
}

pub struct EndpointResolver<'a> {
    assistant: Option<&'a dyn LanguageAssistant>,
    sink: &'a dyn OutputSink,
    templates: Tera,
}

impl<'a> EndpointResolver<'a> {
    pub fn new(assistant: Option<&'a dyn LanguageAssistant>, sink: &'a dyn OutputSink) -> Result<Self> {
        let mut templates = Tera::default();
        templates.add_raw_templates(vec![
            (PROMPT_TEMPLATE, PROMPT_SOURCE),
            (CLARIFICATION_TEMPLATE, CLARIFICATION_SOURCE),
        ])?;

        Ok(Self { assistant, sink, templates })
    }

    /// Resolve `query` against `endpoints`
    ///
    /// Cancellation is checked before every stage and ends the run without any
    /// further output. Errors only come from rendering the built-in templates.
    pub async fn resolve(
        &self,
        query: &str,
        endpoints: &[EndpointDescriptor],
        guard: &CallGuard,
    ) -> Result<Resolution> {
        let query = query.trim();
        let mut candidates = endpoints.to_vec();
        sort_endpoints(&mut candidates);

        let mut stage = Stage::Trivial;
        loop {
            if guard.is_cancelled() {
                debug!("Resolution of '{}' cancelled before {:?}", query, stage);
                return Ok(Resolution::Cancelled);
            }

            let outcome = match stage {
                Stage::Trivial => match candidates.len() {
                    0 => return Ok(Resolution::NotFound),
                    1 => StageOutcome::Selected(0),
                    _ => StageOutcome::Continue,
                },
                Stage::DirectMatch => direct_match(query, &candidates),
                Stage::KeywordMatch => keyword_match(query, &mut candidates),
                Stage::Assistant => self.assistant_match(query, &candidates, guard).await?,
                Stage::Clarification => {
                    let message = self.render(CLARIFICATION_TEMPLATE, query, &candidates)?;
                    self.sink.markdown(&message);
                    return Ok(Resolution::NeedsClarification { candidates });
                }
            };

            match outcome {
                StageOutcome::Selected(index) => {
                    let endpoint = candidates.swap_remove(index);
                    info!("Resolved '{}' to {} via {:?}", query, endpoint.route(), stage);
                    return Ok(Resolution::Selected { endpoint, stage });
                }
                StageOutcome::Cancelled => return Ok(Resolution::Cancelled),
                StageOutcome::Continue => match stage.next() {
                    Some(next) => stage = next,
                    None => return Ok(Resolution::NeedsClarification { candidates }),
                },
            }
        }
    }

    async fn assistant_match(
        &self,
        query: &str,
        candidates: &[EndpointDescriptor],
        guard: &CallGuard,
    ) -> Result<StageOutcome> {
        let Some(assistant) = self.assistant else {
            debug!("No language assistant configured, skipping");
            return Ok(StageOutcome::Continue);
        };

        let messages = vec![
            PromptMessage::system(SYSTEM_PROMPT),
            PromptMessage::user(self.render(PROMPT_TEMPLATE, query, candidates)?),
        ];
        self.sink.progress(&format!("Asking {} to pick among {} endpoints", assistant.model_name(), candidates.len()));

        let reply = guard
            .guarded("ask", async { collect_reply(assistant.ask(messages).await?).await })
            .await;

        let reason = match reply {
            Ok(reply) => match interpret_reply(&reply, candidates.len()) {
                AssistantChoice::Index(index) => return Ok(StageOutcome::Selected(index)),
                AssistantChoice::Declined => "the assistant found no single match".to_string(),
                AssistantChoice::OutOfRange(n) => format!("the assistant answered {} but there are {} candidates", n, candidates.len()),
                AssistantChoice::Unparseable(text) => format!("the assistant answered '{}' instead of a number", text),
            },
            Err(e) if e.is_cancelled() => return Ok(StageOutcome::Cancelled),
            Err(e) => {
                warn!("Assistant call failed for '{}' ({} via {}): {}", query, assistant.model_name(), assistant.provider_name(), e);
                "the assistant could not be reached".to_string()
            }
        };

        info!("Assistant stage for '{}' fell through: {}", query, reason);
        self.sink.progress(&format!("Could not pick an endpoint automatically: {}", reason));
        Ok(StageOutcome::Continue)
    }

    fn render(&self, template: &str, query: &str, candidates: &[EndpointDescriptor]) -> Result<String> {
        let mut context = Context::new();
        context.insert("query", query);
        context.insert("candidates", candidates);
        Ok(self.templates.render(template, &context)?)
    }
}

fn direct_match(query: &str, candidates: &[EndpointDescriptor]) -> StageOutcome {
    let mut parts = query.split_whitespace();
    let (Some(method), Some(path), None) = (parts.next(), parts.next(), parts.next()) else {
        return StageOutcome::Continue;
    };
    let Ok(method) = method.parse::<HttpMethod>() else {
        return StageOutcome::Continue;
    };
    let path = normalize_path(path);

    unique(candidates.iter().enumerate()
        .filter(|(_, c)| c.method == method && c.path == path)
        .map(|(i, _)| i))
}

/// Keeps only the matching candidates when several match
fn keyword_match(query: &str, candidates: &mut Vec<EndpointDescriptor>) -> StageOutcome {
    if query.is_empty() {
        return StageOutcome::Continue;
    }
    let needle = query.to_lowercase();

    let is_hit = |c: &EndpointDescriptor| {
        let path = c.path.to_lowercase();
        let handler = c.handler_name.to_lowercase();
        path.contains(&needle)
            || handler.contains(&needle)
            || (path != "/" && needle.contains(&path))
            || needle.contains(&handler)
    };

    let hits: Vec<usize> = candidates.iter().enumerate()
        .filter(|&(_, c)| is_hit(c))
        .map(|(i, _)| i)
        .collect();

    if hits.len() > 1 {
        debug!("Keyword '{}' matches {} endpoints", query, hits.len());
        candidates.retain(|c| is_hit(c));
    }
    unique(hits.into_iter())
}

fn unique(mut hits: impl Iterator<Item = usize>) -> StageOutcome {
    match (hits.next(), hits.next()) {
        (Some(index), None) => StageOutcome::Selected(index),
        _ => StageOutcome::Continue,
    }
}

/// Replies are 1-based, matching the numbering in the prompt
fn interpret_reply(reply: &str, count: usize) -> AssistantChoice {
    let cleaned = reply.trim().trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '.' | '*') || c.is_whitespace());

    if cleaned.eq_ignore_ascii_case("none") {
        return AssistantChoice::Declined;
    }
    match cleaned.parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => AssistantChoice::Index(n - 1),
        Ok(n) => AssistantChoice::OutOfRange(n),
        Err(_) => AssistantChoice::Unparseable(cleaned.to_string()),
    }
}
