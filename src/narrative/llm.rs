//! OpenAI-compatible text generation for the narrative summary.

use std::fmt::Write as _;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SummaryConfig;
use crate::stats::StatsSnapshot;
use crate::stats::evolution::EvolutionSnapshot;

/// Models tried in order when no override is configured.
pub const PREFERRED_MODELS: [&str; 4] = ["gpt-4o-mini", "gpt-4o", "gpt-4", "gpt-3.5-turbo"];

/// Used when none of the preferred models is listed.
pub const DEFAULT_MODEL: &str = "gpt-4";

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("No text-generation API key configured")]
    NotConfigured,
    #[error("Model selection failed: {0}")]
    ModelSelection(String),
    #[error("Generation request failed: {0}")]
    Request(String),
    #[error("Generation returned no text")]
    EmptyResponse,
}

/// System and user message for one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Seam between the summarizer and a text-generation backend.
pub trait TextGenerator {
    /// Model ids available to the configured credential.
    fn list_models(&self) -> Result<Vec<String>, GenerationError>;

    /// One bounded completion. Returns the raw response text.
    fn complete(&self, model: &str, prompt: &Prompt) -> Result<String, GenerationError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

/// Blocking client for an OpenAI-compatible `/models` + `/chat/completions` API.
pub struct OpenAiClient {
    agent: ureq::Agent,
    api_base: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiClient {
    /// None when no API key is configured.
    pub fn from_config(cfg: &SummaryConfig) -> Option<Self> {
        let api_key = cfg.api_key.clone()?;
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(cfg.timeout_secs)))
            .http_status_as_error(false)
            .build()
            .into();
        Some(Self {
            agent,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            api_key,
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
        })
    }

    fn auth(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    fn check(
        response: &mut ureq::http::Response<ureq::Body>,
        wrap: fn(String) -> GenerationError,
    ) -> Result<(), GenerationError> {
        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            return Ok(());
        }
        let body = response.body_mut().read_to_string().unwrap_or_default();
        let body: String = body.chars().take(200).collect();
        Err(wrap(format!("HTTP {status}: {body}")))
    }
}

impl TextGenerator for OpenAiClient {
    fn list_models(&self) -> Result<Vec<String>, GenerationError> {
        let url = format!("{}/models", self.api_base);
        log::debug!("Listing models at {url}");
        let mut response = self
            .agent
            .get(&url)
            .header("Authorization", self.auth())
            .call()
            .map_err(|e| GenerationError::ModelSelection(e.to_string()))?;
        Self::check(&mut response, GenerationError::ModelSelection)?;
        let list: ModelList = response
            .body_mut()
            .read_json()
            .map_err(|e| GenerationError::ModelSelection(format!("Bad model list: {e}")))?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }

    fn complete(&self, model: &str, prompt: &Prompt) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.api_base);
        let request = ChatRequest {
            model,
            messages: [
                ChatMessage { role: "system", content: &prompt.system },
                ChatMessage { role: "user", content: &prompt.user },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        log::debug!("Requesting completion from {model}");
        let mut response = self
            .agent
            .post(&url)
            .header("Authorization", self.auth())
            .send_json(&request)
            .map_err(|e| GenerationError::Request(e.to_string()))?;
        Self::check(&mut response, GenerationError::Request)?;
        let reply: ChatResponse = response
            .body_mut()
            .read_json()
            .map_err(|e| GenerationError::Request(format!("Bad completion payload: {e}")))?;
        reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(GenerationError::EmptyResponse)
    }
}

/// Pick the first preferred model present in `available`, else the default.
pub fn choose_model(available: &[String]) -> &'static str {
    PREFERRED_MODELS
        .iter()
        .find(|m| available.iter().any(|a| a == *m))
        .copied()
        .unwrap_or(DEFAULT_MODEL)
}

const SYSTEM_PROMPT: &str = "You are a thoughtful music curator. Write vivid, specific descriptions. \
Use the playlist title only as a weak hint of intent; do not let a cheeky title override the data.";

/// Serialize the statistics into the completion prompt.
pub fn build_prompt(
    stats: &StatsSnapshot,
    evolution: Option<&EvolutionSnapshot>,
    hint: Option<&str>,
    title: Option<&str>,
) -> Prompt {
    let or_na = |s: String| if s.is_empty() { "n/a".to_string() } else { s };
    let genres = or_na(
        stats
            .top_genres
            .iter()
            .take(8)
            .map(|(g, p)| format!("{g} {p}%"))
            .collect::<Vec<_>>()
            .join(", "),
    );
    let artists = or_na(
        stats
            .top_artists
            .iter()
            .take(12)
            .map(|(a, _)| a.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    );
    let decades = or_na(
        stats
            .decades
            .iter()
            .map(|(d, n)| format!("{d}s:{n}"))
            .collect::<Vec<_>>()
            .join(", "),
    );
    let title = title.map(str::trim).filter(|t| !t.is_empty()).unwrap_or("none");
    let hint = hint.map(str::trim).filter(|h| !h.is_empty()).unwrap_or("none");

    let mut user = String::new();
    let _ = writeln!(user, "Create a detailed vibe summary for a Spotify playlist using these stats.\n");
    let _ = writeln!(user, "PLAYLIST TITLE: {title}");
    let _ = writeln!(user, "CURRENT SNAPSHOT");
    let _ = writeln!(user, "- Top genres: {genres}");
    let _ = writeln!(user, "- Frequent artists: {artists}");
    let _ = writeln!(user, "- Decade distribution: {decades}");
    let _ = writeln!(user, "- Median popularity (0-100): {}", stats.median_popularity as i64);
    let _ = writeln!(user, "- Style hint (optional): {hint}\n");
    let _ = writeln!(user, "EVOLUTION SNAPSHOT (if any)\n{}\n", evolution_block(evolution));
    user.push_str(
        "Write ~160–220 words. Include:\n\
         1) Core mood & energy (what it feels like and why)\n\
         2) Where/when it fits (study, commute, night drive, etc.)\n\
         3) Sonic traits (rhythm/production/vocals/tempo)\n\
         4) How the playlist evolved (pace of additions, rising/declining genres, novelty vs. nostalgia)\n\
         Avoid long artist lists. No emojis.",
    );

    Prompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}

fn evolution_block(evolution: Option<&EvolutionSnapshot>) -> String {
    let Some(evo) = evolution else {
        return "none".to_string();
    };
    let pct = |d: f64| (d.abs() * 100.0).round() as i64;

    let mut lines = vec![
        format!(
            "- Observed window: {} → {} ({} days)",
            evo.first_date, evo.last_date, evo.days_span
        ),
        format!("- Avg adds/day: {}", evo.adds_per_day),
    ];
    if !evo.bursts.is_empty() {
        let bursts: Vec<String> = evo.bursts.iter().map(|(d, n)| format!("{d} (+{n})")).collect();
        lines.push(format!("- Burst days: {}", bursts.join("; ")));
    }
    if let Some(age) = evo.median_age_years {
        lines.push(format!("- Median track age at add: {age:.1} years"));
    }
    if !evo.rising_genres.is_empty() {
        let rising: Vec<String> = evo.rising_genres.iter().map(|(g, d)| format!("{g} (+{}%)", pct(*d))).collect();
        lines.push(format!("- Rising genres: {}", rising.join(", ")));
    }
    if !evo.falling_genres.is_empty() {
        let falling: Vec<String> = evo.falling_genres.iter().map(|(g, d)| format!("{g} (-{}%)", pct(*d))).collect();
        lines.push(format!("- Declining genres: {}", falling.join(", ")));
    }
    lines.join("\n")
}
