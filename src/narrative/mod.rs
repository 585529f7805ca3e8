//! Playlist "vibe" narrative: a deterministic template, optionally replaced
//! by generated text when a text-generation backend is configured.

pub mod llm;

use std::fmt;
use std::sync::OnceLock;

use serde::Serialize;

use crate::config::SummaryConfig;
use crate::stats::StatsSnapshot;
use crate::stats::evolution::EvolutionSnapshot;
use llm::{GenerationError, OpenAiClient, TextGenerator, build_prompt, choose_model};

/// Provenance tag of text produced by the deterministic template.
pub const LOCAL_FALLBACK: &str = "local-fallback";

/// Titles too generic to hint at anything.
const GENERIC_TITLES: [&str; 3] = ["my playlist", "playlist", "mix"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Provenance {
    /// Generated by the named model.
    Model(String),
    LocalFallback,
}

impl Provenance {
    pub fn tag(&self) -> &str {
        match self {
            Self::Model(m) => m,
            Self::LocalFallback => LOCAL_FALLBACK,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Narrative {
    pub text: String,
    pub provenance: Provenance,
}

/// Everything a summary is derived from.
#[derive(Debug, Clone, Copy)]
pub struct SummaryInput<'a> {
    pub stats: &'a StatsSnapshot,
    pub evolution: Option<&'a EvolutionSnapshot>,
    pub title: Option<&'a str>,
    /// Free-text style hint, passed to the generator only.
    pub hint: Option<&'a str>,
}

/// Single-paragraph templated summary. The title only adds a closing remark
/// and never changes the classification.
pub fn deterministic_summary(
    stats: &StatsSnapshot,
    evolution: Option<&EvolutionSnapshot>,
    title: Option<&str>,
) -> String {
    let genre_line = if stats.top_genres.is_empty() {
        "a mix of styles".to_string()
    } else {
        stats
            .top_genres
            .iter()
            .take(3)
            .map(|(g, p)| format!("{g} ({p}%)"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let artist_line = if stats.top_artists.is_empty() {
        "various artists".to_string()
    } else {
        stats
            .top_artists
            .iter()
            .take(3)
            .map(|(a, _)| a.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let era_line = match (stats.decades.keys().next(), stats.decades.keys().next_back(), modal_decade(stats)) {
        (Some(first), Some(last), Some(tilt)) => format!("spans {first}s–{last}s with a {tilt}s tilt"),
        _ => "spans multiple eras".to_string(),
    };

    let mut text = format!(
        "This playlist feels {}. Dominant flavors: {genre_line}. Frequent artists include {artist_line}. It {era_line}.",
        classify_popularity(stats.median_popularity)
    );
    if let Some(evo) = evolution {
        text.push_str(&pace_line(evo));
    }
    if let Some(t) = title.map(str::trim).filter(|t| is_meaningful_title(t)) {
        text.push_str(&format!(" The title “{t}” hints at the intended vibe."));
    }
    text
}

fn is_meaningful_title(title: &str) -> bool {
    title.chars().count() >= 3 && !GENERIC_TITLES.contains(&title.to_lowercase().as_str())
}

/// Mainstream classification word for a median popularity.
pub fn classify_popularity(median_popularity: f64) -> &'static str {
    if median_popularity < 40.0 {
        "underground"
    } else if median_popularity < 65.0 {
        "balanced"
    } else {
        "mainstream-leaning"
    }
}

/// Earliest decade with the highest track count.
fn modal_decade(stats: &StatsSnapshot) -> Option<i32> {
    let mut best: Option<(i32, usize)> = None;
    for (&decade, &count) in &stats.decades {
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((decade, count));
        }
    }
    best.map(|(d, _)| d)
}

fn pace_line(evo: &EvolutionSnapshot) -> String {
    let pace = if evo.adds_per_day >= 1.0 {
        "bursty"
    } else if evo.adds_per_day >= 0.3 {
        "steady"
    } else {
        "occasional"
    };
    let mut line = format!(" Curation pace feels {pace}");
    if let Some(age) = evo.median_age_years {
        let novelty = if age <= 3.0 {
            "recent-leaning"
        } else if age >= 12.0 {
            "nostalgic"
        } else {
            "mixed-era"
        };
        line.push_str(", ");
        line.push_str(novelty);
    }
    let names = |genres: &[(String, f64)]| genres.iter().take(2).map(|(g, _)| g.as_str()).collect::<Vec<_>>().join(", ");
    if !evo.rising_genres.is_empty() {
        line.push_str(&format!(", rising: {}", names(&evo.rising_genres)));
    }
    if !evo.falling_genres.is_empty() {
        line.push_str(&format!(", cooling: {}", names(&evo.falling_genres)));
    }
    line.push('.');
    line
}

/// Produces narratives, preferring generated text and falling back to the
/// deterministic template on any generation failure.
pub struct Summarizer<G: TextGenerator = OpenAiClient> {
    generator: Option<G>,
    model_override: Option<String>,
    /// Model picked from the model list; kept for the life of the summarizer.
    chosen_model: OnceLock<String>,
}

impl Summarizer<OpenAiClient> {
    pub fn from_config(cfg: &SummaryConfig) -> Self {
        Self::new(OpenAiClient::from_config(cfg), cfg.model.clone())
    }
}

impl<G: TextGenerator> Summarizer<G> {
    pub fn new(generator: Option<G>, model_override: Option<String>) -> Self {
        Self {
            generator,
            model_override: model_override.filter(|m| !m.trim().is_empty()),
            chosen_model: OnceLock::new(),
        }
    }

    /// A summarizer that never calls out.
    pub fn local_only() -> Self {
        Self::new(None, None)
    }

    pub fn is_configured(&self) -> bool {
        self.generator.is_some()
    }

    /// Model to request: the override, else the memoized pick from the model
    /// list. A failed listing is not memoized.
    pub fn select_model(&self) -> Result<String, GenerationError> {
        if let Some(m) = &self.model_override {
            return Ok(m.clone());
        }
        if let Some(m) = self.chosen_model.get() {
            return Ok(m.clone());
        }
        let generator = self.generator.as_ref().ok_or(GenerationError::NotConfigured)?;
        let available = generator.list_models()?;
        let model = choose_model(&available);
        log::info!("Selected model {model}");
        Ok(self.chosen_model.get_or_init(|| model.to_string()).clone())
    }

    /// Generated narrative, or the reason it could not be produced.
    pub fn generate(&self, input: &SummaryInput<'_>) -> Result<Narrative, GenerationError> {
        let generator = self.generator.as_ref().ok_or(GenerationError::NotConfigured)?;
        let model = self.select_model()?;
        let prompt = build_prompt(input.stats, input.evolution, input.hint, input.title);
        let text = generator.complete(&model, &prompt)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(Narrative {
            text: text.to_string(),
            provenance: Provenance::Model(model),
        })
    }

    /// Always returns text; generation failures are logged and replaced by
    /// the deterministic summary.
    pub fn summarize(&self, input: &SummaryInput<'_>) -> Narrative {
        match self.generate(input) {
            Ok(narrative) => narrative,
            Err(GenerationError::NotConfigured) => {
                log::debug!("No text generator configured, using local summary");
                self.local(input)
            }
            Err(e) => {
                log::warn!("Narrative generation unavailable: {e}. Using local summary.");
                self.local(input)
            }
        }
    }

    fn local(&self, input: &SummaryInput<'_>) -> Narrative {
        Narrative {
            text: deterministic_summary(input.stats, input.evolution, input.title),
            provenance: Provenance::LocalFallback,
        }
    }
}
