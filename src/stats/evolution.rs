//! Aggregates over the timestamps at which tracks were added.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Timelike, Utc};
use serde::Serialize;

use super::{median, rank_counts};
use crate::pipeline::{EnrichedRow, Track, UNKNOWN};

/// Genres tracked for drift and the monthly footprint.
pub const DRIFT_GENRES: usize = 8;
/// Days reported as bursts.
pub const BURST_DAYS: usize = 3;
/// Genres reported as rising or falling.
pub const DRIFT_REPORTED: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyAdds {
    pub date: NaiveDate,
    pub added: usize,
    pub cumulative: usize,
}

/// Rows of one genre added in one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenreMonth {
    /// First day of the month.
    pub month: NaiveDate,
    pub genre: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvolutionSnapshot {
    /// Unique tracks with a known add time.
    pub total_tracks: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    /// Whole days between first and last add; at least 1.
    pub days_span: i64,
    /// Mean adds over the days that saw any add, two decimals.
    pub adds_per_day: f64,
    pub growth: Vec<DailyAdds>,
    pub bursts: Vec<(NaiveDate, usize)>,
    /// Median of (year added − release year); None when no track qualifies.
    pub median_age_years: Option<f64>,
    /// Positive share deltas, largest first.
    pub rising_genres: Vec<(String, f64)>,
    /// Negative share deltas, most negative first.
    pub falling_genres: Vec<(String, f64)>,
    pub genre_by_month: Vec<GenreMonth>,
    /// Adds per weekday (Monday = 0) and hour of day.
    pub activity: [[usize; 24]; 7],
}

/// Compute evolution stats in the given reference offset.
///
/// Returns None when no track has an add timestamp; that means the data is
/// unavailable, not that nothing was added.
pub fn compute_evolution(
    tracks: &[Track],
    enriched: &[EnrichedRow],
    offset: FixedOffset,
) -> Option<EvolutionSnapshot> {
    let timed: Vec<(&Track, DateTime<FixedOffset>)> = tracks
        .iter()
        .filter_map(|t| t.added_at.map(|at| (t, at.with_timezone(&offset))))
        .collect();
    if timed.is_empty() {
        log::debug!("No add timestamps, skipping evolution stats");
        return None;
    }

    let mut per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    let mut activity = [[0usize; 24]; 7];
    for (_, at) in &timed {
        *per_day.entry(at.date_naive()).or_insert(0) += 1;
        activity[at.weekday().num_days_from_monday() as usize][at.hour() as usize] += 1;
    }

    let mut cumulative = 0;
    let growth: Vec<DailyAdds> = per_day
        .iter()
        .map(|(&date, &added)| {
            cumulative += added;
            DailyAdds { date, added, cumulative }
        })
        .collect();

    // per_day is non-empty because timed is
    let first_date = growth[0].date;
    let last_date = growth[growth.len() - 1].date;
    let days_span = match (last_date - first_date).num_days() {
        0 => 1,
        n => n,
    };
    let adds_per_day = round_to(timed.len() as f64 / growth.len() as f64, 2);

    let mut bursts: Vec<(NaiveDate, usize)> = growth.iter().map(|d| (d.date, d.added)).collect();
    bursts.sort_by(|a, b| b.1.cmp(&a.1));
    bursts.truncate(BURST_DAYS);

    let mut ages: Vec<f64> = timed
        .iter()
        .filter_map(|(t, at)| t.release_year.map(|y| f64::from(at.year() - y)))
        .collect();
    let median_age_years = median(&mut ages);

    let total_tracks = timed.iter().map(|(t, _)| t.id.as_str()).collect::<HashSet<_>>().len();

    let drift = GenreDrift::new(enriched, offset);
    let (rising_genres, falling_genres) = drift.deltas();

    Some(EvolutionSnapshot {
        total_tracks,
        first_date,
        last_date,
        days_span,
        adds_per_day,
        growth,
        bursts,
        median_age_years,
        rising_genres,
        falling_genres,
        genre_by_month: drift.by_month(),
        activity,
    })
}

/// (month index, genre) pairs for the globally top genres. Month index is
/// `year * 12 + month0` in the reference offset.
struct GenreDrift {
    rows: Vec<(i32, String)>,
}

impl GenreDrift {
    fn new(enriched: &[EnrichedRow], offset: FixedOffset) -> Self {
        let exploded: Vec<(i32, &str)> = enriched
            .iter()
            .filter_map(|r| r.added_at.map(|at| (month_index(at, offset), r)))
            .flat_map(|(month, r)| {
                let genres: Vec<&str> = if r.genres.is_empty() {
                    vec![UNKNOWN]
                } else {
                    r.genres.iter().map(String::as_str).collect()
                };
                genres.into_iter().map(move |g| (month, g))
            })
            .collect();

        let mut top = rank_counts(exploded.iter().map(|(_, g)| *g));
        top.truncate(DRIFT_GENRES);
        let keep: HashSet<&str> = top.iter().map(|(g, _)| g.as_str()).collect();

        Self {
            rows: exploded
                .into_iter()
                .filter(|(_, g)| keep.contains(g))
                .map(|(m, g)| (m, g.to_string()))
                .collect(),
        }
    }

    /// Share of each genre among rows whose month falls in `lo..=hi`.
    fn shares(&self, lo: i32, hi: i32) -> HashMap<&str, f64> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut total = 0usize;
        for (m, g) in &self.rows {
            if (lo..=hi).contains(m) {
                *counts.entry(g.as_str()).or_insert(0) += 1;
                total += 1;
            }
        }
        let total = total.max(1) as f64;
        counts.into_iter().map(|(g, n)| (g, n as f64 / total)).collect()
    }

    /// Rising and falling genres between the first two and the last two
    /// calendar months of the observed range. Windows overlap on short ranges.
    fn deltas(&self) -> (Vec<(String, f64)>, Vec<(String, f64)>) {
        let (Some(first), Some(last)) = (
            self.rows.iter().map(|(m, _)| *m).min(),
            self.rows.iter().map(|(m, _)| *m).max(),
        ) else {
            return (Vec::new(), Vec::new());
        };

        let early = self.shares(first, first + 1);
        let late = self.shares(last - 1, last);
        let names: BTreeSet<&str> = early.keys().chain(late.keys()).copied().collect();

        let mut deltas: Vec<(String, f64)> = names
            .into_iter()
            .map(|g| {
                let d = late.get(g).copied().unwrap_or(0.0) - early.get(g).copied().unwrap_or(0.0);
                (g.to_string(), round_to(d, 3))
            })
            .collect();
        // alphabetical within equal deltas
        deltas.sort_by(|a, b| b.1.total_cmp(&a.1));

        let rising = deltas
            .iter()
            .take(DRIFT_REPORTED)
            .filter(|(_, d)| *d > 0.0)
            .cloned()
            .collect();
        let mut falling: Vec<(String, f64)> = deltas.iter().filter(|(_, d)| *d < 0.0).cloned().collect();
        falling.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        falling.truncate(DRIFT_REPORTED);
        (rising, falling)
    }

    fn by_month(&self) -> Vec<GenreMonth> {
        let mut counts: BTreeMap<(i32, &str), usize> = BTreeMap::new();
        for (m, g) in &self.rows {
            *counts.entry((*m, g.as_str())).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .filter_map(|((m, genre), count)| {
                let month = NaiveDate::from_ymd_opt(m.div_euclid(12), m.rem_euclid(12) as u32 + 1, 1)?;
                Some(GenreMonth { month, genre: genre.to_string(), count })
            })
            .collect()
    }
}

fn month_index(at: DateTime<Utc>, offset: FixedOffset) -> i32 {
    let local = at.with_timezone(&offset);
    local.year() * 12 + local.month0() as i32
}

fn round_to(v: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (v * scale).round() / scale
}
