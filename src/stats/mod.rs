//! Snapshot statistics over the current playlist contents.

pub mod distribution;
pub mod evolution;
pub mod search;

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::pipeline::{EnrichedRow, Track};

/// Default number of lead artists in the snapshot ranking.
pub const DEFAULT_TOP_ARTISTS: usize = 10;

/// Aggregates of the playlist as it is now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// (genre, integer percentage of all genre tag occurrences), most frequent first.
    pub top_genres: Vec<(String, u32)>,
    /// (lead artist, track count), most frequent first.
    pub top_artists: Vec<(String, usize)>,
    /// Decade (1990, 2000, ...) → track count.
    pub decades: BTreeMap<i32, usize>,
    /// Median track popularity; 0 for an empty table.
    pub median_popularity: f64,
}

/// Compute the snapshot from the track table and the enriched relation.
pub fn compute_snapshot(tracks: &[Track], enriched: &[EnrichedRow], top_artists: usize) -> StatsSnapshot {
    let counts = genre_counts(enriched.iter());
    StatsSnapshot {
        top_genres: genre_percentages(&counts),
        top_artists: top_lead_artists(tracks, top_artists),
        decades: decade_histogram(tracks),
        median_popularity: median_popularity(tracks),
    }
}

/// Count occurrences, most frequent first. Ties keep first-encounter order.
pub fn rank_counts<I, S>(items: I) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<(String, usize)> = Vec::new();
    for item in items {
        let key = item.as_ref();
        match index.get(key) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(key.to_string(), counts.len());
                counts.push((key.to_string(), 1));
            }
        }
    }
    // stable: equal counts stay in encounter order
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/// Genre tag frequencies over the exploded genre lists of the given rows.
pub fn genre_counts<'a>(rows: impl IntoIterator<Item = &'a EnrichedRow>) -> Vec<(String, usize)> {
    rank_counts(rows.into_iter().flat_map(|r| r.genres.iter()))
}

/// Convert counts to whole percentages of the total occurrence count,
/// rounding half up. Totals may differ from 100 by up to one point per genre.
pub fn genre_percentages(counts: &[(String, usize)]) -> Vec<(String, u32)> {
    let total: usize = counts.iter().map(|(_, n)| n).sum();
    if total == 0 {
        return Vec::new();
    }
    counts
        .iter()
        .map(|(g, n)| (g.clone(), ((n * 200 + total) / (2 * total)) as u32))
        .collect()
}

/// Lead (first credited) artist per track, ranked by track count.
pub fn top_lead_artists(tracks: &[Track], limit: usize) -> Vec<(String, usize)> {
    let mut ranked = rank_counts(tracks.iter().map(|t| t.lead_artist.as_str()));
    ranked.truncate(limit);
    ranked
}

/// Decade of a release year: the nearest lower multiple of 10.
pub fn decade_of(year: i32) -> i32 {
    year.div_euclid(10) * 10
}

/// Track count per release decade; tracks without a year are skipped.
pub fn decade_histogram(tracks: &[Track]) -> BTreeMap<i32, usize> {
    let mut decades = BTreeMap::new();
    for year in tracks.iter().filter_map(|t| t.release_year) {
        *decades.entry(decade_of(year)).or_insert(0) += 1;
    }
    decades
}

/// Median of the values, None when empty.
pub fn median(v: &mut [f64]) -> Option<f64> {
    v.sort_by(|a, b| a.total_cmp(b));
    let n = v.len();
    if n == 0 {
        return None;
    }
    if n % 2 == 1 {
        Some(v[n / 2])
    } else {
        Some((v[n / 2 - 1] + v[n / 2]) / 2.0)
    }
}

/// Median popularity of the track table; an empty table yields 0.
pub fn median_popularity(tracks: &[Track]) -> f64 {
    let mut values: Vec<f64> = tracks.iter().map(|t| f64::from(t.popularity)).collect();
    median(&mut values).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::enrich;
    use crate::pipeline::testing::{artist, track};

    #[test]
    fn test_median_popularity_example() {
        let tracks = vec![
            track("1", "A", None, 20),
            track("2", "B", None, 50),
            track("3", "C", None, 90),
        ];
        assert_eq!(median_popularity(&tracks), 50.0);
    }

    #[test]
    fn test_median_popularity_even_and_empty() {
        let tracks = vec![track("1", "A", None, 20), track("2", "B", None, 51)];
        assert_eq!(median_popularity(&tracks), 35.5);
        assert_eq!(median_popularity(&[]), 0.0);
    }

    #[test]
    fn test_rank_counts_ties_keep_encounter_order() {
        let ranked = rank_counts(["b", "a", "c", "a", "b", "d"]);
        assert_eq!(
            ranked,
            vec![
                ("b".to_string(), 2),
                ("a".to_string(), 2),
                ("c".to_string(), 1),
                ("d".to_string(), 1)
            ]
        );
    }

    #[test]
    fn test_genre_percentages_over_tag_occurrences() {
        // 3 tracks, but 4 tag occurrences: rock x2, pop x1, jazz x1
        let tracks = vec![
            track("1", "A", None, 0),
            track("2", "B", None, 0),
            track("3", "C", None, 0),
        ];
        let artists = vec![
            artist("A", &["rock", "pop"]),
            artist("B", &["rock"]),
            artist("C", &["jazz"]),
        ];
        let rows = enrich(&tracks, &artists);
        let snap = compute_snapshot(&tracks, &rows, 10);
        assert_eq!(
            snap.top_genres,
            vec![
                ("rock".to_string(), 50),
                ("pop".to_string(), 25),
                ("jazz".to_string(), 25)
            ]
        );
    }

    #[test]
    fn test_genre_percentages_round_half_up() {
        // 1/8 = 12.5% → 13, 7/8 = 87.5% → 88
        let counts = vec![("a".to_string(), 7), ("b".to_string(), 1)];
        assert_eq!(
            genre_percentages(&counts),
            vec![("a".to_string(), 88), ("b".to_string(), 13)]
        );
    }

    #[test]
    fn test_genre_percentages_sum_close_to_100() {
        let counts: Vec<(String, usize)> = [7usize, 5, 3, 3, 2, 1, 1]
            .iter()
            .enumerate()
            .map(|(i, n)| (format!("g{i}"), *n))
            .collect();
        let pct = genre_percentages(&counts);
        let sum: i64 = pct.iter().map(|(_, p)| i64::from(*p)).sum();
        assert!((sum - 100).abs() <= counts.len() as i64, "sum {sum}");
        assert!(genre_percentages(&[]).is_empty());
    }

    #[test]
    fn test_top_artists_count_lead_only_once_per_track() {
        let tracks = vec![
            track("1", "A, B", None, 0),
            track("2", "B", None, 0),
            track("3", "A", None, 0),
            track("4", "C, A", None, 0),
        ];
        let top = top_lead_artists(&tracks, 2);
        assert_eq!(top, vec![("A".to_string(), 2), ("B".to_string(), 1)]);
    }

    #[test]
    fn test_top_artists_use_whole_lead_name() {
        let mut t = track("1", "Tyler, The Creator, Kali Uchis", None, 0);
        t.lead_artist = "Tyler, The Creator".to_string();
        let top = top_lead_artists(&[t], 5);
        assert_eq!(top, vec![("Tyler, The Creator".to_string(), 1)]);
    }

    #[test]
    fn test_decade_histogram() {
        let tracks = vec![
            track("1", "A", Some(1999), 0),
            track("2", "A", Some(1990), 0),
            track("3", "A", Some(2005), 0),
            track("4", "A", None, 0),
        ];
        let decades = decade_histogram(&tracks);
        assert_eq!(decades.get(&1990), Some(&2));
        assert_eq!(decades.get(&2000), Some(&1));
        assert_eq!(decades.len(), 2);
        assert_eq!(decade_of(2010), 2010);
    }

    #[test]
    fn test_snapshot_without_genres() {
        let tracks = vec![track("1", "A", Some(2001), 70)];
        let rows = enrich(&tracks, &[]);
        let snap = compute_snapshot(&tracks, &rows, DEFAULT_TOP_ARTISTS);
        assert!(snap.top_genres.is_empty());
        assert_eq!(snap.top_artists, vec![("A".to_string(), 1)]);
        assert_eq!(snap.median_popularity, 70.0);
    }
}
