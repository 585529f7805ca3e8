//! Filtered views and distributions behind the genre, artist, popularity and
//! release-time tables.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;

use super::{decade_of, genre_counts, rank_counts};
use crate::pipeline::{EnrichedRow, Track};

/// Genres offered in the filter picker.
pub const FILTER_OPTIONS: usize = 50;
/// Genres listed for a filtered selection.
pub const FILTERED_TOP_GENRES: usize = 20;
/// Genres in the overall footprint table.
pub const FOOTPRINT_GENRES: usize = 12;

/// Enriched rows whose artist carries at least one of the selected genres.
/// An empty selection keeps every row.
pub fn filter_by_genres<'a>(rows: &'a [EnrichedRow], selected: &BTreeSet<String>) -> Vec<&'a EnrichedRow> {
    if selected.is_empty() {
        return rows.iter().collect();
    }
    rows.iter()
        .filter(|r| r.genres.iter().any(|g| selected.contains(g)))
        .collect()
}

/// Result of applying a genre selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenreSelection {
    /// Unique tracks matching the selection.
    pub matching_tracks: usize,
    /// Unique tracks in the playlist.
    pub total_tracks: usize,
    /// Top genres among the matching rows.
    pub top_genres: Vec<(String, usize)>,
}

pub fn select_genres(tracks: &[Track], rows: &[EnrichedRow], selected: &BTreeSet<String>, limit: usize) -> GenreSelection {
    let filtered = filter_by_genres(rows, selected);
    let matching: HashSet<&str> = filtered.iter().map(|r| r.track_id.as_str()).collect();
    let total: HashSet<&str> = tracks.iter().map(|t| t.id.as_str()).collect();
    let mut top_genres = genre_counts(filtered.iter().copied());
    top_genres.truncate(limit);

    GenreSelection {
        matching_tracks: matching.len(),
        total_tracks: total.len(),
        top_genres,
    }
}

/// Most frequent genres (raw occurrence counts).
pub fn top_genre_counts(rows: &[EnrichedRow], limit: usize) -> Vec<(String, usize)> {
    let mut counts = genre_counts(rows.iter());
    counts.truncate(limit);
    counts
}

/// Unique resolved artist names, falling back to unique display strings when
/// no artist was resolved.
pub fn unique_artist_count(tracks: &[Track], rows: &[EnrichedRow]) -> usize {
    let names: HashSet<&str> = rows.iter().filter_map(|r| r.artist_name.as_deref()).collect();
    if !names.is_empty() {
        return names.len();
    }
    tracks.iter().map(|t| t.artist.as_str()).collect::<HashSet<_>>().len()
}

/// One histogram bin over the 0–100 popularity scale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopularityBin {
    /// Inclusive lower bound.
    pub low: f64,
    /// Exclusive upper bound (inclusive for the last bin).
    pub high: f64,
    pub count: usize,
}

/// Equal-width histogram of track popularity. `bins` is clamped to 1..=100.
pub fn popularity_histogram(tracks: &[Track], bins: usize) -> Vec<PopularityBin> {
    let bins = bins.clamp(1, 100);
    let width = 100.0 / bins as f64;
    let mut out: Vec<PopularityBin> = (0..bins)
        .map(|i| PopularityBin {
            low: i as f64 * width,
            high: (i + 1) as f64 * width,
            count: 0,
        })
        .collect();

    for t in tracks {
        let idx = ((f64::from(t.popularity) / width) as usize).min(bins - 1);
        out[idx].count += 1;
    }
    out
}

/// Mean popularity per release decade.
pub fn popularity_by_decade(tracks: &[Track]) -> BTreeMap<i32, f64> {
    let mut sums: BTreeMap<i32, (u64, usize)> = BTreeMap::new();
    for t in tracks {
        if let Some(year) = t.release_year {
            let e = sums.entry(decade_of(year)).or_insert((0, 0));
            e.0 += u64::from(t.popularity);
            e.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(decade, (sum, n))| (decade, sum as f64 / n as f64))
        .collect()
}

/// One cell of the lead-artist × release-year heatmap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistYearCell {
    pub artist: String,
    pub year: i32,
    pub count: usize,
}

/// Track counts per (lead artist, release year) for the `top_n` lead artists
/// among tracks with a known year. Cells are ordered by artist rank, then year.
pub fn artist_year_heatmap(tracks: &[Track], top_n: usize) -> Vec<ArtistYearCell> {
    let dated: Vec<(&str, i32)> = tracks
        .iter()
        .filter_map(|t| t.release_year.map(|y| (t.lead_artist.as_str(), y)))
        .collect();

    let mut ranked = rank_counts(dated.iter().map(|(a, _)| *a));
    ranked.truncate(top_n);

    let mut cells = Vec::new();
    for (artist, _) in &ranked {
        let mut years: BTreeMap<i32, usize> = BTreeMap::new();
        for (a, y) in &dated {
            if a == artist {
                *years.entry(*y).or_insert(0) += 1;
            }
        }
        cells.extend(years.into_iter().map(|(year, count)| ArtistYearCell {
            artist: artist.clone(),
            year,
            count,
        }));
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::enrich;
    use crate::pipeline::testing::{artist, track};

    fn fixture() -> (Vec<Track>, Vec<EnrichedRow>) {
        let tracks = vec![
            track("1", "A, B", Some(1995), 10),
            track("2", "B", Some(2004), 55),
            track("3", "C", Some(2009), 100),
            track("4", "A", None, 0),
        ];
        let artists = vec![
            artist("A", &["rock", "grunge"]),
            artist("B", &["pop"]),
            artist("C", &["jazz"]),
        ];
        let rows = enrich(&tracks, &artists);
        (tracks, rows)
    }

    #[test]
    fn test_filter_empty_selection_keeps_all() {
        let (_, rows) = fixture();
        assert_eq!(filter_by_genres(&rows, &BTreeSet::new()).len(), rows.len());
    }

    #[test]
    fn test_select_genres_counts_unique_tracks() {
        let (tracks, rows) = fixture();
        let selected: BTreeSet<String> = ["pop".to_string()].into();
        let sel = select_genres(&tracks, &rows, &selected, FILTERED_TOP_GENRES);
        // track 1 (via B) and track 2
        assert_eq!(sel.matching_tracks, 2);
        assert_eq!(sel.total_tracks, 4);
        assert_eq!(sel.top_genres, vec![("pop".to_string(), 2)]);
    }

    #[test]
    fn test_top_genre_counts() {
        let (_, rows) = fixture();
        let top = top_genre_counts(&rows, 2);
        assert_eq!(top, vec![("rock".to_string(), 2), ("grunge".to_string(), 2)]);
    }

    #[test]
    fn test_unique_artist_count() {
        let (tracks, rows) = fixture();
        assert_eq!(unique_artist_count(&tracks, &rows), 3);

        let unresolved: Vec<EnrichedRow> = rows
            .iter()
            .cloned()
            .map(|mut r| {
                r.artist_name = None;
                r
            })
            .collect();
        // falls back to display strings: "A, B", "B", "C", "A"
        assert_eq!(unique_artist_count(&tracks, &unresolved), 4);
    }

    #[test]
    fn test_popularity_histogram_edges() {
        let (tracks, _) = fixture();
        let hist = popularity_histogram(&tracks, 20);
        assert_eq!(hist.len(), 20);
        assert_eq!(hist.iter().map(|b| b.count).sum::<usize>(), tracks.len());
        assert_eq!(hist[0].count, 1); // 0
        assert_eq!(hist[2].count, 1); // 10
        assert_eq!(hist[11].count, 1); // 55
        assert_eq!(hist[19].count, 1); // 100 lands in the last bin
    }

    #[test]
    fn test_popularity_by_decade() {
        let (tracks, _) = fixture();
        let by_decade = popularity_by_decade(&tracks);
        assert_eq!(by_decade.get(&1990), Some(&10.0));
        assert_eq!(by_decade.get(&2000), Some(&77.5));
    }

    #[test]
    fn test_artist_year_heatmap() {
        let tracks = vec![
            track("1", "A", Some(2001), 0),
            track("2", "A", Some(2001), 0),
            track("3", "A", Some(1999), 0),
            track("4", "B", Some(2010), 0),
            track("5", "C", Some(2011), 0),
            track("6", "C", None, 0),
        ];
        let cells = artist_year_heatmap(&tracks, 2);
        let flat: Vec<(&str, i32, usize)> =
            cells.iter().map(|c| (c.artist.as_str(), c.year, c.count)).collect();
        assert_eq!(flat, vec![("A", 1999, 1), ("A", 2001, 2), ("B", 2010, 1)]);
    }
}
