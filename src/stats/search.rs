//! Track lookup within one playlist and the per-track detail card.

use std::collections::HashSet;

use chrono::{FixedOffset, NaiveDate};
use serde::Serialize;

use super::median_popularity;
use crate::pipeline::{EnrichedRow, Track};

/// Matches offered for a query.
pub const MAX_SUGGESTIONS: usize = 10;
/// Genre keywords shown per track.
pub const TRACK_GENRES: usize = 10;

/// Tracks whose name or artist string contains `query`, ignoring case, in
/// playlist order. A blank query matches everything.
pub fn search_tracks<'a>(tracks: &'a [Track], query: &str) -> Vec<&'a Track> {
    let needle = query.trim().to_lowercase();
    tracks
        .iter()
        .filter(|t| {
            needle.is_empty()
                || t.name.to_lowercase().contains(&needle)
                || t.artist.to_lowercase().contains(&needle)
        })
        .take(MAX_SUGGESTIONS)
        .collect()
}

/// One track set against the rest of its playlist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackDetails {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub album: String,
    pub popularity: u32,
    pub playlist_median_popularity: f64,
    /// 1-based position among tracks with a known add time, oldest first.
    pub order_added: Option<usize>,
    pub release_year: Option<i32>,
    /// Years since release, relative to `current_year`.
    pub age_years: Option<i32>,
    /// Add date in the reference offset.
    pub added_on: Option<NaiveDate>,
    /// Distinct genre tags of the track's artists, first-seen order.
    pub genres: Vec<String>,
    pub url: Option<String>,
    pub image: Option<String>,
}

impl TrackDetails {
    /// Popularity minus the playlist median.
    pub fn popularity_vs_median(&self) -> f64 {
        f64::from(self.popularity) - self.playlist_median_popularity
    }
}

/// Details for `track_id`, or None when it isn't in the table.
pub fn track_details(
    tracks: &[Track],
    enriched: &[EnrichedRow],
    track_id: &str,
    current_year: i32,
    offset: FixedOffset,
) -> Option<TrackDetails> {
    let track = tracks.iter().find(|t| t.id == track_id)?;

    let order_added = track.added_at.and_then(|_| {
        let mut dated: Vec<&Track> = tracks.iter().filter(|t| t.added_at.is_some()).collect();
        // stable: equal timestamps keep playlist order
        dated.sort_by_key(|t| t.added_at);
        dated.iter().position(|t| t.id == track_id).map(|i| i + 1)
    });

    let mut seen = HashSet::new();
    let genres: Vec<String> = enriched
        .iter()
        .filter(|r| r.track_id == track_id)
        .flat_map(|r| r.genres.iter())
        .map(|g| g.trim())
        .filter(|g| !g.is_empty() && seen.insert(*g))
        .take(TRACK_GENRES)
        .map(str::to_string)
        .collect();

    Some(TrackDetails {
        id: track.id.clone(),
        name: track.name.clone(),
        artist: track.artist.clone(),
        album: track.album.clone(),
        popularity: track.popularity,
        playlist_median_popularity: median_popularity(tracks),
        order_added,
        release_year: track.release_year,
        age_years: track.release_year.map(|y| current_year - y),
        added_on: track.added_at.map(|at| at.with_timezone(&offset).date_naive()),
        genres,
        url: track.url.clone(),
        image: track.image.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::utc;
    use crate::pipeline::enrich;
    use crate::pipeline::testing::{added, artist, track};

    fn fixture() -> Vec<Track> {
        let mut circles = added(track("1", "Post Malone", Some(2019), 80), 2024, 3, 2, 10);
        circles.name = "Circles".to_string();
        let mut sunflower = added(track("2", "Post Malone, Swae Lee", Some(2018), 90), 2024, 1, 15, 9);
        sunflower.name = "Sunflower".to_string();
        let mut blue = track("3", "Slowdive", Some(1993), 30);
        blue.name = "Alison".to_string();
        let mut late = added(track("4", "Beach House", Some(2015), 60), 2024, 3, 2, 10);
        late.name = "Space Song".to_string();
        vec![circles, sunflower, blue, late]
    }

    #[test]
    fn test_search_name_or_artist_ignoring_case() {
        let tracks = fixture();
        let ids = |q: &str| search_tracks(&tracks, q).iter().map(|t| t.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids("circles"), vec!["1"]);
        assert_eq!(ids("POST malone"), vec!["1", "2"]);
        assert_eq!(ids("swae"), vec!["2"]);
        assert_eq!(ids("  "), vec!["1", "2", "3", "4"]);
        assert!(ids("nothing like this").is_empty());
    }

    #[test]
    fn test_suggestions_capped() {
        let tracks: Vec<Track> = (0..25).map(|i| track(&i.to_string(), "Same", None, 0)).collect();
        assert_eq!(search_tracks(&tracks, "same").len(), MAX_SUGGESTIONS);
    }

    #[test]
    fn test_details_against_playlist() {
        let tracks = fixture();
        let rows = enrich(
            &tracks,
            &[
                artist("Post Malone", &["rap", "pop"]),
                artist("Swae Lee", &["pop", " melodic rap "]),
            ],
        );
        let d = track_details(&tracks, &rows, "2", 2025, utc()).unwrap();
        assert_eq!(d.name, "Sunflower");
        assert_eq!(d.playlist_median_popularity, 70.0);
        assert_eq!(d.popularity_vs_median(), 20.0);
        assert_eq!(d.order_added, Some(1));
        assert_eq!(d.age_years, Some(7));
        assert_eq!(d.added_on, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(d.genres, vec!["rap", "pop", "melodic rap"]);
    }

    #[test]
    fn test_order_added_ties_keep_playlist_order() {
        let tracks = fixture();
        let order = |id: &str| track_details(&tracks, &[], id, 2025, utc()).unwrap().order_added;
        assert_eq!(order("1"), Some(2));
        assert_eq!(order("4"), Some(3));
        // no add time
        assert_eq!(order("3"), None);
    }

    #[test]
    fn test_details_without_year_or_genres() {
        let mut tracks = fixture();
        tracks[2].release_year = None;
        let d = track_details(&tracks, &[], "3", 2025, utc()).unwrap();
        assert_eq!(d.age_years, None);
        assert_eq!(d.added_on, None);
        assert!(d.genres.is_empty());
        assert!(track_details(&tracks, &[], "missing", 2025, utc()).is_none());
    }
}
