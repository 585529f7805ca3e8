//! Normalization of raw catalog payloads into flat tables.
//!
//! Raw items are validated once here; everything downstream works on
//! [`Track`], [`Artist`] and [`EnrichedRow`] with no optional nesting.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::models::{ArtistObject, PlaylistItem, PlaylistObject};

/// Display value for missing names.
pub const MISSING: &str = "—";

/// Display value for unknown owners / adders.
pub const UNKNOWN: &str = "unknown";

/// Playlist metadata shown above the analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistMeta {
    pub name: String,
    pub owner: String,
    pub cover: Option<String>,
    pub url: Option<String>,
}

impl From<PlaylistObject> for PlaylistMeta {
    fn from(p: PlaylistObject) -> Self {
        Self {
            name: p.name.filter(|n| !n.is_empty()).unwrap_or_else(|| "(no name)".to_string()),
            owner: p
                .owner
                .and_then(|o| o.display_name.or(o.id))
                .unwrap_or_else(|| UNKNOWN.to_string()),
            cover: p.images.into_iter().find_map(|i| i.url),
            url: p.external_urls.spotify,
        }
    }
}

/// One usable playlist entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    /// Artist names joined with ", " (lead artist first).
    pub artist: String,
    /// First credited artist name, taken from the credit list rather than
    /// the joined string so names containing ", " stay whole.
    pub lead_artist: String,
    /// Artist ids in credit order.
    pub artist_ids: Vec<String>,
    pub album: String,
    pub release_year: Option<i32>,
    pub popularity: u32,
    pub url: Option<String>,
    pub image: Option<String>,
    pub added_at: Option<DateTime<Utc>>,
    pub added_by: String,
    pub added_by_name: String,
}

/// Normalized track table plus the number of raw items that were excluded.
#[derive(Debug, Clone, Default)]
pub struct TrackTable {
    pub tracks: Vec<Track>,
    /// Raw items not in `tracks`: episodes, local files, missing ids and
    /// repeats of an earlier track id. `tracks.len() + dropped` equals the raw
    /// item count.
    pub dropped: usize,
    /// How many of `dropped` were repeats of an earlier track id.
    pub duplicates: usize,
}

impl TrackTable {
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// One performer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artist {
    pub artist_id: String,
    pub artist_name: String,
    pub genres: Vec<String>,
    pub artist_popularity: Option<u32>,
}

/// One (track, artist) pair. A track with N artist ids yields N rows; a track
/// with none yields one row with no artist fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedRow {
    pub track_id: String,
    pub artist: String,
    pub release_year: Option<i32>,
    pub added_at: Option<DateTime<Utc>>,
    pub artist_id: Option<String>,
    pub artist_name: Option<String>,
    pub genres: Vec<String>,
    pub artist_popularity: Option<u32>,
}

/// Normalize raw playlist items into a deduplicated track table.
pub fn normalize_tracks(items: Vec<PlaylistItem>) -> TrackTable {
    let mut table = TrackTable::default();
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());

    for item in items {
        let Some(track) = normalize_item(item) else {
            table.dropped += 1;
            continue;
        };
        if seen.insert(track.id.clone()) {
            table.tracks.push(track);
        } else {
            table.dropped += 1;
            table.duplicates += 1;
        }
    }

    if table.dropped > 0 {
        log::info!(
            "Dropped {} items ({} duplicates, the rest non-track, local or id-less)",
            table.dropped,
            table.duplicates
        );
    }
    table
}

/// Validate a single raw item. None means the item is not a usable track.
fn normalize_item(item: PlaylistItem) -> Option<Track> {
    let tr = item.track?;
    if tr.kind.as_deref() != Some("track") || tr.is_local.unwrap_or(false) {
        return None;
    }
    let id = tr.id.filter(|id| !id.is_empty())?;

    let artist = tr
        .artists
        .iter()
        .map(|a| a.name.as_deref().unwrap_or(""))
        .collect::<Vec<_>>()
        .join(", ");
    let lead_artist = tr
        .artists
        .first()
        .and_then(|a| a.name.clone())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| MISSING.to_string());
    let artist_ids: Vec<String> = tr
        .artists
        .iter()
        .filter_map(|a| a.id.clone())
        .filter(|id| !id.is_empty())
        .collect();

    let album = tr.album.unwrap_or_default();
    let release_year = album.release_date.as_deref().and_then(parse_release_year);
    let image = album.images.into_iter().find_map(|i| i.url);

    let added_at = item.added_at.as_deref().and_then(parse_added_at);
    let added_by_ref = item.added_by.unwrap_or_default();
    let added_by = added_by_ref
        .id
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string());
    let added_by_name = added_by_ref
        .display_name
        .filter(|s| !s.is_empty())
        .or(added_by_ref.id.filter(|s| !s.is_empty()))
        .unwrap_or_else(|| UNKNOWN.to_string());

    Some(Track {
        id,
        name: tr.name.unwrap_or_else(|| MISSING.to_string()),
        artist: if artist.is_empty() { MISSING.to_string() } else { artist },
        lead_artist,
        artist_ids,
        album: album.name.unwrap_or_else(|| MISSING.to_string()),
        release_year,
        popularity: tr.popularity.unwrap_or(0).min(100),
        url: tr.external_urls.spotify,
        image,
        added_at,
        added_by,
        added_by_name,
    })
}

/// Release year from the first four characters of a release date, only if
/// they are all decimal digits. "1999-07-10" → 1999, "  " → None.
pub fn parse_release_year(release_date: &str) -> Option<i32> {
    let prefix: String = release_date.chars().take(4).collect();
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    prefix.parse().ok()
}

/// Parse an ISO-8601 add timestamp, normalizing any source offset to UTC.
/// Unparseable values become None rather than failing the row.
fn parse_added_at(raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            log::debug!("Ignoring unparseable added_at {raw:?}: {e}");
            None
        }
    }
}

/// Union of all artist ids referenced by the tracks, in first-seen order.
pub fn collect_artist_ids(tracks: &[Track]) -> Vec<String> {
    let mut seen = HashSet::new();
    tracks
        .iter()
        .flat_map(|t| t.artist_ids.iter())
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Build the artist table from batch lookup results, one row per id.
pub fn build_artist_table(objects: Vec<ArtistObject>) -> Vec<Artist> {
    let mut seen = HashSet::new();
    objects
        .into_iter()
        .filter_map(|a| {
            let id = a.id.filter(|id| !id.is_empty())?;
            if !seen.insert(id.clone()) {
                return None;
            }
            Some(Artist {
                artist_name: a.name.unwrap_or_else(|| MISSING.to_string()),
                artist_id: id,
                genres: a.genres,
                artist_popularity: Some(a.popularity.unwrap_or(0)),
            })
        })
        .collect()
}

/// Explode tracks into one row per (track, artist id) and left-join artist
/// attributes.
///
/// When the artist table is empty (nothing resolved) the join degrades:
/// `artist_name` falls back to the lead name of the display string, genres are
/// empty and popularity is unknown.
pub fn enrich(tracks: &[Track], artists: &[Artist]) -> Vec<EnrichedRow> {
    let by_id: HashMap<&str, &Artist> = artists.iter().map(|a| (a.artist_id.as_str(), a)).collect();
    let degraded = artists.is_empty();
    if degraded && !tracks.is_empty() {
        log::warn!("No artist details resolved; genre statistics will be empty");
    }

    let mut rows = Vec::with_capacity(tracks.len());
    for track in tracks {
        let base = |artist_id: Option<String>| EnrichedRow {
            track_id: track.id.clone(),
            artist: track.artist.clone(),
            release_year: track.release_year,
            added_at: track.added_at,
            artist_id,
            artist_name: None,
            genres: Vec::new(),
            artist_popularity: None,
        };

        if track.artist_ids.is_empty() {
            let mut row = base(None);
            if degraded {
                row.artist_name = Some(lead_name(&track.artist).to_string());
            }
            rows.push(row);
            continue;
        }

        for artist_id in &track.artist_ids {
            let mut row = base(Some(artist_id.clone()));
            if degraded {
                row.artist_name = Some(lead_name(&track.artist).to_string());
            } else if let Some(artist) = by_id.get(artist_id.as_str()) {
                row.artist_name = Some(artist.artist_name.clone());
                row.genres = artist.genres.clone();
                row.artist_popularity = artist.artist_popularity;
            }
            rows.push(row);
        }
    }
    rows
}

/// First credited name of a ", "-joined artist string.
pub fn lead_name(artist: &str) -> &str {
    artist.split(", ").next().unwrap_or(artist)
}

/// Artists appearing in the enriched relation, deduplicated by id in first-seen order.
pub fn distinct_artists(rows: &[EnrichedRow]) -> Vec<Artist> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|r| {
            let id = r.artist_id.as_ref()?;
            if !seen.insert(id.as_str()) {
                return None;
            }
            Some(Artist {
                artist_id: id.clone(),
                artist_name: r.artist_name.clone().unwrap_or_else(|| MISSING.to_string()),
                genres: r.genres.clone(),
                artist_popularity: r.artist_popularity,
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use chrono::TimeZone;

    /// Minimal track for statistics tests.
    pub fn track(id: &str, artist: &str, year: Option<i32>, popularity: u32) -> Track {
        Track {
            id: id.to_string(),
            name: format!("Song {id}"),
            artist: artist.to_string(),
            lead_artist: lead_name(artist).to_string(),
            artist_ids: artist.split(", ").map(|a| format!("id-{a}")).collect(),
            album: "Album".to_string(),
            release_year: year,
            popularity,
            url: None,
            image: None,
            added_at: None,
            added_by: UNKNOWN.to_string(),
            added_by_name: UNKNOWN.to_string(),
        }
    }

    pub fn added(mut t: Track, y: i32, m: u32, d: u32, h: u32) -> Track {
        t.added_at = Some(Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap());
        t
    }

    pub fn artist(name: &str, genres: &[&str]) -> Artist {
        Artist {
            artist_id: format!("id-{name}"),
            artist_name: name.to_string(),
            genres: genres.iter().map(|g| g.to_string()).collect(),
            artist_popularity: Some(50),
        }
    }
}
