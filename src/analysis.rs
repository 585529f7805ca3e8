//! One playlist analysis: fetch (memoized), normalize, enrich and aggregate.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::Duration;

use chrono::FixedOffset;
use thiserror::Error;

use crate::cache::Memo;
use crate::catalog::transport::{Transport, UreqTransport};
use crate::catalog::{CatalogClient, CatalogError};
use crate::config::AppConfig;
use crate::market::Market;
use crate::pipeline::{
    Artist, EnrichedRow, PlaylistMeta, TrackTable, build_artist_table, collect_artist_ids, enrich,
    normalize_tracks,
};
use crate::playlist_ref::PlaylistId;
use crate::stats::distribution::{
    self, ArtistYearCell, GenreSelection, PopularityBin, FILTERED_TOP_GENRES, FILTER_OPTIONS,
    FOOTPRINT_GENRES,
};
use crate::stats::evolution::{EvolutionSnapshot, compute_evolution};
use crate::stats::{DEFAULT_TOP_ARTISTS, StatsSnapshot, compute_snapshot};

/// Lead artists shown in the artist × year heatmap.
pub const HEATMAP_ARTISTS: usize = 12;
/// Default popularity histogram resolution.
pub const DEFAULT_HISTOGRAM_BINS: usize = 20;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Not a playlist link, URI or id: {0:?}")]
    InvalidInput(String),
    #[error("Playlist {0} was not found or is not public")]
    PlaylistUnavailable(String),
    #[error(transparent)]
    Catalog(CatalogError),
    #[error("Playlist has no usable tracks ({dropped} items were episodes, local files or unavailable)")]
    EmptyResult { dropped: usize },
}

impl From<CatalogError> for AnalysisError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::PlaylistUnavailable(id) => Self::PlaylistUnavailable(id),
            other => Self::Catalog(other),
        }
    }
}

impl AnalysisError {
    /// HTTP status of a catalog failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Catalog(e) => e.status(),
            _ => None,
        }
    }
}

/// Everything fetched and normalized for one (playlist, market).
#[derive(Debug)]
pub struct FetchedPlaylist {
    pub id: PlaylistId,
    pub market: Market,
    pub meta: PlaylistMeta,
    pub table: TrackTable,
    pub artists: Vec<Artist>,
    pub enriched: Vec<EnrichedRow>,
}

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub top_artists: usize,
    /// Genre filter; empty means no filter.
    pub genres: BTreeSet<String>,
    pub histogram_bins: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            top_artists: DEFAULT_TOP_ARTISTS,
            genres: BTreeSet::new(),
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
        }
    }
}

#[derive(Debug)]
pub struct PlaylistAnalysis {
    pub playlist: Rc<FetchedPlaylist>,
    pub snapshot: StatsSnapshot,
    /// None when no track carries an add timestamp.
    pub evolution: Option<EvolutionSnapshot>,
    pub unique_artists: usize,
    /// Most frequent genres, offered as filter choices.
    pub genre_options: Vec<(String, usize)>,
    /// Present when a genre filter was given.
    pub selection: Option<GenreSelection>,
    pub footprint: Vec<(String, usize)>,
    pub popularity_histogram: Vec<PopularityBin>,
    pub popularity_by_decade: BTreeMap<i32, f64>,
    pub artist_years: Vec<ArtistYearCell>,
}

/// Runs analyses against one catalog client, memoizing fetched playlists per
/// (playlist id, market).
pub struct Analyzer<T: Transport = UreqTransport> {
    client: CatalogClient<T>,
    cache: Memo<(PlaylistId, Market), Rc<FetchedPlaylist>>,
    offset: FixedOffset,
}

impl Analyzer<UreqTransport> {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            CatalogClient::new(&config.catalog),
            Duration::from_secs(config.cache_ttl_secs),
            config.utc_offset(),
        )
    }
}

impl<T: Transport> Analyzer<T> {
    pub fn new(client: CatalogClient<T>, ttl: Duration, offset: FixedOffset) -> Self {
        Self {
            client,
            cache: Memo::new("playlist", ttl),
            offset,
        }
    }

    pub fn client(&self) -> &CatalogClient<T> {
        &self.client
    }

    /// Reference offset used for day and month bucketing.
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Resolve a playlist reference and return its normalized tables, from
    /// cache when fresh. Invalid references fail before any network call.
    pub fn fetch(&mut self, reference: &str, market: Market) -> Result<Rc<FetchedPlaylist>, AnalysisError> {
        let id = PlaylistId::parse(reference)
            .ok_or_else(|| AnalysisError::InvalidInput(reference.trim().to_string()))?;
        let client = &mut self.client;
        self.cache
            .get_or_try_insert_with(&(id.clone(), market), || load(client, id, market).map(Rc::new))
    }

    /// Fetch and compute every aggregate.
    pub fn analyze(
        &mut self,
        reference: &str,
        market: Market,
        options: &AnalysisOptions,
    ) -> Result<PlaylistAnalysis, AnalysisError> {
        let playlist = self.fetch(reference, market)?;
        let tracks = &playlist.table.tracks;
        let rows = &playlist.enriched;

        let selection = if options.genres.is_empty() {
            None
        } else {
            Some(distribution::select_genres(tracks, rows, &options.genres, FILTERED_TOP_GENRES))
        };

        Ok(PlaylistAnalysis {
            snapshot: compute_snapshot(tracks, rows, options.top_artists),
            evolution: compute_evolution(tracks, rows, self.offset),
            unique_artists: distribution::unique_artist_count(tracks, rows),
            genre_options: distribution::top_genre_counts(rows, FILTER_OPTIONS),
            selection,
            footprint: distribution::top_genre_counts(rows, FOOTPRINT_GENRES),
            popularity_histogram: distribution::popularity_histogram(tracks, options.histogram_bins),
            popularity_by_decade: distribution::popularity_by_decade(tracks),
            artist_years: distribution::artist_year_heatmap(tracks, HEATMAP_ARTISTS),
            playlist,
        })
    }
}

fn load<T: Transport>(
    client: &mut CatalogClient<T>,
    id: PlaylistId,
    market: Market,
) -> Result<FetchedPlaylist, AnalysisError> {
    log::info!("Fetching playlist {id} ({market})");
    let meta = PlaylistMeta::from(client.playlist(&id, market)?);
    let items = client.playlist_items(&id, market)?;
    let raw = items.len();

    let table = normalize_tracks(items);
    if table.is_empty() {
        return Err(AnalysisError::EmptyResult { dropped: table.dropped });
    }
    debug_assert_eq!(table.tracks.len() + table.dropped, raw);

    let ids = collect_artist_ids(&table.tracks);
    let artists = build_artist_table(client.artists(&ids)?);
    log::info!(
        "{}: {} tracks ({} dropped), {}/{} artists resolved",
        meta.name,
        table.tracks.len(),
        table.dropped,
        artists.len(),
        ids.len()
    );
    let enriched = enrich(&table.tracks, &artists);

    Ok(FetchedPlaylist {
        id,
        market,
        meta,
        table,
        artists,
        enriched,
    })
}
