//! Tabular export of the track table and the deduplicated artist table.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::Serialize;
use thiserror::Error;

use crate::analysis::FetchedPlaylist;
use crate::pipeline::{Artist, Track, distinct_artists};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ExportError>;

/// Row serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ExportFormat {
    /// Comma-separated with a header row.
    #[default]
    Csv,
    /// One JSON object per line.
    Jsonl,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Jsonl => "jsonl",
        }
    }
}

/// How the list-valued genre field is flattened to a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum GenreFormat {
    /// JSON array, e.g. `["rock","pop"]`.
    #[default]
    Json,
    /// Pipe-joined, e.g. `rock|pop`.
    Pipe,
}

impl GenreFormat {
    pub fn render(self, genres: &[String]) -> Result<String> {
        Ok(match self {
            Self::Json => serde_json::to_string(genres)?,
            Self::Pipe => genres.join("|"),
        })
    }
}

#[derive(Serialize)]
struct TrackRow<'a> {
    id: &'a str,
    name: &'a str,
    artist: &'a str,
    album: &'a str,
    release_year: Option<i32>,
    popularity: u32,
    url: Option<&'a str>,
    image: Option<&'a str>,
    added_at: Option<String>,
    added_by_name: &'a str,
}

impl<'a> From<&'a Track> for TrackRow<'a> {
    fn from(t: &'a Track) -> Self {
        Self {
            id: &t.id,
            name: &t.name,
            artist: &t.artist,
            album: &t.album,
            release_year: t.release_year,
            popularity: t.popularity,
            url: t.url.as_deref(),
            image: t.image.as_deref(),
            added_at: t.added_at.map(|at| at.to_rfc3339()),
            added_by_name: &t.added_by_name,
        }
    }
}

#[derive(Serialize)]
struct ArtistRow<'a> {
    artist_id: &'a str,
    artist_name: &'a str,
    genres: String,
    artist_popularity: Option<u32>,
}

fn write_rows<W: Write, R: Serialize>(out: W, rows: impl IntoIterator<Item = R>, format: ExportFormat) -> Result<usize> {
    let mut n = 0;
    match format {
        ExportFormat::Csv => {
            let mut writer = csv::Writer::from_writer(out);
            for row in rows {
                writer.serialize(row)?;
                n += 1;
            }
            writer.flush()?;
        }
        ExportFormat::Jsonl => {
            let mut out = out;
            for row in rows {
                serde_json::to_writer(&mut out, &row)?;
                out.write_all(b"\n")?;
                n += 1;
            }
            out.flush()?;
        }
    }
    Ok(n)
}

/// Write the track table. Returns the number of rows written.
pub fn write_tracks<W: Write>(out: W, tracks: &[Track], format: ExportFormat) -> Result<usize> {
    write_rows(out, tracks.iter().map(TrackRow::from), format)
}

/// Write artists with the genre list flattened per `genres`.
pub fn write_artists<W: Write>(
    out: W,
    artists: &[Artist],
    format: ExportFormat,
    genres: GenreFormat,
) -> Result<usize> {
    let rows = artists
        .iter()
        .map(|a| {
            genres.render(&a.genres).map(|g| ArtistRow {
                artist_id: &a.artist_id,
                artist_name: &a.artist_name,
                genres: g,
                artist_popularity: a.artist_popularity,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    write_rows(out, rows, format)
}

/// Files written by [`export_to_dir`].
#[derive(Debug)]
pub struct ExportedFiles {
    pub tracks: PathBuf,
    pub track_rows: usize,
    pub artists: PathBuf,
    pub artist_rows: usize,
}

/// Write `<id>_tracks.<ext>` and `<id>_artists.<ext>` into `dir`, creating it
/// if needed. Artists are taken from the enriched relation, one row per id.
pub fn export_to_dir(
    dir: &Path,
    playlist: &FetchedPlaylist,
    format: ExportFormat,
    genres: GenreFormat,
) -> Result<ExportedFiles> {
    std::fs::create_dir_all(dir)?;
    let ext = format.extension();
    let tracks = dir.join(format!("{}_tracks.{ext}", playlist.id));
    let artists = dir.join(format!("{}_artists.{ext}", playlist.id));

    let track_rows = write_tracks(BufWriter::new(File::create(&tracks)?), &playlist.table.tracks, format)?;
    let artist_rows = write_artists(
        BufWriter::new(File::create(&artists)?),
        &distinct_artists(&playlist.enriched),
        format,
        genres,
    )?;
    log::info!(
        "Exported {track_rows} tracks to {} and {artist_rows} artists to {}",
        tracks.display(),
        artists.display()
    );

    Ok(ExportedFiles {
        tracks,
        track_rows,
        artists,
        artist_rows,
    })
}
