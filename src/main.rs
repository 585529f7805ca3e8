use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use playlist_dna::analysis::{AnalysisOptions, Analyzer, PlaylistAnalysis};
use playlist_dna::config::AppConfig;
use playlist_dna::export::{ExportFormat, GenreFormat};
use playlist_dna::market::Market;
use playlist_dna::narrative::{Summarizer, SummaryInput};
use playlist_dna::stats::distribution::ArtistYearCell;
use playlist_dna::stats::evolution::{EvolutionSnapshot, GenreMonth};
use playlist_dna::stats::search::{TrackDetails, search_tracks, track_details};

#[derive(Parser)]
#[command(name = "playlist-dna", version, about = "Playlist analytics: genres, artists, eras, popularity and curation history")]
struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one or more playlists (URL, URI or 22-character id)
    Analyze {
        /// Playlist references
        #[arg(required = true)]
        playlists: Vec<String>,

        /// Catalog market (defaults to config default_market)
        #[arg(short, long, value_enum)]
        market: Option<Market>,

        /// Only count tracks by artists tagged with one of these genres
        #[arg(short, long = "genre")]
        genres: Vec<String>,

        /// Number of lead artists to list
        #[arg(short = 'n', long, default_value = "10")]
        top: usize,

        /// Popularity histogram bins (8-40)
        #[arg(long, default_value = "20", value_parser = clap::value_parser!(u16).range(8..=40))]
        bins: u16,
    },

    /// Write a narrative "vibe" summary of a playlist
    Summary {
        playlist: String,

        #[arg(short, long, value_enum)]
        market: Option<Market>,

        /// Style hint passed to the text generator
        #[arg(long)]
        hint: Option<String>,

        /// Skip the text generator and use the built-in template
        #[arg(long)]
        local: bool,
    },

    /// Look up a track by name or artist and compare it with the playlist
    Search {
        playlist: String,

        /// Case-insensitive text matched against track and artist names
        query: String,

        #[arg(short, long, value_enum)]
        market: Option<Market>,

        /// Which suggestion to show details for (1-based)
        #[arg(short, long, default_value = "1")]
        pick: usize,
    },

    /// Export the track table and the deduplicated artist table
    Export {
        playlist: String,

        /// Output directory
        #[arg(short, long)]
        out: PathBuf,

        #[arg(short, long, value_enum)]
        market: Option<Market>,

        #[arg(long, value_enum, default_value = "csv")]
        format: ExportFormat,

        /// How the genre list is written
        #[arg(long, value_enum, default_value = "json")]
        genre_format: GenreFormat,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = AppConfig::load();
    let mut analyzer = Analyzer::from_config(&config);

    match cli.command {
        Commands::Analyze { playlists, market, genres, top, bins } => {
            let market = market.unwrap_or(config.default_market);
            let options = AnalysisOptions {
                top_artists: top,
                genres: genres.into_iter().collect::<BTreeSet<_>>(),
                histogram_bins: usize::from(bins),
            };

            let mut failed = 0;
            for (i, reference) in playlists.iter().enumerate() {
                if i > 0 {
                    println!();
                }
                let pb = spinner(&format!("Fetching {reference}"));
                let result = analyzer.analyze(reference, market, &options);
                pb.finish_and_clear();
                match result {
                    Ok(analysis) => print_analysis(&analysis),
                    Err(e) => {
                        eprintln!("{reference}: {e}");
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{failed} of {} playlists could not be analyzed", playlists.len());
            }
        }

        Commands::Summary { playlist, market, hint, local } => {
            let market = market.unwrap_or(config.default_market);
            let pb = spinner(&format!("Fetching {playlist}"));
            let analysis = analyzer.analyze(&playlist, market, &AnalysisOptions::default());
            pb.finish_and_clear();
            let analysis = analysis.with_context(|| format!("Could not analyze {playlist}"))?;

            let summarizer = if local {
                Summarizer::local_only()
            } else {
                Summarizer::from_config(&config.summary)
            };
            let input = SummaryInput {
                stats: &analysis.snapshot,
                evolution: analysis.evolution.as_ref(),
                title: Some(analysis.playlist.meta.name.as_str()),
                hint: hint.as_deref(),
            };
            let pb = spinner("Writing summary");
            let narrative = summarizer.summarize(&input);
            pb.finish_and_clear();

            println!("{}", narrative.text);
            println!();
            println!("(source: {})", narrative.provenance);
        }

        Commands::Search { playlist, query, market, pick } => {
            let market = market.unwrap_or(config.default_market);
            let pb = spinner(&format!("Fetching {playlist}"));
            let fetched = analyzer.fetch(&playlist, market);
            pb.finish_and_clear();
            let fetched = fetched.with_context(|| format!("Could not fetch {playlist}"))?;

            let matches = search_tracks(&fetched.table.tracks, &query);
            if matches.is_empty() {
                anyhow::bail!("No tracks match '{query}'");
            }
            for (i, t) in matches.iter().enumerate() {
                let marker = if i + 1 == pick { '>' } else { ' ' };
                println!("{marker} {:>2}. {} - {}", i + 1, truncate(&t.name, 40), truncate(&t.artist, 30));
            }

            let chosen = pick
                .checked_sub(1)
                .and_then(|i| matches.get(i))
                .with_context(|| format!("--pick must be between 1 and {}", matches.len()))?;
            let details = track_details(
                &fetched.table.tracks,
                &fetched.enriched,
                &chosen.id,
                Utc::now().with_timezone(&analyzer.offset()).year(),
                analyzer.offset(),
            )
            .context("Selected track vanished from the table")?;
            print_track_details(&details);
        }

        Commands::Export { playlist, out, market, format, genre_format } => {
            let market = market.unwrap_or(config.default_market);
            let pb = spinner(&format!("Fetching {playlist}"));
            let fetched = analyzer.fetch(&playlist, market);
            pb.finish_and_clear();
            let fetched = fetched.with_context(|| format!("Could not fetch {playlist}"))?;

            let files = playlist_dna::export::export_to_dir(&out, &fetched, format, genre_format)
                .context("Export failed")?;
            println!("Tracks:  {} rows -> {}", files.track_rows, files.tracks.display());
            println!("Artists: {} rows -> {}", files.artist_rows, files.artists.display());
        }
    }

    Ok(())
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("  {spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Horizontal bar scaled so `max` spans `width` characters.
fn bar(value: f64, max: f64, width: usize) -> String {
    if max <= 0.0 {
        return String::new();
    }
    "#".repeat(((value / max) * width as f64).round() as usize)
}

fn truncate(s: &str, n: usize) -> String {
    if s.chars().count() > n {
        let head: String = s.chars().take(n.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

fn print_analysis(a: &PlaylistAnalysis) {
    let p = &a.playlist;
    println!("{} (by {})", p.meta.name, p.meta.owner);
    if let Some(url) = &p.meta.url {
        println!("{url}");
    }
    println!(
        "{} tracks, {} artists, median popularity {:.0}",
        p.table.tracks.len(),
        a.unique_artists,
        a.snapshot.median_popularity
    );
    if p.table.dropped > 0 {
        println!(
            "({} items skipped, {} of them duplicates)",
            p.table.dropped, p.table.duplicates
        );
    }

    println!();
    println!("Top genres");
    println!("{}", "-".repeat(60));
    if a.snapshot.top_genres.is_empty() {
        println!("  (no genre data)");
    }
    let max = a.snapshot.top_genres.first().map_or(0.0, |(_, p)| f64::from(*p));
    for (genre, pct) in a.snapshot.top_genres.iter().take(10) {
        println!("  {:<28} {:>3}%  {}", truncate(genre, 28), pct, bar(f64::from(*pct), max, 24));
    }

    if let Some(sel) = &a.selection {
        println!();
        println!(
            "Genre filter: {} of {} tracks match",
            sel.matching_tracks, sel.total_tracks
        );
        for (genre, count) in &sel.top_genres {
            println!("  {:<28} {:>4}", truncate(genre, 28), count);
        }
    }

    if !a.footprint.is_empty() {
        println!();
        println!("Genre footprint (artist-track rows)");
        println!("{}", "-".repeat(60));
        let max = a.footprint.first().map_or(0.0, |(_, n)| *n as f64);
        for (genre, count) in &a.footprint {
            println!("  {:<28} {:>4}  {}", truncate(genre, 28), count, bar(*count as f64, max, 24));
        }
    }

    if a.selection.is_none() && !a.genre_options.is_empty() {
        let names: Vec<&str> = a.genre_options.iter().map(|(g, _)| g.as_str()).collect();
        println!();
        println!("Filter with -g/--genre, e.g.: {}", truncate(&names.join(", "), 120));
    }

    println!();
    println!("Top lead artists");
    println!("{}", "-".repeat(60));
    for (artist, count) in &a.snapshot.top_artists {
        println!("  {:<40} {:>4}", truncate(artist, 40), count);
    }

    println!();
    println!("Release decades            avg popularity");
    println!("{}", "-".repeat(60));
    let max = a.snapshot.decades.values().copied().max().unwrap_or(0) as f64;
    for (decade, count) in &a.snapshot.decades {
        let avg = a.popularity_by_decade.get(decade).copied().unwrap_or(0.0);
        println!("  {decade}s {:>5}  {:>5.1}  {}", count, avg, bar(*count as f64, max, 30));
    }

    println!();
    println!("Popularity distribution");
    println!("{}", "-".repeat(60));
    let max = a.popularity_histogram.iter().map(|b| b.count).max().unwrap_or(0) as f64;
    for b in &a.popularity_histogram {
        println!("  {:>5.1}-{:<5.1} {:>4}  {}", b.low, b.high, b.count, bar(b.count as f64, max, 30));
    }

    if !a.artist_years.is_empty() {
        print_artist_years(&a.artist_years);
    }

    match &a.evolution {
        Some(evo) => print_evolution(evo),
        None => {
            println!();
            println!("No add timestamps available; curation history skipped.");
        }
    }
}

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

fn print_evolution(evo: &EvolutionSnapshot) {
    println!();
    println!("Curation history");
    println!("{}", "-".repeat(60));
    println!(
        "  {} -> {} ({} days), {} tracks, {:.2} adds/active day",
        evo.first_date, evo.last_date, evo.days_span, evo.total_tracks, evo.adds_per_day
    );
    let bursts: Vec<String> = evo.bursts.iter().map(|(d, n)| format!("{d} (+{n})")).collect();
    println!("  Busiest days: {}", bursts.join(", "));
    if let Some(age) = evo.median_age_years {
        println!("  Median track age when added: {age:.1} years");
    }
    if !evo.rising_genres.is_empty() {
        let rising: Vec<String> = evo
            .rising_genres
            .iter()
            .map(|(g, d)| format!("{g} (+{:.0}%)", d * 100.0))
            .collect();
        println!("  Rising: {}", rising.join(", "));
    }
    if !evo.falling_genres.is_empty() {
        let falling: Vec<String> = evo
            .falling_genres
            .iter()
            .map(|(g, d)| format!("{g} ({:.0}%)", d * 100.0))
            .collect();
        println!("  Cooling: {}", falling.join(", "));
    }

    if !evo.growth.is_empty() {
        println!();
        println!("  Cumulative tracks");
        let total = evo.growth.last().map_or(0, |d| d.cumulative);
        for day in sample(&evo.growth, 12) {
            println!(
                "  {}  {:>5}  {}",
                day.date,
                day.cumulative,
                bar(day.cumulative as f64, total as f64, 30)
            );
        }
    }

    if !evo.genre_by_month.is_empty() {
        println!();
        println!("  Genres by month added");
        print_genre_months(&evo.genre_by_month);
    }

    // weekday x hour, one row per weekday
    println!();
    println!("  Adds by weekday and hour (00-23)");
    let max = evo.activity.iter().flatten().copied().max().unwrap_or(0);
    for (day, hours) in WEEKDAYS.iter().zip(evo.activity.iter()) {
        let cells: String = hours.iter().map(|&n| heat_cell(n, max)).collect();
        println!("  {day} {cells}");
    }
}

fn heat_cell(n: usize, max: usize) -> char {
    const SHADES: [char; 5] = ['.', ':', '+', '*', '#'];
    if n == 0 || max == 0 {
        return ' ';
    }
    SHADES[((n * (SHADES.len() - 1)) / max).min(SHADES.len() - 1)]
}

/// At most `n` evenly spaced items, always including the last one.
fn sample<T>(items: &[T], n: usize) -> Vec<&T> {
    if items.len() <= n || n < 2 {
        return items.iter().collect();
    }
    let step = (items.len() - 1) as f64 / (n - 1) as f64;
    (0..n)
        .map(|i| &items[((i as f64 * step).round() as usize).min(items.len() - 1)])
        .collect()
}

fn print_genre_months(cells: &[GenreMonth]) {
    let mut months: BTreeMap<_, Vec<&GenreMonth>> = BTreeMap::new();
    for cell in cells {
        months.entry(cell.month).or_default().push(cell);
    }
    for (month, mut genres) in months {
        genres.sort_by(|a, b| b.count.cmp(&a.count));
        let line: Vec<String> = genres.iter().take(5).map(|c| format!("{} {}", c.genre, c.count)).collect();
        println!("  {}  {}", month.format("%Y-%m"), line.join(", "));
    }
}

fn print_artist_years(cells: &[ArtistYearCell]) {
    let (Some(min), Some(max)) = (
        cells.iter().map(|c| c.year).min(),
        cells.iter().map(|c| c.year).max(),
    ) else {
        return;
    };
    println!();
    println!("Lead artists by release year ({min}-{max})");
    println!("{}", "-".repeat(60));

    // one column per year, wide ranges are folded into decades
    let by_decade = max - min >= 40;
    let column = |year: i32| if by_decade { year.div_euclid(10) * 10 } else { year };
    let columns: BTreeSet<i32> = cells.iter().map(|c| column(c.year)).collect();

    let mut rows: Vec<(&str, BTreeMap<i32, usize>)> = Vec::new();
    for cell in cells {
        if rows.last().is_none_or(|(artist, _)| *artist != cell.artist) {
            rows.push((cell.artist.as_str(), BTreeMap::new()));
        }
        if let Some((_, counts)) = rows.last_mut() {
            *counts.entry(column(cell.year)).or_insert(0) += cell.count;
        }
    }
    let peak = rows.iter().flat_map(|(_, c)| c.values()).copied().max().unwrap_or(0);
    for (artist, counts) in &rows {
        let line: String = columns
            .iter()
            .map(|col| heat_cell(counts.get(col).copied().unwrap_or(0), peak))
            .collect();
        println!("  {:<24} {line}", truncate(artist, 24));
    }
    if by_decade {
        println!("  (one column per decade)");
    }
}

fn print_track_details(d: &TrackDetails) {
    println!();
    println!("{} - {}", d.name, d.artist);
    println!("{}", "-".repeat(60));
    let dash = || "-".to_string();
    println!("  {:<22} {}", "Album", d.album);
    println!(
        "  {:<22} {}/100 ({:+.0} vs playlist median {:.0})",
        "Popularity",
        d.popularity,
        d.popularity_vs_median(),
        d.playlist_median_popularity
    );
    println!("  {:<22} {}", "Order added", d.order_added.map_or_else(dash, |n| format!("#{n}")));
    println!("  {:<22} {}", "Release year", d.release_year.map_or_else(dash, |y| y.to_string()));
    println!("  {:<22} {}", "Song age", d.age_years.map_or_else(dash, |y| format!("{y} yrs")));
    println!("  {:<22} {}", "Date added", d.added_on.map_or_else(dash, |day| day.to_string()));
    let genres = if d.genres.is_empty() { dash() } else { d.genres.join(", ") };
    println!("  {:<22} {}", "Genres", genres);
    if let Some(url) = &d.url {
        println!("  {:<22} {}", "Link", url);
    }
}
