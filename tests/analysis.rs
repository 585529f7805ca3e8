use std::cell::RefCell;
use std::time::Duration;

use playlist_dna::analysis::{AnalysisError, AnalysisOptions, Analyzer};
use playlist_dna::catalog::transport::{HttpReply, Transport};
use playlist_dna::catalog::{CatalogClient, CatalogError, CatalogSettings};
use playlist_dna::config::utc;
use playlist_dna::export::{ExportFormat, GenreFormat, write_artists, write_tracks};
use playlist_dna::market::Market;
use playlist_dna::narrative::llm::{GenerationError, Prompt, TextGenerator};
use playlist_dna::narrative::{LOCAL_FALLBACK, Summarizer, SummaryInput};
use playlist_dna::pipeline::distinct_artists;
use playlist_dna::stats::search::{search_tracks, track_details};

const PID: &str = "5ABHKGoOzxkaa28ttQV9sE";

/// Serves a fixed two-page playlist; the first track request is answered
/// with 401 to exercise re-authentication.
struct ScriptedCatalog {
    tokens: RefCell<usize>,
    requests: RefCell<Vec<String>>,
    rejected_once: RefCell<bool>,
}

impl ScriptedCatalog {
    fn new() -> Self {
        Self {
            tokens: RefCell::new(0),
            requests: RefCell::new(Vec::new()),
            rejected_once: RefCell::new(false),
        }
    }
}

fn reply(status: u16, body: &str) -> HttpReply {
    HttpReply {
        status,
        body: body.to_string(),
        retry_after: None,
    }
}

fn item(id: &str, artists: &[(&str, &str)], release: &str, popularity: u32, added_at: &str) -> String {
    let artists: Vec<String> = artists
        .iter()
        .map(|(id, name)| format!(r#"{{"id": "{id}", "name": "{name}"}}"#))
        .collect();
    format!(
        r#"{{"added_at": "{added_at}", "added_by": {{"id": "me", "display_name": "Me"}},
            "track": {{"id": "{id}", "type": "track", "name": "Track {id}", "artists": [{}],
            "album": {{"name": "Album {id}", "release_date": "{release}", "images": [{{"url": "https://img/{id}"}}]}},
            "popularity": {popularity}, "is_local": false, "external_urls": {{"spotify": "https://open.example/track/{id}"}}}}}}"#,
        artists.join(",")
    )
}

impl Transport for ScriptedCatalog {
    fn get(&self, url: &str, bearer: &str) -> Result<HttpReply, CatalogError> {
        self.requests.borrow_mut().push(url.to_string());

        if url.contains("/tracks") && !*self.rejected_once.borrow() {
            *self.rejected_once.borrow_mut() = true;
            assert_eq!(bearer, "tok-1");
            return Ok(reply(401, r#"{"error": "token expired"}"#));
        }

        if url.contains("fields=") {
            return Ok(reply(
                200,
                r#"{"id": "5ABHKGoOzxkaa28ttQV9sE", "name": "Late Night Fuzz", "owner": {"id": "me", "display_name": "Me"}, "images": [], "external_urls": {}}"#,
            ));
        }
        if url.contains("offset=0") {
            let items = [
                item("t1", &[("a1", "Slowdive")], "1993-06-01", 30, "2023-01-03T22:00:00Z"),
                item("t2", &[("a1", "Slowdive"), ("a2", "Ride")], "1994", 35, "2023-01-03T23:00:00Z"),
                item("t3", &[("a3", "Beach House")], "2015-08-28", 70, "2023-02-14T08:00:00Z"),
            ];
            return Ok(reply(
                200,
                &format!(
                    r#"{{"items": [{}], "next": "https://api.test/v1/playlists/{PID}/tracks?offset=3", "total": 5}}"#,
                    items.join(",")
                ),
            ));
        }
        if url.contains("offset=3") {
            let items = [
                item("t4", &[("a3", "Beach House")], "2012", 65, "2023-07-20T12:00:00Z"),
                r#"{"added_at": "2023-07-21T12:00:00Z", "track": {"id": "ep1", "type": "episode"}}"#.to_string(),
            ];
            return Ok(reply(200, &format!(r#"{{"items": [{}], "next": null, "total": 5}}"#, items.join(","))));
        }
        if url.contains("/artists") {
            return Ok(reply(
                200,
                r#"{"artists": [
                    {"id": "a1", "name": "Slowdive", "genres": ["shoegaze", "dream pop"], "popularity": 62},
                    {"id": "a2", "name": "Ride", "genres": ["shoegaze"], "popularity": 48},
                    {"id": "a3", "name": "Beach House", "genres": ["dream pop", "indie"], "popularity": 71}]}"#,
            ));
        }
        Ok(reply(404, "not found"))
    }

    fn post_form(&self, _url: &str, form: &[(&str, &str)]) -> Result<HttpReply, CatalogError> {
        assert!(form.contains(&("grant_type", "client_credentials")));
        let mut n = self.tokens.borrow_mut();
        *n += 1;
        Ok(reply(200, &format!(r#"{{"access_token": "tok-{n}", "expires_in": 3600}}"#)))
    }
}

fn settings() -> CatalogSettings {
    CatalogSettings {
        api_base: "https://api.test/v1".to_string(),
        token_url: "https://auth.test/token".to_string(),
        client_id: Some("id".to_string()),
        client_secret: Some("secret".to_string()),
        max_retries: 2,
        retry_backoff: Duration::ZERO,
        batch_delay: Duration::ZERO,
        page_size: 3,
    }
}

fn analyzer() -> Analyzer<ScriptedCatalog> {
    Analyzer::new(
        CatalogClient::with_transport(ScriptedCatalog::new(), settings()),
        Duration::from_secs(600),
        utc(),
    )
}

struct Unreachable;

impl TextGenerator for Unreachable {
    fn list_models(&self) -> Result<Vec<String>, GenerationError> {
        Err(GenerationError::ModelSelection("connection refused".to_string()))
    }

    fn complete(&self, _model: &str, _prompt: &Prompt) -> Result<String, GenerationError> {
        Err(GenerationError::Request("connection refused".to_string()))
    }
}

#[test]
fn analyze_summarize_export() {
    let mut analyzer = analyzer();
    let url = format!("https://open.spotify.com/playlist/{PID}");
    let analysis = analyzer
        .analyze(&url, Market::Gb, &AnalysisOptions::default())
        .expect("analysis succeeds");

    let transport = analyzer.client().transport();
    // token refreshed exactly once after the 401
    assert_eq!(*transport.tokens.borrow(), 2);
    assert!(transport.requests.borrow().iter().any(|u| u.contains("/tracks") && u.contains("market=GB")));

    let playlist = &analysis.playlist;
    assert_eq!(playlist.meta.name, "Late Night Fuzz");
    assert_eq!(playlist.table.tracks.len(), 4);
    assert_eq!(playlist.table.dropped, 1);
    assert_eq!(playlist.enriched.len(), 5);

    let snap = &analysis.snapshot;
    // shoegaze: t1, t2(a1), t2(a2) = 3; dream pop: t1, t2(a1), t3, t4 = 4; indie: 2
    assert_eq!(snap.top_genres[0], ("dream pop".to_string(), 44));
    assert_eq!(snap.top_genres[1], ("shoegaze".to_string(), 33));
    assert_eq!(snap.top_genres[2], ("indie".to_string(), 22));
    assert_eq!(snap.top_artists[0], ("Slowdive".to_string(), 2));
    assert_eq!(snap.top_artists[1], ("Beach House".to_string(), 2));
    assert_eq!(snap.median_popularity, 50.0);

    let evo = analysis.evolution.as_ref().expect("timestamps present");
    assert_eq!(evo.total_tracks, 4);
    assert_eq!(evo.bursts[0], (evo.first_date, 2));
    assert!(evo.rising_genres.iter().all(|(_, d)| *d > 0.0));
    assert!(evo.falling_genres.iter().all(|(_, d)| *d < 0.0));

    // generator down: deterministic text with the fallback tag
    let summarizer = Summarizer::new(Some(Unreachable), None);
    let narrative = summarizer.summarize(&SummaryInput {
        stats: snap,
        evolution: analysis.evolution.as_ref(),
        title: Some(playlist.meta.name.as_str()),
        hint: None,
    });
    assert_eq!(narrative.provenance.tag(), LOCAL_FALLBACK);
    assert!(narrative.text.starts_with("This playlist feels balanced."));
    assert!(narrative.text.contains("Late Night Fuzz"));

    let mut tracks_out = Vec::new();
    assert_eq!(write_tracks(&mut tracks_out, &playlist.table.tracks, ExportFormat::Csv).unwrap(), 4);
    let mut artists_out = Vec::new();
    let artists = distinct_artists(&playlist.enriched);
    assert_eq!(write_artists(&mut artists_out, &artists, ExportFormat::Csv, GenreFormat::Pipe).unwrap(), 3);
    let artists_csv = String::from_utf8(artists_out).unwrap();
    assert!(artists_csv.contains("a1,Slowdive,shoegaze|dream pop,62"));

    let hits = search_tracks(&playlist.table.tracks, "beach");
    let ids: Vec<&str> = hits.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["t3", "t4"]);
    let card = track_details(&playlist.table.tracks, &playlist.enriched, "t4", 2025, utc()).unwrap();
    assert_eq!(card.order_added, Some(4));
    assert_eq!(card.age_years, Some(13));
    assert_eq!(card.genres, vec!["dream pop", "indie"]);
    assert_eq!(card.popularity_vs_median(), 15.0);

    // second run is served from the cache
    let before = analyzer.client().transport().requests.borrow().len();
    analyzer.analyze(PID, Market::Gb, &AnalysisOptions::default()).unwrap();
    assert_eq!(analyzer.client().transport().requests.borrow().len(), before);
}

#[test]
fn invalid_reference_is_rejected_before_network() {
    let mut analyzer = analyzer();
    for bad in ["", "https://example.com/album/5ABHKGoOzxkaa28ttQV9sE", "tooshort"] {
        let err = analyzer.fetch(bad, Market::Us).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInput(_)), "{bad}: {err}");
    }
    assert!(analyzer.client().transport().requests.borrow().is_empty());
}
