//! Wire payloads of the catalog API.
//!
//! Every field the API may omit or send as `null` is optional here; the
//! pipeline validates these once and produces non-optional rows.

use serde::{Deserialize, Deserializer};

/// Treat an explicit JSON `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Paging<T> {
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<T>,
    /// Absolute URL of the next page, None on the last page.
    pub next: Option<String>,
    pub total: Option<u32>,
}

/// Playlist object (only the metadata fields we request).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaylistObject {
    pub id: Option<String>,
    pub name: Option<String>,
    pub owner: Option<UserRef>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: Vec<Image>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub external_urls: ExternalUrls,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserRef {
    pub id: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Image {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalUrls {
    pub spotify: Option<String>,
}

/// A playlist entry: the add metadata plus the nested track (or episode).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaylistItem {
    pub added_at: Option<String>,
    pub added_by: Option<UserRef>,
    pub track: Option<TrackObject>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackObject {
    pub id: Option<String>,
    /// "track" or "episode"
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub artists: Vec<ArtistRef>,
    pub album: Option<AlbumObject>,
    pub popularity: Option<u32>,
    pub is_local: Option<bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub external_urls: ExternalUrls,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtistRef {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlbumObject {
    pub name: Option<String>,
    pub release_date: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: Vec<Image>,
}

/// Response of the batch artist lookup. Unknown ids come back as `null`.
#[derive(Debug, Clone, Deserialize)]
pub struct ArtistsResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub artists: Vec<Option<ArtistObject>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtistObject {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub genres: Vec<String>,
    pub popularity: Option<u32>,
}

/// Client-credentials token response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playlist_item_deserialize() {
        let json = r#"{
            "added_at": "2023-04-01T12:30:00Z",
            "added_by": {"id": "curator", "display_name": null},
            "track": {
                "id": "4uLU6hMCjMI75M1A2tKUQC",
                "type": "track",
                "name": "Never Gonna Give You Up",
                "artists": [{"id": "0gxyHStUsqpMadRV0Di1Qt", "name": "Rick Astley"}],
                "album": {"name": "Whenever You Need Somebody", "release_date": "1987-11-12",
                          "images": [{"url": "https://i.scdn.co/image/abc", "height": 640}]},
                "popularity": 77,
                "is_local": false,
                "external_urls": {"spotify": "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC"}
            }
        }"#;
        let item: PlaylistItem = serde_json::from_str(json).unwrap();
        let track = item.track.unwrap();
        assert_eq!(track.kind.as_deref(), Some("track"));
        assert_eq!(track.artists.len(), 1);
        assert_eq!(track.popularity, Some(77));
        assert_eq!(item.added_by.unwrap().display_name, None);
    }

    #[test]
    fn test_nulls_become_defaults() {
        let json = r#"{"id": "x", "type": "episode", "artists": null, "album": null,
                       "external_urls": null}"#;
        let track: TrackObject = serde_json::from_str(json).unwrap();
        assert!(track.artists.is_empty());
        assert!(track.album.is_none());
        assert!(track.external_urls.spotify.is_none());
    }

    #[test]
    fn test_null_track_entry() {
        let item: PlaylistItem = serde_json::from_str(r#"{"added_at": null, "track": null}"#).unwrap();
        assert!(item.track.is_none());
    }

    #[test]
    fn test_artists_response_with_unknown_ids() {
        let json = r#"{"artists": [
            {"id": "a1", "name": "One", "genres": ["indie pop"], "popularity": 50},
            null
        ]}"#;
        let resp: ArtistsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.artists.len(), 2);
        assert!(resp.artists[1].is_none());
    }

    #[test]
    fn test_paging_null_items() {
        let json = r#"{"items": null, "next": "https://api.test/v1/x?offset=50", "total": 51}"#;
        let page: Paging<PlaylistItem> = serde_json::from_str(json).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, Some(51));
    }

    #[test]
    fn test_paging_last_page() {
        let json = r#"{"items": [], "next": null, "total": 0}"#;
        let page: Paging<PlaylistItem> = serde_json::from_str(json).unwrap();
        assert!(page.next.is_none());
        assert!(page.items.is_empty());
    }
}
