use serde::{Deserialize, Serialize};
use serde_json::json;

/// What a play command addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayTarget {
    /// One or more individually playable tracks.
    Tracks(Vec<String>),
    /// A collection (album, playlist, artist) played from its start.
    Context(String),
}

impl PlayTarget {
    /// Classifies a URI by shape: `spotify:track:…` is a single playable
    /// unit, everything else a collection context.
    #[must_use]
    pub fn from_uri(uri: &str) -> Self {
        if uri.contains(":track:") {
            PlayTarget::Tracks(vec![uri.to_string()])
        } else {
            PlayTarget::Context(uri.to_string())
        }
    }

    /// The URI this target was built from (the first one for track lists).
    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        match self {
            PlayTarget::Tracks(uris) => uris.first().map(String::as_str),
            PlayTarget::Context(uri) => Some(uri),
        }
    }

    /// Body of the `PUT /me/player/play` request.
    #[must_use]
    pub fn to_body(&self) -> serde_json::Value {
        match self {
            PlayTarget::Tracks(uris) => json!({ "uris": uris }),
            PlayTarget::Context(uri) => json!({ "context_uri": uri }),
        }
    }
}

/// Track metadata shown while playing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub uri: String,
    pub name: String,
    /// First listed artist.
    pub artist: Option<String>,
    pub album_art_url: Option<String>,
}

impl TrackInfo {
    /// Placeholder identity set optimistically after a play command, until the
    /// next state push supplies the real metadata.
    #[must_use]
    pub fn pending(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            name: String::new(),
            artist: None,
            album_art_url: None,
        }
    }
}

/// Authoritative player state pushed by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatePush {
    pub track: Option<TrackInfo>,
    pub paused: bool,
    pub position_ms: u64,
    pub duration_ms: u64,
}

/// A device in the user's device list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceInfo {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_restricted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_shape_selects_target_kind() {
        assert_eq!(
            PlayTarget::from_uri("spotify:track:4uLU6hMCjMI75M1A2tKUQC"),
            PlayTarget::Tracks(vec!["spotify:track:4uLU6hMCjMI75M1A2tKUQC".into()])
        );
        assert_eq!(
            PlayTarget::from_uri("spotify:album:1A2GTWGtFfWp7KSQTwWOyo"),
            PlayTarget::Context("spotify:album:1A2GTWGtFfWp7KSQTwWOyo".into())
        );
    }

    #[test]
    fn play_body_shapes() {
        let tracks = PlayTarget::from_uri("spotify:track:x").to_body();
        assert_eq!(tracks["uris"][0], "spotify:track:x");
        assert!(tracks.get("context_uri").is_none());

        let context = PlayTarget::from_uri("spotify:playlist:y").to_body();
        assert_eq!(context["context_uri"], "spotify:playlist:y");
    }
}
