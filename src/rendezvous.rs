//! The rendezvous intent and its navigation/sharing encodings.
//!
//! A [`RendezvousEvent`] is created once from the planning form and travels to the map
//! view inside the URL as percent-encoded JSON. Decoding failures send the viewer back
//! to the home screen rather than erroring.

use log::warn;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::{geocode_or_none, MapProvider};
use crate::Location;

/// Characters left alone by JavaScript's `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Path prefix of the map view.
pub const MAP_ROUTE: &str = "rendezvous";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[serde(rename_all = "lowercase")]
pub enum Transportation {
    #[default]
    Driving,
    Walking,
    Transit,
    Cycling,
}

/// The planned meetup as submitted by the organiser. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct RendezvousEvent {
    pub name: String,
    /// Local date-time as entered in the form (e.g. `2025-06-01T19:30`).
    pub datetime: String,
    /// Free-form address or `Current Location (lat, lng)`.
    pub location: String,
    #[serde(default)]
    pub transportation: Transportation,
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not valid UTF-8 after decoding")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("payload is not a rendezvous: {0}")]
    Json(#[from] serde_json::Error),
}

impl RendezvousEvent {
    pub fn new(name: &str, datetime: &str, location: &str, transportation: Transportation) -> Self {
        Self {
            name: name.to_string(),
            datetime: datetime.to_string(),
            location: location.to_string(),
            transportation,
        }
    }

    /// JSON, percent-encoded for use as a single URL path segment.
    ///
    /// ```
    /// use rendezvous_engine::{RendezvousEvent, Transportation};
    ///
    /// let event = RendezvousEvent::new("Pizza Night", "2025-06-01T19:30", "123 Main St", Transportation::Walking);
    /// let segment = event.to_url_segment();
    /// assert!(!segment.contains('/'));
    /// assert_eq!(RendezvousEvent::from_url_segment(&segment).unwrap(), event);
    /// ```
    pub fn to_url_segment(&self) -> String {
        // Serializing plain strings and a unit enum cannot fail
        let json = serde_json::to_string(self).unwrap_or_default();
        utf8_percent_encode(&json, URI_COMPONENT).to_string()
    }

    pub fn from_url_segment(segment: &str) -> Result<Self, PayloadError> {
        let json = percent_decode_str(segment).decode_utf8()?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Full link to the map view for this rendezvous.
    pub fn share_link(&self, base_url: &str) -> String {
        format!("{}/{}/{}", base_url.trim_end_matches('/'), MAP_ROUTE, self.to_url_segment())
    }

    pub fn location_input(&self) -> LocationInput {
        LocationInput::parse(&self.location)
    }
}

/// Screen to show for an incoming navigation.
#[derive(Debug, Clone, PartialEq)]
pub enum View {
    Home,
    Map(RendezvousEvent),
}

/// Decode the map-view path segment; anything malformed goes home.
pub fn resolve_view(segment: Option<&str>) -> View {
    let Some(segment) = segment else {
        return View::Home;
    };

    match RendezvousEvent::from_url_segment(segment) {
        Ok(event) => View::Map(event),
        Err(e) => {
            warn!("[Rendezvous] Malformed payload, redirecting home: {}", e);
            View::Home
        }
    }
}

/// Where the rendezvous location came from.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationInput {
    /// Captured from the device, already resolved.
    Coordinates(Location),
    /// Typed address that still needs geocoding.
    Address(String),
}

impl LocationInput {
    /// Recognise `Current Location (lat, lng)`; everything else is an address.
    ///
    /// ```
    /// use rendezvous_engine::{Location, rendezvous::LocationInput};
    ///
    /// assert_eq!(
    ///     LocationInput::parse("Current Location (37.7749, -122.4194)"),
    ///     LocationInput::Coordinates(Location::new(37.7749, -122.4194)),
    /// );
    /// assert_eq!(
    ///     LocationInput::parse("123 Main St"),
    ///     LocationInput::Address("123 Main St".into()),
    /// );
    /// ```
    pub fn parse(text: &str) -> Self {
        if text.contains("Current Location") {
            if let Some(location) = parse_parenthesised_coords(text) {
                return Self::Coordinates(location);
            }
        }
        Self::Address(text.trim().to_string())
    }

    /// Coordinates for this input; failed geocoding degrades to `None`.
    pub async fn resolve(&self, provider: &dyn MapProvider) -> Option<Location> {
        match self {
            Self::Coordinates(location) => Some(*location),
            Self::Address(address) => geocode_or_none(provider, address).await,
        }
    }
}

fn parse_parenthesised_coords(text: &str) -> Option<Location> {
    let open = text.find('(')?;
    let close = open + text[open..].find(')')?;
    let mut parts = text[open + 1..close].split(',').map(|p| p.trim().parse::<f64>());

    let latitude = parts.next()?.ok()?;
    let longitude = parts.next()?.ok()?;
    if parts.next().is_some() {
        return None;
    }

    let location = Location::new(latitude, longitude);
    location.is_valid().then_some(location)
}

/// Email invitation for a rendezvous.
#[derive(Debug, Clone, PartialEq)]
pub struct Invitation {
    pub subject: String,
    pub body: String,
}

impl Invitation {
    pub fn new(event: &RendezvousEvent, share_link: &str) -> Self {
        Self {
            subject: format!("Join me for: {}", event.name),
            body: format!(
                "Hi! I'd like to invite you to join me for \"{}\"\n\n\
                 When: {}\n\
                 Where: {}\n\n\
                 Click this link to view the location and join: {}\n\n\
                 See you there!",
                event.name, event.datetime, event.location, share_link
            ),
        }
    }

    /// `mailto:` URL with encoded subject and body.
    pub fn mailto(&self) -> String {
        format!(
            "mailto:?subject={}&body={}",
            utf8_percent_encode(&self.subject, URI_COMPONENT),
            utf8_percent_encode(&self.body, URI_COMPONENT)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ScriptedProvider;

    fn pizza_night() -> RendezvousEvent {
        RendezvousEvent::new("Pizza Night", "2025-06-01T19:30", "123 Main St", Transportation::Driving)
    }

    #[test]
    fn test_segment_matches_encode_uri_component() {
        let event = RendezvousEvent::new("a b", "t", "(x)", Transportation::Walking);
        let segment = event.to_url_segment();
        assert!(segment.starts_with("%7B%22name%22%3A%22a%20b%22"));
        assert!(segment.contains("(x)"));
    }

    #[test]
    fn test_resolve_view() {
        let event = pizza_night();
        assert_eq!(resolve_view(Some(&event.to_url_segment())), View::Map(event));
        assert_eq!(resolve_view(Some("%7Bnot-json")), View::Home);
        assert_eq!(resolve_view(Some("%FF%FE")), View::Home);
        assert_eq!(resolve_view(None), View::Home);
    }

    #[test]
    fn test_missing_transportation_defaults_to_driving() {
        let segment = "%7B%22name%22%3A%22x%22%2C%22datetime%22%3A%22t%22%2C%22location%22%3A%22y%22%7D";
        let event = RendezvousEvent::from_url_segment(segment).unwrap();
        assert_eq!(event.transportation, Transportation::Driving);
    }

    #[test]
    fn test_share_link_trims_slash() {
        let link = pizza_night().share_link("https://rendezview.app/");
        assert!(link.starts_with("https://rendezview.app/rendezvous/%7B"));
    }

    #[test]
    fn test_bad_current_location_falls_back_to_address() {
        assert_eq!(
            LocationInput::parse("Current Location (abc, 1)"),
            LocationInput::Address("Current Location (abc, 1)".into())
        );
        assert_eq!(
            LocationInput::parse("Current Location (95.0, 1.0)"),
            LocationInput::Address("Current Location (95.0, 1.0)".into())
        );
    }

    #[tokio::test]
    async fn test_resolve_location_input() {
        let provider = ScriptedProvider::new().with_address("123 Main St", Location::new(40.0, -75.0));
        let event = pizza_night();
        assert_eq!(event.location_input().resolve(&provider).await, Some(Location::new(40.0, -75.0)));
        assert_eq!(LocationInput::Address("nowhere".into()).resolve(&provider).await, None);
    }

    #[test]
    fn test_invitation_mailto() {
        let event = pizza_night();
        let invite = Invitation::new(&event, "https://rendezview.app/rendezvous/x");
        assert_eq!(invite.subject, "Join me for: Pizza Night");
        assert!(invite.body.contains("Where: 123 Main St"));

        let mailto = invite.mailto();
        assert!(mailto.starts_with("mailto:?subject=Join%20me%20for%3A%20Pizza%20Night&body="));
        assert!(!mailto.contains('\n'));
    }
}
