//! Instrument resolution
//!
//! Maps a human market slug to the pair of tradable instrument ids by
//! looking the event up on the Gamma API. Consumed once at startup.

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{MarketDataError, Result};

/// The tracked sides of a binary market, in encounter order.
/// The primary instrument (lower price convention) is the displayed one.
#[derive(Debug, Clone)]
pub struct InstrumentSet {
    pub primary: String,
    pub complementary: String,
    pub all: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EventDescriptor {
    #[serde(default)]
    markets: Vec<MarketDescriptor>,
}

#[derive(Debug, Deserialize)]
struct MarketDescriptor {
    #[serde(default)]
    id: Option<String>,

    /// JSON-encoded string array of instrument ids
    #[serde(rename = "clobTokenIds", default)]
    clob_token_ids: Option<String>,
}

/// Look up an event by slug and extract its instrument ids
pub async fn resolve(gamma_endpoint: &str, slug: &str) -> Result<InstrumentSet> {
    let url = format!("{gamma_endpoint}/events/slug/{slug}");
    info!(%url, "resolving market instruments");

    let event = reqwest::Client::new()
        .get(&url)
        .send()
        .await?
        .error_for_status()?
        .json::<EventDescriptor>()
        .await?;

    extract_instruments(event)
}

/// Flatten each sub-market's encoded id array, dedupe preserving encounter
/// order, and designate the first two distinct ids primary/complementary.
fn extract_instruments(event: EventDescriptor) -> Result<InstrumentSet> {
    let mut ids: Vec<String> = Vec::new();

    for market in &event.markets {
        let Some(raw) = market.clob_token_ids.as_deref() else {
            continue;
        };
        match serde_json::from_str::<Vec<String>>(raw) {
            Ok(tokens) => {
                for token in tokens {
                    if !ids.contains(&token) {
                        ids.push(token);
                    }
                }
            }
            Err(e) => {
                warn!(market = ?market.id, error = %e, "failed to parse clobTokenIds");
            }
        }
    }

    if ids.len() < 2 {
        return Err(MarketDataError::Resolve(format!(
            "expected two instrument ids for a binary market, found {}",
            ids.len()
        )));
    }

    Ok(InstrumentSet {
        primary: ids[0].clone(),
        complementary: ids[1].clone(),
        all: ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(id: &str, tokens: Option<&str>) -> MarketDescriptor {
        MarketDescriptor {
            id: Some(id.to_string()),
            clob_token_ids: tokens.map(str::to_string),
        }
    }

    #[test]
    fn flattens_and_dedupes_preserving_order() {
        let event = EventDescriptor {
            markets: vec![
                market("m1", Some(r#"["2153", "1719"]"#)),
                market("m2", Some(r#"["1719", "8888"]"#)),
            ],
        };

        let set = extract_instruments(event).unwrap();
        assert_eq!(set.primary, "2153");
        assert_eq!(set.complementary, "1719");
        assert_eq!(set.all, vec!["2153", "1719", "8888"]);
    }

    #[test]
    fn malformed_token_arrays_are_skipped() {
        let event = EventDescriptor {
            markets: vec![
                market("m1", Some("not json")),
                market("m2", None),
                market("m3", Some(r#"["2153", "1719"]"#)),
            ],
        };

        let set = extract_instruments(event).unwrap();
        assert_eq!(set.all, vec!["2153", "1719"]);
    }

    #[test]
    fn fewer_than_two_ids_is_an_error() {
        let event = EventDescriptor {
            markets: vec![market("m1", Some(r#"["2153"]"#))],
        };
        assert!(matches!(
            extract_instruments(event),
            Err(MarketDataError::Resolve(_))
        ));
    }

    #[test]
    fn parses_a_gamma_event_payload() {
        let raw = r#"{
            "slug": "bitcoin-up-or-down",
            "markets": [
                {"id": "m1", "clobTokenIds": "[\"2153\", \"1719\"]"},
                {"id": "m2"}
            ]
        }"#;
        let event: EventDescriptor = serde_json::from_str(raw).unwrap();
        let set = extract_instruments(event).unwrap();
        assert_eq!(set.primary, "2153");
    }
}
