//! Voice discovery and selection.
//!
//! The catalog polls the synthesis engine for its voice inventory, keeps
//! only the target language family, and picks one voice with a fixed
//! priority list. The pick is published on a watch channel; the catalog is
//! the only writer, playback only reads.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::Result;

use super::engine::{SynthesisEngine, Voice};

/// Name substrings tried in order; first hit wins. The vendor rule comes
/// first (consistently the best quality where present), then known good
/// Russian voices by name.
const NAME_PRIORITY: [&str; 4] = ["google", "milena", "yuri", "katya"];

/// Pick a voice from a candidate set.
///
/// Deterministic in the set alone: candidates are ordered by name before
/// the rules run, so the answer does not depend on inventory order. An
/// empty set yields `None`, never an error.
pub fn select_voice(voices: &[Voice]) -> Option<Voice> {
    let mut sorted: Vec<&Voice> = voices.iter().collect();
    sorted.sort_by_key(|voice| voice.name.to_lowercase());

    for needle in NAME_PRIORITY {
        if let Some(voice) = sorted.iter().find(|voice| voice.name.to_lowercase().contains(needle))
        {
            return Some((*voice).clone());
        }
    }
    sorted.first().map(|voice| (*voice).clone())
}

/// Primary subtag of a language tag, lowercased: `ru-RU`, `ru_RU` and `RU`
/// all map to `ru`.
fn language_family(tag: &str) -> &str {
    tag.split(['-', '_']).next().unwrap_or(tag)
}

/// Whether two tags share a primary subtag.
pub fn same_family(a: &str, b: &str) -> bool {
    language_family(a).eq_ignore_ascii_case(language_family(b))
}

/// Discovers voices and owns the selected-voice channel.
pub struct VoiceCatalog {
    engine: Arc<dyn SynthesisEngine>,
    language: String,
    selected: watch::Sender<Option<Voice>>,
}

impl VoiceCatalog {
    /// Create a catalog for the target language.
    ///
    /// Returns the catalog and the receiver side of the selected-voice
    /// channel. Nothing is selected until the first [`refresh`].
    ///
    /// [`refresh`]: VoiceCatalog::refresh
    pub fn new(
        engine: Arc<dyn SynthesisEngine>,
        language: &str,
    ) -> (Self, watch::Receiver<Option<Voice>>) {
        let (selected_tx, selected_rx) = watch::channel(None);
        let catalog = Self { engine, language: language.to_string(), selected: selected_tx };
        (catalog, selected_rx)
    }

    /// Fetch the inventory, filter to the language family, re-run selection
    /// and publish the result. Idempotent for a stable inventory.
    pub async fn refresh(&self) -> Result<Option<Voice>> {
        let inventory = self.engine.voices().await?;
        let candidates: Vec<Voice> =
            inventory.into_iter().filter(|voice| same_family(&voice.lang, &self.language)).collect();
        debug!("{} candidate voices for {}", candidates.len(), self.language);

        let choice = select_voice(&candidates);
        match &choice {
            Some(voice) => info!("🗣️ Selected voice: {} ({})", voice.name, voice.lang),
            None => debug!("No voice available for {}", self.language),
        }
        self.selected.send_replace(choice.clone());
        Ok(choice)
    }

    /// Refresh until a voice appears, for services that load their voice
    /// inventory lazily. Gives up after `attempts` polls; an exhausted poll
    /// reports "no voice available" once and is not an error.
    pub async fn wait_for_voice(&self, attempts: u32, delay: Duration) -> Result<Option<Voice>> {
        for attempt in 0..attempts {
            if attempt > 0 {
                sleep(delay).await;
            }
            if let Some(voice) = self.refresh().await? {
                return Ok(Some(voice));
            }
        }
        warn!("No voice available for {} after {} polls", self.language, attempts);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::speech::engine::SynthesisRequest;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    fn voice(name: &str) -> Voice {
        Voice::new(name, "ru-RU")
    }

    fn permutations(voices: &[Voice]) -> Vec<Vec<Voice>> {
        if voices.len() <= 1 {
            return vec![voices.to_vec()];
        }
        let mut all = Vec::new();
        for (i, first) in voices.iter().enumerate() {
            let mut rest = voices.to_vec();
            rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, first.clone());
                all.push(tail);
            }
        }
        all
    }

    #[test]
    fn selection_is_independent_of_inventory_order() {
        let voices =
            vec![voice("Anna"), voice("Google русский"), voice("Milena"), voice("Zoya")];
        let expected = select_voice(&voices).unwrap();
        assert_eq!(expected.name, "Google русский");

        for ordering in permutations(&voices) {
            assert_eq!(select_voice(&ordering).unwrap(), expected);
        }
    }

    #[test]
    fn vendor_rule_beats_named_voices() {
        let voices = vec![voice("Milena"), voice("GOOGLE Русский")];
        assert_eq!(select_voice(&voices).unwrap().name, "GOOGLE Русский");
    }

    #[test]
    fn named_voices_follow_priority_order() {
        let voices = vec![voice("Katya"), voice("Yuri")];
        assert_eq!(select_voice(&voices).unwrap().name, "Yuri");
    }

    #[test]
    fn falls_back_to_first_by_name() {
        let voices = vec![voice("Zoya"), voice("Anna")];
        assert_eq!(select_voice(&voices).unwrap().name, "Anna");

        for ordering in permutations(&voices) {
            assert_eq!(select_voice(&ordering).unwrap().name, "Anna");
        }
    }

    #[test]
    fn empty_set_selects_nothing() {
        assert_eq!(select_voice(&[]), None);
    }

    #[test]
    fn family_matching_tolerates_tag_variants() {
        for tag in ["ru-RU", "ru_RU", "RU", "ru"] {
            assert!(same_family(tag, "ru-RU"), "{tag} should match ru-RU");
        }
        assert!(!same_family("en-US", "ru-RU"));
    }

    /// Engine whose inventory answers are scripted per call.
    struct ScriptedInventory {
        script: Mutex<Vec<Vec<Voice>>>,
    }

    #[async_trait]
    impl SynthesisEngine for ScriptedInventory {
        async fn voices(&self) -> Result<Vec<Voice>> {
            let mut script = self.script.lock();
            if script.len() > 1 { Ok(script.remove(0)) } else { Ok(script[0].clone()) }
        }

        async fn synthesize(&self, _request: &SynthesisRequest) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn refresh_publishes_on_the_channel() {
        let engine = Arc::new(ScriptedInventory {
            script: Mutex::new(vec![vec![voice("Milena"), Voice::new("Samantha", "en-US")]]),
        });
        let (catalog, selected) = VoiceCatalog::new(engine, "ru-RU");

        let choice = catalog.refresh().await.unwrap().unwrap();
        assert_eq!(choice.name, "Milena");
        assert_eq!(selected.borrow().as_ref().unwrap().name, "Milena");
    }

    #[tokio::test]
    async fn lazy_inventory_converges_after_repolling() {
        let engine = Arc::new(ScriptedInventory {
            script: Mutex::new(vec![Vec::new(), Vec::new(), vec![voice("Katya")]]),
        });
        let (catalog, selected) = VoiceCatalog::new(engine, "ru-RU");

        let choice =
            catalog.wait_for_voice(5, Duration::from_millis(1)).await.unwrap().unwrap();
        assert_eq!(choice.name, "Katya");
        assert_eq!(selected.borrow().as_ref().unwrap().name, "Katya");
    }

    #[tokio::test]
    async fn exhausted_polling_reports_no_voice() {
        let engine = Arc::new(ScriptedInventory { script: Mutex::new(vec![Vec::new()]) });
        let (catalog, selected) = VoiceCatalog::new(engine, "ru-RU");

        let choice = catalog.wait_for_voice(3, Duration::from_millis(1)).await.unwrap();
        assert_eq!(choice, None);
        assert!(selected.borrow().is_none());
    }

    #[tokio::test]
    async fn repeated_refresh_is_idempotent() {
        let engine = Arc::new(ScriptedInventory {
            script: Mutex::new(vec![vec![voice("Yuri"), voice("Anna")]]),
        });
        let (catalog, _selected) = VoiceCatalog::new(engine, "ru-RU");

        let first = catalog.refresh().await.unwrap();
        let second = catalog.refresh().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.unwrap().name, "Yuri");
    }
}
