//! Coordinator configuration.
//!
//! Every field has a default, so a configuration file only needs to name
//! what differs. Durations are written in milliseconds.
//!
//! # Example
//!
//! ```toml
//! base_url = "https://example.org/"
//! tracks = ["/music/one.mp3", "/music/two.mp3"]
//! effect = "/sons/click.mp3"
//! blur_pause_delay = 250
//!
//! [validation]
//! enabled = true
//! ```

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use url::Url;

use crate::error::{Error, Result};

#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base location that track and effect paths are resolved against.
    pub base_url: Url,

    /// Background music paths, in catalog order. Duplicates are kept.
    pub tracks: Vec<String>,

    /// Path of the one-shot interaction sound.
    pub effect: Option<String>,

    pub music_volume: f32,
    pub effect_volume: f32,

    /// Age after which a lease no longer protects its holder.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub stale_lease: Duration,

    /// How long focus must stay away before playback pauses.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub blur_pause_delay: Duration,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub watchdog_tick: Duration,

    /// Continuous non-progress that counts as a stall.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub watchdog_stuck: Duration,

    /// Smallest position change that counts as progress.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub stall_epsilon: Duration,

    pub keys: StorageKeys,

    /// Name of the pub/sub channel shared by the origin's contexts.
    pub channel: String,

    pub music_element: String,
    pub effect_element: String,

    /// Page-global marker that flags a live coordinator.
    pub singleton_marker: String,

    /// Selectors of embedded third-party widgets. Clicks inside them unlock
    /// audio but do not play the effect.
    pub excluded_regions: Vec<String>,

    pub validation: Validation,
}

/// Storage keys of the persisted state.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    /// Session-scoped unlock flag.
    pub unlocked: String,
    /// Session-scoped shuffle order.
    pub order: String,
    /// Session-scoped shuffle cursor.
    pub cursor: String,
    /// Origin-scoped lease record.
    pub lease: String,
}

/// Track reachability validation, run once after the first gesture.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Validation {
    pub enabled: bool,

    /// Upper bound for each probe request.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub timeout: Duration,

    /// Probes in flight at once.
    pub concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://localhost/").expect("default base url is valid"),
            tracks: Vec::new(),
            effect: None,
            music_volume: 0.40,
            effect_volume: 0.90,
            stale_lease: Duration::from_secs(15),
            blur_pause_delay: Duration::from_millis(300),
            watchdog_tick: Duration::from_secs(2),
            watchdog_stuck: Duration::from_secs(10),
            stall_epsilon: Duration::from_millis(10),
            keys: StorageKeys::default(),
            channel: "bgm_audio_channel".to_owned(),
            music_element: "bgm_music".to_owned(),
            effect_element: "bgm_effect".to_owned(),
            singleton_marker: "__BGM_AUDIO_SINGLETON__".to_owned(),
            excluded_regions: [
                "#google_translate_element",
                ".goog-te-gadget",
                ".skiptranslate",
                ".goog-te-menu-frame",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            validation: Validation::default(),
        }
    }
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            unlocked: "bgm_audio_unlocked".to_owned(),
            order: "bgm_playlist_order".to_owned(),
            cursor: "bgm_playlist_pos".to_owned(),
            lease: "bgm_audio_lock".to_owned(),
        }
    }
}

impl Default for Validation {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout: Duration::from_millis(2500),
            concurrency: 3,
        }
    }
}

impl Config {
    /// Parses a TOML configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when the document is malformed or a value
    /// is out of range.
    pub fn from_toml(toml: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml)?;
        config.check()?;
        Ok(config)
    }

    /// Loads a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        debug!("loaded configuration from {}", path.display());
        Self::from_toml(&contents)
    }

    fn check(&self) -> Result<()> {
        for (name, volume) in [
            ("music_volume", self.music_volume),
            ("effect_volume", self.effect_volume),
        ] {
            if !(0.0..=1.0).contains(&volume) {
                return Err(Error::invalid_argument(format!(
                    "{name} must be between 0.0 and 1.0, got {volume}"
                )));
            }
        }

        if self.watchdog_tick.is_zero() {
            return Err(Error::invalid_argument("watchdog_tick must not be zero"));
        }

        if self.validation.concurrency == 0 {
            return Err(Error::invalid_argument(
                "validation.concurrency must not be zero",
            ));
        }

        Ok(())
    }
}
