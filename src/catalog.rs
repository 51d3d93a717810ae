//! Track catalog.
//!
//! An ordered, fixed list of audio resource URLs, resolved once against the
//! page's base location. Paths starting with `/` resolve against the origin
//! root, others against the base directory. Duplicate entries are kept as
//! configured.

use std::collections::HashSet;

use futures_util::{stream, StreamExt};
use url::Url;

use crate::{error::Result, http};

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Catalog {
    tracks: Vec<Url>,
}

impl Catalog {
    /// Resolves `paths` against `base`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if any path cannot be resolved.
    pub fn resolve<S: AsRef<str>>(base: &Url, paths: &[S]) -> Result<Self> {
        let tracks = paths
            .iter()
            .map(|path| base.join(path.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { tracks })
    }

    #[must_use]
    pub fn from_urls(tracks: Vec<Url>) -> Self {
        Self { tracks }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Url> {
        self.tracks.get(index)
    }

    /// Returns the first index holding `url`.
    #[must_use]
    pub fn position(&self, url: &Url) -> Option<usize> {
        self.tracks.iter().position(|track| track == url)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Url> {
        self.tracks.iter()
    }

    /// Keeps only the tracks found in `reachable`, preserving order and
    /// duplicates.
    #[must_use]
    pub fn retain_reachable(&self, reachable: &HashSet<Url>) -> Self {
        let tracks = self
            .tracks
            .iter()
            .filter(|track| reachable.contains(*track))
            .cloned()
            .collect();
        Self { tracks }
    }

    /// Probes every unique track with at most `concurrency` requests in
    /// flight, and returns the reachable subset.
    pub async fn validate(&self, client: &http::Client, concurrency: usize) -> Self {
        let mut seen = HashSet::new();
        let unique: Vec<Url> = self
            .tracks
            .iter()
            .filter(|track| seen.insert(*track))
            .cloned()
            .collect();

        let reachable: HashSet<Url> = stream::iter(unique)
            .map(|track| async move { client.probe(&track).await.then_some(track) })
            .buffer_unordered(concurrency.max(1))
            .filter_map(|track| async move { track })
            .collect()
            .await;

        let validated = self.retain_reachable(&reachable);
        info!("track check: {} => {}", self.len(), validated.len());

        let removed: Vec<&str> = self
            .tracks
            .iter()
            .filter(|track| !reachable.contains(*track))
            .map(Url::as_str)
            .collect();
        if !removed.is_empty() {
            warn!("removed unreachable tracks: {removed:?}");
        }

        validated
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a Url;
    type IntoIter = std::slice::Iter<'a, Url>;

    fn into_iter(self) -> Self::IntoIter {
        self.tracks.iter()
    }
}
