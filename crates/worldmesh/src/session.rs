// Decode session - model cache and placement identity shared across tiles

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{DecodeError, Result};
use crate::m2::{Model, Skin};
use crate::source::ArchiveSource;

/// State that outlives a single tile decode. Placements carry unique ids
/// that repeat on neighbouring tiles, and the same model files are
/// referenced all over a map; both are deduplicated here. Decoding runs
/// single threaded today, the locks mark the boundary parallel tile
/// decoding would have to respect.
pub struct Session {
    models: Mutex<HashMap<String, Arc<Model>>>,
    placed_uids: Mutex<HashSet<u32>>,
    missing: Mutex<BTreeSet<String>>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            models: Mutex::new(HashMap::new()),
            placed_uids: Mutex::new(HashSet::new()),
            missing: Mutex::new(BTreeSet::new()),
        }
    }

    /// Record `uid` as placed. Returns true when it had been placed
    /// before, on this tile or any earlier one.
    pub fn check_uid(&self, uid: u32) -> bool {
        !self.placed_uids.lock().insert(uid)
    }

    /// Fetch a model, decoding it on first use. `name` may use any case
    /// and may carry a legacy extension. A cached entry is returned as is
    /// whatever `want_detailed` says, so a model first loaded without its
    /// skin stays skinless for the rest of the session.
    ///
    /// A name whose file is missing is reported as `NotFound` and is not
    /// cached, so a later request will probe the source again.
    pub fn model(
        &self,
        source: &mut dyn ArchiveSource,
        name: &str,
        want_detailed: bool,
    ) -> Result<Arc<Model>> {
        let name = normalize_model_name(name);

        if let Some(model) = self.models.lock().get(&name) {
            return Ok(model.clone());
        }

        let Some(data) = source.load_file(&name) else {
            self.missing.lock().insert(name.clone());
            return Err(DecodeError::NotFound(name));
        };
        let mut model = Model::decode(&data)?;

        if want_detailed {
            if model.views() > 0 {
                self.load_skin(source, &name, &mut model);
            } else {
                debug!("model {} has no views, nothing to skin", name);
            }
        }

        let model = Arc::new(model);
        self.models.lock().insert(name, model.clone());
        Ok(model)
    }

    /// A failed skin leaves the model cached with collision geometry only.
    fn load_skin(&self, source: &mut dyn ArchiveSource, name: &str, model: &mut Model) {
        let skin_name = skin_filename(name);
        let Some(data) = source.load_file(&skin_name) else {
            warn!("Could not find skin {} for model {}", skin_name, name);
            return;
        };
        match Skin::decode(&data) {
            Ok(skin) => {
                if !model.attach_skin(skin) {
                    warn!("Skin {} does not fit model {}, ignoring it", skin_name, name);
                }
            }
            Err(err) => warn!("Could not decode skin {}: {}", skin_name, err),
        }
    }

    /// Forget everything, making the session as good as new.
    pub fn clear(&self) {
        self.models.lock().clear();
        self.placed_uids.lock().clear();
        self.missing.lock().clear();
    }

    pub fn cached_model_count(&self) -> usize {
        self.models.lock().len()
    }

    /// Names whose files were absent, sorted. Entries accumulate until
    /// `clear`.
    pub fn missing_models(&self) -> Vec<String> {
        self.missing.lock().iter().cloned().collect()
    }

    /// End-of-run summary of every model file that could not be found.
    pub fn warn_missing(&self) {
        let missing = self.missing.lock();
        if missing.is_empty() {
            return;
        }
        warn!("Some models could not be loaded:");
        for name in missing.iter() {
            warn!("Could not find file of model {}", name);
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Lower-case the path and swap the legacy mdx/mdl extensions for m2,
/// the extension the files actually ship under.
pub fn normalize_model_name(name: &str) -> String {
    let mut name = name.to_ascii_lowercase();
    if name.ends_with(".mdx") || name.ends_with(".mdl") {
        name.truncate(name.len() - 2);
        name.push('2');
    }
    name
}

/// First level of detail: "foo.m2" pairs with "foo00.skin".
fn skin_filename(name: &str) -> String {
    match name.strip_suffix(".m2") {
        Some(stem) => format!("{stem}00.skin"),
        None => format!("{name}00.skin"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::m2::testdata::{m2_bytes, skin_bytes};
    use crate::source::testutil::MemSource;

    const OAK: &str = "world\\trees\\oak.m2";

    fn oak_bytes(views: u32) -> Vec<u8> {
        m2_bytes(
            &[
                ([0.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
                ([1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
                ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
            ],
            views,
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[0, 1, 2],
        )
    }

    fn oak_source(views: u32) -> MemSource {
        let mut source = MemSource::new();
        source.insert(OAK, oak_bytes(views));
        source.insert("world\\trees\\oak00.skin", skin_bytes(&[0, 1, 2], &[0, 1, 2]));
        source
    }

    #[test]
    fn test_normalize_model_name() {
        assert_eq!(normalize_model_name("World\\Trees\\Oak.MDX"), OAK);
        assert_eq!(normalize_model_name("oak.mdl"), "oak.m2");
        assert_eq!(normalize_model_name("Oak.M2"), "oak.m2");
    }

    #[test]
    fn test_skin_filename() {
        assert_eq!(skin_filename(OAK), "world\\trees\\oak00.skin");
    }

    #[test]
    fn test_cache_returns_same_instance() {
        let session = Session::new();
        let mut source = oak_source(1);
        let first = session.model(&mut source, "World\\Trees\\Oak.MDX", false).unwrap();
        let second = session.model(&mut source, OAK, false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(session.cached_model_count(), 1);
    }

    #[test]
    fn test_detailed_request_attaches_skin() {
        let session = Session::new();
        let mut source = oak_source(1);
        let model = session.model(&mut source, OAK, true).unwrap();
        assert!(model.has_skin());
        assert!(model.detailed_mesh().is_some());
    }

    #[test]
    fn test_no_retroactive_skin_upgrade() {
        let session = Session::new();
        let mut source = oak_source(1);
        let first = session.model(&mut source, OAK, false).unwrap();
        assert!(!first.has_skin());
        // the later detailed request hits the cache and changes nothing
        let second = session.model(&mut source, OAK, true).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!second.has_skin());
    }

    #[test]
    fn test_detailed_entry_kept_for_bounding_request() {
        let session = Session::new();
        let mut source = oak_source(1);
        let first = session.model(&mut source, OAK, true).unwrap();
        assert!(first.has_skin());
        // the bounding request returns the cached entry, skin and all
        let second = session.model(&mut source, OAK, false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(second.has_skin());
    }

    #[test]
    fn test_zero_views_skips_skin() {
        let session = Session::new();
        let mut source = oak_source(0);
        let model = session.model(&mut source, OAK, true).unwrap();
        assert!(!model.has_skin());
    }

    #[test]
    fn test_missing_skin_keeps_model_cached() {
        let session = Session::new();
        let mut source = MemSource::new();
        source.insert(OAK, oak_bytes(1));
        let model = session.model(&mut source, OAK, true).unwrap();
        assert!(!model.has_skin());
        assert_eq!(session.cached_model_count(), 1);
    }

    #[test]
    fn test_mismatched_skin_keeps_model_cached() {
        let session = Session::new();
        let mut source = MemSource::new();
        source.insert(OAK, oak_bytes(1));
        // lookup entry 9 points past the three render vertices
        source.insert("world\\trees\\oak00.skin", skin_bytes(&[0, 9], &[0, 1, 0]));
        let model = session.model(&mut source, OAK, true).unwrap();
        assert!(!model.has_skin());
    }

    #[test]
    fn test_missing_model_recorded_and_retried() {
        let session = Session::new();
        let mut source = MemSource::new();
        let err = session.model(&mut source, OAK, false).unwrap_err();
        assert!(matches!(err, DecodeError::NotFound(_)));
        assert_eq!(session.missing_models(), vec![OAK.to_string()]);
        assert_eq!(session.cached_model_count(), 0);

        // the file showing up later must not be masked by a negative entry
        source.insert(OAK, oak_bytes(0));
        assert!(session.model(&mut source, OAK, false).is_ok());
    }

    #[test]
    fn test_check_uid_across_calls() {
        let session = Session::new();
        assert!(!session.check_uid(7));
        assert!(session.check_uid(7));
        assert!(!session.check_uid(8));
    }

    #[test]
    fn test_clear_resets_everything() {
        let session = Session::new();
        let mut source = oak_source(0);
        session.model(&mut source, OAK, false).unwrap();
        session.check_uid(7);
        let _ = session.model(&mut source, "gone.m2", false);
        session.clear();
        assert_eq!(session.cached_model_count(), 0);
        assert!(session.missing_models().is_empty());
        assert!(!session.check_uid(7));
    }
}
