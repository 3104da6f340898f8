//! UID / GUID mapping: a standalone, thread-safe mapper, one
//! [`UidGenerator`] per process (persisted watermark) and one
//! [`UidMapper`] per device holding the bidirectional
//! path↔UID / goog_id↔UID tables.

use crate::shared::Uid;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Monotonic UID generator with a persisted watermark.
///
/// `ensure_next_uid_greater_than` only ever advances the watermark —
/// never retracts it — matching the contract verbatim.
pub struct UidGenerator {
    next: AtomicU64,
}

impl UidGenerator {
    /// `watermark` is the last-persisted value; the first UID returned by
    /// `next_uid()` will be `watermark.max(Uid::FIRST_AVAILABLE)`.
    pub fn new(watermark: Uid) -> Self {
        let start = watermark.0.max(Uid::FIRST_AVAILABLE);
        Self {
            next: AtomicU64::new(start),
        }
    }

    /// Returns a new, never-before-issued UID for this process lifetime.
    pub fn next_uid(&self) -> Uid {
        Uid(self.next.fetch_add(1, Ordering::SeqCst))
    }

    /// Current watermark (the next value that will be handed out). Used
    /// by callers that persist the watermark across restarts.
    pub fn watermark(&self) -> Uid {
        Uid(self.next.load(Ordering::SeqCst))
    }

    /// Advances the watermark so that every subsequently issued UID is
    /// strictly greater than `n`. Never retracts the watermark.
    pub fn ensure_next_uid_greater_than(&self, n: Uid) {
        let target = n.0.saturating_add(1);
        self.next.fetch_max(target, Ordering::SeqCst);
    }
}

fn canonicalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Bidirectional path↔UID and goog_id↔UID mapping for one device
///. All methods are thread-safe and deterministic: the
/// same canonicalized key always maps to the same UID for the lifetime
/// of the process.
pub struct UidMapper {
    generator: std::sync::Arc<UidGenerator>,
    path_to_uid: Mutex<HashMap<String, Uid>>,
    uid_to_path: Mutex<HashMap<Uid, String>>,
    goog_id_to_uid: Mutex<HashMap<String, Uid>>,
    uid_to_goog_id: Mutex<HashMap<Uid, String>>,
    used_uids: Mutex<std::collections::HashSet<Uid>>,
}

impl UidMapper {
    pub fn new(generator: std::sync::Arc<UidGenerator>) -> Self {
        Self {
            generator,
            path_to_uid: Mutex::new(HashMap::new()),
            uid_to_path: Mutex::new(HashMap::new()),
            goog_id_to_uid: Mutex::new(HashMap::new()),
            uid_to_goog_id: Mutex::new(HashMap::new()),
            used_uids: Mutex::new(std::collections::HashSet::new()),
        }
    }

    /// A suggested UID is honored only if it is unused and greater than
    /// the generator's current watermark; otherwise a fresh UID is
    /// issued and the mapping recorded.
    fn resolve_new_uid(&self, suggestion: Option<Uid>) -> Uid {
        let mut used = self.used_uids.lock().unwrap();
        if let Some(s) = suggestion {
            if !used.contains(&s) && s.0 > self.generator.watermark().0 {
                used.insert(s);
                self.generator.ensure_next_uid_greater_than(s);
                return s;
            }
        }
        let fresh = self.generator.next_uid();
        used.insert(fresh);
        fresh
    }

    /// Idempotent: returns the same UID for the same canonicalized path
    /// forever, creating the mapping on first use.
    pub fn get_uid_for_local_path(&self, path: &str, suggestion: Option<Uid>) -> Uid {
        let key = canonicalize_path(path);
        {
            let map = self.path_to_uid.lock().unwrap();
            if let Some(uid) = map.get(&key) {
                return *uid;
            }
        }
        let uid = self.resolve_new_uid(suggestion);
        self.path_to_uid.lock().unwrap().insert(key.clone(), uid);
        self.uid_to_path.lock().unwrap().insert(uid, key);
        uid
    }

    pub fn get_uid_for_goog_id(&self, goog_id: &str, suggestion: Option<Uid>) -> Uid {
        {
            let map = self.goog_id_to_uid.lock().unwrap();
            if let Some(uid) = map.get(goog_id) {
                return *uid;
            }
        }
        let uid = self.resolve_new_uid(suggestion);
        self.goog_id_to_uid
            .lock()
            .unwrap()
            .insert(goog_id.to_string(), uid);
        self.uid_to_goog_id
            .lock()
            .unwrap()
            .insert(uid, goog_id.to_string());
        uid
    }

    pub fn path_for_uid(&self, uid: Uid) -> Option<String> {
        self.uid_to_path.lock().unwrap().get(&uid).cloned()
    }

    pub fn goog_id_for_uid(&self, uid: Uid) -> Option<String> {
        self.uid_to_goog_id.lock().unwrap().get(&uid).cloned()
    }

    pub fn uid_for_existing_local_path(&self, path: &str) -> Option<Uid> {
        self.path_to_uid
            .lock()
            .unwrap()
            .get(&canonicalize_path(path))
            .copied()
    }

    /// Resolves a node's multiple GDrive parent UIDs to their goog_ids,
    /// optionally failing if any one is unmapped.
    pub fn resolve_uids_to_goog_ids(
        &self,
        uids: &[Uid],
        fail_if_missing: bool,
    ) -> Result<Vec<String>, Uid> {
        let mut out = Vec::with_capacity(uids.len());
        for uid in uids {
            match self.goog_id_for_uid(*uid) {
                Some(g) => out.push(g),
                None if fail_if_missing => return Err(*uid),
                None => {}
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_stability_for_same_path() {
        let gen = std::sync::Arc::new(UidGenerator::new(Uid::NULL));
        let mapper = UidMapper::new(gen);
        let a = mapper.get_uid_for_local_path("/a/b/c", None);
        let b = mapper.get_uid_for_local_path("/a/b/c", None);
        let c = mapper.get_uid_for_local_path("/a/b/c/", None); // trailing slash
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn watermark_never_retracts() {
        let gen = UidGenerator::new(Uid(100));
        gen.ensure_next_uid_greater_than(Uid(50));
        assert_eq!(gen.watermark(), Uid(100));
        gen.ensure_next_uid_greater_than(Uid(200));
        assert!(gen.watermark().0 > 200);
    }

    #[test]
    fn suggestion_honored_only_if_unused_and_above_watermark() {
        let gen = std::sync::Arc::new(UidGenerator::new(Uid(10)));
        let mapper = UidMapper::new(gen);
        let suggested = Uid(500);
        let got = mapper.get_uid_for_local_path("/x", Some(suggested));
        assert_eq!(got, suggested);

        // Second distinct path suggests the same UID again: must not collide.
        let got2 = mapper.get_uid_for_local_path("/y", Some(suggested));
        assert_ne!(got2, suggested);
    }

    #[test]
    fn different_devices_mappers_are_independent() {
        let gen1 = std::sync::Arc::new(UidGenerator::new(Uid::NULL));
        let gen2 = std::sync::Arc::new(UidGenerator::new(Uid::NULL));
        let m1 = UidMapper::new(gen1);
        let m2 = UidMapper::new(gen2);
        let u1 = m1.get_uid_for_local_path("/same/path", None);
        let u2 = m2.get_uid_for_local_path("/same/path", None);
        // Both start from the same watermark so may coincide numerically,
        // but each mapper's table is independent.
        assert_eq!(u1, u2);
        assert_eq!(m1.path_for_uid(u1).unwrap(), "/same/path");
    }
}
