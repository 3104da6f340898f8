//! Core identity types: [`Uid`], [`DeviceUid`], [`DnUid`] and [`Guid`] —
//! a device identity paired with a per-device node identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 64-bit monotonic per-device node identity.
///
/// `0` is reserved as the null UID; `1` is reserved for the super-root node
/// of the OpGraph. Uniqueness and monotonicity are enforced by
/// [`crate::uid::UidGenerator`], never by this type itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Uid(pub u64);

impl Uid {
    pub const NULL: Uid = Uid(0);
    pub const SUPER_ROOT: Uid = Uid(1);
    pub const FIRST_AVAILABLE: u64 = 2;

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Uid {
    fn from(v: u64) -> Self {
        Uid(v)
    }
}

/// Identifies one backend store instance: a specific local disk, or a
/// specific GDrive account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceUid(pub Uuid);

impl DeviceUid {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DeviceUid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeviceUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The global identity of a node: a [`DeviceUid`] paired with a per-device
/// [`Uid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DnUid {
    pub device_uid: DeviceUid,
    pub uid: Uid,
}

impl DnUid {
    pub fn new(device_uid: DeviceUid, uid: Uid) -> Self {
        Self { device_uid, uid }
    }
}

impl fmt::Display for DnUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device_uid, self.uid)
    }
}

/// A change-tree-scoped string identity. For a real node it is a canonical rendering of its [`DnUid`];
/// for a synthetic change-tree node (an ancestor MKDIR that doesn't exist
/// in the cache yet) it additionally encodes the operation category, so
/// the same underlying node can appear once per category without the two
/// appearances colliding in a `HashMap<Guid, _>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Guid(pub String);

impl Guid {
    /// GUID for a real, cache-resident node: `device_uid:uid`.
    pub fn for_node(dn_uid: DnUid) -> Self {
        Self(dn_uid.to_string())
    }

    /// GUID for a node as it appears under a specific change category,
    /// e.g. the same dst node shows up once under "added" and, in a
    /// different batch, once under "updated" without clashing.
    pub fn for_node_in_category(dn_uid: DnUid, category: &str) -> Self {
        Self(format!("{dn_uid}#{category}"))
    }

    /// GUID for a synthetic node that has no real [`DnUid`] yet (an
    /// ancestor directory synthesized by the ChangeTreeBuilder).
    pub fn synthetic(device_uid: DeviceUid, path: &str, category: &str) -> Self {
        Self(format!("synthetic:{device_uid}:{path}#{category}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
