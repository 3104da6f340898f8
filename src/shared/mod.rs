//! Shared identity types used across every layer of the core.

pub mod ids;

pub use ids::{DeviceUid, DnUid, Guid, Uid};
