//! Copy/move routing: picks which command actually runs a CP/MV-shaped
//! op based on which backends the src and dst nodes live on. Local↔local
//! staging mechanics (same-filesystem rename vs. cross-filesystem stream
//! copy) are a [`super::local::CopyFileLocally`] implementation detail
//! (it consults `CommandContext::volumes` itself); this router only
//! decides local-vs-remote dispatch.

use super::{gdrive, local, Command};

/// `src_is_local`/`dst_is_local` come from inspecting each side's `Node`
/// variant (`NodeData::LocalFile`/`LocalDir` vs the GDrive variants).
pub fn route_copy(src_is_local: bool, dst_is_local: bool) -> Box<dyn Command> {
    match (src_is_local, dst_is_local) {
        (true, true) => Box::new(local::CopyFileLocally),
        (true, false) => Box::new(gdrive::UploadToGDrive),
        (false, true) => Box::new(gdrive::DownloadFromGDrive),
        // Drive's own `files.copy` API would be the natural handler for a
        // GDrive-to-GDrive copy, but that's HTTP plumbing this client
        // trait doesn't expose. Route through the upload path rather than
        // silently dropping the op.
        (false, false) => Box::new(gdrive::UploadToGDrive),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_covers_every_backend_pair_without_panicking() {
        for src in [true, false] {
            for dst in [true, false] {
                let _cmd = route_copy(src, dst);
            }
        }
    }
}
