//! Boundary to the caller's local message store.

use mailspool_imap::Flags;

use crate::Result;

/// The local message store as offline replay sees it.
///
/// Replay needs a handful of things from the application: folder
/// names as the server knows them, the bytes of messages queued for
/// upload, and a place to record what the server has confirmed. The
/// store's own format stays on the other side of this trait.
pub trait MailStore: Send {
    /// Resolve a store folder name to the path used on the wire.
    fn folder_path(&self, folder: &str) -> String;

    /// Load the bytes and flags of a local message queued for upload.
    ///
    /// `None` means the message has since left the store, and the
    /// upload is silently dropped rather than failed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn load_message(&mut self, folder: &str, id: u32) -> Result<Option<(Vec<u8>, Flags)>>;

    /// Record that a queued upload reached the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be updated.
    fn uploaded(&mut self, folder: &str, id: u32) -> Result<()>;

    /// Record that a queued copy reached the server.
    ///
    /// `ids` are the store ids of the placeholder messages created in
    /// `folder` when the copy was queued; they can be dropped in
    /// favor of the server's own copies on the next sync.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be updated.
    fn copied(&mut self, folder: &str, ids: &[u32]) -> Result<()>;

    /// Record flag state the server has confirmed for `uids`.
    ///
    /// `mask` names the flags the change was allowed to touch, in the
    /// same shape [`Flags::added`] and [`Flags::removed`] use.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be updated.
    fn flags_applied(
        &mut self,
        folder: &str,
        uids: &[u32],
        flags: &Flags,
        mask: &Flags,
    ) -> Result<()>;
}
