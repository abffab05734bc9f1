use crate::error::AllocError;

/// A growable byte region accumulating a response.
///
/// Growth is fallible: [`append`](Self::append) reserves exactly the
/// number of bytes it is given and reports an [`AllocError`] instead of
/// aborting when the allocator refuses.
///
/// A buffer is released by dropping it or through
/// [`release`](Self::release); both consume it, so a second release is
/// not expressible.
#[derive(Debug, Default)]
pub struct Buffer {
    storage: Vec<u8>,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies `bytes` past the current end.
    ///
    /// On failure the buffer is left unchanged.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), AllocError> {
        self.storage
            .try_reserve_exact(bytes.len())
            .map_err(|_| AllocError)?;
        self.storage.extend_from_slice(bytes);

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.storage
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.storage
    }

    /// Interprets the contents as UTF-8 text.
    ///
    /// Invalid sequences are replaced with `U+FFFD`. Valid input is reused
    /// without copying.
    pub fn into_text(self) -> String {
        match String::from_utf8(self.storage) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        }
    }

    /// Frees the storage.
    pub fn release(self) {}
}
