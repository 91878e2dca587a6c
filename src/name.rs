//! Raw filesystem names, preserved exactly as the kernel returned them.
//!
//! A [`Name`] stores the byte sequence (POSIX) or 16-bit code-unit sequence
//! (Windows) of a single directory entry, without a trailing NUL. Names that
//! cannot be decoded into text are still comparable, hashable, and printable
//! as an escaped dump; decoding is always an explicit operation.

use thiserror::Error;

/// A directory entry name in the platform's native filesystem encoding.
///
/// Never contains the platform separator or an embedded NUL; the kernel
/// does not produce such names. Equality and hashing are by raw content,
/// never by any decoded form.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Name {
    #[cfg(unix)]
    raw: Vec<u8>,
    #[cfg(windows)]
    raw: Vec<u16>,
}

/// A [`Name`] could not be decoded in the platform's filesystem encoding.
///
/// Carries the original name so callers can emit an escaped or hex dump.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("name {0:?} is not valid in the platform filesystem encoding")]
pub struct DecodeError(pub Name);

impl Name {
    /// Copies a name out of a NUL-terminated kernel buffer.
    ///
    /// Scans for the first NUL within `buf` and keeps everything before
    /// it; never reads past the end of the slice. If no NUL is present the
    /// whole slice is the name.
    #[cfg(unix)]
    pub(crate) fn from_nul_terminated(buf: &[u8]) -> Name {
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        Name { raw: buf[..end].to_vec() }
    }

    #[cfg(windows)]
    pub(crate) fn from_nul_terminated(buf: &[u16]) -> Name {
        let end = buf.iter().position(|&u| u == 0).unwrap_or(buf.len());
        Name { raw: buf[..end].to_vec() }
    }

    /// Builds a name from raw bytes.
    #[cfg(unix)]
    pub fn from_bytes(bytes: &[u8]) -> Name {
        Name { raw: bytes.to_vec() }
    }

    /// Builds a name from raw UTF-16 code units.
    #[cfg(windows)]
    pub fn from_wide(units: &[u16]) -> Name {
        Name { raw: units.to_vec() }
    }

    /// The raw bytes, exactly as returned by the kernel.
    #[cfg(unix)]
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// The raw UTF-16 code units, exactly as returned by the kernel.
    #[cfg(windows)]
    pub fn as_wide(&self) -> &[u16] {
        &self.raw
    }

    /// Number of raw units in the name.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// True iff the raw content is exactly `.` or `..`.
    ///
    /// Compared unit-by-unit; no decoding is involved.
    pub fn is_dot_or_dot_dot(&self) -> bool {
        const DOT: u8 = b'.';
        match self.raw.as_slice() {
            [a] => u32::from(*a) == u32::from(DOT),
            [a, b] => u32::from(*a) == u32::from(DOT) && u32::from(*b) == u32::from(DOT),
            _ => false,
        }
    }

    /// True iff the first unit of the name is the dot character.
    pub fn is_hidden_by_dot_prefix(&self) -> bool {
        self.raw.first().map_or(false, |&u| u32::from(u) == u32::from(b'.'))
    }

    /// Strict decode into text.
    ///
    /// Fails on invalid UTF-8 (POSIX) or lone surrogates (Windows). A
    /// `None` here means the name can only be handled in raw form.
    pub fn decode(&self) -> Option<String> {
        #[cfg(unix)]
        {
            std::str::from_utf8(&self.raw).ok().map(str::to_owned)
        }
        #[cfg(windows)]
        {
            String::from_utf16(&self.raw).ok()
        }
    }

    /// Lossy decode: invalid sequences become U+FFFD.
    ///
    /// The result is for display only. A lossy-decoded name joined back
    /// onto its parent does not necessarily reopen the same file.
    pub fn decode_lossy(&self) -> String {
        #[cfg(unix)]
        {
            String::from_utf8_lossy(&self.raw).into_owned()
        }
        #[cfg(windows)]
        {
            String::from_utf16_lossy(&self.raw)
        }
    }

    /// Decode that surfaces failure as a typed error carrying the name.
    pub fn decode_validating(&self) -> Result<String, DecodeError> {
        self.decode().ok_or_else(|| DecodeError(self.clone()))
    }

    /// Validates the name as a single path component and returns it as
    /// text: decodable, non-empty, no separator, no NUL.
    ///
    /// The kernel never hands out names violating the last three, but the
    /// checks stay explicit because the result is joined onto a parent
    /// path and passed back to syscalls.
    pub(crate) fn to_component(&self) -> Option<String> {
        let text = self.decode()?;
        if text.is_empty() || text.contains('\0') {
            return None;
        }
        #[cfg(unix)]
        let has_separator = text.contains('/');
        #[cfg(windows)]
        let has_separator = text.contains('/') || text.contains('\\');
        if has_separator {
            return None;
        }
        Some(text)
    }
}

impl std::fmt::Debug for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("\"")?;
        #[cfg(unix)]
        for &b in &self.raw {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        #[cfg(windows)]
        for piece in char::decode_utf16(self.raw.iter().copied()) {
            match piece {
                Ok(c) if c.is_ascii_graphic() || c == ' ' => write!(f, "{c}")?,
                Ok(c) => write!(f, "{}", c.escape_debug())?,
                Err(e) => write!(f, "\\u{{{:04x}}}", e.unpaired_surrogate())?,
            }
        }
        f.write_str("\"")
    }
}
