use bytes::{Buf, BufMut, Bytes, BytesMut};

/// This enumeration is the list of the possible error outcomes for
/// message serialization
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Not enough room left in the destination buffer
    #[error("buffer overflow: need {needed} bytes, {available} available")]
    Overflow {
        /// Bytes the write needed
        needed: usize,
        /// Bytes left before the limit
        available: usize,
    },
    /// Source ended before the value was complete
    #[error("truncated input: need {needed} bytes, have {have}")]
    Truncated {
        /// Bytes the read needed
        needed: usize,
        /// Bytes left in the source
        have: usize,
    },
    /// Source contained a value that cannot be decoded
    #[error("invalid data: {0}")]
    Invalid(String),
}

/// Bounded destination buffer for message payloads
#[derive(Debug)]
pub struct WriteBuffer {
    inner: BytesMut,
    limit: usize,
}

macro_rules! put_impl {
    ($($(#[$attr:meta])* $name:ident($ty:ty) => $put:ident;)*) => {
        $(
            $(#[$attr])*
            pub fn $name(&mut self, value: $ty) -> Result<(), CodecError> {
                self.reserve(::std::mem::size_of::<$ty>())?;
                self.inner.$put(value);
                Ok(())
            }
        )*
    };
}

impl WriteBuffer {
    /// Creates an empty buffer accepting at most `limit` bytes
    pub fn new(limit: usize) -> Self {
        Self::from_bytes_mut(BytesMut::new(), limit)
    }

    /// Wraps storage obtained from an allocator
    ///
    /// Existing content of `inner` is discarded
    pub fn from_bytes_mut(mut inner: BytesMut, limit: usize) -> Self {
        inner.clear();
        Self { inner, limit }
    }

    /// Written bytes
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if nothing was written
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Bytes that can still be written
    pub fn available(&self) -> usize {
        self.limit.saturating_sub(self.inner.len())
    }

    /// Written bytes as a slice
    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }

    /// Converts into an immutable buffer
    pub fn freeze(self) -> Bytes {
        self.inner.freeze()
    }

    /// Releases the underlying storage
    pub fn into_inner(self) -> BytesMut {
        self.inner
    }

    fn reserve(&mut self, needed: usize) -> Result<(), CodecError> {
        let available = self.available();
        if needed > available {
            return Err(CodecError::Overflow { needed, available });
        }
        Ok(())
    }

    put_impl! {
        /// Writes a `u8`
        put_u8(u8) => put_u8;
        /// Writes a little-endian `u16`
        put_u16(u16) => put_u16_le;
        /// Writes a little-endian `u32`
        put_u32(u32) => put_u32_le;
        /// Writes a little-endian `u64`
        put_u64(u64) => put_u64_le;
        /// Writes a little-endian `i32`
        put_i32(i32) => put_i32_le;
        /// Writes a little-endian `i64`
        put_i64(i64) => put_i64_le;
        /// Writes a little-endian `f32`
        put_f32(f32) => put_f32_le;
        /// Writes a little-endian `f64`
        put_f64(f64) => put_f64_le;
    }

    /// Writes a `bool` as one byte
    pub fn put_bool(&mut self, value: bool) -> Result<(), CodecError> {
        self.put_u8(value as u8)
    }

    /// Writes bytes without a length prefix
    pub fn put_slice(&mut self, value: &[u8]) -> Result<(), CodecError> {
        self.reserve(value.len())?;
        self.inner.put_slice(value);
        Ok(())
    }

    /// Writes a `u32` length prefix followed by the bytes
    pub fn put_bytes(&mut self, value: &[u8]) -> Result<(), CodecError> {
        let len = u32::try_from(value.len())
            .map_err(|_| CodecError::Invalid(format!("{} bytes exceed u32", value.len())))?;
        self.reserve(4 + value.len())?;
        self.inner.put_u32_le(len);
        self.inner.put_slice(value);
        Ok(())
    }

    /// Writes a length-prefixed UTF-8 string
    pub fn put_str(&mut self, value: &str) -> Result<(), CodecError> {
        self.put_bytes(value.as_bytes())
    }

    pub(crate) fn patch_u32(&mut self, at: usize, value: u32) {
        self.inner[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }
}

/// Source buffer for message payloads
#[derive(Debug, Clone)]
pub struct ReadBuffer<'a> {
    inner: &'a [u8],
}

macro_rules! get_impl {
    ($($(#[$attr:meta])* $name:ident($ty:ty) => $get:ident;)*) => {
        $(
            $(#[$attr])*
            pub fn $name(&mut self) -> Result<$ty, CodecError> {
                self.ensure(::std::mem::size_of::<$ty>())?;
                Ok(self.inner.$get())
            }
        )*
    };
}

impl<'a> ReadBuffer<'a> {
    /// Reads from `inner`
    pub fn new(inner: &'a [u8]) -> Self {
        Self { inner }
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.inner.len()
    }

    /// Unread bytes
    pub fn as_slice(&self) -> &'a [u8] {
        self.inner
    }

    fn ensure(&self, needed: usize) -> Result<(), CodecError> {
        if needed > self.inner.len() {
            return Err(CodecError::Truncated {
                needed,
                have: self.inner.len(),
            });
        }
        Ok(())
    }

    get_impl! {
        /// Reads a `u8`
        get_u8(u8) => get_u8;
        /// Reads a little-endian `u16`
        get_u16(u16) => get_u16_le;
        /// Reads a little-endian `u32`
        get_u32(u32) => get_u32_le;
        /// Reads a little-endian `u64`
        get_u64(u64) => get_u64_le;
        /// Reads a little-endian `i32`
        get_i32(i32) => get_i32_le;
        /// Reads a little-endian `i64`
        get_i64(i64) => get_i64_le;
        /// Reads a little-endian `f32`
        get_f32(f32) => get_f32_le;
        /// Reads a little-endian `f64`
        get_f64(f64) => get_f64_le;
    }

    /// Reads a one-byte `bool`, rejecting values other than 0 and 1
    pub fn get_bool(&mut self) -> Result<bool, CodecError> {
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::Invalid(format!("bool byte {}", other))),
        }
    }

    /// Reads exactly `len` bytes
    pub fn get_slice(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        self.ensure(len)?;
        let (head, tail) = self.inner.split_at(len);
        self.inner = tail;
        Ok(head)
    }

    /// Reads a `u32` length prefix followed by the bytes
    pub fn get_bytes(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.get_u32()? as usize;
        self.get_slice(len)
    }

    /// Reads a length-prefixed UTF-8 string
    pub fn get_str(&mut self) -> Result<&'a str, CodecError> {
        let bytes = self.get_bytes()?;
        std::str::from_utf8(bytes).map_err(|e| CodecError::Invalid(e.to_string()))
    }

    /// Fails unless every byte has been consumed
    pub fn finish(&self) -> Result<(), CodecError> {
        if !self.inner.is_empty() {
            return Err(CodecError::Invalid(format!(
                "{} trailing bytes",
                self.inner.len()
            )));
        }
        Ok(())
    }
}
