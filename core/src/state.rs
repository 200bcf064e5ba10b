//! Save-state plumbing.
//!
//! Save states are an exact byte layout, not a serialization format: every
//! component writes its fields big-endian through a [`StateWriter`] and
//! reads them back through a [`StateReader`]. A reader that runs off the
//! end of its input keeps returning zeros and reports failure through
//! [`StateReader::is_ok`], so loaders can validate once at the end instead
//! of threading errors through every field.

/// A component that can snapshot and restore its state.
pub trait Stateful {
    /// Append this component's state to `out`.
    fn save_state(&self, out: &mut StateWriter);

    /// Restore state previously written by [`Stateful::save_state`].
    /// Returns false when the data is truncated or inconsistent; the
    /// component's resulting state is unspecified in that case and the
    /// caller is expected to discard the whole load.
    fn load_state(&mut self, r: &mut StateReader) -> bool;
}

/// Big-endian byte sink for save states.
#[derive(Default)]
pub struct StateWriter {
    buf: Vec<u8>,
}

impl StateWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }
}

/// Big-endian byte cursor over a save-state section.
pub struct StateReader<'a> {
    data: &'a [u8],
    pos: usize,
    overrun: bool,
}

impl<'a> StateReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            overrun: false,
        }
    }

    /// True while every read so far stayed inside the input.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        !self.overrun
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> &'a [u8] {
        if self.data.len() - self.pos < n {
            self.overrun = true;
            self.pos = self.data.len();
            return &[];
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        slice
    }

    pub fn u8(&mut self) -> u8 {
        self.take(1).first().copied().unwrap_or(0)
    }

    pub fn bool(&mut self) -> bool {
        self.u8() != 0
    }

    pub fn u16(&mut self) -> u16 {
        match self.take(2).try_into() {
            Ok(b) => u16::from_be_bytes(b),
            Err(_) => 0,
        }
    }

    pub fn u32(&mut self) -> u32 {
        match self.take(4).try_into() {
            Ok(b) => u32::from_be_bytes(b),
            Err(_) => 0,
        }
    }

    pub fn u64(&mut self) -> u64 {
        match self.take(8).try_into() {
            Ok(b) => u64::from_be_bytes(b),
            Err(_) => 0,
        }
    }

    pub fn f64(&mut self) -> f64 {
        match self.take(8).try_into() {
            Ok(b) => f64::from_be_bytes(b),
            Err(_) => 0.0,
        }
    }

    /// Fill `out` from the stream. Leaves `out` zeroed past an overrun.
    pub fn bytes(&mut self, out: &mut [u8]) {
        let slice = self.take(out.len());
        if slice.len() == out.len() {
            out.copy_from_slice(slice);
        } else {
            out.fill(0);
        }
    }

    /// Borrow `n` raw bytes from the stream.
    pub fn slice(&mut self, n: usize) -> &'a [u8] {
        self.take(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let mut w = StateWriter::new();
        w.put_u8(0xAB);
        w.put_u16(0x1234);
        w.put_u32(0xDEAD_BEEF);
        w.put_u64(42);
        w.put_f64(1.5);
        w.put_bool(true);
        let bytes = w.into_bytes();

        let mut r = StateReader::new(&bytes);
        assert_eq!(r.u8(), 0xAB);
        assert_eq!(r.u16(), 0x1234);
        assert_eq!(r.u32(), 0xDEAD_BEEF);
        assert_eq!(r.u64(), 42);
        assert_eq!(r.f64(), 1.5);
        assert!(r.bool());
        assert!(r.is_ok());
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn overrun_reported() {
        let mut r = StateReader::new(&[0x01]);
        assert_eq!(r.u8(), 0x01);
        assert_eq!(r.u32(), 0);
        assert!(!r.is_ok());
    }

    #[test]
    fn big_endian_layout() {
        let mut w = StateWriter::new();
        w.put_u16(0x0102);
        assert_eq!(w.into_bytes(), vec![0x01, 0x02]);
    }
}
