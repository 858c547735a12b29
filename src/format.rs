//! Formatting into caller-provided byte buffers, for output that must not
//! touch the heap (diagnostics from inside the allocator, panics, early boot).

use core::fmt::{self, Write};

/// A fixed-size buffer you can write formatted strings into.
pub struct FmtBuf<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> FmtBuf<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        FmtBuf { buf, pos: 0 }
    }

    pub fn as_str(&self) -> &str {
        // Safety: we only ever write valid UTF-8 via `write_str`
        unsafe { core::str::from_utf8_unchecked(&self.buf[..self.pos]) }
    }

    pub fn into_str(self) -> &'a str {
        // Safety: as above
        unsafe { core::str::from_utf8_unchecked(&self.buf[..self.pos]) }
    }

    pub fn len(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    pub fn clear(&mut self) {
        self.pos = 0;
    }
}

impl<'a> Write for FmtBuf<'a> {
    /// Fails without writing anything if `s` does not fit.
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        if self.pos + bytes.len() > self.buf.len() {
            return Err(fmt::Error);
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }
}

/// `format!` without a heap: renders into `buf` and returns the text.
pub fn format_to<'a>(buf: &'a mut [u8], args: fmt::Arguments<'_>) -> Result<&'a str, fmt::Error> {
    let mut f = FmtBuf::new(buf);
    f.write_fmt(args)?;
    Ok(f.into_str())
}

#[macro_export]
macro_rules! format_no_std {
    ($buf:expr, $($arg:tt)*) => {
        $crate::format::format_to($buf, core::format_args!($($arg)*))
    };
}
