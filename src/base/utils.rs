use std::fmt;

/// Helper struct that wraps bytes and improves their [`std::fmt::Debug`] formatting.
/// Tries to print as many bytes as possible just like regular characters; others are escaped.
///
/// Contended keys are mostly binary, but usually end in human readable index values.
pub struct PrettyBytes<'a>(pub &'a [u8]);

impl fmt::Debug for PrettyBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b\"")?;
        for &b in self.0 {
            match b {
                b'"' | b'\\' => write!(f, "\\{}", b as char)?,
                // human readable symbols, alphabet, etc
                b' '..=b'~' => write!(f, "{}", b as char)?,
                // other bytes, like enter/backspace/newline
                _ => write!(f, "\\x{:02x}", b)?,
            }
        }
        write!(f, "\"")
    }
}

macro_rules! impl_hex {
    ($name:ident, $type:ty) => {
        pub struct $name(pub $type);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(
                    f,
                    "0x{:0>width$x}",
                    self.0,
                    width = std::mem::size_of::<$type>() * 2
                )
            }
        }
    };
}

impl_hex!(HexU8, u8);
