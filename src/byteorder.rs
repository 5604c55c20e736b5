use std::io;

pub trait WriteBytesLe {
    fn write_le(&self, dst: &mut Vec<u8>);
}

pub trait ReadBytesLe: Sized {
    /// Reads `Self` from the front of `src`, advancing it.
    fn read_le(src: &mut &[u8]) -> io::Result<Self>;
}

fn take<'a>(src: &mut &'a [u8], len: usize) -> io::Result<&'a [u8]> {
    if src.len() < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("need {len} bytes, {} left", src.len()),
        ));
    }
    let (head, tail) = src.split_at(len);
    *src = tail;
    Ok(head)
}

macro_rules! impl_num_le {
    ($($t:ty),+) => { $(
        impl WriteBytesLe for $t {
            #[inline]
            fn write_le(&self, dst: &mut Vec<u8>) {
                dst.extend_from_slice(&self.to_le_bytes());
            }
        }
        impl ReadBytesLe for $t {
            #[inline]
            fn read_le(src: &mut &[u8]) -> io::Result<Self> {
                let mut bytes = [0u8; size_of::<$t>()];
                bytes.copy_from_slice(take(src, size_of::<$t>())?);
                Ok(<$t>::from_le_bytes(bytes))
            }
        }
    )+ }
}

impl_num_le!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl<T: WriteBytesLe> WriteBytesLe for [T] {
    #[inline]
    fn write_le(&self, dst: &mut Vec<u8>) {
        self.iter().for_each(|item| item.write_le(dst));
    }
}

impl<T: WriteBytesLe, const N: usize> WriteBytesLe for [T; N] {
    #[inline]
    fn write_le(&self, dst: &mut Vec<u8>) {
        self.as_slice().write_le(dst);
    }
}

/// Byte arrays hold tags and magic numbers, copied as-is.
impl<const N: usize> ReadBytesLe for [u8; N] {
    fn read_le(src: &mut &[u8]) -> io::Result<Self> {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(take(src, N)?);
        Ok(bytes)
    }
}

#[macro_export]
macro_rules! join_bytes_le {
    ( $($value:expr),+ $(,)? ) => {{
        let mut vec = Vec::<u8>::new();
        $( $crate::byteorder::WriteBytesLe::write_le(&$value, &mut vec); )+
        vec
    }};
}

#[cfg(test)]
mod tests {
    use crate::byteorder::{ReadBytesLe, WriteBytesLe};
    use voxlossd_macros::LeBytes;

    #[derive(Debug, PartialEq, LeBytes)]
    struct Mini {
        a: u16,
        b: u32,
        tag: [u8; 4],
    }

    #[derive(Debug, PartialEq, LeBytes)]
    struct Pair(i16, Mini);

    #[test]
    fn le_bytes_roundtrip() {
        let s = Mini {
            a: 0x1234,
            b: 0xABCDEF01,
            tag: *b"TEST",
        };

        let mut bytes = Vec::new();
        s.write_le(&mut bytes);
        let expected = [0x34, 0x12, 0x01, 0xEF, 0xCD, 0xAB, b'T', b'E', b'S', b'T'];
        assert_eq!(&bytes[..], &expected);

        let mut src = &bytes[..];
        assert_eq!(Mini::read_le(&mut src).unwrap(), s);
        assert!(src.is_empty());
    }

    #[test]
    fn nested_and_short_input() {
        let bytes = join_bytes_le!(-2i16, 7u16, 9u32, *b"abcd");
        assert_eq!(bytes.len(), 12);

        let pair = Pair::read_le(&mut &bytes[..]).unwrap();
        assert_eq!(pair.0, -2);
        assert_eq!(pair.1.tag, *b"abcd");

        let err = Pair::read_le(&mut &bytes[..11]).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }
}
