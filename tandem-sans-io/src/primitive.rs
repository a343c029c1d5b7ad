// Copyright ⓒ 2025 Tandem Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Primitive wire types: big endian integers, length prefixed strings,
//! nullable byte sequences and counted arrays.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{Error, Result};

pub(crate) fn check(buf: &impl Buf, needed: usize) -> Result<()> {
    if buf.remaining() < needed {
        Err(Error::Incomplete {
            needed,
            remaining: buf.remaining(),
        })
    } else {
        Ok(())
    }
}

pub(crate) fn get_i16(buf: &mut impl Buf) -> Result<i16> {
    check(buf, size_of::<i16>()).map(|()| buf.get_i16())
}

pub(crate) fn get_i32(buf: &mut impl Buf) -> Result<i32> {
    check(buf, size_of::<i32>()).map(|()| buf.get_i32())
}

pub(crate) fn get_i64(buf: &mut impl Buf) -> Result<i64> {
    check(buf, size_of::<i64>()).map(|()| buf.get_i64())
}

pub(crate) fn put_string(buf: &mut BytesMut, s: &str) -> Result<()> {
    i16::try_from(s.len())
        .map_err(|_| Error::StringTooLong(s.len()))
        .map(|length| {
            buf.put_i16(length);
            buf.put_slice(s.as_bytes());
        })
}

pub(crate) fn get_string(buf: &mut impl Buf) -> Result<String> {
    let length = get_i16(buf)?;

    if length < 0 {
        return Err(Error::NullString);
    }

    let length = length as usize;
    check(buf, length)?;

    String::from_utf8(buf.copy_to_bytes(length).to_vec()).map_err(Into::into)
}

pub(crate) fn put_nullable_bytes(buf: &mut BytesMut, bytes: Option<&Bytes>) {
    match bytes {
        Some(bytes) => {
            buf.put_i32(bytes.len() as i32);
            buf.put_slice(bytes);
        }

        None => buf.put_i32(-1),
    }
}

pub(crate) fn get_nullable_bytes(buf: &mut impl Buf) -> Result<Option<Bytes>> {
    let length = get_i32(buf)?;

    if length < 0 {
        Ok(None)
    } else {
        let length = length as usize;
        check(buf, length)?;
        Ok(Some(buf.copy_to_bytes(length)))
    }
}

pub(crate) fn put_array<T>(
    buf: &mut BytesMut,
    items: &[T],
    mut encode: impl FnMut(&mut BytesMut, &T) -> Result<()>,
) -> Result<()> {
    buf.put_i32(items.len() as i32);

    for item in items {
        encode(buf, item)?;
    }

    Ok(())
}

pub(crate) fn get_array<B, T>(
    buf: &mut B,
    mut decode: impl FnMut(&mut B) -> Result<T>,
) -> Result<Vec<T>>
where
    B: Buf,
{
    let length = get_i32(buf)?;

    if length < 0 {
        return Err(Error::NullArray);
    }

    let mut items = Vec::with_capacity(length.min(1_024) as usize);

    for _ in 0..length {
        items.push(decode(buf)?);
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn string_round_trip() -> Result<()> {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "hello-5")?;

        let mut buf = buf.freeze();
        assert_eq!("hello-5", get_string(&mut buf)?);
        assert_eq!(0, buf.remaining());
        Ok(())
    }

    #[test]
    fn nullable_bytes_none() -> Result<()> {
        let mut buf = BytesMut::new();
        put_nullable_bytes(&mut buf, None);

        assert_eq!(None, get_nullable_bytes(&mut buf.freeze())?);
        Ok(())
    }

    #[test]
    fn short_buffer_is_incomplete() {
        let mut buf = Bytes::from_static(&[0, 0, 0]);

        assert!(matches!(
            get_i32(&mut buf),
            Err(Error::Incomplete {
                needed: 4,
                remaining: 3
            })
        ));
    }
}
