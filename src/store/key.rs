use bytes::{BufMut, Bytes, BytesMut};

use super::StoreError;

const LEN_HEADER_SIZE: usize = std::mem::size_of::<u32>();

pub fn validate_prefix(prefix: &str) -> Result<(), StoreError> {
    if prefix.is_empty() {
        return Err(StoreError::EmptyPrefix);
    }

    if u32::try_from(prefix.len()).is_err() {
        return Err(StoreError::PrefixTooLong(prefix.len()));
    }

    Ok(())
}

/// Key range owning every entry of `prefix`: the prefix length as a big-endian
/// u32 followed by the prefix bytes. The length header keeps a prefix from
/// ever matching the start of another prefix's keys.
pub fn scope_key(prefix: &str) -> Bytes {
    let mut b = BytesMut::with_capacity(LEN_HEADER_SIZE + prefix.len());
    b.put_u32(prefix.len() as u32);
    b.extend_from_slice(prefix.as_bytes());
    b.freeze()
}

pub fn entry_key(scope: &[u8], line: &[u8]) -> Bytes {
    let mut b = BytesMut::with_capacity(scope.len() + line.len());
    b.extend_from_slice(scope);
    b.extend_from_slice(line);
    b.freeze()
}
