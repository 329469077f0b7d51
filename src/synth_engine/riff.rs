//! Minimal RIFF chunk reader over an in-memory byte slice.

use crate::synth_engine::errors::LoadError;

const HEADER_LEN: usize = 8;

/// A single RIFF chunk borrowed from the source data.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub id: [u8; 4],
    pub data: &'a [u8],
}

impl<'a> Chunk<'a> {
    /// Returns the list type and the list body when this is a `LIST` chunk.
    pub fn as_list(&self) -> Option<([u8; 4], &'a [u8])> {
        if &self.id != b"LIST" || self.data.len() < 4 {
            return None;
        }
        let mut list_type = [0u8; 4];
        list_type.copy_from_slice(&self.data[..4]);
        Some((list_type, &self.data[4..]))
    }
}

pub fn fourcc(id: &[u8; 4]) -> String {
    String::from_utf8_lossy(id).into_owned()
}

fn read_header(data: &[u8]) -> ([u8; 4], usize) {
    let mut id = [0u8; 4];
    id.copy_from_slice(&data[..4]);
    let size = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
    (id, size)
}

/// Validates the outer `RIFF` header and returns the form body.
pub fn read_form<'a>(data: &'a [u8], form: &[u8; 4]) -> Result<&'a [u8], LoadError> {
    if data.len() < HEADER_LEN + 4 {
        return Err(LoadError::Signature);
    }

    let (id, size) = read_header(data);
    if &id != b"RIFF" || &data[8..12] != form {
        return Err(LoadError::Signature);
    }

    let available = data.len() - HEADER_LEN;
    if size > available || size < 4 {
        return Err(LoadError::Truncated {
            chunk: fourcc(&id),
            needed: size,
            available,
        });
    }

    Ok(&data[HEADER_LEN + 4..HEADER_LEN + size])
}

/// Splits `data` into consecutive chunks.
///
/// Odd-sized chunks are followed by a pad byte. Fewer than eight trailing bytes
/// are ignored; a header announcing more bytes than remain is an error.
pub fn read_chunks(data: &[u8]) -> Result<Vec<Chunk<'_>>, LoadError> {
    let mut chunks = Vec::new();
    let mut offset = 0;

    while data.len() - offset >= HEADER_LEN {
        let (id, size) = read_header(&data[offset..]);
        let body_start = offset + HEADER_LEN;
        let available = data.len() - body_start;
        if size > available {
            return Err(LoadError::Truncated {
                chunk: fourcc(&id),
                needed: size,
                available,
            });
        }

        chunks.push(Chunk {
            id,
            data: &data[body_start..body_start + size],
        });

        offset = body_start + size + (size & 1);
        if offset > data.len() {
            break;
        }
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(id);
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(body);
        if body.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    #[test]
    fn test_read_chunks_with_padding() {
        let mut data = chunk(b"abcd", &[1, 2, 3]);
        data.extend(chunk(b"efgh", &[4, 5]));

        let chunks = read_chunks(&data).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(&chunks[0].id, b"abcd");
        assert_eq!(chunks[0].data, &[1, 2, 3]);
        assert_eq!(&chunks[1].id, b"efgh");
        assert_eq!(chunks[1].data, &[4, 5]);
    }

    #[test]
    fn test_read_chunks_truncated() {
        let mut data = chunk(b"abcd", &[1, 2, 3, 4]);
        data.truncate(data.len() - 2);

        let result = read_chunks(&data);
        assert!(matches!(result, Err(LoadError::Truncated { .. })));
    }

    #[test]
    fn test_list_chunk() {
        let mut body = b"INFO".to_vec();
        body.extend(chunk(b"INAM", b"Test\0\0"));
        let data = chunk(b"LIST", &body);

        let chunks = read_chunks(&data).unwrap();
        let (list_type, list_body) = chunks[0].as_list().unwrap();
        assert_eq!(&list_type, b"INFO");
        let inner = read_chunks(list_body).unwrap();
        assert_eq!(&inner[0].id, b"INAM");
    }

    #[test]
    fn test_read_form_signature() {
        let mut body = b"sfbk".to_vec();
        body.extend(chunk(b"abcd", &[0, 0]));
        let data = chunk(b"RIFF", &body);

        assert!(read_form(&data, b"sfbk").is_ok());
        assert!(matches!(
            read_form(&data, b"WAVE"),
            Err(LoadError::Signature)
        ));
        assert!(matches!(read_form(b"RIFF", b"sfbk"), Err(LoadError::Signature)));
    }
}
