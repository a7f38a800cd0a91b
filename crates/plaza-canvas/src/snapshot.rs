//! Gzip snapshots of a whole key-value store.
//!
//! Layout after decompression: a `PLZ1` magic, then one record per key:
//! `u16 key length | key bytes | u32 value length | value bytes`, all big
//! endian, until end of stream.

use crate::backend::KeyValueStore;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use plaza_common::{PlazaError, Result};
use plaza_logger::{log, LogSeverity::*};
use std::io::{self, ErrorKind, Read, Write};
use std::path::Path;

const MAGIC: &[u8; 4] = b"PLZ1";

pub fn encode(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(MAGIC)?;
    for (key, value) in entries {
        let key_len = u16::try_from(key.len())
            .map_err(|_| PlazaError::Storage(format!("key too long: {}", key.len())))?;
        let value_len = u32::try_from(value.len())
            .map_err(|_| PlazaError::Storage(format!("value of {} too long", key)))?;
        encoder.write_u16::<BigEndian>(key_len)?;
        encoder.write_all(key.as_bytes())?;
        encoder.write_u32::<BigEndian>(value_len)?;
        encoder.write_all(value)?;
    }
    Ok(encoder.finish()?)
}

pub fn decode(data: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    let mut decoder = GzDecoder::new(data);
    let mut magic = [0u8; 4];
    decoder.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(PlazaError::Storage("not a canvas snapshot".to_owned()));
    }

    let mut entries = Vec::new();
    loop {
        let key_len = match decoder.read_u16::<BigEndian>() {
            Ok(len) => len as usize,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        let key = read_field(&mut decoder, key_len)?;
        let key = String::from_utf8(key)
            .map_err(|_| PlazaError::Storage("snapshot key is not utf-8".to_owned()))?;
        let value_len = decoder.read_u32::<BigEndian>()? as usize;
        let value = read_field(&mut decoder, value_len)?;
        entries.push((key, value));
    }
    Ok(entries)
}

/// Reads exactly `len` bytes. The buffer only grows with the data actually
/// present, so a corrupt length cannot force a huge allocation.
fn read_field(reader: &mut impl Read, len: usize) -> Result<Vec<u8>> {
    let mut field = Vec::new();
    reader.by_ref().take(len as u64).read_to_end(&mut field)?;
    if field.len() != len {
        return Err(io::Error::new(
            ErrorKind::UnexpectedEof,
            format!("snapshot record cut short: {} of {} bytes", field.len(), len),
        )
        .into());
    }
    Ok(field)
}

/// Writes every key under `prefix` to `path`, replacing the file atomically.
pub async fn save(store: &dyn KeyValueStore, prefix: &str, path: &Path) -> Result<usize> {
    let mut entries = Vec::new();
    for key in store.keys(prefix).await? {
        if let Some(value) = store.get(&key).await? {
            entries.push((key, value));
        }
    }
    let count = entries.len();
    let data = tokio::task::spawn_blocking(move || encode(&entries))
        .await
        .map_err(|e| PlazaError::Storage(format!("snapshot encoder panicked: {}", e)))??;

    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    log(format!("Saved {} keys to {}", count, path.display()), Debug);
    Ok(count)
}

/// Loads a snapshot into `store`. A missing file is an empty snapshot.
pub async fn load(store: &dyn KeyValueStore, path: &Path) -> Result<usize> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log(format!("No snapshot at {}, starting empty", path.display()), Info);
            return Ok(0);
        }
        Err(e) => return Err(e.into()),
    };
    let entries = tokio::task::spawn_blocking(move || decode(&data))
        .await
        .map_err(|e| PlazaError::Storage(format!("snapshot decoder panicked: {}", e)))??;
    let count = entries.len();
    for (key, value) in entries {
        store.set(&key, value).await?;
    }
    log(format!("Loaded {} keys from {}", count, path.display()), Info);
    Ok(count)
}
