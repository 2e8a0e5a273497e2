//! Archive parsing, lookup, and write-out.
//!
//! On disk the index is little-endian: a `u32` holding `count + 1`, then
//! per entry a `u32` start offset and a NUL-padded name, then one final
//! `u32` recording the total file length. Entry lengths are implicit in
//! the gap to the next recorded offset; the final record is the
//! end-of-file sentinel, not a real entry.

use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, trace};

use crate::entry::{Entry, MAX_NAME_LEN};
use crate::error::{Error, Result};
use crate::source::BackingSource;
use crate::stream::EntryStream;

/// On-disk index flavor.
///
/// Save and compile always emit `Legacy`; `Extended` exists only to read
/// the newer client's data files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexFormat {
    /// `u32` offset + 13-byte NUL-padded name per entry
    #[default]
    Legacy,
    /// `u32` offset + 12-byte name + 20 opaque bytes per entry
    Extended,
}

impl IndexFormat {
    fn name_field_len(self) -> usize {
        match self {
            Self::Legacy => MAX_NAME_LEN,
            Self::Extended => 12,
        }
    }

    fn trailer_len(self) -> usize {
        match self {
            Self::Legacy => 0,
            Self::Extended => 20,
        }
    }
}

/// An indexed `.dat` container over one backing byte source.
///
/// Entries are keyed case-insensitively and iterate in index order.
/// Owned-backing archives support patch-append and save; memory-mapped
/// archives are read-only.
pub struct Archive {
    backing: Option<BackingSource>,
    entries: Vec<Entry>,
}

impl Archive {
    /// An empty in-memory archive.
    pub fn new() -> Self {
        // The canonical zero-entry layout: count field 1, final offset 8.
        let buffer = vec![1, 0, 0, 0, 8, 0, 0, 0];
        Self {
            backing: Some(BackingSource::Owned(buffer)),
            entries: Vec::new(),
        }
    }

    /// Take ownership of `bytes` and parse its legacy index.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with_format(bytes, IndexFormat::Legacy)
    }

    /// Take ownership of `bytes` and parse its index as `format`.
    pub fn from_bytes_with_format(bytes: Vec<u8>, format: IndexFormat) -> Result<Self> {
        let entries = parse_index(&bytes, format)?;
        Ok(Self {
            backing: Some(BackingSource::Owned(bytes)),
            entries,
        })
    }

    /// Read `path` into an owned, patchable buffer.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_format(path, IndexFormat::Legacy)
    }

    /// Read `path` into an owned buffer, parsing its index as `format`.
    pub fn load_with_format(path: &Path, format: IndexFormat) -> Result<Self> {
        debug!("loading archive {}", path.display());
        Self::from_bytes_with_format(fs::read(path)?, format)
    }

    /// Map `path` read-only. Lookups slice the map directly; patch and
    /// save are rejected with [`Error::ReadOnlyArchive`].
    pub fn load_mapped(path: &Path) -> Result<Self> {
        Self::load_mapped_with_format(path, IndexFormat::Legacy)
    }

    /// Map `path` read-only, parsing its index as `format`.
    pub fn load_mapped_with_format(path: &Path, format: IndexFormat) -> Result<Self> {
        let backing = BackingSource::open_mapped(path)?;
        let entries = parse_index(backing.as_bytes(), format)?;
        Ok(Self {
            backing: Some(backing),
            entries,
        })
    }

    /// Build an in-memory archive from every file in `dir`, in the order
    /// the OS enumerates them. Re-packing a specific legacy archive
    /// byte-exactly requires staging files so that order matches.
    pub fn from_directory(dir: &Path) -> Result<Self> {
        let mut parts = Vec::new();
        for dir_entry in fs::read_dir(dir)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            if !path.is_file() {
                continue;
            }
            let name = dir_entry.file_name().into_string().map_err(|name| {
                Error::MalformedFrame(format!("file name {name:?} is not valid UTF-8"))
            })?;
            parts.push((name, fs::read(&path)?));
        }
        debug!("building archive from {} ({} files)", dir.display(), parts.len());

        let borrowed: Vec<(&str, &[u8])> = parts
            .iter()
            .map(|(name, payload)| (name.as_str(), payload.as_slice()))
            .collect();
        Self::from_bytes(write_canonical(&borrowed)?)
    }

    /// Re-pack every file in `from_dir` into a canonical archive at
    /// `to_path`.
    pub fn compile(from_dir: &Path, to_path: &Path) -> Result<()> {
        Self::from_directory(from_dir)?.save(to_path)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in index order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Look up an entry by name, case-insensitively.
    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.matches(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    /// Whether the backing source is a read-only memory map.
    pub fn is_mapped(&self) -> bool {
        matches!(self.backing, Some(ref backing) if backing.is_mapped())
    }

    /// The entry's payload bytes.
    pub fn entry_data(&self, entry: &Entry) -> Result<&[u8]> {
        self.backing()?
            .slice(entry.offset as usize, entry.length as usize)
    }

    /// A seekable read-only view over the entry's payload.
    pub fn entry_stream(&self, entry: &Entry) -> Result<EntryStream<'_>> {
        Ok(EntryStream::new(self.entry_data(entry)?))
    }

    /// Append `payload` to the backing buffer under `name`.
    ///
    /// An existing entry of that name is replaced at its original index
    /// position; otherwise the entry is appended. The replaced entry's old
    /// bytes stay in the buffer unreclaimed until the next save. Owned
    /// backing only.
    pub fn patch(&mut self, name: &str, payload: &[u8]) -> Result<()> {
        check_name(name)?;
        let backing = self.backing.as_mut().ok_or(Error::Disposed)?;
        let offset = backing.append(payload)?;
        let entry = Entry {
            name: name.to_string(),
            offset,
            length: payload.len() as u32,
        };

        trace!("patched {name:?}: {} bytes at offset {offset}", payload.len());
        match self.entries.iter().position(|existing| existing.matches(name)) {
            Some(index) => self.entries[index] = entry,
            None => self.entries.push(entry),
        }
        Ok(())
    }

    /// Write each entry verbatim as `dir/<name>`.
    pub fn extract_to(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        for entry in &self.entries {
            let data = self.entry_data(entry)?;
            fs::write(dir.join(&entry.name), data)?;
            trace!("extracted {:?} ({} bytes)", entry.name, data.len());
        }
        debug!("extracted {} entries to {}", self.entries.len(), dir.display());
        Ok(())
    }

    /// Re-pack all entries contiguously into the canonical layout at
    /// `path`. Owned backing only.
    pub fn save(&self, path: &Path) -> Result<()> {
        let backing = self.backing()?;
        if backing.is_mapped() {
            return Err(Error::ReadOnlyArchive);
        }

        let mut parts = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            parts.push((entry.name.as_str(), self.entry_data(entry)?));
        }
        let bytes = write_canonical(&parts)?;
        fs::write(path, &bytes)?;
        debug!(
            "saved {} entries ({} bytes) to {}",
            self.entries.len(),
            bytes.len(),
            path.display()
        );
        Ok(())
    }

    /// Release the backing source. Every later operation that touches it
    /// fails with [`Error::Disposed`].
    pub fn close(&mut self) {
        self.backing = None;
    }

    fn backing(&self) -> Result<&BackingSource> {
        self.backing.as_ref().ok_or(Error::Disposed)
    }
}

impl Default for Archive {
    fn default() -> Self {
        Self::new()
    }
}

/// Reject names the index cannot record.
fn check_name(name: &str) -> Result<()> {
    if !name.is_ascii() {
        return Err(Error::MalformedFrame(format!(
            "entry name {name:?} is not ASCII"
        )));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::NameTooLong {
            name: name.to_string(),
            len: name.len(),
        });
    }
    Ok(())
}

/// Emit the canonical legacy layout for `(name, payload)` pairs.
fn write_canonical(parts: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let header_len = 4 + parts.len() * (4 + MAX_NAME_LEN) + 4;
    let total = header_len + parts.iter().map(|(_, payload)| payload.len()).sum::<usize>();

    let mut out = Vec::with_capacity(total);
    out.write_u32::<LittleEndian>(parts.len() as u32 + 1)?;
    let mut offset = header_len as u32;
    for (name, payload) in parts {
        check_name(name)?;
        out.write_u32::<LittleEndian>(offset)?;
        let mut field = [0u8; MAX_NAME_LEN];
        field[..name.len()].copy_from_slice(name.as_bytes());
        out.extend_from_slice(&field);
        offset += payload.len() as u32;
    }
    // The sentinel record: total file length.
    out.write_u32::<LittleEndian>(total as u32)?;
    for (_, payload) in parts {
        out.extend_from_slice(payload);
    }
    Ok(out)
}

fn read_u32(cursor: &mut Cursor<&[u8]>, what: &str) -> Result<u32> {
    cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| Error::MalformedFrame(format!("index truncated reading {what}")))
}

/// Walk the index and derive entry lengths from consecutive offsets.
fn parse_index(bytes: &[u8], format: IndexFormat) -> Result<Vec<Entry>> {
    let mut cursor = Cursor::new(bytes);
    let recorded = read_u32(&mut cursor, "entry count")?;
    if recorded == 0 {
        return Err(Error::MalformedFrame("entry count field is zero".into()));
    }
    let count = (recorded - 1) as usize;

    // Never trust the count field further than the buffer can back it.
    let entry_header_len = 4 + format.name_field_len() + format.trailer_len();
    let index_len = count
        .checked_mul(entry_header_len)
        .and_then(|n| n.checked_add(8));
    match index_len {
        Some(index_len) if index_len <= bytes.len() => {}
        _ => {
            return Err(Error::MalformedFrame(format!(
                "index of {count} entries does not fit {} backing bytes",
                bytes.len()
            )));
        }
    }

    let mut heads = Vec::with_capacity(count);
    let mut name_field = [0u8; MAX_NAME_LEN];
    let mut trailer = [0u8; 20];
    for _ in 0..count {
        let offset = read_u32(&mut cursor, "entry offset")?;
        let field = &mut name_field[..format.name_field_len()];
        cursor
            .read_exact(field)
            .map_err(|_| Error::MalformedFrame("index truncated reading entry name".into()))?;
        cursor
            .read_exact(&mut trailer[..format.trailer_len()])
            .map_err(|_| Error::MalformedFrame("index truncated reading entry trailer".into()))?;

        let name_end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        let name = &field[..name_end];
        if !name.is_ascii() {
            return Err(Error::MalformedFrame(format!(
                "entry name {name:02x?} is not ASCII"
            )));
        }
        let name = String::from_utf8(name.to_vec())
            .map_err(|_| Error::MalformedFrame("entry name is not valid UTF-8".into()))?;
        heads.push((name, offset));
    }

    let final_offset = read_u32(&mut cursor, "final offset")?;
    if final_offset as usize != bytes.len() {
        return Err(Error::MalformedFrame(format!(
            "final offset {final_offset} does not match backing length {}",
            bytes.len()
        )));
    }

    let mut entries: Vec<Entry> = Vec::with_capacity(count);
    for (index, (name, offset)) in heads.iter().enumerate() {
        let end = if index + 1 < count {
            heads[index + 1].1
        } else {
            final_offset
        };
        if end < *offset {
            return Err(Error::MalformedFrame(format!(
                "entry {name:?} has non-monotonic range {offset}..{end}"
            )));
        }
        if entries.iter().any(|existing| existing.matches(name)) {
            return Err(Error::MalformedFrame(format!(
                "duplicate entry name {name:?}"
            )));
        }
        entries.push(Entry {
            name: name.clone(),
            offset: *offset,
            length: end - offset,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_archive_is_canonical_eight_bytes() {
        let archive = Archive::new();
        assert!(archive.is_empty());
        assert_eq!(write_canonical(&[]).unwrap(), vec![1, 0, 0, 0, 8, 0, 0, 0]);
    }

    #[test]
    fn canonical_layout_offsets() {
        let bytes = write_canonical(&[("a.txt", b"hello")]).unwrap();
        // count field 2: one entry plus the sentinel
        assert_eq!(&bytes[0..4], &[2, 0, 0, 0]);
        // entry offset: 4 + 17 + 4 header bytes
        assert_eq!(&bytes[4..8], &[25, 0, 0, 0]);
        assert_eq!(&bytes[8..13], b"a.txt");
        assert_eq!(bytes[13], 0);
        // sentinel: total length
        assert_eq!(&bytes[21..25], &[30, 0, 0, 0]);
        assert_eq!(&bytes[25..], b"hello");
        assert_eq!(bytes.len(), 30);
    }

    #[test]
    fn parse_round_trips_canonical_layout() {
        let bytes = write_canonical(&[("a.txt", b"hello"), ("b.bin", &[1, 2, 3])]).unwrap();
        let archive = Archive::from_bytes(bytes).unwrap();
        assert_eq!(archive.len(), 2);

        let entry = archive.entry("a.txt").unwrap();
        assert_eq!(entry.length, 5);
        assert_eq!(archive.entry_data(entry).unwrap(), b"hello");

        let entry = archive.entry("B.BIN").unwrap();
        assert_eq!(archive.entry_data(entry).unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn rejects_zero_count_field() {
        let bytes = vec![0, 0, 0, 0, 8, 0, 0, 0];
        assert!(matches!(
            Archive::from_bytes(bytes),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn rejects_truncated_index() {
        // Count field promises an entry the buffer does not hold.
        let bytes = vec![2, 0, 0, 0, 25, 0, 0, 0];
        assert!(matches!(
            Archive::from_bytes(bytes),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn rejects_final_offset_mismatch() {
        let mut bytes = write_canonical(&[("a.txt", b"hello")]).unwrap();
        bytes.push(0xFF);
        assert!(matches!(
            Archive::from_bytes(bytes),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn rejects_non_monotonic_offsets() {
        let mut bytes = write_canonical(&[("a.txt", b"hello"), ("b.bin", &[1, 2, 3])]).unwrap();
        // Swap the recorded offsets of the two entries.
        bytes[4] = 47; // a.txt now starts where b.bin did
        bytes[21] = 42;
        assert!(matches!(
            Archive::from_bytes(bytes),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn rejects_duplicate_names() {
        let bytes = write_canonical(&[("a.txt", b"one"), ("A.TXT", b"two")]).unwrap();
        assert!(matches!(
            Archive::from_bytes(bytes),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn name_checks() {
        assert!(check_name("a.txt").is_ok());
        assert!(check_name("exactly13char").is_ok());
        assert!(matches!(
            check_name("fourteen-chars"),
            Err(Error::NameTooLong { len: 14, .. })
        ));
        assert!(matches!(
            check_name("café"),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn extended_format_entry_headers() {
        // 12-byte name plus 20 opaque bytes per entry.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2u32.to_le_bytes());
        let header_len = 4 + (4 + 12 + 20) + 4;
        bytes.extend_from_slice(&(header_len as u32).to_le_bytes());
        bytes.extend_from_slice(b"sprite.epf\0\0");
        bytes.extend_from_slice(&[0xAB; 20]);
        bytes.extend_from_slice(&((header_len + 3) as u32).to_le_bytes());
        bytes.extend_from_slice(&[7, 8, 9]);

        let archive = Archive::from_bytes_with_format(bytes, IndexFormat::Extended).unwrap();
        assert_eq!(archive.len(), 1);
        let entry = archive.entry("sprite.epf").unwrap();
        assert_eq!(archive.entry_data(entry).unwrap(), &[7, 8, 9]);
    }
}
