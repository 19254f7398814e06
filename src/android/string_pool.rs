use crate::android::chunk::{
    align_to_four, begin_chunk, finalize_chunk, write_u16, write_u32, BinaryReader, ChunkHeader,
    NO_ENTRY_INDEX, RES_STRING_POOL_TYPE,
};
use crate::android::error::AxmlResult;
use bitflags::bitflags;
use std::collections::HashMap;

const STRING_POOL_HEADER_SIZE: u16 = 28;

bitflags! {
    /// `ResStringPool_header::flags`
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub(crate) struct StringPoolFlags: u32 {
        const SORTED = 0x0000_0001;
        const UTF8 = 0x0000_0100;
    }
}

/// A decoded string pool chunk.
pub(crate) struct StringPool {
    strings: Vec<String>,
}

impl StringPool {
    pub fn parse(reader: &mut BinaryReader<'_>, header: &ChunkHeader) -> AxmlResult<Self> {
        let string_count = reader.read_u32()? as usize;
        let style_count = reader.read_u32()? as usize;
        let flags = StringPoolFlags::from_bits_retain(reader.read_u32()?);
        let strings_start = reader.read_u32()? as usize;
        let _styles_start = reader.read_u32()?;

        reader.seek(header.body_start())?;
        let mut string_offsets = Vec::with_capacity(string_count.min(reader.remaining() / 4));
        for _ in 0..string_count {
            string_offsets.push(reader.read_u32()? as usize);
        }
        for _ in 0..style_count {
            reader.read_u32()?; // style offsets are not needed for manifests
        }

        let strings_base = header.start + strings_start;
        let chunk_end = header.end();
        let utf8 = flags.contains(StringPoolFlags::UTF8);

        let mut strings = Vec::with_capacity(string_offsets.len());
        for offset in string_offsets {
            let absolute = strings_base
                .checked_add(offset)
                .ok_or_else(|| malformed!("String offset overflow"))?;
            let text = if utf8 {
                read_utf8_string(reader.data(), absolute, chunk_end)?
            } else {
                read_utf16_string(reader.data(), absolute, chunk_end)?
            };
            strings.push(text);
        }

        Ok(StringPool { strings })
    }

    /// Resolves an optional reference; `NO_ENTRY_INDEX` is `None`, anything else must exist.
    pub fn get_optional(&self, idx: u32) -> AxmlResult<Option<&str>> {
        if idx == NO_ENTRY_INDEX {
            return Ok(None);
        }
        self.get(idx).map(Some)
    }

    pub fn get(&self, idx: u32) -> AxmlResult<&str> {
        self.strings
            .get(idx as usize)
            .map(|s| s.as_str())
            .ok_or_else(|| {
                malformed!(
                    "String index {} out of range (pool has {} entries)",
                    idx,
                    self.strings.len()
                )
            })
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }
}

fn read_utf8_string(data: &[u8], offset: usize, limit: usize) -> AxmlResult<String> {
    let mut cursor = offset;
    let (_char_len, len_bytes) = read_utf8_length(data, cursor, limit)?;
    cursor += len_bytes;
    let (byte_len, byte_len_size) = read_utf8_length(data, cursor, limit)?;
    cursor += byte_len_size;
    if cursor + byte_len >= limit {
        fail!("UTF-8 string at offset {} exceeds chunk bounds", offset);
    }
    let text = std::str::from_utf8(&data[cursor..cursor + byte_len])
        .map_err(|err| malformed!("Invalid UTF-8 string at offset {}: {}", offset, err))?;
    Ok(text.to_string())
}

fn read_utf16_string(data: &[u8], offset: usize, limit: usize) -> AxmlResult<String> {
    let mut cursor = offset;
    let (char_count, header_bytes) = read_utf16_length(data, cursor, limit)?;
    cursor += header_bytes;
    let byte_len = char_count * 2;
    if cursor + byte_len + 2 > limit {
        fail!("UTF-16 string at offset {} exceeds chunk bounds", offset);
    }
    let units: Vec<u16> = data[cursor..cursor + byte_len]
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units)
        .map_err(|err| malformed!("Invalid UTF-16 string at offset {}: {}", offset, err))
}

fn read_utf8_length(data: &[u8], offset: usize, limit: usize) -> AxmlResult<(usize, usize)> {
    if offset >= limit {
        fail!("Invalid UTF-8 length offset {}", offset);
    }
    let first = data[offset];
    if (first & 0x80) == 0 {
        Ok((first as usize, 1))
    } else {
        if offset + 1 >= limit {
            fail!("Truncated UTF-8 length at offset {}", offset);
        }
        let second = data[offset + 1];
        Ok(((((first & 0x7F) as usize) << 8) | second as usize, 2))
    }
}

fn read_utf16_length(data: &[u8], offset: usize, limit: usize) -> AxmlResult<(usize, usize)> {
    if offset + 2 > limit {
        fail!("Invalid UTF-16 length offset {}", offset);
    }
    let first = u16::from_le_bytes([data[offset], data[offset + 1]]);
    if (first & 0x8000) == 0 {
        Ok((first as usize, 2))
    } else {
        if offset + 4 > limit {
            fail!("Truncated UTF-16 length at offset {}", offset);
        }
        let second = u16::from_le_bytes([data[offset + 2], data[offset + 3]]);
        Ok(((((first & 0x7FFF) as usize) << 16) | second as usize, 4))
    }
}

/// Builds the output string pool.
///
/// Attribute names that carry a resource id occupy the first slots, one per
/// distinct `(name, id)` pair, so that slot `i` lines up with entry `i` of the
/// resource map. Every other string is deduplicated by value after them.
pub(crate) struct StringPoolBuilder {
    strings: Vec<String>,
    resource_ids: Vec<u32>,
    resource_names: HashMap<(String, u32), u32>,
    plain: HashMap<String, u32>,
}

impl StringPoolBuilder {
    pub fn new() -> Self {
        StringPoolBuilder {
            strings: Vec::new(),
            resource_ids: Vec::new(),
            resource_names: HashMap::new(),
            plain: HashMap::new(),
        }
    }

    /// Must be called for every resource name before any [`Self::intern`].
    pub fn intern_resource_name(&mut self, name: &str, resource_id: u32) -> u32 {
        debug_assert!(self.plain.is_empty());
        if let Some(&idx) = self.resource_names.get(&(name.to_string(), resource_id)) {
            return idx;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(name.to_string());
        self.resource_ids.push(resource_id);
        self.resource_names.insert((name.to_string(), resource_id), idx);
        idx
    }

    pub fn intern(&mut self, value: &str) -> u32 {
        if let Some(&idx) = self.plain.get(value) {
            return idx;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(value.to_string());
        self.plain.insert(value.to_string(), idx);
        idx
    }

    pub fn resource_name_index(&self, name: &str, resource_id: u32) -> AxmlResult<u32> {
        self.resource_names
            .get(&(name.to_string(), resource_id))
            .copied()
            .ok_or_else(|| malformed!("Missing pool entry for attribute {} (0x{:08x})", name, resource_id))
    }

    pub fn index_of(&self, value: &str) -> AxmlResult<u32> {
        self.plain
            .get(value)
            .copied()
            .ok_or_else(|| malformed!("Missing pool entry for string {:?}", value))
    }

    pub fn optional_index_of(&self, value: Option<&str>) -> AxmlResult<u32> {
        match value {
            Some(value) => self.index_of(value),
            None => Ok(NO_ENTRY_INDEX),
        }
    }

    pub fn resource_ids(&self) -> &[u32] {
        &self.resource_ids
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn to_chunk(&self) -> Vec<u8> {
        let string_count = self.strings.len() as u32;
        let strings_start = STRING_POOL_HEADER_SIZE as u32 + string_count * 4;
        let mut string_data = Vec::new();
        let mut offsets = Vec::with_capacity(self.strings.len());
        for s in &self.strings {
            offsets.push(string_data.len() as u32);
            write_utf16_string(&mut string_data, s);
        }
        align_to_four(&mut string_data);

        let mut chunk = Vec::new();
        let start = begin_chunk(&mut chunk, RES_STRING_POOL_TYPE, STRING_POOL_HEADER_SIZE);
        write_u32(&mut chunk, string_count);
        write_u32(&mut chunk, 0); // style count
        write_u32(&mut chunk, StringPoolFlags::empty().bits()); // UTF-16
        write_u32(&mut chunk, if string_count == 0 { 0 } else { strings_start });
        write_u32(&mut chunk, 0); // stylesStart
        for offset in offsets {
            write_u32(&mut chunk, offset);
        }
        chunk.extend_from_slice(&string_data);
        finalize_chunk(&mut chunk, start);
        chunk
    }
}

fn write_utf16_string(buf: &mut Vec<u8>, text: &str) {
    let units: Vec<u16> = text.encode_utf16().collect();
    let len = units.len();
    if len < 0x8000 {
        write_u16(buf, len as u16);
    } else {
        write_u16(buf, 0x8000 | ((len >> 16) as u16 & 0x7FFF));
        write_u16(buf, (len & 0xFFFF) as u16);
    }
    for unit in units {
        write_u16(buf, unit);
    }
    write_u16(buf, 0);
}
