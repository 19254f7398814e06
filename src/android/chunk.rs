use crate::android::error::AxmlResult;

pub(crate) const RES_STRING_POOL_TYPE: u16 = 0x0001;
pub(crate) const RES_XML_TYPE: u16 = 0x0003;
pub(crate) const RES_XML_START_NAMESPACE_TYPE: u16 = 0x0100;
pub(crate) const RES_XML_END_NAMESPACE_TYPE: u16 = 0x0101;
pub(crate) const RES_XML_START_ELEMENT_TYPE: u16 = 0x0102;
pub(crate) const RES_XML_END_ELEMENT_TYPE: u16 = 0x0103;
pub(crate) const RES_XML_CDATA_TYPE: u16 = 0x0104;
pub(crate) const RES_XML_RESOURCE_MAP_TYPE: u16 = 0x0180;

pub(crate) const NO_ENTRY_INDEX: u32 = 0xFFFF_FFFF;

/// `ResChunk_header` (8 bytes) followed by `lineNumber` and `comment`.
pub(crate) const XML_NODE_HEADER_SIZE: u16 = 16;
pub(crate) const XML_HEADER_SIZE: u16 = 8;
pub(crate) const RESOURCE_MAP_HEADER_SIZE: u16 = 8;
pub(crate) const ATTRIBUTE_SIZE: u16 = 20;
/// `ResXMLTree_attrExt` without its trailing attributes.
pub(crate) const ATTRIBUTE_EXT_SIZE: u16 = 20;
pub(crate) const RES_VALUE_SIZE: u16 = 8;

pub(crate) const TYPE_REFERENCE: u8 = 0x01;
pub(crate) const TYPE_STRING: u8 = 0x03;
pub(crate) const TYPE_INT_DEC: u8 = 0x10;
pub(crate) const TYPE_INT_HEX: u8 = 0x11;
pub(crate) const TYPE_INT_BOOLEAN: u8 = 0x12;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ChunkHeader {
    pub chunk_type: u16,
    pub header_size: u16,
    pub chunk_size: u32,
    pub start: usize,
}

impl ChunkHeader {
    pub fn end(&self) -> usize {
        self.start + self.chunk_size as usize
    }

    pub fn body_start(&self) -> usize {
        self.start + self.header_size as usize
    }
}

pub(crate) struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
    limit: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BinaryReader {
            data,
            pos: 0,
            limit: data.len(),
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.pos)
    }

    /// Restricts further reads to `[.., limit)`; chunks never read past their parent.
    pub fn set_limit(&mut self, limit: usize) -> AxmlResult<()> {
        if limit > self.data.len() {
            fail!("Limit {} exceeds document length {}", limit, self.data.len());
        }
        self.limit = limit;
        Ok(())
    }

    fn take(&mut self, count: usize) -> AxmlResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(count)
            .ok_or_else(|| malformed!("Read offset overflow"))?;
        if end > self.limit {
            fail!("Unexpected end of binary XML at offset {}", self.pos);
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> AxmlResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> AxmlResult<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> AxmlResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn seek(&mut self, offset: usize) -> AxmlResult<()> {
        if offset > self.limit {
            fail!("Attempted to seek past end of chunk ({} > {})", offset, self.limit);
        }
        self.pos = offset;
        Ok(())
    }
}

pub(crate) fn read_chunk_header(reader: &mut BinaryReader<'_>) -> AxmlResult<ChunkHeader> {
    let start = reader.position();
    if reader.remaining() < 8 {
        fail!("Truncated chunk header at offset {}", start);
    }
    let chunk_type = reader.read_u16()?;
    let header_size = reader.read_u16()?;
    let chunk_size = reader.read_u32()?;
    if header_size < 8 || chunk_size < header_size as u32 {
        fail!(
            "Invalid sizing for chunk 0x{:04x} at offset {} (header {}, size {})",
            chunk_type,
            start,
            header_size,
            chunk_size
        );
    }
    let end = start
        .checked_add(chunk_size as usize)
        .ok_or_else(|| malformed!("Chunk size overflow"))?;
    if end > start + 8 + reader.remaining() {
        fail!("Chunk 0x{:04x} at offset {} extends past its container", chunk_type, start);
    }
    Ok(ChunkHeader {
        chunk_type,
        header_size,
        chunk_size,
        start,
    })
}

pub(crate) fn write_u8(buf: &mut Vec<u8>, value: u8) {
    buf.push(value);
}

pub(crate) fn write_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn align_to_four(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

pub(crate) fn begin_chunk(buf: &mut Vec<u8>, chunk_type: u16, header_size: u16) -> usize {
    let start = buf.len();
    write_u16(buf, chunk_type);
    write_u16(buf, header_size);
    write_u32(buf, 0); // placeholder for chunk size
    start
}

pub(crate) fn finalize_chunk(buf: &mut Vec<u8>, chunk_start: usize) {
    align_to_four(buf);
    let size = (buf.len() - chunk_start) as u32;
    buf[chunk_start + 4..chunk_start + 8].copy_from_slice(&size.to_le_bytes());
}
