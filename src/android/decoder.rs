use crate::android::chunk::{
    read_chunk_header, BinaryReader, ChunkHeader, ATTRIBUTE_SIZE, RES_STRING_POOL_TYPE,
    RES_VALUE_SIZE, RES_XML_CDATA_TYPE, RES_XML_END_ELEMENT_TYPE, RES_XML_END_NAMESPACE_TYPE,
    RES_XML_RESOURCE_MAP_TYPE, RES_XML_START_ELEMENT_TYPE, RES_XML_START_NAMESPACE_TYPE,
    RES_XML_TYPE, TYPE_STRING,
};
use crate::android::error::AxmlResult;
use crate::android::event::{
    Attribute, AttributeValue, ElementEnd, ElementStart, Event, EventSink, Namespace, Text,
};
use crate::android::string_pool::StringPool;
use log::{debug, trace};

/// Streams a binary XML document into an [`EventSink`].
///
/// The decoder holds no state between calls; every [`AxmlDecoder::accept`]
/// walks the whole buffer again.
pub struct AxmlDecoder<'a> {
    data: &'a [u8],
}

/// Per-pass decoding state.
struct DecodeState {
    pool: Option<StringPool>,
    resource_map: Vec<u32>,
    open_namespaces: usize,
    open_elements: usize,
    root_seen: bool,
}

impl DecodeState {
    fn pool(&self, what: &str) -> AxmlResult<&StringPool> {
        self.pool
            .as_ref()
            .ok_or_else(|| malformed!("{} encountered before string pool", what))
    }
}

impl<'a> AxmlDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        AxmlDecoder { data }
    }

    pub fn accept(&self, sink: &mut dyn EventSink) -> AxmlResult<()> {
        let mut reader = BinaryReader::new(self.data);
        let xml_header = read_chunk_header(&mut reader)?;
        if xml_header.chunk_type != RES_XML_TYPE {
            fail!(
                "Binary XML does not start with RES_XML_TYPE header (found 0x{:04x})",
                xml_header.chunk_type
            );
        }
        let xml_end = xml_header.end();
        reader.set_limit(xml_end)?;
        reader.seek(xml_header.body_start())?;

        let mut state = DecodeState {
            pool: None,
            resource_map: Vec::new(),
            open_namespaces: 0,
            open_elements: 0,
            root_seen: false,
        };

        while reader.position() < xml_end {
            let chunk = read_chunk_header(&mut reader)?;
            match chunk.chunk_type {
                RES_STRING_POOL_TYPE => {
                    let pool = StringPool::parse(&mut reader, &chunk)?;
                    debug!("String pool with {} entries", pool.len());
                    state.pool = Some(pool);
                }
                RES_XML_RESOURCE_MAP_TYPE => {
                    reader.seek(chunk.body_start())?;
                    let mut ids = Vec::with_capacity((chunk.end() - chunk.body_start()) / 4);
                    while reader.position() + 4 <= chunk.end() {
                        ids.push(reader.read_u32()?);
                    }
                    state.resource_map = ids;
                }
                RES_XML_START_NAMESPACE_TYPE | RES_XML_END_NAMESPACE_TYPE => {
                    let namespace = read_namespace(&mut reader, &chunk, &state)?;
                    if chunk.chunk_type == RES_XML_START_NAMESPACE_TYPE {
                        state.open_namespaces += 1;
                        sink.emit(Event::StartNamespace(namespace))?;
                    } else {
                        if state.open_namespaces == 0 {
                            fail!("End namespace without matching start at offset {}", chunk.start);
                        }
                        state.open_namespaces -= 1;
                        sink.emit(Event::EndNamespace(namespace))?;
                    }
                }
                RES_XML_START_ELEMENT_TYPE => {
                    if state.open_elements == 0 && state.root_seen {
                        fail!("Multiple root elements at offset {}", chunk.start);
                    }
                    let (start, attributes) = read_start_element(&mut reader, &chunk, &state)?;
                    trace!("<{}> with {} attributes", start.name, attributes.len());
                    state.open_elements += 1;
                    state.root_seen = true;
                    sink.emit(Event::StartElement(start))?;
                    for attribute in attributes {
                        sink.emit(Event::Attribute(attribute))?;
                    }
                }
                RES_XML_END_ELEMENT_TYPE => {
                    let end = read_end_element(&mut reader, &chunk, &state)?;
                    if state.open_elements == 0 {
                        fail!("End element </{}> without matching start", end.name);
                    }
                    state.open_elements -= 1;
                    sink.emit(Event::EndElement(end))?;
                }
                RES_XML_CDATA_TYPE => {
                    let text = read_cdata(&mut reader, &chunk, &state)?;
                    if state.open_elements > 0 {
                        sink.emit(Event::Text(text))?;
                    }
                }
                other => {
                    debug!("Skipping unknown chunk 0x{:04x} at offset {}", other, chunk.start);
                }
            }
            reader.seek(chunk.end())?;
        }

        if state.open_elements != 0 {
            fail!("{} unclosed elements at end of document", state.open_elements);
        }
        if state.open_namespaces != 0 {
            fail!("{} unclosed namespaces at end of document", state.open_namespaces);
        }
        if !state.root_seen {
            fail!("Document has no root element");
        }
        Ok(())
    }
}

/// Decodes `data` into `sink`.
pub fn decode(data: &[u8], sink: &mut dyn EventSink) -> AxmlResult<()> {
    AxmlDecoder::new(data).accept(sink)
}

/// Reads `lineNumber` and skips `comment`, then positions at the node extension.
fn read_node_header(reader: &mut BinaryReader<'_>, chunk: &ChunkHeader) -> AxmlResult<u32> {
    let line = reader.read_u32()?;
    reader.read_u32()?; // comment
    reader.seek(chunk.body_start())?;
    Ok(line)
}

fn read_namespace(
    reader: &mut BinaryReader<'_>,
    chunk: &ChunkHeader,
    state: &DecodeState,
) -> AxmlResult<Namespace> {
    let pool = state.pool("Namespace chunk")?;
    let line = read_node_header(reader, chunk)?;
    let prefix = pool.get_optional(reader.read_u32()?)?;
    let uri = pool.get_optional(reader.read_u32()?)?;
    Ok(Namespace {
        prefix: prefix.map(str::to_string),
        uri: uri.map(str::to_string),
        line,
    })
}

fn read_start_element(
    reader: &mut BinaryReader<'_>,
    chunk: &ChunkHeader,
    state: &DecodeState,
) -> AxmlResult<(ElementStart, Vec<Attribute>)> {
    let pool = state.pool("Start element")?;
    let line = read_node_header(reader, chunk)?;
    let ext_start = reader.position();
    let namespace = pool.get_optional(reader.read_u32()?)?;
    let name = pool.get(reader.read_u32()?)?;
    let attribute_start = reader.read_u16()? as usize;
    let attribute_size = reader.read_u16()? as usize;
    let attribute_count = reader.read_u16()? as usize;
    reader.read_u16()?; // idIndex
    reader.read_u16()?; // classIndex
    reader.read_u16()?; // styleIndex

    if attribute_count > 0 && attribute_size < ATTRIBUTE_SIZE as usize {
        fail!("Attribute size {} too small in <{}>", attribute_size, name);
    }

    let mut attributes = Vec::with_capacity(attribute_count);
    for i in 0..attribute_count {
        let offset = ext_start + attribute_start + i * attribute_size;
        if offset + ATTRIBUTE_SIZE as usize > chunk.end() {
            fail!("Attribute {} of <{}> is truncated", i, name);
        }
        reader.seek(offset)?;
        attributes.push(read_attribute(reader, state, pool)?);
    }

    let start = ElementStart {
        namespace: namespace.map(str::to_string),
        name: name.to_string(),
        line,
    };
    Ok((start, attributes))
}

fn read_attribute(
    reader: &mut BinaryReader<'_>,
    state: &DecodeState,
    pool: &StringPool,
) -> AxmlResult<Attribute> {
    let namespace = pool.get_optional(reader.read_u32()?)?;
    let name_idx = reader.read_u32()?;
    let name = pool.get(name_idx)?;
    let raw_value_idx = reader.read_u32()?;
    let value_size = reader.read_u16()?;
    reader.read_u8()?; // res0
    let data_type = reader.read_u8()?;
    let data = reader.read_u32()?;
    if value_size != RES_VALUE_SIZE {
        fail!("Attribute {} value size must be 8, found {}", name, value_size);
    }

    let value = if data_type == TYPE_STRING {
        AttributeValue::String(pool.get(data)?.to_string())
    } else {
        // The raw text of a typed value is only validated; it is not kept, and
        // re-encoding writes no raw text for typed values.
        pool.get_optional(raw_value_idx)?;
        AttributeValue::from_raw(data_type, data)
    };
    let resource_id = state
        .resource_map
        .get(name_idx as usize)
        .copied()
        .filter(|id| *id != 0);

    Ok(Attribute {
        namespace: namespace.map(str::to_string),
        name: name.to_string(),
        resource_id,
        value,
    })
}

fn read_end_element(
    reader: &mut BinaryReader<'_>,
    chunk: &ChunkHeader,
    state: &DecodeState,
) -> AxmlResult<ElementEnd> {
    let pool = state.pool("End element")?;
    let line = read_node_header(reader, chunk)?;
    let namespace = pool.get_optional(reader.read_u32()?)?;
    let name = pool.get(reader.read_u32()?)?;
    Ok(ElementEnd {
        namespace: namespace.map(str::to_string),
        name: name.to_string(),
        line,
    })
}

fn read_cdata(
    reader: &mut BinaryReader<'_>,
    chunk: &ChunkHeader,
    state: &DecodeState,
) -> AxmlResult<Text> {
    let pool = state.pool("CDATA")?;
    let line = read_node_header(reader, chunk)?;
    let text = pool.get(reader.read_u32()?)?;
    let value_size = reader.read_u16()?;
    if value_size != RES_VALUE_SIZE {
        fail!("CDATA value size must be 8, found {}", value_size);
    }
    Ok(Text {
        text: text.to_string(),
        line,
    })
}
