use crate::android::chunk::{
    begin_chunk, finalize_chunk, write_u16, write_u32, write_u8, ATTRIBUTE_EXT_SIZE,
    ATTRIBUTE_SIZE, NO_ENTRY_INDEX, RESOURCE_MAP_HEADER_SIZE, RES_VALUE_SIZE, RES_XML_CDATA_TYPE,
    RES_XML_END_ELEMENT_TYPE, RES_XML_END_NAMESPACE_TYPE, RES_XML_RESOURCE_MAP_TYPE,
    RES_XML_START_ELEMENT_TYPE, RES_XML_START_NAMESPACE_TYPE, RES_XML_TYPE, TYPE_STRING,
    XML_HEADER_SIZE, XML_NODE_HEADER_SIZE,
};
use crate::android::decoder::decode;
use crate::android::error::AxmlResult;
use crate::android::event::{
    Attribute, AttributeValue, ElementEnd, ElementStart, Event, EventSink, Namespace, Text,
};
use crate::android::string_pool::StringPoolBuilder;
use log::debug;

enum Record {
    StartNamespace(Namespace),
    EndNamespace(Namespace),
    Element {
        start: ElementStart,
        attributes: Vec<Attribute>,
    },
    EndElement(ElementEnd),
    Text(Text),
}

/// Terminal sink of a visitor chain.
///
/// Events are buffered as they arrive; pools and indices are only laid out in
/// [`AxmlEncoder::to_bytes`], once the whole stream is known. Attributes are
/// attached to the innermost open element, so a stage may still add
/// attributes to an element after its children have been emitted. They are
/// written sorted by resource id, with plain attributes last.
#[derive(Default)]
pub struct AxmlEncoder {
    records: Vec<Record>,
    open: Vec<usize>,
}

impl AxmlEncoder {
    pub fn new() -> Self {
        AxmlEncoder::default()
    }

    pub fn to_bytes(&self) -> AxmlResult<Vec<u8>> {
        if !self.open.is_empty() {
            fail!("{} elements still open when encoding", self.open.len());
        }
        if !self.records.iter().any(|r| matches!(r, Record::Element { .. })) {
            fail!("Event stream has no root element");
        }

        let pool = self.build_pool();
        debug!(
            "Encoding {} records with {} pooled strings ({} resource ids)",
            self.records.len(),
            pool.len(),
            pool.resource_ids().len()
        );

        let mut document = Vec::new();
        let xml_start = begin_chunk(&mut document, RES_XML_TYPE, XML_HEADER_SIZE);
        document.extend_from_slice(&pool.to_chunk());
        if !pool.resource_ids().is_empty() {
            let map_start =
                begin_chunk(&mut document, RES_XML_RESOURCE_MAP_TYPE, RESOURCE_MAP_HEADER_SIZE);
            for id in pool.resource_ids() {
                write_u32(&mut document, *id);
            }
            finalize_chunk(&mut document, map_start);
        }
        for record in &self.records {
            write_record(&mut document, record, &pool)?;
        }
        finalize_chunk(&mut document, xml_start);
        Ok(document)
    }

    fn build_pool(&self) -> StringPoolBuilder {
        let mut pool = StringPoolBuilder::new();
        for record in &self.records {
            if let Record::Element { attributes, .. } = record {
                for attr in attributes {
                    if let Some(id) = attr.resource_id {
                        pool.intern_resource_name(&attr.name, id);
                    }
                }
            }
        }
        for record in &self.records {
            match record {
                Record::StartNamespace(ns) | Record::EndNamespace(ns) => {
                    if let Some(prefix) = &ns.prefix {
                        pool.intern(prefix);
                    }
                    if let Some(uri) = &ns.uri {
                        pool.intern(uri);
                    }
                }
                Record::Element { start, attributes } => {
                    if let Some(uri) = &start.namespace {
                        pool.intern(uri);
                    }
                    pool.intern(&start.name);
                    for attr in attributes {
                        if let Some(uri) = &attr.namespace {
                            pool.intern(uri);
                        }
                        if attr.resource_id.is_none() {
                            pool.intern(&attr.name);
                        }
                        if let AttributeValue::String(value) = &attr.value {
                            pool.intern(value);
                        }
                    }
                }
                Record::EndElement(end) => {
                    if let Some(uri) = &end.namespace {
                        pool.intern(uri);
                    }
                    pool.intern(&end.name);
                }
                Record::Text(text) => {
                    pool.intern(&text.text);
                }
            }
        }
        pool
    }
}

/// Decodes `data` and encodes it again without any rewriting.
pub fn reencode(data: &[u8]) -> AxmlResult<Vec<u8>> {
    let mut encoder = AxmlEncoder::new();
    decode(data, &mut encoder)?;
    encoder.to_bytes()
}

impl EventSink for AxmlEncoder {
    fn emit(&mut self, event: Event) -> AxmlResult<()> {
        match event {
            Event::StartNamespace(ns) => self.records.push(Record::StartNamespace(ns)),
            Event::EndNamespace(ns) => self.records.push(Record::EndNamespace(ns)),
            Event::StartElement(start) => {
                self.open.push(self.records.len());
                self.records.push(Record::Element {
                    start,
                    attributes: Vec::new(),
                });
            }
            Event::Attribute(attr) => {
                let idx = *self
                    .open
                    .last()
                    .ok_or_else(|| malformed!("Attribute {} outside of any element", attr.name))?;
                if let Some(Record::Element { attributes, .. }) = self.records.get_mut(idx) {
                    attributes.push(attr);
                }
            }
            Event::EndElement(end) => {
                if self.open.pop().is_none() {
                    fail!("End element </{}> without matching start", end.name);
                }
                self.records.push(Record::EndElement(end));
            }
            Event::Text(text) => {
                if self.open.is_empty() {
                    fail!("Text outside of any element");
                }
                self.records.push(Record::Text(text));
            }
        }
        Ok(())
    }
}

fn begin_node(buf: &mut Vec<u8>, chunk_type: u16, line: u32) -> usize {
    let start = begin_chunk(buf, chunk_type, XML_NODE_HEADER_SIZE);
    write_u32(buf, line);
    write_u32(buf, NO_ENTRY_INDEX); // comment
    start
}

fn write_record(buf: &mut Vec<u8>, record: &Record, pool: &StringPoolBuilder) -> AxmlResult<()> {
    match record {
        Record::StartNamespace(ns) => write_namespace(buf, RES_XML_START_NAMESPACE_TYPE, ns, pool),
        Record::EndNamespace(ns) => write_namespace(buf, RES_XML_END_NAMESPACE_TYPE, ns, pool),
        Record::Element { start, attributes } => write_start_element(buf, start, attributes, pool),
        Record::EndElement(end) => {
            let chunk_start = begin_node(buf, RES_XML_END_ELEMENT_TYPE, end.line);
            write_u32(buf, pool.optional_index_of(end.namespace.as_deref())?);
            write_u32(buf, pool.index_of(&end.name)?);
            finalize_chunk(buf, chunk_start);
            Ok(())
        }
        Record::Text(text) => {
            let idx = pool.index_of(&text.text)?;
            let chunk_start = begin_node(buf, RES_XML_CDATA_TYPE, text.line);
            write_u32(buf, idx);
            write_u16(buf, RES_VALUE_SIZE);
            write_u8(buf, 0);
            write_u8(buf, TYPE_STRING);
            write_u32(buf, idx);
            finalize_chunk(buf, chunk_start);
            Ok(())
        }
    }
}

fn write_namespace(
    buf: &mut Vec<u8>,
    chunk_type: u16,
    ns: &Namespace,
    pool: &StringPoolBuilder,
) -> AxmlResult<()> {
    let chunk_start = begin_node(buf, chunk_type, ns.line);
    write_u32(buf, pool.optional_index_of(ns.prefix.as_deref())?);
    write_u32(buf, pool.optional_index_of(ns.uri.as_deref())?);
    finalize_chunk(buf, chunk_start);
    Ok(())
}

/// Attributes in the order the platform's attribute lookup expects: those
/// with a resource id first by ascending id, then the rest as they came.
fn ordered_attributes(attributes: &[Attribute]) -> Vec<&Attribute> {
    let mut ordered: Vec<&Attribute> = attributes.iter().collect();
    ordered.sort_by_key(|attr| match attr.resource_id {
        Some(id) => (0, id),
        None => (1, 0),
    });
    ordered
}

/// 1-based position of a non-namespaced attribute, 0 when absent.
fn special_index(attributes: &[&Attribute], name: &str) -> u16 {
    attributes
        .iter()
        .position(|attr| attr.namespace.is_none() && attr.name == name)
        .map(|idx| idx as u16 + 1)
        .unwrap_or(0)
}

fn write_start_element(
    buf: &mut Vec<u8>,
    start: &ElementStart,
    attributes: &[Attribute],
    pool: &StringPoolBuilder,
) -> AxmlResult<()> {
    if attributes.len() > u16::MAX as usize {
        fail!("Too many attributes on <{}>", start.name);
    }
    let attributes = ordered_attributes(attributes);
    let chunk_start = begin_node(buf, RES_XML_START_ELEMENT_TYPE, start.line);
    write_u32(buf, pool.optional_index_of(start.namespace.as_deref())?);
    write_u32(buf, pool.index_of(&start.name)?);
    write_u16(buf, ATTRIBUTE_EXT_SIZE); // attributeStart
    write_u16(buf, ATTRIBUTE_SIZE);
    write_u16(buf, attributes.len() as u16);
    write_u16(buf, special_index(&attributes, "id"));
    write_u16(buf, special_index(&attributes, "class"));
    write_u16(buf, special_index(&attributes, "style"));
    for attr in attributes {
        write_attribute(buf, attr, pool)?;
    }
    finalize_chunk(buf, chunk_start);
    Ok(())
}

fn write_attribute(buf: &mut Vec<u8>, attr: &Attribute, pool: &StringPoolBuilder) -> AxmlResult<()> {
    let ns_idx = pool.optional_index_of(attr.namespace.as_deref())?;
    let name_idx = match attr.resource_id {
        Some(id) => pool.resource_name_index(&attr.name, id)?,
        None => pool.index_of(&attr.name)?,
    };
    let (raw_idx, data) = match &attr.value {
        AttributeValue::String(text) => {
            let idx = pool.index_of(text)?;
            (idx, idx)
        }
        AttributeValue::Reference(id) => (NO_ENTRY_INDEX, *id),
        AttributeValue::Integer(num) => (NO_ENTRY_INDEX, *num as u32),
        AttributeValue::Hex(value) => (NO_ENTRY_INDEX, *value),
        AttributeValue::Boolean(flag) => (NO_ENTRY_INDEX, if *flag { 0xFFFF_FFFF } else { 0 }),
        AttributeValue::Typed { data, .. } => (NO_ENTRY_INDEX, *data),
    };
    write_u32(buf, ns_idx);
    write_u32(buf, name_idx);
    write_u32(buf, raw_idx);
    write_u16(buf, RES_VALUE_SIZE);
    write_u8(buf, 0);
    write_u8(buf, attr.value.data_type());
    write_u32(buf, data);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::android::event::EventLog;
    use crate::android::res_ids::{ANDROID_NAMESPACE_URI, ATTR_NAME};

    fn sample_events() -> Vec<Event> {
        let android = Namespace::new(Some("android"), Some(ANDROID_NAMESPACE_URI));
        let root = ElementStart::new("manifest").at_line(2);
        let child = ElementStart::new("uses-feature").at_line(3);
        vec![
            Event::StartNamespace(android.clone()),
            Event::StartElement(root.clone()),
            Event::Attribute(Attribute::new("package", "com.example")),
            Event::StartElement(child.clone()),
            Event::Attribute(
                Attribute::new("name", "android.hardware.camera")
                    .with_namespace(ANDROID_NAMESPACE_URI)
                    .with_resource_id(ATTR_NAME),
            ),
            Event::Attribute(Attribute::new("required", false)),
            Event::Attribute(Attribute::new("glEsVersion", AttributeValue::Hex(0x0002_0000))),
            Event::Attribute(Attribute::new(
                "ratio",
                AttributeValue::Typed { data_type: 0x04, data: 0x3fc0_0000 },
            )),
            Event::EndElement(child.end()),
            Event::Text(Text { text: "hello".to_string(), line: 4 }),
            Event::EndElement(root.end()),
            Event::EndNamespace(android),
        ]
    }

    #[test]
    fn encodes_and_decodes_same_events() {
        let events = sample_events();
        let mut encoder = AxmlEncoder::new();
        for event in events.clone() {
            encoder.emit(event).unwrap();
        }
        let bytes = encoder.to_bytes().unwrap();
        assert_eq!(&bytes[0..2], &RES_XML_TYPE.to_le_bytes());
        assert_eq!(bytes.len() % 4, 0);

        let mut log = EventLog::new();
        decode(&bytes, &mut log).unwrap();
        assert_eq!(log.events, events);
    }

    #[test]
    fn late_attributes_attach_to_open_element() {
        let root = ElementStart::new("manifest");
        let child = ElementStart::new("application");
        let mut encoder = AxmlEncoder::new();
        encoder.emit(Event::StartElement(root.clone())).unwrap();
        encoder.emit(Event::StartElement(child.clone())).unwrap();
        encoder.emit(Event::EndElement(child.end())).unwrap();
        encoder.emit(Event::Attribute(Attribute::new("package", "late"))).unwrap();
        encoder.emit(Event::EndElement(root.end())).unwrap();

        let mut log = EventLog::new();
        decode(&encoder.to_bytes().unwrap(), &mut log).unwrap();
        assert_eq!(log.events[1], Event::Attribute(Attribute::new("package", "late")));
    }

    #[test]
    fn rejects_unbalanced_streams() {
        let mut encoder = AxmlEncoder::new();
        assert!(encoder
            .emit(Event::Attribute(Attribute::new("package", "x")))
            .unwrap_err()
            .is_malformed());
        assert!(encoder
            .emit(Event::EndElement(ElementStart::new("manifest").end()))
            .is_err());

        encoder.emit(Event::StartElement(ElementStart::new("manifest"))).unwrap();
        assert!(encoder.to_bytes().unwrap_err().is_malformed());
        assert!(AxmlEncoder::new().to_bytes().is_err());
    }

    #[test]
    fn id_index_points_at_plain_id_attribute() {
        let attrs = vec![
            Attribute::new("id", "x").with_namespace(ANDROID_NAMESPACE_URI),
            Attribute::new("class", "y"),
            Attribute::new("id", "z"),
        ];
        let attrs: Vec<&Attribute> = attrs.iter().collect();
        assert_eq!(special_index(&attrs, "id"), 3);
        assert_eq!(special_index(&attrs, "class"), 2);
        assert_eq!(special_index(&attrs, "style"), 0);
    }

    #[test]
    fn attributes_are_written_by_resource_id() {
        let app = ElementStart::new("application");
        let mut encoder = AxmlEncoder::new();
        encoder.emit(Event::StartElement(app.clone())).unwrap();
        for attr in [
            Attribute::new("zeta", "z"),
            Attribute::new("debuggable", true).with_resource_id(0x0101_000f),
            Attribute::new("alpha", "a"),
            Attribute::new("label", "L").with_resource_id(0x0101_0001),
        ] {
            encoder.emit(Event::Attribute(attr)).unwrap();
        }
        encoder.emit(Event::EndElement(app.end())).unwrap();

        let mut log = EventLog::new();
        decode(&encoder.to_bytes().unwrap(), &mut log).unwrap();
        let names: Vec<_> = log
            .events
            .iter()
            .filter_map(|event| match event {
                Event::Attribute(attr) => Some(attr.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["label", "debuggable", "zeta", "alpha"]);
    }
}
