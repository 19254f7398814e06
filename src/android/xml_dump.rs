use crate::android::decoder::decode;
use crate::android::error::AxmlResult;
use crate::android::event::{AttributeValue, Event, EventSink, Namespace};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event as XmlEvent};
use quick_xml::Writer;

/// Renders an event stream as indented text XML.
///
/// Attributes must arrive before the element's first child, which always
/// holds for a stream coming straight out of the decoder.
pub struct XmlTextSink {
    writer: Writer<Vec<u8>>,
    namespaces: Vec<Namespace>,
    undeclared: Vec<Namespace>,
    pending: Option<BytesStart<'static>>,
}

impl XmlTextSink {
    pub fn new() -> AxmlResult<Self> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(XmlEvent::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        Ok(XmlTextSink {
            writer,
            namespaces: Vec::new(),
            undeclared: Vec::new(),
            pending: None,
        })
    }

    pub fn into_string(mut self) -> AxmlResult<String> {
        self.flush()?;
        String::from_utf8(self.writer.into_inner())
            .map_err(|err| malformed!("Rendered XML is not UTF-8: {}", err))
    }

    fn flush(&mut self) -> AxmlResult<()> {
        if let Some(start) = self.pending.take() {
            self.writer.write_event(XmlEvent::Start(start))?;
        }
        Ok(())
    }

    fn qualified(&self, namespace: Option<&str>, local: &str) -> String {
        let prefix = namespace.and_then(|uri| {
            self.namespaces
                .iter()
                .rev()
                .find(|ns| ns.uri.as_deref() == Some(uri))
                .and_then(|ns| ns.prefix.as_deref())
        });
        match prefix {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}:{local}"),
            _ => local.to_string(),
        }
    }
}

impl EventSink for XmlTextSink {
    fn emit(&mut self, event: Event) -> AxmlResult<()> {
        match event {
            Event::StartNamespace(ns) => {
                self.namespaces.push(ns.clone());
                self.undeclared.push(ns);
            }
            Event::EndNamespace(ns) => {
                if let Some(idx) = self.namespaces.iter().rposition(|open| open.uri == ns.uri) {
                    self.namespaces.remove(idx);
                }
            }
            Event::StartElement(start) => {
                self.flush()?;
                let mut tag = BytesStart::new(self.qualified(start.namespace.as_deref(), &start.name));
                for ns in self.undeclared.drain(..) {
                    let key = match ns.prefix.as_deref() {
                        Some(prefix) if !prefix.is_empty() => format!("xmlns:{prefix}"),
                        _ => "xmlns".to_string(),
                    };
                    tag.push_attribute((key.as_str(), ns.uri.as_deref().unwrap_or("")));
                }
                self.pending = Some(tag);
            }
            Event::Attribute(attr) => {
                let key = self.qualified(attr.namespace.as_deref(), &attr.name);
                let value = value_text(&attr.value);
                match self.pending.as_mut() {
                    Some(tag) => tag.push_attribute((key.as_str(), value.as_str())),
                    None => fail!("Attribute {} arrived after element content", key),
                }
            }
            Event::EndElement(end) => {
                if let Some(start) = self.pending.take() {
                    self.writer.write_event(XmlEvent::Empty(start))?;
                } else {
                    let name = self.qualified(end.namespace.as_deref(), &end.name);
                    self.writer.write_event(XmlEvent::End(BytesEnd::new(name)))?;
                }
            }
            Event::Text(text) => {
                self.flush()?;
                self.writer.write_event(XmlEvent::Text(BytesText::new(&text.text)))?;
            }
        }
        Ok(())
    }
}

fn value_text(value: &AttributeValue) -> String {
    match value {
        AttributeValue::String(text) => text.clone(),
        AttributeValue::Boolean(flag) => flag.to_string(),
        AttributeValue::Integer(num) => num.to_string(),
        AttributeValue::Hex(value) => format!("0x{value:x}"),
        AttributeValue::Reference(id) => format!("@0x{id:08x}"),
        AttributeValue::Typed { data_type, data } => format!("(type 0x{data_type:02x})0x{data:08x}"),
    }
}

/// Decodes a binary manifest and renders it as text XML.
pub fn axml_to_xml(data: &[u8]) -> AxmlResult<String> {
    let mut sink = XmlTextSink::new()?;
    decode(data, &mut sink)?;
    sink.into_string()
}
