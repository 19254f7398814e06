//! Android binary XML (AXML): decoding into events, encoding events back
//! into bytes, and rendering as text.

#[macro_use]
pub mod error;

pub(crate) mod chunk;
pub mod decoder;
pub mod encoder;
pub mod event;
pub mod res_ids;
pub(crate) mod string_pool;
pub mod xml_dump;

pub use decoder::{decode, AxmlDecoder};
pub use encoder::{reencode, AxmlEncoder};
pub use error::{AxmlError, AxmlResult};
pub use event::{
    Attribute, AttributeValue, ElementEnd, ElementScopes, ElementStart, Event, EventLog,
    EventSink, Namespace, Text,
};
pub use res_ids::ANDROID_NAMESPACE_URI;
pub use xml_dump::{axml_to_xml, XmlTextSink};
