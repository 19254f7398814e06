use crate::android::chunk::{TYPE_INT_BOOLEAN, TYPE_INT_DEC, TYPE_INT_HEX, TYPE_REFERENCE, TYPE_STRING};
use crate::android::error::AxmlResult;
use serde::{Deserialize, Serialize};

/// A namespace binding scoping a subtree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub prefix: Option<String>,
    pub uri: Option<String>,
    pub line: u32,
}

impl Namespace {
    pub fn new(prefix: Option<&str>, uri: Option<&str>) -> Self {
        Namespace {
            prefix: prefix.map(str::to_string),
            uri: uri.map(str::to_string),
            line: 0,
        }
    }
}

/// Opening tag of an element. Attributes follow as separate events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementStart {
    pub namespace: Option<String>,
    pub name: String,
    pub line: u32,
}

impl ElementStart {
    pub fn new(name: impl Into<String>) -> Self {
        ElementStart {
            namespace: None,
            name: name.into(),
            line: 0,
        }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    pub fn end(&self) -> ElementEnd {
        ElementEnd {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            line: self.line,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementEnd {
    pub namespace: Option<String>,
    pub name: String,
    pub line: u32,
}

/// Typed attribute value. The variant is the `Res_value` type tag, so replacing
/// a value always replaces its tag with it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    String(String),
    Reference(u32),
    Integer(i32),
    Hex(u32),
    Boolean(bool),
    /// Any other `Res_value` type (floats, dimensions, colors, ...), kept verbatim.
    Typed { data_type: u8, data: u32 },
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn data_type(&self) -> u8 {
        match self {
            AttributeValue::String(_) => TYPE_STRING,
            AttributeValue::Reference(_) => TYPE_REFERENCE,
            AttributeValue::Integer(_) => TYPE_INT_DEC,
            AttributeValue::Hex(_) => TYPE_INT_HEX,
            AttributeValue::Boolean(_) => TYPE_INT_BOOLEAN,
            AttributeValue::Typed { data_type, .. } => *data_type,
        }
    }

    /// Builds a value from its binary `(dataType, data)` pair. String values
    /// are resolved by the decoder before reaching this point.
    pub(crate) fn from_raw(data_type: u8, data: u32) -> Self {
        match data_type {
            TYPE_REFERENCE => AttributeValue::Reference(data),
            TYPE_INT_DEC => AttributeValue::Integer(data as i32),
            TYPE_INT_HEX => AttributeValue::Hex(data),
            TYPE_INT_BOOLEAN => AttributeValue::Boolean(data != 0),
            _ => AttributeValue::Typed { data_type, data },
        }
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_owned())
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Boolean(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Integer(value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub namespace: Option<String>,
    pub name: String,
    pub resource_id: Option<u32>,
    pub value: AttributeValue,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Attribute {
            namespace: None,
            name: name.into(),
            resource_id: None,
            value: value.into(),
        }
    }

    pub fn with_namespace(mut self, uri: impl Into<String>) -> Self {
        self.namespace = Some(uri.into());
        self
    }

    pub fn with_resource_id(mut self, resource_id: u32) -> Self {
        self.resource_id = Some(resource_id);
        self
    }

    /// Same attribute slot (namespace, name, resource id) holding `value`.
    pub fn replace_value(self, value: AttributeValue) -> Self {
        Attribute { value, ..self }
    }
}

/// Character data inside an element.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Text {
    pub text: String,
    pub line: u32,
}

/// One structural event of a binary XML document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    StartNamespace(Namespace),
    EndNamespace(Namespace),
    StartElement(ElementStart),
    /// Belongs to the innermost element that has been started but not ended.
    Attribute(Attribute),
    EndElement(ElementEnd),
    Text(Text),
}

/// Receiver of a document's event stream: the encoder, and every rewrite stage
/// of a visitor chain.
pub trait EventSink {
    fn emit(&mut self, event: Event) -> AxmlResult<()>;
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn emit(&mut self, event: Event) -> AxmlResult<()> {
        (**self).emit(event)
    }
}

/// Records an event stream so it can be inspected or replayed later.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    pub events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        EventLog::default()
    }

    pub fn replay(&self, sink: &mut dyn EventSink) -> AxmlResult<()> {
        for event in &self.events {
            sink.emit(event.clone())?;
        }
        Ok(())
    }

    pub fn elements(&self) -> impl Iterator<Item = &ElementStart> {
        self.events.iter().filter_map(|event| match event {
            Event::StartElement(start) => Some(start),
            _ => None,
        })
    }
}

impl EventSink for EventLog {
    fn emit(&mut self, event: Event) -> AxmlResult<()> {
        self.events.push(event);
        Ok(())
    }
}

struct ScopeFrame<T> {
    name: String,
    state: Option<T>,
}

/// Stack of open elements, each optionally carrying stage-local state that is
/// created at element start and dropped at element end.
pub struct ElementScopes<T> {
    frames: Vec<ScopeFrame<T>>,
}

impl<T> Default for ElementScopes<T> {
    fn default() -> Self {
        ElementScopes { frames: Vec::new() }
    }
}

impl<T> ElementScopes<T> {
    pub fn new() -> Self {
        ElementScopes::default()
    }

    pub fn enter(&mut self, name: &str, state: Option<T>) {
        self.frames.push(ScopeFrame {
            name: name.to_string(),
            state,
        });
    }

    /// Closes the innermost element and hands back its state.
    pub fn leave(&mut self) -> Option<T> {
        self.frames.pop().and_then(|frame| frame.state)
    }

    /// Number of open elements; the document root is at depth 1.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn current_name(&self) -> Option<&str> {
        self.frames.last().map(|frame| frame.name.as_str())
    }

    pub fn current(&self) -> Option<&T> {
        self.frames.last().and_then(|frame| frame.state.as_ref())
    }

    pub fn current_mut(&mut self) -> Option<&mut T> {
        self.frames.last_mut().and_then(|frame| frame.state.as_mut())
    }

    pub fn parent_mut(&mut self) -> Option<&mut T> {
        let idx = self.frames.len().checked_sub(2)?;
        self.frames[idx].state.as_mut()
    }
}
