//! Tag-based output for converted backups.

use std::io::Write;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::error::BackupError;

/// Sink for the converted document. Tags must be balanced by the caller.
pub trait TagWriter {
    fn begin_tag(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), BackupError>;

    fn end_tag(&mut self, name: &str) -> Result<(), BackupError>;

    /// An element holding only text.
    fn full_tag(&mut self, name: &str, value: &str) -> Result<(), BackupError>;
}

impl<T: TagWriter + ?Sized> TagWriter for &mut T {
    fn begin_tag(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), BackupError> {
        (**self).begin_tag(name, attributes)
    }

    fn end_tag(&mut self, name: &str) -> Result<(), BackupError> {
        (**self).end_tag(name)
    }

    fn full_tag(&mut self, name: &str, value: &str) -> Result<(), BackupError> {
        (**self).full_tag(name, value)
    }
}

/// Writes indented XML through `quick_xml`.
pub struct XmlTagWriter<W: Write> {
    writer: quick_xml::Writer<W>,
}

impl<W: Write> XmlTagWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: quick_xml::Writer::new_with_indent(inner, b' ', 2),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write(&mut self, event: Event<'_>) -> Result<(), BackupError> {
        self.writer
            .write_event(event)
            .map_err(|e| BackupError::Write(e.to_string()))
    }
}

impl<W: Write> TagWriter for XmlTagWriter<W> {
    fn begin_tag(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), BackupError> {
        let mut start = BytesStart::new(name);
        for &(key, value) in attributes {
            start.push_attribute((key, value));
        }
        self.write(Event::Start(start))
    }

    fn end_tag(&mut self, name: &str) -> Result<(), BackupError> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    fn full_tag(&mut self, name: &str, value: &str) -> Result<(), BackupError> {
        // The text event keeps the closing tag on the same line, even when empty.
        self.write(Event::Start(BytesStart::new(name)))?;
        self.write(Event::Text(BytesText::new(value)))?;
        self.write(Event::End(BytesEnd::new(name)))
    }
}
