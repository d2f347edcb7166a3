//! Streaming, recursive-descent dispatch of XML events to a stack of handlers.
//!
//! The [`Dispatcher`] wraps a `quick-xml` reader and re-delivers tag-start,
//! text and tag-end events to the *active* [`Handler`]. A handler may descend
//! into a sub-scope by returning a child handler from [`Handler::start`]; the
//! child stays active until its element closes, at which point the parent
//! receives it back in [`Handler::end`]. Returning `None` keeps the current
//! handler active, which flattens nesting levels that need no dedicated
//! handler.
//!
//! Every handler receives a mutable context value `C` on each callback. This
//! is where handlers write their results, so handlers themselves hold no
//! borrowed state.
//!
//! # Text coalescing
//!
//! The tokenizer may split the text of one element into several fragments
//! (for instance around a CDATA section). Fragments are buffered and handed
//! to [`Handler::text`] as a single block, flushed when the element name
//! changes, when a child element starts, or when the element closes.
//!
//! # Entities
//!
//! Character data is unescaped exactly once. An input of `&amp;gt;` therefore
//! reaches handlers as the literal text `&gt;`, never as `>`.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;
use thiserror::Error;

/// Errors produced while dispatching a document.
#[derive(Debug, Error)]
pub enum MarkupError {
    /// The tokenizer rejected the byte stream.
    #[error("Parsing error: {0}")]
    Syntax(String),

    /// A handler refused the document (unsupported format, bad version, ...).
    #[error("{0}")]
    Rejected(String),

    /// The input ended before every element was closed, or had no root.
    #[error("Parsing error: {0}")]
    Truncated(String),
}

/// Attribute list of a start tag, unescaped and in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of the first attribute named `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }
}

/// A boxed handler operating on context `C`.
pub type BoxedHandler<C> = Box<dyn Handler<C>>;

/// Receiver of dispatcher events for one scope of the document.
///
/// Returning an error from any callback aborts the parse; the error is
/// surfaced unchanged to the caller of [`Dispatcher::parse`].
pub trait Handler<C: ?Sized> {
    /// Called when an element opens inside this handler's scope.
    ///
    /// Return `Some(child)` to make `child` the active handler until the
    /// element closes, or `None` to keep handling nested content here.
    fn start(
        &mut self,
        cx: &mut C,
        name: &str,
        attrs: &Attributes,
    ) -> Result<Option<BoxedHandler<C>>, MarkupError>;

    /// Called once per logical text block of element `name`.
    fn text(&mut self, _cx: &mut C, _name: &str, _text: &str) -> Result<(), MarkupError> {
        Ok(())
    }

    /// Called when element `name` closes. `child` is the handler that was
    /// pushed for this element, if any.
    fn end(
        &mut self,
        _cx: &mut C,
        _name: &str,
        _child: Option<BoxedHandler<C>>,
    ) -> Result<(), MarkupError> {
        Ok(())
    }
}

/// One open element. `handler` is set only when the element caused a descent.
struct Frame<C: ?Sized> {
    name: String,
    handler: Option<BoxedHandler<C>>,
}

/// Drives a stack of [`Handler`]s from XML input.
pub struct Dispatcher<'c, C: ?Sized> {
    cx: &'c mut C,
    root: BoxedHandler<C>,
    frames: Vec<Frame<C>>,
    text: String,
    text_element: String,
    seen_root: bool,
}

/// The innermost handler that descended, or the root handler.
fn active<'a, C: ?Sized>(
    root: &'a mut BoxedHandler<C>,
    frames: &'a mut [Frame<C>],
) -> &'a mut dyn Handler<C> {
    for frame in frames.iter_mut().rev() {
        if let Some(handler) = frame.handler.as_mut() {
            return handler.as_mut();
        }
    }
    root.as_mut()
}

impl<'c, C: ?Sized> Dispatcher<'c, C> {
    pub fn new(root: BoxedHandler<C>, cx: &'c mut C) -> Self {
        Self {
            cx,
            root,
            frames: Vec::new(),
            text: String::new(),
            text_element: String::new(),
            seen_root: false,
        }
    }

    /// Parses a complete document.
    pub fn parse(&mut self, input: &str) -> Result<(), MarkupError> {
        let mut reader = Reader::from_str(input);

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let (name, attrs) = split_tag(&e, &reader)?;
                    self.start(&name, &attrs)?;
                }
                Ok(Event::Empty(e)) => {
                    let (name, attrs) = split_tag(&e, &reader)?;
                    self.start(&name, &attrs)?;
                    self.end(&name)?;
                }
                Ok(Event::End(e)) => {
                    let qname = e.name();
                    let name = utf8(qname.as_ref())?;
                    self.end(&name)?;
                }
                Ok(Event::Text(e)) => {
                    let text = e
                        .unescape()
                        .map_err(|err| syntax_error(err, &reader))?;
                    self.text(&text)?;
                }
                Ok(Event::CData(e)) => {
                    let text = utf8(&e)?;
                    self.text(&text)?;
                }
                Ok(Event::Eof) => break,
                Err(err) => return Err(syntax_error(err, &reader)),
                // Declarations, comments, processing instructions, doctype
                Ok(_) => {}
            }
        }

        self.finish()
    }

    /// Delivers an element start to the active handler.
    pub fn start(&mut self, name: &str, attrs: &Attributes) -> Result<(), MarkupError> {
        self.flush_text()?;
        self.seen_root = true;

        let child = active(&mut self.root, &mut self.frames).start(self.cx, name, attrs)?;
        self.frames.push(Frame {
            name: name.to_owned(),
            handler: child,
        });
        Ok(())
    }

    /// Buffers a text fragment of the innermost open element.
    ///
    /// Text outside the root element is ignored.
    pub fn text(&mut self, fragment: &str) -> Result<(), MarkupError> {
        let Some(frame) = self.frames.last() else {
            return Ok(());
        };

        if !self.text.is_empty() && self.text_element != frame.name {
            let name = frame.name.clone();
            self.flush_text()?;
            self.text_element = name;
        } else {
            self.text_element.clone_from(&frame.name);
        }
        self.text.push_str(fragment);
        Ok(())
    }

    /// Closes the innermost open element.
    pub fn end(&mut self, name: &str) -> Result<(), MarkupError> {
        self.flush_text()?;

        let frame = self.frames.pop().ok_or_else(|| {
            MarkupError::Syntax(format!("closing tag </{name}> without an open element"))
        })?;

        active(&mut self.root, &mut self.frames).end(self.cx, name, frame.handler)
    }

    /// Flushes pending text and checks that the document was complete.
    pub fn finish(&mut self) -> Result<(), MarkupError> {
        self.flush_text()?;

        if let Some(frame) = self.frames.last() {
            return Err(MarkupError::Truncated(format!(
                "document ended with <{}> still open",
                frame.name
            )));
        }
        if !self.seen_root {
            return Err(MarkupError::Truncated(
                "document was empty or contained only whitespace".to_owned(),
            ));
        }
        Ok(())
    }

    fn flush_text(&mut self) -> Result<(), MarkupError> {
        if self.text.is_empty() {
            return Ok(());
        }
        let text = std::mem::take(&mut self.text);
        active(&mut self.root, &mut self.frames).text(self.cx, &self.text_element, &text)
    }
}

fn split_tag(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<(String, Attributes), MarkupError> {
    let name = utf8(e.name().as_ref())?.into_owned();

    let mut attrs = Attributes::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| MarkupError::Syntax(err.to_string()))?;
        let key = utf8(attr.key.as_ref())?.into_owned();
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|err| syntax_error(err, reader))?;
        attrs.push(key, value);
    }
    Ok((name, attrs))
}

fn utf8(bytes: &[u8]) -> Result<Cow<'_, str>, MarkupError> {
    std::str::from_utf8(bytes)
        .map(Cow::Borrowed)
        .map_err(|err| MarkupError::Syntax(err.to_string()))
}

fn syntax_error(err: quick_xml::Error, reader: &Reader<&[u8]>) -> MarkupError {
    MarkupError::Syntax(format!("{} (at byte {})", err, reader.buffer_position()))
}
