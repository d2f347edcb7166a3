//! Format handlers that normalize RSS and Atom into one item/feed model.
//!
//! The handlers consume [`Dispatcher`] events and write straight into two
//! sink interfaces, [`FeedSink`] for channel-level fields and [`ItemSink`]
//! for entries. They keep no item model of their own.
//!
//! Root dispatch:
//!
//! | root element            | chain                                   |
//! |-------------------------|-----------------------------------------|
//! | `<rss version="1.0">`   | rejected ("Unsupported RSS version")    |
//! | `<rss>`                 | rss -> channel -> item / image          |
//! | `<feed>`                | feed -> entry / author                  |
//! | anything else           | rejected ("Unsupported format: <tag>")  |

use crate::feed::date::{parse_rfc3339, parse_rfc822};
use crate::markup::{Attributes, BoxedHandler, Dispatcher, Handler, MarkupError};

/// Receives normalized fields of one item.
pub trait ItemSink {
    fn set_title(&mut self, title: &str);
    fn set_summary(&mut self, summary: &str);
    /// Full content; takes precedence over any summary.
    fn set_content(&mut self, content: &str);
    fn set_link(&mut self, link: &str);
    fn set_date(&mut self, date: &str);
    fn set_update_date(&mut self, date: &str, id: &str);
    fn set_author(&mut self, author: &str);
    fn add_category(&mut self, category: &str);
    fn set_id(&mut self, id: &str);
}

/// Receives normalized channel-level fields and allocates items.
pub trait FeedSink {
    fn set_title(&mut self, title: &str);
    fn set_description(&mut self, description: &str);
    fn set_link(&mut self, link: &str);
    fn set_author(&mut self, author: &str);
    fn set_logo(&mut self, logo: &str);

    /// Starts a new item and returns it.
    fn append_item(&mut self) -> &mut dyn ItemSink;

    /// The most recently appended item.
    fn current_item(&mut self) -> Option<&mut dyn ItemSink>;
}

/// Parses a whole feed document into `sink`.
pub fn parse_document<S: FeedSink + ?Sized>(text: &str, sink: &mut S) -> Result<(), MarkupError> {
    Dispatcher::new(Box::new(DocumentHandler), sink).parse(text)
}

/// `href` of an Atom `<link>` that points at an HTML page: no `type`, or
/// `type="text/html"`. Enclosures and other media types are ignored.
fn html_link(attrs: &Attributes) -> Option<&str> {
    let href = attrs.get("href")?;
    match attrs.get("type") {
        None | Some("text/html") => Some(href),
        Some(_) => None,
    }
}

// ---------------------------------------------------------------------------
// Root
// ---------------------------------------------------------------------------

struct DocumentHandler;

impl<S: FeedSink + ?Sized> Handler<S> for DocumentHandler {
    fn start(
        &mut self,
        _sink: &mut S,
        name: &str,
        attrs: &Attributes,
    ) -> Result<Option<BoxedHandler<S>>, MarkupError> {
        match name {
            "rss" => match attrs.get("version") {
                Some(version @ "1.0") => Err(MarkupError::Rejected(format!(
                    "Unsupported RSS version: {version}"
                ))),
                _ => Ok(Some(Box::new(RssHandler))),
            },
            "feed" => Ok(Some(Box::new(AtomFeedHandler::default()))),
            other => Err(MarkupError::Rejected(format!("Unsupported format: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// RSS
// ---------------------------------------------------------------------------

/// `<rss>`
struct RssHandler;

impl<S: FeedSink + ?Sized> Handler<S> for RssHandler {
    fn start(
        &mut self,
        _sink: &mut S,
        name: &str,
        _attrs: &Attributes,
    ) -> Result<Option<BoxedHandler<S>>, MarkupError> {
        match name {
            "channel" => Ok(Some(Box::new(RssChannelHandler))),
            _ => Ok(None),
        }
    }

    fn text(&mut self, sink: &mut S, name: &str, text: &str) -> Result<(), MarkupError> {
        match name {
            "title" => sink.set_title(text),
            "link" => sink.set_link(text),
            "description" => sink.set_description(text),
            _ => {}
        }
        Ok(())
    }
}

/// `<rss><channel>`
struct RssChannelHandler;

impl<S: FeedSink + ?Sized> Handler<S> for RssChannelHandler {
    fn start(
        &mut self,
        sink: &mut S,
        name: &str,
        _attrs: &Attributes,
    ) -> Result<Option<BoxedHandler<S>>, MarkupError> {
        match name {
            "item" => {
                sink.append_item();
                Ok(Some(Box::new(RssItemHandler)))
            }
            "image" => Ok(Some(Box::new(RssImageHandler))),
            _ => Ok(None),
        }
    }

    fn text(&mut self, sink: &mut S, name: &str, text: &str) -> Result<(), MarkupError> {
        match name {
            "title" => sink.set_title(text),
            "link" => sink.set_link(text),
            "description" => sink.set_description(text),
            "managingEditor" => sink.set_author(text),
            _ => {}
        }
        Ok(())
    }
}

/// `<channel><image>`
struct RssImageHandler;

impl<S: FeedSink + ?Sized> Handler<S> for RssImageHandler {
    fn start(
        &mut self,
        _sink: &mut S,
        _name: &str,
        _attrs: &Attributes,
    ) -> Result<Option<BoxedHandler<S>>, MarkupError> {
        Ok(None)
    }

    fn text(&mut self, sink: &mut S, name: &str, text: &str) -> Result<(), MarkupError> {
        if name == "url" {
            sink.set_logo(text);
        }
        Ok(())
    }
}

/// `<channel><item>`
struct RssItemHandler;

impl<S: FeedSink + ?Sized> Handler<S> for RssItemHandler {
    fn start(
        &mut self,
        _sink: &mut S,
        _name: &str,
        _attrs: &Attributes,
    ) -> Result<Option<BoxedHandler<S>>, MarkupError> {
        Ok(None)
    }

    fn text(&mut self, sink: &mut S, name: &str, text: &str) -> Result<(), MarkupError> {
        let Some(item) = sink.current_item() else {
            return Ok(());
        };
        match name {
            "title" => item.set_title(text),
            "link" => item.set_link(text),
            "content" | "content:encoded" => item.set_content(text),
            "description" | "summary" | "atom:summary" => item.set_summary(text),
            "pubDate" => item.set_date(&parse_rfc822(text)),
            "author" | "dc:creator" => item.set_author(text),
            "category" => item.add_category(text),
            "guid" => item.set_id(text),
            _ => {}
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Atom
// ---------------------------------------------------------------------------

/// `<feed>`
#[derive(Default)]
struct AtomFeedHandler {
    link_taken: bool,
}

impl<S: FeedSink + ?Sized> Handler<S> for AtomFeedHandler {
    fn start(
        &mut self,
        sink: &mut S,
        name: &str,
        attrs: &Attributes,
    ) -> Result<Option<BoxedHandler<S>>, MarkupError> {
        match name {
            "entry" => {
                sink.append_item();
                Ok(Some(Box::new(AtomEntryHandler::default())))
            }
            "author" => Ok(Some(Box::new(AtomFeedAuthorHandler))),
            "link" => {
                if !self.link_taken {
                    if let Some(href) = html_link(attrs) {
                        sink.set_link(href);
                        self.link_taken = true;
                    }
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn text(&mut self, sink: &mut S, name: &str, text: &str) -> Result<(), MarkupError> {
        match name {
            "title" => sink.set_title(text),
            "subtitle" => sink.set_description(text),
            _ => {}
        }
        Ok(())
    }
}

/// `<feed><author>`
struct AtomFeedAuthorHandler;

impl<S: FeedSink + ?Sized> Handler<S> for AtomFeedAuthorHandler {
    fn start(
        &mut self,
        _sink: &mut S,
        _name: &str,
        _attrs: &Attributes,
    ) -> Result<Option<BoxedHandler<S>>, MarkupError> {
        Ok(None)
    }

    fn text(&mut self, sink: &mut S, name: &str, text: &str) -> Result<(), MarkupError> {
        if name == "name" {
            sink.set_author(text);
        }
        Ok(())
    }
}

/// `<feed><entry>`
#[derive(Default)]
struct AtomEntryHandler {
    link_taken: bool,
}

impl<S: FeedSink + ?Sized> Handler<S> for AtomEntryHandler {
    fn start(
        &mut self,
        sink: &mut S,
        name: &str,
        attrs: &Attributes,
    ) -> Result<Option<BoxedHandler<S>>, MarkupError> {
        match name {
            "author" => Ok(Some(Box::new(AtomEntryAuthorHandler))),
            "link" => {
                if !self.link_taken {
                    if let (Some(href), Some(item)) = (html_link(attrs), sink.current_item()) {
                        item.set_link(href);
                        self.link_taken = true;
                    }
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn text(&mut self, sink: &mut S, name: &str, text: &str) -> Result<(), MarkupError> {
        let Some(item) = sink.current_item() else {
            return Ok(());
        };
        match name {
            "title" => item.set_title(text),
            "summary" => item.set_summary(text),
            "content" => item.set_content(text),
            "created" | "published" => item.set_date(&parse_rfc3339(text)),
            "updated" => item.set_update_date(&parse_rfc3339(text), text),
            "category" | "dc:subject" => item.add_category(text),
            "id" => item.set_id(text),
            _ => {}
        }
        Ok(())
    }
}

/// `<entry><author>`
struct AtomEntryAuthorHandler;

impl<S: FeedSink + ?Sized> Handler<S> for AtomEntryAuthorHandler {
    fn start(
        &mut self,
        _sink: &mut S,
        _name: &str,
        _attrs: &Attributes,
    ) -> Result<Option<BoxedHandler<S>>, MarkupError> {
        Ok(None)
    }

    fn text(&mut self, sink: &mut S, name: &str, text: &str) -> Result<(), MarkupError> {
        if name == "name" {
            if let Some(item) = sink.current_item() {
                item.set_author(text);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Records every sink call as `field=value`, one vector per item.
    #[derive(Default, Debug)]
    struct Recording {
        feed: Vec<String>,
        items: Vec<RecordedItem>,
    }

    #[derive(Default, Debug)]
    struct RecordedItem(Vec<String>);

    impl RecordedItem {
        fn get(&self, field: &str) -> Vec<&str> {
            let prefix = format!("{field}=");
            self.0
                .iter()
                .filter_map(|line| line.strip_prefix(prefix.as_str()))
                .collect()
        }
    }

    impl ItemSink for RecordedItem {
        fn set_title(&mut self, v: &str) {
            self.0.push(format!("title={v}"));
        }
        fn set_summary(&mut self, v: &str) {
            self.0.push(format!("summary={v}"));
        }
        fn set_content(&mut self, v: &str) {
            self.0.push(format!("content={v}"));
        }
        fn set_link(&mut self, v: &str) {
            self.0.push(format!("link={v}"));
        }
        fn set_date(&mut self, v: &str) {
            self.0.push(format!("date={v}"));
        }
        fn set_update_date(&mut self, v: &str, id: &str) {
            self.0.push(format!("updated={v}|{id}"));
        }
        fn set_author(&mut self, v: &str) {
            self.0.push(format!("author={v}"));
        }
        fn add_category(&mut self, v: &str) {
            self.0.push(format!("category={v}"));
        }
        fn set_id(&mut self, v: &str) {
            self.0.push(format!("id={v}"));
        }
    }

    impl FeedSink for Recording {
        fn set_title(&mut self, v: &str) {
            self.feed.push(format!("title={v}"));
        }
        fn set_description(&mut self, v: &str) {
            self.feed.push(format!("description={v}"));
        }
        fn set_link(&mut self, v: &str) {
            self.feed.push(format!("link={v}"));
        }
        fn set_author(&mut self, v: &str) {
            self.feed.push(format!("author={v}"));
        }
        fn set_logo(&mut self, v: &str) {
            self.feed.push(format!("logo={v}"));
        }
        fn append_item(&mut self) -> &mut dyn ItemSink {
            self.items.push(RecordedItem::default());
            let last = self.items.len() - 1;
            &mut self.items[last]
        }
        fn current_item(&mut self) -> Option<&mut dyn ItemSink> {
            self.items.last_mut().map(|i| i as &mut dyn ItemSink)
        }
    }

    fn parse(xml: &str) -> (Result<(), MarkupError>, Recording) {
        let mut rec = Recording::default();
        let result = parse_document(xml, &mut rec);
        (result, rec)
    }

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/"
     xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Example Blog</title>
    <link>https://example.com/</link>
    <description>Things</description>
    <managingEditor>editor@example.com</managingEditor>
    <image><url>https://example.com/logo.png</url><title>Logo</title></image>
    <item>
      <title>First</title>
      <link>https://example.com/1</link>
      <description>short</description>
      <content:encoded><![CDATA[<p>long</p>]]></content:encoded>
      <pubDate>Mon, 02 Jan 2006 15:04:05 GMT</pubDate>
      <dc:creator>Alice</dc:creator>
      <category>rust</category>
      <category>xml</category>
      <guid>urn:1</guid>
    </item>
    <item><title>Second</title><guid>urn:2</guid></item>
  </channel>
</rss>"#;

    #[test]
    fn test_rss_channel_fields() {
        let (result, rec) = parse(RSS);
        result.unwrap();
        assert_eq!(
            rec.feed,
            vec![
                "title=Example Blog",
                "link=https://example.com/",
                "description=Things",
                "author=editor@example.com",
                "logo=https://example.com/logo.png",
            ]
        );
    }

    #[test]
    fn test_rss_item_fields() {
        let (result, rec) = parse(RSS);
        result.unwrap();
        assert_eq!(rec.items.len(), 2);

        let first = &rec.items[0];
        assert_eq!(first.get("title"), vec!["First"]);
        assert_eq!(first.get("summary"), vec!["short"]);
        assert_eq!(first.get("content"), vec!["<p>long</p>"]);
        assert_eq!(first.get("date"), vec!["Jan  2, 2006 (15:04 +00:00)"]);
        assert_eq!(first.get("author"), vec!["Alice"]);
        assert_eq!(first.get("category"), vec!["rust", "xml"]);
        assert_eq!(first.get("id"), vec!["urn:1"]);

        assert_eq!(rec.items[1].get("title"), vec!["Second"]);
    }

    #[test]
    fn test_rss_without_version_attribute_is_accepted() {
        let (result, rec) = parse("<rss><channel><item><title>x</title></item></channel></rss>");
        result.unwrap();
        assert_eq!(rec.items.len(), 1);
    }

    #[test]
    fn test_rss_1_0_rejected() {
        let (result, rec) = parse(r#"<rss version="1.0"><channel/></rss>"#);
        match result {
            Err(MarkupError::Rejected(msg)) => assert_eq!(msg, "Unsupported RSS version: 1.0"),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(rec.items.is_empty());
    }

    #[test]
    fn test_rdf_root_rejected() {
        let (result, rec) = parse(
            r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"><item/></rdf:RDF>"#,
        );
        match result {
            Err(MarkupError::Rejected(msg)) => assert_eq!(msg, "Unsupported format: rdf:RDF"),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(rec.items.is_empty());
    }

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Blog</title>
  <subtitle>Sub</subtitle>
  <link rel="self" type="application/atom+xml" href="https://example.org/feed.xml"/>
  <link rel="alternate" href="https://example.org/"/>
  <link rel="alternate" type="text/html" href="https://example.org/other"/>
  <author><name>Bob</name><email>bob@example.org</email></author>
  <entry>
    <title>Entry</title>
    <link rel="enclosure" type="application/pdf" href="https://example.org/paper.pdf"/>
    <link href="https://example.org/entry"/>
    <id>tag:example.org,2006:1</id>
    <published>2006-01-02T15:04:05+02:00</published>
    <updated>2006-01-03T10:00:00Z</updated>
    <summary>sum</summary>
    <content type="html">full</content>
    <category>news</category>
    <author><name>Carol</name></author>
  </entry>
</feed>"#;

    #[test]
    fn test_atom_feed_fields() {
        let (result, rec) = parse(ATOM);
        result.unwrap();
        assert_eq!(
            rec.feed,
            vec![
                "title=Atom Blog",
                "description=Sub",
                "link=https://example.org/",
                "author=Bob",
            ]
        );
    }

    #[test]
    fn test_atom_entry_fields() {
        let (result, rec) = parse(ATOM);
        result.unwrap();
        let entry = &rec.items[0];
        assert_eq!(entry.get("title"), vec!["Entry"]);
        assert_eq!(entry.get("link"), vec!["https://example.org/entry"]);
        assert_eq!(entry.get("id"), vec!["tag:example.org,2006:1"]);
        assert_eq!(entry.get("date"), vec!["Jan  2, 2006 (15:04 +02:00)"]);
        assert_eq!(
            entry.get("updated"),
            vec!["Jan  3, 2006 (10:00 +00:00)|2006-01-03T10:00:00Z"]
        );
        assert_eq!(entry.get("summary"), vec!["sum"]);
        assert_eq!(entry.get("content"), vec!["full"]);
        assert_eq!(entry.get("category"), vec!["news"]);
        assert_eq!(entry.get("author"), vec!["Carol"]);
    }

    #[test]
    fn test_atom_entry_skips_non_html_links() {
        let (result, rec) = parse(
            r#"<feed><entry>
                <link type="application/pdf" href="https://x/a.pdf"/>
                <link href="https://x/page"/>
            </entry></feed>"#,
        );
        result.unwrap();
        assert_eq!(rec.items[0].get("link"), vec!["https://x/page"]);
    }

    #[test]
    fn test_unknown_root_rejected() {
        let (result, _) = parse("<html><body/></html>");
        assert!(matches!(result, Err(MarkupError::Rejected(ref m)) if m == "Unsupported format: html"));
    }

    #[test]
    fn test_malformed_markup_is_syntax_error() {
        let (result, _) = parse("<rss><channel><item></channel></rss>");
        assert!(matches!(result, Err(MarkupError::Syntax(_))));
    }
}
