use crate::markup::{Attributes, BoxedHandler, Dispatcher, Handler, MarkupError};
use quick_xml::escape::escape;
use std::fmt::Write as _;
use std::path::Path;
use thiserror::Error;

/// `&` inside URLs is stored as this character.
const URL_AMP_SENTINEL: char = '@';

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Markup(#[from] MarkupError),
}

/// One persisted feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscription {
    pub url: String,
    /// User override; empty when the feed's own title is used.
    pub title: String,
    pub codeset: Option<String>,
    pub read_ids: Vec<String>,
}

/// Renders the subscription file.
///
/// ```text
/// <eatfeed>
///     <feed title="..." url="..." codeset="...">
///         <news id="..."></news>
///     </feed>
/// </eatfeed>
/// ```
pub fn render(subscriptions: &[Subscription]) -> String {
    let mut out = String::from("<eatfeed>\n");
    for sub in subscriptions {
        let url = sub.url.replace('&', &URL_AMP_SENTINEL.to_string());
        let _ = write!(
            out,
            "\t<feed title=\"{}\" url=\"{}\"",
            escape(sub.title.as_str()),
            escape(url.as_str())
        );
        if let Some(codeset) = sub.codeset.as_deref().filter(|c| !c.is_empty()) {
            let _ = write!(out, " codeset=\"{}\"", escape(codeset));
        }
        out.push_str(">\n");
        for id in &sub.read_ids {
            let _ = writeln!(out, "\t\t<news id=\"{}\"></news>", escape(id.as_str()));
        }
        out.push_str("\t</feed>\n");
    }
    out.push_str("</eatfeed>\n");
    out
}

/// Parses a subscription file. `<feed>` elements without a `url` are skipped.
pub fn parse(text: &str) -> Result<Vec<Subscription>, MarkupError> {
    let mut subscriptions = Vec::new();
    Dispatcher::new(Box::new(FileHandler), &mut subscriptions).parse(text)?;
    Ok(subscriptions)
}

/// Writes the subscription file atomically (temp file, sync, rename).
pub fn save(path: &Path, subscriptions: &[Subscription]) -> Result<(), StorageError> {
    use std::time::{SystemTime, UNIX_EPOCH};

    let content = render(subscriptions);

    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = path.with_extension(format!("tmp.{:016x}", random_suffix));

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .map_err(|e| io_error(&temp_path, e))?;

    let written = std::io::Write::write_all(&mut file, content.as_bytes())
        .and_then(|()| file.sync_all());
    drop(file);
    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp_path);
        return Err(io_error(&temp_path, e));
    }

    std::fs::rename(&temp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        io_error(path, e)
    })
}

/// Reads the subscription file. A missing file is an empty list.
pub fn load(path: &Path) -> Result<Vec<Subscription>, StorageError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(path, e)),
    };
    Ok(parse(&text)?)
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Document root and `<eatfeed>`.
struct FileHandler;

impl Handler<Vec<Subscription>> for FileHandler {
    fn start(
        &mut self,
        subs: &mut Vec<Subscription>,
        name: &str,
        attrs: &Attributes,
    ) -> Result<Option<BoxedHandler<Vec<Subscription>>>, MarkupError> {
        if name != "feed" {
            return Ok(None);
        }
        let Some(url) = attrs.get("url") else {
            tracing::debug!("Skipping subscription without url");
            return Ok(None);
        };
        subs.push(Subscription {
            url: url.replace(URL_AMP_SENTINEL, "&"),
            title: attrs.get("title").unwrap_or_default().to_owned(),
            codeset: attrs
                .get("codeset")
                .filter(|c| !c.is_empty())
                .map(str::to_owned),
            read_ids: Vec::new(),
        });
        Ok(Some(Box::new(SubscriptionHandler)))
    }
}

/// `<feed>`: collects read ids.
struct SubscriptionHandler;

impl Handler<Vec<Subscription>> for SubscriptionHandler {
    fn start(
        &mut self,
        subs: &mut Vec<Subscription>,
        name: &str,
        attrs: &Attributes,
    ) -> Result<Option<BoxedHandler<Vec<Subscription>>>, MarkupError> {
        if name == "news" {
            if let (Some(id), Some(sub)) = (attrs.get("id"), subs.last_mut()) {
                sub.read_ids.push(id.to_owned());
            }
        }
        Ok(None)
    }
}
