use crate::feed::ItemSink;
use std::collections::BTreeSet;

/// One entry of a feed.
///
/// Items are owned by their [`Feed`](crate::model::Feed) and replaced
/// wholesale on every refresh; read state survives through the feed's
/// read-id set, keyed by [`Item::id`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item {
    title: String,
    summary: String,
    link: String,
    date: String,
    update_date: String,
    update_id: String,
    author: String,
    categories: String,
    id: String,
    read: bool,
}

impl Item {
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Content when the source had any, otherwise the summary.
    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    /// Canonical publish date, or `""` when unknown.
    pub fn date(&self) -> &str {
        &self.date
    }

    /// Canonical update date; `""` when it repeats the publish date.
    pub fn update_date(&self) -> &str {
        if self.update_date == self.date {
            ""
        } else {
            &self.update_date
        }
    }

    /// Raw `<updated>` text of an Atom entry.
    pub fn update_id(&self) -> &str {
        &self.update_id
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    /// Categories joined with `", "` in document order.
    pub fn categories(&self) -> &str {
        &self.categories
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_read(&self) -> bool {
        self.read
    }

    pub(crate) fn set_read(&mut self, read: bool) {
        self.read = read;
    }
}

/// Builds an [`Item`] from sink calls, checking its id against the read set.
#[derive(Debug)]
pub(crate) struct ItemDraft<'r> {
    item: Item,
    read_ids: &'r BTreeSet<String>,
}

impl<'r> ItemDraft<'r> {
    pub(crate) fn new(read_ids: &'r BTreeSet<String>) -> Self {
        Self {
            item: Item::default(),
            read_ids,
        }
    }

    pub(crate) fn finish(self) -> Item {
        self.item
    }
}

impl ItemSink for ItemDraft<'_> {
    fn set_title(&mut self, title: &str) {
        self.item.title = title.to_owned();
    }

    fn set_summary(&mut self, summary: &str) {
        // content wins
        if self.item.summary.is_empty() {
            self.item.summary = summary.to_owned();
        }
    }

    fn set_content(&mut self, content: &str) {
        self.item.summary = content.to_owned();
    }

    fn set_link(&mut self, link: &str) {
        self.item.link = link.to_owned();
    }

    fn set_date(&mut self, date: &str) {
        self.item.date = date.to_owned();
    }

    fn set_update_date(&mut self, date: &str, id: &str) {
        self.item.update_date = date.to_owned();
        self.item.update_id = id.to_owned();
    }

    fn set_author(&mut self, author: &str) {
        self.item.author = author.to_owned();
    }

    fn add_category(&mut self, category: &str) {
        if !self.item.categories.is_empty() {
            self.item.categories.push_str(", ");
        }
        self.item.categories.push_str(category);
    }

    fn set_id(&mut self, id: &str) {
        self.item.id = id.to_owned();
        if self.read_ids.contains(id) {
            self.item.read = true;
        }
        if self.item.link.is_empty() && (id.starts_with("http://") || id.starts_with("https://")) {
            self.item.link = id.to_owned();
        }
    }
}
