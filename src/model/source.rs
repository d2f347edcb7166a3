use crate::feed::{FeedSink, ItemSink, RefreshError};
use crate::model::item::{Item, ItemDraft};
use image::RgbaImage;
use std::collections::BTreeSet;
use std::fmt;

/// Stable identity of a feed inside one [`Registry`](crate::registry::Registry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeedId(pub(crate) u64);

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Refresh lifecycle of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// Never refreshed since it was added.
    Idle,
    Loading,
    Loaded,
    Errored,
}

/// Channel-level fields produced by one parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedMeta {
    pub title: String,
    pub description: String,
    pub link: String,
    pub author: String,
    pub logo: String,
}

/// Everything a successful background refresh hands back.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub meta: FeedMeta,
    pub items: Vec<Item>,
    pub icon: Option<RgbaImage>,
}

/// Inputs of one background refresh, snapshotted when loading starts.
#[derive(Debug, Clone)]
pub struct RefreshRequest {
    pub id: FeedId,
    pub url: String,
    pub codeset: Option<String>,
    pub read_ids: BTreeSet<String>,
    /// Link known from a previous parse, used for icon lookup.
    pub link: String,
    pub want_icon: bool,
}

/// Collects sink calls into a [`ParsedFeed`].
#[derive(Debug)]
pub(crate) struct FeedDraft<'r> {
    read_ids: &'r BTreeSet<String>,
    meta: FeedMeta,
    items: Vec<ItemDraft<'r>>,
}

impl<'r> FeedDraft<'r> {
    pub(crate) fn new(read_ids: &'r BTreeSet<String>) -> Self {
        Self {
            read_ids,
            meta: FeedMeta::default(),
            items: Vec::new(),
        }
    }

    pub(crate) fn finish(self) -> ParsedFeed {
        ParsedFeed {
            meta: self.meta,
            items: self.items.into_iter().map(ItemDraft::finish).collect(),
            icon: None,
        }
    }
}

impl FeedSink for FeedDraft<'_> {
    fn set_title(&mut self, title: &str) {
        self.meta.title = title.to_owned();
    }

    fn set_description(&mut self, description: &str) {
        self.meta.description = description.to_owned();
    }

    fn set_link(&mut self, link: &str) {
        self.meta.link = link.to_owned();
    }

    fn set_author(&mut self, author: &str) {
        self.meta.author = author.to_owned();
    }

    fn set_logo(&mut self, logo: &str) {
        self.meta.logo = logo.to_owned();
    }

    fn append_item(&mut self) -> &mut dyn ItemSink {
        self.items.push(ItemDraft::new(self.read_ids));
        let last = self.items.len() - 1;
        &mut self.items[last]
    }

    fn current_item(&mut self) -> Option<&mut dyn ItemSink> {
        self.items.last_mut().map(|item| item as &mut dyn ItemSink)
    }
}

/// One syndication source and its current parsed state.
///
/// Mutated only by the registry's coordinating context; background work
/// receives a [`RefreshRequest`] snapshot and answers with a result.
#[derive(Debug)]
pub struct Feed {
    id: FeedId,
    url: String,
    user_title: String,
    original_title: String,
    description: String,
    link: String,
    author: String,
    logo_url: String,
    icon: Option<RgbaImage>,
    codeset: Option<String>,
    items: Vec<Item>,
    read_ids: BTreeSet<String>,
    state: RefreshState,
    error: Option<String>,
}

impl Feed {
    pub(crate) fn new(id: FeedId, url: String, user_title: &str, codeset: Option<&str>) -> Self {
        Self {
            id,
            url,
            user_title: user_title.to_owned(),
            original_title: String::new(),
            description: String::new(),
            link: String::new(),
            author: String::new(),
            logo_url: String::new(),
            icon: None,
            codeset: codeset.filter(|c| !c.is_empty()).map(str::to_owned),
            items: Vec::new(),
            read_ids: BTreeSet::new(),
            state: RefreshState::Idle,
            error: None,
        }
    }

    pub fn id(&self) -> FeedId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Title shown to the user: the override, else the source title, else the URL.
    pub fn title(&self) -> &str {
        if !self.user_title.is_empty() {
            &self.user_title
        } else if !self.original_title.is_empty() {
            &self.original_title
        } else {
            &self.url
        }
    }

    pub fn user_title(&self) -> &str {
        &self.user_title
    }

    pub fn original_title(&self) -> &str {
        &self.original_title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn logo_url(&self) -> &str {
        &self.logo_url
    }

    pub fn icon(&self) -> Option<&RgbaImage> {
        self.icon.as_ref()
    }

    pub fn codeset(&self) -> Option<&str> {
        self.codeset.as_deref()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn item(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    pub fn read_ids(&self) -> &BTreeSet<String> {
        &self.read_ids
    }

    pub fn state(&self) -> RefreshState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == RefreshState::Loading
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|item| !item.is_read()).count()
    }

    pub(crate) fn set_user_title(&mut self, title: &str) {
        self.user_title = title.to_owned();
    }

    pub(crate) fn extend_read_ids<I: IntoIterator<Item = String>>(&mut self, ids: I) {
        self.read_ids
            .extend(ids.into_iter().filter(|id| !id.is_empty()));
    }

    /// Marks one item read or unread. Returns whether anything changed.
    pub(crate) fn set_item_read(&mut self, index: usize, read: bool) -> bool {
        let Some(item) = self.items.get_mut(index) else {
            return false;
        };
        if item.is_read() == read {
            return false;
        }
        item.set_read(read);
        if !item.id().is_empty() {
            if read {
                self.read_ids.insert(item.id().to_owned());
            } else {
                self.read_ids.remove(item.id());
            }
        }
        true
    }

    /// Enters `Loading`, discarding the previous items and error.
    ///
    /// Returns `None` while a refresh is already in flight.
    pub(crate) fn begin_refresh(&mut self) -> Option<RefreshRequest> {
        if self.is_loading() {
            return None;
        }
        self.state = RefreshState::Loading;
        self.items.clear();
        self.error = None;

        Some(RefreshRequest {
            id: self.id,
            url: self.url.clone(),
            codeset: self.codeset.clone(),
            read_ids: self.read_ids.clone(),
            link: self.link.clone(),
            want_icon: self.icon.is_none(),
        })
    }

    /// Applies the outcome of a background refresh.
    pub(crate) fn finish_refresh(&mut self, result: Result<ParsedFeed, RefreshError>) {
        match result {
            Ok(parsed) => {
                // Read state is carried by id, not by item identity.
                self.read_ids = parsed
                    .items
                    .iter()
                    .filter(|item| item.is_read() && !item.id().is_empty())
                    .map(|item| item.id().to_owned())
                    .collect();
                self.items = parsed.items;
                self.apply_meta(parsed.meta);
                if parsed.icon.is_some() {
                    self.icon = parsed.icon;
                }
                self.error = None;
                self.state = RefreshState::Loaded;
            }
            Err(e) => {
                self.items.clear();
                self.error = Some(e.to_string());
                self.state = RefreshState::Errored;
            }
        }
    }

    fn apply_meta(&mut self, meta: FeedMeta) {
        let FeedMeta {
            title,
            description,
            link,
            author,
            logo,
        } = meta;
        for (slot, value) in [
            (&mut self.original_title, title),
            (&mut self.description, description),
            (&mut self.link, link),
            (&mut self.author, author),
            (&mut self.logo_url, logo),
        ] {
            if !value.is_empty() {
                *slot = value;
            }
        }
    }
}
