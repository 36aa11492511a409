//! Where prompt items come from: a fixed list, a list fetched once, or a
//! remote search repeated (debounced) for every filter.

use std::cell::{Cell, RefCell};
use std::time::Duration;

use tracing::{debug, trace};

use super::{ListItem, PromptItem, filter_matches, parse_prompt_items};
use crate::error::Result;

pub const REMOTE_DEBOUNCE: Duration = Duration::from_millis(200);

/// Answers filter strings with menu rows and maps rows back to items.
#[allow(async_fn_in_trait)]
pub trait PromptSource {
    /// `None` means a newer request superseded this one.
    async fn build_list_items(&self, filter: &str) -> Result<Option<Vec<ListItem>>>;

    fn prompt_item_for(&self, item: &ListItem) -> Option<PromptItem>;
}

/// Fetches prompt item markup from a URL.
#[allow(async_fn_in_trait)]
pub trait PromptFetcher {
    async fn fetch(&self, url: &str) -> Result<String>;
}

fn filtered(items: &[PromptItem], filter: &str) -> Vec<ListItem> {
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| filter_matches(&item.search, filter))
        .map(|(id, item)| ListItem::from_prompt_item(id, item))
        .collect()
}

/// Items known up front.
#[derive(Clone, Debug, Default)]
pub struct InlineSource {
    items: Vec<PromptItem>,
}

impl InlineSource {
    pub fn new(items: Vec<PromptItem>) -> Self {
        Self { items }
    }

    pub fn from_markup(source: &str) -> Result<Self> {
        Ok(Self::new(parse_prompt_items(source)?))
    }
}

impl PromptSource for InlineSource {
    async fn build_list_items(&self, filter: &str) -> Result<Option<Vec<ListItem>>> {
        Ok(Some(filtered(&self.items, filter)))
    }

    fn prompt_item_for(&self, item: &ListItem) -> Option<PromptItem> {
        self.items.get(item.id).cloned()
    }
}

/// Fetches the whole list on first use and filters locally afterwards.
#[derive(Debug)]
pub struct DeferredSource<F> {
    url: String,
    fetcher: F,
    items: RefCell<Option<Vec<PromptItem>>>,
}

impl<F: PromptFetcher> DeferredSource<F> {
    pub fn new(url: impl Into<String>, fetcher: F) -> Self {
        Self {
            url: url.into(),
            fetcher,
            items: RefCell::new(None),
        }
    }
}

impl<F: PromptFetcher> PromptSource for DeferredSource<F> {
    async fn build_list_items(&self, filter: &str) -> Result<Option<Vec<ListItem>>> {
        if self.items.borrow().is_none() {
            let markup = self.fetcher.fetch(&self.url).await?;
            let items = parse_prompt_items(&markup)?;
            debug!(url = %self.url, items = items.len(), "loaded prompt items");
            self.items.replace(Some(items));
        }
        let items = self.items.borrow();
        Ok(Some(filtered(items.as_deref().unwrap_or_default(), filter)))
    }

    fn prompt_item_for(&self, item: &ListItem) -> Option<PromptItem> {
        self.items.borrow().as_ref()?.get(item.id).cloned()
    }
}

/// Asks the server for every filter, after a quiet period. Only the most
/// recent request of a burst gets through.
#[derive(Debug)]
pub struct RemoteSource<F> {
    url: String,
    fetcher: F,
    debounce: Duration,
    generation: Cell<u64>,
    items: RefCell<Vec<PromptItem>>,
}

impl<F: PromptFetcher> RemoteSource<F> {
    pub fn new(url: impl Into<String>, fetcher: F) -> Self {
        Self {
            url: url.into(),
            fetcher,
            debounce: REMOTE_DEBOUNCE,
            generation: Cell::new(0),
            items: RefCell::new(Vec::new()),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// The source URL with `filter` added to its query string.
    pub fn url_for(&self, filter: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("filter", filter)
            .finish();
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{separator}{query}", self.url)
    }
}

impl<F: PromptFetcher> PromptSource for RemoteSource<F> {
    async fn build_list_items(&self, filter: &str) -> Result<Option<Vec<ListItem>>> {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        tokio::time::sleep(self.debounce).await;
        if self.generation.get() != generation {
            trace!(filter, "remote prompt request superseded");
            return Ok(None);
        }

        let markup = self.fetcher.fetch(&self.url_for(filter)).await?;
        if self.generation.get() != generation {
            return Ok(None);
        }
        let items = parse_prompt_items(&markup)?;
        let rows = items
            .iter()
            .enumerate()
            .map(|(id, item)| ListItem::from_prompt_item(id, item))
            .collect();
        self.items.replace(items);
        Ok(Some(rows))
    }

    fn prompt_item_for(&self, item: &ListItem) -> Option<PromptItem> {
        self.items.borrow().get(item.id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingFetcher {
        calls: RefCell<Vec<String>>,
        body: String,
    }

    impl CountingFetcher {
        fn new(body: &str) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                body: body.to_string(),
            }
        }
    }

    impl PromptFetcher for &CountingFetcher {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.calls.borrow_mut().push(url.to_string());
            Ok(self.body.clone())
        }
    }

    const ITEMS: &str = r#"<prompt-item search="Ana"><template type="editor">Ana</template></prompt-item><prompt-item search="Bob"><template type="editor">Bob</template></prompt-item>"#;

    #[tokio::test]
    async fn inline_source_filters_locally() {
        let source = InlineSource::from_markup(ITEMS).unwrap();
        let rows = source.build_list_items("an").await.unwrap().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(source.prompt_item_for(&rows[0]).unwrap().search, "Ana");
    }

    #[tokio::test]
    async fn deferred_source_fetches_once() {
        let fetcher = CountingFetcher::new(ITEMS);
        let source = DeferredSource::new("/people", &fetcher);
        assert_eq!(source.build_list_items("").await.unwrap().unwrap().len(), 2);
        assert_eq!(source.build_list_items("b").await.unwrap().unwrap().len(), 1);
        assert_eq!(fetcher.calls.borrow().as_slice(), ["/people"]);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_source_only_fetches_the_last_filter() {
        let fetcher = CountingFetcher::new(ITEMS);
        let source = RemoteSource::new("/people?limit=5", &fetcher);
        let (first, second, third) = tokio::join!(
            source.build_list_items("a"),
            source.build_list_items("an"),
            source.build_list_items("ana"),
        );
        assert_eq!(first.unwrap(), None);
        assert_eq!(second.unwrap(), None);
        assert_eq!(third.unwrap().unwrap().len(), 2);
        assert_eq!(
            fetcher.calls.borrow().as_slice(),
            ["/people?limit=5&filter=ana"]
        );
    }

    #[test]
    fn remote_url_gets_an_encoded_filter() {
        let fetcher = CountingFetcher::new("");
        let source = RemoteSource::new("/people", &fetcher);
        assert_eq!(source.url_for("a b&c"), "/people?filter=a+b%26c");
    }
}
