use chrono_tz::Tz;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::SiteConfig;
use crate::custom_date::parse_or_now;
use crate::feed::FeedItem;

pub const NO_DESCRIPTION: &str = "No description available";
const HTML_START_MARKER: &str = "<!-- HTML content start -->";
const HTML_END_MARKER: &str = "<!-- HTML content end -->";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid article selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
}

/// Selectors of one site, compiled once per request.
///
/// The article selector must compile. A field selector that is empty or
/// does not compile matches nothing and leaves its field empty.
pub struct SiteSelectors {
    article: Selector,
    title: Option<Selector>,
    link: Option<Selector>,
    date: Option<Selector>,
    content: Option<Selector>,
}

impl SiteSelectors {
    pub fn compile(site: &SiteConfig) -> Result<Self, ExtractError> {
        let article = Selector::parse(&site.article_selector).map_err(|e| {
            ExtractError::InvalidSelector {
                selector: site.article_selector.clone(),
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            article,
            title: compile_field("title_selector", &site.title_selector),
            link: compile_field("link_selector", &site.link_selector),
            date: compile_field("date_selector", &site.date_selector),
            content: compile_field("content_selector", &site.content_selector),
        })
    }
}

fn compile_field(field: &str, raw: &str) -> Option<Selector> {
    if raw.trim().is_empty() {
        return None;
    }
    match Selector::parse(raw) {
        Ok(selector) => Some(selector),
        Err(e) => {
            warn!(
                field = field,
                selector = %raw,
                error = %e,
                "invalid selector, field will be empty"
            );
            None
        }
    }
}

/// Naive absolutization: anything not starting with "http" gets the base
/// URL prepended verbatim. No slash handling, no `..` resolution.
pub fn absolutize(base: &str, link: &str) -> String {
    if link.starts_with("http") {
        link.to_string()
    } else {
        format!("{base}{link}")
    }
}

/// Prefixes site-root-relative references (`/path`) with the base URL and
/// leaves everything else alone.
pub fn absolutize_root_relative(base: &str, value: &str) -> String {
    if value.starts_with('/') {
        format!("{base}{value}")
    } else {
        value.to_string()
    }
}

/// One [`FeedItem`] per node matching the article selector, in document
/// order. Missing fields never drop an article.
pub fn extract_items(html: &str, site: &SiteConfig) -> Result<Vec<FeedItem>, ExtractError> {
    let selectors = SiteSelectors::compile(site)?;
    let mut document = Html::parse_document(html);
    absolutize_content_links(&mut document, &selectors, &site.url);
    let tz = site.tz();

    let items: Vec<FeedItem> = document
        .select(&selectors.article)
        .map(|article| parse_article(article, site, &selectors, tz))
        .collect();

    info!(count = items.len(), "found articles");
    Ok(items)
}

/// Rewrites root-relative `a[href]` and `img[src]` below each article's
/// content node in place, so the serialized content carries absolute URLs.
fn absolutize_content_links(document: &mut Html, selectors: &SiteSelectors, base: &str) {
    let targets: Vec<_> = document
        .select(&selectors.article)
        .filter_map(|article| first(article, selectors.content.as_ref()))
        .flat_map(|content| {
            content
                .descendants()
                .skip(1)
                .filter_map(ElementRef::wrap)
                .filter(|el| matches!(el.value().name(), "a" | "img"))
                .map(|el| el.id())
        })
        .collect();

    for id in targets {
        let Some(mut node) = document.tree.get_mut(id) else {
            continue;
        };
        let Node::Element(element) = node.value() else {
            continue;
        };
        let attribute = if element.name() == "a" { "href" } else { "src" };

        for (name, value) in element.attrs.iter_mut() {
            if &*name.local == attribute && value.starts_with('/') {
                let absolute = absolutize_root_relative(base, &**value);
                *value = absolute.as_str().into();
            }
        }
    }
}

fn first<'a>(article: ElementRef<'a>, selector: Option<&Selector>) -> Option<ElementRef<'a>> {
    selector.and_then(|s| article.select(s).next())
}

fn parse_article(
    article: ElementRef<'_>,
    site: &SiteConfig,
    selectors: &SiteSelectors,
    tz: Tz,
) -> FeedItem {
    let title = first(article, selectors.title.as_ref())
        .map(|el| el.text().collect::<String>())
        .unwrap_or_default();

    let raw_link = first(article, selectors.link.as_ref())
        .and_then(|el| el.value().attr(&site.link_attribute_name))
        .unwrap_or("");
    let link = absolutize(&site.url, raw_link);

    let published = first(article, selectors.date.as_ref())
        .and_then(|el| el.value().attr("datetime"))
        .unwrap_or("");
    let created = parse_or_now(published, &site.date_format, tz);

    let mut content = first(article, selectors.content.as_ref())
        .map(|el| el.inner_html())
        .unwrap_or_default();
    if content.is_empty() {
        content = NO_DESCRIPTION.to_string();
    }
    let description = format!("{HTML_START_MARKER}\n{content}\n{HTML_END_MARKER}");

    FeedItem {
        title,
        id: link.clone(),
        link,
        description,
        created,
    }
}
