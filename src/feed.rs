use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::borrow::Cow;
use std::io::Cursor;
use thiserror::Error;

use crate::config::SiteConfig;
use crate::custom_date::format_rfc822;

const HTML_NOTICE: &str = "<!-- Item descriptions contain HTML content -->";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to write feed XML: {0}")]
    Xml(#[from] std::io::Error),

    #[error("generated feed is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Same as `link`.
    pub id: String,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Feed {
    pub title: String,
    pub link: String,
    pub description: String,
    pub created: DateTime<Utc>,
    pub items: Vec<FeedItem>,
}

impl Feed {
    /// Channel metadata from `site`, stamped with the current time.
    pub fn new(site: &SiteConfig, items: Vec<FeedItem>) -> Self {
        Self {
            title: site.title.clone(),
            link: site.url.clone(),
            description: site.description.clone(),
            created: Utc::now(),
            items,
        }
    }

    /// RSS 2.0 document with a notice comment ahead of the root element.
    pub fn to_rss(&self) -> Result<String, FeedError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut rss = BytesStart::new("rss");
        rss.push_attribute(("version", "2.0"));
        rss.push_attribute(("xmlns:content", "http://purl.org/rss/1.0/modules/content/"));
        writer.write_event(Event::Start(rss))?;
        writer.write_event(Event::Start(BytesStart::new("channel")))?;

        write_text_element(&mut writer, "title", &self.title)?;
        write_text_element(&mut writer, "link", &self.link)?;
        write_text_element(&mut writer, "description", &self.description)?;
        write_text_element(&mut writer, "pubDate", &format_rfc822(self.created))?;
        write_text_element(
            &mut writer,
            "generator",
            &format!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        )?;

        for item in &self.items {
            writer.write_event(Event::Start(BytesStart::new("item")))?;
            write_text_element(&mut writer, "title", &item.title)?;
            write_text_element(&mut writer, "link", &item.link)?;
            write_text_element(&mut writer, "description", &item.description)?;
            write_text_element(&mut writer, "guid", &item.id)?;
            write_text_element(&mut writer, "pubDate", &format_rfc822(item.created))?;
            writer.write_event(Event::End(BytesEnd::new("item")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("channel")))?;
        writer.write_event(Event::End(BytesEnd::new("rss")))?;

        let xml = String::from_utf8(writer.into_inner().into_inner())?;
        Ok(xml.replacen("<rss", &format!("{HTML_NOTICE}\n<rss"), 1))
    }
}

fn write_text_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    text: &str,
) -> Result<(), FeedError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(&xml_chars(text))))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..
    )
}

/// Replaces characters XML 1.0 does not allow with U+FFFD.
fn xml_chars(text: &str) -> Cow<'_, str> {
    if text.chars().all(is_xml_char) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(
            text.chars()
                .map(|c| if is_xml_char(c) { c } else { '\u{FFFD}' })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn item(n: u32) -> FeedItem {
        let link = format!("https://example.com/posts/{n}");
        FeedItem {
            title: format!("Post {n}"),
            id: link.clone(),
            link,
            description: "<!-- HTML content start -->\n<p>Body & more</p>\n<!-- HTML content end -->"
                .into(),
            created: Utc.with_ymd_and_hms(2024, 5, n, 8, 0, 0).unwrap(),
        }
    }

    fn feed(items: Vec<FeedItem>) -> Feed {
        Feed {
            title: "Example".into(),
            link: "https://example.com".into(),
            description: "Example posts".into(),
            created: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            items,
        }
    }

    #[test]
    fn notice_precedes_root_element() {
        let rss = feed(vec![]).to_rss().unwrap();
        let mut lines = rss.lines();

        assert_eq!(lines.next(), Some(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert_eq!(lines.next(), Some(HTML_NOTICE));
        assert!(lines.next().unwrap().starts_with(r#"<rss version="2.0""#));
        assert_eq!(rss.matches(HTML_NOTICE).count(), 1);
    }

    #[test]
    fn channel_metadata() {
        let rss = feed(vec![]).to_rss().unwrap();

        assert!(rss.contains("<title>Example</title>"));
        assert!(rss.contains("<link>https://example.com</link>"));
        assert!(rss.contains("<description>Example posts</description>"));
        assert!(rss.contains("<pubDate>Sat, 01 Jun 2024 12:00:00 +0000</pubDate>"));
        assert!(!rss.contains("<item>"));
    }

    #[test]
    fn items_keep_order_and_escape_html() {
        let rss = feed(vec![item(1), item(2), item(3)]).to_rss().unwrap();

        let first = rss.find("https://example.com/posts/1").unwrap();
        let second = rss.find("https://example.com/posts/2").unwrap();
        let third = rss.find("https://example.com/posts/3").unwrap();
        assert!(first < second && second < third);

        assert!(rss.contains("<guid>https://example.com/posts/2</guid>"));
        assert!(rss.contains("<pubDate>Thu, 02 May 2024 08:00:00 +0000</pubDate>"));
        assert!(rss.contains("&lt;p&gt;Body &amp; more&lt;/p&gt;"));
        assert!(!rss.contains("<p>Body"));
    }

    #[test]
    fn invalid_xml_chars_are_replaced() {
        let mut bad = item(1);
        bad.title = "bad\u{0008}title\u{FFFE}".into();
        bad.description = "tab\tnew\nline\u{0}".into();
        let rss = feed(vec![bad]).to_rss().unwrap();

        assert!(!rss.contains('\u{0008}'));
        assert!(!rss.contains('\u{FFFE}'));
        assert!(!rss.contains('\u{0}'));
        assert!(rss.contains("<title>bad\u{FFFD}title\u{FFFD}</title>"));
        assert!(rss.contains("<description>tab\tnew\nline\u{FFFD}</description>"));
    }

    #[test]
    fn valid_text_is_borrowed() {
        assert!(matches!(xml_chars("plain ünïcode 🦀"), Cow::Borrowed(_)));
        assert_eq!(xml_chars("a\u{1F}b"), "a\u{FFFD}b");
    }

    #[test]
    fn new_takes_site_metadata() {
        let site = SiteConfig {
            url: "https://site.test".into(),
            title: "Site".into(),
            description: "About".into(),
            ..Default::default()
        };
        let before = Utc::now();
        let feed = Feed::new(&site, vec![item(1)]);

        assert_eq!(feed.title, "Site");
        assert_eq!(feed.link, "https://site.test");
        assert_eq!(feed.description, "About");
        assert!(feed.created >= before);
        assert_eq!(feed.items.len(), 1);
    }
}
