//! Syndication feed parser using quick-xml.
//!
//! Reads RSS-style `<item>` elements and keeps only the fields the pipeline
//! assumes: title, link, publication date, summary. Atom `<entry>` elements
//! are accepted with the same field mapping. Items missing a title or link
//! are dropped; items with an unparseable date are dropped with a debug log
//! rather than poisoning the whole feed.

use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;

use lexpipe_shared::{LexpipeError, Result};

/// One raw feed item before classification/filtering.
#[derive(Debug, Clone, Default)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
}

/// Parse a syndication feed document into its items.
///
/// Tolerates both RSS (`item`/`pubDate`/`description`) and Atom
/// (`entry`/`published`/`summary`) element names.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items: Vec<FeedItem> = Vec::new();
    let mut current: Option<FeedItem> = None;
    let mut current_field: Option<Field> = None;
    let mut buf = Vec::new();

    #[derive(Clone, Copy, PartialEq)]
    enum Field {
        Title,
        Link,
        Date,
        Summary,
    }

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                let name = name.as_ref();
                match name {
                    b"item" | b"entry" => current = Some(FeedItem::default()),
                    b"title" if current.is_some() => current_field = Some(Field::Title),
                    b"link" if current.is_some() => {
                        current_field = Some(Field::Link);
                        // Atom links carry the URL in an href attribute.
                        if let Some(item) = current.as_mut() {
                            for attr in e.attributes().flatten() {
                                if attr.key.as_ref() == b"href" {
                                    item.link =
                                        String::from_utf8_lossy(&attr.value).into_owned();
                                }
                            }
                        }
                    }
                    b"pubDate" | b"published" | b"updated" if current.is_some() => {
                        current_field = Some(Field::Date)
                    }
                    b"description" | b"summary" if current.is_some() => {
                        current_field = Some(Field::Summary)
                    }
                    _ => current_field = None,
                }
            }
            // Atom links are usually self-closing: <link href="..."/>.
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"link" {
                    if let Some(item) = current.as_mut() {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"href" {
                                item.link = String::from_utf8_lossy(&attr.value).into_owned();
                            }
                        }
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(item), Some(field)) = (current.as_mut(), current_field) {
                    let text = t
                        .unescape()
                        .map_err(|e| LexpipeError::parse(format!("feed text unescape: {e}")))?
                        .into_owned();
                    match field {
                        Field::Title => item.title = text,
                        Field::Link => {
                            if item.link.is_empty() {
                                item.link = text;
                            }
                        }
                        Field::Date => item.published_at = parse_date(&text),
                        Field::Summary => item.summary = Some(text),
                    }
                }
            }
            Ok(Event::CData(t)) => {
                if let (Some(item), Some(field)) = (current.as_mut(), current_field) {
                    let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                    match field {
                        Field::Title => item.title = text,
                        Field::Summary => item.summary = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"item" | b"entry" => {
                        if let Some(item) = current.take() {
                            if item.title.is_empty() || item.link.is_empty() {
                                debug!("dropping feed item without title or link");
                            } else if item.published_at.is_none() {
                                debug!(title = %item.title, "dropping feed item with unparseable date");
                            } else {
                                items.push(item);
                            }
                        }
                    }
                    _ => current_field = None,
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(LexpipeError::parse(format!(
                    "malformed feed XML at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}

/// Parse a feed timestamp: RFC 2822 (RSS pubDate) first, then RFC 3339 (Atom).
fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(text)
        .or_else(|_| DateTime::parse_from_rfc3339(text))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS_SAMPLE: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Monitorul Oficial</title>
    <item>
      <title>Lege privind securitatea muncii</title>
      <link>https://legislatie.example.ro/lege-319</link>
      <pubDate>Mon, 17 Aug 2026 10:00:00 +0200</pubDate>
      <description>Obligații pentru angajatori privind evaluarea riscurilor</description>
    </item>
    <item>
      <title><![CDATA[HG privind apărarea împotriva incendiilor]]></title>
      <link>https://legislatie.example.ro/hg-571</link>
      <pubDate>Tue, 18 Aug 2026 09:30:00 +0200</pubDate>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_rss_items() {
        let items = parse_feed(RSS_SAMPLE).expect("parse");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Lege privind securitatea muncii");
        assert_eq!(items[0].link, "https://legislatie.example.ro/lege-319");
        assert!(items[0].summary.as_deref().unwrap().contains("angajatori"));
        assert!(items[0].published_at.is_some());
        // CDATA title
        assert!(items[1].title.contains("incendiilor"));
    }

    #[test]
    fn parses_atom_entries() {
        let atom = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <title>Regulation (EU) 2026/123</title>
    <link href="https://eur-lex.example.eu/reg-2026-123"/>
    <published>2026-08-20T08:00:00Z</published>
    <summary>Employers shall maintain safety records</summary>
  </entry>
</feed>"#;
        let items = parse_feed(atom).expect("parse");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].link, "https://eur-lex.example.eu/reg-2026-123");
        assert!(items[0].published_at.is_some());
    }

    #[test]
    fn decodes_xml_entities_in_text() {
        let xml = r#"<rss><channel>
<item>
  <title>Norme SSM &amp; PSI pentru &#x218;antiere</title>
  <link>https://legislatie.example.ro/norme-ssm</link>
  <pubDate>Mon, 17 Aug 2026 10:00:00 +0200</pubDate>
</item>
</channel></rss>"#;
        let items = parse_feed(xml).expect("parse");
        assert_eq!(items[0].title, "Norme SSM & PSI pentru Șantiere");
    }

    #[test]
    fn drops_items_missing_link_or_date() {
        let xml = r#"<rss><channel>
<item><title>No link</title><pubDate>Mon, 17 Aug 2026 10:00:00 +0200</pubDate></item>
<item><title>Bad date</title><link>https://x.example/1</link><pubDate>yesterday</pubDate></item>
</channel></rss>"#;
        let items = parse_feed(xml).expect("parse");
        assert!(items.is_empty());
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let result = parse_feed("<rss><channel><item></rss>");
        assert!(result.is_err());
    }
}
