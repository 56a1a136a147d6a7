//! HTML parsing: title/description/JSON-LD harvesting, anchor
//! discovery, and a plain-text "markdown" projection good enough for
//! model prompts. Grounded on the `scraper`/`url` combination used by
//! the pack's SEO crawler for its own DOM-scraping passes.

use scraper::{Html, Selector};
use url::Url;

use crate::PageMetadata;

pub fn extract_metadata(html: &str, harvest_json_ld: bool) -> PageMetadata {
    let document = Html::parse_document(html);

    let title_selector = Selector::parse("title").expect("static selector");
    let title = document
        .select(&title_selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty());

    let description_selector =
        Selector::parse("meta[name='description']").expect("static selector");
    let description = document
        .select(&description_selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(str::to_string);

    let json_ld = if harvest_json_ld {
        let selector = Selector::parse("script[type='application/ld+json']").expect("static selector");
        document
            .select(&selector)
            .filter_map(|el| {
                let text = el.text().collect::<String>();
                serde_json::from_str(&text).ok()
            })
            .collect()
    } else {
        Vec::new()
    };

    PageMetadata {
        title,
        description,
        json_ld,
        candidate_json_endpoints: Vec::new(),
    }
}

/// Extract `href`s from `<a>` tags, resolved to absolute URLs against
/// `base_url`. Malformed or non-http(s) links are dropped rather than
/// surfaced as errors — the caller (C6) applies include/exclude
/// pattern and same-host filtering on top of this raw list.
pub fn extract_links(html: &str, base_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").expect("static selector");

    let mut links: Vec<String> = document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(|url| {
            let mut url = url;
            url.set_fragment(None);
            url.to_string()
        })
        .collect();

    links.dedup();
    links
}

/// A deliberately simple HTML→text projection: strip tags, collapse
/// whitespace. Good enough to hand a model a readable page preview;
/// not a faithful Markdown converter.
pub fn html_to_markdown(html: &str) -> String {
    let document = Html::parse_document(html);
    let body_selector = Selector::parse("body").expect("static selector");
    let root = document
        .select(&body_selector)
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .unwrap_or_else(|| document.root_element().text().collect::<Vec<_>>().join(" "));

    root.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <html>
            <head>
                <title>Example Domain</title>
                <meta name="description" content="An example page">
            </head>
            <body>
                <h1>Example Domain</h1>
                <a href="/about">About</a>
                <a href="https://other.example/page">External</a>
                <a href="mailto:hi@example.com">Mail</a>
            </body>
        </html>
    "#;

    #[test]
    fn extracts_title_and_description() {
        let meta = extract_metadata(SAMPLE, false);
        assert_eq!(meta.title.as_deref(), Some("Example Domain"));
        assert_eq!(meta.description.as_deref(), Some("An example page"));
    }

    #[test]
    fn extracts_and_resolves_links_dropping_non_http_schemes() {
        let links = extract_links(SAMPLE, "https://example.com/");
        assert!(links.contains(&"https://example.com/about".to_string()));
        assert!(links.contains(&"https://other.example/page".to_string()));
        assert!(!links.iter().any(|l| l.starts_with("mailto:")));
    }

    #[test]
    fn markdown_projection_contains_page_text() {
        let markdown = html_to_markdown(SAMPLE);
        assert!(markdown.contains("Example Domain"));
    }
}
