//! Feed icon resolution.
//!
//! The site page a feed links to is arbitrary HTML, so it is scanned with
//! plain substring search instead of the markup dispatcher.

use crate::feed::fetcher::{Fetcher, RefreshOptions};
use image::imageops::FilterType;
use image::RgbaImage;

/// Fetches, decodes and scales the icon of the site at `link`.
///
/// Uses the page's `<link rel="icon">` (or `"shortcut icon"`) target when
/// present, `<scheme>://<host>/favicon.ico` otherwise. Every failure is
/// logged and yields `None`.
pub async fn resolve_icon(
    fetcher: &dyn Fetcher,
    link: &str,
    options: RefreshOptions,
) -> Option<RgbaImage> {
    if link.is_empty() {
        return None;
    }
    let icon_url = locate_icon(fetcher, link, options).await?;

    let bytes = match fetcher.fetch(&icon_url, options.timeout).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(icon = %icon_url, error = %e, "Icon download failed");
            return None;
        }
    };

    match decode_icon(&bytes, options.icon_size) {
        Ok(icon) => Some(icon),
        Err(e) => {
            tracing::debug!(icon = %icon_url, error = %e, "Icon decode failed");
            None
        }
    }
}

async fn locate_icon(fetcher: &dyn Fetcher, link: &str, options: RefreshOptions) -> Option<String> {
    let root = site_root(link)?;

    let page = match fetcher.fetch(link, options.timeout).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::debug!(link = %link, error = %e, "Site page download failed");
            String::new()
        }
    };

    Some(match find_icon_href(&page) {
        Some(href) => resolve_url(href, link),
        None => format!("{root}favicon.ico"),
    })
}

/// `<scheme>://<host>[:port]/` of `link`.
fn site_root(link: &str) -> Option<String> {
    let url = url::Url::parse(link).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}://{}:{}/", url.scheme(), host, port),
        None => format!("{}://{}/", url.scheme(), host),
    })
}

/// Decodes any supported image format and scales it to `size`×`size`.
pub fn decode_icon(bytes: &[u8], size: u32) -> Result<RgbaImage, image::ImageError> {
    let image = image::load_from_memory(bytes)?.to_rgba8();
    if image.width() == size && image.height() == size {
        return Ok(image);
    }
    Ok(image::imageops::resize(&image, size, size, FilterType::Triangle))
}

/// Finds the `href` of the first icon `<link>` in raw HTML.
///
/// Handles either quote style and any attribute order. Returns the value
/// with its original case.
fn find_icon_href(html: &str) -> Option<&str> {
    // ASCII lowering keeps byte offsets aligned with `html`.
    let html_lower = html.to_ascii_lowercase();
    let mut search_from = 0;

    while let Some(link_start) = html_lower[search_from..].find("<link") {
        let abs_start = search_from + link_start;
        let remaining = &html_lower[abs_start..];

        let tag_end = remaining.find('>')?;
        let tag = &remaining[..=tag_end];

        let is_icon = extract_attr_value(tag, "rel")
            .is_some_and(|rel| rel.starts_with("icon") || rel.starts_with("shortcut icon"));
        if is_icon {
            let original_tag = &html[abs_start..abs_start + tag_end + 1];
            if let Some(href) = extract_attr_value(original_tag, "href") {
                return Some(href);
            }
        }

        search_from = abs_start + tag_end + 1;
    }

    None
}

/// Extracts the quoted value of an attribute from a tag string.
///
/// The attribute name must follow ASCII whitespace, so `rel=` does not
/// match inside `data-rel=`.
fn extract_attr_value<'a>(tag: &'a str, attr_name: &str) -> Option<&'a str> {
    let tag_lower = tag.to_ascii_lowercase();
    let attr_prefix = format!("{attr_name}=");

    let attr_start = tag_lower
        .match_indices(&attr_prefix)
        .map(|(index, _)| index)
        .find(|&index| index > 0 && tag_lower.as_bytes()[index - 1].is_ascii_whitespace())?;
    let rest = &tag[attr_start + attr_prefix.len()..];

    let quote = *rest.as_bytes().first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }

    let inner = &rest[1..];
    let end = inner.find(quote as char)?;
    Some(&inner[..end])
}

/// Resolves a potentially relative URL against a base URL.
fn resolve_url(href: &str, base_url: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_owned();
    }

    if let Ok(base) = url::Url::parse(base_url) {
        if let Ok(resolved) = base.join(href) {
            return resolved.to_string();
        }
    }

    href.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::fetcher::{HttpFetcher, MAX_RESPONSE_BYTES};
    use image::{DynamicImage, ImageFormat, Rgba};
    use std::io::Cursor;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn png(size: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(size, size, Rgba([200, 10, 10, 255]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(reqwest::Client::new(), MAX_RESPONSE_BYTES)
    }

    #[test]
    fn test_find_icon_link() {
        let html = r#"<html><head><link rel="stylesheet" href="/s.css"><link rel="icon" href="/Img/Fav.png"></head></html>"#;
        assert_eq!(find_icon_href(html), Some("/Img/Fav.png"));
    }

    #[test]
    fn test_find_shortcut_icon_single_quotes_reversed() {
        let html = "<LINK href='https://cdn.example.com/f.ico' rel='shortcut icon'>";
        assert_eq!(find_icon_href(html), Some("https://cdn.example.com/f.ico"));
    }

    #[test]
    fn test_no_icon_link() {
        let html = r#"<link rel="alternate" href="/feed.xml"><p>hi</p>"#;
        assert_eq!(find_icon_href(html), None);
        assert_eq!(find_icon_href("<link rel=\"icon\" href=\"x\""), None);
    }

    #[test]
    fn test_find_icon_with_whitespace_separated_attributes() {
        let html = "<head>\n<link\n\trel=\"icon\"\n\thref=\"/tabbed.png\">";
        assert_eq!(find_icon_href(html), Some("/tabbed.png"));

        let html = "<link\nrel=\"shortcut icon\"\nhref=\"/nl.ico\">";
        assert_eq!(find_icon_href(html), Some("/nl.ico"));
    }

    #[test]
    fn test_prefixed_attribute_is_not_matched() {
        let html = r#"<link data-rel="icon" rel="stylesheet" href="/s.css">"#;
        assert_eq!(find_icon_href(html), None);
    }

    #[test]
    fn test_non_ascii_page_does_not_misalign() {
        let html = "<title>Ünïcödé</title><link rel=\"icon\" href=\"/ok.png\">";
        assert_eq!(find_icon_href(html), Some("/ok.png"));
    }

    #[test]
    fn test_site_root() {
        assert_eq!(
            site_root("https://example.com/blog/post"),
            Some("https://example.com/".to_owned())
        );
        assert_eq!(
            site_root("http://127.0.0.1:8080/x"),
            Some("http://127.0.0.1:8080/".to_owned())
        );
        assert_eq!(site_root("not a url"), None);
    }

    #[test]
    fn test_decode_icon_rescales() {
        let icon = decode_icon(&png(32), 16).unwrap();
        assert_eq!(icon.dimensions(), (16, 16));

        let icon = decode_icon(&png(16), 16).unwrap();
        assert_eq!(icon.dimensions(), (16, 16));

        assert!(decode_icon(b"not an image", 16).is_err());
    }

    #[tokio::test]
    async fn test_resolve_icon_from_link_tag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blog"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"<html><link rel="icon" href="/static/me.png"></html>"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/static/me.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png(48)))
            .mount(&server)
            .await;

        let icon = resolve_icon(
            &fetcher(),
            &format!("{}/blog", server.uri()),
            RefreshOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(icon.dimensions(), (16, 16));
    }

    #[tokio::test]
    async fn test_resolve_icon_falls_back_to_favicon() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blog/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/favicon.ico"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png(16)))
            .expect(1)
            .mount(&server)
            .await;

        let icon = resolve_icon(
            &fetcher(),
            &format!("{}/blog/", server.uri()),
            RefreshOptions::default(),
        )
        .await;
        assert!(icon.is_some());
    }

    #[tokio::test]
    async fn test_resolve_icon_failure_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let icon = resolve_icon(&fetcher(), &server.uri(), RefreshOptions::default()).await;
        assert!(icon.is_none());
        assert!(resolve_icon(&fetcher(), "", RefreshOptions::default())
            .await
            .is_none());
    }
}
