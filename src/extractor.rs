use crate::embed;
use crate::error::GuardError;
use crate::fetcher::FetchResult;
use crate::utils::{absolutize_url, truncate_str};
use crate::PreviewResult;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;
use url::Url;

/// Longest display width kept for any single preview field.
const MAX_FIELD_WIDTH: usize = 500;

const JSON_TITLE_KEYS: &[&str] = &["title", "name", "headline"];
const JSON_DESCRIPTION_KEYS: &[&str] = &["description", "summary", "excerpt"];
const JSON_IMAGE_KEYS: &[&str] = &["image", "image_url", "thumbnail", "thumbnail_url"];
const JSON_SITE_KEYS: &[&str] = &["site_name", "siteName", "provider_name"];

/// Metadata extractor, turning a fetched body into a [`PreviewResult`].
///
/// Never fails: missing or unreadable fields come back as empty strings.
#[derive(Debug, Clone, Default)]
pub struct MetadataExtractor;

impl MetadataExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract_fetch(&self, result: &FetchResult, original_url: &str) -> PreviewResult {
        let body = result.text();
        let content_type = result.content_type();
        let mut preview = self.extract(
            &body,
            content_type.as_deref(),
            &result.final_url,
            original_url,
        );
        preview.status = Some(result.status.as_u16());
        preview
    }

    /// `page_url` is where the body came from (after redirects); relative links
    /// resolve against it. `original_url` is what the caller asked for.
    pub fn extract(
        &self,
        body: &str,
        content_type: Option<&str>,
        page_url: &Url,
        original_url: &str,
    ) -> PreviewResult {
        let original = Url::parse(original_url).unwrap_or_else(|_| page_url.clone());

        let mut preview = PreviewResult {
            url: original_url.to_string(),
            final_url: page_url.to_string(),
            content_type: content_type.unwrap_or_default().to_string(),
            kind: "website".to_string(),
            ..Default::default()
        };

        if looks_like_json(content_type, body) {
            match self.extract_json(body) {
                Ok(fields) => fields.apply(&mut preview, page_url),
                Err(e) => {
                    e.log();
                }
            }
        } else {
            self.extract_html(body, page_url).apply(&mut preview, page_url);
        }

        if preview.site_name.is_empty() {
            preview.site_name = original.host_str().unwrap_or_default().to_string();
        }

        if let Some(video) = embed::video_embed(&original) {
            debug!(video_id = %video.video_id, "Recognized embeddable video");
            apply_video(&mut preview, video);
        }

        normalize(&mut preview);
        preview
    }

    /// Preview synthesised from the URL alone, for recognised video links.
    pub fn video_preview(&self, url: &Url, original_url: &str) -> Option<PreviewResult> {
        let video = embed::video_embed(url)?;
        let mut preview = PreviewResult {
            url: original_url.to_string(),
            final_url: url.to_string(),
            ..Default::default()
        };
        apply_video(&mut preview, video);
        Some(preview)
    }

    fn extract_html(&self, html: &str, page_url: &Url) -> Fields {
        let document = Html::parse_document(html);

        let title = meta_content(
            &document,
            &["meta[property='og:title']", "meta[name='twitter:title']"],
        )
        .or_else(|| {
            let selector = Selector::parse("title").ok()?;
            document
                .select(&selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .filter(|s| !s.is_empty())
        });

        let description = meta_content(
            &document,
            &[
                "meta[property='og:description']",
                "meta[name='twitter:description']",
                "meta[name='description']",
            ],
        );

        let image = meta_content(
            &document,
            &[
                "meta[property='og:image']",
                "meta[name='twitter:image']",
                "meta[name='twitter:image:src']",
                "meta[itemprop='image']",
            ],
        );

        let site_name = meta_content(&document, &["meta[property='og:site_name']"]);
        let kind = meta_content(&document, &["meta[property='og:type']"]);

        debug!(
            url = %page_url,
            has_title = title.is_some(),
            has_image = image.is_some(),
            "Extracted HTML metadata"
        );

        Fields {
            title,
            description,
            image,
            site_name,
            kind,
        }
    }

    /// Whitelisted projection of a JSON object. Nothing outside the known keys
    /// is ever copied into the preview.
    fn extract_json(&self, body: &str) -> Result<Fields, GuardError> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| GuardError::ParseError(format!("invalid JSON body: {e}")))?;

        let object = value
            .as_object()
            .ok_or_else(|| GuardError::ParseError("JSON body is not an object".into()))?;

        let pick = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| object.get(*key))
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .find(|s| !s.is_empty())
        };

        Ok(Fields {
            title: pick(JSON_TITLE_KEYS),
            description: pick(JSON_DESCRIPTION_KEYS),
            image: pick(JSON_IMAGE_KEYS),
            site_name: pick(JSON_SITE_KEYS),
            kind: None,
        })
    }
}

#[derive(Debug, Default)]
struct Fields {
    title: Option<String>,
    description: Option<String>,
    image: Option<String>,
    site_name: Option<String>,
    kind: Option<String>,
}

impl Fields {
    fn apply(self, preview: &mut PreviewResult, page_url: &Url) {
        preview.title = self.title.unwrap_or_default();
        preview.description = self.description.unwrap_or_default();
        preview.image_url = self
            .image
            .and_then(|image| absolutize_url(page_url, &image))
            .unwrap_or_default();
        preview.site_name = self.site_name.unwrap_or_default();
        if let Some(kind) = self.kind {
            preview.kind = kind;
        }
    }
}

fn apply_video(preview: &mut PreviewResult, video: crate::VideoEmbed) {
    if preview.title.is_empty() {
        preview.title = "YouTube Video".to_string();
    }
    if preview.description.is_empty() {
        preview.description = "Video on YouTube".to_string();
    }
    if preview.image_url.is_empty() {
        preview.image_url = video.image_url.clone();
    }
    preview.site_name = "YouTube".to_string();
    preview.kind = "video".to_string();
    preview.video = Some(video);
}

fn normalize(preview: &mut PreviewResult) {
    for field in [
        &mut preview.title,
        &mut preview.description,
        &mut preview.site_name,
        &mut preview.kind,
    ] {
        *field = truncate_str(field.trim(), MAX_FIELD_WIDTH);
    }
}

fn meta_content(document: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|raw| {
        let selector = Selector::parse(raw).ok()?;
        document
            .select(&selector)
            .filter_map(|el| el.value().attr("content"))
            .map(|s| s.trim().to_string())
            .find(|s| !s.is_empty())
    })
}

fn looks_like_json(content_type: Option<&str>, body: &str) -> bool {
    match content_type {
        Some(media) if media.contains("json") => true,
        Some(media) if media.contains("html") || media.contains("xml") => false,
        _ => {
            let trimmed = body.trim_start();
            trimmed.starts_with('{') || trimmed.starts_with('[')
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://example.com/articles/one").unwrap()
    }

    fn html_preview(html: &str, content_type: Option<&str>) -> PreviewResult {
        MetadataExtractor::new().extract(html, content_type, &page(), "https://example.com/a")
    }

    #[test]
    fn test_open_graph_tags() {
        let html = r#"<html><head>
            <title>Fallback</title>
            <meta property="og:title" content="  OG Title ">
            <meta property="og:description" content="OG description">
            <meta property="og:image" content="/images/cover.png">
            <meta property="og:site_name" content="Example">
            <meta property="og:type" content="article">
        </head></html>"#;

        let preview = html_preview(html, Some("text/html"));

        assert_eq!(preview.title, "OG Title");
        assert_eq!(preview.description, "OG description");
        assert_eq!(preview.image_url, "https://example.com/images/cover.png");
        assert_eq!(preview.site_name, "Example");
        assert_eq!(preview.kind, "article");
        assert_eq!(preview.content_type, "text/html");
        assert!(preview.video.is_none());
    }

    #[test]
    fn test_twitter_and_generic_fallbacks() {
        let html = r#"<html><head>
            <title> Plain title </title>
            <meta name="description" content="Plain description">
            <meta name="twitter:image:src" content="https://cdn.example.net/t.jpg">
        </head></html>"#;

        let preview = html_preview(html, None);

        assert_eq!(preview.title, "Plain title");
        assert_eq!(preview.description, "Plain description");
        assert_eq!(preview.image_url, "https://cdn.example.net/t.jpg");
        assert_eq!(preview.site_name, "example.com");
        assert_eq!(preview.kind, "website");

        let html = r#"<meta name="twitter:title" content="Card title">
            <meta name="twitter:description" content="Card description">"#;
        let preview = html_preview(html, Some("text/html"));
        assert_eq!(preview.title, "Card title");
        assert_eq!(preview.description, "Card description");
    }

    #[test]
    fn test_malformed_html_degrades() {
        let html = "<html><head><meta property=\"og:title\" content=\"Broken<title>unterminated";
        let preview = html_preview(html, Some("text/html"));

        assert_eq!(preview.description, "");
        assert_eq!(preview.image_url, "");
        assert_eq!(preview.url, "https://example.com/a");
    }

    #[test]
    fn test_json_projection_is_whitelisted() {
        let body = r#"{
            "title": "Instance",
            "description": "Metadata service",
            "AccessKeyId": "AKIAEXAMPLE",
            "SecretAccessKey": "wJalrXUtnFEMI",
            "Token": "secret-token"
        }"#;

        let preview = MetadataExtractor::new().extract(
            body,
            Some("application/json"),
            &page(),
            "https://example.com/a",
        );
        let rendered = serde_json::to_string(&preview).unwrap();

        assert_eq!(preview.title, "Instance");
        assert_eq!(preview.description, "Metadata service");
        assert!(!rendered.contains("AKIAEXAMPLE"));
        assert!(!rendered.contains("wJalrXUtnFEMI"));
        assert!(!rendered.contains("secret-token"));
    }

    #[test]
    fn test_malformed_json_degrades() {
        let preview = MetadataExtractor::new().extract(
            "{\"title\": \"unterminated",
            Some("application/json"),
            &page(),
            "https://example.com/a",
        );

        assert_eq!(preview.title, "");
        assert_eq!(preview.site_name, "example.com");

        let preview = MetadataExtractor::new().extract(
            "[1, 2, 3]",
            None,
            &page(),
            "https://example.com/a",
        );
        assert_eq!(preview.title, "");
    }

    #[test]
    fn test_video_metadata_merges_with_og() {
        let html = r#"<meta property="og:title" content="Never Gonna Give You Up">"#;
        let page = Url::parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();

        let preview =
            MetadataExtractor::new().extract(html, Some("text/html"), &page, page.as_str());

        assert_eq!(preview.title, "Never Gonna Give You Up");
        assert_eq!(preview.description, "Video on YouTube");
        assert_eq!(preview.site_name, "YouTube");
        assert_eq!(preview.kind, "video");
        assert_eq!(
            preview.image_url,
            "https://img.youtube.com/vi/dQw4w9WgXcQ/maxresdefault.jpg"
        );
        assert_eq!(preview.video.unwrap().video_id, "dQw4w9WgXcQ");
    }

    #[test]
    fn test_video_preview_without_fetch() {
        let url = Url::parse("https://youtu.be/dQw4w9WgXcQ").unwrap();

        let preview = MetadataExtractor::new()
            .video_preview(&url, "https://youtu.be/dQw4w9WgXcQ")
            .unwrap();
        assert_eq!(preview.title, "YouTube Video");
        assert_eq!(preview.description, "Video on YouTube");
        assert!(preview.status.is_none());

        let other = Url::parse("https://example.com/").unwrap();
        assert!(MetadataExtractor::new()
            .video_preview(&other, "https://example.com/")
            .is_none());
    }
}
