//! Rendered HTML to Markdown with boilerplate removal.
//!
//! Extraction favors precision over recall: navigation chrome, ads, comment
//! threads and link farms are dropped even if that occasionally costs a
//! paragraph of real content. Tables are kept.
//!
//! Pipeline:
//! 1. Detach comment nodes and boilerplate elements from the parsed tree
//! 2. Pick the main-content root (`main`, `article`, common content
//!    containers) when it holds enough text, else `body`
//! 3. Prune short, link-dense blocks inside that root
//! 4. Convert with `htmd` and normalize blank lines

use std::collections::HashSet;
use std::sync::LazyLock;

use ego_tree::NodeId;
use htmd::HtmlToMarkdown;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::error::CrawlError;

/// Documents larger than this are rejected instead of parsed.
pub const MAX_HTML_SIZE: usize = 10 * 1024 * 1024;

/// Minimum text a content container must hold to be preferred over `body`.
const MIN_MAIN_TEXT_CHARS: usize = 120;

/// Blocks shorter than this are candidates for link-density pruning.
const LINK_BLOCK_MAX_CHARS: usize = 400;

/// Share of a block's text inside links above which it counts as navigation.
const MAX_LINK_DENSITY: f64 = 0.6;

#[allow(clippy::expect_used)]
static BOILERPLATE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "script, style, noscript, template, iframe, svg, canvas, object, embed, \
         nav, aside, form, button, dialog, \
         [role='navigation'], [role='banner'], [role='contentinfo'], \
         [role='complementary'], [role='dialog'], [aria-hidden='true']",
    )
    .expect("BUG: hardcoded boilerplate selector is invalid")
});

#[allow(clippy::expect_used)]
static PAGE_CHROME: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("header, footer").expect("BUG: hardcoded selector 'header, footer' is invalid")
});

#[allow(clippy::expect_used)]
static NAMED_ELEMENTS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("[class], [id]").expect("BUG: hardcoded selector '[class], [id]' is invalid")
});

#[allow(clippy::expect_used)]
static BOILERPLATE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:^|[\s_-])(?:ads?|advert\w*|sponsor\w*|cookies?|consent|gdpr|sidebar|share|sharing|social|comments?|newsletter|subscribe|related|breadcrumbs?|popup|modal|promo)(?:$|[\s_-])",
    )
    .expect("BUG: hardcoded boilerplate name regex is invalid")
});

#[allow(clippy::expect_used)]
static CONTENT_ROOTS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        "main",
        "article",
        "[role='main']",
        "#main-content",
        ".main-content",
        "[itemprop='articleBody']",
        ".post-content",
        ".entry-content",
        ".article-body",
        ".article-content",
        "#content",
        ".content",
    ]
    .iter()
    .map(|css| Selector::parse(css).expect("BUG: hardcoded content selector is invalid"))
    .collect()
});

#[allow(clippy::expect_used)]
static BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("BUG: hardcoded selector 'body' is invalid"));

#[allow(clippy::expect_used)]
static PRUNABLE_BLOCKS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div, section, ul, ol, p")
        .expect("BUG: hardcoded selector for prunable blocks is invalid")
});

#[allow(clippy::expect_used)]
static LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("BUG: hardcoded selector 'a' is invalid"));

#[allow(clippy::expect_used)]
static IMAGES: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img").expect("BUG: hardcoded selector 'img' is invalid"));

#[allow(clippy::expect_used)]
static TITLE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("title, h1").expect("BUG: hardcoded selector 'title, h1' is invalid")
});

#[allow(clippy::expect_used)]
static EXCESS_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("BUG: hardcoded blank line regex is invalid"));

/// Elements whose text never counts as visible.
const INVISIBLE_TAGS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Elements never removed by class/id matching.
const PROTECTED_TAGS: &[&str] = &["html", "body", "main", "article"];

/// Markdown extracted from one rendered page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedMarkdown {
    pub markdown: String,
    /// Absolute image URLs in document order, without duplicates.
    pub images: Vec<String>,
    pub title: Option<String>,
}

/// Converts rendered HTML into Markdown, dropping boilerplate.
///
/// `base_url` resolves relative image sources.
///
/// # Errors
///
/// Returns a content-extraction error when the document is too large or the
/// converter fails.
pub fn html_to_markdown(html: &str, base_url: &str) -> Result<ExtractedMarkdown, CrawlError> {
    if html.len() > MAX_HTML_SIZE {
        return Err(CrawlError::content_extraction(format!(
            "HTML too large to extract: {} bytes (limit {MAX_HTML_SIZE})",
            html.len()
        )));
    }

    let mut document = Html::parse_document(html);
    let title = document_title(&document);

    let doomed = boilerplate_nodes(&document);
    detach_all(&mut document, doomed);

    let Some(root_id) = content_root(&document) else {
        return Ok(ExtractedMarkdown {
            title,
            ..ExtractedMarkdown::default()
        });
    };

    let link_farms = link_dense_blocks(&document, root_id);
    detach_all(&mut document, link_farms);

    let Some(root) = document.tree.get(root_id).and_then(ElementRef::wrap) else {
        return Ok(ExtractedMarkdown {
            title,
            ..ExtractedMarkdown::default()
        });
    };

    let images = collect_images(root, base_url);
    let converter = HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "noscript", "template", "head"])
        .build();
    let markdown = converter
        .convert(&root.html())
        .map_err(|error| CrawlError::content_extraction(format!("Markdown conversion failed: {error}")))?;

    Ok(ExtractedMarkdown {
        markdown: normalize_markdown(&markdown),
        images,
        title,
    })
}

/// Visible text of an HTML document, one trimmed text run per line.
#[must_use]
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut lines: Vec<String> = Vec::new();
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|element| INVISIBLE_TAGS.contains(&element.value().name()));
        if hidden {
            continue;
        }
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !collapsed.is_empty() {
            lines.push(collapsed);
        }
    }
    lines.join("\n")
}

fn document_title(document: &Html) -> Option<String> {
    document
        .select(&TITLE)
        .map(|element| element.text().collect::<Vec<_>>().join(" "))
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .find(|text| !text.is_empty())
}

fn boilerplate_nodes(document: &Html) -> Vec<NodeId> {
    let mut doomed: Vec<_> = document
        .tree
        .nodes()
        .filter(|node| node.value().is_comment())
        .map(|node| node.id())
        .collect();

    doomed.extend(document.select(&BOILERPLATE).map(|element| element.id()));

    doomed.extend(
        document
            .select(&PAGE_CHROME)
            .filter(|element| !inside_content(*element))
            .map(|element| element.id()),
    );

    doomed.extend(
        document
            .select(&NAMED_ELEMENTS)
            .filter(|element| !PROTECTED_TAGS.contains(&element.value().name()))
            .filter(|element| {
                let value = element.value();
                let names = format!(
                    "{} {}",
                    value.attr("class").unwrap_or_default(),
                    value.attr("id").unwrap_or_default()
                );
                BOILERPLATE_NAME.is_match(&names)
            })
            .map(|element| element.id()),
    );
    doomed
}

fn inside_content(element: ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| matches!(ancestor.value().name(), "article" | "main"))
}

fn detach_all(document: &mut Html, ids: Vec<NodeId>) {
    for id in ids {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn text_len(element: ElementRef<'_>) -> usize {
    element.text().map(|text| text.trim().chars().count()).sum()
}

fn content_root(document: &Html) -> Option<NodeId> {
    CONTENT_ROOTS
        .iter()
        .find_map(|selector| {
            document
                .select(selector)
                .find(|element| text_len(*element) >= MIN_MAIN_TEXT_CHARS)
        })
        .or_else(|| document.select(&BODY).next())
        .map(|element| element.id())
}

fn link_dense_blocks(document: &Html, root_id: NodeId) -> Vec<NodeId> {
    let Some(root) = document.tree.get(root_id).and_then(ElementRef::wrap) else {
        return Vec::new();
    };

    root.select(&PRUNABLE_BLOCKS)
        .filter(|block| block.id() != root_id)
        .filter(|block| {
            let total = text_len(*block);
            if total == 0 || total > LINK_BLOCK_MAX_CHARS {
                return false;
            }
            let links: Vec<_> = block.select(&LINKS).collect();
            if links.len() < 2 {
                return false;
            }
            let linked: usize = links.iter().map(|link| text_len(*link)).sum();
            #[allow(clippy::cast_precision_loss)]
            let density = linked as f64 / total as f64;
            density > MAX_LINK_DENSITY
        })
        .map(|block| block.id())
        .collect()
}

fn collect_images(root: ElementRef<'_>, base_url: &str) -> Vec<String> {
    let base = Url::parse(base_url).ok();
    let mut seen: HashSet<String> = HashSet::new();
    let mut images = Vec::new();

    for image in root.select(&IMAGES) {
        let value = image.value();
        let Some(source) = value
            .attr("src")
            .or_else(|| value.attr("data-src"))
            .map(str::trim)
            .filter(|source| !source.is_empty() && !source.starts_with("data:"))
        else {
            continue;
        };

        let resolved = match &base {
            Some(base) => base.join(source).ok(),
            None => Url::parse(source).ok(),
        };
        let Some(resolved) = resolved.filter(|url| matches!(url.scheme(), "http" | "https")) else {
            continue;
        };

        let resolved = resolved.to_string();
        if seen.insert(resolved.clone()) {
            images.push(resolved);
        }
    }
    images
}

fn normalize_markdown(markdown: &str) -> String {
    let trimmed_lines = markdown
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    EXCESS_BLANK_LINES
        .replace_all(&trimmed_lines, "\n\n")
        .trim()
        .to_string()
}
