//! Page snapshot extraction
//!
//! Each fetched page is parsed exactly once into [`PageFacts`], a plain
//! serializable digest of everything the automated checker and the twelve
//! axis slicers need. No DOM handles escape this module; downstream
//! consumers only ever see JSON-representable data.
//!
//! Parsing is CPU-bound and runs on a blocking task in the pipeline.

pub mod slices;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::json;

use barriercheck_core::domain::{CrawlOutcome, SiteSnapshot, SnapshotSlice};
use barriercheck_core::domain::Axis;

fn sel(selector: &str) -> Selector {
    Selector::parse(selector).expect("static selector")
}

/// One heading with its level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

/// Facts about one image-like element
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageFacts {
    /// `img`, `svg` or `object`
    pub kind: String,
    pub src: Option<String>,
    pub alt: Option<String>,
    pub role: Option<String>,
    pub aria_label: Option<String>,
    pub aria_labelledby: Option<String>,
    pub aria_describedby: Option<String>,
    /// Figure caption text when the element sits inside a `<figure>`
    pub figure_caption: Option<String>,
    /// Nearby text, a cheap proxy for the element's context
    pub context: Option<String>,
}

/// Facts about one audio/video element or recognized hosting embed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFacts {
    /// `video`, `audio` or `embed`
    pub kind: String,
    pub src: Option<String>,
    /// Host name for iframe embeds (youtube, vimeo)
    pub provider: Option<String>,
    pub has_caption_track: bool,
    pub has_description_track: bool,
    pub autoplay: bool,
    pub controls: bool,
    pub title: Option<String>,
}

/// One form field with its labelling facts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldFacts {
    pub tag: String,
    pub input_type: Option<String>,
    pub id: Option<String>,
    pub name: Option<String>,
    pub label: Option<String>,
    pub aria_label: Option<String>,
    pub aria_labelledby: Option<String>,
    pub aria_describedby: Option<String>,
    pub placeholder: Option<String>,
    pub required: bool,
    pub aria_required: bool,
    pub autocomplete: Option<String>,
    pub in_fieldset_with_legend: bool,
}

/// One form and its fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormFacts {
    pub action: Option<String>,
    pub fields: Vec<FieldFacts>,
    pub has_submit: bool,
    /// Count of controls submitting or navigating onchange
    pub onchange_handlers: usize,
}

/// One link with its text facts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkFacts {
    pub href: String,
    pub text: String,
    pub aria_label: Option<String>,
    pub target_blank: bool,
    /// Link sits inside a `<nav>` element
    pub in_nav: bool,
}

/// One table with header facts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableFacts {
    pub header_cells: usize,
    pub has_caption: bool,
    pub rows: usize,
}

/// Landmark element or explicit ARIA landmark role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandmarkFacts {
    pub name: String,
    pub label: Option<String>,
}

/// Serializable digest of one parsed page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageFacts {
    pub url: String,
    pub status: u16,
    pub title: Option<String>,
    pub lang: Option<String>,
    pub headings: Vec<Heading>,
    pub images: Vec<ImageFacts>,
    pub media: Vec<MediaFacts>,
    /// Links whose text suggests a transcript
    pub transcript_links: Vec<String>,
    pub landmarks: Vec<LandmarkFacts>,
    pub forms: Vec<FormFacts>,
    pub links: Vec<LinkFacts>,
    /// In-page anchors near the top of the document
    pub skip_links: Vec<LinkFacts>,
    pub tables: Vec<TableFacts>,
    pub list_counts: ListCounts,
    pub iframes: Vec<IframeFacts>,
    /// Every `id` attribute in document order, for duplicate detection
    pub ids: Vec<String>,
    pub aria_roles: Vec<String>,
    /// Explicit `tabindex` values
    pub tabindexes: Vec<i32>,
    /// `style` attribute fragments mentioning colors
    pub inline_colors: Vec<String>,
    /// Declared font sizes from inline styles and style blocks
    pub font_sizes: Vec<String>,
    pub meta_refresh: Option<String>,
    pub viewport: Option<String>,
    pub marquee_blink_count: usize,
    /// Class names / style fragments suggesting animation or autoplay
    pub animation_markers: Vec<String>,
    pub respects_reduced_motion: bool,
    /// div/span elements carrying click handlers
    pub clickable_non_interactive: usize,
    pub accesskeys: Vec<String>,
    /// `lang` attributes on elements other than `<html>`
    pub part_langs: Vec<String>,
}

/// Counts of list structures
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListCounts {
    pub unordered: usize,
    pub ordered: usize,
    pub definition: usize,
}

/// One iframe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IframeFacts {
    pub src: Option<String>,
    pub title: Option<String>,
}

/// Parse every successfully fetched page into its facts digest.
pub fn parse_pages(outcome: &CrawlOutcome) -> Vec<PageFacts> {
    outcome
        .pages
        .iter()
        .filter(|p| p.is_ok())
        .map(parse_page)
        .collect()
}

/// Build the base snapshot and all twelve axis slices.
pub fn extract_site_snapshot(outcome: &CrawlOutcome, facts: &[PageFacts]) -> SiteSnapshot {
    let base = json!({
        "base_url": outcome.base_url,
        "pages_crawled": outcome.pages_crawled(),
        "pages_failed": outcome.pages_failed(),
        "truncated": outcome.truncated,
        "pages": facts.iter().map(|f| json!({
            "url": f.url,
            "title": f.title,
            "lang": f.lang,
            "headings": f.headings.len(),
            "images": f.images.len(),
            "media": f.media.len(),
            "forms": f.forms.len(),
            "links": f.links.len(),
        })).collect::<Vec<_>>(),
    });

    let slices = Axis::ALL
        .iter()
        .map(|&axis| SnapshotSlice {
            axis,
            data: slices::slice_for(axis, facts),
        })
        .collect();

    SiteSnapshot {
        base_url: outcome.base_url.clone(),
        pages_crawled: outcome.pages_crawled(),
        pages_failed: outcome.pages_failed(),
        base,
        slices,
    }
}

fn attr(el: &ElementRef, name: &str) -> Option<String> {
    el.value().attr(name).map(|v| v.trim().to_string())
}

fn text_of(el: &ElementRef) -> String {
    el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut cut = max;
        while cut > 0 && !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
    }
    s
}

/// Parse one page's serialized DOM into its facts.
pub fn parse_page(page: &barriercheck_core::domain::PageSnapshot) -> PageFacts {
    let document = Html::parse_document(&page.html);

    let headings = {
        let selector = sel("h1, h2, h3, h4, h5, h6");
        document
            .select(&selector)
            .map(|h| Heading {
                level: h.value().name().as_bytes()[1] - b'0',
                text: truncate(text_of(&h), 200),
            })
            .collect()
    };

    let mut images: Vec<ImageFacts> = Vec::new();
    for img in document.select(&sel("img")) {
        images.push(image_facts("img", &img, attr(&img, "src"), attr(&img, "alt")));
    }
    for svg in document.select(&sel("svg[role=\"img\"], svg[role=\"graphics-document\"]")) {
        images.push(image_facts("svg", &svg, None, None));
    }
    for object in document.select(&sel("object")) {
        images.push(image_facts("object", &object, attr(&object, "data"), None));
    }

    let mut media: Vec<MediaFacts> = Vec::new();
    for kind in ["video", "audio"] {
        let selector = sel(kind);
        for el in document.select(&selector) {
            let track = sel("track");
            let tracks: Vec<ElementRef> = el.select(&track).collect();
            media.push(MediaFacts {
                kind: kind.to_string(),
                src: attr(&el, "src").or_else(|| {
                    el.select(&sel("source")).next().and_then(|s| attr(&s, "src"))
                }),
                provider: None,
                has_caption_track: tracks
                    .iter()
                    .any(|t| attr(t, "kind").as_deref() == Some("captions")
                        || attr(t, "kind").as_deref() == Some("subtitles")),
                has_description_track: tracks
                    .iter()
                    .any(|t| attr(t, "kind").as_deref() == Some("descriptions")),
                autoplay: el.value().attr("autoplay").is_some(),
                controls: el.value().attr("controls").is_some(),
                title: attr(&el, "title").or_else(|| attr(&el, "aria-label")),
            });
        }
    }

    let mut iframes = Vec::new();
    for frame in document.select(&sel("iframe")) {
        let src = attr(&frame, "src");
        if let Some(provider) = src.as_deref().and_then(embed_provider) {
            media.push(MediaFacts {
                kind: "embed".to_string(),
                src: src.clone(),
                provider: Some(provider.to_string()),
                has_caption_track: false,
                has_description_track: false,
                autoplay: src
                    .as_deref()
                    .map(|s| s.contains("autoplay=1"))
                    .unwrap_or(false),
                controls: true,
                title: attr(&frame, "title"),
            });
        }
        iframes.push(IframeFacts {
            src,
            title: attr(&frame, "title"),
        });
    }

    let landmarks = {
        let mut out = Vec::new();
        for tag in ["main", "nav", "header", "footer", "aside"] {
            let selector = sel(tag);
            for el in document.select(&selector) {
                out.push(LandmarkFacts {
                    name: tag.to_string(),
                    label: attr(&el, "aria-label"),
                });
            }
        }
        let selector = sel("[role]");
        for el in document.select(&selector) {
            if let Some(role) = attr(&el, "role") {
                if matches!(
                    role.as_str(),
                    "main" | "navigation" | "banner" | "contentinfo" | "search" | "complementary"
                ) {
                    out.push(LandmarkFacts {
                        name: format!("role={}", role),
                        label: attr(&el, "aria-label"),
                    });
                }
            }
        }
        out
    };

    let forms = {
        let field_sel = sel("input, select, textarea");
        let submit_sel = sel("button[type=\"submit\"], input[type=\"submit\"], button:not([type])");
        document
            .select(&sel("form"))
            .map(|form| {
                let fields = form
                    .select(&field_sel)
                    .filter(|f| {
                        !matches!(
                            f.value().attr("type"),
                            Some("hidden") | Some("submit") | Some("button") | Some("reset")
                        )
                    })
                    .map(|f| field_facts(&f, &document))
                    .collect();
                FormFacts {
                    action: attr(&form, "action"),
                    fields,
                    has_submit: form.select(&submit_sel).next().is_some(),
                    onchange_handlers: form
                        .select(&field_sel)
                        .filter(|f| f.value().attr("onchange").is_some())
                        .count(),
                }
            })
            .collect()
    };

    let mut links = Vec::new();
    let mut skip_links = Vec::new();
    let mut transcript_links = Vec::new();
    {
        let nav_sel = sel("nav a[href]");
        let nav_hrefs: std::collections::HashSet<String> = document
            .select(&nav_sel)
            .filter_map(|a| attr(&a, "href"))
            .collect();

        for (i, a) in document.select(&sel("a[href]")).enumerate() {
            let href = attr(&a, "href").unwrap_or_default();
            let text = truncate(text_of(&a), 200);
            let lower = text.to_lowercase();
            if lower.contains("transcript") {
                transcript_links.push(href.clone());
            }
            let link = LinkFacts {
                in_nav: nav_hrefs.contains(&href),
                target_blank: attr(&a, "target").as_deref() == Some("_blank"),
                aria_label: attr(&a, "aria-label"),
                href: href.clone(),
                text,
            };
            // In-page anchors among the first focusables are skip-link candidates.
            if i < 3 && href.starts_with('#') {
                skip_links.push(link.clone());
            }
            links.push(link);
        }
    }

    let tables = document
        .select(&sel("table"))
        .map(|t| TableFacts {
            header_cells: t.select(&sel("th")).count(),
            has_caption: t.select(&sel("caption")).next().is_some(),
            rows: t.select(&sel("tr")).count(),
        })
        .collect();

    let list_counts = ListCounts {
        unordered: document.select(&sel("ul")).count(),
        ordered: document.select(&sel("ol")).count(),
        definition: document.select(&sel("dl")).count(),
    };

    let ids = document
        .select(&sel("[id]"))
        .filter_map(|el| attr(&el, "id"))
        .collect();

    let aria_roles = document
        .select(&sel("[role]"))
        .filter_map(|el| attr(&el, "role"))
        .collect();

    let tabindexes = document
        .select(&sel("[tabindex]"))
        .filter_map(|el| attr(&el, "tabindex").and_then(|v| v.parse().ok()))
        .collect();

    let style_blocks: String = document
        .select(&sel("style"))
        .map(|s| text_of(&s))
        .collect::<Vec<_>>()
        .join("\n");

    let inline_colors = document
        .select(&sel("[style]"))
        .filter_map(|el| attr(&el, "style"))
        .filter(|s| s.contains("color"))
        .map(|s| truncate(s, 200))
        .collect();

    let font_sizes = {
        let mut sizes: Vec<String> = document
            .select(&sel("[style]"))
            .filter_map(|el| attr(&el, "style"))
            .filter_map(|s| extract_font_size(&s))
            .collect();
        let mut rest = style_blocks
            .split(';')
            .filter_map(extract_font_size)
            .collect::<Vec<_>>();
        sizes.append(&mut rest);
        sizes
    };

    let meta_refresh = document
        .select(&sel("meta[http-equiv]"))
        .find(|m| {
            attr(m, "http-equiv")
                .map(|v| v.eq_ignore_ascii_case("refresh"))
                .unwrap_or(false)
        })
        .and_then(|m| attr(&m, "content"));

    let viewport = document
        .select(&sel("meta[name=\"viewport\"]"))
        .next()
        .and_then(|m| attr(&m, "content"));

    let marquee_blink_count =
        document.select(&sel("marquee")).count() + document.select(&sel("blink")).count();

    let animation_markers = {
        let mut markers: Vec<String> = document
            .select(&sel("[class]"))
            .filter_map(|el| attr(&el, "class"))
            .filter(|c| {
                let lower = c.to_lowercase();
                ["carousel", "slider", "animate", "marquee", "ticker"]
                    .iter()
                    .any(|m| lower.contains(m))
            })
            .map(|c| truncate(c, 100))
            .collect();
        markers.sort();
        markers.dedup();
        markers
    };

    let clickable_non_interactive = document
        .select(&sel("div[onclick], span[onclick]"))
        .count();

    let accesskeys = document
        .select(&sel("[accesskey]"))
        .filter_map(|el| attr(&el, "accesskey"))
        .collect();

    let part_langs = document
        .select(&sel("[lang]"))
        .filter(|el| el.value().name() != "html")
        .filter_map(|el| attr(&el, "lang"))
        .collect();

    PageFacts {
        url: page.url.clone(),
        status: page.status,
        title: page.title.clone(),
        lang: page.lang.clone(),
        headings,
        images,
        media,
        transcript_links,
        landmarks,
        forms,
        links,
        skip_links,
        tables,
        list_counts,
        iframes,
        ids,
        aria_roles,
        tabindexes,
        inline_colors,
        font_sizes,
        meta_refresh,
        viewport,
        marquee_blink_count,
        animation_markers,
        respects_reduced_motion: style_blocks.contains("prefers-reduced-motion"),
        clickable_non_interactive,
        accesskeys,
        part_langs,
    }
}

fn image_facts(
    kind: &str,
    el: &ElementRef,
    src: Option<String>,
    alt: Option<String>,
) -> ImageFacts {
    let figure_caption = el
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "figure")
        .and_then(|figure| {
            figure
                .select(&sel("figcaption"))
                .next()
                .map(|c| truncate(text_of(&c), 200))
        });

    let context = el
        .parent()
        .and_then(ElementRef::wrap)
        .map(|p| truncate(text_of(&p), 160))
        .filter(|t| !t.is_empty());

    ImageFacts {
        kind: kind.to_string(),
        src,
        alt,
        role: attr(el, "role"),
        aria_label: attr(el, "aria-label"),
        aria_labelledby: attr(el, "aria-labelledby"),
        aria_describedby: attr(el, "aria-describedby"),
        figure_caption,
        context,
    }
}

fn field_facts(field: &ElementRef, document: &Html) -> FieldFacts {
    let id = attr(field, "id");

    // <label for=...> binding, then wrapping <label>.
    let label = id
        .as_deref()
        .and_then(|id| {
            let selector = Selector::parse(&format!("label[for=\"{}\"]", css_escape(id))).ok()?;
            document.select(&selector).next().map(|l| text_of(&l))
        })
        .or_else(|| {
            field
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|a| a.value().name() == "label")
                .map(|l| text_of(&l))
        })
        .map(|t| truncate(t, 200))
        .filter(|t| !t.is_empty());

    let in_fieldset_with_legend = field
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "fieldset")
        .map(|fs| fs.select(&sel("legend")).next().is_some())
        .unwrap_or(false);

    FieldFacts {
        tag: field.value().name().to_string(),
        input_type: attr(field, "type"),
        id,
        name: attr(field, "name"),
        label,
        aria_label: attr(field, "aria-label"),
        aria_labelledby: attr(field, "aria-labelledby"),
        aria_describedby: attr(field, "aria-describedby"),
        placeholder: attr(field, "placeholder"),
        required: field.value().attr("required").is_some(),
        aria_required: attr(field, "aria-required").as_deref() == Some("true"),
        autocomplete: attr(field, "autocomplete"),
        in_fieldset_with_legend,
    }
}

fn css_escape(id: &str) -> String {
    id.replace('"', "\\\"")
}

fn embed_provider(src: &str) -> Option<&'static str> {
    let lower = src.to_lowercase();
    if lower.contains("youtube.com") || lower.contains("youtu.be") {
        Some("youtube")
    } else if lower.contains("vimeo.com") {
        Some("vimeo")
    } else if lower.contains("dailymotion.com") {
        Some("dailymotion")
    } else {
        None
    }
}

fn extract_font_size(style: &str) -> Option<String> {
    let idx = style.find("font-size")?;
    let rest = &style[idx + "font-size".len()..];
    let rest = rest.trim_start().strip_prefix(':')?;
    let value: String = rest
        .chars()
        .take_while(|c| *c != ';' && *c != '}')
        .collect();
    let value = value.trim().to_string();
    (!value.is_empty()).then_some(value)
}
