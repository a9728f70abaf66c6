//! Per-axis snapshot slicers
//!
//! Each slicer projects the parsed page facts down to the elements its
//! axis prompt needs. The dispatcher looks slices up by axis through
//! [`slice_for`]; adding an axis means adding a match arm here, the
//! orchestrator stays untouched.

use serde_json::{json, Value};

use barriercheck_core::domain::Axis;

use super::PageFacts;

/// Build the slice for one axis over all crawled pages.
pub fn slice_for(axis: Axis, pages: &[PageFacts]) -> Value {
    match axis {
        Axis::TextAlternatives => text_alternatives(pages),
        Axis::TimeBasedMedia => time_based_media(pages),
        Axis::Adaptable => adaptable(pages),
        Axis::Distinguishable => distinguishable(pages),
        Axis::Keyboard => keyboard(pages),
        Axis::EnoughTime => enough_time(pages),
        Axis::Seizures => seizures(pages),
        Axis::Navigable => navigable(pages),
        Axis::Readable => readable(pages),
        Axis::Predictable => predictable(pages),
        Axis::InputAssistance => input_assistance(pages),
        Axis::Compatible => compatible(pages),
    }
}

fn per_page<F: Fn(&PageFacts) -> Value>(pages: &[PageFacts], f: F) -> Vec<Value> {
    pages
        .iter()
        .map(|p| {
            let mut value = f(p);
            if let Some(obj) = value.as_object_mut() {
                obj.insert("url".to_string(), json!(p.url));
            }
            value
        })
        .collect()
}

fn text_alternatives(pages: &[PageFacts]) -> Value {
    json!({
        "pages": per_page(pages, |p| json!({
            "images": p.images,
            "captcha_markers": p.images.iter()
                .filter(|i| i.src.as_deref().map(|s| s.to_lowercase().contains("captcha")).unwrap_or(false))
                .count(),
        })),
        "total_images": pages.iter().map(|p| p.images.len()).sum::<usize>(),
        "images_without_alt": pages.iter()
            .flat_map(|p| &p.images)
            .filter(|i| i.kind == "img" && i.alt.is_none() && i.aria_label.is_none()
                && i.role.as_deref() != Some("presentation"))
            .count(),
    })
}

fn time_based_media(pages: &[PageFacts]) -> Value {
    json!({
        "pages": per_page(pages, |p| json!({
            "media": p.media,
            "transcript_links": p.transcript_links,
        })),
        "total_media": pages.iter().map(|p| p.media.len()).sum::<usize>(),
    })
}

fn adaptable(pages: &[PageFacts]) -> Value {
    json!({
        "pages": per_page(pages, |p| json!({
            "headings": p.headings,
            "lists": p.list_counts,
            "tables": p.tables,
            "landmarks": p.landmarks,
            "forms": p.forms.iter().map(|f| json!({
                "fields": f.fields.iter().map(|field| json!({
                    "tag": field.tag,
                    "type": field.input_type,
                    "label": field.label,
                    "aria_label": field.aria_label,
                    "autocomplete": field.autocomplete,
                    "in_fieldset_with_legend": field.in_fieldset_with_legend,
                })).collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
        })),
    })
}

fn distinguishable(pages: &[PageFacts]) -> Value {
    json!({
        "pages": per_page(pages, |p| json!({
            "inline_colors": p.inline_colors,
            "font_sizes": p.font_sizes,
            "viewport": p.viewport,
            "px_font_sizes": p.font_sizes.iter().filter(|s| s.ends_with("px")).count(),
            "relative_font_sizes": p.font_sizes.iter()
                .filter(|s| s.ends_with("rem") || s.ends_with("em") || s.ends_with('%'))
                .count(),
        })),
        "zoom_disabled_pages": pages.iter()
            .filter(|p| p.viewport.as_deref()
                .map(|v| v.contains("user-scalable=no") || v.contains("maximum-scale=1"))
                .unwrap_or(false))
            .count(),
    })
}

fn keyboard(pages: &[PageFacts]) -> Value {
    json!({
        "pages": per_page(pages, |p| json!({
            "tabindexes": p.tabindexes,
            "positive_tabindexes": p.tabindexes.iter().filter(|t| **t > 0).count(),
            "clickable_non_interactive": p.clickable_non_interactive,
            "accesskeys": p.accesskeys,
            "skip_links": p.skip_links,
            "custom_widget_roles": p.aria_roles.iter()
                .filter(|r| matches!(r.as_str(), "menu" | "menubar" | "dialog" | "tablist" | "slider" | "listbox"))
                .collect::<Vec<_>>(),
        })),
    })
}

fn enough_time(pages: &[PageFacts]) -> Value {
    json!({
        "pages": per_page(pages, |p| json!({
            "meta_refresh": p.meta_refresh,
            "marquee_blink_elements": p.marquee_blink_count,
            "animation_markers": p.animation_markers,
            "autoplaying_media": p.media.iter().filter(|m| m.autoplay).count(),
        })),
    })
}

fn seizures(pages: &[PageFacts]) -> Value {
    json!({
        "pages": per_page(pages, |p| json!({
            "animated_images": p.images.iter()
                .filter(|i| i.src.as_deref().map(|s| s.ends_with(".gif") || s.ends_with(".apng")).unwrap_or(false))
                .collect::<Vec<_>>(),
            "animation_markers": p.animation_markers,
            "marquee_blink_elements": p.marquee_blink_count,
            "respects_reduced_motion": p.respects_reduced_motion,
        })),
    })
}

fn navigable(pages: &[PageFacts]) -> Value {
    let mut titles: Vec<&String> = pages.iter().filter_map(|p| p.title.as_ref()).collect();
    titles.sort();
    let duplicate_titles = titles.windows(2).filter(|w| w[0] == w[1]).count();

    json!({
        "pages": per_page(pages, |p| json!({
            "title": p.title,
            "headings": p.headings,
            "skip_links": p.skip_links,
            "landmarks": p.landmarks,
            "links": p.links.iter().map(|l| json!({
                "href": l.href,
                "text": l.text,
                "aria_label": l.aria_label,
                "in_nav": l.in_nav,
            })).collect::<Vec<_>>(),
            "empty_links": p.links.iter()
                .filter(|l| l.text.is_empty() && l.aria_label.is_none())
                .count(),
        })),
        "duplicate_titles": duplicate_titles,
    })
}

fn readable(pages: &[PageFacts]) -> Value {
    json!({
        "pages": per_page(pages, |p| json!({
            "document_lang": p.lang,
            "part_langs": p.part_langs,
            "language_switch_links": p.links.iter()
                .filter(|l| {
                    let t = l.text.to_lowercase();
                    t.contains("english") || t.contains("deutsch") || t.contains("français")
                        || l.href.contains("/en/") || l.href.contains("/de/")
                })
                .map(|l| json!({"href": l.href, "text": l.text}))
                .collect::<Vec<_>>(),
        })),
        "pages_without_lang": pages.iter().filter(|p| p.lang.is_none()).count(),
    })
}

fn predictable(pages: &[PageFacts]) -> Value {
    let nav_signatures: Vec<Vec<&String>> = pages
        .iter()
        .map(|p| {
            p.links
                .iter()
                .filter(|l| l.in_nav)
                .map(|l| &l.text)
                .collect()
        })
        .collect();
    let consistent_navigation = nav_signatures
        .windows(2)
        .all(|w| w[0] == w[1]);

    json!({
        "pages": per_page(pages, |p| json!({
            "nav_links": p.links.iter().filter(|l| l.in_nav).map(|l| &l.text).collect::<Vec<_>>(),
            "target_blank_links": p.links.iter().filter(|l| l.target_blank).count(),
            "onchange_handlers": p.forms.iter().map(|f| f.onchange_handlers).sum::<usize>(),
        })),
        "consistent_navigation": consistent_navigation,
    })
}

fn input_assistance(pages: &[PageFacts]) -> Value {
    json!({
        "pages": per_page(pages, |p| json!({
            "forms": p.forms,
            "fields_without_label": p.forms.iter()
                .flat_map(|f| &f.fields)
                .filter(|f| f.label.is_none() && f.aria_label.is_none() && f.aria_labelledby.is_none())
                .count(),
            "placeholder_only_fields": p.forms.iter()
                .flat_map(|f| &f.fields)
                .filter(|f| f.label.is_none() && f.aria_label.is_none() && f.placeholder.is_some())
                .count(),
        })),
    })
}

fn compatible(pages: &[PageFacts]) -> Value {
    json!({
        "pages": per_page(pages, |p| json!({
            "duplicate_ids": duplicate_ids(p),
            "aria_roles": p.aria_roles,
            "custom_controls_without_name": p.clickable_non_interactive,
        })),
    })
}

fn duplicate_ids(page: &PageFacts) -> Vec<String> {
    let mut counts = std::collections::HashMap::new();
    for id in &page.ids {
        *counts.entry(id.clone()).or_insert(0usize) += 1;
    }
    let mut dupes: Vec<String> = counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(id, _)| id)
        .collect();
    dupes.sort();
    dupes
}

#[cfg(test)]
mod tests {
    use super::*;
    use barriercheck_core::domain::PageSnapshot;
    use chrono::Utc;

    fn facts(html: &str) -> Vec<PageFacts> {
        let page = PageSnapshot {
            url: "https://example.com/".to_string(),
            status: 200,
            fetched_at: Utc::now(),
            fetch_ms: 1,
            title: Some("T".into()),
            lang: Some("en".into()),
            html: html.to_string(),
            error: None,
        };
        vec![super::super::parse_page(&page)]
    }

    #[test]
    fn text_alternatives_slice_counts_missing_alt() {
        let pages = facts(r#"<img src="/a.png"><img src="/b.png" alt="B"><img src="/c.png" alt="" role="presentation">"#);
        let slice = slice_for(Axis::TextAlternatives, &pages);
        assert_eq!(slice["total_images"], 3);
        assert_eq!(slice["images_without_alt"], 1);
    }

    #[test]
    fn keyboard_slice_flags_positive_tabindex() {
        let pages = facts(r#"<div tabindex="3">x</div><div tabindex="-1">y</div><div onclick="go()">z</div>"#);
        let slice = slice_for(Axis::Keyboard, &pages);
        assert_eq!(slice["pages"][0]["positive_tabindexes"], 1);
        assert_eq!(slice["pages"][0]["clickable_non_interactive"], 1);
    }

    #[test]
    fn compatible_slice_lists_duplicate_ids() {
        let pages = facts(r#"<div id="x"></div><div id="x"></div><div id="y"></div>"#);
        let slice = slice_for(Axis::Compatible, &pages);
        assert_eq!(slice["pages"][0]["duplicate_ids"], json!(["x"]));
    }

    #[test]
    fn every_axis_produces_an_object() {
        let pages = facts("<p>minimal</p>");
        for axis in Axis::ALL {
            let slice = slice_for(axis, &pages);
            assert!(slice.is_object(), "slice for {} is not an object", axis);
        }
    }

    #[test]
    fn slices_are_json_serializable() {
        let pages = facts(r#"<img src="/a.gif"><video autoplay src="/v.mp4"></video>"#);
        for axis in Axis::ALL {
            let slice = slice_for(axis, &pages);
            serde_json::to_string(&slice).unwrap();
        }
    }
}
