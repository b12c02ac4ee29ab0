//! Reversible visual treatments.
//!
//! Applying records the element's `style` attribute so reverting restores it
//! byte for byte. The `applied-action` attribute marks a treated element; a
//! second apply on a marked element is a bug and fails.

use tracing::trace;
use veil_core::FilterAction;

use crate::dom::{ElementId, PageDom, Tooltip, TooltipAction};
use crate::errors::{EngineError, Result};
use crate::state::{FilterCause, FilteredEntry};

/// Attribute naming the applied action.
pub const APPLIED_ACTION_ATTR: &str = "applied-action";

const STYLE_ATTR: &str = "style";
const BLUR_STYLE: &str = "filter: blur(6px);";
const HIDE_STYLE: &str = "display: none !important;";

/// Apply `action` to the element and return what is needed to revert it.
pub fn apply(
    dom: &dyn PageDom,
    el: ElementId,
    action: FilterAction,
    cause: FilterCause,
) -> Result<FilteredEntry> {
    if dom.attribute(el, APPLIED_ACTION_ATTR).is_some() {
        return Err(EngineError::AlreadyFiltered(el));
    }
    let original_style = dom.attribute(el, STYLE_ATTR);
    match action {
        FilterAction::Blur => {
            dom.set_attribute(el, STYLE_ATTR, &append_style(original_style.as_deref(), BLUR_STYLE));
            dom.attach_tooltip(
                el,
                Tooltip {
                    text: cause.describe(),
                    action: TooltipAction::UnfilterAndIgnore,
                },
            );
        }
        FilterAction::Hide => {
            dom.set_attribute(el, STYLE_ATTR, &append_style(original_style.as_deref(), HIDE_STYLE));
        }
        FilterAction::Tag => dom.insert_badge(el, cause.badge_label()),
    }
    dom.set_attribute(el, APPLIED_ACTION_ATTR, action.as_str());
    trace!(element = %el, %action, "filter applied");
    Ok(FilteredEntry {
        action,
        cause,
        original_style,
    })
}

/// Undo [`apply`].
pub fn revert(dom: &dyn PageDom, el: ElementId, entry: &FilteredEntry) {
    match &entry.original_style {
        Some(style) => dom.set_attribute(el, STYLE_ATTR, style),
        None => dom.remove_attribute(el, STYLE_ATTR),
    }
    dom.remove_attribute(el, APPLIED_ACTION_ATTR);
    dom.detach_tooltip(el);
    dom.remove_badge(el);
    trace!(element = %el, action = %entry.action, "filter removed");
}

fn append_style(original: Option<&str>, extra: &str) -> String {
    match original.map(str::trim_end) {
        Some(style) if !style.is_empty() => {
            let sep = if style.ends_with(';') { " " } else { "; " };
            format!("{style}{sep}{extra}")
        }
        _ => extra.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::dom::MemoryDom;

    fn cause() -> FilterCause {
        FilterCause::Word {
            word: "trigger".into(),
            list: "news".into(),
        }
    }

    fn element() -> (MemoryDom, ElementId) {
        let dom = MemoryDom::new("example.com");
        let el = dom.append_text(dom.root(), "article", "a trigger here");
        (dom, el)
    }

    #[test]
    fn blur_sets_style_attr_and_tooltip() {
        let (dom, el) = element();
        let entry = apply(&dom, el, FilterAction::Blur, cause()).unwrap();
        assert_eq!(dom.attribute(el, APPLIED_ACTION_ATTR).as_deref(), Some("blur"));
        assert_eq!(dom.attribute(el, "style").as_deref(), Some(BLUR_STYLE));
        let tooltip = dom.tooltip(el).unwrap();
        assert_eq!(tooltip.text, "Filtered word \"trigger\" from list \"news\"");
        assert_eq!(tooltip.action, TooltipAction::UnfilterAndIgnore);
        assert!(entry.original_style.is_none());
    }

    #[test]
    fn revert_restores_exact_style() {
        let (dom, el) = element();
        dom.set_attribute(el, "style", "color: red");
        let entry = apply(&dom, el, FilterAction::Hide, cause()).unwrap();
        assert_eq!(
            dom.attribute(el, "style").as_deref(),
            Some("color: red; display: none !important;")
        );
        revert(&dom, el, &entry);
        assert_eq!(dom.attribute(el, "style").as_deref(), Some("color: red"));
        assert!(dom.attribute(el, APPLIED_ACTION_ATTR).is_none());
    }

    #[test]
    fn revert_removes_absent_style() {
        let (dom, el) = element();
        let entry = apply(&dom, el, FilterAction::Blur, cause()).unwrap();
        revert(&dom, el, &entry);
        assert!(dom.attribute(el, "style").is_none());
        assert!(dom.tooltip(el).is_none());
    }

    #[test]
    fn tag_inserts_badge_without_hiding() {
        let (dom, el) = element();
        let entry = apply(&dom, el, FilterAction::Tag, cause()).unwrap();
        assert_eq!(dom.badge(el).as_deref(), Some("trigger"));
        assert!(dom.attribute(el, "style").is_none());
        assert_eq!(dom.text_content(el), "a trigger here");
        revert(&dom, el, &entry);
        assert!(dom.badge(el).is_none());
    }

    #[test]
    fn second_apply_fails() {
        let (dom, el) = element();
        let _ = apply(&dom, el, FilterAction::Blur, cause()).unwrap();
        assert_matches!(
            apply(&dom, el, FilterAction::Hide, cause()),
            Err(EngineError::AlreadyFiltered(id)) if id == el
        );
    }
}
