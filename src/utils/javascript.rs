use crate::dom::ElementReference;
use crate::types::FrameId;

pub struct PageScripts;

impl PageScripts {
    fn quote(value: &str) -> String {
        serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
    }

    /// Expression resolving `element` against the current document, or `null`.
    fn resolve(element: &ElementReference) -> String {
        format!(
            "document.evaluate({}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null).snapshotItem({})",
            Self::quote(&element.path.to_xpath()),
            element.ordinal
        )
    }

    pub fn probe(element: &ElementReference) -> String {
        format!(
            r#"
            (function() {{
                const element = {};
                if (!element) return null;
                const rect = element.getBoundingClientRect();
                const style = window.getComputedStyle(element);
                const visible = rect.width > 0 && rect.height > 0 &&
                    style.visibility !== 'hidden' && style.display !== 'none';
                return {{
                    tag_name: element.tagName.toLowerCase(),
                    visible: visible,
                    enabled: !element.disabled,
                    rect: {{ x: rect.x, y: rect.y, width: rect.width, height: rect.height }}
                }};
            }})()
            "#,
            Self::resolve(element)
        )
    }

    /// Uses the prototype value setter so framework-controlled inputs see
    /// the change through their own `input` listeners.
    pub fn fill(element: &ElementReference, text: &str) -> String {
        format!(
            r#"
            (function() {{
                const element = {};
                if (!element) return {{ found: false }};
                const value = {};
                element.scrollIntoView({{ block: 'center' }});
                element.focus();
                if (element instanceof HTMLInputElement || element instanceof HTMLTextAreaElement) {{
                    const proto = element instanceof HTMLTextAreaElement
                        ? HTMLTextAreaElement.prototype
                        : HTMLInputElement.prototype;
                    Object.getOwnPropertyDescriptor(proto, 'value').set.call(element, value);
                }} else if (element.isContentEditable) {{
                    element.textContent = value;
                }} else {{
                    return {{ found: true, filled: false, error: 'element is not fillable' }};
                }}
                element.dispatchEvent(new Event('input', {{ bubbles: true }}));
                element.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return {{ found: true, filled: true }};
            }})()
            "#,
            Self::resolve(element),
            Self::quote(text)
        )
    }

    pub fn click(element: &ElementReference) -> String {
        format!(
            r#"
            (function() {{
                const element = {};
                if (!element) return {{ found: false }};
                element.scrollIntoView({{ block: 'center' }});
                element.focus();
                element.click();
                return {{ found: true }};
            }})()
            "#,
            Self::resolve(element)
        )
    }

    pub fn frame_count() -> &'static str {
        "document.querySelectorAll('iframe, frame').length"
    }

    pub fn ready_state(frame: FrameId) -> String {
        match frame {
            FrameId::Main => "document.readyState".to_string(),
            FrameId::Nested(index) => format!(
                r#"
                (function() {{
                    const frame = document.querySelectorAll('iframe, frame')[{}];
                    if (!frame) return 'unreachable';
                    try {{
                        return frame.contentDocument ? frame.contentDocument.readyState : 'unreachable';
                    }} catch (e) {{
                        return 'unreachable';
                    }}
                }})()
                "#,
                index
            ),
        }
    }

    pub fn visible_text() -> &'static str {
        "document.body ? document.body.innerText : ''"
    }

    pub fn scroll_by(dx: i64, dy: i64) -> String {
        format!("window.scrollBy({}, {})", dx, dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_script_escapes_value() {
        let element = ElementReference::parse("html/body/form/input", 0).unwrap();
        let script = PageScripts::fill(&element, "it's \"quoted\"");
        assert!(script.contains(r#""it's \"quoted\"""#));
        assert!(script.contains(r#""html/body/form/input""#));
        assert!(script.contains("snapshotItem(0)"));
    }

    #[test]
    fn test_nested_frame_ready_state_is_guarded() {
        let script = PageScripts::ready_state(FrameId::Nested(2));
        assert!(script.contains("[2]"));
        assert!(script.contains("catch"));
        assert_eq!(PageScripts::ready_state(FrameId::Main), "document.readyState");
    }
}
