//! JavaScript snippets evaluated inside a frame's execution context.
//!
//! Every DOM query is resolved in the page from a serialized [`Selector`],
//! so the same structured query drives every engine.

use crate::{AutomationError, Selector};

/// Thrown (as an `Error` message prefix) when the selector matched nothing.
pub const NOT_FOUND_MARKER: &str = "SDM_NOT_FOUND";
/// Thrown when the element exists but cannot receive a pointer click.
pub const NOT_VISIBLE_MARKER: &str = "SDM_NOT_VISIBLE";

const FIND_PRELUDE: &str = r#"
  const norm = (s) => (s || '').trim();
  const find = (s) => {
    switch (s.kind) {
      case 'css':
        return Array.from(document.querySelectorAll(s.css));
      case 'exact_text':
        return Array.from(document.querySelectorAll(s.css)).filter((e) => norm(e.textContent) === s.text);
      case 'has_text': {
        const needle = s.text.toLowerCase();
        return Array.from(document.querySelectorAll(s.css)).filter((e) => (e.textContent || '').toLowerCase().includes(needle));
      }
      case 'any':
        for (const alt of s.alternatives) {
          const found = find(alt);
          if (found.length) return found;
        }
        return [];
      default:
        throw new Error('invalid selector: ' + (s.reason || s.kind));
    }
  };
"#;

fn encode<T: serde::Serialize>(value: &T) -> Result<String, AutomationError> {
    serde_json::to_string(value)
        .map_err(|e| AutomationError::Internal(format!("failed to encode script argument: {e}")))
}

/// Wrap `body` so it runs with `els` bound to every match of `selector`.
fn with_elements(selector: &Selector, body: &str) -> Result<String, AutomationError> {
    if let Selector::Invalid { reason } = selector {
        return Err(AutomationError::InvalidSelector(reason.clone()));
    }
    let encoded = encode(selector)?;
    Ok(format!(
        "(() => {{{FIND_PRELUDE}\n  const els = find({encoded});\n  const first = () => {{ if (!els.length) throw new Error('{NOT_FOUND_MARKER}: ' + {label}); return els[0]; }};\n{body}\n}})()",
        label = encode(&selector.to_string())?,
    ))
}

pub fn count(selector: &Selector) -> Result<String, AutomationError> {
    with_elements(selector, "  return els.length;")
}

pub fn is_visible(selector: &Selector) -> Result<String, AutomationError> {
    with_elements(
        selector,
        r#"  if (!els.length) return false;
  const e = els[0];
  const r = e.getBoundingClientRect();
  const st = window.getComputedStyle(e);
  return r.width > 0 && r.height > 0 && st.visibility !== 'hidden' && st.display !== 'none';"#,
    )
}

pub fn attribute(selector: &Selector, name: &str) -> Result<String, AutomationError> {
    with_elements(
        selector,
        &format!("  return first().getAttribute({});", encode(&name)?),
    )
}

pub fn texts(selector: &Selector) -> Result<String, AutomationError> {
    with_elements(selector, "  return els.map((e) => norm(e.textContent));")
}

pub fn row_cells(selector: &Selector) -> Result<String, AutomationError> {
    with_elements(
        selector,
        r#"  const row = first().closest('tr');
  if (!row) return [];
  return Array.from(row.querySelectorAll('td')).map((td) => norm(td.textContent));"#,
    )
}

/// Scroll the first match into view and return its centre in top-level viewport
/// coordinates, walking up the (same-origin) frame chain.
pub fn click_point(selector: &Selector) -> Result<String, AutomationError> {
    with_elements(
        selector,
        &format!(
            r#"  const e = first();
  e.scrollIntoView({{ block: 'center', inline: 'center' }});
  const r = e.getBoundingClientRect();
  const st = window.getComputedStyle(e);
  if (r.width === 0 || r.height === 0 || st.visibility === 'hidden' || st.display === 'none') {{
    throw new Error('{NOT_VISIBLE_MARKER}: element has no visible box');
  }}
  let x = r.left + r.width / 2;
  let y = r.top + r.height / 2;
  let w = window;
  while (w !== w.top) {{
    const fe = w.frameElement;
    if (!fe) throw new Error('cross-origin frame: cannot compute pointer position');
    const fr = fe.getBoundingClientRect();
    x += fr.left + fe.clientLeft;
    y += fr.top + fe.clientTop;
    w = w.parent;
  }}
  return {{ x, y }};"#
        ),
    )
}

pub fn script_click(selector: &Selector) -> Result<String, AutomationError> {
    with_elements(selector, "  first().click();\n  return true;")
}

pub fn focus(selector: &Selector) -> Result<String, AutomationError> {
    with_elements(selector, "  first().focus();\n  return true;")
}

pub fn blur(selector: &Selector) -> Result<String, AutomationError> {
    with_elements(selector, "  first().blur();\n  return true;")
}

pub fn fill(selector: &Selector, value: &str) -> Result<String, AutomationError> {
    with_elements(
        selector,
        &format!(
            r#"  const e = first();
  e.focus();
  e.value = {};
  e.dispatchEvent(new Event('input', {{ bubbles: true }}));
  e.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return true;"#,
            encode(&value)?
        ),
    )
}

/// `by` is `{"value": ...}` or `{"label": ...}`.
pub fn select_option(selector: &Selector, by: &serde_json::Value) -> Result<String, AutomationError> {
    with_elements(
        selector,
        &format!(
            r#"  const s = first();
  const by = {};
  const opts = Array.from(s.options || []);
  const idx = opts.findIndex((o) => ('value' in by) ? o.value === by.value : norm(o.text) === by.label);
  if (idx < 0) return false;
  s.selectedIndex = idx;
  s.dispatchEvent(new Event('input', {{ bubbles: true }}));
  s.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return true;"#,
            encode(by)?
        ),
    )
}

pub fn select_state(selector: &Selector) -> Result<String, AutomationError> {
    with_elements(
        selector,
        r#"  const s = first();
  const opts = Array.from(s.options || []);
  const current = opts[s.selectedIndex];
  return {
    value: s.value || '',
    label: current ? norm(current.text) : '',
    options: opts.map((o) => ({ value: o.value, label: norm(o.text) })),
  };"#,
    )
}

pub fn call_global(function: &str, args: &[serde_json::Value]) -> Result<String, AutomationError> {
    let name = encode(&function)?;
    let args = encode(&args)?;
    Ok(format!(
        "(() => {{ const fn = window[{name}]; if (typeof fn !== 'function') return false; fn.apply(window, {args}); return true; }})()"
    ))
}

pub const OUTER_HTML: &str = "document.documentElement ? document.documentElement.outerHTML : ''";

pub const READY_STATE: &str = "document.readyState";

/// Map a script exception message to a typed error.
pub fn classify_exception(message: &str) -> AutomationError {
    if let Some(idx) = message.find(NOT_FOUND_MARKER) {
        let detail = message[idx + NOT_FOUND_MARKER.len()..]
            .trim_start_matches(':')
            .trim();
        AutomationError::ElementNotFound(detail.to_string())
    } else if message.contains(NOT_VISIBLE_MARKER) {
        AutomationError::ElementNotVisible(message.to_string())
    } else if message.contains("invalid selector") || message.contains("is not a valid selector") {
        AutomationError::InvalidSelector(message.to_string())
    } else {
        AutomationError::PlatformError(format!("JavaScript execution failed: {message}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_embed_selector_as_json() {
        let js = count(&Selector::exact_text("a.record", "200")).unwrap();
        assert!(js.contains(r#""kind":"exact_text""#));
        assert!(js.contains(r#""text":"200""#));
        assert!(js.contains("return els.length;"));
    }

    #[test]
    fn invalid_selectors_never_reach_the_page() {
        let err = count(&Selector::from("")).unwrap_err();
        assert!(matches!(err, AutomationError::InvalidSelector(_)));
    }

    #[test]
    fn fill_value_is_escaped() {
        let js = fill(&Selector::css("input"), "Couto, \"Lucas\"").unwrap();
        assert!(js.contains(r#"e.value = "Couto, \"Lucas\"";"#));
    }

    #[test]
    fn exceptions_are_classified() {
        assert!(matches!(
            classify_exception("Error: SDM_NOT_FOUND: \"a.record\""),
            AutomationError::ElementNotFound(_)
        ));
        assert!(matches!(
            classify_exception("Error: SDM_NOT_VISIBLE: element has no visible box"),
            AutomationError::ElementNotVisible(_)
        ));
        assert!(matches!(
            classify_exception("ReferenceError: x is not defined"),
            AutomationError::PlatformError(_)
        ));
    }

    #[test]
    fn call_global_checks_function_exists() {
        let js = call_global("do_default", &[serde_json::json!(3)]).unwrap();
        assert!(js.contains(r#"window["do_default"]"#));
        assert!(js.contains("[3]"));
    }
}
