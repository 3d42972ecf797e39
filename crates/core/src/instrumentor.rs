//! In-page step capture
//!
//! The instrumentor is a script installed into every document of a recorded
//! page. It listens for clicks and input events, polls the location for
//! client-side navigations, and hands each observation to the host through a
//! single exposed bridge function as a [`CapturedAction`](crate::session::CapturedAction)
//! JSON payload.
//!
//! Navigation is detected by polling, so a URL change is reported at most one
//! poll interval late. The last seen URL is kept in `sessionStorage`, which
//! carries it across full same-origin page loads where the script starts over.

use crate::config::CaptureConfig;

const TEMPLATE: &str = r#"(() => {
  if (window.__recplayInstalled) return;
  window.__recplayInstalled = true;

  const BRIDGE = __BRIDGE_NAME__;
  const POLL_INTERVAL_MS = __POLL_INTERVAL_MS__;

  function send(payload) {
    const bridge = window[BRIDGE];
    if (typeof bridge !== 'function') return;
    try {
      const pending = bridge(payload);
      if (pending && typeof pending.catch === 'function') pending.catch(() => {});
    } catch (_) {}
  }

  function getSelector(element) {
    if (!element || element.nodeType !== 1) return 'unknown';
    if (element.id) return '#' + element.id;
    const className = element.getAttribute('class');
    if (className) return '.' + className.split(' ')[0];
    return (element.tagName || 'unknown').toLowerCase();
  }

  document.addEventListener('click', (event) => {
    const target = event.target;
    const text = ((target && target.textContent) || '').trim();
    send({ type: 'click', selector: getSelector(target), text: text });
  });

  document.addEventListener('input', (event) => {
    const target = event.target;
    if (!target || (target.tagName !== 'INPUT' && target.tagName !== 'TEXTAREA')) return;
    send({ type: 'input', selector: getSelector(target), value: String(target.value) });
  });

  const URL_KEY = '__recplayLastUrl';

  function rememberUrl(url) {
    try { window.sessionStorage.setItem(URL_KEY, url); } catch (_) {}
  }

  let lastUrl = null;
  try { lastUrl = window.sessionStorage.getItem(URL_KEY); } catch (_) {}
  if (lastUrl === null) {
    lastUrl = window.location.href;
    rememberUrl(lastUrl);
  }

  setInterval(() => {
    const current = window.location.href;
    if (current !== lastUrl) {
      lastUrl = current;
      rememberUrl(current);
      send({ type: 'navigation', url: current });
    }
  }, POLL_INTERVAL_MS);
})();
"#;

/// Render the capture script for the given bridge name and poll interval
pub fn capture_script(config: &CaptureConfig) -> String {
    let bridge = serde_json::Value::String(config.bridge_name.clone()).to_string();
    TEMPLATE
        .replace("__BRIDGE_NAME__", &bridge)
        .replace("__POLL_INTERVAL_MS__", &config.poll_interval_ms.to_string())
}

/// Host-side twin of the in-page `getSelector`.
///
/// `#id` if the id is non-empty, otherwise `.first-class-token` if the class
/// attribute is non-empty, otherwise the lowercase tag name. Selectors are not
/// checked for uniqueness.
pub fn derive_selector(id: Option<&str>, class: Option<&str>, tag: &str) -> String {
    if let Some(id) = id.filter(|id| !id.is_empty()) {
        return format!("#{}", id);
    }
    if let Some(class) = class.filter(|class| !class.is_empty()) {
        return format!(".{}", class.split(' ').next().unwrap_or(""));
    }
    tag.to_ascii_lowercase()
}
