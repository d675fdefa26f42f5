//! Pre-navigation fingerprint scrub, injected with
//! `Page.addScriptToEvaluateOnNewDocument` so it runs before any site JS.
//!
//! The dashboard is a client-rendered SPA that checks `navigator.webdriver`
//! and bails out of hydration when it looks automated; without this scrub the
//! manifest page stays blank forever and every readiness poll times out.

/// Script that hides the automation markers CDP leaves behind.
pub fn fingerprint_scrub_script() -> &'static str {
    r#"
// webdriver: prefer "absent" (undefined) over false
(() => {
    try {
        Object.defineProperty(Navigator.prototype, 'webdriver', {
            get: () => undefined,
            configurable: true,
        });
    } catch (e) {}
    try { delete navigator.webdriver; } catch (e) {}
})();

// languages / plugins: realistic non-empty values
(() => {
    try {
        Object.defineProperty(Navigator.prototype, 'languages', {
            get: () => ['en-US', 'en'],
            configurable: true,
        });
        Object.defineProperty(Navigator.prototype, 'plugins', {
            get: () => [1, 2, 3, 4, 5],
            configurable: true,
        });
    } catch (e) {}
})();

// chrome runtime stub — many detectors only check presence + callability
if (!window.chrome) { window.chrome = {}; }
if (!window.chrome.runtime) {
    window.chrome.runtime = {
        connect: function() { return { onDisconnect: { addListener: function() {} } }; },
        sendMessage: function() {},
    };
}

// headless leftovers from other automation stacks
delete window.__playwright;
delete window.__puppeteer;
delete window.__selenium;
"#
}
