// Adapters layer: concrete implementations of the domain ports (browsers, credential stores).

#[cfg(feature = "chromium")]
pub mod chromium;
pub mod http_browser;
pub mod store;
