use url::form_urlencoded;

pub const REDACTED: &str = "[REDACTED]";

/// Replace every occurrence of `secret` in `text`, raw or as it appears once URL-encoded into a
/// query string or form body. Empty secrets leave the text untouched.
pub fn redact_secret(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        return text.to_string();
    }

    let form_encoded: String = form_urlencoded::byte_serialize(secret.as_bytes()).collect();
    let percent_encoded = form_encoded.replace('+', "%20");

    let mut out = text.replace(secret, REDACTED);
    for variant in [form_encoded, percent_encoded] {
        if variant != secret {
            out = out.replace(&variant, REDACTED);
        }
    }
    out
}
