//! Redaction helpers for messages that may end up in tool results or logs.
//!
//! Upstream URLs can carry credentials in userinfo or the query string (API keys, signed
//! tokens). Anything derived from a URL is passed through [`redact_url`] before it leaves the
//! transport.

use url::Url;

#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    if e.is_timeout() && !msg.contains("timed out") {
        msg.push_str(" (timed out)");
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::redact_url;
    use url::Url;

    #[test]
    fn redact_url_drops_credentials_query_and_fragment() {
        let url = Url::parse("https://user:pw@api.example.com/v1/orders?apiKey=abc#top").expect("url");
        assert_eq!(redact_url(&url), "https://api.example.com/v1/orders");
    }

    #[test]
    fn redact_url_keeps_plain_urls() {
        let url = Url::parse("http://127.0.0.1:8080/users/7").expect("url");
        assert_eq!(redact_url(&url), "http://127.0.0.1:8080/users/7");
    }
}
