//! Response type classification.

use crate::http::ResponseType;
use url::Url;

const ALLOW_ORIGIN: &str = "access-control-allow-origin";

/// Classify a response the way a page at `page_origin` would see it.
///
/// Same-origin responses are `Basic`. Cross-origin responses are `Cors` when the
/// server shares them with the page's origin (or with everyone), `Opaque`
/// otherwise. Without a page origin everything is treated as same-origin.
pub fn classify_response(
    page_origin: Option<&Url>,
    response_url: &Url,
    headers: &[(String, String)],
) -> ResponseType {
    let Some(page) = page_origin else {
        return ResponseType::Basic;
    };

    let page_origin = page.origin();
    if response_url.origin() == page_origin {
        return ResponseType::Basic;
    }

    let shared = headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case(ALLOW_ORIGIN))
        .any(|(_, value)| {
            let value = value.trim();
            value == "*" || value == page_origin.ascii_serialization()
        });

    if shared {
        ResponseType::Cors
    } else {
        ResponseType::Opaque
    }
}
