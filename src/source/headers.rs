//! Randomized browser-like request headers.
//!
//! The metric sites rate-limit and fingerprint aggressively, so every fetch
//! presents a plausible desktop browser profile. Header sets vary between
//! requests on purpose.

use rand::Rng as _;
use rand::seq::IndexedRandom as _;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

const CHROME_VERSIONS: &[&str] = &["130.0.6723.73", "130.0.6723.69", "129.0.6666.66"];

const PLATFORMS: &[(&str, &str)] = &[
    ("Windows NT 10.0; Win64; x64", "Windows"),
    ("Macintosh; Intel Mac OS X 10_15_7", "Mac"),
    ("X11; Linux x86_64", "Linux"),
];

/// Build a fresh randomized header set for one request.
pub fn random_headers() -> HeaderMap {
    let mut rng = rand::rng();
    let (platform, os_name) = *PLATFORMS.choose(&mut rng).expect("platforms is non-empty");
    let chrome = *CHROME_VERSIONS.choose(&mut rng).expect("versions is non-empty");

    let mut headers = HeaderMap::new();
    insert(
        &mut headers,
        "user-agent",
        &format!(
            "Mozilla/5.0 ({platform}) AppleWebKit/537.36 (KHTML, like Gecko) \
             Chrome/{chrome} Safari/537.36"
        ),
    );
    insert(
        &mut headers,
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
    );
    insert(&mut headers, "accept-language", "en-US,en;q=0.9");
    insert(&mut headers, "connection", "keep-alive");

    // Some header fields come and go between real requests too.
    if rng.random::<f64>() > 0.3 {
        insert(
            &mut headers,
            "sec-ch-ua",
            &format!(r#""Not_A Brand";v="8", "Chromium";v="{chrome}", "Google Chrome";v="{chrome}""#),
        );
    }
    if rng.random::<f64>() > 0.3 {
        insert(&mut headers, "sec-ch-ua-mobile", "?0");
    }
    if rng.random::<f64>() > 0.3 {
        insert(&mut headers, "sec-ch-ua-platform", &format!("\"{os_name}\""));
    }

    headers
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_includes_the_core_headers() {
        for _ in 0..20 {
            let headers = random_headers();
            assert!(headers.contains_key("user-agent"));
            assert!(headers.contains_key("accept"));
            assert!(headers.contains_key("accept-language"));
            let ua = headers["user-agent"].to_str().unwrap();
            assert!(ua.contains("Chrome/"));
        }
    }
}
