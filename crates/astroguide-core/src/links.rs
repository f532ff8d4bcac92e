use url::Url;

/// Short label for a source link: the hostname without a leading `www.`.
///
/// Strings that don't parse as a URL with a host are returned unchanged.
pub fn display_domain(link: &str) -> String {
    let Ok(parsed) = Url::parse(link) else {
        return link.to_string();
    };

    match parsed.host_str() {
        Some(host) => host.strip_prefix("www.").unwrap_or(host).to_string(),
        None => link.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_leading_www() {
        assert_eq!(display_domain("https://www.example.com/page"), "example.com");
    }

    #[test]
    fn test_keeps_other_subdomains() {
        assert_eq!(
            display_domain("https://science.nasa.gov/solar-system/"),
            "science.nasa.gov"
        );
        assert_eq!(display_domain("https://hubblesite.org"), "hubblesite.org");
    }

    #[test]
    fn test_only_leading_www_is_removed() {
        assert_eq!(display_domain("https://data.www.example.org/"), "data.www.example.org");
    }

    #[test]
    fn test_unparseable_input_is_returned_unchanged() {
        assert_eq!(display_domain("not a url"), "not a url");
        assert_eq!(display_domain(""), "");
    }

    #[test]
    fn test_url_without_host_is_returned_unchanged() {
        assert_eq!(display_domain("mailto:someone@example.com"), "mailto:someone@example.com");
    }
}
