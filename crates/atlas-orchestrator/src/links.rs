//! Link discovery and filtering (§4.6 step 4): the raw anchors a
//! fetch outcome carries, filtered by include/exclude patterns and
//! defaulting to same-host, capped at `maxLinks`.

use regex::Regex;
use url::Url;

/// Filter `discovered` links per §4.5/§4.6's policy: explicit include
/// patterns override the same-host default; exclude patterns always
/// apply on top; the result never exceeds `max_links`.
pub fn filter_links(
    seed_url: &str,
    discovered: &[String],
    include_patterns: &[String],
    exclude_patterns: &[String],
    max_links: u32,
) -> Vec<String> {
    let seed_host = Url::parse(seed_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string));
    let include: Vec<Regex> = include_patterns
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect();
    let exclude: Vec<Regex> = exclude_patterns
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect();

    let mut result = Vec::new();
    for link in discovered {
        if result.len() >= max_links as usize {
            break;
        }
        let Ok(parsed) = Url::parse(link) else {
            continue;
        };

        if include.is_empty() {
            if let (Some(seed_host), Some(host)) = (&seed_host, parsed.host_str()) {
                if host != seed_host {
                    continue;
                }
            }
        } else if !include.iter().any(|re| re.is_match(link)) {
            continue;
        }

        if exclude.iter().any(|re| re.is_match(link)) {
            continue;
        }

        result.push(link.clone());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_same_host_when_no_include_patterns() {
        let discovered = vec![
            "https://example.com/a".to_string(),
            "https://other.example/b".to_string(),
        ];
        let links = filter_links("https://example.com", &discovered, &[], &[], 10);
        assert_eq!(links, vec!["https://example.com/a".to_string()]);
    }

    #[test]
    fn include_pattern_opens_up_cross_host_links() {
        let discovered = vec!["https://cdn.example.net/article/1".to_string()];
        let links = filter_links(
            "https://example.com",
            &discovered,
            &["article".to_string()],
            &[],
            10,
        );
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn exclude_pattern_wins_over_include() {
        let discovered = vec!["https://example.com/article/1".to_string()];
        let links = filter_links(
            "https://example.com",
            &discovered,
            &["article".to_string()],
            &["/1".to_string()],
            10,
        );
        assert!(links.is_empty());
    }

    #[test]
    fn result_is_capped_at_max_links() {
        let discovered: Vec<String> = (0..5)
            .map(|i| format!("https://example.com/{i}"))
            .collect();
        let links = filter_links("https://example.com", &discovered, &[], &[], 2);
        assert_eq!(links.len(), 2);
    }
}
