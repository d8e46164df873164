//! Link filtering applied to producer output before it reaches the graph.
//!
//! A linked title is dropped when it mentions the article itself
//! (case-insensitive), contains a digit (years, dates, lists) or contains a
//! colon (namespaced pages such as `Category:` or `Help:`).

use regex::Regex;

use crate::error::GraphError;

#[derive(Debug, Clone)]
pub struct LinkFilter {
    rejected: Regex,
}

impl LinkFilter {
    pub fn new(article_title: &str) -> Result<Self, GraphError> {
        let title = article_title.trim();
        let pattern = if title.is_empty() {
            r"\d|:".to_string()
        } else {
            format!(r"(?i){}|\d|:", regex::escape(title))
        };
        let rejected = Regex::new(&pattern)
            .map_err(|e| GraphError::InvalidInput(format!("unusable article title: {}", e)))?;
        Ok(Self { rejected })
    }

    pub fn accepts(&self, link: &str) -> bool {
        !self.rejected.is_match(link)
    }

    /// Trimmed, non-blank links that pass the filter, in input order.
    pub fn apply<I, S>(&self, links: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        links
            .into_iter()
            .filter_map(|link| {
                let link = link.as_ref().trim();
                (!link.is_empty() && self.accepts(link)).then(|| link.to_string())
            })
            .collect()
    }
}

/// Filter `links` found on `article_title`.
pub fn filter_links<I, S>(article_title: &str, links: I) -> Result<Vec<String>, GraphError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Ok(LinkFilter::new(article_title)?.apply(links))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_self_references_case_insensitively() {
        let kept = filter_links(
            "Analytic philosophy",
            ["Logic", "History of analytic philosophy", "ANALYTIC PHILOSOPHY"],
        )
        .unwrap();
        assert_eq!(kept, vec!["Logic".to_string()]);
    }

    #[test]
    fn test_drops_digits_and_colons() {
        let kept = filter_links(
            "Ethics",
            ["20th-century philosophy", "Category:Ethics", "Help:Contents", "Virtue"],
        )
        .unwrap();
        assert_eq!(kept, vec!["Virtue".to_string()]);
    }

    #[test]
    fn test_trims_and_skips_blank_lines() {
        let kept = filter_links("Ethics", ["  Justice  ", "", "   ", "Virtue"]).unwrap();
        assert_eq!(kept, vec!["Justice".to_string(), "Virtue".to_string()]);
    }

    #[test]
    fn test_title_with_regex_metacharacters() {
        let filter = LinkFilter::new("C++ (programming)").unwrap();
        assert!(!filter.accepts("History of C++ (programming)"));
        assert!(filter.accepts("Bjarne Stroustrup"));
    }

    #[test]
    fn test_unicode_digits_are_rejected() {
        let filter = LinkFilter::new("Logic").unwrap();
        assert!(!filter.accepts("Chapter ٣"));
    }
}
