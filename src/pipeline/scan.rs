//! Fast pass: flag pages whose text mentions any keyword.
//!
//! Only plain text is read here; tables are left for the extraction pass so
//! a 300-page annual report costs one text read per page and nothing more.

use crate::document::PageSource;
use tracing::{debug, info};

/// Return the indices of pages containing at least one keyword.
///
/// Matching is case-insensitive substring containment. A page whose text
/// cannot be read is treated as empty rather than failing the scan. The
/// result is strictly increasing and empty iff no page matches.
pub fn scan_pages<S: PageSource + ?Sized>(source: &S, keywords: &[String]) -> Vec<usize> {
    let needles: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    let total = source.page_count();
    let mut flagged = Vec::new();

    for index in 0..total {
        let text = match source.page_text(index) {
            Ok(t) => t,
            Err(e) => {
                debug!("Scan: treating unreadable {} as empty", e);
                String::new()
            }
        };
        let lower = text.to_lowercase();
        if let Some(hit) = needles.iter().find(|n| lower.contains(n.as_str())) {
            debug!("Scan: page {} matches '{}'", index, hit);
            flagged.push(index);
        }
    }

    info!("Scan flagged {}/{} pages", flagged.len(), total);
    flagged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, Table};
    use crate::error::PageReadError;

    /// Pages listed in `broken` fail to read.
    struct PartlyUnreadable {
        doc: Document,
        broken: Vec<usize>,
    }

    impl PageSource for PartlyUnreadable {
        fn page_count(&self) -> usize {
            self.doc.page_count()
        }

        fn page_text(&self, index: usize) -> Result<String, PageReadError> {
            if self.broken.contains(&index) {
                return Err(PageReadError {
                    index,
                    detail: "no text layer".into(),
                });
            }
            self.doc.page_text(index)
        }

        fn page_tables(&self, index: usize) -> Result<Vec<Table>, PageReadError> {
            self.doc.page_tables(index)
        }
    }

    fn kw(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flags_only_matching_pages() {
        let doc = Document::from_page_texts(
            "mem",
            ["Cover page", "Chairman letter", "Total Assets 1,234 million 2023"],
        );
        assert_eq!(scan_pages(&doc, &kw(&["Total Assets"])), vec![2]);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let doc = Document::from_page_texts("mem", ["NET INCOME rose", "net income fell"]);
        assert_eq!(scan_pages(&doc, &kw(&["Net Income"])), vec![0, 1]);
    }

    #[test]
    fn no_match_yields_empty() {
        let doc = Document::from_page_texts("mem", ["nothing", "", "here"]);
        assert!(scan_pages(&doc, &kw(&["Revenue"])).is_empty());
    }

    #[test]
    fn page_matching_several_keywords_listed_once() {
        let doc = Document::from_page_texts("mem", ["Revenue and Net Income"]);
        assert_eq!(scan_pages(&doc, &kw(&["Revenue", "Net Income"])), vec![0]);
    }

    #[test]
    fn unreadable_page_does_not_fail_the_scan() {
        let source = PartlyUnreadable {
            doc: Document::from_page_texts("mem", ["Revenue 10", "Revenue 11", "Revenue 12"]),
            broken: vec![1],
        };
        assert_eq!(scan_pages(&source, &kw(&["Revenue"])), vec![0, 2]);
    }

    #[test]
    fn all_pages_unreadable_yields_empty() {
        let source = PartlyUnreadable {
            doc: Document::from_page_texts("mem", ["Revenue", "Revenue"]),
            broken: vec![0, 1],
        };
        assert!(scan_pages(&source, &kw(&["Revenue"])).is_empty());
    }

    #[test]
    fn result_is_strictly_increasing_and_in_range() {
        let texts: Vec<String> = (0..50)
            .map(|i| if i % 7 == 0 { format!("p{i} revenue") } else { format!("p{i}") })
            .collect();
        let doc = Document::from_page_texts("mem", texts);
        let pages = scan_pages(&doc, &kw(&["Revenue"]));
        assert!(pages.windows(2).all(|w| w[0] < w[1]));
        assert!(pages.iter().all(|&p| p < 50));
        assert_eq!(pages, vec![0, 7, 14, 21, 28, 35, 42, 49]);
    }
}
