//! Entry classification, naming and ordering shared by all containers

use crate::reader::PageEntry;

/// Extensions that qualify an archive entry as a page image
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "gif"];

/// Extensions that make an EPUB entry a page
pub const PAGE_DOCUMENT_EXTENSIONS: &[&str] = &["xhtml", "html", "htm"];

/// Lower-cased extension of an entry name
pub fn entry_extension(name: &str) -> Option<String> {
    let file = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() && ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub fn is_image_entry(name: &str) -> bool {
    entry_extension(name).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_page_document(name: &str) -> bool {
    entry_extension(name).is_some_and(|ext| PAGE_DOCUMENT_EXTENSIONS.contains(&ext.as_str()))
}

/// Normalize separators and strip leading `./` and `/`
pub fn normalize_entry_name(name: &str) -> String {
    let mut normalized = name.replace('\\', "/");
    loop {
        let trimmed = normalized.trim_start_matches("./").trim_start_matches('/');
        if trimmed.len() == normalized.len() {
            break;
        }
        normalized = trimmed.to_string();
    }
    normalized
}

/// Case-folded, separator-normalized key used for page ordering
pub fn sort_key(name: &str) -> String {
    normalize_entry_name(name).to_lowercase()
}

pub fn page_entry(name: impl Into<String>, slot: usize, size: u64) -> PageEntry {
    let name = name.into();
    PageEntry {
        sort_key: sort_key(&name),
        name,
        slot,
        size,
    }
}

/// Sort pages into their final order
///
/// Names differing only in case fall back to the raw name so the order
/// stays total.
pub fn order_pages(pages: &mut [PageEntry]) {
    pages.sort_by(|a, b| a.sort_key.cmp(&b.sort_key).then_with(|| a.name.cmp(&b.name)));
}

/// Resolve `href` found inside `base` (both container paths)
///
/// Drops fragments and queries, percent-decodes and folds `.`/`..`
/// segments. Returns `None` for external URLs.
pub fn resolve_href(base: &str, href: &str) -> Option<String> {
    let href = href.split(['#', '?']).next().unwrap_or(href).trim();
    if href.is_empty() || href.contains("://") || href.starts_with("data:") {
        return None;
    }

    let decoded = urlencoding::decode(href).map(|s| s.into_owned()).unwrap_or_else(|_| href.to_string());
    let decoded = decoded.replace('\\', "/");

    let mut segments: Vec<String> = Vec::new();
    if !decoded.starts_with('/') {
        let base = normalize_entry_name(base);
        segments.extend(base.split('/').filter(|s| !s.is_empty()).map(str::to_string));
        segments.pop();
    }

    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other.to_string()),
        }
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Find the container entry `wanted` refers to
///
/// Tries an exact case-insensitive match, then a suffix match on a path
/// boundary, then a basename match.
pub fn find_matching_entry<'a>(names: &'a [String], wanted: &str) -> Option<&'a String> {
    let wanted = normalize_entry_name(wanted).to_lowercase();
    let wanted_file = wanted.rsplit('/').next().unwrap_or(&wanted).to_string();
    let suffix = format!("/{wanted}");

    let normalized: Vec<String> = names.iter().map(|n| sort_key(n)).collect();

    normalized
        .iter()
        .position(|n| *n == wanted)
        .or_else(|| normalized.iter().position(|n| n.ends_with(&suffix)))
        .or_else(|| {
            normalized
                .iter()
                .position(|n| n.rsplit('/').next().unwrap_or(n) == wanted_file)
        })
        .map(|i| &names[i])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_allow_list() {
        assert!(is_image_entry("a.JPG"));
        assert!(is_image_entry("ch1/p01.jpeg"));
        assert!(is_image_entry("x.webp"));
        assert!(is_image_entry("x.gif"));
        assert!(!is_image_entry("cover.txt"));
        assert!(!is_image_entry("jpg"));
        assert!(!is_image_entry("dir.png/"));
        assert!(!is_image_entry("image.tiff"));
    }

    #[test]
    fn test_page_documents() {
        assert!(is_page_document("OEBPS/ch1.xhtml"));
        assert!(is_page_document("text/ch2.HTM"));
        assert!(!is_page_document("style.css"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_entry_name(".\\Vol1\\P01.png"), "Vol1/P01.png");
        assert_eq!(normalize_entry_name("/./a.png"), "a.png");
        assert_eq!(sort_key("Vol1\\B.PNG"), "vol1/b.png");
    }

    #[test]
    fn test_order_is_case_insensitive() {
        let mut pages = vec![
            page_entry("b.png", 0, 0),
            page_entry("A.jpg", 1, 0),
            page_entry("c/01.png", 2, 0),
            page_entry("a.png", 3, 0),
        ];
        order_pages(&mut pages);
        let names: Vec<&str> = pages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["A.jpg", "a.png", "b.png", "c/01.png"]);
    }

    #[test]
    fn test_order_ignores_input_order() {
        let names = ["p3.png", "P1.png", "p2.png"];
        let mut forward: Vec<_> = names.iter().enumerate().map(|(i, n)| page_entry(*n, i, 0)).collect();
        let mut reverse: Vec<_> = names.iter().rev().enumerate().map(|(i, n)| page_entry(*n, i, 0)).collect();
        order_pages(&mut forward);
        order_pages(&mut reverse);

        let f: Vec<_> = forward.iter().map(|p| &p.name).collect();
        let r: Vec<_> = reverse.iter().map(|p| &p.name).collect();
        assert_eq!(f, r);
    }

    #[test]
    fn test_resolve_href() {
        assert_eq!(
            resolve_href("OEBPS/Text/ch1.xhtml", "../Images/p%2001.jpg#x").as_deref(),
            Some("OEBPS/Images/p 01.jpg")
        );
        assert_eq!(resolve_href("ch1.xhtml", "img/a.png").as_deref(), Some("img/a.png"));
        assert_eq!(resolve_href("a/b.xhtml", "/root.png").as_deref(), Some("root.png"));
        assert_eq!(resolve_href("a/b.xhtml", "https://example.com/x.png"), None);
        assert_eq!(resolve_href("a/b.xhtml", "#frag"), None);
    }

    #[test]
    fn test_find_matching_entry() {
        let names = vec![
            "OEBPS/Images/Cover.JPG".to_string(),
            "OEBPS/Text/ch1.xhtml".to_string(),
        ];
        assert_eq!(
            find_matching_entry(&names, "oebps/images/cover.jpg"),
            Some(&names[0])
        );
        assert_eq!(find_matching_entry(&names, "Text/ch1.xhtml"), Some(&names[1]));
        assert_eq!(find_matching_entry(&names, "elsewhere/cover.jpg"), Some(&names[0]));
        assert_eq!(find_matching_entry(&names, "missing.png"), None);
    }
}
