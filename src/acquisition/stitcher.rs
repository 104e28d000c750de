/// Separator placed between consecutive in-chapter pages.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Joins per-page texts, in pagination order, into one chapter body.
pub fn stitch<S: AsRef<str>>(pages: &[S]) -> String {
    pages
        .iter()
        .map(AsRef::as_ref)
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR)
        .trim()
        .to_string()
}
