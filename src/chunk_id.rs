/// A stable chunk identifier derived from (doc_id, byte span).
///
/// Re-chunking identical input with identical parameters reproduces the
/// same ids, and two chunks of one document never share a span.
///
/// # Examples
///
/// ```
/// use docsift::chunk_id::chunk_id;
///
/// assert_eq!(chunk_id("notes/a.md", 0, 42), "notes/a.md:0-42");
/// ```
pub fn chunk_id(doc_id: &str, start: usize, end: usize) -> String {
    format!("{doc_id}:{start}-{end}")
}

/// Re-numbered id used in export bundles (1-based, zero padded).
pub fn export_id(ordinal: usize) -> String {
    format!("c_{ordinal:06}")
}
