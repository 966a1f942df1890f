//! Query-string handling for module identifiers.

/// Split `id` into the part before `?` and the query (including the `?`).
///
/// `"./a.md?codeScriptName=x"` becomes `("./a.md", "?codeScriptName=x")`.
pub fn split_query(id: &str) -> (&str, &str) {
    match id.find('?') {
        Some(index) => id.split_at(index),
        None => (id, ""),
    }
}

/// Strip the query part of `id`.
pub fn trim_query(id: &str) -> &str {
    split_query(id).0
}
