//! Slash-separated path helpers for container paths and ARN resources

/// Join non-empty elements with `/` and clean the result
pub fn join(parts: &[&str]) -> String {
    let joined = parts
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/");
    clean(&joined)
}

/// Lexically clean a slash-separated path
///
/// Repeated slashes collapse, `.` elements drop, `..` removes the element
/// before it and a trailing slash is trimmed. An empty path becomes `.`.
pub fn clean(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let rooted = path.starts_with('/');
    let mut stack: Vec<&str> = Vec::new();
    for element in path.split('/') {
        match element {
            "" | "." => {}
            ".." => {
                if stack.last().is_some_and(|last| *last != "..") {
                    stack.pop();
                } else if !rooted {
                    stack.push("..");
                }
            }
            other => stack.push(other),
        }
    }
    let body = stack.join("/");
    match (rooted, body.is_empty()) {
        (true, _) => format!("/{body}"),
        (false, true) => ".".to_string(),
        (false, false) => body,
    }
}

/// Last element of a slash-separated path
pub fn base(path: &str) -> String {
    let cleaned = clean(path);
    match cleaned.rsplit('/').next() {
        Some("") | None => "/".to_string(),
        Some(last) => last.to_string(),
    }
}
