/// Replace backslashes, collapse repeated slashes and drop leading slashes.
pub fn normalize_slashes(key: &str) -> String {
    let replaced = key.replace('\\', "/");
    let mut normalized = String::with_capacity(replaced.len());
    let mut previous_slash = false;

    for c in replaced.chars() {
        if c == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        normalized.push(c);
    }

    normalized.trim_start_matches('/').to_string()
}

/// Percent-encode each path segment, dropping empty segments.
pub fn encode_url_path(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
