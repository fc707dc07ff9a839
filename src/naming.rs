//! Identifier casing helpers shared by the passes.

/// Splits `fooBar-baz_qux` / `UIButton` / `my.file` into words.
pub fn split_by_case(input: &str) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut parts = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if matches!(c, '-' | '_' | '/' | '.' | ' ') {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            continue;
        }
        if let Some(prev) = current.chars().last() {
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = (prev.is_lowercase() && c.is_uppercase())
                || (prev.is_uppercase() && c.is_uppercase() && next_is_lower)
                || (prev.is_ascii_digit() != c.is_ascii_digit() && c.is_uppercase());
            if boundary {
                parts.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn upper_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn lower_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn pascal_case(input: &str) -> String {
    split_by_case(input).iter().map(|w| upper_first(w)).collect()
}

pub fn camel_case(input: &str) -> String {
    lower_first(&pascal_case(input))
}

/// Last path segment without its final extension: `/a/use-thing.ts` -> `use-thing`.
pub fn file_stem(path: &str) -> &str {
    let path = path.split('?').next().unwrap_or(path);
    let base = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match base.rfind('.') {
        Some(0) | None => base,
        Some(idx) => &base[..idx],
    }
}

/// Name a default export gets when it is registered as a keyed function.
pub fn default_export_name(path: &str) -> String {
    camel_case(file_stem(path))
}
