/// Converts `PascalCase`/`camelCase` into a separator-joined lower-case slug.
///
/// `snake_case("TestDocument", '-') == "test-document"`
pub fn snake_case(value: &str, separator: char) -> String {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };

    let mut slug: String = first.to_lowercase().collect();
    for ch in chars {
        if ch.is_uppercase() {
            slug.push(separator);
            slug.extend(ch.to_lowercase());
        } else {
            slug.push(ch);
        }
    }
    slug
}
