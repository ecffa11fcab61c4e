//! Slug generation for URL identifiers of blog posts and portfolio items.

use rand::Rng;

/// English stop words dropped when [`SlugOptions::remove_stop_words`] is set.
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "with", "by", "as", "of",
    "from", "about", "against", "between", "into", "through", "during", "before", "after",
    "above", "below", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "having", "do", "does", "did", "doing",
];

/// Suffix attempts drawn from `0..10000` before widening the range.
const NARROW_SUFFIX_ATTEMPTS: usize = 32;

#[derive(Debug, Clone)]
pub struct SlugOptions {
    pub lowercase: bool,
    pub separator: String,
    pub remove_stop_words: bool,
    /// Zero disables truncation.
    pub max_length: usize,
    pub preserve_case: bool,
}

impl Default for SlugOptions {
    fn default() -> Self {
        Self {
            lowercase: true,
            separator: "-".to_string(),
            remove_stop_words: false,
            max_length: 100,
            preserve_case: false,
        }
    }
}

/// Turn arbitrary text into a URL-safe slug.
///
/// Whitespace runs become the separator, anything outside `[a-zA-Z0-9]` and the
/// separator is dropped, repeated separators collapse and the result never
/// starts or ends with a separator. Truncation backs off to the last separator
/// inside the window so words are not split.
pub fn slugify(text: &str, options: &SlugOptions) -> String {
    let sep = options.separator.as_str();
    if text.trim().is_empty() {
        return String::new();
    }

    let joined = text.split_whitespace().collect::<Vec<_>>().join(sep);
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || sep.contains(*c))
        .collect();

    let mut parts: Vec<&str> = if sep.is_empty() {
        vec![kept.as_str()]
    } else {
        kept.split(sep).filter(|part| !part.is_empty()).collect()
    };

    if options.remove_stop_words {
        parts.retain(|part| !STOP_WORDS.contains(&part.to_lowercase().as_str()));
    }

    let mut slug = parts.join(sep);

    if options.lowercase && !options.preserve_case {
        slug = slug.to_lowercase();
    }

    if options.max_length > 0 && slug.len() > options.max_length {
        let mut cut = options.max_length;
        while !slug.is_char_boundary(cut) {
            cut -= 1;
        }
        let window = &slug[..cut];
        let end = match window.rfind(sep) {
            Some(idx) if !sep.is_empty() => idx,
            _ => cut,
        };
        slug.truncate(end);
    }

    slug
}

/// Slugify `text`, appending a random numeric suffix when the result is
/// already taken. A colliding suffix is replaced by a fresh one until free.
pub fn unique_slug<S: AsRef<str>>(text: &str, existing: &[S], options: &SlugOptions) -> String {
    let base = slugify(text, options);
    let taken = |candidate: &str| existing.iter().any(|s| s.as_ref() == candidate);

    if !taken(&base) {
        return base;
    }

    let sep = options.separator.as_str();
    let mut rng = rand::rng();
    let mut attempts = 0;
    loop {
        let suffix: u64 = if attempts < NARROW_SUFFIX_ATTEMPTS {
            rng.random_range(0..10_000)
        } else {
            rng.random_range(10_000..u64::from(u32::MAX))
        };
        let candidate = format!("{}{}{}", base, sep, suffix);
        if !taken(&candidate) {
            return candidate;
        }
        attempts += 1;
    }
}
