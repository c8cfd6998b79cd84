//! Naming conventions: singular/plural forms and case conversion.
//!
//! Default foreign keys (`author_id`), property names (`author`, `books`),
//! junction aliases and entity class names are all derived from association
//! and table aliases with these helpers.

use regex::Regex;
use std::sync::OnceLock;

/// Irregular singular/plural pairs, matched case-insensitively on the whole word.
const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("foot", "feet"),
    ("tooth", "teeth"),
    ("goose", "geese"),
    ("mouse", "mice"),
    ("datum", "data"),
    ("criterion", "criteria"),
];

/// Words with identical singular and plural forms.
const UNINFLECTED: &[&str] = &[
    "sheep", "fish", "series", "species", "news", "media", "equipment", "information",
];

struct Rules {
    plural: Vec<(Regex, &'static str)>,
    singular: Vec<(Regex, &'static str)>,
    word_boundary: Option<Regex>,
}

fn rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| {
        let compile = |table: &[(&'static str, &'static str)]| {
            table
                .iter()
                .filter_map(|(pattern, replacement)| {
                    Regex::new(pattern).ok().map(|re| (re, *replacement))
                })
                .collect::<Vec<_>>()
        };
        Rules {
            plural: compile(&[
                (r"(?i)(quiz)$", "${1}zes"),
                (r"(?i)(matr|vert|ind)(ix|ex)$", "${1}ices"),
                (r"(?i)(x|ch|ss|sh)$", "${1}es"),
                (r"(?i)([^aeiouy]|qu)y$", "${1}ies"),
                (r"(?i)(?:([^f])fe|([lr])f)$", "${1}${2}ves"),
                (r"(?i)sis$", "ses"),
                (r"(?i)([ti])um$", "${1}a"),
                (r"(?i)(buffal|tomat|potat)o$", "${1}oes"),
                (r"(?i)(alias|status|campus|bus)$", "${1}es"),
                (r"(?i)s$", "s"),
                (r"$", "s"),
            ]),
            singular: compile(&[
                (r"(?i)(quiz)zes$", "${1}"),
                (r"(?i)(matr)ices$", "${1}ix"),
                (r"(?i)(vert|ind)ices$", "${1}ex"),
                (r"(?i)(alias|status|campus|bus)(es)?$", "${1}"),
                (r"(?i)(x|ch|ss|sh)es$", "${1}"),
                (r"(?i)(m)ovies$", "${1}ovie"),
                (r"(?i)([^aeiouy]|qu)ies$", "${1}y"),
                (r"(?i)([lr])ves$", "${1}f"),
                (r"(?i)([^f])ves$", "${1}fe"),
                (r"(?i)(analy|ba|diagno|parenthe|progno|synop|the)ses$", "${1}sis"),
                (r"(?i)(buffal|tomat|potat)oes$", "${1}o"),
                (r"(?i)([ti])a$", "${1}um"),
                (r"(?i)(ss)$", "${1}"),
                (r"(?i)s$", ""),
            ]),
            word_boundary: Regex::new(r"([a-z\d])([A-Z])|([A-Z]+)([A-Z][a-z])").ok(),
        }
    })
}

/// Copy the case of the first character of `original` onto `word`.
fn match_case(original: &str, word: &str) -> String {
    let upper = original.chars().next().is_some_and(char::is_uppercase);
    let mut chars = word.chars();
    match chars.next() {
        Some(first) if upper => first.to_uppercase().chain(chars).collect(),
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn inflect(
    word: &str,
    rules: &[(Regex, &'static str)],
    irregular: impl Fn(&str) -> Option<&'static str>,
) -> String {
    if word.is_empty() {
        return String::new();
    }
    let lower = word.to_lowercase();
    if UNINFLECTED.contains(&lower.as_str()) {
        return word.to_string();
    }
    if let Some(replacement) = irregular(&lower) {
        return match_case(word, replacement);
    }
    for (re, replacement) in rules {
        if re.is_match(word) {
            return re.replace(word, *replacement).into_owned();
        }
    }
    word.to_string()
}

/// Apply `f` to the last word of a CamelCase or snake_case compound.
fn last_word(word: &str, f: impl Fn(&str) -> String) -> String {
    let split = word
        .char_indices()
        .filter(|(i, c)| *i > 0 && (c.is_uppercase() || *c == '_'))
        .map(|(i, c)| if c == '_' { i + 1 } else { i })
        .last()
        .unwrap_or(0);
    let (head, tail) = word.split_at(split);
    format!("{head}{}", f(tail))
}

/// Plural form: `Author` -> `Authors`, `category` -> `categories`.
pub fn pluralize(word: &str) -> String {
    last_word(word, |w| {
        inflect(w, &rules().plural, |lower| {
            IRREGULAR
                .iter()
                .find(|(singular, _)| *singular == lower)
                .map(|(_, plural)| *plural)
        })
    })
}

/// Singular form: `Authors` -> `Author`, `ArticlesTags` -> `ArticlesTag`.
pub fn singularize(word: &str) -> String {
    last_word(word, |w| {
        inflect(w, &rules().singular, |lower| {
            IRREGULAR
                .iter()
                .find(|(_, plural)| *plural == lower)
                .map(|(singular, _)| *singular)
        })
    })
}

/// `ArticlesTags` -> `articles_tags`, `HTTPRequests` -> `http_requests`.
pub fn underscore(word: &str) -> String {
    let Some(boundary) = rules().word_boundary.as_ref() else {
        return word.replace('-', "_").to_lowercase();
    };
    boundary
        .replace_all(word, |caps: &regex::Captures<'_>| {
            if let (Some(a), Some(b)) = (caps.get(1), caps.get(2)) {
                format!("{}_{}", a.as_str(), b.as_str())
            } else {
                let a = caps.get(3).map_or("", |m| m.as_str());
                let b = caps.get(4).map_or("", |m| m.as_str());
                format!("{a}_{b}")
            }
        })
        .replace('-', "_")
        .to_lowercase()
}

/// `articles_tags` -> `ArticlesTags`.
pub fn camelize(word: &str) -> String {
    word.split(['_', '-'])
        .filter(|part| !part.is_empty())
        .map(|part| match_case("A", part))
        .collect()
}

/// `Authors` -> `author_id`: the conventional foreign key pointing at a table.
pub fn foreign_key(alias: &str) -> String {
    format!("{}_id", underscore(&singularize(alias)))
}

/// `ArticlesTags` -> `articles_tags`: the conventional table name for an alias.
pub fn tableize(alias: &str) -> String {
    underscore(alias)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singularize() {
        assert_eq!(singularize("Authors"), "Author");
        assert_eq!(singularize("Categories"), "Category");
        assert_eq!(singularize("People"), "Person");
        assert_eq!(singularize("Addresses"), "Address");
        assert_eq!(singularize("Wolves"), "Wolf");
        assert_eq!(singularize("Author"), "Author");
        assert_eq!(singularize("ArticlesTags"), "ArticlesTag");
        assert_eq!(singularize("Series"), "Series");
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("Author"), "Authors");
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("Person"), "People");
        assert_eq!(pluralize("BlogPost"), "BlogPosts");
    }

    #[test]
    fn test_underscore_and_camelize() {
        assert_eq!(underscore("ArticlesTags"), "articles_tags");
        assert_eq!(underscore("Author"), "author");
        assert_eq!(underscore("HTTPRequests"), "http_requests");
        assert_eq!(camelize("articles_tags"), "ArticlesTags");
    }

    #[test]
    fn test_foreign_key() {
        assert_eq!(foreign_key("Authors"), "author_id");
        assert_eq!(foreign_key("BlogPosts"), "blog_post_id");
        assert_eq!(foreign_key("Categories"), "category_id");
    }
}
