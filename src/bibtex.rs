//! BibTeX parser producing the citation metadata consumed by the collector.
//!
//! Supports `@string` abbreviations, `#` concatenation, braced, quoted,
//! numeric and bare values. `@comment` and `@preamble` blocks are skipped.

use crate::ast::BibEntry;
use crate::error::{ParseError, Result};
use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    IResult,
};
use std::collections::HashMap;

/// Parse a BibTeX file and return a map of citation keys to entries.
pub fn parse_bibtex(input: &str) -> Result<HashMap<String, BibEntry>> {
    let mut entries = HashMap::new();
    let mut strings: HashMap<String, String> = HashMap::new();
    let mut remaining = input;

    loop {
        // Everything outside an entry is a comment
        let Some(at) = remaining.find('@') else {
            break;
        };
        remaining = &remaining[at..];

        match parse_entry(remaining, &strings) {
            Ok((rest, Item::Entry(entry))) => {
                if entries.contains_key(&entry.key) {
                    tracing::warn!(key = %entry.key, "duplicate BibTeX key, keeping the first");
                } else {
                    entries.insert(entry.key.clone(), entry);
                }
                remaining = rest;
            }
            Ok((rest, Item::String(name, value))) => {
                strings.insert(name, value);
                remaining = rest;
            }
            Ok((rest, Item::Skipped)) => remaining = rest,
            Err(_) if !braces_close(remaining) => {
                let line = input[..input.len() - remaining.len()].matches('\n').count() + 1;
                return Err(ParseError::BibTeX(format!("unterminated entry starting at line {}", line)).into());
            }
            Err(_) => {
                // Try to recover at the next @
                tracing::debug!("skipping malformed BibTeX entry");
                remaining = &remaining[1..];
            }
        }
    }

    tracing::debug!(entries = entries.len(), "parsed bibliography");
    Ok(entries)
}

enum Item {
    Entry(BibEntry),
    String(String, String),
    Skipped,
}

fn is_key_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | ':' | '.' | '/' | '+')
}

fn parse_entry<'a>(input: &'a str, strings: &HashMap<String, String>) -> IResult<&'a str, Item> {
    let (input, _) = char('@')(input)?;
    let (input, entry_type) = take_while1(|c: char| c.is_alphanumeric())(input)?;
    let (input, _) = multispace0(input)?;
    let entry_type = entry_type.to_lowercase();

    match entry_type.as_str() {
        "comment" | "preamble" => {
            let (input, _) = braced(input)?;
            return Ok((input, Item::Skipped));
        }
        "string" => {
            let (input, _) = char('{')(input)?;
            let (input, (name, value)) = parse_field(input, strings)?;
            let (input, _) = multispace0(input)?;
            let (input, _) = char('}')(input)?;
            return Ok((input, Item::String(name.to_lowercase(), value)));
        }
        _ => {}
    }

    let (input, _) = char('{')(input)?;
    let (input, _) = multispace0(input)?;
    let (input, key) = take_while1(is_key_char)(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char(',')(input)?;

    let mut fields = HashMap::new();
    let mut remaining = input;
    loop {
        remaining = remaining.trim_start();
        if remaining.starts_with('}') {
            break;
        }
        let (rest, (name, value)) = parse_field(remaining, strings)?;
        fields.insert(name.to_lowercase(), value);
        remaining = rest.trim_start();
        if let Some(rest) = remaining.strip_prefix(',') {
            remaining = rest;
        }
    }
    let (input, _) = char('}')(remaining)?;

    Ok((input, Item::Entry(build_entry(key, &entry_type, fields))))
}

fn parse_field<'a>(input: &'a str, strings: &HashMap<String, String>) -> IResult<&'a str, (String, String)> {
    let (input, _) = multispace0(input)?;
    let (input, name) = take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '-')(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char('=')(input)?;

    // value = part ( # part )*
    let mut value = String::new();
    let mut remaining = input;
    loop {
        let (rest, _) = multispace0(remaining)?;
        let (rest, part) = parse_value_part(rest, strings)?;
        value.push_str(&part);
        let (rest, _) = multispace0(rest)?;
        match rest.strip_prefix('#') {
            Some(rest) => remaining = rest,
            None => {
                remaining = rest;
                break;
            }
        }
    }

    Ok((remaining, (name.to_string(), clean_bibtex_value(&value))))
}

fn parse_value_part<'a>(input: &'a str, strings: &HashMap<String, String>) -> IResult<&'a str, String> {
    if input.starts_with('{') {
        let (rest, inner) = braced(input)?;
        return Ok((rest, inner.to_string()));
    }
    if input.starts_with('"') {
        return quoted(input);
    }
    let (rest, word) = alt((
        take_while1(|c: char| c.is_ascii_digit()),
        take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '-'),
    ))(input)?;
    // Bare words are @string abbreviations (month names fall back to themselves)
    let value = strings
        .get(&word.to_lowercase())
        .cloned()
        .unwrap_or_else(|| word.to_string());
    Ok((rest, value))
}

/// `{...}` with nested braces; returns the inner text.
fn braced(input: &str) -> IResult<&str, &str> {
    let (input, _) = char('{')(input)?;
    let mut depth = 1;

    for (i, c) in input.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&input[i + 1..], &input[..i]));
                }
            }
            _ => {}
        }
    }

    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

fn quoted(input: &str) -> IResult<&str, String> {
    let (input, _) = char('"')(input)?;
    let mut escape = false;
    let mut depth = 0;

    for (i, c) in input.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match c {
            '\\' => escape = true,
            '{' => depth += 1,
            '}' => depth -= 1,
            '"' if depth == 0 => return Ok((&input[i + 1..], input[..i].to_string())),
            _ => {}
        }
    }

    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

/// Whether the entry starting at `input` ever closes its outer brace.
fn braces_close(input: &str) -> bool {
    let Some(open) = input.find(['{', '(']) else {
        return false;
    };
    let mut depth = 0;
    for c in input[open..].chars() {
        match c {
            '{' | '(' => depth += 1,
            '}' | ')' => {
                depth -= 1;
                if depth == 0 {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

fn clean_bibtex_value(value: &str) -> String {
    // Remove LaTeX braces used for capitalization preservation
    let mut result = String::with_capacity(value.len());
    let mut depth = 0;
    let mut chars = value.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'\\') => {
                result.push(c);
                depth += 1;
            }
            '{' => {}
            '}' if depth > 0 => {
                result.push(c);
                depth -= 1;
            }
            '}' => {}
            _ => result.push(c),
        }
    }

    // Normalize whitespace
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn build_entry(key: &str, entry_type: &str, mut fields: HashMap<String, String>) -> BibEntry {
    BibEntry {
        key: key.to_string(),
        entry_type: entry_type.to_string(),
        title: fields.remove("title"),
        authors: fields
            .remove("author")
            .map(|a| parse_authors(&a))
            .unwrap_or_default(),
        year: fields.remove("year"),
        journal: fields.remove("journal"),
        booktitle: fields.remove("booktitle"),
        publisher: fields.remove("publisher"),
        volume: fields.remove("volume"),
        number: fields.remove("number"),
        pages: fields.remove("pages"),
        doi: fields.remove("doi"),
        url: fields.remove("url"),
        // All other fields
        extra: fields,
    }
}

fn parse_authors(input: &str) -> Vec<String> {
    // Authors are separated by " and "
    input
        .split(" and ")
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_simple_entry() {
        let input = r#"
@article{knuth1984,
    author = {Donald E. Knuth},
    title = {Literate Programming},
    journal = {The Computer Journal},
    year = {1984},
    volume = 27,
    pages = {97--111}
}
"#;

        let entries = parse_bibtex(input).unwrap();
        assert_eq!(entries.len(), 1);

        let entry = &entries["knuth1984"];
        assert_eq!(entry.entry_type, "article");
        assert_eq!(entry.title.as_deref(), Some("Literate Programming"));
        assert_eq!(entry.authors, vec!["Donald E. Knuth"]);
        assert_eq!(entry.volume.as_deref(), Some("27"));
    }

    #[test]
    fn test_parse_multiple_authors() {
        let input = r#"
@book{dragon2006,
    author = {Alfred V. Aho and Monica S. Lam and Ravi Sethi and Jeffrey D. Ullman},
    title = {Compilers: Principles, Techniques, and Tools},
    year = {2006}
}
"#;

        let entries = parse_bibtex(input).unwrap();
        assert_eq!(entries["dragon2006"].authors.len(), 4);
    }

    #[test]
    fn test_string_abbreviations_and_concatenation() {
        let input = r#"
@string{cj = "The Computer Journal"}
@comment{ignored {nested} }
@article{k, journal = cj # { (UK)}, month = jan, note = "A {"}quoted{"} word"}
"#;
        let entries = parse_bibtex(input).unwrap();
        let entry = &entries["k"];
        assert_eq!(entry.journal.as_deref(), Some("The Computer Journal (UK)"));
        assert_eq!(entry.extra["month"], "jan");
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_text_outside_entries_is_ignored() {
        let input = "% comment\nfree text\n@misc{test, title = {Test}}\ntrailing";
        let entries = parse_bibtex(input).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_unterminated_entry_is_error() {
        let err = parse_bibtex("@article{broken, title = {Never closed").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_clean_bibtex_value() {
        assert_eq!(clean_bibtex_value("{DNA} Sequencing"), "DNA Sequencing");
        assert_eq!(clean_bibtex_value("The {Art} of Programming"), "The Art of Programming");
    }
}
