//! Lexer for tokenizing Markdown source.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while, take_while1},
    character::complete::{char, not_line_ending, space0, space1},
    combinator::{map, not, opt, peek, recognize, value},
    multi::many0,
    sequence::{delimited, pair, tuple},
    IResult,
};

/// A token from the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'a> {
    // Block-level tokens
    Heading(u8, &'a str), // Level, content
    FencedCodeStart(&'a str, &'a str), // Fence, language
    ThematicBreak,
    ListItemMarker(ListMarker),
    EnvironmentStart {
        kind: &'a str,
        label: Option<&'a str>,
        argument: &'a str,
    },
    DirectiveOption(&'a str, &'a str), // :name: value
    FootnoteDefinition(&'a str, &'a str), // id, first line

    // Inline tokens
    Emphasis(&'a str),
    Strong(&'a str),
    InlineCode(&'a str),
    InlineMath(&'a str),
    DisplayMath(&'a str),
    Citation(Vec<CitationToken<'a>>),
    Reference(&'a str), // @label
    FootnoteInline(&'a str), // ^[content]
    FootnoteRef(&'a str), // [^id]
    Label(&'a str), // {#label}
    Role(&'a str, &'a str), // {name}`content`
}

#[derive(Debug, Clone, PartialEq)]
pub struct CitationToken<'a> {
    pub key: &'a str,
    pub locator: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListMarker {
    Unordered,
    Ordered(u32),
    Checkbox(bool),
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

/// Parse a heading (ATX style: # Heading).
pub fn heading(input: &str) -> IResult<&str, Token> {
    let (input, hashes) = take_while1(|c| c == '#')(input)?;
    let level = hashes.len().min(6) as u8;
    let (input, _) = space1(input)?;
    let (input, content) = not_line_ending(input)?;
    // Trim trailing # and spaces
    let content = content.trim_end_matches(|c| c == '#' || c == ' ');
    Ok((input, Token::Heading(level, content)))
}

/// Parse a thematic break (---, ***, ___).
pub fn thematic_break(input: &str) -> IResult<&str, Token> {
    let (input, _) = alt((
        recognize(tuple((tag("---"), many0(char('-'))))),
        recognize(tuple((tag("***"), many0(char('*'))))),
        recognize(tuple((tag("___"), many0(char('_'))))),
    ))(input)?;
    let (input, _) = space0(input)?;
    if !input.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Eof,
        )));
    }
    Ok((input, Token::ThematicBreak))
}

/// Parse a fenced code block start.
pub fn fenced_code_start(input: &str) -> IResult<&str, Token> {
    let (input, fence) = alt((
        recognize(pair(tag("```"), take_while(|c| c == '`'))),
        recognize(pair(tag("~~~"), take_while(|c| c == '~'))),
    ))(input)?;
    let (input, _) = space0(input)?;
    let (input, lang) = opt(take_while1(|c: char| is_name_char(c) || c == '+'))(input)?;
    let (input, _) = not_line_ending(input)?;
    Ok((input, Token::FencedCodeStart(fence, lang.unwrap_or(""))))
}

/// Parse an environment start: `::: kind {#label}` or `:::{kind} argument`.
pub fn environment_start(input: &str) -> IResult<&str, Token> {
    let (input, _) = pair(tag(":::"), take_while(|c| c == ':'))(input)?;
    let (input, _) = space0(input)?;
    let (input, kind) = alt((
        delimited(char('{'), take_while1(is_name_char), char('}')),
        take_while1(is_name_char),
    ))(input)?;
    let (input, rest) = not_line_ending(input)?;
    let (argument, label) = extract_label(rest.trim());
    Ok((
        input,
        Token::EnvironmentStart {
            kind,
            label,
            argument: argument.trim(),
        },
    ))
}

/// A closing `:::` line.
pub fn is_environment_end(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 3 && trimmed.chars().all(|c| c == ':')
}

/// Parse a directive option line (`:label: fig1`).
pub fn directive_option(input: &str) -> IResult<&str, Token> {
    let (input, name) = delimited(char(':'), take_while1(is_name_char), char(':'))(input)?;
    let (input, _) = space0(input)?;
    let (input, value) = not_line_ending(input)?;
    Ok((input, Token::DirectiveOption(name, value.trim())))
}

/// Parse a footnote definition start (`[^id]: text`).
pub fn footnote_definition(input: &str) -> IResult<&str, Token> {
    let (input, id) = delimited(tag("[^"), take_while1(is_name_char), tag("]:"))(input)?;
    let (input, _) = space0(input)?;
    let (input, first) = not_line_ending(input)?;
    Ok((input, Token::FootnoteDefinition(id, first)))
}

/// Parse a list item marker.
pub fn list_item_marker(input: &str) -> IResult<&str, Token> {
    alt((
        // Checkbox
        map(
            tuple((
                alt((char('-'), char('*'), char('+'))),
                space1,
                char('['),
                alt((value(true, char('x')), value(true, char('X')), value(false, char(' ')))),
                char(']'),
                space0,
            )),
            |(_, _, _, checked, _, _)| Token::ListItemMarker(ListMarker::Checkbox(checked)),
        ),
        // Unordered
        map(
            tuple((alt((char('-'), char('*'), char('+'))), space1)),
            |_| Token::ListItemMarker(ListMarker::Unordered),
        ),
        // Ordered
        map(
            tuple((
                take_while1(|c: char| c.is_ascii_digit()),
                alt((char('.'), char(')'))),
                space1,
            )),
            |(num, _, _): (&str, _, _)| {
                Token::ListItemMarker(ListMarker::Ordered(num.parse().unwrap_or(1)))
            },
        ),
    ))(input)
}

/// Parse inline math ($...$).
pub fn inline_math(input: &str) -> IResult<&str, Token> {
    let (input, _) = char('$')(input)?;
    let (input, _) = peek(not(char('$')))(input)?; // Not display math
    let (input, content) = take_until("$")(input)?;
    let (input, _) = char('$')(input)?;
    Ok((input, Token::InlineMath(content)))
}

/// Parse display math ($$...$$).
pub fn display_math(input: &str) -> IResult<&str, Token> {
    let (input, _) = tag("$$")(input)?;
    let (input, content) = take_until("$$")(input)?;
    let (input, _) = tag("$$")(input)?;
    Ok((input, Token::DisplayMath(content)))
}

/// Parse a citation (`[@key]`, `[@a; @b, p. 42]`).
pub fn citation(input: &str) -> IResult<&str, Token> {
    let (input, _) = tag("[@")(input)?;
    let (input, content) = take_until("]")(input)?;
    let (input, _) = char(']')(input)?;

    // Parse citation content: key1; @key2, locator
    let citations: Vec<CitationToken> = content
        .split(';')
        .map(|part| {
            let part = part.trim();
            let part = part.strip_prefix('@').unwrap_or(part);
            if let Some((key, locator)) = part.split_once(',') {
                CitationToken {
                    key: key.trim(),
                    locator: Some(locator.trim()),
                }
            } else {
                CitationToken {
                    key: part,
                    locator: None,
                }
            }
        })
        .collect();

    Ok((input, Token::Citation(citations)))
}

/// Parse a cross-reference (@label).
pub fn reference(input: &str) -> IResult<&str, Token> {
    let (after_at, _) = char('@')(input)?;
    // Ensure it's not a citation
    let (_, _) = peek(not(char('[')))(after_at)?;
    let (_, label) =
        take_while1(|c: char| c.is_alphanumeric() || c == ':' || c == '-' || c == '_')(after_at)?;
    // A trailing colon is punctuation, not part of the label
    let label = label.trim_end_matches(':');
    if label.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(
            after_at,
            nom::error::ErrorKind::TakeWhile1,
        )));
    }
    Ok((&after_at[label.len()..], Token::Reference(label)))
}

/// Parse an inline footnote (^[content]).
pub fn footnote_inline(input: &str) -> IResult<&str, Token> {
    let (input, _) = tag("^[")(input)?;
    let (input, content) = take_until("]")(input)?;
    let (input, _) = char(']')(input)?;
    Ok((input, Token::FootnoteInline(content)))
}

/// Parse a footnote reference ([^id]).
pub fn footnote_ref(input: &str) -> IResult<&str, Token> {
    let (input, _) = tag("[^")(input)?;
    let (input, id) = take_while1(is_name_char)(input)?;
    let (input, _) = char(']')(input)?;
    Ok((input, Token::FootnoteRef(id)))
}

/// Parse a label ({#label}).
pub fn label(input: &str) -> IResult<&str, Token> {
    let (input, _) = tag("{#")(input)?;
    let (input, id) = take_while1(|c: char| c != '}')(input)?;
    let (input, _) = char('}')(input)?;
    Ok((input, Token::Label(id)))
}

/// Parse a role ({name}`content`).
pub fn role(input: &str) -> IResult<&str, Token> {
    let (input, name) = delimited(
        char('{'),
        take_while1(|c: char| is_name_char(c) || c == ':'),
        char('}'),
    )(input)?;
    let (input, content) = delimited(char('`'), take_until("`"), char('`'))(input)?;
    Ok((input, Token::Role(name, content)))
}

/// Parse inline code (`code`).
pub fn inline_code(input: &str) -> IResult<&str, Token> {
    let (input, _) = char('`')(input)?;
    let (input, _) = peek(not(char('`')))(input)?; // Not fenced code
    let (input, content) = take_until("`")(input)?;
    let (input, _) = char('`')(input)?;
    Ok((input, Token::InlineCode(content)))
}

/// Parse emphasis (*text* or _text_).
pub fn emphasis(input: &str) -> IResult<&str, Token> {
    alt((
        delimited(
            pair(char('*'), peek(not(char('*')))),
            map(take_until("*"), Token::Emphasis),
            char('*'),
        ),
        delimited(
            pair(char('_'), peek(not(char('_')))),
            map(take_until("_"), Token::Emphasis),
            char('_'),
        ),
    ))(input)
}

/// Parse strong (**text** or __text__).
pub fn strong(input: &str) -> IResult<&str, Token> {
    alt((
        delimited(tag("**"), map(take_until("**"), Token::Strong), tag("**")),
        delimited(tag("__"), map(take_until("__"), Token::Strong), tag("__")),
    ))(input)
}

/// Extract a label from the end of a string ({#label}).
pub fn extract_label(s: &str) -> (&str, Option<&str>) {
    let trimmed = s.trim_end();
    if let Some(start) = trimmed.rfind("{#") {
        if let Some(end) = trimmed[start..].find('}') {
            let label = &trimmed[start + 2..start + end];
            if !label.is_empty() {
                let content = trimmed[..start].trim_end();
                return (content, Some(label));
            }
        }
    }
    (s, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading() {
        assert_eq!(
            heading("# Hello World"),
            Ok(("", Token::Heading(1, "Hello World")))
        );
        assert_eq!(
            heading("### Level 3 ###"),
            Ok(("", Token::Heading(3, "Level 3")))
        );
    }

    #[test]
    fn test_thematic_break() {
        assert!(thematic_break("---").is_ok());
        assert!(thematic_break("*****  ").is_ok());
        assert!(thematic_break("--- text").is_err());
    }

    #[test]
    fn test_inline_math() {
        assert_eq!(
            inline_math("$E = mc^2$ rest"),
            Ok((" rest", Token::InlineMath("E = mc^2")))
        );
    }

    #[test]
    fn test_display_math() {
        assert_eq!(
            display_math("$$\\int_0^1 x dx$$"),
            Ok(("", Token::DisplayMath("\\int_0^1 x dx")))
        );
    }

    #[test]
    fn test_citation_strips_every_at() {
        let Ok((_, Token::Citation(cites))) = citation("[@a; @b, p. 4]") else {
            panic!("expected citation");
        };
        assert_eq!(cites.len(), 2);
        assert_eq!(cites[0].key, "a");
        assert_eq!(cites[1].key, "b");
        assert_eq!(cites[1].locator, Some("p. 4"));
    }

    #[test]
    fn test_reference() {
        assert_eq!(reference("@eq:euler"), Ok(("", Token::Reference("eq:euler"))));
        assert_eq!(reference("@fig1 shows"), Ok((" shows", Token::Reference("fig1"))));
        assert_eq!(reference("@fig1: next"), Ok((": next", Token::Reference("fig1"))));
    }

    #[test]
    fn test_environment_forms() {
        assert_eq!(
            environment_start("::: theorem {#thm:main}"),
            Ok((
                "",
                Token::EnvironmentStart {
                    kind: "theorem",
                    label: Some("thm:main"),
                    argument: ""
                }
            ))
        );
        assert_eq!(
            environment_start(":::{figure} images/cat.png"),
            Ok((
                "",
                Token::EnvironmentStart {
                    kind: "figure",
                    label: None,
                    argument: "images/cat.png"
                }
            ))
        );
        assert!(is_environment_end(":::"));
        assert!(is_environment_end("::::  "));
        assert!(!is_environment_end(":::{note}"));
    }

    #[test]
    fn test_directive_option() {
        assert_eq!(
            directive_option(":label: fig1"),
            Ok(("", Token::DirectiveOption("label", "fig1")))
        );
    }

    #[test]
    fn test_role() {
        assert_eq!(
            role("{numref}`Fig. %s <fig1>` after"),
            Ok((" after", Token::Role("numref", "Fig. %s <fig1>")))
        );
    }

    #[test]
    fn test_footnote_definition() {
        assert_eq!(
            footnote_definition("[^note]: Some text"),
            Ok(("", Token::FootnoteDefinition("note", "Some text")))
        );
    }

    #[test]
    fn test_extract_label() {
        assert_eq!(extract_label("Intro {#sec:intro}"), ("Intro", Some("sec:intro")));
        assert_eq!(extract_label("Plain"), ("Plain", None));
    }
}
