use logos::{Lexer, Logos};

/// Tokens found between tags
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Content {
    #[token("<!--", |lex| skip_past(lex, "-->"))]
    Comment,

    #[token("<?", |lex| skip_past(lex, "?>"))]
    ProcessingInstruction,

    #[token("<![CDATA[", |lex| skip_past(lex, "]]>"))]
    CData,

    /// `<!DOCTYPE ...>` and friends, internal subset included
    #[token("<!", declaration)]
    Declaration,

    #[token("</")]
    EndTagOpen,

    #[token("<")]
    StartTagOpen,

    #[regex(r"[^<]+")]
    Text,
}

/// Tokens inside a start or end tag
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Markup {
    #[regex(r"[A-Za-z_:][A-Za-z0-9_:.\-]*")]
    Name,

    #[token("=")]
    Equals,

    #[regex(r#""[^"]*""#)]
    #[regex(r"'[^']*'")]
    Quoted,

    #[token(">")]
    TagClose,

    #[token("/>")]
    EmptyTagClose,
}

fn skip_past(lex: &mut Lexer<Content>, terminator: &str) -> bool {
    match lex.remainder().find(terminator) {
        Some(idx) => {
            lex.bump(idx + terminator.len());
            true
        }
        None => false,
    }
}

fn declaration(lex: &mut Lexer<Content>) -> bool {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for (idx, ch) in lex.remainder().char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(ch),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, '>') if depth == 0 => {
                lex.bump(idx + 1);
                return true;
            }
            _ => {}
        }
    }
    false
}

/// Content tokens of `source` with their byte ranges
///
/// Lexing stops at the first error.
pub fn tokenize(source: &str) -> Vec<(Content, std::ops::Range<usize>)> {
    let mut lexer = Content::lexer(source);
    let mut tokens = Vec::new();
    while let Some(Ok(token)) = lexer.next() {
        tokens.push((token, lexer.span()));
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_tokens() {
        let source = "<?xml version=\"1.0\"?><!-- c --><a>x</a>";
        let kinds: Vec<Content> = tokenize(source).into_iter().map(|(t, _)| t).collect();
        assert_eq!(
            kinds,
            vec![
                Content::ProcessingInstruction,
                Content::Comment,
                Content::StartTagOpen,
                Content::Text,
                Content::EndTagOpen,
                Content::Text,
            ]
        );
    }

    #[test]
    fn test_doctype_with_internal_subset() {
        let source = "<!DOCTYPE a [<!ENTITY e \"x>\">]><a/>";
        let tokens = tokenize(source);
        assert_eq!(tokens[0].0, Content::Declaration);
        assert_eq!(&source[tokens[0].1.clone()], "<!DOCTYPE a [<!ENTITY e \"x>\">]>");
    }

    #[test]
    fn test_markup_tokens() {
        let mut lex = Markup::lexer("dep x = 'a' y=\"b\"/>");
        let mut kinds = Vec::new();
        while let Some(Ok(t)) = lex.next() {
            kinds.push(t);
        }
        assert_eq!(
            kinds,
            vec![
                Markup::Name,
                Markup::Name,
                Markup::Equals,
                Markup::Quoted,
                Markup::Name,
                Markup::Equals,
                Markup::Quoted,
                Markup::EmptyTagClose,
            ]
        );
    }

    #[test]
    fn test_unterminated_comment_is_an_error() {
        let mut lex = Content::lexer("<!-- never closed");
        assert_eq!(lex.next(), Some(Err(())));
    }
}
