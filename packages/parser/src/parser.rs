use crate::ast::*;
use crate::error::{ParseError, ParseResult};
use crate::escape::unescape;
use crate::id_generator::IDGenerator;
use crate::tokenizer::{Content, Markup};
use logos::Logos;
use std::ops::Range;

/// Recursive-descent parser producing an [`ObjectModel`]
///
/// The parser alternates between two lexers: [`Content`] between tags and
/// [`Markup`] inside them. Every element records the byte offsets needed by
/// the lossless serializer and the patch planner.
pub struct Parser<'src, 'ids> {
    source: &'src str,
    pos: usize,
    ids: &'ids mut IDGenerator,
}

impl<'src, 'ids> Parser<'src, 'ids> {
    pub fn new(source: &'src str, ids: &'ids mut IDGenerator) -> Self {
        Self { source, pos: 0, ids }
    }

    /// Parse a complete document
    pub fn parse_document(&mut self) -> ParseResult<ObjectModel> {
        let mut root = None;

        while let Some((token, range)) = self.next_content()? {
            match token {
                Content::Comment | Content::ProcessingInstruction | Content::Declaration => {}
                Content::Text => {
                    if !self.source[range.clone()].trim().is_empty() {
                        return Err(ParseError::invalid_syntax(
                            range.start,
                            "Text outside of the root element",
                        ));
                    }
                }
                Content::StartTagOpen => {
                    if root.is_some() {
                        return Err(ParseError::invalid_syntax(
                            range.start,
                            "Document has more than one root element",
                        ));
                    }
                    root = Some(self.parse_element(range.start)?);
                }
                Content::EndTagOpen | Content::CData => {
                    return Err(ParseError::unexpected_token(
                        range.start,
                        "root element",
                        &self.source[range],
                    ));
                }
            }
        }

        root.map(ObjectModel::new)
            .ok_or_else(|| ParseError::unexpected_eof(self.source.len()))
    }

    /// Parse an element whose `<` sits at `start`
    fn parse_element(&mut self, start: usize) -> ParseResult<ModelNode> {
        let (name, name_range) = match self.next_markup()? {
            Some((Markup::Name, range)) => (self.source[range.clone()].to_string(), range),
            other => return Err(self.unexpected(other, "element name")),
        };

        let mut node = ModelNode::new(self.ids.next_id(), name);
        let mut attrs_end = name_range.end;

        // Attributes up to `>` or `/>`
        let open_end = loop {
            match self.next_markup()? {
                Some((Markup::Name, range)) => {
                    let attr = self.parse_attribute(range)?;
                    if node.attribute_entry(&attr.name).is_some() {
                        return Err(ParseError::DuplicateAttribute {
                            pos: attr.span.map(|s| s.start).unwrap_or(start),
                            name: attr.name,
                        });
                    }
                    attrs_end = attr.span.map(|s| s.end).unwrap_or(attrs_end);
                    node.attributes.push(attr);
                }
                Some((Markup::TagClose, range)) => break range.end,
                Some((Markup::EmptyTagClose, range)) => {
                    node.span = Some(NodeSpan {
                        start,
                        end: range.end,
                        name_end: name_range.end,
                        attrs_end,
                        open_end: range.end,
                        close_start: None,
                    });
                    return Ok(node);
                }
                other => return Err(self.unexpected(other, "attribute, '>' or '/>'")),
            }
        };

        let mut text = String::new();

        let (close_start, end) = loop {
            let Some((token, range)) = self.next_content()? else {
                return Err(ParseError::unexpected_eof(self.source.len()));
            };

            match token {
                Content::Text => {
                    let raw = &self.source[range.clone()];
                    let value = unescape(raw).map_err(|offset| {
                        ParseError::invalid_syntax(range.start + offset, "Unknown entity reference")
                    })?;
                    text.push_str(&value);
                }
                Content::CData => {
                    let raw = &self.source[range.clone()];
                    text.push_str(&raw["<![CDATA[".len()..raw.len() - "]]>".len()]);
                }
                Content::Comment | Content::ProcessingInstruction => {}
                Content::Declaration => {
                    return Err(ParseError::invalid_syntax(
                        range.start,
                        "Declarations are only allowed outside the root element",
                    ));
                }
                Content::StartTagOpen => {
                    let child = self.parse_element(range.start)?;
                    node.children.push(child);
                }
                Content::EndTagOpen => {
                    let close_start = range.start;
                    match self.next_markup()? {
                        Some((Markup::Name, name)) => {
                            let found = &self.source[name.clone()];
                            if found != node.name {
                                return Err(ParseError::MismatchedTag {
                                    pos: close_start,
                                    expected: node.name.clone(),
                                    found: found.to_string(),
                                });
                            }
                        }
                        other => return Err(self.unexpected(other, "end tag name")),
                    }
                    match self.next_markup()? {
                        Some((Markup::TagClose, range)) => break (close_start, range.end),
                        other => return Err(self.unexpected(other, "'>'")),
                    }
                }
            }
        };

        if node.children.is_empty() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                node.text = Some(trimmed.to_string());
            }
        }

        node.span = Some(NodeSpan {
            start,
            end,
            name_end: name_range.end,
            attrs_end,
            open_end,
            close_start: Some(close_start),
        });

        Ok(node)
    }

    fn parse_attribute(&mut self, name_range: Range<usize>) -> ParseResult<Attribute> {
        let name = self.source[name_range.clone()].to_string();

        match self.next_markup()? {
            Some((Markup::Equals, _)) => {}
            other => return Err(self.unexpected(other, "'='")),
        }

        let value_range = match self.next_markup()? {
            Some((Markup::Quoted, range)) => range,
            other => return Err(self.unexpected(other, "quoted attribute value")),
        };

        let quoted = &self.source[value_range.clone()];
        let quote = quoted.chars().next().unwrap_or('"');
        let raw = &quoted[1..quoted.len() - 1];
        let value = unescape(raw).map_err(|offset| {
            ParseError::invalid_syntax(value_range.start + 1 + offset, "Unknown entity reference")
        })?;

        Ok(Attribute {
            name,
            value: value.into_owned(),
            span: Some(AttrSpan {
                start: name_range.start,
                end: value_range.end,
                value_start: value_range.start + 1,
                value_end: value_range.end - 1,
                quote,
            }),
        })
    }

    fn next_content(&mut self) -> ParseResult<Option<(Content, Range<usize>)>> {
        let mut lexer = Content::lexer(&self.source[self.pos..]);
        match lexer.next() {
            None => Ok(None),
            Some(Ok(token)) => {
                let span = lexer.span();
                let range = self.pos + span.start..self.pos + span.end;
                self.pos = range.end;
                Ok(Some((token, range)))
            }
            Some(Err(())) => Err(ParseError::lexer_error(self.pos + lexer.span().start)),
        }
    }

    fn next_markup(&mut self) -> ParseResult<Option<(Markup, Range<usize>)>> {
        let mut lexer = Markup::lexer(&self.source[self.pos..]);
        match lexer.next() {
            None => Ok(None),
            Some(Ok(token)) => {
                let span = lexer.span();
                let range = self.pos + span.start..self.pos + span.end;
                self.pos = range.end;
                Ok(Some((token, range)))
            }
            Some(Err(())) => Err(ParseError::lexer_error(self.pos + lexer.span().start)),
        }
    }

    fn unexpected(&self, found: Option<(Markup, Range<usize>)>, expected: &str) -> ParseError {
        match found {
            Some((_, range)) => {
                ParseError::unexpected_token(range.start, expected, &self.source[range])
            }
            None => ParseError::unexpected_eof(self.source.len()),
        }
    }
}

/// Parse `source` with ids seeded from an anonymous document
pub fn parse(source: &str) -> ParseResult<ObjectModel> {
    let mut ids = IDGenerator::new("memory:");
    Parser::new(source, &mut ids).parse_document()
}

/// Parse `source` with ids seeded from `path`
pub fn parse_with_path(source: &str, path: &str) -> ParseResult<ObjectModel> {
    let mut ids = IDGenerator::new(path);
    Parser::new(source, &mut ids).parse_document()
}

/// Parse `source` drawing ids from an existing generator
pub fn parse_with_ids(source: &str, ids: &mut IDGenerator) -> ParseResult<ObjectModel> {
    Parser::new(source, ids).parse_document()
}
