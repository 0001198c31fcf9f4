//! Parsing of the embedded component script section.
//!
//! A page declares its components in one block such as
//!
//! ```html
//! <script lang="react">
//! import Counter from './Counter.tsx'
//! import { Chart as MyChart, Legend } from './charts'
//! </script>
//! ```
//!
//! Only ES import declarations are accepted. Type-only and side-effect
//! imports bind nothing and are skipped.

use crate::container::{ImportBinding, ImportedSymbol};
use thiserror::Error;

/// One local binding declared in the script section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDecl {
    /// Page-local name.
    pub local: String,
    /// What it is bound to (module specifier unresolved).
    pub binding: ImportBinding,
    /// Byte offset of the declaring statement inside the script body.
    pub offset: usize,
}

/// Malformed script section.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (at byte {offset})")]
pub struct ScriptParseError {
    /// What went wrong.
    pub message: String,
    /// Byte offset inside the script body.
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    Punct(char),
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    offset: usize,
}

fn tokenize(body: &str) -> Result<Vec<Spanned>, ScriptParseError> {
    let bytes = body.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_whitespace() {
            i += 1;
        } else if body[i..].starts_with("//") {
            i = body[i..].find('\n').map_or(bytes.len(), |n| i + n + 1);
        } else if body[i..].starts_with("/*") {
            let close = body[i + 2..].find("*/").ok_or_else(|| ScriptParseError {
                message: "unterminated block comment".to_string(),
                offset: i,
            })?;
            i += close + 4;
        } else if matches!(b, b'"' | b'\'' | b'`') {
            let close = body[i + 1..]
                .find(b as char)
                .ok_or_else(|| ScriptParseError {
                    message: "unterminated string literal".to_string(),
                    offset: i,
                })?;
            tokens.push(Spanned {
                token: Token::Str(body[i + 1..i + 1 + close].to_string()),
                offset: i,
            });
            i += close + 2;
        } else if b.is_ascii_alphabetic() || b == b'_' || b == b'$' {
            let start = i;
            while i < bytes.len()
                && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'$')
            {
                i += 1;
            }
            tokens.push(Spanned {
                token: Token::Ident(body[start..i].to_string()),
                offset: start,
            });
        } else {
            let c = body[i..].chars().next().unwrap_or('?');
            tokens.push(Spanned {
                token: Token::Punct(c),
                offset: i,
            });
            i += c.len_utf8();
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |s| s.offset)
    }

    fn error(&self, message: impl Into<String>) -> ScriptParseError {
        ScriptParseError {
            message: message.into(),
            offset: self.offset(),
        }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        self.pos += 1;
        token
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.peek() == Some(&Token::Punct(c)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(word)) if word == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ScriptParseError> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            _ => {
                self.pos -= 1;
                Err(self.error(format!("expected {}", what)))
            }
        }
    }

    fn expect_string(&mut self) -> Result<String, ScriptParseError> {
        match self.next() {
            Some(Token::Str(value)) => Ok(value),
            _ => {
                self.pos -= 1;
                Err(self.error("expected module specifier string"))
            }
        }
    }

    /// `type` used as a modifier: followed by a name, `{` or `*`, but not `as`.
    fn at_type_modifier(&self) -> bool {
        let is_type = matches!(self.peek(), Some(Token::Ident(word)) if word == "type");
        let next = self.tokens.get(self.pos + 1).map(|s| &s.token);
        is_type
            && match next {
                Some(Token::Ident(word)) => word != "as" && word != "from",
                Some(Token::Punct('{')) | Some(Token::Punct('*')) => true,
                _ => false,
            }
    }

    fn parse_namespace(&mut self) -> Result<String, ScriptParseError> {
        if !self.eat_keyword("as") {
            return Err(self.error("expected 'as' after '*'"));
        }
        self.expect_ident("namespace name")
    }

    fn parse_statement(&mut self) -> Result<Vec<(String, ImportBinding)>, ScriptParseError> {
        if !self.eat_keyword("import") {
            return Err(self.error("only import declarations are allowed in the component script"));
        }
        if let Some(Token::Str(module)) = self.peek() {
            log::debug!("Skipping side-effect import of '{}'", module);
            self.pos += 1;
            self.eat_punct(';');
            return Ok(Vec::new());
        }
        let type_only = self.at_type_modifier();
        if type_only {
            self.pos += 1;
        }

        let mut specifiers = Vec::new();
        if self.eat_punct('*') {
            specifiers.push((self.parse_namespace()?, ImportedSymbol::Namespace));
            return self.finish_statement(specifiers, type_only);
        }

        if matches!(self.peek(), Some(Token::Ident(word)) if word != "from") {
            let local = self.expect_ident("default import name")?;
            specifiers.push((local, ImportedSymbol::Default));
            if !self.eat_punct(',') {
                return self.finish_statement(specifiers, type_only);
            }
            if self.eat_punct('*') {
                specifiers.push((self.parse_namespace()?, ImportedSymbol::Namespace));
                return self.finish_statement(specifiers, type_only);
            }
        }

        if !self.eat_punct('{') {
            return Err(self.error("expected import specifiers"));
        }
        while !self.eat_punct('}') {
            let inline_type = self.at_type_modifier();
            if inline_type {
                self.pos += 1;
            }
            let imported = match self.next() {
                Some(Token::Ident(name)) | Some(Token::Str(name)) => name,
                _ => {
                    self.pos -= 1;
                    return Err(self.error("expected import specifier"));
                }
            };
            let local = if self.eat_keyword("as") {
                self.expect_ident("local name")?
            } else {
                imported.clone()
            };
            if !inline_type {
                let symbol = if imported == "default" {
                    ImportedSymbol::Default
                } else {
                    ImportedSymbol::Named(imported)
                };
                specifiers.push((local, symbol));
            }
            if !self.eat_punct(',') && self.peek() != Some(&Token::Punct('}')) {
                return Err(self.error("expected ',' or '}'"));
            }
        }
        self.finish_statement(specifiers, type_only)
    }

    fn finish_statement(
        &mut self,
        specifiers: Vec<(String, ImportedSymbol)>,
        type_only: bool,
    ) -> Result<Vec<(String, ImportBinding)>, ScriptParseError> {
        if !self.eat_keyword("from") {
            return Err(self.error("expected 'from'"));
        }
        let module = self.expect_string()?;
        self.eat_punct(';');
        if type_only {
            return Ok(Vec::new());
        }
        Ok(specifiers
            .into_iter()
            .map(|(local, imported)| {
                let binding = ImportBinding {
                    module: module.clone(),
                    imported,
                };
                (local, binding)
            })
            .collect())
    }
}

/// Parses every import declaration in a script body.
///
/// Any statement that is not an import declaration makes the whole section
/// invalid.
pub fn parse_imports(body: &str) -> Result<Vec<ImportDecl>, ScriptParseError> {
    let tokens = tokenize(body)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: body.len(),
    };
    let mut decls = Vec::new();

    while parser.peek().is_some() {
        if parser.eat_punct(';') {
            continue;
        }
        let offset = parser.offset();
        for (local, binding) in parser.parse_statement()? {
            decls.push(ImportDecl {
                local,
                binding,
                offset,
            });
        }
    }

    Ok(decls)
}
