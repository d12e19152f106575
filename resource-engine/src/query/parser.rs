//! Filter text parser
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! expr    := and (("or" | "||") and)*
//! and     := not (("and" | "&&") not)*
//! not     := ("not" | "!") not | primary
//! primary := "(" expr ")"
//!          | field op value
//!          | field "has" value
//!          | field "in" "[" value ("," value)* "]"
//! op      := eq | = | ne | != | gt | > | ge | >= | lt | < | le | <=
//! ```
//!
//! Keywords are case-insensitive. Field names are resolved against the
//! resource schema while parsing and literals are typed by the field kind.
//! Negations and parentheses nest at most [`MAX_DEPTH`] levels deep.

use chrono::NaiveDate;
use uuid::Uuid;

use super::error::QueryError;
use super::filter::{CmpOp, Filter};
use crate::resource::{Field, FieldKind, Resource, Value};

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Bang,
    AndAnd,
    OrOr,
    Op(CmpOp),
    Word(String),
    Quoted(String),
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    position: usize,
}

const PUNCTUATION: &[char] = &['(', ')', '[', ']', ',', '"', '\'', '=', '!', '<', '>', '&', '|'];

fn tokenize(input: &str) -> Result<Vec<Token>, QueryError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(position, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let single = |kind| Token { kind, position };
        match c {
            '(' | ')' | '[' | ']' | ',' => {
                chars.next();
                tokens.push(single(match c {
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    '[' => TokenKind::LBracket,
                    ']' => TokenKind::RBracket,
                    _ => TokenKind::Comma,
                }));
            }
            '"' | '\'' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some((_, next)) = chars.next() {
                    match next {
                        '\\' => match chars.next() {
                            Some((_, 'n')) => text.push('\n'),
                            Some((_, 't')) => text.push('\t'),
                            Some((_, escaped)) => text.push(escaped),
                            None => break,
                        },
                        quote if quote == c => {
                            closed = true;
                            break;
                        }
                        other => text.push(other),
                    }
                }
                if !closed {
                    return Err(QueryError::syntax("Unterminated string", position));
                }
                tokens.push(single(TokenKind::Quoted(text)));
            }
            '=' | '!' | '<' | '>' => {
                chars.next();
                let followed_by_eq = chars.peek().is_some_and(|&(_, n)| n == '=');
                if followed_by_eq {
                    chars.next();
                }
                let kind = match (c, followed_by_eq) {
                    ('=', _) => TokenKind::Op(CmpOp::Eq),
                    ('!', true) => TokenKind::Op(CmpOp::Ne),
                    ('!', false) => TokenKind::Bang,
                    ('<', true) => TokenKind::Op(CmpOp::Le),
                    ('<', false) => TokenKind::Op(CmpOp::Lt),
                    ('>', true) => TokenKind::Op(CmpOp::Ge),
                    _ => TokenKind::Op(CmpOp::Gt),
                };
                tokens.push(single(kind));
            }
            '&' | '|' => {
                chars.next();
                if chars.peek().map(|&(_, n)| n) != Some(c) {
                    return Err(QueryError::syntax(
                        format!("Expected `{}{}`", c, c),
                        position,
                    ));
                }
                chars.next();
                tokens.push(single(if c == '&' {
                    TokenKind::AndAnd
                } else {
                    TokenKind::OrOr
                }));
            }
            _ => {
                let mut word = String::new();
                while let Some(&(_, n)) = chars.peek() {
                    if n.is_whitespace() || PUNCTUATION.contains(&n) {
                        break;
                    }
                    word.push(n);
                    chars.next();
                }
                tokens.push(single(TokenKind::Word(word)));
            }
        }
    }

    Ok(tokens)
}

/// Deepest nesting of `not` and parentheses accepted in filter text
pub const MAX_DEPTH: usize = 64;

struct Parser<'a, T: Resource> {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    end: usize,
    input: &'a str,
    _marker: std::marker::PhantomData<fn() -> T>,
}

/// Parse filter text against the schema of `T`
pub(crate) fn parse<T: Resource>(input: &str) -> Result<Filter<T>, QueryError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(QueryError::syntax("Empty filter", 0));
    }

    let mut parser = Parser::<T> {
        tokens,
        pos: 0,
        depth: 0,
        end: input.len(),
        input,
        _marker: std::marker::PhantomData,
    };
    let filter = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(QueryError::syntax(
            format!(
                "Unexpected characters after expression: '{}'",
                &parser.input[token.position..]
            ),
            token.position,
        ));
    }
    Ok(filter)
}

impl<T: Resource> Parser<'_, T> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn position(&self) -> usize {
        self.peek().map_or(self.end, |t| t.position)
    }

    fn at_keyword(&self, keyword: &str, symbol: &TokenKind) -> bool {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Word(word)) => word.eq_ignore_ascii_case(keyword),
            Some(kind) => kind == symbol,
            None => false,
        }
    }

    fn parse_or(&mut self) -> Result<Filter<T>, QueryError> {
        let mut left = self.parse_and()?;
        while self.at_keyword("or", &TokenKind::OrOr) {
            self.advance();
            let right = self.parse_and()?;
            left = Filter::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Filter<T>, QueryError> {
        let mut left = self.parse_not()?;
        while self.at_keyword("and", &TokenKind::AndAnd) {
            self.advance();
            let right = self.parse_not()?;
            left = Filter::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn nested<R>(
        &mut self,
        position: usize,
        parse: impl FnOnce(&mut Self) -> Result<R, QueryError>,
    ) -> Result<R, QueryError> {
        if self.depth >= MAX_DEPTH {
            return Err(QueryError::syntax(
                format!("Filter nests deeper than {} levels", MAX_DEPTH),
                position,
            ));
        }
        self.depth += 1;
        let parsed = parse(self);
        self.depth -= 1;
        parsed
    }

    fn parse_not(&mut self) -> Result<Filter<T>, QueryError> {
        if self.at_keyword("not", &TokenKind::Bang) {
            let position = self.position();
            self.advance();
            return self.nested(position, |p| Ok(p.parse_not()?.negate()));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Filter<T>, QueryError> {
        let position = self.position();
        match self.advance().map(|t| t.kind) {
            Some(TokenKind::LParen) => {
                let inner = self.nested(position, Self::parse_or)?;
                let closing = self.position();
                match self.advance().map(|t| t.kind) {
                    Some(TokenKind::RParen) => Ok(inner),
                    _ => Err(QueryError::syntax("Expected closing parenthesis", closing)),
                }
            }
            Some(TokenKind::Word(name)) => self.parse_comparison(&name),
            _ => Err(QueryError::syntax("Expected a field name", position)),
        }
    }

    fn parse_comparison(&mut self, name: &str) -> Result<Filter<T>, QueryError> {
        let field = T::schema()
            .field(name)
            .ok_or_else(|| QueryError::UnknownField {
                kind: T::KIND,
                field: name.to_string(),
            })?;

        let position = self.position();
        let operator = match self.advance().map(|t| t.kind) {
            Some(TokenKind::Op(op)) => Operator::Cmp(op),
            Some(TokenKind::Word(word)) => match word.to_ascii_lowercase().as_str() {
                "has" => Operator::Has,
                "in" => Operator::In,
                other => CmpOp::parse(other).map(Operator::Cmp).ok_or_else(|| {
                    QueryError::syntax(format!("Unknown operator: '{}'", word), position)
                })?,
            },
            _ => {
                return Err(QueryError::syntax(
                    format!("Expected an operator after `{}`", field.name),
                    position,
                ))
            }
        };

        match operator {
            Operator::Cmp(op) => {
                if field.kind.is_list() {
                    return Err(QueryError::syntax(
                        format!("`{}` is a collection, use `has`", field.name),
                        position,
                    ));
                }
                let value = self.parse_value(field, field.kind)?;
                if value.is_null() && !matches!(op, CmpOp::Eq | CmpOp::Ne) {
                    return Err(QueryError::InvalidValue {
                        field: field.name.to_string(),
                        value: "null".to_string(),
                        expected: format!("a non-null value for `{}`", op),
                    });
                }
                Ok(Filter::compare(field, op, value))
            }
            Operator::Has => {
                if !field.kind.is_list() {
                    return Err(QueryError::syntax(
                        format!("`has` requires a collection field, `{}` is not one", field.name),
                        position,
                    ));
                }
                let value = self.parse_value(field, field.kind.element())?;
                Ok(Filter::Has(field, value))
            }
            Operator::In => {
                if field.kind.is_list() {
                    return Err(QueryError::syntax(
                        format!("`{}` is a collection, use `has`", field.name),
                        position,
                    ));
                }
                Ok(Filter::In(field, self.parse_list(field)?))
            }
        }
    }

    fn parse_list(&mut self, field: Field<T>) -> Result<Vec<Value>, QueryError> {
        let position = self.position();
        if !matches!(self.advance().map(|t| t.kind), Some(TokenKind::LBracket)) {
            return Err(QueryError::syntax("Expected `[` after `in`", position));
        }

        let mut values = Vec::new();
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RBracket)) {
            self.advance();
            return Ok(values);
        }
        loop {
            values.push(self.parse_value(field, field.kind)?);
            let position = self.position();
            match self.advance().map(|t| t.kind) {
                Some(TokenKind::Comma) => continue,
                Some(TokenKind::RBracket) => return Ok(values),
                _ => return Err(QueryError::syntax("Expected `,` or `]`", position)),
            }
        }
    }

    fn parse_value(&mut self, field: Field<T>, kind: FieldKind) -> Result<Value, QueryError> {
        let position = self.position();
        match self.advance().map(|t| t.kind) {
            Some(TokenKind::Word(word)) if word.eq_ignore_ascii_case("null") => Ok(Value::Null),
            Some(TokenKind::Word(raw)) | Some(TokenKind::Quoted(raw)) => {
                typed_value(field.name, kind, &raw)
            }
            _ => Err(QueryError::syntax(
                format!("Expected a value for `{}`", field.name),
                position,
            )),
        }
    }
}

enum Operator {
    Cmp(CmpOp),
    Has,
    In,
}

/// Convert a literal into a value of the given kind
pub(crate) fn typed_value(field: &str, kind: FieldKind, raw: &str) -> Result<Value, QueryError> {
    let invalid = || QueryError::InvalidValue {
        field: field.to_string(),
        value: raw.to_string(),
        expected: kind.to_string(),
    };

    match kind {
        FieldKind::Int | FieldKind::IntList => {
            raw.parse::<i64>().map(Value::Int).map_err(|_| invalid())
        }
        FieldKind::Float => raw.parse::<f64>().map(Value::Float).map_err(|_| invalid()),
        FieldKind::Bool => match raw.to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(invalid()),
        },
        FieldKind::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Value::Date)
            .map_err(|_| invalid()),
        FieldKind::Uuid => Uuid::parse_str(raw).map(Value::Uuid).map_err(|_| invalid()),
        FieldKind::Enum(variants) => variants
            .iter()
            .find(|v| v.eq_ignore_ascii_case(raw))
            .map(|v| Value::Text((*v).to_string()))
            .ok_or_else(invalid),
        FieldKind::Text | FieldKind::TextList => Ok(Value::Text(raw.to_string())),
    }
}
