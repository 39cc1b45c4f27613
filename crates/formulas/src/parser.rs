//! Formula lexer and recursive-descent parser.
//!
//! Parsing and reference resolution happen in one pass: every reference token
//! is resolved through the [`ReferenceResolver`] as soon as it is read, so the
//! resulting tree never carries raw address text.

use serde::{Deserialize, Serialize};
use sheetlogic_primitives::{
    parse_a1, sanitize_sheet_name, Coordinate, ErrorKind, EvaluatedValue, Range, RefTarget,
    MAX_COLUMN_COUNT, MAX_ROW_COUNT,
};

use crate::ast::{BinaryOperator, FormulaAst, Reference, UnaryOperator};
use crate::functions::{FunctionKind, FunctionRegistry};
use crate::refs::ReferenceResolver;
use crate::FormulaError;

/// Everything the parser needs besides the formula text.
#[derive(Clone, Copy)]
pub struct ParseContext<'a> {
    /// Sheet that unqualified references resolve against.
    pub sheet: &'a str,
    pub resolver: &'a ReferenceResolver,
    pub functions: &'a FunctionRegistry,
}

/// Why a construct cannot be compiled statically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnsupportedReason {
    /// The reference target is computed at runtime.
    DynamicReference,
    /// The function is not in the registry.
    UnknownFunction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsupportedConstruct {
    /// Character offset of the function name in the formula text.
    pub position: usize,
    pub function: String,
    pub reason: UnsupportedReason,
}

/// A successfully parsed formula plus the constructs flagged on the way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedFormula {
    pub ast: FormulaAst,
    pub unsupported: Vec<UnsupportedConstruct>,
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number { value: f64, text: String },
    String(String),
    Identifier(String),
    SheetName(String),
    Error(ErrorKind),
    CellRef(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Ampersand,
    Percent,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Colon,
    Bang,
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    pos: usize,
}

const ERROR_LITERALS: [&str; 7] = ["#DIV/0!", "#VALUE!", "#N/A", "#REF!", "#NAME?", "#NUM!", "#NULL!"];

fn parse_error(position: usize, message: impl Into<String>) -> FormulaError {
    FormulaError::Parse {
        position,
        message: message.into(),
    }
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn new(chars: Vec<char>, start: usize) -> Self {
        Self { chars, pos: start }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, FormulaError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = matches!(token.kind, TokenKind::Eof);
            tokens.push(token);
            if is_eof {
                return Ok(tokens);
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, FormulaError> {
        self.skip_whitespace();
        let start = self.pos;
        let Some(ch) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                pos: start,
            });
        };

        let kind = match ch {
            '(' => self.simple(TokenKind::LParen),
            ')' => self.simple(TokenKind::RParen),
            '{' => self.simple(TokenKind::LBrace),
            '}' => self.simple(TokenKind::RBrace),
            ',' => self.simple(TokenKind::Comma),
            ';' => self.simple(TokenKind::Semicolon),
            '+' => self.simple(TokenKind::Plus),
            '-' => self.simple(TokenKind::Minus),
            '*' => self.simple(TokenKind::Star),
            '/' => self.simple(TokenKind::Slash),
            '^' => self.simple(TokenKind::Caret),
            '&' => self.simple(TokenKind::Ampersand),
            '%' => self.simple(TokenKind::Percent),
            ':' => self.simple(TokenKind::Colon),
            '!' => self.simple(TokenKind::Bang),
            '=' => self.simple(TokenKind::Equal),
            '<' => {
                self.advance();
                if self.consume('=') {
                    TokenKind::LessEqual
                } else if self.consume('>') {
                    TokenKind::NotEqual
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                self.advance();
                if self.consume('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            '"' => self.quoted('"', "unterminated string literal").map(TokenKind::String)?,
            '\'' => self.quoted('\'', "unterminated sheet name").map(TokenKind::SheetName)?,
            '#' => self.error_token()?,
            '.' | '0'..='9' => self.number_token()?,
            '$' | '_' | '\\' => self.identifier_or_cell_token(),
            c if c.is_alphabetic() => self.identifier_or_cell_token(),
            _ => return Err(parse_error(start, format!("unexpected character '{ch}'"))),
        };

        Ok(Token { kind, pos: start })
    }

    fn simple(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    /// A quoted run where the quote character is escaped by doubling.
    fn quoted(&mut self, quote: char, unterminated: &str) -> Result<String, FormulaError> {
        let start = self.pos;
        self.advance();
        let mut result = String::new();
        while let Some(ch) = self.peek() {
            self.advance();
            if ch == quote {
                if self.consume(quote) {
                    result.push(quote);
                    continue;
                }
                return Ok(result);
            }
            result.push(ch);
        }
        Err(parse_error(start, unterminated))
    }

    fn error_token(&mut self) -> Result<TokenKind, FormulaError> {
        let start = self.pos;
        let rest: String = self.chars[start..].iter().take(8).collect::<String>().to_ascii_uppercase();
        for literal in ERROR_LITERALS {
            if rest.starts_with(literal) {
                self.pos += literal.chars().count();
                let kind = ErrorKind::from_label(literal)
                    .ok_or_else(|| parse_error(start, format!("unknown error literal '{literal}'")))?;
                return Ok(TokenKind::Error(kind));
            }
        }
        Err(parse_error(start, "unknown error literal"))
    }

    fn number_token(&mut self) -> Result<TokenKind, FormulaError> {
        let start = self.pos;
        let mut seen_dot = false;
        let mut seen_exp = false;

        while let Some(ch) = self.peek() {
            match ch {
                '0'..='9' => self.advance(),
                '.' if !seen_dot && !seen_exp => {
                    seen_dot = true;
                    self.advance();
                }
                'e' | 'E' if !seen_exp && self.exponent_follows() => {
                    seen_exp = true;
                    self.advance();
                    if !self.consume('+') {
                        self.consume('-');
                    }
                }
                _ => break,
            }
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        let value: f64 = text
            .parse()
            .map_err(|_| parse_error(start, format!("invalid number literal '{text}'")))?;
        Ok(TokenKind::Number { value, text })
    }

    fn exponent_follows(&self) -> bool {
        match self.chars.get(self.pos + 1) {
            Some('+' | '-') => self.chars.get(self.pos + 2).is_some_and(char::is_ascii_digit),
            Some(c) => c.is_ascii_digit(),
            None => false,
        }
    }

    fn identifier_or_cell_token(&mut self) -> TokenKind {
        let start = self.pos;
        self.consume('$');
        let letters = self.take_while(|c| c.is_ascii_alphabetic());
        self.consume('$');
        let digits = self.take_while(|c| c.is_ascii_digit());
        if letters > 0 && digits > 0 && self.cell_boundary() {
            let text: String = self.chars[start..self.pos].iter().collect();
            if parse_a1(&text).is_ok() {
                return TokenKind::CellRef(text);
            }
        }

        self.pos = start;
        self.take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '$' | '\\'));
        TokenKind::Identifier(self.chars[start..self.pos].iter().collect())
    }

    // A cell token must not run into more name characters, a call, or a
    // sheet separator.
    fn cell_boundary(&self) -> bool {
        match self.peek() {
            None => true,
            Some(c) => !(c.is_alphanumeric() || matches!(c, '_' | '.' | '(' | '!' | '$' | '\\')),
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> usize {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.advance();
        }
        self.pos - start
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn consume(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    idx: usize,
    ctx: ParseContext<'a>,
    unsupported: Vec<UnsupportedConstruct>,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Token>, ctx: ParseContext<'a>) -> Self {
        Self {
            tokens,
            idx: 0,
            ctx,
            unsupported: Vec::new(),
        }
    }

    fn parse_expression(&mut self) -> Result<FormulaAst, FormulaError> {
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<FormulaAst, FormulaError> {
        let mut expr = self.parse_concat()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Equal => BinaryOperator::Equal,
                TokenKind::NotEqual => BinaryOperator::NotEqual,
                TokenKind::Less => BinaryOperator::LessThan,
                TokenKind::LessEqual => BinaryOperator::LessThanOrEqual,
                TokenKind::Greater => BinaryOperator::GreaterThan,
                TokenKind::GreaterEqual => BinaryOperator::GreaterThanOrEqual,
                _ => break,
            };
            self.advance();
            let right = self.parse_concat()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_concat(&mut self) -> Result<FormulaAst, FormulaError> {
        let mut expr = self.parse_add_sub()?;
        while matches!(self.peek_kind(), TokenKind::Ampersand) {
            self.advance();
            let right = self.parse_add_sub()?;
            expr = binary(BinaryOperator::Concat, expr, right);
        }
        Ok(expr)
    }

    fn parse_add_sub(&mut self) -> Result<FormulaAst, FormulaError> {
        let mut expr = self.parse_mul_div()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Subtract,
                _ => break,
            };
            self.advance();
            let right = self.parse_mul_div()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_mul_div(&mut self) -> Result<FormulaAst, FormulaError> {
        let mut expr = self.parse_power()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOperator::Multiply,
                TokenKind::Slash => BinaryOperator::Divide,
                _ => break,
            };
            self.advance();
            let right = self.parse_power()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    /// `^` is right-associative and binds looser than unary signs.
    fn parse_power(&mut self) -> Result<FormulaAst, FormulaError> {
        let base = self.parse_unary()?;
        if matches!(self.peek_kind(), TokenKind::Caret) {
            self.advance();
            let exponent = self.parse_power()?;
            return Ok(binary(BinaryOperator::Power, base, exponent));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<FormulaAst, FormulaError> {
        let op = match self.peek_kind() {
            TokenKind::Plus => UnaryOperator::Plus,
            TokenKind::Minus => UnaryOperator::Negate,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(FormulaAst::UnaryOp {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_postfix(&mut self) -> Result<FormulaAst, FormulaError> {
        let mut expr = self.parse_primary()?;
        while matches!(self.peek_kind(), TokenKind::Percent) {
            self.advance();
            expr = FormulaAst::UnaryOp {
                op: UnaryOperator::Percent,
                operand: Box::new(expr),
            };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<FormulaAst, FormulaError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number { value, ref text } => {
                if matches!(self.peek_kind(), TokenKind::Colon) {
                    let text = text.clone();
                    return self.parse_reference(None, text, token.pos);
                }
                Ok(FormulaAst::Literal(EvaluatedValue::Number(value)))
            }
            TokenKind::String(value) => Ok(FormulaAst::Literal(EvaluatedValue::Text(value))),
            TokenKind::Error(kind) => Ok(FormulaAst::Literal(EvaluatedValue::Error(kind))),
            TokenKind::CellRef(text) => self.parse_reference(None, text, token.pos),
            TokenKind::SheetName(sheet) => self.parse_qualified(sheet, token.pos),
            TokenKind::Identifier(name) => self.parse_identifier(name, token.pos),
            TokenKind::LBrace => self.parse_array(token.pos),
            TokenKind::LParen => {
                let expr = self.parse_expression()?;
                self.expect_close_paren()?;
                Ok(expr)
            }
            TokenKind::Eof => Err(parse_error(token.pos, "unexpected end of formula")),
            other => Err(parse_error(token.pos, format!("unexpected token {other:?}"))),
        }
    }

    fn parse_identifier(&mut self, name: String, pos: usize) -> Result<FormulaAst, FormulaError> {
        match self.peek_kind() {
            TokenKind::Bang => return self.parse_qualified(name, pos),
            TokenKind::LParen => {
                self.advance();
                let args = self.parse_arguments()?;
                return self.build_call(name, args, pos);
            }
            _ => {}
        }
        if !matches!(self.peek_kind(), TokenKind::Colon) {
            if name.eq_ignore_ascii_case("TRUE") {
                return Ok(FormulaAst::Literal(EvaluatedValue::Boolean(true)));
            }
            if name.eq_ignore_ascii_case("FALSE") {
                return Ok(FormulaAst::Literal(EvaluatedValue::Boolean(false)));
            }
        }
        self.parse_reference(None, name, pos)
    }

    fn parse_qualified(&mut self, sheet: String, pos: usize) -> Result<FormulaAst, FormulaError> {
        if !matches!(self.peek_kind(), TokenKind::Bang) {
            return Err(parse_error(pos, format!("sheet name '{sheet}' missing '!'")));
        }
        self.advance();
        let token = self.advance();
        let text = match token.kind {
            TokenKind::CellRef(text) | TokenKind::Identifier(text) => text,
            TokenKind::Number { text, .. } => text,
            other => {
                return Err(parse_error(
                    token.pos,
                    format!("expected reference after '{sheet}!', got {other:?}"),
                ))
            }
        };
        self.parse_reference(Some(sheet), text, pos)
    }

    /// Read an optional `:end` part and resolve the whole token.
    fn parse_reference(
        &mut self,
        sheet: Option<String>,
        mut text: String,
        pos: usize,
    ) -> Result<FormulaAst, FormulaError> {
        if matches!(self.peek_kind(), TokenKind::Colon) {
            self.advance();
            let token = self.advance();
            match token.kind {
                TokenKind::CellRef(end) | TokenKind::Identifier(end) | TokenKind::Number { text: end, .. } => {
                    text.push(':');
                    text.push_str(&end);
                }
                other => {
                    return Err(parse_error(
                        token.pos,
                        format!("expected reference after ':', got {other:?}"),
                    ))
                }
            }
        }

        let token = match sheet {
            Some(sheet) => format!("{}!{}", sanitize_sheet_name(&sheet), text),
            None => text,
        };
        let resolved = self
            .ctx
            .resolver
            .resolve(&token, self.ctx.sheet)
            .map_err(|_| FormulaError::UnknownReference {
                position: pos,
                reference: token.clone(),
            })?;
        Ok(FormulaAst::Reference(Reference {
            target: resolved.target,
            name: resolved.name,
        }))
    }

    /// Arguments after `(`. Omitted arguments become `Literal(Empty)`.
    fn parse_arguments(&mut self) -> Result<Vec<FormulaAst>, FormulaError> {
        let mut args = Vec::new();
        if matches!(self.peek_kind(), TokenKind::RParen) {
            self.advance();
            return Ok(args);
        }
        loop {
            if matches!(
                self.peek_kind(),
                TokenKind::Comma | TokenKind::Semicolon | TokenKind::RParen
            ) {
                args.push(FormulaAst::Literal(EvaluatedValue::Empty));
            } else {
                args.push(self.parse_expression()?);
            }
            let token = self.advance();
            match token.kind {
                TokenKind::Comma | TokenKind::Semicolon => continue,
                TokenKind::RParen => break,
                _ => return Err(parse_error(token.pos, "expected ',' or ')' in argument list")),
            }
        }
        Ok(args)
    }

    fn build_call(&mut self, name: String, args: Vec<FormulaAst>, pos: usize) -> Result<FormulaAst, FormulaError> {
        let name = name.to_ascii_uppercase();
        let Some(def) = self.ctx.functions.get(&name) else {
            self.unsupported.push(UnsupportedConstruct {
                position: pos,
                function: name.clone(),
                reason: UnsupportedReason::UnknownFunction,
            });
            return Ok(FormulaAst::FunctionCall { name, args });
        };

        let has_empty = args
            .iter()
            .any(|arg| matches!(arg, FormulaAst::Literal(EvaluatedValue::Empty)));
        def.check_arity(args.len(), has_empty)
            .map_err(|expected| FormulaError::Arity {
                position: pos,
                function: name.clone(),
                expected,
                got: args.len(),
            })?;

        if !matches!(def.kind, FunctionKind::Dynamic) {
            return Ok(FormulaAst::FunctionCall { name, args });
        }
        if name == "OFFSET" {
            if let Some(folded) = fold_offset(&args) {
                return Ok(folded);
            }
        }
        self.unsupported.push(UnsupportedConstruct {
            position: pos,
            function: name.clone(),
            reason: UnsupportedReason::DynamicReference,
        });
        Ok(FormulaAst::DynamicReference {
            function: name,
            args,
        })
    }

    fn parse_array(&mut self, pos: usize) -> Result<FormulaAst, FormulaError> {
        let mut rows: Vec<Vec<EvaluatedValue>> = vec![Vec::new()];
        loop {
            let value = self.parse_array_constant()?;
            if let Some(row) = rows.last_mut() {
                row.push(value);
            }
            let token = self.advance();
            match token.kind {
                TokenKind::Comma => continue,
                TokenKind::Semicolon => rows.push(Vec::new()),
                TokenKind::RBrace => break,
                _ => return Err(parse_error(token.pos, "expected ',', ';' or '}' in array")),
            }
        }
        let width = rows[0].len();
        if rows.iter().any(|row| row.len() != width) {
            return Err(parse_error(pos, "array rows differ in length"));
        }
        Ok(FormulaAst::ArrayLiteral(rows))
    }

    fn parse_array_constant(&mut self) -> Result<EvaluatedValue, FormulaError> {
        let token = self.advance();
        let value = match token.kind {
            TokenKind::Minus | TokenKind::Plus => {
                let negate = matches!(token.kind, TokenKind::Minus);
                let next = self.advance();
                match next.kind {
                    TokenKind::Number { value, .. } => {
                        EvaluatedValue::Number(if negate { -value } else { value })
                    }
                    _ => return Err(parse_error(next.pos, "expected number in array")),
                }
            }
            TokenKind::Number { value, .. } => EvaluatedValue::Number(value),
            TokenKind::String(s) => EvaluatedValue::Text(s),
            TokenKind::Error(kind) => EvaluatedValue::Error(kind),
            TokenKind::Identifier(name) if name.eq_ignore_ascii_case("TRUE") => EvaluatedValue::Boolean(true),
            TokenKind::Identifier(name) if name.eq_ignore_ascii_case("FALSE") => EvaluatedValue::Boolean(false),
            _ => return Err(parse_error(token.pos, "array elements must be constants")),
        };
        Ok(value)
    }

    fn expect_close_paren(&mut self) -> Result<(), FormulaError> {
        let token = self.advance();
        if matches!(token.kind, TokenKind::RParen) {
            Ok(())
        } else {
            Err(parse_error(token.pos, format!("expected ')', got {:?}", token.kind)))
        }
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.tokens[self.idx].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.idx].clone();
        if !matches!(token.kind, TokenKind::Eof) {
            self.idx += 1;
        }
        token
    }
}

fn binary(op: BinaryOperator, left: FormulaAst, right: FormulaAst) -> FormulaAst {
    FormulaAst::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn literal_number(node: &FormulaAst) -> Option<f64> {
    match node {
        FormulaAst::Literal(EvaluatedValue::Number(n)) => Some(*n),
        FormulaAst::UnaryOp {
            op: UnaryOperator::Negate,
            operand,
        } => literal_number(operand).map(|n| -n),
        FormulaAst::UnaryOp {
            op: UnaryOperator::Plus,
            operand,
        } => literal_number(operand),
        _ => None,
    }
}

/// Resolve `OFFSET(ref, rows, cols[, height, width])` when every offset
/// argument is a numeric literal. Out-of-sheet results fold to `#REF!`.
fn fold_offset(args: &[FormulaAst]) -> Option<FormulaAst> {
    let FormulaAst::Reference(base) = args.first()? else {
        return None;
    };
    let numbers = args[1..]
        .iter()
        .map(literal_number)
        .collect::<Option<Vec<f64>>>()?;

    let (origin, rows, columns) = match &base.target {
        RefTarget::Cell(coord) => (coord, 1.0, 1.0),
        RefTarget::Range(range) => (range.start(), f64::from(range.rows()), f64::from(range.columns())),
    };
    let height = numbers.get(2).copied().unwrap_or(rows).trunc();
    let width = numbers.get(3).copied().unwrap_or(columns).trunc();
    let top = f64::from(origin.row) + numbers[0].trunc();
    let left = f64::from(origin.column) + numbers[1].trunc();
    let bottom = top + height - 1.0;
    let right = left + width - 1.0;

    let reference_error = FormulaAst::Literal(EvaluatedValue::Error(ErrorKind::Reference));
    if height < 1.0
        || width < 1.0
        || top < 1.0
        || left < 1.0
        || bottom > f64::from(MAX_ROW_COUNT)
        || right > f64::from(MAX_COLUMN_COUNT)
    {
        return Some(reference_error);
    }

    let sheet = origin.sheet.clone();
    let start = Coordinate::new(sheet.clone(), left as u32, top as u32);
    let target = if height == 1.0 && width == 1.0 {
        RefTarget::Cell(start)
    } else {
        let end = Coordinate::new(sheet, right as u32, bottom as u32);
        RefTarget::Range(Range::new(start, end).ok()?)
    };
    Some(FormulaAst::Reference(Reference::new(target)))
}

/// Parse a formula (which must start with `=`) into a tree, resolving every
/// reference against `ctx`.
///
/// Error positions are character offsets into `formula`.
pub fn parse_formula(formula: &str, ctx: &ParseContext<'_>) -> Result<ParsedFormula, FormulaError> {
    let chars: Vec<char> = formula.chars().collect();
    let start = chars.iter().take_while(|c| c.is_whitespace()).count();
    if chars.get(start) != Some(&'=') {
        return Err(parse_error(start, "formula must start with '='"));
    }
    if chars[start + 1..].iter().all(|c| c.is_whitespace()) {
        return Err(parse_error(start + 1, "empty formula"));
    }

    let tokens = Lexer::new(chars, start + 1).tokenize()?;
    let mut parser = Parser::new(tokens, *ctx);
    let ast = parser.parse_expression()?;
    if !matches!(parser.peek_kind(), TokenKind::Eof) {
        let pos = parser.tokens[parser.idx].pos;
        return Err(parse_error(pos, "unexpected trailing input"));
    }
    Ok(ParsedFormula {
        ast,
        unsupported: parser.unsupported,
    })
}
