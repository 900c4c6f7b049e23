//! Formula parser.
//!
//! ```text
//! expr ::= const | cellRef | fun
//! fun  ::= '(' funcId arg* ')'
//! arg  ::= expr
//! ```
//!
//! A cell reference is `row` or `column:row`; either part may be an absolute
//! path, a relative path (`.` is the current column/row) or a glob pattern.
//! Resolution against a schema happens later, in the compiler.

use std::error::Error;
use std::fmt::{self, Display};

use crate::tokenizer::{Span, Token, TokenType, Tokenizer, TokenizerError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A custom error type for the parser.
#[derive(Debug)]
pub struct ParserError {
    pub message: String,
    pub position: Option<usize>,
}

impl Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(pos) = self.position {
            write!(f, "ParserError at position {}: {}", pos, self.message)
        } else {
            write!(f, "ParserError: {}", self.message)
        }
    }
}

impl Error for ParserError {}

impl From<TokenizerError> for ParserError {
    fn from(err: TokenizerError) -> Self {
        ParserError {
            message: err.message,
            position: Some(err.pos),
        }
    }
}

/// Literal constants.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Literal {
    Integer(i64),
    Real(f64),
    Bool(bool),
    Text(String),
}

impl Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(i) => write!(f, "{i}"),
            Literal::Real(r) => {
                if r.fract() == 0.0 && r.is_finite() {
                    write!(f, "{r:.1}")
                } else {
                    write!(f, "{r}")
                }
            }
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Text(s) => write!(f, "{s:?}"),
        }
    }
}

/// An unresolved `column:row` reference as written in the formula.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellReference {
    pub column: Option<String>,
    pub row: String,
}

impl CellReference {
    pub fn from_string(s: &str) -> Result<Self, String> {
        match s.split_once(':') {
            Some((col, row)) => {
                if col.is_empty() || row.is_empty() {
                    return Err(format!("Invalid cell reference '{s}'"));
                }
                Ok(CellReference {
                    column: Some(col.to_string()),
                    row: row.to_string(),
                })
            }
            None => Ok(CellReference {
                column: None,
                row: s.to_string(),
            }),
        }
    }

    pub fn is_pattern(&self) -> bool {
        is_glob(&self.row) || self.column.as_deref().is_some_and(is_glob)
    }
}

fn is_glob(s: &str) -> bool {
    s.contains(['*', '?', '[', '{'])
}

impl Display for CellReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(col) => write!(f, "{col}:{}", self.row),
            None => f.write_str(&self.row),
        }
    }
}

/// The different types of AST nodes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ASTNodeType {
    Literal(Literal),
    Reference {
        original: String,
        reference: CellReference,
    },
    Function {
        name: String,
        args: Vec<ASTNode>,
    },
}

/// An AST node represents a parsed formula element
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ASTNode {
    pub node_type: ASTNodeType,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub span: Span,
}

impl ASTNode {
    pub fn new(node_type: ASTNodeType, span: Span) -> Self {
        ASTNode { node_type, span }
    }

    /// Every reference reachable from this node, in source order.
    pub fn get_references(&self) -> Vec<&CellReference> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references<'a>(&'a self, refs: &mut Vec<&'a CellReference>) {
        match &self.node_type {
            ASTNodeType::Reference { reference, .. } => refs.push(reference),
            ASTNodeType::Function { args, .. } => {
                for arg in args {
                    arg.collect_references(refs);
                }
            }
            ASTNodeType::Literal(_) => {}
        }
    }

    /// Names of every function called, in source order.
    pub fn function_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if let ASTNodeType::Function { name, args } = &node.node_type {
                names.push(name.as_str());
                stack.extend(args.iter().rev());
            }
        }
        names
    }
}

impl Display for ASTNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node_type {
            ASTNodeType::Literal(lit) => write!(f, "{lit}"),
            ASTNodeType::Reference { reference, .. } => write!(f, "{reference}"),
            ASTNodeType::Function { name, args } => {
                write!(f, "({name}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// A parser for converting tokens into an AST.
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl From<Vec<Token>> for Parser {
    fn from(tokens: Vec<Token>) -> Self {
        Parser::new(tokens)
    }
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            position: 0,
        }
    }

    pub fn parse(&mut self) -> Result<ASTNode, ParserError> {
        if self.tokens.is_empty() {
            return Err(ParserError {
                message: "No tokens to parse".to_string(),
                position: None,
            });
        }
        let ast = self.parse_expression()?;
        if let Some(token) = self.tokens.get(self.position) {
            return Err(ParserError {
                message: format!("Unexpected trailing token {token}"),
                position: Some(token.span.start),
            });
        }
        Ok(ast)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn end_position(&self) -> Option<usize> {
        self.tokens.last().map(|t| t.span.end)
    }

    fn parse_expression(&mut self) -> Result<ASTNode, ParserError> {
        let Some(token) = self.next() else {
            return Err(ParserError {
                message: "Unexpected end of formula".to_string(),
                position: self.end_position(),
            });
        };
        match token.token_type {
            TokenType::Open => self.parse_function(token),
            TokenType::Close => Err(ParserError {
                message: "Unexpected ')'".to_string(),
                position: Some(token.span.start),
            }),
            TokenType::Text => Ok(ASTNode::new(
                ASTNodeType::Literal(Literal::Text(token.value)),
                token.span,
            )),
            TokenType::Atom => parse_atom(token),
        }
    }

    fn parse_function(&mut self, open: Token) -> Result<ASTNode, ParserError> {
        let name_token = match self.next() {
            Some(t) if t.token_type == TokenType::Atom && is_function_name(&t.value) => t,
            Some(t) => {
                return Err(ParserError {
                    message: format!("Expected function name, found {t}"),
                    position: Some(t.span.start),
                });
            }
            None => {
                return Err(ParserError {
                    message: "Expected function name after '('".to_string(),
                    position: Some(open.span.end),
                });
            }
        };

        let mut args = Vec::new();
        loop {
            match self.peek() {
                Some(t) if t.token_type == TokenType::Close => {
                    let close = self.next().map(|t| t.span).unwrap_or(open.span);
                    return Ok(ASTNode::new(
                        ASTNodeType::Function {
                            name: name_token.value,
                            args,
                        },
                        open.span.join(close),
                    ));
                }
                Some(_) => args.push(self.parse_expression()?),
                None => {
                    return Err(ParserError {
                        message: format!("Unclosed call to '{}'", name_token.value),
                        position: Some(open.span.start),
                    });
                }
            }
        }
    }
}

fn is_function_name(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn looks_numeric(s: &str) -> bool {
    let b = s.as_bytes();
    match b.first() {
        Some(c) if c.is_ascii_digit() => true,
        Some(b'+' | b'-') => match b.get(1) {
            Some(c) if c.is_ascii_digit() => true,
            Some(b'.') => b.get(2).is_some_and(|c| c.is_ascii_digit()),
            _ => false,
        },
        Some(b'.') => b.get(1).is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

fn parse_atom(token: Token) -> Result<ASTNode, ParserError> {
    let text = token.value.as_str();
    let literal = match text {
        "true" => Some(Literal::Bool(true)),
        "false" => Some(Literal::Bool(false)),
        _ if looks_numeric(text) => {
            let lit = if text.contains(['.', 'e', 'E']) {
                text.parse::<f64>().ok().map(Literal::Real)
            } else {
                text.parse::<i64>().ok().map(Literal::Integer)
            };
            match lit {
                Some(l) => Some(l),
                None => {
                    return Err(ParserError {
                        message: format!("Invalid number '{text}'"),
                        position: Some(token.span.start),
                    });
                }
            }
        }
        _ => None,
    };
    if let Some(lit) = literal {
        return Ok(ASTNode::new(ASTNodeType::Literal(lit), token.span));
    }

    let reference = CellReference::from_string(text).map_err(|message| ParserError {
        message,
        position: Some(token.span.start),
    })?;
    Ok(ASTNode::new(
        ASTNodeType::Reference {
            original: token.value.clone(),
            reference,
        },
        token.span,
    ))
}

pub fn parse<T: AsRef<str>>(formula: T) -> Result<ASTNode, ParserError> {
    let tokens = Tokenizer::new(formula.as_ref())?.items;
    Parser::new(tokens).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, ast: &ASTNode) -> usize {
        match &ast.node_type {
            ASTNodeType::Function { name: n, args } => {
                assert_eq!(n, name);
                args.len()
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn constants() {
        assert_eq!(
            parse("42").unwrap().node_type,
            ASTNodeType::Literal(Literal::Integer(42))
        );
        assert_eq!(
            parse("-3.5").unwrap().node_type,
            ASTNodeType::Literal(Literal::Real(-3.5))
        );
        assert_eq!(
            parse(".25").unwrap().node_type,
            ASTNodeType::Literal(Literal::Real(0.25))
        );
        assert_eq!(
            parse("true").unwrap().node_type,
            ASTNodeType::Literal(Literal::Bool(true))
        );
    }

    #[test]
    fn dot_paths_are_references() {
        for src in [".", "..", "./x", "../a", "/a/b"] {
            match parse(src).unwrap().node_type {
                ASTNodeType::Reference { reference, .. } => {
                    assert_eq!(reference.row, src);
                    assert!(reference.column.is_none());
                }
                other => panic!("{src}: {other:?}"),
            }
        }
    }

    #[test]
    fn column_qualified_reference() {
        let ast = parse("../region2:/data/a").unwrap();
        match ast.node_type {
            ASTNodeType::Reference { reference, .. } => {
                assert_eq!(reference.column.as_deref(), Some("../region2"));
                assert_eq!(reference.row, "/data/a");
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn nested_calls() {
        let ast = parse("(sum a (mul b 2) 3.0)").unwrap();
        assert_eq!(call("sum", &ast), 3);
        assert_eq!(ast.get_references().len(), 2);
        assert_eq!(ast.function_names(), vec!["sum", "mul"]);
        assert_eq!(ast.to_string(), "(sum a (mul b 2) 3.0)");
    }

    #[test]
    fn zero_arg_call() {
        let ast = parse("(now)").unwrap();
        assert_eq!(call("now", &ast), 0);
    }

    #[test]
    fn glob_references_are_flagged() {
        let ast = parse("(sum ../*)").unwrap();
        assert!(ast.get_references()[0].is_pattern());
        let ast = parse("(sum /cols/*:.)").unwrap();
        assert!(ast.get_references()[0].is_pattern());
    }

    #[test]
    fn errors_carry_positions() {
        let err = parse("(sum a").unwrap_err();
        assert_eq!(err.position, Some(0));
        let err = parse("(1 a)").unwrap_err();
        assert_eq!(err.position, Some(1));
        let err = parse("a b").unwrap_err();
        assert_eq!(err.position, Some(2));
        assert!(parse("").is_err());
        assert!(parse(")").is_err());
        assert!(parse("1x2").is_err());
        assert!(parse(":a").is_err());
    }
}
