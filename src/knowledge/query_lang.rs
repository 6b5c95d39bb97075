//! A minimal, hand-rolled executor for the read-only GraphQL subset
//! `knowledge/query` accepts.
//!
//! The transport carries a query language tag (`queryLanguage`) and the
//! query body is opaque schema-wise — defining a GraphQL schema is out of
//! scope here, only executing a fixed, well-known query shape against the
//! knowledge store is in scope. That shape is:
//!
//! ```text
//! {
//!   statements(subject: "ex:alice", predicate: "ex:knows", object: "ex:bob", graph: "ex:g1") {
//!     subject { id type }
//!     predicate { id }
//!     object { id value type }
//!     graph
//!     certainty
//!   }
//! }
//! ```
//!
//! All arguments are optional and may reference a query variable with
//! `$name` instead of a string literal. The field selection set is
//! optional too — an empty or absent selection set returns every field.
//!
//! This follows the same style used elsewhere for parsing JSON-RPC params by
//! hand with direct `serde_json::Value` destructuring (see
//! `server::axum_integration`'s `parse_*_params` helpers) rather than
//! pulling in a schema-driven GraphQL engine for a single fixed query
//! shape.

use serde_json::{json, Value};

use crate::error::{A2AError, A2AResult};
use crate::knowledge::store::KnowledgeStore;
use crate::knowledge::types::{GraphQlResult, KGStatement};

/// The parsed, executable form of a `statements(...)` query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementsQuery {
    /// `subject:` argument, resolved from a literal or variable.
    pub subject: Option<String>,
    /// `predicate:` argument.
    pub predicate: Option<String>,
    /// `object:` argument.
    pub object: Option<String>,
    /// `graph:` argument.
    pub graph: Option<String>,
    /// Requested field names within the `statements` selection set. Empty
    /// means "all fields".
    pub fields: Vec<String>,
}

const KNOWN_FIELDS: &[&str] = &["subject", "predicate", "object", "graph", "certainty", "provenance"];

/// Parses `query` (optionally resolving `$variable` references against
/// `variables`) into a [`StatementsQuery`].
pub fn parse(query: &str, variables: Option<&Value>) -> A2AResult<StatementsQuery> {
    let mut tokens = Tokenizer::new(query).tokenize()?;
    tokens.expect(Token::BraceOpen)?;
    tokens.expect(Token::Name("statements".to_string()))?;

    let mut result = StatementsQuery::default();

    if tokens.peek() == Some(&Token::ParenOpen) {
        tokens.next();
        loop {
            let name = tokens.expect_name()?;
            tokens.expect(Token::Colon)?;
            let value = tokens.expect_arg_value(variables)?;
            match name.as_str() {
                "subject" => result.subject = Some(value),
                "predicate" => result.predicate = Some(value),
                "object" => result.object = Some(value),
                "graph" => result.graph = Some(value),
                other => {
                    return Err(A2AError::knowledge_query_error(format!(
                        "unknown argument '{other}' to statements()"
                    )))
                }
            }
            match tokens.peek() {
                Some(Token::Comma) => {
                    tokens.next();
                }
                Some(Token::ParenClose) => {
                    tokens.next();
                    break;
                }
                _ => return Err(A2AError::knowledge_query_error("malformed argument list")),
            }
        }
    }

    if tokens.peek() == Some(&Token::BraceOpen) {
        tokens.next();
        loop {
            if tokens.peek() == Some(&Token::BraceClose) {
                tokens.next();
                break;
            }
            let field = tokens.expect_name()?;
            if !KNOWN_FIELDS.contains(&field.as_str()) {
                return Err(A2AError::knowledge_query_error(format!(
                    "unknown field '{field}' in statements selection set"
                )));
            }
            // Nested selection sets (e.g. `subject { id type }`) are accepted
            // syntactically but not projected field-by-field — the whole
            // sub-object is always returned when its parent field is requested.
            if tokens.peek() == Some(&Token::BraceOpen) {
                skip_braced_group(&mut tokens)?;
            }
            result.fields.push(field);
        }
    }

    tokens.expect(Token::BraceClose)?;

    Ok(result)
}

fn skip_braced_group(tokens: &mut TokenStream) -> A2AResult<()> {
    tokens.expect(Token::BraceOpen)?;
    let mut depth = 1;
    while depth > 0 {
        match tokens.next() {
            Some(Token::BraceOpen) => depth += 1,
            Some(Token::BraceClose) => depth -= 1,
            Some(_) => {}
            None => return Err(A2AError::knowledge_query_error("unterminated selection set")),
        }
    }
    Ok(())
}

/// Executes a parsed query against a store and projects the result into
/// the GraphQL-shaped `{data, errors?}` envelope.
pub async fn execute(
    query: &StatementsQuery,
    store: &dyn KnowledgeStore,
) -> A2AResult<GraphQlResult> {
    let statements = store
        .find(
            query.subject.as_deref(),
            query.predicate.as_deref(),
            query.object.as_deref(),
            query.graph.as_deref(),
        )
        .await?;

    let projected: Vec<Value> = statements.iter().map(|s| project(s, &query.fields)).collect();

    Ok(GraphQlResult {
        data: Some(json!({ "statements": projected })),
        errors: None,
    })
}

fn project(statement: &KGStatement, fields: &[String]) -> Value {
    let full = serde_json::to_value(statement).unwrap_or(Value::Null);
    if fields.is_empty() {
        return full;
    }
    let mut out = serde_json::Map::new();
    if let Value::Object(map) = full {
        for field in fields {
            if let Some(v) = map.get(field) {
                out.insert(field.clone(), v.clone());
            }
        }
    }
    Value::Object(out)
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    BraceOpen,
    BraceClose,
    ParenOpen,
    ParenClose,
    Colon,
    Comma,
    Name(String),
    StringLiteral(String),
    Variable(String),
}

struct Tokenizer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn tokenize(mut self) -> A2AResult<TokenStream> {
        let mut tokens = Vec::new();
        while let Some(&c) = self.chars.peek() {
            match c {
                c if c.is_whitespace() => {
                    self.chars.next();
                }
                '{' => {
                    self.chars.next();
                    tokens.push(Token::BraceOpen);
                }
                '}' => {
                    self.chars.next();
                    tokens.push(Token::BraceClose);
                }
                '(' => {
                    self.chars.next();
                    tokens.push(Token::ParenOpen);
                }
                ')' => {
                    self.chars.next();
                    tokens.push(Token::ParenClose);
                }
                ':' => {
                    self.chars.next();
                    tokens.push(Token::Colon);
                }
                ',' => {
                    self.chars.next();
                    tokens.push(Token::Comma);
                }
                '$' => {
                    self.chars.next();
                    let name = self.read_identifier();
                    if name.is_empty() {
                        return Err(A2AError::knowledge_query_error("expected variable name after '$'"));
                    }
                    tokens.push(Token::Variable(name));
                }
                '"' => {
                    self.chars.next();
                    let mut s = String::new();
                    loop {
                        match self.chars.next() {
                            Some('"') => break,
                            Some(ch) => s.push(ch),
                            None => return Err(A2AError::knowledge_query_error("unterminated string literal")),
                        }
                    }
                    tokens.push(Token::StringLiteral(s));
                }
                c if c.is_alphabetic() || c == '_' => {
                    let name = self.read_identifier();
                    tokens.push(Token::Name(name));
                }
                other => {
                    return Err(A2AError::knowledge_query_error(format!(
                        "unexpected character '{other}' in query"
                    )))
                }
            }
        }
        Ok(TokenStream { tokens, pos: 0 })
    }

    fn read_identifier(&mut self) -> String {
        let mut out = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                out.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        out
    }
}

struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenStream {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, expected: Token) -> A2AResult<()> {
        match self.next() {
            Some(ref t) if *t == expected => Ok(()),
            other => Err(A2AError::knowledge_query_error(format!(
                "expected {expected:?}, found {other:?}"
            ))),
        }
    }

    fn expect_name(&mut self) -> A2AResult<String> {
        match self.next() {
            Some(Token::Name(n)) => Ok(n),
            other => Err(A2AError::knowledge_query_error(format!(
                "expected a field/argument name, found {other:?}"
            ))),
        }
    }

    fn expect_arg_value(&mut self, variables: Option<&Value>) -> A2AResult<String> {
        match self.next() {
            Some(Token::StringLiteral(s)) => Ok(s),
            Some(Token::Variable(name)) => {
                let value = variables
                    .and_then(|v| v.get(&name))
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        A2AError::knowledge_query_error(format!(
                            "query variable '${name}' not supplied or not a string"
                        ))
                    })?;
                Ok(value.to_string())
            }
            other => Err(A2AError::knowledge_query_error(format!(
                "expected a string literal or variable, found {other:?}"
            ))),
        }
    }
}
