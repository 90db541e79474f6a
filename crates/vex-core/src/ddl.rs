//! Parser for `CREATE VIRTUAL TABLE ... USING vec0(...)` arguments
//!
//! Each argument is one of:
//! - `name float[4] [distance_metric=cosine]` (also `f32`, `int8`, `i8`, `bit`)
//! - `name integer primary key`
//! - `name integer partition key` / `name text partition key`
//! - `+name [type]` for auxiliary columns
//! - `name boolean|integer|float|text` for metadata columns
//! - `chunk_size=N`

use crate::error::{Result, VexError};
use crate::types::schema::{
    ColumnDef, ColumnKind, KeyType, MetadataType, TableSchema, VectorColumn,
    DEFAULT_CHUNK_SIZE,
};
use crate::types::vector::{ElementType, Metric};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(u64),
    LBracket,
    RBracket,
    Eq,
    Plus,
}

fn tokenize(arg: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = arg.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Eq);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '"' | '`' => {
                let quote = c;
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => {
                            if chars.peek() == Some(&quote) {
                                chars.next();
                                name.push(quote);
                            } else {
                                break;
                            }
                        }
                        Some(ch) => name.push(ch),
                        None => {
                            return Err(VexError::Config(format!(
                                "unterminated quoted identifier in '{}'",
                                arg
                            )))
                        }
                    }
                }
                tokens.push(Token::Ident(name));
            }
            c if c.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n = digits.parse::<u64>().map_err(|_| {
                    VexError::Config(format!("number '{}' is out of range in '{}'", digits, arg))
                })?;
                tokens.push(Token::Number(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        ident.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(VexError::Config(format!(
                    "unexpected character '{}' in vec0 argument '{}'",
                    other, arg
                )))
            }
        }
    }
    Ok(tokens)
}

enum Declaration {
    Column(ColumnDef),
    ChunkSize(usize),
}

fn invalid(arg: &str, why: &str) -> VexError {
    VexError::Config(format!("invalid vec0 argument '{}': {}", arg.trim(), why))
}

fn keyword(token: Option<&Token>, word: &str) -> bool {
    matches!(token, Some(Token::Ident(s)) if s.eq_ignore_ascii_case(word))
}

fn parse_declaration(arg: &str) -> Result<Declaration> {
    let tokens = tokenize(arg)?;

    match tokens.as_slice() {
        [] => Err(invalid(arg, "empty declaration")),

        [Token::Plus, Token::Ident(name)] => Ok(Declaration::Column(ColumnDef::new(
            name.clone(),
            ColumnKind::Auxiliary(None),
        ))),
        [Token::Plus, Token::Ident(name), Token::Ident(ty)] => Ok(Declaration::Column(
            ColumnDef::new(name.clone(), ColumnKind::Auxiliary(Some(ty.to_ascii_uppercase()))),
        )),
        [Token::Plus, ..] => Err(invalid(arg, "expected '+name [type]'")),

        [Token::Ident(key), Token::Eq, value] => {
            if !key.eq_ignore_ascii_case("chunk_size") {
                return Err(invalid(arg, &format!("unknown table option '{}'", key)));
            }
            match value {
                Token::Number(n) => Ok(Declaration::ChunkSize(*n as usize)),
                _ => Err(invalid(arg, "chunk_size must be a positive integer")),
            }
        }

        [Token::Ident(name), Token::Ident(ty), Token::LBracket, rest @ ..] => {
            parse_vector(arg, name, ty, rest).map(Declaration::Column)
        }

        [Token::Ident(name), Token::Ident(ty), rest @ ..] => {
            let ty_lower = ty.to_ascii_lowercase();
            let kind = if rest.is_empty() {
                ColumnKind::Metadata(match ty_lower.as_str() {
                    "boolean" | "bool" => MetadataType::Boolean,
                    "integer" | "int" => MetadataType::Integer,
                    "float" | "double" | "real" => MetadataType::Float,
                    "text" => MetadataType::Text,
                    _ => return Err(invalid(arg, &format!("unknown column type '{}'", ty))),
                })
            } else if rest.len() == 2 && keyword(rest.get(1), "key") && keyword(rest.first(), "primary") {
                ColumnKind::PrimaryKey(match ty_lower.as_str() {
                    "integer" | "int" => KeyType::Integer,
                    "text" => KeyType::Text,
                    _ => return Err(invalid(arg, "primary key must be integer or text")),
                })
            } else if rest.len() == 2 && keyword(rest.get(1), "key") && keyword(rest.first(), "partition") {
                ColumnKind::PartitionKey(match ty_lower.as_str() {
                    "integer" | "int" => KeyType::Integer,
                    "text" => KeyType::Text,
                    _ => return Err(invalid(arg, "partition key must be integer or text")),
                })
            } else {
                return Err(invalid(arg, "unrecognized column constraint"));
            };
            Ok(Declaration::Column(ColumnDef::new(name.clone(), kind)))
        }

        _ => Err(invalid(arg, "expected a column declaration or table option")),
    }
}

fn parse_vector(arg: &str, name: &str, ty: &str, rest: &[Token]) -> Result<ColumnDef> {
    let element_type: ElementType = ty
        .parse()
        .map_err(|_| invalid(arg, &format!("unknown vector type '{}'", ty)))?;

    let (dimension, options) = match rest {
        [Token::Number(n), Token::RBracket, options @ ..] => (*n as usize, options),
        _ => return Err(invalid(arg, "expected '[dimension]' after the vector type")),
    };

    let mut column = VectorColumn::new(name, element_type, dimension);
    match options {
        [] => {}
        [Token::Ident(key), Token::Eq, Token::Ident(value)]
            if key.eq_ignore_ascii_case("distance_metric") =>
        {
            let metric: Metric = value
                .parse()
                .map_err(|_| invalid(arg, &format!("unknown distance metric '{}'", value)))?;
            if !metric.supports(element_type) {
                return Err(invalid(
                    arg,
                    &format!("distance metric {} is not supported on {} vectors", metric, element_type),
                ));
            }
            column = column.with_metric(metric);
        }
        _ => return Err(invalid(arg, "expected 'distance_metric=<metric>'")),
    }
    Ok(ColumnDef::vector(column))
}

/// Parse the column/option arguments of a vec0 declaration into a schema.
pub fn parse_table_args<S: AsRef<str>>(args: &[S]) -> Result<TableSchema> {
    let mut columns = Vec::new();
    let mut chunk_size = None;

    for arg in args {
        match parse_declaration(arg.as_ref())? {
            Declaration::Column(column) => columns.push(column),
            Declaration::ChunkSize(n) => {
                if chunk_size.replace(n).is_some() {
                    return Err(invalid(arg.as_ref(), "chunk_size given more than once"));
                }
            }
        }
    }

    TableSchema::new(columns, chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_columns() {
        let schema = parse_table_args(&[
            "embedding float[4]",
            "small int8[16] distance_metric=cosine",
            "hash bit[9]",
            "\"quoted name\" f32[2] distance_metric = l1",
        ])
        .unwrap();

        let e = schema.vector_column(0).unwrap();
        assert_eq!((e.element_type, e.dimension, e.metric), (ElementType::Float32, 4, Metric::L2));
        let s = schema.vector_column(1).unwrap();
        assert_eq!((s.element_type, s.metric), (ElementType::Int8, Metric::Cosine));
        let h = schema.vector_column(2).unwrap();
        assert_eq!((h.element_type, h.dimension, h.metric), (ElementType::Bit, 9, Metric::Hamming));
        let q = schema.vector_column(3).unwrap();
        assert_eq!((q.name.as_str(), q.metric), ("quoted name", Metric::L1));
        assert_eq!(schema.chunk_size(), DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_other_column_kinds() {
        let schema = parse_table_args(&[
            "id integer primary key",
            "user_id int partition key",
            "v float[1]",
            "+contents text",
            "+raw",
            "is_public boolean",
            "score float",
            "label text",
            "chunk_size=8",
        ])
        .unwrap();

        let kinds: Vec<&ColumnKind> = schema.columns().iter().map(|c| &c.kind).collect();
        assert_eq!(kinds[0], &ColumnKind::PrimaryKey(KeyType::Integer));
        assert_eq!(kinds[1], &ColumnKind::PartitionKey(KeyType::Integer));
        assert_eq!(kinds[3], &ColumnKind::Auxiliary(Some("TEXT".into())));
        assert_eq!(kinds[4], &ColumnKind::Auxiliary(None));
        assert_eq!(kinds[5], &ColumnKind::Metadata(MetadataType::Boolean));
        assert_eq!(kinds[6], &ColumnKind::Metadata(MetadataType::Float));
        assert_eq!(kinds[7], &ColumnKind::Metadata(MetadataType::Text));
        assert_eq!(schema.chunk_size(), 8);
    }

    #[test]
    fn test_text_primary_key() {
        let schema = parse_table_args(&["id TEXT PRIMARY KEY", "v float[2]"]).unwrap();
        assert_eq!(schema.columns()[0].kind, ColumnKind::PrimaryKey(KeyType::Text));
        assert_eq!(schema.text_key(), Some(0));
        assert_eq!(schema.rowid_alias(), None);
    }

    #[test]
    fn test_rejections() {
        let bad: &[&[&str]] = &[
            &["v float[0]"],
            &["v float[8193]"],
            &["v float16[4]"],
            &["v float[4"],
            &["v bit[8] distance_metric=l2"],
            &["v float[4] distance_metric=hamming"],
            &["v float[4] distance_metric=dot"],
            &["v float[4]", "chunk_size=12"],
            &["v float[4]", "chunk_size=8", "chunk_size=16"],
            &["v float[4]", "page_size=8"],
            &["v float[4]", "id real primary key"],
            &["v float[4]", "a integer primary key", "b text primary key"],
            &["v float[4]", "p real partition key"],
            &["v float[4]", "m blob"],
            &["v float[4]", "p1 int partition key", "p2 int partition key", "p3 int partition key",
              "p4 int partition key", "p5 int partition key"],
            &["m integer"],
            &["v float[4] ; drop table x"],
        ];
        for args in bad {
            assert!(
                matches!(parse_table_args(args), Err(VexError::Config(_))),
                "{:?} should be rejected",
                args
            );
        }
    }

    #[test]
    fn test_too_many_vector_columns() {
        let args: Vec<String> = (0..17).map(|i| format!("v{} float[1]", i)).collect();
        assert!(parse_table_args(&args).is_err());
        assert!(parse_table_args(&args[..16]).is_ok());
    }
}
