//! Relation addressing and COPY statement construction

use urio_core::{Error, Result, Uri};

/// Data format of the COPY stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyFormat {
    #[default]
    Csv,
    Text,
}

impl CopyFormat {
    fn as_sql(self) -> &'static str {
        match self {
            CopyFormat::Csv => "csv",
            CopyFormat::Text => "text",
        }
    }
}

/// Options carried in the URI query string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOptions {
    pub format: CopyFormat,
    /// First line holds column names (csv only)
    pub header: bool,
    /// Read the result of this query instead of a relation
    pub query: Option<String>,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            format: CopyFormat::Csv,
            header: true,
            query: None,
        }
    }
}

impl CopyOptions {
    pub fn from_uri(uri: &Uri) -> Result<Self> {
        let invalid = |key: &str, value: &str| Error::MalformedUri {
            uri: uri.redacted(),
            reason: format!("invalid value '{value}' for {key}"),
        };

        let format = match uri.query_param("format") {
            None | Some("csv") => CopyFormat::Csv,
            Some("text") => CopyFormat::Text,
            Some(other) => return Err(invalid("format", other)),
        };
        let header = match (uri.query_param("header"), format) {
            (None, CopyFormat::Csv) => true,
            (None, CopyFormat::Text) => false,
            (Some("true" | "1" | "yes"), CopyFormat::Csv) => true,
            (Some("true" | "1" | "yes"), CopyFormat::Text) => {
                return Err(Error::MalformedUri {
                    uri: uri.redacted(),
                    reason: "header requires format=csv".into(),
                });
            }
            (Some("false" | "0" | "no"), _) => false,
            (Some(other), _) => return Err(invalid("header", other)),
        };
        let query = uri
            .query_param("query")
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| q.trim_end_matches(';').to_string());

        Ok(Self {
            format,
            header,
            query,
        })
    }

    fn clause(&self) -> String {
        if self.header {
            format!("(FORMAT {}, HEADER true)", self.format.as_sql())
        } else {
            format!("(FORMAT {})", self.format.as_sql())
        }
    }
}

/// Split `/database[/relation]` into its parts
pub fn split_path(path: &str) -> (&str, Option<&str>) {
    let trimmed = path.trim_matches('/');
    match trimmed.split_once('/') {
        Some((database, relation)) => {
            let relation = relation.trim_matches('/');
            (database, (!relation.is_empty()).then_some(relation))
        }
        None => (trimmed, None),
    }
}

/// Quote one identifier
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a `[schema.]table` name part by part; `None` if a part is empty
pub fn quote_relation(relation: &str) -> Option<String> {
    let parts: Vec<&str> = relation.split(['.', '/']).collect();
    if parts.len() > 2 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    Some(
        parts
            .into_iter()
            .map(quote_ident)
            .collect::<Vec<_>>()
            .join("."),
    )
}

/// `(schema, table)` for catalog lookups, schema absent for unqualified names
pub fn relation_parts(relation: &str) -> (Option<&str>, &str) {
    match relation.split_once(['.', '/']) {
        Some((schema, table)) => (Some(schema), table),
        None => (None, relation),
    }
}

/// What a reader copies out of
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopySource {
    /// Quoted relation name
    Relation(String),
    Query(String),
}

pub fn copy_out_statement(source: &CopySource, options: &CopyOptions) -> String {
    let source = match source {
        CopySource::Relation(relation) => relation.clone(),
        CopySource::Query(query) => format!("({query})"),
    };
    format!("COPY {source} TO STDOUT {}", options.clause())
}

pub fn copy_in_statement(relation: &str, options: &CopyOptions) -> String {
    format!("COPY {relation} FROM STDIN {}", options.clause())
}
