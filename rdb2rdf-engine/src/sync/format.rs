//! Graph file reading and writing
//!
//! N-Triples through `rio_turtle`; Turtle is written here so it can declare
//! the mapping document's prefixes and group statements by subject. Both are
//! read back with the `rio_turtle` parsers. Files are written to a sibling
//! temporary path and renamed into place, so a failed write never leaves a
//! truncated graph behind.

use std::collections::BTreeSet;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rio_api::formatter::TriplesFormatter;
use rio_api::model::{Literal, NamedNode};
use rio_api::parser::TriplesParser;
use rio_turtle::{NTriplesFormatter, NTriplesParser, TurtleParser};
use serde::{Deserialize, Serialize};

use crate::error::{R2rmlError, R2rmlResult};
use crate::mapping::Prefixes;
use crate::materialize::{RdfTerm, Resource, Statement};
use crate::vocab::rdf;

/// Output syntax for graph files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphFormat {
    #[default]
    NTriples,
    Turtle,
}

impl GraphFormat {
    /// Format implied by a file extension (`.nt`, `.ttl`).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "nt" | "ntriples" => Some(GraphFormat::NTriples),
            "ttl" | "turtle" => Some(GraphFormat::Turtle),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "ntriples" | "n-triples" | "nt" => Some(GraphFormat::NTriples),
            "turtle" | "ttl" => Some(GraphFormat::Turtle),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GraphFormat::NTriples => "ntriples",
            GraphFormat::Turtle => "turtle",
        }
    }
}

impl fmt::Display for GraphFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GraphFormat {
    type Err = R2rmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GraphFormat::from_name(s)
            .ok_or_else(|| R2rmlError::Config(format!("unknown graph format '{s}'")))
    }
}

/// Write `statements` to `path`, returning the size of the written file.
pub fn write_statements<'a>(
    path: &Path,
    format: GraphFormat,
    statements: impl IntoIterator<Item = &'a Statement>,
) -> R2rmlResult<u64> {
    write_graph(path, format, statements, &Prefixes::new())
}

/// Like [`write_statements`]; Turtle output declares `prefixes` and uses
/// them to abbreviate IRIs. N-Triples has no prefixes and ignores them.
pub fn write_graph<'a>(
    path: &Path,
    format: GraphFormat,
    statements: impl IntoIterator<Item = &'a Statement>,
    prefixes: &Prefixes,
) -> R2rmlResult<u64> {
    write_replacing(path, |out| match format {
        GraphFormat::NTriples => {
            let mut formatter = NTriplesFormatter::new(out);
            for s in statements {
                formatter.format(&s.as_triple())?;
            }
            formatter.finish()?.flush()
        }
        GraphFormat::Turtle => TurtleWriter::new(prefixes).write(out, statements),
    })
}

/// Turtle serializer with prefix declarations and one block per subject.
struct TurtleWriter<'p> {
    /// Usable prefixes, longest namespace first
    prefixes: Vec<(&'p str, &'p str)>,
}

impl<'p> TurtleWriter<'p> {
    fn new(prefixes: &'p Prefixes) -> Self {
        let mut usable: Vec<(&str, &str)> = prefixes
            .iter()
            .filter(|(label, ns)| is_prefix_label(label) && !ns.is_empty())
            .map(|(label, ns)| (label.as_str(), ns.as_str()))
            .collect();
        usable.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then(a.0.cmp(b.0)));
        Self { prefixes: usable }
    }

    fn write<'a, W: Write>(
        &self,
        out: &mut W,
        statements: impl IntoIterator<Item = &'a Statement>,
    ) -> io::Result<()> {
        let mut declared = self.prefixes.clone();
        declared.sort();
        for &(label, ns) in &declared {
            writeln!(out, "@prefix {label}: {} .", NamedNode { iri: ns })?;
        }
        if !declared.is_empty() {
            writeln!(out)?;
        }

        let mut current: Option<&Resource> = None;
        for s in statements {
            let predicate = if s.predicate == rdf::TYPE {
                "a".to_string()
            } else {
                self.iri(&s.predicate)
            };
            let object = self.term(&s.object);
            if current == Some(&s.subject) {
                write!(out, " ;\n    {predicate} {object}")?;
            } else {
                if current.is_some() {
                    writeln!(out, " .")?;
                }
                write!(out, "{} {predicate} {object}", self.resource(&s.subject))?;
                current = Some(&s.subject);
            }
        }
        if current.is_some() {
            writeln!(out, " .")?;
        }
        Ok(())
    }

    fn iri(&self, iri: &str) -> String {
        self.prefixes
            .iter()
            .find_map(|&(label, ns)| {
                iri.strip_prefix(ns)
                    .filter(|local| is_local_name(local))
                    .map(|local| format!("{label}:{local}"))
            })
            .unwrap_or_else(|| NamedNode { iri }.to_string())
    }

    fn resource(&self, resource: &Resource) -> String {
        match resource {
            Resource::Iri(iri) => self.iri(iri),
            Resource::BlankNode(_) => resource.as_rio().to_string(),
        }
    }

    fn term(&self, term: &RdfTerm) -> String {
        match term {
            RdfTerm::Iri(iri) => self.iri(iri),
            RdfTerm::Literal {
                value,
                datatype: Some(datatype),
                language: None,
            } => format!("{}^^{}", Literal::Simple { value }, self.iri(datatype)),
            other => other.as_rio().to_string(),
        }
    }
}

/// `PN_PREFIX`, restricted to ASCII; the empty label is allowed.
fn is_prefix_label(label: &str) -> bool {
    let mut chars = label.chars();
    match chars.next() {
        None => true,
        Some(first) => {
            first.is_ascii_alphabetic()
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        }
    }
}

/// Local names written unescaped: ASCII alphanumerics, `_` and inner `-`.
fn is_local_name(local: &str) -> bool {
    !local.starts_with('-')
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Read every statement of a graph file.
pub fn read_statements(path: &Path, format: GraphFormat) -> R2rmlResult<BTreeSet<Statement>> {
    let reader = BufReader::new(File::open(path)?);
    let mut statements = BTreeSet::new();
    let mut push = |t: rio_api::model::Triple<'_>| -> R2rmlResult<()> {
        statements.insert(Statement::from_triple(&t)?);
        Ok(())
    };
    match format {
        GraphFormat::NTriples => NTriplesParser::new(reader).parse_all(&mut push)?,
        GraphFormat::Turtle => TurtleParser::new(reader, None).parse_all(&mut push)?,
    }
    Ok(statements)
}

/// Run `write` against a temporary sibling of `path`, then move it into
/// place. Returns the final file size.
pub(crate) fn write_replacing(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
) -> R2rmlResult<u64> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let tmp = temp_path(path);
    let mut out = BufWriter::new(File::create(&tmp)?);
    let written = write(&mut out).and_then(|()| out.flush());
    drop(out);
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    fs::rename(&tmp, path)?;
    Ok(fs::metadata(path)?.len())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
