//! Native SQL type to literal datatype mapping

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{R2rmlError, R2rmlResult};
use crate::vocab::xsd;

/// Literal datatypes the engine emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XsdDatatype {
    String,
    Boolean,
    Integer,
    Decimal,
    Double,
    Date,
    Time,
    DateTime,
    Base64Binary,
}

impl XsdDatatype {
    pub fn iri(&self) -> &'static str {
        match self {
            XsdDatatype::String => xsd::STRING,
            XsdDatatype::Boolean => xsd::BOOLEAN,
            XsdDatatype::Integer => xsd::INTEGER,
            XsdDatatype::Decimal => xsd::DECIMAL,
            XsdDatatype::Double => xsd::DOUBLE,
            XsdDatatype::Date => xsd::DATE,
            XsdDatatype::Time => xsd::TIME,
            XsdDatatype::DateTime => xsd::DATE_TIME,
            XsdDatatype::Base64Binary => xsd::BASE64_BINARY,
        }
    }

    pub fn from_iri(iri: &str) -> Option<Self> {
        match iri {
            xsd::STRING => Some(XsdDatatype::String),
            xsd::BOOLEAN => Some(XsdDatatype::Boolean),
            xsd::INTEGER => Some(XsdDatatype::Integer),
            xsd::DECIMAL => Some(XsdDatatype::Decimal),
            xsd::DOUBLE => Some(XsdDatatype::Double),
            xsd::DATE => Some(XsdDatatype::Date),
            xsd::TIME => Some(XsdDatatype::Time),
            xsd::DATE_TIME => Some(XsdDatatype::DateTime),
            xsd::BASE64_BINARY => Some(XsdDatatype::Base64Binary),
            _ => None,
        }
    }
}

/// Maps source column types to literal datatypes.
pub struct DatatypeMapper;

impl DatatypeMapper {
    /// Datatype for a native SQL type name.
    ///
    /// `Ok(None)` means a plain literal: string-like types carry no explicit
    /// datatype. Unknown types fail with `UnmappedDatatype`.
    pub fn from_native_type(sql_type: &str) -> R2rmlResult<Option<XsdDatatype>> {
        let name = normalize(sql_type);
        let mapped = match name.as_str() {
            "character" | "text" | "clob" | "uuid" | "json" | "jsonb" | "xml" => None,
            n if ["varchar", "char", "varbit", "cidr", "inet", "macaddr"]
                .iter()
                .any(|s| n.contains(s)) =>
            {
                None
            }
            "binary" | "varbinary" | "bytea" | "blob" => Some(XsdDatatype::Base64Binary),
            n if n.contains("numeric") || n.contains("decimal") => Some(XsdDatatype::Decimal),
            "smallint" | "integer" | "bigint" | "int" | "int2" | "int4" | "int8" | "tinyint"
            | "mediumint" | "serial" | "serial4" | "serial8" | "bigserial" => {
                Some(XsdDatatype::Integer)
            }
            "float" | "float4" | "float8" | "real" | "double" | "double precision" | "number" => {
                Some(XsdDatatype::Double)
            }
            "boolean" | "bool" | "bit" => Some(XsdDatatype::Boolean),
            "date" => Some(XsdDatatype::Date),
            "time" | "timetz" | "time with time zone" | "time without time zone" => {
                Some(XsdDatatype::Time)
            }
            "timestamp" | "timestamptz" | "datetime" | "timestamp with time zone"
            | "timestamp without time zone" => Some(XsdDatatype::DateTime),
            _ => return Err(R2rmlError::UnmappedDatatype(sql_type.to_string())),
        };
        Ok(mapped)
    }
}

/// Lowercase, drop `(n[,m])` suffixes and ` unsigned`, collapse whitespace.
fn normalize(sql_type: &str) -> String {
    static PARENS: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\([^)]*\)").expect("valid regex"));
    static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

    let lowered = sql_type.trim().to_lowercase();
    let stripped = PARENS.replace_all(&lowered, " ");
    let collapsed = SPACES.replace_all(stripped.trim(), " ");
    collapsed
        .strip_suffix(" unsigned")
        .unwrap_or(collapsed.as_ref())
        .to_string()
}
