use std::fs;
use std::io::{self, Read};
use std::path::Path;

use tracing::debug;

use crate::table::{Schema, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Delimiter {
    /// `,` unless the header only splits on `;`.
    #[default]
    Auto,
    Comma,
    Semicolon,
}

impl Delimiter {
    pub fn byte(self) -> Option<u8> {
        match self {
            Delimiter::Auto => None,
            Delimiter::Comma => Some(b','),
            Delimiter::Semicolon => Some(b';'),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to read input")]
    Io(#[from] io::Error),
    #[error("malformed CSV")]
    Csv(#[from] csv::Error),
    #[error("input has no header row")]
    Empty,
    #[error("line {line}: expected at most {expected} fields, found {found}")]
    RaggedRow {
        line: u64,
        expected: usize,
        found: usize,
    },
}

/// A table plus the delimiter byte it was actually split on.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub table: Table,
    pub delimiter: u8,
}

pub fn read_path(path: &Path, delimiter: Delimiter) -> Result<Ingested, IngestError> {
    let file = fs::File::open(path)?;
    read_detected(file, delimiter)
}

pub fn read_table<R: Read>(reader: R, delimiter: Delimiter) -> Result<Table, IngestError> {
    read_detected(reader, delimiter).map(|i| i.table)
}

/// Read a whole CSV document. Input that is not valid UTF-8 is decoded as
/// Windows-1252; a leading BOM is dropped.
pub fn read_detected<R: Read>(mut reader: R, delimiter: Delimiter) -> Result<Ingested, IngestError> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let text = decode(bytes);
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

    if text.trim().is_empty() {
        return Err(IngestError::Empty);
    }

    let delim = match delimiter.byte() {
        Some(b) => b,
        None => sniff(text),
    };
    debug!(delimiter = %(delim as char), "reading table");

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delim)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = rdr.headers()?.clone();
    if headers.is_empty() {
        return Err(IngestError::Empty);
    }
    let mut table = Table::new(Schema::new(headers.iter().map(str::trim)));
    let width = table.schema().len();

    for record in rdr.records() {
        let record = record?;
        if record.len() > width {
            return Err(IngestError::RaggedRow {
                line: record.position().map(|p| p.line()).unwrap_or_default(),
                expected: width,
                found: record.len(),
            });
        }
        let cells = record
            .iter()
            .map(|c| (!c.trim().is_empty()).then(|| c.to_string()))
            .collect();
        table.push(cells);
    }

    Ok(Ingested {
        table,
        delimiter: delim,
    })
}

fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            let bytes = e.into_bytes();
            let (text, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(&bytes);
            debug!("input is not UTF-8, decoded as windows-1252");
            text.into_owned()
        }
    }
}

/// First of `,` and `;` that splits the header into several columns.
fn sniff(text: &str) -> u8 {
    [b',', b';']
        .into_iter()
        .find(|&d| header_width(text, d) > 1)
        .unwrap_or(b',')
}

fn header_width(text: &str, delim: u8) -> usize {
    csv::ReaderBuilder::new()
        .delimiter(delim)
        .has_headers(true)
        .from_reader(text.as_bytes())
        .headers()
        .map(|h| h.len())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> Result<Table, IngestError> {
        read_path(Path::new(&format!("tests/fixtures/{}.csv", name)), Delimiter::Auto).map(|i| i.table)
    }

    #[test]
    fn comma_file() {
        let t = fixture("comma").unwrap();
        assert_eq!(t.schema().names(), &["Organismo", "Materia", "Enlace"]);
        assert_eq!(t.len(), 3);
        assert_eq!(t.rows()[0].get("Organismo"), Some("Municipalidad de Arica"));
        assert_eq!(t.rows()[2].get("Enlace"), None);
    }

    #[test]
    fn semicolon_file_is_detected() {
        let t = fixture("semicolon").unwrap();
        assert_eq!(t.schema().len(), 3);
        assert_eq!(
            t.rows()[0].get("Enlace"),
            Some("<a href=\"https://www.portaltransparencia.cl/doc.pdf\">ver, aquí</a>")
        );
    }

    #[test]
    fn bom_is_stripped() {
        let t = fixture("bom").unwrap();
        assert_eq!(t.schema().names()[0], "Organismo");
    }

    #[test]
    fn latin1_fallback() {
        let t = fixture("latin1").unwrap();
        assert_eq!(t.rows()[0].get("Organismo"), Some("Municipalidad de Ñuñoa"));
    }

    #[test]
    fn windows_1252_punctuation() {
        let t = read_table(&b"a,b\n\x93hola\x94 \x80 \x96 \xf1,x\n"[..], Delimiter::Auto).unwrap();
        assert_eq!(t.rows()[0].get("a"), Some("\u{201c}hola\u{201d} \u{20ac} \u{2013} ñ"));
    }

    #[test]
    fn detected_delimiter_is_reported() {
        let semi = read_path(Path::new("tests/fixtures/semicolon.csv"), Delimiter::Auto).unwrap();
        assert_eq!(semi.delimiter, b';');
        let comma = read_detected("a,b\n1,2\n".as_bytes(), Delimiter::Auto).unwrap();
        assert_eq!(comma.delimiter, b',');
        let forced = read_detected("a,b\n".as_bytes(), Delimiter::Semicolon).unwrap();
        assert_eq!(forced.delimiter, b';');
    }

    #[test]
    fn duplicate_headers_are_renamed() {
        let t = fixture("duplicate_headers").unwrap();
        assert_eq!(t.schema().names(), &["Enlace", "Nota", "Enlace.1"]);
        assert_eq!(t.rows()[0].get("Enlace.1"), Some("https://b.cl"));
    }

    #[test]
    fn short_rows_are_padded_long_rows_rejected() {
        let t = read_table("a,b,c\n1\n".as_bytes(), Delimiter::Auto).unwrap();
        assert_eq!(t.rows()[0].cells().count(), 3);
        assert_eq!(t.rows()[0].get("c"), None);

        let err = fixture("ragged").unwrap_err();
        assert!(matches!(err, IngestError::RaggedRow { expected: 2, found: 3, .. }));
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(fixture("empty"), Err(IngestError::Empty)));
        assert!(matches!(read_table("\u{feff}  \n".as_bytes(), Delimiter::Auto), Err(IngestError::Empty)));
    }

    #[test]
    fn explicit_delimiter_wins() {
        let t = read_table("a;b\n1;2\n".as_bytes(), Delimiter::Comma).unwrap();
        assert_eq!(t.schema().names(), &["a;b"]);
        assert_eq!(t.rows()[0].cell(0), Some("1;2"));
    }

    #[test]
    fn single_column_falls_back_to_comma() {
        let t = read_table("link\nhttps://a.cl\n".as_bytes(), Delimiter::Auto).unwrap();
        assert_eq!(t.schema().names(), &["link"]);
        assert_eq!(t.len(), 1);
    }
}
