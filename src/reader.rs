use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;

/// Document ids are opaque, numeric-looking strings (`pmid`); the core
/// never interprets them as numbers, only compares them for equality.
fn value_to_doc_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct PubMedDocument {
    pub pmid: String,
    pub title: String,
    pub abstract_text: String,
}

/// Streams PubMed documents out of a gzip-compressed JSON-Lines file,
/// skipping malformed lines instead of aborting the whole run.
pub struct DocumentReader {
    lines: std::io::Lines<BufReader<GzDecoder<File>>>,
}

impl DocumentReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let decoder = GzDecoder::new(file);
        let reader = BufReader::with_capacity(1 << 20, decoder);
        Ok(DocumentReader {
            lines: reader.lines(),
        })
    }
}

impl Iterator for DocumentReader {
    type Item = PubMedDocument;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "failed to read a line from the document stream");
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RawDocument>(&line) {
                Ok(raw) => {
                    return Some(PubMedDocument {
                        pmid: value_to_doc_id(&raw.pmid),
                        title: raw.title.unwrap_or_default(),
                        abstract_text: raw.abstract_text.unwrap_or_default(),
                    })
                }
                Err(e) => {
                    debug!(error = %e, "skipping malformed document line");
                    continue;
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    pmid: Value,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EvaluationQuery {
    pub query_text: String,
    pub relevant_docs: HashSet<String>,
}

#[derive(Debug, Deserialize)]
struct RawQuery {
    query_text: String,
    documents_pmid: Vec<Value>,
}

/// Reads evaluation queries out of a zip archive whose members are
/// newline-delimited JSON objects (query text plus relevant pmid set).
pub struct QueryReader;

impl QueryReader {
    pub fn read_all(path: &Path) -> Result<Vec<EvaluationQuery>> {
        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)?;

        let mut queries = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let mut contents = String::new();
            entry.read_to_string(&mut contents)?;

            for line in contents.split('\n') {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<RawQuery>(line) {
                    Ok(raw) => queries.push(EvaluationQuery {
                        query_text: raw.query_text,
                        relevant_docs: raw.documents_pmid.iter().map(value_to_doc_id).collect(),
                    }),
                    Err(e) => {
                        debug!(error = %e, "skipping malformed query line");
                        continue;
                    }
                }
            }
        }
        Ok(queries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    #[test]
    fn reads_well_formed_documents_and_skips_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docs.jsonl.gz");

        let file = File::create(&path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        writeln!(encoder, r#"{{"pmid":1,"title":"A","abstract":"alpha"}}"#).unwrap();
        writeln!(encoder, "not json").unwrap();
        writeln!(encoder, r#"{{"pmid":2,"title":"B","abstract":"beta"}}"#).unwrap();
        encoder.finish().unwrap();

        let docs: Vec<_> = DocumentReader::open(&path).unwrap().collect();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].pmid, "1");
        assert_eq!(docs[1].pmid, "2");
    }

    #[test]
    fn reads_queries_from_zip_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queries.zip");

        let file = File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("queries.jsonl", SimpleFileOptions::default())
            .unwrap();
        writeln!(
            zip,
            r#"{{"query_text":"alpha beta","documents_pmid":[1,2]}}"#
        )
        .unwrap();
        zip.finish().unwrap();

        let queries = QueryReader::read_all(&path).unwrap();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].query_text, "alpha beta");
        assert_eq!(
            queries[0].relevant_docs,
            HashSet::from(["1".to_string(), "2".to_string()])
        );
    }
}
