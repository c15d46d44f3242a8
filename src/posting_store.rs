use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{IndexError, Result};

/// A single document's contribution to a term's posting list: its weight
/// under the configured ranking model and the token positions it occurred
/// at (needed for the window-proximity boost).
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub doc_id: String,
    pub weight: f64,
    pub positions: Vec<u32>,
}

/// On-disk line format shared by spilled blocks and merged shards:
/// `term;doc_id:weight:pos1,pos2,...;doc_id:weight:pos1,pos2,...`
pub fn format_posting_line(term: &str, postings: &[Posting]) -> String {
    let mut line = String::with_capacity(term.len() + postings.len() * 16);
    line.push_str(term);
    for posting in postings {
        line.push(';');
        line.push_str(&posting.doc_id);
        line.push(':');
        line.push_str(&format!("{:.2}", posting.weight));
        line.push(':');
        let positions: Vec<String> = posting.positions.iter().map(u32::to_string).collect();
        line.push_str(&positions.join(","));
    }
    line
}

pub fn parse_posting_line(line: &str) -> Result<(String, Vec<Posting>)> {
    let mut parts = line.split(';');
    let term = parts
        .next()
        .ok_or_else(|| IndexError::Config(format!("malformed posting line: {line}")))?
        .to_string();

    let mut postings = Vec::new();
    for field in parts {
        if field.is_empty() {
            continue;
        }
        let mut fields = field.splitn(3, ':');
        let doc_id = fields
            .next()
            .ok_or_else(|| IndexError::Config(format!("malformed posting field: {field}")))?
            .to_string();
        let weight: f64 = fields
            .next()
            .ok_or_else(|| IndexError::Config(format!("malformed posting field: {field}")))?
            .parse()
            .map_err(|_| IndexError::Config(format!("bad weight in posting field: {field}")))?;
        let positions = fields
            .next()
            .unwrap_or("")
            .split(',')
            .filter(|p| !p.is_empty())
            .map(|p| {
                p.parse::<u32>()
                    .map_err(|_| IndexError::Config(format!("bad position in posting field: {field}")))
            })
            .collect::<Result<Vec<u32>>>()?;

        postings.push(Posting {
            doc_id,
            weight,
            positions,
        });
    }
    Ok((term, postings))
}

/// Writes a sorted-by-term block or shard file in the shared posting format.
pub fn write_block(path: &Path, entries: &BTreeMap<String, Vec<Posting>>) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for (term, postings) in entries {
        writeln!(writer, "{}", format_posting_line(term, postings))?;
    }
    writer.flush()?;
    Ok(())
}

/// Sequential read-ahead cursor over a block/shard file, used by the k-way
/// merger to compare the current term across many open files at once.
pub struct BlockCursor {
    lines: std::io::Lines<BufReader<File>>,
    current: Option<(String, Vec<Posting>)>,
}

impl BlockCursor {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut lines = BufReader::new(file).lines();
        let current = Self::read_next(&mut lines)?;
        Ok(BlockCursor { lines, current })
    }

    fn read_next(
        lines: &mut std::io::Lines<BufReader<File>>,
    ) -> Result<Option<(String, Vec<Posting>)>> {
        match lines.next() {
            Some(line) => {
                let line = line?;
                if line.trim().is_empty() {
                    Self::read_next(lines)
                } else {
                    Ok(Some(parse_posting_line(&line)?))
                }
            }
            None => Ok(None),
        }
    }

    pub fn peek_term(&self) -> Option<&str> {
        self.current.as_ref().map(|(term, _)| term.as_str())
    }

    pub fn take(&mut self) -> Result<Option<(String, Vec<Posting>)>> {
        let next = Self::read_next(&mut self.lines)?;
        Ok(std::mem::replace(&mut self.current, next))
    }
}

/// One row of the term dictionary: `term,idf,shard_index`.
#[derive(Debug, Clone, PartialEq)]
pub struct TermDictionaryEntry {
    pub term: String,
    pub idf: f64,
    pub shard_index: usize,
}

pub fn write_term_dictionary(path: &Path, entries: &[TermDictionaryEntry]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for entry in entries {
        writeln!(writer, "{},{},{}", entry.term, entry.idf, entry.shard_index)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_term_dictionary(path: &Path) -> Result<Vec<TermDictionaryEntry>> {
    if !path.exists() {
        return Err(IndexError::MissingFile(path.to_path_buf()));
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.splitn(3, ',');
        let term = fields
            .next()
            .ok_or_else(|| IndexError::Config(format!("malformed term dictionary line: {line}")))?
            .to_string();
        let idf: f64 = fields
            .next()
            .ok_or_else(|| IndexError::Config(format!("malformed term dictionary line: {line}")))?
            .parse()
            .map_err(|_| IndexError::Config(format!("bad idf in line: {line}")))?;
        let shard_index: usize = fields
            .next()
            .ok_or_else(|| IndexError::Config(format!("malformed term dictionary line: {line}")))?
            .parse()
            .map_err(|_| IndexError::Config(format!("bad shard index in line: {line}")))?;
        entries.push(TermDictionaryEntry {
            term,
            idf,
            shard_index,
        });
    }
    Ok(entries)
}

/// One row of the document-length file used by BM25: `doc_id,dl/avdl`.
#[derive(Debug, Clone, PartialEq)]
pub struct DocLengthEntry {
    pub doc_id: String,
    pub normalized_length: f64,
}

pub fn write_doc_lengths(path: &Path, entries: &[DocLengthEntry]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for entry in entries {
        writeln!(writer, "{},{:.2}", entry.doc_id, entry.normalized_length)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_doc_lengths(path: &Path) -> Result<BTreeMap<String, f64>> {
    if !path.exists() {
        return Err(IndexError::MissingFile(path.to_path_buf()));
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut map = BTreeMap::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.splitn(2, ',');
        let doc_id = fields
            .next()
            .ok_or_else(|| IndexError::Config(format!("malformed doc length line: {line}")))?
            .to_string();
        let normalized_length: f64 = fields
            .next()
            .ok_or_else(|| IndexError::Config(format!("malformed doc length line: {line}")))?
            .parse()
            .map_err(|_| IndexError::Config(format!("bad length in line: {line}")))?;
        map.insert(doc_id, normalized_length);
    }
    Ok(map)
}

/// Looks up a single term's posting list within one shard file by linear
/// scan; shards are kept small enough (per the merge term-complete flush
/// threshold) that this stays cheap and avoids a secondary offset index.
pub fn find_postings(path: &Path, term: &str) -> Result<Option<Vec<Posting>>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (found_term, postings) = parse_posting_line(&line)?;
        if found_term == term {
            return Ok(Some(postings));
        }
    }
    Ok(None)
}
