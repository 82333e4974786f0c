//! BIDS `participants.tsv` lookup.

use anyhow::{bail, Context, Result};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::warn;

/// Subject id columns, in order of preference.
pub const SUBJECT_COLUMNS: [&str; 2] = ["BIDS", "participant_id"];
/// Age columns, in order of preference.
pub const AGE_COLUMNS: [&str; 2] = ["AGE", "age"];

/// Subject ages read from a participants table.
///
/// An empty or `n/a` age cell is kept as `None`; asking for that subject's
/// age is then an error rather than a default. When a subject is listed
/// more than once, the first row wins.
#[derive(Debug, Clone, Default)]
pub struct ParticipantsTable {
    ages: HashMap<String, Option<f64>>,
    order: Vec<String>,
}

impl ParticipantsTable {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open participants table {}", path.display()))?;
        Self::from_reader(file).with_context(|| format!("Malformed participants table {}", path.display()))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let find = |candidates: &[&str]| candidates.iter().find_map(|name| headers.iter().position(|h| h == *name));
        let subject_col = match find(&SUBJECT_COLUMNS) {
            Some(col) => col,
            None => bail!("no subject column (expected one of {:?})", SUBJECT_COLUMNS),
        };
        let age_col = match find(&AGE_COLUMNS) {
            Some(col) => col,
            None => bail!("no age column (expected one of {:?})", AGE_COLUMNS),
        };

        let mut table = Self::default();
        for (row, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("row {}", row + 2))?;
            let subject = match record.get(subject_col) {
                Some(subject) if !subject.is_empty() => subject.to_string(),
                _ => continue,
            };
            let age = match record.get(age_col) {
                None | Some("") | Some("n/a") | Some("NA") => None,
                Some(cell) => Some(
                    cell.parse::<f64>()
                        .with_context(|| format!("row {}: invalid age `{}` for {}", row + 2, cell, subject))?,
                ),
            };
            match table.ages.entry(subject) {
                Entry::Vacant(slot) => {
                    table.order.push(slot.key().clone());
                    slot.insert(age);
                }
                Entry::Occupied(slot) => {
                    warn!(subject = %slot.key(), row = row + 2, "duplicate participant row ignored");
                }
            }
        }
        Ok(table)
    }

    /// Age of `subject`. Missing subjects and missing ages are errors.
    pub fn age_of(&self, subject: &str) -> Result<f64> {
        match self.ages.get(subject) {
            Some(Some(age)) => Ok(*age),
            Some(None) => bail!("subject {} has no age recorded", subject),
            None => bail!("subject {} is not listed in the participants table", subject),
        }
    }

    /// Subjects in file order.
    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bids_columns() -> Result<()> {
        let tsv = "BIDS\tSEX\tAGE\nsub-01\tF\t42\nsub-02\tM\t71.5\nsub-03\tM\tn/a\n";
        let table = ParticipantsTable::from_reader(tsv.as_bytes())?;
        assert_eq!(table.len(), 3);
        assert_eq!(table.age_of("sub-01")?, 42.0);
        assert_eq!(table.age_of("sub-02")?, 71.5);
        assert!(table.age_of("sub-03").is_err());
        assert!(table.age_of("sub-04").is_err());
        assert_eq!(table.subjects().collect::<Vec<_>>(), vec!["sub-01", "sub-02", "sub-03"]);
        Ok(())
    }

    #[test]
    fn test_first_row_of_a_subject_wins() -> Result<()> {
        let tsv = "BIDS\tAGE\nsub-01\t42\nsub-02\t60\nsub-01\t77\n";
        let table = ParticipantsTable::from_reader(tsv.as_bytes())?;
        assert_eq!(table.age_of("sub-01")?, 42.0);
        assert_eq!(table.len(), 2);
        assert_eq!(table.subjects().collect::<Vec<_>>(), vec!["sub-01", "sub-02"]);
        Ok(())
    }

    #[test]
    fn test_fallback_columns() -> Result<()> {
        let tsv = "participant_id\tage\nsub-10\t35\n";
        let table = ParticipantsTable::from_reader(tsv.as_bytes())?;
        assert_eq!(table.age_of("sub-10")?, 35.0);
        Ok(())
    }

    #[test]
    fn test_missing_columns_and_bad_ages() {
        assert!(ParticipantsTable::from_reader("BIDS\tSEX\nsub-01\tF\n".as_bytes()).is_err());
        assert!(ParticipantsTable::from_reader("AGE\n40\n".as_bytes()).is_err());
        assert!(ParticipantsTable::from_reader("BIDS\tAGE\nsub-01\tforty\n".as_bytes()).is_err());
    }
}
