use std::{collections::BTreeMap, fs, io, path::Path};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelsError {
    #[error("failed to read labels file: {0}")]
    Io(#[from] io::Error),
    #[error("invalid labels line {line}: {content:?}")]
    InvalidLine { line: usize, content: String },
    #[error("malformed class names metadata: {0}")]
    Metadata(String),
}

/// The model's own class id -> label mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassNames {
    names: BTreeMap<u32, String>,
}

impl ClassNames {
    pub fn get(&self, class_id: u32) -> Option<&str> {
        self.names.get(&class_id).map(String::as_str)
    }

    /// Label for `class_id`, or `"Class {id}"` when the model does not name it.
    pub fn label_for(&self, class_id: u32) -> String {
        match self.get(class_id) {
            Some(label) => label.to_string(),
            None => format!("Class {}", class_id),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.names.iter().map(|(id, name)| (*id, name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Parses the `names` entry exported into ONNX metadata, e.g.
    /// `{0: 'ana-yemek', 1: 'cay'}`.
    pub fn from_metadata(raw: &str) -> Result<Self, LabelsError> {
        let body = raw
            .trim()
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(|| LabelsError::Metadata(raw.to_string()))?;

        let mut names = BTreeMap::new();
        for entry in split_outside_quotes(body) {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (id, name) = entry
                .split_once(':')
                .ok_or_else(|| LabelsError::Metadata(entry.to_string()))?;
            let id: u32 = id
                .trim()
                .parse()
                .map_err(|_| LabelsError::Metadata(entry.to_string()))?;
            let name = name.trim().trim_matches(|c| c == '\'' || c == '"');
            names.insert(id, name.to_string());
        }

        Ok(Self { names })
    }
}

impl FromIterator<(u32, String)> for ClassNames {
    fn from_iter<T: IntoIterator<Item = (u32, String)>>(iter: T) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

fn split_outside_quotes(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in body.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, ',') => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);

    parts
}

/// One label per line; the line index is the class id.
pub fn load_labels_file(path: &Path) -> Result<ClassNames, LabelsError> {
    let contents = fs::read_to_string(path)?;

    contents
        .lines()
        .enumerate()
        .map(|(index, line)| {
            let label = line.trim();
            if label.is_empty() {
                return Err(LabelsError::InvalidLine {
                    line: index + 1,
                    content: line.to_string(),
                });
            }
            Ok((index as u32, label.to_string()))
        })
        .collect()
}
