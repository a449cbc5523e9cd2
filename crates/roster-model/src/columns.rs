//! Mapping of the three semantic roster fields onto whatever labels a source table uses.
//!
//! Teachers label their sheets inconsistently ("Họ và tên", "Tên HS", "Điểm số", ...), so
//! resolution tries an exact case-insensitive match on the configured label first and then
//! falls back to per-field alias lists.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::text::fold;

/// One of the canonical roster columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticField {
    Name,
    ExamCode,
    Score,
}

impl SemanticField {
    /// Resolution order. Earlier fields claim columns first.
    pub const ALL: [SemanticField; 3] = [
        SemanticField::Name,
        SemanticField::ExamCode,
        SemanticField::Score,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SemanticField::Name => "name",
            SemanticField::ExamCode => "exam_code",
            SemanticField::Score => "score",
        }
    }
}

impl fmt::Display for SemanticField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired column label for each semantic field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonicalColumns {
    pub name: String,
    pub exam_code: String,
    pub score: String,
}

impl Default for CanonicalColumns {
    fn default() -> Self {
        Self {
            name: "Tên Học Sinh".to_string(),
            exam_code: "Mã Đề".to_string(),
            score: "Điểm".to_string(),
        }
    }
}

impl CanonicalColumns {
    pub fn label(&self, field: SemanticField) -> &str {
        match field {
            SemanticField::Name => &self.name,
            SemanticField::ExamCode => &self.exam_code,
            SemanticField::Score => &self.score,
        }
    }
}

/// Fallback substrings tried, in declared order, when no column matches a label exactly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnAliases {
    pub name: Vec<String>,
    pub exam_code: Vec<String>,
    pub score: Vec<String>,
    /// Substrings that mark a row as the header row during ingestion.
    pub header_markers: Vec<String>,
}

impl Default for ColumnAliases {
    fn default() -> Self {
        fn owned(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }

        Self {
            name: owned(&[
                "họ và tên",
                "tên học sinh",
                "họ tên",
                "học sinh",
                "tên",
                "student",
                "name",
            ]),
            exam_code: owned(&[
                "mã đề",
                "mã số đề",
                "số đề",
                "mã",
                "đề",
                "exam code",
                "variant",
            ]),
            score: owned(&["điểm số", "số điểm", "điểm", "point", "score"]),
            header_markers: owned(&["họ và tên", "tên học sinh", "học sinh"]),
        }
    }
}

impl ColumnAliases {
    pub fn for_field(&self, field: SemanticField) -> &[String] {
        match field {
            SemanticField::Name => &self.name,
            SemanticField::ExamCode => &self.exam_code,
            SemanticField::Score => &self.score,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchKind {
    /// The column label equals the configured label (case-insensitive).
    Exact,
    /// The column label contains one of the field's aliases.
    Alias,
    /// No column matched; the column was appended by the engine.
    Synthesized,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnMatch {
    pub index: usize,
    pub label: String,
    pub kind: MatchKind,
}

/// Result of column resolution: where each semantic field lives in a table's schema.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColumnMap {
    name: Option<ColumnMatch>,
    exam_code: Option<ColumnMatch>,
    score: Option<ColumnMatch>,
}

impl ColumnMap {
    pub fn get(&self, field: SemanticField) -> Option<&ColumnMatch> {
        match field {
            SemanticField::Name => self.name.as_ref(),
            SemanticField::ExamCode => self.exam_code.as_ref(),
            SemanticField::Score => self.score.as_ref(),
        }
    }

    pub fn index(&self, field: SemanticField) -> Option<usize> {
        self.get(field).map(|m| m.index)
    }

    pub fn label(&self, field: SemanticField) -> Option<&str> {
        self.get(field).map(|m| m.label.as_str())
    }

    pub(crate) fn set(&mut self, field: SemanticField, column: ColumnMatch) {
        let slot = match field {
            SemanticField::Name => &mut self.name,
            SemanticField::ExamCode => &mut self.exam_code,
            SemanticField::Score => &mut self.score,
        };
        *slot = Some(column);
    }

    /// Fields that had no matching column in the source (unresolved or synthesized).
    pub fn missing(&self) -> Vec<SemanticField> {
        SemanticField::ALL
            .into_iter()
            .filter(|field| {
                self.get(*field)
                    .map_or(true, |m| m.kind == MatchKind::Synthesized)
            })
            .collect()
    }

    /// Whether every field points at a column.
    pub fn is_complete(&self) -> bool {
        SemanticField::ALL
            .into_iter()
            .all(|field| self.get(field).is_some())
    }

    fn claims(&self, index: usize) -> bool {
        SemanticField::ALL
            .into_iter()
            .any(|field| self.index(field) == Some(index))
    }
}

/// Locates semantic fields in a raw column list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColumnResolver {
    canonical: CanonicalColumns,
    aliases: ColumnAliases,
}

impl ColumnResolver {
    pub fn new(canonical: CanonicalColumns, aliases: ColumnAliases) -> Self {
        Self { canonical, aliases }
    }

    pub fn canonical(&self) -> &CanonicalColumns {
        &self.canonical
    }

    pub fn aliases(&self) -> &ColumnAliases {
        &self.aliases
    }

    /// Markers used for header-row detection: the configured name label plus the
    /// configured header markers, folded.
    pub fn header_markers(&self) -> Vec<String> {
        let mut markers = vec![fold(self.canonical.name.trim())];
        for marker in &self.aliases.header_markers {
            let marker = fold(marker.trim());
            if !marker.is_empty() && !markers.contains(&marker) {
                markers.push(marker);
            }
        }
        markers.retain(|m| !m.is_empty());
        markers
    }

    /// Resolve every semantic field against `raw_columns`.
    ///
    /// Fields are resolved in [`SemanticField::ALL`] order and a column claimed by one field is
    /// never reused by another. For each field an exact (folded) label match wins; otherwise
    /// aliases are tried in declared order, each against the columns left to right.
    pub fn resolve<S: AsRef<str>>(&self, raw_columns: &[S]) -> ColumnMap {
        let folded: Vec<String> = raw_columns
            .iter()
            .map(|c| fold(c.as_ref().trim()))
            .collect();

        let mut map = ColumnMap::default();
        for field in SemanticField::ALL {
            if let Some((index, kind)) = self.find(field, &folded, &map) {
                map.set(
                    field,
                    ColumnMatch {
                        index,
                        label: raw_columns[index].as_ref().to_string(),
                        kind,
                    },
                );
            }
        }
        map
    }

    fn find(
        &self,
        field: SemanticField,
        folded: &[String],
        claimed: &ColumnMap,
    ) -> Option<(usize, MatchKind)> {
        let target = fold(self.canonical.label(field).trim());
        if !target.is_empty() {
            if let Some(index) = folded
                .iter()
                .enumerate()
                .position(|(i, col)| !claimed.claims(i) && *col == target)
            {
                return Some((index, MatchKind::Exact));
            }
        }

        for alias in self.aliases.for_field(field) {
            let alias = fold(alias.trim());
            if alias.is_empty() {
                continue;
            }
            if let Some(index) = folded
                .iter()
                .enumerate()
                .position(|(i, col)| !claimed.claims(i) && col.contains(&alias))
            {
                return Some((index, MatchKind::Alias));
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn resolver() -> ColumnResolver {
        ColumnResolver::default()
    }

    #[test]
    fn exact_match_is_case_insensitive() {
        let map = resolver().resolve(&["STT", "TÊN HỌC SINH", "mã đề", "ĐIỂM"]);
        assert_eq!(map.index(SemanticField::Name), Some(1));
        assert_eq!(map.index(SemanticField::ExamCode), Some(2));
        assert_eq!(map.index(SemanticField::Score), Some(3));
        assert_eq!(map.get(SemanticField::Name).unwrap().kind, MatchKind::Exact);
        assert!(map.missing().is_empty());
    }

    #[test]
    fn aliases_match_as_substrings() {
        let map = resolver().resolve(&["Họ và tên học sinh", "Mã số đề thi", "Điểm số"]);
        assert_eq!(map.index(SemanticField::Name), Some(0));
        assert_eq!(map.index(SemanticField::ExamCode), Some(1));
        assert_eq!(map.index(SemanticField::Score), Some(2));
        assert_eq!(map.get(SemanticField::Score).unwrap().kind, MatchKind::Alias);
        assert_eq!(map.label(SemanticField::Name), Some("Họ và tên học sinh"));
    }

    #[test]
    fn claimed_columns_are_not_reused() {
        // "Tên đề" contains both the name alias "tên" and the exam alias "đề".
        let map = resolver().resolve(&["Tên đề"]);
        assert_eq!(map.index(SemanticField::Name), Some(0));
        assert_eq!(map.index(SemanticField::ExamCode), None);
    }

    #[test]
    fn unresolved_fields_are_reported_missing() {
        let map = resolver().resolve(&["Học sinh", "Lớp"]);
        assert_eq!(map.index(SemanticField::Name), Some(0));
        assert_eq!(
            map.missing(),
            vec![SemanticField::ExamCode, SemanticField::Score]
        );
        assert!(!map.is_complete());
    }

    #[test]
    fn resolution_is_deterministic() {
        let columns = ["Score (final)", "Point", "Student", "Variant"];
        let first = resolver().resolve(&columns);
        for _ in 0..5 {
            assert_eq!(resolver().resolve(&columns), first);
        }
        // "point" is declared before "score" in the alias list.
        assert_eq!(first.index(SemanticField::Score), Some(1));
    }

    #[test]
    fn custom_labels_win_over_aliases() {
        let resolver = ColumnResolver::new(
            CanonicalColumns {
                name: "Pupil".into(),
                exam_code: "Paper".into(),
                score: "Mark".into(),
            },
            ColumnAliases::default(),
        );
        let map = resolver.resolve(&["Student name", "Pupil", "paper", "MARK"]);
        assert_eq!(map.index(SemanticField::Name), Some(1));
        assert_eq!(map.index(SemanticField::ExamCode), Some(2));
        assert_eq!(map.index(SemanticField::Score), Some(3));
    }

    #[test]
    fn header_markers_include_configured_name_label() {
        let markers = resolver().header_markers();
        assert_eq!(markers[0], "tên học sinh");
        assert!(markers.contains(&"họ và tên".to_string()));
        // "tên học sinh" appears in both the label and the marker list; only kept once.
        assert_eq!(
            markers.iter().filter(|m| m.as_str() == "tên học sinh").count(),
            1
        );
    }
}
