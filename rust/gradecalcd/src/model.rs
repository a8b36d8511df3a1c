use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

/// The five school terms that carry grades. Anything else is never a valid key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Semester {
    #[serde(rename = "1-1")]
    Y1S1,
    #[serde(rename = "1-2")]
    Y1S2,
    #[serde(rename = "2-1")]
    Y2S1,
    #[serde(rename = "2-2")]
    Y2S2,
    #[serde(rename = "3-1")]
    Y3S1,
}

impl Semester {
    pub const ALL: [Semester; 5] = [
        Semester::Y1S1,
        Semester::Y1S2,
        Semester::Y2S1,
        Semester::Y2S2,
        Semester::Y3S1,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "1-1" => Some(Self::Y1S1),
            "1-2" => Some(Self::Y1S2),
            "2-1" => Some(Self::Y2S1),
            "2-2" => Some(Self::Y2S2),
            "3-1" => Some(Self::Y3S1),
            _ => None,
        }
    }

    /// Combines a school year ("1".."3") with a term ("1"/"2", or a full "x-2" code whose
    /// second half is taken as the term).
    pub fn from_year_term(year: &str, term: &str) -> Option<Self> {
        let term = term.trim();
        let term = term.rsplit('-').next().unwrap_or(term);
        Self::parse(&format!("{}-{}", year.trim(), term))
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Y1S1 => "1-1",
            Self::Y1S2 => "1-2",
            Self::Y2S1 => "2-1",
            Self::Y2S2 => "2-2",
            Self::Y3S1 => "3-1",
        }
    }

    pub fn year(self) -> u8 {
        match self {
            Self::Y1S1 | Self::Y1S2 => 1,
            Self::Y2S1 | Self::Y2S2 => 2,
            Self::Y3S1 => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Y1S1 => "1학년 1학기",
            Self::Y1S2 => "1학년 2학기",
            Self::Y2S1 => "2학년 1학기",
            Self::Y2S2 => "2학년 2학기",
            Self::Y3S1 => "3학년 1학기",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::Y1S1 => 0,
            Self::Y1S2 => 1,
            Self::Y2S1 => 2,
            Self::Y2S2 => 3,
            Self::Y3S1 => 4,
        }
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// Documents written by the browser build used millisecond timestamps (sometimes with a random
// fraction) as ids. Both shapes collapse to the canonical string form here.
#[derive(Deserialize)]
#[serde(untagged)]
enum LenientText {
    Text(String),
    Number(serde_json::Number),
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match LenientText::deserialize(d)? {
        LenientText::Text(s) => s,
        LenientText::Number(n) => n.to_string(),
    })
}

fn lenient_text_or_default<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<LenientText>::deserialize(d)?
        .map(|v| match v {
            LenientText::Text(s) => s,
            LenientText::Number(n) => n.to_string(),
        })
        .unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SubjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl<'de> Deserialize<'de> for SubjectId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        lenient_text(d).map(Self)
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StudentId(String);

impl StudentId {
    /// Time-ordered (UUIDv7) so ids minted in one bulk commit never collide and still sort by
    /// creation.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StudentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StudentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl<'de> Deserialize<'de> for StudentId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        lenient_text(d).map(Self)
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectType {
    #[serde(rename = "direct")]
    Direct,
    #[serde(rename = "z-score")]
    ZScore,
}

impl SubjectType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "direct" => Some(Self::Direct),
            "z-score" | "zscore" => Some(Self::ZScore),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::ZScore => "z-score",
        }
    }

    /// Column suffix used in sheet headers: the value entered is a band or a raw score.
    pub fn input_label(self) -> &'static str {
        match self {
            Self::Direct => "등급",
            Self::ZScore => "점수",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
    pub units: u32,
    #[serde(rename = "type")]
    pub kind: SubjectType,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZScoreSetting {
    pub mean: f64,
    pub std: f64,
}

impl ZScoreSetting {
    pub fn is_valid(&self) -> bool {
        self.mean.is_finite() && self.std.is_finite() && self.std > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    /// School year as entered ("1".."3"); kept alongside `semester` for filtering.
    #[serde(default, deserialize_with = "lenient_text_or_default")]
    pub grade: String,
    #[serde(rename = "class", deserialize_with = "lenient_text")]
    pub class_name: String,
    pub name: String,
    pub semester: Semester,
}

impl Student {
    pub fn in_school_year(&self, year: &str) -> bool {
        let year = year.trim();
        self.grade == year || self.semester.year().to_string() == year
    }
}

/// One stored grade. `units` is a snapshot of the subject's units at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRecord {
    #[serde(deserialize_with = "lenient_text")]
    pub raw: String,
    pub grade: Option<i64>,
    pub units: u32,
}
