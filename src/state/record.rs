use serde::{Deserialize, Serialize};

/// One collected catalogue entry
///
/// Field order matches the exported table columns; `id` is the source URL and
/// is written out as `url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub title: String,

    /// Release year, 0 if unknown
    pub year: u32,

    pub director: String,

    /// Raw delimited genre string as shown on the page
    pub genres: String,

    pub country: String,

    pub language: String,

    /// Average rating on a 0-10 scale
    pub rating: f64,

    pub votes: u64,

    /// Source URL, the record's unique key
    #[serde(rename = "url")]
    pub id: String,
}

impl Record {
    /// Returns true if the rating lies on the expected 0-10 scale
    pub fn has_valid_rating(&self) -> bool {
        self.rating.is_finite() && (0.0..=10.0).contains(&self.rating)
    }
}
