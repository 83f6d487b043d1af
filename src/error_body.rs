
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// One segment of a validation error location, such as `body` or an array index.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum LocationSegment {
    Name(String),
    Index(i64),
}

impl Display for LocationSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Index(index) => write!(f, "{}", index),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    #[serde(rename = "loc")]
    pub location: Vec<LocationSegment>,
    #[serde(rename = "msg")]
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
}

impl ValidationError {
    pub fn location_path(&self) -> String {
        self.location.iter().map(|segment| segment.to_string()).collect::<Vec<_>>().join(".")
    }
}

/// `{"detail": [...]}` as returned by the engine for rejected requests.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HttpValidationError {
    pub detail: Vec<ValidationError>,
}

/// Error body of a rejected request.
///
/// `Detailed` is the current shape. `Bare` is a list of entries without the `detail` envelope,
/// accepted for compatibility with older engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorBody {
    Detailed(HttpValidationError),
    Bare(Vec<ValidationError>),
}

impl ErrorBody {
    pub fn parse(text: &str) -> Option<Self> {
        if let Ok(body) = serde_json::from_str::<HttpValidationError>(text) {
            return Some(Self::Detailed(body));
        }
        serde_json::from_str::<Vec<ValidationError>>(text).ok().map(Self::Bare)
    }

    pub fn entries(&self) -> &[ValidationError] {
        match self {
            Self::Detailed(body) => &body.detail,
            Self::Bare(entries) => entries,
        }
    }

    pub fn first(&self) -> Option<&ValidationError> {
        self.entries().first()
    }

    /// Describes the first entry only.
    pub fn summary(&self) -> Option<String> {
        self.first().map(|entry| {
            format!(
                "Location:{}, Message:{}, ErrorType:{}.",
                entry.location_path(),
                entry.message,
                entry.error_type
            )
        })
    }
}
