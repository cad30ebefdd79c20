use serde::Serialize;

/// Rendering style for field values in `texts` formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldFormat {
    /// Human-readable resolved names (the default)
    Pretty,
    /// Raw field names
    Name,
    /// Numeric field ids
    Id,
}

/// The `format` section of a query request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QueryFormat {
    /// Text values keyed by field name
    Texts {
        field_format: FieldFormat,
        #[serde(skip_serializing_if = "Option::is_none")]
        timezone: Option<String>,
    },
    /// Values keyed by field id. The server answers with the id-to-name
    /// mapping as a distinct first payload.
    Detailed {
        field_ids: Vec<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timezone: Option<String>,
    },
}

impl QueryFormat {
    /// Pretty-printed text format, the default for every query
    pub fn texts() -> Self {
        QueryFormat::Texts {
            field_format: FieldFormat::Pretty,
            timezone: None,
        }
    }

    /// Detailed format restricted to the given field ids
    pub fn detailed(field_ids: Vec<i64>) -> Self {
        QueryFormat::Detailed {
            field_ids,
            timezone: None,
        }
    }

    /// Set the client timezone used when the server renders timestamps.
    /// Advisable for time-range queries so bounds match the client clock.
    pub fn set_timezone(&mut self, tz: impl Into<String>) -> &mut Self {
        match self {
            QueryFormat::Texts { timezone, .. } | QueryFormat::Detailed { timezone, .. } => {
                *timezone = Some(tz.into());
            }
        }
        self
    }
}

impl Default for QueryFormat {
    fn default() -> Self {
        Self::texts()
    }
}
