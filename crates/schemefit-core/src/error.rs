// Error taxonomy shared by every scoring stage.
//
// Configuration errors abort a run. Data quality errors fail only the entity
// they concern and are collected into a `Batch`. Not-found is a normal
// outcome that callers turn into an empty result.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("configuration error in `{field}`: {message}")]
    Configuration { field: String, message: String },

    #[error("data quality error for {entity}: {message}")]
    DataQuality { entity: String, message: String },

    #[error("not found: {what}")]
    NotFound { what: String },
}

impl FitError {
    pub fn configuration(field: impl Into<String>, message: impl Into<String>) -> Self {
        FitError::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn data_quality(entity: impl Into<String>, message: impl Into<String>) -> Self {
        FitError::DataQuality {
            entity: entity.into(),
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        FitError::NotFound { what: what.into() }
    }

    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FitError::Configuration { .. })
    }
}

// ---------------------------------------------------------------------------
// Numeric guards
// ---------------------------------------------------------------------------

/// Divide two values, reporting a zero or non-finite denominator as a data
/// quality error against `entity` instead of producing NaN/Infinity.
pub fn checked_div(numerator: f64, denominator: f64, entity: &str, what: &str) -> Result<f64, FitError> {
    if denominator == 0.0 || !denominator.is_finite() {
        return Err(FitError::data_quality(
            entity,
            format!("{what}: denominator is {denominator}"),
        ));
    }
    ensure_finite(numerator / denominator, entity, what)
}

/// Pass a value through unchanged if it is finite.
pub fn ensure_finite(value: f64, entity: &str, what: &str) -> Result<f64, FitError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FitError::data_quality(
            entity,
            format!("{what} is not finite ({value})"),
        ))
    }
}

// ---------------------------------------------------------------------------
// Batch results
// ---------------------------------------------------------------------------

/// Output of a batch stage: the entities that succeeded plus the per-entity
/// failures that were collected along the way.
#[derive(Debug, Clone)]
pub struct Batch<T> {
    pub items: Vec<T>,
    pub failures: Vec<FitError>,
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Batch {
            items: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> Batch<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one entity's outcome. Fatal errors are returned so the caller
    /// can abort; everything else is kept as a failure.
    pub fn record(&mut self, result: Result<T, FitError>) -> Result<(), FitError> {
        match result {
            Ok(item) => self.items.push(item),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => self.failures.push(e),
        }
        Ok(())
    }

    /// Append another batch, keeping item and failure order.
    pub fn extend(&mut self, other: Batch<T>) {
        self.items.extend(other.items);
        self.failures.extend(other.failures);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.failures.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
