use crate::error::{FulfillmentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use uuid::Uuid;

/// One row of a quote request file: `type_id,amount`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuoteRequest {
    pub type_id: Uuid,
    pub amount: Decimal,
}

/// Reads quote requests from a CSV source.
///
/// Wraps `csv::Reader`, trimming whitespace and tolerating ragged rows.
pub struct QuoteReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> QuoteReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes each row; a malformed row yields a
    /// `ValidationFailed` error and the iterator carries on.
    pub fn requests(self) -> impl Iterator<Item = Result<QuoteRequest>> {
        self.reader.into_deserialize().map(|result| {
            result.map_err(|e| FulfillmentError::validation(format!("Malformed quote row: {}", e)))
        })
    }
}
