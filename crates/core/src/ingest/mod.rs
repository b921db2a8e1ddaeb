pub mod csv;
pub mod types;
pub mod validator;

pub use types::{
    Advisory, FieldError, IngestReport, IngestSummary, RawRow, ValidatedRow, ValidationFailure,
};
pub use validator::{validate_row, validate_rows};
