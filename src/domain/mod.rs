pub mod invoice;
pub mod payment;
pub mod sepay;
pub mod shortfall;

use crate::error::AppError;

/// Parse a TEXT-backed status/enum column. Unknown values are a hard error,
/// never a silent default.
pub(crate) fn invalid_enum(kind: &str, raw: &str) -> AppError {
    AppError::BadRequest(format!("Unknown {kind} value: '{raw}'."))
}
