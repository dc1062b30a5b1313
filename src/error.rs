use thiserror::Error;

/// Crate-internal error type for the workbook decoders.
/// Aggregates errors from the standard library, the zip/xml dependencies and the helper modules
/// so the readers can propagate everything with `?`. The public parser boundary folds it into
/// [`SpreadsheetError`](crate::spreadsheet::SpreadsheetError).
#[derive(Error, Debug)]
pub(crate) enum SheetSyncError {
    #[error("{0}")]
    WithContextError(String),

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    ParseFloatError(#[from] std::num::ParseFloatError),

    #[error("{0}")]
    StringEncodingError(#[from] std::str::Utf8Error),

    // Third-party library errors
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    // Helper module errors
    #[error("{0}")]
    CfbHelperError(#[from] crate::helpers::cfb::CfbError),

    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),

    #[error("{0}")]
    Biff8HelperError(#[from] crate::helpers::biff8::Biff8Error),

    // Spreadsheet module errors
    #[error("{0}")]
    SpreadsheetError(#[from] crate::spreadsheet::SpreadsheetError),

    #[error("{0}")]
    XlsxError(#[from] crate::spreadsheet::xlsx::XlsxError),

    #[error("{0}")]
    XlsError(#[from] crate::spreadsheet::xls::XlsError),
}

pub(crate) trait ResultOptionChain {
    fn ok_none_else<F>(self, f: F) -> Self
    where
        F: FnOnce() -> Self;
}

impl<T, E> ResultOptionChain for Result<Option<T>, E> {
    fn ok_none_else<F>(self, f: F) -> Self
    where
        F: FnOnce() -> Self,
    {
        match self {
            Ok(None) => f(),
            _ => self,
        }
    }
}

pub(crate) trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, SheetSyncError> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| match e {
            // Keep the public parser outcome intact so it survives the context wrapper
            SheetSyncError::SpreadsheetError(error) => SheetSyncError::SpreadsheetError(error),
            other => SheetSyncError::WithContextError(format!("{}: {}", message, other)),
        })
    }
}
