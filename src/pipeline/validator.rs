//! Upload pre-checks run before any byte of the file is decoded.

use thiserror::Error;

/// Largest accepted upload, 10 MiB
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Media types announced for Excel workbooks
pub const ACCEPTED_MEDIA_TYPES: [&str; 2] = [
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-excel",
];

const ACCEPTED_EXTENSIONS: [&str; 2] = [".xlsx", ".xls"];

/// What the caller knows about a file before reading it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDescriptor {
    pub name: String,
    /// Declared media type, possibly empty when the source does not report one
    pub media_type: String,
    pub size: u64,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File type not supported. Please upload an Excel file (.xlsx or .xls).")]
    UnsupportedType,

    #[error("File size exceeds 10MB limit.")]
    TooLarge,
}

/// Checks the type first, then the size. Either an accepted media type or an
/// accepted extension is enough; the extension match is case-sensitive.
pub fn validate(file: &FileDescriptor) -> Option<ValidationError> {
    let is_excel_type = ACCEPTED_MEDIA_TYPES.contains(&file.media_type.as_str());
    let is_excel_name = ACCEPTED_EXTENSIONS.iter().any(|extension| file.name.ends_with(extension));
    if !is_excel_type && !is_excel_name {
        Some(ValidationError::UnsupportedType)
    } else if file.size > MAX_FILE_SIZE {
        Some(ValidationError::TooLarge)
    } else {
        None
    }
}

/// Renders a byte count as `B`, `KB` or `MB` with two decimals above one kilobyte.
pub fn format_file_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, media_type: &str, size: u64) -> FileDescriptor {
        FileDescriptor { name: name.to_owned(), media_type: media_type.to_owned(), size }
    }

    #[test]
    fn accepts_by_media_type_or_extension() {
        assert_eq!(validate(&file("leads.xlsx", "", 1)), None);
        assert_eq!(validate(&file("leads.xls", "application/octet-stream", 1)), None);
        assert_eq!(validate(&file("export", ACCEPTED_MEDIA_TYPES[0], 1)), None);
        assert_eq!(validate(&file("export.bin", ACCEPTED_MEDIA_TYPES[1], 1)), None);
    }

    #[test]
    fn rejects_other_types() {
        assert_eq!(validate(&file("leads.csv", "text/csv", 1)), Some(ValidationError::UnsupportedType));
        assert_eq!(validate(&file("report.XLSX", "", 1)), Some(ValidationError::UnsupportedType));
    }

    #[test]
    fn size_limit_is_inclusive() {
        assert_eq!(validate(&file("leads.xlsx", "", MAX_FILE_SIZE)), None);
        assert_eq!(validate(&file("leads.xlsx", "", MAX_FILE_SIZE + 1)), Some(ValidationError::TooLarge));
    }

    #[test]
    fn type_is_checked_before_size() {
        assert_eq!(validate(&file("huge.csv", "text/csv", MAX_FILE_SIZE * 2)), Some(ValidationError::UnsupportedType));
    }

    #[test]
    fn messages_match_upload_form() {
        assert_eq!(
            ValidationError::UnsupportedType.to_string(),
            "File type not supported. Please upload an Excel file (.xlsx or .xls)."
        );
        assert_eq!(ValidationError::TooLarge.to_string(), "File size exceeds 10MB limit.");
    }

    #[test]
    fn formats_sizes() {
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1536), "1.50 KB");
        assert_eq!(format_file_size(MAX_FILE_SIZE), "10.00 MB");
    }
}
