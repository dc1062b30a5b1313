//! Low-level decoding plumbing shared by the workbook readers.

pub(crate) mod biff8;
pub(crate) mod cfb;
pub(crate) mod string;
pub(crate) mod xml;
pub(crate) mod zip;
