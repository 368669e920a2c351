// ! Importers that turn fetched report files into in-memory tables

pub mod csv_importer;

// Re-export commonly used items
pub use csv_importer::{load_report, CsvImporter, LoadError};
