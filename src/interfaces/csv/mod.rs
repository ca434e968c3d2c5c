pub mod quote_reader;
pub mod report_writer;
