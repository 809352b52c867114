// src/output.rs
use crate::mc::PricingResult;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// One row per sample: `path_id,product_0,product_1,...`
pub fn write_path_values_to_csv<P: AsRef<Path>>(filename: P, values: &[Vec<f64>]) -> io::Result<()> {
    let mut file = BufWriter::new(File::create(filename)?);
    let products = values.first().map_or(0, Vec::len);
    write!(file, "path_id")?;
    for p in 0..products {
        write!(file, ",product_{}", p)?;
    }
    writeln!(file)?;
    for (i, row) in values.iter().enumerate() {
        write!(file, "{}", i)?;
        for v in row {
            write!(file, ",{}", v)?;
        }
        writeln!(file)?;
    }
    file.flush()
}

/// One row per product: `product,mean,standard_error,paths`
pub fn write_pricing_result_to_csv<P: AsRef<Path>>(filename: P, result: &PricingResult) -> io::Result<()> {
    let mut file = BufWriter::new(File::create(filename)?);
    writeln!(file, "product,mean,standard_error,paths")?;
    for (i, (mean, error)) in result.means.iter().zip(&result.errors).enumerate() {
        writeln!(file, "{},{},{},{}", i, mean, error, result.paths)?;
    }
    file.flush()
}

pub fn write_summary_to_csv<P: AsRef<Path>>(filename: P, summary_data: &[(&str, String)]) -> io::Result<()> {
    let mut file = BufWriter::new(File::create(filename)?);
    for (key, value) in summary_data {
        writeln!(file, "{},{}", key, value)?;
    }
    file.flush()
}
