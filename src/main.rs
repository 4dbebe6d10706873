use std::fs::{self, File};
use std::io::{BufWriter, Write};

use anyhow::{bail, Context, Result};

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let (Some(input_path), Some(output_path), None) = (args.next(), args.next(), args.next())
    else {
        bail!("Usage: mython <input-file> <output-file>");
    };

    let source =
        fs::read_to_string(&input_path).with_context(|| format!("Reading {input_path}"))?;
    let output_file =
        File::create(&output_path).with_context(|| format!("Creating {output_path}"))?;
    let mut output = BufWriter::new(output_file);

    mython::run(&source, &mut output)?;
    output.flush().context("Flushing program output")?;
    Ok(())
}
