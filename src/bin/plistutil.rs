//
// Copyright 2020 bplist Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! `plistutil`: validate or convert property list documents from the command line.

use std::io::Write;

use clap::{Parser, ValueEnum};
use log::error;

use plistfmt::Format;

/// Validate or convert property list documents.
#[derive(Debug, Parser)]
#[command(name = "plistutil", version)]
struct Cli {
    /// Convert each input to the given format instead of linting it.
    #[arg(long)]
    convert: Option<TargetFormat>,

    /// Suppress the per-file success line.
    #[arg(short = 's', long)]
    silent: bool,

    /// Write output here instead of alongside the input. Use `-` for stdout, which
    /// requires exactly one input file. Requires `--convert`.
    #[arg(short = 'o', long)]
    output: Option<String>,

    /// Alternate extension for converted output files. Requires `--convert`.
    #[arg(short = 'e', long)]
    extension: Option<String>,

    /// Files to validate or convert.
    #[arg(required = true)]
    inputs: Vec<String>,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
enum TargetFormat {
    #[value(name = "xml1")]
    Xml1,
    #[value(name = "binary1")]
    Binary1,
    #[value(name = "binary15")]
    Binary15,
}

impl From<TargetFormat> for Format {
    fn from(format: TargetFormat) -> Self {
        match format {
            TargetFormat::Xml1 => Format::Xml,
            TargetFormat::Binary1 => Format::BinaryV00,
            TargetFormat::Binary15 => Format::BinaryV15,
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(message) = validate_flags(&cli) {
        eprintln!("plistutil: {}", message);
        std::process::exit(1);
    }

    let mut failures = 0usize;
    for input_path in &cli.inputs {
        match process_one(input_path, &cli) {
            Ok(()) if !cli.silent => println!("{}: OK", input_path),
            Ok(()) => {}
            Err(message) => {
                error!("{}: {}", input_path, message);
                eprintln!("{}: {}", input_path, message);
                failures += 1;
            }
        }
    }

    std::process::exit(failures.min(255) as i32);
}

fn validate_flags(cli: &Cli) -> Result<(), String> {
    if cli.convert.is_none() && cli.output.is_some() {
        return Err("-o requires -convert".to_string());
    }
    if cli.convert.is_none() && cli.extension.is_some() {
        return Err("-e requires -convert".to_string());
    }
    if cli.output.is_some() && cli.inputs.len() > 1 {
        return Err("-o only supports a single input file".to_string());
    }
    if cli.output.is_some() && cli.extension.is_some() {
        return Err("-o and -e are mutually exclusive".to_string());
    }
    Ok(())
}

fn process_one(input_path: &str, cli: &Cli) -> Result<(), String> {
    let bytes = std::fs::read(input_path).map_err(|e| format!("cannot read file: {}", e))?;
    let value = plistfmt::decode(&bytes).map_err(|e| e.to_string())?;

    let format = match cli.convert {
        Some(target) => Format::from(target),
        None => return Ok(()),
    };

    let encoded = plistfmt::encode(&value, format).map_err(|e| e.to_string())?;

    match cli.output.as_deref() {
        Some("-") => std::io::stdout().write_all(&encoded).map_err(|e| format!("cannot write stdout: {}", e)),
        Some(path) => std::fs::write(path, &encoded).map_err(|e| format!("cannot write file: {}", e)),
        None => {
            let out_path = match &cli.extension {
                Some(ext) => replace_extension(input_path, ext),
                None => input_path.to_string(),
            };
            std::fs::write(&out_path, &encoded).map_err(|e| format!("cannot write file: {}", e))
        }
    }
}

fn replace_extension(path: &str, ext: &str) -> String {
    let stem = match path.rfind('.') {
        Some(pos) => &path[..pos],
        None => path,
    };
    format!("{}.{}", stem, ext.trim_start_matches('.'))
}
