use std::io::{Cursor, Write};

use anyhow::Context;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::pipeline::merge::MergeResult;

/// Pack every finished document into one deflate ZIP, each under its output name.
pub fn bundle_outputs(outputs: &[MergeResult]) -> anyhow::Result<Vec<u8>> {
    let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for out in outputs {
        zout.start_file(out.output_name.as_str(), opts)
            .with_context(|| format!("start bundle entry: {}", out.output_name))?;
        zout.write_all(&out.bytes)
            .with_context(|| format!("write bundle entry: {}", out.output_name))?;
    }
    let cursor = zout.finish().context("finish bundle")?;
    Ok(cursor.into_inner())
}
