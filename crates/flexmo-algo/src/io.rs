use anyhow::{Context, Result};
use polars::prelude::DataFrame;
#[cfg(feature = "polars-parquet")]
use polars::prelude::ParquetWriter;
use std::{fs, path::Path};

/// Create the parent directory of `output` if it has one.
pub fn ensure_parent_dir(output: &Path) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory '{}'", parent.display()))?;
    }
    Ok(())
}

#[cfg(feature = "polars-parquet")]
pub fn persist_dataframe(df: &mut DataFrame, output: &Path) -> Result<()> {
    ensure_parent_dir(output)?;
    let mut file = fs::File::create(output)
        .with_context(|| format!("creating Parquet output '{}'", output.display()))?;
    ParquetWriter::new(&mut file)
        .finish(df)
        .context("writing Parquet output")?;
    Ok(())
}

#[cfg(not(feature = "polars-parquet"))]
pub fn persist_dataframe(_df: &mut DataFrame, output: &Path) -> Result<()> {
    anyhow::bail!(
        "cannot write '{}': parquet support is disabled; rebuild with the 'polars-parquet' feature",
        output.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_dirs_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/deeper/results.parquet");
        ensure_parent_dir(&out).unwrap();
        assert!(out.parent().unwrap().is_dir());
        ensure_parent_dir(Path::new("bare.csv")).unwrap();
    }
}
