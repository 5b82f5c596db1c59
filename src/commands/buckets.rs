use std::io::Write;

use anyhow::{Context, Result};

use crate::state::AppState;

pub async fn create<W: Write>(
    state: &AppState,
    bucket: &str,
    location: &str,
    out: &mut W,
) -> Result<()> {
    state
        .storage
        .create_bucket(bucket, location)
        .await
        .with_context(|| format!("creating bucket {}", bucket))?;
    writeln!(out, "Bucket {} created.", bucket)?;
    Ok(())
}

pub async fn delete<W: Write>(state: &AppState, bucket: &str, out: &mut W) -> Result<()> {
    state
        .storage
        .delete_bucket(bucket)
        .await
        .with_context(|| format!("deleting bucket {}", bucket))?;
    writeln!(out, "Bucket {} deleted.", bucket)?;
    Ok(())
}
