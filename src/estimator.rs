//! Per-bucket row counts at the finest modulus of a run

use crate::engine::{QueryResult, SqlEngine, Value};
use crate::error::{DatadiffError, Result};
use crate::segment::BucketCounts;
use crate::sql::{DiffQueryBuilder, Side};

/// Count the rows of one source in every bucket of `modulus`
pub fn estimate_bucket_counts<E: SqlEngine + ?Sized>(
    engine: &E,
    builder: &DiffQueryBuilder,
    side: Side,
    modulus: u64,
) -> Result<BucketCounts> {
    let sql = builder.bucket_counts_query(side, modulus)?;
    let result = engine.query(&sql)?;
    let counts = dense_counts(&result, modulus)?;
    log::debug!(
        "Bucket counts for side {:?} at modulus {}: {} rows in {} non-empty buckets",
        side,
        modulus,
        counts.iter().sum::<u64>(),
        counts.iter().filter(|c| **c > 0).count()
    );
    Ok(BucketCounts::new(modulus, counts))
}

/// Counts for both sources, issued concurrently
pub fn estimate_both<E: SqlEngine + ?Sized>(
    engine: &E,
    builder: &DiffQueryBuilder,
    modulus: u64,
) -> Result<(BucketCounts, BucketCounts)> {
    let (a, b) = rayon::join(
        || estimate_bucket_counts(engine, builder, Side::A, modulus),
        || estimate_bucket_counts(engine, builder, Side::B, modulus),
    );
    Ok((a?, b?))
}

/// Lenient count coercion: anything that is not a finite non-negative
/// integer in range counts as zero
pub fn coerce_count(value: &Value) -> u64 {
    value.as_u64().unwrap_or(0)
}

/// Spread a sparse `(bucket, row_count)` result over a dense array.
///
/// Missing buckets stay at zero; rows with an unusable bucket number are skipped.
pub fn dense_counts(result: &QueryResult, modulus: u64) -> Result<Vec<u64>> {
    let bucket_index = result.column_index("bucket").ok_or_else(|| {
        DatadiffError::data_processing("Bucket count result has no 'bucket' column")
    })?;
    let count_index = result.column_index("row_count").ok_or_else(|| {
        DatadiffError::data_processing("Bucket count result has no 'row_count' column")
    })?;

    let size = usize::try_from(modulus).map_err(|_| {
        DatadiffError::invalid_bucket(format!("Modulus {} does not fit in memory", modulus))
    })?;
    let mut counts = vec![0u64; size];

    for row in &result.rows {
        let bucket = match row.get(bucket_index).and_then(Value::as_u64) {
            Some(b) if b < modulus => b as usize,
            other => {
                log::warn!("Ignoring bucket count row with bucket {:?}", other);
                continue;
            }
        };
        let count = row.get(count_index).map(coerce_count).unwrap_or(0);
        counts[bucket] += count;
    }

    Ok(counts)
}
