//! Splits a known object count into independent merge slices for
//! out-of-process fan-out. No I/O.

use crate::errors::RelayError;
use crate::models::batch::BatchDescriptor;

pub fn plan(total_files: usize, files_per_batch: usize) -> Result<Vec<BatchDescriptor>, RelayError> {
    if files_per_batch == 0 {
        return Err(RelayError::config("files_per_batch must be greater than zero"));
    }

    let batches = (0..total_files.div_ceil(files_per_batch))
        .map(|i| {
            let start = i * files_per_batch;
            BatchDescriptor {
                batch_number: i + 1,
                batch_start_index: start,
                batch_end_index: (start + files_per_batch).min(total_files),
                output_filename: format!("merged_batch_{:03}.csv", i + 1),
            }
        })
        .collect();

    Ok(batches)
}
