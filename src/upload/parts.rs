//! Multipart partitioning of a payload

/// One contiguous slice of a payload in a multipart upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPart {
    /// Part number, starting at 1 in file order
    pub index: u32,

    /// Byte offset of the part within the payload
    pub offset: u64,

    /// Part length in bytes
    pub length: u64,
}

impl UploadPart {
    /// Part number in the signed form object stores expect
    pub fn part_number(&self) -> i32 {
        self.index as i32
    }
}

/// Number of parts needed for `total_size` bytes: `ceil(total_size / part_size)`
///
/// `part_size` must be non-zero; the upload config rejects zero at construction.
pub fn part_count(total_size: u64, part_size: u64) -> u64 {
    total_size.div_ceil(part_size)
}

/// Split a payload into consecutive parts of `part_size` bytes
///
/// The last part holds the remainder, or a full `part_size` when the payload
/// is an exact multiple.
pub fn partition(total_size: u64, part_size: u64) -> impl Iterator<Item = UploadPart> {
    (0..part_count(total_size, part_size)).map(move |i| {
        let offset = i * part_size;
        UploadPart {
            index: (i + 1) as u32,
            offset,
            length: part_size.min(total_size - offset),
        }
    })
}
