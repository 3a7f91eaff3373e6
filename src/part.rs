/// A contiguous byte range of the source file, inclusive on both ends to
/// match backend range semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part {
    pub index: u64,
    pub start: u64,
    pub end: u64,
}

impl Part {
    /// Size in bytes; a part always spans at least one byte.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

pub fn parts_needed(file_size: u64, part_size: u64) -> u64 {
    file_size.div_ceil(part_size)
}

/// Range of part `index`: all parts except possibly the last span exactly
/// `part_size` bytes.
pub fn part_at(file_size: u64, part_size: u64, index: u64) -> Part {
    let start = index * part_size;
    let end = (file_size - 1).min(start + part_size - 1);
    Part { index, start, end }
}

pub fn plan(file_size: u64, part_size: u64) -> Vec<Part> {
    (0..parts_needed(file_size, part_size))
        .map(|n| part_at(file_size, part_size, n))
        .collect()
}
