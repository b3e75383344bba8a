/// 16-bit Internet checksum (ones' complement of the ones' complement sum).
///
/// Words are read big-endian; an odd trailing byte is the high half of a
/// zero-padded final word. Callers zero the checksum field before computing.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);

    for chunk in &mut chunks {
        let word = u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
        sum = sum.wrapping_add(word);
    }

    if let Some(&byte) = chunks.remainder().first() {
        sum = sum.wrapping_add((byte as u32) << 8);
    }

    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}

/// Recomputes the checksum stored at `offset..offset + 2` with that field zeroed.
///
/// Returns `(carried, computed)`; `None` if the field lies outside `data`.
pub fn recompute(data: &[u8], offset: usize) -> Option<(u16, u16)> {
    let field = data.get(offset..offset + 2)?;
    let carried = u16::from_be_bytes([field[0], field[1]]);

    let mut scratch = data.to_vec();
    scratch[offset] = 0;
    scratch[offset + 1] = 0;
    Some((carried, internet_checksum(&scratch)))
}
