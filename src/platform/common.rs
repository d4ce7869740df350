//! Common platform utilities

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Upper bound on a plausible logical processor count
pub const MAX_PROCESSORS: usize = 1 << 16;

/// Count the processors in a sysfs CPU list such as "0-7" or "0,2-5,7"
///
/// Returns the highest index plus one, so holes in the list still produce
/// slots for the missing processors. Counts above [`MAX_PROCESSORS`] are
/// rejected as malformed.
pub fn parse_cpu_range(range: &str) -> Option<usize> {
    let range = range.trim();
    if range.is_empty() {
        return None;
    }

    let mut max_cpu = 0;
    for part in range.split(',') {
        let last = match part.split_once('-') {
            Some((_, end)) => end,
            None => part,
        };
        max_cpu = max_cpu.max(last.trim().parse::<usize>().ok()?);
    }

    max_cpu.checked_add(1).filter(|count| *count <= MAX_PROCESSORS)
}

/// Decode the octal escapes used in `/proc/mounts` (`\040` for a space)
pub fn decode_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = std::str::from_utf8(&bytes[i + 1..i + 4]).ok();
            if let Some(value) = digits.and_then(|d| u8::from_str_radix(d, 8).ok()) {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_range() {
        assert_eq!(parse_cpu_range("0-7\n"), Some(8));
        assert_eq!(parse_cpu_range("0"), Some(1));
        assert_eq!(parse_cpu_range("0,2-5,7"), Some(8));
        assert_eq!(parse_cpu_range(""), None);
        assert_eq!(parse_cpu_range("a-b"), None);
    }

    #[test]
    fn test_parse_cpu_range_rejects_absurd_counts() {
        assert_eq!(parse_cpu_range("0-18446744073709551615"), None);
        assert_eq!(parse_cpu_range("0-4000000000"), None);
        assert_eq!(parse_cpu_range("0-65535"), Some(MAX_PROCESSORS));
    }

    #[test]
    fn test_decode_mount_field() {
        assert_eq!(decode_mount_field("/mnt/my\\040disk"), "/mnt/my disk");
        assert_eq!(decode_mount_field("/plain"), "/plain");
        assert_eq!(decode_mount_field("/trailing\\04"), "/trailing\\04");
    }
}
